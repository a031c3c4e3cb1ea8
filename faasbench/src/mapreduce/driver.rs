// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.


use super::JobConfig;
use crate::error::{FaasError, Result};
use crate::function::CloudFunction;
use crate::invoker::Invoker;
use crate::payload::{from_event, to_event, HelloReply, MapReply, MapRequest, ReduceReply, ReduceRequest};
use async_trait::async_trait;
use futures::future::try_join_all;
use log::info;
use serde_json::Value;
use std::sync::Arc;

/// Starts the mappers, then the reducers, and waits for both phases.
#[derive(Debug, Clone)]
pub struct Driver {
    invoker: Arc<dyn Invoker>,
    config:  JobConfig,
}

impl Driver {
    /// Creates a driver running `config` through `invoker`.
    pub fn new(invoker: Arc<dyn Invoker>, config: JobConfig) -> Self {
        Self { invoker, config }
    }

    fn map_request(&self, mapper_id: usize) -> MapRequest {
        MapRequest {
            keys:                 vec![JobConfig::input_key(mapper_id)],
            src_bucket:           self.config.src_bucket.clone(),
            dest_bucket:          self.config.dest_bucket.clone(),
            job_id:               self.config.job_id.clone(),
            mapper_id:            mapper_id as u32,
            n_reducers:           self.config.num_reducers as u32,
            input_prefix:         self.config.input_prefix.clone(),
            mapper_output_prefix: self.config.mapper_output_prefix.clone(),
        }
    }

    async fn call_mapper(&self, request: MapRequest) -> Result<Vec<String>> {
        let mapper_id = request.mapper_id;
        let reply = self
            .invoker
            .invoke(&self.config.mapper_addr, to_event(&request)?)
            .await?;
        let reply: MapReply = from_event(reply)?;
        info!("mapper {} reply: {:?}", mapper_id, reply);

        if reply.keys.len() != self.config.num_reducers {
            return Err(FaasError::Execution(format!(
                "mapper {} returned {} keys for {} reducers",
                mapper_id,
                reply.keys.len(),
                self.config.num_reducers
            )));
        }
        Ok(reply.keys)
    }

    async fn call_reducer(&self, request: ReduceRequest) -> Result<ReduceReply> {
        let reply = self
            .invoker
            .invoke(&self.config.reducer_addr, to_event(&request)?)
            .await?;
        let reply: ReduceReply = from_event(reply)?;
        info!("reducer {} reply: {:?}", request.reducer_id, reply);
        Ok(reply)
    }
}

#[async_trait]
impl CloudFunction for Driver {
    fn name(&self) -> &str {
        "mr-driver"
    }

    async fn invoke(&self, _event: Value) -> Result<Value> {
        self.config.validate()?;

        let map_tasks = (0..self.config.num_mappers).map(|i| self.call_mapper(self.map_request(i)));
        let mapper_keys = try_join_all(map_tasks).await?;

        // Reducer r merges the r-th shuffle object of every mapper.
        let mut reduce_input = vec![Vec::with_capacity(mapper_keys.len()); self.config.num_reducers];
        for keys in mapper_keys {
            for (r, key) in keys.into_iter().enumerate() {
                reduce_input[r].push(key);
            }
        }

        let reduce_tasks = reduce_input.into_iter().enumerate().map(|(r, keys)| {
            info!("assigning keys to reducer {}: {:?}", r, keys);
            self.call_reducer(ReduceRequest {
                keys,
                dest_bucket: self.config.dest_bucket.clone(),
                job_id: self.config.job_id.clone(),
                reducer_id: r as u32,
                n_reducers: self.config.num_reducers as u32,
                reducer_output_prefix: self.config.reducer_output_prefix.clone(),
            })
        });
        try_join_all(reduce_tasks).await?;

        to_event(&HelloReply {
            message: "jobs done".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::LocalInvoker;
    use serde_json::json;

    /// A mapper that always answers with one key.
    #[derive(Debug)]
    struct ShortMapper {}

    #[async_trait]
    impl CloudFunction for ShortMapper {
        fn name(&self) -> &str {
            "mapper"
        }

        async fn invoke(&self, _event: Value) -> Result<Value> {
            Ok(json!({"keys": ["only"], "reply": "success"}))
        }
    }

    #[tokio::test]
    async fn wrong_key_count_fails_the_job() -> Result<()> {
        let invoker = Arc::new(LocalInvoker::new());
        let mut config = JobConfig::from_env();
        config.num_mappers = 2;
        config.num_reducers = 2;
        invoker.register(config.mapper_addr.clone(), Arc::new(ShortMapper {}))?;

        let driver = Driver::new(invoker, config);
        assert!(matches!(
            driver.invoke(json!({})).await,
            Err(FaasError::Execution(_))
        ));
        Ok(())
    }

    #[test]
    fn map_requests_carry_the_job() {
        let driver = Driver::new(Arc::new(LocalInvoker::new()), JobConfig::from_env());
        let request = driver.map_request(3);
        assert_eq!(vec!["part-00003".to_string()], request.keys);
        assert_eq!(3, request.mapper_id);
        assert_eq!(driver.config.num_reducers as u32, request.n_reducers);
    }
}
