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


//! A fan-out/fan-in map-reduce job over CSV logs. The driver starts one
//! mapper per input part, each mapper aggregates its part by source IP and
//! shuffles the groups to the reducers, and each reducer merges the groups it
//! received into one result object.
//!
//! Shuffle and result objects are JSON maps from source IP prefix to the
//! summed value.

mod driver;
mod mapper;
mod reducer;

pub use driver::Driver;
pub use mapper::{aggregate_lines, partition, Aggregate, Mapper};
pub use reducer::Reducer;

use crate::configs::*;
use crate::error::{FaasError, Result};

/// Settings of a map-reduce job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    /// Identifier of the job, part of every object key.
    pub job_id:                String,
    /// Number of map tasks.
    pub num_mappers:           usize,
    /// Number of reduce tasks, a power of two.
    pub num_reducers:          usize,
    /// Address of the mapper function.
    pub mapper_addr:           String,
    /// Address of the reducer function.
    pub reducer_addr:          String,
    /// Bucket holding the input parts.
    pub src_bucket:            String,
    /// Bucket receiving shuffle and result objects.
    pub dest_bucket:           String,
    /// Key prefix of the input parts.
    pub input_prefix:          String,
    /// Key prefix of the shuffle objects.
    pub mapper_output_prefix:  String,
    /// Key prefix of the results.
    pub reducer_output_prefix: String,
}

impl JobConfig {
    /// The configured job.
    pub fn from_env() -> Self {
        Self {
            job_id:                "0".to_string(),
            num_mappers:           *FAASBENCH_NUM_MAPPERS,
            num_reducers:          *FAASBENCH_NUM_REDUCERS,
            mapper_addr:           FAASBENCH_MAPPER_ADDR.clone(),
            reducer_addr:          FAASBENCH_REDUCER_ADDR.clone(),
            src_bucket:            FAASBENCH_MR_SRC_BUCKET.clone(),
            dest_bucket:           FAASBENCH_MR_DEST_BUCKET.clone(),
            input_prefix:          FAASBENCH_MR_INPUT_PREFIX.clone(),
            mapper_output_prefix:  FAASBENCH_MR_MAPPER_PREFIX.clone(),
            reducer_output_prefix: FAASBENCH_MR_REDUCER_PREFIX.clone(),
        }
    }

    /// Checks that the job can be partitioned.
    pub fn validate(&self) -> Result<()> {
        if self.num_mappers == 0 {
            return Err(FaasError::InvalidInput(
                "NUM_MAPPERS must be positive".to_string(),
            ));
        }
        if !self.num_reducers.is_power_of_two() {
            return Err(FaasError::InvalidInput(format!(
                "NUM_REDUCERS must be a power of two, got {}",
                self.num_reducers
            )));
        }
        if self.num_reducers > self.num_mappers {
            return Err(FaasError::InvalidInput(format!(
                "NUM_REDUCERS ({}) exceeds NUM_MAPPERS ({})",
                self.num_reducers, self.num_mappers
            )));
        }
        Ok(())
    }

    /// The input key of map task `i`.
    pub fn input_key(i: usize) -> String {
        format!("part-{:05}", i)
    }
}

/// The key of the shuffle object written by `mapper_id` for `reducer_id`.
pub fn shuffle_key(prefix: &str, job_id: &str, reducer_id: u32, mapper_id: u32) -> String {
    format!(
        "{}job_{}/shuffle_{}/map_{}",
        prefix, job_id, reducer_id, mapper_id
    )
}

/// The key of the object written by `reducer_id`. A single reducer writes
/// the final result.
pub fn result_key(prefix: &str, job_id: &str, reducer_id: u32, n_reducers: u32) -> String {
    if n_reducers == 1 {
        format!("{}job_{}/result", prefix, job_id)
    } else {
        format!("{}job_{}/reducer_{}", prefix, job_id, reducer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{CloudFunction, FunctionEnv};
    use crate::invoker::LocalInvoker;
    use crate::storage::{MemoryStore, Storage, TransferType};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn job(num_mappers: usize, num_reducers: usize) -> JobConfig {
        JobConfig {
            job_id: "7".to_string(),
            num_mappers,
            num_reducers,
            mapper_addr: "mapper:80".to_string(),
            reducer_addr: "reducer:80".to_string(),
            src_bucket: "input".to_string(),
            dest_bucket: "output".to_string(),
            input_prefix: "faasbench/".to_string(),
            mapper_output_prefix: "faasbench/task/mapper/".to_string(),
            reducer_output_prefix: "faasbench/task/reducer/".to_string(),
        }
    }

    #[test]
    fn reducer_counts() {
        assert!(job(4, 2).validate().is_ok());
        assert!(job(4, 4).validate().is_ok());
        assert!(job(1, 1).validate().is_ok());
        assert!(job(4, 3).validate().is_err());
        assert!(job(2, 4).validate().is_err());
        assert!(job(0, 1).validate().is_err());
        assert!(job(4, 0).validate().is_err());
    }

    #[test]
    fn keys() {
        assert_eq!("part-00042", JobConfig::input_key(42));
        assert_eq!(
            "m/job_0/shuffle_1/map_3",
            shuffle_key("m/", "0", 1, 3)
        );
        assert_eq!("r/job_0/result", result_key("r/", "0", 0, 1));
        assert_eq!("r/job_0/reducer_1", result_key("r/", "0", 1, 2));
    }

    async fn run_job(num_mappers: usize, num_reducers: usize) -> Result<(Storage, JobConfig)> {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(TransferType::Memory, "input", store);
        let config = job(num_mappers, num_reducers);

        for i in 0..num_mappers {
            let part = format!(
                "10.0.0.1{i},x,x,{i}.5\n192.168.1.1,x,x,1\nbroken line\n10.0.0.1{i},x,x,1\n",
                i = i
            );
            storage
                .put_in(
                    "input",
                    &format!("faasbench/{}", JobConfig::input_key(i)),
                    part.into_bytes(),
                    Default::default(),
                )
                .await?;
        }

        let invoker = Arc::new(LocalInvoker::new());
        invoker.register("mapper:80", Arc::new(Mapper::new(storage.clone())))?;
        invoker.register("reducer:80", Arc::new(Reducer::new(storage.clone())))?;
        let env = FunctionEnv::new(Some(storage.clone()), invoker);

        let driver = Driver::new(env.invoker.clone(), config.clone());
        let reply = driver.invoke(json!({"name": "run"})).await?;
        assert_eq!(json!({"message": "jobs done"}), reply);
        Ok((storage, config))
    }

    async fn merged_results(storage: &Storage, config: &JobConfig) -> Result<BTreeMap<String, f64>> {
        let mut merged = BTreeMap::new();
        for r in 0..config.num_reducers as u32 {
            let key = result_key(
                &config.reducer_output_prefix,
                &config.job_id,
                r,
                config.num_reducers as u32,
            );
            let body = storage.get_from(&config.dest_bucket, &key).await?;
            let part: BTreeMap<String, f64> = serde_json::from_slice(&body)?;
            for (ip, v) in part {
                assert!(merged.insert(ip, v).is_none(), "groups are disjoint");
            }
        }
        Ok(merged)
    }

    #[tokio::test]
    async fn job_sums_by_source_prefix() -> Result<()> {
        let (storage, config) = run_job(4, 2).await?;
        let merged = merged_results(&storage, &config).await?;

        // "192.168.1.1" and "10.0.0.1X" truncate to 8 characters.
        assert_eq!(Some(&4.0), merged.get("192.168."));
        assert_eq!(Some(&(0.5 + 1.5 + 2.5 + 3.5 + 4.0)), merged.get("10.0.0.1"));
        assert_eq!(2, merged.len());
        Ok(())
    }

    #[tokio::test]
    async fn single_reducer_writes_result() -> Result<()> {
        let (storage, config) = run_job(2, 1).await?;
        let body = storage
            .get_from("output", "faasbench/task/reducer/job_7/result")
            .await?;
        let result: BTreeMap<String, f64> = serde_json::from_slice(&body)?;
        assert_eq!(Some(&2.0), result.get("192.168."));
        assert_eq!(config.num_mappers, 2);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_job_is_rejected_before_fan_out() -> Result<()> {
        let invoker = Arc::new(LocalInvoker::new());
        let driver = Driver::new(invoker, job(2, 3));
        assert!(matches!(
            driver.invoke(json!({})).await,
            Err(FaasError::InvalidInput(_))
        ));
        Ok(())
    }
}
