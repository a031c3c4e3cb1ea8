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


use super::result_key;
use crate::error::Result;
use crate::function::CloudFunction;
use crate::payload::{from_event, to_event, ReduceReply, ReduceRequest};
use crate::storage::Storage;
use crate::tracer::in_span;
use async_trait::async_trait;
use futures::future::try_join_all;
use log::{info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Merges the shuffle objects addressed to one reducer.
#[derive(Debug, Clone)]
pub struct Reducer {
    storage: Storage,
}

impl Reducer {
    /// Creates a reducer reading and writing through `storage`.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage: storage.with_role("Reducer"),
        }
    }
}

#[async_trait]
impl CloudFunction for Reducer {
    fn name(&self) -> &str {
        "reducer"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: ReduceRequest = from_event(event)?;
        info!("Reducer {} is invoked", request.reducer_id);

        let responses = in_span(
            "Fetch and process keys",
            try_join_all(
                request
                    .keys
                    .iter()
                    .map(|key| self.storage.get_from(&request.dest_bucket, key)),
            ),
        )
        .await?;

        let start = Instant::now();
        let (results, line_count) = in_span("Compute reducer result", async {
            let mut results: BTreeMap<String, f64> = BTreeMap::new();
            let mut line_count: u64 = 0;
            for (key, body) in request.keys.iter().zip(&responses) {
                match serde_json::from_slice::<BTreeMap<String, f64>>(body) {
                    Ok(groups) => {
                        for (src_ip, value) in groups {
                            line_count += 1;
                            *results.entry(src_ip).or_insert(0.0) += value;
                        }
                    }
                    Err(e) => warn!("Skipping shuffle object '{}': {}", key, e),
                }
            }
            (results, line_count)
        })
        .await;
        let processing_time = start.elapsed().as_secs_f64();
        info!(
            "Reducer{} [{}, {}, {}]",
            request.reducer_id,
            request.keys.len(),
            line_count,
            processing_time
        );

        let key = result_key(
            &request.reducer_output_prefix,
            &request.job_id,
            request.reducer_id,
            request.n_reducers,
        );
        let result_key = in_span("Save result", async {
            let metadata = HashMap::from([
                ("linecount".to_string(), line_count.to_string()),
                ("processingtime".to_string(), processing_time.to_string()),
            ]);
            let body = serde_json::to_vec(&results)?;
            self.storage
                .put_in(&request.dest_bucket, &key, body, metadata)
                .await
        })
        .await?;

        to_event(&ReduceReply {
            reply: "success".to_string(),
            result_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaasError;
    use crate::storage::{MemoryStore, ObjectStore, TransferType};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn merges_and_skips_broken_objects() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(TransferType::Memory, "b", store.clone());
        storage.put("s/map_0", br#"{"a": 1.0, "b": 2.0}"#.to_vec()).await?;
        storage.put("s/map_1", br#"{"a": 0.5}"#.to_vec()).await?;
        storage.put("s/map_2", b"not json".to_vec()).await?;

        let reply = Reducer::new(storage)
            .invoke(json!({
                "keys": ["s/map_0", "s/map_1", "s/map_2"],
                "destBucket": "b",
                "jobId": "3",
                "reducerId": 1,
                "nReducers": 2,
                "reducerOutputPrefix": "r/",
            }))
            .await?;
        assert_eq!(
            json!({"reply": "success", "resultKey": "r/job_3/reducer_1"}),
            reply
        );

        let body = store.get("b", "r/job_3/reducer_1").await?;
        let result: BTreeMap<String, f64> = serde_json::from_slice(&body)?;
        assert_eq!(Some(&1.5), result.get("a"));
        assert_eq!(Some(&2.0), result.get("b"));
        assert_eq!("3", store.metadata("b", "r/job_3/reducer_1")?["linecount"]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_shuffle_object_fails() {
        let storage = Storage::new(TransferType::Memory, "b", Arc::new(MemoryStore::new()));
        let result = Reducer::new(storage)
            .invoke(json!({
                "keys": ["s/map_0"],
                "destBucket": "b",
                "jobId": "0",
                "reducerId": 0,
                "nReducers": 1,
                "reducerOutputPrefix": "",
            }))
            .await;
        assert!(matches!(result, Err(FaasError::NotFound(_))));
    }
}
