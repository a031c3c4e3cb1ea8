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


use super::shuffle_key;
use crate::configs::FAASBENCH_MAX_REDUCERS;
use crate::error::{FaasError, Result};
use crate::function::CloudFunction;
use crate::payload::{from_event, to_event, MapReply, MapRequest};
use crate::storage::Storage;
use crate::tracer::in_span;
use async_trait::async_trait;
use futures::future::try_join_all;
use log::{info, warn};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// Length of the source IP prefix records are grouped by.
pub const SRC_IP_PREFIX_LEN: usize = 8;

/// Per source IP prefix sums of one map task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    /// Summed column 3 by the prefix of column 0.
    pub groups:      HashMap<String, f64>,
    /// Number of non-empty lines seen.
    pub line_count:  u64,
    /// Number of lines that could not be parsed.
    pub error_count: u64,
}

/// Adds the CSV lines of `contents` to `agg`.
pub fn aggregate_lines(contents: &str, agg: &mut Aggregate) {
    for line in contents.lines().filter(|l| !l.is_empty()) {
        agg.line_count += 1;
        let fields: Vec<&str> = line.split(',').collect();
        let value = match fields.get(3).map(|v| v.trim().parse::<f64>()) {
            Some(Ok(value)) => value,
            _ => {
                agg.error_count += 1;
                continue;
            }
        };
        let src_ip: String = fields[0].chars().take(SRC_IP_PREFIX_LEN).collect();
        *agg.groups.entry(src_ip).or_insert(0.0) += value;
    }
}

/// The reducer responsible for `src_ip`. `n_reducers` is a power of two.
pub fn partition(src_ip: &str, n_reducers: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    src_ip.hash(&mut hasher);
    (hasher.finish() & (n_reducers as u64 - 1)) as u32
}

/// Aggregates input parts and shuffles the groups to the reducers.
#[derive(Debug, Clone)]
pub struct Mapper {
    storage:      Storage,
    max_reducers: u32,
}

impl Mapper {
    /// Creates a mapper reading and writing through `storage`.
    pub fn new(storage: Storage) -> Self {
        Self {
            storage:      storage.with_role("Mapper"),
            max_reducers: *FAASBENCH_MAX_REDUCERS,
        }
    }

    /// Accepts at most `max_reducers` partitions per request.
    pub fn with_max_reducers(mut self, max_reducers: u32) -> Self {
        self.max_reducers = max_reducers;
        self
    }
}

#[async_trait]
impl CloudFunction for Mapper {
    fn name(&self) -> &str {
        "mapper"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: MapRequest = from_event(event)?;
        if !request.n_reducers.is_power_of_two() {
            return Err(FaasError::InvalidInput(format!(
                "nReducers must be a power of two, got {}",
                request.n_reducers
            )));
        }
        if request.n_reducers > self.max_reducers {
            return Err(FaasError::InvalidInput(format!(
                "nReducers must not exceed {}, got {}",
                self.max_reducers, request.n_reducers
            )));
        }
        info!("Mapper {} is invoked", request.mapper_id);

        let mut start = Instant::now();
        let agg = in_span("Fetch and process keys", async {
            let mut agg = Aggregate::default();
            for key in &request.keys {
                let key = format!("{}{}", request.input_prefix, key);
                let body = self.storage.get_from(&request.src_bucket, &key).await?;
                start = Instant::now();
                aggregate_lines(&String::from_utf8_lossy(&body), &mut agg);
            }
            Ok::<_, FaasError>(agg)
        })
        .await?;
        if agg.error_count > 0 {
            warn!(
                "Mapper {} skipped {} malformed lines",
                request.mapper_id, agg.error_count
            );
        }

        let shuffle = in_span("Shuffle output", async {
            let mut shuffle = vec![BTreeMap::new(); request.n_reducers as usize];
            for (src_ip, value) in &agg.groups {
                shuffle[partition(src_ip, request.n_reducers) as usize].insert(src_ip.clone(), *value);
            }
            shuffle
        })
        .await;

        let processing_time = start.elapsed().as_secs_f64();
        let dest_bucket = request.dest_bucket.as_str();
        let storage = &self.storage;
        let keys = in_span("Save result", async {
            let writes = shuffle.iter().enumerate().map(|(r, groups)| {
                let key = shuffle_key(
                    &request.mapper_output_prefix,
                    &request.job_id,
                    r as u32,
                    request.mapper_id,
                );
                let metadata = HashMap::from([
                    ("linecount".to_string(), agg.line_count.to_string()),
                    ("processingtime".to_string(), processing_time.to_string()),
                ]);
                async move {
                    let body = serde_json::to_vec(groups)?;
                    storage.put_in(dest_bucket, &key, body, metadata).await
                }
            });
            try_join_all(writes).await
        })
        .await?;

        info!(
            "mapper{} [{}, {}, {}, {}]",
            request.mapper_id,
            request.keys.len(),
            agg.line_count,
            processing_time,
            agg.error_count
        );
        to_event(&MapReply {
            keys,
            reply: "success".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, ObjectStore, TransferType};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn lines_are_grouped_by_prefix() {
        let mut agg = Aggregate::default();
        aggregate_lines(
            "93.182.41.9,a,b,2.5\n93.182.41.77,a,b,1.5\n\n1.2.3.4,a,b\nx,y,z,nan?\n",
            &mut agg,
        );
        assert_eq!(4, agg.line_count);
        assert_eq!(2, agg.error_count);
        assert_eq!(Some(&4.0), agg.groups.get("93.182.4"));
        assert_eq!(1, agg.groups.len());
    }

    #[test]
    fn partitions_are_in_range_and_stable() {
        for n in [1, 2, 4, 8] {
            for ip in ["10.0.0.1", "192.168.", "a"] {
                let p = partition(ip, n);
                assert!(p < n);
                assert_eq!(p, partition(ip, n));
            }
        }
        assert_eq!(0, partition("anything", 1));
    }

    #[tokio::test]
    async fn writes_one_shuffle_object_per_reducer() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(TransferType::Memory, "in", store.clone());
        storage
            .put_in("in", "p/part-00000", b"1.1.1.1,,,1\n2.2.2.2,,,2\n".to_vec(), HashMap::new())
            .await?;

        let mapper = Mapper::new(storage);
        let reply = mapper
            .invoke(json!({
                "keys": ["part-00000"],
                "srcBucket": "in",
                "destBucket": "out",
                "jobId": "0",
                "mapperId": 5,
                "nReducers": 4,
                "inputPrefix": "p/",
                "mapperOutputPrefix": "m/",
            }))
            .await?;
        let reply: MapReply = from_event(reply)?;

        assert_eq!("success", reply.reply);
        assert_eq!(
            (0..4).map(|r| format!("m/job_0/shuffle_{}/map_5", r)).collect::<Vec<_>>(),
            reply.keys
        );
        let metadata = store.metadata("out", &reply.keys[0])?;
        assert_eq!("2", metadata["linecount"]);
        assert!(metadata.contains_key("processingtime"));

        let mut total = 0.0;
        for key in &reply.keys {
            let body = store.get("out", key).await?;
            let groups: BTreeMap<String, f64> = serde_json::from_slice(&body)?;
            total += groups.values().sum::<f64>();
        }
        assert_eq!(3.0, total);
        Ok(())
    }

    #[tokio::test]
    async fn reducer_count_is_capped() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let storage = Storage::new(TransferType::Memory, "in", store.clone());
        let request = |n_reducers: u32| {
            json!({
                "keys": [],
                "srcBucket": "in",
                "destBucket": "out",
                "jobId": "0",
                "mapperId": 0,
                "nReducers": n_reducers,
                "inputPrefix": "",
                "mapperOutputPrefix": "",
            })
        };

        let mapper = Mapper::new(storage).with_max_reducers(8);
        for n_reducers in [16, 1 << 31] {
            assert!(matches!(
                mapper.invoke(request(n_reducers)).await,
                Err(FaasError::InvalidInput(_))
            ));
        }
        assert!(store.list("out", "").await?.is_empty());

        let reply: MapReply = from_event(mapper.invoke(request(8)).await?)?;
        assert_eq!(8, reply.keys.len());
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_is_not_found() -> Result<()> {
        let storage = Storage::new(TransferType::Memory, "in", Arc::new(MemoryStore::new()));
        let result = Mapper::new(storage)
            .invoke(json!({
                "keys": ["part-00009"],
                "srcBucket": "in",
                "destBucket": "out",
                "jobId": "0",
                "mapperId": 0,
                "nReducers": 1,
                "inputPrefix": "",
                "mapperOutputPrefix": "",
            }))
            .await;
        assert!(matches!(result, Err(FaasError::NotFound(_))));
        Ok(())
    }
}
