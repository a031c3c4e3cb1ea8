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


use super::CloudFunction;
use crate::error::{FaasError, Result};
use crate::payload::{from_event, to_event, BenchmarkInput, HelloReply, HelloRequest};
use crate::storage::Storage;
use async_trait::async_trait;
use chrono::Utc;
use log::info;
use serde_json::Value;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;

/// Burns CPU for a given time or fetches an object of a given size. The
/// parameters arrive JSON encoded in the greeting name, e.g.
/// `{"executiontime": 50}` or `{"objectsize": 1024}`.
#[derive(Debug, Clone)]
pub struct Benchmark {
    storage:  Storage,
    temp_dir: PathBuf,
}

impl Benchmark {
    /// Creates the function. Fetched objects are appended to a file in
    /// `temp_dir`.
    pub fn new(storage: Storage, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            temp_dir: temp_dir.into(),
        }
    }

    async fn spin(&self, millis: u64) -> Result<String> {
        info!("waiting for {} milliseconds", millis);
        let out_of_range =
            || FaasError::InvalidInput(format!("executiontime of {} ms is out of range", millis));
        let deadline = i64::try_from(millis)
            .ok()
            .and_then(|ms| Utc::now().checked_add_signed(chrono::Duration::milliseconds(ms)))
            .ok_or_else(out_of_range)?;
        let end = Instant::now()
            .checked_add(Duration::from_millis(millis))
            .ok_or_else(out_of_range)?;
        tokio::task::spawn_blocking(move || {
            let mut spins: u64 = 0;
            while Instant::now() < end {
                spins = std::hint::black_box(spins.wrapping_add(1));
            }
        })
        .await?;
        Ok(format!(
            "Terminated at: {}",
            deadline.timestamp_millis() as f64 / 1000.0
        ))
    }

    async fn fetch(&self, size: u64) -> Result<String> {
        info!("fetching an object of size {} bytes", size);
        let start = Instant::now();

        let object = self
            .storage
            .list("")
            .await?
            .into_iter()
            .find(|o| o.size == size)
            .ok_or_else(|| FaasError::NotFound(format!("No object of {} bytes", size)))?;
        let body = self.storage.get(&object.key).await?;

        let name = object.key.rsplit('/').next().unwrap_or("object");
        let path = self.temp_dir.join(format!("faasbench-{}", name));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;

        Ok(format!(
            "stored in tmp, used {} milliseconds",
            start.elapsed().as_millis()
        ))
    }
}

#[async_trait]
impl CloudFunction for Benchmark {
    fn name(&self) -> &str {
        "benchmark"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: HelloRequest = from_event(event)?;
        info!("received: {}", request.name);
        let input: BenchmarkInput = serde_json::from_str(&request.name)
            .map_err(|e| FaasError::InvalidInput(e.to_string()))?;

        let message = match input {
            BenchmarkInput {
                objectsize: Some(size),
                ..
            } => self.fetch(size).await?,
            BenchmarkInput {
                executiontime: Some(millis),
                ..
            } => self.spin(millis).await?,
            _ => {
                return Err(FaasError::InvalidInput(
                    "expected objectsize or executiontime".to_string(),
                ))
            }
        };
        to_event(&HelloReply { message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TransferType;
    use serde_json::json;

    async fn benchmark() -> Result<Benchmark> {
        let storage = Storage::init(TransferType::Memory, "mybucket").await?;
        storage.put("small", vec![1; 10]).await?;
        storage.put("objects/large", vec![2; 4096]).await?;
        Ok(Benchmark::new(storage, std::env::temp_dir()))
    }

    #[tokio::test]
    async fn execution_time_spins() -> Result<()> {
        let f = benchmark().await?;
        let start = Instant::now();
        let reply = f
            .invoke(json!({"name": r#"{"executiontime": 30}"#}))
            .await?;
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(reply["message"]
            .as_str()
            .unwrap()
            .starts_with("Terminated at: "));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_execution_time_is_rejected() -> Result<()> {
        let f = benchmark().await?;
        for millis in [9_223_372_036_854_775u64, i64::MAX as u64 + 1, u64::MAX] {
            let name = format!(r#"{{"executiontime": {}}}"#, millis);
            assert!(matches!(
                f.invoke(json!({ "name": name })).await,
                Err(FaasError::InvalidInput(_))
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn object_size_fetches_matching_object() -> Result<()> {
        let f = benchmark().await?;
        let reply = f.invoke(json!({"name": r#"{"objectsize": 4096}"#})).await?;
        assert!(reply["message"]
            .as_str()
            .unwrap()
            .starts_with("stored in tmp, used "));
        let written = std::fs::metadata(std::env::temp_dir().join("faasbench-large"))?;
        assert!(written.len() >= 4096);

        assert!(matches!(
            f.invoke(json!({"name": r#"{"objectsize": 7}"#})).await,
            Err(FaasError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn needs_a_parameter() -> Result<()> {
        let f = benchmark().await?;
        for name in ["{}", "not json"] {
            assert!(matches!(
                f.invoke(json!({ "name": name })).await,
                Err(FaasError::InvalidInput(_))
            ));
        }
        Ok(())
    }
}
