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


//! Benchmark functions exchange intermediate data through a storage layer so
//! that the same function can be measured with different transfer mechanisms:
//!
//! - `S3`: objects in an S3 bucket, or in MinIO when a custom endpoint is
//!   configured;
//! - `ELASTICACHE`: values in Redis, where the "bucket" handed to
//!   [`Storage::init`] is the Redis URL;
//! - `MEMORY`: a process-local map, used by tests and local runs;
//! - `INLINE`: the data travels inside the request and never reaches the
//!   storage layer;
//! - `XDT`: the experimental cross-function transfer, which is not supported.
//!
//! Every backend implements [`ObjectStore`]; [`Storage`] adds the default
//! bucket, logging and tracing on top of it.

mod memory;
pub use memory::MemoryStore;

mod redis;
pub use self::redis::RedisStore;

mod s3;
pub use self::s3::S3Store;

use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::tracer::in_span;
use async_trait::async_trait;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

/// How data moves between two functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferType {
    /// Inside the request payload.
    Inline,
    /// Through S3 or MinIO.
    S3,
    /// Through Redis.
    Elasticache,
    /// Through the cross-function transfer runtime.
    Xdt,
    /// Through process memory.
    Memory,
}

impl FromStr for TransferType {
    type Err = FaasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INLINE" => Ok(TransferType::Inline),
            "S3" => Ok(TransferType::S3),
            "ELASTICACHE" => Ok(TransferType::Elasticache),
            "XDT" => Ok(TransferType::Xdt),
            "MEMORY" => Ok(TransferType::Memory),
            _ => Err(FaasError::InvalidInput(format!(
                "Unknown transfer type: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TransferType::Inline => "INLINE",
            TransferType::S3 => "S3",
            TransferType::Elasticache => "ELASTICACHE",
            TransferType::Xdt => "XDT",
            TransferType::Memory => "MEMORY",
        };
        write!(f, "{}", name)
    }
}

/// A stored object as returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// The object key.
    pub key:  String,
    /// The object size in bytes.
    pub size: u64,
}

/// The object store trait defines the interface for storage backends.
#[async_trait]
pub trait ObjectStore: Debug + Send + Sync {
    /// The type of the object store.
    fn name(&self) -> &str;
    /// Returns the object store as [`Any`](std::any::Any) so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;
    /// Writes an object, replacing any previous value.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()>;
    /// Reads an object. A missing key is [`FaasError::NotFound`].
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
    /// Lists the objects whose keys start with `prefix`, ordered by key.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;
    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// The storage handle of a function.
#[derive(Debug, Clone)]
pub struct Storage {
    transfer: TransferType,
    bucket:   String,
    store:    Arc<dyn ObjectStore>,
    role:     String,
}

impl Storage {
    /// Wraps an existing object store.
    pub fn new(
        transfer: TransferType,
        bucket: impl Into<String>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            transfer,
            bucket: bucket.into(),
            store,
            role: "Function".to_string(),
        }
    }

    /// Connects to the backend selected by `transfer`.
    ///
    /// For `ELASTICACHE` the `bucket` argument is the Redis URL, and data is
    /// kept under the configured bucket name. `INLINE` data never touches
    /// storage and `XDT` is not available, so both are rejected.
    pub async fn init(transfer: TransferType, bucket: &str) -> Result<Self> {
        info!("Using {} storage with bucket '{}'", transfer, bucket);
        match transfer {
            TransferType::S3 => Ok(Storage::new(
                transfer,
                bucket,
                Arc::new(S3Store::try_new()?),
            )),
            TransferType::Elasticache => Ok(Storage::new(
                transfer,
                FAASBENCH_BUCKET.as_str(),
                Arc::new(RedisStore::connect(bucket).await?),
            )),
            TransferType::Memory => Ok(Storage::new(
                transfer,
                bucket,
                Arc::new(MemoryStore::new()),
            )),
            TransferType::Inline | TransferType::Xdt => Err(FaasError::Unsupported(format!(
                "{} transfer has no storage backend",
                transfer
            ))),
        }
    }

    /// Connects to the configured backend.
    pub async fn from_env() -> Result<Self> {
        let transfer = FAASBENCH_TRANSFER_TYPE.parse::<TransferType>()?;
        match transfer {
            TransferType::Elasticache => Storage::init(transfer, &FAASBENCH_REDIS_URL).await,
            _ => Storage::init(transfer, &FAASBENCH_BUCKET).await,
        }
    }

    /// Sets the role shown in log lines, e.g. `Producer`.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Uses another default bucket on the same backend.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// The selected transfer type.
    pub fn transfer_type(&self) -> TransferType {
        self.transfer
    }

    /// The default bucket.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The underlying object store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Uploads `body` to the default bucket and returns the key.
    pub async fn put(&self, key: &str, body: Vec<u8>) -> Result<String> {
        self.put_in(&self.bucket, key, body, HashMap::new()).await
    }

    /// Uploads `body` with user metadata to the default bucket.
    pub async fn put_with_metadata(
        &self,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.put_in(&self.bucket, key, body, metadata).await
    }

    /// Uploads `body` to `bucket` and returns the key.
    pub async fn put_in(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let msg = format!(
            "{} uploading object with key '{}' to {}",
            self.role, key, self.transfer
        );
        info!("{}", msg);
        in_span(msg, self.store.put(bucket, key, body, metadata)).await?;
        Ok(key.to_owned())
    }

    /// Fetches `key` from the default bucket.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.get_from(&self.bucket, key).await
    }

    /// Fetches `key` from `bucket`.
    pub async fn get_from(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let msg = format!("{} gets key '{}' from {}", self.role, key, self.transfer);
        info!("{}", msg);
        in_span(msg, self.store.get(bucket, key)).await
    }

    /// Serializes `value` as JSON and uploads it.
    pub async fn put_value<T: Serialize>(&self, key: &str, value: &T) -> Result<String> {
        self.put(key, serde_json::to_vec(value)?).await
    }

    /// Fetches `key` and deserializes it from JSON.
    pub async fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let body = self.get(key).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Lists the default bucket.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.store.list(&self.bucket, prefix).await
    }

    /// Lists `bucket`.
    pub async fn list_in(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.store.list(bucket, prefix).await
    }

    /// Deletes `key` from the default bucket.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(&self.bucket, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn transfer_type_parses_any_case() -> Result<()> {
        assert_eq!(TransferType::S3, "s3".parse::<TransferType>()?);
        assert_eq!(
            TransferType::Elasticache,
            "ElastiCache".parse::<TransferType>()?
        );
        assert_eq!("XDT", TransferType::Xdt.to_string());
        assert!(matches!(
            "ftp".parse::<TransferType>(),
            Err(FaasError::InvalidInput(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn inline_and_xdt_have_no_backend() {
        for transfer in [TransferType::Inline, TransferType::Xdt] {
            assert!(matches!(
                Storage::init(transfer, "bucket").await,
                Err(FaasError::Unsupported(_))
            ));
        }
    }

    #[tokio::test]
    async fn memory_storage_roundtrip() -> Result<()> {
        let storage = Storage::init(TransferType::Memory, "bench")
            .await?
            .with_role("Producer");
        assert_eq!("bench", storage.bucket());

        let key = storage.put("payload_bytes.txt", vec![7; 16]).await?;
        assert_eq!("payload_bytes.txt", key);
        assert_eq!(vec![7; 16], storage.get(&key).await?);

        storage
            .put_value("doc.json", &json!({"a": [1, 2, 3]}))
            .await?;
        let doc: Value = storage.get_value("doc.json").await?;
        assert_eq!(json!([1, 2, 3]), doc["a"]);

        assert!(matches!(
            storage.get("nothing").await,
            Err(FaasError::NotFound(_))
        ));

        storage.delete(&key).await?;
        assert_eq!(
            vec!["doc.json".to_string()],
            storage
                .list("")
                .await?
                .into_iter()
                .map(|o| o.key)
                .collect::<Vec<_>>()
        );
        Ok(())
    }

    #[tokio::test]
    async fn explicit_buckets_are_separate() -> Result<()> {
        let storage = Storage::init(TransferType::Memory, "a").await?;
        storage.put_in("b", "k", b"in b".to_vec(), HashMap::new()).await?;
        assert!(storage.get("k").await.is_err());
        assert_eq!(b"in b".to_vec(), storage.get_from("b", "k").await?);
        assert_eq!(1, storage.list_in("b", "k").await?.len());
        Ok(())
    }
}
