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


use super::{ObjectInfo, ObjectStore};
use crate::error::{FaasError, Result};
use async_trait::async_trait;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Object {
    body:     Vec<u8>,
    metadata: HashMap<String, String>,
}

/// Keeps objects in process memory. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<BTreeMap<(String, String), Object>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user metadata of an object.
    pub fn metadata(&self, bucket: &str, key: &str) -> Result<HashMap<String, String>> {
        self.lock()?
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|o| o.metadata.clone())
            .ok_or_else(|| FaasError::NotFound(format!("{}/{}", bucket, key)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<(String, String), Object>>> {
        self.objects
            .lock()
            .map_err(|e| FaasError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "MemoryStore"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        self.lock()?
            .insert((bucket.to_owned(), key.to_owned()), Object { body, metadata });
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|o| o.body.clone())
            .ok_or_else(|| FaasError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .lock()?
            .range((bucket.to_owned(), prefix.to_owned())..)
            .take_while(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, key), object)| ObjectInfo {
                key:  key.clone(),
                size: object.body.len() as u64,
            })
            .collect())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.lock()?.remove(&(bucket.to_owned(), key.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_stops_at_prefix_and_bucket() -> Result<()> {
        let store = MemoryStore::new();
        for (bucket, key) in [("a", "job_1/x"), ("a", "job_1/y"), ("a", "job_2/x"), ("b", "job_1/z")] {
            store.put(bucket, key, vec![0; 3], HashMap::new()).await?;
        }

        let listed = store.list("a", "job_1/").await?;
        assert_eq!(
            vec!["job_1/x", "job_1/y"],
            listed.iter().map(|o| o.key.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(3, listed[0].size);
        assert_eq!(3, store.list("a", "").await?.len());
        Ok(())
    }

    #[tokio::test]
    async fn metadata_is_kept() -> Result<()> {
        let store = MemoryStore::new();
        let metadata = HashMap::from([("linecount".to_string(), "10".to_string())]);
        store.put("a", "k", vec![], metadata.clone()).await?;
        assert_eq!(metadata, store.metadata("a", "k")?);
        assert!(store.metadata("a", "missing").is_err());

        let shared = store.clone();
        shared.delete("a", "k").await?;
        assert!(matches!(store.get("a", "k").await, Err(FaasError::NotFound(_))));
        Ok(())
    }
}
