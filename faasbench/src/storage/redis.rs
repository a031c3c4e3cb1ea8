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
use ::redis::aio::ConnectionManager;
use ::redis::{cmd, Client};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Stores values in Redis under `<bucket>/<key>`. Redis has no place for user
/// metadata, so it is dropped.
#[derive(Clone)]
pub struct RedisStore {
    url:  String,
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}

impl RedisStore {
    /// Connects to the Redis server at `url`, e.g. `redis://host:6379/0`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            url: url.to_owned(),
            conn,
        })
    }
}

/// The Redis key of an object.
pub(crate) fn namespaced(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

/// A `SCAN MATCH` pattern selecting the keys that start with `prefix`.
pub(crate) fn prefix_pattern(bucket: &str, prefix: &str) -> String {
    let mut pattern = String::with_capacity(bucket.len() + prefix.len() + 2);
    for c in namespaced(bucket, prefix).chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[async_trait]
impl ObjectStore for RedisStore {
    fn name(&self) -> &str {
        "RedisStore"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _metadata: HashMap<String, String>,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        cmd("SET")
            .arg(namespaced(bucket, key))
            .arg(body)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = cmd("GET")
            .arg(namespaced(bucket, key))
            .query_async(&mut conn)
            .await?;
        value.ok_or_else(|| FaasError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut conn = self.conn.clone();
        let pattern = prefix_pattern(bucket, prefix);
        let strip = bucket.len() + 1;

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let size: u64 = cmd("STRLEN").arg(&key).query_async(&mut conn).await?;
            objects.push(ObjectInfo {
                key: key[strip..].to_owned(),
                size,
            });
        }
        Ok(objects)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        cmd("DEL")
            .arg(namespaced(bucket, key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_escape_glob_characters() {
        assert_eq!("b/job_1/*", prefix_pattern("b", "job_1/"));
        assert_eq!("b/a\\*\\?\\[x\\]*", prefix_pattern("b", "a*?[x]"));
        assert_eq!("bucket/key", namespaced("bucket", "key"));
    }

    #[tokio::test]
    #[ignore]
    async fn redis_roundtrip() -> Result<()> {
        let store = RedisStore::connect("redis://127.0.0.1:6379/0").await?;
        store.put("faasbench-test", "k", b"v".to_vec(), HashMap::new()).await?;
        assert_eq!(b"v".to_vec(), store.get("faasbench-test", "k").await?);
        assert_eq!(1, store.list("faasbench-test", "k").await?.len());
        store.delete("faasbench-test", "k").await?;
        assert!(matches!(
            store.get("faasbench-test", "k").await,
            Err(FaasError::NotFound(_))
        ));
        Ok(())
    }
}
