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
use crate::aws::s3;
use crate::error::Result;
use async_trait::async_trait;
use rusoto_s3::S3Client;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Stores objects in S3 or an S3-compatible service.
#[derive(Clone)]
pub struct S3Store {
    client: S3Client,
}

impl fmt::Debug for S3Store {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("S3Store").finish()
    }
}

impl S3Store {
    /// Creates a store with the configured region and endpoint.
    pub fn try_new() -> Result<Self> {
        Ok(Self::with_client(s3::default_client()?))
    }

    /// Creates a store on top of an existing client.
    pub fn with_client(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        "S3Store"
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
        s3::put_object(&self.client, bucket, key, body, metadata).await
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        s3::get_object(&self.client, bucket, key).await
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        s3::list_objects(&self.client, bucket, prefix).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        s3::delete_object(&self.client, bucket, key).await
    }
}
