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


//! This crate contains all wrapped functions of the AWS S3 service.

use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::storage::ObjectInfo;
use rusoto_core::credential::{DefaultCredentialsProvider, StaticProvider};
use rusoto_core::{ByteStream, HttpClient, Region, RusotoError};
use rusoto_s3::{
    CreateBucketRequest, Delete, DeleteBucketRequest, DeleteObjectRequest, DeleteObjectsRequest,
    GetObjectError, GetObjectRequest, HeadBucketRequest, ListObjectsV2Request, ObjectIdentifier,
    PutObjectRequest, S3Client, S3,
};
use std::collections::HashMap;
use tokio::io::AsyncReadExt;

/// Creates an S3 client.
///
/// # Arguments
/// * `region` - The AWS region, e.g. `us-west-1`.
/// * `endpoint` - A custom endpoint such as a MinIO address. An empty string
///   means the AWS endpoint of the region.
///
/// Static credentials are taken from `AWS_ACCESS_KEY` and `AWS_SECRET_KEY`
/// when both are set, otherwise the default credential chain is used.
pub fn new_client(region: &str, endpoint: &str) -> Result<S3Client> {
    let region = if endpoint.is_empty() {
        region
            .parse::<Region>()
            .map_err(|e| FaasError::AWS(e.to_string()))?
    } else {
        let endpoint = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_owned()
        } else {
            format!("http://{}", endpoint)
        };
        Region::Custom {
            name: region.to_owned(),
            endpoint,
        }
    };

    let dispatcher = HttpClient::new().map_err(|e| FaasError::AWS(e.to_string()))?;
    match (std::env::var("AWS_ACCESS_KEY"), std::env::var("AWS_SECRET_KEY")) {
        (Ok(key), Ok(secret)) if !key.is_empty() && !secret.is_empty() => Ok(S3Client::new_with(
            dispatcher,
            StaticProvider::new_minimal(key, secret),
            region,
        )),
        _ => Ok(S3Client::new_with(
            dispatcher,
            DefaultCredentialsProvider::new().map_err(|e| FaasError::AWS(e.to_string()))?,
            region,
        )),
    }
}

/// Creates an S3 client from the configured region and endpoint.
pub fn default_client() -> Result<S3Client> {
    new_client(&FAASBENCH_S3_REGION, &FAASBENCH_S3_ENDPOINT)
}

/// Puts an object to AWS S3. If the object exists, it is overwritten.
///
/// # Arguments
/// * `client` - The S3 client.
/// * `bucket` - The name of the bucket to put the object in.
/// * `key` - The key of the object to put.
/// * `body` - The body of the object to put.
/// * `metadata` - User-defined metadata stored with the object.
pub async fn put_object(
    client: &S3Client,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    metadata: HashMap<String, String>,
) -> Result<()> {
    client
        .put_object(PutObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            content_length: Some(body.len() as i64),
            body: Some(ByteStream::from(body)),
            metadata: if metadata.is_empty() {
                None
            } else {
                Some(metadata)
            },
            ..Default::default()
        })
        .await
        .map_err(|e| FaasError::AWS(e.to_string()))
        .map(|_| ())
}

/// Gets an object from AWS S3.
///
/// # Arguments
/// * `client` - The S3 client.
/// * `bucket` - The name of the bucket to get the object from.
/// * `key` - The key of the object to get.
///
/// # Returns
/// The body of the object, or [`FaasError::NotFound`] if the key does not
/// exist.
pub async fn get_object(client: &S3Client, bucket: &str, key: &str) -> Result<Vec<u8>> {
    let output = client
        .get_object(GetObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            ..Default::default()
        })
        .await
        .map_err(|e| match e {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => {
                FaasError::NotFound(format!("s3://{}/{}", bucket, key))
            }
            e => FaasError::AWS(e.to_string()),
        })?;

    let mut buf = Vec::with_capacity(output.content_length.unwrap_or_default().max(0) as usize);
    if let Some(body) = output.body {
        body.into_async_read().read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Deletes an object. Deleting a missing key is not an error.
pub async fn delete_object(client: &S3Client, bucket: &str, key: &str) -> Result<()> {
    client
        .delete_object(DeleteObjectRequest {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            ..Default::default()
        })
        .await
        .map_err(|e| FaasError::AWS(e.to_string()))
        .map(|_| ())
}

/// Returns the objects in a bucket whose keys start with the prefix.
///
/// # Arguments
/// * `client` - The S3 client.
/// * `bucket` - The name of the bucket to get the keys from.
/// * `prefix` - Limits the response to keys that begin with the specified
///   prefix. An empty prefix lists the whole bucket.
pub async fn list_objects(client: &S3Client, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
    let mut objects = Vec::new();
    let mut continuation_token = None;
    loop {
        let resp = client
            .list_objects_v2(ListObjectsV2Request {
                bucket: bucket.to_owned(),
                prefix: if prefix.is_empty() {
                    None
                } else {
                    Some(prefix.to_owned())
                },
                continuation_token,
                ..Default::default()
            })
            .await
            .map_err(|e| FaasError::AWS(e.to_string()))?;

        resp.contents.iter().flatten().for_each(|obj| {
            if let Some(key) = obj.key.as_ref() {
                objects.push(ObjectInfo {
                    key:  key.to_owned(),
                    size: obj.size.unwrap_or_default().max(0) as u64,
                });
            }
        });

        if resp.is_truncated.unwrap_or_default() {
            continuation_token = resp.next_continuation_token;
        } else {
            break;
        }
    }
    Ok(objects)
}

/// Checks whether the specified bucket exists in Amazon S3 and you have
/// permission to access it.
pub async fn bucket_exists(client: &S3Client, bucket: &str) -> Result<bool> {
    // HEAD answers 404 or 403 without a body, so both mean "no".
    Ok(client
        .head_bucket(HeadBucketRequest {
            bucket: bucket.to_owned(),
            ..Default::default()
        })
        .await
        .is_ok())
}

/// Creates a new S3 bucket if it does not exist.
pub async fn create_bucket_if_missing(client: &S3Client, bucket: &str) -> Result<()> {
    if !bucket_exists(client, bucket).await? {
        client
            .create_bucket(CreateBucketRequest {
                bucket: bucket.to_owned(),
                ..Default::default()
            })
            .await
            .map_err(|e| FaasError::AWS(e.to_string()))?;
    }
    Ok(())
}

/// Deletes all objects in a bucket, then the bucket itself.
pub async fn delete_bucket(client: &S3Client, bucket: &str) -> Result<()> {
    if !bucket_exists(client, bucket).await? {
        return Ok(());
    }

    let keys = list_objects(client, bucket, "").await?;
    // A single request deletes at most 1000 keys.
    for chunk in keys.chunks(1000) {
        client
            .delete_objects(DeleteObjectsRequest {
                bucket: bucket.to_owned(),
                delete: Delete {
                    objects: chunk
                        .iter()
                        .map(|obj| ObjectIdentifier {
                            key:        obj.key.to_owned(),
                            version_id: None,
                        })
                        .collect(),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .map_err(|e| FaasError::AWS(e.to_string()))?;
    }

    client
        .delete_bucket(DeleteBucketRequest {
            bucket: bucket.to_owned(),
            ..Default::default()
        })
        .await
        .map_err(|e| FaasError::AWS(e.to_string()))
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_endpoint_accepts_any_region_name() {
        assert!(new_client("minio", "127.0.0.1:9000").is_ok());
        assert!(new_client("us-east-1", "http://127.0.0.1:9000").is_ok());
    }

    #[test]
    fn unknown_region_is_rejected() {
        assert!(matches!(
            new_client("moon-north-1", ""),
            Err(FaasError::AWS(_))
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn put_get_list_roundtrip() -> Result<()> {
        let client = default_client()?;
        let bucket = format!("faasbench-test-{}", uuid::Uuid::new_v4());
        create_bucket_if_missing(&client, &bucket).await?;

        put_object(&client, &bucket, "a/b", b"hello".to_vec(), HashMap::new()).await?;
        assert_eq!(b"hello".to_vec(), get_object(&client, &bucket, "a/b").await?);
        assert_eq!(
            vec![ObjectInfo {
                key:  "a/b".to_string(),
                size: 5,
            }],
            list_objects(&client, &bucket, "a/").await?
        );
        assert!(matches!(
            get_object(&client, &bucket, "missing").await,
            Err(FaasError::NotFound(_))
        ));

        delete_bucket(&client, &bucket).await
    }
}
