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


//! A producer function handing a payload to a consumer function, either inside
//! the request or through the storage layer.

use super::{CloudFunction, FunctionEnv};
use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::payload::{from_event, to_event, ConsumeReply, ConsumeRequest, HelloReply};
use crate::storage::{Storage, TransferType};
use async_trait::async_trait;
use log::info;
use rand::RngCore;
use serde_json::Value;

/// Sends a random payload to the consumer on every request.
#[derive(Debug, Clone)]
pub struct Producer {
    env:           FunctionEnv,
    consumer_addr: String,
    payload:       Vec<u8>,
    bucket:        String,
    transfer:      TransferType,
}

impl Producer {
    /// Creates a producer with a fresh payload of `payload_size` bytes. Stored
    /// payloads go to `bucket`.
    pub fn new(
        env: FunctionEnv,
        consumer_addr: impl Into<String>,
        payload_size: usize,
        bucket: impl Into<String>,
    ) -> Self {
        let mut payload = vec![0; payload_size];
        rand::thread_rng().fill_bytes(&mut payload);

        let transfer = env
            .storage
            .as_ref()
            .map(|s| s.transfer_type())
            .unwrap_or_else(|| {
                FAASBENCH_TRANSFER_TYPE
                    .parse()
                    .unwrap_or(TransferType::Inline)
            });

        Self {
            env,
            consumer_addr: consumer_addr.into(),
            payload,
            bucket: bucket.into(),
            transfer,
        }
    }

    /// Uses `transfer` instead of the transfer type of the storage layer.
    pub fn with_transfer(mut self, transfer: TransferType) -> Self {
        self.transfer = transfer;
        self
    }

    fn storage(&self) -> Result<Storage> {
        Ok(self
            .env
            .storage()?
            .clone()
            .with_bucket(self.bucket.as_str())
            .with_role("Producer"))
    }
}

#[async_trait]
impl CloudFunction for Producer {
    fn name(&self) -> &str {
        "producer"
    }

    async fn invoke(&self, _event: Value) -> Result<Value> {
        let value = match self.transfer {
            TransferType::Inline => base64::encode(&self.payload),
            TransferType::Xdt => {
                return Err(FaasError::Unsupported(
                    "XDT transfers are not available".to_string(),
                ))
            }
            _ => {
                info!("[producer] uploading {} bytes", self.payload.len());
                self.storage()?
                    .put(&FAASBENCH_PAYLOAD_KEY, self.payload.clone())
                    .await?
            }
        };

        let request = ConsumeRequest {
            value,
            transfer_type: self.transfer.to_string(),
        };
        let reply = self
            .env
            .invoker
            .invoke(&self.consumer_addr, to_event(&request)?)
            .await?;
        let ack: ConsumeReply = from_event(reply)?;
        info!("[producer] (single) Ack: {} ({} bytes)", ack.value, ack.bytes);

        to_event(&HelloReply {
            message: "Success".to_string(),
        })
    }
}

/// Receives the producer's payload and reports its size.
#[derive(Debug, Clone)]
pub struct Consumer {
    env:    FunctionEnv,
    bucket: String,
}

impl Consumer {
    /// Creates a consumer reading stored payloads from `bucket`.
    pub fn new(env: FunctionEnv, bucket: impl Into<String>) -> Self {
        Self {
            env,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl CloudFunction for Consumer {
    fn name(&self) -> &str {
        "consumer"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: ConsumeRequest = from_event(event)?;
        let payload = match request.transfer_type.parse::<TransferType>()? {
            TransferType::Inline => base64::decode(&request.value)
                .map_err(|e| FaasError::InvalidInput(e.to_string()))?,
            TransferType::Xdt => {
                return Err(FaasError::Unsupported(
                    "XDT transfers are not available".to_string(),
                ))
            }
            _ => {
                self.env
                    .storage()?
                    .clone()
                    .with_bucket(self.bucket.as_str())
                    .with_role("Consumer")
                    .get(&request.value)
                    .await?
            }
        };
        info!("[consumer] Consumed {} bytes", payload.len());

        to_event(&ConsumeReply {
            value: true,
            bytes: payload.len() as u64,
        })
    }
}
