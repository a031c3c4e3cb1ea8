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


//! Request and reply types of the benchmark functions. Events travel as JSON
//! objects with camelCase fields.

use crate::error::{FaasError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializes a payload into an event.
pub fn to_event<T: Serialize>(payload: &T) -> Result<Value> {
    Ok(serde_json::to_value(payload)?)
}

/// Deserializes an event. A malformed event is [`FaasError::InvalidInput`].
pub fn from_event<T: DeserializeOwned>(event: Value) -> Result<T> {
    serde_json::from_value(event).map_err(|e| FaasError::InvalidInput(e.to_string()))
}

/// The greeting request shared by most functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloRequest {
    /// Who to greet, or `record`/`replay` to select an input set.
    #[serde(default)]
    pub name: String,
}

/// The greeting reply shared by most functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HelloReply {
    #[allow(missing_docs)]
    pub message: String,
}

/// Parameters of the `benchmark` function, JSON encoded in
/// [`HelloRequest::name`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub struct BenchmarkInput {
    /// Fetch an object of exactly this many bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectsize:    Option<u64>,
    /// Spin for this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executiontime: Option<u64>,
}

/// The producer to consumer request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    /// The base64 payload when inline, the storage key otherwise.
    pub value:         String,
    /// How the payload travels.
    pub transfer_type: String,
}

/// The consumer reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReply {
    /// Whether the payload was received.
    pub value: bool,
    /// Number of payload bytes received.
    pub bytes: u64,
}

/// A mapper task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRequest {
    /// Input object keys, relative to the input prefix.
    pub keys:                 Vec<String>,
    /// Bucket holding the input.
    pub src_bucket:           String,
    /// Bucket receiving the shuffle objects.
    pub dest_bucket:          String,
    /// Identifier of the map-reduce job.
    pub job_id:               String,
    /// Index of this mapper.
    pub mapper_id:            u32,
    /// Number of reducers to partition for.
    pub n_reducers:           u32,
    /// Key prefix of the input.
    pub input_prefix:         String,
    /// Key prefix of the shuffle objects.
    pub mapper_output_prefix: String,
}

/// A mapper reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapReply {
    /// Shuffle keys, one per reducer, in reducer order.
    pub keys:  Vec<String>,
    #[allow(missing_docs)]
    pub reply: String,
}

/// A reducer task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceRequest {
    /// Shuffle keys to merge, one per mapper.
    pub keys:                  Vec<String>,
    /// Bucket holding the shuffle objects and the result.
    pub dest_bucket:           String,
    /// Identifier of the map-reduce job.
    pub job_id:                String,
    /// Index of this reducer.
    pub reducer_id:            u32,
    /// Number of reducers of the job.
    pub n_reducers:            u32,
    /// Key prefix of the result.
    pub reducer_output_prefix: String,
}

/// A reducer reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceReply {
    #[allow(missing_docs)]
    pub reply:      String,
    /// Key of the written result.
    pub result_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_are_camel_case() -> Result<()> {
        let event = to_event(&ReduceReply {
            reply:      "success".to_string(),
            result_key: "job_1/result".to_string(),
        })?;
        assert_eq!(json!({"reply": "success", "resultKey": "job_1/result"}), event);

        let req: ConsumeRequest =
            from_event(json!({"value": "a2V5", "transferType": "INLINE"}))?;
        assert_eq!("INLINE", req.transfer_type);
        Ok(())
    }

    #[test]
    fn benchmark_input_fields_are_optional() -> Result<()> {
        let input: BenchmarkInput = serde_json::from_str(r#"{"executiontime": 20}"#)?;
        assert_eq!(Some(20), input.executiontime);
        assert_eq!(None, input.objectsize);
        Ok(())
    }

    #[test]
    fn malformed_events_are_invalid_input() {
        assert!(matches!(
            from_event::<MapRequest>(json!({"keys": 3})),
            Err(FaasError::InvalidInput(_))
        ));
        let hello: HelloRequest = from_event(json!({})).unwrap();
        assert_eq!("", hello.name);
    }
}
