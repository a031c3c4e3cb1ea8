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


//! This crate contains all wrapped functions of the AWS Lambda services.

use crate::configs::*;
use crate::error::{FaasError, Result};
use bytes::Bytes;
use log::info;
use rusoto_lambda::{InvocationRequest, InvocationResponse, Lambda};
use std::time::Duration;

/// Returns the backoff before retry number `retries` (starting at zero),
/// doubling from 100 ms and capped at `max_backoff` milliseconds.
pub fn backoff(retries: u32, max_backoff: u64) -> Duration {
    let millis = 2_u64.checked_pow(retries).unwrap_or(u64::MAX).saturating_mul(100);
    Duration::from_millis(millis.min(max_backoff))
}

/// Invokes the lambda function with the given payload.
///
/// # Arguments
/// * `function_name` - The name of the lambda function.
/// * `payload` - The payload to be passed to the lambda function.
/// * `invocation_type` - The invocation type of the lambda function.
///   - `Event`: Asynchronous invocation.
///   - `RequestResponse`: Synchronous invocation.
///
/// # Returns
/// The result of the invocation.
pub async fn invoke_function(
    function_name: &str,
    invocation_type: &str,
    payload: Option<Bytes>,
) -> Result<InvocationResponse> {
    let request = InvocationRequest {
        function_name: function_name.to_owned(),
        invocation_type: Some(invocation_type.to_owned()),
        payload,
        ..Default::default()
    };

    if invocation_type == *FAASBENCH_LAMBDA_ASYNC_CALL {
        return FAASBENCH_LAMBDA_CLIENT
            .invoke(request)
            .await
            .map_err(|e| FaasError::AWS(e.to_string()));
    }

    // Error retries and exponential backoff in AWS Lambda
    let mut retries = 0;
    loop {
        match FAASBENCH_LAMBDA_CLIENT
            .invoke(request.clone())
            .await
            .map_err(|e| FaasError::AWS(e.to_string()))
        {
            Ok(response) => match response.function_error.as_ref() {
                None => return Ok(response),
                Some(function_error) => {
                    info!(
                        "Function execution error: {}, details: {:?}",
                        function_error,
                        response
                            .payload
                            .as_ref()
                            .map(|p| String::from_utf8_lossy(p).into_owned())
                    );
                }
            },
            Err(e) => {
                info!("Function invocation error: {}", e);
            }
        }

        if retries as usize >= *FAASBENCH_LAMBDA_MAX_RETRIES {
            return Err(FaasError::Invocation(format!(
                "Sync invocation of {} failed after {} retries",
                function_name, *FAASBENCH_LAMBDA_MAX_RETRIES
            )));
        }

        info!("Retrying {} function invocation...", function_name);
        tokio::time::sleep(backoff(retries, *FAASBENCH_LAMBDA_MAX_BACKOFF)).await;
        retries += 1;
    }
}

/// Invokes the lambda function synchronously and returns its JSON reply.
pub async fn invoke_sync(function_name: &str, event: &serde_json::Value) -> Result<serde_json::Value> {
    let payload = Bytes::from(serde_json::to_vec(event)?);
    let response = invoke_function(function_name, &FAASBENCH_LAMBDA_SYNC_CALL, Some(payload)).await?;
    match response.payload {
        Some(body) if !body.is_empty() => Ok(serde_json::from_slice(&body)?),
        _ => Ok(serde_json::Value::Null),
    }
}

/// Queues an asynchronous invocation of the lambda function.
pub async fn invoke_async(function_name: &str, event: &serde_json::Value) -> Result<()> {
    let payload = Bytes::from(serde_json::to_vec(event)?);
    invoke_function(function_name, &FAASBENCH_LAMBDA_ASYNC_CALL, Some(payload))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        assert_eq!(Duration::from_millis(100), backoff(0, 3000));
        assert_eq!(Duration::from_millis(800), backoff(3, 3000));
        assert_eq!(Duration::from_millis(3000), backoff(5, 3000));
        assert_eq!(Duration::from_millis(3000), backoff(80, 3000));
    }

    #[tokio::test]
    #[ignore]
    async fn invoke_deployed_helloworld() -> Result<()> {
        let reply = invoke_sync("helloworld", &serde_json::json!({ "name": "lambda" })).await?;
        assert_eq!("Hello, lambda!", reply["message"]);
        Ok(())
    }
}
