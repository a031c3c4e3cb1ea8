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


//! Faasbench error types

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [FaasError]
pub type Result<T> = result::Result<T, FaasError>;

/// Faasbench error
#[derive(Debug)]
#[allow(missing_docs)]
pub enum FaasError {
    /// Error returned by an AWS service.
    AWS(String),
    /// Error returned by Redis (ElastiCache).
    Redis(String),
    /// Error returned by the HTTP client or server.
    Http(String),
    /// Error raised by the storage layer itself.
    Storage(String),
    /// The requested object or function does not exist.
    NotFound(String),
    /// The request is malformed.
    InvalidInput(String),
    /// The feature or transfer type is not supported.
    Unsupported(String),
    /// A downstream function failed.
    Invocation(String),
    /// Error during the execution of a workload.
    Execution(String),
    /// Error raised while exporting spans.
    Tracing(String),
    /// Error that should not happen and points to a bug.
    Internal(String),
    /// Error when (de)serializing JSON.
    Serde(serde_json::Error),
    /// Error associated to I/O operations.
    IoError(io::Error),
}

impl From<io::Error> for FaasError {
    fn from(e: io::Error) -> Self {
        FaasError::IoError(e)
    }
}

impl From<serde_json::Error> for FaasError {
    fn from(e: serde_json::Error) -> Self {
        FaasError::Serde(e)
    }
}

impl From<redis::RedisError> for FaasError {
    fn from(e: redis::RedisError) -> Self {
        FaasError::Redis(e.to_string())
    }
}

impl From<reqwest::Error> for FaasError {
    fn from(e: reqwest::Error) -> Self {
        FaasError::Http(e.to_string())
    }
}

impl From<openssl::error::ErrorStack> for FaasError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        FaasError::Execution(e.to_string())
    }
}

impl From<opentelemetry::trace::TraceError> for FaasError {
    fn from(e: opentelemetry::trace::TraceError) -> Self {
        FaasError::Tracing(e.to_string())
    }
}

impl From<tokio::task::JoinError> for FaasError {
    fn from(e: tokio::task::JoinError) -> Self {
        FaasError::Internal(e.to_string())
    }
}

impl Display for FaasError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match *self {
            FaasError::AWS(ref desc) => write!(f, "AWS error: {}", desc),
            FaasError::Redis(ref desc) => write!(f, "Redis error: {}", desc),
            FaasError::Http(ref desc) => write!(f, "HTTP error: {}", desc),
            FaasError::Storage(ref desc) => write!(f, "Storage error: {}", desc),
            FaasError::NotFound(ref desc) => write!(f, "Not found: {}", desc),
            FaasError::InvalidInput(ref desc) => write!(f, "Invalid input: {}", desc),
            FaasError::Unsupported(ref desc) => write!(f, "Unsupported: {}", desc),
            FaasError::Invocation(ref desc) => write!(f, "Invocation error: {}", desc),
            FaasError::Execution(ref desc) => write!(f, "Execution error: {}", desc),
            FaasError::Tracing(ref desc) => write!(f, "Tracing error: {}", desc),
            FaasError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in faasbench's \
                 code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
            FaasError::Serde(ref desc) => write!(f, "JSON error: {}", desc),
            FaasError::IoError(ref desc) => write!(f, "IO error: {}", desc),
        }
    }
}

impl error::Error for FaasError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            FaasError::Serde(e) => Some(e),
            FaasError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let e = FaasError::NotFound("part-00000".to_string());
        assert_eq!("Not found: part-00000", e.to_string());

        let e: FaasError = io::Error::new(io::ErrorKind::Other, "disk").into();
        assert!(matches!(e, FaasError::IoError(_)));
        assert!(error::Error::source(&e).is_some());
    }

    #[test]
    fn serde_errors_convert() {
        let e: FaasError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(e.to_string().starts_with("JSON error"));
    }
}
