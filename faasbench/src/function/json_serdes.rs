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


use super::{greeting, CloudFunction, InputSet};
use crate::error::{FaasError, Result};
use crate::payload::{from_event, to_event, HelloReply, HelloRequest};
use crate::storage::Storage;
use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

/// The document parsed for `record` and unknown names.
pub const RECORD_DOCUMENT: &str = "2.json";
/// The document parsed for `replay`.
pub const REPLAY_DOCUMENT: &str = "1.json";

/// Re-serializes `document` with four-space indentation.
pub fn pretty_print(document: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    document.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| FaasError::Internal(e.to_string()))
}

/// Fetches a JSON document, parses it and prints it back.
#[derive(Debug, Clone)]
pub struct JsonSerdes {
    storage: Storage,
}

impl JsonSerdes {
    /// Creates the function reading documents from `storage`.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl CloudFunction for JsonSerdes {
    fn name(&self) -> &str {
        "json-serdes"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: HelloRequest = from_event(event)?;
        let key = match InputSet::of(&request) {
            InputSet::Replay => REPLAY_DOCUMENT,
            _ => RECORD_DOCUMENT,
        };

        let data = self.storage.get(key).await?;
        let document: Value = serde_json::from_slice(&data)?;
        let text = pretty_print(&document)?;
        debug!("{} is {} bytes pretty-printed", key, text.len());

        to_event(&HelloReply {
            message: greeting(&request.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::TransferType;
    use serde_json::json;

    #[test]
    fn indents_four_spaces() -> Result<()> {
        assert_eq!("{\n    \"a\": 1\n}", pretty_print(&json!({"a": 1}))?);
        Ok(())
    }

    #[tokio::test]
    async fn reads_document_per_input_set() -> Result<()> {
        let storage = Storage::init(TransferType::Memory, "mybucket").await?;
        storage.put_value(RECORD_DOCUMENT, &json!({"set": 2})).await?;
        let f = JsonSerdes::new(storage.clone());

        let reply = f.invoke(json!({"name": "record"})).await?;
        assert_eq!("Hello, record_response!", reply["message"]);

        // 1.json is missing, so only replay fails.
        assert!(matches!(
            f.invoke(json!({"name": "replay"})).await,
            Err(FaasError::NotFound(_))
        ));

        storage.put(REPLAY_DOCUMENT, b"{broken".to_vec()).await?;
        assert!(matches!(
            f.invoke(json!({"name": "replay"})).await,
            Err(FaasError::Serde(_))
        ));
        Ok(())
    }
}
