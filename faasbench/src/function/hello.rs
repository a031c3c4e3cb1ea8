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


use super::{greeting, CloudFunction};
use crate::error::Result;
use crate::payload::{from_event, to_event, HelloReply, HelloRequest};
use async_trait::async_trait;
use serde_json::Value;

/// Answers every request with a greeting.
#[derive(Debug, Clone, Default)]
pub struct HelloWorld {}

#[async_trait]
impl CloudFunction for HelloWorld {
    fn name(&self) -> &str {
        "helloworld"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: HelloRequest = from_event(event)?;
        to_event(&HelloReply {
            message: greeting(&request.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn record_replay_and_names() -> Result<()> {
        let f = HelloWorld::default();
        for (name, message) in [
            ("record", "Hello, record_response!"),
            ("replay", "Hello, replay_response!"),
            ("faas", "Hello, faas!"),
            ("", "Hello, !"),
        ] {
            let reply = f.invoke(json!({ "name": name })).await?;
            assert_eq!(json!({ "message": message }), reply);
        }
        Ok(())
    }
}
