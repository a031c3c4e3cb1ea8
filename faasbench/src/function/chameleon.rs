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
use crate::error::Result;
use crate::payload::{from_event, to_event, HelloReply, HelloRequest};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::fmt::Write;

/// Renders a table of `rows` identical rows. Cell `c` of a row holds `c + 1`
/// in a span of class `column-<c + 1>`.
pub fn render_table(cols: usize, rows: usize) -> String {
    let mut html = String::from("<table xmlns=\"http://www.w3.org/1999/xhtml\">\n");
    for _ in 0..rows {
        html.push_str("<tr>\n");
        for c in 0..cols {
            let d = c + 1;
            // Writing to a String cannot fail.
            let _ = writeln!(html, "<td>\n<span class=\"column-{}\">{}</span>\n</td>", d, d);
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>");
    html
}

/// Renders an HTML table.
#[derive(Debug, Clone, Default)]
pub struct Chameleon {}

#[async_trait]
impl CloudFunction for Chameleon {
    fn name(&self) -> &str {
        "chameleon"
    }

    async fn invoke(&self, event: Value) -> Result<Value> {
        let request: HelloRequest = from_event(event)?;
        let (cols, rows) = match InputSet::of(&request) {
            InputSet::Replay => (10, 15),
            _ => (15, 10),
        };
        let html = render_table(cols, rows);
        debug!("Rendered {}x{} table, {} bytes", cols, rows, html.len());

        to_event(&HelloReply {
            message: greeting(&request.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_shape() {
        let html = render_table(15, 10);
        assert_eq!(10, html.matches("<tr>").count());
        assert_eq!(150, html.matches("<td>").count());
        assert!(html.contains("<span class=\"column-1\">1</span>"));
        assert!(html.contains("<span class=\"column-15\">15</span>"));
        assert!(!html.contains("column-16"));

        let html = render_table(10, 15);
        assert_eq!(15, html.matches("<tr>").count());
        assert!(!html.contains("column-11"));
    }

    #[tokio::test]
    async fn replies_with_greeting() -> Result<()> {
        let reply = Chameleon::default().invoke(json!({"name": "bob"})).await?;
        assert_eq!("Hello, bob!", reply["message"]);
        Ok(())
    }
}
