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


//! The main entry point for a benchmark function.

use faasbench::prelude::*;
use faasbench::{server, tracer};
use faasbench_function::{function, function_kind, handle, init_tracing, Mode};
use lambda_runtime::{service_fn, LambdaEvent};
use log::info;
use serde_json::Value;

async fn handler(event: LambdaEvent<Value>) -> Result<Value> {
    let function = function().await?;
    handle(function.as_ref(), event.payload).await
}

#[tokio::main]
async fn main() -> std::result::Result<(), lambda_runtime::Error> {
    env_logger::init();

    let kind = function_kind()?;
    init_tracing(kind)?;

    match FAASBENCH_FUNCTION_MODE.parse::<Mode>()? {
        Mode::Http => {
            info!(
                "{} listening on port {}, {} concurrent invocations",
                kind, *FAASBENCH_FUNCTION_PORT, *FAASBENCH_MAX_CONCURRENCY
            );
            server::serve(
                function().await?,
                *FAASBENCH_FUNCTION_PORT,
                *FAASBENCH_MAX_CONCURRENCY,
            )
            .await?;
        }
        Mode::Lambda => {
            info!("AWS Lambda function architecture: {}", std::env::consts::ARCH);
            lambda_runtime::run(service_fn(handler)).await?;
        }
    }

    tracer::shutdown_tracer().await?;
    Ok(())
}
