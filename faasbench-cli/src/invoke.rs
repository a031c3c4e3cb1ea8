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


//! Sends one event to a function and prints the reply.

use anyhow::{anyhow, Context as _, Result};
use clap::{Arg, ArgMatches, Command};
use faasbench::prelude::*;
use faasbench::tracer;
use log::info;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let target = matches
        .value_of("target")
        .ok_or_else(|| anyhow!("No target function provided"))?;
    let event = event(matches)?;

    if matches.is_present("async") {
        info!("Queueing an event invocation of {}", target);
        faasbench::aws::lambda::invoke_async(target, &event)
            .await
            .with_context(|| anyhow!("queueing {} failed", target))?;
        println!("Queued an invocation of {}", target);
        return Ok(());
    }

    let invoker = new_invoker(matches.value_of("invoker").unwrap_or(&FAASBENCH_INVOKER))?;
    init_tracing(matches)?;

    info!("Invoking {} through the {} invoker", target, invoker.name());
    let reply = in_span("Invoke function", invoker.invoke(target, event))
        .await
        .with_context(|| anyhow!("invoking {} failed", target))?;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    tracer::shutdown_tracer().await?;
    Ok(())
}

pub fn command_args() -> Command<'static> {
    Command::new("invoke")
        .about("Invokes a function once and prints its reply")
        .arg(
            Arg::new("target")
                .help("The function address (host:port, URL or Lambda function name)")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("event")
                .short('e')
                .long("event")
                .value_name("JSON")
                .help("Sets the JSON event sent to the function")
                .takes_value(true),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .help("Sends a hello request with this name, unless --event is given")
                .takes_value(true)
                .default_value("faas"),
        )
        .arg(
            Arg::new("async")
                .short('a')
                .long("async")
                .help("Queues an event invocation of a Lambda function without waiting for its reply")
                .conflicts_with_all(&["invoker", "zipkin"]),
        )
        .arg(invoker_arg())
        .arg(zipkin_arg())
        .arg(sample_rate_arg())
}

/// Selects how functions are reached.
pub fn invoker_arg() -> Arg<'static> {
    Arg::new("invoker")
        .short('i')
        .long("invoker")
        .help("Sets the invoker [default: from the config]")
        .possible_values(["http", "lambda"])
        .takes_value(true)
}

/// Enables tracing to a Zipkin collector.
pub fn zipkin_arg() -> Arg<'static> {
    Arg::new("zipkin")
        .short('z')
        .long("zipkin")
        .value_name("URL")
        .help("Exports the invocation spans to a Zipkin collector")
        .takes_value(true)
}

/// Samples a share of the traces instead of all of them.
pub fn sample_rate_arg() -> Arg<'static> {
    Arg::new("sample-rate")
        .short('s')
        .long("sample-rate")
        .value_name("RATE")
        .help("Exports this share of the traces, between 0 and 1 [default: all]")
        .requires("zipkin")
        .takes_value(true)
}

/// The `--sample-rate` given, if any.
pub fn sample_rate(matches: &ArgMatches) -> Result<Option<f64>> {
    match matches.value_of("sample-rate") {
        Some(rate) => match rate.parse::<f64>() {
            Ok(rate) if (0.0..=1.0).contains(&rate) => Ok(Some(rate)),
            _ => Err(anyhow!("Invalid sample rate: {}", rate)),
        },
        None => Ok(None),
    }
}

/// Installs the tracer of the invoker when `--zipkin` is given.
pub fn init_tracing(matches: &ArgMatches) -> Result<()> {
    let url = match matches.value_of("zipkin") {
        Some(url) => url,
        None => return Ok(()),
    };
    match sample_rate(matches)? {
        Some(rate) => tracer::init_custom_tracer(
            url,
            rate,
            BTreeMap::from([("service.name".to_string(), "invoker".to_string())]),
        )?,
        None => tracer::init_basic_tracer(url, "invoker")?,
    }
    Ok(())
}

/// The event given by `--event`, or a hello request for `--name`.
pub fn event(matches: &ArgMatches) -> Result<Value> {
    match matches.value_of("event") {
        Some(event) => serde_json::from_str(event).with_context(|| anyhow!("Invalid event")),
        None => Ok(json!({ "name": matches.value_of("name").unwrap_or("faas") })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> ArgMatches {
        command_args().get_matches_from(argv)
    }

    #[test]
    fn events() -> Result<()> {
        let matches = parse(&["invoke", "localhost:50051"]);
        assert_eq!(json!({"name": "faas"}), event(&matches)?);

        let matches = parse(&["invoke", "localhost:50051", "-n", "record"]);
        assert_eq!(json!({"name": "record"}), event(&matches)?);

        let matches = parse(&["invoke", "mapper", "-e", r#"{"keys": []}"#]);
        assert_eq!(json!({"keys": []}), event(&matches)?);

        let matches = parse(&["invoke", "mapper", "-e", "{"]);
        assert!(event(&matches).is_err());
        Ok(())
    }

    #[test]
    fn sample_rates() -> Result<()> {
        let matches = parse(&["invoke", "x", "-z", "http://localhost:9411/api/v2/spans"]);
        assert_eq!(None, sample_rate(&matches)?);

        let matches = parse(&["invoke", "x", "-z", "http://zipkin", "-s", "0.25"]);
        assert_eq!(Some(0.25), sample_rate(&matches)?);

        for rate in ["1.5", "-0.1", "often", "NaN"] {
            let matches = parse(&["invoke", "x", "-z", "http://zipkin", "-s", rate]);
            assert!(sample_rate(&matches).is_err());
        }

        assert!(command_args()
            .try_get_matches_from(["invoke", "x", "-s", "0.5"])
            .is_err());
        Ok(())
    }

    #[test]
    fn async_invocations_skip_the_invoker() {
        let matches = parse(&["invoke", "mapper", "--async", "-n", "queued"]);
        assert!(matches.is_present("async"));
        assert!(command_args()
            .try_get_matches_from(["invoke", "mapper", "--async", "-i", "http"])
            .is_err());
    }

    #[test]
    fn rejects_unknown_invokers() {
        assert!(command_args()
            .try_get_matches_from(["invoke", "x", "-i", "grpc"])
            .is_err());
    }
}
