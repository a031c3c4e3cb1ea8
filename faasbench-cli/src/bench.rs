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


//! Drives a load experiment against deployed functions and summarizes the
//! measured latencies.

use crate::invoke::{event, init_tracing, invoker_arg, sample_rate_arg, zipkin_arg};
use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Arg, ArgMatches, Command};
use faasbench::bench::{self, ExperimentConfig};
use faasbench::prelude::*;
use faasbench::tracer;
use log::info;

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let (command, matches) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => bail!(command_args().render_usage()),
    };

    match command {
        "run" => run(matches).await,
        "summarize" => summarize(matches),
        _ => bail!(command_args().render_usage()),
    }
    .with_context(|| anyhow!("{} command failed", command))
}

pub fn command_args() -> Command<'static> {
    Command::new("bench")
        .about("The load generator for deployed functions")
        .subcommand_required(true)
        .subcommand(run_args())
        .subcommand(summarize_args())
}

fn run_args() -> Command<'static> {
    Command::new("run")
        .about("Invokes the endpoints at a fixed rate and records the latencies")
        .arg(
            Arg::new("endpoints file")
                .short('f')
                .long("endpoints")
                .value_name("FILE")
                .help("Sets the JSON file listing the endpoints [default: from the config]")
                .takes_value(true),
        )
        .arg(
            Arg::new("rps")
                .short('r')
                .long("rps")
                .help("Sets the target requests per second [default: from the config]")
                .takes_value(true),
        )
        .arg(
            Arg::new("duration")
                .short('t')
                .long("time")
                .help("Sets the experiment duration, e.g. 30s or 2m [default: from the config]")
                .takes_value(true),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Sets the port of the endpoints [default: from the config]")
                .takes_value(true),
        )
        .arg(
            Arg::new("latency file")
                .short('o')
                .long("latf")
                .value_name("FILE")
                .help("Sets the file name the latencies are saved under")
                .takes_value(true),
        )
        .arg(
            Arg::new("event")
                .short('e')
                .long("event")
                .value_name("JSON")
                .help("Sets the JSON event sent to the functions")
                .takes_value(true),
        )
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .help("Sends hello requests with this name, unless --event is given")
                .takes_value(true)
                .default_value("faas"),
        )
        .arg(invoker_arg())
        .arg(zipkin_arg())
        .arg(sample_rate_arg())
}

fn summarize_args() -> Command<'static> {
    Command::new("summarize")
        .about("Prints the statistics of a latency file")
        .arg(
            Arg::new("latency file")
                .help("The latency file written by `bench run`")
                .required(true)
                .takes_value(true),
        )
}

/// Builds the experiment from the flags, falling back to the config.
fn experiment_config(matches: &ArgMatches) -> Result<ExperimentConfig> {
    let mut config = ExperimentConfig {
        request: event(matches)?,
        ..Default::default()
    };

    if let Some(rps) = matches.value_of("rps") {
        config.rps = rps
            .parse::<f64>()
            .with_context(|| anyhow!("Invalid rps: {}", rps))?;
    }
    if let Some(duration) = matches.value_of("duration") {
        config.duration = humantime::parse_duration(duration)
            .with_context(|| anyhow!("Invalid duration: {}", duration))?;
    }
    if let Some(port) = matches.value_of("port") {
        config.port = port
            .parse::<u16>()
            .with_context(|| anyhow!("Invalid port: {}", port))?;
    }
    Ok(config)
}

async fn run(matches: &ArgMatches) -> Result<()> {
    let config = experiment_config(matches)?;
    let endpoints_file = matches
        .value_of("endpoints file")
        .unwrap_or(&FAASBENCH_BENCH_ENDPOINTS_FILE);
    let latency_file = matches
        .value_of("latency file")
        .unwrap_or(&FAASBENCH_BENCH_LATENCY_FILE);

    let endpoints = bench::read_endpoints(endpoints_file)
        .with_context(|| anyhow!("Failed to read the endpoints from {}", endpoints_file))?;
    let invoker = new_invoker(matches.value_of("invoker").unwrap_or(&FAASBENCH_INVOKER))?;

    init_tracing(matches)?;

    info!(
        "Running the experiment for {} at {} rps against {} endpoints",
        humantime::format_duration(config.duration),
        config.rps,
        endpoints.len()
    );
    let report = bench::run_experiment(invoker, &endpoints, &config).await?;
    let path = bench::write_latencies(report.real_rps, &report.latencies, latency_file)?;

    println!(
        "issued={} completed={} failed={} rps={:.2}",
        report.issued, report.completed, report.failed, report.real_rps
    );
    if let Some(summary) = bench::summarize(&report.latencies) {
        println!("{}", summary);
    }
    println!("latencies: {}", path.display());

    tracer::shutdown_tracer().await?;
    Ok(())
}

fn summarize(matches: &ArgMatches) -> Result<()> {
    let file = matches
        .value_of("latency file")
        .ok_or_else(|| anyhow!("No latency file provided"))?;
    let latencies = bench::read_latencies(file)?;
    match bench::summarize(&latencies) {
        Some(summary) => println!("{}", summary),
        None => println!("{} holds no latencies", file),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn parse(argv: &[&str]) -> ArgMatches {
        run_args().get_matches_from(argv)
    }

    #[test]
    fn flags_override_the_config() -> Result<()> {
        let config = experiment_config(&parse(&[
            "run", "-r", "20", "-t", "1m 30s", "-p", "8080", "-n", "record",
        ]))?;
        assert_eq!(20.0, config.rps);
        assert_eq!(Duration::from_secs(90), config.duration);
        assert_eq!(8080, config.port);
        assert_eq!(json!({"name": "record"}), config.request);

        let config = experiment_config(&parse(&["run"]))?;
        assert_eq!(*FAASBENCH_BENCH_PORT, config.port);
        assert_eq!(json!({"name": "faas"}), config.request);
        Ok(())
    }

    #[test]
    fn bad_flags() {
        assert!(experiment_config(&parse(&["run", "-t", "soon"])).is_err());
        assert!(experiment_config(&parse(&["run", "-r", "fast"])).is_err());
        assert!(experiment_config(&parse(&["run", "-p", "70000"])).is_err());
    }
}
