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


//! An open-loop load generator. Requests are issued at a fixed rate, whether
//! or not earlier requests have completed, and the end-to-end latency of each
//! served request is recorded in microseconds.

use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::invoker::Invoker;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A function to send load to. Other fields of an endpoints entry, such as
/// the event matchers of an eventing function, are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name without port.
    pub hostname: String,
    /// Whether the function is triggered through eventing, in which case its
    /// latency is not measured by the client.
    #[serde(default)]
    pub eventing: bool,
}

/// Reads the endpoint list from a JSON file.
pub fn read_endpoints(path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
    let data = std::fs::read(path.as_ref())?;
    Ok(serde_json::from_slice(&data)?)
}

/// Parameters of a load experiment.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Target requests per second.
    pub rps:      f64,
    /// How long requests are issued.
    pub duration: Duration,
    /// Port the endpoints listen on.
    pub port:     u16,
    /// The event sent with every request.
    pub request:  Value,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            rps:      *FAASBENCH_BENCH_RPS,
            duration: Duration::from_secs(*FAASBENCH_BENCH_DURATION),
            port:     *FAASBENCH_BENCH_PORT,
            request:  json!({ "name": "faas" }),
        }
    }
}

/// Outcome of a load experiment.
#[derive(Debug, Clone, Default)]
pub struct ExperimentReport {
    /// Requests sent.
    pub issued:    u64,
    /// Requests finished before the end of the experiment, failed or not.
    pub completed: u64,
    /// Finished requests that failed.
    pub failed:    u64,
    /// Completed requests per second.
    pub real_rps:  f64,
    /// Latencies of served requests in microseconds.
    pub latencies: Vec<u64>,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed:    AtomicU64,
    latencies: Mutex<Vec<u64>>,
}

/// The time between two requests, at least a nanosecond.
fn tick_period(rps: f64) -> Result<Duration> {
    let invalid = || FaasError::InvalidInput(format!("rps must be positive and finite, got {}", rps));
    if !rps.is_finite() || rps <= 0.0 {
        return Err(invalid());
    }
    match Duration::try_from_secs_f64(1.0 / rps) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(invalid()),
    }
}

/// Sends `config.request` to the endpoints round-robin at `config.rps` for
/// `config.duration`.
pub async fn run_experiment(
    invoker: Arc<dyn Invoker>,
    endpoints: &[Endpoint],
    config: &ExperimentConfig,
) -> Result<ExperimentReport> {
    if endpoints.is_empty() {
        return Err(FaasError::InvalidInput("No endpoints".to_string()));
    }
    let period = tick_period(config.rps)?;

    let counters = Arc::new(Counters::default());
    let mut ticker = tokio::time::interval(period);
    let deadline = tokio::time::sleep(config.duration);
    tokio::pin!(deadline);

    let mut issued: u64 = 0;
    let mut start: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = ticker.tick() => {
                start.get_or_insert_with(Instant::now);
                let endpoint = &endpoints[issued as usize % endpoints.len()];
                let address = format!("{}:{}", endpoint.hostname, config.port);
                let eventing = endpoint.eventing;
                let invoker = invoker.clone();
                let counters = counters.clone();
                let event = config.request.clone();
                tokio::spawn(async move {
                    debug!("Invoking by the address: {}", address);
                    let begin = Instant::now();
                    if let Err(e) = invoker.invoke(&address, event).await {
                        warn!("Failed to invoke {}, err={}", address, e);
                        counters.failed.fetch_add(1, Ordering::SeqCst);
                    }
                    if !eventing {
                        let latency = begin.elapsed().as_micros() as u64;
                        debug!("Invoked {} in {} usec", address, latency);
                        if let Ok(mut latencies) = counters.latencies.lock() {
                            latencies.push(latency);
                        }
                    }
                    counters.completed.fetch_add(1, Ordering::SeqCst);
                });
                issued += 1;
            }
        }
    }

    let elapsed = start.map(|s| s.elapsed().as_secs_f64()).unwrap_or_default();
    let completed = counters.completed.load(Ordering::SeqCst);
    let latencies = counters
        .latencies
        .lock()
        .map_err(|e| FaasError::Internal(e.to_string()))?
        .clone();
    let real_rps = if elapsed > 0.0 {
        completed as f64 / elapsed
    } else {
        0.0
    };

    info!("Issued / completed requests: {}, {}", issued, completed);
    info!("Real / target RPS: {:.2} / {}", real_rps, config.rps);
    info!("Experiment finished!");

    Ok(ExperimentReport {
        issued,
        completed,
        failed: counters.failed.load(Ordering::SeqCst),
        real_rps,
        latencies,
    })
}

/// Writes one latency per line to `rps<real_rps>_<file name>` next to `file`
/// and returns the path written.
pub fn write_latencies(real_rps: f64, latencies: &[u64], file: impl AsRef<Path>) -> Result<PathBuf> {
    let file = file.as_ref();
    let name = file
        .file_name()
        .ok_or_else(|| FaasError::InvalidInput(format!("{} is not a file", file.display())))?;
    let path = file.with_file_name(format!("rps{:.2}_{}", real_rps, name.to_string_lossy()));
    info!("The measured latencies are saved in {}", path.display());

    let mut writer = BufWriter::new(std::fs::File::create(&path)?);
    for latency in latencies {
        writeln!(writer, "{}", latency)?;
    }
    writer.flush()?;
    Ok(path)
}

/// Reads a latency file written by [`write_latencies`].
pub fn read_latencies(path: impl AsRef<Path>) -> Result<Vec<u64>> {
    let reader = BufReader::new(std::fs::File::open(path.as_ref())?);
    let mut latencies = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        latencies.push(line.parse::<u64>().map_err(|e| {
            FaasError::InvalidInput(format!("line {}: '{}': {}", n + 1, line, e))
        })?);
    }
    Ok(latencies)
}

/// Latency statistics in microseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean:  f64,
    /// Median.
    pub p50:   u64,
    /// 90th percentile.
    pub p90:   u64,
    /// 99th percentile.
    pub p99:   u64,
    /// Largest sample.
    pub max:   u64,
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "count={} mean={:.1}us p50={}us p90={}us p99={}us max={}us",
            self.count, self.mean, self.p50, self.p90, self.p99, self.max
        )
    }
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Summarizes latencies, or returns `None` without samples.
pub fn summarize(latencies: &[u64]) -> Option<LatencySummary> {
    if latencies.is_empty() {
        return None;
    }
    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();
    Some(LatencySummary {
        count: sorted.len(),
        mean:  sorted.iter().map(|&l| l as f64).sum::<f64>() / sorted.len() as f64,
        p50:   percentile(&sorted, 50.0),
        p90:   percentile(&sorted, 90.0),
        p99:   percentile(&sorted, 99.0),
        max:   sorted[sorted.len() - 1],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::HelloWorld;
    use crate::invoker::LocalInvoker;

    #[test]
    fn summary_uses_nearest_rank() {
        let latencies: Vec<u64> = (1..=100).rev().collect();
        let summary = summarize(&latencies).unwrap();
        assert_eq!(100, summary.count);
        assert_eq!(50.5, summary.mean);
        assert_eq!(50, summary.p50);
        assert_eq!(90, summary.p90);
        assert_eq!(99, summary.p99);
        assert_eq!(100, summary.max);

        let single = summarize(&[7]).unwrap();
        assert_eq!((7, 7, 7), (single.p50, single.p99, single.max));
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn latency_file_roundtrip() -> Result<()> {
        let file = std::env::temp_dir().join(format!("lat-{}.csv", uuid::Uuid::new_v4()));
        let path = write_latencies(12.5, &[300, 100, 200], &file)?;
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("rps12.50_lat-"));
        assert_eq!(vec![300, 100, 200], read_latencies(&path)?);
        std::fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn endpoints_file() -> Result<()> {
        let file = std::env::temp_dir().join(format!("endpoints-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &file,
            r#"[{"hostname": "helloworld.default.example.com"},
                {"hostname": "pipeline.default.example.com", "eventing": true,
                 "matchers": {"type": "done"}}]"#,
        )?;
        let endpoints = read_endpoints(&file)?;
        assert_eq!(2, endpoints.len());
        assert!(!endpoints[0].eventing);
        assert!(endpoints[1].eventing);
        std::fs::remove_file(file)?;
        Ok(())
    }

    #[tokio::test]
    async fn experiment_issues_round_robin() -> Result<()> {
        let invoker = Arc::new(LocalInvoker::new());
        invoker.register("hello:80", Arc::new(HelloWorld::default()))?;
        invoker.register("events:80", Arc::new(HelloWorld::default()))?;
        let endpoints = vec![
            Endpoint {
                hostname: "hello".to_string(),
                eventing: false,
            },
            Endpoint {
                hostname: "events".to_string(),
                eventing: true,
            },
        ];
        let config = ExperimentConfig {
            rps:      50.0,
            duration: Duration::from_millis(500),
            port:     80,
            request:  json!({"name": "faas"}),
        };

        let report = run_experiment(invoker, &endpoints, &config).await?;
        assert!(report.issued >= 4);
        assert!(report.completed <= report.issued);
        assert_eq!(0, report.failed);
        // Only the serving endpoint, every other request, is measured.
        assert!(report.latencies.len() as u64 <= report.issued / 2 + 1);
        assert!(report.real_rps > 0.0);
        Ok(())
    }

    #[test]
    fn request_rate_bounds() -> Result<()> {
        assert_eq!(Duration::from_millis(20), tick_period(50.0)?);
        assert_eq!(Duration::from_nanos(1), tick_period(1e9)?);
        for rps in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e10, 1e-30] {
            assert!(matches!(tick_period(rps), Err(FaasError::InvalidInput(_))), "{}", rps);
        }
        Ok(())
    }

    #[tokio::test]
    async fn experiment_rejects_unusable_rates() {
        let invoker = Arc::new(LocalInvoker::new());
        let endpoints = vec![Endpoint {
            hostname: "hello".to_string(),
            eventing: false,
        }];
        for rps in [f64::INFINITY, 1e10, 1e-30] {
            let config = ExperimentConfig {
                rps,
                ..ExperimentConfig::default()
            };
            assert!(matches!(
                run_experiment(invoker.clone(), &endpoints, &config).await,
                Err(FaasError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn experiment_needs_endpoints() {
        let invoker = Arc::new(LocalInvoker::new());
        let config = ExperimentConfig::default();
        assert!(matches!(
            run_experiment(invoker, &[], &config).await,
            Err(FaasError::InvalidInput(_))
        ));
    }
}
