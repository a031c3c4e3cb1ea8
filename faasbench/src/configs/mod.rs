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


//! This module provides various default configurations for faasbench.
//!
//! Every setting comes from the built-in `config.toml` and can be overridden
//! by an environment variable, which is how the functions are configured
//! inside containers.

mod faasbench;
pub use self::faasbench::FAASBENCH_CONF;

use lazy_static::lazy_static;
use log::warn;
use rusoto_core::Region;
use rusoto_lambda::LambdaClient;
use std::str::FromStr;

/// Returns the value of the environment variable `env` if it is set and not
/// empty, the built-in setting `section.key` otherwise.
pub fn setting(env: &str, section: &str, key: &str) -> String {
    match std::env::var(env) {
        Ok(value) if !value.is_empty() => value,
        _ => FAASBENCH_CONF[section][key].to_string(),
    }
}

/// Like [`setting`], but parses the value. An override that fails to parse is
/// ignored in favour of the built-in value.
pub fn parsed_setting<T>(env: &str, section: &str, key: &str) -> T
where
    T: FromStr,
    T::Err: std::fmt::Debug,
{
    if let Ok(value) = std::env::var(env) {
        if !value.is_empty() {
            match value.parse::<T>() {
                Ok(v) => return v,
                Err(e) => warn!("Ignoring {}={}: {:?}", env, value, e),
            }
        }
    }
    FAASBENCH_CONF[section][key].parse::<T>().unwrap()
}

lazy_static! {
    /// The name of the benchmark function served by this process.
    pub static ref FAASBENCH_FUNCTION_NAME: String = setting("FUNCTION_NAME", "function", "name");
    /// `http` or `lambda`.
    pub static ref FAASBENCH_FUNCTION_MODE: String = setting("FUNCTION_MODE", "function", "mode");
    /// The port the function server listens on.
    pub static ref FAASBENCH_FUNCTION_PORT: u16 = parsed_setting("PORT", "function", "port");
    /// The maximum number of requests served concurrently.
    pub static ref FAASBENCH_MAX_CONCURRENCY: usize = parsed_setting("MAX_SERVER_THREADS", "function", "max_concurrency");
    /// Directory for objects fetched by the functions.
    pub static ref FAASBENCH_TEMP_DIR: String = setting("TEMP_DIR", "function", "temp_dir");

    /// The storage transfer type.
    pub static ref FAASBENCH_TRANSFER_TYPE: String = setting("TRANSFER_TYPE", "storage", "transfer_type");
    /// The default storage bucket.
    pub static ref FAASBENCH_BUCKET: String = setting("BUCKET", "storage", "bucket");

    /// AWS region of the S3 client.
    pub static ref FAASBENCH_S3_REGION: String = setting("AWS_REGION", "s3", "region");
    /// Custom S3 endpoint, e.g. a MinIO address.
    pub static ref FAASBENCH_S3_ENDPOINT: String = setting("MINIO_ADDRESS", "s3", "endpoint");

    /// Redis (ElastiCache) URL.
    pub static ref FAASBENCH_REDIS_URL: String = setting("REDIS_URL", "redis", "url");

    /// Zipkin collector endpoint.
    pub static ref FAASBENCH_ZIPKIN_URL: String = setting("ZIPKIN_URL", "tracing", "zipkin_url");
    /// Fraction of traces sampled by the custom tracer.
    pub static ref FAASBENCH_TRACE_SAMPLE_RATE: f64 = parsed_setting("TRACE_SAMPLE_RATE", "tracing", "sample_rate");
    /// Maximum number of spans in one export request.
    pub static ref FAASBENCH_MAX_EXPORT_BATCH: usize = FAASBENCH_CONF["tracing"]["max_export_batch_size"].parse::<usize>().unwrap();
    /// Milliseconds between two scheduled exports.
    pub static ref FAASBENCH_EXPORT_DELAY: u64 = FAASBENCH_CONF["tracing"]["scheduled_delay"].parse::<u64>().unwrap();

    /// AWS Lambda function async invocation.
    pub static ref FAASBENCH_LAMBDA_ASYNC_CALL: String = "Event".to_string();
    /// AWS Lambda function sync invocation.
    pub static ref FAASBENCH_LAMBDA_SYNC_CALL: String = "RequestResponse".to_string();
    /// AWS Lambda function maximum error retry.
    pub static ref FAASBENCH_LAMBDA_MAX_RETRIES: usize = FAASBENCH_CONF["lambda"]["max_invoke_retries"].parse::<usize>().unwrap();
    /// AWS Lambda function maximum backoff in milliseconds.
    pub static ref FAASBENCH_LAMBDA_MAX_BACKOFF: u64 = FAASBENCH_CONF["lambda"]["max_backoff"].parse::<u64>().unwrap();

    /// `http`, `lambda` or `local`.
    pub static ref FAASBENCH_INVOKER: String = setting("INVOKER", "invoker", "kind");
    /// Invocation timeout in seconds.
    pub static ref FAASBENCH_INVOKE_TIMEOUT: u64 = parsed_setting("INVOKE_TIMEOUT", "invoker", "timeout");

    /// Number of mappers started by the map-reduce driver.
    pub static ref FAASBENCH_NUM_MAPPERS: usize = parsed_setting("NUM_MAPPERS", "mapreduce", "num_mappers");
    /// Number of reducers started by the map-reduce driver.
    pub static ref FAASBENCH_NUM_REDUCERS: usize = parsed_setting("NUM_REDUCERS", "mapreduce", "num_reducers");
    /// Largest `nReducers` a mapper accepts.
    pub static ref FAASBENCH_MAX_REDUCERS: u32 = parsed_setting("MAX_REDUCERS", "mapreduce", "max_reducers");
    /// Address of the mapper function.
    pub static ref FAASBENCH_MAPPER_ADDR: String = setting("MAPPER_ADDR", "mapreduce", "mapper_addr");
    /// Address of the reducer function.
    pub static ref FAASBENCH_REDUCER_ADDR: String = setting("REDUCER_ADDR", "mapreduce", "reducer_addr");

    /// Address of the consumer function.
    pub static ref FAASBENCH_CONSUMER_ADDR: String = setting("CONSUMER_ADDR", "chain", "consumer_addr");
    /// Size of the payload sent from the producer to the consumer.
    pub static ref FAASBENCH_PAYLOAD_SIZE: usize = parsed_setting("PAYLOAD_SIZE", "chain", "payload_size");
    /// Bucket the producer stores payloads in.
    pub static ref FAASBENCH_CHAIN_BUCKET: String = setting("BUCKET", "chain", "bucket");
    /// Object key of the payload stored by the producer.
    pub static ref FAASBENCH_PAYLOAD_KEY: String = FAASBENCH_CONF["chain"]["payload_key"].to_string();

    /// Bucket holding the map-reduce input.
    pub static ref FAASBENCH_MR_SRC_BUCKET: String = setting("SRC_BUCKET", "mapreduce", "src_bucket");
    /// Bucket receiving the shuffle and result objects.
    pub static ref FAASBENCH_MR_DEST_BUCKET: String = setting("DEST_BUCKET", "mapreduce", "dest_bucket");
    /// Key prefix of the map-reduce input.
    pub static ref FAASBENCH_MR_INPUT_PREFIX: String = FAASBENCH_CONF["mapreduce"]["input_prefix"].to_string();
    /// Key prefix of the mapper output.
    pub static ref FAASBENCH_MR_MAPPER_PREFIX: String = FAASBENCH_CONF["mapreduce"]["mapper_output_prefix"].to_string();
    /// Key prefix of the reducer output.
    pub static ref FAASBENCH_MR_REDUCER_PREFIX: String = FAASBENCH_CONF["mapreduce"]["reducer_output_prefix"].to_string();

    /// Default request rate of a load experiment.
    pub static ref FAASBENCH_BENCH_RPS: f64 = FAASBENCH_CONF["bench"]["rps"].parse::<f64>().unwrap();
    /// Default duration of a load experiment in seconds.
    pub static ref FAASBENCH_BENCH_DURATION: u64 = FAASBENCH_CONF["bench"]["duration"].parse::<u64>().unwrap();
    /// Default port of the benchmarked endpoints.
    pub static ref FAASBENCH_BENCH_PORT: u16 = FAASBENCH_CONF["bench"]["port"].parse::<u16>().unwrap();
    /// Default latency output file.
    pub static ref FAASBENCH_BENCH_LATENCY_FILE: String = FAASBENCH_CONF["bench"]["latency_file"].to_string();
    /// Default endpoints file.
    pub static ref FAASBENCH_BENCH_ENDPOINTS_FILE: String = FAASBENCH_CONF["bench"]["endpoints_file"].to_string();

    /// AWS Lambda client.
    pub static ref FAASBENCH_LAMBDA_CLIENT: LambdaClient = LambdaClient::new(
        FAASBENCH_S3_REGION.parse::<Region>().unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_builtin() {
        std::env::set_var("FAASBENCH_TEST_REGION", "eu-central-1");
        assert_eq!(
            "eu-central-1",
            setting("FAASBENCH_TEST_REGION", "s3", "region")
        );
        assert_eq!("us-west-1", setting("FAASBENCH_TEST_UNSET", "s3", "region"));
    }

    #[test]
    fn bad_override_falls_back() {
        std::env::set_var("FAASBENCH_TEST_MAPPERS", "many");
        let mappers: usize = parsed_setting("FAASBENCH_TEST_MAPPERS", "mapreduce", "num_mappers");
        assert_eq!(4, mappers);

        std::env::set_var("FAASBENCH_TEST_REDUCERS", "8");
        let reducers: usize =
            parsed_setting("FAASBENCH_TEST_REDUCERS", "mapreduce", "num_reducers");
        assert_eq!(8, reducers);
    }
}
