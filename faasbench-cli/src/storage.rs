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


//! Reads and writes objects in the configured object store, and stages the
//! input of map-reduce jobs.

use anyhow::{anyhow, bail, Context as _, Result};
use clap::{Arg, ArgMatches, Command};
use faasbench::aws::s3;
use faasbench::mapreduce::JobConfig;
use faasbench::prelude::*;
use std::collections::HashMap;
use std::path::Path;

pub async fn command(matches: &ArgMatches) -> Result<()> {
    let (command, matches) = match matches.subcommand() {
        Some(subcommand) => subcommand,
        None => bail!(command_args().render_usage()),
    };
    if let "create-bucket" | "delete-bucket" = command {
        return bucket_command(command, matches)
            .await
            .with_context(|| anyhow!("{} command failed", command));
    }

    let mut storage = match matches.value_of("transfer") {
        Some(transfer) => match transfer.parse::<TransferType>()? {
            TransferType::Elasticache => {
                Storage::init(TransferType::Elasticache, &FAASBENCH_REDIS_URL).await?
            }
            transfer => Storage::init(transfer, &FAASBENCH_BUCKET).await?,
        },
        None => Storage::from_env().await?,
    };
    if let Some(bucket) = matches.value_of("bucket") {
        storage = storage.with_bucket(bucket);
    }
    let storage = storage.with_role("Cli");

    match command {
        "put" => put(&storage, matches).await,
        "get" => get(&storage, matches).await,
        "list" => list(&storage, matches).await,
        "delete" => delete(&storage, matches).await,
        "stage" => stage_command(&storage, matches).await,
        _ => bail!(command_args().render_usage()),
    }
    .with_context(|| anyhow!("{} command failed", command))
}

pub fn command_args() -> Command<'static> {
    let key = || {
        Arg::new("key")
            .help("The object key")
            .required(true)
            .takes_value(true)
    };
    Command::new("storage")
        .about("Reads and writes objects in the object store")
        .subcommand_required(true)
        .subcommand(
            Command::new("put")
                .about("Uploads a local file")
                .arg(
                    Arg::new("path")
                        .help("The local file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("key")
                        .short('k')
                        .long("key")
                        .help("Sets the object key [default: the file name]")
                        .takes_value(true),
                ),
        )
        .subcommand(
            Command::new("get")
                .about("Downloads an object to stdout or a file")
                .arg(key())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .takes_value(true),
                ),
        )
        .subcommand(
            Command::new("list")
                .about("Lists the objects under a prefix")
                .arg(Arg::new("prefix").takes_value(true).default_value("")),
        )
        .subcommand(Command::new("delete").about("Deletes an object").arg(key()))
        .subcommand(Command::new("create-bucket").about("Creates the S3 bucket unless it exists"))
        .subcommand(Command::new("delete-bucket").about("Deletes the empty S3 bucket"))
        .subcommand(
            Command::new("stage")
                .about("Splits a local log file into the inputs of a map-reduce job")
                .arg(
                    Arg::new("path")
                        .help("The local file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::new("mappers")
                        .short('m')
                        .long("mappers")
                        .help("Sets the number of input parts [default: from the config]")
                        .takes_value(true),
                ),
        )
        .args(storage_args())
}

fn storage_args() -> Vec<Arg<'static>> {
    vec![
        Arg::new("transfer")
            .short('t')
            .long("transfer")
            .help("Sets the storage backend [default: from the config]")
            .possible_values(["S3", "ELASTICACHE"])
            .ignore_case(true)
            .global(true)
            .takes_value(true),
        Arg::new("bucket")
            .short('b')
            .long("bucket")
            .help("Sets the bucket [default: from the config]")
            .global(true)
            .takes_value(true),
    ]
}

/// The bucket named by `--bucket`, or the configured one.
pub fn bucket_name(matches: &ArgMatches) -> Result<&str> {
    if let Some(transfer) = matches.value_of("transfer") {
        if transfer.parse::<TransferType>()? != TransferType::S3 {
            bail!("Buckets are managed on S3 only, not {}", transfer);
        }
    }
    Ok(matches.value_of("bucket").unwrap_or(&FAASBENCH_BUCKET))
}

async fn bucket_command(command: &str, matches: &ArgMatches) -> Result<()> {
    let bucket = bucket_name(matches)?;
    let client = s3::default_client()?;
    if command == "create-bucket" {
        s3::create_bucket_if_missing(&client, bucket).await?;
        println!("Created bucket {}", bucket);
    } else {
        s3::delete_bucket(&client, bucket).await?;
        println!("Deleted bucket {}", bucket);
    }
    Ok(())
}

async fn put(storage: &Storage, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("path")
        .ok_or_else(|| anyhow!("No file provided"))?;
    let key = match matches.value_of("key") {
        Some(key) => key.to_string(),
        None => Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} is not a file", path))?,
    };
    let body = tokio::fs::read(path)
        .await
        .with_context(|| anyhow!("Failed to read {}", path))?;
    let size = body.len();
    storage.put(&key, body).await?;
    println!("{}/{} ({} bytes)", storage.bucket(), key, size);
    Ok(())
}

async fn get(storage: &Storage, matches: &ArgMatches) -> Result<()> {
    let key = matches
        .value_of("key")
        .ok_or_else(|| anyhow!("No key provided"))?;
    let body = storage.get(key).await?;
    match matches.value_of("output") {
        Some(output) => tokio::fs::write(output, &body).await?,
        None => println!("{}", String::from_utf8_lossy(&body)),
    }
    Ok(())
}

async fn list(storage: &Storage, matches: &ArgMatches) -> Result<()> {
    let prefix = matches.value_of("prefix").unwrap_or_default();
    for object in storage.list(prefix).await? {
        println!("{:>12}  {}", object.size, object.key);
    }
    Ok(())
}

async fn delete(storage: &Storage, matches: &ArgMatches) -> Result<()> {
    let key = matches
        .value_of("key")
        .ok_or_else(|| anyhow!("No key provided"))?;
    storage.delete(key).await?;
    Ok(())
}

async fn stage_command(storage: &Storage, matches: &ArgMatches) -> Result<()> {
    let path = matches
        .value_of("path")
        .ok_or_else(|| anyhow!("No file provided"))?;
    let parts = match matches.value_of("mappers") {
        Some(mappers) => mappers
            .parse::<usize>()
            .with_context(|| anyhow!("Invalid number of mappers: {}", mappers))?,
        None => *FAASBENCH_NUM_MAPPERS,
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| anyhow!("Failed to read {}", path))?;
    for key in stage(storage, &FAASBENCH_MR_INPUT_PREFIX, &text, parts).await? {
        println!("{}/{}", storage.bucket(), key);
    }
    Ok(())
}

/// Splits `text` into `parts` runs of whole lines, sized as evenly as
/// possible. Trailing parts are empty when there are fewer lines than parts.
pub fn split_lines(text: &str, parts: usize) -> Vec<String> {
    let lines = text.lines().collect::<Vec<_>>();
    let per_part = (lines.len() + parts.max(1) - 1) / parts.max(1);
    let mut chunks = lines
        .chunks(per_part.max(1))
        .map(|chunk| chunk.join("\n"))
        .collect::<Vec<_>>();
    chunks.resize(parts, String::new());
    chunks
}

/// Uploads the input parts of a map-reduce job to the storage bucket and
/// returns their keys.
pub async fn stage(storage: &Storage, prefix: &str, text: &str, parts: usize) -> Result<Vec<String>> {
    if parts == 0 {
        bail!("A job needs at least one input part");
    }
    let mut keys = Vec::with_capacity(parts);
    for (i, part) in split_lines(text, parts).into_iter().enumerate() {
        let key = format!("{}{}", prefix, JobConfig::input_key(i));
        let metadata = HashMap::from([(
            "linecount".to_string(),
            part.lines().count().to_string(),
        )]);
        storage
            .put_with_metadata(&key, part.into_bytes(), metadata)
            .await?;
        keys.push(key);
    }
    Ok(keys)
}
