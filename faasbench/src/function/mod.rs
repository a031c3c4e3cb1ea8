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


//! The benchmark functions. Each function receives a JSON event, performs one
//! workload and answers with a JSON reply. Most of them speak the greeting
//! protocol ([`HelloRequest`] in, [`HelloReply`] out) where the names `record`
//! and `replay` select two distinct input sets, so that a warm function can be
//! measured on inputs it has not seen before.

mod aes;
mod benchmark;
mod chain;
mod chameleon;
mod hello;
mod json_serdes;

pub use self::aes::Aes;
pub use benchmark::Benchmark;
pub use chain::{Consumer, Producer};
pub use chameleon::{render_table, Chameleon};
pub use hello::HelloWorld;
pub use json_serdes::JsonSerdes;

use crate::configs::*;
use crate::error::{FaasError, Result};
use crate::invoker::{new_invoker, Invoker};
use crate::mapreduce::{Driver, JobConfig, Mapper, Reducer};
use crate::payload::HelloRequest;
use crate::storage::{Storage, TransferType};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

/// A benchmark function.
#[async_trait]
pub trait CloudFunction: Debug + Send + Sync {
    /// The name the function is deployed under.
    fn name(&self) -> &str;
    /// Handles one event.
    async fn invoke(&self, event: Value) -> Result<Value>;
}

/// The functions of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// Greets the caller.
    HelloWorld,
    /// Spins or fetches an object of a given size.
    Benchmark,
    /// Encrypts a random message.
    Aes,
    /// Parses and pretty-prints a JSON document.
    JsonSerdes,
    /// Renders an HTML table.
    Chameleon,
    /// Sends a payload to the consumer.
    Producer,
    /// Receives the producer's payload.
    Consumer,
    /// Drives a map-reduce job.
    Driver,
    /// Runs one map task.
    Mapper,
    /// Runs one reduce task.
    Reducer,
}

impl FromStr for FunctionKind {
    type Err = FaasError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "helloworld" => Ok(FunctionKind::HelloWorld),
            "benchmark" => Ok(FunctionKind::Benchmark),
            "aes" | "pyaes" => Ok(FunctionKind::Aes),
            "json-serdes" => Ok(FunctionKind::JsonSerdes),
            "chameleon" => Ok(FunctionKind::Chameleon),
            "producer" => Ok(FunctionKind::Producer),
            "consumer" => Ok(FunctionKind::Consumer),
            "mr-driver" | "driver" => Ok(FunctionKind::Driver),
            "mapper" => Ok(FunctionKind::Mapper),
            "reducer" => Ok(FunctionKind::Reducer),
            _ => Err(FaasError::InvalidInput(format!("Unknown function: {}", s))),
        }
    }
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FunctionKind::HelloWorld => "helloworld",
            FunctionKind::Benchmark => "benchmark",
            FunctionKind::Aes => "aes",
            FunctionKind::JsonSerdes => "json-serdes",
            FunctionKind::Chameleon => "chameleon",
            FunctionKind::Producer => "producer",
            FunctionKind::Consumer => "consumer",
            FunctionKind::Driver => "mr-driver",
            FunctionKind::Mapper => "mapper",
            FunctionKind::Reducer => "reducer",
        };
        write!(f, "{}", name)
    }
}

/// Which input set a greeting request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSet {
    /// `record`: the first input set.
    Record,
    /// `replay`: the second input set.
    Replay,
    /// Any other name: the first input set, greeting the name.
    Default,
}

impl InputSet {
    /// Selects the input set of a request.
    pub fn of(request: &HelloRequest) -> Self {
        match request.name.as_str() {
            "record" => InputSet::Record,
            "replay" => InputSet::Replay,
            _ => InputSet::Default,
        }
    }
}

/// The greeting answered to `name`.
pub fn greeting(name: &str) -> String {
    match name {
        "record" => "Hello, record_response!".to_string(),
        "replay" => "Hello, replay_response!".to_string(),
        _ => format!("Hello, {}!", name),
    }
}

/// What a function may use besides its event.
#[derive(Debug, Clone)]
pub struct FunctionEnv {
    /// The storage layer, absent for inline and XDT transfers.
    pub storage: Option<Storage>,
    /// How downstream functions are reached.
    pub invoker: Arc<dyn Invoker>,
}

impl FunctionEnv {
    /// Bundles a storage layer and an invoker.
    pub fn new(storage: Option<Storage>, invoker: Arc<dyn Invoker>) -> Self {
        Self { storage, invoker }
    }

    /// Builds the environment from the configured transfer type and invoker.
    pub async fn from_env() -> Result<Self> {
        let storage = match FAASBENCH_TRANSFER_TYPE.parse::<TransferType>()? {
            TransferType::Inline | TransferType::Xdt => None,
            _ => Some(Storage::from_env().await?),
        };
        Ok(Self::new(storage, new_invoker(&FAASBENCH_INVOKER)?))
    }

    /// The storage layer, or an error when the transfer type has none.
    pub fn storage(&self) -> Result<&Storage> {
        self.storage.as_ref().ok_or_else(|| {
            FaasError::Unsupported(format!(
                "{} transfer has no storage backend",
                *FAASBENCH_TRANSFER_TYPE
            ))
        })
    }
}

/// Creates a function of the given kind with the configured settings.
pub fn new_function(kind: FunctionKind, env: FunctionEnv) -> Result<Arc<dyn CloudFunction>> {
    Ok(match kind {
        FunctionKind::HelloWorld => Arc::new(HelloWorld::default()),
        FunctionKind::Benchmark => Arc::new(Benchmark::new(
            env.storage()?.clone(),
            FAASBENCH_TEMP_DIR.as_str(),
        )),
        FunctionKind::Aes => Arc::new(Aes::new()),
        FunctionKind::JsonSerdes => Arc::new(JsonSerdes::new(env.storage()?.clone())),
        FunctionKind::Chameleon => Arc::new(Chameleon::default()),
        FunctionKind::Producer => Arc::new(Producer::new(
            env,
            FAASBENCH_CONSUMER_ADDR.as_str(),
            *FAASBENCH_PAYLOAD_SIZE,
            FAASBENCH_CHAIN_BUCKET.as_str(),
        )),
        FunctionKind::Consumer => Arc::new(Consumer::new(env, FAASBENCH_CHAIN_BUCKET.as_str())),
        FunctionKind::Driver => Arc::new(Driver::new(env.invoker, JobConfig::from_env())),
        FunctionKind::Mapper => Arc::new(Mapper::new(env.storage()?.clone())),
        FunctionKind::Reducer => Arc::new(Reducer::new(env.storage()?.clone())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::LocalInvoker;

    #[test]
    fn kinds_parse_their_display_names() -> Result<()> {
        for kind in [
            FunctionKind::HelloWorld,
            FunctionKind::Benchmark,
            FunctionKind::Aes,
            FunctionKind::JsonSerdes,
            FunctionKind::Chameleon,
            FunctionKind::Producer,
            FunctionKind::Consumer,
            FunctionKind::Driver,
            FunctionKind::Mapper,
            FunctionKind::Reducer,
        ] {
            assert_eq!(kind, kind.to_string().parse::<FunctionKind>()?);
        }
        assert_eq!(FunctionKind::JsonSerdes, "json_serdes".parse()?);
        assert!("video-analytics".parse::<FunctionKind>().is_err());
        Ok(())
    }

    #[test]
    fn greetings() {
        assert_eq!("Hello, record_response!", greeting("record"));
        assert_eq!("Hello, replay_response!", greeting("replay"));
        assert_eq!("Hello, world!", greeting("world"));
        assert_eq!(
            InputSet::Replay,
            InputSet::of(&HelloRequest {
                name: "replay".to_string(),
            })
        );
    }

    #[test]
    fn storage_functions_need_storage() {
        let env = FunctionEnv::new(None, Arc::new(LocalInvoker::new()));
        assert!(matches!(
            new_function(FunctionKind::Mapper, env.clone()),
            Err(FaasError::Unsupported(_))
        ));
        assert!(new_function(FunctionKind::HelloWorld, env).is_ok());
    }
}
