// Copyright 2025 forkrpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line arguments and their mapping onto library configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use serde_json::Value;

use forkrpc_client::ClientConfig;
use forkrpc_common::registry::{RegistryConfig, DEFAULT_REGISTRY_HOSTS};
use forkrpc_server::ServerConfig;

/// Environment variable consulted when `--registry` is absent
pub const REGISTRY_ENV: &str = "FORKRPC_REGISTRY";

#[derive(FromArgs, Debug)]
/// forkrpc - pre-forked RPC servers with registry-driven discovery
pub struct Cli {
    #[argh(subcommand)]
    pub command: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
    Bench(BenchArgs),
}

/// Arguments for starting a server group.
///
/// # Example
///
/// ```bash
/// forkrpc serve 127.0.0.1 8080 --workers 4 --registry 10.0.0.2:2181
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "serve")]
/// start a server group: one supervisor and its worker processes
pub struct ServeArgs {
    /// host to bind and to publish in the registry
    #[argh(positional)]
    pub host: String,

    /// port to bind; 0 picks a free one
    #[argh(positional)]
    pub port: u16,

    /// number of worker processes
    #[argh(option, short = 'w', default = "10")]
    pub workers: usize,

    /// registry servers as a comma separated host:port list
    #[argh(option)]
    pub registry: Option<String>,

    /// registry path under which servers register
    #[argh(option, default = "String::from(\"/demo\")")]
    pub root: String,

    /// registry session timeout in milliseconds
    #[argh(option, default = "10000")]
    pub session_timeout_ms: u64,

    /// time workers get to exit after SIGTERM, in milliseconds
    #[argh(option, default = "5000")]
    pub shutdown_grace_ms: u64,

    /// host to publish instead of the bind host
    #[argh(option)]
    pub advertise_host: Option<String>,
}

impl ServeArgs {
    pub fn to_config(&self, env_registry: Option<String>) -> ServerConfig {
        let mut config = ServerConfig::new(&self.host, self.port)
            .with_workers(self.workers)
            .with_registry(registry_config(
                self.registry.clone(),
                env_registry,
                &self.root,
                self.session_timeout_ms,
            ))
            .with_shutdown_grace(Duration::from_millis(self.shutdown_grace_ms));
        if let Some(host) = &self.advertise_host {
            config = config.with_advertise_host(host);
        }
        config
    }
}

/// Arguments for making a single RPC call.
///
/// Outputs the raw JSON result on stdout, so it can be piped.
///
/// # Examples
///
/// ```bash
/// forkrpc call ping '"hello"'
/// forkrpc call fibonaqi 10 | jq .
/// ```
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "call")]
/// call an RPC method on a random live server
pub struct CallArgs {
    /// name of the RPC method to call
    #[argh(positional)]
    pub method: String,

    /// parameters for the method as JSON; defaults to null
    #[argh(positional)]
    pub params: Option<String>,

    /// registry servers as a comma separated host:port list
    #[argh(option)]
    pub registry: Option<String>,

    /// registry path under which servers register
    #[argh(option, default = "String::from(\"/demo\")")]
    pub root: String,

    /// per-read and per-write timeout in milliseconds; none by default
    #[argh(option)]
    pub io_timeout_ms: Option<u64>,
}

impl CallArgs {
    pub fn params(&self) -> Result<Value> {
        match &self.params {
            Some(raw) => serde_json::from_str(raw).with_context(|| format!("Invalid JSON in params: {}", raw)),
            None => Ok(Value::Null),
        }
    }

    pub fn to_config(&self, env_registry: Option<String>) -> ClientConfig {
        client_config(
            self.registry.clone(),
            env_registry,
            &self.root,
            self.io_timeout_ms,
        )
    }
}

/// Arguments for the demo client loop.
///
/// Each iteration sends `ping("ireader <i>")`, `pi(<i>)` and
/// `fibonaqi(<fib-n>)`, each to a random live server, pausing before every
/// call. The loop stops early when no server is left.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "bench")]
/// run the ping / pi / fibonaqi demo loop against random servers
pub struct BenchArgs {
    /// number of iterations
    #[argh(option, short = 'n', default = "100")]
    pub iterations: u64,

    /// pause before each call in milliseconds
    #[argh(option, default = "500")]
    pub interval_ms: u64,

    /// argument of every fibonaqi call
    #[argh(option, default = "32")]
    pub fib_n: i64,

    /// registry servers as a comma separated host:port list
    #[argh(option)]
    pub registry: Option<String>,

    /// registry path under which servers register
    #[argh(option, default = "String::from(\"/demo\")")]
    pub root: String,

    /// per-read and per-write timeout in milliseconds; none by default
    #[argh(option)]
    pub io_timeout_ms: Option<u64>,
}

impl BenchArgs {
    pub fn to_config(&self, env_registry: Option<String>) -> ClientConfig {
        client_config(
            self.registry.clone(),
            env_registry,
            &self.root,
            self.io_timeout_ms,
        )
    }
}

/// The flag wins over the environment, the environment over the default.
pub fn registry_hosts(flag: Option<String>, env: Option<String>) -> String {
    flag.or(env)
        .filter(|hosts| !hosts.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_REGISTRY_HOSTS.to_string())
}

fn registry_config(flag: Option<String>, env: Option<String>, root: &str, session_timeout_ms: u64) -> RegistryConfig {
    RegistryConfig::default()
        .with_hosts(registry_hosts(flag, env))
        .with_root(root)
        .with_session_timeout(Duration::from_millis(session_timeout_ms))
}

fn client_config(flag: Option<String>, env: Option<String>, root: &str, io_timeout_ms: Option<u64>) -> ClientConfig {
    let registry = RegistryConfig::default()
        .with_hosts(registry_hosts(flag, env))
        .with_root(root);
    ClientConfig::default()
        .with_registry(registry)
        .with_io_timeout(io_timeout_ms.map(Duration::from_millis))
}
