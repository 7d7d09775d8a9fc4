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

//! # forkrpc CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Start a server group of 10 workers on port 8080
//! forkrpc serve 127.0.0.1 8080
//!
//! # Make an RPC call (outputs raw JSON)
//! forkrpc call pi 1000
//!
//! # Run the demo loop
//! forkrpc bench --iterations 10 --interval-ms 100
//! ```
//!
//! `serve` re-executes this binary once per worker; the children find their
//! role in the environment and never reach the supervisor code path.

use std::env;
use std::io;

use anyhow::{Context, Result};

use forkrpc_cli::args::{BenchArgs, CallArgs, Cli, Commands, ServeArgs, REGISTRY_ENV};
use forkrpc_cli::bench::{run_bench, BenchOptions};
use forkrpc_client::ForkrpcClient;

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // `call` keeps stdout and stderr clean for piping.
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let env_registry = env::var(REGISTRY_ENV).ok();
    match cli.command {
        Commands::Serve(args) => run_serve(args, env_registry),
        Commands::Call(args) => run_call(args, env_registry),
        Commands::Bench(args) => run_bench_command(args, env_registry),
    }
}

fn run_serve(args: ServeArgs, env_registry: Option<String>) -> Result<()> {
    let config = args.to_config(env_registry);
    tracing::info!(
        bind = %config.bind_addr(),
        workers = config.workers,
        registry = %config.registry.hosts,
        "Starting forkrpc server"
    );
    forkrpc_server::serve(config).context("server failed")?;
    Ok(())
}

/// Executes the `call` subcommand: prints the raw JSON result to stdout.
fn run_call(args: CallArgs, env_registry: Option<String>) -> Result<()> {
    let params = args.params()?;
    let client = ForkrpcClient::connect(args.to_config(env_registry))
        .context("cannot reach the registry")?;

    let outcome = client.call(&args.method, params);
    client.close()?;
    let (_tag, result) = outcome?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

fn run_bench_command(args: BenchArgs, env_registry: Option<String>) -> Result<()> {
    let client = ForkrpcClient::connect(args.to_config(env_registry))
        .context("cannot reach the registry")?;

    let summary = run_bench(&client, &BenchOptions::from(&args), &mut io::stdout().lock())?;
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        stopped_early = summary.stopped_early,
        "Bench finished"
    );

    client.close()?;
    Ok(())
}
