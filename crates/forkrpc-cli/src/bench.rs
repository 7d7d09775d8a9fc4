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

//! The demo client loop behind `forkrpc bench`.

use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use forkrpc_client::ForkrpcClient;

use crate::args::BenchArgs;

#[derive(Debug, Clone, PartialEq)]
pub struct BenchOptions {
    pub iterations: u64,
    pub interval: Duration,
    pub fib_n: i64,
}

impl From<&BenchArgs> for BenchOptions {
    fn from(args: &BenchArgs) -> Self {
        Self {
            iterations: args.iterations,
            interval: Duration::from_millis(args.interval_ms),
            fib_n: args.fib_n,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchSummary {
    pub succeeded: u64,
    pub failed: u64,
    /// The loop ended because no server was left
    pub stopped_early: bool,
}

/// Runs the loop, writing one line per call to `out`.
///
/// A failed call drops that endpoint's connection and the loop goes on; the
/// next call to that server reconnects.
pub fn run_bench<W: Write>(client: &ForkrpcClient, options: &BenchOptions, out: &mut W) -> Result<BenchSummary> {
    let mut summary = BenchSummary::default();

    for i in 0..options.iterations {
        let calls = [
            ("ping", json!(format!("ireader {}", i))),
            ("pi", json!(i)),
            ("fibonaqi", json!(options.fib_n)),
        ];

        for (method, params) in calls {
            let Some(endpoint) = client.random_endpoint() else {
                warn!("No live servers left, stopping");
                summary.stopped_early = true;
                return Ok(summary);
            };
            thread::sleep(options.interval);

            match endpoint.call(method, params) {
                Ok((tag, result)) => {
                    writeln!(out, "{} {} {}", endpoint.addr(), tag, result)?;
                    summary.succeeded += 1;
                }
                Err(e) => {
                    endpoint.close();
                    writeln!(out, "{} {} failed: {}", endpoint.addr(), method, e)?;
                    summary.failed += 1;
                }
            }
        }
    }

    Ok(summary)
}
