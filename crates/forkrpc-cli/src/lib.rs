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

//! # forkrpc CLI
//!
//! Command-line interface for forkrpc servers and clients.
//!
//! ## Key Commands
//!
//! - `forkrpc serve <host> <port>`: start a supervised group of worker processes
//!   and register it in the registry
//! - `forkrpc call <method> [params]`: make one call against a random live
//!   server (outputs raw JSON for scripting)
//! - `forkrpc bench`: the demo client loop of `ping`, `pi` and `fibonaqi`
//!   calls against random servers
//!
//! The registry address comes from `--registry`, then the `FORKRPC_REGISTRY`
//! environment variable, then `127.0.0.1:2181`.

pub mod args;
pub mod bench;
