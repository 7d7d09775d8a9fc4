//! forkrpc Client
//!
//! Finds live server groups through the registry and calls them over lazily
//! opened TCP connections.
//!
//! - [`DiscoveryWatcher`] keeps an [`EndpointTable`] equal to the set of
//!   registered servers
//! - [`RemoteEndpoint`] owns one connection per server, opened on first use
//!   and reopened after a failure
//! - [`ForkrpcClient`] ties both together and picks a random server per call

pub mod client;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod table;

pub use client::ForkrpcClient;
pub use config::ClientConfig;
pub use discovery::DiscoveryWatcher;
pub use endpoint::RemoteEndpoint;
pub use table::{diff, EndpointTable, TableDiff};
