//! The client's view of live server groups.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;

use forkrpc_common::transport::TcpTransport;
use forkrpc_common::InstanceAddr;

use crate::endpoint::RemoteEndpoint;

/// Addresses to add to and remove from a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableDiff {
    pub added: Vec<InstanceAddr>,
    pub removed: Vec<InstanceAddr>,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes `fetched \ known` and `known \ fetched`, each sorted.
pub fn diff<'a, K, F>(known: K, fetched: F) -> TableDiff
where
    K: IntoIterator<Item = &'a InstanceAddr>,
    F: IntoIterator<Item = &'a InstanceAddr>,
{
    let known: BTreeSet<&InstanceAddr> = known.into_iter().collect();
    let fetched: BTreeSet<&InstanceAddr> = fetched.into_iter().collect();

    TableDiff {
        added: fetched.difference(&known).map(|addr| (*addr).clone()).collect(),
        removed: known.difference(&fetched).map(|addr| (*addr).clone()).collect(),
    }
}

/// Live endpoints keyed by address.
///
/// Cloning shares the table. One lock covers reconciliation and selection, so
/// a reader never sees a half-applied update. Selection hands out an
/// `Arc<RemoteEndpoint>` and releases the lock before any I/O happens.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    endpoints: Arc<Mutex<HashMap<InstanceAddr, Arc<RemoteEndpoint>>>>,
    transport: TcpTransport,
}

impl EndpointTable {
    /// An empty table whose endpoints connect with `transport`.
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            endpoints: Arc::new(Mutex::new(HashMap::new())),
            transport,
        }
    }

    /// Makes the table's key set equal `fetched`.
    ///
    /// Endpoints that stay keep their connections. New endpoints start
    /// unconnected. Removed endpoints are retired, which drops their
    /// connections. Reconciling the same set twice changes nothing.
    pub fn reconcile(&self, fetched: &[InstanceAddr]) -> TableDiff {
        let mut retired = Vec::new();
        let changes = {
            let mut endpoints = self.endpoints.lock();
            let changes = diff(endpoints.keys(), fetched);

            for addr in &changes.removed {
                if let Some(endpoint) = endpoints.remove(addr) {
                    retired.push(endpoint);
                }
            }
            for addr in &changes.added {
                let endpoint = RemoteEndpoint::new(addr.clone(), self.transport.clone());
                endpoints.insert(addr.clone(), Arc::new(endpoint));
            }
            changes
        };

        for endpoint in retired {
            endpoint.retire();
        }
        changes
    }

    /// A uniformly random live endpoint.
    pub fn random(&self) -> Option<Arc<RemoteEndpoint>> {
        let endpoints = self.endpoints.lock();
        if endpoints.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..endpoints.len());
        endpoints.values().nth(index).cloned()
    }

    pub fn get(&self, addr: &InstanceAddr) -> Option<Arc<RemoteEndpoint>> {
        self.endpoints.lock().get(addr).cloned()
    }

    /// Snapshot of the live addresses, sorted.
    pub fn addrs(&self) -> Vec<InstanceAddr> {
        let mut addrs: Vec<InstanceAddr> = self.endpoints.lock().keys().cloned().collect();
        addrs.sort();
        addrs
    }

    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.lock().is_empty()
    }

    /// Retires every endpoint and empties the table.
    pub fn clear(&self) {
        let drained: Vec<_> = self.endpoints.lock().drain().map(|(_, endpoint)| endpoint).collect();
        for endpoint in drained {
            endpoint.retire();
        }
    }
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self::new(TcpTransport::new())
    }
}
