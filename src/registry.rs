use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct Inner {
    next_id: AtomicU64,
    // maps peer -> (registration id, close trigger)
    connections: Mutex<HashMap<SocketAddr, (u64, oneshot::Sender<()>)>>,
}

/// Keeps track of the live connections, so they can be closed on shutdown
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Inner>,
}

/// A live connection's entry in the registry
///
/// the entry is removed from the registry once this is dropped.
#[derive(Debug)]
pub struct Registration {
    registry: ConnectionRegistry,
    peer: SocketAddr,
    id: u64,
    close: oneshot::Receiver<()>,
    closed: bool,
}

impl ConnectionRegistry {
    pub fn register(&self, peer: SocketAddr) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        self.connections().insert(peer, (id, tx));

        Registration {
            registry: self.clone(),
            peer,
            id,
            close: rx,
            closed: false,
        }
    }

    /// Asks every registered connection to close
    ///
    /// returns the number of connections that were notified.
    pub fn close_all(&self) -> usize {
        let connections: Vec<_> = self.connections().drain().collect();

        let count = connections.len();
        for (peer, (_, close)) in connections {
            tracing::debug!("closing the connection with {}", peer);
            // the handler may have already returned
            let _ = close.send(());
        }

        count
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.connections().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, peer: &SocketAddr, id: u64) {
        let mut connections = self.connections();
        // the address may have been reused by a newer connection
        if matches!(connections.get(peer), Some((current, _)) if *current == id) {
            connections.remove(peer);
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<SocketAddr, (u64, oneshot::Sender<()>)>> {
        // the map stays consistent even if a holder panicked
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Registration {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Resolves once the registry asks this connection to close
    ///
    /// cancel safe.
    pub async fn closed(&mut self) {
        if !self.closed {
            // a dropped sender means the registry let go of us, treat it the same
            let _ = (&mut self.close).await;
            self.closed = true;
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.peer, self.id);
    }
}
