//! Bounded round-robin connection pool

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::{Connection, ConnectionFactory};
use crate::host::HostDescription;

struct PoolState {
    connections: Vec<Arc<dyn Connection>>,
    cursor: usize,
}

/// Reusable connections to one host, capped at a configured maximum.
///
/// Acquisition grows the pool until the cap is reached, then rotates over
/// the existing connections. The critical section covers only the list and
/// cursor update; connections are created unopened, so no I/O ever happens
/// under the lock.
pub struct ConnectionPool {
    host: HostDescription,
    max_connections: usize,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    /// Create an empty pool for `host`
    pub fn new(
        host: HostDescription,
        max_connections: usize,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            host,
            max_connections: max_connections.max(1),
            factory,
            state: Mutex::new(PoolState {
                connections: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Next connection in rotation, creating one while below the cap.
    ///
    /// The cursor advances on every call regardless of which branch ran.
    pub fn connection(&self) -> Arc<dyn Connection> {
        let mut state = self.state.lock();
        let connection = if state.connections.len() < self.max_connections {
            let connection = self.factory.create(&self.host);
            state.connections.push(Arc::clone(&connection));
            debug!(
                host = %self.host,
                pooled = state.connections.len(),
                "created pooled connection"
            );
            connection
        } else {
            let index = state.cursor % state.connections.len();
            Arc::clone(&state.connections[index])
        };
        state.cursor = state.cursor.wrapping_add(1);
        connection
    }

    /// Number of connections currently held
    pub fn active(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Close and drop every held connection.
    ///
    /// Callers are expected to have drained outstanding requests; anything
    /// still in flight fails with a transport error.
    pub async fn close(&self) {
        let connections = {
            let mut state = self.state.lock();
            state.cursor = 0;
            std::mem::take(&mut state.connections)
        };
        if !connections.is_empty() {
            debug!(host = %self.host, count = connections.len(), "closing pooled connections");
        }
        for connection in connections {
            connection.close().await;
        }
    }
}
