//! Per-socket subscription registry: `{jobId -> set<socket>}` plus the
//! reverse `{socket -> set<jobId>}` index for O(1) disconnect cleanup
//! (SPEC_FULL.md §5). Mutated only within the Gateway process.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::gateway::types::ServerMessage;

pub type ConnId = Uuid;

#[derive(Default)]
struct Inner {
    job_to_sockets: HashMap<Uuid, HashSet<ConnId>>,
    socket_to_jobs: HashMap<ConnId, HashSet<Uuid>>,
    senders: HashMap<ConnId, UnboundedSender<ServerMessage>>,
}

pub struct Registry {
    inner: RwLock<Inner>,
    connection_count: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            connection_count: AtomicU64::new(0),
        }
    }

    pub fn register(&self, conn_id: ConnId, sender: UnboundedSender<ServerMessage>) {
        let mut inner = self.inner.write().unwrap();
        inner.senders.insert(conn_id, sender);
        inner.socket_to_jobs.entry(conn_id).or_default();
        self.connection_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscribe(&self, conn_id: ConnId, job_id: Uuid) {
        let mut inner = self.inner.write().unwrap();
        inner.job_to_sockets.entry(job_id).or_default().insert(conn_id);
        inner.socket_to_jobs.entry(conn_id).or_default().insert(job_id);
    }

    pub fn unsubscribe(&self, conn_id: ConnId, job_id: Uuid) {
        let mut inner = self.inner.write().unwrap();
        if let Some(sockets) = inner.job_to_sockets.get_mut(&job_id) {
            sockets.remove(&conn_id);
            if sockets.is_empty() {
                inner.job_to_sockets.remove(&job_id);
            }
        }
        if let Some(jobs) = inner.socket_to_jobs.get_mut(&conn_id) {
            jobs.remove(&job_id);
        }
    }

    /// Removes every trace of `conn_id`, both directions, in one pass.
    pub fn disconnect(&self, conn_id: ConnId) {
        let mut inner = self.inner.write().unwrap();
        if let Some(jobs) = inner.socket_to_jobs.remove(&conn_id) {
            for job_id in jobs {
                if let Some(sockets) = inner.job_to_sockets.get_mut(&job_id) {
                    sockets.remove(&conn_id);
                    if sockets.is_empty() {
                        inner.job_to_sockets.remove(&job_id);
                    }
                }
            }
        }
        inner.senders.remove(&conn_id);
        self.connection_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Fan-out: pushes `message` to every socket currently subscribed to
    /// `job_id`. Delivery is at-most-once and best-effort; a send failure
    /// (socket already gone) is silently dropped, not retried.
    pub fn push_to_job(&self, job_id: Uuid, message: ServerMessage) {
        let inner = self.inner.read().unwrap();
        if let Some(sockets) = inner.job_to_sockets.get(&job_id) {
            for conn_id in sockets {
                if let Some(sender) = inner.senders.get(conn_id) {
                    let _ = sender.send(message.clone());
                }
            }
        }
    }

    /// Unicasts to a single connection, used for pings, pongs and
    /// protocol-error replies that aren't keyed by job.
    pub fn send_to(&self, conn_id: ConnId, message: ServerMessage) {
        let inner = self.inner.read().unwrap();
        if let Some(sender) = inner.senders.get(&conn_id) {
            let _ = sender.send(message);
        }
    }

    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.inner
            .read()
            .unwrap()
            .job_to_sockets
            .get(&job_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn disconnect_cleans_both_indices() {
        let registry = Registry::new();
        let conn = Uuid::new_v4();
        let job = Uuid::new_v4();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register(conn, tx);
        registry.subscribe(conn, job);
        assert_eq!(registry.subscriber_count(job), 1);

        registry.disconnect(conn);
        assert_eq!(registry.subscriber_count(job), 0);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_job() {
        let registry = Registry::new();
        let conn = Uuid::new_v4();
        let (job_a, job_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register(conn, tx);
        registry.subscribe(conn, job_a);
        registry.subscribe(conn, job_b);
        registry.unsubscribe(conn, job_a);

        assert_eq!(registry.subscriber_count(job_a), 0);
        assert_eq!(registry.subscriber_count(job_b), 1);
    }

    #[test]
    fn push_reaches_all_subscribers() {
        let registry = Registry::new();
        let job = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (conn1, conn2) = (Uuid::new_v4(), Uuid::new_v4());

        registry.register(conn1, tx1);
        registry.register(conn2, tx2);
        registry.subscribe(conn1, job);
        registry.subscribe(conn2, job);

        registry.push_to_job(job, ServerMessage::Pong);

        assert!(matches!(rx1.try_recv().unwrap(), ServerMessage::Pong));
        assert!(matches!(rx2.try_recv().unwrap(), ServerMessage::Pong));
    }
}
