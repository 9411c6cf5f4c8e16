//! An in-process fake of the coordination store, used by every test in
//! this workspace. The real backend is out of scope (`spec.md` §1).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::{
    error::{CoordinationError, Result},
    session::{self, SessionState, SessionWatch},
    CoordinationStore, NodeVersion, Watch, WatchEvent,
};

struct Node {
    data: Vec<u8>,
    version: NodeVersion,
    ephemeral: bool,
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    watchers: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
}

impl Tree {
    fn fire(&mut self, path: &str, event: WatchEvent) {
        if let Some(senders) = self.watchers.remove(path) {
            for tx in senders {
                let _ = tx.send(event);
            }
        }
    }

    fn fire_all(&mut self, event: WatchEvent) {
        for (_, senders) in self.watchers.drain() {
            for tx in senders {
                let _ = tx.send(event);
            }
        }
    }
}

/// An in-memory [`CoordinationStore`] backed by a single mutex-guarded
/// tree. Suitable for tests and for driving the scenarios in `spec.md`
/// §8 (S1–S6) deterministically.
pub struct InMemoryStore {
    tree: Mutex<Tree>,
    session_tx: tokio::sync::watch::Sender<SessionState>,
    session_watch: SessionWatch,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (session_tx, session_watch) = session::channel();
        Self {
            tree: Mutex::new(Tree::default()),
            session_tx,
            session_watch,
        }
    }

    /// Returns a cloneable handle for observing session-state transitions.
    pub fn session_watch(&self) -> SessionWatch {
        self.session_watch.clone()
    }

    /// Simulates session expiry: every ephemeral node vanishes and every
    /// outstanding watch fires with [`WatchEvent::SessionExpired`]
    /// (`spec.md` §4.1: "On EXPIRED all ephemerals vanish and all watches
    /// are invalidated").
    pub fn expire_session(&self) {
        let mut tree = self.tree.lock().expect("coordination tree lock poisoned");
        tree.nodes.retain(|_, node| !node.ephemeral);
        tree.fire_all(WatchEvent::SessionExpired);
        drop(tree);
        let _ = self.session_tx.send(SessionState::Expired);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn get(&self, path: &str) -> Result<(Vec<u8>, NodeVersion)> {
        let tree = self.tree.lock().expect("coordination tree lock poisoned");
        tree.nodes
            .get(path)
            .map(|n| (n.data.clone(), n.version))
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    async fn set_data(
        &self,
        path: &str,
        data: Vec<u8>,
        expected_version: NodeVersion,
    ) -> Result<NodeVersion> {
        let mut tree = self.tree.lock().expect("coordination tree lock poisoned");
        let current = tree
            .nodes
            .get(path)
            .map(|n| n.version)
            .unwrap_or(NodeVersion::INITIAL);
        if current != expected_version {
            return Err(CoordinationError::VersionMismatch {
                path: path.to_string(),
                expected: expected_version,
                actual: current,
            });
        }
        let new_version = current.next();
        tree.nodes.insert(
            path.to_string(),
            Node {
                data,
                version: new_version,
                ephemeral: false,
            },
        );
        let event = if current == NodeVersion::INITIAL {
            WatchEvent::Created
        } else {
            WatchEvent::DataChanged
        };
        tree.fire(path, event);
        Ok(new_version)
    }

    async fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let mut tree = self.tree.lock().expect("coordination tree lock poisoned");
        tree.nodes.insert(
            path.to_string(),
            Node {
                data,
                version: NodeVersion::INITIAL.next(),
                ephemeral: true,
            },
        );
        tree.fire(path, WatchEvent::Created);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<Option<NodeVersion>> {
        let tree = self.tree.lock().expect("coordination tree lock poisoned");
        Ok(tree.nodes.get(path).map(|n| n.version))
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let tree = self.tree.lock().expect("coordination tree lock poisoned");
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut names: Vec<String> = tree
            .nodes
            .keys()
            .filter_map(|key| {
                key.strip_prefix(&prefix)
                    .filter(|rest| !rest.is_empty() && !rest.contains('/'))
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn watch(&self, path: &str) -> Result<Watch> {
        let mut tree = self.tree.lock().expect("coordination tree lock poisoned");
        let (tx, rx) = oneshot::channel();
        tree.watchers.entry(path.to_string()).or_default().push(tx);
        Ok(Watch::new(rx))
    }

    fn session_state(&self) -> SessionState {
        self.session_watch.current()
    }
}
