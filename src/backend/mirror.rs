use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::AppError;

/// Low-latency key-value store holding denormalized copies. This service only
/// ever writes to it.
#[async_trait]
pub trait RealtimeMirror: Send + Sync {
    /// Replaces the whole node at `path`.
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError>;

    async fn remove(&self, path: &str) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MirrorEvent {
    Set {
        path: String,
        value: Value,
        at: DateTime<Utc>,
    },
    Removed {
        path: String,
        at: DateTime<Utc>,
    },
}

impl MirrorEvent {
    pub fn path(&self) -> &str {
        match self {
            MirrorEvent::Set { path, .. } | MirrorEvent::Removed { path, .. } => path,
        }
    }
}

/// In-process mirror that also fans every change out to realtime listeners.
pub struct MemoryMirror {
    nodes: DashMap<String, Value>,
    events_tx: broadcast::Sender<MirrorEvent>,
}

impl MemoryMirror {
    pub fn new(events_tx: broadcast::Sender<MirrorEvent>) -> Self {
        Self {
            nodes: DashMap::new(),
            events_tx,
        }
    }

    /// Reads a node the way an external realtime consumer would.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.nodes.get(path).map(|node| node.value().clone())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn publish(&self, event: MirrorEvent) {
        // no listeners is fine
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl RealtimeMirror for MemoryMirror {
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        self.nodes.insert(path.to_string(), value.clone());
        self.publish(MirrorEvent::Set {
            path: path.to_string(),
            value,
            at: Utc::now(),
        });
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        if self.nodes.remove(path).is_some() {
            self.publish(MirrorEvent::Removed {
                path: path.to_string(),
                at: Utc::now(),
            });
        }
        Ok(())
    }
}
