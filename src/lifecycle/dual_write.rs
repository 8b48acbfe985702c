use std::fmt;
use std::future::Future;

use tracing::error;

use crate::error::AppError;
use crate::mirror::{agent_path, shipment_path};
use crate::observability::metrics::Metrics;

/// Mirror node a dual write lands on, used for logs and failure counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorTarget {
    pub entity: &'static str,
    pub path: String,
}

impl MirrorTarget {
    pub fn shipment(tracking_id: &str) -> Self {
        Self {
            entity: "shipment",
            path: shipment_path(tracking_id),
        }
    }

    pub fn agent(agent_id: &str) -> Self {
        Self {
            entity: "agent",
            path: agent_path(agent_id),
        }
    }
}

impl fmt::Display for MirrorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Primary-then-mirror write with no shared transaction.
///
/// A failed primary write aborts before the mirror is touched. A failed mirror
/// write is logged and counted but not propagated and not rolled back; the two
/// stores stay diverged until a later full-node write repairs the mirror.
#[derive(Clone)]
pub struct DualWriter {
    metrics: Metrics,
}

impl DualWriter {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    pub async fn write<T, P, M, MF>(
        &self,
        target: &MirrorTarget,
        primary: P,
        mirror: M,
    ) -> Result<T, AppError>
    where
        P: Future<Output = Result<T, AppError>>,
        M: FnOnce(&T) -> MF,
        MF: Future<Output = Result<(), AppError>>,
    {
        let value = primary.await?;
        self.mirror_step(target, mirror(&value)).await;
        Ok(value)
    }

    /// Runs only the mirror half. Returns whether the write landed.
    pub async fn mirror_step<MF>(&self, target: &MirrorTarget, write: MF) -> bool
    where
        MF: Future<Output = Result<(), AppError>>,
    {
        match write.await {
            Ok(()) => true,
            Err(err) => {
                self.metrics
                    .mirror_write_failures_total
                    .with_label_values(&[target.entity])
                    .inc();
                error!(
                    target_path = %target,
                    entity = target.entity,
                    error = %err,
                    "mirror write failed after primary write; stores diverged"
                );
                false
            }
        }
    }
}
