use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::backend::auth::AuthProvider;
use crate::backend::document::DocumentStore;
use crate::backend::mirror::RealtimeMirror;
use crate::backend::objects::ObjectStore;
use crate::error::AppError;
use crate::lifecycle::dual_write::{DualWriter, MirrorTarget};
use crate::lifecycle::tracking::generate_tracking_id;
use crate::lifecycle::transitions::TransitionPolicy;
use crate::mirror::{AgentMirror, MirrorSync, ShipmentMirror};
use crate::models::agent::{Agent, AgentStatus, NewAgent};
use crate::models::shipment::{
    Feedback, GeoLocation, NewShipment, ProofOfDelivery, Shipment, ShipmentPatch, ShipmentStatus,
    StatusUpdate,
};
use crate::observability::metrics::Metrics;
use crate::store::agents::AgentStore;
use crate::store::shipments::ShipmentStore;

/// The external services a coordinator writes through.
#[derive(Clone)]
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub mirror: Arc<dyn RealtimeMirror>,
    pub objects: Arc<dyn ObjectStore>,
    pub auth: Arc<dyn AuthProvider>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreatedShipment {
    pub id: String,
    pub tracking_id: String,
}

#[derive(Debug, Clone)]
pub struct ProofFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Keeps shipment state, agent state and the realtime mirror in step across
/// operations that touch more than one record or store.
///
/// Nothing here is transactional. Concurrent calls on the same shipment race
/// and the store keeps the last write; agent free/busy reconciliation reads
/// the shipment before writing, so a concurrent edit can double-assign or
/// lose a toggle.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    shipments: ShipmentStore,
    agents: AgentStore,
    sync: MirrorSync,
    objects: Arc<dyn ObjectStore>,
    auth: Arc<dyn AuthProvider>,
    policy: Arc<dyn TransitionPolicy>,
    writer: DualWriter,
    metrics: Metrics,
}

impl LifecycleCoordinator {
    pub fn new(backends: Backends, policy: Arc<dyn TransitionPolicy>, metrics: Metrics) -> Self {
        Self {
            shipments: ShipmentStore::new(backends.documents.clone()),
            agents: AgentStore::new(backends.documents),
            sync: MirrorSync::new(backends.mirror),
            objects: backends.objects,
            auth: backends.auth,
            policy,
            writer: DualWriter::new(metrics.clone()),
            metrics,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    async fn observe<T, F>(&self, operation: &'static str, work: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let start = Instant::now();
        let result = work.await;
        let outcome = if result.is_ok() { "success" } else { "error" };

        self.metrics
            .lifecycle_latency_seconds
            .with_label_values(&[operation])
            .observe(start.elapsed().as_secs_f64());
        self.metrics
            .lifecycle_operations_total
            .with_label_values(&[operation, outcome])
            .inc();

        if let Err(err) = &result {
            warn!(operation, error = %err, "lifecycle operation failed");
        }
        result
    }

    pub async fn create_shipment(&self, payload: NewShipment) -> Result<CreatedShipment, AppError> {
        self.observe("create_shipment", async {
            let tracking_id = generate_tracking_id();
            let shipment = payload.into_shipment(tracking_id.clone());
            let target = MirrorTarget::shipment(&tracking_id);

            let id = self
                .writer
                .write(&target, self.shipments.create(&shipment), |id: &String| {
                    let id = id.clone();
                    let fallback = shipment.clone();
                    let tracking_id = tracking_id.clone();
                    async move {
                        // read back so the mirror carries the server-assigned createdAt
                        let stored = self.shipments.get(&id).await?.unwrap_or(fallback);
                        self.sync
                            .write_shipment(&tracking_id, &ShipmentMirror::from_primary(&stored))
                            .await
                    }
                })
                .await?;

            if let Some(agent_id) = shipment.assigned_agent() {
                self.write_agent_status(agent_id, AgentStatus::Busy).await?;
            }

            info!(shipment_id = %id, tracking_id = %tracking_id, "shipment created");
            Ok(CreatedShipment { id, tracking_id })
        })
        .await
    }

    /// Applies `patch`, rewrites the whole mirror node from a fresh read, then
    /// reconciles agent status. Returns `None` when the shipment is gone.
    pub async fn edit_shipment(
        &self,
        id: &str,
        tracking_id: &str,
        patch: ShipmentPatch,
    ) -> Result<Option<Shipment>, AppError> {
        self.observe("edit_shipment", async {
            let Some(before) = self.shipments.get(id).await? else {
                warn!(shipment_id = %id, "edit skipped: shipment not found");
                return Ok(None);
            };

            if let Some(next) = patch.status {
                self.policy.check(before.status, next)?;
            }

            let target = MirrorTarget::shipment(tracking_id);
            let after = self
                .writer
                .write(
                    &target,
                    async {
                        self.shipments.update(id, &patch).await?;
                        self.shipments.get(id).await
                    },
                    |fresh: &Option<Shipment>| {
                        let snapshot = fresh.as_ref().map(ShipmentMirror::from_primary);
                        async move {
                            match snapshot {
                                Some(snapshot) => self.sync.write_shipment(tracking_id, &snapshot).await,
                                None => Ok(()),
                            }
                        }
                    },
                )
                .await?;

            let old_agent = before.assigned_agent();

            if patch.status == Some(ShipmentStatus::Delivered) {
                if let Some(old) = old_agent {
                    self.write_agent_status(old, AgentStatus::Free).await?;
                }
            }

            if let Some(new) = patch.assigned_agent() {
                if Some(new) != old_agent {
                    self.write_agent_status(new, AgentStatus::Busy).await?;
                }
            }

            info!(shipment_id = %id, tracking_id = %tracking_id, "shipment edited");
            Ok(after)
        })
        .await
    }

    /// Agent-driven status change: primary write, audit entry, then a full
    /// mirror rewrite from the pre-update snapshot. Agent status is untouched.
    pub async fn update_status(
        &self,
        shipment_id: &str,
        status: ShipmentStatus,
        location: Option<GeoLocation>,
    ) -> Result<Option<Shipment>, AppError> {
        self.observe("update_status", async {
            let Some(before) = self.shipments.get(shipment_id).await? else {
                warn!(shipment_id = %shipment_id, "status update skipped: shipment not found");
                return Ok(None);
            };

            self.policy.check(before.status, status)?;

            let target = MirrorTarget::shipment(&before.tracking_id);
            let snapshot =
                ShipmentMirror::from_primary(&before).with_status(status, location.clone());

            self.writer
                .write(
                    &target,
                    async {
                        self.shipments
                            .set_status(shipment_id, status, location.as_ref())
                            .await?;
                        self.shipments
                            .append_status_update(shipment_id, status, location.as_ref())
                            .await?;
                        Ok(())
                    },
                    |_: &()| self.sync.write_shipment(&before.tracking_id, &snapshot),
                )
                .await?;

            info!(
                shipment_id = %shipment_id,
                tracking_id = %before.tracking_id,
                status = %status,
                "shipment status updated"
            );

            Ok(Some(Shipment {
                status,
                last_location: location,
                ..before
            }))
        })
        .await
    }

    /// Stores a delivery proof and marks the shipment delivered.
    ///
    /// Unlike [`Self::update_status`] this appends no status-audit entry and
    /// leaves the mirror as it was.
    pub async fn upload_proof(
        &self,
        shipment_id: &str,
        file: ProofFile,
    ) -> Result<Option<String>, AppError> {
        self.observe("upload_proof", async {
            let name = file.name.trim();
            if name.is_empty() || name.contains('/') {
                return Err(AppError::BadRequest("invalid proof file name".to_string()));
            }

            if self.shipments.get(shipment_id).await?.is_none() {
                warn!(shipment_id = %shipment_id, "proof upload skipped: shipment not found");
                return Ok(None);
            }

            let path = format!("pods/{shipment_id}/{name}");
            let url = self
                .objects
                .upload(&path, file.data, &file.content_type)
                .await?;
            self.shipments.append_proof(shipment_id, &url).await?;

            let delivered = ShipmentPatch {
                status: Some(ShipmentStatus::Delivered),
                ..ShipmentPatch::default()
            };
            self.shipments.update(shipment_id, &delivered).await?;

            info!(shipment_id = %shipment_id, url = %url, "proof of delivery stored");
            Ok(Some(url))
        })
        .await
    }

    /// Returns whether a record existed. The mirror node is only removed when
    /// its tracking id could be recovered from the record.
    pub async fn delete_shipment(&self, id: &str) -> Result<bool, AppError> {
        self.observe("delete_shipment", async {
            let tracking_id = self.shipments.get(id).await?.map(|s| s.tracking_id);

            self.shipments.delete(id).await?;

            match &tracking_id {
                Some(tracking_id) => {
                    let target = MirrorTarget::shipment(tracking_id);
                    self.writer
                        .mirror_step(&target, self.sync.remove_shipment(tracking_id))
                        .await;
                    info!(shipment_id = %id, tracking_id = %tracking_id, "shipment deleted");
                }
                None => warn!(shipment_id = %id, "shipment already gone; mirror cleanup skipped"),
            }

            Ok(tracking_id.is_some())
        })
        .await
    }

    pub async fn submit_feedback(
        &self,
        shipment_id: &str,
        rating: u8,
        comments: &str,
    ) -> Result<(), AppError> {
        self.observe("submit_feedback", async {
            if !(1..=5).contains(&rating) {
                return Err(AppError::BadRequest("rating must be between 1 and 5".to_string()));
            }
            self.shipments
                .append_feedback(shipment_id, rating, comments)
                .await?;
            Ok(())
        })
        .await
    }

    /// Creates the auth identity and the agent record. The identity outlives
    /// any later [`Self::delete_agent`].
    pub async fn create_agent(&self, payload: NewAgent) -> Result<Agent, AppError> {
        self.observe("create_agent", async {
            if payload.name.trim().is_empty() {
                return Err(AppError::BadRequest("name cannot be empty".to_string()));
            }

            let identity = self
                .auth
                .create_account(&payload.email, &payload.password)
                .await?;
            self.auth
                .update_display_name(&identity, &payload.name)
                .await?;

            let agent = Agent {
                id: identity.uid.clone(),
                name: payload.name,
                email: identity.email.clone(),
                status: AgentStatus::Free,
            };

            let snapshot = AgentMirror::from_primary(&agent);
            self.writer
                .write(
                    &MirrorTarget::agent(&agent.id),
                    self.agents.create(&agent),
                    |_: &()| self.sync.write_agent(&snapshot),
                )
                .await?;

            info!(agent_id = %agent.id, "agent created");
            Ok(agent)
        })
        .await
    }

    pub async fn delete_agent(&self, agent_id: &str) -> Result<(), AppError> {
        self.observe("delete_agent", async {
            self.writer
                .write(
                    &MirrorTarget::agent(agent_id),
                    self.agents.delete(agent_id),
                    |_: &()| self.sync.remove_agent(agent_id),
                )
                .await?;

            info!(agent_id = %agent_id, "agent deleted; auth identity retained");
            Ok(())
        })
        .await
    }

    pub async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent, AppError> {
        self.observe("set_agent_status", self.write_agent_status(agent_id, status))
            .await
    }

    async fn write_agent_status(&self, agent_id: &str, status: AgentStatus) -> Result<Agent, AppError> {
        let fresh = self
            .writer
            .write(
                &MirrorTarget::agent(agent_id),
                async {
                    self.agents.set_status(agent_id, status).await?;
                    self.agents.get(agent_id).await
                },
                |fresh: &Option<Agent>| {
                    let snapshot = fresh.as_ref().map(AgentMirror::from_primary);
                    async move {
                        match snapshot {
                            Some(snapshot) => self.sync.write_agent(&snapshot).await,
                            None => Ok(()),
                        }
                    }
                },
            )
            .await?;

        info!(agent_id = %agent_id, status = status.as_str(), "agent status changed");
        fresh.ok_or_else(|| AppError::NotFound(format!("agent {agent_id} not found")))
    }

    pub async fn get_shipment(&self, id: &str) -> Result<Option<Shipment>, AppError> {
        self.shipments.get(id).await
    }

    pub async fn list_shipments(&self) -> Result<Vec<Shipment>, AppError> {
        self.shipments.list_all().await
    }

    pub async fn shipments_for_agent(&self, agent_id: &str) -> Result<Vec<Shipment>, AppError> {
        self.shipments.list_for_agent(agent_id).await
    }

    pub async fn find_by_tracking_id(&self, tracking_id: &str) -> Result<Option<Shipment>, AppError> {
        self.shipments.find_by_tracking_id(tracking_id.trim()).await
    }

    pub async fn status_updates(&self, shipment_id: &str) -> Result<Vec<StatusUpdate>, AppError> {
        self.shipments.status_updates(shipment_id).await
    }

    pub async fn proofs(&self, shipment_id: &str) -> Result<Vec<ProofOfDelivery>, AppError> {
        self.shipments.proofs(shipment_id).await
    }

    pub async fn feedback(&self, shipment_id: &str) -> Result<Vec<Feedback>, AppError> {
        self.shipments.feedback(shipment_id).await
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, AppError> {
        self.agents.get(agent_id).await
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, AppError> {
        self.agents.list().await
    }
}
