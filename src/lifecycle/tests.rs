use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use regex::Regex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::backend::auth::{AuthProvider, MemoryAuthProvider};
use crate::backend::memory::MemoryDocumentStore;
use crate::backend::mirror::{MemoryMirror, RealtimeMirror};
use crate::backend::objects::MemoryObjectStore;
use crate::error::AppError;
use crate::lifecycle::coordinator::{Backends, LifecycleCoordinator, ProofFile};
use crate::lifecycle::transitions::{ForwardOnly, Permissive, TransitionPolicy};
use crate::mirror::{agent_path, shipment_path, ShipmentMirror};
use crate::models::agent::{Agent, AgentStatus, NewAgent};
use crate::models::shipment::{GeoLocation, NewShipment, ShipmentPatch, ShipmentStatus};
use crate::observability::metrics::Metrics;
use crate::store::agents::AgentStore;

/// Mirror that records every call and can be switched into failure.
struct RecordingMirror {
    inner: MemoryMirror,
    failing: AtomicBool,
    sets: AtomicUsize,
    removes: AtomicUsize,
}

impl RecordingMirror {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            inner: MemoryMirror::new(tx),
            failing: AtomicBool::new(false),
            sets: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        }
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.sets.load(Ordering::SeqCst) + self.removes.load(Ordering::SeqCst)
    }

    fn shipment(&self, tracking_id: &str) -> Option<ShipmentMirror> {
        self.inner
            .get(&shipment_path(tracking_id))
            .map(|value| serde_json::from_value(value).unwrap())
    }
}

#[async_trait]
impl RealtimeMirror for RecordingMirror {
    async fn set(&self, path: &str, value: Value) -> Result<(), AppError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Backend("mirror unavailable".to_string()));
        }
        self.inner.set(path, value).await
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Backend("mirror unavailable".to_string()));
        }
        self.inner.remove(path).await
    }
}

struct Harness {
    coordinator: LifecycleCoordinator,
    documents: Arc<MemoryDocumentStore>,
    mirror: Arc<RecordingMirror>,
    objects: Arc<MemoryObjectStore>,
    auth: Arc<MemoryAuthProvider>,
    metrics: Metrics,
}

impl Harness {
    fn new() -> Self {
        Self::with_policy(Arc::new(Permissive))
    }

    fn with_policy(policy: Arc<dyn TransitionPolicy>) -> Self {
        let documents = Arc::new(MemoryDocumentStore::new());
        let mirror = Arc::new(RecordingMirror::new());
        let objects = Arc::new(MemoryObjectStore::new("http://files.test"));
        let auth = Arc::new(MemoryAuthProvider::new(16));
        let metrics = Metrics::new();

        let coordinator = LifecycleCoordinator::new(
            Backends {
                documents: documents.clone(),
                mirror: mirror.clone(),
                objects: objects.clone(),
                auth: auth.clone(),
            },
            policy,
            metrics.clone(),
        );

        Self {
            coordinator,
            documents,
            mirror,
            objects,
            auth,
            metrics,
        }
    }

    async fn seed_agent(&self, id: &str) {
        AgentStore::new(self.documents.clone())
            .create(&Agent {
                id: id.to_string(),
                name: format!("Agent {id}"),
                email: format!("{id}@example.com"),
                status: AgentStatus::Free,
            })
            .await
            .unwrap();
    }

    async fn agent_status(&self, id: &str) -> AgentStatus {
        self.coordinator
            .get_agent(id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn payload(agent_id: Option<&str>) -> NewShipment {
    NewShipment {
        sender_name: "A".to_string(),
        receiver_name: "B".to_string(),
        pickup_address: "X".to_string(),
        delivery_address: "Y".to_string(),
        contact_number: "123".to_string(),
        customer_email: Some("b@example.com".to_string()),
        agent_id: agent_id.map(str::to_string),
        pickup_date: Some("2025-03-01".to_string()),
        expected_delivery_date: None,
    }
}

fn here() -> GeoLocation {
    GeoLocation {
        lat: 19.076,
        lng: 72.8777,
        address: Some("Mumbai".to_string()),
    }
}

#[tokio::test]
async fn create_then_find_by_tracking_id_round_trips() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;

    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();
    assert!(!created.id.is_empty());

    let found = h
        .coordinator
        .find_by_tracking_id(&created.tracking_id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.id, created.id);
    assert_eq!(found.sender_name, "A");
    assert_eq!(found.receiver_name, "B");
    assert_eq!(found.pickup_address, "X");
    assert_eq!(found.delivery_address, "Y");
    assert_eq!(found.contact_number, "123");
    assert_eq!(found.customer_email.as_deref(), Some("b@example.com"));
    assert_eq!(found.agent_id.as_deref(), Some("agent-1"));
    assert_eq!(found.pickup_date.as_deref(), Some("2025-03-01"));
    assert_eq!(found.expected_delivery_date, None);
    assert_eq!(found.status, ShipmentStatus::Created);
}

#[tokio::test]
async fn tracking_id_has_expected_shape_and_year() {
    let h = Harness::new();
    let pattern = Regex::new(r"^SHIP-[A-Z0-9]{5}-(\d{4})$").unwrap();

    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    let caps = pattern.captures(&created.tracking_id).unwrap();
    assert_eq!(caps[1].parse::<i32>().unwrap(), Utc::now().year());
}

#[tokio::test]
async fn create_with_agent_marks_agent_busy() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;

    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();

    assert_eq!(h.agent_status("agent-1").await, AgentStatus::Busy);
    let stored = h.coordinator.get_shipment(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ShipmentStatus::Created);

    let agent_node = h.mirror.inner.get(&agent_path("agent-1")).unwrap();
    assert_eq!(agent_node["status"], "busy");
}

#[tokio::test]
async fn create_mirrors_full_record_under_tracking_id() {
    let h = Harness::new();

    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    let stored = h.coordinator.get_shipment(&created.id).await.unwrap().unwrap();
    let node = h.mirror.shipment(&created.tracking_id).unwrap();
    assert_eq!(node, ShipmentMirror::from_primary(&stored));
    assert_eq!(node.agent_id, "");
    assert_eq!(node.last_location, None);
    assert_eq!(node.created_at, stored.created_at.unwrap().as_millis());
}

#[tokio::test]
async fn mirror_failure_on_create_leaves_orphaned_primary_record() {
    let h = Harness::new();
    h.mirror.fail(true);

    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    assert!(h.coordinator.get_shipment(&created.id).await.unwrap().is_some());
    assert!(h.mirror.shipment(&created.tracking_id).is_none());
    assert_eq!(
        h.metrics
            .mirror_write_failures_total
            .with_label_values(&["shipment"])
            .get(),
        1
    );
}

#[tokio::test]
async fn delivered_edit_frees_old_agent_and_busies_new_one() {
    let h = Harness::new();
    h.seed_agent("agent-a").await;
    h.seed_agent("agent-b").await;
    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-a")))
        .await
        .unwrap();

    let patch = ShipmentPatch {
        status: Some(ShipmentStatus::Delivered),
        agent_id: Some("agent-b".to_string()),
        ..ShipmentPatch::default()
    };
    h.coordinator
        .edit_shipment(&created.id, &created.tracking_id, patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.agent_status("agent-a").await, AgentStatus::Free);
    assert_eq!(h.agent_status("agent-b").await, AgentStatus::Busy);
}

#[tokio::test]
async fn reassignment_alone_does_not_free_previous_agent() {
    let h = Harness::new();
    h.seed_agent("agent-a").await;
    h.seed_agent("agent-b").await;
    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-a")))
        .await
        .unwrap();

    let patch = ShipmentPatch {
        agent_id: Some("agent-b".to_string()),
        ..ShipmentPatch::default()
    };
    let edited = h
        .coordinator
        .edit_shipment(&created.id, &created.tracking_id, patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(edited.agent_id.as_deref(), Some("agent-b"));
    assert_eq!(h.agent_status("agent-a").await, AgentStatus::Busy);
    assert_eq!(h.agent_status("agent-b").await, AgentStatus::Busy);
}

#[tokio::test]
async fn delivered_edit_with_same_agent_ends_free() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;
    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();
    assert_eq!(h.agent_status("agent-1").await, AgentStatus::Busy);

    let patch = ShipmentPatch {
        status: Some(ShipmentStatus::Delivered),
        agent_id: Some("agent-1".to_string()),
        ..ShipmentPatch::default()
    };
    h.coordinator
        .edit_shipment(&created.id, &created.tracking_id, patch)
        .await
        .unwrap();

    assert_eq!(h.agent_status("agent-1").await, AgentStatus::Free);
}

#[tokio::test]
async fn edit_rewrites_whole_mirror_node_from_fresh_read() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    let patch = ShipmentPatch {
        delivery_address: Some("Z".to_string()),
        status: Some(ShipmentStatus::InTransit),
        ..ShipmentPatch::default()
    };
    let edited = h
        .coordinator
        .edit_shipment(&created.id, &created.tracking_id, patch)
        .await
        .unwrap()
        .unwrap();

    let node = h.mirror.shipment(&created.tracking_id).unwrap();
    assert_eq!(node, ShipmentMirror::from_primary(&edited));
    assert_eq!(node.delivery_address, "Z");
    assert_eq!(node.status, ShipmentStatus::InTransit);
    assert_eq!(node.sender_name, "A");
}

#[tokio::test]
async fn editing_missing_shipment_is_no_result() {
    let h = Harness::new();

    let result = h
        .coordinator
        .edit_shipment("missing", "SHIP-00000-2025", ShipmentPatch::default())
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(h.mirror.calls(), 0);
}

#[tokio::test]
async fn status_update_changes_only_status_and_location_in_mirror() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;
    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();
    let before = h.mirror.shipment(&created.tracking_id).unwrap();

    h.coordinator
        .update_status(&created.id, ShipmentStatus::OutForDelivery, Some(here()))
        .await
        .unwrap()
        .unwrap();

    let after = h.mirror.shipment(&created.tracking_id).unwrap();
    assert_eq!(after.status, ShipmentStatus::OutForDelivery);
    assert_eq!(after.last_location, Some(here()));
    assert_eq!(
        after,
        before.with_status(ShipmentStatus::OutForDelivery, Some(here()))
    );
}

#[tokio::test]
async fn status_update_appends_audit_entry_and_leaves_agent_alone() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;
    let created = h
        .coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();

    h.coordinator
        .update_status(&created.id, ShipmentStatus::PickedUp, None)
        .await
        .unwrap();
    h.coordinator
        .update_status(&created.id, ShipmentStatus::Delivered, Some(here()))
        .await
        .unwrap();

    let updates = h.coordinator.status_updates(&created.id).await.unwrap();
    let statuses: Vec<_> = updates.iter().map(|u| u.status).collect();
    assert_eq!(statuses, vec![ShipmentStatus::PickedUp, ShipmentStatus::Delivered]);
    assert_eq!(updates[0].location, None);
    assert_eq!(updates[1].location, Some(here()));
    assert!(updates.iter().all(|u| u.at.is_some()));

    assert_eq!(h.agent_status("agent-1").await, AgentStatus::Busy);
}

#[tokio::test]
async fn status_update_on_missing_shipment_is_no_result() {
    let h = Harness::new();
    let result = h
        .coordinator
        .update_status("missing", ShipmentStatus::InTransit, None)
        .await
        .unwrap();
    assert!(result.is_none());
    assert_eq!(h.mirror.calls(), 0);
}

#[tokio::test]
async fn permissive_policy_allows_regression_out_of_delivered() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    h.coordinator
        .update_status(&created.id, ShipmentStatus::Delivered, None)
        .await
        .unwrap();
    let regressed = h
        .coordinator
        .update_status(&created.id, ShipmentStatus::Created, None)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(regressed.status, ShipmentStatus::Created);
}

#[tokio::test]
async fn forward_policy_rejects_regression_without_writing() {
    let h = Harness::with_policy(Arc::new(ForwardOnly));
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();
    h.coordinator
        .update_status(&created.id, ShipmentStatus::InTransit, None)
        .await
        .unwrap();
    let calls_before = h.mirror.calls();

    let result = h
        .coordinator
        .update_status(&created.id, ShipmentStatus::PickedUp, None)
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert_eq!(h.mirror.calls(), calls_before);
    assert_eq!(h.coordinator.status_updates(&created.id).await.unwrap().len(), 1);
}

// Proof upload marks the shipment delivered through a direct field write. It
// neither appends to the status audit trail nor refreshes the mirror, so the
// mirror keeps showing the pre-upload status.
#[tokio::test]
async fn proof_upload_delivers_without_audit_entry_or_mirror_sync() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();
    h.coordinator
        .update_status(&created.id, ShipmentStatus::InTransit, None)
        .await
        .unwrap();
    let mirror_calls = h.mirror.calls();

    let url = h
        .coordinator
        .upload_proof(
            &created.id,
            ProofFile {
                name: "signature.png".to_string(),
                content_type: "image/png".to_string(),
                data: vec![0x89, 0x50, 0x4e, 0x47],
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        url,
        format!("http://files.test/pods/{}/signature.png", created.id)
    );
    assert!(h.objects.download(&format!("pods/{}/signature.png", created.id)).is_some());

    let stored = h.coordinator.get_shipment(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ShipmentStatus::Delivered);

    let proofs = h.coordinator.proofs(&created.id).await.unwrap();
    assert_eq!(proofs.len(), 1);
    assert_eq!(proofs[0].url, url);

    let updates = h.coordinator.status_updates(&created.id).await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].status, ShipmentStatus::InTransit);

    assert_eq!(h.mirror.calls(), mirror_calls);
    assert_eq!(
        h.mirror.shipment(&created.tracking_id).unwrap().status,
        ShipmentStatus::InTransit
    );
}

#[tokio::test]
async fn proof_upload_ignores_prior_status() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    h.coordinator
        .upload_proof(
            &created.id,
            ProofFile {
                name: "pod.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                data: vec![1],
            },
        )
        .await
        .unwrap();

    let stored = h.coordinator.get_shipment(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ShipmentStatus::Delivered);
}

#[tokio::test]
async fn proof_upload_rejects_path_like_names() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    let result = h
        .coordinator
        .upload_proof(
            &created.id,
            ProofFile {
                name: "../escape.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
                data: vec![1],
            },
        )
        .await;

    assert!(matches!(result, Err(AppError::BadRequest(_))));
    assert!(h.objects.is_empty());
}

#[tokio::test]
async fn delete_removes_primary_and_mirror_then_second_call_is_silent() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();
    assert!(h.mirror.shipment(&created.tracking_id).is_some());

    let existed = h.coordinator.delete_shipment(&created.id).await.unwrap();
    assert!(existed);
    assert!(h.coordinator.get_shipment(&created.id).await.unwrap().is_none());
    assert!(h.mirror.shipment(&created.tracking_id).is_none());

    let calls = h.mirror.calls();
    let existed_again = h.coordinator.delete_shipment(&created.id).await.unwrap();
    assert!(!existed_again);
    assert_eq!(h.mirror.calls(), calls);
}

#[tokio::test]
async fn agent_lifecycle_keeps_mirror_in_step_and_identity_survives() {
    let h = Harness::new();

    let agent = h
        .coordinator
        .create_agent(NewAgent {
            name: "Kiran".to_string(),
            email: "kiran@example.com".to_string(),
            password: "hunter22".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(agent.status, AgentStatus::Free);
    assert_eq!(
        h.mirror.inner.get(&agent_path(&agent.id)).unwrap()["name"],
        "Kiran"
    );

    h.coordinator
        .set_agent_status(&agent.id, AgentStatus::Busy)
        .await
        .unwrap();
    let node = h.mirror.inner.get(&agent_path(&agent.id)).unwrap();
    assert_eq!(node["status"], "busy");
    assert_eq!(node["email"], "kiran@example.com");

    h.coordinator.delete_agent(&agent.id).await.unwrap();
    assert!(h.coordinator.get_agent(&agent.id).await.unwrap().is_none());
    assert!(h.mirror.inner.get(&agent_path(&agent.id)).is_none());

    let session = h.auth.sign_in("kiran@example.com", "hunter22").await.unwrap();
    assert_eq!(session.identity.uid, agent.id);
    assert_eq!(session.identity.display_name.as_deref(), Some("Kiran"));
}

#[tokio::test]
async fn duplicate_agent_email_fails_without_records() {
    let h = Harness::new();
    let new_agent = || NewAgent {
        name: "Kiran".to_string(),
        email: "kiran@example.com".to_string(),
        password: "hunter22".to_string(),
    };
    h.coordinator.create_agent(new_agent()).await.unwrap();

    let again = h.coordinator.create_agent(new_agent()).await;

    assert!(matches!(again, Err(AppError::Unauthorized)));
    assert_eq!(h.coordinator.list_agents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn feedback_is_appended_and_rating_is_bounded() {
    let h = Harness::new();
    let created = h.coordinator.create_shipment(payload(None)).await.unwrap();

    h.coordinator
        .submit_feedback(&created.id, 5, "on time")
        .await
        .unwrap();
    let out_of_range = h.coordinator.submit_feedback(&created.id, 6, "").await;

    assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));
    let feedback = h.coordinator.feedback(&created.id).await.unwrap();
    assert_eq!(feedback.len(), 1);
    assert_eq!(feedback[0].rating, 5);
    assert_eq!(feedback[0].comments, "on time");
}

#[tokio::test]
async fn shipments_for_agent_only_lists_assigned_ones() {
    let h = Harness::new();
    h.seed_agent("agent-1").await;
    h.coordinator
        .create_shipment(payload(Some("agent-1")))
        .await
        .unwrap();
    h.coordinator.create_shipment(payload(None)).await.unwrap();

    assert_eq!(h.coordinator.list_shipments().await.unwrap().len(), 2);
    assert_eq!(
        h.coordinator
            .shipments_for_agent("agent-1")
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn operations_are_counted_by_outcome() {
    let h = Harness::new();
    h.coordinator.create_shipment(payload(None)).await.unwrap();
    let _ = h.coordinator.submit_feedback("any", 0, "").await;

    assert_eq!(
        h.metrics
            .lifecycle_operations_total
            .with_label_values(&["create_shipment", "success"])
            .get(),
        1
    );
    assert_eq!(
        h.metrics
            .lifecycle_operations_total
            .with_label_values(&["submit_feedback", "error"])
            .get(),
        1
    );
}
