use std::sync::Arc;

use tokio::sync::broadcast;

use crate::backend::auth::MemoryAuthProvider;
use crate::backend::memory::MemoryDocumentStore;
use crate::backend::mirror::{MemoryMirror, MirrorEvent};
use crate::backend::objects::MemoryObjectStore;
use crate::config::{Config, DEFAULT_COUNTRY_HINT};
use crate::error::AppError;
use crate::geo::nominatim::NominatimGeocoder;
use crate::geo::{Geocoder, StaticGeocoder};
use crate::lifecycle::coordinator::{Backends, LifecycleCoordinator};
use crate::lifecycle::transitions::{Permissive, TransitionPolicy};
use crate::observability::metrics::Metrics;
use crate::profile::ProfileResolver;

pub struct AppState {
    pub coordinator: LifecycleCoordinator,
    pub profiles: ProfileResolver,
    pub geocoder: Arc<dyn Geocoder>,
    pub mirror: Arc<MemoryMirror>,
    pub objects: Arc<MemoryObjectStore>,
    pub mirror_events_tx: broadcast::Sender<MirrorEvent>,
    pub metrics: Metrics,
}

impl AppState {
    /// In-process backends, permissive transitions, lookup-table geocoding.
    pub fn new(event_buffer_size: usize) -> Self {
        Self::assemble(
            event_buffer_size,
            Arc::new(Permissive),
            Arc::new(StaticGeocoder::new(DEFAULT_COUNTRY_HINT)),
            "http://localhost:3000/objects",
        )
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let geocoder: Arc<dyn Geocoder> = match &config.geocoder_url {
            Some(url) => Arc::new(NominatimGeocoder::new(
                url,
                &config.geocoder_country_hint,
                &config.geocoder_user_agent,
            )?),
            None => Arc::new(StaticGeocoder::new(config.geocoder_country_hint.clone())),
        };

        Ok(Self::assemble(
            config.event_buffer_size,
            config.transition_policy.build(),
            geocoder,
            &config.object_base_url,
        ))
    }

    fn assemble(
        event_buffer_size: usize,
        policy: Arc<dyn TransitionPolicy>,
        geocoder: Arc<dyn Geocoder>,
        object_base_url: &str,
    ) -> Self {
        let (mirror_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let metrics = Metrics::new();

        let documents = Arc::new(MemoryDocumentStore::new());
        let mirror = Arc::new(MemoryMirror::new(mirror_events_tx.clone()));
        let objects = Arc::new(MemoryObjectStore::new(object_base_url));
        let auth = Arc::new(MemoryAuthProvider::new(event_buffer_size));

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
            profiles: ProfileResolver::new(auth, documents),
            geocoder,
            mirror,
            objects,
            mirror_events_tx,
            metrics,
        }
    }
}
