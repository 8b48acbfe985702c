use std::sync::Arc;

use serde_json::json;

use crate::backend::document::{DocumentStore, Fields};
use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus};
use crate::store::{from_document, from_documents, to_fields};

pub const AGENTS: &str = "agents";

#[derive(Clone)]
pub struct AgentStore {
    documents: Arc<dyn DocumentStore>,
}

impl AgentStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    /// Agents are keyed by their auth uid, so this is a `set`, not a `create`.
    pub async fn create(&self, agent: &Agent) -> Result<(), AppError> {
        self.documents
            .set(AGENTS, &agent.id, to_fields(agent)?)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Agent>, AppError> {
        self.documents
            .get(AGENTS, id)
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn list(&self) -> Result<Vec<Agent>, AppError> {
        from_documents(self.documents.list(AGENTS).await?)
    }

    pub async fn set_status(&self, id: &str, status: AgentStatus) -> Result<(), AppError> {
        let mut fields = Fields::new();
        fields.insert("status".to_string(), json!(status));
        self.documents.update(AGENTS, id, fields).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.documents.delete(AGENTS, id).await
    }
}
