use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppError;

/// Binary object storage. Returns a URL the object can be downloaded from.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError>;
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

pub struct MemoryObjectStore {
    base_url: String,
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: DashMap::new(),
        }
    }

    pub fn download(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .get(path.trim_start_matches('/'))
            .map(|obj| obj.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(AppError::BadRequest("object path cannot be empty".to_string()));
        }

        self.objects.insert(
            path.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );

        Ok(format!("{}/{}", self.base_url, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_returns_download_url() {
        let store = MemoryObjectStore::new("http://localhost:3000/objects/");
        let url = store
            .upload("pods/abc/proof.jpg", vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();

        assert_eq!(url, "http://localhost:3000/objects/pods/abc/proof.jpg");
        let stored = store.download("pods/abc/proof.jpg").unwrap();
        assert_eq!(stored.data, vec![1, 2, 3]);
        assert_eq!(stored.content_type, "image/jpeg");
    }
}
