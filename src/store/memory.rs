use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{LinkRepository, StoreError};
use crate::models::{Click, Link};

/// Process-local repository. Nothing survives a restart; used by tests and
/// throwaway instances.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    links: RwLock<Vec<Link>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkRepository for MemoryRepository {
    async fn insert(&self, link: &Link) -> Result<(), StoreError> {
        let mut links = self.links.write().await;
        if links.iter().any(|l| l.id == link.id) {
            return Err(StoreError::Conflict);
        }
        links.push(link.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Link>, StoreError> {
        Ok(self.links.read().await.iter().find(|l| l.id == id).cloned())
    }

    async fn append_click(&self, id: &str, click: &Click) -> Result<bool, StoreError> {
        let mut links = self.links.write().await;
        match links.iter_mut().find(|l| l.id == id) {
            Some(link) => {
                link.clicks.push(click.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<Link>, StoreError> {
        Ok(self.links.read().await.clone())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut links = self.links.write().await;
        let before = links.len();
        links.retain(|l| l.id != id);
        Ok(links.len() != before)
    }
}
