use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{LinkRepository, StoreError};
use crate::models::{Click, Link};

/// Repository backed by a single pretty-printed JSON array of links.
///
/// Every mutation reloads the document, applies the change and rewrites the
/// whole file while holding `write_lock`, so there is exactly one writer at a
/// time and no click is lost to a concurrent save. Saves go through a
/// temporary sibling file and a rename, so readers only ever see a complete
/// document.
#[derive(Debug)]
pub struct JsonFileRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileRepository {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current document. A missing file is an empty store; anything
    /// unreadable is an error, never an empty store.
    async fn load(&self) -> Result<Vec<Link>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                tracing::error!("Failed to read link store {}: {}", self.path.display(), e);
                return Err(e.into());
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| {
            tracing::error!(
                "Link store {} is corrupt, refusing to treat it as empty: {}",
                self.path.display(),
                source
            );
            StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })
    }

    async fn save(&self, links: &[Link]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(links).map_err(StoreError::Encode)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "links.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Run one load-mutate-save cycle under the writer lock. `apply` returns
    /// its result plus whether the document changed and must be saved.
    async fn update<T>(
        &self,
        apply: impl FnOnce(&mut Vec<Link>) -> Result<(T, bool), StoreError> + Send,
    ) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut links = self.load().await?;
        let (out, dirty) = apply(&mut links)?;
        if dirty {
            self.save(&links).await?;
        }
        Ok(out)
    }
}

#[async_trait]
impl LinkRepository for JsonFileRepository {
    async fn insert(&self, link: &Link) -> Result<(), StoreError> {
        self.update(|links| {
            if links.iter().any(|l| l.id == link.id) {
                return Err(StoreError::Conflict);
            }
            links.push(link.clone());
            Ok(((), true))
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<Link>, StoreError> {
        Ok(self.load().await?.into_iter().find(|l| l.id == id))
    }

    async fn append_click(&self, id: &str, click: &Click) -> Result<bool, StoreError> {
        self.update(|links| match links.iter_mut().find(|l| l.id == id) {
            Some(link) => {
                link.clicks.push(click.clone());
                Ok((true, true))
            }
            None => Ok((false, false)),
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Link>, StoreError> {
        self.load().await
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        self.update(|links| {
            let before = links.len();
            links.retain(|l| l.id != id);
            let removed = links.len() != before;
            Ok((removed, removed))
        })
        .await
    }
}
