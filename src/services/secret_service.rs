//! Folder, path and secret operations over a configured [`Store`]
//!
//! The service adds no rules of its own: every call delegates to the store's
//! repositories, logs the outcome, and returns their result unchanged.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

use crate::{
    domain::{Folder, ListParams, Path, Secret},
    errors::Result,
    evaluator::SecretsLookup,
    storage::Store,
};

/// Service facade over the three collections
#[derive(Debug, Clone)]
pub struct SecretService {
    store: Store,
}

impl SecretService {
    /// Create a new service over the given store
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    // Folders

    pub async fn create_folder(&self, folder: Folder) -> Result<Folder> {
        let created = self.store.folders.create(folder).await?;
        info!(folder_id = created.id, folder_name = %created.name, "Folder created");
        Ok(created)
    }

    pub async fn update_folder(&self, folder: Folder) -> Result<Folder> {
        let updated = self.store.folders.update(folder).await?;
        info!(folder_id = updated.id, folder_name = %updated.name, "Folder updated");
        Ok(updated)
    }

    pub async fn delete_folder(&self, id: i64, force: bool) -> Result<()> {
        self.store.folders.delete(id, force).await?;
        info!(folder_id = id, force, "Folder deleted");
        Ok(())
    }

    pub async fn get_folder(&self, id: i64) -> Result<Folder> {
        self.store.folders.get_by_id(id).await
    }

    pub async fn get_folder_by_uid(&self, uid: &str) -> Result<Folder> {
        self.store.folders.get_by_uid(uid).await
    }

    pub async fn list_folders(&self, params: &ListParams) -> Result<Vec<Folder>> {
        self.store.folders.get(params).await
    }

    pub async fn count_folders(&self, params: &ListParams) -> Result<u64> {
        self.store.folders.count(params).await
    }

    pub async fn folders_by_id(&self, params: &ListParams) -> Result<HashMap<i64, Folder>> {
        self.store.folders.get_map_by_id(params).await
    }

    pub async fn folders_by_uid(&self, params: &ListParams) -> Result<HashMap<String, Folder>> {
        self.store.folders.get_map_by_uid(params).await
    }

    // Paths

    pub async fn create_path(&self, path: Path) -> Result<Path> {
        let created = self.store.paths.create(path).await?;
        info!(path_id = created.id, path_name = %created.name, "Path created");
        Ok(created)
    }

    pub async fn update_path(&self, path: Path) -> Result<Path> {
        let updated = self.store.paths.update(path).await?;
        info!(path_id = updated.id, path_name = %updated.name, "Path updated");
        Ok(updated)
    }

    pub async fn delete_path(&self, id: i64, force: bool) -> Result<()> {
        self.store.paths.delete(id, force).await?;
        info!(path_id = id, force, "Path deleted");
        Ok(())
    }

    pub async fn get_path(&self, id: i64) -> Result<Path> {
        self.store.paths.get_by_id(id).await
    }

    pub async fn get_path_by_uid(&self, uid: &str) -> Result<Path> {
        self.store.paths.get_by_uid(uid).await
    }

    pub async fn list_paths(&self, params: &ListParams) -> Result<Vec<Path>> {
        self.store.paths.get(params).await
    }

    pub async fn count_paths(&self, params: &ListParams) -> Result<u64> {
        self.store.paths.count(params).await
    }

    pub async fn paths_by_id(&self, params: &ListParams) -> Result<HashMap<i64, Path>> {
        self.store.paths.get_map_by_id(params).await
    }

    pub async fn paths_by_uid(&self, params: &ListParams) -> Result<HashMap<String, Path>> {
        self.store.paths.get_map_by_uid(params).await
    }

    // Secrets

    pub async fn create_secret(&self, secret: Secret) -> Result<Secret> {
        let created = self.store.secrets.create(secret).await?;
        info!(
            secret_id = created.id,
            secret_name = %created.name,
            path_id = created.path_id,
            "Secret created"
        );
        Ok(created)
    }

    pub async fn update_secret(&self, secret: Secret) -> Result<Secret> {
        let updated = self.store.secrets.update(secret).await?;
        info!(secret_id = updated.id, secret_name = %updated.name, "Secret updated");
        Ok(updated)
    }

    pub async fn delete_secret(&self, id: i64, force: bool) -> Result<()> {
        self.store.secrets.delete(id, force).await?;
        info!(secret_id = id, force, "Secret deleted");
        Ok(())
    }

    pub async fn get_secret(&self, id: i64) -> Result<Secret> {
        self.store.secrets.get_by_id(id).await
    }

    pub async fn get_secret_by_uid(&self, uid: &str) -> Result<Secret> {
        self.store.secrets.get_by_uid(uid).await
    }

    pub async fn list_secrets(&self, params: &ListParams) -> Result<Vec<Secret>> {
        self.store.secrets.get(params).await
    }

    pub async fn count_secrets(&self, params: &ListParams) -> Result<u64> {
        self.store.secrets.count(params).await
    }

    pub async fn secrets_by_id(&self, params: &ListParams) -> Result<HashMap<i64, Secret>> {
        self.store.secrets.get_map_by_id(params).await
    }

    pub async fn secrets_by_uid(&self, params: &ListParams) -> Result<HashMap<String, Secret>> {
        self.store.secrets.get_map_by_uid(params).await
    }

    /// Resolve a live secret's value against every other live secret
    pub async fn evaluate_secret(&self, id: i64) -> Result<String> {
        let secret = self.get_secret(id).await?;
        secret.evaluate(self).await
    }
}

#[async_trait]
impl SecretsLookup for SecretService {
    async fn live_secrets(&self) -> Result<Vec<Secret>> {
        self.store.secrets.get(&ListParams::new()).await
    }
}
