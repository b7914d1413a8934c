//! Folder → path → secret lifecycle through the service facade, on every backend

mod common;

use common::backends;
use keystash::domain::{DeletedMode, Folder, ListParams, Path, Secret};
use keystash::SecretService;

#[tokio::test]
async fn test_lifecycle_on_every_backend() {
    for backend in backends().await {
        let label = backend.label.clone();
        let service = SecretService::new(backend.store.clone());

        let folder = service.create_folder(Folder::new(0, "root")).await.unwrap();
        assert_eq!(folder.id, 1, "{label}");

        let path = service.create_path(Path::new(0, "/")).await.unwrap();
        assert_eq!(path.id, 1, "{label}");

        let secret = service.create_secret(Secret::new(1, "DEBUG", "true", "bool")).await.unwrap();
        assert_eq!(secret.id, 1, "{label}");
        assert!(!secret.uid.is_empty(), "{label}");

        let found = service.list_secrets(&ListParams::new().with_path_ids([1])).await.unwrap();
        assert_eq!(found, vec![secret.clone()], "{label}");
        assert_eq!(service.evaluate_secret(secret.id).await.unwrap(), "true", "{label}");

        service.delete_secret(1, false).await.unwrap();
        assert!(service.list_secrets(&ListParams::new()).await.unwrap().is_empty(), "{label}");

        let deleted = service
            .list_secrets(&ListParams::new().with_deleted(DeletedMode::Deleted))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1, "{label}");
        assert_eq!(deleted[0].id, 1, "{label}");
        assert!(deleted[0].deleted_at.is_some(), "{label}");

        // The stored value is never rewritten by evaluation
        assert_eq!(deleted[0].value, "true", "{label}");
    }
}
