//! Repository contract shared by every backend
//!
//! Each test builds the full set of backends from `common::backends()` and
//! asserts the same observable behaviour on all of them.

mod common;

use common::{at, backends};
use keystash::domain::{DeletedMode, Folder, ListParams, Path, Secret, TimeRange};
use keystash::errors::KeystashError;

#[tokio::test]
async fn test_ids_are_sequential_and_count_deleted_records() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        assert_eq!(folders.next_id().await.unwrap(), 1, "{label}");
        let a = folders.create(Folder::new(0, "a")).await.unwrap();
        let b = folders.create(Folder::new(0, "b")).await.unwrap();
        let c = folders.create(Folder::new(0, "c")).await.unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3), "{label}");
        assert!(!a.uid.is_empty() && a.uid != b.uid, "{label}");
        assert_eq!(a.created_at, a.updated_at, "{label}");

        folders.delete(c.id, false).await.unwrap();
        assert_eq!(folders.next_id().await.unwrap(), 4, "{label}: soft-deleted IDs stay taken");

        folders.delete(c.id, true).await.unwrap();
        assert_eq!(folders.next_id().await.unwrap(), 3, "{label}: forced delete frees the top ID");
    }
}

#[tokio::test]
async fn test_live_name_uniqueness_per_parent() {
    for backend in backends().await {
        let secrets = &backend.store.secrets;
        let label = &backend.label;

        let first = secrets.create(Secret::new(1, "TOKEN", "a", "string")).await.unwrap();
        let err = secrets.create(Secret::new(1, "TOKEN", "b", "string")).await.unwrap_err();
        assert!(err.is_already_exists(), "{label}: {err}");

        // Same name under another path is fine
        secrets.create(Secret::new(2, "TOKEN", "c", "string")).await.unwrap();

        // A soft-deleted record frees its name
        secrets.delete(first.id, false).await.unwrap();
        let again = secrets.create(Secret::new(1, "TOKEN", "d", "string")).await.unwrap();
        assert_eq!(again.id, 3, "{label}");
        assert_eq!(secrets.count(&ListParams::new()).await.unwrap(), 2, "{label}");
    }
}

#[tokio::test]
async fn test_update_replaces_fields_and_keeps_identity() {
    for backend in backends().await {
        let paths = &backend.store.paths;
        let label = &backend.label;

        let prod = paths.create(Path { created_at: at(0), ..Path::new(0, "prod") }).await.unwrap();
        let dev = paths.create(Path::new(0, "dev")).await.unwrap();

        let moved = paths
            .update(Path {
                parent_id: 7,
                name: "production".to_string(),
                uid: String::new(),
                ..prod.clone()
            })
            .await
            .unwrap();
        assert_eq!(moved.uid, prod.uid, "{label}");
        assert_eq!(moved.created_at, at(0), "{label}");
        assert!(moved.updated_at > prod.updated_at, "{label}");

        let stored = paths.get_by_id(prod.id).await.unwrap();
        assert_eq!(stored, moved, "{label}");

        // Renaming onto a live sibling collides
        let renamed = paths.update(Path { name: "production".to_string(), ..dev.clone() }).await;
        assert!(renamed.is_ok(), "{label}: different parent, no collision");
        let err = paths
            .update(Path { parent_id: 7, name: "production".to_string(), ..dev.clone() })
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "{label}: {err}");

        let err = paths.update(Path { id: 99, ..dev.clone() }).await.unwrap_err();
        assert!(err.is_not_found(), "{label}: {err}");

        paths.delete(dev.id, false).await.unwrap();
        let err = paths.update(dev.clone()).await.unwrap_err();
        assert!(err.is_not_found(), "{label}: soft-deleted records cannot be updated");
    }
}

#[tokio::test]
async fn test_delete_modes() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        let folder = folders.create(Folder::new(0, "tmp")).await.unwrap();
        folders.delete(folder.id, false).await.unwrap();

        assert!(folders.get_by_id(folder.id).await.unwrap_err().is_not_found(), "{label}");
        assert!(folders.delete(folder.id, false).await.unwrap_err().is_not_found(), "{label}");

        let deleted =
            folders.get(&ListParams::new().with_deleted(DeletedMode::Deleted)).await.unwrap();
        assert_eq!(deleted.len(), 1, "{label}");
        assert!(deleted[0].deleted_at.is_some(), "{label}");

        // Forced delete removes soft-deleted records too
        folders.delete(folder.id, true).await.unwrap();
        assert!(folders.load().await.unwrap().is_empty(), "{label}");
        assert!(folders.delete(folder.id, true).await.unwrap_err().is_not_found(), "{label}");
    }
}

#[tokio::test]
async fn test_filters() {
    for backend in backends().await {
        let secrets = &backend.store.secrets;
        let label = &backend.label;

        let a = secrets.create(Secret::new(1, "DB_HOST", "h", "string")).await.unwrap();
        let b = secrets.create(Secret::new(1, "DB_PORT", "5432", "int")).await.unwrap();
        let c = secrets.create(Secret::new(2, "API_KEY", "k", "string")).await.unwrap();
        let d = secrets.create(Secret::new(2, "DB_USER", "u", "string")).await.unwrap();
        secrets.delete(d.id, false).await.unwrap();

        let ids = |records: Vec<Secret>| {
            let mut ids: Vec<i64> = records.iter().map(|r| r.id).collect();
            ids.sort();
            ids
        };

        let by_id = secrets.get(&ListParams::new().with_ids([a.id, c.id, d.id])).await.unwrap();
        assert_eq!(ids(by_id), vec![a.id, c.id], "{label}");

        let by_uid = secrets.get(&ListParams::new().with_uids([b.uid.clone()])).await.unwrap();
        assert_eq!(ids(by_uid), vec![b.id], "{label}");

        let by_path = secrets.get(&ListParams::new().with_path_ids([2])).await.unwrap();
        assert_eq!(ids(by_path), vec![c.id], "{label}");

        let by_name = secrets.get(&ListParams::new().with_name("DB_*")).await.unwrap();
        assert_eq!(ids(by_name), vec![a.id, b.id], "{label}");

        let class = secrets.get(&ListParams::new().with_name("DB_[!H]OR?")).await.unwrap();
        assert_eq!(ids(class), vec![b.id], "{label}");

        let both = secrets
            .get(&ListParams::new().with_name("DB_*").with_deleted(DeletedMode::Both))
            .await
            .unwrap();
        assert_eq!(ids(both), vec![a.id, b.id, d.id], "{label}");

        let literal = secrets.get(&ListParams::new().with_name("DB.HOST")).await.unwrap();
        assert!(literal.is_empty(), "{label}: '.' is not a wildcard");
    }
}

#[tokio::test]
async fn test_time_ranges() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        for (i, name) in ["jan", "feb", "mar"].iter().enumerate() {
            let created_at = at(i as i64 * 100);
            folders.create(Folder { created_at, ..Folder::new(0, *name) }).await.unwrap();
        }

        let params = ListParams::new()
            .created_between(TimeRange::between(at(50), at(200)))
            .sort_by("id", true);
        let names: Vec<String> =
            folders.get(&params).await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["feb", "mar"], "{label}");

        let open_ended = ListParams::new().created_between(TimeRange::new(None, Some(at(100))));
        assert_eq!(folders.count(&open_ended).await.unwrap(), 2, "{label}");

        let inverted = ListParams::new().created_between(TimeRange::between(at(200), at(0)));
        let err = folders.get(&inverted).await.unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }), "{label}: {err}");
        assert!(folders.count(&inverted).await.is_err(), "{label}");

        // A deletion range only matches deleted records
        folders.delete(1, false).await.unwrap();
        let removed = ListParams::new()
            .with_deleted(DeletedMode::Both)
            .deleted_between(TimeRange::new(Some(at(0)), None));
        let deleted: Vec<i64> =
            folders.get(&removed).await.unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(deleted, vec![1], "{label}");
    }
}

#[tokio::test]
async fn test_multi_key_sort() {
    for backend in backends().await {
        let secrets = &backend.store.secrets;
        let label = &backend.label;

        secrets.create(Secret::new(2, "B", "1", "int")).await.unwrap();
        secrets.create(Secret::new(1, "B", "2", "int")).await.unwrap();
        secrets.create(Secret::new(1, "A", "3", "int")).await.unwrap();
        secrets.create(Secret::new(2, "A", "4", "int")).await.unwrap();

        let params = ListParams::new().sort_by("Name", true).sort_by("path_id", false);
        let order: Vec<i64> = secrets.get(&params).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![4, 3, 1, 2], "{label}");

        // Unknown keys are skipped; ties fall back to ID
        let params = ListParams::new().sort_by("colour", true).sort_by("pathid", true);
        let order: Vec<i64> = secrets.get(&params).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![2, 3, 1, 4], "{label}");

        let params = ListParams::new().sort_by("id", false);
        let order: Vec<i64> = secrets.get(&params).await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(order, vec![4, 3, 2, 1], "{label}");
    }
}

#[tokio::test]
async fn test_pagination_and_count() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        for i in 0..5 {
            folders.create(Folder::new(0, format!("f{i}"))).await.unwrap();
        }

        let page = |n: u64| ListParams::new().sort_by("id", true).paginate(n, 2);
        let ids = |records: Vec<Folder>| records.into_iter().map(|f| f.id).collect::<Vec<_>>();

        assert_eq!(ids(folders.get(&page(1)).await.unwrap()), vec![1, 2], "{label}");
        assert_eq!(ids(folders.get(&page(3)).await.unwrap()), vec![5], "{label}");
        assert!(folders.get(&page(4)).await.unwrap().is_empty(), "{label}");

        // Count ignores the page window
        assert_eq!(folders.count(&page(3)).await.unwrap(), 5, "{label}");

        let err = folders.get(&ListParams::new().paginate(2, 0)).await.unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }), "{label}");
        let err = folders.count(&ListParams::new().paginate(2, 0)).await.unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }), "{label}");
    }
}

#[tokio::test]
async fn test_lookups_and_maps() {
    for backend in backends().await {
        let paths = &backend.store.paths;
        let label = &backend.label;

        let root = paths.create(Path::new(0, "/")).await.unwrap();
        let child = paths.create(Path::new(root.id, "app")).await.unwrap();

        assert_eq!(paths.get_by_uid(&child.uid).await.unwrap(), child, "{label}");
        assert!(paths.get_by_uid("missing").await.unwrap_err().is_not_found(), "{label}");

        let by_id = paths.get_map_by_id(&ListParams::new()).await.unwrap();
        assert_eq!(by_id.len(), 2, "{label}");
        assert_eq!(by_id[&root.id], root, "{label}");

        let by_uid =
            paths.get_map_by_uid(&ListParams::new().with_parent_ids([root.id])).await.unwrap();
        assert_eq!(by_uid.keys().collect::<Vec<_>>(), vec![&child.uid], "{label}");
    }
}

#[tokio::test]
async fn test_create_keeps_supplied_identity() {
    for backend in backends().await {
        let secrets = &backend.store.secrets;
        let label = &backend.label;

        let imported = Secret {
            id: 10,
            uid: "imported-uid".to_string(),
            created_at: at(5),
            ..Secret::new(1, "IMPORTED", "x", "string")
        };
        let created = secrets.create(imported).await.unwrap();
        assert_eq!((created.id, created.uid.as_str()), (10, "imported-uid"), "{label}");
        assert_eq!((created.created_at, created.updated_at), (at(5), at(5)), "{label}");
        assert_eq!(secrets.next_id().await.unwrap(), 11, "{label}");

        let clash = Secret { id: 10, ..Secret::new(1, "OTHER", "y", "string") };
        assert!(secrets.create(clash).await.unwrap_err().is_already_exists(), "{label}");
    }
}

#[tokio::test]
async fn test_uids_are_globally_unique() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        let first =
            folders.create(Folder { uid: "dup".to_string(), ..Folder::new(0, "a") }).await.unwrap();
        let err = folders
            .create(Folder { uid: "dup".to_string(), ..Folder::new(0, "b") })
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "{label}: {err}");

        // A soft-deleted record keeps its UID
        folders.delete(first.id, false).await.unwrap();
        let err = folders
            .create(Folder { uid: "dup".to_string(), ..Folder::new(0, "c") })
            .await
            .unwrap_err();
        assert!(err.is_already_exists(), "{label}: {err}");

        let params = ListParams::new().with_uids(["dup"]).with_deleted(DeletedMode::Both);
        assert_eq!(folders.count(&params).await.unwrap(), 1, "{label}");
    }
}

#[tokio::test]
async fn test_supplied_ids_are_bounded() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        let negative = Folder { id: -1, ..Folder::new(0, "negative") };
        let err = folders.create(negative).await.unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }), "{label}: {err}");

        let last = folders.create(Folder { id: i64::MAX, ..Folder::new(0, "last") }).await.unwrap();
        assert_eq!(last.id, i64::MAX, "{label}");

        // The ID space is exhausted; nothing panics
        let err = folders.create(Folder::new(0, "next")).await.unwrap_err();
        assert!(matches!(err, KeystashError::InvalidParameter { .. }), "{label}: {err}");
        assert!(folders.next_id().await.is_err(), "{label}");
        assert_eq!(folders.count(&ListParams::new()).await.unwrap(), 1, "{label}");
    }
}

#[tokio::test]
async fn test_name_patterns_span_lines() {
    for backend in backends().await {
        let folders = &backend.store.folders;
        let label = &backend.label;

        folders.create(Folder::new(0, "a\nb")).await.unwrap();
        folders.create(Folder::new(0, "b\na")).await.unwrap();

        let matched = folders.get(&ListParams::new().with_name("a*")).await.unwrap();
        assert_eq!(matched.len(), 1, "{label}");
        assert_eq!(matched[0].name, "a\nb", "{label}");
        assert_eq!(folders.count(&ListParams::new().with_name("a?b")).await.unwrap(), 1, "{label}");
    }
}
