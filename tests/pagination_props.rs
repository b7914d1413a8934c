//! Page windows partition the sorted result set

use keystash::domain::{Folder, ListParams};
use keystash::storage::{MemoryRepository, Repository};
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pages_cover_every_record_once(total in 0usize..40, page_size in 1u64..12) {
        runtime().block_on(async {
            let repo = MemoryRepository::<Folder>::new();
            for i in 0..total {
                repo.create(Folder::new(0, format!("f{i:02}"))).await.unwrap();
            }

            let mut seen = Vec::new();
            let pages = (total as u64).div_ceil(page_size);
            for page in 1..=pages + 1 {
                let params = ListParams::new().sort_by("name", false).paginate(page, page_size);
                let records = repo.get(&params).await.unwrap();

                if page > pages {
                    prop_assert!(records.is_empty());
                } else if page < pages {
                    prop_assert_eq!(records.len() as u64, page_size);
                } else {
                    prop_assert!(!records.is_empty() && records.len() as u64 <= page_size);
                }
                prop_assert_eq!(repo.count(&params).await.unwrap(), total as u64);
                seen.extend(records.into_iter().map(|f| f.id));
            }

            let expected: Vec<i64> = (1..=total as i64).rev().collect();
            prop_assert_eq!(seen, expected);
            Ok(())
        })?;
    }
}
