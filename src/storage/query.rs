//! # Filter / Sort / Paginate Engine
//!
//! The single implementation of [`ListParams`] semantics. The in-memory
//! repository runs it directly; the key-value and file repositories load their
//! collection and hand it here, and the mirror decorator reads through an
//! in-memory repository. Only the database repository translates the same
//! rules into SQL.
//!
//! Evaluation order: ID allow-list, UID allow-list, parent allow-list, name
//! pattern, created/updated/deleted ranges, soft-delete mode. Then a stable
//! multi-key sort, then the page window.

use crate::domain::{normalize_field, Entity, ListParams, SortKey, TimeRange};
use crate::errors::{KeystashError, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Compiled predicate pipeline for one descriptor
pub struct Filter {
    ids: Option<HashSet<i64>>,
    uids: Option<HashSet<String>>,
    parent_ids: Option<HashSet<i64>>,
    name: Option<Regex>,
    created: TimeRange,
    updated: TimeRange,
    removed: TimeRange,
    deleted: crate::domain::DeletedMode,
}

impl Filter {
    /// Validate the descriptor and compile its predicates
    pub fn compile(params: &ListParams) -> Result<Self> {
        params.validate()?;

        let name = match params.name.as_deref() {
            Some(pattern) if !pattern.is_empty() => Some(glob_to_regex(pattern)?),
            _ => None,
        };

        Ok(Self {
            ids: non_empty(&params.ids),
            uids: non_empty(&params.uids),
            parent_ids: non_empty(&params.parent_ids),
            name,
            created: params.created,
            updated: params.updated,
            removed: params.removed,
            deleted: params.deleted,
        })
    }

    pub fn matches<E: Entity>(&self, record: &E) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&record.id()) {
                return false;
            }
        }
        if let Some(uids) = &self.uids {
            if !uids.contains(record.uid()) {
                return false;
            }
        }
        if let Some(parent_ids) = &self.parent_ids {
            if !parent_ids.contains(&record.parent_id()) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if !name.is_match(record.name()) {
                return false;
            }
        }
        if !self.created.is_zero() && !self.created.contains(record.created_at()) {
            return false;
        }
        if !self.updated.is_zero() && !self.updated.contains(record.updated_at()) {
            return false;
        }
        if !self.removed.is_zero() {
            match record.deleted_at() {
                Some(at) if self.removed.contains(at) => {}
                _ => return false,
            }
        }
        self.deleted.admits(record.deleted_at())
    }
}

fn non_empty<T: Clone + Eq + std::hash::Hash>(values: &[T]) -> Option<HashSet<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().cloned().collect())
    }
}

/// Translate a shell-style glob (`*`, `?`, `[abc]`, `[!abc]`) into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut out = String::with_capacity(pattern.len() * 2 + 6);
    // Wildcards match newlines too, as SQLite `GLOB` does
    out.push_str("(?s)^");

    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                // `[]` and unterminated classes are matched literally
                Some(len) if len > 0 => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    out.push('[');
                    let body = match class.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            rest.to_string()
                        }
                        None => class,
                    };
                    for c in body.chars() {
                        if c == '\\' || c == '[' || c == ']' || c == '^' {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                    i += len + 1;
                }
                _ => out.push_str(r"\["),
            },
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');

    Regex::new(&out).map_err(|e| {
        KeystashError::invalid_field(format!("invalid name pattern '{}': {}", pattern, e), "name")
    })
}

/// A single sort key turned into a comparator
pub type Comparator<E> = Box<dyn Fn(&E, &E) -> Ordering + Send + Sync>;

/// Build the comparator chain for the declared keys. Unknown fields compare
/// equal, so they never decide an order.
pub fn comparators<E: Entity>(keys: &[SortKey]) -> Vec<Comparator<E>> {
    keys.iter()
        .map(|key| {
            let field = normalize_field(&key.field);
            let ascending = key.ascending;
            Box::new(move |a: &E, b: &E| {
                let ordering = a.compare_by(b, &field).unwrap_or(Ordering::Equal);
                if ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            }) as Comparator<E>
        })
        .collect()
}

/// Stable multi-key sort: the first comparator that discriminates decides
pub fn sort<E: Entity>(records: &mut [E], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    let chain = comparators::<E>(keys);
    records.sort_by(|a, b| {
        chain.iter().map(|compare| compare(a, b)).find(|o| o.is_ne()).unwrap_or(Ordering::Equal)
    });
}

/// Apply the page window; an offset past the end yields an empty page
pub fn paginate<E>(records: Vec<E>, params: &ListParams) -> Vec<E> {
    match params.window() {
        None => records,
        Some((offset, size)) => {
            let len = records.len() as u64;
            let start = offset.min(len) as usize;
            let end = offset.saturating_add(size).min(len) as usize;
            records.into_iter().skip(start).take(end - start).collect()
        }
    }
}

/// Run the whole pipeline over a collection
pub fn apply<E, I>(records: I, params: &ListParams) -> Result<Vec<E>>
where
    E: Entity,
    I: IntoIterator<Item = E>,
{
    let filter = Filter::compile(params)?;
    let mut matched: Vec<E> = records.into_iter().filter(|r| filter.matches(r)).collect();
    sort(&mut matched, &params.sort);
    Ok(paginate(matched, params))
}

/// Count records passing the filters; sorting and paging are ignored
pub fn count<'a, E, I>(records: I, params: &ListParams) -> Result<u64>
where
    E: Entity,
    I: IntoIterator<Item = &'a E>,
{
    params.validate()?;
    let filter = Filter::compile(&params.for_count())?;
    Ok(records.into_iter().filter(|r| filter.matches(*r)).count() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeletedMode, Folder};
    use chrono::{Duration, Utc};

    fn folder(id: i64, parent_id: i64, name: &str) -> Folder {
        Folder { id, uid: format!("uid-{}", id), ..Folder::new(parent_id, name) }
    }

    fn sample() -> Vec<Folder> {
        vec![
            folder(1, 0, "alpha"),
            folder(2, 0, "beta"),
            folder(3, 1, "alpine"),
            folder(4, 1, "gamma"),
            folder(5, 2, "beta"),
        ]
    }

    fn ids(records: &[Folder]) -> Vec<i64> {
        records.iter().map(|f| f.id).collect()
    }

    #[test]
    fn test_default_params_return_everything_live() {
        let result = apply(sample(), &ListParams::default()).unwrap();
        assert_eq!(ids(&result), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_allow_lists() {
        let result = apply(sample(), &ListParams::new().with_ids([2, 4, 9])).unwrap();
        assert_eq!(ids(&result), vec![2, 4]);

        let result = apply(sample(), &ListParams::new().with_uids(["uid-5"])).unwrap();
        assert_eq!(ids(&result), vec![5]);

        let result = apply(sample(), &ListParams::new().with_parent_ids([1])).unwrap();
        assert_eq!(ids(&result), vec![3, 4]);
    }

    #[test]
    fn test_glob_patterns() {
        let result = apply(sample(), &ListParams::new().with_name("alp*")).unwrap();
        assert_eq!(ids(&result), vec![1, 3]);

        let result = apply(sample(), &ListParams::new().with_name("?eta")).unwrap();
        assert_eq!(ids(&result), vec![2, 5]);

        let result = apply(sample(), &ListParams::new().with_name("[ab]*")).unwrap();
        assert_eq!(ids(&result), vec![1, 2, 3, 5]);

        let result = apply(sample(), &ListParams::new().with_name("[!ab]*")).unwrap();
        assert_eq!(ids(&result), vec![4]);
    }

    #[test]
    fn test_glob_escapes_regex_metacharacters() {
        let re = glob_to_regex("a.b+(c)").unwrap();
        assert!(re.is_match("a.b+(c)"));
        assert!(!re.is_match("axb+(c)"));
        assert!(glob_to_regex("[").unwrap().is_match("["));
    }

    #[test]
    fn test_glob_wildcards_match_newlines() {
        assert!(glob_to_regex("a*").unwrap().is_match("a\nb"));
        assert!(glob_to_regex("a?b").unwrap().is_match("a\nb"));
        assert!(!glob_to_regex("a*").unwrap().is_match("b\na"));
    }

    #[test]
    fn test_deleted_modes() {
        let mut records = sample();
        records[1].deleted_at = Some(Utc::now());

        let live = apply(records.clone(), &ListParams::new()).unwrap();
        assert_eq!(ids(&live), vec![1, 3, 4, 5]);

        let deleted =
            apply(records.clone(), &ListParams::new().with_deleted(DeletedMode::Deleted)).unwrap();
        assert_eq!(ids(&deleted), vec![2]);

        let both = apply(records, &ListParams::new().with_deleted(DeletedMode::Both)).unwrap();
        assert_eq!(both.len(), 5);
    }

    #[test]
    fn test_time_ranges() {
        let base = Utc::now();
        let records: Vec<Folder> = sample()
            .into_iter()
            .map(|mut f| {
                f.created_at = base + Duration::minutes(f.id);
                f
            })
            .collect();

        let range = TimeRange::between(base + Duration::minutes(2), base + Duration::minutes(4));
        let result = apply(records.clone(), &ListParams::new().created_between(range)).unwrap();
        assert_eq!(ids(&result), vec![2, 3, 4]);

        // An inactive range filters nothing
        let result = apply(records, &ListParams::new().updated_between(TimeRange::default()))
            .unwrap();
        assert_eq!(result.len(), 5);
    }

    #[test]
    fn test_deleted_range_requires_deletion() {
        let now = Utc::now();
        let mut records = sample();
        records[0].deleted_at = Some(now);
        let params = ListParams::new()
            .with_deleted(DeletedMode::Both)
            .deleted_between(TimeRange::new(Some(now - Duration::seconds(1)), None));
        assert_eq!(ids(&apply(records, &params).unwrap()), vec![1]);
    }

    #[test]
    fn test_multi_key_sort() {
        let params = ListParams::new().sort_by("Name", true).sort_by("ID", false);
        let result = apply(sample(), &params).unwrap();
        assert_eq!(ids(&result), vec![1, 3, 5, 2, 4]);
    }

    #[test]
    fn test_sort_is_stable_and_ignores_unknown_fields() {
        let params = ListParams::new().sort_by("Colour", true).sort_by("parent_id", true);
        let result = apply(sample(), &params).unwrap();
        assert_eq!(ids(&result), vec![1, 2, 3, 4, 5]);

        let params = ListParams::new().sort_by("ParentID", false);
        let result = apply(sample(), &params).unwrap();
        assert_eq!(ids(&result), vec![5, 3, 4, 1, 2]);
    }

    #[test]
    fn test_pagination_windows() {
        let page = |p, s| ids(&apply(sample(), &ListParams::new().paginate(p, s)).unwrap());
        assert_eq!(page(1, 2), vec![1, 2]);
        assert_eq!(page(3, 2), vec![5]);
        assert_eq!(page(4, 2), Vec::<i64>::new());
        assert_eq!(page(100, 10), Vec::<i64>::new());
    }

    #[test]
    fn test_count_ignores_paging() {
        let records = sample();
        let params = ListParams::new().with_name("*a*").paginate(1, 1).sort_by("name", false);
        assert_eq!(count(&records, &params).unwrap(), 5);
        assert_eq!(count(&records, &ListParams::new().with_parent_ids([0])).unwrap(), 2);
    }

    #[test]
    fn test_invalid_params_are_rejected() {
        let now = Utc::now();
        let params =
            ListParams::new().created_between(TimeRange::between(now, now - Duration::days(1)));
        assert!(matches!(
            apply(sample(), &params).unwrap_err(),
            KeystashError::InvalidParameter { .. }
        ));

        // Paging is validated before count drops it
        let records = sample();
        let params = ListParams::new().paginate(2, 0);
        assert!(matches!(
            count(&records, &params).unwrap_err(),
            KeystashError::InvalidParameter { .. }
        ));
    }
}
