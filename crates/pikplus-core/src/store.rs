//! Pure list operations behind the local task and share collections.
//!
//! Lists are ordered most-recent-first. Every function takes the current
//! list by value and returns the next one, so the caller decides when the
//! result becomes visible.

use crate::record::{LocalShare, LocalTask, TaskId};

pub trait Keyed {
    fn key(&self) -> &TaskId;
}

impl Keyed for LocalTask {
    fn key(&self) -> &TaskId {
        &self.id
    }
}

impl Keyed for LocalShare {
    fn key(&self) -> &TaskId {
        &self.id
    }
}

/// Drops any entry with the same id, then puts `new_task` at the front.
pub fn add_or_replace_task(mut existing: Vec<LocalTask>, new_task: LocalTask) -> Vec<LocalTask> {
    existing.retain(|task| task.id != new_task.id);
    existing.insert(0, new_task);
    existing
}

/// One share per file: a second share for the same `file_id` is ignored.
pub fn add_share_if_absent(existing: Vec<LocalShare>, new_share: LocalShare) -> Vec<LocalShare> {
    if existing
        .iter()
        .any(|share| share.file_id == new_share.file_id)
    {
        return existing;
    }

    let mut updated = Vec::with_capacity(existing.len() + 1);
    updated.push(new_share);
    updated.extend(existing);
    updated
}

pub fn delete_by_id<T: Keyed>(mut existing: Vec<T>, id: &TaskId) -> Vec<T> {
    existing.retain(|item| item.key() != id);
    existing
}

pub fn clear_all<T>() -> Vec<T> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn local(id: u64, url: &str) -> LocalTask {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        LocalTask::new(id, url, now)
    }

    fn share(id: u64, file_id: &str) -> LocalShare {
        LocalShare {
            id: TaskId::Num(id),
            file_name: format!("file-{id}"),
            share_url: format!("https://share.example/{id}"),
            pass_code: None,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            file_id: file_id.to_string(),
        }
    }

    #[test]
    fn add_to_empty() {
        let t1 = local(1, "a");
        assert_eq!(add_or_replace_task(vec![], t1.clone()), vec![t1]);
    }

    #[test]
    fn replacing_moves_to_front() {
        let t1 = local(1, "a");
        let t2 = local(2, "b");
        let mut t1_updated = local(1, "a");
        t1_updated.status = "done".to_string();

        let front = add_or_replace_task(vec![t1.clone(), t2.clone()], t1_updated.clone());
        assert_eq!(front, vec![t1_updated.clone(), t2.clone()]);

        let back = add_or_replace_task(vec![t2.clone(), t1], t1_updated.clone());
        assert_eq!(back, vec![t1_updated, t2]);
    }

    #[test]
    fn new_task_is_prepended() {
        let list = add_or_replace_task(vec![local(1, "a")], local(2, "b"));
        let ids: Vec<_> = list.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![TaskId::Num(2), TaskId::Num(1)]);
    }

    #[test]
    fn shares_are_unique_per_file() {
        let s1 = share(1, "f1");
        let same_file = share(2, "f1");
        assert_eq!(add_share_if_absent(vec![s1.clone()], same_file), vec![s1.clone()]);

        let other_file = share(2, "f2");
        assert_eq!(
            add_share_if_absent(vec![s1.clone()], other_file.clone()),
            vec![other_file, s1]
        );
    }

    #[test]
    fn delete_is_idempotent() {
        let list = vec![local(1, "a"), local(2, "b")];
        let once = delete_by_id(list, &TaskId::Num(1));
        assert_eq!(once.len(), 1);
        let twice = delete_by_id(once.clone(), &TaskId::Num(1));
        assert_eq!(twice, once);
    }

    #[test]
    fn clear_returns_empty() {
        let empty: Vec<LocalShare> = clear_all();
        assert!(empty.is_empty());
    }
}
