use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::record::{LocalShare, LocalTask, TaskId};
use crate::store;

pub const TASKS_KEY: &str = "pikpak_tasks";
pub const SHARES_KEY: &str = "pikpak_shares";

/// Flat key to JSON-string storage, the shape of browser local storage.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// One `<key>.json` file per key, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), bytes = value.len(), "writing storage key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

pub fn encode_list<T: Serialize>(items: &[T]) -> anyhow::Result<String> {
    serde_json::to_string(items).context("failed to encode list")
}

pub fn decode_list<T: DeserializeOwned>(raw: &str) -> anyhow::Result<Vec<T>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).context("failed to decode list")
}

/// Reads a list, treating a corrupted entry as empty.
#[tracing::instrument(skip(storage))]
fn load_list<S, T>(storage: &S, key: &str) -> anyhow::Result<Vec<T>>
where
    S: KeyValueStorage,
    T: DeserializeOwned,
{
    let Some(raw) = storage.get(key)? else {
        return Ok(Vec::new());
    };

    match decode_list(&raw) {
        Ok(items) => {
            debug!(count = items.len(), "loaded list from storage");
            Ok(items)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "corrupted list in storage; treating as empty");
            Ok(Vec::new())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Cleared,
    Reloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: &'static str,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&StoreEvent) + Send>;

/// Single owner of the local task and share lists.
///
/// Every mutation writes the full list under its key before the in-memory
/// copy is replaced, and listeners hear about it only after that write
/// succeeded. A failed write leaves both copies untouched.
pub struct LocalStore<S: KeyValueStorage> {
    storage: S,
    tasks: Vec<LocalTask>,
    shares: Vec<LocalShare>,
    listeners: BTreeMap<SubscriptionId, Listener>,
    next_subscription: u64,
}

impl<S: KeyValueStorage> fmt::Debug for LocalStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalStore")
            .field("tasks", &self.tasks.len())
            .field("shares", &self.shares.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl LocalStore<FileStorage> {
    pub fn open_dir(data_dir: &Path) -> anyhow::Result<Self> {
        let storage = FileStorage::open(data_dir)?;
        Self::open(storage)
            .with_context(|| format!("failed to open local store at {}", data_dir.display()))
    }
}

impl<S: KeyValueStorage> LocalStore<S> {
    #[tracing::instrument(skip(storage))]
    pub fn open(storage: S) -> anyhow::Result<Self> {
        let tasks = load_list(&storage, TASKS_KEY)?;
        let shares = load_list(&storage, SHARES_KEY)?;

        info!(tasks = tasks.len(), shares = shares.len(), "opened local store");

        Ok(Self {
            storage,
            tasks,
            shares,
            listeners: BTreeMap::new(),
            next_subscription: 1,
        })
    }

    pub fn tasks(&self) -> &[LocalTask] {
        &self.tasks
    }

    pub fn shares(&self) -> &[LocalShare] {
        &self.shares
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    pub fn local_urls(&self) -> std::collections::BTreeSet<String> {
        crate::filter::local_url_set(&self.tasks)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.insert(id, Box::new(listener));
        debug!(subscription = id.0, "added store listener");
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn add_task(&mut self, task: LocalTask) -> anyhow::Result<()> {
        let next = store::add_or_replace_task(self.tasks.clone(), task);
        self.commit_tasks(next, ChangeKind::Added)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: &TaskId) -> anyhow::Result<()> {
        let next = store::delete_by_id(self.tasks.clone(), id);
        self.commit_tasks(next, ChangeKind::Deleted)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_tasks(&mut self) -> anyhow::Result<()> {
        self.commit_tasks(store::clear_all(), ChangeKind::Cleared)
    }

    /// Returns false when a share for the same file already exists.
    #[tracing::instrument(skip(self, share), fields(file_id = %share.file_id))]
    pub fn add_share(&mut self, share: LocalShare) -> anyhow::Result<bool> {
        let before = self.shares.len();
        let next = store::add_share_if_absent(self.shares.clone(), share);
        if next.len() == before {
            debug!("share already recorded for file");
            return Ok(false);
        }
        self.commit_shares(next, ChangeKind::Added)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_share(&mut self, id: &TaskId) -> anyhow::Result<()> {
        let next = store::delete_by_id(self.shares.clone(), id);
        self.commit_shares(next, ChangeKind::Deleted)
    }

    #[tracing::instrument(skip(self))]
    pub fn clear_shares(&mut self) -> anyhow::Result<()> {
        self.commit_shares(store::clear_all(), ChangeKind::Cleared)
    }

    /// Picks up writes made through another handle on the same storage.
    #[tracing::instrument(skip(self))]
    pub fn reload(&mut self) -> anyhow::Result<()> {
        self.tasks = load_list(&self.storage, TASKS_KEY)?;
        self.shares = load_list(&self.storage, SHARES_KEY)?;
        self.notify(TASKS_KEY, ChangeKind::Reloaded);
        self.notify(SHARES_KEY, ChangeKind::Reloaded);
        Ok(())
    }

    fn commit_tasks(&mut self, next: Vec<LocalTask>, kind: ChangeKind) -> anyhow::Result<()> {
        let json = encode_list(&next)?;
        self.storage
            .set(TASKS_KEY, &json)
            .with_context(|| format!("failed to write {TASKS_KEY}"))?;
        debug!(count = next.len(), ?kind, "committed tasks");
        self.tasks = next;
        self.notify(TASKS_KEY, kind);
        Ok(())
    }

    fn commit_shares(&mut self, next: Vec<LocalShare>, kind: ChangeKind) -> anyhow::Result<()> {
        let json = encode_list(&next)?;
        self.storage
            .set(SHARES_KEY, &json)
            .with_context(|| format!("failed to write {SHARES_KEY}"))?;
        debug!(count = next.len(), ?kind, "committed shares");
        self.shares = next;
        self.notify(SHARES_KEY, kind);
        Ok(())
    }

    fn notify(&self, key: &'static str, kind: ChangeKind) {
        let event = StoreEvent { key, kind };
        for listener in self.listeners.values() {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{TimeZone, Utc};

    use super::*;

    struct ReadOnlyStorage(MemoryStorage);

    impl KeyValueStorage for ReadOnlyStorage {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key)
        }

        fn set(&mut self, _key: &str, _value: &str) -> anyhow::Result<()> {
            Err(anyhow!("quota exceeded"))
        }

        fn remove(&mut self, _key: &str) -> anyhow::Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    fn task(id: u64) -> LocalTask {
        let now = Utc.with_ymd_and_hms(2025, 5, 4, 8, 30, 0).unwrap();
        let mut task = LocalTask::new(id, format!("magnet:?xt=urn:btih:{id:040}"), now);
        task.name = Some(format!("task {id}"));
        task.file_size = Some(id * 1024);
        task
    }

    #[test]
    fn task_list_roundtrips_through_codec() {
        let tasks = vec![task(1), task(2), task(3)];
        let encoded = encode_list(&tasks).unwrap();
        let decoded: Vec<LocalTask> = decode_list(&encoded).unwrap();
        assert_eq!(decoded, tasks);
    }

    #[test]
    fn reopening_reconstructs_state() {
        let mut store = LocalStore::open(MemoryStorage::new()).unwrap();
        store.add_task(task(1)).unwrap();
        store.add_task(task(2)).unwrap();
        store.delete_task(&TaskId::Num(1)).unwrap();
        let expected = store.tasks().to_vec();

        let reopened = LocalStore::open(store.into_storage()).unwrap();
        assert_eq!(reopened.tasks(), expected.as_slice());
    }

    #[test]
    fn corrupted_entry_reads_as_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(TASKS_KEY, "{not json").unwrap();
        let store = LocalStore::open(storage).unwrap();
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let mut seed = MemoryStorage::new();
        seed.set(TASKS_KEY, &encode_list(&[task(7)]).unwrap())
            .unwrap();

        let mut store = LocalStore::open(ReadOnlyStorage(seed)).unwrap();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        store.subscribe(move |_| *counter.lock().unwrap() += 1);

        assert!(store.add_task(task(8)).is_err());
        assert!(store.clear_tasks().is_err());
        assert_eq!(store.tasks(), &[task(7)]);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn listeners_hear_committed_changes() {
        let mut store = LocalStore::open(MemoryStorage::new()).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let id = store.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

        store.add_task(task(1)).unwrap();
        store.clear_tasks().unwrap();
        assert!(store.unsubscribe(id));
        store.add_task(task(2)).unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                StoreEvent { key: TASKS_KEY, kind: ChangeKind::Added },
                StoreEvent { key: TASKS_KEY, kind: ChangeKind::Cleared },
            ]
        );
    }

    #[test]
    fn duplicate_share_is_not_written() {
        let now = Utc.with_ymd_and_hms(2025, 5, 4, 8, 30, 0).unwrap();
        let share = |id: u64, file_id: &str| LocalShare {
            id: TaskId::Num(id),
            file_name: "movie.mkv".to_string(),
            share_url: format!("https://mypikpak.com/s/{id}"),
            pass_code: Some("abcd".to_string()),
            timestamp: now,
            file_id: file_id.to_string(),
        };

        let mut store = LocalStore::open(MemoryStorage::new()).unwrap();
        assert!(store.add_share(share(1, "f1")).unwrap());
        assert!(!store.add_share(share(2, "f1")).unwrap());
        assert!(store.add_share(share(3, "f2")).unwrap());

        let ids: Vec<_> = store.shares().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![TaskId::Num(3), TaskId::Num(1)]);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let temp = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        assert!(storage.path_for("../escape").is_err());
        assert!(storage.path_for(".hidden").is_err());
        assert!(storage.path_for(TASKS_KEY).is_ok());
    }
}
