//! In-process host used by tests and the local simulation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::game_id::GameId;
use crate::host::{
    Archive, ArchiveRecord, Host, HostError, Job, JobId, JobTable, KvStore, Realtime, ScheduledJob,
    Scheduler,
};
use crate::protocol::ChannelMessage;

#[derive(Clone, Debug, Default)]
pub struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self(Rc::new(Cell::new(start_ms)))
    }

    pub fn now_ms(&self) -> i64 {
        self.0.get()
    }

    pub fn set(&self, now_ms: i64) {
        self.0.set(now_ms);
    }

    pub fn advance(&self, ms: i64) -> i64 {
        let next = self.0.get() + ms;
        self.0.set(next);
        next
    }
}

#[derive(Clone, Debug)]
enum StoredValue {
    Text(String),
    Hash(Vec<(String, String)>),
}

#[derive(Clone, Debug)]
struct StoredEntry {
    value: StoredValue,
    expires_at_ms: Option<i64>,
}

#[derive(Clone, Debug)]
pub struct MemoryStore {
    clock: ManualClock,
    entries: Rc<RefCell<HashMap<String, StoredEntry>>>,
    fail_deletes: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            entries: Rc::new(RefCell::new(HashMap::new())),
            fail_deletes: Rc::new(Cell::new(false)),
        }
    }

    /// Makes deleting a live key fail until reset. Deleting a missing key
    /// still succeeds.
    pub fn set_failing_deletes(&self, failing: bool) {
        self.fail_deletes.set(failing);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Milliseconds until `key` expires, `None` when it has no ttl or is gone.
    pub fn ttl_ms(&self, key: &str) -> Option<i64> {
        let expires_at = self.live(key)?.expires_at_ms?;
        Some(expires_at - self.clock.now_ms())
    }

    /// Drops every key starting with `prefix`, as if it had expired.
    pub fn purge_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .borrow()
            .values()
            .filter(|entry| !is_expired(entry, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<StoredEntry> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.borrow_mut();
        match entries.get(key) {
            Some(entry) if is_expired(entry, now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    fn expires_at(&self, ttl: Duration) -> i64 {
        self.clock.now_ms() + ttl.as_millis() as i64
    }

    fn with_hash<T>(
        &self,
        hash_key: &str,
        f: impl FnOnce(&mut Vec<(String, String)>) -> Result<T, HostError>,
    ) -> Result<T, HostError> {
        let existing = self.live(hash_key);
        let mut entries = self.entries.borrow_mut();
        let entry = entries.entry(hash_key.to_string()).or_insert(StoredEntry {
            value: StoredValue::Hash(Vec::new()),
            expires_at_ms: None,
        });
        if existing.is_none() {
            entry.value = StoredValue::Hash(Vec::new());
            entry.expires_at_ms = None;
        }
        match &mut entry.value {
            StoredValue::Hash(fields) => f(fields),
            StoredValue::Text(_) => Err(HostError::new(format!("{hash_key} is not a hash"))),
        }
    }
}

fn is_expired(entry: &StoredEntry, now_ms: i64) -> bool {
    entry.expires_at_ms.map(|at| now_ms >= at).unwrap_or(false)
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        match self.live(key) {
            Some(StoredEntry {
                value: StoredValue::Text(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(HostError::new(format!("{key} is a hash"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), HostError> {
        let expires_at_ms = ttl.map(|ttl| self.expires_at(ttl));
        self.entries.borrow_mut().insert(
            key.to_string(),
            StoredEntry {
                value: StoredValue::Text(value.to_string()),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), HostError> {
        if self.fail_deletes.get() && self.live(key).is_some() {
            return Err(HostError::new("store unavailable"));
        }
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), HostError> {
        if self.live(key).is_none() {
            return Ok(());
        }
        let expires_at = self.expires_at(ttl);
        if let Some(entry) = self.entries.borrow_mut().get_mut(key) {
            entry.expires_at_ms = Some(expires_at);
        }
        Ok(())
    }

    async fn increment_field(&self, hash_key: &str, field: &str, by: i64) -> Result<i64, HostError> {
        self.with_hash(hash_key, |fields| {
            match fields.iter_mut().find(|(name, _)| name == field) {
                Some((_, value)) => {
                    let current = value
                        .parse::<i64>()
                        .map_err(|_| HostError::new(format!("{hash_key}.{field} is not a number")))?;
                    let next = current + by;
                    *value = next.to_string();
                    Ok(next)
                }
                None => {
                    fields.push((field.to_string(), by.to_string()));
                    Ok(by)
                }
            }
        })
    }

    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> Result<(), HostError> {
        self.with_hash(hash_key, |fields| {
            match fields.iter_mut().find(|(name, _)| name == field) {
                Some((_, existing)) => *existing = value.to_string(),
                None => fields.push((field.to_string(), value.to_string())),
            }
            Ok(())
        })
    }

    async fn delete_field(&self, hash_key: &str, field: &str) -> Result<(), HostError> {
        if self.live(hash_key).is_none() {
            return Ok(());
        }
        self.with_hash(hash_key, |fields| {
            fields.retain(|(name, _)| name != field);
            Ok(())
        })
    }

    async fn get_all_fields(&self, hash_key: &str) -> Result<Vec<(String, String)>, HostError> {
        match self.live(hash_key) {
            Some(StoredEntry {
                value: StoredValue::Hash(fields),
                ..
            }) => Ok(fields),
            Some(_) => Err(HostError::new(format!("{hash_key} is not a hash"))),
            None => Ok(Vec::new()),
        }
    }
}

pub type SubscriptionId = u64;

struct Subscriber {
    id: SubscriptionId,
    channel: String,
    handler: Rc<dyn Fn(&ChannelMessage)>,
}

#[derive(Clone, Default)]
pub struct MemoryRealtime {
    subscribers: Rc<RefCell<Vec<Subscriber>>>,
    published: Rc<RefCell<Vec<(String, ChannelMessage)>>>,
    next_id: Rc<Cell<SubscriptionId>>,
}

impl MemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        channel: &str,
        handler: impl Fn(&ChannelMessage) + 'static,
    ) -> SubscriptionId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            channel: channel.to_string(),
            handler: Rc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() != before
    }

    /// Everything ever published on `channel`, oldest first.
    pub fn published(&self, channel: &str) -> Vec<ChannelMessage> {
        self.published
            .borrow()
            .iter()
            .filter(|(name, _)| name == channel)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl Realtime for MemoryRealtime {
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<(), HostError> {
        self.published
            .borrow_mut()
            .push((channel.to_string(), message.clone()));
        // handlers may subscribe or publish, so release the borrow first
        let handlers: Vec<Rc<dyn Fn(&ChannelMessage)>> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.channel == channel)
            .map(|subscriber| subscriber.handler.clone())
            .collect();
        for handler in handlers {
            handler(message);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryScheduler {
    table: Rc<RefCell<JobTable>>,
    fail: Rc<Cell<bool>>,
}

impl MemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following schedule call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }

    pub fn pending(&self) -> Vec<ScheduledJob> {
        self.table.borrow().jobs().to_vec()
    }

    pub fn take_due(&self, now_ms: i64) -> Vec<Job> {
        self.table.borrow_mut().take_due(now_ms)
    }

    pub fn next_run_at(&self) -> Option<i64> {
        self.table.borrow().next_run_at()
    }

    fn check_failing(&self) -> Result<(), HostError> {
        if self.fail.get() {
            return Err(HostError::new("scheduler unavailable"));
        }
        Ok(())
    }
}

impl Scheduler for MemoryScheduler {
    async fn schedule_recurring(
        &self,
        every: Duration,
        first_run_at_ms: i64,
        job: Job,
    ) -> Result<JobId, HostError> {
        self.check_failing()?;
        let every_ms = every.as_millis() as i64;
        Ok(self
            .table
            .borrow_mut()
            .insert(job, first_run_at_ms, Some(every_ms)))
    }

    async fn schedule_once(&self, run_at_ms: i64, job: Job) -> Result<JobId, HostError> {
        self.check_failing()?;
        Ok(self.table.borrow_mut().insert(job, run_at_ms, None))
    }

    async fn cancel(&self, id: &JobId) -> Result<(), HostError> {
        self.table.borrow_mut().cancel(id);
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryArchive {
    records: Rc<RefCell<Vec<ArchiveRecord>>>,
    fail: Rc<Cell<bool>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following publish fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.fail.set(failing);
    }

    pub fn records(&self) -> Vec<ArchiveRecord> {
        self.records.borrow().clone()
    }
}

impl Archive for MemoryArchive {
    async fn publish(&self, record: &ArchiveRecord) -> Result<(), HostError> {
        if self.fail.get() {
            return Err(HostError::new("archive unavailable"));
        }
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }

    async fn latest(&self, game_id: &GameId) -> Result<Option<ArchiveRecord>, HostError> {
        Ok(self
            .records
            .borrow()
            .iter()
            .rev()
            .find(|record| record.game_id == *game_id)
            .cloned())
    }
}

/// All in-memory collaborators sharing one clock. Clones share state.
#[derive(Clone)]
pub struct MemoryHost {
    pub clock: ManualClock,
    pub store: MemoryStore,
    pub realtime: MemoryRealtime,
    pub scheduler: MemoryScheduler,
    pub archive: MemoryArchive,
}

impl MemoryHost {
    pub fn new(start_ms: i64) -> Self {
        let clock = ManualClock::new(start_ms);
        Self {
            store: MemoryStore::new(clock.clone()),
            clock,
            realtime: MemoryRealtime::new(),
            scheduler: MemoryScheduler::new(),
            archive: MemoryArchive::new(),
        }
    }
}

impl Host for MemoryHost {
    type Store = MemoryStore;
    type Realtime = MemoryRealtime;
    type Scheduler = MemoryScheduler;
    type Archive = MemoryArchive;

    fn store(&self) -> &Self::Store {
        &self.store
    }

    fn realtime(&self) -> &Self::Realtime {
        &self.realtime
    }

    fn scheduler(&self) -> &Self::Scheduler {
        &self.scheduler
    }

    fn archive(&self) -> &Self::Archive {
        &self.archive
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keys_expire_with_the_clock() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new(clock.clone());
        store
            .set("k", "v", Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        clock.advance(60);
        store.expire("k", Duration::from_millis(100)).await.unwrap();
        clock.advance(60);
        assert!(store.contains("k"));
        clock.advance(60);
        assert_eq!(store.get("k").await.unwrap(), None);
        store.expire("missing", Duration::from_secs(1)).await.unwrap();
        assert!(!store.contains("missing"));
    }

    #[tokio::test]
    async fn hash_fields_keep_insertion_order() {
        let store = MemoryStore::new(ManualClock::new(0));
        store.increment_field("h", "b", 1).await.unwrap();
        store.increment_field("h", "a", 1).await.unwrap();
        assert_eq!(store.increment_field("h", "b", 2).await.unwrap(), 3);
        store.set_field("h", "c", "9").await.unwrap();
        store.delete_field("h", "a").await.unwrap();
        assert_eq!(
            store.get_all_fields("h").await.unwrap(),
            vec![("b".to_string(), "3".to_string()), ("c".to_string(), "9".to_string())]
        );
        assert!(store.get("h").await.is_err());
    }

    #[tokio::test]
    async fn expired_hash_starts_over() {
        let clock = ManualClock::new(0);
        let store = MemoryStore::new(clock.clone());
        store.increment_field("h", "a", 5).await.unwrap();
        store.expire("h", Duration::from_millis(10)).await.unwrap();
        clock.advance(10);
        assert_eq!(store.increment_field("h", "a", 1).await.unwrap(), 1);
        assert_eq!(store.ttl_ms("h"), None);
    }

    #[tokio::test]
    async fn subscribers_only_see_their_channel() {
        let realtime = MemoryRealtime::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let id = realtime.subscribe("game:a", move |message| sink.borrow_mut().push(message.seq));
        let message = |seq| ChannelMessage {
            game_id: "a".to_string(),
            seq,
            origin: None,
            event: crate::protocol::GameEvent::LeaderboardRefreshed,
        };
        realtime.publish("game:a", &message(1)).await.unwrap();
        realtime.publish("game:b", &message(2)).await.unwrap();
        assert!(realtime.unsubscribe(id));
        realtime.publish("game:a", &message(3)).await.unwrap();
        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(realtime.published("game:a").len(), 2);
    }
}
