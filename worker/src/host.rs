//! Host bindings on top of one Durable Object: storage for keys and the job
//! table, the object's alarm for timers, its WebSockets for fan-out, and a
//! Workers KV namespace for the archive.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use js_sys::Date;
use serde::{Deserialize, Serialize};
use unscramble_core::codec::{encode, from_json, to_json};
use unscramble_core::host::{
    Archive, ArchiveRecord, Host, HostError, Job, JobId, JobTable, KvStore, Realtime, Scheduler,
};
use unscramble_core::{ChannelMessage, GameId, ServerMsg};
use worker::{Env, State};

const JOBS_KEY: &str = "__jobs";
const ARCHIVE_BINDING: &str = "ARCHIVE";

pub fn now_ms() -> i64 {
    Date::now() as i64
}

fn host_err(err: impl fmt::Display) -> HostError {
    HostError::new(err.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
enum Payload {
    Text(String),
    Hash(Vec<(String, String)>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: Payload,
    expires_at_ms: Option<i64>,
}

impl Envelope {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at_ms.map(|at| now >= at).unwrap_or(false)
    }
}

pub struct WorkerStore {
    state: Rc<State>,
}

impl WorkerStore {
    async fn load(&self, key: &str) -> Result<Option<Envelope>, HostError> {
        let storage = self.state.storage();
        let envelope: Option<Envelope> = storage.get(key).await.map_err(host_err)?;
        match envelope {
            Some(envelope) if envelope.is_expired(now_ms()) => {
                storage.delete(key).await.map_err(host_err)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn save(&self, key: &str, envelope: &Envelope) -> Result<(), HostError> {
        self.state
            .storage()
            .put(key, envelope)
            .await
            .map_err(host_err)
    }

    async fn load_hash(&self, key: &str) -> Result<(Vec<(String, String)>, Option<i64>), HostError> {
        match self.load(key).await? {
            Some(Envelope {
                value: Payload::Hash(fields),
                expires_at_ms,
            }) => Ok((fields, expires_at_ms)),
            Some(_) => Err(HostError::new(format!("{key} is not a hash"))),
            None => Ok((Vec::new(), None)),
        }
    }

    async fn save_hash(
        &self,
        key: &str,
        fields: Vec<(String, String)>,
        expires_at_ms: Option<i64>,
    ) -> Result<(), HostError> {
        self.save(
            key,
            &Envelope {
                value: Payload::Hash(fields),
                expires_at_ms,
            },
        )
        .await
    }
}

impl KvStore for WorkerStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError> {
        match self.load(key).await? {
            Some(Envelope {
                value: Payload::Text(value),
                ..
            }) => Ok(Some(value)),
            Some(_) => Err(HostError::new(format!("{key} is a hash"))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), HostError> {
        let envelope = Envelope {
            value: Payload::Text(value.to_string()),
            expires_at_ms: ttl.map(|ttl| now_ms() + ttl.as_millis() as i64),
        };
        self.save(key, &envelope).await
    }

    async fn delete(&self, key: &str) -> Result<(), HostError> {
        self.state
            .storage()
            .delete(key)
            .await
            .map(|_| ())
            .map_err(host_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), HostError> {
        let Some(mut envelope) = self.load(key).await? else {
            return Ok(());
        };
        envelope.expires_at_ms = Some(now_ms() + ttl.as_millis() as i64);
        self.save(key, &envelope).await
    }

    async fn increment_field(&self, hash_key: &str, field: &str, by: i64) -> Result<i64, HostError> {
        let (mut fields, expires_at_ms) = self.load_hash(hash_key).await?;
        let next = match fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, value)) => {
                let current: i64 = value
                    .parse()
                    .map_err(|_| HostError::new(format!("{hash_key}.{field} is not a number")))?;
                *value = (current + by).to_string();
                current + by
            }
            None => {
                fields.push((field.to_string(), by.to_string()));
                by
            }
        };
        self.save_hash(hash_key, fields, expires_at_ms).await?;
        Ok(next)
    }

    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> Result<(), HostError> {
        let (mut fields, expires_at_ms) = self.load_hash(hash_key).await?;
        match fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, existing)) => *existing = value.to_string(),
            None => fields.push((field.to_string(), value.to_string())),
        }
        self.save_hash(hash_key, fields, expires_at_ms).await
    }

    async fn delete_field(&self, hash_key: &str, field: &str) -> Result<(), HostError> {
        let (mut fields, expires_at_ms) = self.load_hash(hash_key).await?;
        let before = fields.len();
        fields.retain(|(name, _)| name != field);
        if fields.len() == before {
            return Ok(());
        }
        self.save_hash(hash_key, fields, expires_at_ms).await
    }

    async fn get_all_fields(&self, hash_key: &str) -> Result<Vec<(String, String)>, HostError> {
        Ok(self.load_hash(hash_key).await?.0)
    }
}

/// Every socket tagged with the channel name is a subscriber.
pub struct WorkerRealtime {
    state: Rc<State>,
}

impl Realtime for WorkerRealtime {
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<(), HostError> {
        let msg = ServerMsg::Event {
            message: message.clone(),
        };
        let Some(bytes) = encode(&msg) else {
            return Err(HostError::new("failed to encode channel message"));
        };
        for socket in self.state.get_websockets_with_tag(channel) {
            // a socket that went away is cleaned up by its close handler
            let _ = socket.send_with_bytes(bytes.as_slice());
        }
        Ok(())
    }
}

/// Jobs live in one storage entry; the object's single alarm is armed for
/// the earliest of them.
pub struct WorkerScheduler {
    state: Rc<State>,
}

impl WorkerScheduler {
    async fn load_table(&self) -> Result<JobTable, HostError> {
        let table: Option<JobTable> = self.state.storage().get(JOBS_KEY).await.map_err(host_err)?;
        Ok(table.unwrap_or_default())
    }

    async fn save_table(&self, table: &JobTable) -> Result<(), HostError> {
        let storage = self.state.storage();
        storage.put(JOBS_KEY, table).await.map_err(host_err)?;
        match table.next_run_at() {
            Some(run_at) => {
                let offset = (run_at - now_ms()).max(0);
                storage.set_alarm(offset).await.map_err(host_err)?;
            }
            None => {
                storage.delete_alarm().await.map_err(host_err)?;
            }
        }
        Ok(())
    }

    /// Pops the jobs due at `now` and re-arms the alarm for the rest.
    pub async fn take_due(&self, now: i64) -> Result<Vec<Job>, HostError> {
        let mut table = self.load_table().await?;
        let due = table.take_due(now);
        self.save_table(&table).await?;
        Ok(due)
    }
}

impl Scheduler for WorkerScheduler {
    async fn schedule_recurring(
        &self,
        every: Duration,
        first_run_at_ms: i64,
        job: Job,
    ) -> Result<JobId, HostError> {
        let mut table = self.load_table().await?;
        let id = table.insert(job, first_run_at_ms, Some(every.as_millis() as i64));
        self.save_table(&table).await?;
        Ok(id)
    }

    async fn schedule_once(&self, run_at_ms: i64, job: Job) -> Result<JobId, HostError> {
        let mut table = self.load_table().await?;
        let id = table.insert(job, run_at_ms, None);
        self.save_table(&table).await?;
        Ok(id)
    }

    async fn cancel(&self, id: &JobId) -> Result<(), HostError> {
        let mut table = self.load_table().await?;
        if table.cancel(id) {
            self.save_table(&table).await?;
        }
        Ok(())
    }
}

/// Final records go to Workers KV so they outlive the object's storage.
pub struct WorkerArchive {
    env: Env,
}

fn archive_key(game_id: &GameId) -> String {
    format!("archive:{game_id}")
}

impl Archive for WorkerArchive {
    async fn publish(&self, record: &ArchiveRecord) -> Result<(), HostError> {
        let namespace = self.env.kv(ARCHIVE_BINDING).map_err(host_err)?;
        let raw = to_json(record).map_err(host_err)?;
        namespace
            .put(&archive_key(&record.game_id), raw)
            .map_err(|err| host_err(worker::Error::from(err)))?
            .execute()
            .await
            .map_err(|err| host_err(worker::Error::from(err)))
    }

    async fn latest(&self, game_id: &GameId) -> Result<Option<ArchiveRecord>, HostError> {
        let namespace = self.env.kv(ARCHIVE_BINDING).map_err(host_err)?;
        let raw = namespace
            .get(&archive_key(game_id))
            .text()
            .await
            .map_err(|err| host_err(worker::Error::from(err)))?;
        match raw {
            Some(raw) => from_json(&raw).map(Some).map_err(host_err),
            None => Ok(None),
        }
    }
}

pub struct WorkerHost {
    store: WorkerStore,
    realtime: WorkerRealtime,
    scheduler: WorkerScheduler,
    archive: WorkerArchive,
}

impl WorkerHost {
    pub fn new(state: Rc<State>, env: Env) -> Self {
        Self {
            store: WorkerStore {
                state: state.clone(),
            },
            realtime: WorkerRealtime {
                state: state.clone(),
            },
            scheduler: WorkerScheduler { state },
            archive: WorkerArchive { env },
        }
    }
}

impl Host for WorkerHost {
    type Store = WorkerStore;
    type Realtime = WorkerRealtime;
    type Scheduler = WorkerScheduler;
    type Archive = WorkerArchive;

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
        now_ms()
    }
}
