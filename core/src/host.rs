//! Collaborator interfaces the engine runs against. The worker implements
//! them on Durable Object storage, sockets and alarms; `memory` implements
//! them in process.

#![allow(async_fn_in_trait)]

use std::fmt;
use std::time::Duration;

use crate::game_id::GameId;
use crate::leaderboard::LeaderboardEntry;
use crate::protocol::ChannelMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for HostError {}

pub trait KvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HostError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), HostError>;
    async fn delete(&self, key: &str) -> Result<(), HostError>;
    /// Refreshes the ttl of an existing key; missing keys are ignored.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), HostError>;
    async fn increment_field(&self, hash_key: &str, field: &str, by: i64) -> Result<i64, HostError>;
    async fn set_field(&self, hash_key: &str, field: &str, value: &str) -> Result<(), HostError>;
    async fn delete_field(&self, hash_key: &str, field: &str) -> Result<(), HostError>;
    /// Fields in insertion order.
    async fn get_all_fields(&self, hash_key: &str) -> Result<Vec<(String, String)>, HostError>;
}

pub trait Realtime {
    async fn publish(&self, channel: &str, message: &ChannelMessage) -> Result<(), HostError>;
}

pub trait Scheduler {
    async fn schedule_recurring(
        &self,
        every: Duration,
        first_run_at_ms: i64,
        job: Job,
    ) -> Result<JobId, HostError>;
    async fn schedule_once(&self, run_at_ms: i64, job: Job) -> Result<JobId, HostError>;
    async fn cancel(&self, id: &JobId) -> Result<(), HostError>;
}

pub trait Archive {
    async fn publish(&self, record: &ArchiveRecord) -> Result<(), HostError>;
    async fn latest(&self, game_id: &GameId) -> Result<Option<ArchiveRecord>, HostError>;
}

pub trait Host {
    type Store: KvStore;
    type Realtime: Realtime;
    type Scheduler: Scheduler;
    type Archive: Archive;

    fn store(&self) -> &Self::Store;
    fn realtime(&self) -> &Self::Realtime;
    fn scheduler(&self) -> &Self::Scheduler;
    fn archive(&self) -> &Self::Archive;
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "job")]
pub enum Job {
    ChangeLetters { game_id: GameId, round_seq: u64 },
    ShowHint { game_id: GameId, round_seq: u64 },
    EndGame { game_id: GameId },
}

impl Job {
    pub fn game_id(&self) -> &GameId {
        match self {
            Job::ChangeLetters { game_id, .. }
            | Job::ShowHint { game_id, .. }
            | Job::EndGame { game_id } => game_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::ChangeLetters { .. } => "change_letters",
            Job::ShowHint { .. } => "show_hint",
            Job::EndGame { .. } => "end_game",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub job: Job,
    pub run_at_ms: i64,
    pub every_ms: Option<i64>,
}

/// Pending jobs of one host. Shared by the in-memory scheduler and the
/// worker, which keeps it in storage and arms a single alarm for the
/// earliest entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobTable {
    next_id: u64,
    jobs: Vec<ScheduledJob>,
}

impl JobTable {
    pub fn insert(&mut self, job: Job, run_at_ms: i64, every_ms: Option<i64>) -> JobId {
        self.next_id += 1;
        let id = JobId::new(format!("{}-{}", job.name(), self.next_id));
        self.jobs.push(ScheduledJob {
            id: id.clone(),
            job,
            run_at_ms,
            every_ms: every_ms.filter(|every| *every > 0),
        });
        id
    }

    pub fn cancel(&mut self, id: &JobId) -> bool {
        let before = self.jobs.len();
        self.jobs.retain(|entry| entry.id != *id);
        self.jobs.len() != before
    }

    /// Removes due one-shot jobs and re-arms due recurring ones past `now_ms`.
    /// Returned jobs are ordered by their due time.
    pub fn take_due(&mut self, now_ms: i64) -> Vec<Job> {
        let mut due: Vec<(i64, Job)> = Vec::new();
        self.jobs.retain_mut(|entry| {
            if entry.run_at_ms > now_ms {
                return true;
            }
            due.push((entry.run_at_ms, entry.job.clone()));
            match entry.every_ms {
                Some(every) => {
                    while entry.run_at_ms <= now_ms {
                        entry.run_at_ms += every;
                    }
                    true
                }
                None => false,
            }
        });
        due.sort_by_key(|(run_at, _)| *run_at);
        due.into_iter().map(|(_, job)| job).collect()
    }

    pub fn next_run_at(&self) -> Option<i64> {
        self.jobs.iter().map(|entry| entry.run_at_ms).min()
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Written once at end of life so the word pool and final standings outlive
/// the game's keys.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub game_id: GameId,
    pub title: String,
    pub words: Vec<String>,
    pub words_per_round: u32,
    pub minutes_to_solve: u32,
    pub total_game_duration_hours: u32,
    pub hint_enabled: bool,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub archived_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_id() -> GameId {
        GameId::parse("JobTable01").unwrap()
    }

    #[test]
    fn recurring_jobs_rearm_and_once_jobs_drop() {
        let mut table = JobTable::default();
        let rotate = table.insert(
            Job::ChangeLetters {
                game_id: game_id(),
                round_seq: 1,
            },
            1_000,
            Some(1_000),
        );
        table.insert(Job::EndGame { game_id: game_id() }, 2_500, None);

        assert!(table.take_due(999).is_empty());
        assert_eq!(table.take_due(1_000).len(), 1);
        assert_eq!(table.next_run_at(), Some(2_000));

        let due = table.take_due(3_100);
        assert_eq!(due.len(), 2);
        assert!(matches!(due[0], Job::ChangeLetters { .. }));
        assert!(matches!(due[1], Job::EndGame { .. }));
        assert_eq!(table.jobs().len(), 1);
        assert_eq!(table.next_run_at(), Some(4_000));

        assert!(table.cancel(&rotate));
        assert!(!table.cancel(&rotate));
        assert!(table.is_empty());
    }

    #[test]
    fn jobs_serialize_with_tag() {
        let job = Job::ShowHint {
            game_id: game_id(),
            round_seq: 3,
        };
        let json = serde_json::to_string(&job).unwrap();
        assert_eq!(json, r#"{"job":"ShowHint","game_id":"JobTable01","round_seq":3}"#);
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }
}
