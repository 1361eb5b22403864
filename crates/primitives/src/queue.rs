//! FIFO job queue over list push/pop
//!
//! Jobs are appended to the tail of `queue:<name>` and taken from the head.
//! Order is strict FIFO per queue name. The pop is atomic in the store, so
//! concurrent consumers never receive the same job twice.
//!
//! ## Delivery
//!
//! [`JobQueue::dequeue`] is **at-most-once**: once a job is popped it is
//! gone, and a consumer that crashes before finishing loses it.
//!
//! Consumers that need **at-least-once** use [`JobQueue::claim`], which moves
//! the head job to `queue:<name>:processing`, then [`JobQueue::ack`] it when
//! done. [`JobQueue::requeue_unacked`] puts every unacknowledged job back at
//! the tail, e.g. when a consumer restarts. A requeued job may be processed
//! twice.

use crate::codec::{decode, encode};
use canvass_core::keys::{queue_key, queue_processing_key, validate_segment};
use canvass_core::Result;
use canvass_engine::StoreHandle;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

const ID_SUFFIX_LEN: usize = 9;

/// A queued job: the caller's payload with an id and creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<T = Value> {
    /// `job-<epochMillis>-<9 base-36 chars>`
    pub id: String,
    /// Creation time, RFC 3339
    pub timestamp: String,
    /// Caller payload
    pub payload: T,
}

/// Job queue facade
#[derive(Clone, Debug)]
pub struct JobQueue {
    store: StoreHandle,
}

impl JobQueue {
    /// Create a queue facade on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Wrap `payload` in a job and append it to the tail
    pub fn enqueue<T: Serialize>(&self, name: &str, payload: T) -> Result<Job<T>> {
        validate_segment("queue name", name)?;
        let now = self.store.now();
        let job = Job {
            id: generate_job_id(now.as_millis()),
            timestamp: now.to_rfc3339(),
            payload,
        };
        let raw = encode("job", &job)?;
        let key = queue_key(name);
        let depth = self.store.call("enqueue", |b| b.rpush(&key, raw))?;
        debug!(target: "canvass::queue", queue = name, job_id = %job.id, depth, "Enqueued job");
        Ok(job)
    }

    /// Pop the head job; `Ok(None)` when the queue is empty
    ///
    /// The job is removed before it is returned (at-most-once).
    pub fn dequeue<T: DeserializeOwned>(&self, name: &str) -> Result<Option<Job<T>>> {
        let key = queue_key(name);
        let raw = self.store.call("dequeue", |b| b.lpop(&key))?;
        raw.map(|raw| self.decode_job(&key, &raw)).transpose()
    }

    /// Current depth
    pub fn length(&self, name: &str) -> Result<usize> {
        let key = queue_key(name);
        self.store.call("queue_length", |b| b.llen(&key))
    }

    /// Up to `n` jobs from the head without removing them
    pub fn peek<T: DeserializeOwned>(&self, name: &str, n: usize) -> Result<Vec<Job<T>>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let key = queue_key(name);
        let stop = i64::try_from(n).map_or(-1, |n| n - 1);
        let raws = self
            .store
            .call("queue_peek", |b| b.lrange(&key, 0, stop))?;
        raws.iter().map(|raw| decode(&key, raw)).collect()
    }

    // ========== At-least-once ==========

    /// Move the head job to the processing list and return it
    pub fn claim<T: DeserializeOwned>(&self, name: &str) -> Result<Option<Job<T>>> {
        let key = queue_key(name);
        let processing = queue_processing_key(name);
        let raw = self
            .store
            .call("claim", |b| b.lmove_head_to_tail(&key, &processing))?;
        raw.map(|raw| self.decode_job(&processing, &raw)).transpose()
    }

    /// Acknowledge a claimed job; `false` if it is not in the processing list
    pub fn ack(&self, name: &str, job_id: &str) -> Result<bool> {
        let processing = queue_processing_key(name);
        let raws = self
            .store
            .call("ack_scan", |b| b.lrange(&processing, 0, -1))?;
        let Some(raw) = raws.into_iter().find(|raw| job_id_of(raw).as_deref() == Some(job_id)) else {
            return Ok(false);
        };
        let removed = self
            .store
            .call("ack", |b| b.lrem(&processing, 1, &raw))?;
        Ok(removed > 0)
    }

    /// Claimed jobs not yet acknowledged
    pub fn processing_length(&self, name: &str) -> Result<usize> {
        let processing = queue_processing_key(name);
        self.store.call("processing_length", |b| b.llen(&processing))
    }

    /// Move every unacknowledged job back to the tail of the queue
    pub fn requeue_unacked(&self, name: &str) -> Result<usize> {
        let key = queue_key(name);
        let processing = queue_processing_key(name);
        let mut moved = 0;
        while self
            .store
            .call("requeue", |b| b.lmove_head_to_tail(&processing, &key))?
            .is_some()
        {
            moved += 1;
        }
        if moved > 0 {
            info!(target: "canvass::queue", queue = name, moved, "Requeued unacknowledged jobs");
        }
        Ok(moved)
    }

    fn decode_job<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Result<Job<T>> {
        decode(key, raw).map_err(|e| {
            error!(target: "canvass::queue", key, error = %e, "Removed an undecodable job");
            e
        })
    }
}

/// `job-<epochMillis>-<9 random base-36 chars>`
fn generate_job_id(epoch_millis: u64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .filter_map(|_| std::char::from_digit(rng.gen_range(0..36), 36))
        .collect();
    format!("job-{epoch_millis}-{suffix}")
}

fn job_id_of(raw: &str) -> Option<String> {
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get("id")?.as_str().map(str::to_string)
}
