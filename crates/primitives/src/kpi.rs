//! Time-series metric recorder
//!
//! Each record is a scalar `kpi:<category>:<metric>:<epochMillis>` holding the
//! JSON-encoded data, expiring after `kpi.retention_days`. There is no delete
//! path; records leave only by expiring.
//!
//! ## Range queries
//!
//! With `kpi.use_time_index` (the default) every write also adds the record
//! key to the sorted set `kpi_index:<category>:<metric>`, scored by epoch
//! millis, in the same batch. Range queries then cost O(log n + k). Index
//! members whose record has expired are skipped and removed lazily.
//!
//! When the metric has no index, as for data written by writers that never
//! maintained one, [`KpiRecorder::query_range_by_scan`] enumerates every key of the
//! metric and filters on the timestamp parsed from the key. That is
//! O(records of the metric still alive) and logs a `capacity_risk` warning.
//!
//! Two records of one metric in the same millisecond share a key; the later
//! one wins.

use crate::codec::{decode, encode};
use canvass_core::keys::{
    kpi_index_key, kpi_key, kpi_pattern, parse_kpi_timestamp, validate_pattern_segment, SEPARATOR,
};
use canvass_core::{Error, Result};
use canvass_engine::StoreHandle;
use canvass_storage::WriteOp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// One metric record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    /// Store key of the record
    pub key: String,
    /// Metric category
    pub category: String,
    /// Metric name
    pub metric: String,
    /// Write time, epoch millis
    pub timestamp_ms: u64,
    /// Recorded data
    pub data: Value,
}

/// Metric recorder facade
#[derive(Clone, Debug)]
pub struct KpiRecorder {
    store: StoreHandle,
}

impl KpiRecorder {
    /// Create a recorder on `store`
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Record `data` under the current time
    pub fn record_metric<T: Serialize + ?Sized>(
        &self,
        category: &str,
        metric: &str,
        data: &T,
    ) -> Result<KpiRecord> {
        validate_name("category", category)?;
        validate_name("metric", metric)?;
        let data = serde_json::to_value(data)
            .map_err(|e| Error::invalid_input(format!("cannot encode metric data: {e}")))?;
        let raw = encode("metric data", &data)?;

        let timestamp_ms = self.store.now().as_millis();
        let key = kpi_key(category, metric, timestamp_ms);
        let ttl = self.store.config().kpi_retention();

        if self.store.config().kpi.use_time_index {
            let index = kpi_index_key(category, metric);
            let ops = vec![
                WriteOp::Set {
                    key: key.clone(),
                    value: raw,
                    ttl: Some(ttl),
                },
                WriteOp::ZAdd {
                    key: index.clone(),
                    score: timestamp_ms as f64,
                    member: key.clone(),
                },
                // The index lives as long as its newest record
                WriteOp::Expire { key: index, ttl },
            ];
            self.store.call("record_metric", |b| b.exec_atomic(ops))?;
        } else {
            self.store
                .call("record_metric", |b| b.set(&key, raw, Some(ttl)))?;
        }

        Ok(KpiRecord {
            key,
            category: category.to_string(),
            metric: metric.to_string(),
            timestamp_ms,
            data,
        })
    }

    /// Records with `start_ms <= timestamp <= end_ms`, oldest first
    pub fn query_range(
        &self,
        category: &str,
        metric: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<KpiRecord>> {
        if self.store.config().kpi.use_time_index && self.has_time_index(category, metric)? {
            self.query_range_by_index(category, metric, start_ms, end_ms)
        } else {
            // Records from writers that keep no index are only reachable by scan
            self.query_range_by_scan(category, metric, start_ms, end_ms)
        }
    }

    /// Whether the metric has a live time index
    pub fn has_time_index(&self, category: &str, metric: &str) -> Result<bool> {
        validate_name("category", category)?;
        validate_name("metric", metric)?;
        let index = kpi_index_key(category, metric);
        Ok(self.store.call("kpi_index_card", |b| b.zcard(&index))? > 0)
    }

    /// Range query through the sorted time index
    pub fn query_range_by_index(
        &self,
        category: &str,
        metric: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<KpiRecord>> {
        validate_name("category", category)?;
        validate_name("metric", metric)?;
        if start_ms > end_ms {
            return Ok(Vec::new());
        }
        let index = kpi_index_key(category, metric);
        let members = self.store.call("kpi_index_range", |b| {
            b.zrange_by_score(&index, start_ms as f64, end_ms as f64)
        })?;

        let mut records = Vec::with_capacity(members.len());
        let mut expired = Vec::new();
        for (key, score) in members {
            match self.load(&key)? {
                Some(data) => records.push(KpiRecord {
                    key,
                    category: category.to_string(),
                    metric: metric.to_string(),
                    timestamp_ms: score as u64,
                    data,
                }),
                None => expired.push(key),
            }
        }

        if !expired.is_empty() {
            debug!(target: "canvass::kpi", index = %index, expired = expired.len(), "Dropping expired index members");
            for key in &expired {
                self.store.call("kpi_index_prune", |b| b.zrem(&index, key))?;
            }
        }
        Ok(records)
    }

    /// Range query by scanning every key of the metric
    ///
    /// Works for records written without the time index, at the cost of a
    /// full key scan per call.
    pub fn query_range_by_scan(
        &self,
        category: &str,
        metric: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> Result<Vec<KpiRecord>> {
        validate_name("category", category)?;
        validate_name("metric", metric)?;
        let pattern = kpi_pattern(category, metric);
        warn!(target: "canvass::kpi", capacity_risk = true, pattern = %pattern, "KPI range query is scanning keys");
        if start_ms > end_ms {
            return Ok(Vec::new());
        }

        let keys = self.store.call("kpi_scan", |b| b.keys(&pattern))?;
        let mut due: Vec<(u64, String)> = keys
            .into_iter()
            .filter_map(|key| match parse_kpi_timestamp(&key) {
                Some(ts) => Some((ts, key)),
                None => {
                    debug!(target: "canvass::kpi", key = %key, "Skipping key without a timestamp");
                    None
                }
            })
            .filter(|(ts, _)| (start_ms..=end_ms).contains(ts))
            .collect();
        due.sort();

        let mut records = Vec::with_capacity(due.len());
        for (timestamp_ms, key) in due {
            // Expired between the scan and the read
            let Some(data) = self.load(&key)? else {
                continue;
            };
            records.push(KpiRecord {
                key,
                category: category.to_string(),
                metric: metric.to_string(),
                timestamp_ms,
                data,
            });
        }
        Ok(records)
    }

    fn load(&self, key: &str) -> Result<Option<Value>> {
        let raw = self.store.call("kpi_get", |b| b.get(key))?;
        raw.map(|raw| decode(key, &raw)).transpose()
    }
}

/// Segments must not be empty, contain the key separator, or glob characters
fn validate_name(what: &str, value: &str) -> Result<()> {
    validate_pattern_segment(what, value)?;
    if value.contains(SEPARATOR) {
        return Err(Error::invalid_input(format!(
            "{what} '{value}' must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}
