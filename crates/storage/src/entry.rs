//! Stored entries
//!
//! One [`StoredEntry`] per key: the structure it holds plus an optional
//! absolute expiry. Expiry is a storage concern and never leaves this crate.

use crate::backend::KeyKind;
use canvass_core::Timestamp;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};

/// Score with a total order so it can key a `BTreeSet`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Score(pub(crate) f64);

impl PartialEq for Score {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Score {}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Score {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Members ordered by (score, member) with O(1) score lookup
#[derive(Debug, Clone, Default)]
pub(crate) struct SortedSet {
    scores: FxHashMap<String, f64>,
    ordered: BTreeSet<(Score, String)>,
}

impl SortedSet {
    /// Insert or rescore; `true` if new
    pub(crate) fn insert(&mut self, member: &str, score: f64) -> bool {
        let previous = self.scores.insert(member.to_string(), score);
        if let Some(old) = previous {
            self.ordered.remove(&(Score(old), member.to_string()));
        }
        self.ordered.insert((Score(score), member.to_string()));
        previous.is_none()
    }

    pub(crate) fn remove(&mut self, member: &str) -> bool {
        match self.scores.remove(member) {
            Some(score) => {
                self.ordered.remove(&(Score(score), member.to_string()));
                true
            }
            None => false,
        }
    }

    /// Members with `min <= score <= max`, O(log n + k)
    pub(crate) fn range_by_score(&self, min: f64, max: f64) -> Vec<(String, f64)> {
        if min.is_nan() || max.is_nan() || min > max {
            return Vec::new();
        }
        self.ordered
            .range((Score(min), String::new())..)
            .take_while(|(score, _)| score.0 <= max)
            .map(|(score, member)| (member.clone(), score.0))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.scores.len()
    }
}

/// A named point
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct GeoPoint {
    pub(crate) longitude: f64,
    pub(crate) latitude: f64,
}

/// Structure held by one key
#[derive(Debug, Clone)]
pub(crate) enum Structure {
    Scalar(String),
    Hash(FxHashMap<String, String>),
    List(VecDeque<String>),
    Set(FxHashSet<String>),
    SortedSet(SortedSet),
    Geo(FxHashMap<String, GeoPoint>),
}

impl Structure {
    pub(crate) fn empty(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Scalar => Structure::Scalar(String::new()),
            KeyKind::Hash => Structure::Hash(FxHashMap::default()),
            KeyKind::List => Structure::List(VecDeque::new()),
            KeyKind::Set => Structure::Set(FxHashSet::default()),
            KeyKind::SortedSet => Structure::SortedSet(SortedSet::default()),
            KeyKind::Geo => Structure::Geo(FxHashMap::default()),
        }
    }

    pub(crate) fn kind(&self) -> KeyKind {
        match self {
            Structure::Scalar(_) => KeyKind::Scalar,
            Structure::Hash(_) => KeyKind::Hash,
            Structure::List(_) => KeyKind::List,
            Structure::Set(_) => KeyKind::Set,
            Structure::SortedSet(_) => KeyKind::SortedSet,
            Structure::Geo(_) => KeyKind::Geo,
        }
    }

    /// Collections with no elements are deleted; scalars never are
    pub(crate) fn is_empty_collection(&self) -> bool {
        match self {
            Structure::Scalar(_) => false,
            Structure::Hash(map) => map.is_empty(),
            Structure::List(list) => list.is_empty(),
            Structure::Set(set) => set.is_empty(),
            Structure::SortedSet(zset) => zset.len() == 0,
            Structure::Geo(points) => points.is_empty(),
        }
    }
}

/// Value stored under one key
#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    pub(crate) structure: Structure,
    pub(crate) expires_at: Option<Timestamp>,
}

impl StoredEntry {
    pub(crate) fn new(structure: Structure) -> Self {
        Self {
            structure,
            expires_at: None,
        }
    }

    pub(crate) fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
