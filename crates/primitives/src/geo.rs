//! Geospatial index
//!
//! Named points live in one geo index (`territories` by default). Each
//! point's payload lives beside it in a hash keyed by the point name, one
//! field per top-level payload field with a JSON-encoded value.
//!
//! Radius queries return matches in **no defined order** unless a sort is
//! requested through [`RadiusQuery::sort`].

use crate::codec::{decode, encode};
use crate::filter::SortOrder;
use canvass_core::keys::{validate_segment, TERRITORIES_GEO_KEY};
use canvass_core::{DistanceUnit, Error, Result};
use canvass_engine::StoreHandle;
use canvass_storage::geo::validate_coordinates;
use canvass_storage::{GeoHit, WriteOp};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::debug;

/// A point found by a radius query
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMatch {
    /// Point name
    pub key: String,
    /// Distance from the query center, in the query's unit
    pub distance: f64,
    /// Point longitude
    pub longitude: f64,
    /// Point latitude
    pub latitude: f64,
    /// Stored payload, `None` if the point has none
    pub payload: Option<Value>,
}

/// Geospatial index facade
#[derive(Clone, Debug)]
pub struct GeoIndex {
    store: StoreHandle,
    geo_key: String,
}

impl GeoIndex {
    /// Index over the `territories` geo key
    pub fn new(store: StoreHandle) -> Self {
        Self::with_key(store, TERRITORIES_GEO_KEY)
    }

    /// Index over another geo key
    pub fn with_key(store: StoreHandle, geo_key: impl Into<String>) -> Self {
        Self {
            store,
            geo_key: geo_key.into(),
        }
    }

    /// Geo key this index writes to
    pub fn geo_key(&self) -> &str {
        &self.geo_key
    }

    /// Register or move a point and replace its payload
    ///
    /// `payload` must be a JSON object. Point and payload are written in one
    /// batch.
    pub fn index_location(&self, key: &str, longitude: f64, latitude: f64, payload: &Value) -> Result<()> {
        validate_segment("location key", key)?;
        validate_coordinates(longitude, latitude).map_err(Error::InvalidInput)?;
        let Some(fields) = payload.as_object() else {
            return Err(Error::invalid_input("location payload must be a JSON object"));
        };

        let mut ops = Vec::with_capacity(fields.len() + 2);
        ops.push(WriteOp::Del { key: key.to_string() });
        ops.push(WriteOp::GeoAdd {
            key: self.geo_key.clone(),
            longitude,
            latitude,
            member: key.to_string(),
        });
        for (field, value) in fields {
            ops.push(WriteOp::HSet {
                key: key.to_string(),
                field: field.clone(),
                value: encode("payload field", value)?,
            });
        }
        self.store.call("index_location", |b| b.exec_atomic(ops))
    }

    /// Every point within `radius` of the center, in no defined order
    pub fn query_radius(
        &self,
        longitude: f64,
        latitude: f64,
        radius: f64,
        unit: DistanceUnit,
    ) -> Result<Vec<GeoMatch>> {
        self.radius(longitude, latitude, radius, unit).run()
    }

    /// Radius query builder
    pub fn radius(&self, longitude: f64, latitude: f64, radius: f64, unit: DistanceUnit) -> RadiusQuery<'_> {
        RadiusQuery {
            index: self,
            longitude,
            latitude,
            radius,
            unit,
            sort: None,
            count: None,
        }
    }

    /// Position as `(longitude, latitude)`
    pub fn position(&self, key: &str) -> Result<Option<(f64, f64)>> {
        self.store.call("geo_position", |b| b.geopos(&self.geo_key, key))
    }

    /// Stored payload of a point
    pub fn payload(&self, key: &str) -> Result<Option<Value>> {
        let fields = self.store.call("geo_payload", |b| b.hgetall(key))?;
        if fields.is_empty() {
            return Ok(None);
        }
        let mut object = Map::with_capacity(fields.len());
        for (field, raw) in fields {
            let value = decode(&format!("{key}.{field}"), &raw)?;
            object.insert(field, value);
        }
        Ok(Some(Value::Object(object)))
    }

    /// Remove a point and its payload; `true` if the point was indexed
    pub fn remove_location(&self, key: &str) -> Result<bool> {
        let existed = self.position(key)?.is_some();
        let ops = vec![
            WriteOp::GeoRem {
                key: self.geo_key.clone(),
                member: key.to_string(),
            },
            WriteOp::Del { key: key.to_string() },
        ];
        self.store.call("remove_location", |b| b.exec_atomic(ops))?;
        Ok(existed)
    }
}

/// Radius query with optional ordering and result cap
#[derive(Debug)]
pub struct RadiusQuery<'a> {
    index: &'a GeoIndex,
    longitude: f64,
    latitude: f64,
    radius: f64,
    unit: DistanceUnit,
    sort: Option<SortOrder>,
    count: Option<usize>,
}

impl RadiusQuery<'_> {
    /// Order matches by distance
    pub fn sort(mut self, order: SortOrder) -> Self {
        self.sort = Some(order);
        self
    }

    /// Return at most `n` matches; with a sort, the nearest or farthest `n`
    pub fn count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Execute the query
    pub fn run(self) -> Result<Vec<GeoMatch>> {
        if !self.radius.is_finite() || self.radius < 0.0 {
            return Err(Error::invalid_input(format!(
                "radius {} must be a non-negative number",
                self.radius
            )));
        }
        let radius_m = self.unit.to_meters(self.radius);
        let index = self.index;
        let mut hits: Vec<GeoHit> = index.store.call("query_radius", |b| {
            b.georadius(&index.geo_key, self.longitude, self.latitude, radius_m)
        })?;

        if let Some(order) = self.sort {
            hits.sort_by(|a, b| {
                let by_distance = a.distance_m.partial_cmp(&b.distance_m).unwrap_or(Ordering::Equal);
                match order {
                    SortOrder::Ascending => by_distance,
                    SortOrder::Descending => by_distance.reverse(),
                }
            });
        }
        if let Some(n) = self.count {
            hits.truncate(n);
        }
        debug!(target: "canvass::geo", geo_key = %index.geo_key, matches = hits.len(), "Radius query");

        hits.into_iter()
            .map(|hit| {
                let payload = index.payload(&hit.member)?;
                Ok(GeoMatch {
                    distance: self.unit.from_meters(hit.distance_m),
                    key: hit.member,
                    longitude: hit.longitude,
                    latitude: hit.latitude,
                    payload,
                })
            })
            .collect()
    }
}
