//! Typed records and response models.
//!
//! Raw EIA records are loose JSON maps: numbers often arrive as strings,
//! fields go missing, and coordinates may be blank. Mapping never fails;
//! it falls back to empty strings, zero, or "absent" so that downstream
//! reductions stay total.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::geo::{GeoPoint, Located};
use crate::pagination::RawRecord;

/// Builds a typed entity from a raw record without failing.
pub trait FromRecord: Sized {
    fn from_record(raw: &RawRecord) -> Self;
}

fn str_field(raw: &RawRecord, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Numeric field, `0.0` when missing, null or unparseable.
fn f64_field(raw: &RawRecord, key: &str) -> f64 {
    opt_f64_field(raw, key).unwrap_or(0.0)
}

/// Numeric field where missing stays distinguishable from zero.
fn opt_f64_field(raw: &RawRecord, key: &str) -> Option<f64> {
    raw.get(key).and_then(number)
}

/// Year from `operating-year-month`, which looks like `2019-06`.
fn year_field(raw: &RawRecord, key: &str) -> Option<i32> {
    match raw.get(key)? {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

/// An operating generator from `electricity/operating-generator-capacity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorRecord {
    /// `<plant id>-<generator id>`, unique per generator.
    pub id: String,
    pub plant_id: String,
    pub generator_id: String,
    #[serde(rename = "name")]
    pub plant_name: String,
    pub state: String,
    pub technology: String,
    pub energy_source: String,
    pub status: String,
    #[serde(rename = "capacity_mw")]
    pub nameplate_capacity_mw: f64,
    /// Net summer and winter ratings; absent for many small generators.
    pub net_summer_capacity_mw: Option<f64>,
    pub net_winter_capacity_mw: Option<f64>,
    #[serde(rename = "lat")]
    pub latitude: Option<f64>,
    #[serde(rename = "lon")]
    pub longitude: Option<f64>,
    pub operating_year: Option<i32>,
}

impl FromRecord for GeneratorRecord {
    fn from_record(raw: &RawRecord) -> Self {
        let plant_id = str_field(raw, "plantid");
        let generator_id = str_field(raw, "generatorid");
        Self {
            id: format!("{plant_id}-{generator_id}"),
            plant_id,
            generator_id,
            plant_name: str_field(raw, "plantName"),
            state: str_field(raw, "stateid"),
            technology: str_field(raw, "technology"),
            energy_source: str_field(raw, "energy_source_code"),
            status: str_field(raw, "status"),
            // Capacity is never negative; treat anomalies like missing data.
            nameplate_capacity_mw: f64_field(raw, "nameplate-capacity-mw").max(0.0),
            net_summer_capacity_mw: opt_f64_field(raw, "net-summer-capacity-mw")
                .map(|mw| mw.max(0.0)),
            net_winter_capacity_mw: opt_f64_field(raw, "net-winter-capacity-mw")
                .map(|mw| mw.max(0.0)),
            latitude: opt_f64_field(raw, "latitude"),
            longitude: opt_f64_field(raw, "longitude"),
            operating_year: year_field(raw, "operating-year-month"),
        }
    }
}

impl Located for GeneratorRecord {
    fn location(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Hourly/daily generation of one fuel type in one balancing authority,
/// from `electricity/rto/fuel-type-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub period: String,
    pub region: String,
    pub region_name: String,
    pub fuel_type: String,
    pub fuel_type_description: String,
    /// MWh. Negative values are upstream anomalies and are kept as-is.
    pub value: f64,
    pub units: String,
}

impl FromRecord for GenerationRecord {
    fn from_record(raw: &RawRecord) -> Self {
        let units = str_field(raw, "value-units");
        Self {
            period: str_field(raw, "period"),
            region: str_field(raw, "respondent"),
            region_name: str_field(raw, "respondent-name"),
            fuel_type: str_field(raw, "fueltype"),
            fuel_type_description: str_field(raw, "type-name"),
            value: f64_field(raw, "value"),
            units: if units.is_empty() {
                "megawatthours".into()
            } else {
                units
            },
        }
    }
}

/// One selectable value of a route facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Installed solar and wind capacity in one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateCapacity {
    pub state: String,
    pub solar_mw: f64,
    pub wind_mw: f64,
    pub total_mw: f64,
    pub generator_count: usize,
}

/// Latest solar and wind output of one balancing authority.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub region_name: String,
    pub solar_mwh: f64,
    pub wind_mwh: f64,
    pub hydro_mwh: f64,
    pub total_mwh: f64,
}

/// State → energy source → MW, with a `total` entry per state.
pub type StateSourceSummary = BTreeMap<String, BTreeMap<String, f64>>;

/// Result of a polygon query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolygonAnalytics {
    pub total_generators: usize,
    pub solar_count: usize,
    pub wind_count: usize,
    pub solar_capacity_mw: f64,
    pub wind_capacity_mw: f64,
    pub total_capacity_mw: f64,
    /// At most the first 100 matching generators.
    pub generators: Vec<GeneratorRecord>,
    pub states: Vec<String>,
}
