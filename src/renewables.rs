//! EIA routes, source codes and canned filters for renewable data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RenewVizError;
use crate::query::{FilterSpec, Frequency, SortDirection};

/// Hourly generation by balancing authority and fuel type.
pub const FUEL_TYPE_ROUTE: &str = "electricity/rto/fuel-type-data";
/// Monthly inventory of operating generators.
pub const CAPACITY_ROUTE: &str = "electricity/operating-generator-capacity";

pub const CAPACITY_COLUMNS: [&str; 6] = [
    "nameplate-capacity-mw",
    "net-summer-capacity-mw",
    "net-winter-capacity-mw",
    "operating-year-month",
    "latitude",
    "longitude",
];

/// Capacity-route source codes counted as renewable, wood and biogas included.
pub const RENEWABLE_CAPACITY_SOURCES: [&str; 8] =
    ["SUN", "WND", "WAT", "GEO", "WDS", "BIO", "OBG", "OBS"];

/// Status facet value of generators in operation.
const OPERATING: &str = "OP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnergySource {
    Solar,
    Wind,
    Hydro,
    Geothermal,
    Biomass,
    Nuclear,
    Other,
}

impl EnergySource {
    pub const ALL: [EnergySource; 7] = [
        EnergySource::Solar,
        EnergySource::Wind,
        EnergySource::Hydro,
        EnergySource::Geothermal,
        EnergySource::Biomass,
        EnergySource::Nuclear,
        EnergySource::Other,
    ];

    /// EIA code, shared by the capacity and fuel-type routes.
    pub fn code(self) -> &'static str {
        match self {
            EnergySource::Solar => "SUN",
            EnergySource::Wind => "WND",
            EnergySource::Hydro => "WAT",
            EnergySource::Geothermal => "GEO",
            EnergySource::Biomass => "BIO",
            EnergySource::Nuclear => "NUC",
            EnergySource::Other => "OTH",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl fmt::Display for EnergySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for EnergySource {
    type Err = RenewVizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
            .ok_or_else(|| RenewVizError::BadRequest(format!("unknown energy source {s:?}")))
    }
}

/// Operating generators, optionally restricted to states and source codes.
///
/// The route is a monthly inventory, so the same generator shows up once
/// per period. Newest periods come first so a dedup keeps the latest entry.
pub fn operating_capacity<S: AsRef<str>>(states: &[S], sources: &[&str]) -> FilterSpec {
    FilterSpec::new()
        .columns(CAPACITY_COLUMNS)
        .facet("stateid", states.iter().map(|s| s.as_ref().to_string()))
        .facet("energy_source_code", sources.iter().copied())
        .facet("status", [OPERATING])
        .sort("period", SortDirection::Desc)
}

/// Newest inventory period first, for looking up the latest published month.
pub fn latest_capacity_period() -> FilterSpec {
    FilterSpec::new()
        .frequency(Frequency::Monthly)
        .sort("period", SortDirection::Desc)
}

/// Restricts a capacity filter to a single inventory month.
///
/// Without it a generator that has since retired still matches the
/// `status` facet through its older monthly rows.
pub fn in_period(filter: FilterSpec, period: &str) -> FilterSpec {
    filter
        .frequency(Frequency::Monthly)
        .start(period)
        .end(period)
}

/// Operating generators of every renewable source code.
pub fn renewable_capacity<S: AsRef<str>>(states: &[S]) -> FilterSpec {
    operating_capacity(states, &RENEWABLE_CAPACITY_SOURCES)
}

/// Generation by fuel type, newest period first.
pub fn fuel_type_generation<S: AsRef<str>>(
    fuel_types: &[&str],
    respondents: &[S],
    frequency: Frequency,
) -> FilterSpec {
    FilterSpec::new()
        .column("value")
        .facet("fueltype", fuel_types.iter().copied())
        .facet(
            "respondent",
            respondents.iter().map(|r| r.as_ref().to_string()),
        )
        .frequency(frequency)
        .sort("period", SortDirection::Desc)
}
