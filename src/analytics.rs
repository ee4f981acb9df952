//! Renewable-energy views assembled from the EIA client and the geo helpers.
//!
//! Every function re-fetches from the API. Loops over states, regions or
//! sources run their items concurrently; a failing item is logged and left
//! out of the result, except for an authentication failure which fails the
//! whole call.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;

use futures::future::join_all;
use itertools::Itertools;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::EiaClient;
use crate::error::RenewVizError;
use crate::geo::{filter_by_bounds, filter_by_polygon, summarize, BoundingBox, Located, Polygon};
use crate::models::{
    FacetValue, GenerationRecord, GeneratorRecord, PolygonAnalytics, RegionSummary,
    StateCapacity, StateSourceSummary,
};
use crate::query::{FilterSpec, Frequency, SortDirection};
use crate::renewables::{
    fuel_type_generation, in_period, latest_capacity_period, operating_capacity,
    renewable_capacity, EnergySource, CAPACITY_ROUTE, FUEL_TYPE_ROUTE,
};

pub const DEFAULT_STATES: [&str; 6] = ["CA", "TX", "FL", "AZ", "NC", "NV"];
pub const DEFAULT_REGIONS: [&str; 6] = ["CISO", "ERCO", "PJM", "MISO", "NYIS", "ISNE"];

const DEFAULT_GENERATOR_SOURCES: [EnergySource; 3] =
    [EnergySource::Solar, EnergySource::Wind, EnergySource::Hydro];
const DEFAULT_MAP_SOURCES: [EnergySource; 2] = [EnergySource::Solar, EnergySource::Wind];

/// Upstream record cap per state for [`state_capacity`], 500 per source.
pub const STATE_CAPACITY_LIMIT: usize = 1000;

/// Generators returned alongside polygon totals.
pub const POLYGON_SAMPLE: usize = 100;

/// Key under which per-state totals are stored in a [`StateSourceSummary`].
pub const TOTAL_KEY: &str = "total";

/// Parameters of a generator listing.
#[derive(Debug, Clone, Default)]
pub struct GeneratorQuery {
    /// State codes; empty means every state.
    pub states: Vec<String>,
    /// Sources; empty means solar, wind and hydro.
    pub sources: Vec<EnergySource>,
    pub min_capacity: f64,
    /// Upstream record cap, per source.
    pub limit: Option<usize>,
}

/// Parameters of a generation time series.
#[derive(Debug, Clone)]
pub struct GenerationQuery {
    /// Fuel types; empty means solar, wind and hydro.
    pub sources: Vec<EnergySource>,
    /// Balancing authorities; empty means all of them.
    pub regions: Vec<String>,
    pub frequency: Frequency,
    /// Inclusive period bounds in the frequency's format (`2024-06-01T00`,
    /// `2024-06-01`, `2024-06`).
    pub start: Option<String>,
    pub end: Option<String>,
    pub order: SortDirection,
    pub limit: Option<usize>,
}

impl Default for GenerationQuery {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            regions: Vec::new(),
            frequency: Frequency::Hourly,
            start: None,
            end: None,
            order: SortDirection::Desc,
            limit: None,
        }
    }
}

/// Treats a missing route as an empty data set.
fn or_empty<T>(result: Result<Vec<T>, RenewVizError>) -> Result<Vec<T>, RenewVizError> {
    match result {
        Err(RenewVizError::NotFound(url)) => {
            debug!(%url, "Route not found, treating as empty");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Runs `task` for every key concurrently and keeps the successes in key order.
async fn isolate<K, T, F, Fut>(
    keys: impl IntoIterator<Item = K>,
    task: F,
) -> Result<Vec<(K, T)>, RenewVizError>
where
    K: Clone + Display,
    F: Fn(K) -> Fut,
    Fut: Future<Output = Result<T, RenewVizError>>,
{
    let results = join_all(keys.into_iter().map(|key| {
        let pending = task(key.clone());
        async move { (key, pending.await) }
    }))
    .await;

    let mut kept = Vec::with_capacity(results.len());
    for (key, result) in results {
        match result {
            Ok(value) => kept.push((key, value)),
            Err(RenewVizError::AuthenticationFailure) => {
                return Err(RenewVizError::AuthenticationFailure)
            }
            Err(e) => warn!(item = %key, error = %e, "Skipping failed item"),
        }
    }
    Ok(kept)
}

/// Most recent month published on the capacity route, if any.
async fn latest_period(client: &EiaClient) -> Result<Option<String>, RenewVizError> {
    let page = match client
        .get_data(CAPACITY_ROUTE, &latest_capacity_period(), 0, 1)
        .await
    {
        Err(RenewVizError::NotFound(url)) => {
            debug!(%url, "Route not found, no latest period");
            return Ok(None);
        }
        other => other?,
    };
    let period = page
        .records
        .first()
        .and_then(|r| r.get("period"))
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);
    debug!(?period, "Latest capacity period");
    Ok(period)
}

/// Operating generators matching `filter` in `period`, one entry per
/// generator.
///
/// The capacity route repeats a generator once per monthly period, newest
/// first; only the first occurrence is kept.
async fn capacity(
    client: &EiaClient,
    filter: FilterSpec,
    period: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<GeneratorRecord>, RenewVizError> {
    let filter = match period {
        Some(period) => in_period(filter, period),
        None => filter,
    };
    let records = or_empty(
        client
            .fetch_capped::<GeneratorRecord>(CAPACITY_ROUTE, &filter, limit)
            .await,
    )?;
    Ok(records.into_iter().unique_by(|g| g.id.clone()).collect())
}

/// Operating generators of one source.
async fn source_capacity(
    client: &EiaClient,
    states: &[String],
    source: EnergySource,
    period: Option<&str>,
    limit: Option<usize>,
) -> Result<Vec<GeneratorRecord>, RenewVizError> {
    let filter = operating_capacity(states, &[source.code()]);
    capacity(client, filter, period, limit).await
}

/// Located generators with at least `min_capacity` MW.
pub async fn generators(
    client: &EiaClient,
    query: &GeneratorQuery,
) -> Result<Vec<GeneratorRecord>, RenewVizError> {
    let sources = if query.sources.is_empty() {
        DEFAULT_GENERATOR_SOURCES.to_vec()
    } else {
        query.sources.clone()
    };

    let period = latest_period(client).await?;
    let per_source = isolate(sources, |source| {
        source_capacity(client, &query.states, source, period.as_deref(), query.limit)
    })
    .await?;

    Ok(per_source
        .into_iter()
        .flat_map(|(_, gens)| gens)
        .filter(|g| g.location().is_some() && g.nameplate_capacity_mw >= query.min_capacity)
        .collect())
}

/// Generators with positive capacity located inside `bbox`.
pub async fn generators_in_bounds(
    client: &EiaClient,
    bbox: &BoundingBox,
    sources: &[EnergySource],
    limit: Option<usize>,
) -> Result<Vec<GeneratorRecord>, RenewVizError> {
    let sources = if sources.is_empty() {
        DEFAULT_MAP_SOURCES.to_vec()
    } else {
        sources.to_vec()
    };

    let period = latest_period(client).await?;
    let per_source = isolate(sources, |source| {
        source_capacity(client, &[], source, period.as_deref(), limit)
    })
    .await?;

    let positive = per_source
        .into_iter()
        .flat_map(|(_, gens)| gens)
        .filter(|g| g.nameplate_capacity_mw > 0.0);
    Ok(filter_by_bounds(positive, bbox))
}

fn or_defaults(values: &[String], defaults: &[&str]) -> Vec<String> {
    if values.is_empty() {
        defaults.iter().map(|v| v.to_string()).collect()
    } else {
        values.to_vec()
    }
}

/// Solar and wind totals per state, in the order the states were given.
pub async fn state_capacity(
    client: &EiaClient,
    states: &[String],
) -> Result<Vec<StateCapacity>, RenewVizError> {
    let states = or_defaults(states, &DEFAULT_STATES);
    let sources = [EnergySource::Solar.code(), EnergySource::Wind.code()];
    let period = latest_period(client).await?;
    let period = period.as_deref();

    let per_state = isolate(states, |state| async move {
        let filter = operating_capacity(std::slice::from_ref(&state), &sources);
        capacity(client, filter, period, Some(STATE_CAPACITY_LIMIT)).await
    })
    .await?;

    Ok(per_state
        .into_iter()
        .map(|(state, gens)| {
            let stats = summarize(&gens);
            let solar_mw = stats.capacity_of(EnergySource::Solar.code());
            let wind_mw = stats.capacity_of(EnergySource::Wind.code());
            StateCapacity {
                state,
                solar_mw,
                wind_mw,
                total_mw: solar_mw + wind_mw,
                generator_count: stats.count,
            }
        })
        .collect())
}

/// Renewable capacity per state and source, with a [`TOTAL_KEY`] entry per
/// state. Empty `states` covers the whole country.
pub async fn state_renewable_summary(
    client: &EiaClient,
    states: &[String],
    max_records: Option<usize>,
) -> Result<StateSourceSummary, RenewVizError> {
    let period = latest_period(client).await?;
    let gens = capacity(
        client,
        renewable_capacity(states),
        period.as_deref(),
        max_records,
    )
    .await?;

    let mut summary = StateSourceSummary::new();
    for g in &gens {
        let by_source = summary.entry(g.state.clone()).or_insert_with(BTreeMap::new);
        *by_source.entry(g.energy_source.clone()).or_insert(0.0) += g.nameplate_capacity_mw;
        *by_source.entry(TOTAL_KEY.to_string()).or_insert(0.0) += g.nameplate_capacity_mw;
    }
    Ok(summary)
}

/// Most recent hourly reading of one fuel type in one region.
async fn latest_reading(
    client: &EiaClient,
    region: &str,
    source: EnergySource,
) -> Result<Option<GenerationRecord>, RenewVizError> {
    let filter = fuel_type_generation(&[source.code()], &[region], Frequency::Hourly);
    let mut readings = or_empty(
        client
            .fetch_capped::<GenerationRecord>(FUEL_TYPE_ROUTE, &filter, Some(1))
            .await,
    )?;
    Ok(readings.pop())
}

async fn region_summary(client: &EiaClient, region: String) -> Result<RegionSummary, RenewVizError> {
    let solar = latest_reading(client, &region, EnergySource::Solar).await?;
    let wind = latest_reading(client, &region, EnergySource::Wind).await?;
    let hydro = latest_reading(client, &region, EnergySource::Hydro).await?;

    let region_name = [&solar, &wind, &hydro]
        .into_iter()
        .flatten()
        .map(|r| r.region_name.clone())
        .find(|name| !name.is_empty())
        .unwrap_or_else(|| region.clone());
    let value = |reading: Option<GenerationRecord>| reading.map_or(0.0, |r| r.value);
    let (solar_mwh, wind_mwh, hydro_mwh) = (value(solar), value(wind), value(hydro));

    Ok(RegionSummary {
        region,
        region_name,
        solar_mwh,
        wind_mwh,
        hydro_mwh,
        total_mwh: solar_mwh + wind_mwh + hydro_mwh,
    })
}

/// Latest solar, wind and hydro output per balancing authority.
pub async fn realtime_generation(
    client: &EiaClient,
    regions: &[String],
) -> Result<Vec<RegionSummary>, RenewVizError> {
    let regions = or_defaults(regions, &DEFAULT_REGIONS);
    let summaries = isolate(regions, |region| region_summary(client, region)).await?;
    Ok(summaries.into_iter().map(|(_, summary)| summary).collect())
}

/// Generation by fuel type over a period range, one record per region,
/// fuel type and period.
pub async fn generation_series(
    client: &EiaClient,
    query: &GenerationQuery,
) -> Result<Vec<GenerationRecord>, RenewVizError> {
    let sources = if query.sources.is_empty() {
        DEFAULT_GENERATOR_SOURCES.to_vec()
    } else {
        query.sources.clone()
    };
    let codes: Vec<&str> = sources.iter().map(|s| s.code()).collect();

    let mut filter = fuel_type_generation(&codes, &query.regions, query.frequency);
    filter.sort = vec![("period".to_string(), query.order)];
    if let Some(ref start) = query.start {
        filter = filter.start(start.clone());
    }
    if let Some(ref end) = query.end {
        filter = filter.end(end.clone());
    }

    let series = or_empty(
        client
            .fetch_capped::<GenerationRecord>(FUEL_TYPE_ROUTE, &filter, query.limit)
            .await,
    )?;
    debug!(records = series.len(), frequency = %query.frequency, "Generation series fetched");
    Ok(series)
}

/// Solar and wind generators inside `polygon`, with totals.
pub async fn polygon_analytics(
    client: &EiaClient,
    polygon: &Polygon,
    limit: Option<usize>,
) -> Result<PolygonAnalytics, RenewVizError> {
    let candidates = generators_in_bounds(client, &polygon.bounding_box(), &[], limit).await?;
    let inside = filter_by_polygon(candidates, polygon);
    debug!(matched = inside.len(), "Polygon filter applied");

    let stats = summarize(&inside);
    let solar = EnergySource::Solar.code();
    let wind = EnergySource::Wind.code();
    let states = inside
        .iter()
        .map(|g| g.state.clone())
        .filter(|s| !s.is_empty())
        .unique()
        .sorted()
        .collect();

    Ok(PolygonAnalytics {
        total_generators: stats.count,
        solar_count: stats.count_of(solar),
        wind_count: stats.count_of(wind),
        solar_capacity_mw: stats.capacity_of(solar),
        wind_capacity_mw: stats.capacity_of(wind),
        total_capacity_mw: stats.total_capacity_mw,
        generators: inside.into_iter().take(POLYGON_SAMPLE).collect(),
        states,
    })
}

/// Balancing authorities reporting to the fuel-type route.
pub async fn balancing_authorities(client: &EiaClient) -> Result<Vec<FacetValue>, RenewVizError> {
    or_empty(client.facet_values(FUEL_TYPE_ROUTE, "respondent").await)
}

pub async fn fuel_types(client: &EiaClient) -> Result<Vec<FacetValue>, RenewVizError> {
    or_empty(client.facet_values(FUEL_TYPE_ROUTE, "fueltype").await)
}
