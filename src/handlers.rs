use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::analytics::{self, GenerationQuery, GeneratorQuery};
use crate::error::RenewVizError;
use crate::frame::{self, TechnologyCapacity};
use crate::geo::{BoundingBox, Polygon};
use crate::models::{
    FacetValue, GenerationRecord, GeneratorRecord, PolygonAnalytics, RegionSummary,
    StateCapacity, StateSourceSummary,
};
use crate::query::{Frequency, SortDirection};
use crate::renewables::EnergySource;
use crate::state::AppState;

const DEFAULT_GENERATOR_LIMIT: usize = 500;
const DEFAULT_BOUNDS_LIMIT: usize = 1000;
const DEFAULT_POLYGON_LIMIT: usize = 2000;
const DEFAULT_SUMMARY_LIMIT: usize = 50_000;
const DEFAULT_GENERATION_LIMIT: usize = 5000;
const DEFAULT_METADATA_ROUTE: &str = "electricity";

/// Query parameters for generator listings and exports.
#[derive(Debug, Default, Deserialize)]
pub struct GeneratorParams {
    /// Comma-separated state codes (`CA,TX`).
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub states: Option<String>,
    /// Comma-separated source codes (`SUN,WND`).
    #[serde(default, alias = "energy_source", deserialize_with = "empty_string_as_none_str")]
    pub sources: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub min_capacity: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
    /// Export format, `csv` or `json`.
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub format: Option<String>,
}

/// Query parameters for the bounding-box endpoint.
#[derive(Debug, Deserialize)]
pub struct BoundsParams {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    #[serde(default, alias = "energy_source", deserialize_with = "empty_string_as_none_str")]
    pub sources: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RegionParams {
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub regions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StateParams {
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub states: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PolygonParams {
    /// JSON array of `[lat, lon]` pairs.
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub coordinates: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
}

/// Query parameters for generation time series.
#[derive(Debug, Default, Deserialize)]
pub struct GenerationParams {
    /// `hourly`, `daily`, `monthly`, `quarterly` or `annual`.
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub frequency: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub start: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub end: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub regions: Option<String>,
    #[serde(default, alias = "fuel_types", deserialize_with = "empty_string_as_none_str")]
    pub sources: Option<String>,
    /// `asc` or `desc` by period.
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub order: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MetadataParams {
    /// API route such as `electricity/rto/fuel-type-data`.
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub route: Option<String>,
}

fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => s.trim().parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}

fn empty_string_as_none_str<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => Ok(Some(s)),
    }
}

/// Splits `CA, tx,,NV` into `["CA", "TX", "NV"]`.
fn split_codes(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|part| part.trim().to_ascii_uppercase())
            .filter(|part| !part.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

fn parse_sources(raw: Option<&str>) -> Result<Vec<EnergySource>, RenewVizError> {
    split_codes(raw).iter().map(|code| code.parse()).collect()
}

/// `limit` or its default; zero is rejected rather than returning nothing.
fn positive_limit(limit: Option<usize>, default: usize) -> Result<usize, RenewVizError> {
    match limit {
        Some(0) => Err(RenewVizError::BadRequest("limit must be at least 1".into())),
        Some(limit) => Ok(limit),
        None => Ok(default),
    }
}

impl GeneratorParams {
    fn to_query(&self) -> Result<GeneratorQuery, RenewVizError> {
        Ok(GeneratorQuery {
            states: split_codes(self.states.as_deref()),
            sources: parse_sources(self.sources.as_deref())?,
            min_capacity: self.min_capacity.unwrap_or(0.0),
            limit: Some(positive_limit(self.limit, DEFAULT_GENERATOR_LIMIT)?),
        })
    }
}

impl GenerationParams {
    fn to_query(&self) -> Result<GenerationQuery, RenewVizError> {
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            if start.trim() > end.trim() {
                return Err(RenewVizError::BadRequest(format!(
                    "start {start:?} is after end {end:?}"
                )));
            }
        }
        Ok(GenerationQuery {
            sources: parse_sources(self.sources.as_deref())?,
            regions: split_codes(self.regions.as_deref()),
            frequency: self
                .frequency
                .as_deref()
                .map_or(Ok(Frequency::Hourly), str::parse)?,
            start: self.start.as_ref().map(|s| s.trim().to_string()),
            end: self.end.as_ref().map(|s| s.trim().to_string()),
            order: self
                .order
                .as_deref()
                .map_or(Ok(SortDirection::Desc), str::parse)?,
            limit: Some(positive_limit(self.limit, DEFAULT_GENERATION_LIMIT)?),
        })
    }
}

/// Checks a route path before it is joined onto the API base URL.
fn validate_route(route: &str) -> Result<&str, RenewVizError> {
    let route = route.trim().trim_matches('/');
    let valid = !route.is_empty()
        && route
            .split('/')
            .all(|part| !part.is_empty() && part != ".." && part != ".")
        && route
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'));
    if valid {
        Ok(route)
    } else {
        Err(RenewVizError::BadRequest(format!("invalid route {route:?}")))
    }
}

impl BoundsParams {
    fn bounding_box(&self) -> Result<BoundingBox, RenewVizError> {
        if self.min_lat > self.max_lat || self.min_lon > self.max_lon {
            return Err(RenewVizError::BadRequest(format!(
                "empty bounds: lat {}..{}, lon {}..{}",
                self.min_lat, self.max_lat, self.min_lon, self.max_lon
            )));
        }
        Ok(BoundingBox::new(
            self.min_lat,
            self.max_lat,
            self.min_lon,
            self.max_lon,
        ))
    }
}

/// GET / - Service status.
pub async fn index() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "message": "EIA Renewable Energy API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/generators - Located generators by state and source.
pub async fn api_generators(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeneratorParams>,
) -> Result<Json<Vec<GeneratorRecord>>, RenewVizError> {
    let query = params.to_query()?;
    let generators = analytics::generators(&state.client, &query).await?;
    Ok(Json(generators))
}

/// GET /api/generators/bounds - Generators inside a lat/lon box.
pub async fn api_generators_in_bounds(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BoundsParams>,
) -> Result<Json<Vec<GeneratorRecord>>, RenewVizError> {
    let bbox = params.bounding_box()?;
    let sources = parse_sources(params.sources.as_deref())?;
    let limit = positive_limit(params.limit, DEFAULT_BOUNDS_LIMIT)?;

    let generators =
        analytics::generators_in_bounds(&state.client, &bbox, &sources, Some(limit)).await?;
    Ok(Json(generators))
}

/// GET /api/generators/export - Generator list as a CSV or JSON download.
pub async fn api_generators_export(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeneratorParams>,
) -> Result<Response, RenewVizError> {
    let format = params
        .format
        .as_deref()
        .unwrap_or("csv")
        .to_ascii_lowercase();
    let (content_type, extension) = match format.as_str() {
        "csv" => ("text/csv; charset=utf-8", "csv"),
        "json" => ("application/json", "json"),
        other => {
            return Err(RenewVizError::BadRequest(format!(
                "unsupported export format {other:?}, expected csv or json"
            )))
        }
    };

    let query = params.to_query()?;
    let generators = analytics::generators(&state.client, &query).await?;
    let mut df = frame::generators_frame(&generators)?;
    let body = if extension == "csv" {
        frame::to_csv(&mut df)?
    } else {
        frame::to_json(&mut df)?
    };
    info!("Exported {} generators as {}", generators.len(), extension);

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"generators.{extension}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// GET /api/generation/realtime - Latest output per balancing authority.
pub async fn api_realtime_generation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegionParams>,
) -> Result<Json<Vec<RegionSummary>>, RenewVizError> {
    let regions = split_codes(params.regions.as_deref());
    let summaries = analytics::realtime_generation(&state.client, &regions).await?;
    Ok(Json(summaries))
}

/// GET /api/generation - Generation by fuel type over a period range.
pub async fn api_generation(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GenerationParams>,
) -> Result<Json<Vec<GenerationRecord>>, RenewVizError> {
    let query = params.to_query()?;
    let series = analytics::generation_series(&state.client, &query).await?;
    Ok(Json(series))
}

/// GET /api/capacity/by-state - Solar and wind MW per state.
pub async fn api_capacity_by_state(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StateParams>,
) -> Result<Json<Vec<StateCapacity>>, RenewVizError> {
    let states = split_codes(params.states.as_deref());
    let capacity = analytics::state_capacity(&state.client, &states).await?;
    Ok(Json(capacity))
}

/// GET /api/capacity/summary - State → source → MW.
pub async fn api_capacity_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StateParams>,
) -> Result<Json<StateSourceSummary>, RenewVizError> {
    let states = split_codes(params.states.as_deref());
    let limit = positive_limit(params.limit, DEFAULT_SUMMARY_LIMIT)?;
    let summary =
        analytics::state_renewable_summary(&state.client, &states, Some(limit)).await?;
    Ok(Json(summary))
}

/// GET /api/capacity/by-technology - MW and generator count per technology.
pub async fn api_capacity_by_technology(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GeneratorParams>,
) -> Result<Json<Vec<TechnologyCapacity>>, RenewVizError> {
    let query = params.to_query()?;
    let generators = analytics::generators(&state.client, &query).await?;
    let df = frame::generators_frame(&generators)?;
    Ok(Json(frame::capacity_by_technology(&df)?))
}

/// GET /api/analytics/polygon - Totals for generators inside a polygon.
pub async fn api_polygon_analytics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PolygonParams>,
) -> Result<Json<PolygonAnalytics>, RenewVizError> {
    let coordinates = params.coordinates.as_deref().ok_or_else(|| {
        RenewVizError::InvalidGeometry("missing `coordinates` parameter".into())
    })?;
    let polygon = Polygon::from_json(coordinates)?;
    let limit = positive_limit(params.limit, DEFAULT_POLYGON_LIMIT)?;

    let result = analytics::polygon_analytics(&state.client, &polygon, Some(limit)).await?;
    Ok(Json(result))
}

/// GET /api/balancing-authorities
pub async fn api_balancing_authorities(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FacetValue>>, RenewVizError> {
    Ok(Json(analytics::balancing_authorities(&state.client).await?))
}

/// GET /api/metadata - Description, facets and frequencies of an API route.
pub async fn api_route_metadata(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetadataParams>,
) -> Result<Json<serde_json::Value>, RenewVizError> {
    let route = validate_route(params.route.as_deref().unwrap_or(DEFAULT_METADATA_ROUTE))?;
    Ok(Json(state.client.route_metadata(route).await?))
}

/// GET /api/fuel-types
pub async fn api_fuel_types(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FacetValue>>, RenewVizError> {
    Ok(Json(analytics::fuel_types(&state.client).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod split_codes_tests {
        use super::*;

        #[test]
        fn test_absent_is_empty() {
            assert!(split_codes(None).is_empty());
        }

        #[test]
        fn test_trims_and_uppercases() {
            assert_eq!(split_codes(Some(" ca, tx ,NV")), vec!["CA", "TX", "NV"]);
        }

        #[test]
        fn test_skips_empty_entries() {
            assert_eq!(split_codes(Some("CA,,")), vec!["CA"]);
            assert!(split_codes(Some(" , ")).is_empty());
        }
    }

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            parse_sources(Some("sun,WND")).unwrap(),
            vec![EnergySource::Solar, EnergySource::Wind]
        );
        assert!(matches!(
            parse_sources(Some("SUN,COAL")),
            Err(RenewVizError::BadRequest(_))
        ));
    }

    #[test]
    fn test_generator_params_defaults() {
        let query = GeneratorParams::default().to_query().unwrap();
        assert!(query.states.is_empty());
        assert!(query.sources.is_empty());
        assert_eq!(query.min_capacity, 0.0);
        assert_eq!(query.limit, Some(DEFAULT_GENERATOR_LIMIT));
    }

    #[test]
    fn test_zero_limit_rejected() {
        assert_eq!(positive_limit(None, DEFAULT_SUMMARY_LIMIT).unwrap(), 50_000);
        assert_eq!(positive_limit(Some(3), DEFAULT_SUMMARY_LIMIT).unwrap(), 3);
        assert!(matches!(
            positive_limit(Some(0), DEFAULT_SUMMARY_LIMIT),
            Err(RenewVizError::BadRequest(_))
        ));

        let params = GeneratorParams {
            limit: Some(0),
            ..Default::default()
        };
        assert!(params.to_query().is_err());
    }

    #[test]
    fn test_generation_params() {
        let query = GenerationParams::default().to_query().unwrap();
        assert_eq!(query.frequency, Frequency::Hourly);
        assert_eq!(query.order, SortDirection::Desc);
        assert_eq!(query.limit, Some(DEFAULT_GENERATION_LIMIT));

        let params = GenerationParams {
            frequency: Some("daily".into()),
            start: Some(" 2024-06-01".into()),
            end: Some("2024-06-30".into()),
            regions: Some("ciso,erco".into()),
            order: Some("asc".into()),
            ..Default::default()
        };
        let query = params.to_query().unwrap();
        assert_eq!(query.frequency, Frequency::Daily);
        assert_eq!(query.start.as_deref(), Some("2024-06-01"));
        assert_eq!(query.regions, vec!["CISO", "ERCO"]);
        assert_eq!(query.order, SortDirection::Asc);
    }

    #[test]
    fn test_generation_params_rejected() {
        for params in [
            GenerationParams {
                frequency: Some("weekly".into()),
                ..Default::default()
            },
            GenerationParams {
                order: Some("sideways".into()),
                ..Default::default()
            },
            GenerationParams {
                start: Some("2024-07".into()),
                end: Some("2024-06".into()),
                ..Default::default()
            },
            GenerationParams {
                limit: Some(0),
                ..Default::default()
            },
        ] {
            assert!(matches!(
                params.to_query(),
                Err(RenewVizError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_validate_route() {
        assert_eq!(
            validate_route("/electricity/rto/").unwrap(),
            "electricity/rto"
        );
        for bad in ["", "electricity/../admin", "electricity//rto", "a?b=c", "x y"] {
            assert!(validate_route(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let params = BoundsParams {
            min_lat: 40.0,
            max_lat: 30.0,
            min_lon: -100.0,
            max_lon: -90.0,
            sources: None,
            limit: None,
        };
        assert!(matches!(
            params.bounding_box(),
            Err(RenewVizError::BadRequest(_))
        ));
    }
}
