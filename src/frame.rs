//! Columnar views of generator lists for export and grouping.

use polars::prelude::*;
use serde::Serialize;

use crate::error::RenewVizError;
use crate::models::GeneratorRecord;

/// Installed capacity of one technology.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyCapacity {
    pub technology: String,
    pub capacity_mw: f64,
    pub count: usize,
}

/// One row per generator, column names matching the JSON API.
pub fn generators_frame(generators: &[GeneratorRecord]) -> Result<DataFrame, RenewVizError> {
    let df = df!(
        "id" => generators.iter().map(|g| g.id.as_str()).collect::<Vec<_>>(),
        "name" => generators.iter().map(|g| g.plant_name.as_str()).collect::<Vec<_>>(),
        "state" => generators.iter().map(|g| g.state.as_str()).collect::<Vec<_>>(),
        "technology" => generators.iter().map(|g| g.technology.as_str()).collect::<Vec<_>>(),
        "energy_source" => generators.iter().map(|g| g.energy_source.as_str()).collect::<Vec<_>>(),
        "capacity_mw" => generators.iter().map(|g| g.nameplate_capacity_mw).collect::<Vec<_>>(),
        "net_summer_capacity_mw" => generators.iter().map(|g| g.net_summer_capacity_mw).collect::<Vec<_>>(),
        "net_winter_capacity_mw" => generators.iter().map(|g| g.net_winter_capacity_mw).collect::<Vec<_>>(),
        "lat" => generators.iter().map(|g| g.latitude).collect::<Vec<_>>(),
        "lon" => generators.iter().map(|g| g.longitude).collect::<Vec<_>>(),
        "operating_year" => generators.iter().map(|g| g.operating_year).collect::<Vec<_>>(),
    )?;
    Ok(df)
}

pub fn to_csv(df: &mut DataFrame) -> Result<Vec<u8>, RenewVizError> {
    let mut buf = Vec::new();
    CsvWriter::new(&mut buf).include_header(true).finish(df)?;
    Ok(buf)
}

/// Row-oriented JSON array.
pub fn to_json(df: &mut DataFrame) -> Result<Vec<u8>, RenewVizError> {
    let mut buf = Vec::new();
    JsonWriter::new(&mut buf)
        .with_json_format(JsonFormat::Json)
        .finish(df)?;
    Ok(buf)
}

/// Total MW and generator count per technology, largest first.
pub fn capacity_by_technology(df: &DataFrame) -> Result<Vec<TechnologyCapacity>, RenewVizError> {
    let res = df
        .clone()
        .lazy()
        .group_by([col("technology")])
        .agg([col("capacity_mw").sum().alias("capacity_mw"), len().alias("count")])
        .sort(
            ["capacity_mw", "technology"],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .collect()?;

    let technologies: Vec<String> = res
        .column("technology")?
        .str()?
        .into_iter()
        .map(|t| t.unwrap_or_default().to_string())
        .collect();
    let capacities: Vec<f64> = res
        .column("capacity_mw")?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let counts: Vec<usize> = res
        .column("count")?
        .cast(&DataType::UInt64)?
        .u64()?
        .into_iter()
        .map(|v| v.unwrap_or(0) as usize)
        .collect();

    Ok(technologies
        .into_iter()
        .zip(capacities)
        .zip(counts)
        .map(|((technology, capacity_mw), count)| TechnologyCapacity {
            technology,
            capacity_mw,
            count,
        })
        .collect())
}
