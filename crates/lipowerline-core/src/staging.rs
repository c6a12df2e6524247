//! Rows read back from the staging tables filled by the KML/CSV loader.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// A KML placemark staged into `stg_kml_estrutura` or `stg_kml_tratado`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StagedFeature {
    pub stg_id: i64,
    pub feature_name: Option<String>,
    pub raw: Value,
    /// Geometry rendered as GeoJSON text.
    pub geom_json: Option<String>,
}

/// A CSV record staged into `stg_csv_risco_vegetacao` or `stg_csv_vegetacao`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StagedRow {
    pub row_number: i64,
    pub raw: Value,
}
