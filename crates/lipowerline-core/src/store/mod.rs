//! Storage seam for the normalization pipeline.
//!
//! The pipeline only talks to a [`NormalizeStore`]; `PgStore` runs it against
//! the PostGIS schema and `MemoryStore` keeps everything in process.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::staging::{StagedFeature, StagedRow};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq)]
pub struct LineUpsert {
    pub code: String,
    pub name: Option<String>,
    pub voltage_kv: Option<f64>,
    pub operator: Option<String>,
    pub region: Option<String>,
    pub geom_json: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioUpsert {
    pub line_id: Uuid,
    pub description: String,
    pub reference_date: Option<NaiveDate>,
    pub scenario_type: String,
    pub status: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureUpsert {
    pub line_id: Uuid,
    pub code: String,
    pub structure_type: Option<String>,
    pub circuit_count: Option<i32>,
    pub height_m: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub geom_json: Option<String>,
    pub metadata: Value,
}

/// A structure as seen by span derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureRecord {
    pub structure_id: Uuid,
    pub code: String,
    pub geom_json: Option<String>,
    /// `metadata.stg_order` when it holds an integer.
    pub stg_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanUpsert {
    pub line_id: Uuid,
    pub start_structure_id: Option<Uuid>,
    pub end_structure_id: Option<Uuid>,
    pub code: String,
    pub length_m: Option<f64>,
    pub geom_json: Option<String>,
    pub metadata: Value,
}

/// A span with the codes of its endpoint structures, for risk-row matching.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRecord {
    pub span_id: Uuid,
    pub code: String,
    pub start_code: Option<String>,
    pub end_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VegetationElementUpsert {
    pub line_id: Uuid,
    pub span_id: Option<Uuid>,
    pub external_code: String,
    pub geom_json: Option<String>,
    pub height_m: Option<f64>,
    pub vegetation_type: Option<String>,
    pub riparian: Option<bool>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VegetationRiskInsert {
    pub span_id: Option<Uuid>,
    pub element_id: Uuid,
    pub scenario_id: Uuid,
    pub min_conductor_distance_m: Option<f64>,
    pub clearance_class: Option<String>,
    pub lateral_distance_m: Option<f64>,
    pub risk_category: Option<String>,
    pub processed_on: Option<NaiveDate>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentInsert {
    pub scenario_id: Uuid,
    pub line_id: Uuid,
    pub span_id: Option<Uuid>,
    pub geom_json: Option<String>,
    pub service_type: Option<String>,
    pub executed_on: Option<NaiveDate>,
    pub origin: String,
    pub metadata: Value,
}

#[async_trait]
pub trait NormalizeStore: Send {
    /// GeoJSON of the most recently staged line feature of the dataset.
    async fn latest_line_geometry(&mut self, dataset_id: Uuid) -> Result<Option<String>>;

    /// Structure placemarks ordered by staging id.
    async fn staged_structures(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>>;

    /// Vegetation risk rows ordered by row number.
    async fn staged_vegetation_risks(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>>;

    /// Vegetation attribute rows ordered by row number.
    async fn staged_vegetation(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>>;

    /// Already-treated placemarks ordered by staging id.
    async fn staged_treatments(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>>;

    async fn upsert_line(&mut self, line: &LineUpsert) -> Result<Uuid>;

    async fn upsert_scenario(&mut self, scenario: &ScenarioUpsert) -> Result<Uuid>;

    async fn upsert_structure(&mut self, structure: &StructureUpsert) -> Result<Uuid>;

    /// Structures of a line in creation order.
    async fn line_structures(&mut self, line_id: Uuid) -> Result<Vec<StructureRecord>>;

    async fn upsert_span(&mut self, span: &SpanUpsert) -> Result<Uuid>;

    async fn line_spans(&mut self, line_id: Uuid) -> Result<Vec<SpanRecord>>;

    async fn delete_vegetation_risks(&mut self, scenario_id: Uuid) -> Result<u64>;

    async fn upsert_vegetation_element(
        &mut self,
        element: &VegetationElementUpsert,
    ) -> Result<Uuid>;

    async fn insert_vegetation_risk(&mut self, risk: &VegetationRiskInsert) -> Result<Uuid>;

    async fn delete_treatments(&mut self, scenario_id: Uuid) -> Result<u64>;

    async fn insert_treatment(&mut self, treatment: &TreatmentInsert) -> Result<Uuid>;
}
