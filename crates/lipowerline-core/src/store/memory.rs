//! In-process store with the same upsert semantics as the PostGIS schema.
//!
//! Useful for previews without a database and for exercising the pipeline in
//! tests. Staging setters stand in for the KML/CSV loader.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use uuid::Uuid;

use super::{
    LineUpsert, NormalizeStore, ScenarioUpsert, SpanRecord, SpanUpsert, StructureRecord,
    StructureUpsert, TreatmentInsert, VegetationElementUpsert, VegetationRiskInsert,
};
use crate::error::Result;
use crate::merge::{merge_metadata, merge_scalar};
use crate::staging::{StagedFeature, StagedRow};

#[derive(Debug, Clone, PartialEq)]
pub struct LineRow {
    pub line_id: Uuid,
    pub code: String,
    pub name: Option<String>,
    pub voltage_kv: Option<f64>,
    pub operator: Option<String>,
    pub region: Option<String>,
    pub geom_json: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioRow {
    pub scenario_id: Uuid,
    pub line_id: Uuid,
    pub description: String,
    pub reference_date: Option<NaiveDate>,
    pub scenario_type: String,
    pub status: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureRow {
    pub structure_id: Uuid,
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

#[derive(Debug, Clone, PartialEq)]
pub struct SpanRow {
    pub span_id: Uuid,
    pub line_id: Uuid,
    pub start_structure_id: Option<Uuid>,
    pub end_structure_id: Option<Uuid>,
    pub code: String,
    pub length_m: Option<f64>,
    pub geom_json: Option<String>,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VegetationElementRow {
    pub element_id: Uuid,
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
pub struct VegetationRiskRow {
    pub risk_id: Uuid,
    pub risk: VegetationRiskInsert,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentRow {
    pub treatment_id: Uuid,
    pub treatment: TreatmentInsert,
}

#[derive(Debug, Default)]
struct StagedDataset {
    lines: Vec<(i64, Option<String>)>,
    structures: Vec<StagedFeature>,
    treatments: Vec<StagedFeature>,
    vegetation_risks: Vec<StagedRow>,
    vegetation: Vec<StagedRow>,
}

/// Canonical tables are kept in insertion order, which doubles as creation
/// order for span derivation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    staged: HashMap<Uuid, StagedDataset>,
    next_stg_id: i64,
    lines: Vec<LineRow>,
    scenarios: Vec<ScenarioRow>,
    structures: Vec<StructureRow>,
    spans: Vec<SpanRow>,
    elements: Vec<VegetationElementRow>,
    risks: Vec<VegetationRiskRow>,
    treatments: Vec<TreatmentRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_stg_id(&mut self) -> i64 {
        self.next_stg_id += 1;
        self.next_stg_id
    }

    /// Stages a raw line feature; returns its staging id.
    pub fn stage_line(&mut self, dataset_id: Uuid, geom_json: Option<&str>) -> i64 {
        let stg_id = self.next_stg_id();
        self.staged
            .entry(dataset_id)
            .or_default()
            .lines
            .push((stg_id, geom_json.map(str::to_string)));
        stg_id
    }

    /// Stages a structure placemark; returns its staging id.
    pub fn stage_structure(
        &mut self,
        dataset_id: Uuid,
        feature_name: Option<&str>,
        raw: Value,
        geom_json: Option<&str>,
    ) -> i64 {
        let stg_id = self.next_stg_id();
        self.staged
            .entry(dataset_id)
            .or_default()
            .structures
            .push(StagedFeature {
                stg_id,
                feature_name: feature_name.map(str::to_string),
                raw,
                geom_json: geom_json.map(str::to_string),
            });
        stg_id
    }

    /// Stages an already-treated placemark; returns its staging id.
    pub fn stage_treatment(&mut self, dataset_id: Uuid, raw: Value, geom_json: Option<&str>) -> i64 {
        let stg_id = self.next_stg_id();
        self.staged
            .entry(dataset_id)
            .or_default()
            .treatments
            .push(StagedFeature {
                stg_id,
                feature_name: None,
                raw,
                geom_json: geom_json.map(str::to_string),
            });
        stg_id
    }

    pub fn stage_vegetation_risk(&mut self, dataset_id: Uuid, row_number: i64, raw: Value) {
        self.staged
            .entry(dataset_id)
            .or_default()
            .vegetation_risks
            .push(StagedRow { row_number, raw });
    }

    pub fn stage_vegetation(&mut self, dataset_id: Uuid, row_number: i64, raw: Value) {
        self.staged
            .entry(dataset_id)
            .or_default()
            .vegetation
            .push(StagedRow { row_number, raw });
    }

    pub fn line(&self, line_id: Uuid) -> Option<&LineRow> {
        self.lines.iter().find(|line| line.line_id == line_id)
    }

    pub fn line_by_code(&self, code: &str) -> Option<&LineRow> {
        self.lines.iter().find(|line| line.code == code)
    }

    pub fn scenario(&self, scenario_id: Uuid) -> Option<&ScenarioRow> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.scenario_id == scenario_id)
    }

    pub fn structures(&self, line_id: Uuid) -> Vec<&StructureRow> {
        self.structures
            .iter()
            .filter(|structure| structure.line_id == line_id)
            .collect()
    }

    pub fn spans(&self, line_id: Uuid) -> Vec<&SpanRow> {
        self.spans.iter().filter(|span| span.line_id == line_id).collect()
    }

    pub fn vegetation_elements(&self, line_id: Uuid) -> Vec<&VegetationElementRow> {
        self.elements
            .iter()
            .filter(|element| element.line_id == line_id)
            .collect()
    }

    pub fn vegetation_risks(&self, scenario_id: Uuid) -> Vec<&VegetationRiskRow> {
        self.risks
            .iter()
            .filter(|row| row.risk.scenario_id == scenario_id)
            .collect()
    }

    pub fn treatments(&self, scenario_id: Uuid) -> Vec<&TreatmentRow> {
        self.treatments
            .iter()
            .filter(|row| row.treatment.scenario_id == scenario_id)
            .collect()
    }

    fn staged(&self, dataset_id: Uuid) -> Option<&StagedDataset> {
        self.staged.get(&dataset_id)
    }
}

fn sorted_features(mut features: Vec<StagedFeature>) -> Vec<StagedFeature> {
    features.sort_by_key(|feature| feature.stg_id);
    features
}

fn sorted_rows(mut rows: Vec<StagedRow>) -> Vec<StagedRow> {
    rows.sort_by_key(|row| row.row_number);
    rows
}

fn stg_order(metadata: &Value) -> Option<i64> {
    match metadata.get("stg_order")? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl NormalizeStore for MemoryStore {
    async fn latest_line_geometry(&mut self, dataset_id: Uuid) -> Result<Option<String>> {
        Ok(self
            .staged(dataset_id)
            .and_then(|staged| staged.lines.iter().max_by_key(|(stg_id, _)| *stg_id))
            .and_then(|(_, geom)| geom.clone()))
    }

    async fn staged_structures(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>> {
        Ok(self
            .staged(dataset_id)
            .map(|staged| sorted_features(staged.structures.clone()))
            .unwrap_or_default())
    }

    async fn staged_vegetation_risks(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>> {
        Ok(self
            .staged(dataset_id)
            .map(|staged| sorted_rows(staged.vegetation_risks.clone()))
            .unwrap_or_default())
    }

    async fn staged_vegetation(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>> {
        Ok(self
            .staged(dataset_id)
            .map(|staged| sorted_rows(staged.vegetation.clone()))
            .unwrap_or_default())
    }

    async fn staged_treatments(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>> {
        Ok(self
            .staged(dataset_id)
            .map(|staged| sorted_features(staged.treatments.clone()))
            .unwrap_or_default())
    }

    async fn upsert_line(&mut self, line: &LineUpsert) -> Result<Uuid> {
        if let Some(existing) = self.lines.iter_mut().find(|row| row.code == line.code) {
            existing.name = merge_scalar(existing.name.take(), line.name.clone());
            existing.voltage_kv = merge_scalar(existing.voltage_kv, line.voltage_kv);
            existing.operator = merge_scalar(existing.operator.take(), line.operator.clone());
            existing.region = merge_scalar(existing.region.take(), line.region.clone());
            existing.geom_json = merge_scalar(existing.geom_json.take(), line.geom_json.clone());
            existing.metadata = merge_metadata(&existing.metadata, &line.metadata);
            return Ok(existing.line_id);
        }

        let line_id = Uuid::new_v4();
        self.lines.push(LineRow {
            line_id,
            code: line.code.clone(),
            name: line.name.clone(),
            voltage_kv: line.voltage_kv,
            operator: line.operator.clone(),
            region: line.region.clone(),
            geom_json: line.geom_json.clone(),
            metadata: line.metadata.clone(),
        });
        Ok(line_id)
    }

    async fn upsert_scenario(&mut self, scenario: &ScenarioUpsert) -> Result<Uuid> {
        if let Some(existing) = self.scenarios.iter_mut().find(|row| {
            row.line_id == scenario.line_id && row.description == scenario.description
        }) {
            existing.reference_date =
                merge_scalar(existing.reference_date, scenario.reference_date);
            existing.scenario_type = scenario.scenario_type.clone();
            existing.status = scenario.status.clone();
            existing.metadata = merge_metadata(&existing.metadata, &scenario.metadata);
            return Ok(existing.scenario_id);
        }

        let scenario_id = Uuid::new_v4();
        self.scenarios.push(ScenarioRow {
            scenario_id,
            line_id: scenario.line_id,
            description: scenario.description.clone(),
            reference_date: scenario.reference_date,
            scenario_type: scenario.scenario_type.clone(),
            status: scenario.status.clone(),
            metadata: scenario.metadata.clone(),
        });
        Ok(scenario_id)
    }

    async fn upsert_structure(&mut self, structure: &StructureUpsert) -> Result<Uuid> {
        if let Some(existing) = self
            .structures
            .iter_mut()
            .find(|row| row.line_id == structure.line_id && row.code == structure.code)
        {
            existing.structure_type = merge_scalar(
                existing.structure_type.take(),
                structure.structure_type.clone(),
            );
            existing.circuit_count = merge_scalar(existing.circuit_count, structure.circuit_count);
            existing.height_m = merge_scalar(existing.height_m, structure.height_m);
            existing.latitude = merge_scalar(existing.latitude, structure.latitude);
            existing.longitude = merge_scalar(existing.longitude, structure.longitude);
            existing.geom_json =
                merge_scalar(existing.geom_json.take(), structure.geom_json.clone());
            existing.metadata = merge_metadata(&existing.metadata, &structure.metadata);
            return Ok(existing.structure_id);
        }

        let structure_id = Uuid::new_v4();
        self.structures.push(StructureRow {
            structure_id,
            line_id: structure.line_id,
            code: structure.code.clone(),
            structure_type: structure.structure_type.clone(),
            circuit_count: structure.circuit_count,
            height_m: structure.height_m,
            latitude: structure.latitude,
            longitude: structure.longitude,
            geom_json: structure.geom_json.clone(),
            metadata: structure.metadata.clone(),
        });
        Ok(structure_id)
    }

    async fn line_structures(&mut self, line_id: Uuid) -> Result<Vec<StructureRecord>> {
        Ok(self
            .structures
            .iter()
            .filter(|row| row.line_id == line_id)
            .map(|row| StructureRecord {
                structure_id: row.structure_id,
                code: row.code.clone(),
                geom_json: row.geom_json.clone(),
                stg_order: stg_order(&row.metadata),
            })
            .collect())
    }

    async fn upsert_span(&mut self, span: &SpanUpsert) -> Result<Uuid> {
        if let Some(existing) = self
            .spans
            .iter_mut()
            .find(|row| row.line_id == span.line_id && row.code == span.code)
        {
            existing.start_structure_id = span.start_structure_id;
            existing.end_structure_id = span.end_structure_id;
            existing.geom_json = merge_scalar(existing.geom_json.take(), span.geom_json.clone());
            existing.length_m = merge_scalar(existing.length_m, span.length_m);
            existing.metadata = merge_metadata(&existing.metadata, &span.metadata);
            return Ok(existing.span_id);
        }

        let span_id = Uuid::new_v4();
        self.spans.push(SpanRow {
            span_id,
            line_id: span.line_id,
            start_structure_id: span.start_structure_id,
            end_structure_id: span.end_structure_id,
            code: span.code.clone(),
            length_m: span.length_m,
            geom_json: span.geom_json.clone(),
            metadata: span.metadata.clone(),
        });
        Ok(span_id)
    }

    async fn line_spans(&mut self, line_id: Uuid) -> Result<Vec<SpanRecord>> {
        let code_of = |id: Option<Uuid>| {
            id.and_then(|id| {
                self.structures
                    .iter()
                    .find(|structure| structure.structure_id == id)
                    .map(|structure| structure.code.clone())
            })
        };
        Ok(self
            .spans
            .iter()
            .filter(|row| row.line_id == line_id)
            .map(|row| SpanRecord {
                span_id: row.span_id,
                code: row.code.clone(),
                start_code: code_of(row.start_structure_id),
                end_code: code_of(row.end_structure_id),
            })
            .collect())
    }

    async fn delete_vegetation_risks(&mut self, scenario_id: Uuid) -> Result<u64> {
        let before = self.risks.len();
        self.risks.retain(|row| row.risk.scenario_id != scenario_id);
        Ok((before - self.risks.len()) as u64)
    }

    async fn upsert_vegetation_element(
        &mut self,
        element: &VegetationElementUpsert,
    ) -> Result<Uuid> {
        if let Some(existing) = self.elements.iter_mut().find(|row| {
            row.line_id == element.line_id && row.external_code == element.external_code
        }) {
            existing.span_id = merge_scalar(existing.span_id, element.span_id);
            existing.geom_json = merge_scalar(existing.geom_json.take(), element.geom_json.clone());
            existing.height_m = merge_scalar(existing.height_m, element.height_m);
            existing.vegetation_type = merge_scalar(
                existing.vegetation_type.take(),
                element.vegetation_type.clone(),
            );
            existing.riparian = merge_scalar(existing.riparian, element.riparian);
            existing.metadata = merge_metadata(&existing.metadata, &element.metadata);
            return Ok(existing.element_id);
        }

        let element_id = Uuid::new_v4();
        self.elements.push(VegetationElementRow {
            element_id,
            line_id: element.line_id,
            span_id: element.span_id,
            external_code: element.external_code.clone(),
            geom_json: element.geom_json.clone(),
            height_m: element.height_m,
            vegetation_type: element.vegetation_type.clone(),
            riparian: element.riparian,
            metadata: element.metadata.clone(),
        });
        Ok(element_id)
    }

    async fn insert_vegetation_risk(&mut self, risk: &VegetationRiskInsert) -> Result<Uuid> {
        let risk_id = Uuid::new_v4();
        self.risks.push(VegetationRiskRow {
            risk_id,
            risk: risk.clone(),
        });
        Ok(risk_id)
    }

    async fn delete_treatments(&mut self, scenario_id: Uuid) -> Result<u64> {
        let before = self.treatments.len();
        self.treatments
            .retain(|row| row.treatment.scenario_id != scenario_id);
        Ok((before - self.treatments.len()) as u64)
    }

    async fn insert_treatment(&mut self, treatment: &TreatmentInsert) -> Result<Uuid> {
        let treatment_id = Uuid::new_v4();
        self.treatments.push(TreatmentRow {
            treatment_id,
            treatment: treatment.clone(),
        });
        Ok(treatment_id)
    }
}
