use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::geometry::{point_geojson, Coordinate};
use crate::store::{NormalizeStore, SpanRecord, VegetationElementUpsert, VegetationRiskInsert};
use crate::values::{
    normalize_span_key, pick_text, pick_value, sanitize_class, to_boolean, to_date, to_number,
};

const TREE_ID_ALIASES: &[&str] = &["tree_id", "arvore_id", "id"];
const SPAN_ALIASES: &[&str] = &["vao", "vao_codigo", "span", "span_id", "span_code"];
const SPAN_START_ALIASES: &[&str] = &["estrutura_ini", "structure_ini", "tower_start"];
const SPAN_END_ALIASES: &[&str] = &["estrutura_fim", "structure_fim", "tower_end"];
const LAT_ALIASES: &[&str] = &["lat", "latitude", "y"];
const LON_ALIASES: &[&str] = &["lon", "longitude", "x"];
const HEIGHT_ALIASES: &[&str] = &["altura", "height", "height_m"];
const VEGETATION_TYPE_ALIASES: &[&str] = &["tipo", "vegetation_type", "class"];
const RIPARIAN_ALIASES: &[&str] = &["em_app", "riparian", "app"];
const MIN_DISTANCE_ALIASES: &[&str] = &[
    "dist_min_cabo_m",
    "distancia_min",
    "clearance_m",
    "distance_to_conductor_m",
];
const LATERAL_DISTANCE_ALIASES: &[&str] = &["distancia_lateral_m", "lateral_distance", "offset_m"];
const CATEGORY_ALIASES: &[&str] = &["categoria", "risk_category", "classificacao"];
const CLASS_ALIASES: &[&str] = &["classe_risco", "risk_class", "clearance_class"];
const PROCESSED_ALIASES: &[&str] = &["data_processamento", "processed_at", "date"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VegetationCounts {
    pub elements_upserted: usize,
    pub risks_inserted: usize,
}

/// Spans of a line keyed by normalized code and by normalized
/// `"<start>-<end>"` structure codes (when both endpoints are known). Later
/// spans overwrite earlier ones on key collisions.
#[derive(Debug, Default, Clone)]
pub struct SpanIndex {
    by_key: HashMap<String, Uuid>,
}

impl SpanIndex {
    pub fn from_spans(spans: &[SpanRecord]) -> Self {
        let mut by_key = HashMap::with_capacity(spans.len() * 2);
        for span in spans {
            by_key.insert(normalize_span_key(&span.code), span.span_id);
            if let (Some(start), Some(end)) = (span.start_code.as_deref(), span.end_code.as_deref()) {
                by_key.insert(normalize_span_key(&format!("{}-{}", start, end)), span.span_id);
            }
        }
        Self { by_key }
    }

    pub fn get(&self, key: &str) -> Option<Uuid> {
        self.by_key.get(&normalize_span_key(key)).copied()
    }

    /// Explicit span field first, then the start/end structure pair.
    pub fn resolve(&self, record: &Value) -> Option<Uuid> {
        if let Some(span_id) = pick_text(record, SPAN_ALIASES).and_then(|key| self.get(&key)) {
            return Some(span_id);
        }
        let start = pick_text(record, SPAN_START_ALIASES)?;
        let end = pick_text(record, SPAN_END_ALIASES)?;
        self.get(&format!("{}-{}", start, end))
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Replaces the scenario's vegetation risk rows with the staged ones,
/// upserting the vegetation element each risk row refers to.
///
/// Risk rows pair with vegetation rows by row number; a risk row without a
/// partner is its own attribute source. Rows whose span cannot be matched are
/// kept with no span.
pub async fn upsert_vegetation_risks<S>(
    store: &mut S,
    dataset_id: Uuid,
    line_id: Uuid,
    scenario_id: Uuid,
) -> Result<VegetationCounts>
where
    S: NormalizeStore + ?Sized,
{
    let spans = store.line_spans(line_id).await?;
    let index = SpanIndex::from_spans(&spans);

    let removed = store.delete_vegetation_risks(scenario_id).await?;
    debug!(scenario_id = %scenario_id, removed, "Cleared vegetation risks");

    let risk_rows = store.staged_vegetation_risks(dataset_id).await?;
    let vegetation_rows: HashMap<i64, Value> = store
        .staged_vegetation(dataset_id)
        .await?
        .into_iter()
        .map(|row| (row.row_number, row.raw))
        .collect();

    let mut counts = VegetationCounts::default();
    let mut unmatched = 0usize;

    for row in &risk_rows {
        let risk_record = &row.raw;
        let vegetation_record = vegetation_rows.get(&row.row_number).unwrap_or(risk_record);
        let span_id = index.resolve(risk_record);
        if span_id.is_none() {
            unmatched += 1;
        }

        let element = element_from_record(dataset_id, line_id, span_id, row.row_number, vegetation_record);
        let element_id = store.upsert_vegetation_element(&element).await?;
        counts.elements_upserted += 1;

        let risk = risk_from_record(dataset_id, scenario_id, span_id, element_id, row.row_number, risk_record);
        store.insert_vegetation_risk(&risk).await?;
        counts.risks_inserted += 1;
    }

    info!(
        scenario_id = %scenario_id,
        vegetation_elements = counts.elements_upserted,
        vegetation_risks = counts.risks_inserted,
        unmatched_spans = unmatched,
        "Replaced vegetation risks"
    );
    Ok(counts)
}

fn element_from_record(
    dataset_id: Uuid,
    line_id: Uuid,
    span_id: Option<Uuid>,
    row_number: i64,
    record: &Value,
) -> VegetationElementUpsert {
    let external_code =
        pick_text(record, TREE_ID_ALIASES).unwrap_or_else(|| format!("tree_{}", row_number));
    let lat = to_number(pick_value(record, LAT_ALIASES));
    let lon = to_number(pick_value(record, LON_ALIASES));

    VegetationElementUpsert {
        line_id,
        span_id,
        external_code,
        geom_json: lat
            .zip(lon)
            .map(|(lat, lon)| point_geojson(Coordinate { lon, lat })),
        height_m: to_number(pick_value(record, HEIGHT_ALIASES)),
        vegetation_type: pick_text(record, VEGETATION_TYPE_ALIASES),
        riparian: to_boolean(pick_value(record, RIPARIAN_ALIASES)),
        metadata: json!({ "dataset_id": dataset_id.to_string(), "row_number": row_number }),
    }
}

fn risk_from_record(
    dataset_id: Uuid,
    scenario_id: Uuid,
    span_id: Option<Uuid>,
    element_id: Uuid,
    row_number: i64,
    record: &Value,
) -> VegetationRiskInsert {
    VegetationRiskInsert {
        span_id,
        element_id,
        scenario_id,
        min_conductor_distance_m: to_number(pick_value(record, MIN_DISTANCE_ALIASES)),
        clearance_class: sanitize_class(pick_text(record, CLASS_ALIASES)),
        lateral_distance_m: to_number(pick_value(record, LATERAL_DISTANCE_ALIASES)),
        risk_category: pick_text(record, CATEGORY_ALIASES),
        processed_on: to_date(pick_value(record, PROCESSED_ALIASES)),
        metadata: json!({ "dataset_id": dataset_id.to_string(), "row_number": row_number }),
    }
}
