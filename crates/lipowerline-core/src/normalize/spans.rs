use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::geometry::{point_coordinates, segment_geojson, segment_length_m};
use crate::store::{NormalizeStore, SpanUpsert, StructureRecord};

pub fn span_code(start: &str, end: &str) -> String {
    format!("{} - {}", start, end)
}

/// Pairs consecutive structures of a line into span upserts.
///
/// Structures are ordered by their staging order when known, otherwise by
/// their 1-based position in `structures` (creation order). Ties keep
/// creation order.
pub fn plan_spans(line_id: Uuid, structures: &[StructureRecord], generated_at: &str) -> Vec<SpanUpsert> {
    let mut ordered: Vec<(i64, &StructureRecord)> = structures
        .iter()
        .enumerate()
        .map(|(idx, structure)| (structure.stg_order.unwrap_or(idx as i64 + 1), structure))
        .collect();
    ordered.sort_by_key(|(order, _)| *order);

    ordered
        .windows(2)
        .map(|pair| {
            let (_, start) = pair[0];
            let (_, end) = pair[1];
            let endpoints = start
                .geom_json
                .as_deref()
                .and_then(point_coordinates)
                .zip(end.geom_json.as_deref().and_then(point_coordinates));

            SpanUpsert {
                line_id,
                start_structure_id: Some(start.structure_id),
                end_structure_id: Some(end.structure_id),
                code: span_code(&start.code, &end.code),
                length_m: endpoints.map(|(a, b)| segment_length_m(a, b)),
                geom_json: endpoints.map(|(a, b)| segment_geojson(a, b)),
                metadata: json!({ "source": "auto", "generated_at": generated_at }),
            }
        })
        .collect()
}

/// Derives and upserts the spans of `line_id`; returns how many were written.
pub async fn derive_spans<S>(store: &mut S, line_id: Uuid) -> Result<usize>
where
    S: NormalizeStore + ?Sized,
{
    let structures = store.line_structures(line_id).await?;
    let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let spans = plan_spans(line_id, &structures, &generated_at);

    for span in &spans {
        store.upsert_span(span).await?;
    }

    info!(
        line_id = %line_id,
        structures = structures.len(),
        spans = spans.len(),
        "Derived spans"
    );
    Ok(spans.len())
}
