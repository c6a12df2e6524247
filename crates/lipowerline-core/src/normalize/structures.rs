use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::geometry::point_coordinates;
use crate::staging::StagedFeature;
use crate::store::{NormalizeStore, StructureUpsert};
use crate::values::{pick_text, pick_value, raw_properties, to_integer, to_number};

const CODE_ALIASES: &[&str] = &["codigo", "structure_id", "estrutura", "id"];
const TYPE_ALIASES: &[&str] = &["tipo", "type", "class"];
const CIRCUIT_ALIASES: &[&str] = &["n_circuitos", "circuitos", "circuit"];
const HEIGHT_ALIASES: &[&str] = &["altura", "height_m", "height"];

/// Upserts every staged structure of the dataset under `line_id` and returns
/// how many rows were processed.
pub async fn upsert_structures<S>(store: &mut S, dataset_id: Uuid, line_id: Uuid) -> Result<usize>
where
    S: NormalizeStore + ?Sized,
{
    let staged = store.staged_structures(dataset_id).await?;

    let mut count = 0;
    for feature in &staged {
        let structure = structure_from_feature(dataset_id, line_id, feature);
        store.upsert_structure(&structure).await?;
        count += 1;
    }

    info!(dataset_id = %dataset_id, line_id = %line_id, structures = count, "Upserted structures");
    Ok(count)
}

/// Canonical code: explicit code property, then the placemark name, then
/// `estrutura_<stg_id>`.
pub(crate) fn structure_code(feature: &StagedFeature) -> String {
    let props = raw_properties(&feature.raw);
    pick_text(props, CODE_ALIASES)
        .or_else(|| {
            feature
                .feature_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("estrutura_{}", feature.stg_id))
}

fn structure_from_feature(dataset_id: Uuid, line_id: Uuid, feature: &StagedFeature) -> StructureUpsert {
    let props = raw_properties(&feature.raw);
    let point = feature.geom_json.as_deref().and_then(point_coordinates);

    StructureUpsert {
        line_id,
        code: structure_code(feature),
        structure_type: pick_text(props, TYPE_ALIASES),
        circuit_count: to_integer(pick_value(props, CIRCUIT_ALIASES)),
        height_m: to_number(pick_value(props, HEIGHT_ALIASES)),
        latitude: point.map(|p| p.lat),
        longitude: point.map(|p| p.lon),
        geom_json: feature.geom_json.clone(),
        metadata: json!({
            "source_dataset": dataset_id.to_string(),
            "stg_id": feature.stg_id,
            "stg_order": feature.stg_id,
        }),
    }
}
