use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{NormalizeStore, TreatmentInsert};
use crate::values::{pick_text, pick_value, raw_properties, to_date};

/// Origin tag stored on every imported treatment.
pub const TREATMENT_ORIGIN: &str = "LiPowerline";

const SERVICE_ALIASES: &[&str] = &["tipo", "service", "servico"];
const EXECUTED_ALIASES: &[&str] = &["data", "data_execucao", "executed_at"];

/// Replaces the scenario's treatments with the staged "already treated"
/// features. With nothing staged the existing rows are left alone and 0 is
/// returned.
pub async fn upsert_treatments<S>(
    store: &mut S,
    dataset_id: Uuid,
    line_id: Uuid,
    scenario_id: Uuid,
) -> Result<usize>
where
    S: NormalizeStore + ?Sized,
{
    let staged = store.staged_treatments(dataset_id).await?;
    if staged.is_empty() {
        debug!(dataset_id = %dataset_id, "No staged treatments; keeping existing rows");
        return Ok(0);
    }

    let removed = store.delete_treatments(scenario_id).await?;
    debug!(scenario_id = %scenario_id, removed, "Cleared treatments");

    for feature in &staged {
        let props = raw_properties(&feature.raw);
        let treatment = TreatmentInsert {
            scenario_id,
            line_id,
            span_id: None,
            geom_json: feature.geom_json.clone(),
            service_type: pick_text(props, SERVICE_ALIASES),
            executed_on: to_date(pick_value(props, EXECUTED_ALIASES)),
            origin: TREATMENT_ORIGIN.to_string(),
            metadata: json!({ "dataset_id": dataset_id.to_string(), "stg_id": feature.stg_id }),
        };
        store.insert_treatment(&treatment).await?;
    }

    info!(scenario_id = %scenario_id, treatments = staged.len(), "Replaced treatments");
    Ok(staged.len())
}
