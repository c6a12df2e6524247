use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::options::ImportOptions;
use crate::store::{LineUpsert, NormalizeStore, ScenarioUpsert};

/// Creates or refreshes the line named by `options.line_code`.
///
/// Geometry comes from the most recently staged line feature; a dataset
/// without one leaves the stored geometry untouched.
pub async fn ensure_line<S>(store: &mut S, dataset_id: Uuid, options: &ImportOptions) -> Result<Uuid>
where
    S: NormalizeStore + ?Sized,
{
    let geom_json = store.latest_line_geometry(dataset_id).await?;
    if geom_json.is_none() {
        debug!(dataset_id = %dataset_id, "No staged line geometry");
    }

    let line = LineUpsert {
        code: options.line_code.clone(),
        name: options.line_name.clone(),
        voltage_kv: options.voltage_kv,
        operator: options.operator.clone(),
        region: options.region.clone(),
        geom_json,
        metadata: json!({
            "source_dataset": dataset_id.to_string(),
            "scenario_hint": options.scenario_description,
        }),
    };

    let line_id = store.upsert_line(&line).await?;
    info!(line_id = %line_id, code = %line.code, "Resolved line");
    Ok(line_id)
}

pub async fn ensure_scenario<S>(
    store: &mut S,
    line_id: Uuid,
    dataset_id: Uuid,
    options: &ImportOptions,
) -> Result<Uuid>
where
    S: NormalizeStore + ?Sized,
{
    let scenario = ScenarioUpsert {
        line_id,
        description: options.scenario_description.clone(),
        reference_date: options.scenario_date,
        scenario_type: options.scenario_type.as_str().to_string(),
        status: options.scenario_status.as_str().to_string(),
        metadata: json!({ "dataset_id": dataset_id.to_string() }),
    };

    let scenario_id = store.upsert_scenario(&scenario).await?;
    info!(
        scenario_id = %scenario_id,
        description = %scenario.description,
        "Resolved scenario"
    );
    Ok(scenario_id)
}
