//! Staging → canonical normalization for one LiPowerline dataset.
//!
//! Steps run strictly in order because each needs identifiers produced by the
//! previous one: line, scenario, structures, spans, vegetation risks,
//! treatments.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::options::ImportOptions;
use crate::store::NormalizeStore;

mod line;
mod spans;
mod structures;
mod treatments;
mod vegetation;

pub use line::{ensure_line, ensure_scenario};
pub use spans::{derive_spans, plan_spans, span_code};
pub use structures::upsert_structures;
pub use treatments::{upsert_treatments, TREATMENT_ORIGIN};
pub use vegetation::{upsert_vegetation_risks, SpanIndex, VegetationCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationSummary {
    #[serde(rename = "lineId")]
    pub line_id: Uuid,
    #[serde(rename = "cenarioId")]
    pub scenario_id: Uuid,
    #[serde(rename = "estruturasUpserted")]
    pub structures_upserted: usize,
    #[serde(rename = "vaosGerados")]
    pub spans_generated: usize,
    #[serde(rename = "arvoresUpsertadas")]
    pub vegetation_elements_upserted: usize,
    #[serde(rename = "riscosVegetacao")]
    pub vegetation_risks: usize,
    #[serde(rename = "tratamentosRegistrados")]
    pub treatments_recorded: usize,
}

/// Runs every normalization step for `dataset_id` against `store`.
///
/// Options are taken as given; callers validate them first (see
/// [`ImportOptions::validate`]).
pub async fn normalize_dataset<S>(
    store: &mut S,
    dataset_id: Uuid,
    options: &ImportOptions,
) -> Result<NormalizationSummary>
where
    S: NormalizeStore + ?Sized,
{
    let line_id = ensure_line(store, dataset_id, options).await?;
    let scenario_id = ensure_scenario(store, line_id, dataset_id, options).await?;
    let structures_upserted = upsert_structures(store, dataset_id, line_id).await?;
    let spans_generated = derive_spans(store, line_id).await?;
    let VegetationCounts {
        elements_upserted,
        risks_inserted,
    } = upsert_vegetation_risks(store, dataset_id, line_id, scenario_id).await?;
    let treatments_recorded = upsert_treatments(store, dataset_id, line_id, scenario_id).await?;

    let summary = NormalizationSummary {
        line_id,
        scenario_id,
        structures_upserted,
        spans_generated,
        vegetation_elements_upserted: elements_upserted,
        vegetation_risks: risks_inserted,
        treatments_recorded,
    };

    info!(
        dataset_id = %dataset_id,
        line_id = %line_id,
        scenario_id = %scenario_id,
        structures = structures_upserted,
        spans = spans_generated,
        vegetation_elements = elements_upserted,
        vegetation_risks = risks_inserted,
        treatments = treatments_recorded,
        "Dataset normalized"
    );

    Ok(summary)
}
