// crates/lipowerline-core/src/datasets.rs

use serde_json::Value;
use sqlx::PgExecutor;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetStatus {
    Completed,
    Failed,
}

impl DatasetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetStatus::Completed => "completed",
            DatasetStatus::Failed => "failed",
        }
    }
}

/// Sets the dataset status and unions `extra` into its metadata.
///
/// Returns `false` when no dataset row exists; the staging loader owns row
/// creation, so that is logged rather than treated as an error.
pub async fn mark_dataset_status<'e, E>(
    executor: E,
    dataset_id: Uuid,
    status: DatasetStatus,
    extra: &Value,
) -> Result<bool>
where
    E: PgExecutor<'e>,
{
    let updated = sqlx::query(
        r#"
            UPDATE tb_lipowerline_dataset
            SET status = $2,
                metadata = metadata || COALESCE($3::jsonb, '{}'::jsonb)
            WHERE dataset_id = $1
        "#,
    )
    .bind(dataset_id)
    .bind(status.as_str())
    .bind(extra)
    .execute(executor)
    .await?
    .rows_affected();

    if updated == 0 {
        warn!(dataset_id = %dataset_id, status = status.as_str(), "Dataset record not found");
    }
    Ok(updated > 0)
}
