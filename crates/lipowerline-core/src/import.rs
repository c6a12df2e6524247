//! Transactional entry point used by the admin CLI.

use serde::Serialize;
use serde_json::json;
use sqlx::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::datasets::{mark_dataset_status, DatasetStatus};
use crate::db::DbPool;
use crate::error::Result;
use crate::normalize::{normalize_dataset, NormalizationSummary};
use crate::options::ImportOptions;
use crate::store::PgStore;

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub dataset_id: Uuid,
    pub options: ImportOptions,
    /// Run every step, then roll back.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReceipt {
    pub dataset_id: Uuid,
    pub dry_run: bool,
    pub summary: NormalizationSummary,
}

/// Normalizes one staged dataset inside a single transaction.
///
/// Imports into the same line code are serialised with a transaction-scoped
/// advisory lock. On failure nothing from the run is kept and the dataset is
/// marked `failed`.
pub async fn run_import(pool: &DbPool, request: ImportRequest) -> Result<ImportReceipt> {
    request.options.validate()?;
    let ImportRequest {
        dataset_id,
        options,
        dry_run,
    } = request;

    let mut tx = pool.begin().await?;
    let outcome = normalize_in_transaction(&mut tx, dataset_id, &options, dry_run).await;

    let result = match outcome {
        Ok(summary) if dry_run => tx.rollback().await.map(|_| summary).map_err(Into::into),
        Ok(summary) => tx.commit().await.map(|_| summary).map_err(Into::into),
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(dataset_id = %dataset_id, "failed to roll back import: {rollback_err}");
            }
            Err(err)
        }
    };

    match result {
        Ok(summary) => {
            info!(
                dataset_id = %dataset_id,
                line_code = %options.line_code,
                dry_run,
                "Import finished"
            );
            Ok(ImportReceipt {
                dataset_id,
                dry_run,
                summary,
            })
        }
        Err(err) => {
            if !dry_run {
                let extra = json!({ "error": err.to_string() });
                if let Err(mark_err) =
                    mark_dataset_status(pool, dataset_id, DatasetStatus::Failed, &extra).await
                {
                    warn!(dataset_id = %dataset_id, "failed to record import failure: {mark_err}");
                }
            }
            Err(err)
        }
    }
}

async fn normalize_in_transaction(
    conn: &mut PgConnection,
    dataset_id: Uuid,
    options: &ImportOptions,
    dry_run: bool,
) -> Result<NormalizationSummary> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(&options.line_code)
        .execute(&mut *conn)
        .await?;

    let summary = {
        let mut store = PgStore::new(&mut *conn);
        normalize_dataset(&mut store, dataset_id, options).await?
    };

    if !dry_run {
        let extra = json!({ "normalize": summary });
        mark_dataset_status(&mut *conn, dataset_id, DatasetStatus::Completed, &extra).await?;
    }
    Ok(summary)
}
