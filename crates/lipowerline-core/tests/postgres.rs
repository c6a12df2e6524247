use std::env;

use anyhow::Result;
use lipowerline_core::store::{NormalizeStore, PgStore, SpanUpsert};
use lipowerline_core::{db, db::DbPool, run_import, ImportOptions, ImportRequest};
use serde_json::{json, Value};
use uuid::Uuid;

async fn test_pool(test_name: &str) -> Result<Option<DbPool>> {
    let database_url = match env::var("LIPOWERLINE_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping {test_name} because LIPOWERLINE_TEST_DATABASE_URL is not set");
            return Ok(None);
        }
    };

    let pool = db::connect(&database_url).await?;
    db::run_migrations(&pool).await?;
    Ok(Some(pool))
}

fn point(lon: f64, lat: f64) -> String {
    json!({ "type": "Point", "coordinates": [lon, lat] }).to_string()
}

/// Stages the three-tower example under a fresh dataset and line code.
async fn stage_example(pool: &DbPool, line_code: &str) -> Result<Uuid> {
    let dataset_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO tb_lipowerline_dataset (dataset_id, label, line_code) VALUES ($1, $2, $3)",
    )
    .bind(dataset_id)
    .bind("integration")
    .bind(line_code)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO stg_kml_linha (dataset_id, feature_name, geom) VALUES ($1, 'linha', ST_SetSRID(ST_GeomFromGeoJSON($2), 4326))",
    )
    .bind(dataset_id)
    .bind(json!({ "type": "LineString", "coordinates": [[-47.0, -15.0], [-47.02, -15.0]] }).to_string())
    .execute(pool)
    .await?;

    for (idx, code) in ["T1", "T2", "T3"].iter().enumerate() {
        sqlx::query(
            "INSERT INTO stg_kml_estrutura (dataset_id, feature_name, raw, geom) VALUES ($1, $2, $3, ST_SetSRID(ST_GeomFromGeoJSON($4), 4326))",
        )
        .bind(dataset_id)
        .bind(*code)
        .bind(json!({ "properties": { "codigo": code, "altura": "30" } }))
        .bind(point(-47.0 - idx as f64 * 0.01, -15.0))
        .execute(pool)
        .await?;
    }

    let risks: [(i32, Value); 2] = [
        (1, json!({ "tree_id": "A1", "vao": "T1 - T2", "dist_min_cabo_m": "3,2" })),
        (2, json!({ "tree_id": "A2", "vao": " t2-t3 " })),
    ];
    for (row_number, raw) in risks {
        sqlx::query(
            "INSERT INTO stg_csv_risco_vegetacao (dataset_id, row_number, raw) VALUES ($1, $2, $3)",
        )
        .bind(dataset_id)
        .bind(row_number)
        .bind(raw)
        .execute(pool)
        .await?;
    }

    Ok(dataset_id)
}

fn request(dataset_id: Uuid, line_code: &str, dry_run: bool) -> ImportRequest {
    let mut options = ImportOptions::new(line_code, "Campanha 2024");
    options.voltage_kv = Some(500.0);
    ImportRequest {
        dataset_id,
        options,
        dry_run,
    }
}

#[tokio::test]
async fn import_is_idempotent_and_marks_dataset_completed() -> Result<()> {
    let Some(pool) = test_pool("import_is_idempotent_and_marks_dataset_completed").await? else {
        return Ok(());
    };

    let line_code = format!("LT-TEST-{}", Uuid::new_v4());
    let dataset_id = stage_example(&pool, &line_code).await?;

    let first = run_import(&pool, request(dataset_id, &line_code, false)).await?;
    let second = run_import(&pool, request(dataset_id, &line_code, false)).await?;

    assert!(!first.dry_run);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.summary.structures_upserted, 3);
    assert_eq!(first.summary.spans_generated, 2);
    assert_eq!(first.summary.vegetation_risks, 2);

    let line_id = first.summary.line_id;
    let spans: Vec<String> = sqlx::query_scalar(
        "SELECT codigo_vao FROM tb_vao WHERE linha_id = $1 ORDER BY codigo_vao",
    )
    .bind(line_id)
    .fetch_all(&pool)
    .await?;
    assert_eq!(spans, vec!["T1 - T2".to_string(), "T2 - T3".to_string()]);

    let matched: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tb_risco_vegetacao_vao WHERE cenario_id = $1 AND vao_id IS NOT NULL",
    )
    .bind(first.summary.scenario_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(matched, 2);

    let (status, spans_generated): (String, Option<String>) = sqlx::query_as(
        "SELECT status, metadata->'normalize'->>'vaosGerados' FROM tb_lipowerline_dataset WHERE dataset_id = $1",
    )
    .bind(dataset_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(status, "completed");
    assert_eq!(spans_generated.as_deref(), Some("2"));

    let length: Option<f64> = sqlx::query_scalar(
        "SELECT comprimento_m FROM tb_vao WHERE linha_id = $1 AND codigo_vao = 'T1 - T2'",
    )
    .bind(line_id)
    .fetch_one(&pool)
    .await?;
    let length = length.expect("span length");
    assert!(length > 1000.0 && length < 1100.0, "unexpected span length {length}");

    Ok(())
}

#[tokio::test]
async fn dry_run_leaves_no_trace() -> Result<()> {
    let Some(pool) = test_pool("dry_run_leaves_no_trace").await? else {
        return Ok(());
    };

    let line_code = format!("LT-DRY-{}", Uuid::new_v4());
    let dataset_id = stage_example(&pool, &line_code).await?;

    let receipt = run_import(&pool, request(dataset_id, &line_code, true)).await?;
    assert!(receipt.dry_run);
    assert_eq!(receipt.summary.spans_generated, 2);

    let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tb_linha WHERE codigo_linha = $1")
        .bind(&line_code)
        .fetch_one(&pool)
        .await?;
    assert_eq!(lines, 0);

    let status: String =
        sqlx::query_scalar("SELECT status FROM tb_lipowerline_dataset WHERE dataset_id = $1")
            .bind(dataset_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(status, "staging");

    Ok(())
}

#[tokio::test]
async fn invalid_options_are_rejected_before_touching_the_database() -> Result<()> {
    let Some(pool) = test_pool("invalid_options_are_rejected_before_touching_the_database").await?
    else {
        return Ok(());
    };

    let dataset_id = Uuid::new_v4();
    let result = run_import(
        &pool,
        ImportRequest {
            dataset_id,
            options: ImportOptions::new("", "Campanha"),
            dry_run: false,
        },
    )
    .await;
    assert!(result.is_err());
    Ok(())
}

/// Rejects treatments whose service type is `rejeitar`, so a test can make the
/// last pipeline step fail after every earlier step has written rows.
async fn install_treatment_rejection(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
            CREATE OR REPLACE FUNCTION lipowerline_test_reject_treatment() RETURNS trigger AS $$
            BEGIN
                IF NEW.tipo_servico = 'rejeitar' THEN
                    RAISE EXCEPTION 'treatment rejected by test trigger';
                END IF;
                RETURN NEW;
            END
            $$ LANGUAGE plpgsql
        "#,
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "DROP TRIGGER IF EXISTS lipowerline_test_reject_treatment ON tb_tratamento_vegetacao",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE TRIGGER lipowerline_test_reject_treatment BEFORE INSERT ON tb_tratamento_vegetacao FOR EACH ROW EXECUTE FUNCTION lipowerline_test_reject_treatment()",
    )
    .execute(pool)
    .await?;
    Ok(())
}

#[tokio::test]
async fn failed_import_rolls_back_and_marks_dataset_failed() -> Result<()> {
    let Some(pool) = test_pool("failed_import_rolls_back_and_marks_dataset_failed").await? else {
        return Ok(());
    };
    install_treatment_rejection(&pool).await?;

    let line_code = format!("LT-FAIL-{}", Uuid::new_v4());
    let dataset_id = stage_example(&pool, &line_code).await?;
    sqlx::query("INSERT INTO stg_kml_tratado (dataset_id, raw) VALUES ($1, $2)")
        .bind(dataset_id)
        .bind(json!({ "properties": { "tipo": "rejeitar" } }))
        .execute(&pool)
        .await?;

    let result = run_import(&pool, request(dataset_id, &line_code, false)).await;
    let err = result.expect_err("import should fail on the rejected treatment");
    assert!(err.to_string().contains("treatment rejected"), "unexpected error {err}");

    let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tb_linha WHERE codigo_linha = $1")
        .bind(&line_code)
        .fetch_one(&pool)
        .await?;
    assert_eq!(lines, 0, "structures and spans must not survive a failed run");

    let (status, has_error): (String, bool) = sqlx::query_as(
        "SELECT status, metadata ? 'error' FROM tb_lipowerline_dataset WHERE dataset_id = $1",
    )
    .bind(dataset_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(status, "failed");
    assert!(has_error);

    Ok(())
}

#[tokio::test]
async fn span_refresh_without_geometry_keeps_stored_shape() -> Result<()> {
    let Some(pool) = test_pool("span_refresh_without_geometry_keeps_stored_shape").await? else {
        return Ok(());
    };

    let line_code = format!("LT-SPAN-{}", Uuid::new_v4());
    let dataset_id = stage_example(&pool, &line_code).await?;
    let receipt = run_import(&pool, request(dataset_id, &line_code, false)).await?;
    let line_id = receipt.summary.line_id;

    let (span_id, length_before, geom_before): (Uuid, Option<f64>, Option<String>) = sqlx::query_as(
        "SELECT vao_id, comprimento_m, ST_AsGeoJSON(geom) FROM tb_vao WHERE linha_id = $1 AND codigo_vao = 'T1 - T2'",
    )
    .bind(line_id)
    .fetch_one(&pool)
    .await?;
    assert!(length_before.is_some());
    assert!(geom_before.is_some());

    let mut conn = pool.acquire().await?;
    let refreshed = {
        let mut store = PgStore::new(&mut *conn);
        store
            .upsert_span(&SpanUpsert {
                line_id,
                start_structure_id: None,
                end_structure_id: None,
                code: "T1 - T2".into(),
                length_m: None,
                geom_json: None,
                metadata: json!({ "source": "auto", "generated_at": "later" }),
            })
            .await?
    };
    assert_eq!(refreshed, span_id);

    let (length_after, geom_after, generated_at): (Option<f64>, Option<String>, Option<String>) =
        sqlx::query_as(
            "SELECT comprimento_m, ST_AsGeoJSON(geom), metadata->>'generated_at' FROM tb_vao WHERE vao_id = $1",
        )
        .bind(span_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(length_after, length_before);
    assert_eq!(geom_after, geom_before);
    assert_eq!(generated_at.as_deref(), Some("later"));

    Ok(())
}
