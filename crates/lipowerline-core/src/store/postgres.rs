// crates/lipowerline-core/src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::{
    LineUpsert, NormalizeStore, ScenarioUpsert, SpanRecord, SpanUpsert, StructureRecord,
    StructureUpsert, TreatmentInsert, VegetationElementUpsert, VegetationRiskInsert,
};
use crate::error::Result;
use crate::staging::{StagedFeature, StagedRow};

/// Runs every statement on one borrowed connection, normally an open
/// transaction (`PgStore::new(&mut tx)`), so the whole run commits or rolls
/// back together.
pub struct PgStore<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> PgStore<'c> {
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NormalizeStore for PgStore<'_> {
    async fn latest_line_geometry(&mut self, dataset_id: Uuid) -> Result<Option<String>> {
        let geom: Option<Option<String>> = sqlx::query_scalar(
            r#"
                SELECT ST_AsGeoJSON(geom)
                FROM stg_kml_linha
                WHERE dataset_id = $1
                ORDER BY stg_id DESC
                LIMIT 1
            "#,
        )
        .bind(dataset_id)
        .fetch_optional(&mut *self.conn)
        .await?;
        Ok(geom.flatten())
    }

    async fn staged_structures(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>> {
        let rows = sqlx::query_as::<_, StagedFeature>(
            r#"
                SELECT stg_id, feature_name, raw, ST_AsGeoJSON(geom) AS geom_json
                FROM stg_kml_estrutura
                WHERE dataset_id = $1
                ORDER BY stg_id
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    async fn staged_vegetation_risks(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>> {
        let rows = sqlx::query_as::<_, StagedRow>(
            r#"
                SELECT row_number::bigint AS row_number, raw
                FROM stg_csv_risco_vegetacao
                WHERE dataset_id = $1
                ORDER BY row_number
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    async fn staged_vegetation(&mut self, dataset_id: Uuid) -> Result<Vec<StagedRow>> {
        let rows = sqlx::query_as::<_, StagedRow>(
            r#"
                SELECT row_number::bigint AS row_number, raw
                FROM stg_csv_vegetacao
                WHERE dataset_id = $1
                ORDER BY row_number
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    async fn staged_treatments(&mut self, dataset_id: Uuid) -> Result<Vec<StagedFeature>> {
        let rows = sqlx::query_as::<_, StagedFeature>(
            r#"
                SELECT stg_id, feature_name, raw, ST_AsGeoJSON(geom) AS geom_json
                FROM stg_kml_tratado
                WHERE dataset_id = $1
                ORDER BY stg_id
            "#,
        )
        .bind(dataset_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(rows)
    }

    async fn upsert_line(&mut self, line: &LineUpsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_linha (codigo_linha, nome_linha, tensao_kv, concessionaria, regiao, geom, metadata)
                VALUES (
                    $1,
                    $2,
                    $3,
                    $4,
                    $5,
                    CASE WHEN $6::text IS NULL THEN NULL ELSE ST_SetSRID(ST_GeomFromGeoJSON($6::text), 4326) END,
                    $7::jsonb
                )
                ON CONFLICT (codigo_linha)
                DO UPDATE SET
                    nome_linha = COALESCE(EXCLUDED.nome_linha, tb_linha.nome_linha),
                    tensao_kv = COALESCE(EXCLUDED.tensao_kv, tb_linha.tensao_kv),
                    concessionaria = COALESCE(EXCLUDED.concessionaria, tb_linha.concessionaria),
                    regiao = COALESCE(EXCLUDED.regiao, tb_linha.regiao),
                    geom = COALESCE(EXCLUDED.geom, tb_linha.geom),
                    metadata = tb_linha.metadata || EXCLUDED.metadata
                RETURNING linha_id
            "#,
        )
        .bind(&line.code)
        .bind(line.name.as_deref())
        .bind(line.voltage_kv)
        .bind(line.operator.as_deref())
        .bind(line.region.as_deref())
        .bind(line.geom_json.as_deref())
        .bind(&line.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn upsert_scenario(&mut self, scenario: &ScenarioUpsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_cenario (linha_id, descricao, data_referencia, tipo_cenario, status, metadata)
                VALUES ($1, $2, $3, $4, $5, $6::jsonb)
                ON CONFLICT (linha_id, descricao)
                DO UPDATE SET
                    tipo_cenario = COALESCE(EXCLUDED.tipo_cenario, tb_cenario.tipo_cenario),
                    status = COALESCE(EXCLUDED.status, tb_cenario.status),
                    data_referencia = COALESCE(EXCLUDED.data_referencia, tb_cenario.data_referencia),
                    metadata = tb_cenario.metadata || EXCLUDED.metadata
                RETURNING cenario_id
            "#,
        )
        .bind(scenario.line_id)
        .bind(&scenario.description)
        .bind(scenario.reference_date)
        .bind(&scenario.scenario_type)
        .bind(&scenario.status)
        .bind(&scenario.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn upsert_structure(&mut self, structure: &StructureUpsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_estrutura (
                    linha_id, codigo_estrutura, tipo_estrutura, n_circuitos, altura_m,
                    latitude, longitude, geom, metadata
                )
                VALUES (
                    $1, $2, $3, $4, $5, $6, $7,
                    CASE WHEN $8::text IS NULL THEN NULL ELSE ST_SetSRID(ST_GeomFromGeoJSON($8::text), 4326) END,
                    $9::jsonb
                )
                ON CONFLICT (linha_id, codigo_estrutura)
                DO UPDATE SET
                    tipo_estrutura = COALESCE(EXCLUDED.tipo_estrutura, tb_estrutura.tipo_estrutura),
                    n_circuitos = COALESCE(EXCLUDED.n_circuitos, tb_estrutura.n_circuitos),
                    altura_m = COALESCE(EXCLUDED.altura_m, tb_estrutura.altura_m),
                    latitude = COALESCE(EXCLUDED.latitude, tb_estrutura.latitude),
                    longitude = COALESCE(EXCLUDED.longitude, tb_estrutura.longitude),
                    geom = COALESCE(EXCLUDED.geom, tb_estrutura.geom),
                    metadata = tb_estrutura.metadata || EXCLUDED.metadata
                RETURNING estrutura_id
            "#,
        )
        .bind(structure.line_id)
        .bind(&structure.code)
        .bind(structure.structure_type.as_deref())
        .bind(structure.circuit_count)
        .bind(structure.height_m)
        .bind(structure.latitude)
        .bind(structure.longitude)
        .bind(structure.geom_json.as_deref())
        .bind(&structure.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn line_structures(&mut self, line_id: Uuid) -> Result<Vec<StructureRecord>> {
        let rows = sqlx::query(
            r#"
                SELECT
                    estrutura_id,
                    codigo_estrutura,
                    ST_AsGeoJSON(geom) AS geom_json,
                    CASE
                        WHEN metadata->>'stg_order' ~ '^-?[0-9]+$' THEN (metadata->>'stg_order')::bigint
                        ELSE NULL
                    END AS stg_order
                FROM tb_estrutura
                WHERE linha_id = $1
                ORDER BY created_at, codigo_estrutura
            "#,
        )
        .bind(line_id)
        .fetch_all(&mut *self.conn)
        .await?;

        let mut structures = Vec::with_capacity(rows.len());
        for row in rows {
            structures.push(StructureRecord {
                structure_id: row.try_get("estrutura_id")?,
                code: row.try_get("codigo_estrutura")?,
                geom_json: row.try_get("geom_json")?,
                stg_order: row.try_get("stg_order")?,
            });
        }
        Ok(structures)
    }

    async fn upsert_span(&mut self, span: &SpanUpsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_vao (
                    linha_id, estrutura_ini_id, estrutura_fim_id, codigo_vao, comprimento_m, geom, metadata
                )
                VALUES (
                    $1, $2, $3, $4, $5,
                    CASE WHEN $6::text IS NULL THEN NULL ELSE ST_SetSRID(ST_GeomFromGeoJSON($6::text), 4326) END,
                    $7::jsonb
                )
                ON CONFLICT (linha_id, codigo_vao)
                DO UPDATE SET
                    estrutura_ini_id = EXCLUDED.estrutura_ini_id,
                    estrutura_fim_id = EXCLUDED.estrutura_fim_id,
                    geom = COALESCE(EXCLUDED.geom, tb_vao.geom),
                    comprimento_m = COALESCE(EXCLUDED.comprimento_m, tb_vao.comprimento_m),
                    metadata = tb_vao.metadata || EXCLUDED.metadata
                RETURNING vao_id
            "#,
        )
        .bind(span.line_id)
        .bind(span.start_structure_id)
        .bind(span.end_structure_id)
        .bind(&span.code)
        .bind(span.length_m)
        .bind(span.geom_json.as_deref())
        .bind(&span.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn line_spans(&mut self, line_id: Uuid) -> Result<Vec<SpanRecord>> {
        let rows = sqlx::query(
            r#"
                SELECT v.vao_id, v.codigo_vao, ini.codigo_estrutura AS ini_codigo, fim.codigo_estrutura AS fim_codigo
                FROM tb_vao v
                LEFT JOIN tb_estrutura ini ON ini.estrutura_id = v.estrutura_ini_id
                LEFT JOIN tb_estrutura fim ON fim.estrutura_id = v.estrutura_fim_id
                WHERE v.linha_id = $1
                ORDER BY v.created_at, v.codigo_vao
            "#,
        )
        .bind(line_id)
        .fetch_all(&mut *self.conn)
        .await?;

        let mut spans = Vec::with_capacity(rows.len());
        for row in rows {
            spans.push(SpanRecord {
                span_id: row.try_get("vao_id")?,
                code: row.try_get("codigo_vao")?,
                start_code: row.try_get("ini_codigo")?,
                end_code: row.try_get("fim_codigo")?,
            });
        }
        Ok(spans)
    }

    async fn delete_vegetation_risks(&mut self, scenario_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tb_risco_vegetacao_vao WHERE cenario_id = $1")
            .bind(scenario_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_vegetation_element(
        &mut self,
        element: &VegetationElementUpsert,
    ) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_elemento_vegetacao (
                    linha_id, vao_id, codigo_externo, geom, altura_m, tipo_vegetacao, em_app, metadata
                )
                VALUES (
                    $1, $2, $3,
                    CASE WHEN $4::text IS NULL THEN NULL ELSE ST_SetSRID(ST_GeomFromGeoJSON($4::text), 4326) END,
                    $5, $6, $7, $8::jsonb
                )
                ON CONFLICT (linha_id, codigo_externo)
                DO UPDATE SET
                    vao_id = COALESCE(EXCLUDED.vao_id, tb_elemento_vegetacao.vao_id),
                    geom = COALESCE(EXCLUDED.geom, tb_elemento_vegetacao.geom),
                    altura_m = COALESCE(EXCLUDED.altura_m, tb_elemento_vegetacao.altura_m),
                    tipo_vegetacao = COALESCE(EXCLUDED.tipo_vegetacao, tb_elemento_vegetacao.tipo_vegetacao),
                    em_app = COALESCE(EXCLUDED.em_app, tb_elemento_vegetacao.em_app),
                    metadata = tb_elemento_vegetacao.metadata || EXCLUDED.metadata
                RETURNING arvore_id
            "#,
        )
        .bind(element.line_id)
        .bind(element.span_id)
        .bind(&element.external_code)
        .bind(element.geom_json.as_deref())
        .bind(element.height_m)
        .bind(element.vegetation_type.as_deref())
        .bind(element.riparian)
        .bind(&element.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn insert_vegetation_risk(&mut self, risk: &VegetationRiskInsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_risco_vegetacao_vao (
                    vao_id, arvore_id, cenario_id, dist_min_cabo_m, classe_risco_clearance,
                    distancia_lateral_m, categoria_risco, data_processamento, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb)
                RETURNING risco_id
            "#,
        )
        .bind(risk.span_id)
        .bind(risk.element_id)
        .bind(risk.scenario_id)
        .bind(risk.min_conductor_distance_m)
        .bind(risk.clearance_class.as_deref())
        .bind(risk.lateral_distance_m)
        .bind(risk.risk_category.as_deref())
        .bind(risk.processed_on)
        .bind(&risk.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }

    async fn delete_treatments(&mut self, scenario_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tb_tratamento_vegetacao WHERE cenario_id = $1")
            .bind(scenario_id)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_treatment(&mut self, treatment: &TreatmentInsert) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
                INSERT INTO tb_tratamento_vegetacao (
                    cenario_id, linha_id, vao_id, geom, tipo_servico, data_execucao, origem, metadata
                )
                VALUES (
                    $1, $2, $3,
                    CASE WHEN $4::text IS NULL THEN NULL ELSE ST_SetSRID(ST_GeomFromGeoJSON($4::text), 4326) END,
                    $5, $6, $7, $8::jsonb
                )
                RETURNING tratamento_id
            "#,
        )
        .bind(treatment.scenario_id)
        .bind(treatment.line_id)
        .bind(treatment.span_id)
        .bind(treatment.geom_json.as_deref())
        .bind(treatment.service_type.as_deref())
        .bind(treatment.executed_on)
        .bind(&treatment.origin)
        .bind(&treatment.metadata)
        .fetch_one(&mut *self.conn)
        .await?;
        Ok(id)
    }
}
