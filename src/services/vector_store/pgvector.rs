use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;

use super::{QueryRequest, VectorIndex};
use crate::error::VectorStoreError;
use crate::models::{IndexStats, QueryMatch, VectorRecord, VectorStoreConfig};

const ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// PostgreSQL backend storing one row per record with a JSONB payload.
pub struct PgVectorBackend {
    pool: PgPool,
    index: String,
    table_name: String,
    dimension: u64,
}

impl PgVectorBackend {
    pub async fn new(config: &VectorStoreConfig, dimension: u64) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let backend = Self {
            pool,
            index: config.index.clone(),
            table_name: quote_identifier(&config.index),
            dimension,
        };

        backend.check_pgvector_extension().await?;

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, VectorStoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables WHERE table_name = $1",
        )
        .bind(&self.index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.is_some())
    }

    /// Declared width of the `embedding` column, read from the catalog.
    async fn column_dimension(&self) -> Result<u64, VectorStoreError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT a.atttypmod
            FROM pg_attribute a
            JOIN pg_class c ON a.attrelid = c.oid
            WHERE c.relname = $1 AND a.attname = 'embedding'
            "#,
        )
        .bind(&self.index)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(row.map(|(typmod,)| typmod.max(0) as u64).unwrap_or(0))
    }
}

#[async_trait]
impl VectorIndex for PgVectorBackend {
    async fn describe_index_stats(&self) -> Result<IndexStats, VectorStoreError> {
        if !self.table_exists().await? {
            return Err(VectorStoreError::IndexError(format!(
                "table {} not found",
                self.index
            )));
        }

        let query = format!("SELECT COUNT(*) FROM {}", self.table_name);
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(IndexStats {
            dimension: self.column_dimension().await?,
            total_record_count: count.max(0) as u64,
        })
    }

    async fn ensure_index(&self, dimension: u64) -> Result<(), VectorStoreError> {
        if self.table_exists().await? {
            return Ok(());
        }

        let dimension = if dimension == 0 { self.dimension } else { dimension };
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY,
                namespace TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'
            )
            "#,
            self.table_name, dimension
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (embedding vector_cosine_ops)",
                quote_identifier(&format!("{}_embedding_idx", self.index)),
                self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (namespace)",
                quote_identifier(&format!("{}_namespace_idx", self.index)),
                self.table_name
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        }

        Ok(())
    }

    async fn upsert(
        &self,
        namespace: &str,
        records: Vec<VectorRecord>,
    ) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let query = format!(
            r#"
            INSERT INTO {} (id, namespace, embedding, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                namespace = EXCLUDED.namespace,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata
            "#,
            self.table_name
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        for record in records {
            let embedding = Vector::from(record.values);
            let metadata = serde_json::Value::Object(record.metadata);

            sqlx::query(&query)
                .bind(&record.id)
                .bind(namespace)
                .bind(&embedding)
                .bind(&metadata)
                .execute(&mut *tx)
                .await
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let embedding = Vector::from(request.vector);

        let mut where_parts = vec!["namespace = $2".to_string()];
        if request.required_field.is_some() {
            where_parts.push(
                "jsonb_exists(metadata, $3) AND jsonb_typeof(metadata -> $3) <> 'null'".to_string(),
            );
        }

        let query = format!(
            r#"
            SELECT
                id,
                1 - (embedding <=> $1) AS score,
                metadata
            FROM {}
            WHERE {}
            ORDER BY embedding <=> $1
            LIMIT {}
            "#,
            self.table_name,
            where_parts.join(" AND "),
            request.top_k
        );

        let mut query_builder = sqlx::query(&query)
            .bind(&embedding)
            .bind(&request.namespace);
        if let Some(ref field) = request.required_field {
            query_builder = query_builder.bind(field);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row: PgRow| {
                let score: f64 = row.get("score");
                let metadata = match row.get::<serde_json::Value, _>("metadata") {
                    serde_json::Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                QueryMatch {
                    id: row.get("id"),
                    score: score as f32,
                    metadata,
                }
            })
            .collect())
    }

    fn index_name(&self) -> &str {
        &self.index
    }
}

/// Double-quote a table or index name so hyphenated names stay valid SQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
