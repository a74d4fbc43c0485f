//! PostgreSQL table sink

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error};

use crate::ingest::config::ConnectionParams;
use crate::ingest::error::IngestError;
use crate::ingest::schema::{Dialect, Row, TableSchema, Value, quote_ident};
use super::TableSink;

/// Upper bound on bind parameters in one statement (protocol limit)
const MAX_BIND_PARAMS: usize = 65_535;

/// Upper bound on rows in one multi-row INSERT
const MAX_ROWS_PER_STATEMENT: usize = 1_000;

/// Writes chunks into a PostgreSQL table
pub struct PostgresSink {
    client: Client,
    target: String,
}

impl PostgresSink {
    /// Connect to a PostgreSQL database
    pub async fn connect(params: &ConnectionParams) -> Result<Self, IngestError> {
        let (client, connection) = tokio_postgres::connect(&params.connection_string(), NoTls)
            .await
            .map_err(|e| {
                IngestError::Database(format!("cannot connect to {}: {e}", params.redacted()))
            })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            target: params.redacted(),
        })
    }

    /// Redacted connection target, for display
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Rows per INSERT for a table `width` columns wide
fn rows_per_statement(width: usize) -> usize {
    (MAX_BIND_PARAMS / width.max(1)).clamp(1, MAX_ROWS_PER_STATEMENT)
}

#[async_trait]
impl TableSink for PostgresSink {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn replace_table(&mut self, table: &str, schema: &TableSchema) -> Result<(), IngestError> {
        let tx = self.client.transaction().await?;
        tx.batch_execute(&TableSchema::drop_table_sql(table)).await?;
        tx.batch_execute(&schema.create_table_sql(table, Dialect::Postgres))
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_rows(
        &mut self,
        table: &str,
        schema: &TableSchema,
        rows: &[Row],
    ) -> Result<u64, IngestError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let per_statement = rows_per_statement(schema.len());
        let tx = self.client.transaction().await?;
        let full = tx
            .prepare(&schema.insert_sql(table, Dialect::Postgres, per_statement))
            .await?;

        let mut written = 0;
        for batch in rows.chunks(per_statement) {
            let params: Vec<&(dyn ToSql + Sync)> = batch
                .iter()
                .flat_map(|row| row.iter().map(Value::as_pg))
                .collect();

            written += if batch.len() == per_statement {
                tx.execute(&full, &params).await?
            } else {
                let sql = schema.insert_sql(table, Dialect::Postgres, batch.len());
                tx.execute(sql.as_str(), &params).await?
            };
        }

        tx.commit().await?;
        debug!(table, rows = written, "Committed chunk");
        Ok(written)
    }

    async fn row_count(&mut self, table: &str) -> Result<i64, IngestError> {
        let row = self
            .client
            .query_one(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)), &[])
            .await?;
        Ok(row.get::<_, i64>(0))
    }
}
