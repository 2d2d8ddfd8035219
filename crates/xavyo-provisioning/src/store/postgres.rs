//! Postgres-backed operation queue.
//!
//! Operations keep their row after leaving the active set, so a batch's
//! history stays queryable; `active` marks membership and `seq` the enqueue
//! order.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use xavyo_connector::ids::{BatchId, OperationId, SystemId};
use xavyo_connector::types::OperationType;

use super::{OperationStore, StoreError, StoreResult};
use crate::identity::EntityId;
use crate::operation::{
    OperationPayload, OperationResult, OperationState, ProvisioningBatch, ProvisioningOperation,
};

const OPERATION_COLUMNS: &str = r"
    id, batch_id, operation_type, system_id, entity_type, entity_id, uid,
    payload, state, result_code, result_cause, attempts, created_at, updated_at
";

/// Operation store persisting to Postgres.
#[derive(Clone)]
pub struct PgOperationStore {
    pool: PgPool,
}

impl PgOperationStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        info!("Running provisioning migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    async fn active_operation_ids(&self, batch_id: Uuid) -> StoreResult<Vec<OperationId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"
            SELECT id FROM provisioning_operations
            WHERE batch_id = $1 AND active
            ORDER BY seq
            ",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(OperationId::from_uuid).collect())
    }

    async fn load_batch(&self, row: Option<PgRow>) -> StoreResult<Option<ProvisioningBatch>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let id: Uuid = row.try_get("id")?;
        let operations = self.active_operation_ids(id).await?;
        Ok(Some(ProvisioningBatch {
            id: BatchId::from_uuid(id),
            system_id: SystemId::from_uuid(row.try_get("system_id")?),
            uid: row.try_get("uid")?,
            operations,
            created_at: row.try_get("created_at")?,
        }))
    }
}

impl std::fmt::Debug for PgOperationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgOperationStore").finish_non_exhaustive()
    }
}

fn row_to_operation(row: &PgRow) -> StoreResult<ProvisioningOperation> {
    let operation_type: String = row.try_get("operation_type")?;
    let state: String = row.try_get("state")?;
    let payload: serde_json::Value = row.try_get("payload")?;
    let result_code: Option<String> = row.try_get("result_code")?;
    let result_cause: Option<String> = row.try_get("result_cause")?;
    let attempts: i32 = row.try_get("attempts")?;
    let entity_id: Option<Uuid> = row.try_get("entity_id")?;
    let batch_id: Uuid = row.try_get("batch_id")?;

    Ok(ProvisioningOperation {
        id: OperationId::from_uuid(row.try_get("id")?),
        operation_type: parse_operation_type(&operation_type)?,
        system_id: SystemId::from_uuid(row.try_get("system_id")?),
        entity_type: row.try_get("entity_type")?,
        entity_id: entity_id.map(EntityId::from_uuid),
        uid: row.try_get("uid")?,
        payload: serde_json::from_value::<OperationPayload>(payload)?,
        state: parse_state(&state)?,
        result: result_code.map(|code| OperationResult {
            code,
            cause: result_cause,
        }),
        batch_id: Some(BatchId::from_uuid(batch_id)),
        attempts: u32::try_from(attempts).unwrap_or_default(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_operation_type(value: &str) -> StoreResult<OperationType> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidData(format!("operation type '{value}'")))
}

fn parse_state(value: &str) -> StoreResult<OperationState> {
    value.parse().map_err(StoreError::InvalidData)
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl OperationStore for PgOperationStore {
    #[instrument(skip(self, operation), fields(operation_id = %operation.id, uid = %operation.uid))]
    async fn enqueue_operation(
        &self,
        mut operation: ProvisioningOperation,
    ) -> StoreResult<(ProvisioningOperation, ProvisioningBatch)> {
        let mut tx = self.pool.begin().await?;

        let batch_row = sqlx::query(
            r"
            INSERT INTO provisioning_batches (id, system_id, uid, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (system_id, uid) DO UPDATE SET uid = EXCLUDED.uid
            RETURNING id, system_id, uid, created_at
            ",
        )
        .bind(Uuid::new_v4())
        .bind(operation.system_id.as_uuid())
        .bind(&operation.uid)
        .bind(operation.created_at)
        .fetch_one(&mut *tx)
        .await?;
        let batch_id: Uuid = batch_row.try_get("id")?;
        operation.batch_id = Some(BatchId::from_uuid(batch_id));

        sqlx::query(
            r"
            INSERT INTO provisioning_operations (
                id, batch_id, operation_type, system_id, entity_type, entity_id, uid,
                payload, state, result_code, result_cause, attempts, active,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE, $13, $14)
            ",
        )
        .bind(operation.id.as_uuid())
        .bind(batch_id)
        .bind(operation.operation_type.as_str())
        .bind(operation.system_id.as_uuid())
        .bind(&operation.entity_type)
        .bind(operation.entity_id.map(|id| id.as_uuid()))
        .bind(&operation.uid)
        .bind(serde_json::to_value(&operation.payload)?)
        .bind(operation.state.as_str())
        .bind(operation.result.as_ref().map(|r| r.code.clone()))
        .bind(operation.result.as_ref().and_then(|r| r.cause.clone()))
        .bind(attempts_column(operation.attempts))
        .bind(operation.created_at)
        .bind(operation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let batch = self
            .load_batch(Some(batch_row))
            .await?
            .ok_or_else(|| StoreError::not_found("Batch", batch_id))?;
        Ok((operation, batch))
    }

    #[instrument(skip(self, operation), fields(operation_id = %operation.id, state = %operation.state))]
    async fn update_operation(&self, operation: &ProvisioningOperation) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE provisioning_operations SET
                payload = $2,
                state = $3,
                result_code = $4,
                result_cause = $5,
                attempts = $6,
                updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(operation.id.as_uuid())
        .bind(serde_json::to_value(&operation.payload)?)
        .bind(operation.state.as_str())
        .bind(operation.result.as_ref().map(|r| r.code.clone()))
        .bind(operation.result.as_ref().and_then(|r| r.cause.clone()))
        .bind(attempts_column(operation.attempts))
        .bind(operation.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Operation", operation.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_operation(&self, id: OperationId) -> StoreResult<Option<ProvisioningOperation>> {
        let row = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM provisioning_operations WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_operation).transpose()
    }

    #[instrument(skip(self))]
    async fn get_batch(&self, id: BatchId) -> StoreResult<Option<ProvisioningBatch>> {
        let row = sqlx::query(
            r"
            SELECT id, system_id, uid, created_at
            FROM provisioning_batches
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.load_batch(row).await
    }

    #[instrument(skip(self))]
    async fn list_batch_operations(
        &self,
        batch_id: BatchId,
    ) -> StoreResult<Vec<ProvisioningOperation>> {
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM provisioning_operations WHERE batch_id = $1 ORDER BY seq"
        ))
        .bind(batch_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_operation).collect()
    }

    #[instrument(skip(self))]
    async fn deactivate_operation(
        &self,
        batch_id: BatchId,
        operation_id: OperationId,
    ) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE provisioning_operations SET active = FALSE
            WHERE id = $1 AND batch_id = $2
            ",
        )
        .bind(operation_id.as_uuid())
        .bind(batch_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_ready_batches(&self, limit: usize) -> StoreResult<Vec<BatchId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r"
            SELECT batch_id FROM (
                SELECT DISTINCT ON (batch_id) batch_id, state, seq
                FROM provisioning_operations
                WHERE active
                ORDER BY batch_id, seq
            ) heads
            WHERE state = 'CREATED'
            ORDER BY seq
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(BatchId::from_uuid).collect())
    }
}
