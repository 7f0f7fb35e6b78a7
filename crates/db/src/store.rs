use chrono::{DateTime, Utc};
use sqlx::Row;

use signoff_core::domain::document::{ActorId, Document, DocumentId, DocumentStatus, DocumentType};
use signoff_core::domain::referrer::Referrer;
use signoff_core::domain::step::{ApprovalStep, StepId, StepStatus};
use signoff_core::store::{StoreError, WorkflowStore};

use crate::DbPool;

/// SQLite-backed persistence gateway.
///
/// Both multi-row writes run inside a transaction, and `commit_transition`
/// guards the document row with `WHERE version = ?` so a raced write surfaces
/// as `VersionConflict` instead of silently clobbering the chain.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn decode(message: impl Into<String>) -> StoreError {
    StoreError::Decode(message.into())
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| decode(format!("column `{column}` holds a malformed timestamp: `{value}`")))
}

fn parse_sequence(column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| decode(format!("column `{column}` holds an out-of-range value: {value}")))
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode(e.to_string()))?;
    let document_type_str: String =
        row.try_get("document_type").map_err(|e| decode(e.to_string()))?;
    let author_id: String = row.try_get("author_id").map_err(|e| decode(e.to_string()))?;
    let content_json: String = row.try_get("content_json").map_err(|e| decode(e.to_string()))?;
    let status_str: String = row.try_get("status").map_err(|e| decode(e.to_string()))?;
    let current_step: Option<i64> =
        row.try_get("current_step").map_err(|e| decode(e.to_string()))?;
    let version: i64 = row.try_get("version").map_err(|e| decode(e.to_string()))?;
    let completed_at_str: Option<String> =
        row.try_get("completed_at").map_err(|e| decode(e.to_string()))?;
    let created_at_str: String = row.try_get("created_at").map_err(|e| decode(e.to_string()))?;
    let updated_at_str: String = row.try_get("updated_at").map_err(|e| decode(e.to_string()))?;

    let document_type = DocumentType::parse(&document_type_str)
        .ok_or_else(|| decode(format!("unknown document_type `{document_type_str}`")))?;
    let status = DocumentStatus::parse(&status_str)
        .ok_or_else(|| decode(format!("unknown document status `{status_str}`")))?;
    let current_step = current_step
        .map(|value| parse_sequence("current_step", value))
        .transpose()?;
    let completed_at = completed_at_str
        .as_deref()
        .map(|value| parse_timestamp("completed_at", value))
        .transpose()?;

    Ok(Document {
        id: DocumentId(id),
        document_type,
        author_id: ActorId(author_id),
        content_json,
        status,
        current_step,
        version: parse_sequence("version", version)?,
        completed_at,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalStep, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode(e.to_string()))?;
    let document_id: String = row.try_get("document_id").map_err(|e| decode(e.to_string()))?;
    let approver_id: String = row.try_get("approver_id").map_err(|e| decode(e.to_string()))?;
    let sequence: i64 = row.try_get("sequence").map_err(|e| decode(e.to_string()))?;
    let status_str: String = row.try_get("status").map_err(|e| decode(e.to_string()))?;
    let comment: Option<String> = row.try_get("comment").map_err(|e| decode(e.to_string()))?;
    let processed_at_str: Option<String> =
        row.try_get("processed_at").map_err(|e| decode(e.to_string()))?;
    let created_at_str: String = row.try_get("created_at").map_err(|e| decode(e.to_string()))?;

    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| decode(format!("unknown step status `{status_str}`")))?;
    let processed_at = processed_at_str
        .as_deref()
        .map(|value| parse_timestamp("processed_at", value))
        .transpose()?;

    Ok(ApprovalStep {
        id: StepId(id),
        document_id: DocumentId(document_id),
        approver_id: ActorId(approver_id),
        sequence: parse_sequence("sequence", sequence)?,
        status,
        comment,
        processed_at,
        created_at: parse_timestamp("created_at", &created_at_str)?,
    })
}

fn row_to_referrer(row: &sqlx::sqlite::SqliteRow) -> Result<Referrer, StoreError> {
    let document_id: String = row.try_get("document_id").map_err(|e| decode(e.to_string()))?;
    let referrer_id: String = row.try_get("referrer_id").map_err(|e| decode(e.to_string()))?;
    let created_at_str: String = row.try_get("created_at").map_err(|e| decode(e.to_string()))?;

    Ok(Referrer {
        document_id: DocumentId(document_id),
        referrer_id: ActorId(referrer_id),
        created_at: parse_timestamp("created_at", &created_at_str)?,
    })
}

#[async_trait::async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, document_type, author_id, content_json, status, current_step,
                    version, completed_at, created_at, updated_at
             FROM document WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(ref r) => Ok(Some(row_to_document(r)?)),
            None => Ok(None),
        }
    }

    async fn list_steps(&self, document_id: &DocumentId) -> Result<Vec<ApprovalStep>, StoreError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, document_id, approver_id, sequence, status, comment,
                    processed_at, created_at
             FROM approval_step WHERE document_id = ? ORDER BY sequence ASC",
        )
        .bind(&document_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_step).collect::<Result<Vec<_>, _>>()
    }

    async fn list_referrers(&self, document_id: &DocumentId) -> Result<Vec<Referrer>, StoreError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT document_id, referrer_id, created_at
             FROM referrer WHERE document_id = ? ORDER BY referrer_id ASC",
        )
        .bind(&document_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(row_to_referrer).collect::<Result<Vec<_>, _>>()
    }

    async fn create_submission(
        &self,
        document: Document,
        steps: Vec<ApprovalStep>,
        referrers: Vec<Referrer>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            "INSERT INTO document (id, document_type, author_id, content_json, status,
                                   current_step, version, completed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(document.document_type.as_str())
        .bind(&document.author_id.0)
        .bind(&document.content_json)
        .bind(document.status.as_str())
        .bind(document.current_step.map(|step| step as i64))
        .bind(document.version as i64)
        .bind(document.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        for step in &steps {
            sqlx::query(
                "INSERT INTO approval_step (id, document_id, approver_id, sequence, status,
                                            comment, processed_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.document_id.0)
            .bind(&step.approver_id.0)
            .bind(step.sequence as i64)
            .bind(step.status.as_str())
            .bind(&step.comment)
            .bind(step.processed_at.map(|dt| dt.to_rfc3339()))
            .bind(step.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        for referrer in &referrers {
            sqlx::query(
                "INSERT INTO referrer (document_id, referrer_id, created_at)
                 VALUES (?, ?, ?)",
            )
            .bind(&referrer.document_id.0)
            .bind(&referrer.referrer_id.0)
            .bind(referrer.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn commit_transition(
        &self,
        expected_version: u32,
        document: Document,
        steps: Vec<ApprovalStep>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            "UPDATE document
             SET status = ?, current_step = ?, version = ?, completed_at = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(document.status.as_str())
        .bind(document.current_step.map(|step| step as i64))
        .bind(document.version as i64)
        .bind(document.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(document.updated_at.to_rfc3339())
        .bind(&document.id.0)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                document_id: document.id,
                expected: expected_version,
            });
        }

        for step in &steps {
            let updated = sqlx::query(
                "UPDATE approval_step
                 SET status = ?, comment = ?, processed_at = ?
                 WHERE id = ? AND document_id = ?",
            )
            .bind(step.status.as_str())
            .bind(&step.comment)
            .bind(step.processed_at.map(|dt| dt.to_rfc3339()))
            .bind(&step.id.0)
            .bind(&document.id.0)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::Backend(format!(
                    "step `{}` does not belong to document `{}`",
                    step.id.0, document.id
                )));
            }
        }

        tx.commit().await.map_err(backend)
    }
}
