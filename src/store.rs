//! Generic soft-delete record store.
//!
//! Every persisted entity carries the audit columns in [`Audit`] and gets its
//! lifecycle (create, fetch, update, soft-delete, restore, hard-delete) from
//! [`Store`]. Each mutating operation is a single statement and therefore its
//! own transaction; write failures always propagate to the caller. Lookup
//! misses are `None`, never errors.

use std::marker::PhantomData;

use serde_json::Value;
use sqlx::{
    query_builder::Separated, sqlite::SqliteRow, FromRow, QueryBuilder, Sqlite, SqlitePool,
};
use time::OffsetDateTime;

use crate::error::StoreError;

/// Days a soft-deleted record is kept before it becomes eligible for hard
/// deletion. Advisory: nothing purges automatically.
pub const DEFAULT_RETAIN_DAYS: i64 = 30;

/// Audit columns shared by every stored record.
#[derive(Debug, Clone, FromRow)]
pub struct Audit {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
    pub retain_for: i64,
}

impl Audit {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Earliest instant the record may be hard-deleted per its retention
    /// window. `None` while the record is active.
    pub fn purge_eligible_at(&self) -> Option<OffsetDateTime> {
        self.deleted_at
            .map(|at| at + time::Duration::days(self.retain_for))
    }
}

/// A record type the [`Store`] can persist.
pub trait Record: for<'r> FromRow<'r, SqliteRow> + Send + Sync + Unpin {
    /// Backing table.
    const TABLE: &'static str;

    /// Entity-owned columns, audit columns excluded.
    const FIELDS: &'static [&'static str];

    /// Column values for a record that has not been persisted yet.
    type Draft: Send + Sync;

    fn audit(&self) -> &Audit;

    /// Bind the draft's values, one per entry in `FIELDS`, in order.
    fn bind_draft(draft: &Self::Draft, values: &mut Separated<'_, '_, Sqlite, &'static str>);
}

/// Persistence for one record type. Cloning is cheap; the pool is
/// reference-counted.
#[derive(Clone)]
pub struct Store<T> {
    pool: SqlitePool,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Store<T> {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            _record: PhantomData,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a new record, assigning `id` and the audit timestamps, and
    /// return the stored row.
    pub async fn save(&self, draft: T::Draft) -> Result<T, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        qb.push(T::TABLE).push(" (");
        {
            let mut columns = qb.separated(", ");
            for field in T::FIELDS {
                columns.push(*field);
            }
            columns.push("created_at");
            columns.push("updated_at");
            columns.push("retain_for");
        }
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            T::bind_draft(&draft, &mut values);
            values.push_bind(now);
            values.push_bind(now);
            values.push_bind(DEFAULT_RETAIN_DAYS);
        }
        qb.push(") RETURNING *");

        qb.build_query_as::<T>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify_write_error)
    }

    /// Fetch by id regardless of soft-delete state. Absence is `None`.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<T>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        qb.push(T::TABLE).push(" WHERE id = ").push_bind(id);
        Ok(qb.build_query_as::<T>().fetch_optional(&self.pool).await?)
    }

    /// Every record, soft-deleted ones included, in insertion order.
    pub async fn get_all(&self) -> Result<Vec<T>, StoreError> {
        self.select_where("").await
    }

    pub async fn get_all_active(&self) -> Result<Vec<T>, StoreError> {
        self.select_where(" WHERE deleted_at IS NULL").await
    }

    pub async fn get_all_deleted(&self) -> Result<Vec<T>, StoreError> {
        self.select_where(" WHERE deleted_at IS NOT NULL").await
    }

    async fn select_where(&self, clause: &str) -> Result<Vec<T>, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
        qb.push(T::TABLE).push(clause).push(" ORDER BY id");
        Ok(qb.build_query_as::<T>().fetch_all(&self.pool).await?)
    }

    /// Apply a field-name to value mapping and refresh `updated_at`.
    ///
    /// Updatable fields are the entity's own columns plus `retain_for`;
    /// anything else fails validation before a statement runs.
    pub async fn update(
        &self,
        record: &T,
        changes: &serde_json::Map<String, Value>,
    ) -> Result<T, StoreError> {
        for field in changes.keys() {
            if !Self::updatable(field) {
                return Err(StoreError::Validation(format!(
                    "unknown field for {}: {field}",
                    T::TABLE
                )));
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
        qb.push(T::TABLE).push(" SET ");
        {
            let mut assignments = qb.separated(", ");
            for (field, value) in changes {
                assignments.push(format!("{field} = "));
                bind_value(&mut assignments, field, value)?;
            }
            assignments.push("updated_at = ");
            assignments.push_bind_unseparated(OffsetDateTime::now_utc());
        }
        qb.push(" WHERE id = ").push_bind(record.audit().id);
        qb.push(" RETURNING *");

        qb.build_query_as::<T>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify_write_error)
    }

    /// Stamp `deleted_at`. Calling it on an already-deleted record simply
    /// re-stamps the timestamp.
    pub async fn soft_delete(&self, record: &T) -> Result<T, StoreError> {
        self.stamp_deleted(record.audit().id, Some(OffsetDateTime::now_utc()))
            .await
    }

    /// Clear `deleted_at`, making the record active again. Idempotent on
    /// records that were never deleted.
    pub async fn restore(&self, record: &T) -> Result<T, StoreError> {
        self.stamp_deleted(record.audit().id, None).await
    }

    /// Remove the row for good. Takes the record by value: there is nothing
    /// left to hold afterwards.
    pub async fn hard_delete(&self, record: T) -> Result<(), StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        qb.push(T::TABLE)
            .push(" WHERE id = ")
            .push_bind(record.audit().id);
        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn stamp_deleted(
        &self,
        id: i64,
        deleted_at: Option<OffsetDateTime>,
    ) -> Result<T, StoreError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
        qb.push(T::TABLE)
            .push(" SET deleted_at = ")
            .push_bind(deleted_at);
        qb.push(", updated_at = ")
            .push_bind(OffsetDateTime::now_utc());
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(" RETURNING *");
        qb.build_query_as::<T>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify_write_error)
    }

    fn updatable(field: &str) -> bool {
        field == "retain_for" || T::FIELDS.iter().any(|f| *f == field)
    }
}

fn bind_value(
    assignments: &mut Separated<'_, '_, Sqlite, &'static str>,
    field: &str,
    value: &Value,
) -> Result<(), StoreError> {
    match value {
        Value::Null => {
            assignments.push_bind_unseparated(None::<String>);
        }
        Value::Bool(b) => {
            assignments.push_bind_unseparated(*b);
        }
        Value::Number(n) if n.is_i64() => {
            assignments.push_bind_unseparated(n.as_i64());
        }
        Value::Number(n) => {
            assignments.push_bind_unseparated(n.as_f64());
        }
        Value::String(s) => {
            assignments.push_bind_unseparated(s.clone());
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(StoreError::Validation(format!(
                "unsupported value for field {field}"
            )));
        }
    }
    Ok(())
}

fn classify_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(db.message().to_string())
        }
        _ => StoreError::Persistence(err),
    }
}
