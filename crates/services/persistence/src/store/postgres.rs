//! Postgres document store.
//!
//! Every collection shares the `documents` table: `(collection, id)` is the
//! primary key and `body` holds the full JSON document. `_id` conditions run
//! against the `id` column; every other field is read as `body -> field`.

use async_trait::async_trait;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, DbErr, QueryResult, SqlErr, Statement, Value,
};

use domain::{FIELD_DELETED_AT, FIELD_ID};

use super::{
    Condition, Document, DocumentStore, Filter, FindQuery, Patch, SortDirection, StoreError,
    UpdateResult,
};

const TABLE: &str = "documents";

/// Tombstone check, written literally so the planner can match it against
/// the `idx_documents_live` partial index.
pub(crate) const LIVE_PREDICATE: &str = "(body -> 'deletedAt') IS NULL";

const TOMBSTONED_PREDICATE: &str = "(body -> 'deletedAt') IS NOT NULL";

/// `updatedAt` of a replacement row `d` built from `new_body`: the proposed
/// stamp, or one microsecond past the stored stamp when that is not later.
fn replaced_updated_at(new_body: &str) -> String {
    format!(
        "CASE WHEN d.body -> 'updatedAt' IS NOT NULL \
              AND ({new_body} ->> 'updatedAt')::timestamptz <= (d.body ->> 'updatedAt')::timestamptz \
         THEN to_jsonb(to_char(((d.body ->> 'updatedAt')::timestamptz + interval '1 microsecond') \
              AT TIME ZONE 'UTC', 'YYYY-MM-DD\"T\"HH24:MI:SS.US\"Z\"')) \
         ELSE {new_body} -> 'updatedAt' END"
    )
}

/// Document store over a sea-orm Postgres connection.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    db: DatabaseConnection,
}

impl PostgresDocumentStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

/// Accumulates positional parameters while a statement is assembled.
struct SqlBuilder {
    values: Vec<Value>,
}

impl SqlBuilder {
    fn new(collection: &str) -> Self {
        Self {
            values: vec![collection.into()],
        }
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        format!("${}", self.values.len())
    }

    fn bind_json(&mut self, value: &serde_json::Value) -> String {
        format!("{}::jsonb", self.bind(value.to_string()))
    }

    /// `WHERE` clause scoped to the collection (always parameter `$1`).
    fn where_clause(&mut self, filter: &Filter) -> String {
        let mut predicates = vec!["collection = $1".to_string()];
        for (field, condition) in filter.conditions() {
            predicates.push(self.predicate(field, condition));
        }
        predicates.join(" AND ")
    }

    fn predicate(&mut self, field: &str, condition: &Condition) -> String {
        if field == FIELD_ID {
            return match condition {
                Condition::Exists(present) => present.to_string().to_uppercase(),
                Condition::Eq(value) => format!("id = {}", self.bind(id_text(value))),
                Condition::Gt(value) => format!("id COLLATE \"C\" > {}", self.bind(id_text(value))),
                Condition::Lt(value) => format!("id COLLATE \"C\" < {}", self.bind(id_text(value))),
            };
        }

        if field == FIELD_DELETED_AT {
            match condition {
                Condition::Exists(false) => return LIVE_PREDICATE.to_string(),
                Condition::Exists(true) => return TOMBSTONED_PREDICATE.to_string(),
                _ => {}
            }
        }

        let key = self.bind(field.to_string());
        match condition {
            Condition::Exists(true) => format!("(body -> {}) IS NOT NULL", key),
            Condition::Exists(false) => format!("(body -> {}) IS NULL", key),
            Condition::Eq(value) => format!("body -> {} = {}", key, self.bind_json(value)),
            Condition::Gt(value) => self.range(&key, ">", value),
            Condition::Lt(value) => self.range(&key, "<", value),
        }
    }

    fn range(&mut self, key: &str, op: &str, value: &serde_json::Value) -> String {
        let bound = self.bind_json(value);
        format!(
            "(jsonb_typeof(body -> {key}) = jsonb_typeof({bound}) AND body -> {key} {op} {bound})"
        )
    }

    fn order_by(&mut self, query: &FindQuery) -> String {
        let Some(sort) = &query.sort else {
            return "id COLLATE \"C\" ASC".to_string();
        };
        let direction = match sort.direction {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        };
        if sort.field == FIELD_ID {
            format!("id COLLATE \"C\" {}", direction)
        } else {
            let key = self.bind(sort.field.clone());
            format!("body -> {} {}, id COLLATE \"C\" {}", key, direction, direction)
        }
    }

    fn statement(self, sql: String) -> Statement {
        Statement::from_sql_and_values(DbBackend::Postgres, sql, self.values)
    }
}

fn id_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_row(row: &QueryResult) -> Result<Document, StoreError> {
    let body: String = row.try_get("", "body")?;
    match serde_json::from_str(&body)? {
        serde_json::Value::Object(document) => Ok(document),
        _ => Err(StoreError::Malformed("stored body is not an object".to_string())),
    }
}

fn map_insert_error(err: DbErr, id: &str) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::Duplicate(id.to_string()),
        _ => StoreError::Database(err),
    }
}

impl PostgresDocumentStore {
    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
        single: bool,
    ) -> Result<UpdateResult, StoreError> {
        let mut sql = SqlBuilder::new(collection);
        let where_clause = sql.where_clause(filter);
        let patch_json = sql.bind_json(&serde_json::to_value(patch)?);
        let limit = if single { " ORDER BY id COLLATE \"C\" LIMIT 1" } else { "" };

        let stmt = sql.statement(format!(
            "WITH matched AS ( \
                SELECT id FROM {TABLE} WHERE {where_clause}{limit} FOR UPDATE \
             ), updated AS ( \
                UPDATE {TABLE} d SET body = d.body || {patch_json} \
                FROM matched m \
                WHERE d.collection = $1 AND d.id = m.id AND NOT (d.body @> {patch_json}) \
                RETURNING d.id \
             ) \
             SELECT (SELECT COUNT(*) FROM matched) AS matched, \
                    (SELECT COUNT(*) FROM updated) AS modified"
        ));

        let row = self
            .db
            .query_one(stmt)
            .await?
            .ok_or_else(|| StoreError::Unavailable("update returned no counts".to_string()))?;
        let matched: i64 = row.try_get("", "matched")?;
        let modified: i64 = row.try_get("", "modified")?;

        Ok(UpdateResult {
            matched: matched.max(0) as u64,
            modified: modified.max(0) as u64,
        })
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn insert_one(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let id = document
            .get(FIELD_ID)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed(format!("missing string {}", FIELD_ID)))?;

        let mut sql = SqlBuilder::new(collection);
        let id_param = sql.bind(id.clone());
        let body = sql.bind_json(&serde_json::Value::Object(document));
        let stmt = sql.statement(format!(
            "INSERT INTO {TABLE} (collection, id, body) VALUES ($1, {id_param}, {body})"
        ));

        self.db
            .execute(stmt)
            .await
            .map_err(|e| map_insert_error(e, &id))?;
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let mut sql = SqlBuilder::new(collection);
        let where_clause = sql.where_clause(filter);
        let stmt = sql.statement(format!(
            "SELECT body::text AS body FROM {TABLE} WHERE {where_clause} \
             ORDER BY id COLLATE \"C\" LIMIT 1"
        ));

        match self.db.query_one(stmt).await? {
            Some(row) => decode_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn find_many(
        &self,
        collection: &str,
        query: &FindQuery,
    ) -> Result<Vec<Document>, StoreError> {
        let mut sql = SqlBuilder::new(collection);
        let where_clause = sql.where_clause(&query.filter);
        let order_by = sql.order_by(query);
        let mut paging = format!(" OFFSET {}", sql.bind(query.skip as i64));
        if let Some(limit) = query.limit {
            paging = format!(" LIMIT {}{}", sql.bind(limit as i64), paging);
        }

        let stmt = sql.statement(format!(
            "SELECT body::text AS body FROM {TABLE} WHERE {where_clause} ORDER BY {order_by}{paging}"
        ));

        self.db
            .query_all(stmt)
            .await?
            .iter()
            .map(decode_row)
            .collect()
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut sql = SqlBuilder::new(collection);
        let where_clause = sql.where_clause(filter);
        let stmt = sql.statement(format!(
            "SELECT COUNT(*) AS total FROM {TABLE} WHERE {where_clause}"
        ));

        let total: i64 = match self.db.query_one(stmt).await? {
            Some(row) => row.try_get("", "total")?,
            None => 0,
        };
        Ok(total.max(0) as u64)
    }

    async fn find_one_and_replace(
        &self,
        collection: &str,
        filter: &Filter,
        document: Document,
    ) -> Result<Option<Document>, StoreError> {
        let mut sql = SqlBuilder::new(collection);
        let where_clause = sql.where_clause(filter);
        let body = sql.bind_json(&serde_json::Value::Object(document));
        let updated_at = replaced_updated_at(&body);
        let stmt = sql.statement(format!(
            "UPDATE {TABLE} d \
             SET body = {body} || jsonb_build_object( \
                '_id', d.body -> '_id', \
                'createdAt', d.body -> 'createdAt', \
                'updatedAt', {updated_at}) \
             WHERE d.collection = $1 AND d.id = ( \
                SELECT id FROM {TABLE} WHERE {where_clause} \
                ORDER BY id COLLATE \"C\" LIMIT 1 FOR UPDATE \
             ) \
             RETURNING d.body::text AS body"
        ));

        match self.db.query_one(stmt).await? {
            Some(row) => decode_row(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, patch, true).await
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<UpdateResult, StoreError> {
        self.update(collection, filter, patch, false).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .execute(Statement::from_string(DbBackend::Postgres, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }
}
