use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::backend::{Backend, BackendMode, HealthProbe};
use crate::error::{Result, TrackError};
use crate::models::{Collection, DateRange, Filter, SortSpec};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Backend over the hosted Postgres database (a Supabase project or any Postgres).
///
/// Every value is bound as text and cast to the column type declared in
/// [`Collection::columns`], and rows come back through `row_to_json` so the
/// facades see the same JSON shape in both storage modes.
pub struct HostedBackend {
    pool: PgPool,
}

/// SQL text plus its positional text parameters.
#[derive(Debug, PartialEq)]
struct Statement {
    sql: String,
    binds: Vec<Option<String>>,
}

fn bind_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn where_clause(collection: Collection, filter: &Filter, binds: &mut Vec<Option<String>>) -> Result<String> {
    if filter.is_empty() {
        return Ok(String::new());
    }

    let mut clauses = Vec::with_capacity(filter.len());
    for (field, value) in filter.iter() {
        let column = collection.column(field).ok_or_else(|| TrackError::UnknownField {
            collection,
            field: field.clone(),
        })?;
        if value.is_null() {
            clauses.push(format!("t.{} IS NULL", column.name));
        } else {
            binds.push(bind_text(value));
            clauses.push(format!(
                "t.{} = CAST(${} AS {})",
                column.name,
                binds.len(),
                column.sql_type
            ));
        }
    }

    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

fn select_statement(collection: Collection, filter: &Filter, sort: Option<&SortSpec>) -> Result<Statement> {
    let mut binds = Vec::new();
    let mut sql = format!("SELECT row_to_json(t) FROM {} t", collection.name());
    sql.push_str(&where_clause(collection, filter, &mut binds)?);

    match sort {
        Some(sort) => {
            collection.check_fields([&sort.column])?;
            let direction = if sort.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY t.{} {direction}, t.created_at ASC", sort.column));
        }
        None => sql.push_str(" ORDER BY t.created_at ASC"),
    }

    Ok(Statement { sql, binds })
}

fn record_fields(collection: Collection, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => {
            collection.check_fields(map.keys())?;
            Ok(map)
        }
        other => Err(TrackError::Validation(format!(
            "{collection} records must be objects, got {other}"
        ))),
    }
}

fn insert_statement(collection: Collection, fields: &Map<String, Value>) -> Result<Statement> {
    if fields.is_empty() {
        return Ok(Statement {
            sql: format!(
                "INSERT INTO {} AS t DEFAULT VALUES RETURNING row_to_json(t)",
                collection.name()
            ),
            binds: Vec::new(),
        });
    }

    let mut names = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    let mut binds = Vec::with_capacity(fields.len());
    for (field, value) in fields {
        let column = collection.column(field).ok_or_else(|| TrackError::UnknownField {
            collection,
            field: field.clone(),
        })?;
        binds.push(bind_text(value));
        names.push(column.name);
        values.push(format!("CAST(${} AS {})", binds.len(), column.sql_type));
    }

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} AS t ({}) VALUES ({}) RETURNING row_to_json(t)",
            collection.name(),
            names.join(", "),
            values.join(", ")
        ),
        binds,
    })
}

fn update_statement(collection: Collection, id: Uuid, fields: &Map<String, Value>) -> Result<Statement> {
    if fields.contains_key("id") {
        return Err(TrackError::Validation("id cannot be changed".to_string()));
    }
    if fields.is_empty() {
        return select_statement(collection, &Filter::new().eq("id", id.to_string()), None);
    }

    let mut assignments = Vec::with_capacity(fields.len());
    let mut binds = Vec::with_capacity(fields.len() + 1);
    for (field, value) in fields {
        let column = collection.column(field).ok_or_else(|| TrackError::UnknownField {
            collection,
            field: field.clone(),
        })?;
        binds.push(bind_text(value));
        assignments.push(format!(
            "{} = CAST(${} AS {})",
            column.name,
            binds.len(),
            column.sql_type
        ));
    }
    binds.push(Some(id.to_string()));

    Ok(Statement {
        sql: format!(
            "UPDATE {} AS t SET {} WHERE t.id = CAST(${} AS uuid) RETURNING row_to_json(t)",
            collection.name(),
            assignments.join(", "),
            binds.len()
        ),
        binds,
    })
}

impl HostedBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_all(&self, statement: Statement) -> Result<Vec<Value>> {
        let mut query = sqlx::query_scalar::<_, Value>(&statement.sql);
        for bind in statement.binds {
            query = query.bind(bind);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn fetch_optional(&self, statement: Statement) -> Result<Option<Value>> {
        let mut query = sqlx::query_scalar::<_, Value>(&statement.sql);
        for bind in statement.binds {
            query = query.bind(bind);
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl HealthProbe for HostedBackend {
    async fn count_rows(&self, collection: Collection) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", collection.name());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn date_range(&self, collection: Collection, column: &str) -> Result<Option<DateRange>> {
        let column = collection
            .column(column)
            .ok_or_else(|| TrackError::UnknownField {
                collection,
                field: column.to_string(),
            })?;
        let sql = format!(
            "SELECT MIN({name}), MAX({name}) FROM {table}",
            name = column.name,
            table = collection.name()
        );
        let (min, max): (Option<NaiveDate>, Option<NaiveDate>) =
            sqlx::query_as(&sql).fetch_one(&self.pool).await?;

        Ok(match (min, max) {
            (Some(min), Some(max)) => Some(DateRange { min, max }),
            _ => None,
        })
    }
}

#[async_trait]
impl Backend for HostedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Hosted
    }

    async fn list(&self, collection: Collection, sort: Option<&SortSpec>) -> Result<Vec<Value>> {
        self.fetch_all(select_statement(collection, &Filter::new(), sort)?)
            .await
    }

    async fn filter(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        self.fetch_all(select_statement(collection, filter, None)?).await
    }

    async fn insert(&self, collection: Collection, record: Value) -> Result<Value> {
        let fields = record_fields(collection, record)?;
        let statement = insert_statement(collection, &fields)?;
        self.fetch_optional(statement)
            .await?
            .ok_or_else(|| TrackError::Storage(format!("insert into {collection} returned no row")))
    }

    async fn update(&self, collection: Collection, id: Uuid, patch: Value) -> Result<Value> {
        let fields = record_fields(collection, patch)?;
        let statement = update_statement(collection, id, &fields)?;
        self.fetch_optional(statement)
            .await?
            .ok_or(TrackError::NotFound {
                entity: collection.entity_name(),
                id,
            })
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for dependent in collection.dependents() {
            let sql = format!("DELETE FROM {} WHERE student_id = $1", dependent.name());
            let removed = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
            tracing::debug!(
                collection = %dependent,
                removed = removed.rows_affected(),
                "Removed dependent records"
            );
        }

        let sql = format!("DELETE FROM {} WHERE id = $1", collection.name());
        let result = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(TrackError::NotFound {
                entity: collection.entity_name(),
                id,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn supports_dashboards(&self) -> bool {
        let probe = sqlx::query_scalar::<_, bool>("SELECT to_regclass('public.dashboards') IS NOT NULL")
            .fetch_one(&self.pool)
            .await;
        match probe {
            Ok(supported) => supported,
            Err(e) => {
                tracing::warn!(error = %e, "Could not probe dashboards table");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn select_casts_filter_values_to_column_types() {
        let filter = Filter::new().eq("active", true).eq("dashboard_id", "north");
        let statement = select_statement(Collection::Students, &filter, None).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT row_to_json(t) FROM students t \
             WHERE t.active = CAST($1 AS boolean) AND t.dashboard_id = CAST($2 AS text) \
             ORDER BY t.created_at ASC"
        );
        assert_eq!(
            statement.binds,
            vec![Some("true".to_string()), Some("north".to_string())]
        );
    }

    #[test]
    fn text_and_typed_filter_values_bind_alike() {
        let typed = select_statement(Collection::Students, &Filter::new().eq("active", true), None).unwrap();
        let text = select_statement(Collection::Students, &Filter::new().eq("active", "true"), None).unwrap();
        assert_eq!(typed, text);
    }

    #[test]
    fn null_filter_values_become_is_null() {
        let filter = Filter::new().eq("grade", Value::Null);
        let statement = select_statement(Collection::Students, &filter, None).unwrap();
        assert!(statement.sql.contains("WHERE t.grade IS NULL"));
        assert!(statement.binds.is_empty());
    }

    #[test]
    fn select_orders_by_requested_column() {
        let statement = select_statement(
            Collection::DailyEvaluations,
            &Filter::new(),
            Some(&SortSpec::desc("date")),
        )
        .unwrap();
        assert!(statement.sql.ends_with("ORDER BY t.date DESC, t.created_at ASC"));
    }

    #[test]
    fn unknown_sort_column_is_rejected() {
        let err = select_statement(
            Collection::Students,
            &Filter::new(),
            Some(&SortSpec::asc("name; DROP TABLE students")),
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::UnknownField { .. }));
    }

    #[test]
    fn insert_serializes_nested_values_as_json_text() {
        let record = fields(json!({
            "student_id": "6f7b3c4e-8d1a-4a57-9a0e-2a3f1c9e4b10",
            "scores": {"peer_interaction": {"rating": 3, "notes": ""}},
        }));
        let statement = insert_statement(Collection::DailyEvaluations, &record).unwrap();
        assert!(statement.sql.starts_with("INSERT INTO daily_evaluations AS t ("));
        assert!(statement.sql.contains("CAST($2 AS jsonb)") || statement.sql.contains("CAST($1 AS jsonb)"));
        assert!(statement.sql.ends_with("RETURNING row_to_json(t)"));
        assert!(statement
            .binds
            .contains(&Some(r#"{"peer_interaction":{"notes":"","rating":3}}"#.to_string())));
    }

    #[test]
    fn update_targets_id_as_last_parameter() {
        let id = Uuid::new_v4();
        let statement =
            update_statement(Collection::Students, id, &fields(json!({"active": false}))).unwrap();
        assert_eq!(
            statement.sql,
            "UPDATE students AS t SET active = CAST($1 AS boolean) \
             WHERE t.id = CAST($2 AS uuid) RETURNING row_to_json(t)"
        );
        assert_eq!(statement.binds.last(), Some(&Some(id.to_string())));
    }

    #[test]
    fn update_refuses_to_change_id() {
        let err = update_statement(
            Collection::Students,
            Uuid::new_v4(),
            &fields(json!({"id": "other"})),
        )
        .unwrap_err();
        assert!(matches!(err, TrackError::Validation(_)));
    }
}
