use chrono::{DateTime, Utc};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlQueryResult;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    F64(f64),
    Timestamp(DateTime<Utc>),
    Null,
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
/// `guard` adds one extra `AND column = ?` condition after the id match.
/// Column names come from the stores' own field mappings, never from input.
pub fn build_update_sql(
    table: &str,
    assignments: Vec<(&'static str, SqlValue)>,
    id_column: &str,
    id_value: &str,
    guard: Option<(&'static str, SqlValue)>,
) -> Option<SqlUpdate> {
    if assignments.is_empty() {
        return None;
    }

    let set_clause = assignments
        .iter()
        .map(|(column, _)| format!("{} = ?", column))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values: Vec<SqlValue> = assignments.into_iter().map(|(_, v)| v).collect();
    values.push(SqlValue::Text(id_value.to_string()));

    if let Some((column, value)) = guard {
        sql.push_str(&format!(" AND {} = ?", column));
        values.push(value);
    }

    Some(SqlUpdate { sql, values })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update(
    pool: &MySqlPool,
    update: SqlUpdate,
) -> Result<MySqlQueryResult, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::Text(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Timestamp(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    query.execute(pool).await
}

/// Escapes LIKE wildcards so user input matches literally.
pub fn like_contains(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
