use sqlx::{Pool, Sqlite};

use crate::storage::{StorageError, map_sqlx_error, validate_sqlite_table_schema};

pub(super) async fn create_table_sqlite(
    pool: &Pool<Sqlite>,
    table: &str,
    max_attempts: i64,
) -> Result<(), StorageError> {
    // The bound lives in the schema so concurrent admits cannot overshoot it
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            login_session_number INTEGER NOT NULL,
            ip TEXT NOT NULL,
            login_attempts INTEGER NOT NULL DEFAULT 0
                CHECK (login_attempts >= 0 AND login_attempts <= {max_attempts}),
            PRIMARY KEY (login_session_number, ip)
        )
        "#
    ))
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create sign-ins per ip table", e))?;

    Ok(())
}

pub(super) async fn validate_table_sqlite(
    pool: &Pool<Sqlite>,
    table: &str,
) -> Result<(), StorageError> {
    let columns = [
        ("login_session_number", "INTEGER"),
        ("ip", "TEXT"),
        ("login_attempts", "INTEGER"),
    ];
    validate_sqlite_table_schema(pool, table, &columns).await
}

pub(super) async fn admit_sqlite(
    pool: &Pool<Sqlite>,
    table: &str,
    ip: &str,
    login_session_number: i64,
) -> Result<i64, StorageError> {
    sqlx::query_scalar(&format!(
        r#"
        INSERT INTO {table} (login_session_number, ip, login_attempts) VALUES (?1, ?2, 1)
        ON CONFLICT (login_session_number, ip) DO UPDATE SET
            login_attempts = {table}.login_attempts + 1
        RETURNING login_attempts
        "#
    ))
    .bind(login_session_number)
    .bind(ip)
    .fetch_one(pool)
    .await
    .map_err(|e| map_sqlx_error("admit ip attempt", e))
}

pub(super) async fn refund_sqlite(
    pool: &Pool<Sqlite>,
    table: &str,
    ip: &str,
    login_session_number: i64,
) -> Result<(), StorageError> {
    sqlx::query(&format!(
        r#"
        UPDATE {table} SET login_attempts = MAX(login_attempts - 1, 0)
        WHERE login_session_number = ?1 AND ip = ?2
        "#
    ))
    .bind(login_session_number)
    .bind(ip)
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("refund ip attempt", e))?;

    Ok(())
}

#[cfg(test)]
pub(super) async fn attempts_sqlite(
    pool: &Pool<Sqlite>,
    table: &str,
    ip: &str,
    login_session_number: i64,
) -> Result<Option<i64>, StorageError> {
    sqlx::query_scalar(&format!(
        "SELECT login_attempts FROM {table} WHERE login_session_number = ?1 AND ip = ?2"
    ))
    .bind(login_session_number)
    .bind(ip)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("get ip attempts", e))
}
