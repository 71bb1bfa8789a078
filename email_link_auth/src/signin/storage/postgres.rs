use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::metadata::AccountMetadata;
use crate::storage::{StorageError, TableNames, map_sqlx_error, validate_postgres_table_schema};

use crate::signin::types::{
    Finalization, IpRefund, LoginId, NewSignIn, SignInRecord, SignInRow,
};

pub(super) async fn create_tables_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
) -> Result<(), StorageError> {
    let sign_ins = &tables.sign_ins;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {sign_ins} (
            email TEXT NOT NULL,
            device_unique_id TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            token_issued_at TIMESTAMPTZ,
            email_confirmed_at TIMESTAMPTZ,
            blocked_until TIMESTAMPTZ,
            confirmation_code TEXT NOT NULL,
            otp TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'verified', 'consumed')),
            confirmation_code_wrong_attempts_count BIGINT NOT NULL DEFAULT 0,
            issued_token_seq BIGINT NOT NULL DEFAULT 0 CHECK (issued_token_seq >= 0),
            previously_issued_token_seq BIGINT NOT NULL DEFAULT 0,
            user_id TEXT,
            phone_number_to_email_migration_user_id TEXT,
            PRIMARY KEY (email, device_unique_id)
        )
        "#
    ))
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create sign-in table", e))?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{sign_ins}_user_id ON {sign_ins}(user_id)"
    ))
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create sign-in user_id index", e))?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            user_id TEXT PRIMARY KEY NOT NULL,
            metadata JSONB NOT NULL
        )
        "#,
        tables.account_metadata
    ))
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("create account metadata table", e))?;

    Ok(())
}

pub(super) async fn validate_sign_in_tables_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
) -> Result<(), StorageError> {
    let sign_in_columns = [
        ("email", "text"),
        ("device_unique_id", "text"),
        ("created_at", "timestamp with time zone"),
        ("token_issued_at", "timestamp with time zone"),
        ("email_confirmed_at", "timestamp with time zone"),
        ("blocked_until", "timestamp with time zone"),
        ("confirmation_code", "text"),
        ("otp", "text"),
        ("status", "text"),
        ("confirmation_code_wrong_attempts_count", "bigint"),
        ("issued_token_seq", "bigint"),
        ("previously_issued_token_seq", "bigint"),
        ("user_id", "text"),
        ("phone_number_to_email_migration_user_id", "text"),
    ];
    validate_postgres_table_schema(pool, &tables.sign_ins, &sign_in_columns).await?;

    let metadata_columns = [("user_id", "text"), ("metadata", "jsonb")];
    validate_postgres_table_schema(pool, &tables.account_metadata, &metadata_columns).await
}

pub(super) async fn create_or_renew_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    new: &NewSignIn,
) -> Result<Option<SignInRecord>, StorageError> {
    let table = &tables.sign_ins;

    let row = sqlx::query_as::<_, SignInRow>(&format!(
        r#"
        INSERT INTO {table} AS s (
            email, device_unique_id, created_at, confirmation_code, otp, status,
            confirmation_code_wrong_attempts_count, issued_token_seq,
            previously_issued_token_seq, user_id, phone_number_to_email_migration_user_id
        )
        VALUES ($1, $2, $3, $4, $5, 'pending', 0, 0, 0, COALESCE($6, $7), $8)
        ON CONFLICT (email, device_unique_id) DO UPDATE SET
            confirmation_code = EXCLUDED.confirmation_code,
            otp = EXCLUDED.otp,
            status = 'pending',
            confirmation_code_wrong_attempts_count = 0,
            blocked_until = NULL,
            user_id = COALESCE($6, s.user_id, $7),
            phone_number_to_email_migration_user_id = EXCLUDED.phone_number_to_email_migration_user_id
        WHERE s.blocked_until IS NULL OR s.blocked_until <= $3
        RETURNING *
        "#
    ))
    .bind(&new.id.email)
    .bind(&new.id.device_unique_id)
    .bind(new.now)
    .bind(&new.confirmation_code)
    .bind(&new.otp)
    .bind(new.resolved_user_id.as_deref())
    .bind(&new.generated_user_id)
    .bind(new.phone_number_to_email_migration_user_id.as_deref())
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("create or renew sign-in", e))?;

    row.map(SignInRecord::try_from).transpose()
}

pub(super) async fn get_sign_in_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    id: &LoginId,
) -> Result<Option<SignInRecord>, StorageError> {
    let row = sqlx::query_as::<_, SignInRow>(&format!(
        "SELECT * FROM {} WHERE email = $1 AND device_unique_id = $2",
        tables.sign_ins
    ))
    .bind(&id.email)
    .bind(&id.device_unique_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("get sign-in", e))?;

    row.map(SignInRecord::try_from).transpose()
}

pub(super) async fn get_sign_in_by_otp_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    id: &LoginId,
    otp: &str,
) -> Result<Option<SignInRecord>, StorageError> {
    let row = sqlx::query_as::<_, SignInRow>(&format!(
        "SELECT * FROM {} WHERE email = $1 AND device_unique_id = $2 AND otp = $3",
        tables.sign_ins
    ))
    .bind(&id.email)
    .bind(&id.device_unique_id)
    .bind(otp)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("get sign-in by otp", e))?;

    row.map(SignInRecord::try_from).transpose()
}

pub(super) async fn get_metadata_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    user_id: &str,
) -> Result<Option<AccountMetadata>, StorageError> {
    let json: Option<String> = sqlx::query_scalar(&format!(
        "SELECT metadata::text FROM {} WHERE user_id = $1",
        tables.account_metadata
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("get account metadata", e))?;

    json.map(|json| AccountMetadata::from_json(&json))
        .transpose()
        .map_err(StorageError::from)
}

pub(super) async fn increase_wrong_attempts_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    id: &LoginId,
    blocked_until: Option<DateTime<Utc>>,
) -> Result<(), StorageError> {
    let result = sqlx::query(&format!(
        r#"
        UPDATE {} SET
            confirmation_code_wrong_attempts_count = confirmation_code_wrong_attempts_count + 1,
            blocked_until = COALESCE($3, blocked_until)
        WHERE email = $1 AND device_unique_id = $2
        "#,
        tables.sign_ins
    ))
    .bind(&id.email)
    .bind(&id.device_unique_id)
    .bind(blocked_until)
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("increase wrong attempts", e))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NoRowsAffected(format!(
            "increase wrong attempts for {id}"
        )));
    }
    Ok(())
}

pub(super) async fn finalize_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    fin: &Finalization<'_>,
) -> Result<i64, StorageError> {
    let metadata_json = fin.metadata.to_json()?;
    let metadata_table = &tables.account_metadata;

    // One statement: the metadata write only happens if the update matched
    let new_seq: Option<i64> = sqlx::query_scalar(&format!(
        r#"
        WITH finalized AS (
            UPDATE {} SET
                token_issued_at = $3,
                user_id = $4,
                email_confirmed_at = $5,
                phone_number_to_email_migration_user_id = NULL,
                status = 'verified',
                previously_issued_token_seq = issued_token_seq,
                issued_token_seq = issued_token_seq + 1
            WHERE email = $1 AND device_unique_id = $2
                AND issued_token_seq = $6 AND status = 'pending'
            RETURNING issued_token_seq
        ), stored_metadata AS (
            INSERT INTO {metadata_table} AS md (user_id, metadata)
            SELECT $4, $7::jsonb WHERE EXISTS (SELECT 1 FROM finalized)
            ON CONFLICT (user_id) DO UPDATE SET metadata = EXCLUDED.metadata
            WHERE md.metadata IS DISTINCT FROM EXCLUDED.metadata
        )
        SELECT issued_token_seq FROM finalized
        "#,
        tables.sign_ins
    ))
    .bind(&fin.id.email)
    .bind(&fin.id.device_unique_id)
    .bind(fin.now)
    .bind(fin.user_id)
    .bind(fin.email_confirmed_at())
    .bind(fin.observed_seq)
    .bind(&metadata_json)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("finalize sign-in", e))?;

    new_seq.ok_or_else(|| {
        StorageError::NoRowsAffected(format!("finalize {} at seq {}", fin.id, fin.observed_seq))
    })
}

pub(super) async fn consume_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    id: &LoginId,
    confirmation_code: &str,
    issued_token_seq: i64,
    refund: Option<IpRefund<'_>>,
) -> Result<(), StorageError> {
    let consume = format!(
        r#"
        UPDATE {} SET status = 'consumed', otp = NULL
        WHERE email = $1 AND device_unique_id = $2 AND confirmation_code = $3
            AND issued_token_seq = $4 AND status = 'verified'
        "#,
        tables.sign_ins
    );

    let consumed = match refund {
        None => {
            sqlx::query(&consume)
                .bind(&id.email)
                .bind(&id.device_unique_id)
                .bind(confirmation_code)
                .bind(issued_token_seq)
                .execute(pool)
                .await
                .map_err(|e| map_sqlx_error("consume sign-in", e))?
                .rows_affected()
        }
        Some(refund) => {
            let count: i64 = sqlx::query_scalar(&format!(
                r#"
                WITH consumed AS (
                    {consume}
                    RETURNING 1
                ), refunded AS (
                    UPDATE {} SET login_attempts = GREATEST(login_attempts - 1, 0)
                    WHERE login_session_number = $5 AND ip = $6
                        AND EXISTS (SELECT 1 FROM consumed)
                )
                SELECT COUNT(*) FROM consumed
                "#,
                tables.sign_ins_per_ip
            ))
            .bind(&id.email)
            .bind(&id.device_unique_id)
            .bind(confirmation_code)
            .bind(issued_token_seq)
            .bind(refund.login_session_number)
            .bind(refund.ip)
            .fetch_one(pool)
            .await
            .map_err(|e| map_sqlx_error("consume sign-in", e))?;
            count as u64
        }
    };

    if consumed == 0 {
        return Err(StorageError::NoRowsAffected(format!(
            "consume {id} at seq {issued_token_seq}"
        )));
    }
    Ok(())
}

pub(super) async fn redeem_otp_postgres(
    pool: &Pool<Postgres>,
    tables: &TableNames,
    id: &LoginId,
    otp: &str,
    issued_token_seq: i64,
) -> Result<(), StorageError> {
    let result = sqlx::query(&format!(
        r#"
        UPDATE {} SET otp = NULL, status = 'consumed'
        WHERE email = $1 AND device_unique_id = $2 AND otp = $3
            AND issued_token_seq = $4 AND status = 'verified'
        "#,
        tables.sign_ins
    ))
    .bind(&id.email)
    .bind(&id.device_unique_id)
    .bind(otp)
    .bind(issued_token_seq)
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("redeem otp", e))?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NoRowsAffected(format!(
            "redeem otp for {id} at seq {issued_token_seq}"
        )));
    }
    Ok(())
}
