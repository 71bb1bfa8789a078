//! Shared helpers for the crate's unit tests
//!
//! Every test gets its own in-memory SQLite database, so tests never see each
//! other's records and can run in parallel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::sync::Mutex;
use url::Url;

use crate::cancel::Cancellation;
use crate::config::EmailLinkConfig;
use crate::coordination::{
    CollaboratorError, EmailLinkAuth, ExternalIdentity, InMemoryAccounts, LinkRequest,
    PendingSignIn, RecordingMailer,
};
use crate::metadata::AccountMetadata;
use crate::signin::SignInRecord;
use crate::storage::{DataStore, SqliteDataStore, TableNames};

const TEST_TABLE_PREFIX: &str = "t_";

/// A fresh in-memory store.
///
/// The pool holds a single connection that never expires: each connection to
/// `sqlite::memory:` opens a separate database.
pub(crate) async fn memory_data_store() -> Arc<dyn DataStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");
    Arc::new(SqliteDataStore::new(pool))
}

/// A store in a fresh database file served by several connections, so
/// concurrent writers really interleave.
async fn file_data_store(path: &Path) -> Arc<dyn DataStore> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .expect("connect to sqlite file");
    Arc::new(SqliteDataStore::new(pool))
}

/// External identity provider whose updates can be made to fail
#[derive(Default)]
pub(crate) struct TestIdentity {
    failing: Mutex<bool>,
}

impl TestIdentity {
    pub(crate) async fn fail_updates(&self, failing: bool) {
        *self.failing.lock().await = failing;
    }
}

#[async_trait]
impl ExternalIdentity for TestIdentity {
    async fn update_email(
        &self,
        _metadata: &AccountMetadata,
        _new_email: &str,
    ) -> Result<(), CollaboratorError> {
        if *self.failing.lock().await {
            return Err(CollaboratorError::new("identity provider unavailable"));
        }
        Ok(())
    }
}

/// An initialized engine plus handles on its collaborators and database
pub(crate) struct TestEngine {
    pub(crate) auth: EmailLinkAuth,
    pub(crate) accounts: Arc<InMemoryAccounts>,
    pub(crate) mailer: Arc<RecordingMailer>,
    pub(crate) identity: Arc<TestIdentity>,
    pool: SqlitePool,
    tables: TableNames,
    db_file: Option<PathBuf>,
}

pub(crate) async fn test_engine() -> TestEngine {
    engine_on(memory_data_store().await, None).await
}

/// Like [`test_engine`], backed by a multi-connection database file that is
/// removed when the engine is dropped
pub(crate) async fn file_test_engine() -> TestEngine {
    let path = std::env::temp_dir().join(format!("email-link-{}.db", uuid::Uuid::new_v4()));
    engine_on(file_data_store(&path).await, Some(path)).await
}

async fn engine_on(data_store: Arc<dyn DataStore>, db_file: Option<PathBuf>) -> TestEngine {
    let pool = data_store
        .as_sqlite()
        .cloned()
        .expect("sqlite store");

    let config = EmailLinkConfig {
        table_prefix: TEST_TABLE_PREFIX.to_string(),
        ..Default::default()
    };
    let tables = TableNames::with_prefix(&config.table_prefix);

    let accounts = Arc::new(InMemoryAccounts::new());
    let mailer = Arc::new(RecordingMailer::new());
    let identity = Arc::new(TestIdentity::default());

    let auth = EmailLinkAuth::new(
        config,
        data_store,
        accounts.clone(),
        identity.clone(),
        mailer.clone(),
    );
    auth.init().await.expect("init engine");

    TestEngine {
        auth,
        accounts,
        mailer,
        identity,
        pool,
        tables,
        db_file,
    }
}

impl Drop for TestEngine {
    fn drop(&mut self) {
        if let Some(path) = self.db_file.take() {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }
}

/// The flow token carried by an emailed sign-in link
pub(crate) fn flow_token_from_link(link: &str) -> String {
    let url = Url::parse(link).expect("link is a url");
    url.query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .expect("link carries a token")
}

impl TestEngine {
    /// Request a link with no client IP and no email change
    pub(crate) async fn request(&self, email: &str, device_unique_id: &str) -> PendingSignIn {
        self.auth
            .request_link(
                &Cancellation::new(),
                LinkRequest::new(email, device_unique_id),
            )
            .await
            .expect("request link")
    }

    /// The flow token from the last link mailed to `email`
    pub(crate) async fn flow_token(&self, email: &str) -> String {
        let link = self
            .mailer
            .last_link_for(email)
            .await
            .expect("a link was sent");
        flow_token_from_link(&link)
    }

    pub(crate) async fn record(&self, email: &str, device_unique_id: &str) -> SignInRecord {
        self.auth
            .sign_in_record(&Cancellation::new(), email, device_unique_id)
            .await
            .expect("sign-in record")
    }

    pub(crate) async fn set_wrong_attempts(&self, email: &str, device_unique_id: &str, count: i64) {
        let sql = format!(
            "UPDATE {} SET confirmation_code_wrong_attempts_count = ?1 WHERE email = ?2 AND device_unique_id = ?3",
            self.tables.sign_ins
        );
        sqlx::query(&sql)
            .bind(count)
            .bind(email)
            .bind(device_unique_id)
            .execute(&self.pool)
            .await
            .expect("set wrong attempts");
    }

    pub(crate) async fn set_issued_token_seq(&self, email: &str, device_unique_id: &str, seq: i64) {
        let sql = format!(
            "UPDATE {} SET issued_token_seq = ?1 WHERE email = ?2 AND device_unique_id = ?3",
            self.tables.sign_ins
        );
        sqlx::query(&sql)
            .bind(seq)
            .bind(email)
            .bind(device_unique_id)
            .execute(&self.pool)
            .await
            .expect("set issued token seq");
    }

    /// Make every later account-metadata write fail
    pub(crate) async fn drop_metadata_table(&self) {
        let sql = format!("DROP TABLE {}", self.tables.account_metadata);
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .expect("drop metadata table");
    }

    pub(crate) async fn count_sign_ins(&self) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", self.tables.sign_ins);
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .expect("count sign-ins")
    }

    pub(crate) async fn ip_attempts(&self, ip: &str, login_session_number: i64) -> i64 {
        self.auth
            .limiter
            .attempts(&Cancellation::new(), ip, login_session_number)
            .await
            .expect("ip attempts")
    }
}
