use std::sync::{Arc, Once};

use email_link_auth::{
    Cancellation, EmailLinkAuth, EmailLinkConfig, InMemoryAccounts, LinkRequest,
    NoopExternalIdentity, PendingSignIn, RecordingMailer, SqliteDataStore,
};
use sqlx::sqlite::SqlitePoolOptions;
use url::Url;

static ENV_INIT: Once = Once::new();

/// A running engine backed by its own in-memory database
///
/// Holds the collaborator handles a test needs to play both devices: the
/// mailer is where the "second device" finds its link.
pub struct TestApp {
    pub auth: EmailLinkAuth,
    pub accounts: Arc<InMemoryAccounts>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(EmailLinkConfig::default()).await
    }

    pub async fn with_config(config: EmailLinkConfig) -> Result<Self, Box<dyn std::error::Error>> {
        ENV_INIT.call_once(|| {
            if dotenvy::from_filename(".env_test").is_err() {
                dotenvy::dotenv().ok();
            }
        });

        // One connection: every connection to sqlite::memory: is a new database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let accounts = Arc::new(InMemoryAccounts::new());
        let mailer = Arc::new(RecordingMailer::new());
        let auth = EmailLinkAuth::new(
            config,
            Arc::new(SqliteDataStore::new(pool)),
            accounts.clone(),
            Arc::new(NoopExternalIdentity),
            mailer.clone(),
        );
        auth.init().await?;

        Ok(Self {
            auth,
            accounts,
            mailer,
        })
    }

    /// Ask for a link from `device_unique_id`
    pub async fn request_link(
        &self,
        email: &str,
        device_unique_id: &str,
    ) -> Result<PendingSignIn, email_link_auth::EmailLinkError> {
        self.auth
            .request_link(
                &Cancellation::new(),
                LinkRequest::new(email, device_unique_id),
            )
            .await
    }

    /// Open the latest mail sent to `email` and pull the token out of its link
    pub async fn open_link(&self, email: &str) -> String {
        let link = self
            .mailer
            .last_link_for(email)
            .await
            .expect("a sign-in link was mailed");
        flow_token_from_link(&link)
    }
}

pub fn flow_token_from_link(link: &str) -> String {
    Url::parse(link)
        .expect("link is a url")
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .expect("link carries a token")
}
