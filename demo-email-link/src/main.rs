//! Walks through a two-device email-link sign-in against a local store.
//!
//! Set `GENERIC_DATA_STORE_TYPE`/`GENERIC_DATA_STORE_URL` to use another
//! database; by default a SQLite file in the working directory is used.

use std::sync::Arc;

use dotenvy::dotenv;
use email_link_auth::{
    Cancellation, DataStore, EmailLinkAuth, EmailLinkConfig, InMemoryAccounts, LinkRequest,
    NoopExternalIdentity, connect_data_store, data_store_from_env,
};
use url::Url;

mod mailer;
mod tracing_setup;

use mailer::OutboxMailer;
use tracing_setup::init_tracing;

const DEFAULT_STORE_URL: &str = "sqlite:demo-email-link.db";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_tracing("demo_email_link");

    let data_store: Arc<dyn DataStore> = match data_store_from_env() {
        Ok(store) => store,
        Err(e) => {
            tracing::info!("{}; falling back to {}", e, DEFAULT_STORE_URL);
            connect_data_store("sqlite", DEFAULT_STORE_URL)?
        }
    };

    let accounts = Arc::new(InMemoryAccounts::new());
    let mailer = Arc::new(OutboxMailer::default());
    let auth = EmailLinkAuth::new(
        EmailLinkConfig::from_env(),
        data_store,
        accounts.clone(),
        Arc::new(NoopExternalIdentity),
        mailer.clone(),
    );
    auth.init().await?;

    let cancel = Cancellation::new();
    let email = "alice@example.com";

    // Device 1 asks for a link and displays the confirmation code
    let pending = auth
        .request_link(
            &cancel,
            LinkRequest::new(email, "laptop-1").with_client_ip("127.0.0.1"),
        )
        .await?;
    tracing::info!(code = %pending.confirmation_code, "Shown on the requesting device");

    match auth.status(&cancel, &pending.login_session_token).await {
        Err(e) => tracing::info!("Status before the link is followed: {}", e),
        Ok(_) => tracing::warn!("Status returned tokens before the link was followed"),
    }

    // Device 2 opens the mail and enters the code
    let link = mailer
        .last_link()
        .await
        .ok_or("no sign-in link was mailed")?;
    let token = Url::parse(&link)?
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .ok_or("link carries no token")?;

    let signed_in = auth
        .sign_in(&cancel, &token, &pending.confirmation_code)
        .await?;
    let claims = auth.verify_access_token(&signed_in.tokens.access_token)?;
    tracing::info!(user_id = %claims.sub, seq = claims.seq, "Signed in from the link");

    // The link already produced this sign-in's tokens; polling cannot mint more
    match auth.status(&cancel, &pending.login_session_token).await {
        Err(e) => tracing::info!("Status after the link was followed: {}", e),
        Ok(_) => tracing::warn!("Status produced a second set of tokens"),
    }

    Ok(())
}
