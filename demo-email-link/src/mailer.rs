use async_trait::async_trait;
use email_link_auth::{CollaboratorError, LinkMailer};
use tokio::sync::Mutex;

/// Logs outgoing mail and keeps the last link so the demo can "click" it
#[derive(Default)]
pub(crate) struct OutboxMailer {
    last_link: Mutex<Option<String>>,
}

impl OutboxMailer {
    pub(crate) async fn last_link(&self) -> Option<String> {
        self.last_link.lock().await.clone()
    }
}

#[async_trait]
impl LinkMailer for OutboxMailer {
    async fn send_sign_in_link(&self, email: &str, link: &str) -> Result<(), CollaboratorError> {
        tracing::info!(to = email, link, "Sign-in mail");
        *self.last_link.lock().await = Some(link.to_string());
        Ok(())
    }

    async fn send_email_changed(
        &self,
        notify_email: &str,
        old_email: &str,
        new_email: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(to = notify_email, old_email, new_email, "Email changed mail");
        Ok(())
    }
}
