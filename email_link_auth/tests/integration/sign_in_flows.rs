use email_link_auth::{
    Cancellation, EmailLinkError, IDENTITY_CLAIM, LinkRequest, SentMail, SignInStatus,
};

use crate::common::TestApp;

/// Request on one device, follow the link on another
#[tokio::test]
async fn test_two_device_sign_in() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();

    // Device 1 asks for a link and shows the code
    let pending = app.request_link("Alice@Example.com", "phone-1").await?;
    assert!(matches!(
        app.auth.status(&cancel, &pending.login_session_token).await,
        Err(EmailLinkError::StatusNotVerified)
    ));

    // Device 2 opens the mail and types the code
    let flow_token = app.open_link("alice@example.com").await;
    let signed_in = app
        .auth
        .sign_in(&cancel, &flow_token, &pending.confirmation_code)
        .await?;

    let access = app.auth.verify_access_token(&signed_in.tokens.access_token)?;
    assert_eq!(access.email, "alice@example.com");
    assert_eq!(access.device_unique_id, "phone-1");
    assert_eq!(access.seq, 1);
    assert_eq!(access.metadata.get_str(IDENTITY_CLAIM), Some(access.sub.as_str()));

    // The link produced its tokens; polling from device 1 cannot mint more
    assert!(matches!(
        app.auth.status(&cancel, &pending.login_session_token).await,
        Err(EmailLinkError::NoPendingLoginSession)
    ));

    let record = app
        .auth
        .sign_in_record(&cancel, "alice@example.com", "phone-1")
        .await?;
    assert_eq!(record.status, SignInStatus::Consumed);
    assert_eq!(record.otp, None);

    Ok(())
}

#[tokio::test]
async fn test_link_cannot_be_replayed() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();
    let pending = app.request_link("alice@example.com", "phone-1").await?;
    let flow_token = app.open_link("alice@example.com").await;

    app.auth
        .sign_in(&cancel, &flow_token, &pending.confirmation_code)
        .await?;
    let replay = app
        .auth
        .sign_in(&cancel, &flow_token, &pending.confirmation_code)
        .await;

    assert!(matches!(replay, Err(EmailLinkError::NoPendingLoginSession)));
    Ok(())
}

#[tokio::test]
async fn test_new_sign_in_supersedes_refresh_token() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();

    let first = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;
    let old = app
        .auth
        .sign_in(&cancel, &token, &first.confirmation_code)
        .await?;
    app.auth
        .verify_refresh_token(&cancel, &old.tokens.refresh_token)
        .await?;

    let second = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;
    let new = app
        .auth
        .sign_in(&cancel, &token, &second.confirmation_code)
        .await?;

    let refreshed = app
        .auth
        .verify_refresh_token(&cancel, &new.tokens.refresh_token)
        .await?;
    assert_eq!(refreshed.seq, 2);
    assert!(matches!(
        app.auth
            .verify_refresh_token(&cancel, &old.tokens.refresh_token)
            .await,
        Err(EmailLinkError::InvalidToken(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_renewed_link_invalidates_old_code() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();

    let first = app.request_link("alice@example.com", "phone-1").await?;
    let second = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;

    if first.confirmation_code != second.confirmation_code {
        let stale = app
            .auth
            .sign_in(&cancel, &token, &first.confirmation_code)
            .await;
        assert!(stale.unwrap_err().has(|e| matches!(e, EmailLinkError::WrongCode)));
    }

    app.auth
        .sign_in(&cancel, &token, &second.confirmation_code)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_email_change_moves_account() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();
    app.accounts.insert("usr_alice", "alice@old.com").await;

    let pending = app
        .auth
        .request_link(
            &cancel,
            LinkRequest::new("alice@new.com", "phone-1")
                .with_email_change("alice@old.com", Some("alice@old.com".to_string())),
        )
        .await?;
    let token = app.open_link("alice@new.com").await;
    let signed_in = app
        .auth
        .sign_in(&cancel, &token, &pending.confirmation_code)
        .await?;

    assert!(signed_in.email_confirmed);
    let access = app.auth.verify_access_token(&signed_in.tokens.access_token)?;
    assert_eq!(access.sub, "usr_alice");
    assert_eq!(access.email, "alice@new.com");
    assert_eq!(
        app.accounts.email_of("usr_alice").await.as_deref(),
        Some("alice@new.com")
    );
    assert!(app.mailer.sent().await.contains(&SentMail::EmailChanged {
        to: "alice@old.com".to_string(),
        old_email: "alice@old.com".to_string(),
        new_email: "alice@new.com".to_string(),
    }));
    Ok(())
}

#[tokio::test]
async fn test_phone_migration_keeps_user_id() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();
    app.accounts.insert("usr_phone", "").await;

    let pending = app
        .auth
        .request_link(
            &cancel,
            LinkRequest::new("bob@example.com", "phone-1").with_phone_migration("usr_phone"),
        )
        .await?;
    let token = app.open_link("bob@example.com").await;
    let signed_in = app
        .auth
        .sign_in(&cancel, &token, &pending.confirmation_code)
        .await?;

    assert!(!signed_in.email_confirmed);
    let access = app.auth.verify_access_token(&signed_in.tokens.access_token)?;
    assert_eq!(access.sub, "usr_phone");
    assert_eq!(
        app.accounts.email_of("usr_phone").await.as_deref(),
        Some("bob@example.com")
    );
    Ok(())
}
