use chrono::Duration;
use email_link_auth::{Cancellation, EmailLinkConfig, EmailLinkError, LinkRequest};

use crate::common::TestApp;

/// Ten wrong codes block the record; the right code is refused afterwards
#[tokio::test]
async fn test_wrong_codes_block_the_record() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();
    let max = app.auth.config().max_wrong_attempts;

    let pending = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;
    let wrong = if pending.confirmation_code == "000000" {
        "111111"
    } else {
        "000000"
    };

    for attempt in 1..=max {
        let err = app
            .auth
            .sign_in(&cancel, &token, wrong)
            .await
            .expect_err("wrong code");
        assert!(err.has(|e| matches!(e, EmailLinkError::WrongCode)));
        assert_eq!(
            err.has(|e| matches!(e, EmailLinkError::AttemptsExceeded)),
            attempt == max,
            "attempt {attempt}"
        );
    }

    let record = app
        .auth
        .sign_in_record(&cancel, "alice@example.com", "phone-1")
        .await?;
    assert_eq!(record.confirmation_code_wrong_attempts_count, max);
    assert!(record.blocked_until.is_some());

    let blocked = app
        .auth
        .sign_in(&cancel, &token, &pending.confirmation_code)
        .await;
    assert!(matches!(blocked, Err(EmailLinkError::AttemptsExceeded)));

    // A fresh link is refused while the block holds
    assert!(matches!(
        app.request_link("alice@example.com", "phone-1").await,
        Err(EmailLinkError::AttemptsExceeded)
    ));

    // Other devices are not affected
    app.request_link("alice@example.com", "phone-2").await?;
    Ok(())
}

#[tokio::test]
async fn test_per_ip_budget() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::with_config(EmailLinkConfig {
        max_attempts_per_ip: 2,
        same_ip_rate_check_period: Duration::hours(24),
        ..Default::default()
    })
    .await?;
    let cancel = Cancellation::new();

    for device in ["d1", "d2"] {
        app.auth
            .request_link(
                &cancel,
                LinkRequest::new("alice@example.com", device).with_client_ip("203.0.113.7"),
            )
            .await?;
    }

    let over = app
        .auth
        .request_link(
            &cancel,
            LinkRequest::new("bob@example.com", "d3").with_client_ip("203.0.113.7"),
        )
        .await;
    assert!(matches!(over, Err(EmailLinkError::TooManyAttempts)));

    // Requests without a client address are not counted
    app.request_link("bob@example.com", "d3").await?;
    Ok(())
}

#[tokio::test]
async fn test_completed_sign_in_returns_ip_budget() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::with_config(EmailLinkConfig {
        max_attempts_per_ip: 1,
        same_ip_rate_check_period: Duration::hours(24),
        ..Default::default()
    })
    .await?;
    let cancel = Cancellation::new();
    let request =
        || LinkRequest::new("alice@example.com", "phone-1").with_client_ip("203.0.113.7");

    let pending = app.auth.request_link(&cancel, request()).await?;
    let token = app.open_link("alice@example.com").await;
    app.auth
        .sign_in(&cancel, &token, &pending.confirmation_code)
        .await?;

    // The attempt was refunded, so the address may ask again
    app.auth.request_link(&cancel, request()).await?;
    Ok(())
}

#[tokio::test]
async fn test_cancelled_operations_do_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let pending = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;

    let cancel = Cancellation::new();
    cancel.cancel();
    assert!(cancel.is_cancelled());

    assert!(matches!(
        app.auth
            .request_link(&cancel, LinkRequest::new("bob@example.com", "phone-9"))
            .await,
        Err(EmailLinkError::Cancelled)
    ));
    assert!(matches!(
        app.auth
            .sign_in(&cancel, &token, &pending.confirmation_code)
            .await,
        Err(EmailLinkError::Cancelled)
    ));
    assert!(matches!(
        app.auth.status(&cancel, &pending.login_session_token).await,
        Err(EmailLinkError::Cancelled)
    ));

    // The untouched link still works
    app.auth
        .sign_in(&Cancellation::new(), &token, &pending.confirmation_code)
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_tampered_tokens_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let app = TestApp::start().await?;
    let cancel = Cancellation::new();
    let pending = app.request_link("alice@example.com", "phone-1").await?;
    let token = app.open_link("alice@example.com").await;

    let mut tampered = token.clone();
    tampered.push('x');
    assert!(matches!(
        app.auth
            .sign_in(&cancel, &tampered, &pending.confirmation_code)
            .await,
        Err(EmailLinkError::InvalidToken(_))
    ));

    // A status-poll token is not a link token
    assert!(matches!(
        app.auth
            .sign_in(&cancel, &pending.login_session_token, &pending.confirmation_code)
            .await,
        Err(EmailLinkError::InvalidToken(_))
    ));

    let other = TestApp::with_config(EmailLinkConfig {
        email_validation: email_link_auth::TokenConfig::new("another-secret", Duration::minutes(10)),
        ..Default::default()
    })
    .await?;
    assert!(matches!(
        other
            .auth
            .sign_in(&cancel, &token, &pending.confirmation_code)
            .await,
        Err(EmailLinkError::InvalidToken(_))
    ));
    Ok(())
}
