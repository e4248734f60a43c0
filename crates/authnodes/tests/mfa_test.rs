mod common;

use authcore::{AuthenticatorType, SecondaryMode, ServiceError, TenantConfig};
use authnodes::{IntentEnrollTOTP, IntentLogin};
use authruntime::memory::totp_code;
use common::{names, Harness};
use serde_json::json;

fn with_secondary(mode: SecondaryMode) -> TenantConfig {
    let mut config = TenantConfig::default();
    config.authentication.secondary_mode = mode;
    config
}

fn wrong_code(secret: &str) -> &'static str {
    if totp_code(secret) == "123456" {
        "654321"
    } else {
        "123456"
    }
}

async fn past_password(h: &Harness, flow: &authruntime::FlowOutput) -> authruntime::FlowOutput {
    let flow = h
        .send(flow, json!({"authentication": "password"}))
        .await
        .unwrap();
    h.send(&flow, json!({"password": "correct-horse"}))
        .await
        .unwrap()
}

#[tokio::test]
async fn existing_totp_is_challenged_when_configured_if_exists() {
    let h = Harness::new(with_secondary(SecondaryMode::IfExists));
    let (user, identity) = h.seed_account("alice@example.com", "correct-horse").await;
    h.backend.seed_totp(user.id, "totp-secret").await;
    let flow = h.start(IntentLogin { identity }).await;

    let flow = past_password(&h, &flow).await;
    assert_eq!(names(&flow), vec!["TakeTOTPCode"]);
    assert_eq!(flow.legal_next_inputs[0].pointer.to_string(), "/1");

    let err = h
        .send(&flow, json!({"code": wrong_code("totp-secret")}))
        .await
        .unwrap_err();
    assert!(matches!(err.service_error(), Some(ServiceError::InvalidCredentials)));

    let flow = h
        .send(&flow, json!({"code": totp_code("totp-secret")}))
        .await
        .unwrap();
    assert!(flow.is_complete);
    assert_eq!(h.backend.sessions().await[0].amr, vec!["pwd", "otp", "mfa"]);
}

#[tokio::test]
async fn users_without_totp_skip_the_secondary_step_if_exists() {
    let h = Harness::new(with_secondary(SecondaryMode::IfExists));
    let (_, identity) = h.seed_account("alice@example.com", "correct-horse").await;
    let flow = h.start(IntentLogin { identity }).await;

    let flow = past_password(&h, &flow).await;

    assert!(flow.is_complete);
    assert_eq!(h.backend.sessions().await[0].amr, vec!["pwd"]);
}

#[tokio::test]
async fn required_secondary_enrolls_users_without_totp() {
    let h = Harness::new(with_secondary(SecondaryMode::Required));
    let (user, identity) = h.seed_account("alice@example.com", "correct-horse").await;
    let flow = h.start(IntentLogin { identity }).await;

    let flow = past_password(&h, &flow).await;
    assert_eq!(names(&flow), vec!["TakeTOTPCode"]);
    let secret = flow.data_of("IntentEnrollTOTP").unwrap()["secret"]
        .as_str()
        .unwrap()
        .to_string();

    let flow = h
        .send(&flow, json!({"code": totp_code(&secret)}))
        .await
        .unwrap();

    assert!(flow.is_complete);
    assert!(h
        .backend
        .authenticators()
        .await
        .iter()
        .any(|a| a.user_id == user.id && a.ty == AuthenticatorType::Totp && a.credential == secret));
    assert_eq!(h.backend.sessions().await[0].amr, vec!["pwd", "otp", "mfa"]);
    assert_eq!(
        h.backend.event_kinds().await,
        vec!["authenticator.created", "user.authenticated"]
    );
}

#[tokio::test]
async fn standalone_enrollment_rejects_wrong_codes() {
    let h = Harness::new(TenantConfig::default());
    let user = h.backend.seed_user().await;
    let intent = IntentEnrollTOTP::new(user.id);
    let secret = intent.secret.clone();
    let flow = h.start(intent).await;
    assert_eq!(flow.data_of("IntentEnrollTOTP").unwrap()["secret"], secret);

    let err = h
        .send(&flow, json!({"code": wrong_code(&secret)}))
        .await
        .unwrap_err();
    assert!(matches!(err.service_error(), Some(ServiceError::InvalidCode)));
    assert!(h.backend.authenticators().await.is_empty());

    let flow = h
        .send(&flow, json!({"code": totp_code(&secret)}))
        .await
        .unwrap();
    assert!(flow.is_complete);
    assert!(flow.data_of("IntentEnrollTOTP").is_none());
    assert_eq!(h.backend.authenticators().await.len(), 1);
}
