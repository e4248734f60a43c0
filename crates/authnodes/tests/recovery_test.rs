mod common;

use authcore::{AuthenticatorType, OnFailure, Purpose, ServiceError, TenantConfig};
use authnodes::IntentAccountRecovery;
use common::{names, Harness};
use serde_json::json;

fn on_failure(policy: OnFailure) -> TenantConfig {
    let mut config = TenantConfig::default();
    config.account_recovery.on_failure = policy;
    config
}

#[tokio::test]
async fn recovery_resets_the_password_of_a_known_account() {
    let h = Harness::new(TenantConfig::default());
    let (user, _) = h.seed_account("alice@example.com", "forgotten").await;
    let flow = h.start(IntentAccountRecovery::default()).await;
    assert_eq!(names(&flow), vec!["TakeLoginID"]);
    assert_eq!(flow.legal_next_inputs[0].pointer.to_string(), "/0");

    let flow = h
        .send(&flow, json!({"login_id": "ALICE@example.com"}))
        .await
        .unwrap();
    assert_eq!(names(&flow), vec!["TakeRecoveryCode"]);
    assert_eq!(h.backend.codes_issued().await, 1);

    let code = h
        .backend
        .last_code("alice@example.com", Purpose::AccountRecovery)
        .await
        .unwrap();
    let flow = h.send(&flow, json!({"code": code})).await.unwrap();
    assert_eq!(names(&flow), vec!["TakeNewPassword"]);

    let flow = h
        .send(&flow, json!({"new_password": "remembered now"}))
        .await
        .unwrap();

    assert!(flow.is_complete);
    let password = h
        .backend
        .authenticators()
        .await
        .into_iter()
        .find(|a| a.user_id == user.id && a.ty == AuthenticatorType::Password)
        .unwrap();
    assert_eq!(password.credential, "remembered now");
    assert_eq!(
        h.backend.event_kinds().await,
        vec!["notification.account_recovery", "user.password_reset"]
    );
}

#[tokio::test]
async fn unknown_accounts_are_ignored_silently_by_default() {
    let h = Harness::new(on_failure(OnFailure::Ignore));
    let flow = h.start(IntentAccountRecovery::default()).await;

    let flow = h
        .send(&flow, json!({"login_id": "nobody@example.com"}))
        .await
        .unwrap();

    assert_eq!(names(&flow), vec!["TakeRecoveryCode"]);
    assert_eq!(h.backend.codes_issued().await, 0);
    assert!(h.backend.event_kinds().await.is_empty());

    let err = h.send(&flow, json!({"code": "123456"})).await.unwrap_err();
    assert!(matches!(err.service_error(), Some(ServiceError::InvalidCode)));
}

#[tokio::test]
async fn unknown_accounts_fail_when_configured_to_error() {
    let h = Harness::new(on_failure(OnFailure::Error));
    let flow = h.start(IntentAccountRecovery::default()).await;

    let err = h
        .send(&flow, json!({"login_id": "nobody@example.com"}))
        .await
        .unwrap_err();

    assert!(matches!(err.service_error(), Some(ServiceError::IdentityNotFound)));
    let current = h.service.get(&h.deps, flow.flow_id).await.unwrap();
    assert_eq!(names(&current), vec!["TakeLoginID"]);
    assert_eq!(h.node_count(&flow).await, 1);
}

#[tokio::test]
async fn identification_only_searches_configured_login_id_types() {
    let h = Harness::new(on_failure(OnFailure::Error));
    let user = h.backend.seed_user().await;
    h.backend
        .seed_identity(
            user.id,
            authcore::IdentitySpec::login_id(authcore::LoginIdKeyType::Username, "alice"),
        )
        .await;
    let flow = h.start(IntentAccountRecovery::default()).await;

    let err = h
        .send(&flow, json!({"login_id": "alice"}))
        .await
        .unwrap_err();

    assert!(matches!(err.service_error(), Some(ServiceError::IdentityNotFound)));
}

#[tokio::test]
async fn sending_recovery_codes_is_rate_limited() {
    let h = Harness::new(TenantConfig::default());
    h.seed_account("alice@example.com", "forgotten").await;
    h.backend
        .set_limit("send_recovery_code:alice@example.com", 0)
        .await;
    let flow = h.start(IntentAccountRecovery::default()).await;

    let err = h
        .send(&flow, json!({"login_id": "alice@example.com"}))
        .await
        .unwrap_err();

    assert!(matches!(err.service_error(), Some(ServiceError::RateLimited { .. })));
    assert_eq!(h.backend.codes_issued().await, 0);
}
