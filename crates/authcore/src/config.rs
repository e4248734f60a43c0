use crate::{JsonPointer, LoginIdKeyType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tenant policy consulted by every flow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    pub tenant_id: String,
    /// Overrides the runtime's default flow lifetime.
    pub flow_lifetime_seconds: Option<u64>,
    pub login_id: LoginIdConfig,
    pub authentication: AuthenticationConfig,
    pub account_recovery: AccountRecoveryConfig,
    pub account_linking: AccountLinkingConfig,
    pub audit: AuditConfig,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_string(),
            flow_lifetime_seconds: None,
            login_id: LoginIdConfig::default(),
            authentication: AuthenticationConfig::default(),
            account_recovery: AccountRecoveryConfig::default(),
            account_linking: AccountLinkingConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl TenantConfig {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginIdConfig {
    pub allowed: Vec<LoginIdKeyType>,
}

impl Default for LoginIdConfig {
    fn default() -> Self {
        Self {
            allowed: vec![LoginIdKeyType::Email, LoginIdKeyType::Username],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryMethod {
    Password,
    EmailLoginLink,
    /// One-time code texted to the phone of the identity.
    OobOtpSms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryMethod {
    Totp,
    OobOtpSms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryMode {
    #[default]
    Disabled,
    /// Challenge users that already have a secondary authenticator.
    IfExists,
    /// Every user must pass a secondary factor; users without one enroll.
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    /// Offered in this order.
    pub primary: Vec<PrimaryMethod>,
    pub secondary_mode: SecondaryMode,
    /// Tried in this order; the first the user has set up is challenged.
    /// Users without any enroll the first entry when
    /// [`SecondaryMode::Required`].
    pub secondary: Vec<SecondaryMethod>,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            primary: vec![PrimaryMethod::EmailLoginLink, PrimaryMethod::Password],
            secondary_mode: SecondaryMode::Disabled,
            secondary: vec![SecondaryMethod::Totp],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnFailure {
    /// Continue without revealing that nothing matched.
    #[default]
    Ignore,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountRecoveryConfig {
    pub identification: Vec<LoginIdKeyType>,
    pub on_failure: OnFailure,
}

impl Default for AccountRecoveryConfig {
    fn default() -> Self {
        Self {
            identification: vec![LoginIdKeyType::Email],
            on_failure: OnFailure::Ignore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountLinkingAction {
    #[default]
    Error,
    LoginAndLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountLinkingOAuth {
    pub alias: String,
    /// Claim of the incoming provider identity.
    #[serde(default = "email_pointer")]
    pub oauth_claim: JsonPointer,
    /// Claim of existing identities to compare against.
    #[serde(default = "email_pointer")]
    pub user_profile: JsonPointer,
    #[serde(default)]
    pub action: AccountLinkingAction,
}

fn email_pointer() -> JsonPointer {
    JsonPointer::root().child("email")
}

impl AccountLinkingOAuth {
    /// Rule applied to a provider with no explicit configuration.
    pub fn default_for(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            oauth_claim: email_pointer(),
            user_profile: email_pointer(),
            action: AccountLinkingAction::Error,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountLinkingConfig {
    pub oauth: Vec<AccountLinkingOAuth>,
}

impl AccountLinkingConfig {
    /// Rules in `self` win; rules from `fallback` fill in providers `self`
    /// does not mention.
    pub fn merge(&self, fallback: &AccountLinkingConfig) -> AccountLinkingConfig {
        let mut oauth = self.oauth.clone();
        for rule in &fallback.oauth {
            if !oauth.iter().any(|r| r.alias == rule.alias) {
                oauth.push(rule.clone());
            }
        }
        AccountLinkingConfig { oauth }
    }

    pub fn oauth_rule(&self, alias: &str) -> AccountLinkingOAuth {
        self.oauth
            .iter()
            .find(|r| r.alias == alias)
            .cloned()
            .unwrap_or_else(|| AccountLinkingOAuth::default_for(alias))
    }
}

/// Per-kind overrides of the audit flag events carry by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub overrides: BTreeMap<String, bool>,
}

impl AuditConfig {
    pub fn is_audited(&self, kind: &str, default: bool) -> bool {
        self.overrides.get(kind).copied().unwrap_or(default)
    }
}
