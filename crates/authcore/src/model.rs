use crate::JsonPointer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginIdKeyType {
    Email,
    Phone,
    Username,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityType {
    LoginId,
    OAuth,
    Biometric,
}

/// What identifies a user, independent of any stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdentitySpec {
    LoginId {
        key_type: LoginIdKeyType,
        value: String,
    },
    #[serde(rename = "oauth")]
    OAuth {
        alias: String,
        subject_id: String,
        /// Standard claims returned by the provider.
        #[serde(default)]
        claims: Value,
    },
    Biometric { key_id: String },
}

impl IdentitySpec {
    pub fn login_id(key_type: LoginIdKeyType, value: impl Into<String>) -> Self {
        IdentitySpec::LoginId {
            key_type,
            value: value.into(),
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        match self {
            IdentitySpec::LoginId { .. } => IdentityType::LoginId,
            IdentitySpec::OAuth { .. } => IdentityType::OAuth,
            IdentitySpec::Biometric { .. } => IdentityType::Biometric,
        }
    }

    /// Standard claims carried by this identity.
    pub fn claims(&self) -> Value {
        match self {
            IdentitySpec::LoginId {
                key_type: LoginIdKeyType::Email,
                value,
            } => json!({ "email": value }),
            IdentitySpec::LoginId {
                key_type: LoginIdKeyType::Phone,
                value,
            } => json!({ "phone_number": value }),
            IdentitySpec::LoginId {
                key_type: LoginIdKeyType::Username,
                value,
            } => json!({ "preferred_username": value }),
            IdentitySpec::OAuth { claims, .. } => claims.clone(),
            IdentitySpec::Biometric { .. } => json!({}),
        }
    }

    /// The string claim at `pointer`, if present and non-empty.
    pub fn claim(&self, pointer: &JsonPointer) -> Option<String> {
        let claims = self.claims();
        pointer
            .traverse(&claims)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Whether two specs denote the same identity.
    pub fn same_identity(&self, other: &IdentitySpec) -> bool {
        match (self, other) {
            (
                IdentitySpec::LoginId { key_type, value },
                IdentitySpec::LoginId {
                    key_type: other_type,
                    value: other_value,
                },
            ) => key_type == other_type && value.eq_ignore_ascii_case(other_value),
            (
                IdentitySpec::OAuth {
                    alias, subject_id, ..
                },
                IdentitySpec::OAuth {
                    alias: other_alias,
                    subject_id: other_subject,
                    ..
                },
            ) => alias == other_alias && subject_id == other_subject,
            (
                IdentitySpec::Biometric { key_id },
                IdentitySpec::Biometric { key_id: other_key },
            ) => key_id == other_key,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub spec: IdentitySpec,
}

impl IdentityInfo {
    pub fn new(user_id: Uuid, spec: IdentitySpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            spec,
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        self.spec.identity_type()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorKind {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorType {
    Password,
    OobEmail,
    OobSms,
    Totp,
}

impl AuthenticatorType {
    /// Authentication method reference recorded on sessions.
    pub fn amr(self) -> &'static str {
        match self {
            AuthenticatorType::Password => "pwd",
            AuthenticatorType::OobEmail => "email",
            AuthenticatorType::OobSms => "sms",
            AuthenticatorType::Totp => "otp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatorInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: AuthenticatorKind,
    #[serde(rename = "type")]
    pub ty: AuthenticatorType,
    /// Password, TOTP secret or OOB target, depending on `ty`. Opaque to the
    /// engine.
    pub credential: String,
}

impl AuthenticatorInfo {
    pub fn new(
        user_id: Uuid,
        kind: AuthenticatorKind,
        ty: AuthenticatorType,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            ty,
            credential: credential.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amr: Vec<String>,
    pub authenticated_at: DateTime<Utc>,
}

/// What a verification code is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    LoginLink,
    AccountRecovery,
    OobOtp,
}

impl Purpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Purpose::LoginLink => "login_link",
            Purpose::AccountRecovery => "account_recovery",
            Purpose::OobOtp => "oob_otp",
        }
    }
}
