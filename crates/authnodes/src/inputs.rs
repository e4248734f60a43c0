//! Inputs accepted by the built-in flows, and their schemas.

use authcore::{
    Dependencies, FlowError, IdentitySpec, Input, InputSchema, LoginIdKeyType, Schema, TypedSchema,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct InputSelectPassword {
    pub authentication: String,
}
impl Input for InputSelectPassword {}

#[derive(Debug, Deserialize)]
pub struct InputSelectEmailLoginLink {
    pub authentication: String,
}
impl Input for InputSelectEmailLoginLink {}

#[derive(Debug, Deserialize)]
pub struct InputSelectOOBOTPSMS {
    pub authentication: String,
}
impl Input for InputSelectOOBOTPSMS {}

#[derive(Debug, Deserialize)]
pub struct InputTakeLoginID {
    pub login_id: String,
}
impl Input for InputTakeLoginID {}

#[derive(Debug, Deserialize)]
pub struct InputTakeOAuthIdentity {
    pub alias: String,
    pub subject_id: String,
    #[serde(default)]
    pub claims: serde_json::Value,
}
impl Input for InputTakeOAuthIdentity {}

#[derive(Debug, Deserialize)]
pub struct InputTakeBiometric {
    pub key_id: String,
}
impl Input for InputTakeBiometric {}

#[derive(Debug, Deserialize)]
pub struct InputTakePassword {
    pub password: String,
}
impl Input for InputTakePassword {}

#[derive(Debug, Deserialize)]
pub struct InputTakeNewPassword {
    pub new_password: String,
}
impl Input for InputTakeNewPassword {}

/// A one-time code: TOTP, SMS or account recovery.
#[derive(Debug, Deserialize)]
pub struct InputTakeCode {
    pub code: String,
}
impl Input for InputTakeCode {}

#[derive(Debug, Deserialize)]
pub struct InputCheckLoginLink {
    pub check: bool,
}
impl Input for InputCheckLoginLink {}

fn select(method: &'static str) -> Schema {
    Schema::object()
        .property("authentication", Schema::constant(method))
        .required(["authentication"])
}

pub fn select_password() -> Box<dyn InputSchema> {
    TypedSchema::<InputSelectPassword>::boxed("SelectPassword", select("password"))
}

pub fn select_email_login_link() -> Box<dyn InputSchema> {
    TypedSchema::<InputSelectEmailLoginLink>::boxed("SelectEmailLoginLink", select("email_login_link"))
}

pub fn select_oob_otp_sms() -> Box<dyn InputSchema> {
    TypedSchema::<InputSelectOOBOTPSMS>::boxed("SelectOOBOTPSMS", select("oob_otp_sms"))
}

pub fn take_login_id() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeLoginID>::boxed(
        "TakeLoginID",
        Schema::object()
            .property("login_id", Schema::string().min_length(1))
            .required(["login_id"]),
    )
}

pub fn take_oauth_identity() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeOAuthIdentity>::boxed(
        "TakeOAuthIdentity",
        Schema::object()
            .property("alias", Schema::string().min_length(1))
            .property("subject_id", Schema::string().min_length(1))
            .property("claims", Schema::object())
            .required(["alias", "subject_id"]),
    )
}

pub fn take_biometric() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeBiometric>::boxed(
        "TakeBiometric",
        Schema::object()
            .property("key_id", Schema::string().min_length(1))
            .required(["key_id"]),
    )
}

pub fn take_password() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakePassword>::boxed(
        "TakePassword",
        Schema::object()
            .property("password", Schema::string())
            .required(["password"]),
    )
}

pub fn take_new_password() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeNewPassword>::boxed(
        "TakeNewPassword",
        Schema::object()
            .property("new_password", Schema::string().min_length(8))
            .required(["new_password"]),
    )
}

fn code() -> Schema {
    Schema::object()
        .property("code", Schema::string().min_length(6).max_length(6))
        .required(["code"])
}

pub fn take_totp_code() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeCode>::boxed("TakeTOTPCode", code())
}

pub fn take_oob_otp_code() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeCode>::boxed("TakeOOBOTPCode", code())
}

pub fn take_recovery_code() -> Box<dyn InputSchema> {
    TypedSchema::<InputTakeCode>::boxed("TakeRecoveryCode", code())
}

pub fn check_login_link() -> Box<dyn InputSchema> {
    TypedSchema::<InputCheckLoginLink>::boxed(
        "CheckLoginLinkVerified",
        Schema::object()
            .property("check", Schema::constant(true))
            .required(["check"]),
    )
}

/// Key type a raw login ID would be stored under.
pub fn detect_key_type(login_id: &str) -> LoginIdKeyType {
    let is_phone = login_id
        .strip_prefix('+')
        .map_or(false, |d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()));
    if login_id.contains('@') {
        LoginIdKeyType::Email
    } else if is_phone {
        LoginIdKeyType::Phone
    } else {
        LoginIdKeyType::Username
    }
}

/// Normalizes a raw login ID and checks its type is enabled for the tenant.
pub fn login_id_spec(deps: &Dependencies, raw: &str) -> Result<IdentitySpec, FlowError> {
    let value = raw.trim();
    let key_type = detect_key_type(value);
    if !deps.config.login_id.allowed.contains(&key_type) {
        return Err(FlowError::invariant(
            "LoginIDTypeNotAllowed",
            format!("login ID type {:?} is not enabled", key_type),
        ));
    }
    let value = match key_type {
        LoginIdKeyType::Email => value.to_lowercase(),
        _ => value.to_string(),
    };
    Ok(IdentitySpec::login_id(key_type, value))
}
