use crate::authenticator::NodeOAuthAuthenticated;
use crate::inputs::{self, InputSelectEmailLoginLink, InputSelectOOBOTPSMS, InputSelectPassword};
use crate::login_link::IntentAuthenticateEmailLoginLink;
use crate::milestones::{PrimaryAuthenticated, SessionCreated};
use crate::oob_otp::IntentAuthenticateOOBOTPPhone;
use crate::options::{mask_email, mask_phone, AuthenticateOption};
use crate::password::IntentAuthenticatePassword;
use crate::session::NodeDoCreateSession;
use crate::totp::{IntentAuthenticateTOTP, IntentEnrollTOTP};
use async_trait::async_trait;
use authcore::reactor::{to_node, to_sub_flow};
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Dependencies, Edge, FlowError, Flows,
    IdentityInfo, IdentitySpec, Input, InputSchema, Intent, JsonPointer, Kind, PrimaryMethod,
    Reaction, Reactor, SecondaryMethod, SecondaryMode, ServiceError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Logs in the owner of a known identity: one primary factor, a secondary
/// factor when the tenant asks for it, then a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentLogin {
    pub identity: IdentityInfo,
}

impl IntentLogin {
    fn user_id(&self) -> Uuid {
        self.identity.user_id
    }

    fn primary_schemas(&self, deps: &Dependencies) -> Vec<Box<dyn InputSchema>> {
        deps.config
            .authentication
            .primary
            .iter()
            .map(|method| match method {
                PrimaryMethod::Password => inputs::select_password(),
                PrimaryMethod::EmailLoginLink => inputs::select_email_login_link(),
                PrimaryMethod::OobOtpSms => inputs::select_oob_otp_sms(),
            })
            .collect()
    }

    /// Address a login link is mailed to.
    fn email_target(&self, authenticators: &[AuthenticatorInfo]) -> Option<String> {
        self.identity
            .spec
            .claim(&JsonPointer::root().child("email"))
            .or_else(|| {
                authenticators
                    .iter()
                    .find(|a| a.ty == AuthenticatorType::OobEmail)
                    .map(|a| a.credential.clone())
            })
    }

    /// Number a primary SMS code is texted to.
    fn phone_target(&self, authenticators: &[AuthenticatorInfo]) -> Option<String> {
        self.identity
            .spec
            .claim(&JsonPointer::root().child("phone_number"))
            .or_else(|| {
                authenticators
                    .iter()
                    .find(|a| a.ty == AuthenticatorType::OobSms && a.kind == AuthenticatorKind::Primary)
                    .map(|a| a.credential.clone())
            })
    }

    /// The configured primary methods, with where each OOB method would
    /// deliver to. Methods without a delivery target are left out.
    async fn primary_options(&self, deps: &Dependencies) -> Result<Vec<AuthenticateOption>, FlowError> {
        let authenticators = deps.authenticators.list_by_user(self.user_id()).await?;
        let options = deps
            .config
            .authentication
            .primary
            .iter()
            .filter_map(|method| match method {
                PrimaryMethod::Password => Some(AuthenticateOption::plain("password")),
                PrimaryMethod::EmailLoginLink => self
                    .email_target(&authenticators)
                    .map(|t| AuthenticateOption::masked("email_login_link", mask_email(&t))),
                PrimaryMethod::OobOtpSms => self
                    .phone_target(&authenticators)
                    .map(|t| AuthenticateOption::masked("oob_otp_sms", mask_phone(&t))),
            })
            .collect();
        Ok(options)
    }

    async fn select_primary(
        &self,
        deps: &Dependencies,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        if let IdentitySpec::OAuth { alias, .. } = &self.identity.spec {
            return Ok(to_node(NodeOAuthAuthenticated {
                user_id: self.user_id(),
                alias: alias.clone(),
            }));
        }

        let authenticators = deps.authenticators.list_by_user(self.user_id()).await?;
        if input.map_or(false, |i| i.is::<InputSelectPassword>()) {
            if !authenticators.iter().any(|a| a.ty == AuthenticatorType::Password) {
                return Err(ServiceError::NoAuthenticator.into());
            }
            return Ok(to_sub_flow(IntentAuthenticatePassword {
                user_id: self.user_id(),
            }));
        }
        if input.map_or(false, |i| i.is::<InputSelectEmailLoginLink>()) {
            let target = self
                .email_target(&authenticators)
                .ok_or(ServiceError::NoAuthenticator)?;
            return Ok(to_sub_flow(IntentAuthenticateEmailLoginLink {
                user_id: self.user_id(),
                target,
            }));
        }
        if input.map_or(false, |i| i.is::<InputSelectOOBOTPSMS>()) {
            let target = self
                .phone_target(&authenticators)
                .ok_or(ServiceError::NoAuthenticator)?;
            return Ok(to_sub_flow(IntentAuthenticateOOBOTPPhone {
                user_id: self.user_id(),
                target,
                kind: AuthenticatorKind::Primary,
            }));
        }
        Err(FlowError::UnexpectedInput { reactor: Self::KIND })
    }

    /// Challenges the first configured secondary method the user has set
    /// up. Without any, enrolls TOTP when required, or goes straight to the
    /// session.
    async fn select_secondary(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let authentication = &deps.config.authentication;
        let user_id = self.user_id();
        if authentication.secondary_mode == SecondaryMode::Disabled {
            return Ok(to_node(NodeDoCreateSession::new(deps, flows.nearest, user_id)));
        }

        let authenticators = deps.authenticators.list_by_user(user_id).await?;
        for method in &authentication.secondary {
            match method {
                SecondaryMethod::Totp => {
                    if authenticators.iter().any(|a| a.ty == AuthenticatorType::Totp) {
                        return Ok(to_sub_flow(IntentAuthenticateTOTP { user_id }));
                    }
                }
                SecondaryMethod::OobOtpSms => {
                    let phone = authenticators.iter().find(|a| {
                        a.ty == AuthenticatorType::OobSms && a.kind == AuthenticatorKind::Secondary
                    });
                    if let Some(phone) = phone {
                        return Ok(to_sub_flow(IntentAuthenticateOOBOTPPhone {
                            user_id,
                            target: phone.credential.clone(),
                            kind: AuthenticatorKind::Secondary,
                        }));
                    }
                }
            }
        }

        if authentication.secondary_mode == SecondaryMode::Required {
            if !authentication.secondary.contains(&SecondaryMethod::Totp) {
                return Err(ServiceError::NoAuthenticator.into());
            }
            return Ok(to_sub_flow(IntentEnrollTOTP::new(user_id)));
        }
        Ok(to_node(NodeDoCreateSession::new(deps, flows.nearest, user_id)))
    }
}

impl Kind for IntentLogin {
    const KIND: &'static str = "IntentLogin";
}

#[async_trait]
impl Reactor for IntentLogin {
    async fn can_react_to(&self, deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        let graph = flows.nearest;
        if graph.has_milestone::<SessionCreated>() {
            return Ok(Reaction::Done);
        }
        if graph.nodes().is_empty() {
            return Ok(match self.identity.spec {
                IdentitySpec::OAuth { .. } => Reaction::Auto,
                _ => Reaction::Inputs(self.primary_schemas(deps)),
            });
        }
        Ok(Reaction::Auto)
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let graph = flows.nearest;
        if graph.nodes().is_empty() {
            return self.select_primary(deps, input).await;
        }
        if !graph.has_milestone::<PrimaryAuthenticated>() {
            return Err(FlowError::invariant(
                "PrimaryAuthenticationMissing",
                "login has no passed primary factor",
            ));
        }
        if graph.nodes().len() == 1 {
            self.select_secondary(deps, flows).await
        } else {
            Ok(to_node(NodeDoCreateSession::new(deps, graph, self.user_id())))
        }
    }

    async fn output_data(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
    ) -> Result<Option<serde_json::Value>, FlowError> {
        if !flows.nearest.nodes().is_empty() || matches!(self.identity.spec, IdentitySpec::OAuth { .. }) {
            return Ok(None);
        }
        let options = self.primary_options(deps).await?;
        Ok(Some(json!({ "options": options })))
    }
}

impl Intent for IntentLogin {}
