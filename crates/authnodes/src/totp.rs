use crate::authenticator::{NodeAuthenticated, NodeDoCreateAuthenticator};
use crate::inputs::{self, InputTakeCode};
use async_trait::async_trait;
use authcore::reactor::to_node;
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Dependencies, Edge, FlowError, Flows,
    Input, Intent, Kind, Reaction, Reactor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

fn take_code<'a>(
    input: Option<&'a dyn Input>,
    reactor: &'static str,
) -> Result<&'a InputTakeCode, FlowError> {
    input
        .and_then(|i| i.downcast_ref::<InputTakeCode>())
        .ok_or(FlowError::UnexpectedInput { reactor })
}

/// Challenges an existing TOTP authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAuthenticateTOTP {
    pub user_id: Uuid,
}

impl Kind for IntentAuthenticateTOTP {
    const KIND: &'static str = "IntentAuthenticateTOTP";
}

#[async_trait]
impl Reactor for IntentAuthenticateTOTP {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Reaction::Inputs(vec![inputs::take_totp_code()]))
        } else {
            Ok(Reaction::Done)
        }
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        _flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let take = take_code(input, Self::KIND)?;
        deps.rate_limiter
            .consume(&format!("verify_totp:{}", self.user_id))
            .await?;
        let info = deps
            .authenticators
            .verify(self.user_id, AuthenticatorType::Totp, &take.code)
            .await?;
        Ok(to_node(NodeAuthenticated::new(&info)))
    }
}

impl Intent for IntentAuthenticateTOTP {}

/// Sets up a TOTP authenticator. Usable standalone or as the secondary step
/// of a login when the tenant requires one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentEnrollTOTP {
    pub user_id: Uuid,
    pub secret: String,
}

impl IntentEnrollTOTP {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            secret: Uuid::new_v4().simple().to_string(),
        }
    }
}

impl Kind for IntentEnrollTOTP {
    const KIND: &'static str = "IntentEnrollTOTP";
}

#[async_trait]
impl Reactor for IntentEnrollTOTP {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Reaction::Inputs(vec![inputs::take_totp_code()]))
        } else {
            Ok(Reaction::Done)
        }
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        _flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let take = take_code(input, Self::KIND)?;
        deps.authenticators.check_totp(&self.secret, &take.code).await?;
        Ok(to_node(NodeDoCreateAuthenticator::new(AuthenticatorInfo::new(
            self.user_id,
            AuthenticatorKind::Secondary,
            AuthenticatorType::Totp,
            self.secret.clone(),
        ))))
    }

    async fn output_data(
        &self,
        _deps: &Dependencies,
        flows: Flows<'_>,
    ) -> Result<Option<serde_json::Value>, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Some(json!({ "secret": self.secret })))
        } else {
            Ok(None)
        }
    }
}

impl Intent for IntentEnrollTOTP {}
