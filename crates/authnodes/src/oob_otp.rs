//! One-time codes texted to a phone number.
//!
//! Serves both as a primary factor (phone login IDs) and as a secondary one.

use crate::authenticator::NodeAuthenticated;
use crate::inputs::{self, InputTakeCode};
use crate::milestones::OOBOTPSent;
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::reactor::to_node;
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Demand, Dependencies, Edge, FlowError,
    Flows, Input, Intent, Kind, Node, Purpose, Reaction, Reactor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAuthenticateOOBOTPPhone {
    pub user_id: Uuid,
    pub target: String,
    pub kind: AuthenticatorKind,
}

impl Kind for IntentAuthenticateOOBOTPPhone {
    const KIND: &'static str = "IntentAuthenticateOOBOTPPhone";
}

#[async_trait]
impl Reactor for IntentAuthenticateOOBOTPPhone {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        match flows.nearest.nodes().len() {
            0 => Ok(Reaction::Auto),
            1 => Ok(Reaction::Inputs(vec![inputs::take_oob_otp_code()])),
            _ => Ok(Reaction::Done),
        }
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        if !flows.nearest.has_milestone::<OOBOTPSent>() {
            return Ok(to_node(NodeDoSendOOBOTP {
                target: self.target.clone(),
            }));
        }

        let take = input
            .and_then(|i| i.downcast_ref::<InputTakeCode>())
            .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?;
        deps.rate_limiter
            .consume(&format!("verify_oob_otp:{}", self.target))
            .await?;
        deps.verification
            .verify_code(&self.target, Purpose::OobOtp, &take.code)
            .await?;

        let existing = deps
            .authenticators
            .list_by_user(self.user_id)
            .await?
            .into_iter()
            .find(|a| {
                a.ty == AuthenticatorType::OobSms && a.kind == self.kind && a.credential == self.target
            });
        let info = existing.unwrap_or_else(|| {
            AuthenticatorInfo::new(
                self.user_id,
                self.kind,
                AuthenticatorType::OobSms,
                self.target.clone(),
            )
        });
        Ok(to_node(NodeAuthenticated::new(&info)))
    }

    async fn output_data(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Option<serde_json::Value>, FlowError> {
        Ok(Some(json!({
            "masked_display_name": crate::options::mask_phone(&self.target),
        })))
    }
}

impl Intent for IntentAuthenticateOOBOTPPhone {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoSendOOBOTP {
    pub target: String,
}

impl Kind for NodeDoSendOOBOTP {
    const KIND: &'static str = "NodeDoSendOOBOTP";
}

#[async_trait]
impl Reactor for NodeDoSendOOBOTP {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.rate_limiter
            .consume(&format!("send_oob_otp:{}", self.target))
            .await?;
        deps.verification
            .send_code(&self.target, Purpose::OobOtp)
            .await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new(
            "notification.oob_otp",
            json!({ "target": self.target }),
        )])
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| OOBOTPSent {
            target: self.target.clone(),
        });
    }
}

impl Node for NodeDoSendOOBOTP {}
