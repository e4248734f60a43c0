//! Passwordless login through a link mailed to the user.
//!
//! The link itself is opened out of band; the flow only learns about it when
//! the client asks to check.

use crate::authenticator::NodeAuthenticated;
use crate::inputs::{self, InputCheckLoginLink};
use crate::milestones::LoginLinkSent;
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::reactor::to_node;
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Demand, Dependencies, Edge, FlowError,
    Flows, Input, Intent, Kind, Node, Purpose, Reaction, Reactor, ServiceError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAuthenticateEmailLoginLink {
    pub user_id: Uuid,
    pub target: String,
}

impl Kind for IntentAuthenticateEmailLoginLink {
    const KIND: &'static str = "IntentAuthenticateEmailLoginLink";
}

#[async_trait]
impl Reactor for IntentAuthenticateEmailLoginLink {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        match flows.nearest.nodes().len() {
            0 => Ok(Reaction::Auto),
            1 => Ok(Reaction::Inputs(vec![inputs::check_login_link()])),
            _ => Ok(Reaction::Done),
        }
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        if !flows.nearest.has_milestone::<LoginLinkSent>() {
            return Ok(to_node(NodeDoSendLoginLink {
                target: self.target.clone(),
            }));
        }

        if !input.map_or(false, |i| i.is::<InputCheckLoginLink>()) {
            return Err(FlowError::UnexpectedInput { reactor: Self::KIND });
        }
        if !deps
            .verification
            .is_verified(&self.target, Purpose::LoginLink)
            .await?
        {
            return Err(ServiceError::NotVerified.into());
        }

        let existing = deps
            .authenticators
            .list_by_user(self.user_id)
            .await?
            .into_iter()
            .find(|a| a.ty == AuthenticatorType::OobEmail && a.credential == self.target);
        let info = existing.unwrap_or_else(|| {
            AuthenticatorInfo::new(
                self.user_id,
                AuthenticatorKind::Primary,
                AuthenticatorType::OobEmail,
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
        Ok(Some(json!({ "target": self.target })))
    }
}

impl Intent for IntentAuthenticateEmailLoginLink {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoSendLoginLink {
    pub target: String,
}

impl Kind for NodeDoSendLoginLink {
    const KIND: &'static str = "NodeDoSendLoginLink";
}

#[async_trait]
impl Reactor for NodeDoSendLoginLink {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.rate_limiter
            .consume(&format!("send_login_link:{}", self.target))
            .await?;
        deps.verification
            .send_code(&self.target, Purpose::LoginLink)
            .await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new(
            "notification.login_link",
            json!({ "target": self.target }),
        )])
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| LoginLinkSent {
            target: self.target.clone(),
        });
    }
}

impl Node for NodeDoSendLoginLink {}
