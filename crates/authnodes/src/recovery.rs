//! Account recovery: identify the account, mail a code, reset the password.

use crate::inputs::{self, InputTakeCode, InputTakeLoginID, InputTakeNewPassword};
use crate::milestones::{PasswordReset, RecoveryCodeSent, RecoveryIdentified, RecoveryVerified};
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::reactor::to_node;
use authcore::{
    Demand, Dependencies, Edge, FlowError, Flows, IdentityInfo, IdentitySpec, Input, Intent, Kind,
    LoginIdKeyType, Node, OnFailure, Purpose, Reaction, Reactor, ServiceError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentAccountRecovery {}

impl Kind for IntentAccountRecovery {
    const KIND: &'static str = "IntentAccountRecovery";
}

#[async_trait]
impl Reactor for IntentAccountRecovery {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        let graph = flows.nearest;
        if !graph.has_milestone::<RecoveryIdentified>() || !graph.has_milestone::<RecoveryCodeSent>() {
            return Ok(Reaction::Auto);
        }
        if !graph.has_milestone::<RecoveryVerified>() {
            return Ok(Reaction::Inputs(vec![inputs::take_recovery_code()]));
        }
        if !graph.has_milestone::<PasswordReset>() {
            return Ok(Reaction::Inputs(vec![inputs::take_new_password()]));
        }
        Ok(Reaction::Done)
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let graph = flows.nearest;
        let identified = match graph.find_milestone::<RecoveryIdentified>() {
            Some(identified) => identified,
            None => {
                let config = &deps.config.account_recovery;
                return Ok(to_node(NodeUseAccountRecoveryIdentity {
                    identification: config.identification.clone(),
                    on_failure: config.on_failure,
                }));
            }
        };

        if !graph.has_milestone::<RecoveryCodeSent>() {
            return Ok(to_node(NodeDoSendRecoveryCode {
                send: identified.identity.is_some(),
                target: identified.target,
            }));
        }

        if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeCode>()) {
            let identity = identified.identity.ok_or(ServiceError::InvalidCode)?;
            deps.verification
                .verify_code(&identified.target, Purpose::AccountRecovery, &take.code)
                .await?;
            return Ok(to_node(NodeVerifiedRecoveryCode {
                user_id: identity.user_id,
            }));
        }

        if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeNewPassword>()) {
            let verified = graph
                .find_milestone::<RecoveryVerified>()
                .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?;
            return Ok(to_node(NodeDoResetPassword {
                user_id: verified.user_id,
                new_password: take.new_password.clone(),
            }));
        }

        Err(FlowError::UnexpectedInput { reactor: Self::KIND })
    }
}

impl Intent for IntentAccountRecovery {}

/// Waits for the login ID the user wants to recover and looks it up with
/// the identification methods in effect when the flow started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUseAccountRecoveryIdentity {
    pub identification: Vec<LoginIdKeyType>,
    pub on_failure: OnFailure,
}

impl NodeUseAccountRecoveryIdentity {
    async fn search(&self, deps: &Dependencies, raw: &str) -> Result<Vec<IdentityInfo>, FlowError> {
        let mut matches: Vec<IdentityInfo> = Vec::new();
        for key_type in &self.identification {
            let value = match key_type {
                LoginIdKeyType::Email => raw.to_lowercase(),
                _ => raw.to_string(),
            };
            let spec = IdentitySpec::login_id(*key_type, value);
            if let Some(found) = deps.identities.search_by_spec(&spec).await? {
                if !matches.iter().any(|m| m.id == found.id) {
                    matches.push(found);
                }
            }
        }
        Ok(matches)
    }
}

impl Kind for NodeUseAccountRecoveryIdentity {
    const KIND: &'static str = "NodeUseAccountRecoveryIdentity";
}

#[async_trait]
impl Reactor for NodeUseAccountRecoveryIdentity {
    async fn can_react_to(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<Reaction, FlowError> {
        Ok(Reaction::Inputs(vec![inputs::take_login_id()]))
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        _flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let take = input
            .and_then(|i| i.downcast_ref::<InputTakeLoginID>())
            .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?;
        let raw = take.login_id.trim();
        let mut matches = self.search(deps, raw).await?;

        let identity = match self.on_failure {
            OnFailure::Ignore => {
                if matches.is_empty() {
                    tracing::debug!("no identity matches recovery request; continuing");
                }
                matches.into_iter().next()
            }
            OnFailure::Error if matches.len() == 1 => matches.pop(),
            OnFailure::Error => return Err(ServiceError::IdentityNotFound.into()),
        };

        let target = identity
            .as_ref()
            .and_then(|i| match &i.spec {
                IdentitySpec::LoginId { value, .. } => Some(value.clone()),
                _ => None,
            })
            .unwrap_or_else(|| raw.to_string());
        Ok(to_node(NodeDoUseAccountRecoveryIdentity { target, identity }))
    }
}

impl Node for NodeUseAccountRecoveryIdentity {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoUseAccountRecoveryIdentity {
    pub target: String,
    pub identity: Option<IdentityInfo>,
}

impl Kind for NodeDoUseAccountRecoveryIdentity {
    const KIND: &'static str = "NodeDoUseAccountRecoveryIdentity";
}

impl Reactor for NodeDoUseAccountRecoveryIdentity {
    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| RecoveryIdentified {
            target: self.target.clone(),
            identity: self.identity.clone(),
        });
    }
}

impl Node for NodeDoUseAccountRecoveryIdentity {}

/// Sends the recovery code. Nothing is sent when no account matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoSendRecoveryCode {
    pub target: String,
    pub send: bool,
}

impl Kind for NodeDoSendRecoveryCode {
    const KIND: &'static str = "NodeDoSendRecoveryCode";
}

#[async_trait]
impl Reactor for NodeDoSendRecoveryCode {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        if !self.send {
            return Ok(());
        }
        deps.rate_limiter
            .consume(&format!("send_recovery_code:{}", self.target))
            .await?;
        deps.verification
            .send_code(&self.target, Purpose::AccountRecovery)
            .await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        if !self.send {
            return Ok(Vec::new());
        }
        Ok(vec![DomainEvent::new(
            "notification.account_recovery",
            json!({ "target": self.target }),
        )])
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| RecoveryCodeSent);
    }
}

impl Node for NodeDoSendRecoveryCode {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeVerifiedRecoveryCode {
    pub user_id: Uuid,
}

impl Kind for NodeVerifiedRecoveryCode {
    const KIND: &'static str = "NodeVerifiedRecoveryCode";
}

impl Reactor for NodeVerifiedRecoveryCode {
    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| RecoveryVerified {
            user_id: self.user_id,
        });
    }
}

impl Node for NodeVerifiedRecoveryCode {}

/// The new password is applied when the node is appended and never
/// journaled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoResetPassword {
    pub user_id: Uuid,
    #[serde(skip)]
    new_password: String,
}

impl Kind for NodeDoResetPassword {
    const KIND: &'static str = "NodeDoResetPassword";
}

#[async_trait]
impl Reactor for NodeDoResetPassword {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.authenticators
            .reset_password(self.user_id, &self.new_password)
            .await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new(
            "user.password_reset",
            json!({ "user_id": self.user_id }),
        )
        .audited()])
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| PasswordReset);
    }
}

impl Node for NodeDoResetPassword {}
