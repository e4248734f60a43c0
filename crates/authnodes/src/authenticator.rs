use crate::milestones::{PrimaryAuthenticated, SecondaryAuthenticated};
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Demand, Dependencies, FlowError, Flows,
    Kind, Node, Reactor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

fn provide_authenticated(demand: &mut Demand, user_id: Uuid, kind: AuthenticatorKind, ty: AuthenticatorType) {
    match kind {
        AuthenticatorKind::Primary => {
            demand.provide(|| PrimaryAuthenticated {
                user_id,
                ty: Some(ty),
            });
        }
        AuthenticatorKind::Secondary => {
            demand.provide(|| SecondaryAuthenticated { user_id, ty });
        }
    }
}

/// An existing authenticator was verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeAuthenticated {
    pub authenticator_id: Uuid,
    pub user_id: Uuid,
    pub kind: AuthenticatorKind,
    #[serde(rename = "type")]
    pub ty: AuthenticatorType,
}

impl NodeAuthenticated {
    pub fn new(info: &AuthenticatorInfo) -> Self {
        Self {
            authenticator_id: info.id,
            user_id: info.user_id,
            kind: info.kind,
            ty: info.ty,
        }
    }
}

impl Kind for NodeAuthenticated {
    const KIND: &'static str = "NodeAuthenticated";
}

impl Reactor for NodeAuthenticated {
    fn provide(&self, demand: &mut Demand) {
        provide_authenticated(demand, self.user_id, self.kind, self.ty);
    }
}

impl Node for NodeAuthenticated {}

/// The user came back from an OAuth provider with a known identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOAuthAuthenticated {
    pub user_id: Uuid,
    pub alias: String,
}

impl Kind for NodeOAuthAuthenticated {
    const KIND: &'static str = "NodeOAuthAuthenticated";
}

impl Reactor for NodeOAuthAuthenticated {
    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| PrimaryAuthenticated {
            user_id: self.user_id,
            ty: None,
        });
    }
}

impl Node for NodeOAuthAuthenticated {}

/// Stores a new authenticator. Creating one also counts as passing it.
///
/// The credential only lives for the transition that appends the node; it
/// is never written to the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoCreateAuthenticator {
    pub authenticator_id: Uuid,
    pub user_id: Uuid,
    pub kind: AuthenticatorKind,
    #[serde(rename = "type")]
    pub ty: AuthenticatorType,
    #[serde(skip)]
    credential: String,
}

impl NodeDoCreateAuthenticator {
    pub fn new(info: AuthenticatorInfo) -> Self {
        Self {
            authenticator_id: info.id,
            user_id: info.user_id,
            kind: info.kind,
            ty: info.ty,
            credential: info.credential,
        }
    }
}

impl Kind for NodeDoCreateAuthenticator {
    const KIND: &'static str = "NodeDoCreateAuthenticator";
}

#[async_trait]
impl Reactor for NodeDoCreateAuthenticator {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        let info = AuthenticatorInfo {
            id: self.authenticator_id,
            user_id: self.user_id,
            kind: self.kind,
            ty: self.ty,
            credential: self.credential.clone(),
        };
        deps.authenticators.create(&info).await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new(
            "authenticator.created",
            json!({
                "user_id": self.user_id,
                "authenticator_id": self.authenticator_id,
                "type": self.ty,
            }),
        )])
    }

    fn provide(&self, demand: &mut Demand) {
        provide_authenticated(demand, self.user_id, self.kind, self.ty);
    }
}

impl Node for NodeDoCreateAuthenticator {}
