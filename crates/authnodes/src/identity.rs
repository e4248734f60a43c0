use crate::milestones::{IdentityCreated, IdentitySelected, UserCreated};
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::{
    Demand, Dependencies, FlowError, Flows, IdentityInfo, IdentitySpec, IdentityType, Kind, Node,
    Reactor, User,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// The identity a signup settled on. Records a linking decision, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentitySelected {
    pub spec: IdentitySpec,
    #[serde(default)]
    pub link_to: Option<Uuid>,
}

impl Kind for NodeIdentitySelected {
    const KIND: &'static str = "NodeIdentitySelected";
}

impl Reactor for NodeIdentitySelected {
    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| IdentitySelected {
            spec: self.spec.clone(),
            link_to: self.link_to,
        });
    }
}

impl Node for NodeIdentitySelected {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoCreateUser {
    pub user: User,
}

impl NodeDoCreateUser {
    pub fn new(deps: &Dependencies) -> Self {
        Self {
            user: User {
                id: Uuid::new_v4(),
                is_anonymous: false,
                created_at: deps.now(),
            },
        }
    }
}

impl Kind for NodeDoCreateUser {
    const KIND: &'static str = "NodeDoCreateUser";
}

#[async_trait]
impl Reactor for NodeDoCreateUser {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.users.create(&self.user).await?;
        Ok(())
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| UserCreated(self.user.id));
    }
}

impl Node for NodeDoCreateUser {}

/// Stores an identity. `creating_user` is set when the identity belongs to
/// a user created by the same flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoCreateIdentity {
    pub identity: IdentityInfo,
    pub creating_user: bool,
}

impl Kind for NodeDoCreateIdentity {
    const KIND: &'static str = "NodeDoCreateIdentity";
}

#[async_trait]
impl Reactor for NodeDoCreateIdentity {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        let user = deps.users.get(self.identity.user_id).await?;
        if user.is_anonymous && self.identity.identity_type() == IdentityType::Biometric {
            return Err(FlowError::invariant(
                "AnonymousUserAddIdentity",
                "anonymous users cannot add biometric identities",
            ));
        }
        deps.identities.check_duplicated(&self.identity).await?;
        deps.identities.create(&self.identity).await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        let event = if self.creating_user {
            DomainEvent::new(
                "notification.welcome_message",
                json!({
                    "user_id": self.identity.user_id,
                    "claims": self.identity.spec.claims(),
                }),
            )
        } else {
            DomainEvent::new(
                "identity.created",
                json!({
                    "user_id": self.identity.user_id,
                    "identity_id": self.identity.id,
                    "type": self.identity.identity_type(),
                }),
            )
            .audited()
        };
        Ok(vec![event])
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| IdentityCreated(self.identity.clone()));
    }
}

impl Node for NodeDoCreateIdentity {}
