use crate::authenticator::NodeDoCreateAuthenticator;
use crate::identity::{NodeDoCreateIdentity, NodeDoCreateUser, NodeIdentitySelected};
use crate::inputs::{self, InputTakeLoginID, InputTakeNewPassword, InputTakeOAuthIdentity};
use crate::linking::link_oauth_identity;
use crate::milestones::{
    IdentityCreated, IdentitySelected, PrimaryAuthenticated, SessionCreated, UserCreated,
};
use crate::session::NodeDoCreateSession;
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::reactor::to_node;
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, Dependencies, Edge, FlowError, Flows,
    Graph, IdentityInfo, IdentitySpec, Input, Intent, Kind, PrimaryMethod, Reaction, Reactor,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug)]
enum Step {
    SelectIdentity,
    CreateUser,
    CreateIdentity(IdentitySelected),
    CreatePassword(Uuid),
    CreateSession(Uuid),
    Done,
}

/// Creates a user from a login ID or an OAuth identity, or attaches the
/// identity to an existing user when account linking says so.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentSignup {
    /// Chosen before the flow started, e.g. by an unknown login ID.
    #[serde(default)]
    pub identity: Option<IdentitySpec>,
}

impl IntentSignup {
    pub fn with_identity(spec: IdentitySpec) -> Self {
        Self {
            identity: Some(spec),
        }
    }

    fn next_step(&self, deps: &Dependencies, graph: &Graph) -> Step {
        let selected = match graph.find_milestone::<IdentitySelected>() {
            Some(selected) => selected,
            None => return Step::SelectIdentity,
        };
        let created = graph.find_milestone::<UserCreated>().map(|u| u.0);
        let user_id = match selected.link_to.or(created) {
            Some(user_id) => user_id,
            None => return Step::CreateUser,
        };
        if !graph.has_milestone::<IdentityCreated>() {
            return Step::CreateIdentity(selected);
        }
        let wants_password = selected.link_to.is_none()
            && matches!(selected.spec, IdentitySpec::LoginId { .. })
            && deps
                .config
                .authentication
                .primary
                .contains(&PrimaryMethod::Password);
        if wants_password && !graph.has_milestone::<PrimaryAuthenticated>() {
            return Step::CreatePassword(user_id);
        }
        if !graph.has_milestone::<SessionCreated>() {
            return Step::CreateSession(user_id);
        }
        Step::Done
    }

    async fn select_identity(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        let spec = if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeLoginID>()) {
            inputs::login_id_spec(deps, &take.login_id)?
        } else if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeOAuthIdentity>()) {
            IdentitySpec::OAuth {
                alias: take.alias.clone(),
                subject_id: take.subject_id.clone(),
                claims: take.claims.clone(),
            }
        } else {
            self.identity
                .clone()
                .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?
        };

        let link_to = match &spec {
            IdentitySpec::OAuth { .. } => link_oauth_identity(deps, flows.root, &spec).await?,
            _ => None,
        };
        Ok(to_node(NodeIdentitySelected { spec, link_to }))
    }
}

impl Kind for IntentSignup {
    const KIND: &'static str = "IntentSignup";
}

#[async_trait]
impl Reactor for IntentSignup {
    async fn can_react_to(&self, deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        Ok(match self.next_step(deps, flows.nearest) {
            Step::SelectIdentity if self.identity.is_none() => Reaction::Inputs(vec![
                inputs::take_login_id(),
                inputs::take_oauth_identity(),
            ]),
            Step::CreatePassword(_) => Reaction::Inputs(vec![inputs::take_new_password()]),
            Step::Done => Reaction::Done,
            _ => Reaction::Auto,
        })
    }

    async fn react_to(
        &self,
        deps: &Dependencies,
        flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        match self.next_step(deps, flows.nearest) {
            Step::SelectIdentity => self.select_identity(deps, flows, input).await,
            Step::CreateUser => Ok(to_node(NodeDoCreateUser::new(deps))),
            Step::CreateIdentity(selected) => {
                let user_id = match selected.link_to {
                    Some(user_id) => user_id,
                    None => flows
                        .nearest
                        .find_milestone::<UserCreated>()
                        .map(|u| u.0)
                        .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?,
                };
                Ok(to_node(NodeDoCreateIdentity {
                    identity: IdentityInfo::new(user_id, selected.spec),
                    creating_user: selected.link_to.is_none(),
                }))
            }
            Step::CreatePassword(user_id) => {
                let take = input
                    .and_then(|i| i.downcast_ref::<InputTakeNewPassword>())
                    .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?;
                Ok(to_node(NodeDoCreateAuthenticator::new(AuthenticatorInfo::new(
                    user_id,
                    AuthenticatorKind::Primary,
                    AuthenticatorType::Password,
                    take.new_password.clone(),
                ))))
            }
            Step::CreateSession(user_id) => Ok(to_node(NodeDoCreateSession::new(
                deps,
                flows.nearest,
                user_id,
            ))),
            Step::Done => Err(FlowError::UnexpectedInput { reactor: Self::KIND }),
        }
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(flows
            .nearest
            .find_milestone::<UserCreated>()
            .map(|UserCreated(user_id)| {
                DomainEvent::new("user.created", json!({ "user_id": user_id })).audited()
            })
            .into_iter()
            .collect())
    }
}

impl Intent for IntentSignup {}
