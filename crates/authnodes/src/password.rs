use crate::authenticator::NodeAuthenticated;
use crate::inputs::{self, InputTakePassword};
use async_trait::async_trait;
use authcore::reactor::to_node;
use authcore::{
    AuthenticatorType, Dependencies, Edge, FlowError, Flows, Input, Intent, Kind, Reaction, Reactor,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Checks the user's primary password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAuthenticatePassword {
    pub user_id: Uuid,
}

impl Kind for IntentAuthenticatePassword {
    const KIND: &'static str = "IntentAuthenticatePassword";
}

#[async_trait]
impl Reactor for IntentAuthenticatePassword {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Reaction::Inputs(vec![inputs::take_password()]))
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
        let take = input
            .and_then(|i| i.downcast_ref::<InputTakePassword>())
            .ok_or(FlowError::UnexpectedInput { reactor: Self::KIND })?;
        deps.rate_limiter
            .consume(&format!("verify_password:{}", self.user_id))
            .await?;
        let info = deps
            .authenticators
            .verify(self.user_id, AuthenticatorType::Password, &take.password)
            .await?;
        Ok(to_node(NodeAuthenticated::new(&info)))
    }
}

impl Intent for IntentAuthenticatePassword {}
