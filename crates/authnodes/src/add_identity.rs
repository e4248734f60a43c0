use crate::identity::NodeDoCreateIdentity;
use crate::inputs::{self, InputTakeBiometric, InputTakeLoginID};
use async_trait::async_trait;
use authcore::reactor::to_node;
use authcore::{
    Dependencies, Edge, FlowError, Flows, IdentityInfo, IdentitySpec, Input, Intent, Kind, Reaction,
    Reactor,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Adds a login ID or a biometric key to a signed-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAddIdentity {
    pub user_id: Uuid,
}

impl Kind for IntentAddIdentity {
    const KIND: &'static str = "IntentAddIdentity";
}

#[async_trait]
impl Reactor for IntentAddIdentity {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Reaction::Inputs(vec![
                inputs::take_login_id(),
                inputs::take_biometric(),
            ]))
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
        let spec = if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeLoginID>()) {
            inputs::login_id_spec(deps, &take.login_id)?
        } else if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeBiometric>()) {
            IdentitySpec::Biometric {
                key_id: take.key_id.clone(),
            }
        } else {
            return Err(FlowError::UnexpectedInput { reactor: Self::KIND });
        };
        Ok(to_node(NodeDoCreateIdentity {
            identity: IdentityInfo::new(self.user_id, spec),
            creating_user: false,
        }))
    }
}

impl Intent for IntentAddIdentity {}
