use crate::inputs::{self, InputTakeLoginID, InputTakeOAuthIdentity};
use crate::login::IntentLogin;
use crate::milestones::AccountLinkingRules;
use crate::signup::IntentSignup;
use async_trait::async_trait;
use authcore::reactor::to_sub_flow;
use authcore::{
    AccountLinkingConfig, Demand, Dependencies, Edge, FlowError, Flows, IdentitySpec, Input, Intent,
    Kind, Reaction, Reactor,
};
use serde::{Deserialize, Serialize};

/// Entry point: logs in a known identity, signs up an unknown one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentAuthenticate {
    /// Linking rules for signups started from here. Providers not listed
    /// fall back to the tenant configuration.
    #[serde(default)]
    pub account_linking: AccountLinkingConfig,
}

impl Kind for IntentAuthenticate {
    const KIND: &'static str = "IntentAuthenticate";
}

#[async_trait]
impl Reactor for IntentAuthenticate {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().is_empty() {
            Ok(Reaction::Inputs(vec![
                inputs::take_login_id(),
                inputs::take_oauth_identity(),
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
        } else if let Some(take) = input.and_then(|i| i.downcast_ref::<InputTakeOAuthIdentity>()) {
            IdentitySpec::OAuth {
                alias: take.alias.clone(),
                subject_id: take.subject_id.clone(),
                claims: take.claims.clone(),
            }
        } else {
            return Err(FlowError::UnexpectedInput { reactor: Self::KIND });
        };

        match deps.identities.search_by_spec(&spec).await? {
            Some(identity) => {
                tracing::debug!(user_id = %identity.user_id, "known identity, logging in");
                Ok(to_sub_flow(IntentLogin { identity }))
            }
            None => Ok(to_sub_flow(IntentSignup::with_identity(spec))),
        }
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| AccountLinkingRules(self.account_linking.clone()));
    }
}

impl Intent for IntentAuthenticate {}
