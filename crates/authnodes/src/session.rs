use crate::milestones::{PrimaryAuthenticated, SecondaryAuthenticated, SessionCreated};
use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::{Demand, Dependencies, FlowError, Flows, Graph, Kind, Node, Reactor, Session};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoCreateSession {
    pub session: Session,
}

impl NodeDoCreateSession {
    /// A session for `user_id` recording every factor passed in `graph`.
    pub fn new(deps: &Dependencies, graph: &Graph, user_id: Uuid) -> Self {
        let mut amr = Vec::new();
        if let Some(ty) = graph
            .find_milestone::<PrimaryAuthenticated>()
            .and_then(|p| p.ty)
        {
            amr.push(ty.amr().to_string());
        }
        if let Some(secondary) = graph.find_milestone::<SecondaryAuthenticated>() {
            amr.push(secondary.ty.amr().to_string());
        }
        if amr.len() > 1 {
            amr.push("mfa".to_string());
        }
        Self {
            session: Session {
                id: Uuid::new_v4(),
                user_id,
                amr,
                authenticated_at: deps.now(),
            },
        }
    }
}

impl Kind for NodeDoCreateSession {
    const KIND: &'static str = "NodeDoCreateSession";
}

#[async_trait]
impl Reactor for NodeDoCreateSession {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.sessions.create(&self.session).await?;
        Ok(())
    }

    async fn commit_effects(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new(
            "user.authenticated",
            json!({
                "user_id": self.session.user_id,
                "session_id": self.session.id,
                "amr": self.session.amr,
            }),
        )
        .audited()])
    }

    async fn output_data(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
    ) -> Result<Option<serde_json::Value>, FlowError> {
        Ok(Some(json!({
            "session_id": self.session.id,
            "user_id": self.session.user_id,
        })))
    }

    fn provide(&self, demand: &mut Demand) {
        demand.provide(|| SessionCreated(self.session.id));
    }
}

impl Node for NodeDoCreateSession {}
