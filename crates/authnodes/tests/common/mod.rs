#![allow(dead_code)]

use authcore::{FlowError, IdentityInfo, IdentitySpec, Intent, LoginIdKeyType, RawInput, TenantConfig, User};
use authruntime::memory::MemoryBackend;
use authruntime::{FlowOutput, FlowService, FlowStore, InMemoryFlowStore, Registry};
use std::sync::Arc;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub deps: authcore::Dependencies,
    pub service: FlowService,
    pub store: Arc<InMemoryFlowStore>,
}

impl Harness {
    pub fn new(config: TenantConfig) -> Self {
        init_tracing();
        let mut registry = Registry::new();
        authnodes::register_all(&mut registry);
        let backend = MemoryBackend::new();
        let deps = backend.dependencies(config);
        let store = Arc::new(InMemoryFlowStore::new());
        let service = FlowService::new(Arc::new(registry), store.clone());
        Self {
            backend,
            deps,
            service,
            store,
        }
    }

    pub async fn start(&self, intent: impl Intent) -> FlowOutput {
        self.service
            .create(&self.deps, Box::new(intent))
            .await
            .expect("flow should start")
    }

    pub async fn send(
        &self,
        flow: &FlowOutput,
        input: serde_json::Value,
    ) -> Result<FlowOutput, FlowError> {
        self.service
            .accept(&self.deps, flow.flow_id, &RawInput::new(input))
            .await
    }

    pub async fn node_count(&self, flow: &FlowOutput) -> usize {
        self.store
            .load(flow.flow_id)
            .await
            .expect("flow should be stored")
            .nodes
            .len()
    }

    /// A user with an email login ID and a password.
    pub async fn seed_account(&self, email: &str, password: &str) -> (User, IdentityInfo) {
        let user = self.backend.seed_user().await;
        let identity = self
            .backend
            .seed_identity(user.id, IdentitySpec::login_id(LoginIdKeyType::Email, email))
            .await;
        self.backend.seed_password(user.id, password).await;
        (user, identity)
    }
}

pub fn names(flow: &FlowOutput) -> Vec<&str> {
    flow.legal_next_inputs.iter().map(|d| d.name.as_str()).collect()
}

pub fn invariant_kind(error: &FlowError) -> Option<&'static str> {
    match error.root_cause() {
        FlowError::InvariantViolated { kind, .. } => Some(*kind),
        _ => None,
    }
}
