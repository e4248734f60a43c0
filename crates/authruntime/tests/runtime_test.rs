use async_trait::async_trait;
use authcore::events::DomainEvent;
use authcore::reactor::{to_node, to_sub_flow};
use authcore::{
    Dependencies, Edge, ErrorClass, FlowError, Flows, Graph, Input, Intent, Kind, Node,
    Database, RawInput, Reaction, Reactor, Schema, ServiceError, TenantConfig, TypedSchema, User,
};
use authruntime::memory::MemoryBackend;
use authruntime::{
    journal, replay, Engine, FlowInstance, FlowService, FlowStore, InMemoryFlowStore, KindRecord,
    NodeEntry, NodeRecord, Registry, RuntimeConfig, StoreError,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Barrier;
use uuid::Uuid;

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Deserialize)]
struct TakeWord {
    word: String,
}
impl Input for TakeWord {}

/// Collects `target` words. The word "nested" opens a sub-flow collecting
/// one more word.
#[derive(Serialize, Deserialize)]
struct IntentCollect {
    target: usize,
}

impl Kind for IntentCollect {
    const KIND: &'static str = "IntentCollect";
}

#[async_trait]
impl Reactor for IntentCollect {
    async fn can_react_to(&self, _deps: &Dependencies, flows: Flows<'_>) -> Result<Reaction, FlowError> {
        if flows.nearest.nodes().len() < self.target {
            Ok(Reaction::Inputs(vec![TypedSchema::<TakeWord>::boxed(
                "TakeWord",
                Schema::object()
                    .property("word", Schema::string().min_length(1))
                    .required(["word"]),
            )]))
        } else {
            Ok(Reaction::Done)
        }
    }

    async fn react_to(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
        input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        match input.and_then(|i| i.downcast_ref::<TakeWord>()) {
            Some(take) if take.word == "nested" => Ok(to_sub_flow(IntentCollect { target: 1 })),
            Some(take) => Ok(to_node(NodeWord {
                word: take.word.clone(),
                user_id: Uuid::new_v4(),
            })),
            None => Err(FlowError::UnexpectedInput { reactor: Self::KIND }),
        }
    }

    async fn commit_effects(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new("collect.completed", json!({"target": self.target})).audited()])
    }
}

impl Intent for IntentCollect {}

/// Creates a user when appended; the word "fail" aborts after doing so.
#[derive(Serialize, Deserialize)]
struct NodeWord {
    word: String,
    user_id: Uuid,
}

impl Kind for NodeWord {
    const KIND: &'static str = "NodeWord";
}

#[async_trait]
impl Reactor for NodeWord {
    async fn run_effects(&self, deps: &Dependencies, _flows: Flows<'_>) -> Result<(), FlowError> {
        deps.users
            .create(&User {
                id: self.user_id,
                is_anonymous: false,
                created_at: deps.now(),
            })
            .await?;
        if self.word == "fail" {
            return Err(FlowError::invariant("WordRejected", "fail is not a word"));
        }
        Ok(())
    }

    async fn commit_effects(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<Vec<DomainEvent>, FlowError> {
        Ok(vec![DomainEvent::new("word.added", json!({"word": self.word}))])
    }

    async fn output_data(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<Option<serde_json::Value>, FlowError> {
        Ok(Some(json!({"word": self.word})))
    }
}

impl Node for NodeWord {}

/// Never settles.
#[derive(Serialize, Deserialize)]
struct IntentSpin;

impl Kind for IntentSpin {
    const KIND: &'static str = "IntentSpin";
}

#[async_trait]
impl Reactor for IntentSpin {
    async fn can_react_to(&self, _deps: &Dependencies, _flows: Flows<'_>) -> Result<Reaction, FlowError> {
        Ok(Reaction::Auto)
    }

    async fn react_to(
        &self,
        _deps: &Dependencies,
        _flows: Flows<'_>,
        _input: Option<&dyn Input>,
    ) -> Result<Box<dyn Edge>, FlowError> {
        Ok(to_node(NodeTick))
    }
}

impl Intent for IntentSpin {}

#[derive(Serialize, Deserialize)]
struct NodeTick;

impl Kind for NodeTick {
    const KIND: &'static str = "NodeTick";
}

impl Reactor for NodeTick {}
impl Node for NodeTick {}

fn registry() -> Arc<Registry> {
    let mut registry = Registry::new();
    registry
        .register_intent::<IntentCollect>()
        .register_intent::<IntentSpin>()
        .register_node::<NodeWord>()
        .register_node::<NodeTick>();
    Arc::new(registry)
}

struct Harness {
    backend: Arc<MemoryBackend>,
    deps: Dependencies,
    store: Arc<InMemoryFlowStore>,
    service: FlowService,
}

fn harness() -> Harness {
    harness_with(RuntimeConfig::default())
}

fn harness_with(config: RuntimeConfig) -> Harness {
    init_tracing();
    let backend = MemoryBackend::new();
    let deps = backend.dependencies(TenantConfig::for_tenant("acme"));
    let store = Arc::new(InMemoryFlowStore::new());
    let service = FlowService::with_config(registry(), store.clone(), config);
    Harness {
        backend,
        deps,
        store,
        service,
    }
}

fn word(w: &str) -> RawInput {
    RawInput::new(json!({ "word": w }))
}

#[test]
fn unknown_kind_is_corruption() {
    let registry = registry();
    let err = registry
        .reconstruct_node("NodeGone", &json!({}))
        .map(|_| ())
        .unwrap_err();
    let err = FlowError::from(err);
    assert_eq!(err.class(), ErrorClass::Corruption);

    let root = KindRecord {
        kind: "IntentCollect".into(),
        data: json!({"target": 2}),
    };
    let records = vec![NodeRecord {
        parent: "".parse().unwrap(),
        entry: NodeEntry::Simple(KindRecord {
            kind: "NodeGone".into(),
            data: json!({}),
        }),
    }];
    let err = replay(&registry, &root, &records).unwrap_err();
    assert!(matches!(err, FlowError::Registry(_)));
}

#[test]
fn registry_lists_kinds_sorted() {
    let registry = registry();
    assert_eq!(registry.intent_kinds(), vec!["IntentCollect", "IntentSpin"]);
    assert_eq!(registry.node_kinds(), vec!["NodeTick", "NodeWord"]);
    assert!(registry.has_node("NodeWord"));
    assert!(!registry.has_intent("NodeWord"));
}

#[tokio::test]
async fn replay_rebuilds_an_equivalent_graph() {
    let h = harness();
    let out = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 3 }))
        .await
        .unwrap();
    let id = out.flow_id;
    h.service.accept(&h.deps, id, &word("a")).await.unwrap();
    let out = h.service.accept(&h.deps, id, &word("nested")).await.unwrap();
    assert_eq!(out.legal_next_inputs[0].pointer.to_string(), "/1");

    let instance = h.store.load(id).await.unwrap();
    let graph = replay(h.service.registry(), &instance.root, &instance.nodes).unwrap();
    assert_eq!(graph.node_count(), instance.version());
    assert_eq!(journal(&graph).unwrap(), instance.nodes);

    let engine = Engine::new(&h.deps, id, 16);
    assert_eq!(engine.can_react_to(&graph).await.unwrap(), out.legal_next_inputs);

    let again = replay(h.service.registry(), &instance.root, &instance.nodes).unwrap();
    assert_eq!(
        engine.can_react_to(&again).await.unwrap(),
        engine.can_react_to(&graph).await.unwrap()
    );
}

#[tokio::test]
async fn replay_does_not_run_effects() {
    let h = harness();
    let out = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap();
    h.service.accept(&h.deps, out.flow_id, &word("a")).await.unwrap();
    assert_eq!(h.backend.users().await.len(), 1);

    h.service.get(&h.deps, out.flow_id).await.unwrap();
    let instance = h.store.load(out.flow_id).await.unwrap();
    replay(h.service.registry(), &instance.root, &instance.nodes).unwrap();
    assert_eq!(h.backend.users().await.len(), 1);
}

#[test]
fn replay_rejects_appends_to_closed_flows() {
    let registry = registry();
    let root = KindRecord {
        kind: "IntentCollect".into(),
        data: json!({"target": 3}),
    };
    let simple = |w: &str, parent: &str| NodeRecord {
        parent: parent.parse().unwrap(),
        entry: NodeEntry::Simple(KindRecord {
            kind: "NodeWord".into(),
            data: json!({"word": w, "user_id": Uuid::new_v4()}),
        }),
    };
    let records = vec![
        NodeRecord {
            parent: "".parse().unwrap(),
            entry: NodeEntry::SubFlow(KindRecord {
                kind: "IntentCollect".into(),
                data: json!({"target": 1}),
            }),
        },
        simple("a", "/0"),
        simple("b", ""),
        simple("c", "/0"),
    ];
    assert!(replay(&registry, &root, &records[..3]).is_ok());
    let err = replay(&registry, &root, &records).unwrap_err();
    assert!(matches!(err, FlowError::Corrupted(_)));
}

#[tokio::test]
async fn store_rejects_stale_versions() {
    let store = InMemoryFlowStore::new();
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();
    store
        .create(FlowInstance {
            id,
            tenant_id: "acme".into(),
            root: KindRecord {
                kind: "IntentCollect".into(),
                data: json!({"target": 1}),
            },
            nodes: Vec::new(),
            created_at: now,
            expires_at: now + Duration::minutes(5),
        })
        .await
        .unwrap();

    let record = NodeRecord {
        parent: "".parse().unwrap(),
        entry: NodeEntry::Simple(KindRecord {
            kind: "NodeTick".into(),
            data: json!(null),
        }),
    };
    assert_eq!(store.append(id, vec![record.clone()], 0).await.unwrap(), 1);
    let err = store.append(id, vec![record], 0).await.unwrap_err();
    assert_eq!(
        err,
        StoreError::Conflict {
            flow_id: id,
            expected: 0,
            actual: 1
        }
    );
}

/// Holds every `load` until `parties` callers have loaded.
struct BarrierStore {
    inner: InMemoryFlowStore,
    barrier: Barrier,
    armed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl FlowStore for BarrierStore {
    async fn create(&self, instance: FlowInstance) -> Result<(), StoreError> {
        self.inner.create(instance).await
    }

    async fn load(&self, flow_id: Uuid) -> Result<FlowInstance, StoreError> {
        let instance = self.inner.load(flow_id).await;
        if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        instance
    }

    async fn append(&self, flow_id: Uuid, records: Vec<NodeRecord>, expected_version: usize) -> Result<usize, StoreError> {
        self.inner.append(flow_id, records, expected_version).await
    }

    async fn truncate(&self, flow_id: Uuid, version: usize, expected_version: usize) -> Result<(), StoreError> {
        self.inner.truncate(flow_id, version, expected_version).await
    }

    async fn delete(&self, flow_id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(flow_id).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.purge_expired(now).await
    }
}

#[tokio::test]
async fn concurrent_accepts_have_exactly_one_winner() {
    init_tracing();
    let backend = MemoryBackend::new();
    let deps = backend.dependencies(TenantConfig::for_tenant("acme"));
    let store = Arc::new(BarrierStore {
        inner: InMemoryFlowStore::new(),
        barrier: Barrier::new(2),
        armed: std::sync::atomic::AtomicBool::new(false),
    });
    let service = Arc::new(FlowService::new(registry(), store.clone()));
    let id = service
        .create(&deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    store.armed.store(true, std::sync::atomic::Ordering::SeqCst);

    let tasks: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|w| {
            let service = service.clone();
            let deps = deps.clone();
            tokio::spawn(async move { service.accept(&deps, id, &word(w)).await })
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(e) => {
                assert_eq!(e.class(), ErrorClass::Conflict);
                conflicts += 1;
            }
        }
    }
    assert_eq!((wins, conflicts), (1, 1));

    store.armed.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(store.load(id).await.unwrap().version(), 1);
    // The loser's effects were rolled back.
    assert_eq!(backend.users().await.len(), 1);
}

#[tokio::test]
async fn conflicts_are_retried_when_configured() {
    init_tracing();
    let backend = MemoryBackend::new();
    let deps = backend.dependencies(TenantConfig::for_tenant("acme"));
    let store = Arc::new(BarrierStore {
        inner: InMemoryFlowStore::new(),
        barrier: Barrier::new(2),
        armed: std::sync::atomic::AtomicBool::new(false),
    });
    let config = RuntimeConfig {
        conflict_retries: 1,
        ..RuntimeConfig::default()
    };
    let service = Arc::new(FlowService::with_config(registry(), store.clone(), config));
    let id = service
        .create(&deps, Box::new(IntentCollect { target: 3 }))
        .await
        .unwrap()
        .flow_id;
    store.armed.store(true, std::sync::atomic::Ordering::SeqCst);

    let first = {
        let (service, deps) = (service.clone(), deps.clone());
        tokio::spawn(async move { service.accept(&deps, id, &word("left")).await })
    };
    let second = {
        let (service, deps) = (service.clone(), deps.clone());
        tokio::spawn(async move { service.accept(&deps, id, &word("right")).await })
    };
    // The retry loads once more; release it.
    let releaser = {
        let store = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            store.armed.store(false, std::sync::atomic::Ordering::SeqCst);
            store.barrier.wait().await;
        })
    };

    let a = first.await.unwrap();
    let b = second.await.unwrap();
    releaser.abort();
    assert!(a.is_ok() && b.is_ok());
    store.armed.store(false, std::sync::atomic::Ordering::SeqCst);
    assert_eq!(store.load(id).await.unwrap().version(), 2);
}

#[tokio::test]
async fn expired_flows_fail_with_terminal_error() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.backend.clock().advance(Duration::minutes(21));

    let err = h.service.accept(&h.deps, id, &word("late")).await.unwrap_err();
    assert!(matches!(err, FlowError::Expired(e) if e == id));
    assert_eq!(err.class(), ErrorClass::Terminal);
    assert_eq!(h.store.load(id).await.unwrap().version(), 0);
}

#[tokio::test]
async fn tenant_lifetime_overrides_runtime_default() {
    let h = harness();
    let mut config = TenantConfig::for_tenant("acme");
    config.flow_lifetime_seconds = Some(30);
    let deps = h.backend.dependencies(config);
    let id = h
        .service
        .create(&deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.backend.clock().advance(Duration::seconds(31));
    assert!(matches!(
        h.service.get(&deps, id).await,
        Err(FlowError::Expired(_))
    ));
}

#[tokio::test]
async fn failed_effects_leave_no_trace() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;

    let err = h.service.accept(&h.deps, id, &word("fail")).await.unwrap_err();
    match &err {
        FlowError::Effect { kind, pointer, .. } => {
            assert_eq!(*kind, "NodeWord");
            assert_eq!(pointer.to_string(), "/0");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root_cause(), FlowError::InvariantViolated { kind: "WordRejected", .. }));
    assert_eq!(err.class(), ErrorClass::Invariant);

    assert_eq!(h.store.load(id).await.unwrap().version(), 0);
    assert!(h.backend.users().await.is_empty());
    assert!(h.backend.events().await.is_empty());

    let out = h.service.accept(&h.deps, id, &word("ok")).await.unwrap();
    assert!(!out.is_complete);
}

#[tokio::test]
async fn incompatible_input_changes_nothing() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 1 }))
        .await
        .unwrap()
        .flow_id;
    let err = h
        .service
        .accept(&h.deps, id, &RawInput::new(json!({"word": ""})))
        .await
        .unwrap_err();
    match err {
        FlowError::IncompatibleInput { tried } => assert_eq!(tried[0].name, "TakeWord"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.store.load(id).await.unwrap().version(), 0);
}

#[tokio::test]
async fn completing_a_flow_dispatches_its_events_once() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.service.accept(&h.deps, id, &word("nested")).await.unwrap();
    let out = h.service.accept(&h.deps, id, &word("inner")).await.unwrap();
    assert!(!out.is_complete);
    assert_eq!(
        h.backend.event_kinds().await,
        vec!["word.added", "collect.completed"]
    );

    let out = h.service.accept(&h.deps, id, &word("last")).await.unwrap();
    assert!(out.is_complete);
    assert!(out.legal_next_inputs.is_empty());
    assert_eq!(
        h.backend.event_kinds().await,
        vec!["word.added", "collect.completed", "word.added", "collect.completed"]
    );
    let pointers: Vec<_> = out.data.iter().map(|e| e.pointer.to_string()).collect();
    assert_eq!(pointers, vec!["/1", "/0/0"]);

    let err = h.service.accept(&h.deps, id, &word("more")).await.unwrap_err();
    assert!(matches!(err, FlowError::AlreadyCompleted(e) if e == id));
    assert_eq!(err.class(), ErrorClass::Terminal);
}

#[tokio::test]
async fn audit_overrides_apply_at_dispatch() {
    let h = harness();
    let mut config = TenantConfig::for_tenant("acme");
    config
        .audit
        .overrides
        .insert("collect.completed".into(), false);
    config.audit.overrides.insert("word.added".into(), true);
    let deps = h.backend.dependencies(config);
    let id = h
        .service
        .create(&deps, Box::new(IntentCollect { target: 1 }))
        .await
        .unwrap()
        .flow_id;
    h.service.accept(&deps, id, &word("a")).await.unwrap();

    let audit: Vec<_> = h
        .backend
        .events()
        .await
        .into_iter()
        .map(|e| (e.event.kind, e.event.audit, e.flow_id == id, e.tenant_id))
        .collect();
    assert_eq!(
        audit,
        vec![
            ("word.added".to_string(), true, true, "acme".to_string()),
            ("collect.completed".to_string(), false, true, "acme".to_string()),
        ]
    );
}

#[tokio::test]
async fn event_dispatch_failure_does_not_undo_the_transition() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.backend.fail_event_dispatch(true);
    h.service.accept(&h.deps, id, &word("a")).await.unwrap();
    assert_eq!(h.store.load(id).await.unwrap().version(), 1);
    assert_eq!(h.backend.users().await.len(), 1);
    assert!(h.backend.events().await.is_empty());
}

#[tokio::test]
async fn runaway_automatic_steps_are_bounded() {
    let h = harness_with(RuntimeConfig {
        max_auto_steps: 4,
        ..RuntimeConfig::default()
    });
    let err = h.service.create(&h.deps, Box::new(IntentSpin)).await.unwrap_err();
    assert!(matches!(err, FlowError::AutoStepLimit(4)));
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn flows_are_isolated_per_tenant() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 1 }))
        .await
        .unwrap()
        .flow_id;
    let other = h.backend.dependencies(TenantConfig::for_tenant("globex"));
    assert!(matches!(h.service.get(&other, id).await, Err(FlowError::NotFound(_))));
    assert!(matches!(
        h.service.accept(&other, id, &word("a")).await,
        Err(FlowError::NotFound(_))
    ));
    assert!(matches!(h.service.cancel(&other, id).await, Err(FlowError::NotFound(_))));
}

#[tokio::test]
async fn cancelled_flows_are_gone() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 1 }))
        .await
        .unwrap()
        .flow_id;
    h.service.cancel(&h.deps, id).await.unwrap();
    let err = h.service.accept(&h.deps, id, &word("a")).await.unwrap_err();
    assert!(matches!(err, FlowError::NotFound(e) if e == id));
}

#[tokio::test]
async fn engine_undoes_appends_in_memory() {
    let h = harness();
    let mut graph = Graph::new(Box::new(IntentCollect { target: 2 }));
    let engine = Engine::new(&h.deps, Uuid::new_v4(), 16);
    engine.accept(&mut graph, &word("nested")).await.unwrap();
    assert_eq!(graph.node_count(), 1);

    h.deps.database.begin().await.unwrap();
    assert!(engine.accept(&mut graph, &word("fail")).await.is_err());
    h.deps.database.rollback().await.unwrap();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(
        engine.can_react_to(&graph).await.unwrap()[0].pointer.to_string(),
        "/0"
    );
}

/// A database whose commit is lost: the transaction rolls back and the
/// caller is told so.
struct LostCommit {
    inner: Arc<MemoryBackend>,
    armed: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl Database for LostCommit {
    async fn begin(&self) -> Result<(), ServiceError> {
        self.inner.begin().await
    }

    async fn commit(&self) -> Result<(), ServiceError> {
        if self.armed.load(std::sync::atomic::Ordering::SeqCst) {
            self.inner.rollback().await?;
            return Err(ServiceError::Backend("connection reset during commit".into()));
        }
        self.inner.commit().await
    }

    async fn rollback(&self) -> Result<(), ServiceError> {
        self.inner.rollback().await
    }
}

fn with_lost_commit(h: &Harness) -> (Dependencies, Arc<LostCommit>) {
    let database = Arc::new(LostCommit {
        inner: h.backend.clone(),
        armed: std::sync::atomic::AtomicBool::new(true),
    });
    let mut deps = h.deps.clone();
    deps.database = database.clone();
    (deps, database)
}

#[tokio::test]
async fn failed_commit_takes_back_appended_records() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    let (deps, database) = with_lost_commit(&h);

    let err = h.service.accept(&deps, id, &word("ok")).await.unwrap_err();
    assert!(matches!(err.service_error(), Some(ServiceError::Backend(_))));
    assert_eq!(h.store.load(id).await.unwrap().version(), 0);
    assert!(h.backend.users().await.is_empty());
    assert!(h.backend.events().await.is_empty());

    database.armed.store(false, std::sync::atomic::Ordering::SeqCst);
    h.service.accept(&deps, id, &word("ok")).await.unwrap();
    assert_eq!(h.store.load(id).await.unwrap().version(), 1);
    assert_eq!(h.backend.users().await.len(), 1);
}

#[tokio::test]
async fn failed_commit_on_create_leaves_no_flow() {
    let h = harness();
    let (deps, _) = with_lost_commit(&h);
    let err = h
        .service
        .create(&deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Service);
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn truncate_refuses_a_moved_flow() {
    let h = harness();
    let id = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 3 }))
        .await
        .unwrap()
        .flow_id;
    h.service.accept(&h.deps, id, &word("a")).await.unwrap();
    h.service.accept(&h.deps, id, &word("b")).await.unwrap();

    let err = h.store.truncate(id, 0, 1).await.unwrap_err();
    assert_eq!(
        err,
        StoreError::Conflict {
            flow_id: id,
            expected: 1,
            actual: 2
        }
    );
    h.store.truncate(id, 1, 2).await.unwrap();
    assert_eq!(h.store.load(id).await.unwrap().version(), 1);
}

#[tokio::test]
async fn purge_removes_only_expired_flows() {
    let h = harness();
    let old = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.backend.clock().advance(Duration::minutes(15));
    let fresh = h
        .service
        .create(&h.deps, Box::new(IntentCollect { target: 2 }))
        .await
        .unwrap()
        .flow_id;
    h.backend.clock().advance(Duration::minutes(6));

    assert_eq!(h.service.purge_expired(&h.deps).await.unwrap(), 1);
    assert!(matches!(h.store.load(old).await, Err(StoreError::NotFound(_))));
    assert!(h.service.get(&h.deps, fresh).await.is_ok());
    assert_eq!(h.service.purge_expired(&h.deps).await.unwrap(), 0);
}
