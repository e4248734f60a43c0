//! In-memory implementations of every collaborator service.
//!
//! Transactions are snapshots: `begin` captures the whole state and
//! `rollback` restores it. Only one transaction runs at a time; `begin`
//! waits for the previous one to finish. Rate-limit counters live outside
//! the transactional state.

use async_trait::async_trait;
use authcore::events::{EventBus, EventEnvelope, EventSink};
use authcore::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorService, AuthenticatorType, Clock,
    Database, Dependencies, IdentityInfo, IdentityService, IdentitySpec, JsonPointer, Purpose,
    RateLimiter, ServiceError, Session, SessionService, TenantConfig, User, UserService,
    VerificationService,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// A clock that only moves when told to.
pub struct MockClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl MockClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Deterministic stand-in for a TOTP code derived from `secret`.
pub fn totp_code(secret: &str) -> String {
    let n = secret
        .bytes()
        .fold(7u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    format!("{:06}", n % 1_000_000)
}

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<Uuid, User>,
    identities: Vec<IdentityInfo>,
    authenticators: Vec<AuthenticatorInfo>,
    codes: HashMap<(String, Purpose), String>,
    verified: HashSet<(String, Purpose)>,
    sessions: Vec<Session>,
    issued: u32,
}

struct Transaction {
    snapshot: State,
    _guard: OwnedMutexGuard<()>,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    gate: Arc<Mutex<()>>,
    tx: Mutex<Option<Transaction>>,
    limits: Mutex<HashMap<String, u32>>,
    dispatched: Mutex<Vec<EventEnvelope>>,
    failing_sink: std::sync::atomic::AtomicBool,
    clock: Arc<MockClock>,
    bus: EventBus,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(MockClock::default()))
    }

    pub fn with_clock(clock: Arc<MockClock>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            gate: Arc::new(Mutex::new(())),
            tx: Mutex::new(None),
            limits: Mutex::new(HashMap::new()),
            dispatched: Mutex::new(Vec::new()),
            failing_sink: std::sync::atomic::AtomicBool::new(false),
            clock,
            bus: EventBus::default(),
        })
    }

    /// A dependency context backed entirely by this backend.
    pub fn dependencies(self: &Arc<Self>, config: TenantConfig) -> Dependencies {
        Dependencies {
            config: Arc::new(config),
            clock: self.clock.clone(),
            users: self.clone(),
            identities: self.clone(),
            authenticators: self.clone(),
            verification: self.clone(),
            rate_limiter: self.clone(),
            sessions: self.clone(),
            events: self.clone(),
            database: self.clone(),
        }
    }

    pub fn clock(&self) -> &Arc<MockClock> {
        &self.clock
    }

    /// Subscribes to every dispatched event.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<EventEnvelope> {
        self.bus.subscribe()
    }

    pub async fn seed_user(&self) -> User {
        let user = User {
            id: Uuid::new_v4(),
            is_anonymous: false,
            created_at: self.clock.now(),
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn seed_anonymous_user(&self) -> User {
        let user = User {
            id: Uuid::new_v4(),
            is_anonymous: true,
            created_at: self.clock.now(),
        };
        self.state.lock().await.users.insert(user.id, user.clone());
        user
    }

    pub async fn seed_identity(&self, user_id: Uuid, spec: IdentitySpec) -> IdentityInfo {
        let info = IdentityInfo::new(user_id, spec);
        self.state.lock().await.identities.push(info.clone());
        info
    }

    pub async fn seed_password(&self, user_id: Uuid, password: &str) -> AuthenticatorInfo {
        let info = AuthenticatorInfo::new(
            user_id,
            AuthenticatorKind::Primary,
            AuthenticatorType::Password,
            password,
        );
        self.state.lock().await.authenticators.push(info.clone());
        info
    }

    pub async fn seed_totp(&self, user_id: Uuid, secret: &str) -> AuthenticatorInfo {
        let info = AuthenticatorInfo::new(
            user_id,
            AuthenticatorKind::Secondary,
            AuthenticatorType::Totp,
            secret,
        );
        self.state.lock().await.authenticators.push(info.clone());
        info
    }

    pub async fn seed_oob_sms(
        &self,
        user_id: Uuid,
        kind: AuthenticatorKind,
        phone: &str,
    ) -> AuthenticatorInfo {
        let info = AuthenticatorInfo::new(user_id, kind, AuthenticatorType::OobSms, phone);
        self.state.lock().await.authenticators.push(info.clone());
        info
    }

    /// Allows `remaining` more tokens from `bucket`.
    pub async fn set_limit(&self, bucket: &str, remaining: u32) {
        self.limits.lock().await.insert(bucket.to_string(), remaining);
    }

    /// Makes every subsequent event dispatch fail.
    pub fn fail_event_dispatch(&self, fail: bool) {
        self.failing_sink
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// The last code issued to `target`, if still unused.
    pub async fn last_code(&self, target: &str, purpose: Purpose) -> Option<String> {
        self.state
            .lock()
            .await
            .codes
            .get(&(target.to_string(), purpose))
            .cloned()
    }

    pub async fn codes_issued(&self) -> u32 {
        self.state.lock().await.issued
    }

    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.values().cloned().collect()
    }

    pub async fn identities(&self) -> Vec<IdentityInfo> {
        self.state.lock().await.identities.clone()
    }

    pub async fn authenticators(&self) -> Vec<AuthenticatorInfo> {
        self.state.lock().await.authenticators.clone()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.state.lock().await.sessions.clone()
    }

    pub async fn events(&self) -> Vec<EventEnvelope> {
        self.dispatched.lock().await.clone()
    }

    pub async fn event_kinds(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .await
            .iter()
            .map(|e| e.event.kind.clone())
            .collect()
    }
}

#[async_trait]
impl UserService for MemoryBackend {
    async fn get(&self, id: Uuid) -> Result<User, ServiceError> {
        self.state
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(ServiceError::UserNotFound)
    }

    async fn create(&self, user: &User) -> Result<(), ServiceError> {
        self.state.lock().await.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl IdentityService for MemoryBackend {
    async fn get(&self, id: Uuid) -> Result<IdentityInfo, ServiceError> {
        self.state
            .lock()
            .await
            .identities
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(ServiceError::IdentityNotFound)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<IdentityInfo>, ServiceError> {
        Ok(self
            .state
            .lock()
            .await
            .identities
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn search_by_spec(
        &self,
        spec: &IdentitySpec,
    ) -> Result<Option<IdentityInfo>, ServiceError> {
        Ok(self
            .state
            .lock()
            .await
            .identities
            .iter()
            .find(|i| i.spec.same_identity(spec))
            .cloned())
    }

    async fn list_by_claim(
        &self,
        pointer: &JsonPointer,
        value: &str,
    ) -> Result<Vec<IdentityInfo>, ServiceError> {
        Ok(self
            .state
            .lock()
            .await
            .identities
            .iter()
            .filter(|i| i.spec.claim(pointer).as_deref() == Some(value))
            .cloned()
            .collect())
    }

    async fn check_duplicated(&self, info: &IdentityInfo) -> Result<(), ServiceError> {
        let state = self.state.lock().await;
        if state.identities.iter().any(|i| i.spec.same_identity(&info.spec)) {
            return Err(ServiceError::DuplicatedIdentity);
        }
        Ok(())
    }

    async fn create(&self, info: &IdentityInfo) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&info.user_id) {
            return Err(ServiceError::UserNotFound);
        }
        state.identities.push(info.clone());
        Ok(())
    }
}

#[async_trait]
impl AuthenticatorService for MemoryBackend {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<AuthenticatorInfo>, ServiceError> {
        Ok(self
            .state
            .lock()
            .await
            .authenticators
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, info: &AuthenticatorInfo) -> Result<(), ServiceError> {
        self.state.lock().await.authenticators.push(info.clone());
        Ok(())
    }

    async fn verify(
        &self,
        user_id: Uuid,
        ty: AuthenticatorType,
        secret: &str,
    ) -> Result<AuthenticatorInfo, ServiceError> {
        let state = self.state.lock().await;
        let mut candidates = state
            .authenticators
            .iter()
            .filter(|a| a.user_id == user_id && a.ty == ty)
            .peekable();
        if candidates.peek().is_none() {
            return Err(ServiceError::NoAuthenticator);
        }
        candidates
            .find(|a| match ty {
                AuthenticatorType::Totp => totp_code(&a.credential) == secret,
                _ => a.credential == secret,
            })
            .cloned()
            .ok_or(ServiceError::InvalidCredentials)
    }

    async fn reset_password(&self, user_id: Uuid, new_password: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        let existing = state
            .authenticators
            .iter_mut()
            .find(|a| a.user_id == user_id && a.ty == AuthenticatorType::Password);
        match existing {
            Some(a) => a.credential = new_password.to_string(),
            None => state.authenticators.push(AuthenticatorInfo::new(
                user_id,
                AuthenticatorKind::Primary,
                AuthenticatorType::Password,
                new_password,
            )),
        }
        Ok(())
    }

    async fn check_totp(&self, secret: &str, code: &str) -> Result<(), ServiceError> {
        if totp_code(secret) == code {
            Ok(())
        } else {
            Err(ServiceError::InvalidCode)
        }
    }
}

#[async_trait]
impl VerificationService for MemoryBackend {
    async fn send_code(&self, target: &str, purpose: Purpose) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.issued += 1;
        let code = format!("{:06}", (Uuid::new_v4().as_u128() % 1_000_000) as u32);
        tracing::debug!(to = target, purpose = purpose.as_str(), "issued verification code");
        let key = (target.to_string(), purpose);
        state.verified.remove(&key);
        state.codes.insert(key, code);
        Ok(())
    }

    async fn verify_code(
        &self,
        target: &str,
        purpose: Purpose,
        code: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        let key = (target.to_string(), purpose);
        match state.codes.get(&key) {
            Some(expected) if expected == code => {
                state.codes.remove(&key);
                state.verified.insert(key);
                Ok(())
            }
            _ => Err(ServiceError::InvalidCode),
        }
    }

    async fn is_verified(&self, target: &str, purpose: Purpose) -> Result<bool, ServiceError> {
        Ok(self
            .state
            .lock()
            .await
            .verified
            .contains(&(target.to_string(), purpose)))
    }
}

#[async_trait]
impl RateLimiter for MemoryBackend {
    async fn consume(&self, bucket: &str) -> Result<(), ServiceError> {
        let mut limits = self.limits.lock().await;
        match limits.get_mut(bucket) {
            Some(0) => Err(ServiceError::RateLimited {
                bucket: bucket.to_string(),
            }),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionService for MemoryBackend {
    async fn create(&self, session: &Session) -> Result<(), ServiceError> {
        self.state.lock().await.sessions.push(session.clone());
        Ok(())
    }
}

#[async_trait]
impl EventSink for MemoryBackend {
    async fn dispatch(&self, envelope: EventEnvelope) -> Result<(), ServiceError> {
        if self.failing_sink.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Backend("event sink unavailable".to_string()));
        }
        self.dispatched.lock().await.push(envelope.clone());
        self.bus.dispatch(envelope).await
    }
}

#[async_trait]
impl Database for MemoryBackend {
    async fn begin(&self) -> Result<(), ServiceError> {
        let guard = self.gate.clone().lock_owned().await;
        let snapshot = self.state.lock().await.clone();
        *self.tx.lock().await = Some(Transaction {
            snapshot,
            _guard: guard,
        });
        Ok(())
    }

    async fn commit(&self) -> Result<(), ServiceError> {
        self.tx
            .lock()
            .await
            .take()
            .map(|_| ())
            .ok_or_else(|| ServiceError::Backend("commit without transaction".to_string()))
    }

    async fn rollback(&self) -> Result<(), ServiceError> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .ok_or_else(|| ServiceError::Backend("rollback without transaction".to_string()))?;
        *self.state.lock().await = tx.snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rollback_restores_state_captured_at_begin() {
        let backend = MemoryBackend::new();
        let user = backend.seed_user().await;

        backend.begin().await.unwrap();
        IdentityService::create(
            backend.as_ref(),
            &IdentityInfo::new(user.id, IdentitySpec::login_id(authcore::LoginIdKeyType::Email, "a@example.com")),
        )
        .await
        .unwrap();
        assert_eq!(backend.identities().await.len(), 1);
        backend.rollback().await.unwrap();
        assert!(backend.identities().await.is_empty());

        assert!(backend.commit().await.is_err());
    }

    #[tokio::test]
    async fn rate_limits_are_not_transactional() {
        let backend = MemoryBackend::new();
        backend.set_limit("verify_password", 1).await;
        backend.begin().await.unwrap();
        backend.consume("verify_password").await.unwrap();
        backend.rollback().await.unwrap();
        assert!(matches!(
            backend.consume("verify_password").await,
            Err(ServiceError::RateLimited { .. })
        ));
        assert!(backend.consume("unlimited").await.is_ok());
    }

    #[tokio::test]
    async fn codes_are_single_use() {
        let backend = MemoryBackend::new();
        backend.send_code("a@example.com", Purpose::LoginLink).await.unwrap();
        let code = backend.last_code("a@example.com", Purpose::LoginLink).await.unwrap();
        assert!(backend
            .verify_code("a@example.com", Purpose::LoginLink, "nope")
            .await
            .is_err());
        backend
            .verify_code("a@example.com", Purpose::LoginLink, &code)
            .await
            .unwrap();
        assert!(backend.is_verified("a@example.com", Purpose::LoginLink).await.unwrap());
        assert!(backend
            .verify_code("a@example.com", Purpose::LoginLink, &code)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn sending_a_new_code_revokes_the_old_verification() {
        let backend = MemoryBackend::new();
        backend.send_code("a@example.com", Purpose::LoginLink).await.unwrap();
        let code = backend.last_code("a@example.com", Purpose::LoginLink).await.unwrap();
        backend
            .verify_code("a@example.com", Purpose::LoginLink, &code)
            .await
            .unwrap();

        backend.send_code("a@example.com", Purpose::LoginLink).await.unwrap();
        assert!(!backend.is_verified("a@example.com", Purpose::LoginLink).await.unwrap());
        assert!(backend.send_code("a@example.com", Purpose::AccountRecovery).await.is_ok());
    }
}
