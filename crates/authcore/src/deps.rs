//! Collaborator services a flow step may call, bundled per request.

use crate::events::EventSink;
use crate::{
    AuthenticatorInfo, AuthenticatorType, IdentityInfo, IdentitySpec, JsonPointer, Purpose,
    ServiceError, Session, TenantConfig, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait UserService: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<User, ServiceError>;

    async fn create(&self, user: &User) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<IdentityInfo, ServiceError>;

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<IdentityInfo>, ServiceError>;

    /// The stored identity denoted by `spec`, if any.
    async fn search_by_spec(&self, spec: &IdentitySpec)
        -> Result<Option<IdentityInfo>, ServiceError>;

    /// Identities whose standard claim at `pointer` equals `value`.
    async fn list_by_claim(
        &self,
        pointer: &JsonPointer,
        value: &str,
    ) -> Result<Vec<IdentityInfo>, ServiceError>;

    /// Fails with [`ServiceError::DuplicatedIdentity`] when `info` would
    /// collide with a stored identity.
    async fn check_duplicated(&self, info: &IdentityInfo) -> Result<(), ServiceError>;

    async fn create(&self, info: &IdentityInfo) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait AuthenticatorService: Send + Sync {
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<AuthenticatorInfo>, ServiceError>;

    async fn create(&self, info: &AuthenticatorInfo) -> Result<(), ServiceError>;

    /// Checks `secret` against the user's authenticators of type `ty`.
    async fn verify(
        &self,
        user_id: Uuid,
        ty: AuthenticatorType,
        secret: &str,
    ) -> Result<AuthenticatorInfo, ServiceError>;

    async fn reset_password(&self, user_id: Uuid, new_password: &str) -> Result<(), ServiceError>;

    /// Checks a TOTP code against a secret that is not stored yet.
    async fn check_totp(&self, secret: &str, code: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Issues a fresh code for `target` and delivers it out of band.
    async fn send_code(&self, target: &str, purpose: Purpose) -> Result<(), ServiceError>;

    /// Consumes a code. Marks `target` verified for `purpose` on success.
    async fn verify_code(&self, target: &str, purpose: Purpose, code: &str)
        -> Result<(), ServiceError>;

    async fn is_verified(&self, target: &str, purpose: Purpose) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Takes one token from `bucket`, or fails with
    /// [`ServiceError::RateLimited`].
    async fn consume(&self, bucket: &str) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), ServiceError>;
}

/// The transaction boundary around one transition.
#[async_trait]
pub trait Database: Send + Sync {
    async fn begin(&self) -> Result<(), ServiceError>;

    async fn commit(&self) -> Result<(), ServiceError>;

    async fn rollback(&self) -> Result<(), ServiceError>;
}

/// Passed into every graph operation. Owned by the caller for one request.
#[derive(Clone)]
pub struct Dependencies {
    pub config: Arc<TenantConfig>,
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserService>,
    pub identities: Arc<dyn IdentityService>,
    pub authenticators: Arc<dyn AuthenticatorService>,
    pub verification: Arc<dyn VerificationService>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub sessions: Arc<dyn SessionService>,
    pub events: Arc<dyn EventSink>,
    pub database: Arc<dyn Database>,
}

impl Dependencies {
    pub fn tenant_id(&self) -> &str {
        &self.config.tenant_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
