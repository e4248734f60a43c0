//! Core vocabulary of the authentication flow engine
//!
//! Flows are graphs of steps: intents decide what comes next, nodes record
//! what already happened. This crate defines those capabilities, the graph
//! they live in, the inputs they accept and the collaborator services they
//! call. Executing and persisting flows lives in `authruntime`.

mod config;
mod deps;
mod error;
pub mod events;
mod graph;
mod input;
mod milestone;
mod model;
mod pointer;
pub mod reactor;
mod schema;

pub use config::{
    AccountLinkingAction, AccountLinkingConfig, AccountLinkingOAuth, AccountRecoveryConfig,
    AuditConfig, AuthenticationConfig, LoginIdConfig, OnFailure, PrimaryMethod, SecondaryMethod,
    SecondaryMode, TenantConfig,
};
pub use deps::{
    AuthenticatorService, Clock, Database, Dependencies, IdentityService, RateLimiter,
    SessionService, SystemClock, UserService, VerificationService,
};
pub use error::{ErrorClass, FlowError, InputError, RegistryError, ServiceError};
pub use graph::{Flows, Graph, GraphNode};
pub use input::{
    match_input, AsAny, Input, InputDescriptor, InputSchema, OfferedSchema, RawInput, TypedSchema,
};
pub use milestone::{Demand, Milestone};
pub use model::{
    AuthenticatorInfo, AuthenticatorKind, AuthenticatorType, IdentityInfo, IdentitySpec,
    IdentityType, LoginIdKeyType, Purpose, Session, User,
};
pub use pointer::{JsonPointer, PointerParseError};
pub use reactor::{AsReactor, Edge, Intent, Kind, KindOf, Node, Persist, Reaction, Reactor};
pub use schema::{CompiledSchema, Schema, SchemaType, Violation};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
