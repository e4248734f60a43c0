use authcore::{AccountLinkingConfig, AuthenticatorType, IdentityInfo, IdentitySpec, Milestone};
use uuid::Uuid;

/// The identity a signup will create, and the existing user to attach it to
/// when account linking matched one.
#[derive(Debug, Clone)]
pub struct IdentitySelected {
    pub spec: IdentitySpec,
    pub link_to: Option<Uuid>,
}
impl Milestone for IdentitySelected {}

#[derive(Debug, Clone, Copy)]
pub struct UserCreated(pub Uuid);
impl Milestone for UserCreated {}

#[derive(Debug, Clone)]
pub struct IdentityCreated(pub IdentityInfo);
impl Milestone for IdentityCreated {}

/// `ty` is `None` when an external provider vouched for the user.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryAuthenticated {
    pub user_id: Uuid,
    pub ty: Option<AuthenticatorType>,
}
impl Milestone for PrimaryAuthenticated {}

#[derive(Debug, Clone, Copy)]
pub struct SecondaryAuthenticated {
    pub user_id: Uuid,
    pub ty: AuthenticatorType,
}
impl Milestone for SecondaryAuthenticated {}

#[derive(Debug, Clone, Copy)]
pub struct SessionCreated(pub Uuid);
impl Milestone for SessionCreated {}

#[derive(Debug, Clone)]
pub struct LoginLinkSent {
    pub target: String,
}
impl Milestone for LoginLinkSent {}

#[derive(Debug, Clone)]
pub struct OOBOTPSent {
    pub target: String,
}
impl Milestone for OOBOTPSent {}

/// Account linking rules declared by an enclosing intent.
#[derive(Debug, Clone)]
pub struct AccountLinkingRules(pub AccountLinkingConfig);
impl Milestone for AccountLinkingRules {}

#[derive(Debug, Clone)]
pub struct RecoveryIdentified {
    pub target: String,
    /// `None` when nothing matched and the tenant ignores failures.
    pub identity: Option<IdentityInfo>,
}
impl Milestone for RecoveryIdentified {}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryCodeSent;
impl Milestone for RecoveryCodeSent {}

#[derive(Debug, Clone, Copy)]
pub struct RecoveryVerified {
    pub user_id: Uuid,
}
impl Milestone for RecoveryVerified {}

#[derive(Debug, Clone, Copy)]
pub struct PasswordReset;
impl Milestone for PasswordReset {}
