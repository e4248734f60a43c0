//! Built-in authentication flows
//!
//! Login (password, email link or SMS code), signup with account linking,
//! account recovery, MFA and identity management, expressed as intents and
//! nodes for the flow runtime.

mod add_identity;
mod authenticate;
mod authenticator;
mod identity;
pub mod inputs;
pub mod linking;
mod login;
mod login_link;
pub mod milestones;
mod oob_otp;
pub mod options;
mod password;
mod recovery;
mod session;
mod signup;
mod totp;

pub use add_identity::IntentAddIdentity;
pub use authenticate::IntentAuthenticate;
pub use authenticator::{NodeAuthenticated, NodeDoCreateAuthenticator, NodeOAuthAuthenticated};
pub use identity::{NodeDoCreateIdentity, NodeDoCreateUser, NodeIdentitySelected};
pub use login::IntentLogin;
pub use login_link::{IntentAuthenticateEmailLoginLink, NodeDoSendLoginLink};
pub use oob_otp::{IntentAuthenticateOOBOTPPhone, NodeDoSendOOBOTP};
pub use password::IntentAuthenticatePassword;
pub use recovery::{
    IntentAccountRecovery, NodeDoResetPassword, NodeDoSendRecoveryCode,
    NodeDoUseAccountRecoveryIdentity, NodeUseAccountRecoveryIdentity, NodeVerifiedRecoveryCode,
};
pub use session::NodeDoCreateSession;
pub use signup::IntentSignup;
pub use totp::{IntentAuthenticateTOTP, IntentEnrollTOTP};
use authruntime::Registry;

/// Register every built-in intent and node with a registry
pub fn register_all(registry: &mut Registry) {
    registry
        .register_intent::<IntentAuthenticate>()
        .register_intent::<IntentLogin>()
        .register_intent::<IntentSignup>()
        .register_intent::<IntentAuthenticatePassword>()
        .register_intent::<IntentAuthenticateEmailLoginLink>()
        .register_intent::<IntentAuthenticateOOBOTPPhone>()
        .register_intent::<IntentAuthenticateTOTP>()
        .register_intent::<IntentEnrollTOTP>()
        .register_intent::<IntentAddIdentity>()
        .register_intent::<IntentAccountRecovery>();

    registry
        .register_node::<NodeAuthenticated>()
        .register_node::<NodeOAuthAuthenticated>()
        .register_node::<NodeDoCreateAuthenticator>()
        .register_node::<NodeIdentitySelected>()
        .register_node::<NodeDoCreateUser>()
        .register_node::<NodeDoCreateIdentity>()
        .register_node::<NodeDoSendLoginLink>()
        .register_node::<NodeDoSendOOBOTP>()
        .register_node::<NodeDoCreateSession>()
        .register_node::<NodeUseAccountRecoveryIdentity>()
        .register_node::<NodeDoUseAccountRecoveryIdentity>()
        .register_node::<NodeDoSendRecoveryCode>()
        .register_node::<NodeVerifiedRecoveryCode>()
        .register_node::<NodeDoResetPassword>();
}
