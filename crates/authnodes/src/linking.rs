//! Account linking for identities arriving from OAuth providers.

use crate::milestones::AccountLinkingRules;
use authcore::{
    AccountLinkingAction, AccountLinkingConfig, Dependencies, FlowError, Graph, IdentityInfo,
    IdentitySpec, ServiceError,
};
use serde_json::json;
use uuid::Uuid;

/// Rules declared by the nearest intent that has any, with the tenant
/// defaults filling in providers it leaves out.
pub fn resolve_account_linking_config(deps: &Dependencies, root: &Graph) -> AccountLinkingConfig {
    match root.find_milestone::<AccountLinkingRules>() {
        Some(AccountLinkingRules(declared)) => declared.merge(&deps.config.account_linking),
        None => deps.config.account_linking.clone(),
    }
}

/// Existing identities that share the linking claim with `spec`.
pub async fn find_conflicts(
    deps: &Dependencies,
    config: &AccountLinkingConfig,
    spec: &IdentitySpec,
) -> Result<Vec<IdentityInfo>, FlowError> {
    let alias = match spec {
        IdentitySpec::OAuth { alias, .. } => alias,
        _ => return Ok(Vec::new()),
    };
    let rule = config.oauth_rule(alias);
    let value = match spec.claim(&rule.oauth_claim) {
        Some(value) => value,
        None => return Ok(Vec::new()),
    };
    Ok(deps
        .identities
        .list_by_claim(&rule.user_profile, &value)
        .await?)
}

/// Decides what a new OAuth identity does to existing accounts: nothing, or
/// attach itself to the returned user.
pub async fn link_oauth_identity(
    deps: &Dependencies,
    root: &Graph,
    spec: &IdentitySpec,
) -> Result<Option<Uuid>, FlowError> {
    if deps.identities.search_by_spec(spec).await?.is_some() {
        return Err(ServiceError::DuplicatedIdentity.into());
    }

    let config = resolve_account_linking_config(deps, root);
    let conflicts = find_conflicts(deps, &config, spec).await?;
    let first = match conflicts.first() {
        Some(first) => first,
        None => return Ok(None),
    };

    let alias = match spec {
        IdentitySpec::OAuth { alias, .. } => alias.as_str(),
        _ => "",
    };
    match config.oauth_rule(alias).action {
        AccountLinkingAction::Error => Err(FlowError::invariant_with(
            "AccountLinkingConflict",
            format!("{} identity conflicts with an existing account", alias),
            json!({
                "alias": alias,
                "conflicts": conflicts
                    .iter()
                    .map(|c| json!({ "identity_id": c.id, "type": c.identity_type() }))
                    .collect::<Vec<_>>(),
            }),
        )),
        AccountLinkingAction::LoginAndLink => {
            tracing::debug!(alias, user_id = %first.user_id, "linking identity to existing user");
            Ok(Some(first.user_id))
        }
    }
}
