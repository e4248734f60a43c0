//! Authentication options as shown to the client before it picks one.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticateOption {
    pub authentication: &'static str,
    /// Where the code or link goes, partly hidden. OOB methods only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked_display_name: Option<String>,
}

impl AuthenticateOption {
    pub fn plain(authentication: &'static str) -> Self {
        Self {
            authentication,
            masked_display_name: None,
        }
    }

    pub fn masked(authentication: &'static str, display_name: String) -> Self {
        Self {
            authentication,
            masked_display_name: Some(display_name),
        }
    }
}

/// Keeps the first character of the local part and the whole domain.
pub fn mask_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Keeps the `+` prefix and the last four digits.
pub fn mask_phone(number: &str) -> String {
    let (prefix, digits) = match number.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", number),
    };
    let count = digits.chars().count();
    let keep = count.min(4);
    let tail: String = digits.chars().skip(count - keep).collect();
    format!("{}{}{}", prefix, "*".repeat(count - keep), tail)
}
