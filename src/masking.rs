use secrecy::{ExposeSecret, SecretString};

const VISIBLE_SUFFIX: usize = 4;
const MIN_LEN_FOR_HINT: usize = 12;

/// Format a secret for diagnostics.
///
/// Long keys keep their last four characters so operators can tell keys
/// apart; short ones are fully redacted.
pub fn format_secret(secret: &SecretString, show_secrets: bool) -> String {
    let value = secret.expose_secret();
    if show_secrets {
        return value.to_string();
    }
    let len = value.chars().count();
    if len < MIN_LEN_FOR_HINT {
        return "[REDACTED]".to_string();
    }
    let suffix: String = value.chars().skip(len - VISIBLE_SUFFIX).collect();
    format!("[REDACTED]…{}", suffix)
}

pub fn format_optional_secret(secret: Option<&SecretString>, show_secrets: bool) -> String {
    match secret {
        Some(s) => format_secret(s, show_secrets),
        None => "(not set)".to_string(),
    }
}
