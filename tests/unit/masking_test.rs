use secrecy::SecretString;
use sqlgate::masking::{format_optional_secret, format_secret};

#[test]
fn test_long_secret_keeps_only_suffix() {
    let secret = SecretString::from("sk-or-v1-abcdef0123456789".to_string());
    let output = format_secret(&secret, false);
    assert_eq!(output, "[REDACTED]…6789");
    assert!(!output.contains("abcdef"));
}

#[test]
fn test_short_secret_fully_redacted() {
    let secret = SecretString::from("short".to_string());
    assert_eq!(format_secret(&secret, false), "[REDACTED]");
}

#[test]
fn test_secret_exposed_with_show_secrets() {
    let secret = SecretString::from("sk-or-v1-abcdef0123456789".to_string());
    assert_eq!(format_secret(&secret, true), "sk-or-v1-abcdef0123456789");
}

#[test]
fn test_secret_debug_is_redacted() {
    let secret = SecretString::from("password123".to_string());
    let debug_output = format!("{:?}", secret);
    assert!(!debug_output.contains("password123"), "Debug should not expose secret: {}", debug_output);
}

#[test]
fn test_optional_secret() {
    assert_eq!(format_optional_secret(None, false), "(not set)");
    let secret = SecretString::from("short".to_string());
    assert_eq!(format_optional_secret(Some(&secret), false), "[REDACTED]");
}
