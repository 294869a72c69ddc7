//! Masking of sensitive option values for display

const SENSITIVE: &[&str] = &["secret", "password", "token", "access_key", "session"];

/// True if an option with this name holds a credential
pub fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE.iter().any(|s| name.contains(s))
}

/// Mask a value: the first two characters, stars, then the length
pub fn mask(value: &str) -> String {
    if value.is_empty() {
        return "\"\"".to_string();
    }
    let prefix: String = value.chars().take(2).collect();
    format!("{}********** ({} chars)", prefix, value.chars().count())
}

/// Value of an option as it may be printed
pub fn sanitize(name: &str, value: &str) -> String {
    if value.is_empty() {
        "\"\"".to_string()
    } else if is_sensitive(name) {
        mask(value)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_names() {
        assert!(is_sensitive("secret_access_key"));
        assert!(is_sensitive("AWS_SESSION_TOKEN"));
        assert!(is_sensitive("access_key_id"));
        assert!(!is_sensitive("region"));
        assert!(!is_sensitive("endpoint"));
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("region", "eu-west-1"), "eu-west-1");
        assert_eq!(sanitize("secret_access_key", ""), "\"\"");
        assert_eq!(
            sanitize("secret_access_key", "wJalrXUtnFEMI"),
            "wJ********** (13 chars)"
        );
    }
}
