//! Email address parsing and domain classification.

use std::collections::{BTreeSet, HashSet};

/// Consumer mail providers; their domains never become companies.
pub const COMMON_EMAIL_PROVIDERS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "outlook.com",
    "hotmail.com",
    "icloud.com",
];

/// Extract the bare address from `"Name <addr>"` or a plain address.
///
/// Returns `None` for blank input or text without an `@`.
pub fn extract_email_from_address(address: &str) -> Option<String> {
    let address = address.trim();
    let candidate = match (address.find('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => address[start + 1..end].trim(),
        _ => address.trim_matches('"'),
    };
    if candidate.is_empty() || !candidate.contains('@') {
        return None;
    }
    Some(candidate.to_lowercase())
}

/// Lowercased addresses from a stored address column.
///
/// Accepts a JSON array of strings, a JSON-encoded string, or a bare address.
pub fn extract_emails_from_json(value: &str) -> BTreeSet<String> {
    let mut emails = BTreeSet::new();
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(serde_json::Value::Array(items)) => {
            for item in items {
                let raw = match item {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                if let Some(email) = extract_email_from_address(&raw) {
                    emails.insert(email);
                }
            }
        }
        Ok(serde_json::Value::String(s)) => {
            if let Some(email) = extract_email_from_address(&s) {
                emails.insert(email);
            }
        }
        _ => {
            if let Some(email) = extract_email_from_address(value) {
                emails.insert(email);
            }
        }
    }
    emails
}

/// Lowercased domain part; empty when there is no `@`.
pub fn extract_domain_from_email(email: &str) -> String {
    email
        .split_once('@')
        .map(|(_, domain)| domain.trim().to_lowercase())
        .unwrap_or_default()
}

/// Lowercased local part; the whole input when there is no `@`.
pub fn extract_local_part_from_email(email: &str) -> String {
    email
        .split_once('@')
        .map(|(local, _)| local)
        .unwrap_or(email)
        .trim()
        .to_lowercase()
}

/// A domain that may become a company: not blank, not a consumer provider,
/// not on the user's blocklist.
pub fn is_business_domain(domain: &str, blocklist: &HashSet<String>) -> bool {
    let domain = domain.trim().to_lowercase();
    !domain.is_empty()
        && !COMMON_EMAIL_PROVIDERS.contains(&domain.as_str())
        && !blocklist.contains(&domain)
}

/// Company display name from its domain: `"acme.io"` -> `"Acme"`.
pub fn company_name_from_domain(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or(domain).to_lowercase();
    let mut chars = label.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Display name from a `"Name <addr>"` header, else the address local part.
pub fn display_name_from_address(address: &str) -> String {
    let address = address.trim();
    if let Some(start) = address.find('<') {
        let name = address[..start].trim().trim_matches('"').trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    extract_email_from_address(address)
        .map(|email| extract_local_part_from_email(&email))
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_email_from_address() {
        assert_eq!(
            extract_email_from_address("Dana Scully <Dana@Acme.io>").as_deref(),
            Some("dana@acme.io")
        );
        assert_eq!(
            extract_email_from_address("  ops@acme.io ").as_deref(),
            Some("ops@acme.io")
        );
        assert_eq!(extract_email_from_address("   "), None);
        assert_eq!(extract_email_from_address("undisclosed-recipients:;"), None);
    }

    #[test]
    fn test_extract_emails_from_json_shapes() {
        let from_array = extract_emails_from_json(r#"["A <a@x.com>", "b@y.com", "b@y.com"]"#);
        assert_eq!(from_array.into_iter().collect::<Vec<_>>(), vec!["a@x.com", "b@y.com"]);

        let from_string = extract_emails_from_json(r#""C <c@z.com>""#);
        assert!(from_string.contains("c@z.com"));

        let bare = extract_emails_from_json("d@w.com");
        assert!(bare.contains("d@w.com"));

        assert!(extract_emails_from_json("[]").is_empty());
    }

    #[test]
    fn test_domain_and_local_part() {
        assert_eq!(extract_domain_from_email("dana@Acme.IO"), "acme.io");
        assert_eq!(extract_domain_from_email("no-at-sign"), "");
        assert_eq!(extract_local_part_from_email("Dana.S@acme.io"), "dana.s");
        assert_eq!(extract_local_part_from_email("plain"), "plain");
    }

    #[test]
    fn test_is_business_domain() {
        let mut blocked = HashSet::new();
        blocked.insert("noreply.vendor.com".to_string());
        assert!(is_business_domain("acme.io", &blocked));
        assert!(!is_business_domain("Gmail.com", &blocked));
        assert!(!is_business_domain("icloud.com", &blocked));
        assert!(!is_business_domain("noreply.vendor.com", &blocked));
        assert!(!is_business_domain("", &blocked));
    }

    #[test]
    fn test_company_name_from_domain() {
        assert_eq!(company_name_from_domain("acme.io"), "Acme");
        assert_eq!(company_name_from_domain("NEWSTARTUP.com"), "Newstartup");
        assert_eq!(company_name_from_domain("localhost"), "Localhost");
    }

    #[test]
    fn test_display_name_from_address() {
        assert_eq!(display_name_from_address("\"Dana S\" <dana@acme.io>"), "Dana S");
        assert_eq!(display_name_from_address("dana@acme.io"), "dana");
    }
}
