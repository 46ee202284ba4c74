//! Name validation for cluster, deployment and namespace names
//!
//! Names end up as Kubernetes object names and label values, so they follow
//! the RFC 1035 label rules Kubernetes applies to services and namespaces.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Maximum length of a DNS label
pub const DNS_LABEL_MAX_LEN: usize = 63;

static DNS1035_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("valid label regex"));

/// A name that cannot be used as a DNS label
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field} {value:?}: {}", .reasons.join("; "))]
pub struct ValidationError {
    pub field: &'static str,
    pub value: String,
    pub reasons: Vec<String>,
}

/// Validate `value` as an RFC 1035 label.
///
/// `field` names the offending input in the error message.
pub fn validate_dns1035_label(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let mut reasons = Vec::new();

    if value.len() > DNS_LABEL_MAX_LEN {
        reasons.push(format!("must be no more than {} characters", DNS_LABEL_MAX_LEN));
    }
    if !DNS1035_LABEL.is_match(value) {
        reasons.push(
            "must consist of lower case alphanumeric characters or '-', start with an \
             alphabetic character, and end with an alphanumeric character"
                .to_string(),
        );
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            field,
            value: value.to_string(),
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_labels() {
        assert!(validate_dns1035_label("name", "d1").is_ok());
        assert!(validate_dns1035_label("name", "my-deployment-2").is_ok());
        assert!(validate_dns1035_label("name", &"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_rejects_bad_labels() {
        for bad in ["", "1abc", "Upper", "ends-", "has_underscore", "dot.ted"] {
            assert!(validate_dns1035_label("name", bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_rejects_long_labels() {
        let err = validate_dns1035_label("namespace", &"a".repeat(64)).unwrap_err();
        assert_eq!(err.field, "namespace");
        assert_eq!(err.reasons.len(), 1);
        assert!(err.to_string().contains("63"));
    }
}
