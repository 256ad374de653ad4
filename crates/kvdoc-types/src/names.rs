//! Name validation for classes, fields, and buckets.
//!
//! - Class and field names are identifiers: ASCII letters, digits and `_`,
//!   not starting with a digit.
//! - Bucket names must be non-empty, contain no whitespace, `/` or control
//!   characters, and must not start with `_`. The `_` prefix is reserved for
//!   unique-index buckets (see [`unique_bucket_name`]).

use crate::error::TypeError;

/// Characters that are forbidden anywhere in a bucket name.
const FORBIDDEN_BUCKET_CHARS: &[char] = &[' ', '\t', '\n', '\r', '/', '\\'];

/// Prefix reserved for buckets owned by the mapping layer itself.
pub const RESERVED_BUCKET_PREFIX: char = '_';

fn invalid(what: &'static str, name: &str, reason: impl Into<String>) -> TypeError {
    TypeError::InvalidName {
        what,
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn validate_identifier(what: &'static str, name: &str) -> Result<(), TypeError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(invalid(what, name, "must not be empty"));
    };
    if first.is_ascii_digit() {
        return Err(invalid(what, name, "must not start with a digit"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(invalid(what, name, format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}

/// Validate a document class name.
///
/// ```
/// use kvdoc_types::names::validate_class_name;
///
/// assert!(validate_class_name("BlogPost").is_ok());
/// assert!(validate_class_name("").is_err());
/// assert!(validate_class_name("9Lives").is_err());
/// ```
pub fn validate_class_name(name: &str) -> Result<(), TypeError> {
    validate_identifier("class", name)
}

/// Validate a field name. Same rules as class names.
pub fn validate_field_name(name: &str) -> Result<(), TypeError> {
    validate_identifier("field", name)
}

/// Validate a user-declared bucket name.
pub fn validate_bucket_name(name: &str) -> Result<(), TypeError> {
    if name.is_empty() {
        return Err(invalid("bucket", name, "must not be empty"));
    }
    for ch in FORBIDDEN_BUCKET_CHARS {
        if name.contains(*ch) {
            return Err(invalid(
                "bucket",
                name,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("bucket", name, "contains control characters"));
    }
    if name.starts_with(RESERVED_BUCKET_PREFIX) {
        return Err(invalid(
            "bucket",
            name,
            format!("prefix {RESERVED_BUCKET_PREFIX:?} is reserved for unique indexes"),
        ));
    }
    Ok(())
}

/// Deterministic name of the bucket holding unique-index records for
/// `field` of the class whose default bucket is `bucket`.
///
/// ```
/// use kvdoc_types::names::unique_bucket_name;
///
/// assert_eq!(unique_bucket_name("users", "email"), "_users_ul_email");
/// ```
pub fn unique_bucket_name(bucket: &str, field: &str) -> String {
    format!("{RESERVED_BUCKET_PREFIX}{bucket}_ul_{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(validate_class_name("User").is_ok());
        assert!(validate_class_name("_Base").is_ok());
        assert!(validate_field_name("first_name").is_ok());
        assert!(validate_field_name("name2").is_ok());
        assert!(validate_field_name("2name").is_err());
        assert!(validate_field_name("first-name").is_err());
        assert!(validate_field_name("").is_err());
    }

    #[test]
    fn bucket_names() {
        assert!(validate_bucket_name("test_users").is_ok());
        assert!(validate_bucket_name("users.v2").is_ok());
        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("a b").is_err());
        assert!(validate_bucket_name("a/b").is_err());
        assert!(validate_bucket_name("_users_ul_email").is_err());
    }

    #[test]
    fn error_names_the_kind() {
        let err = validate_field_name("a-b").unwrap_err();
        assert!(err.to_string().contains("invalid field name"));
    }

    #[test]
    fn unique_bucket_is_reserved() {
        let name = unique_bucket_name("test_unique", "attr");
        assert_eq!(name, "_test_unique_ul_attr");
        assert!(validate_bucket_name(&name).is_err());
    }
}
