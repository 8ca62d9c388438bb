//! Model naming validation: every persisted table and column name must be
//! snake_case, so generated SQL and the schema hash stay portable across
//! backends.

/// Returns `true` if `name` is a valid snake_case identifier: lowercase
/// ASCII letters, digits, and underscores, not starting with a digit.
pub fn is_snake_case(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if first.is_ascii_digit() {
        return false;
    }
    name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Validate that every table and its columns use snake_case naming.
/// Returns the first offending name found, if any.
pub fn validate_models<'a>(
    tables: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
) -> Result<(), String> {
    for (table, columns) in tables {
        if !is_snake_case(table) {
            return Err(format!("table name '{table}' is not snake_case"));
        }
        for column in columns {
            if !is_snake_case(column) {
                return Err(format!("column '{table}.{column}' is not snake_case"));
            }
        }
    }
    Ok(())
}

/// The framework's own fixed tables, validated at storage-open time so a
/// naming regression here is caught the same way a user model's would be.
pub const FRAMEWORK_TABLES: &[(&str, &[&str])] = &[
    ("dipdup_state", &["dapp", "level", "status", "hash"]),
    ("dipdup_contract", &["name", "address", "typename"]),
];

pub fn validate_framework_schema() -> Result<(), String> {
    validate_models(FRAMEWORK_TABLES.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_snake_case() {
        assert!(is_snake_case("dipdup_state"));
        assert!(is_snake_case("token_id"));
        assert!(is_snake_case("a1"));
    }

    #[test]
    fn rejects_camel_case_and_leading_digit() {
        assert!(!is_snake_case("tokenId"));
        assert!(!is_snake_case("TokenId"));
        assert!(!is_snake_case("1token"));
        assert!(!is_snake_case(""));
    }

    #[test]
    fn validate_models_reports_first_offender() {
        let tables: Vec<(&str, &[&str])> = vec![("holders", &["address", "tokenId"])];
        let err = validate_models(tables).unwrap_err();
        assert!(err.contains("holders.tokenId"));
    }

    #[test]
    fn framework_schema_is_valid() {
        validate_framework_schema().unwrap();
    }
}
