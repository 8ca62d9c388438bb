//! Schema hash — a deterministic fingerprint of the persisted model layout,
//! used to detect drift between the schema a run expects and the schema
//! actually present in the database.

use sha2::{Digest, Sha256};

/// Hash a set of `CREATE TABLE` statements into a single fingerprint.
///
/// Each statement is normalized before hashing — whitespace collapsed and
/// its column-definition list sorted — then the normalized statements
/// themselves are sorted, so neither column order within a statement nor
/// statement order across the set registers as drift.
pub fn schema_hash<S: AsRef<str>>(create_statements: impl IntoIterator<Item = S>) -> String {
    let mut normalized: Vec<String> = create_statements
        .into_iter()
        .map(|ddl| normalize_statement(ddl.as_ref()))
        .collect();
    normalized.sort();

    let mut hasher = Sha256::new();
    for stmt in &normalized {
        hasher.update(stmt.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Collapse whitespace, then sort the comma-separated column definitions
/// inside the outermost parentheses.
fn normalize_statement(ddl: &str) -> String {
    let collapsed = ddl.split_whitespace().collect::<Vec<_>>().join(" ");
    let Some(open) = collapsed.find('(') else {
        return collapsed;
    };
    let Some(close) = collapsed.rfind(')') else {
        return collapsed;
    };
    if close < open {
        return collapsed;
    }

    let prefix = &collapsed[..open];
    let body = &collapsed[open + 1..close];
    let suffix = &collapsed[close + 1..];

    let mut columns: Vec<String> = split_top_level_columns(body).into_iter().map(|c| c.trim().to_string()).collect();
    columns.sort();

    format!("{prefix}({}){suffix}", columns.join(", "))
}

/// Split a column-definition list on top-level commas only — a comma nested
/// inside a column's own parentheses (e.g. `NUMERIC(10, 2)`) does not split.
fn split_top_level_columns(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in body.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_under_column_reorder_within_statement() {
        let a = schema_hash(["CREATE TABLE t (a INT, b INT)"]);
        let b = schema_hash(["CREATE TABLE t (b INT, a INT)"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_treats_nested_parens_as_part_of_one_column() {
        let a = schema_hash(["CREATE TABLE t (a NUMERIC(10, 2), b INT)"]);
        let b = schema_hash(["CREATE TABLE t (b INT, a NUMERIC(10, 2))"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_is_stable_under_statement_reorder() {
        let a = schema_hash(["CREATE TABLE a (x INT)", "CREATE TABLE b (y INT)"]);
        let b = schema_hash(["CREATE TABLE b (y INT)", "CREATE TABLE a (x INT)"]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_schemas_hash_differently() {
        let a = schema_hash(["CREATE TABLE t (a INT)"]);
        let b = schema_hash(["CREATE TABLE t (a INT, b INT)"]);
        assert_ne!(a, b);
    }
}
