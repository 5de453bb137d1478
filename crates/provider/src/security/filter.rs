//! Client-filter query transform.
//!
//! A textual defense-in-depth layer: appends a client-id allow-list
//! predicate to a query string. This never replaces parameterized queries
//! upstream; it exists so that a query which somehow reaches the backend
//! without a tenant predicate still cannot return another tenant's rows.

/// Appends a client allow-list predicate to `query`.
///
/// Fails closed: an empty `client_ids` slice appends an always-false
/// predicate, so the resulting query provably returns zero rows. The
/// original query is never returned unfiltered.
pub fn append_client_filter(query: &str, client_ids: &[String]) -> String {
    let connector = if has_where_clause(query) { "AND" } else { "WHERE" };

    if client_ids.is_empty() {
        return format!("{} {} 1 = 0", query.trim_end(), connector);
    }

    let list = client_ids
        .iter()
        .map(|id| format!("'{}'", escape_literal(id)))
        .collect::<Vec<_>>()
        .join(", ");

    format!("{} {} client_id IN ({})", query.trim_end(), connector, list)
}

/// Case-insensitive check for a WHERE clause. Heuristic: a standalone
/// `where` keyword anywhere in the text counts; subqueries already filtered
/// by tenant upstream are unaffected by the extra AND.
fn has_where_clause(query: &str) -> bool {
    query
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("where"))
}

/// Doubles single quotes so an id cannot terminate the string literal.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_appends_where_when_absent() {
        let filtered = append_client_filter("SELECT * FROM deliveries", &ids(&["c1", "c2"]));
        assert_eq!(
            filtered,
            "SELECT * FROM deliveries WHERE client_id IN ('c1', 'c2')"
        );
    }

    #[test]
    fn test_appends_and_when_where_present() {
        let filtered = append_client_filter(
            "SELECT * FROM deliveries WHERE status = $1",
            &ids(&["c1"]),
        );
        assert_eq!(
            filtered,
            "SELECT * FROM deliveries WHERE status = $1 AND client_id IN ('c1')"
        );
    }

    #[test]
    fn test_zero_clients_fails_closed() {
        let filtered = append_client_filter("SELECT * FROM deliveries", &[]);
        assert_eq!(filtered, "SELECT * FROM deliveries WHERE 1 = 0");

        let with_where = append_client_filter("SELECT * FROM d WHERE x = 1", &[]);
        assert_eq!(with_where, "SELECT * FROM d WHERE x = 1 AND 1 = 0");
    }

    #[test]
    fn test_escapes_quotes_in_ids() {
        let filtered = append_client_filter("SELECT * FROM t", &ids(&["o'neill"]));
        assert_eq!(filtered, "SELECT * FROM t WHERE client_id IN ('o''neill')");
    }

    #[test]
    fn test_lowercase_where_detected() {
        let filtered = append_client_filter("select id from t where y = 2", &ids(&["c1"]));
        assert!(filtered.ends_with("AND client_id IN ('c1')"));
    }
}
