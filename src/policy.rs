//! Authorization Policy
//!
//! Decides which statements a request may run. There are two entry points:
//! [`authorize`] guards the coordination port and trusts the token plus the
//! claimed origin, while [`authorize_http`] guards HTTP callers and also
//! restricts slave callers to reads.

use crate::network::protocol::MASTER_ORIGIN;

/// Denial reason for schema changes from anyone but the master
pub const MASTER_ONLY_REASON: &str = "only the master may create or drop databases/tables";

/// Denial reason for non-read statements from slave HTTP callers
pub const READ_ONLY_REASON: &str = "slaves can only execute SELECT queries";

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// True for statements that create or drop databases or tables
pub fn is_schema_mutating(query: &str) -> bool {
    let upper = query.trim().to_uppercase();
    upper.starts_with("CREATE") || upper.starts_with("DROP")
}

/// True for statements that start with SELECT
pub fn is_select(query: &str) -> bool {
    query.trim().to_uppercase().starts_with("SELECT")
}

/// Coordination-port policy: schema changes are reserved to the master
pub fn authorize(query: &str, from_slave: &str) -> Decision {
    if is_schema_mutating(query) && from_slave != MASTER_ORIGIN {
        return Decision::Deny(MASTER_ONLY_REASON.to_string());
    }
    Decision::Allow
}

/// HTTP policy: as [`authorize`], and callers whose declared role is
/// `slave` may only read
pub fn authorize_http(query: &str, role: Option<&str>) -> Decision {
    let origin = match role {
        Some(r) if r.eq_ignore_ascii_case("slave") => {
            if !is_select(query) {
                return Decision::Deny(READ_ONLY_REASON.to_string());
            }
            "slave"
        }
        _ => MASTER_ORIGIN,
    };
    authorize(query, origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mutating_detection() {
        assert!(is_schema_mutating("CREATE TABLE shop.items (id INT)"));
        assert!(is_schema_mutating("  drop database shop"));
        assert!(is_schema_mutating("\n\tCreate index idx on t(a)"));
        assert!(!is_schema_mutating("INSERT INTO shop.items VALUES (1)"));
        assert!(!is_schema_mutating("SELECT 'CREATE'"));
    }

    #[test]
    fn test_schema_changes_reserved_to_master() {
        for origin in ["10.0.0.5", "", "Master", "slave-1"] {
            assert_eq!(
                authorize("DROP TABLE shop.items", origin),
                Decision::Deny(MASTER_ONLY_REASON.to_string())
            );
        }
        assert!(authorize("DROP TABLE shop.items", "master").is_allowed());
    }

    #[test]
    fn test_dml_allowed_from_any_origin() {
        assert!(authorize("DELETE FROM shop.items WHERE id = 1", "10.0.0.5").is_allowed());
        assert!(authorize("UPDATE shop.items SET a = 1", "").is_allowed());
        assert!(authorize("SELECT 1", "10.0.0.5").is_allowed());
    }

    #[test]
    fn test_http_policy_is_stricter_for_slaves() {
        assert_eq!(
            authorize_http("INSERT INTO shop.items VALUES (1)", Some("slave")),
            Decision::Deny(READ_ONLY_REASON.to_string())
        );
        assert!(authorize_http("select * from shop.items", Some("slave")).is_allowed());
        assert!(authorize_http("INSERT INTO shop.items VALUES (1)", None).is_allowed());
        assert!(authorize_http("CREATE DATABASE shop", Some("master")).is_allowed());
        assert!(!authorize_http("CREATE DATABASE shop", Some("slave")).is_allowed());
    }
}
