//! Cache key composition for the GraphQL read-through layer (spec.md
//! §4.B "Cache key composition").

use serde::Serialize;
use sha2::{Digest, Sha256};

/// `"graphql:" + sha256(query) + ":" + JSON(variables)`.
pub fn graphql_cache_key<V: Serialize>(query: &str, variables: &V) -> serde_json::Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    let query_hash = format!("{:x}", hasher.finalize());
    let variables_json = serde_json::to_string(variables)?;
    Ok(format!("graphql:{query_hash}:{variables_json}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_query_and_variables_produce_same_key() {
        let a = graphql_cache_key("query { x }", &json!({"id": 1})).unwrap();
        let b = graphql_cache_key("query { x }", &json!({"id": 1})).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("graphql:"));
    }

    #[test]
    fn different_variables_produce_different_keys() {
        let a = graphql_cache_key("query { x }", &json!({"id": 1})).unwrap();
        let b = graphql_cache_key("query { x }", &json!({"id": 2})).unwrap();
        assert_ne!(a, b);
    }
}
