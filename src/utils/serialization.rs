// src/utils/serialization.rs
//! JSON helpers shared by the stores and the mirror endpoint.

use serde::{Deserialize, Serialize};

/// Serializes a value to a compact JSON string.
pub fn serialize<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(data)
}

/// Serializes a value to JSON indented with two spaces.
///
/// Used for files meant to be read by people as well as programs.
pub fn serialize_pretty<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

/// Deserializes a value from a JSON string.
pub fn deserialize<'a, T: Deserialize<'a>>(data: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pretty_uses_two_space_indent() {
        let out = serialize_pretty(&json!({ "STU1": { "isRevoked": false } })).unwrap();
        assert!(out.contains("\n  \"STU1\""));
        assert!(out.contains("\n    \"isRevoked\": false"));
    }

    #[test]
    fn test_deserialize_error_surfaces() {
        assert!(deserialize::<serde_json::Value>("{\"open\": ").is_err());
        let value: serde_json::Value = deserialize(&serialize(&json!([1, 2])).unwrap()).unwrap();
        assert_eq!(value, json!([1, 2]));
    }
}
