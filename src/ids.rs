//! Identifier and timestamp helpers for outbound events

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Generate a new ULID string.
///
/// ULIDs sort by creation time, so ids generated in order compare in order.
pub fn generate_id() -> String {
    Ulid::new().to_string()
}

/// Current time for start/end timestamps
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 26);
    }
}
