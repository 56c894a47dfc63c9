//! Identifier and ownership-token generation.

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

/// Generates a new UUID v4, used for run identifiers.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a lock ownership token.
///
/// Wall-clock milliseconds plus 64 random bits, so two acquirers never
/// produce the same token even within the same millisecond.
#[must_use]
pub fn generate_ownership_token() -> String {
    let nonce: u64 = rand::thread_rng().gen();
    format!("{}-{nonce:016x}", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_uuid_is_v4() {
        assert_eq!(generate_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_ownership_token_shape() {
        let token = generate_ownership_token();
        let (millis, nonce) = token.split_once('-').unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(nonce.len(), 16);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ownership_tokens_are_unique() {
        let tokens: HashSet<_> = (0..1000).map(|_| generate_ownership_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
