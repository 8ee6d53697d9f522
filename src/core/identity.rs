use sha2::{Digest, Sha256};

use crate::core::config;

/// One-way hash of a Telegram user id, used to record veto submitters
/// without storing the raw id. An optional salt from the environment is
/// mixed in so hashes cannot be reversed by enumerating user ids.
pub fn hash_user_id(user_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.to_string().as_bytes());
    let salt = config::IDENTITY_SALT.as_str();
    if !salt.is_empty() {
        hasher.update(salt.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::hash_user_id;

    #[test]
    fn hash_is_stable_and_hex_encoded() {
        let a = hash_user_id(42);
        let b = hash_user_id(42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_users_produce_different_hashes() {
        assert_ne!(hash_user_id(1), hash_user_id(2));
    }
}
