//! Handles token authentication and capability grants. Authentication is proven by possession
//! of a token; authorization is proven by possession of a grant. Customers act on their own
//! wallet, top-ups and orders; staff review top-ups and settle orders. The two capabilities are
//! encoded as two separate types, so a settlement operation cannot be called without a staff
//! check having happened first. The core only uses the grant for audit attribution.

use crate::user;
use chrono::{DateTime, Utc};
use sha2::Digest;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("access denied")]
pub struct AccessDenied;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TokenId(pub Uuid);

/// Proof that the token belongs to an enabled user acting on their own account.
#[derive(Debug)]
pub struct CustomerGrant {
    pub token_id: TokenId,
    pub user_id: user::Id,
}

/// Proof that the token belongs to a staff member. `actor_id` is recorded on every review and
/// settlement performed with this grant.
#[derive(Debug)]
pub struct StaffGrant {
    pub token_id: TokenId,
    pub actor_id: user::Id,
}

/// A hex-encoded hash of the token.
pub struct TokenHash(String);

impl TokenHash {
    /// Hashes a token with a specific hashing algorithm.
    ///
    /// Currently, SHA256 is used, without salting. Tokens are generated randomly, so they have
    /// a high entropy.
    pub(crate) fn generate(token: &str) -> Self {
        let mut hasher = sha2::Sha256::new();
        hasher.update(token);
        let sha = hasher.finalize();
        Self(hex::encode(sha))
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
pub struct Token {
    pub(crate) id: TokenId,
    pub(crate) user_id: user::Id,
    pub(crate) is_staff: bool,
    pub(crate) disabled: Option<DateTime<Utc>>,
}

impl Token {
    pub(crate) fn customer_grant(&self) -> Result<CustomerGrant, AccessDenied> {
        if self.is_enabled() {
            Ok(CustomerGrant {
                token_id: self.id,
                user_id: self.user_id,
            })
        } else {
            Err(AccessDenied)
        }
    }

    pub(crate) fn staff_grant(&self) -> Result<StaffGrant, AccessDenied> {
        if self.is_enabled() && self.is_staff {
            Ok(StaffGrant {
                token_id: self.id,
                actor_id: self.user_id,
            })
        } else {
            Err(AccessDenied)
        }
    }

    fn is_enabled(&self) -> bool {
        self.disabled.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn token(is_staff: bool, disabled: bool) -> Token {
        Token {
            id: TokenId(Uuid::new_v4()),
            user_id: user::Id(Uuid::new_v4()),
            is_staff,
            disabled: disabled.then(Utc::now),
        }
    }

    #[rstest]
    #[case(false, false, true, false)]
    #[case(true, false, true, true)]
    #[case(false, true, false, false)]
    #[case(true, true, false, false)]
    fn grants_follow_role_and_state(
        #[case] is_staff: bool,
        #[case] disabled: bool,
        #[case] customer: bool,
        #[case] staff: bool,
    ) {
        let token = token(is_staff, disabled);
        assert_eq!(token.customer_grant().is_ok(), customer);
        assert_eq!(token.staff_grant().is_ok(), staff);
    }

    #[test]
    fn staff_grant_attributes_the_token_owner() {
        let token = token(true, false);
        assert_eq!(token.staff_grant().unwrap().actor_id, token.user_id);
    }

    #[test]
    fn token_hash_is_hex_sha256() {
        let hash = TokenHash::generate("customer_1");
        assert_eq!(hash.as_str().len(), 64);
        assert_eq!(hash.as_str(), TokenHash::generate("customer_1").as_str());
    }
}
