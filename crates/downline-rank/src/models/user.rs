//! User records as held by the key-value store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Depth of a user's downline subtree. Zero means no downline.
pub type Rank = u32;

/// Opaque unique identifier of a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Account role. Admin accounts sit outside the referral network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Member,
    Admin,
}

/// A participant in the referral network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Unique identifier
    pub id: UserId,

    /// The user who referred this one; `None` for a root
    #[serde(default)]
    pub sponsor_id: Option<UserId>,

    /// Last computed rank, denormalized for display
    #[serde(default)]
    pub rank: Rank,

    /// Member or administrative account
    #[serde(default)]
    pub role: Role,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserRecord {
    /// Create a root member with no sponsor.
    pub fn new(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            sponsor_id: None,
            rank: 0,
            role: Role::Member,
            display_name: None,
        }
    }

    /// Create a member referred by `sponsor`.
    pub fn sponsored_by(id: impl Into<UserId>, sponsor: impl Into<UserId>) -> Self {
        Self {
            sponsor_id: Some(sponsor.into()),
            ..Self::new(id)
        }
    }

    /// Create an administrative account.
    pub fn admin(id: impl Into<UserId>) -> Self {
        Self {
            role: Role::Admin,
            ..Self::new(id)
        }
    }

    /// Whether this account takes part in the referral network.
    pub fn is_network_member(&self) -> bool {
        self.role == Role::Member
    }

    /// Whether this record is a root of the sponsor forest.
    pub fn is_root(&self) -> bool {
        self.sponsor_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_is_root_member() {
        let user = UserRecord::new("alice");
        assert_eq!(user.id.as_str(), "alice");
        assert!(user.is_root());
        assert!(user.is_network_member());
        assert_eq!(user.rank, 0);
    }

    #[test]
    fn admin_is_not_network_member() {
        assert!(!UserRecord::admin("ops").is_network_member());
    }

    #[test]
    fn deserialize_sparse_record() {
        // Records written by older clients carry only an id
        let user: UserRecord = serde_json::from_str(r#"{"id":"bob"}"#).unwrap();
        assert_eq!(user, UserRecord::new("bob"));
    }

    #[test]
    fn serialize_uses_camel_case() {
        let user = UserRecord::sponsored_by("bob", "alice");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["sponsorId"], "alice");
        assert_eq!(json["role"], "member");
    }
}
