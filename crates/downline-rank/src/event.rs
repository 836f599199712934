//! Structural changes to the referral network.

use crate::models::UserId;
use serde::{Deserialize, Serialize};

/// A mutation the calling layer has already committed to the store.
///
/// Applying the event brings the ranks of every affected upline back in
/// line. See [`RankService::apply`](crate::RankService::apply).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetworkEvent {
    /// A new user was linked under a sponsor (or joined as a root)
    Joined { user: UserId },

    /// A user was moved under a different sponsor
    Responsored {
        user: UserId,
        previous_sponsor: Option<UserId>,
    },

    /// A user record was deleted
    Removed {
        user: UserId,
        previous_sponsor: Option<UserId>,
    },
}

impl NetworkEvent {
    /// The user the event is about.
    pub fn user(&self) -> &UserId {
        match self {
            NetworkEvent::Joined { user }
            | NetworkEvent::Responsored { user, .. }
            | NetworkEvent::Removed { user, .. } => user,
        }
    }

    /// Sponsor whose upline lost this user's subtree, if any.
    pub fn previous_sponsor(&self) -> Option<&UserId> {
        match self {
            NetworkEvent::Joined { .. } => None,
            NetworkEvent::Responsored {
                previous_sponsor, ..
            }
            | NetworkEvent::Removed {
                previous_sponsor, ..
            } => previous_sponsor.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_sponsor_only_for_moves() {
        let joined = NetworkEvent::Joined { user: "a".into() };
        assert_eq!(joined.user().as_str(), "a");
        assert!(joined.previous_sponsor().is_none());

        let moved = NetworkEvent::Responsored {
            user: "a".into(),
            previous_sponsor: Some("b".into()),
        };
        assert_eq!(moved.previous_sponsor().map(UserId::as_str), Some("b"));
    }

    #[test]
    fn tagged_json() {
        let event: NetworkEvent =
            serde_json::from_str(r#"{"event":"removed","user":"a","previous_sponsor":null}"#)
                .unwrap();
        assert_eq!(
            event,
            NetworkEvent::Removed {
                user: "a".into(),
                previous_sponsor: None
            }
        );
    }
}
