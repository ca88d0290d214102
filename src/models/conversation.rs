//! Conversation identity: the stable partition key every store is keyed by.
//!
//! Resolution is pure and symmetric; every caller must compute the same key
//! for the same pair of participants, so ids are canonically ordered before
//! they are encoded.

use crate::error::{AppError, AppResult};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct { low: Uuid, high: Uuid },
    Group { group_id: Uuid },
}

impl ConversationKey {
    /// Key for a direct conversation. Symmetric: `direct(a, b) == direct(b, a)`.
    pub fn direct(a: Uuid, b: Uuid) -> AppResult<Self> {
        if a == b {
            return Err(AppError::InvalidMessage(
                "direct conversation requires two distinct participants".into(),
            ));
        }
        if a.is_nil() || b.is_nil() {
            return Err(AppError::InvalidMessage(
                "participant id must not be nil".into(),
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(ConversationKey::Direct { low, high })
    }

    pub fn group(group_id: Uuid) -> AppResult<Self> {
        if group_id.is_nil() {
            return Err(AppError::InvalidMessage("group id must not be nil".into()));
        }
        Ok(ConversationKey::Group { group_id })
    }

    pub fn is_group(&self) -> bool {
        matches!(self, ConversationKey::Group { .. })
    }

    pub fn group_id(&self) -> Option<Uuid> {
        match self {
            ConversationKey::Group { group_id } => Some(*group_id),
            ConversationKey::Direct { .. } => None,
        }
    }

    /// The two participants of a direct conversation, canonical order.
    pub fn direct_parties(&self) -> Option<(Uuid, Uuid)> {
        match self {
            ConversationKey::Direct { low, high } => Some((*low, *high)),
            ConversationKey::Group { .. } => None,
        }
    }

    /// Parse a stored/wire key (`dm_{low}_{high}` or `group_{id}`).
    pub fn from_wire(raw: &str) -> AppResult<Self> {
        if let Some(rest) = raw.strip_prefix("dm_") {
            let mut parts = rest.splitn(2, '_');
            let low = parts
                .next()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| AppError::DataIntegrity(format!("bad dm key: {raw}")))?;
            let high = parts
                .next()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(|| AppError::DataIntegrity(format!("bad dm key: {raw}")))?;
            return Self::direct(low, high);
        }
        if let Some(rest) = raw.strip_prefix("group_") {
            let group_id = Uuid::parse_str(rest)
                .map_err(|_| AppError::DataIntegrity(format!("bad group key: {raw}")))?;
            return Self::group(group_id);
        }
        Err(AppError::DataIntegrity(format!(
            "unrecognized conversation key: {raw}"
        )))
    }

    /// Resolve a UI-facing id (`user-{id}` relative to `viewer`, or
    /// `group-{id}`) into a conversation key. UI ids never reach a store
    /// without passing through here.
    pub fn from_ui_id(viewer: Uuid, ui_id: &str) -> AppResult<Self> {
        if let Some(rest) = ui_id.strip_prefix("user-") {
            let other = Uuid::parse_str(rest)
                .map_err(|_| AppError::InvalidMessage(format!("bad user id: {ui_id}")))?;
            return Self::direct(viewer, other);
        }
        if let Some(rest) = ui_id.strip_prefix("group-") {
            let group_id = Uuid::parse_str(rest)
                .map_err(|_| AppError::InvalidMessage(format!("bad group id: {ui_id}")))?;
            return Self::group(group_id);
        }
        Err(AppError::InvalidMessage(format!(
            "unrecognized conversation id: {ui_id}"
        )))
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::Direct { low, high } => write!(f, "dm_{low}_{high}"),
            ConversationKey::Group { group_id } => write!(f, "group_{group_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_key_is_symmetric() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            ConversationKey::direct(a, b).unwrap(),
            ConversationKey::direct(b, a).unwrap()
        );
    }

    #[test]
    fn self_pair_is_rejected() {
        let a = Uuid::new_v4();
        assert!(matches!(
            ConversationKey::direct(a, a),
            Err(AppError::InvalidMessage(_))
        ));
    }

    #[test]
    fn wire_round_trip() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let key = ConversationKey::direct(a, b).unwrap();
        assert_eq!(ConversationKey::from_wire(&key.to_string()).unwrap(), key);

        let g = ConversationKey::group(Uuid::new_v4()).unwrap();
        assert_eq!(ConversationKey::from_wire(&g.to_string()).unwrap(), g);
    }

    #[test]
    fn ui_ids_resolve_through_identity() {
        let viewer = Uuid::new_v4();
        let other = Uuid::new_v4();
        let via_ui = ConversationKey::from_ui_id(viewer, &format!("user-{other}")).unwrap();
        assert_eq!(via_ui, ConversationKey::direct(other, viewer).unwrap());

        let group = Uuid::new_v4();
        let via_ui = ConversationKey::from_ui_id(viewer, &format!("group-{group}")).unwrap();
        assert_eq!(via_ui, ConversationKey::group(group).unwrap());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ConversationKey::from_wire("dm_not_a_uuid").is_err());
        assert!(ConversationKey::from_ui_id(Uuid::new_v4(), "channel-17").is_err());
    }
}
