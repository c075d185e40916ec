//! Map operations, roles, and the key vocabulary of group content.
//!
//! A group is a map. Its keys are either member IDs (value: a role),
//! `readKey` (value: the current key ID), `{keyId}_for_{memberId}` (value:
//! the key sealed to that member), or `{keyId}_for_{keyId}` (value: the
//! first key encrypted under the second).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use coval_core::{Change, KeyId, MemberId};

/// One map operation inside a transaction's changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MapOp {
    Set {
        key: String,
        value: serde_json::Value,
    },
    Del {
        key: String,
    },
}

impl MapOp {
    pub fn set(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        MapOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        MapOp::Del { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            MapOp::Set { key, .. } | MapOp::Del { key } => key,
        }
    }

    pub fn to_change(&self) -> Change {
        match self {
            MapOp::Set { key, value } => {
                serde_json::json!({"op": "set", "key": key, "value": value.clone()})
            }
            MapOp::Del { key } => serde_json::json!({"op": "del", "key": key}),
        }
    }

    pub fn from_change(change: &Change) -> Option<Self> {
        serde_json::from_value(change.clone()).ok()
    }
}

/// A member's role in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Admin,
    Writer,
    Reader,
    Revoked,
    AdminInvite,
    WriterInvite,
    ReaderInvite,
}

impl Role {
    /// Strength of the role, ignoring invites.
    pub fn level(self) -> u8 {
        match self {
            Role::Admin => 3,
            Role::Writer => 2,
            Role::Reader => 1,
            Role::Revoked => 0,
            Role::AdminInvite | Role::WriterInvite | Role::ReaderInvite => 0,
        }
    }

    pub fn is_invite(self) -> bool {
        matches!(
            self,
            Role::AdminInvite | Role::WriterInvite | Role::ReaderInvite
        )
    }

    /// For an invite, the strongest role its bearer may hand out.
    pub fn invite_grants(self) -> Option<Role> {
        match self {
            Role::AdminInvite => Some(Role::Admin),
            Role::WriterInvite => Some(Role::Writer),
            Role::ReaderInvite => Some(Role::Reader),
            _ => None,
        }
    }

    pub fn can_write(self) -> bool {
        matches!(self, Role::Admin | Role::Writer)
    }

    /// Whether the role receives rotated read keys. Invites are handed the
    /// key once, when created.
    pub fn can_read(self) -> bool {
        matches!(self, Role::Admin | Role::Writer | Role::Reader)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Writer => "writer",
            Role::Reader => "reader",
            Role::Revoked => "revoked",
            Role::AdminInvite => "adminInvite",
            Role::WriterInvite => "writerInvite",
            Role::ReaderInvite => "readerInvite",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Ok(match s {
            "admin" => Role::Admin,
            "writer" => Role::Writer,
            "reader" => Role::Reader,
            "revoked" => Role::Revoked,
            "adminInvite" => Role::AdminInvite,
            "writerInvite" => Role::WriterInvite,
            "readerInvite" => Role::ReaderInvite,
            _ => return Err(()),
        })
    }
}

/// Key pointing at the group's current read key.
pub const READ_KEY: &str = "readKey";

/// A parsed group map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupKey {
    Member(MemberId),
    ReadKey,
    /// `{key}_for_{member}`: `key` sealed to `member`.
    Revelation { key: KeyId, to: MemberId },
    /// `{key}_for_{under}`: `key` encrypted under `under`.
    KeyWrap { key: KeyId, under: KeyId },
    Other(String),
}

impl GroupKey {
    pub fn parse(s: &str) -> Self {
        if s == READ_KEY {
            return GroupKey::ReadKey;
        }
        if let Some((left, right)) = s.split_once("_for_") {
            if let Ok(key) = left.parse::<KeyId>() {
                if let Ok(under) = right.parse::<KeyId>() {
                    return GroupKey::KeyWrap { key, under };
                }
                if let Ok(to) = right.parse::<MemberId>() {
                    return GroupKey::Revelation { key, to };
                }
            }
            return GroupKey::Other(s.to_string());
        }
        match s.parse::<MemberId>() {
            Ok(member) => GroupKey::Member(member),
            Err(_) => GroupKey::Other(s.to_string()),
        }
    }
}

pub fn revelation_key(key: &KeyId, to: &MemberId) -> String {
    format!("{key}_for_{to}")
}

pub fn key_wrap_key(key: &KeyId, under: &KeyId) -> String {
    format!("{key}_for_{under}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use coval_core::{AgentId, Keypair, RawCoId};
    use serde_json::json;

    fn agent() -> MemberId {
        AgentId::new(Keypair::from_seed(&[1; 32]).public_key(), [2; 32]).into()
    }

    #[test]
    fn test_map_op_json_shape() {
        let op = MapOp::set("title", "hello");
        assert_eq!(op.to_change(), json!({"op": "set", "key": "title", "value": "hello"}));
        assert_eq!(MapOp::del("x").to_change(), json!({"op": "del", "key": "x"}));
        assert_eq!(MapOp::from_change(&op.to_change()), Some(op));
        assert_eq!(MapOp::from_change(&json!({"op": "frobnicate"})), None);
    }

    #[test]
    fn test_role_strings() {
        for role in [
            Role::Admin,
            Role::Writer,
            Role::Reader,
            Role::Revoked,
            Role::AdminInvite,
            Role::WriterInvite,
            Role::ReaderInvite,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
            assert_eq!(serde_json::to_value(role).unwrap(), json!(role.as_str()));
        }
    }

    #[test]
    fn test_only_member_roles_read() {
        assert!(Role::Admin.can_read());
        assert!(Role::Writer.can_read());
        assert!(Role::Reader.can_read());
        assert!(!Role::Revoked.can_read());
        assert!(!Role::AdminInvite.can_read());
        assert!(!Role::ReaderInvite.can_read());
    }

    #[test]
    fn test_parse_group_keys() {
        let member = agent();
        let account = MemberId::Account(RawCoId([4; 32]));
        let k1 = KeyId([1; 16]);
        let k2 = KeyId([2; 16]);

        assert_eq!(GroupKey::parse("readKey"), GroupKey::ReadKey);
        assert_eq!(GroupKey::parse(&member.to_string()), GroupKey::Member(member));
        assert_eq!(GroupKey::parse(&account.to_string()), GroupKey::Member(account));
        assert_eq!(
            GroupKey::parse(&revelation_key(&k1, &member)),
            GroupKey::Revelation { key: k1, to: member }
        );
        assert_eq!(
            GroupKey::parse(&key_wrap_key(&k1, &k2)),
            GroupKey::KeyWrap { key: k1, under: k2 }
        );
        assert_eq!(GroupKey::parse("name"), GroupKey::Other("name".into()));
    }
}
