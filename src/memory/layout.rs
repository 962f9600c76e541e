//! Byte layout of packed entities.
//!
//! Every record starts on an 8-byte boundary and its encoded size is a
//! multiple of 8, so a consumer can walk a buffer with nothing but the
//! length prefixes. All fixed-width fields are little-endian.
//!
//! Entity record:
//!
//! ```text
//! 0   u8  kind                      (ItemKind)
//! 4   u32 total record length       (patched when the entity is sealed)
//! 8   i64 id
//! 16  u32 version        20  u32 changeset
//! 24  u32 timestamp      28  u32 uid
//! 32  u8  visible
//! 36.. kind-specific fixed fields (see the offsets below)
//! ... user string record
//! ... sub-list records (each: u8 list kind, u32 payload length, payload)
//! ```
//!
//! A string record is a `u32` length followed by the UTF-8 bytes, zero
//! padded to the next 8-byte boundary.

use crate::osm::ItemKind;

pub const ALIGNMENT: usize = 8;

pub const KIND: usize = 0;
pub const TOTAL_LEN: usize = 4;
pub const ID: usize = 8;
pub const VERSION: usize = 16;
pub const CHANGESET: usize = 20;
pub const TIMESTAMP: usize = 24;
pub const UID: usize = 28;
pub const VISIBLE: usize = 32;

// node
pub const NODE_X: usize = 36;
pub const NODE_Y: usize = 40;

// changeset
pub const CS_MIN_X: usize = 36;
pub const CS_MIN_Y: usize = 40;
pub const CS_MAX_X: usize = 44;
pub const CS_MAX_Y: usize = 48;
pub const CS_CREATED_AT: usize = 52;
pub const CS_CLOSED_AT: usize = 56;
pub const CS_NUM_CHANGES: usize = 60;
pub const CS_COMMENTS_COUNT: usize = 64;
pub const CS_OPEN: usize = 68;

/// Size of the fixed part of an entity record, before the user string.
pub fn fixed_size(kind: ItemKind) -> usize {
    match kind {
        ItemKind::Node => 48,
        ItemKind::Way | ItemKind::Relation => 40,
        ItemKind::Changeset => 72,
    }
}

/// Nested list records inside an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ListKind {
    Tags = 1,
    NodeRefs = 2,
    Members = 3,
    Discussion = 4,
}

impl ListKind {
    pub fn from_u8(x: u8) -> Option<ListKind> {
        match x {
            1 => Some(ListKind::Tags),
            2 => Some(ListKind::NodeRefs),
            3 => Some(ListKind::Members),
            4 => Some(ListKind::Discussion),
            _ => None,
        }
    }
}

pub const LIST_HEADER_SIZE: usize = 8;
pub const LIST_PAYLOAD_LEN: usize = 4;

/// A way node reference: i64 id, i32 x, i32 y.
pub const NODE_REF_SIZE: usize = 16;

/// Fixed head of a relation member: i64 ref, u8 kind, u32 role length.
pub const MEMBER_REF: usize = 0;
pub const MEMBER_KIND: usize = 8;
pub const MEMBER_ROLE_LEN: usize = 12;
pub const MEMBER_HEADER_SIZE: usize = 16;

/// Fixed head of a discussion comment: u32 date, u32 uid.
pub const COMMENT_DATE: usize = 0;
pub const COMMENT_UID: usize = 4;
pub const COMMENT_HEADER_SIZE: usize = 8;

pub fn pad8(n: usize) -> usize {
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Encoded size of a string record.
pub fn string_record_size(s: &str) -> usize {
    pad8(4 + s.len())
}
