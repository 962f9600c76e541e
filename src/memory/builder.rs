//! Builders encoding entities into a [`Buffer`].
//!
//! A builder is a passive record of offsets into the open (uncommitted)
//! region; every write goes through the buffer that is passed in
//! explicitly. Sealing a region is the explicit `end` call, which patches
//! the length prefix the consumer traverses by. The ingest machine
//! guarantees that at most one sub-list builder is alive per entity and
//! ends the old one before opening the next.

use crate::error::Error;
use crate::memory::buffer::Buffer;
use crate::memory::layout::{self, ListKind};
use crate::osm::{ItemKind, Location};

/// Builder for the common part of node, way and relation records.
#[derive(Debug)]
pub struct ObjectBuilder {
    kind: ItemKind,
    start: usize,
}

impl ObjectBuilder {
    pub fn new(buffer: &mut Buffer, kind: ItemKind) -> Result<ObjectBuilder, Error> {
        debug_assert_ne!(kind, ItemKind::Changeset);
        let start = open_entity(buffer, kind)?;
        Ok(ObjectBuilder { kind, start })
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn set_id(&self, buffer: &mut Buffer, id: i64) {
        buffer.put_i64(self.start + layout::ID, id);
    }

    pub fn set_version(&self, buffer: &mut Buffer, version: u32) {
        buffer.put_u32(self.start + layout::VERSION, version);
    }

    pub fn set_changeset(&self, buffer: &mut Buffer, changeset: u32) {
        buffer.put_u32(self.start + layout::CHANGESET, changeset);
    }

    pub fn set_timestamp(&self, buffer: &mut Buffer, timestamp: u32) {
        buffer.put_u32(self.start + layout::TIMESTAMP, timestamp);
    }

    pub fn set_uid(&self, buffer: &mut Buffer, uid: u32) {
        buffer.put_u32(self.start + layout::UID, uid);
    }

    pub fn set_visible(&self, buffer: &mut Buffer, visible: bool) {
        buffer.put_u8(self.start + layout::VISIBLE, u8::from(visible));
    }

    pub fn set_location(&self, buffer: &mut Buffer, location: Location) {
        debug_assert_eq!(self.kind, ItemKind::Node);
        buffer.put_i32(self.start + layout::NODE_X, location.x());
        buffer.put_i32(self.start + layout::NODE_Y, location.y());
    }

    /// Interns the user name right after the fixed fields. Must be called
    /// exactly once, before any sub-list is opened.
    pub fn add_user(&self, buffer: &mut Buffer, user: &str) -> Result<(), Error> {
        add_user(buffer, user)
    }

    /// Seals the record by patching its total length.
    pub fn end(self, buffer: &mut Buffer) {
        close_entity(buffer, self.start);
    }
}

/// Builder for changeset records.
#[derive(Debug)]
pub struct ChangesetBuilder {
    start: usize,
}

impl ChangesetBuilder {
    pub fn new(buffer: &mut Buffer) -> Result<ChangesetBuilder, Error> {
        let start = open_entity(buffer, ItemKind::Changeset)?;
        Ok(ChangesetBuilder { start })
    }

    pub fn set_id(&self, buffer: &mut Buffer, id: i64) {
        buffer.put_i64(self.start + layout::ID, id);
    }

    pub fn set_uid(&self, buffer: &mut Buffer, uid: u32) {
        buffer.put_u32(self.start + layout::UID, uid);
    }

    pub fn set_created_at(&self, buffer: &mut Buffer, created_at: u32) {
        buffer.put_u32(self.start + layout::CS_CREATED_AT, created_at);
    }

    pub fn set_closed_at(&self, buffer: &mut Buffer, closed_at: u32) {
        buffer.put_u32(self.start + layout::CS_CLOSED_AT, closed_at);
    }

    pub fn set_open(&self, buffer: &mut Buffer, open: bool) {
        buffer.put_u8(self.start + layout::CS_OPEN, u8::from(open));
    }

    pub fn set_num_changes(&self, buffer: &mut Buffer, num_changes: u32) {
        buffer.put_u32(self.start + layout::CS_NUM_CHANGES, num_changes);
    }

    pub fn set_comments_count(&self, buffer: &mut Buffer, count: u32) {
        buffer.put_u32(self.start + layout::CS_COMMENTS_COUNT, count);
    }

    pub fn set_bounds(&self, buffer: &mut Buffer, min: Location, max: Location) {
        buffer.put_i32(self.start + layout::CS_MIN_X, min.x());
        buffer.put_i32(self.start + layout::CS_MIN_Y, min.y());
        buffer.put_i32(self.start + layout::CS_MAX_X, max.x());
        buffer.put_i32(self.start + layout::CS_MAX_Y, max.y());
    }

    pub fn add_user(&self, buffer: &mut Buffer, user: &str) -> Result<(), Error> {
        add_user(buffer, user)
    }

    pub fn end(self, buffer: &mut Buffer) {
        close_entity(buffer, self.start);
    }
}

fn open_entity(buffer: &mut Buffer, kind: ItemKind) -> Result<usize, Error> {
    let start = buffer.reserve(layout::fixed_size(kind))?;
    buffer.put_u8(start + layout::KIND, kind as u8);
    // entities are visible unless something says otherwise
    buffer.put_u8(start + layout::VISIBLE, 1);
    Ok(start)
}

fn close_entity(buffer: &mut Buffer, start: usize) {
    let total = buffer.uncommitted() - start;
    buffer.put_u32(start + layout::TOTAL_LEN, total as u32);
}

fn add_user(buffer: &mut Buffer, user: &str) -> Result<(), Error> {
    let offset = buffer.reserve(layout::string_record_size(user))?;
    buffer.put_string(offset, user);
    Ok(())
}

fn open_list(buffer: &mut Buffer, kind: ListKind) -> Result<usize, Error> {
    let header = buffer.reserve(layout::LIST_HEADER_SIZE)?;
    buffer.put_u8(header, kind as u8);
    Ok(header)
}

fn close_list(buffer: &mut Buffer, header: usize) {
    let payload = buffer.uncommitted() - header - layout::LIST_HEADER_SIZE;
    buffer.put_u32(header + layout::LIST_PAYLOAD_LEN, payload as u32);
}

/// Builder for the tag list of any entity.
#[derive(Debug)]
pub struct TagListBuilder {
    header: usize,
}

impl TagListBuilder {
    pub fn new(buffer: &mut Buffer) -> Result<TagListBuilder, Error> {
        Ok(TagListBuilder {
            header: open_list(buffer, ListKind::Tags)?,
        })
    }

    pub fn add_tag(&self, buffer: &mut Buffer, key: &str, value: &str) -> Result<(), Error> {
        let key_size = layout::string_record_size(key);
        let value_size = layout::string_record_size(value);
        let offset = buffer.reserve(key_size + value_size)?;
        buffer.put_string(offset, key);
        buffer.put_string(offset + key_size, value);
        Ok(())
    }

    pub fn end(self, buffer: &mut Buffer) {
        close_list(buffer, self.header);
    }
}

/// Builder for the node reference list of a way.
#[derive(Debug)]
pub struct WayNodeListBuilder {
    header: usize,
}

impl WayNodeListBuilder {
    pub fn new(buffer: &mut Buffer) -> Result<WayNodeListBuilder, Error> {
        Ok(WayNodeListBuilder {
            header: open_list(buffer, ListKind::NodeRefs)?,
        })
    }

    pub fn add_node_ref(
        &self,
        buffer: &mut Buffer,
        id: i64,
        location: Location,
    ) -> Result<(), Error> {
        let offset = buffer.reserve(layout::NODE_REF_SIZE)?;
        buffer.put_i64(offset, id);
        buffer.put_i32(offset + 8, location.x());
        buffer.put_i32(offset + 12, location.y());
        Ok(())
    }

    pub fn end(self, buffer: &mut Buffer) {
        close_list(buffer, self.header);
    }
}

/// Builder for the member list of a relation.
#[derive(Debug)]
pub struct RelationMemberListBuilder {
    header: usize,
}

impl RelationMemberListBuilder {
    pub fn new(buffer: &mut Buffer) -> Result<RelationMemberListBuilder, Error> {
        Ok(RelationMemberListBuilder {
            header: open_list(buffer, ListKind::Members)?,
        })
    }

    pub fn add_member(
        &self,
        buffer: &mut Buffer,
        kind: ItemKind,
        reference: i64,
        role: &str,
    ) -> Result<(), Error> {
        let size = layout::pad8(layout::MEMBER_HEADER_SIZE + role.len());
        let offset = buffer.reserve(size)?;
        buffer.put_i64(offset + layout::MEMBER_REF, reference);
        buffer.put_u8(offset + layout::MEMBER_KIND, kind as u8);
        buffer.put_u32(offset + layout::MEMBER_ROLE_LEN, role.len() as u32);
        buffer.put_bytes(offset + layout::MEMBER_HEADER_SIZE, role.as_bytes());
        Ok(())
    }

    pub fn end(self, buffer: &mut Buffer) {
        close_list(buffer, self.header);
    }
}

/// Builder for the discussion attached to a changeset.
#[derive(Debug)]
pub struct DiscussionBuilder {
    header: usize,
}

impl DiscussionBuilder {
    pub fn new(buffer: &mut Buffer) -> Result<DiscussionBuilder, Error> {
        Ok(DiscussionBuilder {
            header: open_list(buffer, ListKind::Discussion)?,
        })
    }

    /// Appends a comment head. The body follows via `add_comment_text`
    /// before the next comment is appended.
    pub fn add_comment(
        &self,
        buffer: &mut Buffer,
        date: u32,
        uid: u32,
        user: &str,
    ) -> Result<(), Error> {
        let offset =
            buffer.reserve(layout::COMMENT_HEADER_SIZE + layout::string_record_size(user))?;
        buffer.put_u32(offset + layout::COMMENT_DATE, date);
        buffer.put_u32(offset + layout::COMMENT_UID, uid);
        buffer.put_string(offset + layout::COMMENT_HEADER_SIZE, user);
        Ok(())
    }

    pub fn add_comment_text(&self, buffer: &mut Buffer, text: &str) -> Result<(), Error> {
        let offset = buffer.reserve(layout::string_record_size(text))?;
        buffer.put_string(offset, text);
        Ok(())
    }

    pub fn end(self, buffer: &mut Buffer) {
        close_list(buffer, self.header);
    }
}
