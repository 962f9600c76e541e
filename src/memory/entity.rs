//! Read-side views over packed entities.
//!
//! A view borrows the committed bytes of a [`Buffer`](crate::memory::Buffer)
//! and walks them using only the length prefixes of the layout, the same
//! way the writer laid them out. Nothing is copied.

use byteorder::{ByteOrder, LittleEndian};

use crate::memory::layout::{self, ListKind};
use crate::osm::{BoundingBox, ItemKind, Location};

fn read_u32(data: &[u8], offset: usize) -> u32 {
    LittleEndian::read_u32(&data[offset..offset + 4])
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    LittleEndian::read_i32(&data[offset..offset + 4])
}

fn read_i64(data: &[u8], offset: usize) -> i64 {
    LittleEndian::read_i64(&data[offset..offset + 8])
}

/// Reads a string record, returning the string and the offset just past
/// its padding.
fn read_string(data: &[u8], offset: usize) -> (&str, usize) {
    let len = read_u32(data, offset) as usize;
    let bytes = &data[offset + 4..offset + 4 + len];
    let s = std::str::from_utf8(bytes).unwrap_or("");
    (s, offset + layout::pad8(4 + len))
}

/// Iterator over the entities of a committed buffer region, in document
/// order.
#[derive(Debug, Clone)]
pub struct EntityIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> EntityIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> EntityIter<'a> {
        EntityIter { data, pos: 0 }
    }
}

impl<'a> Iterator for EntityIter<'a> {
    type Item = EntityRef<'a>;

    fn next(&mut self) -> Option<EntityRef<'a>> {
        if self.pos >= self.data.len() {
            return None;
        }
        let len = read_u32(self.data, self.pos + layout::TOTAL_LEN) as usize;
        let record = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Some(EntityRef { data: record })
    }
}

/// View of one packed entity record.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    data: &'a [u8],
}

impl<'a> EntityRef<'a> {
    pub fn kind(&self) -> ItemKind {
        ItemKind::from_u8(self.data[layout::KIND]).expect("valid entity kind tag")
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn id(&self) -> i64 {
        read_i64(self.data, layout::ID)
    }

    pub fn version(&self) -> u32 {
        read_u32(self.data, layout::VERSION)
    }

    pub fn changeset(&self) -> u32 {
        read_u32(self.data, layout::CHANGESET)
    }

    pub fn timestamp(&self) -> u32 {
        read_u32(self.data, layout::TIMESTAMP)
    }

    pub fn uid(&self) -> u32 {
        read_u32(self.data, layout::UID)
    }

    pub fn visible(&self) -> bool {
        self.data[layout::VISIBLE] != 0
    }

    pub fn user(&self) -> &'a str {
        read_string(self.data, layout::fixed_size(self.kind())).0
    }

    /// The node's location; undefined for the other kinds.
    pub fn location(&self) -> Location {
        if self.kind() != ItemKind::Node {
            return Location::undefined();
        }
        Location::from_raw(
            read_i32(self.data, layout::NODE_X),
            read_i32(self.data, layout::NODE_Y),
        )
    }

    pub fn bounds(&self) -> BoundingBox {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        BoundingBox::from_corners(
            Location::from_raw(
                read_i32(self.data, layout::CS_MIN_X),
                read_i32(self.data, layout::CS_MIN_Y),
            ),
            Location::from_raw(
                read_i32(self.data, layout::CS_MAX_X),
                read_i32(self.data, layout::CS_MAX_Y),
            ),
        )
    }

    pub fn created_at(&self) -> u32 {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        read_u32(self.data, layout::CS_CREATED_AT)
    }

    pub fn closed_at(&self) -> u32 {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        read_u32(self.data, layout::CS_CLOSED_AT)
    }

    pub fn open(&self) -> bool {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        self.data[layout::CS_OPEN] != 0
    }

    pub fn num_changes(&self) -> u32 {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        read_u32(self.data, layout::CS_NUM_CHANGES)
    }

    pub fn comments_count(&self) -> u32 {
        debug_assert_eq!(self.kind(), ItemKind::Changeset);
        read_u32(self.data, layout::CS_COMMENTS_COUNT)
    }

    /// Iterates the nested list records in layout order.
    pub fn lists(&self) -> ListIter<'a> {
        let user_start = layout::fixed_size(self.kind());
        let (_, lists_start) = read_string(self.data, user_start);
        ListIter {
            data: self.data,
            pos: lists_start,
        }
    }

    fn list_payload(&self, kind: ListKind) -> &'a [u8] {
        self.lists()
            .find(|(k, _)| *k == kind)
            .map(|(_, payload)| payload)
            .unwrap_or(&[])
    }

    pub fn tags(&self) -> TagIter<'a> {
        TagIter {
            data: self.list_payload(ListKind::Tags),
            pos: 0,
        }
    }

    pub fn node_refs(&self) -> NodeRefIter<'a> {
        NodeRefIter {
            data: self.list_payload(ListKind::NodeRefs),
            pos: 0,
        }
    }

    pub fn members(&self) -> MemberIter<'a> {
        MemberIter {
            data: self.list_payload(ListKind::Members),
            pos: 0,
        }
    }

    pub fn discussion(&self) -> CommentIter<'a> {
        CommentIter {
            data: self.list_payload(ListKind::Discussion),
            pos: 0,
        }
    }
}

/// Iterator over `(list kind, payload)` pairs of an entity.
#[derive(Debug, Clone)]
pub struct ListIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = (ListKind, &'a [u8]);

    fn next(&mut self) -> Option<(ListKind, &'a [u8])> {
        if self.pos >= self.data.len() {
            return None;
        }
        let kind = ListKind::from_u8(self.data[self.pos]).expect("valid list kind tag");
        let payload_len = read_u32(self.data, self.pos + layout::LIST_PAYLOAD_LEN) as usize;
        let payload_start = self.pos + layout::LIST_HEADER_SIZE;
        let payload = &self.data[payload_start..payload_start + payload_len];
        self.pos = payload_start + payload_len;
        Some((kind, payload))
    }
}

/// Iterator over `(key, value)` tag pairs.
#[derive(Debug, Clone)]
pub struct TagIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for TagIter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<(&'a str, &'a str)> {
        if self.pos >= self.data.len() {
            return None;
        }
        let (key, value_pos) = read_string(self.data, self.pos);
        let (value, next) = read_string(self.data, value_pos);
        self.pos = next;
        Some((key, value))
    }
}

/// Iterator over `(node id, location)` pairs of a way.
#[derive(Debug, Clone)]
pub struct NodeRefIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for NodeRefIter<'a> {
    type Item = (i64, Location);

    fn next(&mut self) -> Option<(i64, Location)> {
        if self.pos >= self.data.len() {
            return None;
        }
        let id = read_i64(self.data, self.pos);
        let location = Location::from_raw(
            read_i32(self.data, self.pos + 8),
            read_i32(self.data, self.pos + 12),
        );
        self.pos += layout::NODE_REF_SIZE;
        Some((id, location))
    }
}

/// Iterator over `(kind, ref, role)` members of a relation.
#[derive(Debug, Clone)]
pub struct MemberIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for MemberIter<'a> {
    type Item = (ItemKind, i64, &'a str);

    fn next(&mut self) -> Option<(ItemKind, i64, &'a str)> {
        if self.pos >= self.data.len() {
            return None;
        }
        let reference = read_i64(self.data, self.pos + layout::MEMBER_REF);
        let kind = ItemKind::from_u8(self.data[self.pos + layout::MEMBER_KIND])
            .expect("valid member kind tag");
        let role_len = read_u32(self.data, self.pos + layout::MEMBER_ROLE_LEN) as usize;
        let role_start = self.pos + layout::MEMBER_HEADER_SIZE;
        let role = std::str::from_utf8(&self.data[role_start..role_start + role_len])
            .unwrap_or("");
        self.pos += layout::pad8(layout::MEMBER_HEADER_SIZE + role_len);
        Some((kind, reference, role))
    }
}

/// Iterator over `(date, uid, user, body)` comments of a changeset
/// discussion.
#[derive(Debug, Clone)]
pub struct CommentIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for CommentIter<'a> {
    type Item = (u32, u32, &'a str, &'a str);

    fn next(&mut self) -> Option<(u32, u32, &'a str, &'a str)> {
        if self.pos >= self.data.len() {
            return None;
        }
        let date = read_u32(self.data, self.pos + layout::COMMENT_DATE);
        let uid = read_u32(self.data, self.pos + layout::COMMENT_UID);
        let (user, body_pos) = read_string(self.data, self.pos + layout::COMMENT_HEADER_SIZE);
        let (body, next) = read_string(self.data, body_pos);
        self.pos = next;
        Some((date, uid, user, body))
    }
}
