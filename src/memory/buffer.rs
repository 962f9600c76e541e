use byteorder::{ByteOrder, LittleEndian};

use crate::error::Error;
use crate::memory::entity::EntityIter;
use crate::memory::layout::{pad8, ALIGNMENT};

/// Append-only arena holding packed OSM entities.
///
/// Two cursors partition the backing storage: `committed` marks the end of
/// the durable region (only whole entities), `written` the end of the
/// uncommitted region the currently open builders write into. Builder
/// offsets are relative to `committed`, so an open entity can be relocated
/// into a fresh buffer without touching the builders (see
/// [`Buffer::detach_committed`]).
#[derive(Debug)]
pub struct Buffer {
    data: Box<[u8]>,
    committed: usize,
    written: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            data: vec![0u8; pad8(capacity)].into_boxed_slice(),
            committed: 0,
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    /// Bytes written since the last commit, i.e. the size of the open entity.
    pub fn uncommitted(&self) -> usize {
        self.written - self.committed
    }

    /// Advances the write cursor by `n` bytes (padded to the alignment) and
    /// returns the offset of the region relative to the committed watermark.
    /// The region is zeroed.
    pub fn reserve(&mut self, n: usize) -> Result<usize, Error> {
        debug_assert_eq!(self.written % ALIGNMENT, 0);
        let n = pad8(n);
        if self.written + n > self.data.len() {
            return Err(Error::BufferOverflow);
        }
        let offset = self.written - self.committed;
        self.data[self.written..self.written + n].fill(0);
        self.written += n;
        Ok(offset)
    }

    /// Makes everything written so far durable. Callable only at entity
    /// boundaries.
    pub fn commit(&mut self) {
        self.committed = self.written;
    }

    /// Discards everything written since the last commit.
    pub fn rollback(&mut self) {
        self.written = self.committed;
    }

    /// Moves the buffer out, leaving a fresh one of the same capacity.
    pub fn take(&mut self) -> Buffer {
        std::mem::replace(self, Buffer::with_capacity(self.capacity()))
    }

    /// Splits off the committed region for hand-off while an entity is
    /// still open: the open entity is copied to the front of a fresh buffer
    /// which replaces `self`, and the old buffer (committed data only) is
    /// returned. Builder offsets stay valid because they are relative to
    /// the committed watermark.
    pub fn detach_committed(&mut self) -> Buffer {
        let mut fresh = Buffer::with_capacity(self.capacity());
        let partial = self.written - self.committed;
        fresh.data[..partial].copy_from_slice(&self.data[self.committed..self.written]);
        fresh.written = partial;
        self.written = self.committed;
        std::mem::replace(self, fresh)
    }

    /// The committed bytes, ready for traversal.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.committed]
    }

    /// Iterates over the committed entities in document order.
    pub fn entities(&self) -> EntityIter<'_> {
        EntityIter::new(self.bytes())
    }

    fn abs(&self, offset: usize, len: usize) -> usize {
        let abs = self.committed + offset;
        debug_assert!(abs + len <= self.written);
        abs
    }

    pub(crate) fn put_u8(&mut self, offset: usize, value: u8) {
        let abs = self.abs(offset, 1);
        self.data[abs] = value;
    }

    pub(crate) fn put_u32(&mut self, offset: usize, value: u32) {
        let abs = self.abs(offset, 4);
        LittleEndian::write_u32(&mut self.data[abs..abs + 4], value);
    }

    pub(crate) fn put_i32(&mut self, offset: usize, value: i32) {
        let abs = self.abs(offset, 4);
        LittleEndian::write_i32(&mut self.data[abs..abs + 4], value);
    }

    pub(crate) fn put_i64(&mut self, offset: usize, value: i64) {
        let abs = self.abs(offset, 8);
        LittleEndian::write_i64(&mut self.data[abs..abs + 8], value);
    }

    pub(crate) fn put_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let abs = self.abs(offset, bytes.len());
        self.data[abs..abs + bytes.len()].copy_from_slice(bytes);
    }

    /// Writes a length-prefixed string record at `offset`, which must have
    /// been reserved with `string_record_size` bytes.
    pub(crate) fn put_string(&mut self, offset: usize, s: &str) {
        self.put_u32(offset, s.len() as u32);
        self.put_bytes(offset + 4, s.as_bytes());
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reserve_aligns_and_tracks_cursors() {
        let mut buffer = Buffer::with_capacity(64);
        assert_eq!(buffer.reserve(3).unwrap(), 0);
        assert_eq!(buffer.written(), 8);
        assert_eq!(buffer.reserve(8).unwrap(), 8);
        assert_eq!(buffer.written(), 16);
        assert_eq!(buffer.committed(), 0);

        buffer.commit();
        assert_eq!(buffer.committed(), 16);
        // offsets restart relative to the new watermark
        assert_eq!(buffer.reserve(8).unwrap(), 0);
    }

    #[test]
    fn test_reserve_overflow() {
        let mut buffer = Buffer::with_capacity(16);
        buffer.reserve(16).unwrap();
        assert_eq!(buffer.reserve(1), Err(Error::BufferOverflow));
    }

    #[test]
    fn test_rollback_discards_uncommitted() {
        let mut buffer = Buffer::with_capacity(64);
        buffer.reserve(8).unwrap();
        buffer.commit();
        buffer.reserve(24).unwrap();
        buffer.rollback();
        assert_eq!(buffer.written(), 8);
        assert_eq!(buffer.committed(), 8);
    }

    #[test]
    fn test_take_leaves_fresh_buffer() {
        let mut buffer = Buffer::with_capacity(64);
        let offset = buffer.reserve(8).unwrap();
        buffer.put_i64(offset, -1);
        buffer.commit();

        let full = buffer.take();
        assert_eq!(full.committed(), 8);
        assert_eq!(buffer.committed(), 0);
        assert_eq!(buffer.written(), 0);
        assert_eq!(buffer.capacity(), 64);
    }

    #[test]
    fn test_detach_committed_relocates_open_entity() {
        let mut buffer = Buffer::with_capacity(64);
        let offset = buffer.reserve(8).unwrap();
        buffer.put_u32(offset, 0xAAAA_BBBB);
        buffer.commit();

        let open = buffer.reserve(8).unwrap();
        buffer.put_u32(open, 0xCCCC_DDDD);

        let full = buffer.detach_committed();
        assert_eq!(full.committed(), 8);
        assert_eq!(full.written(), 8);
        assert_eq!(&full.bytes()[..4], &0xAAAA_BBBBu32.to_le_bytes());

        // the open entity moved to the front, same relative offset
        assert_eq!(buffer.committed(), 0);
        assert_eq!(buffer.written(), 8);
        buffer.put_u32(open + 4, 1);
        buffer.commit();
        assert_eq!(&buffer.bytes()[..4], &0xCCCC_DDDDu32.to_le_bytes());
    }
}
