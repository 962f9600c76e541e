//! The OSM XML / OsmChange decoder.
//!
//! [`spawn_xml_parser`] starts a dedicated worker thread that pulls raw
//! byte chunks from the input channel, runs them through a streaming XML
//! reader and encodes the recognized entities into packed buffers. Whole
//! buffers travel down a bounded channel to the consumer; file metadata is
//! delivered once through the header promise as soon as the root element
//! (and a possible leading `bounds` element) has been seen.

use std::str;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;

use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Error;
use crate::io::format::InputHandle;
use crate::io::header::Header;
use crate::io::promise::{header_channel, HeaderSender};
use crate::io::queue::ChunkStream;
use crate::memory::builder::{
    ChangesetBuilder, DiscussionBuilder, ObjectBuilder, RelationMemberListBuilder,
    TagListBuilder, WayNodeListBuilder,
};
use crate::memory::Buffer;
use crate::osm::{
    parse_coordinate, parse_id, parse_timestamp, parse_u32, BoundingBox, EntityMask, ItemKind,
    Location,
};

const BUFFER_SIZE: usize = 2 * 1000 * 1000;
const OUTPUT_QUEUE_SIZE: usize = 8;

/// Starts the XML parser on its own thread reading from `input`.
pub fn spawn_xml_parser(read_types: EntityMask, input: Receiver<Vec<u8>>) -> InputHandle {
    let (output_tx, output_rx) = sync_channel(OUTPUT_QUEUE_SIZE);
    let (header_tx, header_rx) = header_channel();
    let worker = thread::Builder::new()
        .name("osmxml-xml-in".to_string())
        .spawn(move || {
            let mut reader = Reader::from_reader(ChunkStream::new(input));
            reader.expand_empty_elements(true);
            let mut ingest = XmlIngest::new(read_types, header_tx, output_tx, BUFFER_SIZE);
            if let Err(error) = run_parser(&mut reader, &mut ingest) {
                debug!("xml parser terminated: {}", error);
                ingest.abort(error);
            }
        })
        .expect("failed to spawn xml parser thread");
    InputHandle::new(header_rx, output_rx, worker)
}

/// Drives the event loop until end of stream, a parse error, or until the
/// consumer needs nothing further.
fn run_parser(reader: &mut Reader<ChunkStream>, ingest: &mut XmlIngest) -> Result<(), Error> {
    let mut event_buf = Vec::new();
    let mut attrs: Vec<(String, String)> = Vec::new();
    loop {
        event_buf.clear();
        let event = match reader.read_event_into(&mut event_buf) {
            Ok(event) => event,
            Err(error) => return Err(syntax_error(reader, error)),
        };
        match event {
            Event::Start(ref element) => {
                collect_attributes(reader, element, &mut attrs)?;
                ingest.start_element(element.name().as_ref(), &attrs)?;
            }
            Event::End(ref element) => ingest.end_element(element.name().as_ref())?,
            Event::Text(ref text) => {
                let text = text.unescape().map_err(|e| syntax_error(reader, e))?;
                ingest.characters(&text);
            }
            Event::CData(ref cdata) => {
                let text = str::from_utf8(cdata).map_err(|e| syntax_error(reader, e))?;
                ingest.characters(text);
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctypes
            _ => {}
        }
        if ingest.consumer_gone() {
            return Ok(());
        }
        if ingest.read_types().is_empty() && ingest.header_resolved() {
            break;
        }
    }
    ingest.finish();
    Ok(())
}

fn syntax_error<E: std::fmt::Display>(reader: &Reader<ChunkStream>, error: E) -> Error {
    let stream = reader.get_ref();
    Error::XmlSyntax {
        line: stream.line(),
        column: stream.column(),
        detail: error.to_string(),
    }
}

fn collect_attributes(
    reader: &Reader<ChunkStream>,
    element: &BytesStart,
    attrs: &mut Vec<(String, String)>,
) -> Result<(), Error> {
    attrs.clear();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|e| syntax_error(reader, e))?;
        let key = str::from_utf8(attribute.key.as_ref())
            .map_err(|e| syntax_error(reader, e))?
            .to_string();
        let value = attribute
            .unescape_value()
            .map_err(|e| syntax_error(reader, e))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Root,
    Top,
    Node,
    Way,
    Relation,
    Changeset,
    Discussion,
    Comment,
    CommentText,
    /// Inside an unrecognized sub-element of an entity; `last_context`
    /// remembers where to return to, `in_object_depth` how deep we are.
    InObject,
    IgnoredNode,
    IgnoredWay,
    IgnoredRelation,
    IgnoredChangeset,
}

/// The ingest state machine. Receives element/character events, keeps the
/// builder chain for the entity under construction and commits the buffer
/// at every entity boundary.
struct XmlIngest {
    context: Context,
    last_context: Context,
    in_object_depth: u32,
    in_delete_section: bool,
    header: Header,
    header_sender: Option<HeaderSender>,
    buffer: Buffer,
    output: SyncSender<Result<Buffer, Error>>,
    read_types: EntityMask,
    consumer_gone: bool,
    object_builder: Option<ObjectBuilder>,
    changeset_builder: Option<ChangesetBuilder>,
    discussion_builder: Option<DiscussionBuilder>,
    tl_builder: Option<TagListBuilder>,
    wnl_builder: Option<WayNodeListBuilder>,
    rml_builder: Option<RelationMemberListBuilder>,
    comment_open: bool,
    comment_text: String,
}

impl XmlIngest {
    fn new(
        read_types: EntityMask,
        header_sender: HeaderSender,
        output: SyncSender<Result<Buffer, Error>>,
        buffer_capacity: usize,
    ) -> XmlIngest {
        XmlIngest {
            context: Context::Root,
            last_context: Context::Root,
            in_object_depth: 0,
            in_delete_section: false,
            header: Header::new(),
            header_sender: Some(header_sender),
            buffer: Buffer::with_capacity(buffer_capacity),
            output,
            read_types,
            consumer_gone: false,
            object_builder: None,
            changeset_builder: None,
            discussion_builder: None,
            tl_builder: None,
            wnl_builder: None,
            rml_builder: None,
            comment_open: false,
            comment_text: String::new(),
        }
    }

    fn read_types(&self) -> EntityMask {
        self.read_types
    }

    fn consumer_gone(&self) -> bool {
        self.consumer_gone
    }

    fn header_resolved(&self) -> bool {
        self.header_sender.is_none()
    }

    fn start_element(&mut self, name: &[u8], attrs: &[(String, String)]) -> Result<(), Error> {
        match self.context {
            Context::Root => match name {
                b"osm" | b"osmChange" => {
                    if name == b"osmChange" {
                        self.header.set_has_multiple_object_versions(true);
                    }
                    let mut version = None;
                    for (key, value) in attrs {
                        match key.as_str() {
                            "version" => {
                                self.header.set("version", value);
                                version = Some(value.clone());
                            }
                            "generator" => self.header.set("generator", value),
                            _ => {}
                        }
                    }
                    if version.as_deref() != Some("0.6") {
                        return Err(Error::FormatVersion { got: version });
                    }
                    self.context = Context::Top;
                }
                other => {
                    return Err(Error::UnknownRoot {
                        name: String::from_utf8_lossy(other).into_owned(),
                    })
                }
            },
            Context::Top => match name {
                b"node" => {
                    self.header_is_done();
                    if self.read_types.contains(ItemKind::Node) {
                        self.open_object(ItemKind::Node, attrs)?;
                        self.context = Context::Node;
                    } else {
                        self.context = Context::IgnoredNode;
                    }
                }
                b"way" => {
                    self.header_is_done();
                    if self.read_types.contains(ItemKind::Way) {
                        self.open_object(ItemKind::Way, attrs)?;
                        self.context = Context::Way;
                    } else {
                        self.context = Context::IgnoredWay;
                    }
                }
                b"relation" => {
                    self.header_is_done();
                    if self.read_types.contains(ItemKind::Relation) {
                        self.open_object(ItemKind::Relation, attrs)?;
                        self.context = Context::Relation;
                    } else {
                        self.context = Context::IgnoredRelation;
                    }
                }
                b"changeset" => {
                    self.header_is_done();
                    if self.read_types.contains(ItemKind::Changeset) {
                        self.open_changeset(attrs)?;
                        self.context = Context::Changeset;
                    } else {
                        self.context = Context::IgnoredChangeset;
                    }
                }
                b"bounds" => {
                    let mut min = Location::undefined();
                    let mut max = Location::undefined();
                    for (key, value) in attrs {
                        match key.as_str() {
                            "minlat" => min.set_x(parse_coordinate(value)),
                            "minlon" => min.set_y(parse_coordinate(value)),
                            "maxlat" => max.set_x(parse_coordinate(value)),
                            "maxlon" => max.set_y(parse_coordinate(value)),
                            _ => {}
                        }
                    }
                    self.header.add_box(BoundingBox::from_corners(min, max));
                }
                b"delete" => self.in_delete_section = true,
                b"create" | b"modify" => self.in_delete_section = false,
                _ => {}
            },
            Context::Node => {
                self.enter_child(Context::Node);
                if name == b"tag" {
                    self.get_tag(attrs)?;
                }
            }
            Context::Way => {
                self.enter_child(Context::Way);
                match name {
                    b"nd" => {
                        self.close_tag_list();
                        if self.wnl_builder.is_none() {
                            let builder =
                                self.retrying(|ing| WayNodeListBuilder::new(&mut ing.buffer))?;
                            self.wnl_builder = Some(builder);
                        }
                        let mut reference = 0;
                        for (key, value) in attrs {
                            if key == "ref" {
                                reference = parse_id(value);
                            }
                        }
                        self.retrying(|ing| {
                            // unwrap ok, the list was just ensured above
                            let wnl = ing.wnl_builder.as_ref().unwrap();
                            wnl.add_node_ref(&mut ing.buffer, reference, Location::undefined())
                        })?;
                    }
                    b"tag" => {
                        self.close_way_node_list();
                        self.get_tag(attrs)?;
                    }
                    _ => {}
                }
            }
            Context::Relation => {
                self.enter_child(Context::Relation);
                match name {
                    b"member" => {
                        self.close_tag_list();
                        if self.rml_builder.is_none() {
                            let builder = self
                                .retrying(|ing| RelationMemberListBuilder::new(&mut ing.buffer))?;
                            self.rml_builder = Some(builder);
                        }
                        let mut kind = None;
                        let mut raw_type = "";
                        let mut reference = 0;
                        let mut role = "";
                        for (key, value) in attrs {
                            match key.as_str() {
                                "type" => {
                                    raw_type = value.as_str();
                                    kind = value
                                        .as_bytes()
                                        .first()
                                        .copied()
                                        .and_then(ItemKind::from_member_char);
                                }
                                "ref" => reference = parse_id(value),
                                "role" => role = value.as_str(),
                                _ => {}
                            }
                        }
                        let kind = kind.ok_or_else(|| Error::UnknownMemberType {
                            raw: raw_type.to_string(),
                        })?;
                        if reference == 0 {
                            return Err(Error::MissingRef);
                        }
                        self.retrying(|ing| {
                            // unwrap ok, the list was just ensured above
                            let rml = ing.rml_builder.as_ref().unwrap();
                            rml.add_member(&mut ing.buffer, kind, reference, role)
                        })?;
                    }
                    b"tag" => {
                        self.close_member_list();
                        self.get_tag(attrs)?;
                    }
                    _ => {}
                }
            }
            Context::Changeset => match name {
                b"discussion" => {
                    self.close_tag_list();
                    if self.discussion_builder.is_none() {
                        let builder =
                            self.retrying(|ing| DiscussionBuilder::new(&mut ing.buffer))?;
                        self.discussion_builder = Some(builder);
                    }
                    self.context = Context::Discussion;
                }
                b"tag" => {
                    self.enter_child(Context::Changeset);
                    self.close_discussion();
                    self.get_tag(attrs)?;
                }
                _ => {
                    self.enter_child(Context::Changeset);
                }
            },
            Context::Discussion => {
                if name == b"comment" {
                    let mut date = 0;
                    let mut uid = 0;
                    let mut user = "";
                    for (key, value) in attrs {
                        match key.as_str() {
                            "date" => date = parse_timestamp(value),
                            "uid" => uid = parse_u32(value),
                            "user" => user = value.as_str(),
                            _ => {}
                        }
                    }
                    self.retrying(|ing| {
                        // unwrap ok, entering Discussion opened the builder
                        let discussion = ing.discussion_builder.as_ref().unwrap();
                        discussion.add_comment(&mut ing.buffer, date, uid, user)
                    })?;
                    self.comment_open = true;
                    self.context = Context::Comment;
                }
            }
            Context::Comment => {
                if name == b"text" {
                    self.context = Context::CommentText;
                }
            }
            Context::CommentText => {}
            Context::InObject => self.in_object_depth += 1,
            Context::IgnoredNode
            | Context::IgnoredWay
            | Context::IgnoredRelation
            | Context::IgnoredChangeset => {}
        }
        Ok(())
    }

    fn end_element(&mut self, name: &[u8]) -> Result<(), Error> {
        match self.context {
            Context::Root => {}
            Context::Top => {
                if name == b"osm" || name == b"osmChange" {
                    self.header_is_done();
                    self.context = Context::Root;
                } else if name == b"delete" {
                    self.in_delete_section = false;
                }
            }
            Context::Node | Context::Way | Context::Relation => {
                self.close_tag_list();
                self.close_way_node_list();
                self.close_member_list();
                if let Some(builder) = self.object_builder.take() {
                    builder.end(&mut self.buffer);
                }
                self.buffer.commit();
                self.context = Context::Top;
                self.flush_buffer();
            }
            Context::Changeset => {
                self.close_tag_list();
                self.close_discussion();
                if let Some(builder) = self.changeset_builder.take() {
                    builder.end(&mut self.buffer);
                }
                self.buffer.commit();
                self.context = Context::Top;
                self.flush_buffer();
            }
            Context::Discussion => {
                if name == b"discussion" {
                    self.context = Context::Changeset;
                }
            }
            Context::Comment => {
                if name == b"comment" {
                    // a comment without a <text> child still gets a body record
                    if self.comment_open {
                        self.retrying(|ing| {
                            let discussion = ing.discussion_builder.as_ref().unwrap();
                            discussion.add_comment_text(&mut ing.buffer, "")
                        })?;
                        self.comment_open = false;
                    }
                    self.context = Context::Discussion;
                }
            }
            Context::CommentText => {
                if name == b"text" {
                    let text = std::mem::take(&mut self.comment_text);
                    self.retrying(|ing| {
                        let discussion = ing.discussion_builder.as_ref().unwrap();
                        discussion.add_comment_text(&mut ing.buffer, &text)
                    })?;
                    self.comment_open = false;
                    self.context = Context::Comment;
                }
            }
            Context::InObject => {
                self.in_object_depth -= 1;
                if self.in_object_depth == 0 {
                    self.context = self.last_context;
                }
            }
            Context::IgnoredNode => {
                if name == b"node" {
                    self.context = Context::Top;
                }
            }
            Context::IgnoredWay => {
                if name == b"way" {
                    self.context = Context::Top;
                }
            }
            Context::IgnoredRelation => {
                if name == b"relation" {
                    self.context = Context::Top;
                }
            }
            Context::IgnoredChangeset => {
                if name == b"changeset" {
                    self.context = Context::Top;
                }
            }
        }
        Ok(())
    }

    fn characters(&mut self, text: &str) {
        if self.context == Context::CommentText {
            self.comment_text.push_str(text);
        } else {
            self.comment_text.clear();
        }
    }

    /// Resolves the header promise; a second call is a no-op.
    fn header_is_done(&mut self) {
        if let Some(sender) = self.header_sender.take() {
            sender.resolve(self.header.clone());
        }
    }

    fn enter_child(&mut self, parent: Context) {
        self.last_context = parent;
        self.context = Context::InObject;
        self.in_object_depth = 1;
    }

    fn open_object(&mut self, kind: ItemKind, attrs: &[(String, String)]) -> Result<(), Error> {
        let builder = self.retrying(|ing| ObjectBuilder::new(&mut ing.buffer, kind))?;
        self.object_builder = Some(builder);

        let mut location = Location::undefined();
        let mut user = "";
        for (key, value) in attrs {
            // unwrap ok, the builder was stored right above
            let builder = self.object_builder.as_ref().unwrap();
            match key.as_str() {
                "lat" => location.set_x(parse_coordinate(value)),
                "lon" => location.set_y(parse_coordinate(value)),
                "user" => user = value.as_str(),
                "id" => builder.set_id(&mut self.buffer, parse_id(value)),
                "version" => builder.set_version(&mut self.buffer, parse_u32(value)),
                "changeset" => builder.set_changeset(&mut self.buffer, parse_u32(value)),
                "timestamp" => builder.set_timestamp(&mut self.buffer, parse_timestamp(value)),
                "uid" => builder.set_uid(&mut self.buffer, parse_u32(value)),
                "visible" => builder.set_visible(&mut self.buffer, value != "false"),
                _ => {}
            }
        }
        let builder = self.object_builder.as_ref().unwrap();
        if kind == ItemKind::Node && location.is_defined() {
            builder.set_location(&mut self.buffer, location);
        }
        // a delete section hides its entities, whatever their attributes say
        if self.in_delete_section {
            builder.set_visible(&mut self.buffer, false);
        }
        self.retrying(|ing| {
            let builder = ing.object_builder.as_ref().unwrap();
            builder.add_user(&mut ing.buffer, user)
        })
    }

    fn open_changeset(&mut self, attrs: &[(String, String)]) -> Result<(), Error> {
        let builder = self.retrying(|ing| ChangesetBuilder::new(&mut ing.buffer))?;
        self.changeset_builder = Some(builder);

        let mut min = Location::undefined();
        let mut max = Location::undefined();
        let mut user = "";
        for (key, value) in attrs {
            // unwrap ok, the builder was stored right above
            let builder = self.changeset_builder.as_ref().unwrap();
            match key.as_str() {
                "min_lat" => min.set_x(parse_coordinate(value)),
                "min_lon" => min.set_y(parse_coordinate(value)),
                "max_lat" => max.set_x(parse_coordinate(value)),
                "max_lon" => max.set_y(parse_coordinate(value)),
                "user" => user = value.as_str(),
                "id" => builder.set_id(&mut self.buffer, parse_id(value)),
                "uid" => builder.set_uid(&mut self.buffer, parse_u32(value)),
                "created_at" => {
                    builder.set_created_at(&mut self.buffer, parse_timestamp(value))
                }
                "closed_at" => builder.set_closed_at(&mut self.buffer, parse_timestamp(value)),
                "open" => builder.set_open(&mut self.buffer, value == "true"),
                "num_changes" => builder.set_num_changes(&mut self.buffer, parse_u32(value)),
                "comments_count" => {
                    builder.set_comments_count(&mut self.buffer, parse_u32(value))
                }
                _ => {}
            }
        }
        let bounds = BoundingBox::from_corners(min, max);
        let builder = self.changeset_builder.as_ref().unwrap();
        builder.set_bounds(&mut self.buffer, bounds.min(), bounds.max());
        self.retrying(|ing| {
            let builder = ing.changeset_builder.as_ref().unwrap();
            builder.add_user(&mut ing.buffer, user)
        })
    }

    fn get_tag(&mut self, attrs: &[(String, String)]) -> Result<(), Error> {
        let mut tag_key = "";
        let mut tag_value = "";
        for (key, value) in attrs {
            match key.as_str() {
                "k" => tag_key = value.as_str(),
                "v" => tag_value = value.as_str(),
                _ => {}
            }
        }
        if self.tl_builder.is_none() {
            let builder = self.retrying(|ing| TagListBuilder::new(&mut ing.buffer))?;
            self.tl_builder = Some(builder);
        }
        self.retrying(|ing| {
            // unwrap ok, the list was just ensured above
            let tl = ing.tl_builder.as_ref().unwrap();
            tl.add_tag(&mut ing.buffer, tag_key, tag_value)
        })
    }

    fn close_tag_list(&mut self) {
        if let Some(builder) = self.tl_builder.take() {
            builder.end(&mut self.buffer);
        }
    }

    fn close_way_node_list(&mut self) {
        if let Some(builder) = self.wnl_builder.take() {
            builder.end(&mut self.buffer);
        }
    }

    fn close_member_list(&mut self) {
        if let Some(builder) = self.rml_builder.take() {
            builder.end(&mut self.buffer);
        }
    }

    fn close_discussion(&mut self) {
        if let Some(builder) = self.discussion_builder.take() {
            builder.end(&mut self.buffer);
        }
    }

    /// Runs a buffer-writing operation, and on overflow hands the committed
    /// part of the buffer downstream and retries the operation once in the
    /// freed-up buffer. A second overflow means the entity alone exceeds
    /// the buffer capacity and is fatal.
    fn retrying<T>(
        &mut self,
        mut op: impl FnMut(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        match op(self) {
            Err(Error::BufferOverflow) => {
                if self.buffer.committed() == 0 {
                    return Err(Error::BufferOverflow);
                }
                let full = self.buffer.detach_committed();
                self.send_buffer(full);
                op(self)
            }
            result => result,
        }
    }

    fn flush_buffer(&mut self) {
        if self.buffer.committed() > self.buffer.capacity() / 10 * 9 {
            let full = self.buffer.take();
            self.send_buffer(full);
        }
    }

    fn send_buffer(&mut self, buffer: Buffer) {
        debug!("sending entity buffer ({} bytes)", buffer.committed());
        if self.output.send(Ok(buffer)).is_err() {
            self.consumer_gone = true;
        }
    }

    /// End of stream: resolve a still pending header promise and hand over
    /// whatever is committed.
    fn finish(&mut self) {
        self.header_is_done();
        if self.buffer.committed() > 0 {
            let rest = self.buffer.take();
            self.send_buffer(rest);
        }
    }

    /// Parse failure: the error resolves a pending header promise and
    /// becomes the terminal record of the output channel. The open entity
    /// is discarded and the current buffer never delivered; a failed
    /// stream produces no trailing data.
    fn abort(&mut self, error: Error) {
        self.buffer.rollback();
        if let Some(sender) = self.header_sender.take() {
            sender.fail(error.clone());
        }
        let _ = self.output.send(Err(error));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::memory::EntityRef;

    /// Feeds `xml` in deliberately tiny chunks so events regularly straddle
    /// chunk boundaries.
    fn parse(
        xml: &str,
        mask: EntityMask,
    ) -> (Result<Header, Error>, Vec<Result<Buffer, Error>>) {
        let (tx, rx) = sync_channel(1);
        let mut handle = spawn_xml_parser(mask, rx);
        for chunk in xml.as_bytes().chunks(7) {
            if tx.send(chunk.to_vec()).is_err() {
                break;
            }
        }
        let _ = tx.send(Vec::new());
        let header = handle.header();
        let buffers: Vec<_> = handle.by_ref().collect();
        handle.join();
        (header, buffers)
    }

    fn parse_entities(xml: &str, mask: EntityMask) -> (Header, Vec<Buffer>) {
        let (header, buffers) = parse(xml, mask);
        let buffers = buffers
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .expect("stream should parse");
        (header.expect("header should parse"), buffers)
    }

    fn collect<'a>(buffers: &'a [Buffer]) -> Vec<EntityRef<'a>> {
        buffers.iter().flat_map(|b| b.entities()).collect()
    }

    #[test]
    fn test_single_node() {
        let (header, buffers) = parse_entities(
            r#"<osm version="0.6" generator="test"><node id="1" lat="1.0" lon="2.0" version="3" visible="true"/></osm>"#,
            EntityMask::ALL,
        );
        assert_eq!(header.get("version"), Some("0.6"));
        assert_eq!(header.get("generator"), Some("test"));
        assert!(!header.has_multiple_object_versions());

        let entities = collect(&buffers);
        assert_eq!(entities.len(), 1);
        let node = &entities[0];
        assert_eq!(node.kind(), ItemKind::Node);
        assert_eq!(node.id(), 1);
        assert_eq!(node.version(), 3);
        assert!(node.visible());
        assert_eq!(node.location().x(), 10_000_000);
        assert_eq!(node.location().y(), 20_000_000);
        assert_eq!(node.tags().count(), 0);
    }

    #[test]
    fn test_unsupported_version() {
        let (header, buffers) = parse(r#"<osm version="0.5"/>"#, EntityMask::ALL);
        assert_eq!(
            header.unwrap_err(),
            Error::FormatVersion {
                got: Some("0.5".to_string())
            }
        );
        assert_eq!(buffers.len(), 1);
        assert!(matches!(buffers[0], Err(Error::FormatVersion { .. })));
    }

    #[test]
    fn test_missing_version() {
        let (header, _) = parse(r#"<osm generator="x"/>"#, EntityMask::ALL);
        assert_eq!(header.unwrap_err(), Error::FormatVersion { got: None });
    }

    #[test]
    fn test_unknown_root() {
        let (header, _) = parse(r#"<gpx version="0.6"/>"#, EntityMask::ALL);
        assert_eq!(
            header.unwrap_err(),
            Error::UnknownRoot {
                name: "gpx".to_string()
            }
        );
    }

    #[test]
    fn test_change_file_delete_section() {
        let (header, buffers) = parse_entities(
            r#"<osmChange version="0.6"><delete><node id="7" version="2"/></delete><create><node id="8" version="1"/></create></osmChange>"#,
            EntityMask::ALL,
        );
        assert!(header.has_multiple_object_versions());

        let entities = collect(&buffers);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id(), 7);
        assert_eq!(entities[0].version(), 2);
        assert!(!entities[0].visible());
        assert_eq!(entities[1].id(), 8);
        assert_eq!(entities[1].version(), 1);
        assert!(entities[1].visible());
    }

    #[test]
    fn test_delete_section_overrides_visible_attribute() {
        let (_, buffers) = parse_entities(
            r#"<osmChange version="0.6"><delete><node id="9" visible="true"/></delete></osmChange>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        assert!(!entities[0].visible());
    }

    #[test]
    fn test_way_with_node_refs_and_tags() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><way id="1"><nd ref="10"/><nd ref="11"/><tag k="highway" v="road"/></way></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        assert_eq!(entities.len(), 1);
        let way = &entities[0];
        assert_eq!(way.kind(), ItemKind::Way);
        let refs: Vec<i64> = way.node_refs().map(|(id, _)| id).collect();
        assert_eq!(refs, vec![10, 11]);
        assert!(way.node_refs().all(|(_, loc)| !loc.is_defined()));
        assert_eq!(way.tags().collect::<Vec<_>>(), vec![("highway", "road")]);

        // in the packed record the tag list follows the node reference list
        let kinds: Vec<_> = way.lists().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![
                crate::memory::ListKind::NodeRefs,
                crate::memory::ListKind::Tags
            ]
        );
    }

    #[test]
    fn test_relation_members() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><relation id="1"><member type="node" ref="5" role="stop"/><member type="w" ref="-6" role=""/><tag k="type" v="route"/></relation></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        let members: Vec<_> = entities[0].members().collect();
        assert_eq!(
            members,
            vec![(ItemKind::Node, 5, "stop"), (ItemKind::Way, -6, "")]
        );
    }

    #[test]
    fn test_member_with_zero_ref() {
        let (header, buffers) = parse(
            r#"<osm version="0.6"><relation id="1"><member type="n" ref="0" role="x"/></relation></osm>"#,
            EntityMask::ALL,
        );
        // the header resolved before the relation failed
        assert!(header.is_ok());
        assert_eq!(buffers.len(), 1);
        assert!(matches!(buffers[0], Err(Error::MissingRef)));
    }

    #[test]
    fn test_member_with_unknown_type() {
        let (_, buffers) = parse(
            r#"<osm version="0.6"><relation id="1"><member type="x" ref="4" role=""/></relation></osm>"#,
            EntityMask::ALL,
        );
        assert!(matches!(
            buffers[0],
            Err(Error::UnknownMemberType { ref raw }) if raw == "x"
        ));
    }

    #[test]
    fn test_changeset_with_discussion() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><changeset id="1" created_at="2020-01-01T00:00:00Z" open="false" min_lat="1.0" min_lon="2.0" max_lat="3.0" max_lon="4.0" comments_count="1"><discussion><comment date="2020-01-01T00:00:00Z" uid="5" user="u"><text>hi</text></comment></discussion></changeset></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        assert_eq!(entities.len(), 1);
        let changeset = &entities[0];
        assert_eq!(changeset.kind(), ItemKind::Changeset);
        assert_eq!(changeset.id(), 1);
        assert_eq!(changeset.created_at(), 1_577_836_800);
        assert!(!changeset.open());
        assert_eq!(changeset.comments_count(), 1);
        let bounds = changeset.bounds();
        assert_eq!(bounds.min(), Location::from_degrees("1.0", "2.0"));
        assert_eq!(bounds.max(), Location::from_degrees("3.0", "4.0"));
        assert_eq!(
            changeset.discussion().collect::<Vec<_>>(),
            vec![(1_577_836_800, 5, "u", "hi")]
        );
    }

    #[test]
    fn test_bounds_element() {
        let (header, _) = parse_entities(
            r#"<osm version="0.6"><bounds minlat="-1.0" minlon="-2.0" maxlat="1.0" maxlon="2.0"/></osm>"#,
            EntityMask::ALL,
        );
        assert_eq!(header.boxes().len(), 1);
        let bbox = header.boxes()[0];
        assert_eq!(bbox.min(), Location::from_degrees("-1.0", "-2.0"));
        assert_eq!(bbox.max(), Location::from_degrees("1.0", "2.0"));
    }

    #[test]
    fn test_unknown_elements_are_skipped() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><node id="1"><unknown><deep><deeper/></deep></unknown><tag k="a" v="b"/></node><strange><node id="99"/></strange></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        // the node inside <strange> is a top-level unknown; osm files do
        // not nest entities, so it parses as a regular node
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].id(), 1);
        assert_eq!(entities[0].tags().collect::<Vec<_>>(), vec![("a", "b")]);
    }

    #[test]
    fn test_entity_mask_filters_kinds() {
        let xml = r#"<osm version="0.6"><node id="1"/><way id="2"/><node id="3"/><relation id="4"/><changeset id="5"/></osm>"#;
        let (_, buffers) = parse_entities(xml, EntityMask::WAY | EntityMask::CHANGESET);
        let summary: Vec<_> = collect(&buffers)
            .iter()
            .map(|e| (e.kind(), e.id()))
            .collect();
        assert_eq!(
            summary,
            vec![(ItemKind::Way, 2), (ItemKind::Changeset, 5)]
        );
    }

    #[test]
    fn test_empty_mask_resolves_header_and_stops() {
        let (header, buffers) = parse(
            r#"<osm version="0.6" generator="g"><node id="1"/><node id="2"/></osm>"#,
            EntityMask::NOTHING,
        );
        assert_eq!(header.unwrap().get("generator"), Some("g"));
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_entities_arrive_in_closing_tag_order() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><node id="1" version="1"/><node id="2" version="1"/><way id="3" version="2"/><relation id="4" version="1"/></osm>"#,
            EntityMask::ALL,
        );
        let summary: Vec<_> = collect(&buffers)
            .iter()
            .map(|e| (e.kind(), e.id(), e.version()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (ItemKind::Node, 1, 1),
                (ItemKind::Node, 2, 1),
                (ItemKind::Way, 3, 2),
                (ItemKind::Relation, 4, 1),
            ]
        );
    }

    #[test]
    fn test_tag_value_unescaping() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><node id="1"><tag k="name" v="Caf&#233; &amp; Bar"/></node></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        assert_eq!(
            entities[0].tags().collect::<Vec<_>>(),
            vec![("name", "Café & Bar")]
        );
    }

    #[test]
    fn test_user_attribute() {
        let (_, buffers) = parse_entities(
            r#"<osm version="0.6"><node id="1" user="alice" uid="7" changeset="12" timestamp="2020-01-01T00:00:00Z"/></osm>"#,
            EntityMask::ALL,
        );
        let entities = collect(&buffers);
        assert_eq!(entities[0].user(), "alice");
        assert_eq!(entities[0].uid(), 7);
        assert_eq!(entities[0].changeset(), 12);
        assert_eq!(entities[0].timestamp(), 1_577_836_800);
    }

    #[test]
    fn test_malformed_xml_reports_position() {
        let (header, buffers) = parse(
            "<osm version=\"0.6\">\n<node id=\"1\"></osm>",
            EntityMask::ALL,
        );
        assert!(matches!(header, Err(Error::XmlSyntax { line: 2, .. })));
        assert_eq!(buffers.len(), 1);
        assert!(buffers[0].is_err());
    }

    // The remaining tests drive the ingest machine directly with a small
    // buffer to exercise the overflow path deterministically.

    fn run_with_capacity(
        xml: &str,
        capacity: usize,
    ) -> (Result<(), Error>, Vec<Result<Buffer, Error>>) {
        let (in_tx, in_rx) = sync_channel(64);
        for chunk in xml.as_bytes().chunks(16) {
            in_tx.send(chunk.to_vec()).unwrap();
        }
        in_tx.send(Vec::new()).unwrap();

        let (out_tx, out_rx) = sync_channel(64);
        let (header_tx, _header_rx) = header_channel();
        let mut reader = Reader::from_reader(ChunkStream::new(in_rx));
        reader.expand_empty_elements(true);
        let mut ingest = XmlIngest::new(EntityMask::ALL, header_tx, out_tx, capacity);
        let result = run_parser(&mut reader, &mut ingest);
        if let Err(ref error) = result {
            ingest.abort(error.clone());
        }
        drop(ingest);
        (result, out_rx.iter().collect())
    }

    #[test]
    fn test_overflow_flushes_and_relocates_open_entity() {
        // two nodes of 80 bytes each in a 152 byte buffer: the second one
        // overflows mid-entity, the first is flushed, the partial record
        // relocated and completed in the fresh buffer
        let xml = r#"<osm version="0.6"><node id="1"><tag k="a" v="b"/></node><node id="2"><tag k="c" v="d"/></node></osm>"#;
        let (result, buffers) = run_with_capacity(xml, 152);
        result.unwrap();

        let buffers: Vec<Buffer> = buffers.into_iter().map(|b| b.unwrap()).collect();
        assert_eq!(buffers.len(), 2);
        let all: Vec<_> = buffers.iter().flat_map(|b| b.entities()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id(), 1);
        assert_eq!(all[1].id(), 2);
        assert_eq!(all[1].tags().collect::<Vec<_>>(), vec![("c", "d")]);
        // no buffer ever holds a partial entity
        for buffer in &buffers {
            let total: usize = buffer.entities().map(|e| e.byte_len()).sum();
            assert_eq!(total, buffer.committed());
        }
    }

    #[test]
    fn test_entity_larger_than_buffer_is_fatal() {
        let xml = r#"<osm version="0.6"><node id="1"><tag k="a" v="b"/></node></osm>"#;
        let (result, buffers) = run_with_capacity(xml, 64);
        assert_eq!(result.unwrap_err(), Error::BufferOverflow);
        assert_eq!(buffers.len(), 1);
        assert!(matches!(buffers[0], Err(Error::BufferOverflow)));
    }

    #[test]
    fn test_dropped_consumer_stops_parser() {
        let (in_tx, in_rx) = sync_channel(64);
        let xml = r#"<osm version="0.6"><node id="1"/><node id="2"/></osm>"#;
        for chunk in xml.as_bytes().chunks(16) {
            in_tx.send(chunk.to_vec()).unwrap();
        }
        in_tx.send(Vec::new()).unwrap();

        let (out_tx, out_rx) = sync_channel(1);
        drop(out_rx);
        let (header_tx, _header_rx) = header_channel();
        let mut reader = Reader::from_reader(ChunkStream::new(in_rx));
        reader.expand_empty_elements(true);
        // a capacity small enough that the first node already flushes
        let mut ingest = XmlIngest::new(EntityMask::ALL, header_tx, out_tx, 64);
        run_parser(&mut reader, &mut ingest).unwrap();
        assert!(ingest.consumer_gone());
    }
}
