//! Input format registry and the consumer-side handle.

use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::thread::JoinHandle;

use ahash::AHashMap;

use crate::error::Error;
use crate::io::header::Header;
use crate::io::promise::HeaderReceiver;
use crate::io::xml::spawn_xml_parser;
use crate::memory::Buffer;
use crate::osm::EntityMask;

/// Tag of an input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Xml,
    Pbf,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileFormat::Xml => write!(f, "xml"),
            FileFormat::Pbf => write!(f, "pbf"),
        }
    }
}

/// Consumer side of a running parser: the header promise and the stream of
/// entity buffers. Iterating yields buffers in document order; the last
/// item of a failed stream is the terminal error record.
#[derive(Debug)]
pub struct InputHandle {
    header: Option<HeaderReceiver>,
    cached_header: Option<Result<Header, Error>>,
    buffers: Receiver<Result<Buffer, Error>>,
    worker: Option<JoinHandle<()>>,
}

impl InputHandle {
    pub(crate) fn new(
        header: HeaderReceiver,
        buffers: Receiver<Result<Buffer, Error>>,
        worker: JoinHandle<()>,
    ) -> InputHandle {
        InputHandle {
            header: Some(header),
            cached_header: None,
            buffers,
            worker: Some(worker),
        }
    }

    /// Blocks until the parser has seen the root element (or failed). The
    /// result is cached, later calls return it again.
    pub fn header(&mut self) -> Result<Header, Error> {
        if let Some(receiver) = self.header.take() {
            self.cached_header = Some(receiver.recv());
        }
        self.cached_header
            .clone()
            .unwrap_or(Err(Error::HeaderUnavailable))
    }

    /// Waits for the parser thread to finish. Dropping the handle instead
    /// cancels the stream: the parser notices the closed channel at its
    /// next send and exits on its own.
    pub fn join(self) {
        let InputHandle {
            buffers, worker, ..
        } = self;
        drop(buffers);
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Iterator for InputHandle {
    type Item = Result<Buffer, Error>;

    fn next(&mut self) -> Option<Result<Buffer, Error>> {
        self.buffers.recv().ok()
    }
}

/// Factory constructing a parser for one input stream.
pub type InputFactory = Box<dyn Fn(EntityMask, Receiver<Vec<u8>>) -> InputHandle + Send + Sync>;

/// Maps format tags to parser factories. Tests build their own registries;
/// applications usually want [`FormatRegistry::with_defaults`].
pub struct FormatRegistry {
    table: AHashMap<FileFormat, InputFactory>,
}

impl FormatRegistry {
    pub fn new() -> FormatRegistry {
        FormatRegistry {
            table: AHashMap::new(),
        }
    }

    /// A registry with all formats this crate implements.
    pub fn with_defaults() -> FormatRegistry {
        let mut registry = FormatRegistry::new();
        registry
            .register(FileFormat::Xml, Box::new(spawn_xml_parser))
            .expect("empty registry");
        registry
    }

    /// Registers a factory; the first registration of a tag wins.
    pub fn register(&mut self, format: FileFormat, factory: InputFactory) -> Result<(), Error> {
        match self.table.entry(format) {
            Entry::Occupied(_) => Err(Error::AlreadyRegistered { format }),
            Entry::Vacant(entry) => {
                entry.insert(factory);
                Ok(())
            }
        }
    }

    /// Starts a parser task for `format` reading from `input`.
    pub fn create(
        &self,
        format: FileFormat,
        read_types: EntityMask,
        input: Receiver<Vec<u8>>,
    ) -> Result<InputHandle, Error> {
        let factory = self
            .table
            .get(&format)
            .ok_or(Error::UnsupportedFormat { format })?;
        Ok(factory(read_types, input))
    }
}

impl Default for FormatRegistry {
    fn default() -> FormatRegistry {
        FormatRegistry::new()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.table.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = FormatRegistry::with_defaults();
        let result = registry.register(FileFormat::Xml, Box::new(spawn_xml_parser));
        assert_eq!(
            result.unwrap_err(),
            Error::AlreadyRegistered {
                format: FileFormat::Xml
            }
        );
    }

    #[test]
    fn test_unregistered_format() {
        let registry = FormatRegistry::with_defaults();
        let (_tx, rx) = sync_channel(1);
        let result = registry.create(FileFormat::Pbf, EntityMask::ALL, rx);
        assert_eq!(
            result.unwrap_err(),
            Error::UnsupportedFormat {
                format: FileFormat::Pbf
            }
        );
    }

    #[test]
    fn test_create_xml_parser() {
        let registry = FormatRegistry::with_defaults();
        let (tx, rx) = sync_channel(4);
        let mut handle = registry
            .create(FileFormat::Xml, EntityMask::ALL, rx)
            .unwrap();
        tx.send(br#"<osm version="0.6"><node id="1"/></osm>"#.to_vec())
            .unwrap();
        tx.send(Vec::new()).unwrap();
        assert_eq!(handle.header().unwrap().get("version"), Some("0.6"));
        let buffers: Vec<_> = handle.by_ref().collect();
        assert_eq!(buffers.len(), 1);
        assert_eq!(buffers[0].as_ref().unwrap().entities().count(), 1);
        handle.join();
    }
}
