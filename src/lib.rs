//! Streaming reader for OpenStreetMap XML and OsmChange data.
//!
//! The parser runs on its own thread, decoupled from the consumer by
//! bounded channels: raw byte chunks go in, packed entity buffers come
//! out. A buffer holds a batch of whole entities (nodes, ways, relations,
//! changesets) in a cache-friendly 8-byte aligned layout that can be
//! traversed without any auxiliary index, see [`memory::EntityRef`].
//!
//! ```no_run
//! use std::sync::mpsc::sync_channel;
//! use osmxml::{EntityMask, FileFormat, FormatRegistry};
//!
//! # fn main() -> Result<(), osmxml::Error> {
//! let registry = FormatRegistry::with_defaults();
//! let (chunks, input) = sync_channel(8);
//! let mut reader = registry.create(FileFormat::Xml, EntityMask::ALL, input)?;
//! # let _ = chunks;
//! let header = reader.header()?;
//! println!("generator: {:?}", header.get("generator"));
//! for buffer in &mut reader {
//!     for entity in buffer?.entities() {
//!         println!("{:?} {}", entity.kind(), entity.id());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod io;
pub mod memory;
pub mod osm;

pub use crate::error::Error;
pub use crate::io::format::{FileFormat, FormatRegistry, InputHandle};
pub use crate::io::header::Header;
pub use crate::memory::{Buffer, EntityRef};
pub use crate::osm::{BoundingBox, EntityMask, ItemKind, Location};
