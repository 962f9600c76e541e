use crate::io::format::FileFormat;

/// Errors produced while decoding an OSM data stream.
///
/// The whole enum is `Clone` so a single parse failure can resolve the
/// pending header promise and still travel down the entity channel as the
/// terminal record. `Io` therefore stores the OS errno instead of a live
/// `std::io::Error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("XML parsing error at line {line}, column {column}: {detail}")]
    XmlSyntax {
        line: u64,
        column: u64,
        detail: String,
    },

    #[error("can not read file with version {}", .got.as_deref().unwrap_or("<missing>"))]
    FormatVersion { got: Option<String> },

    #[error("unknown top-level element: {name}")]
    UnknownRoot { name: String },

    #[error("unknown type on relation member: {raw:?}")]
    UnknownMemberType { raw: String },

    #[error("missing ref on relation member")]
    MissingRef,

    #[error("entity too large for the entity buffer")]
    BufferOverflow,

    #[error("I/O error (os error {errno})")]
    Io { errno: i32 },

    #[error("unsupported input format: {format}")]
    UnsupportedFormat { format: FileFormat },

    #[error("input format already registered: {format}")]
    AlreadyRegistered { format: FileFormat },

    #[error("header unavailable: parser terminated before reading one")]
    HeaderUnavailable,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io {
            errno: e.raw_os_error().unwrap_or(0),
        }
    }
}
