use std::{fmt, io};

use crate::field::FieldType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Underlying stream I/O failure that isn't a premature end-of-stream.
    Io(io::Error),
    /// The stream ended partway through a unit. The step names what was being
    /// read at the time.
    Truncated { step: &'static str },
    /// The stream header failed to parse: wrong spec version, or a bit width
    /// outside the allowed 1-32 range.
    BadHeader(String),
    /// The graph handed to the encoder cannot be represented on the wire,
    /// e.g. a node type with more than 255 fields or an oversized string.
    BadEncode(String),
    /// A wire index fell outside the populated range of a symbol dictionary.
    DictCorrupt {
        table: &'static str,
        index: u32,
        len: usize,
    },
    /// A USE referenced a shared-name index with no completed define.
    DanglingUse(u32),
    /// No codec strategy is bound for a declared field type. There is no safe
    /// skip length, so the decode cannot continue.
    UnsupportedFieldType(FieldType),
    /// The node-type registry could not instantiate a dictionary type name.
    UnknownNodeType(String),
    /// A dictionary field name is not declared on its node type.
    UnknownField { node_type: String, field: String },
    /// An opcode or unit that is not valid at the current parser state.
    MalformedStream(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref err) => write!(f, "Stream I/O failure: {}", err),
            Error::Truncated { step } => {
                write!(f, "Stream ended early while reading [{}]", step)
            }
            Error::BadHeader(ref err) => write!(f, "Bad stream header: {}", err),
            Error::BadEncode(ref err) => write!(f, "Graph not encodable: {}", err),
            Error::DictCorrupt { table, index, len } => write!(
                f,
                "Index {} outside the {} ({} entries)",
                index, table, len
            ),
            Error::DanglingUse(index) => write!(
                f,
                "USE of shared-name index {} with no prior define",
                index
            ),
            Error::UnsupportedFieldType(ty) => {
                write!(f, "No codec strategy bound for field type {}", ty)
            }
            Error::UnknownNodeType(ref name) => {
                write!(f, "Node-type registry cannot instantiate \"{}\"", name)
            }
            Error::UnknownField {
                ref node_type,
                ref field,
            } => write!(
                f,
                "Field \"{}\" is not declared on node type \"{}\"",
                field, node_type
            ),
            Error::MalformedStream(ref err) => write!(f, "Malformed stream: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::Io(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// Maps an I/O error from a sized read to the codec taxonomy: an
    /// unexpected EOF is a truncated stream, anything else is passed through.
    pub(crate) fn at_step(e: io::Error, step: &'static str) -> Error {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated { step }
        } else {
            Error::Io(e)
        }
    }
}
