use std::io;

/// Result type used throughout the engine
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error taxonomy
///
/// Every failure the engine can produce falls in one of these buckets, and
/// the bucket decides the blast radius: a `Parse` aborts the query before
/// evaluation starts, a `Bounds`/`IndexSemantic` aborts the selector chain
/// being evaluated, a `Conflict` aborts the update for one file with no
/// partial write, and an `Encoding` aborts before any byte reaches the sink.
#[derive(Debug)]
pub enum Error {
    /// Malformed query text; byte position into the query where known
    Parse {
        message: String,
        position: Option<usize>,
    },
    /// Sub-selection or ordinal index outside the valid range
    Bounds(String),
    /// A path pattern matched zero files, or a variable is unbound
    NotFound(String),
    /// Two opcodes overlap; names both offending opcodes
    Conflict { first: String, second: String },
    /// Output sink encoding disagrees with the source context encoding,
    /// or content cannot be decoded/encoded in the context encoding
    Encoding(String),
    /// An ordinal directive that is invalid regardless of the candidate
    /// sequence (index 0, step 0)
    IndexSemantic(String),
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse { message, position } => match position {
                Some(pos) => write!(f, "parse error at byte {pos}: {message}"),
                None => write!(f, "parse error: {message}"),
            },
            Error::Bounds(msg) => write!(f, "out of bounds: {msg}"),
            Error::NotFound(what) => write!(f, "not found: {what}"),
            Error::Conflict { first, second } => {
                write!(f, "conflicting/overlapping operations: {first} and {second}")
            }
            Error::Encoding(msg) => write!(f, "encoding error: {msg}"),
            Error::IndexSemantic(msg) => write!(f, "invalid index: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
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
    pub(crate) fn parse(message: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            message: message.into(),
            position: Some(position),
        }
    }
}
