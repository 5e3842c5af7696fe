use std::fmt;

/// A location in JAF source, or in a JAM listing, used to annotate every fatal error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub file: Option<crate::Str>,
    pub line: u32,
}

impl Span {
    pub fn new(file: impl Into<crate::Str>, line: u32) -> Self {
        Span {
            file: Some(file.into()),
            line,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{file}:{}", self.line),
            None => write!(f, "?:{}", self.line),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// The error taxonomy of the core (spec §7). Every variant is fatal: there are no
/// recoverable errors inside the compiler/codec, only warnings (see [`crate::Warning`]).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed container, truncated section, unknown opcode, invalid UTF-8 source, ...
    #[error("{0}")]
    InvalidInput(String),

    /// A section tag could not be recognised while decoding the container.
    #[error("unknown section '{tag}' at offset {offset}")]
    UnknownSection { tag: String, offset: u64 },

    /// A name did not resolve against the symbol tables: label, function, local,
    /// global, struct, member, library, library function, filename or delegate.
    #[error("{at}: unresolved {kind} '{name}'")]
    Unresolved {
        at: Span,
        kind: &'static str,
        name: String,
    },

    /// Assignment/call argument type mismatch, bad cast, non-lvalue used as lvalue.
    #[error("{at}: type error: {message}")]
    TypeError { at: Span, message: String },

    /// Too few/too many arguments to a function, HLL call or builtin.
    #[error("{at}: {message}")]
    ArityError { at: Span, message: String },

    /// A feature is not implemented on the requested file version.
    #[error("{at}: {feature} is not supported on file version {version}")]
    Unsupported {
        at: Span,
        feature: String,
        version: String,
    },

    /// The bytecode format version is outside the range this codec understands.
    #[error("unsupported file version {major}.{minor} (expected 1 <= major <= 14)")]
    UnsupportedVersion { major: u8, minor: u8 },

    /// An assertion internal to the compiler failed; this is always a bug in the core.
    #[error("internal error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn unresolved(at: Span, kind: &'static str, name: impl Into<String>) -> Self {
        Error::Unresolved {
            at,
            kind,
            name: name.into(),
        }
    }

    pub fn type_error(at: Span, message: impl Into<String>) -> Self {
        Error::TypeError {
            at,
            message: message.into(),
        }
    }

    pub fn arity(at: Span, message: impl Into<String>) -> Self {
        Error::ArityError {
            at,
            message: message.into(),
        }
    }

    pub fn unsupported(at: Span, feature: impl Into<String>, version: (u8, u8)) -> Self {
        Error::Unsupported {
            at,
            feature: feature.into(),
            version: format!("{}.{}", version.0, version.1),
        }
    }

    /// Render the way the core's failure model prescribes: `file:line: error: ...`
    /// optionally followed by a source excerpt.
    pub fn render(&self, excerpt: Option<&str>) -> String {
        let mut out = format!("error: {self}\n");
        if let Some(excerpt) = excerpt {
            out.push_str("\tin: ");
            out.push_str(excerpt);
            out.push('\n');
        }
        out
    }
}

/// A non-fatal diagnostic (spec §4.8): unallocated string index, missing main,
/// overriding `main`, and similar. Warnings never abort a pass.
#[derive(Debug, Clone)]
pub struct Warning {
    pub at: Option<Span>,
    pub message: String,
}

impl Warning {
    pub fn new(message: impl Into<String>) -> Self {
        Warning {
            at: None,
            message: message.into(),
        }
    }

    pub fn at(at: Span, message: impl Into<String>) -> Self {
        Warning {
            at: Some(at),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.at {
            Some(at) => write!(f, "warning: {at}: {}", self.message),
            None => write!(f, "warning: {}", self.message),
        }
    }
}
