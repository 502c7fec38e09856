use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns the broad category of the error.
    ///
    /// User errors are raised when a caller-supplied value violates the domain
    /// of a function (for example, a null map key). Everything else indicates
    /// misuse of the block API or a broken invariant inside the engine.
    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::InvalidFunctionArgument { .. } => ErrorCategory::User,
            _ => ErrorCategory::Internal,
        }
    }

    pub fn position_out_of_bounds(index: usize, bound: usize) -> Error {
        ErrorKind::PositionOutOfBounds { index, bound }.into()
    }

    pub fn invalid_range(what: impl Into<String>, offset: usize, length: usize, bound: usize) -> Error {
        ErrorKind::InvalidRange {
            what: what.into(),
            offset,
            length,
            bound,
        }
        .into()
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        ErrorKind::InvalidOperation { name: name.into() }.into()
    }

    pub fn unsupported(operation: impl Into<String>, kind: impl Into<String>) -> Error {
        ErrorKind::Unsupported {
            operation: operation.into(),
            kind: kind.into(),
        }
        .into()
    }

    pub fn invalid_function_argument(message: impl Into<String>) -> Error {
        ErrorKind::InvalidFunctionArgument {
            message: message.into(),
        }
        .into()
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        ErrorKind::InvalidFormat {
            element: element.into(),
            message: message.into(),
        }
        .into()
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        ErrorKind::Io {
            context: context.into(),
            source,
        }
        .into()
    }
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller supplied a value outside the domain of the operation.
    User,
    /// API misuse or a violated engine invariant.
    Internal,
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("position {index} is not in [0, {bound})")]
    PositionOutOfBounds { index: usize, bound: usize },

    #[error("invalid {what} range: offset {offset}, length {length}, bound {bound}")]
    InvalidRange {
        what: String,
        offset: usize,
        length: usize,
        bound: usize,
    },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("operation {operation} is not supported by {kind}")]
    Unsupported { operation: String, kind: String },

    #[error("invalid function argument: {message}")]
    InvalidFunctionArgument { message: String },

    #[error("invalid encoding for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}
