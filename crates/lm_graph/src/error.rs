use alloc::borrow::Cow;
use alloc::boxed::Box;
use alloc::string::String;
use core::error::Error as StdError;

use thiserror::Error;

// -----------------------------------------------------------------------------
// GraphError

/// Errors that abort a serialize or deserialize call.
///
/// Per-member assignment failures are not fatal: they are logged and the
/// member is skipped. They only surface as [`GraphError::FieldAssignment`]
/// through APIs that assign a single value directly.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// The stream is truncated, malformed, or refers to an object id that
    /// was never assigned.
    #[error("corrupt stream: {0}")]
    CorruptStream(Cow<'static, str>),

    /// A type name in the stream is not registered and no mapping hook
    /// supplied a replacement.
    #[error("type `{0}` is not registered")]
    MissingType(String),

    /// No construction strategy produced an instance of the type.
    #[error("no construction strategy produced an instance of `{0}`")]
    MissingConstructor(String),

    #[error(transparent)]
    FieldAssignment(#[from] FieldAssignmentError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The graph holds a value the engine cannot encode.
    #[error("cannot serialize: {0}")]
    Unsupported(Cow<'static, str>),
}

impl GraphError {
    #[inline]
    pub(crate) fn corrupt(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::CorruptStream(msg.into())
    }

    #[inline]
    pub(crate) fn unsupported(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Returns `true` for [`GraphError::CorruptStream`].
    #[inline]
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptStream(_))
    }
}

// -----------------------------------------------------------------------------
// FieldAssignmentError

/// A deserialized value could not be assigned to a member.
#[derive(Debug, Clone, Error)]
#[error("cannot assign `{found}` to member `{member}` of type `{expected}`")]
pub struct FieldAssignmentError {
    pub member: Cow<'static, str>,
    pub expected: Cow<'static, str>,
    pub found: Cow<'static, str>,
}

// -----------------------------------------------------------------------------
// HandlerError

/// A user handler, specialist, or factory failed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: Cow<'static, str>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps another error as the cause.
    pub fn with_source(
        message: impl Into<Cow<'static, str>>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefixes the message with the type that was being handled.
    pub(crate) fn in_type(mut self, type_path: &str) -> Self {
        self.message = Cow::Owned(alloc::format!("`{type_path}`: {}", self.message));
        self
    }
}

impl From<GraphError> for HandlerError {
    fn from(value: GraphError) -> Self {
        Self::with_source("nested graph operation failed", value)
    }
}
