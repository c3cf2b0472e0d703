use thiserror::Error;

/// Error type transform hooks may raise; forwarded unchanged as [`Error::Hook`].
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("integer {0} is outside the safe interchange range")]
    UnsafeInteger(i128),

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(&'static str),

    #[error("input ended in the middle of an item")]
    PrematureEnd,

    #[error("undefined value disallowed by options")]
    UndefinedDisallowed,

    #[error("transform hook failed: {0}")]
    Hook(#[source] HookError),

    #[error("stream is closed")]
    StreamClosed,

    #[error("maximum recursion depth reached")]
    MaxRecursion,
}
