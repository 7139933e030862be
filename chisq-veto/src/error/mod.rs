use core::{error, fmt};

use crate::kernel::{ConfigError, ExecInvariantViolation};

/// Errors raised whilst running chisq-veto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Construction or binding of a kernel failed.
    Config(ConfigError),
    /// A checked execution entrypoint rejected the call.
    Exec(ExecInvariantViolation),
}

/// Convenience alias for results carrying [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of every failure the veto engine reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required input or handle is absent.
    NullInput,
    /// An output that must be freshly allocated was already populated.
    UnexpectedNonNull,
    /// Sample count is zero.
    InvalidSampleCount,
    /// Bin count is zero or not smaller than the sample count.
    InvalidBinCount,
    /// Workspace allocation could not be satisfied.
    AllocationFailure,
    /// A template-family tag names no supported family.
    UnknownTemplateFamily,
    /// The veto variant does not match the workspace's template family.
    WrongTemplateFamily,
    /// The handle is not in a state that allows the call.
    InvalidState,
    /// An input or output has the wrong length.
    LengthMismatch,
    /// Any other rejected argument.
    InvalidArgument,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(err) => config_kind(err),
            Error::Exec(err) => match err {
                ExecInvariantViolation::NullInput { .. } => ErrorKind::NullInput,
                ExecInvariantViolation::UnexpectedNonNull { .. } => ErrorKind::UnexpectedNonNull,
                ExecInvariantViolation::InvalidState { .. } => ErrorKind::InvalidState,
                ExecInvariantViolation::WrongTemplateFamily { .. } => {
                    ErrorKind::WrongTemplateFamily
                }
                ExecInvariantViolation::LengthMismatch { .. } => ErrorKind::LengthMismatch,
                ExecInvariantViolation::Config(err) => config_kind(err),
            },
        }
    }

    /// Whether the enclosing template analysis cannot continue.
    ///
    /// Only a failed workspace allocation is fatal; everything else skips
    /// the offending segment or template.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::AllocationFailure
    }
}

fn config_kind(err: &ConfigError) -> ErrorKind {
    match err {
        ConfigError::EmptyInput { .. } => ErrorKind::NullInput,
        ConfigError::InvalidSampleCount { .. } => ErrorKind::InvalidSampleCount,
        ConfigError::InvalidBinCount { .. } => ErrorKind::InvalidBinCount,
        ConfigError::InvalidArgument { .. } | ConfigError::NonContiguous { .. } => {
            ErrorKind::InvalidArgument
        }
        ConfigError::LengthMismatch { .. } => ErrorKind::LengthMismatch,
        ConfigError::AllocationFailure { .. } => ErrorKind::AllocationFailure,
        ConfigError::UnknownTemplateFamily { .. } => ErrorKind::UnknownTemplateFamily,
    }
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Error::Config(value)
    }
}

impl From<ExecInvariantViolation> for Error {
    fn from(value: ExecInvariantViolation) -> Self {
        Error::Exec(value)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(err) => write!(f, "Invalid configuration: {err}"),
            Error::Exec(err) => write!(f, "Veto call rejected: {err}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Exec(err) => Some(err),
        }
    }
}
