use core::fmt;

use super::LifecycleState;

/// Validation errors raised at kernel construction or adapter binding time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required input or configuration field is empty.
    EmptyInput {
        /// Name of the argument that is empty.
        arg: &'static str,
    },
    /// The number of samples in the analysis segment was zero.
    InvalidSampleCount {
        /// Received sample count.
        got: usize,
    },
    /// The number of chi-squared bins was zero or not smaller than the
    /// number of samples it must partition.
    InvalidBinCount {
        /// Requested number of bins.
        num_bins: usize,
        /// Upper bound (exclusive) the bin count had to respect.
        limit: usize,
    },
    /// A configuration argument value is invalid.
    InvalidArgument {
        /// Name of the argument.
        arg: &'static str,
        /// Human readable reason.
        reason: &'static str,
    },
    /// A contiguous 1D slice view could not be obtained.
    NonContiguous {
        /// Name of the argument that is non-contiguous.
        arg: &'static str,
    },
    /// Output/input lengths did not match required shape.
    LengthMismatch {
        /// Name of the argument.
        arg: &'static str,
        /// Required length.
        expected: usize,
        /// Received length.
        got: usize,
    },
    /// Workspace memory could not be reserved.
    AllocationFailure {
        /// Name of the buffer being allocated.
        arg: &'static str,
        /// Number of elements requested.
        elements: usize,
    },
    /// A template-family tag did not name any supported family.
    UnknownTemplateFamily {
        /// The unrecognised tag.
        name: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyInput { arg } => write!(f, "Input `{arg}` was empty."),
            ConfigError::InvalidSampleCount { got } => {
                write!(f, "Number of points is zero or negative (got {got}).")
            }
            ConfigError::InvalidBinCount { num_bins, limit } => {
                write!(
                    f,
                    "Number of chisq bins must be in 1..{limit}, got {num_bins}."
                )
            }
            ConfigError::InvalidArgument { arg, reason } => {
                write!(f, "Invalid argument `{arg}`: {reason}")
            }
            ConfigError::NonContiguous { arg } => {
                write!(f, "Argument `{arg}` is not contiguous in memory.")
            }
            ConfigError::LengthMismatch { arg, expected, got } => {
                write!(
                    f,
                    "Length mismatch on `{arg}`. Expected {expected}, got {got}."
                )
            }
            ConfigError::AllocationFailure { arg, elements } => {
                write!(
                    f,
                    "Memory allocation error reserving {elements} elements for `{arg}`."
                )
            }
            ConfigError::UnknownTemplateFamily { name } => {
                write!(f, "Unknown waveform approximant `{name}`.")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime execution invariant violations for checked kernel entrypoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecInvariantViolation {
    /// A required input was absent or empty.
    NullInput {
        /// Name of the argument.
        arg: &'static str,
    },
    /// An output that must be freshly produced by the callee already held data.
    UnexpectedNonNull {
        /// Name of the argument.
        arg: &'static str,
    },
    /// The kernel was not in a state that allows this call.
    InvalidState {
        /// Lifecycle state observed at the time of the call.
        state: LifecycleState,
        /// Human readable reason.
        reason: &'static str,
    },
    /// The call does not match the template family the workspace was built for.
    WrongTemplateFamily {
        /// Family the workspace was initialised with.
        expected: &'static str,
        /// Family required by the call.
        got: &'static str,
    },
    /// Output length mismatched the expected runtime shape.
    LengthMismatch {
        /// Name of the argument.
        arg: &'static str,
        /// Required length.
        expected: usize,
        /// Received length.
        got: usize,
    },
    /// Adapter binding/configuration failure.
    Config(ConfigError),
}

impl From<ConfigError> for ExecInvariantViolation {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl fmt::Display for ExecInvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecInvariantViolation::NullInput { arg } => {
                write!(f, "Null input: `{arg}` is required.")
            }
            ExecInvariantViolation::UnexpectedNonNull { arg } => {
                write!(f, "Non-null output: `{arg}` must be empty on entry.")
            }
            ExecInvariantViolation::InvalidState { state, reason } => {
                write!(f, "Execution invariant violation in state {state}: {reason}")
            }
            ExecInvariantViolation::WrongTemplateFamily { expected, got } => {
                write!(
                    f,
                    "Incorrect waveform approximant: workspace is {expected}, call needs {got}."
                )
            }
            ExecInvariantViolation::LengthMismatch { arg, expected, got } => {
                write!(
                    f,
                    "Execution length mismatch on `{arg}`. Expected {expected}, got {got}."
                )
            }
            ExecInvariantViolation::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ExecInvariantViolation {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExecInvariantViolation::Config(err) => Some(err),
            _ => None,
        }
    }
}
