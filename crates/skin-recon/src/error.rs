//! Error types for reconstruction with rich diagnostics.
//!
//! The pipeline has very few hard failures: almost every degenerate
//! condition (no seed, singular plane fit, too few boundary points) is
//! handled locally by skipping or falling back. What remains is reported
//! through [`SkinError`], which carries:
//! - Machine-readable error codes for programmatic handling
//! - Recovery suggestions for common issues
//! - Terminal display via miette
//!
//! # Error Codes
//!
//! Each error has a unique code in the format `SKIN-XXXX`:
//! - `SKIN-1xxx`: Input errors (empty or inconsistent point data)
//! - `SKIN-2xxx`: Configuration errors (out-of-range parameters)
//! - `SKIN-3xxx`: Execution errors (cancelled runs)
//!
//! # Example
//!
//! ```
//! use skin_recon::{ErrorCode, SkinError};
//!
//! let err = SkinError::empty_input("no points supplied");
//! assert_eq!(err.code(), ErrorCode::EmptyInput);
//! assert_eq!(err.code().as_str(), "SKIN-1001");
//! ```

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type SkinResult<T> = Result<T, SkinError>;

/// Machine-readable error codes.
///
/// Codes follow the pattern `SKIN-XXXX` where:
/// - 1xxx = Input errors
/// - 2xxx = Configuration errors
/// - 3xxx = Execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Input errors (1xxx)
    /// SKIN-1001: Point sequence is empty (or holds no finite sample)
    EmptyInput = 1001,
    /// SKIN-1002: Parallel sequences have different lengths
    MismatchedLengths = 1002,

    // Configuration errors (2xxx)
    /// SKIN-2001: A parameter is outside its valid range
    InvalidParameter = 2001,

    // Execution errors (3xxx)
    /// SKIN-3001: The run was cancelled between stages
    Cancelled = 3001,
}

impl ErrorCode {
    /// Returns the error code as a string in the format `SKIN-XXXX`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyInput => "SKIN-1001",
            ErrorCode::MismatchedLengths => "SKIN-1002",
            ErrorCode::InvalidParameter => "SKIN-2001",
            ErrorCode::Cancelled => "SKIN-3001",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recovery suggestions for reconstruction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Check the data source that produced the points.
    CheckInput { checks: Vec<String> },
    /// Adjust parameters for the operation.
    AdjustParameters { parameters: Vec<(String, String)> },
    /// Run the reconstruction again when the host is ready.
    Rerun,
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecoverySuggestion::CheckInput { checks } => {
                write!(f, "Check the input points for: {}", checks.join(", "))
            }
            RecoverySuggestion::AdjustParameters { parameters } => {
                let params: Vec<String> = parameters
                    .iter()
                    .map(|(k, v)| format!("{} = {}", k, v))
                    .collect();
                write!(f, "Try adjusting: {}", params.join(", "))
            }
            RecoverySuggestion::Rerun => write!(f, "Start the reconstruction again"),
        }
    }
}

/// Where in the pipeline an error originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// A pipeline stage.
    Stage(&'static str),
    /// A configuration field.
    Parameter(String),
}

impl std::fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLocation::Stage(stage) => write!(f, "stage '{}'", stage),
            ErrorLocation::Parameter(name) => write!(f, "parameter '{}'", name),
        }
    }
}

/// Errors that can occur during reconstruction.
#[derive(Debug, Error, Diagnostic)]
pub enum SkinError {
    /// The point sequence was empty.
    #[error("input point sequence is empty: {details}")]
    #[diagnostic(
        code(skin::input::empty),
        help("Reconstruction needs at least one finite (x, y, z) sample.")
    )]
    EmptyInput { details: String },

    /// Two sequences that must be parallel have different lengths.
    #[error("{what}: expected {expected} entries, got {actual}")]
    #[diagnostic(
        code(skin::input::mismatched_lengths),
        help("Raw and smoothed point sequences must come from the same cloud, in the same order.")
    )]
    MismatchedLengths {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A parameter is outside its valid range.
    #[error("invalid parameter `{name}`: {details}")]
    #[diagnostic(
        code(skin::config::invalid_parameter),
        help("Start from ReconstructionParams::default() and change one field at a time.")
    )]
    InvalidParameter { name: String, details: String },

    /// The run was cancelled at a stage boundary.
    #[error("reconstruction cancelled before stage '{stage}'")]
    #[diagnostic(code(skin::run::cancelled))]
    Cancelled { stage: &'static str },
}

impl SkinError {
    /// Returns the machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            SkinError::EmptyInput { .. } => ErrorCode::EmptyInput,
            SkinError::MismatchedLengths { .. } => ErrorCode::MismatchedLengths,
            SkinError::InvalidParameter { .. } => ErrorCode::InvalidParameter,
            SkinError::Cancelled { .. } => ErrorCode::Cancelled,
        }
    }

    /// Returns a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self {
            SkinError::EmptyInput { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["at least one point".into(), "finite coordinates".into()],
            },
            SkinError::MismatchedLengths { .. } => RecoverySuggestion::CheckInput {
                checks: vec!["raw and smoothed sequences share one source".into()],
            },
            SkinError::InvalidParameter { name, .. } => RecoverySuggestion::AdjustParameters {
                parameters: vec![(name.clone(), "use the default value".into())],
            },
            SkinError::Cancelled { .. } => RecoverySuggestion::Rerun,
        }
    }

    /// Returns location information if available.
    pub fn location(&self) -> Option<ErrorLocation> {
        match self {
            SkinError::InvalidParameter { name, .. } => {
                Some(ErrorLocation::Parameter(name.clone()))
            }
            SkinError::Cancelled { stage } => Some(ErrorLocation::Stage(stage)),
            _ => None,
        }
    }

    // Constructor helpers

    /// Create an EmptyInput error.
    pub fn empty_input(details: impl Into<String>) -> Self {
        SkinError::EmptyInput {
            details: details.into(),
        }
    }

    /// Create a MismatchedLengths error.
    pub fn mismatched_lengths(what: &'static str, expected: usize, actual: usize) -> Self {
        SkinError::MismatchedLengths {
            what,
            expected,
            actual,
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid_parameter(name: impl Into<String>, details: impl Into<String>) -> Self {
        SkinError::InvalidParameter {
            name: name.into(),
            details: details.into(),
        }
    }

    /// Create a Cancelled error.
    pub fn cancelled(stage: &'static str) -> Self {
        SkinError::Cancelled { stage }
    }
}
