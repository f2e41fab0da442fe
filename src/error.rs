use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use rand_distr::uniform::Error as UniformError;

/// The result type used in the entire labeler crate.
pub type Result<T> = std::result::Result<T, LabelerErr>;

/// The labeler's error type.
///
/// Every variant but `EmptySequence` and `LabelOutOfRange` is raised while building a model,
/// a parameter store or a graph; evaluating a validly initialized graph never produces them.
#[derive(Debug)]
pub enum LabelerErr {
    InvalidConfig {
        what: &'static str,
        reason: &'static str,
    },
    EmptyVocabulary {
        what: &'static str,
    },
    NoLabels,
    WidthMismatch {
        stage: String,
        got: usize,
        expected: usize,
    },
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    EmptySequence {
        channel: &'static str,
    },
    LabelOutOfRange {
        label: usize,
        labels: usize,
    },
    UnknownTensor(String),
    Rand(String),
    Format(String),
    Io(io::Error),
}

impl Display for LabelerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelerErr::InvalidConfig { what, reason } => {
                write!(f, "invalid configuration for {what}: {reason}")
            }
            LabelerErr::EmptyVocabulary { what } => {
                write!(f, "the {what} vocabulary is empty")
            }
            LabelerErr::NoLabels => f.write_str("the label set is empty"),
            LabelerErr::WidthMismatch {
                stage,
                got,
                expected,
            } => write!(
                f,
                "width mismatch at stage {stage}: got {got}, expected {expected}"
            ),
            LabelerErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch for {what}, got {got} and expected {expected}"
            ),
            LabelerErr::EmptySequence { channel } => {
                write!(f, "the example has no {channel} to evaluate")
            }
            LabelerErr::LabelOutOfRange { label, labels } => {
                write!(f, "label {label} is out of range for {labels} labels")
            }
            LabelerErr::UnknownTensor(name) => write!(f, "unknown tensor '{name}'"),
            LabelerErr::Rand(msg) => write!(f, "invalid initializer: {msg}"),
            LabelerErr::Format(msg) => write!(f, "malformed input: {msg}"),
            LabelerErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for LabelerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LabelerErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LabelerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<UniformError> for LabelerErr {
    fn from(value: UniformError) -> Self {
        Self::Rand(value.to_string())
    }
}
