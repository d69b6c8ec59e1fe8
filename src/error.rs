use std::{error::Error, fmt::{self, Display}};

/// The result type used in the entire parameters crate.
pub type Result<T> = std::result::Result<T, ParamsErr>;

/// The parameters crate's error type.
///
/// Every operation validates its inputs before touching any storage, so when one of these
/// errors is returned no element has been written.
#[derive(Debug)]
pub enum ParamsErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    ShapeMismatch {
        leaf: usize,
        got: usize,
        expected: usize,
    },
    DuplicateIndex {
        index: usize,
    },
    DuplicateName {
        name: String,
        index: usize,
        existing: usize,
    },
    NotFound {
        index: usize,
    },
    NotComposite {
        index: usize,
    },
    NameMismatch {
        index: usize,
        got: String,
        expected: String,
    },
    Detached {
        name: String,
    },
    OwnsStorage {
        name: String,
    },
    NonContiguous {
        name: String,
    },
    TooLarge {
        name: String,
    },
    InvalidLimit {
        limit: f64,
    },
    Codec(serde_json::Error),
}

impl Display for ParamsErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamsErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} elements and expected {expected}"
            ),
            ParamsErr::ShapeMismatch {
                leaf,
                got,
                expected,
            } => write!(
                f,
                "The parameter trees have different shapes, leaf {leaf} has {got} elements and expected {expected}"
            ),
            ParamsErr::DuplicateIndex { index } => {
                write!(f, "There's already a parameter registered at index {index}")
            }
            ParamsErr::DuplicateName {
                name,
                index,
                existing,
            } => write!(
                f,
                "Tried to register {name:?} at index {index} but it's already registered at index {existing}"
            ),
            ParamsErr::NotFound { index } => {
                write!(f, "There are no parameters registered at index {index}")
            }
            ParamsErr::NotComposite { index } => {
                write!(f, "The parameter at index {index} is a leaf, not a composite")
            }
            ParamsErr::NameMismatch {
                index,
                got,
                expected,
            } => write!(
                f,
                "The parameters at index {index} are named {got:?} but {expected:?} was requested"
            ),
            ParamsErr::Detached { name } => {
                write!(f, "The parameter {name:?} has a shape but no storage attached")
            }
            ParamsErr::OwnsStorage { name } => {
                write!(f, "The parameter {name:?} owns its storage, expected a reference")
            }
            ParamsErr::NonContiguous { name } => {
                write!(f, "The array for {name:?} isn't contiguous in standard layout")
            }
            ParamsErr::TooLarge { name } => {
                write!(f, "The parameters {name:?} have too many elements to be stored")
            }
            ParamsErr::InvalidLimit { limit } => {
                write!(f, "Invalid limit {limit} for a uniform fill")
            }
            ParamsErr::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl Error for ParamsErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ParamsErr::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ParamsErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}
