#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AlignError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Unsupported combination: {0}")]
    UnsupportedCombination(String),
    #[error("Insufficient correspondences: {found} found, at least {required} required")]
    InsufficientCorrespondences { found: usize, required: usize },
    #[error("Geometry unsolvable: {0}")]
    GeometryUnsolvable(String),
    #[error("Dimension mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },
    #[error("Degenerate statistics: {0}")]
    DegenerateStatistics(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl AlignError {
    pub fn dimension_mismatch(left: (u32, u32), right: (u32, u32)) -> Self {
        AlignError::DimensionMismatch {
            left_width: left.0,
            left_height: left.1,
            right_width: right.0,
            right_height: right.1,
        }
    }
}

pub type AlignResult<T> = Result<T, AlignError>;

/// Errors from reading or writing configuration files
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] AlignError),
}
