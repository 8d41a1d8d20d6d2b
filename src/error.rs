//! Error type shared by the engine, the strategies and the instance loaders.

use std::fmt;

/// Errors raised while configuring or running a search.
#[derive(Debug)]
pub enum SearchError {
    /// A configuration value is out of its valid range.
    InvalidConfig(String),
    /// A rejection-sampling loop ran out of attempts before producing a
    /// feasible candidate.
    InfeasibleConstruction {
        /// What was being built (crossover offspring, harmony, ...)
        what: &'static str,
        /// Number of attempts made
        attempts: usize,
    },
    /// No feasible solution exists in the explored space.
    NoFeasibleSolution,
    /// The worker pool of a parallel strategy could not be created.
    ThreadPool(String),
    /// Reading an instance or writing results failed.
    Io(std::io::Error),
    /// An instance file is malformed.
    Parse(String),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            SearchError::InfeasibleConstruction { what, attempts } => write!(
                f,
                "No feasible {} found after {} attempts",
                what, attempts
            ),
            SearchError::NoFeasibleSolution => write!(f, "No feasible solution exists"),
            SearchError::ThreadPool(msg) => write!(f, "Cannot build worker pool: {}", msg),
            SearchError::Io(e) => write!(f, "I/O error: {}", e),
            SearchError::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SearchError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SearchError {
    fn from(e: std::io::Error) -> Self {
        SearchError::Io(e)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(e: serde_json::Error) -> Self {
        SearchError::Parse(e.to_string())
    }
}

impl From<csv::Error> for SearchError {
    fn from(e: csv::Error) -> Self {
        SearchError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_infeasible_construction() {
        let err = SearchError::InfeasibleConstruction { what: "harmony", attempts: 10 };
        assert_eq!(err.to_string(), "No feasible harmony found after 10 attempts");
    }

    #[test]
    fn test_io_source() {
        use std::error::Error;
        let err: SearchError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(err.source().is_some());
    }
}
