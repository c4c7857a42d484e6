//! # Exit Codes
//!
//! Standard exit codes for the recipe-rag CLI, so scripts can tell a bad
//! configuration from an unreachable store or a failed answer.

use recipe_rag::{RagError, ServiceError};

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// General error (unspecified)
pub const EXIT_ERROR: i32 = 1;

/// Configuration error (missing or invalid config)
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Every retrieval source failed
pub const EXIT_RETRIEVAL_FAILED: i32 = 3;

/// The language model failed before or while streaming the answer
pub const EXIT_GENERATION_FAILED: i32 = 4;

/// A backing service (graph, vector index, embedding) is unreachable
pub const EXIT_SERVICE_UNAVAILABLE: i32 = 5;

/// Invalid input (bad arguments)
pub const EXIT_INVALID_INPUT: i32 = 6;

/// Map a library error to the exit code reported for it.
pub fn for_error(err: &RagError) -> i32 {
    match err {
        RagError::Config(_) => EXIT_CONFIG_ERROR,
        RagError::Retrieval(_) => EXIT_RETRIEVAL_FAILED,
        RagError::Generation(_) => EXIT_GENERATION_FAILED,
        RagError::Service(ServiceError::Config { .. }) => EXIT_CONFIG_ERROR,
        RagError::Service(e) if e.is_transient() => EXIT_SERVICE_UNAVAILABLE,
        RagError::Embedding(_) | RagError::Store(_) | RagError::LanceDb(_) => {
            EXIT_SERVICE_UNAVAILABLE
        }
        _ => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipe_rag::{RetrievalFault, Strategy};

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_CONFIG_ERROR,
            EXIT_RETRIEVAL_FAILED,
            EXIT_GENERATION_FAILED,
            EXIT_SERVICE_UNAVAILABLE,
            EXIT_INVALID_INPUT,
        ];

        for (i, &code1) in codes.iter().enumerate() {
            for (j, &code2) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(code1, code2, "Exit codes {} and {} are not unique", i, j);
                }
            }
        }
    }

    #[test]
    fn test_error_mapping() {
        let fault = RetrievalFault {
            strategy: Strategy::Hybrid,
            failures: vec![],
        };
        assert_eq!(for_error(&RagError::Retrieval(fault)), EXIT_RETRIEVAL_FAILED);
        assert_eq!(
            for_error(&RagError::Config("bad".to_string())),
            EXIT_CONFIG_ERROR
        );
        assert_eq!(
            for_error(&RagError::Service(ServiceError::unavailable("graph", "down"))),
            EXIT_SERVICE_UNAVAILABLE
        );
        assert_eq!(
            for_error(&RagError::Service(ServiceError::rejected("graph", "bad cypher"))),
            EXIT_ERROR
        );
    }
}
