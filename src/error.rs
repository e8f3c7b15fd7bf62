use thiserror::Error;

use crate::ir::expr_node::ExprVariant;

/// Failures surfaced by traversal, pipelines and configuration.
///
/// A failed traversal never returns a partially rewritten tree; the context
/// stack and any scoped hooks are unwound before the error reaches the caller.
#[derive(Debug, Error)]
pub enum InterceptError {
    #[error("observer for {slot} failed: {source}")]
    Observer {
        slot: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("expression tree deeper than the configured limit of {limit}")]
    DepthLimitExceeded { limit: usize },

    #[error("{slot} must remain a {expected} node, observer produced {found}")]
    ChildVariantMismatch {
        slot: &'static str,
        expected: ExprVariant,
        found: ExprVariant,
    },

    #[error("rewrite pipeline has a dependency cycle involving pass '{pass}'")]
    PipelineCycle { pass: String },

    #[error("rewrite pipeline references unknown pass '{pass}'")]
    UnknownPass { pass: String },

    #[error("invalid interceptor configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InterceptError>;
