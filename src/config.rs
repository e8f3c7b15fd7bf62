use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for an [`Interceptor`](crate::ir::interceptor::Interceptor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptorConfig {
    /// Maximum nesting depth a traversal may reach. `None` means unbounded.
    pub max_depth: Option<usize>,
    /// Log every node an observer replaced, at debug level.
    pub trace_rewrites: bool,
}

impl InterceptorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InterceptError;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = InterceptorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, InterceptorConfig::default());
        assert_eq!(config.max_depth, None);
        assert!(!config.trace_rewrites);
    }

    #[test]
    fn test_parse_fields() {
        let config = InterceptorConfig::from_json_str(r#"{"max_depth": 64, "trace_rewrites": true}"#).unwrap();
        assert_eq!(config.max_depth, Some(64));
        assert!(config.trace_rewrites);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = InterceptorConfig::from_json_str(r#"{"depth": 3}"#).unwrap_err();
        assert!(matches!(err, InterceptError::Config(_)));
    }
}
