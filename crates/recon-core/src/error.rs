use std::sync::Arc;

use thiserror::Error;

use crate::value::Value;

/// Error type returned by toolkit callbacks (constructors, setters, coercions,
/// release hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown type: {tag}")]
    UnknownType { tag: String },

    #[error("{type_name}: missing constructor argument `{field}`")]
    MissingConstructorArg { type_name: Arc<str>, field: Arc<str> },

    #[error("{type_name}.{prop}: cannot coerce value: {source}")]
    Coercion {
        type_name: Arc<str>,
        prop: Arc<str>,
        #[source]
        source: BoxError,
    },

    #[error("{type_name}.{prop}: setter failed: {source}")]
    PropertyApplication {
        type_name: Arc<str>,
        prop: Arc<str>,
        #[source]
        source: BoxError,
    },

    #[error("{type_name}: constructor failed: {source}")]
    Construction {
        type_name: Arc<str>,
        #[source]
        source: BoxError,
    },

    #[error("invalid description: expected {expected}, found {found}")]
    InvalidDescription { expected: &'static str, found: String },

    #[error("context function `{tag}` rendered without a context")]
    MissingContext { tag: String },

    #[error(transparent)]
    Other(BoxError),
}

impl Error {
    #[must_use]
    pub fn unknown_type(tag: impl ToString) -> Self {
        Self::UnknownType {
            tag: tag.to_string(),
        }
    }

    #[must_use]
    pub fn invalid(expected: &'static str, found: &Value) -> Self {
        Self::InvalidDescription {
            expected,
            found: format!("{found:?}"),
        }
    }

    /// Wrap an arbitrary failure, typically raised from a subscription or a
    /// function component.
    #[must_use]
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Whether this error came from a toolkit callback rather than from the
    /// shape of a description.
    #[must_use]
    pub fn is_toolkit_failure(&self) -> bool {
        matches!(
            self,
            Self::Coercion { .. } | Self::PropertyApplication { .. } | Self::Construction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_part() {
        let err = Error::unknown_type("slider");
        assert_eq!(err.to_string(), "unknown type: slider");

        let err = Error::MissingConstructorArg {
            type_name: "stage".into(),
            field: "style".into(),
        };
        assert_eq!(
            err.to_string(),
            "stage: missing constructor argument `style`"
        );

        let err = Error::PropertyApplication {
            type_name: "label".into(),
            prop: "text".into(),
            source: "widget disposed".into(),
        };
        assert_eq!(err.to_string(), "label.text: setter failed: widget disposed");
        assert!(err.is_toolkit_failure());
    }

    #[test]
    fn invalid_renders_found_value() {
        let err = Error::invalid("a description", &Value::from(3));
        assert_eq!(
            err.to_string(),
            "invalid description: expected a description, found 3"
        );
        assert!(!err.is_toolkit_failure());
    }

    #[test]
    fn other_is_transparent() {
        let err = Error::other("tasks must be a vector");
        assert_eq!(err.to_string(), "tasks must be a vector");
    }
}
