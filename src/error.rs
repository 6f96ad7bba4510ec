use crate::name_class::NameClass;

/// An error found while a schema is read or prepared for validation.
///
/// Schema errors are fatal: no grammar is produced.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported schema format version: {0}")]
    UnsupportedVersion(String),
    #[error("malformed node at {path}: {reason}")]
    MalformedNode { path: String, reason: String },
    #[error("unknown type code: {0}")]
    UnknownTypeCode(String),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("can't get library with URI: {0}")]
    UnknownLibrary(String),
    #[error("unknown type '{name}' in the library '{library}'")]
    UnknownType { library: String, name: String },
    #[error("invalid parameters for the type '{name}': {}", join(.errors))]
    InvalidParams { name: String, errors: Vec<ParamError> },
    #[error("invalid value '{value}' for the type '{name}': {}", join(.errors))]
    InvalidValue {
        name: String,
        value: String,
        errors: Vec<ValueError>,
    },
    #[error("URI clash: {0}")]
    UriClash(String),
}

fn join<T: std::fmt::Display>(errors: &[T]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every `ref` whose `define` could not be found.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot resolve the following references: {}", .names.join(", "))]
pub struct ReferenceError {
    pub names: Vec<String>,
}

/// A datatype parameter that is unknown, repeated or has an unacceptable value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ParamError(pub String);

/// A reason why a datatype rejects a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameResolverError {
    #[error("the prefix 'xmlns' cannot be declared")]
    DefineXmlns,
    #[error("the prefix '{prefix}' cannot be bound to '{uri}'")]
    RebindXml { prefix: String, uri: String },
    #[error("trying to leave the default context")]
    LeaveDefaultContext,
}

/// An error found in a document.
///
/// Validation errors are recoverable: the walker keeps accepting events after reporting
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValidationError {
    Plain(String),
    AttributeName { msg: String, name: NameClass },
    AttributeValue { msg: String, name: NameClass },
    ElementName { msg: String, name: NameClass },
    /// The document must contain one of `names_a` or one of `names_b`.
    Choice {
        names_a: Vec<NameClass>,
        names_b: Vec<NameClass>,
    },
}

impl ValidationError {
    pub fn plain(msg: impl Into<String>) -> Self {
        Self::Plain(msg.into())
    }

    pub fn attribute_name(msg: impl Into<String>, name: NameClass) -> Self {
        Self::AttributeName {
            msg: msg.into(),
            name,
        }
    }

    pub fn attribute_value(msg: impl Into<String>, name: NameClass) -> Self {
        Self::AttributeValue {
            msg: msg.into(),
            name,
        }
    }

    pub fn element_name(msg: impl Into<String>, name: NameClass) -> Self {
        Self::ElementName {
            msg: msg.into(),
            name,
        }
    }

    /// The message without any name.
    pub fn message(&self) -> &str {
        match self {
            Self::Plain(msg)
            | Self::AttributeName { msg, .. }
            | Self::AttributeValue { msg, .. }
            | Self::ElementName { msg, .. } => msg,
            Self::Choice { .. } => "",
        }
    }

    /// The names carried by this error, in the order [`ValidationError::to_string_with_names`]
    /// expects them.
    pub fn names(&self) -> Vec<&NameClass> {
        match self {
            Self::Plain(_) => vec![],
            Self::AttributeName { name, .. }
            | Self::AttributeValue { name, .. }
            | Self::ElementName { name, .. } => vec![name],
            Self::Choice { names_a, names_b } => names_a.iter().chain(names_b).collect(),
        }
    }

    /// Render this error with `names` substituted for the names it carries.
    ///
    /// This allows callers to show names the way the document spells them (e.g. with the
    /// prefixes in effect) instead of as expanded names.
    ///
    /// # Panics
    /// - `names` is shorter than [`ValidationError::names`].
    pub fn to_string_with_names<S: AsRef<str>>(&self, names: &[S]) -> String {
        match self {
            Self::Plain(msg) => msg.clone(),
            Self::AttributeName { msg, .. }
            | Self::AttributeValue { msg, .. }
            | Self::ElementName { msg, .. } => format!("{msg}: {}", names[0].as_ref()),
            Self::Choice { names_a, .. } => {
                let (first, second) = names.split_at(names_a.len());
                format!(
                    "must choose either {} or {}",
                    first.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", "),
                    second.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
                )
            }
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = self
            .names()
            .into_iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        write!(f, "{}", self.to_string_with_names(&names))
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_names_test() {
        let err = ValidationError::element_name("tag not allowed here", NameClass::name("", "b"));
        assert_eq!(err.to_string_with_names(&["b"]), "tag not allowed here: b");
        assert_eq!(err.names().len(), 1);
        assert_eq!(err.message(), "tag not allowed here");

        let err = ValidationError::Choice {
            names_a: vec![NameClass::name("", "a"), NameClass::name("", "b")],
            names_b: vec![NameClass::name("", "c")],
        };
        assert_eq!(
            err.to_string_with_names(&["a", "b", "c"]),
            "must choose either a, b or c"
        );

        let err = ValidationError::plain("text not allowed here");
        assert_eq!(err.to_string(), "text not allowed here");
        assert!(err.names().is_empty());
    }

    #[test]
    fn reference_error_test() {
        let err = ReferenceError {
            names: vec!["a".to_owned(), "b".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot resolve the following references: a, b"
        );
    }
}
