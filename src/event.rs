//! Events fired at walkers and the events walkers report as possible.

use std::{collections::HashSet, sync::Arc};

use crate::name_class::NameClass;

/// A lexical event of an XML document.
///
/// Names are expanded: the caller resolves qualified names before firing events, for
/// example with [`GrammarWalker::resolve_name`](crate::validate::GrammarWalker::resolve_name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Event {
    EnterStartTag { uri: String, local: String },
    AttributeName { uri: String, local: String },
    AttributeValue(String),
    LeaveStartTag,
    Text(String),
    EndTag { uri: String, local: String },
    EnterContext,
    LeaveContext,
    DefinePrefix { prefix: String, uri: String },
}

impl Event {
    pub fn enter_start_tag(uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self::EnterStartTag {
            uri: uri.into(),
            local: local.into(),
        }
    }

    pub fn attribute_name(uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self::AttributeName {
            uri: uri.into(),
            local: local.into(),
        }
    }

    pub fn attribute_value(value: impl Into<String>) -> Self {
        Self::AttributeValue(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn end_tag(uri: impl Into<String>, local: impl Into<String>) -> Self {
        Self::EndTag {
            uri: uri.into(),
            local: local.into(),
        }
    }

    pub fn define_prefix(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self::DefinePrefix {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }

    pub fn is_attribute_event(&self) -> bool {
        matches!(self, Self::AttributeName { .. } | Self::AttributeValue(_))
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnterStartTag { uri, local } => write!(f, "enterStartTag, {uri}, {local}"),
            Self::AttributeName { uri, local } => write!(f, "attributeName, {uri}, {local}"),
            Self::AttributeValue(value) => write!(f, "attributeValue, {value}"),
            Self::LeaveStartTag => write!(f, "leaveStartTag"),
            Self::Text(value) => write!(f, "text, {value}"),
            Self::EndTag { uri, local } => write!(f, "endTag, {uri}, {local}"),
            Self::EnterContext => write!(f, "enterContext"),
            Self::LeaveContext => write!(f, "leaveContext"),
            Self::DefinePrefix { prefix, uri } => write!(f, "definePrefix, {prefix}, {uri}"),
        }
    }
}

/// What textual content a walker would accept next.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextMatcher {
    /// Any text.
    Any,
    /// Exactly this text, modulo the equality of its datatype.
    Literal(Arc<str>),
    /// Any valid value of the named datatype.
    Datatype(Arc<str>),
}

impl std::fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "*"),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Datatype(name) => write!(f, "<{name}>"),
        }
    }
}

/// An event some walker is ready to accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PossibleEvent {
    EnterStartTag(NameClass),
    AttributeName(NameClass),
    AttributeValue(TextMatcher),
    LeaveStartTag,
    Text(TextMatcher),
    EndTag(NameClass),
}

impl PossibleEvent {
    pub fn is_attribute_event(&self) -> bool {
        matches!(self, Self::AttributeName(_) | Self::AttributeValue(_))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::EnterStartTag(_) => "enterStartTag",
            Self::AttributeName(_) => "attributeName",
            Self::AttributeValue(_) => "attributeValue",
            Self::LeaveStartTag => "leaveStartTag",
            Self::Text(_) => "text",
            Self::EndTag(_) => "endTag",
        }
    }

    fn param(&self) -> Option<String> {
        match self {
            Self::EnterStartTag(name) | Self::AttributeName(name) | Self::EndTag(name) => {
                Some(name.to_string())
            }
            Self::AttributeValue(text) | Self::Text(text) => Some(text.to_string()),
            Self::LeaveStartTag => None,
        }
    }
}

impl std::fmt::Display for PossibleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind())?;
        if let Some(param) = self.param() {
            write!(f, ", {param}")?;
        }
        Ok(())
    }
}

pub type EventSet = HashSet<PossibleEvent>;

/// Render `events` as an indented tree, grouping events by kind.
///
/// The output is sorted, so equal sets always render identically.
///
/// ```text
/// attributeName:
///     {"name":"id","ns":""}
/// leaveStartTag
/// ```
pub fn events_to_tree_string(events: &EventSet) -> String {
    let mut events = events
        .iter()
        .map(|ev| (ev.kind(), ev.param()))
        .collect::<Vec<_>>();
    events.sort();

    let mut ret = String::new();
    let mut current = None;
    for (kind, param) in events {
        match param {
            Some(param) => {
                if current != Some(kind) {
                    ret.push_str(kind);
                    ret.push_str(":\n");
                    current = Some(kind);
                }
                ret.push_str("    ");
                ret.push_str(&param);
                ret.push('\n');
            }
            None => {
                ret.push_str(kind);
                ret.push('\n');
                current = None;
            }
        }
    }
    ret
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_string_test() {
        let events = EventSet::from([
            PossibleEvent::LeaveStartTag,
            PossibleEvent::AttributeName(NameClass::name("", "b")),
            PossibleEvent::AttributeName(NameClass::name("", "a")),
            PossibleEvent::Text(TextMatcher::Any),
        ]);
        assert_eq!(
            events_to_tree_string(&events),
            "attributeName:\n    {\"name\":\"a\",\"ns\":\"\"}\n    {\"name\":\"b\",\"ns\":\"\"}\nleaveStartTag\ntext:\n    *\n"
        );
    }

    #[test]
    fn attribute_event_test() {
        assert!(Event::attribute_name("", "a").is_attribute_event());
        assert!(Event::attribute_value("v").is_attribute_event());
        assert!(!Event::text("v").is_attribute_event());
        assert!(PossibleEvent::AttributeValue(TextMatcher::Any).is_attribute_event());
        assert!(!PossibleEvent::LeaveStartTag.is_attribute_event());
    }
}
