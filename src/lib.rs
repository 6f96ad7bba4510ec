#![doc = include_str!("../README.md")]

pub mod datatype;
pub mod error;
pub mod event;
pub mod format;
pub mod grammar;
pub mod name_class;
pub mod resolver;
pub mod validate;
mod walker;
pub mod xmlchar;

pub use error::{SchemaError, ValidationError};
pub use event::{Event, EventSet, PossibleEvent, TextMatcher};
pub use format::{read_tree, read_tree_with};
pub use grammar::Grammar;
pub use name_class::{EName, NameClass};
pub use validate::GrammarWalker;

/// The namespace bound to the `xml` prefix.
pub const XML_XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
/// The namespace of namespace declarations. No prefix may be bound to it.
pub const XML_NS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";
