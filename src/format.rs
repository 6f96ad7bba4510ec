//! Reader of pattern trees serialized as JSON.
//!
//! A serialized tree is an object `{"v": 2, "o": options, "d": root}` where `root` is
//! normally a `Grammar` node. Every node is an array whose first item is a type code
//! (or, in verbose trees, the name of the type), followed by the path of the node in the
//! simplified schema unless [`OPTION_NO_PATHS`] is set, then the arguments of the node.
//! Arrays of nodes are written as arrays whose first item is `0`.
//!
//! ```text
//! [13, [18, "", "doc"], [0, [7]]]     <element name="doc"><text/></element>
//! ```
//!
//! Paths are only informative and are not kept. Errors point at the offending node
//! with a JSON pointer into the input, such as `/d/2/1`.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::{
    datatype::{Param, RelaxNGDatatypeLibraries},
    error::SchemaError,
    grammar::{EMPTY, Grammar, GrammarBuilder, NOT_ALLOWED, Pattern, PatternId, TEXT},
    name_class::NameClass,
};

/// The only supported version of the format.
pub const FORMAT_VERSION: u64 = 2;
/// Nodes carry no path. `EName` nodes never carry one, whatever the options.
pub const OPTION_NO_PATHS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCode {
    Array,
    Empty,
    Data,
    List,
    Param,
    Value,
    NotAllowed,
    Text,
    Ref,
    OneOrMore,
    Choice,
    Group,
    Attribute,
    Element,
    Define,
    Grammar,
    EName,
    Interleave,
    Name,
    NameChoice,
    NsName,
    AnyName,
}

impl TypeCode {
    const ALL: [TypeCode; 22] = [
        Self::Array,
        Self::Empty,
        Self::Data,
        Self::List,
        Self::Param,
        Self::Value,
        Self::NotAllowed,
        Self::Text,
        Self::Ref,
        Self::OneOrMore,
        Self::Choice,
        Self::Group,
        Self::Attribute,
        Self::Element,
        Self::Define,
        Self::Grammar,
        Self::EName,
        Self::Interleave,
        Self::Name,
        Self::NameChoice,
        Self::NsName,
        Self::AnyName,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Array => "Array",
            Self::Empty => "Empty",
            Self::Data => "Data",
            Self::List => "List",
            Self::Param => "Param",
            Self::Value => "Value",
            Self::NotAllowed => "NotAllowed",
            Self::Text => "Text",
            Self::Ref => "Ref",
            Self::OneOrMore => "OneOrMore",
            Self::Choice => "Choice",
            Self::Group => "Group",
            Self::Attribute => "Attribute",
            Self::Element => "Element",
            Self::Define => "Define",
            Self::Grammar => "Grammar",
            Self::EName => "EName",
            Self::Interleave => "Interleave",
            Self::Name => "Name",
            Self::NameChoice => "NameChoice",
            Self::NsName => "NsName",
            Self::AnyName => "AnyName",
        }
    }
}

impl TryFrom<&Value> for TypeCode {
    type Error = SchemaError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let code = match value {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| Self::ALL.get(usize::try_from(n).ok()?).copied()),
            Value::String(s) => Self::ALL.iter().copied().find(|code| code.name() == s),
            _ => None,
        };
        code.ok_or_else(|| SchemaError::UnknownTypeCode(value.to_string()))
    }
}

/// A node being read: its type and its arguments.
struct Node<'v> {
    code: TypeCode,
    items: &'v [Value],
    /// The index of the first argument in `items`.
    offset: usize,
    pointer: String,
}

impl<'v> Node<'v> {
    fn malformed(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::MalformedNode {
            path: self.pointer.clone(),
            reason: reason.into(),
        }
    }

    fn len(&self) -> usize {
        self.items.len() - self.offset
    }

    /// The `i`-th argument, if present and not `null`.
    fn arg(&self, i: usize) -> Option<&'v Value> {
        self.items
            .get(self.offset + i)
            .filter(|value| !value.is_null())
    }

    fn arg_pointer(&self, i: usize) -> String {
        format!("{}/{}", self.pointer, self.offset + i)
    }

    fn required(&self, i: usize) -> Result<&'v Value, SchemaError> {
        self.arg(i).ok_or_else(|| {
            self.malformed(format!("{} requires argument {i}", self.code.name()))
        })
    }

    fn string(&self, i: usize) -> Result<&'v str, SchemaError> {
        self.required(i)?
            .as_str()
            .ok_or_else(|| self.malformed(format!("argument {i} must be a string")))
    }

    fn string_or(&self, i: usize, default: &'static str) -> Result<&'v str, SchemaError> {
        match self.arg(i) {
            Some(value) => value
                .as_str()
                .ok_or_else(|| self.malformed(format!("argument {i} must be a string"))),
            None => Ok(default),
        }
    }
}

struct TreeReader<'a> {
    builder: GrammarBuilder<'a>,
    no_paths: bool,
}

impl<'a> TreeReader<'a> {
    fn node<'v>(&self, value: &'v Value, pointer: &str) -> Result<Node<'v>, SchemaError> {
        let malformed = |reason: &str| SchemaError::MalformedNode {
            path: pointer.to_owned(),
            reason: reason.to_owned(),
        };
        let items = value
            .as_array()
            .ok_or_else(|| malformed("a node must be an array"))?;
        let code = TypeCode::try_from(items.first().ok_or_else(|| malformed("empty node"))?)?;
        let offset = if code == TypeCode::Array || code == TypeCode::EName || self.no_paths {
            1
        } else {
            match items.get(1) {
                Some(Value::String(_)) => 2,
                _ => return Err(malformed("a path is required")),
            }
        };
        Ok(Node {
            code,
            items,
            offset,
            pointer: pointer.to_owned(),
        })
    }

    /// Read an array node, returning its items and their pointers.
    fn array<'v>(
        &self,
        value: &'v Value,
        pointer: &str,
    ) -> Result<Vec<(&'v Value, String)>, SchemaError> {
        let node = self.node(value, pointer)?;
        if node.code != TypeCode::Array {
            return Err(node.malformed("an array is expected"));
        }
        Ok((0..node.len())
            .map(|i| (&node.items[node.offset + i], node.arg_pointer(i)))
            .collect())
    }

    /// Read the root, returning the start pattern and the definitions.
    fn root(&mut self, value: &Value, pointer: &str) -> Result<(PatternId, Vec<PatternId>), SchemaError> {
        let node = self.node(value, pointer)?;
        if node.code != TypeCode::Grammar {
            return Ok((self.pattern(value, pointer)?, vec![]));
        }

        let start = self.single(node.required(0)?, &node.arg_pointer(0))?;
        let mut defines = vec![];
        if let Some(list) = node.arg(1) {
            for (value, pointer) in self.array(list, &node.arg_pointer(1))? {
                let define = self.node(value, &pointer)?;
                if define.code != TypeCode::Define {
                    return Err(define.malformed("only Define may appear in the definitions"));
                }
                defines.push(self.pattern(value, &pointer)?);
            }
        }
        Ok((start, defines))
    }

    /// Read a pattern that may be wrapped in a single item array.
    fn single(&mut self, value: &Value, pointer: &str) -> Result<PatternId, SchemaError> {
        let node = self.node(value, pointer)?;
        if node.code != TypeCode::Array {
            return self.pattern(value, pointer);
        }
        match &self.array(value, pointer)?[..] {
            [(value, pointer)] => self.pattern(value, pointer),
            _ => Err(node.malformed("exactly one pattern is expected")),
        }
    }

    /// Read two or more patterns, combining them from the left with `combine`.
    fn fold(
        &mut self,
        node: &Node,
        combine: fn(PatternId, PatternId) -> Pattern,
    ) -> Result<PatternId, SchemaError> {
        let list = node.required(0)?;
        let mut ret = None;
        for (value, pointer) in self.array(list, &node.arg_pointer(0))? {
            let next = self.pattern(value, &pointer)?;
            ret = Some(match ret {
                Some(prev) => self.builder.create_node(combine(prev, next)),
                None => next,
            });
        }
        ret.ok_or_else(|| node.malformed(format!("{} requires patterns", node.code.name())))
    }

    fn pattern(&mut self, value: &Value, pointer: &str) -> Result<PatternId, SchemaError> {
        let node = self.node(value, pointer)?;
        match node.code {
            TypeCode::Empty => Ok(EMPTY),
            TypeCode::NotAllowed => Ok(NOT_ALLOWED),
            TypeCode::Text => Ok(TEXT),
            TypeCode::Data => {
                let type_name = node.string_or(0, "token")?;
                let library = node.string_or(1, "")?;
                let params = match node.arg(2) {
                    Some(params) => self.params(params, &node.arg_pointer(2))?,
                    None => vec![],
                };
                let except = match node.arg(3) {
                    Some(except) => Some(self.single(except, &node.arg_pointer(3))?),
                    None => None,
                };
                self.builder.data(library, type_name, &params, except)
            }
            TypeCode::Value => {
                let raw = node.string(0)?;
                let type_name = node.string_or(1, "token")?;
                let library = node.string_or(2, "")?;
                let ns = node.string_or(3, "")?;
                self.builder.value(library, type_name, raw, ns)
            }
            TypeCode::List => {
                let child = self.single(node.required(0)?, &node.arg_pointer(0))?;
                Ok(self.builder.create_node(Pattern::List(child)))
            }
            TypeCode::Param => {
                let param = Param::new(node.string(0)?, node.string(1)?);
                Ok(self.builder.create_node(Pattern::Param(param)))
            }
            TypeCode::Ref => Ok(self.builder.reference(node.string(0)?)),
            TypeCode::OneOrMore => {
                let child = self.single(node.required(0)?, &node.arg_pointer(0))?;
                Ok(self.builder.create_node(Pattern::OneOrMore(child)))
            }
            TypeCode::Choice => self.fold(&node, Pattern::Choice),
            TypeCode::Group => self.fold(&node, Pattern::Group),
            TypeCode::Interleave => self.fold(&node, Pattern::Interleave),
            TypeCode::Attribute | TypeCode::Element => {
                let name = self.name_class(node.required(0)?, &node.arg_pointer(0))?;
                let content = self.single(node.required(1)?, &node.arg_pointer(1))?;
                Ok(if node.code == TypeCode::Element {
                    self.builder.element(name, content)
                } else {
                    self.builder.attribute(name, content)
                })
            }
            TypeCode::Define => {
                let name = node.string(0)?;
                let content = self.single(node.required(1)?, &node.arg_pointer(1))?;
                Ok(self.builder.define(name, content))
            }
            TypeCode::Array => Err(node.malformed("a pattern is expected, but found an array")),
            TypeCode::Grammar => Err(node.malformed("a grammar can only be the root")),
            TypeCode::EName
            | TypeCode::Name
            | TypeCode::NameChoice
            | TypeCode::NsName
            | TypeCode::AnyName => Err(node.malformed("a pattern is expected, but found a name")),
        }
    }

    /// Read the parameters of `Data`: either name and value strings in turn, or `Param`
    /// nodes.
    fn params(&self, value: &Value, pointer: &str) -> Result<Vec<Param>, SchemaError> {
        let items = self.array(value, pointer)?;
        let mut params = vec![];
        let mut iter = items.into_iter();
        while let Some((item, item_pointer)) = iter.next() {
            match item {
                Value::String(name) => {
                    let Some((Value::String(value), _)) = iter.next() else {
                        return Err(SchemaError::MalformedNode {
                            path: item_pointer,
                            reason: format!("the parameter '{name}' has no value"),
                        });
                    };
                    params.push(Param::new(name.as_str(), value.as_str()));
                }
                _ => {
                    let node = self.node(item, &item_pointer)?;
                    if node.code != TypeCode::Param {
                        return Err(node.malformed("a parameter is expected"));
                    }
                    params.push(Param::new(node.string(0)?, node.string(1)?));
                }
            }
        }
        Ok(params)
    }

    fn name_class(&self, value: &Value, pointer: &str) -> Result<NameClass, SchemaError> {
        let node = self.node(value, pointer)?;
        let except = |i: usize| -> Result<Option<NameClass>, SchemaError> {
            node.arg(i)
                .map(|except| self.name_class(except, &node.arg_pointer(i)))
                .transpose()
        };
        match node.code {
            TypeCode::Name | TypeCode::EName => {
                Ok(NameClass::name(node.string(0)?, node.string(1)?))
            }
            TypeCode::NameChoice => {
                let list = node.required(0)?;
                let mut ret = None;
                for (value, pointer) in self.array(list, &node.arg_pointer(0))? {
                    let next = self.name_class(value, &pointer)?;
                    ret = Some(match ret {
                        Some(prev) => NameClass::choice(prev, next),
                        None => next,
                    });
                }
                ret.ok_or_else(|| node.malformed("NameChoice requires name classes"))
            }
            TypeCode::NsName => Ok(NameClass::NsName {
                ns: node.string(0)?.into(),
                except: except(1)?.map(Arc::new),
            }),
            TypeCode::AnyName => Ok(NameClass::AnyName {
                except: except(0)?.map(Arc::new),
            }),
            _ => Err(node.malformed("a name class is expected")),
        }
    }
}

/// Read a serialized pattern tree with the default datatype libraries.
pub fn read_tree(json: &str) -> Result<Arc<Grammar>, SchemaError> {
    read_tree_with(json, &RelaxNGDatatypeLibraries::default())
}

/// Read a serialized pattern tree, looking datatypes up in `libraries`.
pub fn read_tree_with(
    json: &str,
    libraries: &RelaxNGDatatypeLibraries,
) -> Result<Arc<Grammar>, SchemaError> {
    let root = serde_json::from_str::<Value>(json)?;
    let version = root.get("v").unwrap_or(&Value::Null);
    if version.as_u64() != Some(FORMAT_VERSION) {
        return Err(SchemaError::UnsupportedVersion(version.to_string()));
    }
    let options = root.get("o").and_then(Value::as_u64).unwrap_or(0);
    let tree = root.get("d").ok_or_else(|| SchemaError::MalformedNode {
        path: "/d".to_owned(),
        reason: "the tree is missing".to_owned(),
    })?;
    debug!(options, "read pattern tree");

    let mut reader = TreeReader {
        builder: GrammarBuilder::new(libraries),
        no_paths: options & OPTION_NO_PATHS != 0,
    };
    let (start, defines) = reader.root(tree, "/d")?;
    Ok(Arc::new(Grammar::new(reader.builder, start, &defines)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ValidationError, event::Event};

    #[test]
    fn read_grammar_test() {
        // start = element doc { ref item+ }, item = element item { attribute id { text } }
        let grammar = read_tree(
            r#"{"v":2,"o":1,"d":
                [15,[8,"doc"],[0,
                    [14,"doc",[0,[13,[18,"","doc"],[0,[9,[0,[8,"item"]]]]]]],
                    [14,"item",[0,[13,[18,"","item"],[0,[12,[16,"","id"],[0,[7]]]]]]]
                ]]}"#,
        )
        .unwrap();
        assert!(grammar.define("item").is_some());
        assert!(grammar.wholly_context_independent());

        let mut walker = grammar.new_walker();
        let events = [
            Event::enter_start_tag("", "doc"),
            Event::LeaveStartTag,
            Event::enter_start_tag("", "item"),
            Event::attribute_name("", "id"),
            Event::attribute_value("1"),
            Event::LeaveStartTag,
            Event::end_tag("", "item"),
            Event::end_tag("", "doc"),
        ];
        for ev in &events {
            assert_eq!(walker.fire_event(ev), Ok(()), "{ev}");
        }
        assert_eq!(walker.end(), Ok(()));
    }

    #[test]
    fn paths_and_verbose_names_test() {
        let grammar = read_tree(
            r#"{"v":2,"o":0,"d":
                ["Grammar","",["Element","/a",["Name","/a/@name","","a"],
                    ["Array",["Choice","/a/choice",["Array",["Empty","/a/choice/empty"],["Text","/a/choice/text"]]]]],
                ["Array"]]}"#,
        )
        .unwrap();
        let mut walker = grammar.new_walker();
        walker.fire_event(&Event::enter_start_tag("", "a")).unwrap();
        walker.fire_event(&Event::LeaveStartTag).unwrap();
        assert!(walker.fire_event(&Event::text("any")).is_ok());
    }

    #[test]
    fn fold_test() {
        // a | b | c and a, b, c
        let grammar = read_tree(
            r#"{"v":2,"o":1,"d":[13,[18,"","r"],[0,[11,[0,
                [10,[0,[13,[18,"","a"],[0,[1]]],[13,[18,"","b"],[0,[1]]],[13,[18,"","c"],[0,[1]]]]],
                [7],
                [12,[18,"","x"],[0,[7]]]
            ]]]]}"#,
        )
        .unwrap();
        let mut walker = grammar.new_walker();
        let events = [
            Event::enter_start_tag("", "r"),
            Event::attribute_name("", "x"),
            Event::attribute_value(""),
            Event::LeaveStartTag,
            Event::enter_start_tag("", "c"),
            Event::LeaveStartTag,
            Event::end_tag("", "c"),
            Event::text("tail"),
            Event::end_tag("", "r"),
        ];
        for ev in &events {
            assert_eq!(walker.fire_event(ev), Ok(()), "{ev}");
        }
    }

    #[test]
    fn data_test() {
        let xsd = crate::datatype::xsd::XSD_NAMESPACE;
        let json = format!(
            r#"{{"v":2,"o":1,"d":[13,[18,"","n"],[0,[2,"integer","{xsd}",[0,"minInclusive","1",[4,"maxInclusive","9"]],[5,"5","integer","{xsd}"]]]]}}"#
        );
        let grammar = read_tree(&json).unwrap();
        let run = |text: &str| {
            let mut walker = grammar.new_walker();
            walker.fire_event(&Event::enter_start_tag("", "n")).unwrap();
            walker.fire_event(&Event::LeaveStartTag).unwrap();
            walker.fire_event(&Event::text(text))
        };
        assert_eq!(run("3"), Ok(()));
        assert_eq!(
            run("5"),
            Err(vec![ValidationError::plain("text not allowed here")])
        );
        assert!(run("10").is_err());
    }

    #[test]
    fn version_test() {
        for json in [
            r#"{"o":1,"d":[1]}"#,
            r#"{"v":0,"o":1,"d":[1]}"#,
            r#"{"v":1,"o":1,"d":[1]}"#,
        ] {
            assert!(
                matches!(read_tree(json), Err(SchemaError::UnsupportedVersion(_))),
                "{json}"
            );
        }
        assert!(matches!(read_tree("{"), Err(SchemaError::Json(_))));
    }

    #[test]
    fn malformed_node_test() {
        let err = read_tree(r#"{"v":2,"o":1,"d":[13,[18,"","a"],[0,[99]]]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownTypeCode(code) if code == "99"));

        let err = read_tree(r#"{"v":2,"o":1,"d":[13,[18,"","a"],[0,[8]]]}"#).unwrap_err();
        match err {
            SchemaError::MalformedNode { path, .. } => assert_eq!(path, "/d/2/1"),
            err => panic!("unexpected error: {err}"),
        }

        // paths are required unless disabled
        let err = read_tree(r#"{"v":2,"o":0,"d":[1]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::MalformedNode { .. }));
    }

    #[test]
    fn schema_error_test() {
        let err = read_tree(r#"{"v":2,"o":1,"d":[15,[8,"a"],[0,[14,"c",[0,[8,"b"]]]]]}"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve the following references: a, b"
        );

        let err = read_tree(r#"{"v":2,"o":1,"d":[2,"integer","urn:unknown"]}"#).unwrap_err();
        assert_eq!(err.to_string(), "can't get library with URI: urn:unknown");

        let err = read_tree(r#"{"v":2,"o":1,"d":[2,"float64",""]}"#).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { .. }));
    }

    #[test]
    fn name_classes_test() {
        let grammar = read_tree(
            r#"{"v":2,"o":1,"d":[10,[0,
                [13,[19,[0,[18,"","a"],[18,"","b"]]],[0,[1]]],
                [13,[20,"urn:x",[18,"urn:x","no"]],[0,[1]]],
                [13,[21,[20,""]],[0,[1]]]
            ]]}"#,
        )
        .unwrap();
        assert_eq!(
            grammar.namespaces().iter().map(String::as_str).collect::<Vec<_>>(),
            ["", "*", "::except", "urn:x"]
        );
        assert_eq!(grammar.element_definitions().len(), 3);
        assert!(grammar.wholly_context_independent());

        let accepts = |uri: &str, local: &str| {
            let mut walker = grammar.new_walker();
            walker
                .fire_event(&Event::enter_start_tag(uri, local))
                .is_ok()
        };
        assert!(accepts("", "a"));
        assert!(accepts("urn:x", "yes"));
        // excluded from the namespace, but still any name
        assert!(accepts("urn:x", "no"));
        assert!(accepts("urn:y", "z"));
        assert!(!accepts("", "c"));
    }
}
