//! Compiled grammars of simplified RELAX NG.
//!
//! Patterns live in an arena owned by [`Grammar`] and refer to each other by
//! [`PatternId`]. `ref` patterns hold the id of the `define` they refer to, so recursive
//! definitions never form ownership cycles.
//!
//! # Reference
//! ISO/IEC 19757-2:2008 7 Simplification

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::debug;

use crate::{
    datatype::{Datatype, Param, ParsedParams, ParsedValue, RelaxNGDatatypeLibraries},
    error::{ReferenceError, SchemaError},
    name_class::NameClass,
    resolver::NameResolver,
    validate::GrammarWalker,
};

pub type PatternId = usize;

/// The arena slot of `empty`.
pub const EMPTY: PatternId = 0;
/// The arena slot of `notAllowed`.
pub const NOT_ALLOWED: PatternId = 1;
/// The arena slot of `text`.
pub const TEXT: PatternId = 2;

#[derive(Debug)]
pub enum Pattern {
    Empty,
    NotAllowed,
    Text,
    Data(Arc<DataPattern>),
    Value(Arc<ValuePattern>),
    List(PatternId),
    /// A stray `param`. It is walked as `text`.
    Param(Param),
    /// A reference and the `define` it resolves to.
    Ref(Arc<str>, PatternId),
    OneOrMore(PatternId),
    Choice(PatternId, PatternId),
    Group(PatternId, PatternId),
    Interleave(PatternId, PatternId),
    Attribute(NameClass, PatternId),
    Element(Arc<ElementPattern>),
    Define(Arc<str>, PatternId),
}

#[derive(Debug)]
pub struct DataPattern {
    pub library: Arc<str>,
    pub type_name: Arc<str>,
    pub datatype: Arc<dyn Datatype>,
    pub params: ParsedParams,
    pub except: Option<PatternId>,
}

#[derive(Debug)]
pub struct ValuePattern {
    pub library: Arc<str>,
    pub type_name: Arc<str>,
    pub datatype: Arc<dyn Datatype>,
    /// The literal as written in the schema.
    pub raw: Arc<str>,
    /// The default namespace in effect where the literal was written.
    pub ns: Arc<str>,
    pub value: ParsedValue,
}

#[derive(Debug)]
pub struct ElementPattern {
    pub name: NameClass,
    pub content: PatternId,
    /// The attribute projection of `content`: what remains of it if everything except
    /// attributes is removed. `None` if no attribute can occur.
    pub attributes: Option<PatternId>,
}

/// Collects patterns for a [`Grammar`].
///
/// Datatypes are looked up and their parameters checked as patterns are created, so a
/// broken `data` or `value` is reported where it occurs.
pub struct GrammarBuilder<'a> {
    libraries: &'a RelaxNGDatatypeLibraries,
    patterns: Vec<Pattern>,
}

impl<'a> GrammarBuilder<'a> {
    pub fn new(libraries: &'a RelaxNGDatatypeLibraries) -> Self {
        Self {
            libraries,
            patterns: vec![Pattern::Empty, Pattern::NotAllowed, Pattern::Text],
        }
    }

    /// Add `pattern` to the arena.
    ///
    /// `empty`, `notAllowed` and `text` are never duplicated.
    pub fn create_node(&mut self, pattern: Pattern) -> PatternId {
        match pattern {
            Pattern::Empty => EMPTY,
            Pattern::NotAllowed => NOT_ALLOWED,
            Pattern::Text => TEXT,
            pattern => {
                self.patterns.push(pattern);
                self.patterns.len() - 1
            }
        }
    }

    pub fn data(
        &mut self,
        library: &str,
        type_name: &str,
        params: &[Param],
        except: Option<PatternId>,
    ) -> Result<PatternId, SchemaError> {
        let datatype = self.libraries.datatype(library, type_name)?;
        let params = datatype
            .parse_params(params)
            .map_err(|errors| SchemaError::InvalidParams {
                name: type_name.to_owned(),
                errors,
            })?;
        Ok(self.create_node(Pattern::Data(Arc::new(DataPattern {
            library: library.into(),
            type_name: type_name.into(),
            datatype,
            params,
            except,
        }))))
    }

    pub fn value(
        &mut self,
        library: &str,
        type_name: &str,
        raw: &str,
        ns: &str,
    ) -> Result<PatternId, SchemaError> {
        let datatype = self.libraries.datatype(library, type_name)?;
        let context = if datatype.needs_context() {
            let mut resolver = NameResolver::new();
            resolver.enter_context();
            resolver
                .define_prefix("", ns)
                .map_err(|err| SchemaError::InvalidValue {
                    name: type_name.to_owned(),
                    value: raw.to_owned(),
                    errors: vec![crate::error::ValueError(err.to_string())],
                })?;
            Some(resolver)
        } else {
            None
        };
        let value = datatype
            .parse_value(raw, context.as_ref())
            .map_err(|errors| SchemaError::InvalidValue {
                name: type_name.to_owned(),
                value: raw.to_owned(),
                errors,
            })?;
        Ok(self.create_node(Pattern::Value(Arc::new(ValuePattern {
            library: library.into(),
            type_name: type_name.into(),
            datatype,
            raw: raw.into(),
            ns: ns.into(),
            value,
        }))))
    }

    /// Create a `ref` to the `define` named `name`. It is resolved when the grammar is
    /// built.
    pub fn reference(&mut self, name: &str) -> PatternId {
        self.create_node(Pattern::Ref(name.into(), NOT_ALLOWED))
    }

    pub fn define(&mut self, name: &str, pattern: PatternId) -> PatternId {
        self.create_node(Pattern::Define(name.into(), pattern))
    }

    pub fn element(&mut self, name: NameClass, content: PatternId) -> PatternId {
        self.create_node(Pattern::Element(Arc::new(ElementPattern {
            name,
            content,
            attributes: None,
        })))
    }

    pub fn attribute(&mut self, name: NameClass, content: PatternId) -> PatternId {
        self.create_node(Pattern::Attribute(name, content))
    }
}

/// A compiled grammar.
///
/// Grammars are immutable once built and are shared between validation sessions behind
/// an [`Arc`].
#[derive(Debug)]
pub struct Grammar {
    patterns: Vec<Pattern>,
    start: PatternId,
    defines: BTreeMap<Arc<str>, PatternId>,
    has_attrs: Vec<bool>,
    nullable: Vec<bool>,
    element_definitions: BTreeMap<String, Vec<PatternId>>,
    namespaces: BTreeSet<String>,
}

impl Grammar {
    /// Build a grammar from the patterns collected by `builder`.
    ///
    /// `defines` are the ids of `define` patterns. A definition named `start` replaces
    /// `start`.
    ///
    /// Every `ref` is resolved here. If some cannot be, all of the unresolved names are
    /// reported at once.
    pub fn new(
        builder: GrammarBuilder<'_>,
        start: PatternId,
        defines: &[PatternId],
    ) -> Result<Self, SchemaError> {
        let mut grammar = Self {
            patterns: builder.patterns,
            start,
            defines: BTreeMap::new(),
            has_attrs: vec![],
            nullable: vec![],
            element_definitions: BTreeMap::new(),
            namespaces: BTreeSet::new(),
        };

        for &define in defines {
            let Some(Pattern::Define(name, _)) = grammar.patterns.get(define) else {
                return Err(SchemaError::MalformedNode {
                    path: format!("grammar definition {define}"),
                    reason: "not a define".to_owned(),
                });
            };
            if &**name == "start" {
                grammar.start = define;
            }
            grammar.defines.insert(name.clone(), define);
        }
        if grammar.start >= grammar.patterns.len() {
            return Err(SchemaError::MalformedNode {
                path: "grammar".to_owned(),
                reason: "the start pattern does not exist".to_owned(),
            });
        }

        grammar.resolve()?;
        grammar.prepare()?;
        debug!(
            patterns = grammar.patterns.len(),
            defines = grammar.defines.len(),
            elements = grammar.element_definitions.len(),
            "grammar built"
        );
        Ok(grammar)
    }

    fn resolve(&mut self) -> Result<(), SchemaError> {
        let mut unresolved = vec![];
        for pattern in &mut self.patterns {
            if let Pattern::Ref(name, target) = pattern {
                match self.defines.get(name) {
                    Some(&define) => *target = define,
                    None => {
                        if !unresolved.contains(name) {
                            unresolved.push(name.clone());
                        }
                    }
                }
            }
        }
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(ReferenceError {
                names: unresolved.iter().map(|name| name.to_string()).collect(),
            }
            .into())
        }
    }

    fn prepare(&mut self) -> Result<(), SchemaError> {
        let mut analysis = Analysis::default();
        analysis.run(&self.patterns)?;

        let elements = (0..self.patterns.len())
            .filter(|&id| matches!(self.patterns[id], Pattern::Element(_)))
            .collect::<Vec<_>>();
        for &id in &elements {
            let Pattern::Element(element) = &self.patterns[id] else {
                unreachable!()
            };
            let content = element.content;
            let attributes = self.keep_attrs(content, &analysis.has_attrs);
            let Pattern::Element(element) = &mut self.patterns[id] else {
                unreachable!()
            };
            *element = Arc::new(ElementPattern {
                name: element.name.clone(),
                content,
                attributes,
            });
        }
        // the projections added new nodes
        analysis.run(&self.patterns)?;
        self.has_attrs = analysis.has_attrs.into_iter().map(|b| b == Some(true)).collect();
        self.nullable = analysis.nullable.into_iter().map(|b| b == Some(true)).collect();

        for &id in &elements {
            let Pattern::Element(element) = &self.patterns[id] else {
                unreachable!()
            };
            self.element_definitions
                .entry(element.name.to_string())
                .or_default()
                .push(id);
            element.name.record_namespaces(&mut self.namespaces);
        }
        for pattern in &self.patterns {
            if let Pattern::Attribute(name, _) = pattern {
                let mut namespaces = name.namespaces();
                namespaces.remove("");
                self.namespaces.extend(namespaces);
            }
        }
        Ok(())
    }

    /// Build the attribute projection of `id`.
    ///
    /// The projection never crosses element boundaries.
    fn keep_attrs(&mut self, id: PatternId, has_attrs: &[Option<bool>]) -> Option<PatternId> {
        if has_attrs.get(id).copied().flatten() != Some(true) {
            return None;
        }
        match self.patterns[id] {
            Pattern::Attribute(..) => Some(id),
            Pattern::Ref(_, target) | Pattern::Define(_, target) => {
                self.keep_attrs(target, has_attrs)
            }
            Pattern::OneOrMore(p) => {
                let p = self.keep_attrs(p, has_attrs)?;
                Some(self.push(Pattern::OneOrMore(p)))
            }
            Pattern::Choice(a, b) => {
                let a = self.keep_attrs(a, has_attrs);
                let b = self.keep_attrs(b, has_attrs);
                match (a, b) {
                    (Some(a), Some(b)) => Some(self.push(Pattern::Choice(a, b))),
                    (Some(p), None) | (None, Some(p)) => Some(self.push(Pattern::Choice(p, EMPTY))),
                    (None, None) => None,
                }
            }
            Pattern::Group(a, b) | Pattern::Interleave(a, b) => {
                let group = matches!(self.patterns[id], Pattern::Group(..));
                let a = self.keep_attrs(a, has_attrs);
                let b = self.keep_attrs(b, has_attrs);
                match (a, b) {
                    (Some(a), Some(b)) if group => Some(self.push(Pattern::Group(a, b))),
                    (Some(a), Some(b)) => Some(self.push(Pattern::Interleave(a, b))),
                    (Some(p), None) | (None, Some(p)) => Some(p),
                    (None, None) => None,
                }
            }
            _ => None,
        }
    }

    fn push(&mut self, pattern: Pattern) -> PatternId {
        self.patterns.push(pattern);
        self.patterns.len() - 1
    }

    /// # Panics
    /// - `id` is not a pattern of this grammar.
    pub fn pattern(&self, id: PatternId) -> &Pattern {
        &self.patterns[id]
    }

    pub fn start(&self) -> PatternId {
        self.start
    }

    /// The `define` named `name`.
    pub fn define(&self, name: &str) -> Option<PatternId> {
        self.defines.get(name).copied()
    }

    /// Check if attributes can occur directly in `id`, without entering an element.
    pub fn has_attrs(&self, id: PatternId) -> bool {
        self.has_attrs.get(id).copied().unwrap_or_default()
    }

    /// Check if `id` matches an empty sequence.
    pub fn nullable(&self, id: PatternId) -> bool {
        self.nullable.get(id).copied().unwrap_or_default()
    }

    /// Every `element` pattern, keyed by the rendering of its name class.
    ///
    /// The same name may be defined by several patterns with different contents.
    pub fn element_definitions(&self) -> &BTreeMap<String, Vec<PatternId>> {
        &self.element_definitions
    }

    /// Check if every element of the schema can be validated knowing only its name, that
    /// is, if no name has more than one definition.
    pub fn wholly_context_independent(&self) -> bool {
        self.element_definitions.values().all(|ids| ids.len() == 1)
    }

    /// The namespaces the schema uses.
    ///
    /// Element namespaces are always included, attribute namespaces only if not empty.
    /// `*` stands for `anyName` and `::except` for the presence of any exception.
    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    /// The `element` patterns whose name class contains `{ns}local`.
    pub(crate) fn elements_matching(&self, ns: &str, local: &str) -> Vec<PatternId> {
        self.element_definitions
            .values()
            .flatten()
            .copied()
            .filter(|&id| {
                matches!(&self.patterns[id], Pattern::Element(element) if element.name.matches(ns, local))
            })
            .collect()
    }

    /// Start validating a new document.
    pub fn new_walker(self: &Arc<Self>) -> GrammarWalker {
        GrammarWalker::new(self.clone())
    }
}

/// Per-pattern properties that never cross element boundaries.
#[derive(Default)]
struct Analysis {
    has_attrs: Vec<Option<bool>>,
    nullable: Vec<Option<bool>>,
    in_progress: Vec<bool>,
}

impl Analysis {
    fn run(&mut self, patterns: &[Pattern]) -> Result<(), SchemaError> {
        self.has_attrs.resize(patterns.len(), None);
        self.nullable.resize(patterns.len(), None);
        self.in_progress.resize(patterns.len(), false);
        for id in 0..patterns.len() {
            self.visit(patterns, id)?;
        }
        Ok(())
    }

    /// Return `(has_attrs, nullable)` of `id`.
    fn visit(&mut self, patterns: &[Pattern], id: PatternId) -> Result<(bool, bool), SchemaError> {
        if let (Some(has_attrs), Some(nullable)) = (self.has_attrs[id], self.nullable[id]) {
            return Ok((has_attrs, nullable));
        }
        if self.in_progress[id] {
            let name = match &patterns[id] {
                Pattern::Ref(name, _) | Pattern::Define(name, _) => name.to_string(),
                _ => id.to_string(),
            };
            return Err(SchemaError::MalformedNode {
                path: format!("define {name}"),
                reason: "recursive reference outside of any element".to_owned(),
            });
        }
        self.in_progress[id] = true;
        let ret = match patterns[id] {
            Pattern::Empty | Pattern::Text => (false, true),
            Pattern::NotAllowed
            | Pattern::Data(_)
            | Pattern::Value(_)
            | Pattern::List(_)
            | Pattern::Param(_)
            | Pattern::Element(_) => (false, false),
            Pattern::Attribute(..) => (true, false),
            Pattern::Ref(_, p) | Pattern::Define(_, p) | Pattern::OneOrMore(p) => {
                self.visit(patterns, p)?
            }
            Pattern::Choice(a, b) => {
                let (ha, na) = self.visit(patterns, a)?;
                let (hb, nb) = self.visit(patterns, b)?;
                (ha || hb, na || nb)
            }
            Pattern::Group(a, b) | Pattern::Interleave(a, b) => {
                let (ha, na) = self.visit(patterns, a)?;
                let (hb, nb) = self.visit(patterns, b)?;
                (ha || hb, na && nb)
            }
        };
        self.in_progress[id] = false;
        self.has_attrs[id] = Some(ret.0);
        self.nullable[id] = Some(ret.1);
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_error_collects_all_names_test() {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        let a = builder.reference("a");
        let b = builder.reference("b");
        let a2 = builder.reference("a");
        let group = builder.create_node(Pattern::Group(a, b));
        let start = builder.create_node(Pattern::Group(group, a2));
        let err = Grammar::new(builder, start, &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot resolve the following references: a, b"
        );
    }

    #[test]
    fn recursive_reference_test() {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        let r = builder.reference("loop");
        let more = builder.create_node(Pattern::OneOrMore(r));
        let define = builder.define("loop", more);
        assert!(matches!(
            Grammar::new(builder, define, &[define]),
            Err(SchemaError::MalformedNode { .. })
        ));
    }

    #[test]
    fn attribute_projection_test() {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        let id = builder.attribute(NameClass::name("", "id"), TEXT);
        let child = builder.element(NameClass::name("", "child"), EMPTY);
        let optional_id = builder.create_node(Pattern::Choice(id, EMPTY));
        let content = builder.create_node(Pattern::Group(optional_id, child));
        let root = builder.element(NameClass::name("", "root"), content);
        let grammar = Grammar::new(builder, root, &[]).unwrap();

        let Pattern::Element(root) = grammar.pattern(grammar.start()) else {
            unreachable!()
        };
        let attributes = root.attributes.unwrap();
        // `Choice(id, empty)` survives, `child` is dropped
        let Pattern::Choice(a, b) = grammar.pattern(attributes) else {
            panic!("{:?}", grammar.pattern(attributes))
        };
        assert!(matches!(grammar.pattern(*a), Pattern::Attribute(..)));
        assert_eq!(*b, EMPTY);
        assert!(grammar.has_attrs(content));
        assert!(!grammar.has_attrs(child));
        assert!(grammar.nullable(optional_id));
        assert!(!grammar.nullable(content));

        let Pattern::Element(child) = grammar.pattern(child) else {
            unreachable!()
        };
        assert!(child.attributes.is_none());
    }

    #[test]
    fn element_definitions_test() {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        let p1 = builder.element(NameClass::name("", "p"), TEXT);
        let p2 = builder.element(NameClass::name("", "p"), EMPTY);
        let q = builder.element(NameClass::name("urn:q", "q"), EMPTY);
        let any = builder.element(NameClass::AnyName { except: None }, EMPTY);
        let choice = builder.create_node(Pattern::Choice(p1, p2));
        let group = builder.create_node(Pattern::Group(choice, q));
        let group = builder.create_node(Pattern::Group(group, any));
        let attr = builder.attribute(NameClass::name("urn:attr", "a"), TEXT);
        let local_attr = builder.attribute(NameClass::name("", "b"), TEXT);
        let attrs = builder.create_node(Pattern::Group(attr, local_attr));
        let content = builder.create_node(Pattern::Group(attrs, group));
        let root = builder.element(NameClass::name("", "root"), content);
        let grammar = Arc::new(Grammar::new(builder, root, &[]).unwrap());

        let definitions = grammar.element_definitions();
        assert_eq!(definitions.len(), 4);
        assert_eq!(definitions[&NameClass::name("", "p").to_string()], vec![p1, p2]);
        assert!(!grammar.wholly_context_independent());
        assert_eq!(
            grammar.namespaces().iter().map(String::as_str).collect::<Vec<_>>(),
            ["", "*", "urn:attr", "urn:q"]
        );
        assert_eq!(grammar.elements_matching("", "p"), vec![p1, p2, any]);
        assert_eq!(grammar.elements_matching("urn:q", "q"), vec![q, any]);
    }

    #[test]
    fn datatype_errors_test() {
        let libraries = RelaxNGDatatypeLibraries::default();
        let mut builder = GrammarBuilder::new(&libraries);
        assert!(matches!(
            builder.data("urn:none", "string", &[], None),
            Err(SchemaError::UnknownLibrary(_))
        ));
        assert!(matches!(
            builder.data("", "integer", &[], None),
            Err(SchemaError::UnknownType { .. })
        ));
        assert!(matches!(
            builder.data("", "token", &[Param::new("length", "1")], None),
            Err(SchemaError::InvalidParams { .. })
        ));
        assert!(matches!(
            builder.value(crate::datatype::xsd::XSD_NAMESPACE, "integer", "abc", ""),
            Err(SchemaError::InvalidValue { .. })
        ));
        assert!(
            builder
                .value(crate::datatype::xsd::XSD_NAMESPACE, "QName", "a", "urn:x")
                .is_ok()
        );
    }
}
