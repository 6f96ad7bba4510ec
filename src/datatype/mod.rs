//! Datatype libraries used by `data` and `value` patterns.
//!
//! # Reference
//! ISO/IEC 19757-2:2008 9.3.8 data and value pattern

pub mod builtin;
pub mod regexp;
pub mod xsd;

use std::{collections::HashMap, sync::Arc};

use regex::Regex;

use crate::{
    error::{ParamError, SchemaError, ValueError},
    resolver::NameResolver,
};

pub use builtin::RelaxNGBuiltinDatatypeLibrary;
pub use xsd::XMLSchemaDatatypeLibrary;

/// A parameter of a `data` pattern, as written in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: Arc<str>,
    pub value: Arc<str>,
}

impl Param {
    pub fn new(name: impl Into<Arc<str>>, value: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A compiled `pattern` facet.
#[derive(Debug, Clone)]
pub struct PatternFacet {
    /// The regular expression as written in the schema.
    pub source: Arc<str>,
    pub regex: Regex,
}

/// A numeric bound facet: `minInclusive`, `minExclusive`, `maxInclusive` or `maxExclusive`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFacet {
    /// The bound as written in the schema. Error messages quote it.
    pub raw: Arc<str>,
    pub value: f64,
}

/// The parameters of a `data` pattern, checked and converted by its datatype.
///
/// Parsing happens once, when the grammar is built.
#[derive(Debug, Clone, Default)]
pub struct ParsedParams {
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Every pattern must match.
    pub patterns: Vec<PatternFacet>,
    pub total_digits: Option<usize>,
    pub fraction_digits: Option<usize>,
    pub min_inclusive: Option<BoundFacet>,
    pub min_exclusive: Option<BoundFacet>,
    pub max_inclusive: Option<BoundFacet>,
    pub max_exclusive: Option<BoundFacet>,
}

/// A value in the value space of some datatype.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    String(String),
    Number(f64),
    Boolean(bool),
}

pub trait Datatype: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;
    /// If this returns `true`, values can only be checked with the namespace context
    /// in effect where they occur.
    fn needs_context(&self) -> bool {
        false
    }
    /// Check and convert the parameters of a `data` pattern.
    fn parse_params(&self, params: &[Param]) -> Result<ParsedParams, Vec<ParamError>>;
    /// Convert the literal of a `value` pattern to the value space.
    fn parse_value(
        &self,
        value: &str,
        context: Option<&NameResolver>,
    ) -> Result<ParsedValue, Vec<ValueError>>;
    /// Check if `value` represents `schema_value`.
    ///
    /// # Reference
    /// ISO/IEC 19757-2:2008 9.3.8 data and value pattern
    fn equal(&self, value: &str, schema_value: &ParsedValue, context: Option<&NameResolver>)
    -> bool;
    /// If `value` is not a valid representation of this type restricted by `params`,
    /// return the reasons. Otherwise, return `None`.
    fn disallows(
        &self,
        value: &str,
        params: &ParsedParams,
        context: Option<&NameResolver>,
    ) -> Option<Vec<ValueError>>;
}

pub trait RelaxNGDatatypeLibrary: Send + Sync {
    /// The namespace name identifying this library. `""` is the builtin library.
    fn uri(&self) -> &str;
    /// If a type named `type_name` exists in the library, return it.
    fn get(&self, type_name: &str) -> Option<Arc<dyn Datatype>>;
}

/// The datatype libraries a schema may refer to, keyed by URI.
#[derive(Clone)]
pub struct RelaxNGDatatypeLibraries {
    map: HashMap<Arc<str>, Arc<dyn RelaxNGDatatypeLibrary>>,
}

impl RelaxNGDatatypeLibraries {
    /// A registry without any library. Even the builtin library is absent.
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Register `library`. Registering two libraries with the same URI is an error.
    pub fn add(&mut self, library: Arc<dyn RelaxNGDatatypeLibrary>) -> Result<(), SchemaError> {
        let uri = Arc::<str>::from(library.uri());
        if self.map.contains_key(&uri) {
            return Err(SchemaError::UriClash(uri.to_string()));
        }
        self.map.insert(uri, library);
        Ok(())
    }

    pub fn find(&self, uri: &str) -> Option<&dyn RelaxNGDatatypeLibrary> {
        self.map.get(uri).map(|library| &**library)
    }

    pub fn get(&self, uri: &str) -> Result<&dyn RelaxNGDatatypeLibrary, SchemaError> {
        self.find(uri)
            .ok_or_else(|| SchemaError::UnknownLibrary(uri.to_owned()))
    }

    /// Look up the type `type_name` of the library `uri`.
    pub fn datatype(&self, uri: &str, type_name: &str) -> Result<Arc<dyn Datatype>, SchemaError> {
        self.get(uri)?
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType {
                library: uri.to_owned(),
                name: type_name.to_owned(),
            })
    }
}

impl Default for RelaxNGDatatypeLibraries {
    /// The builtin library and the XML Schema library.
    fn default() -> Self {
        let mut map = HashMap::<Arc<str>, Arc<dyn RelaxNGDatatypeLibrary>>::new();
        map.insert("".into(), Arc::new(RelaxNGBuiltinDatatypeLibrary));
        map.insert(xsd::XSD_NAMESPACE.into(), Arc::new(XMLSchemaDatatypeLibrary));
        Self { map }
    }
}

impl std::fmt::Debug for RelaxNGDatatypeLibraries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut uris = self.map.keys().collect::<Vec<_>>();
        uris.sort();
        f.debug_struct("RelaxNGDatatypeLibraries")
            .field("uris", &uris)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_test() {
        let mut libraries = RelaxNGDatatypeLibraries::default();
        assert!(libraries.find("").is_some());
        assert!(libraries.find(xsd::XSD_NAMESPACE).is_some());
        assert!(matches!(
            libraries.get("urn:none"),
            Err(SchemaError::UnknownLibrary(uri)) if uri == "urn:none"
        ));
        assert!(matches!(
            libraries.add(Arc::new(RelaxNGBuiltinDatatypeLibrary)),
            Err(SchemaError::UriClash(uri)) if uri.is_empty()
        ));
        assert!(libraries.datatype("", "token").is_ok());
        assert!(matches!(
            libraries.datatype("", "integer"),
            Err(SchemaError::UnknownType { .. })
        ));

        let mut libraries = RelaxNGDatatypeLibraries::empty();
        assert!(libraries.find("").is_none());
        libraries
            .add(Arc::new(RelaxNGBuiltinDatatypeLibrary))
            .unwrap();
        assert!(libraries.find("").is_some());
    }
}
