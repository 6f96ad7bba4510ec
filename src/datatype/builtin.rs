use std::sync::Arc;

use crate::{
    datatype::{Datatype, Param, ParsedParams, ParsedValue, RelaxNGDatatypeLibrary},
    error::{ParamError, ValueError},
    resolver::NameResolver,
    xmlchar::collapse_whitespace,
};

/// The library every RELAX NG implementation supports, identified by the empty URI.
///
/// # Reference
/// ISO/IEC 19757-2:2008 9.3.8 data and value pattern
pub struct RelaxNGBuiltinDatatypeLibrary;

impl RelaxNGDatatypeLibrary for RelaxNGBuiltinDatatypeLibrary {
    fn uri(&self) -> &str {
        ""
    }

    fn get(&self, type_name: &str) -> Option<Arc<dyn Datatype>> {
        match type_name {
            "string" => Some(Arc::new(BuiltinType::String)),
            "token" => Some(Arc::new(BuiltinType::Token)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinType {
    String,
    Token,
}

impl BuiltinType {
    fn normalize(&self, value: &str) -> String {
        match self {
            Self::String => value.to_owned(),
            Self::Token => collapse_whitespace(value),
        }
    }
}

impl Datatype for BuiltinType {
    fn name(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Token => "token",
        }
    }

    fn parse_params(&self, params: &[Param]) -> Result<ParsedParams, Vec<ParamError>> {
        if params.is_empty() {
            Ok(ParsedParams::default())
        } else {
            Err(params
                .iter()
                .map(|param| ParamError(format!("unexpected parameter: {}", param.name)))
                .collect())
        }
    }

    fn parse_value(
        &self,
        value: &str,
        _context: Option<&NameResolver>,
    ) -> Result<ParsedValue, Vec<ValueError>> {
        Ok(ParsedValue::String(self.normalize(value)))
    }

    fn equal(
        &self,
        value: &str,
        schema_value: &ParsedValue,
        _context: Option<&NameResolver>,
    ) -> bool {
        matches!(schema_value, ParsedValue::String(s) if *s == self.normalize(value))
    }

    fn disallows(
        &self,
        _value: &str,
        _params: &ParsedParams,
        _context: Option<&NameResolver>,
    ) -> Option<Vec<ValueError>> {
        None
    }
}
