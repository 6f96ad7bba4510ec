//! The datatypes of
//! [XML Schema Part 2: Datatypes Second Edition](https://www.w3.org/TR/xmlschema-2/)
//! as used from RELAX NG.
//!
//! # Reference
//! [Guidelines for using W3C XML Schema Datatypes with RELAX NG](https://relaxng.org/xsd-20010907.html)

use std::{collections::HashSet, str::FromStr, sync::Arc, sync::LazyLock};

use regex::Regex;
use rngwalk_datetime::{Date, DateTime, Duration, GDay, GMonth, GMonthDay, GYear, GYearMonth, Time};

use crate::{
    datatype::{
        BoundFacet, Datatype, Param, ParsedParams, ParsedValue, PatternFacet,
        RelaxNGDatatypeLibrary, regexp,
    },
    error::{ParamError, ValueError},
    resolver::NameResolver,
    xmlchar::{
        collapse_whitespace, is_whitespace, replace_whitespace, validate_name, validate_ncname,
        validate_nmtoken, validate_qname,
    },
};

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-datatypes";

pub struct XMLSchemaDatatypeLibrary;

impl RelaxNGDatatypeLibrary for XMLSchemaDatatypeLibrary {
    fn uri(&self) -> &str {
        XSD_NAMESPACE
    }

    fn get(&self, type_name: &str) -> Option<Arc<dyn Datatype>> {
        TYPES
            .iter()
            .find(|ty| ty.name == type_name)
            .map(|ty| Arc::new(*ty) as Arc<dyn Datatype>)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    String,
    Number,
    Boolean,
    QName,
    Base64,
    Hex,
}

/// How the length facets measure a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthUnit {
    Chars,
    Items,
    Octets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Facet {
    Length,
    MinLength,
    MaxLength,
    Pattern,
    TotalDigits,
    FractionDigits,
    MinInclusive,
    MinExclusive,
    MaxInclusive,
    MaxExclusive,
}

impl Facet {
    fn name(&self) -> &'static str {
        match self {
            Self::Length => "length",
            Self::MinLength => "minLength",
            Self::MaxLength => "maxLength",
            Self::Pattern => "pattern",
            Self::TotalDigits => "totalDigits",
            Self::FractionDigits => "fractionDigits",
            Self::MinInclusive => "minInclusive",
            Self::MinExclusive => "minExclusive",
            Self::MaxInclusive => "maxInclusive",
            Self::MaxExclusive => "maxExclusive",
        }
    }
}

use Facet::*;

const LENGTH_FACETS: &[Facet] = &[Length, MinLength, MaxLength, Pattern];
const DECIMAL_FACETS: &[Facet] = &[
    TotalDigits,
    FractionDigits,
    Pattern,
    MinExclusive,
    MinInclusive,
    MaxExclusive,
    MaxInclusive,
];
const INTEGER_FACETS: &[Facet] = &[
    TotalDigits,
    Pattern,
    MinExclusive,
    MinInclusive,
    MaxExclusive,
    MaxInclusive,
];
const FLOAT_FACETS: &[Facet] = &[Pattern, MinInclusive, MinExclusive, MaxInclusive, MaxExclusive];
const PATTERN_FACET: &[Facet] = &[Pattern];

#[derive(Debug, Clone, Copy)]
struct XsdType {
    name: &'static str,
    type_error_msg: &'static str,
    whitespace: WhiteSpace,
    /// Check the lexical form of a whitespace-normalized value.
    lexical: fn(&str) -> bool,
    kind: ValueKind,
    facets: &'static [Facet],
    unit: LengthUnit,
    /// Implicit `minInclusive` and `maxInclusive` of the types derived from `integer`.
    lowest: Option<i128>,
    highest: Option<i128>,
    needs_context: bool,
}

impl XsdType {
    const fn new(name: &'static str, type_error_msg: &'static str, lexical: fn(&str) -> bool) -> Self {
        Self {
            name,
            type_error_msg,
            whitespace: WhiteSpace::Collapse,
            lexical,
            kind: ValueKind::String,
            facets: LENGTH_FACETS,
            unit: LengthUnit::Chars,
            lowest: None,
            highest: None,
            needs_context: false,
        }
    }

    const fn whitespace(mut self, whitespace: WhiteSpace) -> Self {
        self.whitespace = whitespace;
        self
    }

    const fn kind(mut self, kind: ValueKind, facets: &'static [Facet]) -> Self {
        self.kind = kind;
        self.facets = facets;
        self
    }

    const fn unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }

    const fn integer(mut self, lowest: Option<i128>, highest: Option<i128>) -> Self {
        self.kind = ValueKind::Number;
        self.facets = INTEGER_FACETS;
        self.lowest = lowest;
        self.highest = highest;
        self
    }

    const fn with_context(mut self) -> Self {
        self.needs_context = true;
        self
    }
}

static TYPES: &[XsdType] = &[
    XsdType::new("string", "value is not a string", any).whitespace(WhiteSpace::Preserve),
    XsdType::new(
        "normalizedString",
        "string contains a tab, carriage return or newline",
        is_normalized,
    )
    .whitespace(WhiteSpace::Replace),
    XsdType::new("token", "not a valid token", any),
    XsdType::new("language", "not a valid language identifier", is_language),
    XsdType::new("Name", "not a valid Name", validate_name),
    XsdType::new("NCName", "not a valid NCName", validate_ncname),
    XsdType::new("NMTOKEN", "not a valid NMTOKEN", validate_nmtoken),
    XsdType::new("NMTOKENS", "not a valid NMTOKENS", is_nmtokens).unit(LengthUnit::Items),
    XsdType::new("ID", "not a valid ID", validate_ncname),
    XsdType::new("IDREF", "not a valid IDREF", validate_ncname),
    XsdType::new("IDREFS", "not a valid IDREFS", is_ncnames).unit(LengthUnit::Items),
    XsdType::new("ENTITY", "not a valid ENTITY", validate_ncname),
    XsdType::new("ENTITIES", "not a valid ENTITIES", is_ncnames).unit(LengthUnit::Items),
    XsdType::new("decimal", "value not a decimal number", is_decimal)
        .kind(ValueKind::Number, DECIMAL_FACETS),
    XsdType::new("integer", "value is not an integer", is_integer).integer(None, None),
    XsdType::new(
        "nonPositiveInteger",
        "value is not a nonPositiveInteger",
        is_integer,
    )
    .integer(None, Some(0)),
    XsdType::new("negativeInteger", "value is not a negativeInteger", is_integer)
        .integer(None, Some(-1)),
    XsdType::new(
        "nonNegativeInteger",
        "value is not a nonNegativeInteger",
        is_integer,
    )
    .integer(Some(0), None),
    XsdType::new("positiveInteger", "value is not a positiveInteger", is_integer)
        .integer(Some(1), None),
    XsdType::new("long", "value is not a long", is_integer)
        .integer(Some(i64::MIN as i128), Some(i64::MAX as i128)),
    XsdType::new("int", "value is not an int", is_integer)
        .integer(Some(i32::MIN as i128), Some(i32::MAX as i128)),
    XsdType::new("short", "value is not a short", is_integer)
        .integer(Some(i16::MIN as i128), Some(i16::MAX as i128)),
    XsdType::new("byte", "value is not a byte", is_integer)
        .integer(Some(i8::MIN as i128), Some(i8::MAX as i128)),
    XsdType::new("unsignedLong", "value is not an unsignedLong", is_integer)
        .integer(Some(0), Some(u64::MAX as i128)),
    XsdType::new("unsignedInt", "value is not an unsignedInt", is_integer)
        .integer(Some(0), Some(u32::MAX as i128)),
    XsdType::new("unsignedShort", "value is not an unsignedShort", is_integer)
        .integer(Some(0), Some(u16::MAX as i128)),
    XsdType::new("unsignedByte", "value is not an unsignedByte", is_integer)
        .integer(Some(0), Some(u8::MAX as i128)),
    XsdType::new("boolean", "not a valid boolean", is_boolean)
        .kind(ValueKind::Boolean, PATTERN_FACET),
    XsdType::new("base64Binary", "not a valid base64Binary", is_base64)
        .kind(ValueKind::Base64, LENGTH_FACETS)
        .unit(LengthUnit::Octets),
    XsdType::new("hexBinary", "not a valid hexBinary", is_hex)
        .kind(ValueKind::Hex, LENGTH_FACETS)
        .unit(LengthUnit::Octets),
    XsdType::new("float", "not a valid float", is_float).kind(ValueKind::Number, FLOAT_FACETS),
    XsdType::new("double", "not a valid double", is_float).kind(ValueKind::Number, FLOAT_FACETS),
    XsdType::new("QName", "not a valid QName", validate_qname)
        .kind(ValueKind::QName, LENGTH_FACETS)
        .with_context(),
    XsdType::new("NOTATION", "not a valid NOTATION", validate_qname)
        .kind(ValueKind::QName, LENGTH_FACETS)
        .with_context(),
    XsdType::new("duration", "not a valid duration", parses::<Duration>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("dateTime", "not a valid dateTime", parses::<DateTime>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("time", "not a valid time", parses::<Time>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("date", "not a valid date", parses::<Date>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("gYearMonth", "not a valid gYearMonth", parses::<GYearMonth>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("gYear", "not a valid gYear", parses::<GYear>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("gMonthDay", "not a valid gMonthDay", parses::<GMonthDay>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("gDay", "not a valid gDay", parses::<GDay>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("gMonth", "not a valid gMonth", parses::<GMonth>)
        .kind(ValueKind::String, PATTERN_FACET),
    XsdType::new("anyURI", "not a valid anyURI", is_uri_reference),
];

fn any(_: &str) -> bool {
    true
}

fn parses<T: FromStr>(s: &str) -> bool {
    s.parse::<T>().is_ok()
}

fn is_normalized(s: &str) -> bool {
    !s.contains(['\t', '\r', '\n'])
}

fn is_language(s: &str) -> bool {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[a-zA-Z]{1,8}(?:-[a-zA-Z0-9]{1,8})*$").unwrap());
    RE.is_match(s)
}

fn is_nmtokens(s: &str) -> bool {
    !s.is_empty() && s.split(' ').all(validate_nmtoken)
}

fn is_ncnames(s: &str) -> bool {
    !s.is_empty() && s.split(' ').all(validate_ncname)
}

fn is_decimal(s: &str) -> bool {
    static RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[-+]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)$").unwrap());
    RE.is_match(s)
}

fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_boolean(s: &str) -> bool {
    matches!(s, "true" | "false" | "1" | "0")
}

fn is_base64(s: &str) -> bool {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        let b64 = "[A-Za-z0-9+/]";
        let b16 = "[AEIMQUYcgkosw048]";
        let b04 = "[AQgw]";
        let b64s = format!("(?:{b64} ?)");
        let b16s = format!("(?:{b16} ?)");
        let b04s = format!("(?:{b04} ?)");
        Regex::new(&format!(
            "^(?:(?:{b64s}{{4}})*(?:(?:{b64s}{{3}}{b64})|(?:{b64s}{{2}}{b16s}=)|(?:{b64s}{b04s}= ?=)))?$"
        ))
        .unwrap()
    });
    RE.is_match(s)
}

fn is_hex(s: &str) -> bool {
    s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_float(s: &str) -> bool {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(?:[-+]?INF|NaN|[-+]?(?:[0-9]+(?:\.[0-9]*)?|\.[0-9]+)(?:[Ee][-+]?[0-9]+)?)$")
            .unwrap()
    });
    RE.is_match(s)
}

/// RFC 3986 URI-reference
fn is_uri_reference(s: &str) -> bool {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        let unreserved = r"A-Za-z0-9\-._~";
        let sub_delims = r"!$&'()*+,;=";
        let pct = "%[0-9A-Fa-f]{2}";
        let pchar = format!("(?:[{unreserved}{sub_delims}:@]|{pct})");
        let userinfo = format!("(?:[{unreserved}{sub_delims}:]|{pct})*@");
        let host = format!(r"(?:\[[0-9A-Fa-f:.vV{unreserved}{sub_delims}]+\]|(?:[{unreserved}{sub_delims}]|{pct})*)");
        Regex::new(&format!(
            r"^(?:[A-Za-z][A-Za-z0-9+\-.]*:)?(?://(?:{userinfo})?{host}(?::[0-9]*)?)?(?:{pchar}|/)*(?:\?(?:{pchar}|[/?])*)?(?:#(?:{pchar}|[/?])*)?$"
        ))
        .unwrap()
    });
    RE.is_match(s)
}

/// Parse a whitespace-normalized numeric lexical form.
fn to_number(s: &str) -> f64 {
    match s {
        "INF" | "+INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        s => s.parse().unwrap_or(f64::NAN),
    }
}

/// The number of significant digits and of fraction digits of a decimal lexical form.
fn digit_counts(s: &str) -> (usize, usize) {
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (int, frac) = s.split_once('.').unwrap_or((s, ""));
    let int = int.trim_start_matches('0');
    let frac = frac.trim_end_matches('0');
    (int.len() + frac.len(), frac.len())
}

fn parse_non_negative(param: &Param) -> Result<usize, ParamError> {
    let value = &*param.value;
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = value.parse() {
            return Ok(n);
        }
    }
    Err(ParamError(format!(
        "{} must have a non-negative integer value",
        param.name
    )))
}

fn parse_positive(param: &Param) -> Result<usize, ParamError> {
    match parse_non_negative(param) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ParamError(format!(
            "{} must have a positive value",
            param.name
        ))),
    }
}

impl XsdType {
    fn normalize(&self, value: &str) -> String {
        match self.whitespace {
            WhiteSpace::Preserve => value.to_owned(),
            WhiteSpace::Replace => replace_whitespace(value),
            WhiteSpace::Collapse => collapse_whitespace(value),
        }
    }

    fn measure(&self, normalized: &str) -> usize {
        match (self.unit, self.kind) {
            (LengthUnit::Items, _) => normalized.split(' ').filter(|s| !s.is_empty()).count(),
            (LengthUnit::Octets, ValueKind::Base64) => {
                normalized
                    .chars()
                    .filter(|&c| !is_whitespace(c) && c != '=')
                    .count()
                    * 3
                    / 4
            }
            (LengthUnit::Octets, _) => normalized.len() / 2,
            (LengthUnit::Chars, _) => normalized.chars().count(),
        }
    }

    /// Convert a lexically valid, whitespace-normalized value to the value space.
    fn convert(
        &self,
        normalized: &str,
        raw: &str,
        context: Option<&NameResolver>,
    ) -> Result<ParsedValue, Vec<ValueError>> {
        match self.kind {
            ValueKind::String => Ok(ParsedValue::String(normalized.to_owned())),
            ValueKind::Number => Ok(ParsedValue::Number(to_number(normalized))),
            ValueKind::Boolean => Ok(ParsedValue::Boolean(matches!(normalized, "1" | "true"))),
            ValueKind::QName => context
                .and_then(|resolver| resolver.resolve_name(normalized, false))
                .map(|name| ParsedValue::String(name.to_string()))
                .ok_or_else(|| vec![ValueError(format!("cannot resolve the name {raw}"))]),
            ValueKind::Base64 => Ok(ParsedValue::String(
                normalized.chars().filter(|&c| !is_whitespace(c)).collect(),
            )),
            ValueKind::Hex => Ok(ParsedValue::String(normalized.to_ascii_uppercase())),
        }
    }

    /// The parameters in effect when a `data` pattern has none.
    fn default_params(&self) -> ParsedParams {
        ParsedParams {
            min_inclusive: self.lowest.map(|low| BoundFacet {
                raw: low.to_string().into(),
                value: low as f64,
            }),
            max_inclusive: self.highest.map(|high| BoundFacet {
                raw: high.to_string().into(),
                value: high as f64,
            }),
            ..Default::default()
        }
    }

    fn check_param(&self, facet: Facet, param: &Param) -> Result<(), Vec<ParamError>> {
        match facet {
            Length | MinLength | MaxLength | FractionDigits => {
                parse_non_negative(param).map(drop).map_err(|e| vec![e])
            }
            TotalDigits => parse_positive(param).map(drop).map_err(|e| vec![e]),
            Pattern => regexp::compile(&param.value)
                .map(drop)
                .map_err(|e| vec![ParamError(format!("{}: {e}", param.value))]),
            MinInclusive | MinExclusive | MaxInclusive | MaxExclusive => {
                match self.disallows(&param.value, &self.default_params(), None) {
                    Some(errors) => Err(errors.into_iter().map(|e| ParamError(e.0)).collect()),
                    None => Ok(()),
                }
            }
        }
    }

    fn bound(&self, param: &Param) -> BoundFacet {
        BoundFacet {
            raw: param.value.clone(),
            value: to_number(&self.normalize(&param.value)),
        }
    }

    /// Check the facets of `params` against `normalized`.
    fn disallowed_by_params(
        &self,
        normalized: &str,
        params: &ParsedParams,
    ) -> Vec<ValueError> {
        let mut errors = vec![];
        let length = self.measure(normalized);
        if let Some(n) = params.length.filter(|&n| length != n) {
            errors.push(ValueError(format!("length of value should be {n}")));
        }
        if let Some(n) = params.min_length.filter(|&n| length < n) {
            errors.push(ValueError(format!(
                "length of value should be greater than or equal to {n}"
            )));
        }
        if let Some(n) = params.max_length.filter(|&n| length > n) {
            errors.push(ValueError(format!(
                "length of value should be less than or equal to {n}"
            )));
        }
        if let Some(failed) = params.patterns.iter().find(|p| !p.regex.is_match(normalized)) {
            errors.push(ValueError(format!(
                "value does not match the pattern {}",
                failed.source
            )));
        }

        if self.kind == ValueKind::Number {
            let (total, fraction) = digit_counts(normalized);
            if let Some(n) = params.total_digits.filter(|&n| total > n) {
                errors.push(ValueError(format!("value must have at most {n} digits")));
            }
            if let Some(n) = params.fraction_digits.filter(|&n| fraction > n) {
                errors.push(ValueError(format!(
                    "value must have at most {n} fraction digits"
                )));
            }

            let value = to_number(normalized);
            if let Some(b) = params.max_inclusive.as_ref().filter(|b| value > b.value) {
                errors.push(ValueError(format!(
                    "value must be less than or equal to {}",
                    b.raw
                )));
            }
            if let Some(b) = params.max_exclusive.as_ref().filter(|b| value >= b.value) {
                errors.push(ValueError(format!("value must be less than {}", b.raw)));
            }
            if let Some(b) = params.min_inclusive.as_ref().filter(|b| value < b.value) {
                errors.push(ValueError(format!(
                    "value must be greater than or equal to {}",
                    b.raw
                )));
            }
            if let Some(b) = params.min_exclusive.as_ref().filter(|b| value <= b.value) {
                errors.push(ValueError(format!("value must be greater than {}", b.raw)));
            }
        }
        errors
    }
}

impl Datatype for XsdType {
    fn name(&self) -> &str {
        self.name
    }

    fn needs_context(&self) -> bool {
        self.needs_context
    }

    fn parse_params(&self, params: &[Param]) -> Result<ParsedParams, Vec<ParamError>> {
        let mut errors = vec![];
        let mut seen = HashSet::new();
        let mut ret = self.default_params();
        let (mut min_inclusive, mut max_inclusive) = (None, None);

        for param in params {
            let Some(&facet) = self.facets.iter().find(|f| f.name() == &*param.name) else {
                errors.push(ParamError(format!("unexpected parameter: {}", param.name)));
                continue;
            };
            if let Err(invalid) = self.check_param(facet, param) {
                errors.extend(invalid);
            }
            if !seen.insert(facet) && facet != Pattern {
                errors.push(ParamError(format!(
                    "cannot repeat parameter {}",
                    param.name
                )));
            }
            if !errors.is_empty() {
                continue;
            }

            match facet {
                Length => ret.length = parse_non_negative(param).ok(),
                MinLength => ret.min_length = parse_non_negative(param).ok(),
                MaxLength => ret.max_length = parse_non_negative(param).ok(),
                TotalDigits => ret.total_digits = parse_positive(param).ok(),
                FractionDigits => ret.fraction_digits = parse_non_negative(param).ok(),
                Pattern => {
                    if let Ok(regex) = regexp::compile(&param.value) {
                        ret.patterns.push(PatternFacet {
                            source: param.value.clone(),
                            regex,
                        });
                    }
                }
                MinInclusive => min_inclusive = Some(self.bound(param)),
                MinExclusive => ret.min_exclusive = Some(self.bound(param)),
                MaxInclusive => max_inclusive = Some(self.bound(param)),
                MaxExclusive => ret.max_exclusive = Some(self.bound(param)),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let value = |b: &Option<BoundFacet>| b.as_ref().map(|b| b.value);
        let (min_ex, max_ex) = (value(&ret.min_exclusive), value(&ret.max_exclusive));
        let (min_in, max_in) = (value(&min_inclusive), value(&max_inclusive));

        if let (Some(min), Some(max)) = (ret.min_length, ret.max_length) {
            if min > max {
                errors.push(ParamError(
                    "minLength must be less than or equal to maxLength".to_owned(),
                ));
            }
        }
        if ret.length.is_some() {
            if ret.min_length.is_some() {
                errors.push(ParamError(
                    "length and minLength cannot appear together".to_owned(),
                ));
            }
            if ret.max_length.is_some() {
                errors.push(ParamError(
                    "length and maxLength cannot appear together".to_owned(),
                ));
            }
        }
        if let Some(max_in) = max_in {
            if max_ex.is_some() {
                errors.push(ParamError(
                    "maxInclusive and maxExclusive cannot appear together".to_owned(),
                ));
            }
            if min_ex.is_some_and(|min_ex| min_ex >= max_in) {
                errors.push(ParamError(
                    "minExclusive must be less than maxInclusive".to_owned(),
                ));
            }
        }
        if let Some(min_in) = min_in {
            if min_ex.is_some() {
                errors.push(ParamError(
                    "minInclusive and minExclusive cannot appear together".to_owned(),
                ));
            }
            if max_in.is_some_and(|max_in| min_in > max_in) {
                errors.push(ParamError(
                    "minInclusive must be less than or equal to maxInclusive".to_owned(),
                ));
            }
            if max_ex.is_some_and(|max_ex| min_in >= max_ex) {
                errors.push(ParamError(
                    "minInclusive must be less than maxExclusive".to_owned(),
                ));
            }
        }
        if let (Some(min_ex), Some(max_ex)) = (min_ex, max_ex) {
            if min_ex > max_ex {
                errors.push(ParamError(
                    "minExclusive must be less than or equal to maxExclusive".to_owned(),
                ));
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        // The types derived from `integer` bound their values implicitly. Explicit bounds
        // may narrow the implicit ones, but never widen them.
        if let Some(highest) = self.highest {
            if let Some(max_ex) = max_ex {
                if max_ex > highest as f64 {
                    return Err(vec![ParamError(format!(
                        "maxExclusive cannot be greater than {highest}"
                    ))]);
                }
                ret.max_inclusive = None;
            } else if let Some(max_in) = max_in {
                if max_in > highest as f64 {
                    return Err(vec![ParamError(format!(
                        "maxInclusive cannot be greater than {highest}"
                    ))]);
                }
            }
        }
        if let Some(lowest) = self.lowest {
            if let Some(min_ex) = min_ex {
                if min_ex < lowest as f64 {
                    return Err(vec![ParamError(format!(
                        "minExclusive cannot be lower than {lowest}"
                    ))]);
                }
                ret.min_inclusive = None;
            } else if let Some(min_in) = min_in {
                if min_in < lowest as f64 {
                    return Err(vec![ParamError(format!(
                        "minInclusive cannot be lower than {lowest}"
                    ))]);
                }
            }
        }
        if min_inclusive.is_some() {
            ret.min_inclusive = min_inclusive;
        }
        if max_inclusive.is_some() {
            ret.max_inclusive = max_inclusive;
        }
        Ok(ret)
    }

    fn parse_value(
        &self,
        value: &str,
        context: Option<&NameResolver>,
    ) -> Result<ParsedValue, Vec<ValueError>> {
        if let Some(errors) = self.disallows(value, &self.default_params(), context) {
            return Err(errors);
        }
        self.convert(&self.normalize(value), value, context)
    }

    fn equal(
        &self,
        value: &str,
        schema_value: &ParsedValue,
        context: Option<&NameResolver>,
    ) -> bool {
        let normalized = self.normalize(value);
        (self.lexical)(&normalized)
            && self
                .convert(&normalized, value, context)
                .is_ok_and(|value| value == *schema_value)
    }

    fn disallows(
        &self,
        value: &str,
        params: &ParsedParams,
        context: Option<&NameResolver>,
    ) -> Option<Vec<ValueError>> {
        let normalized = self.normalize(value);
        if !(self.lexical)(&normalized) {
            return Some(vec![ValueError(self.type_error_msg.to_owned())]);
        }
        if let Err(errors) = self.convert(&normalized, value, context) {
            return Some(errors);
        }
        let errors = self.disallowed_by_params(&normalized, params);
        (!errors.is_empty()).then_some(errors)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn datatype(name: &str) -> Arc<dyn Datatype> {
        XMLSchemaDatatypeLibrary.get(name).unwrap()
    }

    fn params(list: &[(&str, &str)]) -> Vec<Param> {
        list.iter().map(|&(n, v)| Param::new(n, v)).collect()
    }

    fn allows(name: &str, value: &str) -> bool {
        let ty = datatype(name);
        let params = ty.parse_params(&[]).unwrap();
        ty.disallows(value, &params, None).is_none()
    }

    #[rstest]
    #[case("string", " a\tb ", true)]
    #[case("normalizedString", "a\tb", true)]
    #[case("token", "  a   b  ", true)]
    #[case("language", "en-US", true)]
    #[case("language", "english-language", false)]
    #[case("Name", "a:b", true)]
    #[case("Name", "1a", false)]
    #[case("NCName", "a:b", false)]
    #[case("NMTOKEN", "123", true)]
    #[case("NMTOKENS", " a  b c ", true)]
    #[case("NMTOKENS", "", false)]
    #[case("IDREFS", "a b", true)]
    #[case("IDREFS", "a 1", false)]
    #[case("decimal", "-1.5", true)]
    #[case("decimal", "+.5", true)]
    #[case("decimal", "5.", true)]
    #[case("decimal", ".", false)]
    #[case("decimal", "1e5", false)]
    #[case("integer", "  42 ", true)]
    #[case("integer", "4.0", false)]
    #[case("integer", "", false)]
    #[case("nonPositiveInteger", "0", true)]
    #[case("nonPositiveInteger", "1", false)]
    #[case("negativeInteger", "0", false)]
    #[case("positiveInteger", "1", true)]
    #[case("positiveInteger", "0", false)]
    #[case("byte", "-128", true)]
    #[case("byte", "128", false)]
    #[case("unsignedByte", "255", true)]
    #[case("unsignedByte", "-1", false)]
    #[case("boolean", "true", true)]
    #[case("boolean", "yes", false)]
    #[case("base64Binary", "AAEC", true)]
    #[case("base64Binary", "AAE=", true)]
    #[case("base64Binary", "AAE", false)]
    #[case("hexBinary", "0aFF", true)]
    #[case("hexBinary", "0aF", false)]
    #[case("float", "-INF", true)]
    #[case("double", "1.5e-3", true)]
    #[case("double", "NaN", true)]
    #[case("double", "inf", false)]
    #[case("duration", "P1Y2M", true)]
    #[case("duration", "P", false)]
    #[case("dateTime", "2001-10-26T21:32:52Z", true)]
    #[case("dateTime", "2001-02-29T21:32:52", false)]
    #[case("date", "2000-02-29", true)]
    #[case("time", "24:00:00", true)]
    #[case("gYearMonth", "2001-12", true)]
    #[case("gYear", "2001", true)]
    #[case("gMonthDay", "--02-29", true)]
    #[case("gDay", "---31", true)]
    #[case("gMonth", "--13", false)]
    #[case("anyURI", "http://example.com/a?b#c", true)]
    #[case("anyURI", "../relative/path", true)]
    #[case("anyURI", "a b", false)]
    #[case("anyURI", "%zz", false)]
    fn lexical_space_test(#[case] name: &str, #[case] value: &str, #[case] allowed: bool) {
        assert_eq!(allows(name, value), allowed, "{name}: {value:?}");
    }

    #[test]
    fn integer_implicit_bounds_test() {
        let byte = datatype("byte");
        let errors = byte
            .disallows("200", &byte.parse_params(&[]).unwrap(), None)
            .unwrap();
        assert_eq!(errors, [ValueError("value must be less than or equal to 127".into())]);

        let errors = byte
            .parse_params(&params(&[("maxExclusive", "1000")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [ParamError("value must be less than or equal to 127".into())]
        );

        let params = byte.parse_params(&params(&[("maxExclusive", "10")])).unwrap();
        assert!(params.max_inclusive.is_none());
        assert!(byte.disallows("9", &params, None).is_none());
        assert!(byte.disallows("10", &params, None).is_some());
        assert!(byte.disallows("-128", &params, None).is_none());
        assert!(byte.disallows("-129", &params, None).is_some());
    }

    #[test]
    fn param_error_test() {
        let string = datatype("string");
        let errors = string
            .parse_params(&params(&[("foo", "1"), ("length", "-1")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [
                ParamError("unexpected parameter: foo".into()),
                ParamError("length must have a non-negative integer value".into()),
            ]
        );

        let errors = string
            .parse_params(&params(&[("length", "1"), ("length", "2")]))
            .unwrap_err();
        assert_eq!(errors, [ParamError("cannot repeat parameter length".into())]);

        let errors = string
            .parse_params(&params(&[("minLength", "3"), ("maxLength", "2")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [ParamError(
                "minLength must be less than or equal to maxLength".into()
            )]
        );

        let errors = string
            .parse_params(&params(&[("length", "3"), ("maxLength", "4")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [ParamError("length and maxLength cannot appear together".into())]
        );

        let decimal = datatype("decimal");
        let errors = decimal
            .parse_params(&params(&[("minInclusive", "5"), ("maxInclusive", "1")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [ParamError(
                "minInclusive must be less than or equal to maxInclusive".into()
            )]
        );
        let errors = decimal
            .parse_params(&params(&[("totalDigits", "0")]))
            .unwrap_err();
        assert_eq!(
            errors,
            [ParamError("totalDigits must have a positive value".into())]
        );
        assert!(decimal.parse_params(&params(&[("length", "1")])).is_err());
    }

    #[test]
    fn facet_test() {
        let string = datatype("string");
        let p = string
            .parse_params(&params(&[("minLength", "2"), ("maxLength", "3")]))
            .unwrap();
        assert!(string.disallows("ab", &p, None).is_none());
        assert_eq!(
            string.disallows("a", &p, None).unwrap(),
            [ValueError(
                "length of value should be greater than or equal to 2".into()
            )]
        );

        // every pattern must match
        let token = datatype("token");
        let p = token
            .parse_params(&params(&[("pattern", "[a-z]+"), ("pattern", "a.*")]))
            .unwrap();
        assert!(token.disallows("abc", &p, None).is_none());
        assert_eq!(
            token.disallows("bc", &p, None).unwrap(),
            [ValueError("value does not match the pattern a.*".into())]
        );

        let decimal = datatype("decimal");
        let p = decimal
            .parse_params(&params(&[("totalDigits", "4"), ("fractionDigits", "2")]))
            .unwrap();
        assert!(decimal.disallows("12.50", &p, None).is_none());
        assert!(decimal.disallows("0012.5", &p, None).is_none());
        assert_eq!(
            decimal.disallows("1.234", &p, None).unwrap(),
            [
                ValueError("value must have at most 2 fraction digits".into())
            ]
        );
        assert_eq!(
            decimal.disallows("123.45", &p, None).unwrap(),
            [ValueError("value must have at most 4 digits".into())]
        );

        let p = decimal
            .parse_params(&params(&[("minExclusive", "0"), ("maxInclusive", "10")]))
            .unwrap();
        assert_eq!(
            decimal.disallows("0", &p, None).unwrap(),
            [ValueError("value must be greater than 0".into())]
        );
        assert!(decimal.disallows("10", &p, None).is_none());

        let hex = datatype("hexBinary");
        let p = hex.parse_params(&params(&[("length", "2")])).unwrap();
        assert!(hex.disallows("0AFF", &p, None).is_none());
        assert!(hex.disallows("0A", &p, None).is_some());

        let base64 = datatype("base64Binary");
        let p = base64.parse_params(&params(&[("length", "2")])).unwrap();
        assert!(base64.disallows("AAE=", &p, None).is_none());

        let nmtokens = datatype("NMTOKENS");
        let p = nmtokens.parse_params(&params(&[("length", "2")])).unwrap();
        assert!(nmtokens.disallows("a  b", &p, None).is_none());
    }

    #[test]
    fn invalid_pattern_param_test() {
        let string = datatype("string");
        assert!(string.parse_params(&params(&[("pattern", "[a")])).is_err());
        assert!(
            string
                .parse_params(&params(&[("pattern", r"\p{IsBasicLatin}")]))
                .is_err()
        );
    }

    #[test]
    fn equality_test() {
        let decimal = datatype("decimal");
        let v = decimal.parse_value("1.0", None).unwrap();
        assert!(decimal.equal("1", &v, None));
        assert!(decimal.equal(" 01.00 ", &v, None));
        assert!(!decimal.equal("1.1", &v, None));
        assert!(!decimal.equal("abc", &v, None));

        let boolean = datatype("boolean");
        let v = boolean.parse_value("true", None).unwrap();
        assert!(boolean.equal("1", &v, None));
        assert!(!boolean.equal("0", &v, None));

        let hex = datatype("hexBinary");
        let v = hex.parse_value("0aff", None).unwrap();
        assert!(hex.equal("0AFF", &v, None));

        assert!(decimal.parse_value("abc", None).is_err());
    }

    #[test]
    fn qname_test() {
        let qname = datatype("QName");
        assert!(qname.needs_context());

        let mut resolver = NameResolver::new();
        resolver.enter_context();
        resolver.define_prefix("x", "urn:x").unwrap();
        let v = qname.parse_value("x:a", Some(&resolver)).unwrap();
        assert_eq!(v, ParsedValue::String("{urn:x}a".into()));

        let mut other = NameResolver::new();
        other.enter_context();
        other.define_prefix("y", "urn:x").unwrap();
        assert!(qname.equal("y:a", &v, Some(&other)));
        assert!(!qname.equal("x:a", &v, Some(&other)));

        let errors = qname
            .disallows("z:a", &ParsedParams::default(), Some(&resolver))
            .unwrap();
        assert_eq!(errors, [ValueError("cannot resolve the name z:a".into())]);
    }
}
