//! Character classes of XML 1.0 and the whitespace normalizations built on them.

/// ```text
/// // XML 1.0
/// [3] S ::= (#x20 | #x9 | #xD | #xA)+
/// ```
pub fn is_whitespace(c: char) -> bool {
    matches!(c, '\x20' | '\x09' | '\x0D' | '\x0A')
}

/// Check if `s` consists only of whitespaces. An empty string satisfies this.
pub fn is_whitespace_only(s: &str) -> bool {
    s.chars().all(is_whitespace)
}

/// ```text
/// // XML 1.0
/// [4] NameStartChar ::= ":" | [A-Z] | "_" | [a-z] | [#xC0-#xD6] | [#xD8-#xF6] | [#xF8-#x2FF]
///                     | [#x370-#x37D] | [#x37F-#x1FFF] | [#x200C-#x200D] | [#x2070-#x218F]
///                     | [#x2C00-#x2FEF] | [#x3001-#xD7FF] | [#xF900-#xFDCF] | [#xFDF0-#xFFFD]
///                     | [#x10000-#xEFFFF]
/// ```
pub fn is_name_start_char(c: char) -> bool {
    matches!(c as u32,
        0x3A // ':'
        | 0x41..=0x5A // 'A'..='Z'
        | 0x5F // '_'
        | 0x61..=0x7A // 'a'..='z'
        | 0xC0..=0xD6
        | 0xD8..=0xF6
        | 0xF8..=0x2FF
        | 0x370..=0x37D
        | 0x37F..=0x1FFF
        | 0x200C..=0x200D
        | 0x2070..=0x218F
        | 0x2C00..=0x2FEF
        | 0x3001..=0xD7FF
        | 0xF900..=0xFDCF
        | 0xFDF0..=0xFFFD
        | 0x10000..=0xEFFFF
    )
}

/// ```text
/// // XML 1.0
/// [4a] NameChar ::= NameStartChar | "-" | "." | [0-9] | #xB7 | [#x0300-#x036F] | [#x203F-#x2040]
/// ```
pub fn is_name_char(c: char) -> bool {
    matches!(c as u32,
        0x2D..=0x2E // '-', '.'
        | 0x30..=0x3A // '0'..='9', ':'
        | 0x41..=0x5A // 'A'..='Z'
        | 0x5F // '_'
        | 0x61..=0x7A // 'a'..='z'
        | 0xB7
        | 0xC0..=0xD6
        | 0xD8..=0xF6
        | 0xF8..=0x37D
        | 0x37F..=0x1FFF
        | 0x200C..=0x200D
        | 0x203F..=0x2040
        | 0x2070..=0x218F
        | 0x2C00..=0x2FEF
        | 0x3001..=0xD7FF
        | 0xF900..=0xFDCF
        | 0xFDF0..=0xFFFD
        | 0x10000..=0xEFFFF
    )
}

/// The body of a regular expression character class equivalent to [`is_name_start_char`].
pub(crate) const NAME_START_CHAR_CLASS: &str = r":A-Z_a-z\x{C0}-\x{D6}\x{D8}-\x{F6}\x{F8}-\x{2FF}\x{370}-\x{37D}\x{37F}-\x{1FFF}\x{200C}-\x{200D}\x{2070}-\x{218F}\x{2C00}-\x{2FEF}\x{3001}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFFD}\x{10000}-\x{EFFFF}";
/// The body of a regular expression character class equivalent to [`is_name_char`].
pub(crate) const NAME_CHAR_CLASS: &str = r"\-.0-9:A-Z_a-z\x{B7}\x{C0}-\x{D6}\x{D8}-\x{F6}\x{F8}-\x{37D}\x{37F}-\x{1FFF}\x{200C}-\x{200D}\x{203F}-\x{2040}\x{2070}-\x{218F}\x{2C00}-\x{2FEF}\x{3001}-\x{D7FF}\x{F900}-\x{FDCF}\x{FDF0}-\x{FFFD}\x{10000}-\x{EFFFF}";

/// ```text
/// // XML 1.0
/// [5] Name ::= NameStartChar (NameChar)*
/// ```
pub fn validate_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

/// ```text
/// // XML 1.0
/// [7] Nmtoken ::= (NameChar)+
/// ```
pub fn validate_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// ```text
/// // Namespaces in XML 1.0
/// [4] NCName ::= Name - (Char* ':' Char*) /* An XML Name, minus the ":" */
/// ```
pub fn validate_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c != ':' && is_name_start_char(c))
        && chars.all(|c| c != ':' && is_name_char(c))
}

/// ```text
/// // Namespaces in XML 1.0
/// [7]  QName          ::= PrefixedName | UnprefixedName
/// [8]  PrefixedName   ::= Prefix ':' LocalPart
/// [9]  UnprefixedName ::= LocalPart
/// ```
pub fn validate_qname(s: &str) -> bool {
    match s.split_once(':') {
        Some((prefix, local)) => validate_ncname(prefix) && validate_ncname(local),
        None => validate_ncname(s),
    }
}

/// Replace each tab, carriage return and newline with a space.
pub fn replace_whitespace(s: &str) -> String {
    s.chars()
        .map(|c| if is_whitespace(c) { ' ' } else { c })
        .collect()
}

/// Strip leading and trailing whitespaces and shrink every inner whitespace run to one space.
pub fn collapse_whitespace(s: &str) -> String {
    let mut ret = String::with_capacity(s.len());
    for token in s.split(is_whitespace).filter(|t| !t.is_empty()) {
        if !ret.is_empty() {
            ret.push(' ');
        }
        ret.push_str(token);
    }
    ret
}
