//! Translate the regular expressions described in
//! [XML Schema Part 2: Datatypes Second Edition Appendix F Regular Expressions](https://www.w3.org/TR/xmlschema-2/#regexs)
//! into the syntax of the [`regex`] crate.
//!
//! XML Schema regular expressions are implicitly anchored at both ends and have no
//! metacharacters for anchors, so `^` and `$` are ordinary characters.

use regex::Regex;

use crate::xmlchar::{NAME_CHAR_CLASS, NAME_START_CHAR_CLASS};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegexpError {
    SyntaxError,
    TooLargeQuantity,
    InvalidQuantifier,
    InvalidCharacter,
    InvalidCharRange,
    InvalidCharProp,
    UnsupportedBlock(String),
    Compile(String),
}

impl std::fmt::Display for RegexpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SyntaxError => write!(f, "syntax error"),
            Self::TooLargeQuantity => write!(f, "too large quantity"),
            Self::InvalidQuantifier => write!(f, "invalid quantifier"),
            Self::InvalidCharacter => write!(f, "invalid character"),
            Self::InvalidCharRange => write!(f, "invalid character range"),
            Self::InvalidCharProp => write!(f, "invalid character property"),
            Self::UnsupportedBlock(block) => write!(f, "unsupported block: {block}"),
            Self::Compile(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for RegexpError {}

/// Translate `regexp` and compile the result.
pub fn compile(regexp: &str) -> Result<Regex, RegexpError> {
    let translated = translate(regexp)?;
    Regex::new(&translated).map_err(|err| RegexpError::Compile(err.to_string()))
}

/// Translate `regexp` into an anchored pattern for [`Regex`].
pub fn translate(mut regexp: &str) -> Result<String, RegexpError> {
    let body = parse_regexp(&mut regexp, false)?;
    Ok(format!("^(?:{body})$"))
}

/// [1] regExp ::= branch ( '|' branch )*
fn parse_regexp(regexp: &mut &str, inner: bool) -> Result<String, RegexpError> {
    let mut res = parse_branch(regexp)?;
    while let Some(rem) = regexp.strip_prefix('|') {
        *regexp = rem;
        res.push('|');
        res.push_str(&parse_branch(regexp)?);
    }

    if inner {
        let rem = regexp.strip_prefix(')').ok_or(RegexpError::SyntaxError)?;
        *regexp = rem;
        Ok(res)
    } else if !regexp.is_empty() {
        Err(RegexpError::SyntaxError)
    } else {
        Ok(res)
    }
}

/// [2] branch ::= piece*
fn parse_branch(regexp: &mut &str) -> Result<String, RegexpError> {
    let mut ret = String::new();
    while !regexp.starts_with([')', '|']) && !regexp.is_empty() {
        ret.push_str(&parse_piece(regexp)?);
    }
    Ok(ret)
}

/// [3] piece ::= atom quantifier?
fn parse_piece(regexp: &mut &str) -> Result<String, RegexpError> {
    let mut atom = parse_atom(regexp)?;
    atom.push_str(&parse_quantifier(regexp)?);
    Ok(atom)
}

/// [4] quantifier ::= [?*+] | ( '{' quantity '}' )
fn parse_quantifier(regexp: &mut &str) -> Result<String, RegexpError> {
    match regexp.as_bytes() {
        [c @ (b'?' | b'*' | b'+'), ..] => {
            *regexp = &regexp[1..];
            Ok((*c as char).to_string())
        }
        [b'{', ..] => {
            *regexp = &regexp[1..];
            let quantity = parse_quantity(regexp)?;
            let rem = regexp.strip_prefix('}').ok_or(RegexpError::SyntaxError)?;
            *regexp = rem;
            Ok(format!("{{{quantity}}}"))
        }
        _ => Ok(String::new()),
    }
}

/// [5] quantity ::= quantRange | quantMin | QuantExact
fn parse_quantity(regexp: &mut &str) -> Result<String, RegexpError> {
    fn parse_number(regexp: &mut &str) -> Result<usize, RegexpError> {
        let pos = regexp
            .bytes()
            .position(|c| !c.is_ascii_digit())
            .unwrap_or(regexp.len());
        if pos == 0 {
            return Err(RegexpError::SyntaxError);
        }
        let n = regexp[..pos]
            .parse::<usize>()
            .or(Err(RegexpError::TooLargeQuantity))?;
        *regexp = &regexp[pos..];
        Ok(n)
    }

    let p = parse_number(regexp)?;
    let Some(rem) = regexp.strip_prefix(',') else {
        return Ok(p.to_string());
    };
    *regexp = rem;
    if regexp.starts_with('}') {
        return Ok(format!("{p},"));
    }
    let q = parse_number(regexp)?;
    if p > q {
        return Err(RegexpError::InvalidQuantifier);
    }
    Ok(format!("{p},{q}"))
}

/// [9] atom ::= Char | charClass | ( '(' regExp ')' )
fn parse_atom(regexp: &mut &str) -> Result<String, RegexpError> {
    match regexp.as_bytes() {
        [] => Err(RegexpError::SyntaxError),
        [b'(', ..] => {
            *regexp = &regexp[1..];
            Ok(format!("(?:{})", parse_regexp(regexp, true)?))
        }
        // [12] charClassExpr ::= '[' charGroup ']'
        [b'[', ..] => {
            *regexp = &regexp[1..];
            let ret = parse_char_group(regexp)?;
            let rem = regexp.strip_prefix(']').ok_or(RegexpError::SyntaxError)?;
            *regexp = rem;
            Ok(ret)
        }
        // [37a] WildcardEsc ::= '.'
        [b'.', ..] => {
            *regexp = &regexp[1..];
            Ok(r"[^\n\r]".to_owned())
        }
        [b'\\', ..] => {
            let item = parse_char_class_esc(regexp)?;
            Ok(item.into_regex())
        }
        // [10] Char ::= [^.\?*+()|#x5B#x5D]
        [b'?' | b'*' | b'+' | b')' | b'|' | b']', ..] => Err(RegexpError::InvalidCharacter),
        _ => {
            let c = regexp.chars().next().ok_or(RegexpError::SyntaxError)?;
            *regexp = &regexp[c.len_utf8()..];
            Ok(escape_char(c))
        }
    }
}

fn escape_char(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0; 4]))
}

/// A piece of a character class.
enum ClassItem {
    /// Text that is valid both inside and outside of brackets, such as `\p{Lu}`.
    Escape(String),
    /// A bracketed class, such as `[^ \t\n\r]`. It may be nested in another class.
    Bracketed(String),
    /// A single character.
    Char(char),
}

impl ClassItem {
    fn into_regex(self) -> String {
        match self {
            Self::Escape(s) | Self::Bracketed(s) => s,
            Self::Char(c) => escape_char(c),
        }
    }
}

/// [23] charClassEsc ::= ( SingleCharEsc | MultiCharEsc | catEsc | complEsc )
fn parse_char_class_esc(regexp: &mut &str) -> Result<ClassItem, RegexpError> {
    let bytes = regexp.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'\\' {
        return Err(RegexpError::SyntaxError);
    }
    let ret = match bytes[1] {
        // [24] SingleCharEsc ::= '\' [nrt\|.?*+(){}#x2D#x5B#x5D#x5E]
        b'n' => ClassItem::Char('\n'),
        b'r' => ClassItem::Char('\r'),
        b't' => ClassItem::Char('\t'),
        c @ (b'\\' | b'|' | b'.' | b'?' | b'*' | b'+' | b'(' | b')' | b'{' | b'}' | b'-'
        | b'[' | b']' | b'^') => ClassItem::Char(c as char),
        // [37] MultiCharEsc ::= '\' [sSiIcCdDwW]
        b's' => ClassItem::Bracketed(r"[ \t\n\r]".to_owned()),
        b'S' => ClassItem::Bracketed(r"[^ \t\n\r]".to_owned()),
        b'i' => ClassItem::Bracketed(format!("[{NAME_START_CHAR_CLASS}]")),
        b'I' => ClassItem::Bracketed(format!("[^{NAME_START_CHAR_CLASS}]")),
        b'c' => ClassItem::Bracketed(format!("[{NAME_CHAR_CLASS}]")),
        b'C' => ClassItem::Bracketed(format!("[^{NAME_CHAR_CLASS}]")),
        b'd' => ClassItem::Escape(r"\p{Nd}".to_owned()),
        b'D' => ClassItem::Escape(r"\P{Nd}".to_owned()),
        b'w' => ClassItem::Bracketed(r"[^\p{P}\p{Z}\p{C}]".to_owned()),
        b'W' => ClassItem::Bracketed(r"[\p{P}\p{Z}\p{C}]".to_owned()),
        // [25] catEsc ::= '\p{' charProp '}'
        // [26] complEsc ::= '\P{' charProp '}'
        c @ (b'p' | b'P') => {
            *regexp = &regexp[2..];
            let prop = parse_char_prop(regexp)?;
            return Ok(ClassItem::Escape(format!("\\{}{{{prop}}}", c as char)));
        }
        _ => return Err(RegexpError::InvalidCharacter),
    };
    *regexp = &regexp[2..];
    Ok(ret)
}

/// [27] charProp ::= IsCategory | IsBlock
///
/// `regexp` starts with `{`. Return the name of the category.
fn parse_char_prop(regexp: &mut &str) -> Result<String, RegexpError> {
    let rem = regexp.strip_prefix('{').ok_or(RegexpError::SyntaxError)?;
    let end = rem.find('}').ok_or(RegexpError::SyntaxError)?;
    let prop = &rem[..end];
    *regexp = &rem[end + 1..];

    if let Some(block) = prop.strip_prefix("Is") {
        // [35] IsBlock ::= 'Is' [a-zA-Z0-9#x2D]+
        if block.is_empty()
            || !block
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return Err(RegexpError::InvalidCharProp);
        }
        return Err(RegexpError::UnsupportedBlock(block.to_owned()));
    }

    // [29] Categories ::= Letters | Marks | Numbers | Punctuation | Separators | Symbols | Others
    match prop {
        "L" | "Lu" | "Ll" | "Lt" | "Lm" | "Lo" | "M" | "Mn" | "Mc" | "Me" | "N" | "Nd" | "Nl"
        | "No" | "P" | "Pc" | "Pd" | "Ps" | "Pe" | "Pi" | "Pf" | "Po" | "Z" | "Zs" | "Zl"
        | "Zp" | "S" | "Sm" | "Sc" | "Sk" | "So" | "C" | "Cc" | "Cf" | "Co" | "Cn" => {
            Ok(prop.to_owned())
        }
        _ => Err(RegexpError::InvalidCharProp),
    }
}

/// [13] charGroup    ::= posCharGroup | negCharGroup | charClassSub
/// [15] negCharGroup ::= '^' posCharGroup
/// [16] charClassSub ::= ( posCharGroup | negCharGroup ) '-' charClassExpr
///
/// Return a bracketed class.
fn parse_char_group(regexp: &mut &str) -> Result<String, RegexpError> {
    let mut negation = false;
    if let Some(rem) = regexp.strip_prefix('^') {
        *regexp = rem;
        negation = true;
    }

    let members = parse_pos_char_group(regexp)?;
    let group = if negation {
        format!("[^{members}]")
    } else {
        format!("[{members}]")
    };

    if let Some(rem) = regexp.strip_prefix("-[") {
        *regexp = rem;
        let sub = parse_char_group(regexp)?;
        let rem = regexp.strip_prefix(']').ok_or(RegexpError::SyntaxError)?;
        *regexp = rem;
        Ok(format!("[{group}--{sub}]"))
    } else {
        Ok(group)
    }
}

/// [14] posCharGroup ::= ( charRange | charClassEsc )+
fn parse_pos_char_group(regexp: &mut &str) -> Result<String, RegexpError> {
    let mut members = String::new();
    let mut first = true;
    loop {
        match regexp.as_bytes() {
            [] => return Err(RegexpError::SyntaxError),
            [b']', ..] | [b'-', b'[', ..] => break,
            // A hyphen is a literal only at the beginning or at the end of a group.
            //
            // [22] XmlCharIncDash ::= [^\#x5B#x5D]
            [b'-', rest @ ..] => {
                if !first && !matches!(rest, [b']', ..]) {
                    return Err(RegexpError::SyntaxError);
                }
                *regexp = &regexp[1..];
                members.push_str(r"\-");
            }
            [b'[', ..] => return Err(RegexpError::InvalidCharacter),
            _ => members.push_str(&parse_char_range(regexp)?),
        }
        first = false;
    }
    if members.is_empty() {
        return Err(RegexpError::SyntaxError);
    }
    Ok(members)
}

/// [17] charRange ::= seRange | XmlCharIncDash
/// [18] seRange   ::= charOrEsc '-' charOrEsc
fn parse_char_range(regexp: &mut &str) -> Result<String, RegexpError> {
    let start = parse_char_or_esc(regexp)?;
    let ClassItem::Char(start) = start else {
        return Ok(start.into_regex());
    };

    // "-[" begins a subtraction and "-]" ends the group with a literal hyphen.
    if !regexp.starts_with('-') || regexp.starts_with("-[") || regexp.starts_with("-]") {
        return Ok(escape_char(start));
    }
    *regexp = &regexp[1..];

    let ClassItem::Char(end) = parse_char_or_esc(regexp)? else {
        return Err(RegexpError::InvalidCharRange);
    };
    if start > end {
        return Err(RegexpError::InvalidCharRange);
    }
    Ok(format!("{}-{}", escape_char(start), escape_char(end)))
}

/// [20] charOrEsc ::= XmlChar | SingleCharEsc
/// [21] XmlChar   ::= [^\#x2D#x5B#x5D]
fn parse_char_or_esc(regexp: &mut &str) -> Result<ClassItem, RegexpError> {
    if regexp.starts_with('\\') {
        return parse_char_class_esc(regexp);
    }
    let c = regexp.chars().next().ok_or(RegexpError::SyntaxError)?;
    if matches!(c, '-' | '[' | ']') {
        return Err(RegexpError::InvalidCharacter);
    }
    *regexp = &regexp[c.len_utf8()..];
    Ok(ClassItem::Char(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_match(regexp: &str, input: &str) -> bool {
        compile(regexp).unwrap().is_match(input)
    }

    #[test]
    fn anchoring_test() {
        assert!(is_match("abc", "abc"));
        assert!(!is_match("abc", "xabc"));
        assert!(!is_match("abc", "abcx"));
        assert!(is_match("", ""));
        assert!(!is_match("", "a"));
        // '^' and '$' are not metacharacters
        assert!(is_match("^a$", "^a$"));
        assert!(!is_match("^a$", "a"));
    }

    #[test]
    fn quantifier_test() {
        assert!(is_match("a{2,3}", "aaa"));
        assert!(!is_match("a{2,3}", "aaaa"));
        assert!(is_match("a{2,}", "aaaaa"));
        assert!(is_match("(ab)+", "abab"));
        assert!(is_match("a|b", "b"));
        assert!(compile("a{3,2}").is_err());
        assert!(compile("a{").is_err());
        assert!(compile("(a").is_err());
        assert!(compile("a)").is_err());
    }

    #[test]
    fn char_class_test() {
        assert!(is_match("[a-c]+", "abcabc"));
        assert!(!is_match("[a-c]+", "abd"));
        assert!(is_match("[^a-c]", "d"));
        assert!(is_match("[a-z-[aeiou]]+", "bcd"));
        assert!(!is_match("[a-z-[aeiou]]+", "bad"));
        assert!(is_match("[-a]", "-"));
        assert!(is_match("[a-]", "-"));
        assert!(is_match(r"[\-\]]", "]"));
        assert!(compile("[z-a]").is_err());
        assert!(compile("[]").is_err());
        assert!(compile("[a").is_err());
    }

    #[test]
    fn escape_test() {
        assert!(is_match(r"\d+", "0123"));
        assert!(!is_match(r"\d", "a"));
        assert!(is_match(r"\s\S", " a"));
        assert!(is_match(r"\i\c*", "_foo-1.x"));
        assert!(!is_match(r"\i\c*", "1foo"));
        assert!(is_match(r"\p{Lu}\P{Lu}", "Ab"));
        assert!(is_match(r"[\p{Lu}\d]+", "A1B2"));
        assert!(is_match(r"\.\*", ".*"));
        assert!(is_match(r"a.c", "abc"));
        assert!(!is_match(r"a.c", "a\nc"));
        assert!(compile(r"\q").is_err());
        assert!(compile(r"\p{Xx}").is_err());
        assert_eq!(
            compile(r"\p{IsBasicLatin}").unwrap_err(),
            RegexpError::UnsupportedBlock("BasicLatin".to_owned())
        );
    }
}
