/// Lexical rules of the target language (Python 3)

/// Hard keywords; none of them may be used as a name.
pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

pub const BINARY_OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "//", "%", "**", "==", "!=", "<", "<=", ">", ">=", "and", "or", "in",
    "not in", "is", "is not", "&", "|", "^", "<<", ">>",
];

pub const UNARY_OPERATORS: &[&str] = &["-", "+", "~", "not"];

pub const AUGMENTED_OPERATORS: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", "&=", "|=", "^=", "<<=", ">>=",
];

/// ASCII identifier grammar `[A-Za-z_][A-Za-z0-9_]*`, keywords excluded.
///
/// Python accepts a wider Unicode set, but the narrower rule keeps emitted
/// names unambiguous after NFKC normalisation.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = match chars.next() {
        Some(c) => c == '_' || c.is_ascii_alphabetic(),
        None => false,
    };
    first_ok
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        && !KEYWORDS.contains(&name)
}

/// Quote `s` as a double-quoted Python string literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            // C1 controls and line/paragraph separators
            c if (0x80..0xa0).contains(&(c as u32)) || c == '\u{2028}' || c == '\u{2029}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Format a float so Python reads back the same value; `None` for NaN/inf.
pub fn format_float(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    // Debug keeps a trailing ".0" for integral values and uses exponent form
    // for very large/small magnitudes, both valid Python float syntax.
    Some(format!("{:?}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_grammar() {
        for ok in ["x", "_", "_private", "print", "a1", "CamelCase", "match", "case"] {
            assert!(is_valid_identifier(ok), "{ok} should be valid");
        }
        for bad in ["", "1a", "a-b", "a b", "a.b", "é", "None", "def", "x;import os", "a\n"] {
            assert!(!is_valid_identifier(bad), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn test_quote_string_escapes() {
        assert_eq!(quote_string("hi"), "\"hi\"");
        assert_eq!(quote_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(quote_string("back\\slash"), "\"back\\\\slash\"");
        assert_eq!(quote_string("line\nbreak"), "\"line\\nbreak\"");
        assert_eq!(quote_string("\0"), "\"\\x00\"");
        assert_eq!(quote_string("\u{2028}"), "\"\\u2028\"");
        assert_eq!(quote_string("héllo"), "\"héllo\"");
    }

    #[test]
    fn test_quoted_string_never_contains_raw_newline() {
        let nasty = "\"\"\"\n')\nimport os\r\n#";
        let quoted = quote_string(nasty);
        assert!(!quoted.contains('\n'));
        assert!(!quoted.contains('\r'));
        assert!(quoted.starts_with('"') && quoted.ends_with('"'));
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0).as_deref(), Some("1.0"));
        assert_eq!(format_float(0.5).as_deref(), Some("0.5"));
        assert_eq!(format_float(-2.25).as_deref(), Some("-2.25"));
        assert_eq!(format_float(f64::NAN), None);
        assert_eq!(format_float(f64::INFINITY), None);
    }
}
