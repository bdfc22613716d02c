//! Literal coercion for the value side of a condition

use regex::Regex;

use crate::value::Value;

lazy_static::lazy_static! {
    static ref INTEGER_REGEX: Regex = Regex::new(r"^[+-]?\d+$").unwrap();
    static ref FLOAT_REGEX: Regex = Regex::new(
        r"^[+-]?(?:\d+\.\d*|\.\d+)(?:[eE][+-]?\d+)?$"
    ).unwrap();
    // Unquoted :name tokens become placeholders bound at compile time
    pub(crate) static ref PARAMETER_REGEX: Regex = Regex::new(r"^:[A-Za-z_]\w*$").unwrap();
    // Unquoted values are single tokens: words, numbers, dates, like patterns
    static ref BARE_REGEX: Regex = Regex::new(r"^[\w.:+%@/-]+$").unwrap();
}

/// Coerce a single literal token.
///
/// Order matters: a parenthesized list wins over everything, quoted strings
/// keep their content verbatim, then booleans, null and numbers are tried
/// before falling back to the raw text. Only an unquoted `:name` becomes a
/// parameter placeholder, `':name'` stays a string.
pub fn parse_literal(s: &str) -> Value {
    let s = s.trim();

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        return Value::Array(parse_list_items(&s[1..s.len() - 1]));
    }

    if let Some(unquoted) = strip_quotes(s) {
        return Value::String(unquoted.to_string());
    }

    if s.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if s.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if s.eq_ignore_ascii_case("null") {
        return Value::Null;
    }

    if INTEGER_REGEX.is_match(s) {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        // Too wide for i64, keep the magnitude
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    }

    if FLOAT_REGEX.is_match(s) {
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
    }

    if PARAMETER_REGEX.is_match(s) {
        return Value::Parameter(s[1..].to_string());
    }

    Value::String(s.to_string())
}

/// True when `s` is one literal: a quoted string, a parenthesized list of
/// literals, or a single unquoted token
pub fn is_well_formed(s: &str) -> bool {
    let s = s.trim();

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        return split_list_items(&s[1..s.len() - 1]).iter().all(|item| is_well_formed(item));
    }

    if let Some(unquoted) = strip_quotes(s) {
        return !unquoted.contains(&s[..1]);
    }

    BARE_REGEX.is_match(s)
}

/// Coerce a comma separated list, e.g. the inside of `IN (...)`
pub fn parse_list_items(s: &str) -> Vec<Value> {
    split_list_items(s).iter().map(|item| parse_literal(item)).collect()
}

/// Split on commas outside quotes, dropping blank items
pub fn split_list_items(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    if !current.trim().is_empty() {
                        items.push(current.trim().to_string());
                    }
                    current.clear();
                }
                _ => current.push(c),
            },
        }
    }

    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }

    items
}

fn strip_quotes(s: &str) -> Option<&str> {
    if s.len() < 2 {
        return None;
    }
    for quote in ['"', '\''] {
        if s.starts_with(quote) && s.ends_with(quote) {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(parse_literal("TRUE"), Value::Bool(true));
        assert_eq!(parse_literal("false"), Value::Bool(false));
        assert_eq!(parse_literal("Null"), Value::Null);
        assert_eq!(parse_literal("-42"), Value::Int(-42));
        assert_eq!(parse_literal("19.99"), Value::Float(19.99));
        assert_eq!(parse_literal(".5"), Value::Float(0.5));
        assert_eq!(parse_literal("active"), Value::from("active"));
    }

    #[test]
    fn test_quoted_strings_keep_content() {
        assert_eq!(parse_literal("'hello world'"), Value::from("hello world"));
        assert_eq!(parse_literal("\"10\""), Value::from("10"));
        assert_eq!(parse_literal("'true'"), Value::from("true"));
        assert_eq!(parse_literal("''"), Value::from(""));
    }

    #[test]
    fn test_only_unquoted_tokens_are_parameters() {
        assert_eq!(parse_literal(":status"), Value::parameter("status"));
        assert_eq!(parse_literal("':status'"), Value::from(":status"));
        assert_eq!(parse_literal("\":vip\""), Value::from(":vip"));
        assert_eq!(parse_literal(":9lives"), Value::from(":9lives"));
        assert_eq!(
            parse_literal("(:a, ':b')"),
            Value::Array(vec![Value::parameter("a"), Value::from(":b")])
        );
        assert!(PARAMETER_REGEX.is_match(":min_price"));
        assert!(!PARAMETER_REGEX.is_match(":9lives"));
    }

    #[test]
    fn test_list_coercion() {
        assert_eq!(
            parse_literal("(\"a\", 'b,c', 3, true)"),
            Value::Array(vec![
                Value::from("a"),
                Value::from("b,c"),
                Value::Int(3),
                Value::Bool(true),
            ])
        );
        assert_eq!(parse_literal("()"), Value::Array(vec![]));
    }

    #[test]
    fn test_well_formed_literals() {
        let accepted = [
            "10", "-1.5e3", "orange", "%shirt%", "2024-01-31", ":brand", "'a b'", "(1, 'x y', :p)", "()",
        ];
        for value in accepted {
            assert!(is_well_formed(value), "'{}' should be accepted", value);
        }
        for value in ["10 AND", "10 20", "red blue", "'a' 'b'", "(1, 2 3)", "x)", ""] {
            assert!(!is_well_formed(value), "'{}' should be rejected", value);
        }
    }
}
