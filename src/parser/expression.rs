//! Expression parser - turns `field <operator> value` strings into conditions
//!
//! A string is either a single condition or a flat list of conditions joined
//! by one combinator (`a = 1 AND b = 2`). Nesting is expressed with builder
//! groups, never inside one string.

use regex::Regex;
use serde::Serialize;

use super::literal::{is_well_formed, parse_literal, split_list_items, PARAMETER_REGEX};
use super::operators::{self, Combinator};
use crate::error::{QueryError, Result};
use crate::value::Value;

lazy_static::lazy_static! {
    // Word operators need whitespace before them and a word boundary after,
    // symbolic ones may touch the field. Longer spellings come first.
    static ref CONDITION_REGEX: Regex = Regex::new(
        r"(?is)^\s*(?P<field>[A-Za-z_][A-Za-z0-9_.]*)(?:\s+(?P<word>is\s+not\s+null|is\s+null|not\s+in|starts\s+with|ends\s+with|like|contains|in)\b|\s*(?P<symbol>>=|<=|<>|!=|==|=|>|<))(?P<value>.*)$"
    ).unwrap();
}

/// One parsed `field <operator> value` condition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedCondition {
    pub field: String,

    /// Normalized operator spelling (see [`operators::normalize`])
    pub operator: String,

    pub value: Value,

    /// The condition text as written
    pub raw: String,
}

/// Result of parsing one expression string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedExpression {
    pub is_compound: bool,

    /// The combinator joining `conditions`, only set for compound expressions
    pub operator: Option<Combinator>,

    pub conditions: Vec<ParsedCondition>,
}

/// A top-level ` AND ` / ` OR ` occurrence
#[derive(Debug, Clone, Copy)]
struct Separator {
    start: usize,
    end: usize,
    combinator: Combinator,
}

/// Parse an expression string.
///
/// Fails on empty input, on conditions without a recognizable operator,
/// field or value, and on strings that mix AND and OR.
pub fn parse(expression: &str) -> Result<ParsedExpression> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(QueryError::parse(expression, "expression is empty"));
    }

    let separators = find_separators(trimmed);
    let combinator = match uniform_combinator(&separators) {
        Ok(combinator) => combinator,
        Err(()) => {
            return Err(QueryError::parse(
                expression,
                "mixing AND and OR in one expression is ambiguous, use a where group to nest conditions",
            ))
        }
    };

    let Some(combinator) = combinator else {
        return Ok(ParsedExpression {
            is_compound: false,
            operator: None,
            conditions: vec![parse_condition(trimmed)?],
        });
    };

    let mut conditions = Vec::with_capacity(separators.len() + 1);
    let mut start = 0;
    for separator in &separators {
        conditions.push(parse_condition(&trimmed[start..separator.start])?);
        start = separator.end;
    }
    conditions.push(parse_condition(&trimmed[start..])?);

    Ok(ParsedExpression {
        is_compound: true,
        operator: Some(combinator),
        conditions,
    })
}

/// True when the expression has top-level separators that all use the same
/// combinator
pub fn is_compound_expression(expression: &str) -> bool {
    matches!(
        uniform_combinator(&find_separators(expression.trim())),
        Ok(Some(_))
    )
}

/// Recognize a `:name` placeholder token
pub fn is_parameter(token: &str) -> bool {
    PARAMETER_REGEX.is_match(token)
}

/// Extract `name` from a `:name` placeholder token
pub fn extract_parameter_name(token: &str) -> Result<String> {
    if !is_parameter(token) {
        return Err(QueryError::InvalidParameterName(token.to_string()));
    }
    Ok(token[1..].to_string())
}

/// Parse one simple condition (no combinators)
fn parse_condition(raw: &str) -> Result<ParsedCondition> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(QueryError::parse(raw, "empty condition"));
    }

    let caps = CONDITION_REGEX
        .captures(raw)
        .ok_or_else(|| QueryError::parse(raw, "expected 'field <operator> value'"))?;

    let field = caps.name("field").map(|m| m.as_str()).unwrap_or_default();
    let operator_text = caps
        .name("word")
        .or_else(|| caps.name("symbol"))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let value_text = caps.name("value").map(|m| m.as_str().trim()).unwrap_or_default();

    if field.is_empty() {
        return Err(QueryError::parse(raw, "missing field"));
    }

    let operator = operators::normalize(operator_text)
        .ok_or_else(|| QueryError::parse(raw, format!("unknown operator '{}'", operator_text)))?;
    let filter_type = operators::filter_type(operator)?;

    let value = if filter_type.is_unary() {
        if !value_text.is_empty() {
            return Err(QueryError::parse(
                raw,
                format!("unexpected value '{}' after '{}'", value_text, operator),
            ));
        }
        Value::Null
    } else if value_text.is_empty() {
        return Err(QueryError::parse(raw, format!("missing value after '{}'", operator)));
    } else if filter_type.takes_list() && !value_text.starts_with('(') {
        let items = split_list_items(value_text);
        if let Some(bad) = items.iter().find(|item| !is_well_formed(item)) {
            return Err(QueryError::parse(raw, format!("malformed list item '{}'", bad)));
        }
        Value::Array(items.iter().map(|item| parse_literal(item)).collect())
    } else if !is_well_formed(value_text) {
        return Err(QueryError::parse(
            raw,
            format!("malformed value '{}', quote values that contain spaces", value_text),
        ));
    } else {
        parse_literal(value_text)
    };

    Ok(ParsedCondition {
        field: field.to_string(),
        operator: operator.to_string(),
        value,
        raw: raw.to_string(),
    })
}

/// `Ok(None)` without separators, `Err` when AND and OR are mixed
fn uniform_combinator(separators: &[Separator]) -> Result<Option<Combinator>, ()> {
    let Some(first) = separators.first() else {
        return Ok(None);
    };
    if separators.iter().all(|s| s.combinator == first.combinator) {
        Ok(Some(first.combinator))
    } else {
        Err(())
    }
}

/// Scan for AND/OR keywords outside quotes and parentheses
fn find_separators(expression: &str) -> Vec<Separator> {
    let mut separators = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut pos = 0;

    while let Some(c) = expression[pos..].chars().next() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            pos += c.len_utf8();
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && c.is_whitespace() => {
                if let Some((len, combinator)) = separator_at(&expression[pos..]) {
                    separators.push(Separator {
                        start: pos,
                        end: pos + len,
                        combinator,
                    });
                    pos += len;
                    continue;
                }
            }
            _ => {}
        }

        pos += c.len_utf8();
    }

    separators
}

/// Match `<ws>AND<ws>` or `<ws>OR<ws>` at the start of `rest`, returning the
/// byte length consumed
fn separator_at(rest: &str) -> Option<(usize, Combinator)> {
    let keyword_start = rest.trim_start();

    for (keyword, combinator) in [("and", Combinator::And), ("or", Combinator::Or)] {
        let Some(candidate) = keyword_start.get(..keyword.len()) else {
            continue;
        };
        if !candidate.eq_ignore_ascii_case(keyword) {
            continue;
        }
        let after = &keyword_start[keyword.len()..];
        if !after.starts_with(char::is_whitespace) {
            continue;
        }
        return Some((rest.len() - after.trim_start().len(), combinator));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_condition() {
        let parsed = parse("stock > 10").unwrap();

        assert!(!parsed.is_compound);
        assert_eq!(parsed.operator, None);
        assert_eq!(parsed.conditions.len(), 1);
        assert_eq!(parsed.conditions[0].field, "stock");
        assert_eq!(parsed.conditions[0].operator, ">");
        assert_eq!(parsed.conditions[0].value, Value::Int(10));
        assert_eq!(parsed.conditions[0].raw, "stock > 10");
    }

    #[test]
    fn test_parse_compound_and() {
        let parsed = parse("active = true AND stock > 0").unwrap();

        assert!(parsed.is_compound);
        assert_eq!(parsed.operator, Some(Combinator::And));
        assert_eq!(parsed.conditions.len(), 2);
        assert_eq!(parsed.conditions[0].field, "active");
        assert_eq!(parsed.conditions[0].operator, "=");
        assert_eq!(parsed.conditions[0].value, Value::Bool(true));
        assert_eq!(parsed.conditions[1].field, "stock");
        assert_eq!(parsed.conditions[1].operator, ">");
        assert_eq!(parsed.conditions[1].value, Value::Int(0));
    }

    #[test]
    fn test_parse_compound_or_counts_conditions() {
        let parsed = parse("a = 1 or b = 2 OR c = 3").unwrap();

        assert_eq!(parsed.operator, Some(Combinator::Or));
        assert_eq!(parsed.conditions.len(), 3);
        assert_eq!(parsed.conditions[2].field, "c");
    }

    #[test]
    fn test_parse_in_list() {
        let parsed = parse("status IN (\"a\",\"b\")").unwrap();

        assert!(!parsed.is_compound);
        assert_eq!(parsed.conditions[0].operator, "in");
        assert_eq!(
            parsed.conditions[0].value,
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_separators_inside_lists_and_quotes_are_ignored() {
        let parsed = parse("name = 'salt and pepper' AND tag not in ('x or y', z)").unwrap();

        assert_eq!(parsed.conditions.len(), 2);
        assert_eq!(parsed.conditions[0].value, Value::from("salt and pepper"));
        assert_eq!(parsed.conditions[1].operator, "not in");
        assert_eq!(
            parsed.conditions[1].value,
            Value::Array(vec![Value::from("x or y"), Value::from("z")])
        );
    }

    #[test]
    fn test_multi_word_operators() {
        let parsed = parse("deletedAt IS NOT NULL").unwrap();
        assert_eq!(parsed.conditions[0].operator, "is not null");
        assert_eq!(parsed.conditions[0].value, Value::Null);

        let parsed = parse("releaseDate is null").unwrap();
        assert_eq!(parsed.conditions[0].operator, "is null");

        let parsed = parse("name STARTS WITH 'Sh'").unwrap();
        assert_eq!(parsed.conditions[0].operator, "starts with");
        assert_eq!(parsed.conditions[0].value, Value::from("Sh"));

        let parsed = parse("name Ends With shirt").unwrap();
        assert_eq!(parsed.conditions[0].operator, "ends with");
    }

    #[test]
    fn test_symbolic_operators_without_spaces() {
        let parsed = parse("price>=19.5").unwrap();
        assert_eq!(parsed.conditions[0].field, "price");
        assert_eq!(parsed.conditions[0].operator, ">=");
        assert_eq!(parsed.conditions[0].value, Value::Float(19.5));

        let parsed = parse("status <> 'draft'").unwrap();
        assert_eq!(parsed.conditions[0].operator, "<>");
    }

    #[test]
    fn test_dotted_field_and_parameter_value() {
        let parsed = parse("manufacturer.name = :brand").unwrap();

        assert_eq!(parsed.conditions[0].field, "manufacturer.name");
        assert_eq!(parsed.conditions[0].value, Value::parameter("brand"));

        let parsed = parse("manufacturer.name = ':brand'").unwrap();
        assert_eq!(parsed.conditions[0].value, Value::from(":brand"));
    }

    #[test]
    fn test_field_named_like_keyword_prefix() {
        let parsed = parse("index in (1, 2)").unwrap();
        assert_eq!(parsed.conditions[0].field, "index");
        assert_eq!(parsed.conditions[0].operator, "in");

        let parsed = parse("color = orange").unwrap();
        assert!(!parsed.is_compound);
        assert_eq!(parsed.conditions[0].value, Value::from("orange"));
    }

    #[test]
    fn test_in_without_parentheses() {
        let parsed = parse("id in 1, 2, 3").unwrap();
        assert_eq!(
            parsed.conditions[0].value,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_mixed_combinators_fail() {
        let err = parse("a = 1 AND b = 2 OR c = 3").unwrap_err();
        assert!(matches!(err, QueryError::Parse { .. }));
        assert!(!is_compound_expression("a = 1 AND b = 2 OR c = 3"));
    }

    #[test]
    fn test_malformed_expressions_fail() {
        for input in [
            "",
            "   ",
            "stock",
            "= 5",
            "stock >",
            "name is null 5",
            "a = 1 AND  AND b = 2",
            "stock > 10 AND",
            "stock > 10 20",
            "color = red blue",
            "id in 1, 2 3",
            "name = 'a' 'b'",
        ] {
            let result = parse(input);
            assert!(
                matches!(result, Err(QueryError::Parse { .. })),
                "'{}' should not parse: {:?}",
                input,
                result
            );
        }
    }

    #[test]
    fn test_is_compound_expression() {
        assert!(is_compound_expression("a = 1 AND b = 2"));
        assert!(is_compound_expression("a = 1 or b = 2"));
        assert!(!is_compound_expression("a = 1"));
        assert!(!is_compound_expression("a in (1 AND 2)"));
        assert!(!is_compound_expression("name = 'x OR y'"));
    }

    #[test]
    fn test_parameter_helpers() {
        assert!(is_parameter(":status"));
        assert!(!is_parameter("status"));
        assert!(!is_parameter(":"));
        assert_eq!(extract_parameter_name(":min_price").unwrap(), "min_price");
        assert!(matches!(
            extract_parameter_name("min_price"),
            Err(QueryError::InvalidParameterName(_))
        ));
    }
}
