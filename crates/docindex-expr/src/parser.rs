//! Expression parser.

use chrono::format::{Item, StrftimeItems};
use docindex_core::EvaluationError;

/// Attribute prefix for document paths.
const DOC_PREFIX: &str = "doc.";

/// Where an expression's values come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Dotted attribute path below `doc.`
    Path(Vec<String>),
    /// Constant label
    Literal(String),
}

/// A transformation applied to every value, left to right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Lower,
    Upper,
    Trim,
    /// Keep only the first value
    First,
    /// Keep only the last value
    Last,
    /// Split each value on a separator
    Split(String),
    /// Reformat date values with a strftime pattern
    Date(String),
    /// Substitute a value when there is none
    Default(String),
}

/// Parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub source: Source,
    pub filters: Vec<Filter>,
}

impl Expression {
    /// True when a `default` filter makes a missing attribute acceptable.
    #[must_use]
    pub fn has_default(&self) -> bool {
        self.filters.iter().any(|f| matches!(f, Filter::Default(_)))
    }
}

/// Parse an expression string.
///
/// Grammar: `source ( '|' filter )*` where `source` is `doc.a.b` or a
/// quoted literal, and `filter` is `name` or `name:arg` (arg optionally
/// quoted).
pub fn parse(expression: &str) -> Result<Expression, EvaluationError> {
    let syntax = |reason: &str| EvaluationError::Syntax {
        expression: expression.to_string(),
        reason: reason.to_string(),
    };

    let parts = split_pipes(expression).ok_or_else(|| syntax("unterminated quote"))?;
    let (head, tail) = parts
        .split_first()
        .ok_or_else(|| syntax("empty expression"))?;

    let head = head.trim();
    if head.is_empty() {
        return Err(syntax("empty expression"));
    }

    let source = if let Some(literal) = unquote(head) {
        Source::Literal(literal.to_string())
    } else if let Some(path) = head.strip_prefix(DOC_PREFIX) {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| !is_identifier(s)) {
            return Err(syntax("attribute path segments must be non-empty identifiers"));
        }
        Source::Path(segments)
    } else {
        return Err(syntax("expected `doc.<attribute>` or a quoted literal"));
    };

    let filters = tail
        .iter()
        .map(|part| parse_filter(part.trim()).map_err(|reason| syntax(&reason)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expression { source, filters })
}

fn parse_filter(text: &str) -> Result<Filter, String> {
    let (name, arg) = match text.split_once(':') {
        Some((name, arg)) => {
            let arg = arg.trim();
            (name.trim(), Some(unquote(arg).unwrap_or(arg).to_string()))
        }
        None => (text, None),
    };

    let filter = match (name, arg) {
        ("lower", None) => Filter::Lower,
        ("upper", None) => Filter::Upper,
        ("trim", None) => Filter::Trim,
        ("first", None) => Filter::First,
        ("last", None) => Filter::Last,
        ("split", Some(sep)) if !sep.is_empty() => Filter::Split(sep),
        ("date", Some(pattern)) => {
            if pattern.is_empty() || StrftimeItems::new(&pattern).any(|i| matches!(i, Item::Error)) {
                return Err(format!("invalid date pattern `{pattern}`"));
            }
            Filter::Date(pattern)
        }
        ("default", Some(value)) => Filter::Default(value),
        ("", _) => return Err("empty filter".to_string()),
        ("lower" | "upper" | "trim" | "first" | "last", Some(_)) => {
            return Err(format!("filter `{name}` takes no argument"));
        }
        ("split" | "date" | "default", _) => {
            return Err(format!("filter `{name}` requires an argument"));
        }
        _ => return Err(format!("unknown filter `{name}`")),
    };
    Ok(filter)
}

/// Split on `|` outside quotes. `None` on an unterminated quote.
fn split_pipes(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '|') => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            (None, _) => {}
        }
    }

    if quote.is_some() {
        return None;
    }
    parts.push(&text[start..]);
    Some(parts)
}

/// Strip matching single or double quotes.
fn unquote(text: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|q| {
        text.strip_prefix(q).and_then(|rest| rest.strip_suffix(q))
    })
}

fn is_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path() {
        let expr = parse("doc.tag_list").unwrap();
        assert_eq!(expr.source, Source::Path(vec!["tag_list".to_string()]));
        assert!(expr.filters.is_empty());
    }

    #[test]
    fn test_parse_nested_path_with_filters() {
        let expr = parse("doc.metadata.client | lower | split:\",\"").unwrap();
        assert_eq!(
            expr.source,
            Source::Path(vec!["metadata".to_string(), "client".to_string()])
        );
        assert_eq!(
            expr.filters,
            vec![Filter::Lower, Filter::Split(",".to_string())]
        );
    }

    #[test]
    fn test_parse_literal() {
        let expr = parse("'All documents'").unwrap();
        assert_eq!(expr.source, Source::Literal("All documents".to_string()));

        let expr = parse("\"a|b\" | upper").unwrap();
        assert_eq!(expr.source, Source::Literal("a|b".to_string()));
        assert_eq!(expr.filters, vec![Filter::Upper]);
    }

    #[test]
    fn test_parse_date_and_default() {
        let expr = parse("doc.date_added | date:'%Y' | default:Undated").unwrap();
        assert_eq!(
            expr.filters,
            vec![
                Filter::Date("%Y".to_string()),
                Filter::Default("Undated".to_string())
            ]
        );
        assert!(expr.has_default());
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "   ",
            "tag_list",
            "doc.",
            "doc.a..b",
            "doc.a | ",
            "doc.a | shout",
            "doc.a | split",
            "doc.a | lower:x",
            "doc.a | date:'%Q%'",
            "'unterminated",
        ] {
            assert!(
                matches!(parse(bad), Err(EvaluationError::Syntax { .. })),
                "expected syntax error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_split_pipes_respects_quotes() {
        assert_eq!(split_pipes("a | 'b|c' | d"), Some(vec!["a ", " 'b|c' ", " d"]));
        assert_eq!(split_pipes("'open"), None);
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("'x'"), Some("x"));
        assert_eq!(unquote("\"\""), Some(""));
        assert_eq!(unquote("'"), None);
        assert_eq!(unquote("'x\""), None);
    }
}
