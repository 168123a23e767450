//! LDAP-style filter expressions over property maps.
//!
//! Filters are compiled once with [`Filter::parse`] and then evaluated any
//! number of times with [`Filter::matches`]. Syntax errors are reported at
//! compile time, never during evaluation.
//!
//! Supported forms:
//!
//! - `(key=value)`, `(key>=value)`, `(key<=value)`, `(key~=value)`
//! - `(key=*)` presence, `(key=ab*cd*)` substring
//! - `(&(..)(..))`, `(|(..)(..))`, `(!(..))`
//!
//! Comparisons are numeric when both sides parse as numbers and lexical
//! otherwise. A list-valued property matches if any element matches. A
//! missing key never matches an attribute test.

mod parser;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use trellis_core::error::FilterError;
use trellis_core::types::properties::OBJECTCLASS;
use trellis_core::types::{Properties, PropertyValue};

use parser::Parser;

/// Comparison operator of an attribute test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Equal,
    GreaterEq,
    LessEq,
    Approx,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::GreaterEq => ">=",
            Self::LessEq => "<=",
            Self::Approx => "~=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Compare {
        key: String,
        op: CompareOp,
        value: String,
    },
    Present {
        key: String,
    },
    Substring {
        key: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

impl Node {
    fn matches(&self, properties: &Properties) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.matches(properties)),
            Self::Or(children) => children.iter().any(|c| c.matches(properties)),
            Self::Not(child) => !child.matches(properties),
            Self::Present { key } => properties.contains_key(key),
            Self::Compare { key, op, value } => properties
                .get(key)
                .map_or(false, |actual| compare_value(actual, *op, value)),
            Self::Substring {
                key,
                initial,
                any,
                last,
            } => properties.get(key).map_or(false, |actual| {
                substring_value(actual, initial.as_deref(), any, last.as_deref())
            }),
        }
    }
}

fn compare_value(actual: &PropertyValue, op: CompareOp, operand: &str) -> bool {
    match actual {
        PropertyValue::List(items) => items.iter().any(|item| compare_value(item, op, operand)),
        PropertyValue::Bool(b) => {
            // Booleans only support equality, whatever the operator.
            operand.trim().eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        PropertyValue::Integer(_) | PropertyValue::Float(_) | PropertyValue::String(_) => {
            let text = actual.to_string();
            match op {
                CompareOp::Equal => compare_scalar(&text, operand) == Ordering::Equal,
                CompareOp::GreaterEq => compare_scalar(&text, operand) != Ordering::Less,
                CompareOp::LessEq => compare_scalar(&text, operand) != Ordering::Greater,
                CompareOp::Approx => normalize(&text) == normalize(operand),
            }
        }
    }
}

/// Numeric ordering when both sides parse as numbers, string ordering
/// otherwise.
fn compare_scalar(actual: &str, operand: &str) -> Ordering {
    if let (Ok(a), Ok(b)) = (actual.trim().parse::<i64>(), operand.trim().parse::<i64>()) {
        return a.cmp(&b);
    }

    if let (Some(a), Some(b)) = (parse_finite(actual), parse_finite(operand)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }

    actual.cmp(operand)
}

fn parse_finite(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|f| f.is_finite())
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn substring_value(
    actual: &PropertyValue,
    initial: Option<&str>,
    any: &[String],
    last: Option<&str>,
) -> bool {
    match actual {
        PropertyValue::List(items) => items
            .iter()
            .any(|item| substring_value(item, initial, any, last)),
        other => substring_match(&other.to_string(), initial, any, last),
    }
}

fn substring_match(text: &str, initial: Option<&str>, any: &[String], last: Option<&str>) -> bool {
    let mut rest = text;

    if let Some(prefix) = initial {
        match rest.strip_prefix(prefix) {
            Some(tail) => rest = tail,
            None => return false,
        }
    }

    for part in any {
        match rest.find(part.as_str()) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    match last {
        Some(suffix) => rest.ends_with(suffix),
        None => true,
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        if matches!(c, '(' | ')' | '*' | '\\') {
            write!(f, "\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) | Self::Or(children) => {
                let op = if matches!(self, Self::And(_)) { '&' } else { '|' };
                write!(f, "({}", op)?;
                for child in children {
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Self::Not(child) => write!(f, "(!{})", child),
            Self::Present { key } => write!(f, "({}=*)", key),
            Self::Compare { key, op, value } => {
                write!(f, "({}{}", key, op.symbol())?;
                write_escaped(f, value)?;
                write!(f, ")")
            }
            Self::Substring {
                key,
                initial,
                any,
                last,
            } => {
                write!(f, "({}=", key)?;
                if let Some(initial) = initial {
                    write_escaped(f, initial)?;
                }
                write!(f, "*")?;
                for part in any {
                    write_escaped(f, part)?;
                    write!(f, "*")?;
                }
                if let Some(last) = last {
                    write_escaped(f, last)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A compiled filter expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    root: Node,
}

impl Filter {
    /// Compile a filter expression.
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        Ok(Self {
            root: Parser::parse(text)?,
        })
    }

    /// Compile an optional expression; blank input yields `None`, which
    /// matches everything wherever a filter is optional.
    pub fn parse_optional(text: &str) -> Result<Option<Self>, FilterError> {
        if text.trim().is_empty() {
            Ok(None)
        } else {
            Self::parse(text).map(Some)
        }
    }

    /// A filter matching services published under `interface`.
    pub fn objectclass(interface: &str) -> Self {
        Self {
            root: Node::Compare {
                key: OBJECTCLASS.to_string(),
                op: CompareOp::Equal,
                value: interface.to_string(),
            },
        }
    }

    /// Conjunction of this filter and `other`.
    pub fn and(self, other: Filter) -> Self {
        let mut children = match self.root {
            Node::And(children) => children,
            node => vec![node],
        };
        children.push(other.root);
        Self {
            root: Node::And(children),
        }
    }

    /// Evaluate the filter against a property map.
    pub fn matches(&self, properties: &Properties) -> bool {
        self.root.matches(properties)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::properties;

    fn matches(filter: &str, props: &Properties) -> bool {
        Filter::parse(filter).unwrap().matches(props)
    }

    #[test]
    fn test_conjunction_with_numeric_comparison() {
        let filter = Filter::parse("(&(color=red)(size>=5))").unwrap();

        assert!(filter.matches(&properties! { "color" => "red", "size" => 7 }));
        assert!(!filter.matches(&properties! { "color" => "red", "size" => 3 }));
        assert!(!filter.matches(&properties! { "color" => "blue", "size" => 9 }));
        assert!(!filter.matches(&properties! { "color" => "red" }));
    }

    #[test]
    fn test_numeric_versus_lexical_ordering() {
        // 10 > 9 numerically but "10" < "9" lexically.
        let props = properties! { "n" => 10, "s" => "10" };
        assert!(matches("(n>=9)", &props));
        assert!(matches("(s>=9)", &props));
        assert!(!matches("(s>=abc)", &props));
        assert!(matches("(s<=abc)", &props));

        let props = properties! { "x" => 2.5 };
        assert!(matches("(x>=2)", &props));
        assert!(matches("(x<=2.5)", &props));
        assert!(matches("(x=2.50)", &props));
    }

    #[test]
    fn test_or_and_not() {
        let props = properties! { "color" => "green" };
        assert!(matches("(|(color=red)(color=green))", &props));
        assert!(!matches("(|(color=red)(color=blue))", &props));
        assert!(matches("(!(color=red))", &props));
        // Negating a test on a missing key matches.
        assert!(matches("(!(missing=1))", &props));
    }

    #[test]
    fn test_missing_key_never_matches() {
        let props = Properties::new();
        assert!(!matches("(a=1)", &props));
        assert!(!matches("(a>=1)", &props));
        assert!(!matches("(a<=1)", &props));
        assert!(!matches("(a~=1)", &props));
        assert!(!matches("(a=*)", &props));
        assert!(!matches("(a=x*)", &props));
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        let props = properties! { "Color" => "red" };
        assert!(matches("(Color=red)", &props));
        assert!(!matches("(color=red)", &props));
    }

    #[test]
    fn test_presence_and_substring() {
        let props = properties! { "name" => "org.example.logger" };
        assert!(matches("(name=*)", &props));
        assert!(matches("(name=org.*)", &props));
        assert!(matches("(name=*logger)", &props));
        assert!(matches("(name=*example*)", &props));
        assert!(matches("(name=org*ex*log*)", &props));
        assert!(!matches("(name=*logger*x)", &props));
        assert!(!matches("(name=net.*)", &props));
    }

    #[test]
    fn test_approximate_match() {
        let props = properties! { "title" => "Hello World" };
        assert!(matches("(title~=helloworld)", &props));
        assert!(matches("(title~=HELLO  world)", &props));
        assert!(!matches("(title~=hello)", &props));
    }

    #[test]
    fn test_list_matches_any_element() {
        let props = properties! { "objectclass" => vec!["log.Sink", "log.Flush"] };
        assert!(matches("(objectclass=log.Flush)", &props));
        assert!(matches("(objectclass=log.*)", &props));
        assert!(!matches("(objectclass=log.Other)", &props));
    }

    #[test]
    fn test_boolean_values() {
        let props = properties! { "enabled" => true };
        assert!(matches("(enabled=true)", &props));
        assert!(matches("(enabled=TRUE)", &props));
        assert!(!matches("(enabled=false)", &props));
    }

    #[test]
    fn test_display_is_canonical() {
        let filter = Filter::parse(" (& (a=1) (| (b>=2)(!(c~=x))) (d=*) (e=x*y\\*z*) )").unwrap();
        let text = filter.to_string();
        assert_eq!(text, "(&(a=1)(|(b>=2)(!(c~=x)))(d=*)(e=x*y\\*z*))");
        assert_eq!(Filter::parse(&text).unwrap(), filter);
    }

    #[test]
    fn test_objectclass_and_conjunction() {
        let filter = Filter::objectclass("log.Sink").and("(level>=2)".parse().unwrap());
        assert_eq!(filter.to_string(), "(&(objectclass=log.Sink)(level>=2))");

        let filter = filter.and(Filter::parse("(x=1)").unwrap());
        assert_eq!(
            filter.to_string(),
            "(&(objectclass=log.Sink)(level>=2)(x=1))"
        );
    }

    #[test]
    fn test_parse_optional() {
        assert!(Filter::parse_optional("").unwrap().is_none());
        assert!(Filter::parse_optional("   ").unwrap().is_none());
        assert!(Filter::parse_optional("(a=1)").unwrap().is_some());
        assert!(Filter::parse_optional("(a=1").is_err());
    }

    #[test]
    fn test_parse_errors_surface_at_compile_time() {
        let err = Filter::parse("(&(color=red)(size>=5)").unwrap_err();
        assert!(matches!(err, FilterError::Parse { position: 22, .. }));
    }
}
