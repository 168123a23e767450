//! Recursive-descent parser for LDAP-style filter expressions.
//!
//! Grammar:
//!
//! ```text
//! filter     = '(' filtercomp ')'
//! filtercomp = '&' filter+ | '|' filter+ | '!' filter | item
//! item       = attr ( '=' | '~=' | '>=' | '<=' ) value
//! value      = ( char | '\' char | '*' )*
//! ```
//!
//! Whitespace is allowed between filters and around operators' left-hand
//! side; values are taken verbatim up to the closing parenthesis.

use trellis_core::error::FilterError;

use super::{CompareOp, Node};

/// One piece of a value: literal text or an unescaped `*`.
#[derive(Debug, Clone, PartialEq)]
enum ValuePart {
    Literal(String),
    Wildcard,
}

pub(crate) struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Parse a complete expression.
    pub(crate) fn parse(text: &'a str) -> Result<Node, FilterError> {
        let mut parser = Self {
            input: text.as_bytes(),
            pos: 0,
        };

        parser.skip_whitespace();
        if parser.peek().is_none() {
            return Err(FilterError::parse(0, "empty filter expression"));
        }

        let node = parser.filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(FilterError::parse(
                parser.pos,
                "unexpected characters after filter",
            ));
        }

        Ok(node)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: u8) -> Result<(), FilterError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(FilterError::parse(
                self.pos,
                format!("expected '{}', found '{}'", expected as char, c as char),
            )),
            None => Err(FilterError::parse(
                self.pos,
                format!("expected '{}', found end of expression", expected as char),
            )),
        }
    }

    fn filter(&mut self) -> Result<Node, FilterError> {
        self.expect(b'(')?;
        self.skip_whitespace();

        let node = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Node::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Node::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                self.skip_whitespace();
                Node::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => {
                return Err(FilterError::parse(
                    self.pos,
                    "unexpected end of expression",
                ))
            }
        };

        self.skip_whitespace();
        self.expect(b')')?;
        Ok(node)
    }

    fn filter_list(&mut self) -> Result<Vec<Node>, FilterError> {
        let mut nodes = Vec::new();
        self.skip_whitespace();
        while self.peek() == Some(b'(') {
            nodes.push(self.filter()?);
            self.skip_whitespace();
        }

        if nodes.is_empty() {
            return Err(FilterError::parse(self.pos, "expected at least one operand"));
        }
        Ok(nodes)
    }

    fn item(&mut self) -> Result<Node, FilterError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, b'=' | b'<' | b'>' | b'~' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }

        let key = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| FilterError::parse(start, "attribute name is not valid UTF-8"))?
            .trim()
            .to_string();
        if key.is_empty() {
            return Err(FilterError::parse(start, "missing attribute name"));
        }

        let op = match (self.peek(), self.peek_at(1)) {
            (Some(b'='), _) => {
                self.pos += 1;
                None
            }
            (Some(b'>'), Some(b'=')) => {
                self.pos += 2;
                Some(CompareOp::GreaterEq)
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 2;
                Some(CompareOp::LessEq)
            }
            (Some(b'~'), Some(b'=')) => {
                self.pos += 2;
                Some(CompareOp::Approx)
            }
            _ => {
                return Err(FilterError::parse(
                    self.pos,
                    "expected '=', '>=', '<=' or '~='",
                ))
            }
        };

        let value_start = self.pos;
        let parts = self.value()?;

        match op {
            None => Ok(classify_equality(key, parts)),
            Some(op) => {
                if parts.iter().any(|p| *p == ValuePart::Wildcard) {
                    return Err(FilterError::parse(
                        value_start,
                        "wildcards are only allowed with '='",
                    ));
                }
                Ok(Node::Compare {
                    key,
                    op,
                    value: join_literals(parts),
                })
            }
        }
    }

    fn value(&mut self) -> Result<Vec<ValuePart>, FilterError> {
        let mut parts = Vec::new();
        let mut current: Vec<u8> = Vec::new();

        loop {
            match self.peek() {
                None => return Err(FilterError::parse(self.pos, "unterminated value")),
                Some(b')') => break,
                Some(b'(') => return Err(FilterError::parse(self.pos, "unescaped '(' in value")),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(c) => {
                            current.push(c);
                            self.pos += 1;
                        }
                        None => {
                            return Err(FilterError::parse(
                                self.pos,
                                "dangling escape at end of expression",
                            ))
                        }
                    }
                }
                Some(b'*') => {
                    self.flush(&mut current, &mut parts)?;
                    parts.push(ValuePart::Wildcard);
                    self.pos += 1;
                }
                Some(c) => {
                    current.push(c);
                    self.pos += 1;
                }
            }
        }

        self.flush(&mut current, &mut parts)?;
        Ok(parts)
    }

    fn flush(&self, current: &mut Vec<u8>, parts: &mut Vec<ValuePart>) -> Result<(), FilterError> {
        if current.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8(std::mem::take(current))
            .map_err(|_| FilterError::parse(self.pos, "value is not valid UTF-8"))?;
        parts.push(ValuePart::Literal(text));
        Ok(())
    }
}

fn join_literals(parts: Vec<ValuePart>) -> String {
    parts
        .into_iter()
        .filter_map(|p| match p {
            ValuePart::Literal(s) => Some(s),
            ValuePart::Wildcard => None,
        })
        .collect()
}

fn classify_equality(key: String, parts: Vec<ValuePart>) -> Node {
    if parts == [ValuePart::Wildcard] {
        return Node::Present { key };
    }

    if !parts.contains(&ValuePart::Wildcard) {
        return Node::Compare {
            key,
            op: CompareOp::Equal,
            value: join_literals(parts),
        };
    }

    let mut initial = None;
    let mut any = Vec::new();
    let mut last = None;
    let count = parts.len();
    for (i, part) in parts.into_iter().enumerate() {
        if let ValuePart::Literal(text) = part {
            if i == 0 {
                initial = Some(text);
            } else if i == count - 1 {
                last = Some(text);
            } else {
                any.push(text);
            }
        }
    }

    Node::Substring {
        key,
        initial,
        any,
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Node {
        Parser::parse(text).unwrap()
    }

    fn error_position(text: &str) -> usize {
        match Parser::parse(text) {
            Err(FilterError::Parse { position, .. }) => position,
            Ok(node) => panic!("{:?} parsed as {:?}", text, node),
        }
    }

    #[test]
    fn test_parse_simple_atoms() {
        assert_eq!(
            parse("(color=red)"),
            Node::Compare {
                key: "color".into(),
                op: CompareOp::Equal,
                value: "red".into()
            }
        );
        assert_eq!(
            parse("(size>=5)"),
            Node::Compare {
                key: "size".into(),
                op: CompareOp::GreaterEq,
                value: "5".into()
            }
        );
        assert_eq!(
            parse("(size<=5)"),
            Node::Compare {
                key: "size".into(),
                op: CompareOp::LessEq,
                value: "5".into()
            }
        );
        assert_eq!(parse("(name=*)"), Node::Present { key: "name".into() });
    }

    #[test]
    fn test_parse_composites_with_whitespace() {
        let node = parse("  (& (color=red) (| (size>=5) (!(size=1))) )  ");
        match node {
            Node::And(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Node::Or(_)));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_parse_substring() {
        assert_eq!(
            parse("(name=ab*cd*ef)"),
            Node::Substring {
                key: "name".into(),
                initial: Some("ab".into()),
                any: vec!["cd".into()],
                last: Some("ef".into()),
            }
        );
        assert_eq!(
            parse("(name=*cd*)"),
            Node::Substring {
                key: "name".into(),
                initial: None,
                any: vec!["cd".into()],
                last: None,
            }
        );
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(
            parse(r"(path=a\(b\)\*\\)"),
            Node::Compare {
                key: "path".into(),
                op: CompareOp::Equal,
                value: r"a(b)*\".into()
            }
        );
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(error_position(""), 0);
        assert_eq!(error_position("color=red"), 0);
        assert_eq!(error_position("(color=red"), 10);
        assert_eq!(error_position("(=red)"), 1);
        assert_eq!(error_position("(&)"), 2);
        assert_eq!(error_position("(color>5)"), 6);
        assert_eq!(error_position("(color=red))"), 11);
        assert_eq!(error_position("(size>=5*)"), 7);
        assert_eq!(error_position("(a=b(c)"), 4);
        assert_eq!(error_position(r"(a=b\"), 5);
    }
}
