/*!
 * A small CSS selector subset for locating regions and content nodes.
 *
 * Supported syntax:
 * - type selectors (`div`) and the universal selector (`*`)
 * - class (`.markup`) and id (`#chat`) selectors
 * - attribute selectors: `[attr]`, `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`, `[attr$="v"]`
 * - compound selectors (`div[class*="message"].unread`)
 * - descendant (` `) and child (`>`) combinators
 */

use std::fmt;
use std::str::FromStr;

use super::NodeId;
use crate::errors::SelectorError;

/// Read access to the tree needed to evaluate a selector
pub(crate) trait SelectorTarget {
    fn tag_name(&self, id: NodeId) -> Option<&str>;
    fn attribute_value(&self, id: NodeId, name: &str) -> Option<&str>;
    fn parent_of(&self, id: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeOp {
    Exists,
    Equals(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SimpleSelector {
    Class(String),
    Id(String),
    Attribute { name: String, op: AttributeOp },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    simple: Vec<SimpleSelector>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.simple.is_empty()
    }

    fn matches<T: SelectorTarget + ?Sized>(&self, tree: &T, id: NodeId) -> bool {
        let Some(tag) = tree.tag_name(id) else {
            return false;
        };

        if let Some(expected) = &self.tag {
            if expected != "*" && !expected.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        self.simple.iter().all(|simple| match simple {
            SimpleSelector::Class(class) => tree
                .attribute_value(id, "class")
                .map(|value| value.split_whitespace().any(|c| c == class))
                .unwrap_or(false),
            SimpleSelector::Id(expected) => tree.attribute_value(id, "id") == Some(expected.as_str()),
            SimpleSelector::Attribute { name, op } => match tree.attribute_value(id, name) {
                None => false,
                Some(value) => match op {
                    AttributeOp::Exists => true,
                    AttributeOp::Equals(v) => value == v,
                    AttributeOp::Contains(v) => value.contains(v.as_str()),
                    AttributeOp::StartsWith(v) => value.starts_with(v.as_str()),
                    AttributeOp::EndsWith(v) => value.ends_with(v.as_str()),
                },
            },
        })
    }
}

/// A parsed selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    // Compounds from left to right; the combinator links a compound to the one before it.
    parts: Vec<(Combinator, Compound)>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        Parser::new(input).parse()
    }

    /// Create an attribute-equality selector, escaping nothing
    pub fn attribute_equals(name: &str, value: &str) -> Self {
        let compound = Compound {
            tag: None,
            simple: vec![SimpleSelector::Attribute {
                name: name.to_string(),
                op: AttributeOp::Equals(value.to_string()),
            }],
        };
        Self {
            source: format!("[{}=\"{}\"]", name, value),
            parts: vec![(Combinator::Descendant, compound)],
        }
    }

    /// Create an attribute-presence selector
    pub fn attribute_exists(name: &str) -> Self {
        let compound = Compound {
            tag: None,
            simple: vec![SimpleSelector::Attribute {
                name: name.to_string(),
                op: AttributeOp::Exists,
            }],
        };
        Self {
            source: format!("[{}]", name),
            parts: vec![(Combinator::Descendant, compound)],
        }
    }

    /// The universal selector `*`
    pub fn universal() -> Self {
        let compound = Compound {
            tag: Some("*".to_string()),
            simple: Vec::new(),
        };
        Self {
            source: "*".to_string(),
            parts: vec![(Combinator::Descendant, compound)],
        }
    }

    /// The original selector text
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub(crate) fn matches<T: SelectorTarget + ?Sized>(&self, tree: &T, id: NodeId) -> bool {
        match self.parts.split_last() {
            Some(((_, last), rest)) => last.matches(tree, id) && self.matches_ancestors(tree, id, rest, self.parts.len() - 1),
            None => false,
        }
    }

    // `rest` are the compounds left of index `at`; the combinator stored at `at`
    // says how the compound at `at` relates to `rest.last()`.
    fn matches_ancestors<T: SelectorTarget + ?Sized>(
        &self,
        tree: &T,
        id: NodeId,
        rest: &[(Combinator, Compound)],
        at: usize,
    ) -> bool {
        let Some(((_, compound), remaining)) = rest.split_last() else {
            return true;
        };

        match self.parts[at].0 {
            Combinator::Child => match tree.parent_of(id) {
                Some(parent) => {
                    compound.matches(tree, parent) && self.matches_ancestors(tree, parent, remaining, at - 1)
                }
                None => false,
            },
            Combinator::Descendant => {
                let mut current = tree.parent_of(id);
                while let Some(ancestor) = current {
                    if compound.matches(tree, ancestor) && self.matches_ancestors(tree, ancestor, remaining, at - 1) {
                        return true;
                    }
                    current = tree.parent_of(ancestor);
                }
                false
            }
        }
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.trim().chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: impl Into<String>) -> SelectorError {
        SelectorError::Invalid {
            selector: self.input.to_string(),
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse(mut self) -> Result<Selector, SelectorError> {
        if self.chars.is_empty() {
            return Err(self.error("empty selector"));
        }

        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;

        loop {
            let compound = self.parse_compound()?;
            if compound.is_empty() {
                return Err(self.error(format!("expected selector at position {}", self.pos)));
            }
            parts.push((combinator, compound));

            let had_space = self.skip_whitespace();
            match self.peek() {
                None => break,
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    combinator = Combinator::Child;
                }
                Some(_) if had_space => combinator = Combinator::Descendant,
                Some(c) => return Err(self.error(format!("unexpected character '{}'", c))),
            }
        }

        Ok(Selector {
            source: self.input.trim().to_string(),
            parts,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();

        match self.peek() {
            Some('*') => {
                self.pos += 1;
                compound.tag = Some("*".to_string());
            }
            Some(c) if is_ident_char(c) => {
                compound.tag = Some(self.parse_ident()?);
            }
            _ => {}
        }

        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    compound.simple.push(SimpleSelector::Class(self.parse_ident()?));
                }
                Some('#') => {
                    self.pos += 1;
                    compound.simple.push(SimpleSelector::Id(self.parse_ident()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.simple.push(self.parse_attribute()?);
                }
                _ => break,
            }
        }

        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, SelectorError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(format!("expected identifier at position {}", start)));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attribute(&mut self) -> Result<SimpleSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.parse_ident()?;
        self.skip_whitespace();

        let op_prefix = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(SimpleSelector::Attribute {
                    name,
                    op: AttributeOp::Exists,
                });
            }
            Some('=') => None,
            Some(c @ ('*' | '^' | '$')) => {
                self.pos += 1;
                Some(c)
            }
            Some(c) => return Err(self.error(format!("unsupported attribute operator '{}'", c))),
            None => return Err(self.error("unterminated attribute selector")),
        };

        if self.peek() != Some('=') {
            return Err(self.error("expected '=' in attribute selector"));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(self.error("expected ']' to close attribute selector"));
        }
        self.pos += 1;

        let op = match op_prefix {
            None => AttributeOp::Equals(value),
            Some('*') => AttributeOp::Contains(value),
            Some('^') => AttributeOp::StartsWith(value),
            _ => AttributeOp::EndsWith(value),
        };
        Ok(SimpleSelector::Attribute { name, op })
    }

    fn parse_value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(self.error("unterminated quoted value"));
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(value)
            }
            _ => self.parse_ident(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}
