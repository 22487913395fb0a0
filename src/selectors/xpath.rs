//! A small XPath subset compiled down to CSS selectors.
//!
//! Supported:
//!
//! - absolute (`/a/b`) and descendant (`//a//b`) location paths
//! - name tests: `tag`, `*`, `prefix:tag` (prefix must be declared)
//! - predicates: `[@attr]`, `[@attr='v']`, `[contains(@attr,'v')]`, `[n]`
//! - a terminal `/@attr`, `/text()` or `//text()`
//!
//! Anything else is rejected with [`XPathError`], which the normalizer treats
//! as an empty result for that strategy.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XPathError {
    #[error("unsupported xpath {expr:?}: {reason}")]
    Unsupported { expr: String, reason: String },
}

/// What to read from each matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XPathTarget {
    /// The element's string value (all descendant text).
    StringValue,
    /// Only the element's direct text children (`/text()`).
    OwnText,
    /// All descendant text nodes (`//text()`).
    DescendantText,
    /// An attribute value (`/@attr`).
    Attr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledXPath {
    pub css: String,
    pub target: XPathTarget,
}

struct Cursor<'a> {
    expr: &'a str,
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn fail<T>(&self, reason: impl Into<String>) -> Result<T, XPathError> {
        Err(XPathError::Unsupported {
            expr: self.expr.to_string(),
            reason: reason.into(),
        })
    }

    fn eat(&mut self, token: &str) -> bool {
        if let Some(r) = self.rest.strip_prefix(token) {
            self.rest = r;
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<&'a str, XPathError> {
        let end = self
            .rest
            .find(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
            .unwrap_or(self.rest.len());
        if end == 0 {
            return self.fail(format!("expected a name at {:?}", self.rest));
        }
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        Ok(name)
    }

    fn literal(&mut self) -> Result<&'a str, XPathError> {
        let quote = match self.rest.chars().next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return self.fail("expected a quoted literal"),
        };
        let body = &self.rest[1..];
        let Some(end) = body.find(quote) else {
            return self.fail("unterminated literal");
        };
        self.rest = &body[end + 1..];
        Ok(&body[..end])
    }

    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }
}

fn css_name(
    cursor: &Cursor<'_>,
    name: &str,
    namespaces: &BTreeMap<String, String>,
) -> Result<String, XPathError> {
    match name.split_once(':') {
        Some((prefix, local)) => {
            if !namespaces.contains_key(prefix) {
                return cursor.fail(format!("undeclared namespace prefix {prefix:?}"));
            }
            Ok(format!("{prefix}\\:{local}"))
        }
        None => Ok(name.to_ascii_lowercase()),
    }
}

fn css_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn predicate(cursor: &mut Cursor<'_>, is_wildcard: bool) -> Result<String, XPathError> {
    cursor.skip_ws();
    let css = if cursor.eat("@") {
        let attr = cursor.name()?;
        cursor.skip_ws();
        if cursor.eat("=") {
            cursor.skip_ws();
            let value = cursor.literal()?;
            format!("[{attr}={}]", css_string(value))
        } else {
            format!("[{attr}]")
        }
    } else if cursor.eat("contains(") {
        cursor.skip_ws();
        if !cursor.eat("@") {
            return cursor.fail("contains() needs an attribute as first argument");
        }
        let attr = cursor.name()?;
        cursor.skip_ws();
        if !cursor.eat(",") {
            return cursor.fail("expected ',' in contains()");
        }
        cursor.skip_ws();
        let value = cursor.literal()?;
        cursor.skip_ws();
        if !cursor.eat(")") {
            return cursor.fail("expected ')' after contains()");
        }
        format!("[{attr}*={}]", css_string(value))
    } else {
        let end = cursor
            .rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(cursor.rest.len());
        let Ok(n) = cursor.rest[..end].parse::<usize>() else {
            return cursor.fail(format!("unsupported predicate at {:?}", cursor.rest));
        };
        cursor.rest = &cursor.rest[end..];
        if is_wildcard {
            format!(":nth-child({n})")
        } else {
            format!(":nth-of-type({n})")
        }
    };
    cursor.skip_ws();
    if !cursor.eat("]") {
        return cursor.fail("expected ']'");
    }
    Ok(css)
}

/// Compile `expr` to a CSS selector plus a read target.
pub fn compile(
    expr: &str,
    namespaces: &BTreeMap<String, String>,
) -> Result<CompiledXPath, XPathError> {
    let mut cursor = Cursor {
        expr,
        rest: expr.trim(),
    };
    let mut css = String::new();
    let mut first = true;

    loop {
        let descendant = if cursor.eat("//") {
            true
        } else if cursor.eat("/") {
            false
        } else if first {
            // relative paths behave like descendant searches from the root
            true
        } else {
            return cursor.fail(format!("expected '/' at {:?}", cursor.rest));
        };

        if cursor.eat("@") {
            if first {
                return cursor.fail("attribute axis needs an element step");
            }
            let attr = cursor.name()?;
            return finish(cursor, css, XPathTarget::Attr(attr.to_string()));
        }
        if cursor.eat("text()") {
            if first {
                return cursor.fail("text() needs an element step");
            }
            let target = if descendant {
                XPathTarget::DescendantText
            } else {
                XPathTarget::OwnText
            };
            return finish(cursor, css, target);
        }

        let step = if cursor.eat("*") {
            "*".to_string()
        } else {
            let name = cursor.name()?;
            css_name(&cursor, name, namespaces)?
        };
        let is_wildcard = step == "*";

        if first {
            css.push_str(&step);
            if !descendant {
                css.push_str(":root");
            }
        } else {
            css.push_str(if descendant { " " } else { " > " });
            css.push_str(&step);
        }
        while cursor.eat("[") {
            css.push_str(&predicate(&mut cursor, is_wildcard)?);
        }
        first = false;

        if cursor.rest.is_empty() {
            return Ok(CompiledXPath {
                css,
                target: XPathTarget::StringValue,
            });
        }
    }
}

fn finish(
    cursor: Cursor<'_>,
    css: String,
    target: XPathTarget,
) -> Result<CompiledXPath, XPathError> {
    if !cursor.rest.trim().is_empty() {
        return cursor.fail(format!("trailing input {:?}", cursor.rest));
    }
    Ok(CompiledXPath { css, target })
}
