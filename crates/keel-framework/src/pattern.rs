//! Route pattern compilation.
//!
//! A pattern is a path template such as `/articles/{id}/edit`. Literal text
//! is matched exactly; each `{name}` placeholder matches one non-empty path
//! segment (`[^/]+`) and is captured under `name`. The compiled expression is
//! anchored at both ends, so a pattern never matches a prefix or suffix of a
//! longer path.
//!
//! Captured values are the raw substrings of the path. Nothing is
//! percent-decoded, so `%2F` inside a segment is returned as the three
//! characters `%2F`.

use std::fmt;

use keel_core::Params;
use regex::Regex;

use crate::error::{RouteError, RouteResult};

/// A route pattern compiled to an anchored regular expression.
#[derive(Clone)]
pub struct CompiledPattern {
    source: String,
    regex: Regex,
    params: Vec<String>,
}

impl CompiledPattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidPattern`] for an empty or malformed placeholder
    ///   name or unbalanced braces.
    /// - [`RouteError::DuplicateParameter`] when a placeholder name repeats.
    pub fn compile(pattern: &str) -> RouteResult<Self> {
        let mut expr = String::with_capacity(pattern.len() + 16);
        let mut params: Vec<String> = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars();

        expr.push('^');
        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();

                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => {
                                return Err(RouteError::invalid_pattern(
                                    pattern,
                                    "nested '{' inside a placeholder",
                                ));
                            }
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(RouteError::invalid_pattern(
                                    pattern,
                                    "unclosed '{'",
                                ));
                            }
                        }
                    }

                    if !is_identifier(&name) {
                        return Err(RouteError::invalid_pattern(
                            pattern,
                            format!("'{{{name}}}' is not a valid parameter name"),
                        ));
                    }
                    if params.contains(&name) {
                        return Err(RouteError::DuplicateParameter {
                            pattern: pattern.to_string(),
                            name,
                        });
                    }

                    expr.push_str("(?P<");
                    expr.push_str(&name);
                    expr.push_str(">[^/]+)");
                    params.push(name);
                }
                '}' => {
                    return Err(RouteError::invalid_pattern(pattern, "unmatched '}'"));
                }
                other => literal.push(other),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| RouteError::Regex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
            params,
        })
    }

    /// The template this pattern was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in declaration order.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// The generated anchored expression.
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Matches `path` and returns the captured parameters in declaration
    /// order, or `None` when the path does not match.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        Some(
            self.params
                .iter()
                .filter_map(|name| caps.name(name).map(|m| (name.as_str(), m.as_str())))
                .collect(),
        )
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPattern")
            .field("source", &self.source)
            .field("regex", &self.regex.as_str())
            .field("params", &self.params)
            .finish()
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
