//! Kubernetes label-selector grammar: `key=value`, `key!=value`,
//! `key in (v1, v2)`, `key notin (v1, v2)`, `key`, `!key`, joined by commas.

use core::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};
use crate::manifest::Str;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Equality(Str, Str),
    Inequality(Str, Str),
    SetInclusion(Str, IndexSet<Str>),
    SetExclusion(Str, IndexSet<Str>),
    Existence(Str),
    NotExistence(Str),
    All(Vec<Selector>),
}

/// String-keyed view used for matching; labels and annotations both
/// implement it through [`IndexMap`].
pub trait StringMap {
    fn get(&self, key: &str) -> Option<&str>;

    fn has(&self, key: &str) -> bool;
}

impl StringMap for IndexMap<Str, Str> {
    fn get(&self, key: &str) -> Option<&str> {
        IndexMap::get(self, key).map(Str::as_str)
    }

    fn has(&self, key: &str) -> bool {
        self.contains_key(key)
    }
}

impl<T: StringMap + ?Sized> StringMap for &T {
    fn get(&self, key: &str) -> Option<&str> {
        (*self).get(key)
    }

    fn has(&self, key: &str) -> bool {
        (*self).has(key)
    }
}

impl Selector {
    /// Kubernetes semantics: `!=` and `notin` also match when the key is
    /// absent, and `!key` matches exactly when the key is absent.
    pub fn matches(&self, map: &impl StringMap) -> bool {
        match self {
            Selector::Equality(key, value) => map.get(key).is_some_and(|v| v == value),
            Selector::Inequality(key, value) => map.get(key).map_or(true, |v| v != value),
            Selector::SetInclusion(key, values) => {
                map.get(key).is_some_and(|v| values.contains(v))
            }
            Selector::SetExclusion(key, values) => {
                map.get(key).map_or(true, |v| !values.contains(v))
            }
            Selector::Existence(key) => map.has(key),
            Selector::NotExistence(key) => !map.has(key),
            Selector::All(selectors) => selectors.iter().all(|s| s.matches(map)),
        }
    }
}

struct Parser<'s> {
    lexer: Lexer<'s>,
}

impl Parser<'_> {
    fn op_one(
        &mut self,
        operator: &str,
        key: Str,
        f: impl FnOnce(Str, Str) -> Selector,
    ) -> Result<Selector> {
        match self.lexer.next().transpose()? {
            Some(Token::Ident(value)) => Ok(f(key, value)),
            _ => Err(parse_error(format!(
                "expected identifier after operator `{operator}`"
            ))),
        }
    }

    fn op_many(
        &mut self,
        operator: &str,
        key: Str,
        f: impl FnOnce(Str, IndexSet<Str>) -> Selector,
    ) -> Result<Selector> {
        let Some(Token::LeftParen) = self.lexer.next().transpose()? else {
            return Err(parse_error(format!(
                "expected `(` after operator `{operator}`"
            )));
        };

        let mut values = IndexSet::new();
        loop {
            match self.lexer.next().transpose()? {
                Some(Token::Ident(value)) => {
                    values.insert(value);
                    match self.lexer.next().transpose()? {
                        Some(Token::Comma) => continue,
                        Some(Token::RightParen) => break,
                        _ => return Err(parse_error("expected `,` or `)` after value")),
                    }
                }
                _ => return Err(parse_error("expected identifier in set")),
            }
        }

        Ok(f(key, values))
    }

    fn parse(&mut self) -> Result<Selector> {
        let mut selectors = Vec::new();
        loop {
            let key = match self.lexer.next().transpose()? {
                Some(Token::Ident(key)) => key,
                Some(Token::Not) => match self.lexer.next().transpose()? {
                    Some(Token::Ident(key)) => {
                        selectors.push(Selector::NotExistence(key));
                        match self.lexer.next().transpose()? {
                            Some(Token::Comma) => continue,
                            Some(token) => {
                                return Err(parse_error(format!(
                                    "unexpected token `{token:?}` after selector"
                                )))
                            }
                            None => break,
                        }
                    }
                    _ => return Err(parse_error("expected identifier after `!`")),
                },
                Some(token) => {
                    return Err(parse_error(format!(
                        "unexpected token `{token:?}` at start of selector"
                    )))
                }
                None => break,
            };

            let selector = match self.lexer.next() {
                Some(token) => match token? {
                    Token::Equal => self.op_one("=", key, Selector::Equality)?,
                    Token::NotEqual => self.op_one("!=", key, Selector::Inequality)?,
                    Token::In => self.op_many("in", key, Selector::SetInclusion)?,
                    Token::NotIn => self.op_many("notin", key, Selector::SetExclusion)?,
                    Token::Comma => {
                        selectors.push(Selector::Existence(key));
                        continue;
                    }
                    token => {
                        return Err(parse_error(format!(
                            "unexpected token `{token:?}` after selector key"
                        )))
                    }
                },
                None => {
                    selectors.push(Selector::Existence(key));
                    break;
                }
            };
            selectors.push(selector);

            match self.lexer.next().transpose()? {
                Some(Token::Comma) => continue,
                Some(token) => {
                    return Err(parse_error(format!(
                        "unexpected token `{token:?}` after selector"
                    )))
                }
                None => break,
            }
        }

        if selectors.len() == 1 {
            Ok(selectors.remove(0))
        } else {
            Ok(Selector::All(selectors))
        }
    }
}

fn parse_error(message: impl fmt::Display) -> Error {
    Error::parse("parsing selector", message)
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        Parser {
            lexer: Lexer { input },
        }
        .parse()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(values: &IndexSet<Str>) -> String {
            values.iter().cloned().collect::<Vec<_>>().join(", ")
        }

        match self {
            Selector::Equality(key, value) => write!(f, "{key}={value}"),
            Selector::Inequality(key, value) => write!(f, "{key}!={value}"),
            Selector::SetInclusion(key, values) => write!(f, "{key} in ({})", join(values)),
            Selector::SetExclusion(key, values) => write!(f, "{key} notin ({})", join(values)),
            Selector::Existence(key) => write!(f, "{key}"),
            Selector::NotExistence(key) => write!(f, "!{key}"),
            Selector::All(selectors) => {
                let terms = selectors
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "{terms}")
            }
        }
    }
}

#[derive(Debug)]
struct Lexer<'s> {
    input: &'s str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(Str),
    Equal,
    NotEqual,
    Not,
    In,
    NotIn,
    Comma,
    LeftParen,
    RightParen,
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.input = self.input.trim_start();
        let c = self.input.chars().next()?;

        const PREFIXES: &[(&str, Token)] = &[
            ("notin ", Token::NotIn),
            ("notin(", Token::NotIn),
            ("in ", Token::In),
            ("in(", Token::In),
            ("==", Token::Equal),
            ("!=", Token::NotEqual),
            ("!", Token::Not),
            (",", Token::Comma),
            ("(", Token::LeftParen),
            (")", Token::RightParen),
            ("=", Token::Equal),
        ];

        for &(prefix, ref token) in PREFIXES {
            if self.input.starts_with(prefix) {
                // `in(` and `notin(` keep the paren for the next token.
                let consumed = match prefix {
                    "in(" | "notin(" => prefix.len() - 1,
                    _ => prefix.len(),
                };
                self.input = &self.input[consumed..];
                return Some(Ok(token.clone()));
            }
        }

        // Identifiers start with an alphanumeric character; dots, dashes,
        // and slashes inside keys lex as part of the identifier.
        if !c.is_alphanumeric() {
            return Some(Err(parse_error(format!("unexpected character '{c}'"))));
        }

        let end = self
            .input
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '!' | ',' | '(' | ')'))
            .unwrap_or(self.input.len());
        let (ident, rest) = self.input.split_at(end);
        self.input = rest;
        Some(Ok(Token::Ident(ident.trim().into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> IndexMap<Str, Str> {
        pairs
            .iter()
            .map(|(k, v)| (Str::from(*k), Str::from(*v)))
            .collect()
    }

    #[test]
    fn roundtrip() {
        let selectors = [
            "app=nginx",
            "app in (nginx, redis)",
            "app notin (nginx, redis)",
            "app",
            "!app",
            "app!=nginx",
            "app=nginx,env=prod",
            "app!=nginx,!debug",
        ];

        for selector in selectors {
            let parsed = selector.parse::<Selector>().unwrap();
            assert_eq!(parsed.to_string(), selector);
        }

        assert_eq!(
            "app==nginx".parse::<Selector>().unwrap(),
            "app=nginx".parse::<Selector>().unwrap(),
        );
    }

    #[test]
    fn parse_failures() {
        for input in ["app=", "app in nginx", "=nginx", "app in (a", "!"] {
            assert!(input.parse::<Selector>().is_err(), "expected failure: {input}");
        }
    }

    #[test]
    fn equality_matching() {
        let map = labels(&[("app", "nginx"), ("env", "prod")]);
        assert!("app=nginx".parse::<Selector>().unwrap().matches(&map));
        assert!(!"app=redis".parse::<Selector>().unwrap().matches(&map));
        assert!("app=nginx,env=prod".parse::<Selector>().unwrap().matches(&map));
        assert!(!"app=nginx,env=dev".parse::<Selector>().unwrap().matches(&map));
    }

    #[test]
    fn inequality_matches_absent_keys() {
        let map = labels(&[("app", "nginx")]);
        assert!("app!=redis".parse::<Selector>().unwrap().matches(&map));
        assert!(!"app!=nginx".parse::<Selector>().unwrap().matches(&map));
        assert!("missing!=anything".parse::<Selector>().unwrap().matches(&map));
    }

    #[test]
    fn set_matching() {
        let map = labels(&[("app", "redis")]);
        assert!("app in (nginx, redis)".parse::<Selector>().unwrap().matches(&map));
        assert!(!"app in (nginx)".parse::<Selector>().unwrap().matches(&map));
        assert!(!"app notin (redis)".parse::<Selector>().unwrap().matches(&map));
        assert!("other notin (redis)".parse::<Selector>().unwrap().matches(&map));
    }

    #[test]
    fn existence_matching() {
        let map = labels(&[("app", "nginx")]);
        assert!("app".parse::<Selector>().unwrap().matches(&map));
        assert!(!"missing".parse::<Selector>().unwrap().matches(&map));
        assert!("!missing".parse::<Selector>().unwrap().matches(&map));
        assert!(!"!app".parse::<Selector>().unwrap().matches(&map));
    }

    #[test]
    fn dotted_keys() {
        let map = labels(&[("app.kubernetes.io/name", "web")]);
        assert!("app.kubernetes.io/name=web"
            .parse::<Selector>()
            .unwrap()
            .matches(&map));
    }
}
