use core::fmt;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("key `{key}` not found at path `{path}`")]
    NotFound { path: String, key: String },

    #[error("value at path `{path}` is {found}, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} out of range at path `{path}` (length {len})")]
    OutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("{what}: {message}")]
    Parse { what: String, message: String },

    #[error("`{}` is not a kustomization file", .0.display())]
    NotAKustomization(PathBuf),

    #[error("helm binary `{}` not found", .0.display())]
    HelmNotFound(PathBuf),

    #[error("helm template failed: {stderr}")]
    Helm { stderr: String },

    #[error("{0}")]
    Patch(String),

    #[error("{0}")]
    Invalid(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    Multiple(Errors),
}

impl Error {
    pub fn io(context: impl fmt::Display, source: std::io::Error) -> Self {
        Error::Io {
            context: context.to_string(),
            source,
        }
    }

    pub fn parse(what: impl fmt::Display, message: impl fmt::Display) -> Self {
        Error::Parse {
            what: what.to_string(),
            message: message.to_string(),
        }
    }

    /// Wraps the error with an outer message, `context: inner`.
    pub fn context(self, context: impl fmt::Display) -> Self {
        Error::Context {
            context: context.to_string(),
            source: Box::new(self),
        }
    }
}

pub trait Context<T> {
    fn context(self, context: impl fmt::Display) -> Result<T>;

    fn with_context<C: fmt::Display>(self, f: impl FnOnce() -> C) -> Result<T>;
}

impl<T> Context<T> for Result<T> {
    fn context(self, context: impl fmt::Display) -> Result<T> {
        self.map_err(|err| err.context(context))
    }

    fn with_context<C: fmt::Display>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|err| err.context(f()))
    }
}

impl<T> Context<T> for Result<T, std::io::Error> {
    fn context(self, context: impl fmt::Display) -> Result<T> {
        self.map_err(|err| Error::io(context, err))
    }

    fn with_context<C: fmt::Display>(self, f: impl FnOnce() -> C) -> Result<T> {
        self.map_err(|err| Error::io(f(), err))
    }
}

/// An ordered collection of independent failures, the analogue of a joined
/// error: every error from one load is kept and reported together.
#[derive(Debug, Default)]
pub struct Errors {
    errors: Vec<Error>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// Collapses into a single error: `Ok` when empty, the sole error when
    /// there is one, and `Error::Multiple` otherwise.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Multiple(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl FromIterator<Error> for Errors {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        Errors {
            errors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_result() {
        assert!(Errors::new().into_result().is_ok());

        let mut errors = Errors::new();
        errors.push(Error::Patch("first".into()));
        assert!(matches!(errors.into_result(), Err(Error::Patch(_))));

        let mut errors = Errors::new();
        errors.push(Error::Patch("first".into()));
        errors.push(Error::Patch("second".into()));
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.to_string(), "first\nsecond");
    }

    #[test]
    fn context_chains() {
        let err = Error::Patch("inner".into()).context("outer");
        assert_eq!(err.to_string(), "outer: inner");
    }
}
