use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error("absolute base tags are not supported ({base} in {})", file.display())]
    AbsoluteBase { file: PathBuf, base: String },

    #[error("pattern {pattern} did not match any files")]
    NoMatches { pattern: String },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("cowardly refusing to deploy an html file ({path}) without versioning")]
    UnversionedHtml { path: String },

    #[error("uploading {path} failed: {source}")]
    Upload {
        path: String,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "more than {limit} files under {prefix}, rollback is not supported at this scale"
    )]
    TooManyObjects { prefix: String, limit: usize },

    #[error("storage: {0}")]
    Storage(String),

    #[error("{phase}: {source}")]
    Context {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Error::Config(message.into())
    }
}

/// Prepends the name of the failing phase to an error.
pub trait Context<T> {
    fn context(self, phase: &'static str) -> Result<T>;
}

impl<T, E: Into<Error>> Context<T> for std::result::Result<T, E> {
    fn context(self, phase: &'static str) -> Result<T> {
        self.map_err(|e| Error::Context {
            phase,
            source: Box::new(e.into()),
        })
    }
}
