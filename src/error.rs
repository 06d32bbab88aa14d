use std::path::PathBuf;

use crate::lexer::SyntaxError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: SyntaxError,
    },

    #[error("no Go source files found under {}", .0.display())]
    NoGoFiles(PathBuf),

    #[error("no main function found in package main; nothing to instrument")]
    NoMainFunction,

    #[error("unknown package '{0}' selected as the current package")]
    UnknownPackage(String),

    #[error("failed to read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
