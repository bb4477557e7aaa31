use thiserror::Error;

use crate::path::CanonicalPath;

/// Failure of a single filesystem gateway call. Never fatal to the session.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(CanonicalPath),

    #[error("already exists: {0}")]
    AlreadyExists(CanonicalPath),

    #[error("not a folder: {0}")]
    NotADirectory(CanonicalPath),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: CanonicalPath,
        #[source]
        source: std::io::Error,
    },

    #[error("simulated failure on {0}")]
    Injected(CanonicalPath),

    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl GatewayError {
    pub fn io(path: &CanonicalPath, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.clone()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.clone()),
            _ => Self::Io {
                path: path.clone(),
                source,
            },
        }
    }
}

/// Reasons a drop is refused. The display text is shown to the user.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    #[error("destination must be a folder")]
    NotAFolder,

    #[error("cannot move a folder into its own subtree")]
    IntoOwnSubtree,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read settings: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("could not write settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("no configuration directory available on this platform")]
    NoConfigDir,
}
