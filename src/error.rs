// error.rs — failures from the environment: files, images, configuration

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

impl LoadError {
    /// File the failed load was for.
    pub fn path(&self) -> &Path {
        match self {
            Self::Open { path, .. } | Self::Decode { path, .. } | Self::NoFileName(path) => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}
