use std::path::PathBuf;
use thiserror::Error;

/// 读取或合并配置时的错误。
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{path}` is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: json::Error,
    },

    #[error("invalid configuration value `{key}`: {reason}")]
    InvalidField { key: &'static str, reason: String },

    #[error("no {0} queue configured; set `environment.queue` or pass --queue")]
    MissingQueue(&'static str),

    #[error("refusing to overwrite the input configuration `{0}`")]
    Overwrite(PathBuf),

    #[error("no ages given and the configuration has no `regression.means`")]
    MissingMeans,
}

impl ConfigError {
    #[inline]
    pub(crate) fn invalid(key: &'static str, reason: &str) -> Self {
        Self::InvalidField {
            key,
            reason: reason.to_string(),
        }
    }
}
