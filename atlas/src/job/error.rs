use std::path::PathBuf;
use thiserror::Error;

/// 提交或轮询任务时的错误。
#[derive(Error, Debug)]
pub enum JobError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` failed: {message}")]
    Command { program: String, message: String },

    #[error("job `{job}` finished with {} failed task(s): {}", failed.len(), failed.join(", "))]
    Failed { job: String, failed: Vec<String> },

    #[error("unsupported queue: {0}")]
    Unsupported(String),
}
