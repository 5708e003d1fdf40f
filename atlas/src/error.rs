use crate::config::ConfigError;
use crate::job::JobError;
use crate::render::RenderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// 库内所有错误的汇总。
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Render(#[from] RenderError),
}
