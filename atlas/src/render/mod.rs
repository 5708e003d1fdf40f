//! NIfTI 体数据的切片截图。

pub mod lut;
pub mod screenshot;
pub mod slice;
pub mod spline;
pub mod transform;
pub mod volume;
pub mod window;

pub use lut::{spline_color_map, ColorMap, LookupTable};
pub use screenshot::{OutputNaming, SliceView};
pub use slice::{extract_slice, Interpolation, Size, SliceAxis};
pub use volume::Volume;
pub use window::{auto_level_window, LevelWindow};

use std::path::PathBuf;
use thiserror::Error;

/// 读取体数据或生成截图时的错误。
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read image `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: nifti::NiftiError,
    },

    #[error("unsupported image shape: {0}")]
    Shape(String),

    #[error("{axis} slice index {index} out of range [0, {len})")]
    IndexOutOfRange {
        axis: &'static str,
        index: i64,
        len: usize,
    },

    #[error("invalid --colors value `{0}`: expected grey, jet, jet+white, hot, inverse or six floats")]
    Colors(String),

    #[error("unknown interpolation mode `{0}`")]
    Interpolation(String),

    #[error("invalid intensity mapping: {0}")]
    ControlPoints(String),

    #[error("failed to access `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{path}`: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
