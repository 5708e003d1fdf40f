pub use super::config::{AtlasConfig, ConfigError, ConfigOverrides};
pub use super::controller::{AtlasController, SpatioTemporalAtlas};
pub use super::job::{Job, JobError, JobStatus, Queue, Task};
pub use super::render::{
    auto_level_window, spline_color_map, ColorMap, Interpolation, LevelWindow, OutputNaming,
    RenderError, Size, SliceAxis, SliceView, Volume,
};
pub use super::{Error, Result};
