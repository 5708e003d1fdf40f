pub mod args;
mod make_pbmaps;
mod take_screenshots;
mod utils;
