//! `toolbox` 命令行程序：时空图谱的概率图生成与切片截图。

mod subcmd_impls;

pub use subcmd_impls::args::Cli;
