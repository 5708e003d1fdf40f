//! 时空图谱 (spatiotemporal atlas) 构建流程的辅助工具库。
//!
//! 该 crate 不实现配准、平均等图谱构建算法本身，它们由外部程序完成。这里只负责：
//!
//! 1. 读取并合并图谱配置 (`config`)；
//! 2. 向本地线程池、HTCondor 或 SLURM 队列提交外部任务并轮询其完成状态 (`job`, `controller`)；
//! 3. 从 NIfTI 体数据中截取二维切片，映射窗位窗宽与颜色表后保存为 PNG (`render`)。

pub mod config;
pub mod controller;
mod error;
pub mod job;
pub mod prelude;
pub mod render;

pub use error::{Error, Result};
