//! 图谱构建控制器。
//!
//! [`AtlasController`] 是对外部图谱构建程序的一层薄封装：它只负责把“形变图像”和“平均图像”
//! 两类操作拆成按年龄划分的任务、提交到配置的队列，并阻塞等待它们完成。

use crate::config::AtlasConfig;
use crate::job::{Job, JobError, JobStatus, Queue, Task};
use crate::Result;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 图谱构建步骤的外部执行者。
pub trait AtlasController {
    /// 图谱各时间点的默认年龄。
    fn means(&self) -> Result<Vec<f64>>;

    /// 将所有被试图像形变到 `ages` 对应的时间点，`step` 为构建迭代步。
    fn defimgs(&self, channel: &str, ages: &[f64], step: i32) -> Result<Job>;

    /// 对形变后的图像求平均，`labels` 指定要平均的标签（`"all"` 表示全部）。
    fn avgimgs(&self, channel: &str, labels: &str, ages: &[f64], step: i32) -> Result<Job>;

    /// 每隔 `interval` 轮询一次，直到 `job` 结束。
    ///
    /// 所有任务成功时返回 `Ok(true)`。有任务失败时，若控制器要求出错即退出则返回 `Err`，
    /// 否则记录警告并返回 `Ok(false)`。
    fn wait(&self, job: &mut Job, interval: Duration, verbose: u8) -> Result<bool>;
}

/// 调用外部任务程序的时空图谱控制器。
pub struct SpatioTemporalAtlas {
    config: AtlasConfig,
    config_file: PathBuf,
    short_queue: Queue,
    long_queue: Queue,
    verbose: u8,
    exit_on_error: bool,
}

impl SpatioTemporalAtlas {
    /// 检查配置并将合并后的配置写入 `<workdir>/jobs/atlas-config.json`，外部任务将读取该文件。
    ///
    /// 工作目录可能就是配置文件所在目录，写到 `jobs` 下不会覆盖输入的配置。
    pub fn new(config: AtlasConfig, verbose: u8, exit_on_error: bool) -> Result<Self> {
        config.validate()?;
        let short_queue: Queue = config.environment.queue.short.parse()?;
        let long_queue: Queue = config.environment.queue.long.parse()?;
        let config_file = config.workdir().join("jobs").join("atlas-config.json");
        config.dump(&config_file)?;
        if verbose > 0 {
            info!(
                "工作目录 `{}`，短任务队列 {short_queue}，长任务队列 {long_queue}",
                config.workdir().display()
            );
        }
        Ok(Self {
            config,
            config_file,
            short_queue,
            long_queue,
            verbose,
            exit_on_error,
        })
    }

    #[inline]
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// 外部任务读取的合并后配置文件。
    #[inline]
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// 构建 `action` 在每个年龄上的任务。
    fn tasks(
        &self,
        action: &str,
        queue: &Queue,
        channel: &str,
        labels: Option<&str>,
        ages: &[f64],
        step: i32,
    ) -> Vec<Task> {
        let logdir = self.config.workdir().join("log").join(action);
        ages.iter()
            .filter_map(|&age| {
                let mut argv = self.config.environment.command.clone();
                argv.extend([
                    action.to_string(),
                    "--config".to_string(),
                    self.config_file.to_string_lossy().into_owned(),
                    "--root".to_string(),
                    self.config.root().to_string_lossy().into_owned(),
                    "--channel".to_string(),
                    channel.to_string(),
                    "--step".to_string(),
                    step.to_string(),
                    "--age".to_string(),
                    format_age(age),
                ]);
                if let Some(labels) = labels {
                    argv.extend(["--labels".to_string(), labels.to_string()]);
                }
                // 本机执行时线程数用于限制线程池，不再传给单个任务。
                if let (false, Some(n)) = (queue.is_local(), self.config.environment.threads) {
                    argv.extend(["--threads".to_string(), n.to_string()]);
                }
                let name = format!("{channel}-{step}-t{}", format_age(age));
                let log = logdir.join(format!("{name}.log"));
                Task::new(name, argv, log)
            })
            .collect()
    }

    fn submit(&self, action: &str, queue: &Queue, tasks: Vec<Task>, channel: &str, step: i32) -> Result<Job> {
        let name = format!("{action}-{channel}-{step}");
        if self.verbose > 1 {
            for task in tasks.iter() {
                info!("{}", task.command_line());
            }
        }
        let script_dir = self.config.workdir().join("jobs");
        let job = queue.submit(&name, tasks, self.config.environment.threads, &script_dir)?;
        if self.verbose > 0 {
            info!("已提交 `{name}`：{} 个任务，队列 {queue}", job.total());
        }
        Ok(job)
    }
}

impl AtlasController for SpatioTemporalAtlas {
    fn means(&self) -> Result<Vec<f64>> {
        Ok(self.config.means()?)
    }

    fn defimgs(&self, channel: &str, ages: &[f64], step: i32) -> Result<Job> {
        let tasks = self.tasks("defimgs", &self.long_queue, channel, None, ages, step);
        self.submit("defimgs", &self.long_queue, tasks, channel, step)
    }

    fn avgimgs(&self, channel: &str, labels: &str, ages: &[f64], step: i32) -> Result<Job> {
        let tasks = self.tasks("avgimgs", &self.short_queue, channel, Some(labels), ages, step);
        self.submit("avgimgs", &self.short_queue, tasks, channel, step)
    }

    fn wait(&self, job: &mut Job, interval: Duration, verbose: u8) -> Result<bool> {
        let since = Instant::now();
        if verbose > 0 {
            info!("等待 `{}` 完成...", job.name());
        }
        let mut last_done = None;
        let status = loop {
            let status = job.poll()?;
            match status {
                JobStatus::Running { done, total } => {
                    if verbose > 1 && last_done != Some(done) {
                        debug!("`{}`：{done}/{total} 个任务已结束", job.name());
                        last_done = Some(done);
                    }
                    sleep(interval);
                }
                other => break other,
            }
        };
        let elapsed = since.elapsed().as_secs();
        match status {
            JobStatus::Failed { failed } => {
                if self.exit_on_error {
                    return Err(JobError::Failed {
                        job: job.name().to_string(),
                        failed,
                    }
                    .into());
                }
                warn!(
                    "`{}` 结束，{} 个任务失败：{}",
                    job.name(),
                    failed.len(),
                    failed.join(", ")
                );
                Ok(false)
            }
            _ => {
                if verbose > 0 {
                    info!("`{}` 已完成，用时 {elapsed} 秒", job.name());
                }
                Ok(true)
            }
        }
    }
}

/// 年龄按最短形式输出：`36.0` -> `36`，`36.5` -> `36.5`。
fn format_age(age: f64) -> String {
    if age.fract() == 0.0 && age.abs() < 1e15 {
        format!("{}", age as i64)
    } else {
        format!("{age}")
    }
}
