//! 外部任务的提交与轮询。
//!
//! 一个 [`Job`] 由若干互相独立的 [`Task`] 组成，每个任务就是外部程序的一次调用。任务的调度、
//! 依赖与重试全部交给本机线程池或集群队列系统，这里只负责提交并查询是否全部结束。

mod error;
mod local;
mod quote;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod condor;
        mod slurm;
    }
}

pub use error::JobError;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 外部程序的一次调用，其标准输出与标准错误写入 `log`。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub log: PathBuf,
}

impl Task {
    /// `argv` 的第一个元素为程序名，其余为参数。`argv` 为空时返回 `None`。
    pub fn new<S: Into<String>>(name: S, argv: Vec<String>, log: PathBuf) -> Option<Self> {
        let mut it = argv.into_iter();
        let program = it.next()?;
        Some(Self {
            name: name.into(),
            program,
            args: it.collect(),
            log,
        })
    }

    /// 可直接粘贴到 shell 中执行的命令行。
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| quote::shell(s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// 批处理队列。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Queue {
    /// 在本机线程池中执行。
    Local,
    /// 提交到 HTCondor。
    Condor,
    /// 提交到指定的 SLURM 分区。
    Slurm { partition: String },
}

impl FromStr for Queue {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(JobError::Unsupported("empty queue name".to_string())),
            "local" => Ok(Queue::Local),
            "condor" => Ok(Queue::Condor),
            partition => Ok(Queue::Slurm {
                partition: partition.to_string(),
            }),
        }
    }
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Local => f.write_str("local"),
            Queue::Condor => f.write_str("condor"),
            Queue::Slurm { partition } => write!(f, "slurm:{partition}"),
        }
    }
}

impl Queue {
    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, Queue::Local)
    }

    /// 提交任务。
    ///
    /// `threads` 在本机执行时为线程池大小，在集群上为每个任务申请的 CPU 数。
    /// 队列系统需要的提交脚本写在 `script_dir` 下。
    pub fn submit(
        &self,
        name: &str,
        tasks: Vec<Task>,
        threads: Option<usize>,
        script_dir: &Path,
    ) -> Result<Job, JobError> {
        let total = tasks.len();
        if tasks.is_empty() {
            return Ok(Job::new(name, 0, Backend::Done));
        }
        for task in tasks.iter() {
            tracing::trace!(job = name, task = %task.name, "{}", task.command_line());
        }
        let backend = match self {
            Queue::Local => Backend::Local(local::LocalJob::spawn(tasks, threads)),
            #[cfg(unix)]
            Queue::Condor => Backend::Condor(condor::CondorJob::submit(
                name, tasks, threads, script_dir,
            )?),
            #[cfg(unix)]
            Queue::Slurm { partition } => Backend::Slurm(slurm::SlurmJob::submit(
                name, partition, tasks, threads, script_dir,
            )?),
            #[cfg(not(unix))]
            other => {
                let _ = script_dir;
                return Err(JobError::Unsupported(format!(
                    "queue `{other}` is only available on unix"
                )));
            }
        };
        Ok(Job::new(name, total, backend))
    }
}

/// 一次轮询得到的任务状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Running { done: usize, total: usize },
    Finished,
    /// 全部结束，但 `failed` 中的任务失败。
    Failed { failed: Vec<String> },
}

impl JobStatus {
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running { .. })
    }
}

enum Backend {
    Done,
    Local(local::LocalJob),
    #[cfg(unix)]
    Condor(condor::CondorJob),
    #[cfg(unix)]
    Slurm(slurm::SlurmJob),
}

/// 提交后得到的任务句柄。
pub struct Job {
    name: String,
    total: usize,
    backend: Backend,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.backend {
            Backend::Done => "done".to_string(),
            Backend::Local(_) => "local".to_string(),
            #[cfg(unix)]
            Backend::Condor(j) => format!("condor:{}", j.cluster()),
            #[cfg(unix)]
            Backend::Slurm(j) => format!("slurm:{}", j.id()),
        };
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("total", &self.total)
            .field("backend", &backend)
            .finish()
    }
}

impl Job {
    #[inline]
    fn new(name: &str, total: usize, backend: Backend) -> Self {
        Self {
            name: name.to_string(),
            total,
            backend,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 任务个数。
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    /// 查询一次状态，不阻塞。
    pub fn poll(&mut self) -> Result<JobStatus, JobError> {
        match &mut self.backend {
            Backend::Done => Ok(JobStatus::Finished),
            Backend::Local(j) => Ok(j.poll()),
            #[cfg(unix)]
            Backend::Condor(j) => j.poll(),
            #[cfg(unix)]
            Backend::Slurm(j) => j.poll(),
        }
    }
}

/// 从各任务的结束状态汇总出整个 job 的状态。
pub(crate) fn summarize(total: usize, done: usize, failed: &[String]) -> JobStatus {
    if done < total {
        JobStatus::Running { done, total }
    } else if failed.is_empty() {
        JobStatus::Finished
    } else {
        JobStatus::Failed {
            failed: failed.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_from_name() {
        assert_eq!("local".parse::<Queue>().unwrap(), Queue::Local);
        assert_eq!("condor".parse::<Queue>().unwrap(), Queue::Condor);
        assert_eq!(
            "long".parse::<Queue>().unwrap(),
            Queue::Slurm {
                partition: "long".to_string()
            }
        );
        assert!("  ".parse::<Queue>().is_err());
    }

    #[test]
    fn test_task_from_argv() {
        let argv = vec!["atlas-task".to_string(), "defimgs".to_string(), "a b".to_string()];
        let task = Task::new("t", argv, PathBuf::from("t.log")).unwrap();
        assert_eq!(task.program, "atlas-task");
        assert_eq!(task.args, vec!["defimgs", "a b"]);
        assert_eq!(task.command_line(), "atlas-task defimgs 'a b'");
        assert!(Task::new("t", vec![], PathBuf::from("t.log")).is_none());
    }

    #[test]
    fn test_empty_job_is_finished() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = Queue::Local.submit("empty", vec![], None, dir.path()).unwrap();
        assert_eq!(job.total(), 0);
        assert_eq!(job.poll().unwrap(), JobStatus::Finished);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(3, 1, &[]), JobStatus::Running { done: 1, total: 3 });
        assert_eq!(summarize(3, 3, &[]), JobStatus::Finished);
        assert_eq!(
            summarize(2, 2, &["b".to_string()]),
            JobStatus::Failed {
                failed: vec!["b".to_string()]
            }
        );
    }
}
