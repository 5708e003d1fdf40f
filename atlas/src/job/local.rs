use super::{summarize, JobStatus, Task};
use std::fs::{self, File};
use std::process::{Command, Stdio};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use threadpool::ThreadPool;

/// 单个任务的结束结果：任务名和是否成功。
type Outcome = (String, bool);

/// 在本机线程池中执行的 job。
pub(crate) struct LocalJob {
    rx: Receiver<Outcome>,
    total: usize,
    done: usize,
    failed: Vec<String>,
    _pool: ThreadPool,
}

impl LocalJob {
    /// 立即开始执行全部任务。线程池大小为 `threads`，未给出时使用逻辑 CPU 数。
    pub fn spawn(tasks: Vec<Task>, threads: Option<usize>) -> Self {
        let workers = threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPool::new(workers);
        let (tx, rx) = channel();
        let total = tasks.len();
        for task in tasks {
            let tx = tx.clone();
            pool.execute(move || {
                let ok = run(&task);
                // 接收端只会在 job 句柄被丢弃后关闭，此时结果已无人关心。
                let _ = tx.send((task.name, ok));
            });
        }
        Self {
            rx,
            total,
            done: 0,
            failed: Vec::new(),
            _pool: pool,
        }
    }

    pub fn poll(&mut self) -> JobStatus {
        loop {
            match self.rx.try_recv() {
                Ok((name, ok)) => {
                    self.done += 1;
                    if !ok {
                        self.failed.push(name);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // 工作线程 panic 时发送端被丢弃，剩余任务按失败计。
                    if self.done < self.total {
                        self.failed.push(format!("{} lost task(s)", self.total - self.done));
                        self.done = self.total;
                    }
                    break;
                }
            }
        }
        summarize(self.total, self.done, &self.failed)
    }
}

fn run(task: &Task) -> bool {
    if let Some(parent) = task.log.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            tracing::warn!("cannot create log directory `{}`: {e}", parent.display());
            return false;
        }
    }
    let (stdout, stderr) = match File::create(&task.log).and_then(|f| Ok((f.try_clone()?, f))) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("cannot open log file `{}`: {e}", task.log.display());
            return false;
        }
    };
    let status = Command::new(&task.program)
        .args(&task.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .status();
    match status {
        Ok(s) if s.success() => true,
        Ok(s) => {
            tracing::debug!(task = %task.name, "exited with {s}");
            false
        }
        Err(e) => {
            tracing::warn!(task = %task.name, "failed to start `{}`: {e}", task.program);
            false
        }
    }
}
