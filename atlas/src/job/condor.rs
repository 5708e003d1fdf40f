use super::{quote, summarize, JobError, JobStatus, Task};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::Command;

/// 提交到 HTCondor 的一个 cluster，每个任务对应其中一个 proc。
pub(crate) struct CondorJob {
    cluster: String,
    names: Vec<String>,
}

impl CondorJob {
    pub fn submit(
        name: &str,
        tasks: Vec<Task>,
        threads: Option<usize>,
        script_dir: &Path,
    ) -> Result<Self, JobError> {
        let path = script_dir.join(format!("{name}.condor"));
        let io_err = |source| JobError::Io {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(script_dir).map_err(io_err)?;
        for task in tasks.iter() {
            if let Some(parent) = task.log.parent() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        fs::write(&path, submit_description(&tasks, threads, script_dir)).map_err(io_err)?;

        let out = Command::new("condor_submit")
            .arg("-terse")
            .arg(&path)
            .output()
            .map_err(|source| JobError::Spawn {
                program: "condor_submit".to_string(),
                source,
            })?;
        if !out.status.success() {
            return Err(JobError::Command {
                program: "condor_submit".to_string(),
                message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&out.stdout);
        let cluster = parse_cluster(&stdout).ok_or_else(|| JobError::Command {
            program: "condor_submit".to_string(),
            message: format!("unexpected output `{}`", stdout.trim()),
        })?;
        tracing::debug!(job = name, "submitted HTCondor cluster {cluster}");

        Ok(Self {
            cluster,
            names: tasks.into_iter().map(|t| t.name).collect(),
        })
    }

    #[inline]
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn poll(&mut self) -> Result<JobStatus, JobError> {
        let total = self.names.len();
        let queued = query("condor_q", &self.cluster, &["-af", "ProcId"])?;
        let remaining = queued.lines().filter(|l| !l.trim().is_empty()).count();
        if remaining > 0 {
            return Ok(summarize(total, total.saturating_sub(remaining), &[]));
        }
        let history = query("condor_history", &self.cluster, &["-af", "ProcId", "ExitCode"])?;
        Ok(summarize(total, total, &failed_procs(&history, &self.names)))
    }
}

fn query(program: &str, cluster: &str, args: &[&str]) -> Result<String, JobError> {
    let out = Command::new(program)
        .arg(cluster)
        .args(args)
        .output()
        .map_err(|source| JobError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !out.status.success() {
        return Err(JobError::Command {
            program: program.to_string(),
            message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

fn submit_description(tasks: &[Task], threads: Option<usize>, initialdir: &Path) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "universe    = vanilla");
    let _ = writeln!(s, "getenv      = True");
    let _ = writeln!(s, "initialdir  = {}", initialdir.display());
    if let Some(n) = threads {
        let _ = writeln!(s, "request_cpus = {n}");
    }
    for task in tasks {
        let _ = writeln!(s);
        let _ = writeln!(s, "executable  = {}", task.program);
        let _ = writeln!(s, "arguments   = {}", quote::condor(&task.args));
        let _ = writeln!(s, "output      = {}", task.log.display());
        let _ = writeln!(s, "error       = {}.err", task.log.display());
        let _ = writeln!(s, "queue");
    }
    s
}

/// `condor_submit -terse` 输出形如 `123.0 - 123.4`。
fn parse_cluster(stdout: &str) -> Option<String> {
    let first = stdout.split_whitespace().next()?;
    let (cluster, _) = first.split_once('.')?;
    if !cluster.is_empty() && cluster.bytes().all(|b| b.is_ascii_digit()) {
        Some(cluster.to_string())
    } else {
        None
    }
}

/// `condor_history -af ProcId ExitCode` 中退出码非零（或未定义）的 proc。
fn failed_procs(history: &str, names: &[String]) -> Vec<String> {
    history
        .lines()
        .filter_map(|l| {
            let mut it = l.split_whitespace();
            let proc_id = it.next()?.parse::<usize>().ok()?;
            let code = it.next().unwrap_or("undefined");
            (code != "0").then(|| names.get(proc_id).cloned()).flatten()
        })
        .collect()
}
