use super::{quote, summarize, JobError, JobStatus, Task};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::Command;

/// 以 SLURM array job 形式提交的一组任务。
pub(crate) struct SlurmJob {
    id: String,
    names: Vec<String>,
}

impl SlurmJob {
    pub fn submit(
        name: &str,
        partition: &str,
        tasks: Vec<Task>,
        threads: Option<usize>,
        script_dir: &Path,
    ) -> Result<Self, JobError> {
        let script = script_dir.join(format!("{name}.sh"));
        write_script(&script, &array_script(&tasks))?;

        let mut cmd = Command::new("sbatch");
        cmd.arg("--parsable")
            .arg(format!("--job-name={name}"))
            .arg(format!("--partition={partition}"))
            .arg(format!("--array=0-{}", tasks.len() - 1))
            .arg("--output=/dev/null");
        if let Some(n) = threads {
            cmd.arg(format!("--cpus-per-task={n}"));
        }
        let stdout = run(cmd.arg(&script))?;
        let id = parse_job_id(&stdout).ok_or_else(|| JobError::Command {
            program: "sbatch".to_string(),
            message: format!("unexpected output `{}`", stdout.trim()),
        })?;
        tracing::debug!(job = name, "submitted SLURM job {id}");

        Ok(Self {
            id,
            names: tasks.into_iter().map(|t| t.name).collect(),
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn poll(&mut self) -> Result<JobStatus, JobError> {
        let remaining = match run(Command::new("squeue").args(["-h", "-o", "%i", "-j", &self.id])) {
            Ok(pending) => count_array_tasks(&pending),
            // 结束超过 MinJobAge 的 job 已从控制器中清除，squeue 以 "Invalid job id specified" 退出。
            Err(JobError::Command { message, .. }) => {
                tracing::debug!("squeue no longer lists job {}: {message}", self.id);
                0
            }
            Err(e) => return Err(e),
        };
        let total = self.names.len();
        if remaining > 0 {
            return Ok(summarize(total, total.saturating_sub(remaining), &[]));
        }

        let accounting = Command::new("sacct")
            .args(["-n", "-X", "-P", "-o", "JobID,State", "-j", &self.id])
            .output();
        let failed = match accounting {
            Ok(out) if out.status.success() => {
                failed_tasks(&String::from_utf8_lossy(&out.stdout), &self.names)
            }
            _ => {
                tracing::warn!("sacct unavailable, cannot check exit states of job {}", self.id);
                Vec::new()
            }
        };
        Ok(summarize(total, total, &failed))
    }
}

fn run(cmd: &mut Command) -> Result<String, JobError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let out = cmd.output().map_err(|source| JobError::Spawn {
        program: program.clone(),
        source,
    })?;
    if !out.status.success() {
        return Err(JobError::Command {
            program,
            message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

fn write_script(path: &Path, content: &str) -> Result<(), JobError> {
    let io_err = |source| JobError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_err)
}

/// 按 `SLURM_ARRAY_TASK_ID` 分派到对应任务的脚本。
fn array_script(tasks: &[Task]) -> String {
    let mut s = String::from("#!/bin/sh\nset -e\ncase \"$SLURM_ARRAY_TASK_ID\" in\n");
    for (i, task) in tasks.iter().enumerate() {
        let log = quote::shell(&task.log.to_string_lossy());
        s.push_str(&format!(
            "  {i})\n    mkdir -p \"$(dirname {log})\"\n    exec {} > {log} 2>&1\n    ;;\n",
            task.command_line()
        ));
    }
    s.push_str("  *)\n    echo \"unknown array index $SLURM_ARRAY_TASK_ID\" >&2\n    exit 1\n    ;;\nesac\n");
    s
}

/// `sbatch --parsable` 输出 `jobid` 或 `jobid;cluster`。
fn parse_job_id(stdout: &str) -> Option<String> {
    let id = stdout.trim().split(';').next()?.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Some(id.to_string())
    } else {
        None
    }
}

/// `squeue -o %i` 对尚未开始的数组元素会输出 `123_[4-9]` 这样的区间。
fn count_array_tasks(squeue: &str) -> usize {
    squeue
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| match l.split_once("_[") {
            Some((_, range)) => range
                .trim_end_matches(']')
                .split('%')
                .next()
                .unwrap_or_default()
                .split(',')
                .map(|part| match part.split_once('-') {
                    Some((a, b)) => match (a.parse::<usize>(), b.parse::<usize>()) {
                        (Ok(a), Ok(b)) if b >= a => b - a + 1,
                        _ => 1,
                    },
                    None => 1,
                })
                .sum(),
            None => 1,
        })
        .sum()
}

/// 从 `sacct -P -o JobID,State` 输出中找出未以 COMPLETED 结束的数组元素。
fn failed_tasks(sacct: &str, names: &[String]) -> Vec<String> {
    sacct
        .lines()
        .filter_map(|l| l.trim().split_once('|'))
        .filter(|(_, state)| !state.starts_with("COMPLETED"))
        .filter_map(|(id, _)| id.rsplit_once('_')?.1.parse::<usize>().ok())
        .filter_map(|i| names.get(i).cloned())
        .collect()
}
