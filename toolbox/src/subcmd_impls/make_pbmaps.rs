use super::utils::{finite_f64, positive_usize};
use anyhow::Context;
use atlas::config::{AtlasConfig, ConfigOverrides};
use atlas::controller::{AtlasController, SpatioTemporalAtlas};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 未指定 `--channel` 时处理的通道。
const DEFAULT_CHANNELS: [&str; 2] = ["tissues", "structures"];
/// 形变任务耗时较长，轮询间隔更短以便尽早开始平均。
const DEFIMGS_INTERVAL: Duration = Duration::from_secs(30);
const AVGIMGS_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Args, Debug)]
pub struct MakePbmaps {
    /// 图谱配置文件 (JSON)。
    config: PathBuf,
    /// 中间文件目录，覆盖配置中的`paths.tmpdir`。
    #[arg(short = 'w', long = "workdir", visible_alias = "tmpdir")]
    workdir: Option<PathBuf>,
    /// 图谱时间点的年龄，默认为配置中的`regression.means`。
    #[arg(short = 'a', long = "age", visible_alias = "ages", num_args = 1.., value_parser = finite_f64)]
    ages: Vec<f64>,
    /// 要处理的通道。
    #[arg(short = 'c', long = "channel", visible_alias = "channels", num_args = 1..)]
    channels: Vec<String>,
    /// 图谱构建的迭代步。
    #[arg(short = 'i', long = "step", visible_alias = "steps", num_args = 1.., required = true)]
    steps: Vec<i32>,
    /// 长任务队列 (`local`、`condor` 或 SLURM 分区名)。
    #[arg(short = 'q', long = "queue", visible_alias = "long-queue")]
    long_queue: Option<String>,
    /// 短任务队列，默认与长任务队列相同。
    #[arg(long = "short-queue")]
    short_queue: Option<String>,
    /// 本机线程池大小，或在集群上每个任务申请的CPU数。
    #[arg(short = 't', long = "threads", value_parser = positive_usize)]
    threads: Option<usize>,
    /// 输出信息的详细程度：0 不输出，1 报告进度，2 输出任务命令行。
    #[arg(short = 'v', long = "verbose", default_value_t = 1)]
    verbose: u8,
}

impl MakePbmaps {
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut config = AtlasConfig::open(&self.config)
            .with_context(|| format!("无法读取配置文件`{}`", self.config.display()))?;
        config.apply(&self.overrides())?;
        let atlas = SpatioTemporalAtlas::new(config, self.verbose, true)
            .context("无法初始化图谱控制器")?;

        let ages = if self.ages.is_empty() {
            atlas.means()?
        } else {
            self.ages.clone()
        };
        build_pbmaps(&atlas, &self.channels(), &ages, &self.steps, self.verbose)
    }

    #[inline]
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            workdir: self.workdir.clone(),
            long_queue: self.long_queue.clone(),
            short_queue: self.short_queue.clone(),
            threads: self.threads,
        }
    }

    fn channels(&self) -> Vec<String> {
        if self.channels.is_empty() {
            DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect()
        } else {
            self.channels.clone()
        }
    }
}

/// 对每个通道、每个迭代步，先形变再平均，每一步都等待上一步的任务全部完成。
fn build_pbmaps<C: AtlasController>(
    atlas: &C,
    channels: &[String],
    ages: &[f64],
    steps: &[i32],
    verbose: u8,
) -> anyhow::Result<()> {
    for channel in channels {
        for &step in steps {
            if verbose > 0 {
                info!("通道`{channel}`，迭代步 {step}：{} 个时间点", ages.len());
            }
            let mut job = atlas.defimgs(channel, ages, step)?;
            atlas.wait(&mut job, DEFIMGS_INTERVAL, 1)?;
            let mut job = atlas.avgimgs(channel, "all", ages, step)?;
            atlas.wait(&mut job, AVGIMGS_INTERVAL, 2)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas::job::{Job, Queue};
    use clap::Parser;
    use std::cell::RefCell;
    use std::path::Path;

    #[derive(Parser, Debug)]
    struct Wrapper {
        #[command(flatten)]
        args: MakePbmaps,
    }

    fn parse(args: &[&str]) -> Result<MakePbmaps, clap::Error> {
        let argv = std::iter::once("make-pbmaps").chain(args.iter().copied());
        Wrapper::try_parse_from(argv).map(|w| w.args)
    }

    /// 记录调用顺序的控制器。
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl Recorder {
        fn job(&self, name: &str) -> atlas::Result<Job> {
            Ok(Queue::Local.submit(name, Vec::new(), None, Path::new("."))?)
        }
    }

    impl AtlasController for Recorder {
        fn means(&self) -> atlas::Result<Vec<f64>> {
            Ok(vec![30.0, 40.0])
        }

        fn defimgs(&self, channel: &str, ages: &[f64], step: i32) -> atlas::Result<Job> {
            self.calls
                .borrow_mut()
                .push(format!("defimgs {channel} {step} {ages:?}"));
            self.job("defimgs")
        }

        fn avgimgs(&self, channel: &str, labels: &str, ages: &[f64], step: i32) -> atlas::Result<Job> {
            self.calls
                .borrow_mut()
                .push(format!("avgimgs {channel} {labels} {step} {ages:?}"));
            self.job("avgimgs")
        }

        fn wait(&self, job: &mut Job, interval: Duration, verbose: u8) -> atlas::Result<bool> {
            self.calls
                .borrow_mut()
                .push(format!("wait {} {} {verbose}", job.name(), interval.as_secs()));
            Ok(true)
        }
    }

    #[test]
    fn test_parse_all_options() {
        let args = parse(&[
            "atlas.json", "-w", "/tmp/work", "-a", "30", "32.5", "-c", "tissues", "-i", "1", "2", "-q",
            "long", "--short-queue", "short", "-t", "4", "-v", "2",
        ])
        .unwrap();
        assert_eq!(args.config, PathBuf::from("atlas.json"));
        assert_eq!(args.workdir, Some(PathBuf::from("/tmp/work")));
        assert_eq!(args.ages, vec![30.0, 32.5]);
        assert_eq!(args.channels, vec!["tissues"]);
        assert_eq!(args.steps, vec![1, 2]);
        assert_eq!(args.long_queue.as_deref(), Some("long"));
        assert_eq!(args.short_queue.as_deref(), Some("short"));
        assert_eq!(args.threads, Some(4));
        assert_eq!(args.verbosity(), 2);
    }

    #[test]
    fn test_parse_aliases_and_defaults() {
        let args = parse(&["atlas.json", "--steps", "3", "--long-queue", "condor", "--tmpdir", "w"]).unwrap();
        assert_eq!(args.steps, vec![3]);
        assert_eq!(args.long_queue.as_deref(), Some("condor"));
        assert_eq!(args.workdir, Some(PathBuf::from("w")));
        assert!(args.ages.is_empty());
        assert_eq!(args.channels(), vec!["tissues", "structures"]);
        assert_eq!(args.verbosity(), 1);
    }

    #[test]
    fn test_parse_errors() {
        // 缺少 --step
        assert!(parse(&["atlas.json"]).is_err());
        assert!(parse(&["atlas.json", "-i", "1", "-t", "0"]).is_err());
        assert!(parse(&["atlas.json", "-i", "1", "-a", "nan"]).is_err());
        assert!(parse(&["-i", "1"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let args = parse(&["atlas.json", "-i", "1", "-q", "gpu", "-t", "2"]).unwrap();
        let o = args.overrides();
        assert_eq!(o.long_queue.as_deref(), Some("gpu"));
        assert_eq!(o.short_queue, None);
        assert_eq!(o.threads, Some(2));
        assert_eq!(o.workdir, None);
    }

    #[test]
    fn test_build_order() {
        let recorder = Recorder::default();
        let channels = vec!["tissues".to_string(), "structures".to_string()];
        build_pbmaps(&recorder, &channels, &[30.0], &[1, 2], 0).unwrap();
        let calls = recorder.calls.into_inner();
        assert_eq!(calls.len(), 16);
        assert_eq!(
            calls[..4],
            [
                "defimgs tissues 1 [30.0]",
                "wait defimgs 30 1",
                "avgimgs tissues all 1 [30.0]",
                "wait avgimgs 60 2",
            ]
        );
        assert_eq!(calls[4], "defimgs tissues 2 [30.0]");
        assert_eq!(calls[8], "defimgs structures 1 [30.0]");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_local_queue() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("atlas.json");
        std::fs::write(
            &config,
            r#"{"regression": {"means": []}, "environment": {"command": ["true"]}}"#,
        )
        .unwrap();
        let workdir = dir.path().join("work");
        let mut args = parse(&[
            config.to_str().unwrap(),
            "-i",
            "1",
            "-w",
            workdir.to_str().unwrap(),
            "-v",
            "0",
        ])
        .unwrap();
        // 没有时间点，任务为空，不需要等待。
        args.run().unwrap();
        assert!(workdir.join("jobs").join("atlas-config.json").is_file());
    }
}
