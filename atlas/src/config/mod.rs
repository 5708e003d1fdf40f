//! 图谱配置文件。
//!
//! 配置文件是一个 JSON 文档，顶层包括 `paths`、`environment` 等小节。本模块只解析本工具会读写的键，
//! 其余键原样保留，并在 [`AtlasConfig::to_json`] 时写回，交由外部任务程序使用。

mod error;

pub use error::ConfigError;

use json::JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

/// 没有配置 `environment.command` 时调用的外部任务程序。
pub const DEFAULT_TASK_COMMAND: &str = "atlas-task";

/// 队列名 `local` 表示在本机执行。
pub const LOCAL_QUEUE: &str = "local";

type ConfigResult<T> = Result<T, ConfigError>;

/// 工作目录相关的路径。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paths {
    /// 图谱顶层目录。
    pub topdir: PathBuf,
    /// 中间文件目录；未设置时使用 `topdir`。
    pub tmpdir: Option<PathBuf>,
}

/// 短任务与长任务分别使用的批处理队列名。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueNames {
    pub short: String,
    pub long: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            short: LOCAL_QUEUE.to_string(),
            long: LOCAL_QUEUE.to_string(),
        }
    }
}

/// 运行环境。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Environment {
    pub queue: QueueNames,
    /// 单个任务可使用的最大 CPU 核数/线程数。
    pub threads: Option<usize>,
    /// 外部任务程序及其前置参数。
    pub command: Vec<String>,
}

/// 命令行给出的、需要覆盖配置文件的值。
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub workdir: Option<PathBuf>,
    pub long_queue: Option<String>,
    pub short_queue: Option<String>,
    pub threads: Option<usize>,
}

/// 合并后的图谱配置。
#[derive(Clone, Debug)]
pub struct AtlasConfig {
    doc: JsonValue,
    root: PathBuf,
    source: Option<PathBuf>,
    pub paths: Paths,
    pub environment: Environment,
}

impl AtlasConfig {
    /// 读取 `path` 处的 JSON 配置文件。配置文件所在目录即为配置根目录。
    pub fn open<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = absolute(path.as_ref())?;
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let doc = json::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let mut config = Self::from_json(doc, root)?;
        config.source = Some(path);
        Ok(config)
    }

    /// 从已解析的文档构建配置。缺失的 `paths`、`environment`、`environment.queue` 使用默认值。
    pub fn from_json(doc: JsonValue, root: PathBuf) -> ConfigResult<Self> {
        if !doc.is_object() {
            return Err(ConfigError::invalid("<root>", "expected a JSON object"));
        }

        let paths = if doc.has_key("paths") {
            let node = &doc["paths"];
            Paths {
                topdir: opt_str(node, "paths.topdir", "topdir")?
                    .map(|s| root.join(s))
                    .unwrap_or_else(|| root.clone()),
                tmpdir: opt_str(node, "paths.tmpdir", "tmpdir")?.map(|s| root.join(s)),
            }
        } else {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
                path: PathBuf::from("."),
                source,
            })?;
            Paths {
                topdir: cwd,
                tmpdir: None,
            }
        };

        let env = &doc["environment"];
        let queue = if env.has_key("queue") {
            let node = &env["queue"];
            let defaults = QueueNames::default();
            QueueNames {
                short: opt_str(node, "environment.queue.short", "short")?
                    .unwrap_or(defaults.short),
                long: opt_str(node, "environment.queue.long", "long")?.unwrap_or(defaults.long),
            }
        } else {
            QueueNames::default()
        };
        let threads = match &env["threads"] {
            JsonValue::Null => None,
            v => Some(
                v.as_usize()
                    .ok_or_else(|| ConfigError::invalid("environment.threads", "expected a non-negative integer"))?,
            ),
        };
        let command = match &env["command"] {
            JsonValue::Null => vec![DEFAULT_TASK_COMMAND.to_string()],
            v if v.is_string() => v
                .as_str()
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            v if v.is_array() => v
                .members()
                .map(|m| {
                    m.as_str().map(str::to_string).ok_or_else(|| {
                        ConfigError::invalid("environment.command", "expected an array of strings")
                    })
                })
                .collect::<ConfigResult<Vec<_>>>()?,
            _ => {
                return Err(ConfigError::invalid(
                    "environment.command",
                    "expected a string or an array of strings",
                ))
            }
        };

        Ok(Self {
            doc,
            root,
            source: None,
            paths,
            environment: Environment {
                queue,
                threads,
                command,
            },
        })
    }

    /// 将命令行参数合并进配置。
    ///
    /// 只给出长队列而未给出短队列时，短队列也使用长队列。
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> ConfigResult<()> {
        if let Some(workdir) = &overrides.workdir {
            self.paths.tmpdir = Some(absolute(workdir)?);
        }
        if let Some(threads) = overrides.threads {
            self.environment.threads = Some(threads);
        }
        let short = overrides
            .short_queue
            .as_ref()
            .or(overrides.long_queue.as_ref());
        if let Some(short) = short {
            self.environment.queue.short = short.clone();
        }
        if let Some(long) = &overrides.long_queue {
            self.environment.queue.long = long.clone();
        }
        Ok(())
    }

    /// 提交任务前必须给出短、长两个队列名。
    pub fn validate(&self) -> ConfigResult<()> {
        if self.environment.queue.short.trim().is_empty() {
            return Err(ConfigError::MissingQueue("short"));
        }
        if self.environment.queue.long.trim().is_empty() {
            return Err(ConfigError::MissingQueue("long"));
        }
        if self.environment.command.is_empty() {
            return Err(ConfigError::invalid("environment.command", "must not be empty"));
        }
        Ok(())
    }

    /// 配置文件所在目录。
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 中间文件目录。
    #[inline]
    pub fn workdir(&self) -> &Path {
        self.paths.tmpdir.as_deref().unwrap_or(&self.paths.topdir)
    }

    /// 图谱各时间点的默认年龄，即 `regression.means`。
    pub fn means(&self) -> ConfigResult<Vec<f64>> {
        let node = &self.doc["regression"]["means"];
        if node.is_null() {
            return Err(ConfigError::MissingMeans);
        }
        if let Some(v) = node.as_f64() {
            return Ok(vec![v]);
        }
        if !node.is_array() {
            return Err(ConfigError::invalid("regression.means", "expected an array of numbers"));
        }
        node.members()
            .map(|m| {
                m.as_f64()
                    .ok_or_else(|| ConfigError::invalid("regression.means", "expected an array of numbers"))
            })
            .collect()
    }

    /// 生成合并后的 JSON 文档，未知的键原样保留。
    pub fn to_json(&self) -> JsonValue {
        let mut doc = self.doc.clone();

        doc["paths"]["topdir"] = path_value(&self.paths.topdir);
        if let Some(tmpdir) = &self.paths.tmpdir {
            doc["paths"]["tmpdir"] = path_value(tmpdir);
        }

        let env = &mut doc["environment"];
        env["queue"]["short"] = self.environment.queue.short.as_str().into();
        env["queue"]["long"] = self.environment.queue.long.as_str().into();
        if let Some(threads) = self.environment.threads {
            env["threads"] = threads.into();
        }
        env["command"] = JsonValue::Array(
            self.environment
                .command
                .iter()
                .map(|s| s.as_str().into())
                .collect(),
        );
        doc
    }

    /// 读入该配置的文件。由 [`from_json`](Self::from_json) 构建时为 `None`。
    #[inline]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 将合并后的配置写入 `path`，必要时创建父目录。`path` 不能是读入该配置的文件。
    pub fn dump<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(source) = &self.source {
            if same_file(source, path) {
                return Err(ConfigError::Overwrite(source.clone()));
            }
        }
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_json().pretty(2)).map_err(io_err)
    }
}

fn opt_str(node: &JsonValue, full_key: &'static str, key: &str) -> ConfigResult<Option<String>> {
    match &node[key] {
        JsonValue::Null => Ok(None),
        v => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| ConfigError::invalid(full_key, "expected a string")),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[inline]
fn path_value(p: &Path) -> JsonValue {
    p.to_string_lossy().as_ref().into()
}

/// 相对路径按当前工作目录补全。不要求路径存在。
pub(crate) fn absolute(p: &Path) -> ConfigResult<PathBuf> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| ConfigError::Io {
        path: p.to_path_buf(),
        source,
    })?;
    Ok(cwd.join(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn load(text: &str) -> AtlasConfig {
        AtlasConfig::from_json(json::parse(text).unwrap(), PathBuf::from("/data/atlas")).unwrap()
    }

    #[test]
    fn test_missing_sections_get_defaults() {
        let cfg = load("{}");
        assert_eq!(cfg.paths.topdir, std::env::current_dir().unwrap());
        assert_eq!(cfg.paths.tmpdir, None);
        assert_eq!(cfg.environment.queue, QueueNames::default());
        assert_eq!(cfg.environment.threads, None);
        assert_eq!(cfg.environment.command, vec![DEFAULT_TASK_COMMAND.to_string()]);
    }

    #[test]
    fn test_relative_paths_resolve_against_root() {
        let cfg = load(r#"{"paths": {"topdir": "top", "tmpdir": "/scratch/tmp"}}"#);
        assert_eq!(cfg.paths.topdir, PathBuf::from("/data/atlas/top"));
        assert_eq!(cfg.paths.tmpdir, Some(PathBuf::from("/scratch/tmp")));
        assert_eq!(cfg.workdir(), Path::new("/scratch/tmp"));
    }

    #[test]
    fn test_long_queue_sets_short_queue() {
        let mut cfg = load("{}");
        cfg.apply(&ConfigOverrides {
            long_queue: Some("long.q".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.environment.queue.long, "long.q");
        assert_eq!(cfg.environment.queue.short, "long.q");
    }

    #[test]
    fn test_explicit_short_queue_wins() {
        let mut cfg = load(r#"{"environment": {"queue": {"short": "a", "long": "b"}}}"#);
        cfg.apply(&ConfigOverrides {
            long_queue: Some("long.q".into()),
            short_queue: Some("short.q".into()),
            threads: Some(8),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.environment.queue.short, "short.q");
        assert_eq!(cfg.environment.queue.long, "long.q");
        assert_eq!(cfg.environment.threads, Some(8));
    }

    #[test]
    fn test_no_overrides_keeps_file_values() {
        let mut cfg = load(r#"{"environment": {"queue": {"short": "a", "long": "b"}, "threads": 4}}"#);
        cfg.apply(&ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.environment.queue.short, "a");
        assert_eq!(cfg.environment.queue.long, "b");
        assert_eq!(cfg.environment.threads, Some(4));
    }

    #[test]
    fn test_workdir_override_is_absolute() {
        let mut cfg = load("{}");
        cfg.apply(&ConfigOverrides {
            workdir: Some("work".into()),
            ..Default::default()
        })
        .unwrap();
        let tmpdir = cfg.paths.tmpdir.clone().unwrap();
        assert!(tmpdir.is_absolute());
        assert!(tmpdir.ends_with("work"));
    }

    #[test]
    fn test_validate_rejects_empty_queue() {
        let cfg = load(r#"{"environment": {"queue": {"short": "", "long": "b"}}}"#);
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingQueue("short"))));
    }

    #[test]
    fn test_means() {
        let cfg = load(r#"{"regression": {"means": [28, 30.5, 32]}}"#);
        assert_eq!(cfg.means().unwrap(), vec![28.0, 30.5, 32.0]);
        assert!(matches!(load("{}").means(), Err(ConfigError::MissingMeans)));
    }

    #[test]
    fn test_bad_field_types() {
        let doc = json::parse(r#"{"environment": {"threads": "many"}}"#).unwrap();
        let err = AtlasConfig::from_json(doc, PathBuf::from("/")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidField { key: "environment.threads", .. }));

        let doc = json::parse("[1, 2]").unwrap();
        assert!(AtlasConfig::from_json(doc, PathBuf::from("/")).is_err());
    }

    #[test]
    fn test_command_from_string() {
        let cfg = load(r#"{"environment": {"command": "python -m atlas_task"}}"#);
        assert_eq!(cfg.environment.command, vec!["python", "-m", "atlas_task"]);
    }

    #[test]
    fn test_to_json_keeps_unknown_keys() {
        let mut cfg = load(r#"{"images": {"dir": "img"}, "environment": {"mem": 4}}"#);
        cfg.apply(&ConfigOverrides {
            long_queue: Some("slurm-long".into()),
            threads: Some(2),
            ..Default::default()
        })
        .unwrap();
        let doc = cfg.to_json();
        assert_eq!(doc["images"]["dir"], "img");
        assert_eq!(doc["environment"]["mem"], 4);
        assert_eq!(doc["environment"]["threads"], 2);
        assert_eq!(doc["environment"]["queue"]["short"], "slurm-long");
        assert_eq!(doc["environment"]["queue"]["long"], "slurm-long");
    }

    #[test]
    fn test_open_and_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"paths": {{"topdir": "."}}, "regression": {{"means": [36]}}}}"#).unwrap();
        drop(f);

        let cfg = AtlasConfig::open(&path).unwrap();
        assert_eq!(cfg.root(), dir.path());
        assert_eq!(cfg.means().unwrap(), vec![36.0]);

        let out = dir.path().join("work").join("config.json");
        cfg.dump(&out).unwrap();
        let reread = AtlasConfig::open(&out).unwrap();
        assert_eq!(reread.environment, cfg.environment);
        assert_eq!(reread.paths.topdir, cfg.paths.topdir);
    }

    #[test]
    fn test_dump_refuses_to_overwrite_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let text = r#"{"paths": {"topdir": "."}, "regression": {"means": [36]}}"#;
        fs::write(&path, text).unwrap();

        let cfg = AtlasConfig::open(&path).unwrap();
        assert_eq!(cfg.source(), Some(path.as_path()));
        let err = cfg.dump(dir.path().join(".").join("config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Overwrite(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_open_missing_file() {
        let err = AtlasConfig::open("/nonexistent/atlas.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
