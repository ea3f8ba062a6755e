use crate::{diagnostics, QueueOptions};
use std::{env, path::PathBuf};

/// 进程级配置。
#[derive(Clone, Default, Debug)]
pub struct Config {
    /// 输出诊断日志。
    pub verbose: bool,
    /// 诊断日志追加写入的文件。
    pub log_file: Option<PathBuf>,
    pub force_cpu: bool,
    pub profiling: bool,
}

impl Config {
    /// 从 `CLHOST_VERBOSE`、`CLHOST_LOG_FILE`、`CLHOST_FORCE_CPU`、`CLHOST_PROFILING` 读取。
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| {
            lookup(key).is_some_and(|v| matches!(v.trim(), "1" | "true" | "on" | "yes"))
        };
        Self {
            verbose: flag("CLHOST_VERBOSE"),
            log_file: lookup("CLHOST_LOG_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            force_cpu: flag("CLHOST_FORCE_CPU"),
            profiling: flag("CLHOST_PROFILING"),
        }
    }

    /// 安装并配置全局日志接收端。
    pub fn apply(&self) {
        diagnostics::install();
        diagnostics::configure(self.verbose, self.log_file.as_deref());
    }

    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            force_cpu: self.force_cpu,
            profiling: self.profiling,
        }
    }
}
