//! 追加写入文件的日志。
//!
//! 每次宿主调用都可以重新指定是否输出以及输出到哪个文件。
//! 关闭时不打开文件，也不写任何东西。

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{
    fmt,
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

struct State {
    verbose: bool,
    path: Option<PathBuf>,
}

/// 按行追加到文件的日志接收端。
pub struct FileSink {
    state: Mutex<State>,
}

impl Default for FileSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSink {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State {
                verbose: false,
                path: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure(&self, verbose: bool, path: Option<&Path>) {
        let mut state = self.state();
        state.verbose = verbose;
        state.path = path.map(Path::to_path_buf);
    }

    /// 打开输出且指定了文件。
    pub fn is_active(&self) -> bool {
        let state = self.state();
        state.verbose && state.path.is_some()
    }

    /// 追加一行。未打开输出时什么也不做。
    pub fn append(&self, line: fmt::Arguments) -> io::Result<()> {
        let state = self.state();
        let (true, Some(path)) = (state.verbose, &state.path) else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")
    }
}

impl Log for FileSink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info && self.is_active()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level = match record.level() {
                Level::Error => "Error",
                Level::Warn => "Warning",
                _ => "Info",
            };
            let _ = self.append(format_args!("{level}: {}", record.args()));
        }
    }

    fn flush(&self) {}
}

static SINK: FileSink = FileSink::new();

/// 把全局日志接收端设为 [`FileSink`]。已有接收端时什么也不做。
pub fn install() {
    if log::set_logger(&SINK).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// 重新指定全局接收端是否输出以及输出文件。
pub fn configure(verbose: bool, path: Option<&Path>) {
    SINK.configure(verbose, path)
}
