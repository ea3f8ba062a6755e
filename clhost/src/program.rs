use crate::{
    build_failure, invalid_argument, invalid_handle, kernel_creation_failure,
    program_creation_failure, release_failure, source_read_failure, CommandQueue, Driver, Result,
};
use log::{error, info, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// 一次批量构建最多的内核数。
pub const MAX_KERNELS: usize = 16;

/// 一个待构建的内核：源文件、编译选项和入口函数名。
#[derive(Clone, Debug)]
pub struct KernelSource {
    pub path: PathBuf,
    pub options: String,
    pub entry: String,
    /// 拼接在文件内容之前的源码。
    pub preamble: String,
}

impl KernelSource {
    pub fn new(
        path: impl Into<PathBuf>,
        options: impl Into<String>,
        entry: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            options: options.into(),
            entry: entry.into(),
            preamble: String::new(),
        }
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }
}

/// 读出 `path` 的全部文本，拼接在 `preamble` 之后。
pub fn load_source(path: &Path, preamble: &str) -> io::Result<String> {
    let text = fs::read_to_string(path)?;
    let mut source = String::with_capacity(preamble.len() + text.len() + 1);
    source.push_str(preamble);
    if !preamble.is_empty() && !preamble.ends_with('\n') {
        source.push('\n');
    }
    source.push_str(&text);
    Ok(source)
}

struct Built<D: Driver> {
    entry: String,
    kernel: D::Kernel,
    program: D::Program,
}

/// 一批已构建的内核，按输入顺序编号。
///
/// 每个内核有自己的程序。批次释放时依次释放内核和程序。
pub struct KernelBatch<'d, D: Driver> {
    driver: &'d D,
    queue: u64,
    built: Vec<Built<D>>,
}

/// 构建途中的程序，离开作用域时释放。
struct Pending<'d, D: Driver> {
    driver: &'d D,
    program: Option<D::Program>,
}

impl<D: Driver> Pending<'_, D> {
    fn program(&mut self) -> &mut D::Program {
        match &mut self.program {
            Some(program) => program,
            None => unreachable!(),
        }
    }

    fn take(mut self) -> Option<D::Program> {
        self.program.take()
    }
}

impl<D: Driver> Drop for Pending<'_, D> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            if let Err(s) = self.driver.release_program(program) {
                warn!("failed to release program: {s}");
            }
        }
    }
}

impl<'d, D: Driver> KernelBatch<'d, D> {
    /// 依次读取、编译每个源文件并创建入口内核。
    ///
    /// 任何一步失败都会释放此前创建的全部程序和内核。
    pub fn build(queue: &CommandQueue<'d, D>, sources: &[KernelSource]) -> Result<Self> {
        if sources.is_empty() || sources.len() > MAX_KERNELS {
            return Err(invalid_argument(format!(
                "{} kernels requested, 1 to {MAX_KERNELS} supported",
                sources.len()
            )));
        }
        let driver = queue.driver();
        let mut batch = Self {
            driver,
            queue: queue.id(),
            built: Vec::with_capacity(sources.len()),
        };
        for (i, source) in sources.iter().enumerate() {
            let built = Self::build_one(queue, i, source)?;
            batch.built.push(built);
        }
        info!("{} kernels built", batch.built.len());
        Ok(batch)
    }

    fn build_one(queue: &CommandQueue<'d, D>, i: usize, source: &KernelSource) -> Result<Built<D>> {
        let driver = queue.driver();
        let path = source.path.display();

        let text = load_source(&source.path, &source.preamble).map_err(|e| {
            error!("failed to read kernel source {path}: {e}");
            source_read_failure(format!("failed to read kernel source {path}: {e}"))
        })?;
        info!("kernel source {i} read from {path}");

        let program = driver.create_program(queue.context(), &text).map_err(|s| {
            error!("failed to create program {i} from {path}: {s}");
            program_creation_failure(format!("failed to create program from {path}")).with_status(s)
        })?;
        let mut pending = Pending {
            driver,
            program: Some(program),
        };

        if let Err(s) = driver.build_program(pending.program(), queue.device(), &source.options) {
            let log = driver
                .build_log(pending.program(), queue.device())
                .unwrap_or_else(|e| format!("<build log unavailable: {e}>"));
            error!("failed to build program {i} from {path} with options {:?}: {s}", source.options);
            error!("build log:\n{log}");
            return Err(build_failure(format!("failed to build program from {path}"))
                .with_status(s)
                .with_build_log(log));
        }
        info!("program {i} built");

        let kernel = driver
            .create_kernel(pending.program(), &source.entry)
            .map_err(|s| {
                error!("failed to create kernel {} from {path}: {s}", source.entry);
                kernel_creation_failure(format!("failed to create kernel {}", source.entry))
                    .with_status(s)
            })?;
        info!("kernel {i} ({}) created", source.entry);

        match pending.take() {
            Some(program) => Ok(Built {
                entry: source.entry.clone(),
                kernel,
                program,
            }),
            None => unreachable!(),
        }
    }

    #[inline]
    pub(crate) fn driver(&self) -> &'d D {
        self.driver
    }

    /// 构建这批内核的队列编号。
    #[inline]
    pub fn queue_id(&self) -> u64 {
        self.queue
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.built.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }

    /// 第 `index` 个内核的入口函数名。
    pub fn entry(&self, index: usize) -> Option<&str> {
        self.built.get(index).map(|b| b.entry.as_str())
    }

    pub(crate) fn kernel(&self, index: usize) -> Result<&D::Kernel> {
        self.built.get(index).map(|b| &b.kernel).ok_or_else(|| {
            invalid_handle(format!(
                "kernel {index} out of range, batch holds {}",
                self.built.len()
            ))
        })
    }

    /// 释放全部内核和程序，返回第一个失败。
    pub fn release(mut self) -> Result<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for (i, built) in self.built.drain(..).enumerate() {
            let Built {
                entry,
                kernel,
                program,
            } = built;
            if let Err(s) = self.driver.release_kernel(kernel) {
                warn!("failed to release kernel {i} ({entry}): {s}");
                if result.is_ok() {
                    result = Err(release_failure(format!("failed to release kernel {entry}"))
                        .with_status(s));
                }
            }
            if let Err(s) = self.driver.release_program(program) {
                warn!("failed to release program {i}: {s}");
                if result.is_ok() {
                    result = Err(release_failure(format!("failed to release program {i}"))
                        .with_status(s));
                }
            }
        }
        result
    }
}

impl<D: Driver> Drop for KernelBatch<'_, D> {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}
