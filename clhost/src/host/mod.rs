//! 宿主调用约定的适配层。
//!
//! 每个入口接收一组位置参数槽，返回 0 或负的错误码。
//! 参数个数首先检查，不符时不做任何设备调用。
//! 每个入口的最后两个槽是本次调用的日志开关和日志文件路径。

mod param;

pub use param::{HostStr, Param};

use crate::{
    argument_count_mismatch, diagnostics, invalid_argument, invalid_handle,
    registry::image_size, AccessMode, CommandQueue, Driver, ErrorKind, KernelArg, KernelBatch,
    KernelSource, MemoryRegistry, NdRange, QueueOptions, Result,
};
use log::{error, info};
use param::Slots;
use std::collections::HashMap;

/// 错误类别在宿主约定中的编码。
pub fn status_code(kind: ErrorKind) -> i32 {
    use ErrorKind::*;
    match kind {
        ArgumentCountMismatch => -1,
        InvalidArgument => -2,
        EnumerationFailure => -3,
        InvalidHandle => -4,
        ContextCreationFailure => -6,
        QueueCreationFailure => -7,
        ProgramCreationFailure => -8,
        BuildFailure => -9,
        KernelCreationFailure => -10,
        SourceReadFailure => -11,
        AllocationFailure => -12,
        TransferFailure => -13,
        BindFailure => -14,
        ExecutionFailure => -15,
        SynchronizationFailure => -16,
        ReleaseFailure => -17,
    }
}

/// 宿主持有的全部资源：命令队列、内核批次和一个存储对象注册表。
pub struct Host<'d, D: Driver> {
    driver: &'d D,
    registry: MemoryRegistry<'d, D>,
    batches: HashMap<u64, KernelBatch<'d, D>>,
    queues: HashMap<u64, CommandQueue<'d, D>>,
    next_id: u64,
}

impl<'d, D: Driver> Host<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        diagnostics::install();
        Self {
            driver,
            registry: MemoryRegistry::new(driver),
            batches: HashMap::new(),
            queues: HashMap::new(),
            next_id: 1,
        }
    }

    fn run(
        &mut self,
        name: &str,
        argv: &mut [Param],
        expected: usize,
        f: impl FnOnce(&mut Self, &mut Slots) -> Result<()>,
    ) -> i32 {
        if argv.len() != expected {
            let e = argument_count_mismatch(format!(
                "{name}: {expected} arguments expected, {} found",
                argv.len()
            ));
            error!("{e}");
            return status_code(e.kind);
        }
        let mut slots = Slots(argv);
        if expected >= 2 {
            match (slots.bool(expected - 2), slots.path(expected - 1)) {
                (Ok(verbose), Ok(path)) => diagnostics::configure(verbose, path.as_deref()),
                (Err(e), _) | (_, Err(e)) => {
                    error!("{name}: {e}");
                    return status_code(e.kind);
                }
            }
        }
        match f(self, &mut slots) {
            Ok(()) => 0,
            Err(e) => {
                error!("{name}: {e}");
                status_code(e.kind)
            }
        }
    }

    fn issue_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn queue(&self, id: u64) -> Result<&CommandQueue<'d, D>> {
        self.queues
            .get(&id)
            .ok_or_else(|| invalid_handle(format!("command queue {id} not found")))
    }

    fn batch(&self, id: u64) -> Result<&KernelBatch<'d, D>> {
        self.batches
            .get(&id)
            .ok_or_else(|| invalid_handle(format!("kernel batch {id} not found")))
    }

    /// `[queue out, force_cpu, verbose, log]`
    pub fn create_command_queue(&mut self, argv: &mut [Param]) -> i32 {
        self.run("create_command_queue", argv, 4, |this, args| {
            let verbose = args.bool(2)?;
            let options = QueueOptions {
                force_cpu: args.bool(1)?,
                profiling: verbose,
            };
            let queue = CommandQueue::create(this.driver, options)?;
            let id = this.issue_id();
            args.set_handle(0, id)?;
            this.queues.insert(id, queue);
            Ok(())
        })
    }

    /// `[queue, verbose, log]`
    pub fn release_command_queue(&mut self, argv: &mut [Param]) -> i32 {
        self.run("release_command_queue", argv, 3, |this, args| {
            let id = args.handle(0)?;
            let queue = this
                .queues
                .remove(&id)
                .ok_or_else(|| invalid_handle(format!("command queue {id} not found")))?;
            queue.release()?;
            info!("command queue {id} released");
            Ok(())
        })
    }

    /// `[queue, batch out, n, paths, entries, options, verbose, log]`
    pub fn build_kernels(&mut self, argv: &mut [Param]) -> i32 {
        self.run("build_kernels", argv, 8, |this, args| {
            let queue = this.queue(args.handle(0)?)?;
            let n = args.count(2)?;
            let paths = args.strs(3, n)?;
            let entries = args.strs(4, n)?;
            let options = args.strs(5, n)?;
            let sources = paths
                .into_iter()
                .zip(entries)
                .zip(options)
                .map(|((path, entry), options)| KernelSource::new(path, options, entry))
                .collect::<Vec<_>>();
            let batch = KernelBatch::build(queue, &sources)?;
            let id = this.issue_id();
            args.set_handle(1, id)?;
            this.batches.insert(id, batch);
            Ok(())
        })
    }

    /// `[batch, n, verbose, log]`
    pub fn release_kernels(&mut self, argv: &mut [Param]) -> i32 {
        self.run("release_kernels", argv, 4, |this, args| {
            let id = args.handle(0)?;
            let n = args.count(1)?;
            let len = this.batch(id)?.len();
            if n != len {
                return Err(invalid_argument(format!(
                    "batch {id} holds {len} kernels, {n} given"
                )));
            }
            if let Some(batch) = this.batches.remove(&id) {
                batch.release()?;
            }
            info!("kernel batch {id} released");
            Ok(())
        })
    }

    /// `[queue, index, content, size, access, use_host_ptr, verbose, log]`
    ///
    /// # Safety
    ///
    /// `use_host_ptr` 为真时 `content` 必须是可变字节槽，它指向的内存在对象释放前必须保持有效。
    pub unsafe fn create_buffer(&mut self, argv: &mut [Param]) -> i32 {
        self.run("create_buffer", argv, 8, |this, args| {
            let index = args.index(1)?;
            let size = args.count(3)?;
            let access = AccessMode::from_code(args.i32(4)?)?;
            let queue = this.queues.get(&args.handle(0)?);
            let queue = queue.ok_or_else(|| invalid_handle("command queue not found"))?;
            if args.bool(5)? {
                let (host, len) = args.host_ptr(2)?;
                check_size(size, len)?;
                unsafe {
                    this.registry
                        .create_buffer_zero_copy(queue, index, host, size, access)
                }?;
            } else {
                let content = args.bytes(2)?;
                check_size(size, content.len())?;
                this.registry
                    .create_buffer(queue, index, &content[..size], access)?;
            }
            Ok(())
        })
    }

    /// `[queue, index, content, width, height, depth, access, use_host_ptr, verbose, log]`
    ///
    /// # Safety
    ///
    /// 同 [`Host::create_buffer`]。
    pub unsafe fn create_image(&mut self, argv: &mut [Param]) -> i32 {
        self.run("create_image", argv, 10, |this, args| {
            let index = args.index(1)?;
            let extent = [args.count(3)?, args.count(4)?, args.count(5)?];
            let access = AccessMode::from_code(args.i32(6)?)?;
            let size = image_size(extent)?;
            let queue = this.queues.get(&args.handle(0)?);
            let queue = queue.ok_or_else(|| invalid_handle("command queue not found"))?;
            if args.bool(7)? {
                let (host, len) = args.host_ptr(2)?;
                check_size(size, len)?;
                unsafe {
                    this.registry
                        .create_image_zero_copy(queue, index, host, extent, access)
                }?;
            } else {
                let content = args.bytes(2)?;
                check_size(size, content.len())?;
                this.registry
                    .create_image(queue, index, &content[..size], extent, access)?;
            }
            Ok(())
        })
    }

    /// `[queue, index, dst, size, verbose, log]`
    pub fn read_buffer(&mut self, argv: &mut [Param]) -> i32 {
        self.run("read_buffer", argv, 6, Self::read)
    }

    /// `[queue, index, dst, size, verbose, log]`
    pub fn read_image(&mut self, argv: &mut [Param]) -> i32 {
        self.run("read_image", argv, 6, Self::read)
    }

    /// `[queue, index, src, size, verbose, log]`
    pub fn write_buffer(&mut self, argv: &mut [Param]) -> i32 {
        self.run("write_buffer", argv, 6, Self::write)
    }

    /// `[queue, index, src, size, verbose, log]`
    pub fn write_image(&mut self, argv: &mut [Param]) -> i32 {
        self.run("write_image", argv, 6, Self::write)
    }

    fn read(&mut self, args: &mut Slots) -> Result<()> {
        let queue = self.queue(args.handle(0)?)?;
        let handle = self.registry.handle_at(args.index(1)?)?;
        let size = args.count(3)?;
        let dst = args.bytes_mut(2)?;
        check_size(size, dst.len())?;
        self.registry.read(queue, handle, &mut dst[..size])
    }

    fn write(&mut self, args: &mut Slots) -> Result<()> {
        let handle = self.registry.handle_at(args.index(1)?)?;
        let size = args.count(3)?;
        let src = args.bytes(2)?;
        check_size(size, src.len())?;
        let queue = self
            .queues
            .get(&args.handle(0)?)
            .ok_or_else(|| invalid_handle("command queue not found"))?;
        self.registry.write(queue, handle, &src[..size])
    }

    /// `[index, verbose, log]`
    pub fn release_buffer(&mut self, argv: &mut [Param]) -> i32 {
        self.run("release_buffer", argv, 3, Self::release_mem)
    }

    /// `[index, verbose, log]`
    pub fn release_image(&mut self, argv: &mut [Param]) -> i32 {
        self.run("release_image", argv, 3, Self::release_mem)
    }

    fn release_mem(&mut self, args: &mut Slots) -> Result<()> {
        let handle = self.registry.handle_at(args.index(0)?)?;
        self.registry.release(handle)
    }

    /// `[batch, kernel, arg index, arg size, value, is_mem, verbose, log]`
    ///
    /// `is_mem` 为真时 `value` 是注册表槽位，否则是按值传递的字节。
    pub fn set_kernel_arg(&mut self, argv: &mut [Param]) -> i32 {
        self.run("set_kernel_arg", argv, 8, |this, args| {
            let batch = this.batch(args.handle(0)?)?;
            let kernel = args.index(1)?;
            let index = args.u32(2)?;
            let arg = if args.bool(5)? {
                KernelArg::Mem(this.registry.handle_at(args.index(4)?)?)
            } else {
                let size = args.count(3)?;
                let bytes = args.bytes(4)?;
                check_size(size, bytes.len())?;
                KernelArg::Bytes(&bytes[..size])
            };
            batch.set_arg(kernel, index, arg, &this.registry)
        })
    }

    /// `[queue, batch, kernel, use_local, global, local, verbose, log]`
    ///
    /// 打开日志且队列支持计时时记录执行时间。
    pub fn execute_kernel(&mut self, argv: &mut [Param]) -> i32 {
        self.run("execute_kernel", argv, 8, |this, args| {
            let queue = this.queue(args.handle(0)?)?;
            let batch = this.batch(args.handle(1)?)?;
            let kernel = args.index(2)?;
            let [x, y, z, _] = args.uint4(4)?;
            let mut range = NdRange::new([x as _, y as _, z as _]);
            if args.bool(3)? {
                let [x, y, z, _] = args.uint4(5)?;
                range = range.with_local([x as _, y as _, z as _]);
            }
            let profile = args.bool(6)? && queue.profiling();
            queue.execute(batch, kernel, range, profile)?;
            Ok(())
        })
    }

    /// 释放全部批次、存储对象和命令队列。
    pub fn unload(&mut self, argv: &mut [Param]) -> i32 {
        self.run("unload", argv, 0, |this, _| {
            let mut result = Ok(());
            for (_, batch) in this.batches.drain() {
                let r = batch.release();
                if result.is_ok() {
                    result = r;
                }
            }
            let r = this.registry.release_all();
            if result.is_ok() {
                result = r;
            }
            for (_, queue) in this.queues.drain() {
                let r = queue.release();
                if result.is_ok() {
                    result = r;
                }
            }
            info!("all resources released");
            result
        })
    }
}

fn check_size(size: usize, len: usize) -> Result<()> {
    if size <= len {
        Ok(())
    } else {
        Err(invalid_argument(format!(
            "size {size} exceeds the {len} bytes supplied"
        )))
    }
}
