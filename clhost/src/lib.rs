// #![deny(warnings)]

mod arg;
mod config;
mod handle;
mod launch;
mod program;
mod queue;
mod registry;
mod selector;

pub mod diagnostics;
pub mod host;

#[cfg(test)]
mod test;

pub use arg::{KernelArg, Scalar};
pub use common::*;
pub use config::Config;
pub use launch::NdRange;
pub use program::{load_source, KernelBatch, KernelSource, MAX_KERNELS};
pub use queue::{CommandQueue, QueueOptions};
pub use registry::{MemHandle, MemKind, MemoryRegistry, CAPACITY};
pub use selector::{select_device, SelectedDevice};

#[cfg(any(use_cpu, test))]
pub use handle::common_cpu;

#[cfg(use_cl)]
pub use handle::opencl;
#[cfg(use_cl)]
pub extern crate opencl3;

use std::ptr::NonNull;

/// 驱动调用的结果，失败时是 API 的原始状态码。
pub type DriverResult<T> = std::result::Result<T, Status>;

/// 计算 API 驱动抽象。
///
/// 约定平台、设备、上下文、队列、程序、内核、存储对象和事件的具体类型，
/// 以及管线用到的全部 API 调用。所有调用都以 API 的原始状态码报告失败，
/// 由上层决定归入哪一类错误。
pub trait Driver {
    type Platform;
    type Device: Clone;
    type Context;
    type Queue;
    type Program;
    type Kernel;
    type Mem;
    type Event;

    fn platforms(&self) -> DriverResult<Vec<Self::Platform>>;
    fn platform_name(&self, platform: &Self::Platform) -> DriverResult<String>;
    /// 平台上没有该类别的设备时返回空表。
    fn devices(
        &self,
        platform: &Self::Platform,
        class: DeviceClass,
    ) -> DriverResult<Vec<Self::Device>>;
    fn device_name(&self, device: &Self::Device) -> DriverResult<String>;

    fn create_context(&self, device: &Self::Device) -> DriverResult<Self::Context>;
    fn create_queue(
        &self,
        context: &Self::Context,
        device: &Self::Device,
        profiling: bool,
    ) -> DriverResult<Self::Queue>;
    fn release_queue(&self, queue: Self::Queue) -> DriverResult<()>;
    fn release_context(&self, context: Self::Context) -> DriverResult<()>;

    fn create_program(&self, context: &Self::Context, source: &str)
        -> DriverResult<Self::Program>;
    fn build_program(
        &self,
        program: &mut Self::Program,
        device: &Self::Device,
        options: &str,
    ) -> DriverResult<()>;
    fn build_log(&self, program: &Self::Program, device: &Self::Device) -> DriverResult<String>;
    fn create_kernel(&self, program: &Self::Program, name: &str) -> DriverResult<Self::Kernel>;
    fn release_kernel(&self, kernel: Self::Kernel) -> DriverResult<()>;
    fn release_program(&self, program: Self::Program) -> DriverResult<()>;

    /// 创建线性缓冲区。`host` 为空时由设备分配 `size` 字节。
    ///
    /// # Safety
    ///
    /// `host` 非空时，对象存续期间它必须指向至少 `size` 字节的有效内存，设备直接使用这块内存。
    unsafe fn create_buffer(
        &self,
        context: &Self::Context,
        access: AccessMode,
        size: usize,
        host: Option<NonNull<u8>>,
    ) -> DriverResult<Self::Mem>;
    /// 创建 4 通道浮点三维图像。
    ///
    /// # Safety
    ///
    /// 同 [`Driver::create_buffer`]，`host` 须覆盖整个图像。
    unsafe fn create_image(
        &self,
        context: &Self::Context,
        access: AccessMode,
        extent: [usize; 3],
        host: Option<NonNull<u8>>,
    ) -> DriverResult<Self::Mem>;
    fn write_buffer(&self, queue: &Self::Queue, mem: &mut Self::Mem, src: &[u8])
        -> DriverResult<()>;
    fn read_buffer(&self, queue: &Self::Queue, mem: &Self::Mem, dst: &mut [u8])
        -> DriverResult<()>;
    fn write_image(
        &self,
        queue: &Self::Queue,
        mem: &mut Self::Mem,
        extent: [usize; 3],
        src: &[u8],
    ) -> DriverResult<()>;
    fn read_image(
        &self,
        queue: &Self::Queue,
        mem: &Self::Mem,
        extent: [usize; 3],
        dst: &mut [u8],
    ) -> DriverResult<()>;
    fn release_mem(&self, mem: Self::Mem) -> DriverResult<()>;

    fn set_arg(
        &self,
        kernel: &Self::Kernel,
        index: u32,
        value: ArgValue<Self::Mem>,
    ) -> DriverResult<()>;
    fn enqueue_kernel(
        &self,
        queue: &Self::Queue,
        kernel: &Self::Kernel,
        global: [usize; 3],
        local: Option<[usize; 3]>,
    ) -> DriverResult<Self::Event>;
    fn finish(&self, queue: &Self::Queue) -> DriverResult<()>;
    /// 依次返回 queued、submit、start、end 时间戳。
    fn profile(&self, event: &Self::Event) -> DriverResult<[u64; 4]>;
}

/// 传递给 [`Driver::set_arg`] 的参数值。
pub enum ArgValue<'a, M> {
    /// 按值复制的字节。
    Bytes(&'a [u8]),
    /// 存储对象引用，`None` 表示空引用。
    Mem(Option<&'a M>),
    /// 指定大小的局部存储。
    Local(usize),
}

