//! 宿主内存上的软件设备。
//!
//! 平台和设备拓扑可配置，内核由宿主闭包实现并按名字注册。
//! 每次 API 调用都会记录下来，也可以让指定调用失败。

mod kernel;
mod memory;

pub use kernel::{Invocation, KernelBody, ParamKind};
pub use memory::CpuMem;

use crate::{AccessMode, ArgValue, DeviceClass, Driver, Status};
use kernel::{Bound, HostKernel};
use memory::{Shape, Storage};
use std::{
    collections::HashMap,
    ptr::NonNull,
    sync::{Arc, Mutex},
    time::Instant,
};

/// 驱动调用的种类。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Call {
    Platforms,
    PlatformName,
    Devices,
    DeviceName,
    CreateContext,
    CreateQueue,
    ReleaseQueue,
    ReleaseContext,
    CreateProgram,
    BuildProgram,
    BuildLog,
    CreateKernel,
    ReleaseKernel,
    ReleaseProgram,
    CreateBuffer,
    CreateImage,
    WriteBuffer,
    ReadBuffer,
    WriteImage,
    ReadImage,
    ReleaseMem,
    SetArg,
    EnqueueKernel,
    Finish,
    Profile,
}

/// 一个软件平台及其设备。
#[derive(Clone, Debug)]
pub struct PlatformSpec {
    name: String,
    devices: Vec<(DeviceClass, String)>,
}

impl PlatformSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            devices: Vec::new(),
        }
    }

    pub fn gpu(mut self, name: impl Into<String>) -> Self {
        self.devices.push((DeviceClass::Gpu, name.into()));
        self
    }

    pub fn cpu(mut self, name: impl Into<String>) -> Self {
        self.devices.push((DeviceClass::Cpu, name.into()));
        self
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CpuDevice {
    pub platform: usize,
    pub class: DeviceClass,
    pub name: Arc<str>,
}

pub struct CpuContext {
    device: CpuDevice,
}

pub struct CpuQueue {
    profiling: bool,
}

pub struct CpuProgram {
    source: String,
    built: bool,
    log: String,
    entries: Vec<String>,
}

pub struct CpuKernel {
    name: String,
    kernel: HostKernel,
    args: Mutex<Vec<Option<Bound>>>,
}

impl CpuKernel {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct CpuEvent {
    profiling: bool,
    timestamps: [u64; 4],
}

pub struct Cpu {
    platforms: Vec<PlatformSpec>,
    library: HashMap<String, HostKernel>,
    journal: Mutex<Vec<Call>>,
    faults: Mutex<HashMap<Call, Status>>,
    epoch: Instant,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::with_platforms(vec![PlatformSpec::new("Host").cpu("Host CPU")])
    }
}

impl Cpu {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_platforms(platforms: Vec<PlatformSpec>) -> Self {
        Self {
            platforms,
            library: HashMap::new(),
            journal: Mutex::new(Vec::new()),
            faults: Mutex::new(HashMap::new()),
            epoch: Instant::now(),
        }
    }

    /// 注册名为 `name` 的宿主内核。源码中声明了同名入口的程序才能创建它。
    pub fn register(
        mut self,
        name: impl Into<String>,
        params: &[ParamKind],
        body: impl Fn(&Invocation) -> Result<(), Status> + Send + Sync + 'static,
    ) -> Self {
        self.library.insert(
            name.into(),
            HostKernel {
                params: params.into(),
                body: Arc::new(body),
            },
        );
        self
    }

    /// 此后每次 `call` 都以 `status` 失败，直到 [`Cpu::heal`]。
    pub fn fail(&self, call: Call, status: Status) {
        self.faults.lock().unwrap().insert(call, status);
    }

    pub fn heal(&self, call: Call) {
        self.faults.lock().unwrap().remove(&call);
    }

    /// 至今的全部调用，按发生顺序。
    pub fn calls(&self) -> Vec<Call> {
        self.journal.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|&&c| c == call)
            .count()
    }

    /// 调用总数。
    pub fn total_calls(&self) -> usize {
        self.journal.lock().unwrap().len()
    }

    fn enter(&self, call: Call) -> Result<(), Status> {
        self.journal.lock().unwrap().push(call);
        match self.faults.lock().unwrap().get(&call) {
            Some(&status) => Err(status),
            None => Ok(()),
        }
    }

    #[inline]
    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as _
    }
}

impl Driver for Cpu {
    type Platform = usize;
    type Device = CpuDevice;
    type Context = CpuContext;
    type Queue = CpuQueue;
    type Program = CpuProgram;
    type Kernel = CpuKernel;
    type Mem = CpuMem;
    type Event = CpuEvent;

    fn platforms(&self) -> Result<Vec<usize>, Status> {
        self.enter(Call::Platforms)?;
        Ok((0..self.platforms.len()).collect())
    }

    fn platform_name(&self, platform: &usize) -> Result<String, Status> {
        self.enter(Call::PlatformName)?;
        self.platforms
            .get(*platform)
            .map(|p| p.name.clone())
            .ok_or(Status::INVALID_PLATFORM)
    }

    fn devices(&self, platform: &usize, class: DeviceClass) -> Result<Vec<CpuDevice>, Status> {
        self.enter(Call::Devices)?;
        let spec = self
            .platforms
            .get(*platform)
            .ok_or(Status::INVALID_PLATFORM)?;
        Ok(spec
            .devices
            .iter()
            .filter(|(c, _)| *c == class)
            .map(|(class, name)| CpuDevice {
                platform: *platform,
                class: *class,
                name: name.as_str().into(),
            })
            .collect())
    }

    fn device_name(&self, device: &CpuDevice) -> Result<String, Status> {
        self.enter(Call::DeviceName)?;
        Ok(device.name.to_string())
    }

    fn create_context(&self, device: &CpuDevice) -> Result<CpuContext, Status> {
        self.enter(Call::CreateContext)?;
        Ok(CpuContext {
            device: device.clone(),
        })
    }

    fn create_queue(
        &self,
        context: &CpuContext,
        device: &CpuDevice,
        profiling: bool,
    ) -> Result<CpuQueue, Status> {
        self.enter(Call::CreateQueue)?;
        if context.device != *device {
            return Err(Status::INVALID_DEVICE);
        }
        Ok(CpuQueue { profiling })
    }

    fn release_queue(&self, _queue: CpuQueue) -> Result<(), Status> {
        self.enter(Call::ReleaseQueue)
    }

    fn release_context(&self, _context: CpuContext) -> Result<(), Status> {
        self.enter(Call::ReleaseContext)
    }

    fn create_program(&self, _context: &CpuContext, source: &str) -> Result<CpuProgram, Status> {
        self.enter(Call::CreateProgram)?;
        Ok(CpuProgram {
            source: source.into(),
            built: false,
            log: String::new(),
            entries: Vec::new(),
        })
    }

    fn build_program(
        &self,
        program: &mut CpuProgram,
        _device: &CpuDevice,
        options: &str,
    ) -> Result<(), Status> {
        self.enter(Call::BuildProgram)?;
        if let Some(option) = kernel::unknown_option(options) {
            program.log = format!("error: invalid build option '{option}'");
            return Err(Status::INVALID_BUILD_OPTIONS);
        }
        let errors = kernel::diagnostics(&program.source);
        if !errors.is_empty() {
            program.log = errors.join("\n");
            return Err(Status::BUILD_PROGRAM_FAILURE);
        }
        program.log.clear();
        program.entries = kernel::entry_points(&program.source);
        program.built = true;
        Ok(())
    }

    fn build_log(&self, program: &CpuProgram, _device: &CpuDevice) -> Result<String, Status> {
        self.enter(Call::BuildLog)?;
        Ok(program.log.clone())
    }

    fn create_kernel(&self, program: &CpuProgram, name: &str) -> Result<CpuKernel, Status> {
        self.enter(Call::CreateKernel)?;
        if !program.built {
            return Err(Status::INVALID_PROGRAM_EXECUTABLE);
        }
        if !program.entries.iter().any(|e| e == name) {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        let kernel = self
            .library
            .get(name)
            .ok_or(Status::INVALID_KERNEL_NAME)?
            .clone();
        let args = Mutex::new((0..kernel.params.len()).map(|_| None).collect());
        Ok(CpuKernel {
            name: name.into(),
            kernel,
            args,
        })
    }

    fn release_kernel(&self, _kernel: CpuKernel) -> Result<(), Status> {
        self.enter(Call::ReleaseKernel)
    }

    fn release_program(&self, _program: CpuProgram) -> Result<(), Status> {
        self.enter(Call::ReleaseProgram)
    }

    unsafe fn create_buffer(
        &self,
        _context: &CpuContext,
        access: AccessMode,
        size: usize,
        host: Option<NonNull<u8>>,
    ) -> Result<CpuMem, Status> {
        self.enter(Call::CreateBuffer)?;
        if size == 0 {
            return Err(Status::INVALID_BUFFER_SIZE);
        }
        Ok(CpuMem(Storage::new(Shape::Buffer(size), access, host)))
    }

    unsafe fn create_image(
        &self,
        _context: &CpuContext,
        access: AccessMode,
        extent: [usize; 3],
        host: Option<NonNull<u8>>,
    ) -> Result<CpuMem, Status> {
        self.enter(Call::CreateImage)?;
        if extent.contains(&0) {
            return Err(Status::INVALID_IMAGE_SIZE);
        }
        Ok(CpuMem(Storage::new(Shape::Image(extent), access, host)))
    }

    fn write_buffer(&self, _queue: &CpuQueue, mem: &mut CpuMem, src: &[u8]) -> Result<(), Status> {
        self.enter(Call::WriteBuffer)?;
        let Shape::Buffer(size) = mem.0.shape else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        if src.len() > size {
            return Err(Status::INVALID_VALUE);
        }
        mem.0.lock().bytes_mut()[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn read_buffer(&self, _queue: &CpuQueue, mem: &CpuMem, dst: &mut [u8]) -> Result<(), Status> {
        self.enter(Call::ReadBuffer)?;
        let Shape::Buffer(size) = mem.0.shape else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        if dst.len() > size {
            return Err(Status::INVALID_VALUE);
        }
        dst.copy_from_slice(&mem.0.lock().bytes()[..dst.len()]);
        Ok(())
    }

    fn write_image(
        &self,
        _queue: &CpuQueue,
        mem: &mut CpuMem,
        extent: [usize; 3],
        src: &[u8],
    ) -> Result<(), Status> {
        self.enter(Call::WriteImage)?;
        if mem.0.shape != Shape::Image(extent) {
            return Err(Status::INVALID_MEM_OBJECT);
        }
        if src.len() != mem.len() {
            return Err(Status::INVALID_VALUE);
        }
        mem.0.lock().bytes_mut().copy_from_slice(src);
        Ok(())
    }

    fn read_image(
        &self,
        _queue: &CpuQueue,
        mem: &CpuMem,
        extent: [usize; 3],
        dst: &mut [u8],
    ) -> Result<(), Status> {
        self.enter(Call::ReadImage)?;
        if mem.0.shape != Shape::Image(extent) {
            return Err(Status::INVALID_MEM_OBJECT);
        }
        if dst.len() != mem.len() {
            return Err(Status::INVALID_VALUE);
        }
        dst.copy_from_slice(mem.0.lock().bytes());
        Ok(())
    }

    fn release_mem(&self, _mem: CpuMem) -> Result<(), Status> {
        self.enter(Call::ReleaseMem)
    }

    fn set_arg(
        &self,
        kernel: &CpuKernel,
        index: u32,
        value: ArgValue<CpuMem>,
    ) -> Result<(), Status> {
        self.enter(Call::SetArg)?;
        let i = index as usize;
        let Some(&param) = kernel.kernel.params.get(i) else {
            return Err(Status::INVALID_ARG_INDEX);
        };
        let bound = match (param, value) {
            (ParamKind::Mem, ArgValue::Mem(mem)) => Bound::Mem(mem.map(|m| m.0.clone())),
            (ParamKind::Mem, ArgValue::Bytes(_)) => return Err(Status::INVALID_MEM_OBJECT),
            (ParamKind::Scalar(size), ArgValue::Bytes(bytes)) => {
                if bytes.len() != size {
                    return Err(Status::INVALID_ARG_SIZE);
                }
                Bound::Bytes(bytes.to_vec())
            }
            (ParamKind::Local, ArgValue::Local(0)) => return Err(Status::INVALID_ARG_SIZE),
            (ParamKind::Local, ArgValue::Local(size)) => Bound::Local(size),
            _ => return Err(Status::INVALID_ARG_VALUE),
        };
        kernel.args.lock().unwrap()[i] = Some(bound);
        Ok(())
    }

    fn enqueue_kernel(
        &self,
        queue: &CpuQueue,
        kernel: &CpuKernel,
        global: [usize; 3],
        local: Option<[usize; 3]>,
    ) -> Result<CpuEvent, Status> {
        self.enter(Call::EnqueueKernel)?;
        if global.contains(&0) {
            return Err(Status::INVALID_GLOBAL_WORK_SIZE);
        }
        if let Some(local) = local {
            if global.iter().zip(local).any(|(&g, l)| l == 0 || g % l != 0) {
                return Err(Status::INVALID_WORK_GROUP_SIZE);
            }
        }
        let queued = self.now();
        let args = kernel
            .args
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or(Status::INVALID_KERNEL_ARGS)?;
        let submitted = self.now();
        let started = self.now();
        (kernel.kernel.body)(&Invocation {
            global,
            local,
            args: &args,
        })?;
        let ended = self.now();
        Ok(CpuEvent {
            profiling: queue.profiling,
            timestamps: [queued, submitted, started, ended],
        })
    }

    fn finish(&self, _queue: &CpuQueue) -> Result<(), Status> {
        self.enter(Call::Finish)
    }

    fn profile(&self, event: &CpuEvent) -> Result<[u64; 4], Status> {
        self.enter(Call::Profile)?;
        if event.profiling {
            Ok(event.timestamps)
        } else {
            Err(Status::PROFILING_INFO_NOT_AVAILABLE)
        }
    }
}
