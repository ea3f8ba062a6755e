//! OpenCL 驱动。

use crate::{AccessMode, ArgValue, DeviceClass, Driver, Status};
use opencl3::{
    command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE},
    context::Context,
    device::{Device, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU},
    error_codes::ClError,
    event::Event,
    kernel::Kernel,
    memory::{Buffer, ClMem, Image},
    platform::{get_platforms, Platform},
    program::Program,
    types::{cl_image_desc, cl_image_format, cl_mem, cl_mem_flags, CL_BLOCKING},
};
use opencl_sys::{
    clSetKernelArg, CL_FLOAT, CL_MEM_OBJECT_IMAGE3D, CL_MEM_READ_ONLY, CL_MEM_READ_WRITE,
    CL_MEM_USE_HOST_PTR, CL_MEM_WRITE_ONLY, CL_RGBA, CL_SUCCESS,
};
use std::{
    ffi::c_void,
    mem::size_of,
    ptr::{null, null_mut, NonNull},
};

#[derive(Clone, Copy, Default, Debug)]
pub struct Cl;

/// OpenCL 存储对象。
pub enum ClMemObject {
    Buffer(Buffer<u8>),
    Image(Image),
}

impl ClMemObject {
    fn raw(&self) -> cl_mem {
        match self {
            Self::Buffer(buffer) => buffer.get(),
            Self::Image(image) => image.get(),
        }
    }
}

#[inline]
fn status(e: ClError) -> Status {
    Status(e.0)
}

fn mem_flags(access: AccessMode, host: bool) -> cl_mem_flags {
    let access = match access {
        AccessMode::ReadWrite => CL_MEM_READ_WRITE,
        AccessMode::WriteOnly => CL_MEM_WRITE_ONLY,
        AccessMode::ReadOnly => CL_MEM_READ_ONLY,
    };
    if host {
        access | CL_MEM_USE_HOST_PTR
    } else {
        access
    }
}

#[inline]
fn host_ptr(host: Option<NonNull<u8>>) -> *mut c_void {
    host.map_or(null_mut(), |p| p.as_ptr().cast())
}

impl Driver for Cl {
    type Platform = Platform;
    type Device = Device;
    type Context = Context;
    type Queue = CommandQueue;
    type Program = Program;
    type Kernel = Kernel;
    type Mem = ClMemObject;
    type Event = Event;

    fn platforms(&self) -> Result<Vec<Platform>, Status> {
        get_platforms().map_err(status)
    }

    fn platform_name(&self, platform: &Platform) -> Result<String, Status> {
        platform.name().map_err(status)
    }

    fn devices(&self, platform: &Platform, class: DeviceClass) -> Result<Vec<Device>, Status> {
        let ty = match class {
            DeviceClass::Gpu => CL_DEVICE_TYPE_GPU,
            DeviceClass::Cpu => CL_DEVICE_TYPE_CPU,
        };
        match platform.get_devices(ty) {
            Ok(ids) => Ok(ids.into_iter().map(Device::new).collect()),
            Err(e) if e.0 == Status::DEVICE_NOT_FOUND.0 => Ok(Vec::new()),
            Err(e) => Err(status(e)),
        }
    }

    fn device_name(&self, device: &Device) -> Result<String, Status> {
        device.name().map_err(status)
    }

    fn create_context(&self, device: &Device) -> Result<Context, Status> {
        Context::from_device(device).map_err(status)
    }

    fn create_queue(
        &self,
        context: &Context,
        _device: &Device,
        profiling: bool,
    ) -> Result<CommandQueue, Status> {
        let properties = if profiling {
            CL_QUEUE_PROFILING_ENABLE
        } else {
            0
        };
        CommandQueue::create_default_with_properties(context, properties, 0).map_err(status)
    }

    fn release_queue(&self, queue: CommandQueue) -> Result<(), Status> {
        drop(queue);
        Ok(())
    }

    fn release_context(&self, context: Context) -> Result<(), Status> {
        drop(context);
        Ok(())
    }

    fn create_program(&self, context: &Context, source: &str) -> Result<Program, Status> {
        Program::create_from_source(context, source).map_err(status)
    }

    fn build_program(
        &self,
        program: &mut Program,
        device: &Device,
        options: &str,
    ) -> Result<(), Status> {
        if options.contains('\0') {
            return Err(Status::INVALID_BUILD_OPTIONS);
        }
        program.build(&[device.id()], options).map_err(status)
    }

    fn build_log(&self, program: &Program, device: &Device) -> Result<String, Status> {
        program.get_build_log(device.id()).map_err(status)
    }

    fn create_kernel(&self, program: &Program, name: &str) -> Result<Kernel, Status> {
        if name.contains('\0') {
            return Err(Status::INVALID_KERNEL_NAME);
        }
        Kernel::create(program, name).map_err(status)
    }

    fn release_kernel(&self, kernel: Kernel) -> Result<(), Status> {
        drop(kernel);
        Ok(())
    }

    fn release_program(&self, program: Program) -> Result<(), Status> {
        drop(program);
        Ok(())
    }

    unsafe fn create_buffer(
        &self,
        context: &Context,
        access: AccessMode,
        size: usize,
        host: Option<NonNull<u8>>,
    ) -> Result<ClMemObject, Status> {
        Buffer::<u8>::create(
            context,
            mem_flags(access, host.is_some()),
            size,
            host_ptr(host),
        )
        .map(ClMemObject::Buffer)
        .map_err(status)
    }

    unsafe fn create_image(
        &self,
        context: &Context,
        access: AccessMode,
        extent: [usize; 3],
        host: Option<NonNull<u8>>,
    ) -> Result<ClMemObject, Status> {
        let [width, height, depth] = extent;
        let format = cl_image_format {
            image_channel_order: CL_RGBA,
            image_channel_data_type: CL_FLOAT,
        };
        let desc = cl_image_desc {
            image_type: CL_MEM_OBJECT_IMAGE3D,
            image_width: width,
            image_height: height,
            image_depth: depth,
            image_array_size: 0,
            image_row_pitch: 0,
            image_slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
            buffer: null_mut(),
        };
        Image::create(
            context,
            mem_flags(access, host.is_some()),
            &format,
            &desc,
            host_ptr(host),
        )
        .map(ClMemObject::Image)
        .map_err(status)
    }

    fn write_buffer(
        &self,
        queue: &CommandQueue,
        mem: &mut ClMemObject,
        src: &[u8],
    ) -> Result<(), Status> {
        let ClMemObject::Buffer(buffer) = mem else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        unsafe { queue.enqueue_write_buffer(buffer, CL_BLOCKING, 0, src, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn read_buffer(
        &self,
        queue: &CommandQueue,
        mem: &ClMemObject,
        dst: &mut [u8],
    ) -> Result<(), Status> {
        let ClMemObject::Buffer(buffer) = mem else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        unsafe { queue.enqueue_read_buffer(buffer, CL_BLOCKING, 0, dst, &[]) }
            .map(drop)
            .map_err(status)
    }

    fn write_image(
        &self,
        queue: &CommandQueue,
        mem: &mut ClMemObject,
        extent: [usize; 3],
        src: &[u8],
    ) -> Result<(), Status> {
        let ClMemObject::Image(image) = mem else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        let origin = [0usize; 3];
        unsafe {
            queue.enqueue_write_image(
                image,
                CL_BLOCKING,
                origin.as_ptr(),
                extent.as_ptr(),
                0,
                0,
                src.as_ptr() as *mut c_void,
                &[],
            )
        }
        .map(drop)
        .map_err(status)
    }

    fn read_image(
        &self,
        queue: &CommandQueue,
        mem: &ClMemObject,
        extent: [usize; 3],
        dst: &mut [u8],
    ) -> Result<(), Status> {
        let ClMemObject::Image(image) = mem else {
            return Err(Status::INVALID_MEM_OBJECT);
        };
        let origin = [0usize; 3];
        unsafe {
            queue.enqueue_read_image(
                image,
                CL_BLOCKING,
                origin.as_ptr(),
                extent.as_ptr(),
                0,
                0,
                dst.as_mut_ptr().cast(),
                &[],
            )
        }
        .map(drop)
        .map_err(status)
    }

    fn release_mem(&self, mem: ClMemObject) -> Result<(), Status> {
        drop(mem);
        Ok(())
    }

    fn set_arg(
        &self,
        kernel: &Kernel,
        index: u32,
        value: ArgValue<ClMemObject>,
    ) -> Result<(), Status> {
        let mem: cl_mem;
        let (size, ptr) = match value {
            ArgValue::Bytes(bytes) => (bytes.len(), bytes.as_ptr().cast::<c_void>()),
            ArgValue::Mem(obj) => {
                mem = obj.map_or(null_mut(), ClMemObject::raw);
                (size_of::<cl_mem>(), (&mem as *const cl_mem).cast())
            }
            ArgValue::Local(size) => (size, null()),
        };
        match unsafe { clSetKernelArg(kernel.get(), index, size, ptr) } {
            CL_SUCCESS => Ok(()),
            code => Err(Status(code)),
        }
    }

    fn enqueue_kernel(
        &self,
        queue: &CommandQueue,
        kernel: &Kernel,
        global: [usize; 3],
        local: Option<[usize; 3]>,
    ) -> Result<Event, Status> {
        let local = local.as_ref().map_or(null(), |l| l.as_ptr());
        unsafe {
            queue.enqueue_nd_range_kernel(kernel.get(), 3, null(), global.as_ptr(), local, &[])
        }
        .map_err(status)
    }

    fn finish(&self, queue: &CommandQueue) -> Result<(), Status> {
        queue.finish().map_err(status)
    }

    fn profile(&self, event: &Event) -> Result<[u64; 4], Status> {
        Ok([
            event.profiling_command_queued().map_err(status)?,
            event.profiling_command_submit().map_err(status)?,
            event.profiling_command_start().map_err(status)?,
            event.profiling_command_end().map_err(status)?,
        ])
    }
}
