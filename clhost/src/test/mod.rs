use crate::{
    common_cpu::{Call, Cpu, ParamKind},
    host::{Host, HostStr, Param},
    AccessMode, CommandQueue, DeviceClass, ErrorKind, KernelArg, KernelBatch, KernelSource,
    MemoryRegistry, NdRange, QueueOptions, Status, IMAGE_PIXEL_BYTES,
};
use rand::Rng;
use std::io::Write;
use tempfile::NamedTempFile;

const COPY: &str = "\
__kernel void copy(__global const float *src, __global float *dst) {
    size_t i = get_global_id(0);
    dst[i] = src[i];
}
";

fn copy_driver() -> Cpu {
    Cpu::new().register("copy", &[ParamKind::Mem, ParamKind::Mem], |inv| {
        let src = inv.read(0)?;
        inv.write(1, 0, &src)
    })
}

fn source_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(COPY.as_bytes()).unwrap();
    file
}

fn random_floats(n: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..n)
        .flat_map(|_| rng.gen_range(-1.0f32..1.0).to_ne_bytes())
        .collect()
}

#[test]
fn test_copy_pipeline() {
    let cpu = copy_driver();
    let file = source_file();
    let n = 1024;
    let input = random_floats(n);

    let queue = CommandQueue::create(
        &cpu,
        QueueOptions {
            force_cpu: true,
            profiling: true,
        },
    )
    .unwrap();
    assert_eq!(queue.device_class(), DeviceClass::Cpu);

    let batch = KernelBatch::build(&queue, &[KernelSource::new(file.path(), "", "copy")]).unwrap();
    assert_eq!(batch.entry(0), Some("copy"));

    let mut registry = MemoryRegistry::new(&cpu);
    let src = registry
        .create_buffer(&queue, 0, &input, AccessMode::ReadOnly)
        .unwrap();
    let dst = registry
        .create_buffer(&queue, 1, &vec![0; input.len()], AccessMode::WriteOnly)
        .unwrap();

    batch.set_arg(0, 0, KernelArg::Mem(src), &registry).unwrap();
    batch.set_arg(0, 1, KernelArg::Mem(dst), &registry).unwrap();
    let times = queue
        .execute(&batch, 0, NdRange::linear(n).with_local([64, 1, 1]), true)
        .unwrap()
        .unwrap();
    assert!(times.queued <= times.ended);

    let mut output = vec![0; input.len()];
    registry.read(&queue, dst, &mut output).unwrap();
    assert_eq!(output, input);

    registry.release_all().unwrap();
    batch.release().unwrap();
    queue.release().unwrap();
    assert_eq!(cpu.count(Call::ReleaseMem), 2);
    assert_eq!(cpu.count(Call::ReleaseKernel), 1);
    assert_eq!(cpu.count(Call::ReleaseProgram), 1);
    assert_eq!(cpu.count(Call::ReleaseContext), 1);
}

#[test]
fn test_best_effort_release() {
    let cpu = copy_driver();
    let file = source_file();
    let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
    let sources = [
        KernelSource::new(file.path(), "", "copy"),
        KernelSource::new(file.path(), "-cl-fast-relaxed-math", "copy"),
    ];
    let batch = KernelBatch::build(&queue, &sources).unwrap();

    cpu.fail(Call::ReleaseKernel, Status::INVALID_KERNEL);
    let e = batch.release().unwrap_err();
    assert_eq!(e.kind, ErrorKind::ReleaseFailure);
    assert_eq!(e.status, Some(Status::INVALID_KERNEL));
    assert_eq!(cpu.count(Call::ReleaseKernel), 2);
    assert_eq!(cpu.count(Call::ReleaseProgram), 2);

    cpu.fail(Call::ReleaseQueue, Status::INVALID_COMMAND_QUEUE);
    let e = queue.release().unwrap_err();
    assert_eq!(e.kind, ErrorKind::ReleaseFailure);
    assert_eq!(cpu.count(Call::ReleaseContext), 1);
}

/// 宿主一次调用需要的日志槽。
fn quiet<'a>() -> [Param<'a>; 2] {
    [Param::Bool(false), Param::Str(HostStr::new(""))]
}

#[test]
fn test_host_copy() {
    let cpu = copy_driver();
    let file = source_file();
    let path = file.path().to_str().unwrap().to_string();
    let n = 256;
    let input = random_floats(n);
    let size = input.len() as u64;
    let mut host = Host::new(&cpu);

    let mut queue = 0;
    let [v, l] = quiet();
    assert_eq!(
        host.create_command_queue(&mut [Param::HandleOut(&mut queue), Param::Bool(true), v, l]),
        0
    );

    let paths = [HostStr::new(&path)];
    let entries = [HostStr::new("copy")];
    let options = [HostStr::new("-D N=256")];
    let mut batch = 0;
    let [v, l] = quiet();
    let code = host.build_kernels(&mut [
        Param::Handle(queue),
        Param::HandleOut(&mut batch),
        Param::I32(1),
        Param::StrList(&paths),
        Param::StrList(&entries),
        Param::StrList(&options),
        v,
        l,
    ]);
    assert_eq!(code, 0);
    assert_ne!(batch, queue);

    let zeros = vec![0u8; input.len()];
    for (index, content, access) in [(0, &input, 2), (1, &zeros, 1)] {
        let [v, l] = quiet();
        let code = unsafe {
            host.create_buffer(&mut [
                Param::Handle(queue),
                Param::I32(index),
                Param::Bytes(content),
                Param::U64(size),
                Param::I32(access),
                Param::Bool(false),
                v,
                l,
            ])
        };
        assert_eq!(code, 0);
    }

    for (arg, index) in [(0u32, 0u32), (1, 1)] {
        let [v, l] = quiet();
        let code = host.set_kernel_arg(&mut [
            Param::Handle(batch),
            Param::U32(0),
            Param::U32(arg),
            Param::U32(8),
            Param::U32(index),
            Param::Bool(true),
            v,
            l,
        ]);
        assert_eq!(code, 0);
    }

    let [v, l] = quiet();
    let code = host.execute_kernel(&mut [
        Param::Handle(queue),
        Param::Handle(batch),
        Param::U32(0),
        Param::Bool(false),
        Param::Uint4([n as _, 1, 1, 0]),
        Param::Uint4([0; 4]),
        v,
        l,
    ]);
    assert_eq!(code, 0);

    let mut output = vec![0u8; input.len()];
    let [v, l] = quiet();
    let code = host.read_buffer(&mut [
        Param::Handle(queue),
        Param::U32(1),
        Param::BytesMut(&mut output),
        Param::U64(size),
        v,
        l,
    ]);
    assert_eq!(code, 0);
    assert_eq!(output, input);

    // 局部尺寸不整除全局尺寸
    let [v, l] = quiet();
    let code = host.execute_kernel(&mut [
        Param::Handle(queue),
        Param::Handle(batch),
        Param::U32(0),
        Param::Bool(true),
        Param::Uint4([n as _, 1, 1, 0]),
        Param::Uint4([7, 1, 1, 0]),
        v,
        l,
    ]);
    assert_eq!(code, -15);

    let [v, l] = quiet();
    assert_eq!(host.release_buffer(&mut [Param::U32(0), v, l]), 0);
    let [v, l] = quiet();
    assert_eq!(host.release_buffer(&mut [Param::U32(0), v, l]), -4);
    let [v, l] = quiet();
    assert_eq!(
        host.release_kernels(&mut [Param::Handle(batch), Param::U32(2), v, l]),
        -2
    );
    let [v, l] = quiet();
    assert_eq!(
        host.release_kernels(&mut [Param::Handle(batch), Param::U32(1), v, l]),
        0
    );
    let [v, l] = quiet();
    assert_eq!(
        host.release_command_queue(&mut [Param::Handle(queue), v, l]),
        0
    );

    assert_eq!(host.unload(&mut []), 0);
    assert_eq!(cpu.count(Call::ReleaseMem), 2);
    assert_eq!(cpu.count(Call::ReleaseQueue), 1);
}

#[test]
fn test_host_image() {
    let cpu = Cpu::new();
    let mut host = Host::new(&cpu);
    let mut queue = 0;
    let [v, l] = quiet();
    assert_eq!(
        host.create_command_queue(&mut [Param::HandleOut(&mut queue), Param::Bool(false), v, l]),
        0
    );

    let extent = [4u32, 3, 2];
    let size = extent.iter().product::<u32>() as usize * IMAGE_PIXEL_BYTES;
    let content = random_floats(size / 4);
    let mut host_mem = content.clone();
    for (index, host_ptr) in [(2, false), (3, true)] {
        let data = if host_ptr {
            Param::BytesMut(&mut host_mem)
        } else {
            Param::Bytes(&content)
        };
        let [v, l] = quiet();
        let code = unsafe {
            host.create_image(&mut [
                Param::Handle(queue),
                Param::U32(index),
                data,
                Param::U32(extent[0]),
                Param::U32(extent[1]),
                Param::U32(extent[2]),
                Param::I32(0),
                Param::Bool(host_ptr),
                v,
                l,
            ])
        };
        assert_eq!(code, 0);
    }

    let update = random_floats(size / 4);
    let [v, l] = quiet();
    let code = host.write_image(&mut [
        Param::Handle(queue),
        Param::U32(2),
        Param::Bytes(&update),
        Param::U64(size as _),
        v,
        l,
    ]);
    assert_eq!(code, 0);

    let mut back = vec![0u8; size];
    let [v, l] = quiet();
    let code = host.read_image(&mut [
        Param::Handle(queue),
        Param::U32(2),
        Param::BytesMut(&mut back),
        Param::U64(size as _),
        v,
        l,
    ]);
    assert_eq!(code, 0);
    assert_eq!(back, update);

    // 图像只能整体读写
    let [v, l] = quiet();
    let code = host.read_image(&mut [
        Param::Handle(queue),
        Param::U32(3),
        Param::BytesMut(&mut back),
        Param::U64(16),
        v,
        l,
    ]);
    assert_eq!(code, -2);

    let [v, l] = quiet();
    assert_eq!(host.release_image(&mut [Param::U32(2), v, l]), 0);
    assert_eq!(host.unload(&mut []), 0);
    assert_eq!(cpu.count(Call::ReleaseMem), 2);
    assert_eq!(cpu.count(Call::ReleaseContext), 1);
}

#[test]
fn test_host_unknown_handles() {
    let cpu = Cpu::new();
    let mut host = Host::new(&cpu);
    let mut data = [0u8; 16];
    let [v, l] = quiet();
    let code = host.read_buffer(&mut [
        Param::Handle(7),
        Param::U32(0),
        Param::BytesMut(&mut data),
        Param::U64(16),
        v,
        l,
    ]);
    assert_eq!(code, -4);
    let [v, l] = quiet();
    assert_eq!(
        host.release_kernels(&mut [Param::Handle(7), Param::U32(1), v, l]),
        -4
    );
    assert_eq!(cpu.total_calls(), 0);
}
