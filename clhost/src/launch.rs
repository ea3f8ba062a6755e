use crate::{
    execution_failure, invalid_argument, synchronization_failure, CommandQueue, Driver,
    KernelBatch, ProfileTimestamps, Result,
};
use log::{error, info};

/// 三维工作尺寸。
///
/// 不指定局部尺寸时由驱动选择；指定时每一维都必须整除全局尺寸。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct NdRange {
    pub global: [usize; 3],
    pub local: Option<[usize; 3]>,
}

impl NdRange {
    #[inline]
    pub const fn new(global: [usize; 3]) -> Self {
        Self {
            global,
            local: None,
        }
    }

    #[inline]
    pub const fn linear(n: usize) -> Self {
        Self::new([n, 1, 1])
    }

    #[inline]
    pub const fn with_local(self, local: [usize; 3]) -> Self {
        Self {
            local: Some(local),
            ..self
        }
    }
}

impl<D: Driver> CommandQueue<'_, D> {
    /// 在队列上执行第 `kernel` 个内核并等待队列完成。
    ///
    /// `profile` 为真时返回执行的时间戳，要求队列创建时打开了计时。
    pub fn execute(
        &self,
        batch: &KernelBatch<D>,
        kernel: usize,
        range: NdRange,
        profile: bool,
    ) -> Result<Option<ProfileTimestamps>> {
        let raw = batch.kernel(kernel)?;
        if profile && !self.profiling() {
            return Err(invalid_argument(
                "profiling requested on a queue created without profiling",
            ));
        }
        let driver = self.driver();
        let [x, y, z] = range.global;

        let enqueued = driver.enqueue_kernel(self.raw(), raw, range.global, range.local);
        match &enqueued {
            Ok(_) => info!("kernel {kernel} enqueued, global {x}x{y}x{z}"),
            Err(s) => error!("failed to enqueue kernel {kernel}: {s}"),
        }
        // 入队失败也要等待队列排空
        let finished = driver.finish(self.raw());
        if let Err(s) = &finished {
            error!("failed to finish command queue: {s}");
        }

        let event = enqueued.map_err(|s| {
            execution_failure(format!("failed to enqueue kernel {kernel}")).with_status(s)
        })?;
        finished.map_err(|s| {
            synchronization_failure("failed to finish command queue").with_status(s)
        })?;
        info!("kernel {kernel} finished");

        if !profile {
            return Ok(None);
        }
        let [queued, submitted, started, ended] = driver.profile(&event).map_err(|s| {
            execution_failure(format!("failed to get profiling info of kernel {kernel}"))
                .with_status(s)
        })?;
        let timestamps = ProfileTimestamps::new(queued, submitted, started, ended).ok_or_else(|| {
            execution_failure(format!(
                "kernel {kernel} timestamps out of order: {queued} {submitted} {started} {ended}"
            ))
        })?;
        info!(
            "kernel {kernel} profile: queue->submit {} ns, submit->start {} ns, start->end {} ns",
            timestamps.queue_to_submit(),
            timestamps.submit_to_start(),
            timestamps.start_to_end(),
        );
        Ok(Some(timestamps))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        common_cpu::{Call, Cpu, ParamKind},
        AccessMode, ErrorKind, KernelArg, KernelSource, MemoryRegistry, QueueOptions, Status,
    };
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn count_driver() -> Cpu {
        Cpu::new().register("count", &[ParamKind::Mem], |inv| {
            let n = inv.work_items() as u32;
            inv.write(0, 0, &n.to_ne_bytes())
        })
    }

    fn source() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"__kernel void count(global uint* n) {}")
            .unwrap();
        file
    }

    #[test]
    fn test_nd_range() {
        let range = NdRange::linear(64).with_local([16, 1, 1]);
        assert_eq!(range.global, [64, 1, 1]);
        assert_eq!(range.local, Some([16, 1, 1]));
        assert_eq!(NdRange::new([2, 3, 4]).local, None);
    }

    #[test]
    fn test_execute() {
        let cpu = count_driver();
        let options = QueueOptions {
            force_cpu: false,
            profiling: true,
        };
        let queue = CommandQueue::create(&cpu, options).unwrap();
        let file = source();
        let batch = KernelBatch::build(&queue, &[KernelSource::new(file.path(), "", "count")])
            .unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let n = registry
            .create_buffer(&queue, 0, &[0; 4], AccessMode::WriteOnly)
            .unwrap();
        batch.set_arg(0, 0, KernelArg::Mem(n), &registry).unwrap();

        let profile = queue
            .execute(&batch, 0, NdRange::new([4, 2, 3]), true)
            .unwrap()
            .unwrap();
        assert!(profile.queued <= profile.submitted);
        assert!(profile.submitted <= profile.started);
        assert!(profile.started <= profile.ended);

        let mut back = [0; 4];
        registry.read(&queue, n, &mut back).unwrap();
        assert_eq!(u32::from_ne_bytes(back), 24);

        let none = queue
            .execute(&batch, 0, NdRange::new([4, 2, 3]).with_local([2, 2, 3]), false)
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_local_size() {
        let cpu = count_driver();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let file = source();
        let batch = KernelBatch::build(&queue, &[KernelSource::new(file.path(), "", "count")])
            .unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let n = registry
            .create_buffer(&queue, 0, &[0; 4], AccessMode::ReadWrite)
            .unwrap();
        batch.set_arg(0, 0, KernelArg::Mem(n), &registry).unwrap();

        queue
            .execute(&batch, 0, NdRange::linear(10), false)
            .unwrap();
        let e = queue
            .execute(&batch, 0, NdRange::linear(10).with_local([3, 1, 1]), false)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::ExecutionFailure);
        assert_eq!(e.status, Some(Status::INVALID_WORK_GROUP_SIZE));
        assert_eq!(cpu.count(Call::Finish), 2);
    }

    #[test]
    fn test_errors() {
        let cpu = count_driver();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let file = source();
        let batch = KernelBatch::build(&queue, &[KernelSource::new(file.path(), "", "count")])
            .unwrap();

        let e = queue
            .execute(&batch, 0, NdRange::linear(1), false)
            .unwrap_err();
        assert_eq!(e.status, Some(Status::INVALID_KERNEL_ARGS));

        let e = queue
            .execute(&batch, 5, NdRange::linear(1), false)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidHandle);

        let e = queue
            .execute(&batch, 0, NdRange::linear(1), true)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);

        let mut registry = MemoryRegistry::new(&cpu);
        let n = registry
            .create_buffer(&queue, 0, &[0; 4], AccessMode::ReadWrite)
            .unwrap();
        batch.set_arg(0, 0, KernelArg::Mem(n), &registry).unwrap();
        cpu.fail(Call::Finish, Status::OUT_OF_RESOURCES);
        let e = queue
            .execute(&batch, 0, NdRange::linear(1), false)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::SynchronizationFailure);
    }
}
