use crate::{
    context_creation_failure, queue_creation_failure, release_failure, select_device, DeviceClass,
    Driver, Result,
};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 创建命令队列的选项。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct QueueOptions {
    /// 即使有 GPU 也使用 CPU。
    pub force_cpu: bool,
    /// 队列记录命令时间戳。
    pub profiling: bool,
}

/// 选中设备上的上下文和按序执行的命令队列。
///
/// 队列独占它的上下文，释放队列时一并释放上下文。
pub struct CommandQueue<'d, D: Driver> {
    id: u64,
    driver: &'d D,
    device: D::Device,
    device_name: String,
    class: DeviceClass,
    profiling: bool,
    context: Option<D::Context>,
    queue: Option<D::Queue>,
}

impl<'d, D: Driver> CommandQueue<'d, D> {
    pub fn create(driver: &'d D, options: QueueOptions) -> Result<Self> {
        let selected = select_device(driver, options.force_cpu)?;

        let context = driver.create_context(&selected.device).map_err(|s| {
            context_creation_failure(format!("failed to create context on {}", selected.name))
                .with_status(s)
        })?;
        let queue = match driver.create_queue(&context, &selected.device, options.profiling) {
            Ok(queue) => queue,
            Err(s) => {
                if let Err(e) = driver.release_context(context) {
                    warn!("failed to release context after queue creation failure: {e}");
                }
                return Err(queue_creation_failure(format!(
                    "failed to create command queue on {}",
                    selected.name
                ))
                .with_status(s));
            }
        };
        info!(
            "command queue created on {} (profiling {})",
            selected.name,
            if options.profiling { "on" } else { "off" }
        );

        Ok(Self {
            id: NEXT_ID.fetch_add(1, Relaxed),
            driver,
            device: selected.device,
            device_name: selected.name,
            class: selected.class,
            profiling: options.profiling,
            context: Some(context),
            queue: Some(queue),
        })
    }

    /// 进程内唯一的队列编号。
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn driver(&self) -> &'d D {
        self.driver
    }

    #[inline]
    pub fn device(&self) -> &D::Device {
        &self.device
    }

    #[inline]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    #[inline]
    pub fn device_class(&self) -> DeviceClass {
        self.class
    }

    #[inline]
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    pub(crate) fn context(&self) -> &D::Context {
        match &self.context {
            Some(context) => context,
            None => unreachable!("context released"),
        }
    }

    pub(crate) fn raw(&self) -> &D::Queue {
        match &self.queue {
            Some(queue) => queue,
            None => unreachable!("queue released"),
        }
    }

    /// 释放队列，然后释放上下文。
    ///
    /// 队列释放失败时仍然尝试释放上下文，返回第一个失败。
    pub fn release(mut self) -> Result<()> {
        self.release_all()
    }

    fn release_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        if let Some(queue) = self.queue.take() {
            if let Err(s) = self.driver.release_queue(queue) {
                warn!("failed to release command queue: {s}");
                result = Err(release_failure("failed to release command queue").with_status(s));
            }
        }
        if let Some(context) = self.context.take() {
            if let Err(s) = self.driver.release_context(context) {
                warn!("failed to release context: {s}");
                if result.is_ok() {
                    result = Err(release_failure("failed to release context").with_status(s));
                }
            }
        }
        result
    }
}

impl<D: Driver> Drop for CommandQueue<'_, D> {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}
