use crate::{
    allocation_failure, invalid_argument, invalid_handle, release_failure, transfer_failure,
    AccessMode, CommandQueue, Driver, Result, IMAGE_PIXEL_BYTES,
};
use log::{info, warn};
use std::ptr::NonNull;

/// 注册表的槽位数。
pub const CAPACITY: usize = 16;

/// 注册表中存储对象的句柄。
///
/// 携带槽位序号和槽位的代数。槽位上的对象被释放或替换后，旧句柄失效。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MemHandle {
    index: u8,
    generation: u32,
}

impl MemHandle {
    #[inline]
    pub fn index(&self) -> usize {
        self.index as _
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemKind {
    Buffer(usize),
    /// 宽、高、深。
    Image([usize; 3]),
}

impl MemKind {
    /// 对象的字节数，超出 `usize` 时取 `usize::MAX`。
    pub fn size(&self) -> usize {
        match *self {
            Self::Buffer(size) => size,
            Self::Image([w, h, d]) => w
                .saturating_mul(h)
                .saturating_mul(d)
                .saturating_mul(IMAGE_PIXEL_BYTES),
        }
    }
}

struct Occupant<M> {
    /// 零长缓冲区没有设备对象。
    mem: Option<M>,
    kind: MemKind,
    zero_copy: bool,
    /// 创建对象的队列，对象只属于它的上下文。
    queue: u64,
}

struct Slot<M> {
    generation: u32,
    occupant: Option<Occupant<M>>,
}

/// 固定容量的设备存储对象表。
pub struct MemoryRegistry<'d, D: Driver> {
    driver: &'d D,
    slots: Vec<Slot<D::Mem>>,
}

fn check_index(index: usize) -> Result<u8> {
    if index < CAPACITY {
        Ok(index as _)
    } else {
        Err(invalid_handle(format!(
            "memory object index {index} out of range 0..{CAPACITY}"
        )))
    }
}

/// 图像的字节数，空图像或溢出时报错。
pub(crate) fn image_size(extent: [usize; 3]) -> Result<usize> {
    let [w, h, d] = extent;
    if extent.contains(&0) {
        return Err(invalid_argument(format!("image extent {w}x{h}x{d} is empty")));
    }
    w.checked_mul(h)
        .and_then(|n| n.checked_mul(d))
        .and_then(|n| n.checked_mul(IMAGE_PIXEL_BYTES))
        .ok_or_else(|| invalid_argument(format!("image extent {w}x{h}x{d} too large")))
}

impl<'d, D: Driver> MemoryRegistry<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self {
            driver,
            slots: (0..CAPACITY)
                .map(|_| Slot {
                    generation: 0,
                    occupant: None,
                })
                .collect(),
        }
    }

    /// 在 `index` 处创建缓冲区并复制 `content`。
    pub fn create_buffer(
        &mut self,
        queue: &CommandQueue<D>,
        index: usize,
        content: &[u8],
        access: AccessMode,
    ) -> Result<MemHandle> {
        let index = check_index(index)?;
        let mem = if content.is_empty() {
            None
        } else {
            let mem = unsafe {
                self.driver
                    .create_buffer(queue.context(), access, content.len(), None)
            }
            .map_err(|s| {
                allocation_failure(format!(
                    "failed to allocate buffer {index} of {} bytes",
                    content.len()
                ))
                .with_status(s)
            })?;
            Some(self.fill(queue, mem, MemKind::Buffer(content.len()), content)?)
        };
        info!("buffer {index} created, {} bytes", content.len());
        Ok(self.install(index, queue.id(), mem, MemKind::Buffer(content.len()), false))
    }

    /// 在 `index` 处创建直接使用宿主内存的缓冲区。
    ///
    /// # Safety
    ///
    /// `host` 必须指向至少 `size` 字节的有效内存，并且在对象释放前保持有效。
    /// 设备和宿主通过这块内存互相可见对方的修改。
    pub unsafe fn create_buffer_zero_copy(
        &mut self,
        queue: &CommandQueue<D>,
        index: usize,
        host: NonNull<u8>,
        size: usize,
        access: AccessMode,
    ) -> Result<MemHandle> {
        let index = check_index(index)?;
        let mem = if size == 0 {
            None
        } else {
            let mem = self
                .driver
                .create_buffer(queue.context(), access, size, Some(host))
                .map_err(|s| {
                    allocation_failure(format!(
                        "failed to map host memory as buffer {index} of {size} bytes"
                    ))
                    .with_status(s)
                })?;
            Some(mem)
        };
        info!("buffer {index} created over host memory, {size} bytes");
        Ok(self.install(index, queue.id(), mem, MemKind::Buffer(size), true))
    }

    /// 在 `index` 处创建 4 通道浮点图像并复制 `content`。
    pub fn create_image(
        &mut self,
        queue: &CommandQueue<D>,
        index: usize,
        content: &[u8],
        extent: [usize; 3],
        access: AccessMode,
    ) -> Result<MemHandle> {
        let index = check_index(index)?;
        let size = image_size(extent)?;
        if content.len() != size {
            return Err(invalid_argument(format!(
                "image content has {} bytes, {size} expected",
                content.len()
            )));
        }
        let mem = unsafe {
            self.driver
                .create_image(queue.context(), access, extent, None)
        }
        .map_err(|s| {
            allocation_failure(format!("failed to allocate image {index}")).with_status(s)
        })?;
        let mem = self.fill(queue, mem, MemKind::Image(extent), content)?;
        let [w, h, d] = extent;
        info!("image {index} created, {w}x{h}x{d}");
        Ok(self.install(index, queue.id(), Some(mem), MemKind::Image(extent), false))
    }

    /// 在 `index` 处创建直接使用宿主内存的图像。
    ///
    /// # Safety
    ///
    /// `host` 必须覆盖整个图像，即宽×高×深×16 字节，并且在对象释放前保持有效。
    pub unsafe fn create_image_zero_copy(
        &mut self,
        queue: &CommandQueue<D>,
        index: usize,
        host: NonNull<u8>,
        extent: [usize; 3],
        access: AccessMode,
    ) -> Result<MemHandle> {
        let index = check_index(index)?;
        image_size(extent)?;
        let mem = self
            .driver
            .create_image(queue.context(), access, extent, Some(host))
            .map_err(|s| {
                allocation_failure(format!("failed to map host memory as image {index}"))
                    .with_status(s)
            })?;
        let [w, h, d] = extent;
        info!("image {index} created over host memory, {w}x{h}x{d}");
        Ok(self.install(index, queue.id(), Some(mem), MemKind::Image(extent), true))
    }

    fn fill(
        &self,
        queue: &CommandQueue<D>,
        mut mem: D::Mem,
        kind: MemKind,
        content: &[u8],
    ) -> Result<D::Mem> {
        let result = match kind {
            MemKind::Buffer(_) => self.driver.write_buffer(queue.raw(), &mut mem, content),
            MemKind::Image(extent) => self
                .driver
                .write_image(queue.raw(), &mut mem, extent, content),
        };
        match result {
            Ok(()) => Ok(mem),
            Err(s) => {
                if let Err(e) = self.driver.release_mem(mem) {
                    warn!("failed to release memory object after failed upload: {e}");
                }
                Err(transfer_failure("failed to upload initial content").with_status(s))
            }
        }
    }

    fn install(
        &mut self,
        index: u8,
        queue: u64,
        mem: Option<D::Mem>,
        kind: MemKind,
        zero_copy: bool,
    ) -> MemHandle {
        let slot = &mut self.slots[index as usize];
        let previous = slot.occupant.replace(Occupant {
            mem,
            kind,
            zero_copy,
            queue,
        });
        slot.generation = slot.generation.wrapping_add(1);
        let handle = MemHandle {
            index,
            generation: slot.generation,
        };
        if let Some(Occupant { mem: Some(mem), .. }) = previous {
            warn!("memory object {index} replaced");
            if let Err(s) = self.driver.release_mem(mem) {
                warn!("failed to release replaced memory object {index}: {s}");
            }
        }
        handle
    }

    fn occupant(&self, handle: MemHandle) -> Result<&Occupant<D::Mem>> {
        let slot = &self.slots[handle.index()];
        match &slot.occupant {
            Some(occupant) if slot.generation == handle.generation => Ok(occupant),
            _ => Err(invalid_handle(format!(
                "memory object {} generation {} is not live",
                handle.index, handle.generation
            ))),
        }
    }

    /// 由队列 `queue` 创建的存活对象。
    fn owned(&self, handle: MemHandle, queue: u64) -> Result<&Occupant<D::Mem>> {
        let occupant = self.occupant(handle)?;
        if occupant.queue == queue {
            Ok(occupant)
        } else {
            Err(invalid_handle(format!(
                "memory object {} belongs to command queue {}, not {queue}",
                handle.index, occupant.queue
            )))
        }
    }

    /// 槽位 `index` 上当前对象的句柄。
    pub fn handle_at(&self, index: usize) -> Result<MemHandle> {
        let index = check_index(index)?;
        let slot = &self.slots[index as usize];
        match slot.occupant {
            Some(_) => Ok(MemHandle {
                index,
                generation: slot.generation,
            }),
            None => Err(invalid_handle(format!("memory object {index} is vacant"))),
        }
    }

    pub fn kind(&self, handle: MemHandle) -> Result<MemKind> {
        self.occupant(handle).map(|o| o.kind)
    }

    pub fn is_zero_copy(&self, handle: MemHandle) -> Result<bool> {
        self.occupant(handle).map(|o| o.zero_copy)
    }

    /// 存活对象数。
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.occupant.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 设备对象，零长缓冲区为 `None`。
    pub(crate) fn mem(&self, handle: MemHandle, queue: u64) -> Result<Option<&D::Mem>> {
        self.owned(handle, queue).map(|o| o.mem.as_ref())
    }

    /// 阻塞读出对象内容。
    ///
    /// 缓冲区读出 `dst.len()` 字节，不得超过对象大小；图像必须整体读出。
    pub fn read(&self, queue: &CommandQueue<D>, handle: MemHandle, dst: &mut [u8]) -> Result<()> {
        let occupant = self.owned(handle, queue.id())?;
        check_transfer(occupant.kind, dst.len())?;
        let Some(mem) = &occupant.mem else {
            return Ok(());
        };
        if dst.is_empty() {
            return Ok(());
        }
        let result = match occupant.kind {
            MemKind::Buffer(_) => self.driver.read_buffer(queue.raw(), mem, dst),
            MemKind::Image(extent) => self.driver.read_image(queue.raw(), mem, extent, dst),
        };
        result.map_err(|s| {
            transfer_failure(format!("failed to read memory object {}", handle.index))
                .with_status(s)
        })?;
        info!("{} bytes read from memory object {}", dst.len(), handle.index);
        Ok(())
    }

    /// 阻塞写入对象内容，规则同 [`MemoryRegistry::read`]。
    pub fn write(&mut self, queue: &CommandQueue<D>, handle: MemHandle, src: &[u8]) -> Result<()> {
        self.owned(handle, queue.id())?;
        let driver = self.driver;
        let Some(occupant) = self.slots[handle.index()].occupant.as_mut() else {
            unreachable!()
        };
        check_transfer(occupant.kind, src.len())?;
        let Some(mem) = &mut occupant.mem else {
            return Ok(());
        };
        if src.is_empty() {
            return Ok(());
        }
        let result = match occupant.kind {
            MemKind::Buffer(_) => driver.write_buffer(queue.raw(), mem, src),
            MemKind::Image(extent) => driver.write_image(queue.raw(), mem, extent, src),
        };
        result.map_err(|s| {
            transfer_failure(format!("failed to write memory object {}", handle.index))
                .with_status(s)
        })?;
        info!("{} bytes written to memory object {}", src.len(), handle.index);
        Ok(())
    }

    /// 释放对象，槽位变为空闲。
    pub fn release(&mut self, handle: MemHandle) -> Result<()> {
        self.occupant(handle)?;
        let occupant = self.slots[handle.index()].occupant.take();
        if let Some(Occupant { mem: Some(mem), .. }) = occupant {
            self.driver.release_mem(mem).map_err(|s| {
                release_failure(format!("failed to release memory object {}", handle.index))
                    .with_status(s)
            })?;
        }
        info!("memory object {} released", handle.index);
        Ok(())
    }

    /// 释放全部对象，返回第一个失败。
    pub fn release_all(&mut self) -> Result<()> {
        let mut result = Ok(());
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(Occupant { mem: Some(mem), .. }) = slot.occupant.take() {
                if let Err(s) = self.driver.release_mem(mem) {
                    warn!("failed to release memory object {i}: {s}");
                    if result.is_ok() {
                        result = Err(release_failure(format!(
                            "failed to release memory object {i}"
                        ))
                        .with_status(s));
                    }
                }
            }
        }
        result
    }
}

fn check_transfer(kind: MemKind, len: usize) -> Result<()> {
    match kind {
        MemKind::Buffer(size) if len > size => Err(invalid_argument(format!(
            "transfer of {len} bytes exceeds buffer of {size} bytes"
        ))),
        MemKind::Image(_) if len != kind.size() => Err(invalid_argument(format!(
            "image transfer of {len} bytes, whole image of {} bytes expected",
            kind.size()
        ))),
        _ => Ok(()),
    }
}

impl<D: Driver> Drop for MemoryRegistry<'_, D> {
    fn drop(&mut self) {
        let _ = self.release_all();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        common_cpu::{Call, Cpu},
        ErrorKind, QueueOptions, Status,
    };
    use rand::Rng;

    fn random_bytes(n: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..n).map(|_| rng.gen()).collect()
    }

    #[test]
    fn test_round_trip() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        for (index, size) in [0, 1, 1000, 4096].into_iter().enumerate() {
            let content = random_bytes(size);
            let handle = registry
                .create_buffer(&queue, index, &content, AccessMode::ReadWrite)
                .unwrap();
            let mut back = vec![0; size];
            registry.read(&queue, handle, &mut back).unwrap();
            assert_eq!(back, content);

            let update = random_bytes(size);
            registry.write(&queue, handle, &update).unwrap();
            registry.read(&queue, handle, &mut back).unwrap();
            assert_eq!(back, update);
        }
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_zero_length_has_no_device_object() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let handle = registry
            .create_buffer(&queue, 0, &[], AccessMode::ReadWrite)
            .unwrap();
        assert_eq!(registry.kind(handle).unwrap(), MemKind::Buffer(0));
        assert!(registry.mem(handle, queue.id()).unwrap().is_none());
        registry.read(&queue, handle, &mut []).unwrap();
        assert_eq!(
            registry.read(&queue, handle, &mut [0]).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
        registry.release(handle).unwrap();
        assert_eq!(cpu.count(Call::CreateBuffer), 0);
        assert_eq!(cpu.count(Call::ReleaseMem), 0);
    }

    #[test]
    fn test_partial_read() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let content = random_bytes(64);
        let handle = registry
            .create_buffer(&queue, 3, &content, AccessMode::ReadOnly)
            .unwrap();
        let mut head = [0; 16];
        registry.read(&queue, handle, &mut head).unwrap();
        assert_eq!(head, content[..16]);
        let mut over = [0; 65];
        assert_eq!(
            registry.read(&queue, handle, &mut over).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_zero_copy_visibility() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);

        let mut host = vec![0u8; 8];
        let ptr = NonNull::new(host.as_mut_ptr()).unwrap();
        let shared = unsafe {
            registry.create_buffer_zero_copy(&queue, 0, ptr, 8, AccessMode::ReadOnly)
        }
        .unwrap();
        assert!(registry.is_zero_copy(shared).unwrap());
        assert_eq!(
            registry.mem(shared, queue.id()).unwrap().unwrap().access(),
            AccessMode::ReadOnly
        );
        registry.write(&queue, shared, &[1, 2, 3]).unwrap();
        assert_eq!(host[..3], [1, 2, 3]);
        host[0] = 42;
        let mut seen = [0; 3];
        registry.read(&queue, shared, &mut seen).unwrap();
        assert_eq!(seen, [42, 2, 3]);

        let mut content = vec![5u8; 8];
        let copied = registry
            .create_buffer(&queue, 1, &content, AccessMode::ReadWrite)
            .unwrap();
        assert!(!registry.is_zero_copy(copied).unwrap());
        content.fill(9);
        let mut back = [0; 8];
        registry.read(&queue, copied, &mut back).unwrap();
        assert_eq!(back, [5; 8]);

        registry.release_all().unwrap();
    }

    #[test]
    fn test_index_bounds() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let before = cpu.total_calls();
        for index in [CAPACITY, CAPACITY + 1, 1000] {
            let e = registry
                .create_buffer(&queue, index, &[1, 2, 3], AccessMode::ReadWrite)
                .unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidHandle);
            let e = registry
                .create_image(&queue, index, &[0; 16], [1, 1, 1], AccessMode::ReadWrite)
                .unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidHandle);
            assert_eq!(registry.handle_at(index).unwrap_err().kind, ErrorKind::InvalidHandle);
        }
        assert_eq!(cpu.total_calls(), before);
    }

    #[test]
    fn test_stale_handle() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let old = registry
            .create_buffer(&queue, 5, &[1; 4], AccessMode::ReadWrite)
            .unwrap();
        registry.release(old).unwrap();
        assert_eq!(registry.release(old).unwrap_err().kind, ErrorKind::InvalidHandle);
        assert_eq!(registry.handle_at(5).unwrap_err().kind, ErrorKind::InvalidHandle);

        let new = registry
            .create_buffer(&queue, 5, &[2; 4], AccessMode::ReadWrite)
            .unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert_eq!(registry.handle_at(5).unwrap(), new);
        let mut back = [0; 4];
        assert_eq!(
            registry.read(&queue, old, &mut back).unwrap_err().kind,
            ErrorKind::InvalidHandle
        );
        registry.read(&queue, new, &mut back).unwrap();
        assert_eq!(back, [2; 4]);
    }

    #[test]
    fn test_foreign_queue() {
        let cpu = Cpu::new();
        let first = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let second = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        assert_ne!(first.id(), second.id());
        let mut registry = MemoryRegistry::new(&cpu);
        let handle = registry
            .create_buffer(&first, 0, &[3; 8], AccessMode::ReadWrite)
            .unwrap();

        let calls = cpu.total_calls();
        let mut back = [0; 8];
        assert_eq!(
            registry.read(&second, handle, &mut back).unwrap_err().kind,
            ErrorKind::InvalidHandle
        );
        assert_eq!(
            registry.write(&second, handle, &[1; 8]).unwrap_err().kind,
            ErrorKind::InvalidHandle
        );
        assert_eq!(cpu.total_calls(), calls);

        registry.read(&first, handle, &mut back).unwrap();
        assert_eq!(back, [3; 8]);
    }

    #[test]
    fn test_replace_releases_previous() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let first = registry
            .create_buffer(&queue, 2, &[1; 4], AccessMode::ReadWrite)
            .unwrap();
        let second = registry
            .create_buffer(&queue, 2, &[2; 4], AccessMode::ReadWrite)
            .unwrap();
        assert_eq!(cpu.count(Call::ReleaseMem), 1);
        assert!(registry.kind(first).is_err());
        assert_eq!(registry.kind(second).unwrap(), MemKind::Buffer(4));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_image() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        let extent = [4, 3, 2];
        let size = 4 * 3 * 2 * IMAGE_PIXEL_BYTES;
        let content = random_bytes(size);

        let e = registry
            .create_image(&queue, 0, &content[1..], extent, AccessMode::ReadWrite)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
        let e = registry
            .create_image(&queue, 0, &[], [0, 1, 1], AccessMode::ReadWrite)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
        let e = registry
            .create_image(&queue, 0, &[], [usize::MAX, 2, 1], AccessMode::ReadWrite)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
        assert_eq!(MemKind::Image([usize::MAX, 2, 1]).size(), usize::MAX);
        assert_eq!(cpu.count(Call::CreateImage), 0);

        let handle = registry
            .create_image(&queue, 0, &content, extent, AccessMode::ReadWrite)
            .unwrap();
        assert_eq!(registry.kind(handle).unwrap().size(), size);
        let mut back = vec![0; size];
        registry.read(&queue, handle, &mut back).unwrap();
        assert_eq!(back, content);

        let update = random_bytes(size);
        registry.write(&queue, handle, &update).unwrap();
        registry.read(&queue, handle, &mut back).unwrap();
        assert_eq!(back, update);
        assert_eq!(
            registry.read(&queue, handle, &mut back[..16]).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_allocation_failure() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        cpu.fail(Call::CreateBuffer, Status::MEM_OBJECT_ALLOCATION_FAILURE);
        let e = registry
            .create_buffer(&queue, 0, &[1; 4], AccessMode::ReadWrite)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::AllocationFailure);
        assert_eq!(e.status, Some(Status::MEM_OBJECT_ALLOCATION_FAILURE));
        assert!(registry.handle_at(0).is_err());
    }

    #[test]
    fn test_upload_failure_releases() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        let mut registry = MemoryRegistry::new(&cpu);
        cpu.fail(Call::WriteBuffer, Status::OUT_OF_RESOURCES);
        let e = registry
            .create_buffer(&queue, 0, &[1; 4], AccessMode::ReadWrite)
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::TransferFailure);
        assert_eq!(cpu.count(Call::ReleaseMem), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_releases_all() {
        let cpu = Cpu::new();
        let queue = CommandQueue::create(&cpu, QueueOptions::default()).unwrap();
        {
            let mut registry = MemoryRegistry::new(&cpu);
            for i in 0..CAPACITY {
                registry
                    .create_buffer(&queue, i, &[i as u8; 8], AccessMode::ReadWrite)
                    .unwrap();
            }
        }
        assert_eq!(cpu.count(Call::ReleaseMem), CAPACITY);
    }
}
