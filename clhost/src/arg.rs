use crate::{bind_failure, ArgValue, Driver, KernelBatch, MemHandle, MemoryRegistry, Result};
use half::{bf16, f16};
use log::info;
use std::{mem::size_of, slice::from_raw_parts};

/// 可以按值传给内核的纯数据类型。
///
/// # Safety
///
/// 实现类型必须没有填充字节，且任意位模式都是合法值。
pub unsafe trait Scalar: Copy + 'static {
    #[inline]
    fn as_bytes(&self) -> &[u8] {
        unsafe { from_raw_parts((self as *const Self).cast(), size_of::<Self>()) }
    }
}

macro_rules! scalar {
    ($($ty:ty)+) => {
        $(unsafe impl Scalar for $ty {})+
    };
}

scalar!(u8 i8 u16 i16 u32 i32 u64 i64 f32 f64 f16 bf16);

// 向量类型，如 float4、uint4
unsafe impl<T: Scalar, const N: usize> Scalar for [T; N] {}

/// 内核参数。
#[derive(Clone, Copy, Debug)]
pub enum KernelArg<'a> {
    /// 按值复制的字节。
    Bytes(&'a [u8]),
    /// 注册表中的存储对象。
    Mem(MemHandle),
    /// 指定字节数的局部存储。
    Local(usize),
}

impl<'a> KernelArg<'a> {
    #[inline]
    pub fn scalar<T: Scalar>(value: &'a T) -> Self {
        Self::Bytes(value.as_bytes())
    }
}

impl<D: Driver> KernelBatch<'_, D> {
    /// 设置第 `kernel` 个内核的第 `index` 个参数。
    pub fn set_arg(
        &self,
        kernel: usize,
        index: u32,
        arg: KernelArg,
        registry: &MemoryRegistry<D>,
    ) -> Result<()> {
        let raw = self.kernel(kernel)?;
        let value = match arg {
            KernelArg::Bytes(bytes) => ArgValue::Bytes(bytes),
            KernelArg::Mem(handle) => ArgValue::Mem(registry.mem(handle, self.queue_id())?),
            KernelArg::Local(size) => ArgValue::Local(size),
        };
        self.driver()
            .set_arg(raw, index, value)
            .map_err(|s| {
                bind_failure(format!("failed to set argument {index} of kernel {kernel}"))
                    .with_status(s)
            })?;
        info!("kernel {kernel} argument {index} set");
        Ok(())
    }
}
