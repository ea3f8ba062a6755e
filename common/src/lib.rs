#![deny(warnings)]

mod error;
mod status;

pub use error::{functions::*, Error, ErrorKind};
pub use status::Status;

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// 设备类别。选择策略只区分 GPU 和 CPU。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DeviceClass {
    Gpu,
    Cpu,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Gpu => write!(f, "GPU"),
            Self::Cpu => write!(f, "CPU"),
        }
    }
}

/// 设备存储对象的访问方式。
///
/// 宿主约定中按 0/1/2 编码，其他值是错误而不是默认值。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    WriteOnly,
    ReadOnly,
}

impl AccessMode {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Self::ReadWrite),
            1 => Ok(Self::WriteOnly),
            2 => Ok(Self::ReadOnly),
            _ => Err(invalid_argument(format!(
                "access mode {code} out of range, 0 (read-write), 1 (write-only) or 2 (read-only) expected"
            ))),
        }
    }
}

/// 图像固定为 4 通道 32 位浮点，每像素 16 字节。
pub const IMAGE_CHANNELS: usize = 4;
pub const IMAGE_PIXEL_BYTES: usize = IMAGE_CHANNELS * size_of::<f32>();

/// 一次已完成操作的四个时间戳，单位纳秒。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProfileTimestamps {
    pub queued: u64,
    pub submitted: u64,
    pub started: u64,
    pub ended: u64,
}

impl ProfileTimestamps {
    /// 仅当 `queued <= submitted <= started <= ended` 时构造成功。
    pub fn new(queued: u64, submitted: u64, started: u64, ended: u64) -> Option<Self> {
        (queued <= submitted && submitted <= started && started <= ended).then_some(Self {
            queued,
            submitted,
            started,
            ended,
        })
    }

    #[inline]
    pub fn queue_to_submit(&self) -> u64 {
        self.submitted - self.queued
    }

    #[inline]
    pub fn submit_to_start(&self) -> u64 {
        self.started - self.submitted
    }

    #[inline]
    pub fn start_to_end(&self) -> u64 {
        self.ended - self.started
    }
}
