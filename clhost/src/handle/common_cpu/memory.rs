use crate::{AccessMode, IMAGE_PIXEL_BYTES};
use std::{
    ptr::NonNull,
    slice::{from_raw_parts, from_raw_parts_mut},
    sync::{Arc, Mutex, MutexGuard},
};

/// 存储对象的形状。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(super) enum Shape {
    Buffer(usize),
    Image([usize; 3]),
}

impl Shape {
    #[inline]
    pub fn len(&self) -> usize {
        match *self {
            Self::Buffer(size) => size,
            Self::Image([w, h, d]) => w * h * d * IMAGE_PIXEL_BYTES,
        }
    }
}

/// 存储对象背后的字节。
pub(super) enum Backing {
    Owned(Box<[u8]>),
    /// 零拷贝对象直接读写宿主内存。
    Host { ptr: NonNull<u8>, len: usize },
}

// SAFETY: 宿主内存的有效性由创建者保证，访问都经过互斥锁。
unsafe impl Send for Backing {}

impl Backing {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Owned(data) => data,
            Self::Host { ptr, len } => unsafe { from_raw_parts(ptr.as_ptr(), *len) },
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Owned(data) => data,
            Self::Host { ptr, len } => unsafe { from_raw_parts_mut(ptr.as_ptr(), *len) },
        }
    }
}

pub(super) struct Storage {
    pub shape: Shape,
    pub access: AccessMode,
    data: Mutex<Backing>,
}

impl Storage {
    pub fn new(shape: Shape, access: AccessMode, host: Option<NonNull<u8>>) -> Arc<Self> {
        let len = shape.len();
        let backing = match host {
            Some(ptr) => Backing::Host { ptr, len },
            None => Backing::Owned(vec![0; len].into_boxed_slice()),
        };
        Arc::new(Self {
            shape,
            access,
            data: Mutex::new(backing),
        })
    }

    #[inline]
    pub fn lock(&self) -> MutexGuard<Backing> {
        self.data.lock().unwrap()
    }
}

/// 软件设备上的存储对象。
#[derive(Clone)]
pub struct CpuMem(pub(super) Arc<Storage>);

impl CpuMem {
    /// 对象字节数。
    #[inline]
    pub fn len(&self) -> usize {
        self.0.shape.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn access(&self) -> AccessMode {
        self.0.access
    }

    /// 复制出对象当前内容。
    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().bytes().to_vec()
    }
}
