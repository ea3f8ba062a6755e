use super::memory::Storage;
use crate::{Scalar, Status};
use std::{mem::size_of, ptr::read_unaligned, sync::Arc};

/// 宿主内核的形参类别。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ParamKind {
    /// 存储对象引用。
    Mem,
    /// 按值传递的标量，携带字节数。
    Scalar(usize),
    /// 局部存储。
    Local,
}

pub type KernelBody = dyn Fn(&Invocation) -> Result<(), Status> + Send + Sync;

/// 注册在软件设备上的内核实现。
#[derive(Clone)]
pub(super) struct HostKernel {
    pub params: Arc<[ParamKind]>,
    pub body: Arc<KernelBody>,
}

#[derive(Clone)]
pub(super) enum Bound {
    Bytes(Vec<u8>),
    Mem(Option<Arc<Storage>>),
    Local(usize),
}

/// 一次内核调用看到的参数和工作尺寸。
pub struct Invocation<'a> {
    pub global: [usize; 3],
    pub local: Option<[usize; 3]>,
    pub(super) args: &'a [Bound],
}

impl Invocation<'_> {
    /// 工作项总数。
    #[inline]
    pub fn work_items(&self) -> usize {
        self.global.iter().product()
    }

    /// 读出参数 `index` 的标量值。
    pub fn scalar<T: Scalar>(&self, index: usize) -> Result<T, Status> {
        match self.args.get(index) {
            Some(Bound::Bytes(bytes)) if bytes.len() == size_of::<T>() => {
                Ok(unsafe { read_unaligned(bytes.as_ptr().cast()) })
            }
            Some(_) => Err(Status::INVALID_ARG_SIZE),
            None => Err(Status::INVALID_ARG_INDEX),
        }
    }

    /// 复制出存储对象参数 `index` 的全部内容。
    pub fn read(&self, index: usize) -> Result<Vec<u8>, Status> {
        Ok(self.storage(index)?.lock().bytes().to_vec())
    }

    /// 从 `offset` 起写入存储对象参数 `index`。
    pub fn write(&self, index: usize, offset: usize, bytes: &[u8]) -> Result<(), Status> {
        let storage = self.storage(index)?;
        let mut backing = storage.lock();
        let dst = backing.bytes_mut();
        match offset.checked_add(bytes.len()) {
            Some(end) if end <= dst.len() => {
                dst[offset..end].copy_from_slice(bytes);
                Ok(())
            }
            _ => Err(Status::OUT_OF_RESOURCES),
        }
    }

    /// 局部存储参数 `index` 的字节数。
    pub fn local_size(&self, index: usize) -> Result<usize, Status> {
        match self.args.get(index) {
            Some(Bound::Local(size)) => Ok(*size),
            Some(_) => Err(Status::INVALID_ARG_VALUE),
            None => Err(Status::INVALID_ARG_INDEX),
        }
    }

    fn storage(&self, index: usize) -> Result<&Storage, Status> {
        match self.args.get(index) {
            Some(Bound::Mem(Some(storage))) => Ok(&**storage),
            Some(Bound::Mem(None)) => Err(Status::INVALID_MEM_OBJECT),
            Some(_) => Err(Status::INVALID_ARG_VALUE),
            None => Err(Status::INVALID_ARG_INDEX),
        }
    }
}

/// 找出源码里声明的全部内核入口。
pub(super) fn entry_points(source: &str) -> Vec<String> {
    let tokens = source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();
    tokens
        .windows(3)
        .filter(|w| matches!(w[0], "__kernel" | "kernel") && w[1] == "void")
        .map(|w| w[2].to_string())
        .collect()
}

/// 源码里 `#error` 指令给出的诊断。
pub(super) fn diagnostics(source: &str) -> Vec<String> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let rest = line.trim_start().strip_prefix("#error")?;
            Some(format!("<source>:{}: error: {}", i + 1, rest.trim()))
        })
        .collect()
}

/// 检查编译选项，返回第一个不认识的选项。
pub(super) fn unknown_option(options: &str) -> Option<&str> {
    let mut tokens = options.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "-D" | "-I" => {
                tokens.next()?;
            }
            "-w" | "-Werror" | "-g" => {}
            t if t.starts_with("-D") || t.starts_with("-I") || t.starts_with("-cl-") => {}
            t => return Some(t),
        }
    }
    None
}
