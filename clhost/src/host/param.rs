use crate::{invalid_argument, invalid_handle, Error, Result};
use std::{path::PathBuf, ptr::NonNull};

/// 宿主传来的字符串：声明长度、类型标记和文本。
#[derive(Clone, Copy, Debug)]
pub struct HostStr<'a> {
    pub len: i16,
    pub tag: i16,
    pub text: &'a str,
}

impl<'a> HostStr<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            len: text.len().try_into().unwrap_or(i16::MAX),
            tag: 0,
            text,
        }
    }

    /// 按声明长度截取的文本。
    pub fn as_str(&self) -> Option<&'a str> {
        let len = usize::try_from(self.len).ok()?;
        self.text.get(..len)
    }
}

/// 宿主调用的一个参数槽。
#[derive(Debug)]
pub enum Param<'a> {
    Handle(u64),
    /// 由调用写回的句柄。
    HandleOut(&'a mut u64),
    U32(u32),
    I32(i32),
    U64(u64),
    Bool(bool),
    Str(HostStr<'a>),
    StrList(&'a [HostStr<'a>]),
    Bytes(&'a [u8]),
    BytesMut(&'a mut [u8]),
    Uint4([u32; 4]),
}

impl Param<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::Handle(_) => "handle",
            Self::HandleOut(_) => "handle out",
            Self::U32(_) => "u32",
            Self::I32(_) => "i32",
            Self::U64(_) => "u64",
            Self::Bool(_) => "bool",
            Self::Str(_) => "string",
            Self::StrList(_) => "string list",
            Self::Bytes(_) => "bytes",
            Self::BytesMut(_) => "mutable bytes",
            Self::Uint4(_) => "uint4",
        }
    }
}

/// 按位置读取参数槽。
pub(super) struct Slots<'p, 'a>(pub &'p mut [Param<'a>]);

impl Slots<'_, '_> {
    fn mismatch(&self, i: usize, expected: &str) -> Error {
        invalid_argument(format!(
            "slot {i}: {expected} expected, {} found",
            self.0[i].name()
        ))
    }

    pub fn handle(&self, i: usize) -> Result<u64> {
        match self.0[i] {
            Param::Handle(h) | Param::U64(h) => Ok(h),
            _ => Err(self.mismatch(i, "handle")),
        }
    }

    pub fn set_handle(&mut self, i: usize, value: u64) -> Result<()> {
        match &mut self.0[i] {
            Param::HandleOut(out) => {
                **out = value;
                Ok(())
            }
            _ => Err(self.mismatch(i, "handle out")),
        }
    }

    pub fn bool(&self, i: usize) -> Result<bool> {
        match self.0[i] {
            Param::Bool(b) => Ok(b),
            Param::I32(v) => Ok(v != 0),
            Param::U32(v) => Ok(v != 0),
            _ => Err(self.mismatch(i, "bool")),
        }
    }

    fn integer(&self, i: usize) -> Result<i128> {
        match self.0[i] {
            Param::U32(v) => Ok(v as _),
            Param::I32(v) => Ok(v as _),
            Param::U64(v) => Ok(v as _),
            _ => Err(self.mismatch(i, "integer")),
        }
    }

    /// 注册表槽位或内核序号，负数是无效句柄。
    pub fn index(&self, i: usize) -> Result<usize> {
        let v = self.integer(i)?;
        usize::try_from(v).map_err(|_| invalid_handle(format!("slot {i}: index {v} out of range")))
    }

    /// 数量或字节数，负数是无效参数。
    pub fn count(&self, i: usize) -> Result<usize> {
        let v = self.integer(i)?;
        usize::try_from(v).map_err(|_| invalid_argument(format!("slot {i}: count {v} out of range")))
    }

    pub fn i32(&self, i: usize) -> Result<i32> {
        let v = self.integer(i)?;
        i32::try_from(v).map_err(|_| invalid_argument(format!("slot {i}: {v} out of range")))
    }

    pub fn u32(&self, i: usize) -> Result<u32> {
        let v = self.integer(i)?;
        u32::try_from(v).map_err(|_| invalid_argument(format!("slot {i}: {v} out of range")))
    }

    pub fn str(&self, i: usize) -> Result<&str> {
        match &self.0[i] {
            Param::Str(s) => s
                .as_str()
                .ok_or_else(|| invalid_argument(format!("slot {i}: string length {} invalid", s.len))),
            _ => Err(self.mismatch(i, "string")),
        }
    }

    /// 空串表示不指定路径。
    pub fn path(&self, i: usize) -> Result<Option<PathBuf>> {
        let s = self.str(i)?;
        Ok((!s.is_empty()).then(|| PathBuf::from(s)))
    }

    /// 字符串表的前 `n` 项。
    pub fn strs(&self, i: usize, n: usize) -> Result<Vec<&str>> {
        let Param::StrList(list) = &self.0[i] else {
            return Err(self.mismatch(i, "string list"));
        };
        if list.len() < n {
            return Err(invalid_argument(format!(
                "slot {i}: {n} strings expected, {} found",
                list.len()
            )));
        }
        list[..n]
            .iter()
            .enumerate()
            .map(|(j, s)| {
                s.as_str()
                    .ok_or_else(|| invalid_argument(format!("slot {i}: string {j} length invalid")))
            })
            .collect()
    }

    pub fn bytes(&self, i: usize) -> Result<&[u8]> {
        match &self.0[i] {
            Param::Bytes(b) => Ok(*b),
            Param::BytesMut(b) => Ok(&**b),
            _ => Err(self.mismatch(i, "bytes")),
        }
    }

    pub fn bytes_mut(&mut self, i: usize) -> Result<&mut [u8]> {
        if !matches!(self.0[i], Param::BytesMut(_)) {
            return Err(self.mismatch(i, "mutable bytes"));
        }
        match &mut self.0[i] {
            Param::BytesMut(b) => Ok(&mut **b),
            _ => unreachable!(),
        }
    }

    /// 可变字节槽的起始地址。
    pub fn host_ptr(&mut self, i: usize) -> Result<(NonNull<u8>, usize)> {
        let bytes = self.bytes_mut(i)?;
        Ok((NonNull::from(&mut *bytes).cast(), bytes.len()))
    }

    pub fn uint4(&self, i: usize) -> Result<[u32; 4]> {
        match self.0[i] {
            Param::Uint4(v) => Ok(v),
            _ => Err(self.mismatch(i, "uint4")),
        }
    }
}
