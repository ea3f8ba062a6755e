use crate::Status;
use std::{error, fmt};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ErrorKind {
    ArgumentCountMismatch,
    InvalidArgument,
    InvalidHandle,
    EnumerationFailure,
    ContextCreationFailure,
    QueueCreationFailure,
    SourceReadFailure,
    ProgramCreationFailure,
    BuildFailure,
    KernelCreationFailure,
    AllocationFailure,
    TransferFailure,
    BindFailure,
    ExecutionFailure,
    SynchronizationFailure,
    ReleaseFailure,
}

/// 管线任一阶段的失败。
///
/// `status` 是计算 API 返回的原始状态码（如果失败来自 API 调用），
/// `build_log` 只在 [`ErrorKind::BuildFailure`] 时携带编译器日志。
#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub info: String,
    pub status: Option<Status>,
    pub build_log: Option<String>,
}

impl Error {
    #[inline]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    #[inline]
    pub fn with_build_log(mut self, log: impl Into<String>) -> Self {
        self.build_log = Some(log.into());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.info)?;
        if let Some(status) = self.status {
            write!(f, " ({status})")?;
        }
        if let Some(log) = &self.build_log {
            write!(f, "\nbuild log:\n{log}")?;
        }
        Ok(())
    }
}

impl error::Error for Error {}

pub(super) mod functions {
    use super::{Error, ErrorKind::*};

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr) => {
            #[inline]
            pub fn $name(info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    info: info.into(),
                    status: None,
                    build_log: None,
                }
            }
        };
    }

    builder!(Error: argument_count_mismatch  ArgumentCountMismatch );
    builder!(Error: invalid_argument         InvalidArgument       );
    builder!(Error: invalid_handle           InvalidHandle         );
    builder!(Error: enumeration_failure      EnumerationFailure    );
    builder!(Error: context_creation_failure ContextCreationFailure);
    builder!(Error: queue_creation_failure   QueueCreationFailure  );
    builder!(Error: source_read_failure      SourceReadFailure     );
    builder!(Error: program_creation_failure ProgramCreationFailure);
    builder!(Error: build_failure            BuildFailure          );
    builder!(Error: kernel_creation_failure  KernelCreationFailure );
    builder!(Error: allocation_failure       AllocationFailure     );
    builder!(Error: transfer_failure         TransferFailure       );
    builder!(Error: bind_failure             BindFailure           );
    builder!(Error: execution_failure        ExecutionFailure      );
    builder!(Error: synchronization_failure  SynchronizationFailure);
    builder!(Error: release_failure          ReleaseFailure        );
}
