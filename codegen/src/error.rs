use snafu::Snafu;

use tessel_ir::{ErrorKind, Index, Operand};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(context(false))]
    #[snafu(display("{source}"))]
    Ir { source: tessel_ir::Error },

    #[snafu(context(false))]
    #[snafu(display("{source}"))]
    Schedule { source: tessel_schedule::Error },

    /// The kernel references an index the final tree never defines.
    #[snafu(display("kernel {name} references index {index}, which never becomes defined"))]
    UnsatisfiableKernelPlacement { name: String, index: Index },

    /// A cache registration renamed an operand that no kernel outside the
    /// cache's own copy kernels takes, so the cache could never apply.
    #[snafu(display("cache rename source {operand:?} is not an argument of any kernel it applies to"))]
    UnusedCacheOperand { operand: Operand },

    /// A caller-supplied kernel callback failed.
    #[snafu(display("kernel {name} failed: {source}"))]
    KernelFailed { name: String, source: tessel_ir::Error },

    /// A worker thread of a parallel partition panicked.
    #[snafu(display("parallel worker for {index} panicked"))]
    ParallelWorkerPanicked { index: Index },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Ir { source } => source.kind(),
            Error::Schedule { source } => source.kind(),
            Error::KernelFailed { source, .. } => source.kind(),
            _ => ErrorKind::Configuration,
        }
    }
}
