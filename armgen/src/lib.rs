//! The ARM code-generation backend of an optimizing method compiler.
//!
//! This crate translates a finalized, register-allocated [ir::Method] into
//! native code for a 32-bit ARM (Thumb-2 class) target. It covers exactly the
//! backend: declaring per-instruction operand constraints, instruction
//! selection and emission, out-of-line slow paths, parallel move resolution,
//! calling conventions and frame management, and jump tables. The IR builder,
//! the optimizer, the register allocator and the machine-encoding layer are
//! external collaborators, consumed only through their outputs.
//!
//! The flow for one method is:
//!
//!   1. [arm::LocationBuilder] walks the IR and produces a [location::LocationSummary]
//!      per instruction, stating *constraints* only. No code is emitted.
//!   2. An external register allocator replaces the unallocated constraints
//!      with concrete [location::Location]s and records live-register sets.
//!   3. [arm::CodeGenerator] walks the IR once, consuming the now-concrete
//!      summaries and emitting instructions, lazily creating slow paths and
//!      jump tables which are emitted/patched after the main body.
//!
//! Code generation is single-threaded and strictly sequential per method; it
//! either fully compiles a method or aborts the compilation unit on an
//! internal-invariant violation. Target-program errors (null dereference,
//! bounds, divide-by-zero, failed casts) are not compiler errors: they become
//! conditional branches to slow paths that call the runtime's throw
//! entrypoints.

pub mod arm;
pub mod entrypoints;
pub mod ir;
pub mod location;
pub(crate) mod log;
pub mod smap;

use thiserror::Error;

/// Reasons that compiling a method can fail.
///
/// Note that compiler-internal invariant violations (malformed locations,
/// unexpected type/operation combinations) are deliberately *not* represented
/// here: those abort loudly via panics, because emitting silently-wrong code
/// is never an acceptable outcome.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// The method is too big for the code buffer's addressing limits.
    #[error("method exceeds code size limits: {0}")]
    CodeTooBig(String),
    /// An internal error, which hints at a bug in the compiler.
    #[error("internal error: {0}")]
    InternalError(String),
}
