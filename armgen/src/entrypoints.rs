//! The runtime entrypoint table and the runtime's memory layout contract.
//!
//! Generated code calls the runtime through a thread-relative function
//! pointer table: each [Entrypoint] has a stable id, and its function pointer
//! lives at a fixed offset from the thread register. The call sequence is
//! always `ldr lr, [tr, #offset]; blx lr`.
//!
//! The layout constants below (thread control block, object/class/array/
//! method field offsets) are the runtime's ABI as consumed by this backend;
//! they are defined here in one place so the emission code never hard-codes
//! a raw offset.

use strum::EnumCount;

/// Stable ids for the runtime entrypoints reachable from generated code.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumCount, strum::Display, strum::FromRepr)]
pub enum Entrypoint {
    /// `fn() -> !` — throw a NullPointerException.
    ThrowNullPointer,
    /// `fn(index: i32, length: i32) -> !` — throw an index-out-of-bounds.
    ThrowArrayBounds,
    /// `fn() -> !` — throw an ArithmeticException.
    ThrowDivZero,
    /// `fn(type_idx: u32, method: *Method) -> *Object`.
    AllocObject,
    /// `fn(type_idx: u32, length: i32, method: *Method) -> *Array`.
    AllocArray,
    /// `fn(type_idx: u32) -> *Class` — resolve a type.
    InitializeType,
    /// `fn(type_idx: u32) -> *Class` — resolve and initialize a type.
    InitializeStaticStorage,
    /// `fn(string_idx: u32) -> *String`.
    ResolveString,
    /// `fn(obj: *Object)`.
    LockObject,
    /// `fn(obj: *Object)`.
    UnlockObject,
    /// `fn(num: i32, den: i32) -> (i32, i32)` — quotient in r0, remainder
    /// in r1.
    Idivmod,
    /// `fn(num: i64, den: i64) -> i64` — quotient in r0:r1.
    Ldiv,
    /// `fn(num: i64, den: i64) -> i64` — remainder in r2:r3.
    Lmod,
    /// `fn(x: f32, y: f32) -> f32` — float remainder.
    Fmodf,
    /// `fn(x: f64, y: f64) -> f64` — double remainder.
    Fmod,
    /// Wide conversions without single-instruction hardware forms.
    L2f,
    L2d,
    F2l,
    D2l,
    /// `fn(obj: *Object, class: *Class) -> bool` — the non-trivial
    /// instance-of test.
    InstanceofNonTrivial,
    /// `fn(obj: *Object, class: *Class)` — throws on failure.
    CheckInstanceOf,
    /// `fn(array: *Array, index: i32, value: *Object)` — type-checked
    /// object array store.
    AputObject,
    /// `fn() -> !` (from the compiled frame's point of view) — transfer to
    /// the interpreter.
    Deoptimize,
    /// `fn()` — cooperative suspend point.
    TestSuspend,
}

/// Byte offset of the entrypoint function-pointer table in the thread
/// control block.
pub const ENTRYPOINT_TABLE_OFFSET: i32 = 160;

impl Entrypoint {
    /// The thread-relative byte offset of this entrypoint's function
    /// pointer.
    pub fn offset(self) -> i32 {
        ENTRYPOINT_TABLE_OFFSET + (self as u8 as i32) * 4
    }

    /// Whether a call to this entrypoint needs a PC-info record: anything
    /// that can throw, suspend, deoptimize or allocate (GC safepoint).
    /// The arithmetic helpers are pure leaf calls (divide-by-zero is checked
    /// before the division helpers are reached).
    pub fn requires_stack_map(self) -> bool {
        !matches!(
            self,
            Entrypoint::Idivmod
                | Entrypoint::Ldiv
                | Entrypoint::Lmod
                | Entrypoint::Fmodf
                | Entrypoint::Fmod
                | Entrypoint::L2f
                | Entrypoint::L2d
                | Entrypoint::F2l
                | Entrypoint::D2l
        )
    }
}

// Thread control block layout.

/// Offset of the halfword holding the thread's suspend-request flags.
pub const THREAD_FLAGS_OFFSET: i32 = 0;
/// Offset of the card table base pointer used by the write barrier.
pub const THREAD_CARD_TABLE_OFFSET: i32 = 136;

/// log2 of the heap bytes covered per card-table byte.
pub const CARD_SHIFT: u32 = 10;

// Object model layout.

/// Every object's class pointer is its first word.
pub const OBJECT_CLASS_OFFSET: u32 = 0;
pub const CLASS_SUPER_OFFSET: u32 = 4;
pub const CLASS_COMPONENT_TYPE_OFFSET: u32 = 8;
/// Halfword; zero means "not a primitive type".
pub const CLASS_PRIMITIVE_TYPE_OFFSET: u32 = 12;
pub const CLASS_IMT_PTR_OFFSET: u32 = 16;
/// Start of the class's embedded vtable of method pointers.
pub const CLASS_VTABLE_OFFSET: u32 = 20;

pub const ARRAY_LENGTH_OFFSET: u32 = 8;

/// Offset of an array's first element, 8-byte aligned for wide elements.
pub fn array_data_offset(ty: crate::ir::Ty) -> u32 {
    if ty.is_wide() {
        16
    } else {
        12
    }
}

// Method layout.

/// Offset of a method's resolved-methods cache pointer.
pub const METHOD_DEX_CACHE_METHODS_OFFSET: u32 = 12;
/// Offset of a method's resolved-types cache pointer.
pub const METHOD_DEX_CACHE_TYPES_OFFSET: u32 = 16;
/// Offset of a method's compiled-code entry pointer.
pub const METHOD_ENTRYPOINT_OFFSET: u32 = 24;
