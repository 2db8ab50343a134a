//! The finalized IR consumed by the backend.
//!
//! This is the *output* side of the mid-end: by the time a [Method] reaches
//! this crate it has been built, optimized and register allocated. The
//! backend reads it; the only artifacts it attaches live in its own tables
//! (see [crate::arm::LocationTable]).
//!
//! Instructions form a closed set: [Inst] is an enum matched exhaustively, so
//! an unhandled type/operation combination is a compile-time hole rather
//! than a runtime default-fatal fallback. Values are named by [InstId], the
//! offset of their defining instruction in the method-wide instruction
//! vector; constants are ordinary [Inst::Constant] instructions referenced by
//! id. Basic blocks hold instruction ids in order plus one [Terminator].
//!
//! Abbreviations used throughout the crate (following the conventions of the
//! rest of the compiler):
//!
//!  * `iidx`: an [InstId].
//!  * `bidx`: a [BlockId].
//!  * `m`: the name conventionally given to the [Method] being compiled.

use smallvec::SmallVec;
use std::fmt;
use typed_index_collections::TiVec;

/// The index of an instruction in a method's instruction vector. Also the
/// name of the value it defines, if it defines one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstId(u32);

impl From<usize> for InstId {
    fn from(v: usize) -> Self {
        InstId(u32::try_from(v).expect("instruction index overflow"))
    }
}

impl From<InstId> for usize {
    fn from(v: InstId) -> Self {
        v.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The index of a basic block in a method's block vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl From<usize> for BlockId {
    fn from(v: usize) -> Self {
        BlockId(u32::try_from(v).expect("block index overflow"))
    }
}

impl From<BlockId> for usize {
    fn from(v: BlockId) -> Self {
        v.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// The primitive type of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Ty {
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// An object reference.
    Ref,
}

impl Ty {
    /// Is this a 64-bit type, needing a register pair or double stack slot?
    pub fn is_wide(self) -> bool {
        matches!(self, Ty::Long | Ty::Double)
    }

    pub fn is_fp(self) -> bool {
        matches!(self, Ty::Float | Ty::Double)
    }

    /// log2 of the in-memory size of a value of this type.
    pub fn size_shift(self) -> u32 {
        match self {
            Ty::Bool | Ty::Byte => 0,
            Ty::Char | Ty::Short => 1,
            Ty::Int | Ty::Float | Ty::Ref => 2,
            Ty::Long | Ty::Double => 3,
        }
    }
}

/// A constant value. Floating point constants are stored as raw bits so that
/// constants compare and hash structurally (and `-0.0 != 0.0`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstVal {
    Int(i32),
    Long(i64),
    Float(u32),
    Double(u64),
    Null,
}

impl ConstVal {
    pub fn float(v: f32) -> Self {
        ConstVal::Float(v.to_bits())
    }

    pub fn double(v: f64) -> Self {
        ConstVal::Double(v.to_bits())
    }

    /// The value as a 32-bit word: ints and nulls directly, floats as bits.
    /// Wide constants are an internal compiler error.
    pub fn as_word(&self) -> i32 {
        match self {
            ConstVal::Int(v) => *v,
            ConstVal::Null => 0,
            ConstVal::Float(bits) => *bits as i32,
            _ => panic!("expected 32-bit constant, got {self}"),
        }
    }

    /// The value as a 64-bit quantity: longs directly, doubles as bits.
    pub fn as_dword(&self) -> i64 {
        match self {
            ConstVal::Long(v) => *v,
            ConstVal::Double(bits) => *bits as i64,
            _ => panic!("expected 64-bit constant, got {self}"),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConstVal::Null)
    }

    /// Is this zero of any width, including both FP zeroes' +0.0 encoding?
    pub fn is_arithmetic_zero(&self) -> bool {
        match self {
            ConstVal::Int(0) | ConstVal::Long(0) | ConstVal::Null => true,
            ConstVal::Float(bits) => f32::from_bits(*bits) == 0.0,
            ConstVal::Double(bits) => f64::from_bits(*bits) == 0.0,
            _ => false,
        }
    }
}

impl fmt::Display for ConstVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstVal::Int(v) => write!(f, "{v}"),
            ConstVal::Long(v) => write!(f, "{v}l"),
            ConstVal::Float(bits) => write!(f, "{}f", f32::from_bits(*bits)),
            ConstVal::Double(bits) => write!(f, "{}d", f64::from_bits(*bits)),
            ConstVal::Null => write!(f, "null"),
        }
    }
}

/// Two-operand arithmetic/logical operations with uniform shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Orr,
    Eor,
}

/// Shift operations (rotation is its own instruction kind: its operand
/// normalization and long form differ substantially).
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ShiftOp {
    /// Left shift.
    Shl,
    /// Arithmetic (sign-propagating) right shift.
    Shr,
    /// Logical (zero-filling) right shift.
    UShr,
}

/// An abstract comparison predicate. `Below`/`Above` families are the
/// unsigned comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Predicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Below,
    BelowEq,
    Above,
    AboveEq,
}

impl Predicate {
    pub fn opposite(self) -> Predicate {
        match self {
            Predicate::Eq => Predicate::Ne,
            Predicate::Ne => Predicate::Eq,
            Predicate::Lt => Predicate::Ge,
            Predicate::Le => Predicate::Gt,
            Predicate::Gt => Predicate::Le,
            Predicate::Ge => Predicate::Lt,
            Predicate::Below => Predicate::AboveEq,
            Predicate::BelowEq => Predicate::Above,
            Predicate::Above => Predicate::BelowEq,
            Predicate::AboveEq => Predicate::Below,
        }
    }
}

/// How an unordered (NaN) floating point comparison resolves: with
/// `GtBias`, NaN makes the comparison behave as if the left operand were
/// greater; with `LtBias`, as if it were less. Source-language comparison
/// semantics pick the bias so that NaN never incorrectly satisfies
/// LT/LE/GT/GE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FpBias {
    GtBias,
    LtBias,
}

/// The statically-determined shape of an instance-of / check-cast test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeCheckKind {
    /// The target class is final: a single class-pointer equality test.
    Exact,
    /// The target class is abstract: walk superclasses to equal-or-null.
    AbstractClass,
    /// Walk the superclass chain looking for the target class.
    ClassHierarchy,
    /// The target is an object array type: exact check, else non-primitive
    /// array component check.
    ArrayObject,
    /// The target is an array type needing a runtime test on mismatch.
    ArrayCheck,
    /// The target class was unresolved at compile time: always slow path.
    Unresolved,
    /// The target is an interface: always slow path.
    Interface,
}

/// How an invoke resolves its callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvokeKind {
    /// Static dispatch through the caller's method cache.
    Static,
    /// Direct (private/constructor) dispatch through the caller's method
    /// cache.
    Direct,
    /// Dispatch through the receiver class's vtable.
    Virtual { vtable_index: u32 },
    /// Dispatch through the receiver class's interface method table, keyed
    /// by a hidden index argument.
    Interface { imt_index: u32 },
}

/// One already-located move of a parallel move batch. These are created by
/// the external register allocator (block-boundary shuffles, invoke argument
/// setup), so they carry concrete locations.
#[derive(Clone, Copy, Debug)]
pub struct MoveOp {
    pub src: crate::location::Location,
    pub dst: crate::location::Location,
    pub ty: Ty,
}

/// An IR instruction. The set is closed; the backend matches exhaustively.
#[derive(Clone, Debug)]
pub enum Inst {
    /// A compile-time constant value.
    Constant(ConstVal),
    /// The `index`th incoming argument of the method.
    Param { index: u32, ty: Ty },
    /// The pointer to the method being compiled.
    CurrentMethod,

    BinOp {
        op: BinOp,
        ty: Ty,
        lhs: InstId,
        rhs: InstId,
    },
    Div {
        ty: Ty,
        lhs: InstId,
        rhs: InstId,
    },
    Rem {
        ty: Ty,
        lhs: InstId,
        rhs: InstId,
    },
    Neg {
        ty: Ty,
        value: InstId,
    },
    /// Bitwise not on int/long.
    Not {
        ty: Ty,
        value: InstId,
    },
    /// Logical not on a boolean value.
    BoolNot {
        value: InstId,
    },
    Shift {
        op: ShiftOp,
        ty: Ty,
        value: InstId,
        amount: InstId,
    },
    Ror {
        ty: Ty,
        value: InstId,
        amount: InstId,
    },

    /// Three-way comparison producing -1/0/1.
    Compare {
        ty: Ty,
        lhs: InstId,
        rhs: InstId,
        bias: FpBias,
    },
    /// A boolean-valued comparison. If `materialized` is false its single
    /// consumer is a branch and the comparison is folded there; no value is
    /// produced.
    Condition {
        pred: Predicate,
        ty: Ty,
        lhs: InstId,
        rhs: InstId,
        bias: FpBias,
        materialized: bool,
    },

    /// Numeric conversion to `to`; the source type is the input's type.
    Conversion {
        to: Ty,
        value: InstId,
    },

    NullCheck {
        obj: InstId,
    },
    BoundsCheck {
        index: InstId,
        length: InstId,
    },
    DivZeroCheck {
        ty: Ty,
        value: InstId,
    },

    ArrayLength {
        array: InstId,
    },
    ArrayGet {
        array: InstId,
        index: InstId,
        ty: Ty,
    },
    ArraySet {
        array: InstId,
        index: InstId,
        value: InstId,
        ty: Ty,
        /// The array's element type isn't statically known to accept the
        /// value: emit the element-class check (and slow path).
        needs_type_check: bool,
        /// The array is statically a `java.lang.Object[]`-like array: a
        /// single super-class walk to null suffices on class mismatch.
        static_type_is_object_array: bool,
        value_can_be_null: bool,
    },

    /// Load from `base + offset` (instance field, or static field with the
    /// class as base).
    FieldGet {
        base: InstId,
        offset: u32,
        ty: Ty,
        volatile: bool,
    },
    FieldSet {
        base: InstId,
        offset: u32,
        value: InstId,
        ty: Ty,
        volatile: bool,
        value_can_be_null: bool,
    },

    InstanceOf {
        obj: InstId,
        class: InstId,
        kind: TypeCheckKind,
        must_do_null_check: bool,
    },
    CheckCast {
        obj: InstId,
        class: InstId,
        kind: TypeCheckKind,
        must_do_null_check: bool,
        /// A handler in this method may catch the failure: the slow path
        /// must be resumable (save/restore live registers).
        can_throw_into_catch: bool,
    },

    /// Resolve a class, via the caller's type cache with a runtime slow
    /// path. If `must_init` the class is also initialized.
    LoadClass {
        method: InstId,
        type_idx: u32,
        must_init: bool,
    },
    /// Resolve a string constant (runtime call).
    LoadString {
        string_idx: u32,
    },
    NewInstance {
        method: InstId,
        type_idx: u32,
    },
    NewArray {
        method: InstId,
        length: InstId,
        type_idx: u32,
    },

    Invoke {
        kind: InvokeKind,
        method_idx: u32,
        args: SmallVec<[InstId; 4]>,
        ret_ty: Option<Ty>,
        /// The caller's method pointer; needed for static/direct dispatch.
        method: InstId,
    },

    MonitorOp {
        obj: InstId,
        enter: bool,
    },

    /// A cooperative safepoint poll. Stands alone at method entry; loop
    /// back-edge polls are referenced from [Terminator::Goto].
    SuspendCheck,
    /// Leave the compiled code and resume in the interpreter if `cond` is
    /// true.
    Deoptimize {
        cond: InstId,
    },

    /// The operand payload of a [Terminator::Switch]: holds the switch key
    /// input and the temporaries the table form needs. Lives in the
    /// instruction table but not in any block's instruction list; the
    /// terminator emits it.
    PackedSwitch {
        value: InstId,
        start: i32,
        num_entries: u32,
    },

    /// A batch of simultaneous moves inserted by the register allocator.
    ParallelMove {
        moves: Vec<MoveOp>,
    },
}

impl Inst {
    /// The type of the value this instruction defines, or `None` if it
    /// defines no value.
    pub fn result_ty(&self) -> Option<Ty> {
        match self {
            Inst::Constant(c) => Some(match c {
                ConstVal::Int(_) => Ty::Int,
                ConstVal::Long(_) => Ty::Long,
                ConstVal::Float(_) => Ty::Float,
                ConstVal::Double(_) => Ty::Double,
                ConstVal::Null => Ty::Ref,
            }),
            Inst::Param { ty, .. } => Some(*ty),
            Inst::CurrentMethod => Some(Ty::Ref),
            Inst::BinOp { ty, .. }
            | Inst::Div { ty, .. }
            | Inst::Rem { ty, .. }
            | Inst::Neg { ty, .. }
            | Inst::Not { ty, .. }
            | Inst::Shift { ty, .. }
            | Inst::Ror { ty, .. } => Some(*ty),
            Inst::BoolNot { .. } => Some(Ty::Bool),
            Inst::Compare { .. } => Some(Ty::Int),
            Inst::Condition { materialized, .. } => materialized.then_some(Ty::Bool),
            Inst::Conversion { to, .. } => Some(*to),
            // A null check defines the checked (now known non-null)
            // reference, in the same location as its input.
            Inst::NullCheck { .. } => Some(Ty::Ref),
            Inst::BoundsCheck { .. } => Some(Ty::Int),
            Inst::DivZeroCheck { ty, .. } => Some(*ty),
            Inst::ArrayLength { .. } => Some(Ty::Int),
            Inst::ArrayGet { ty, .. } => Some(*ty),
            Inst::FieldGet { ty, .. } => Some(*ty),
            Inst::InstanceOf { .. } => Some(Ty::Bool),
            Inst::LoadClass { .. } | Inst::LoadString { .. } => Some(Ty::Ref),
            Inst::NewInstance { .. } | Inst::NewArray { .. } => Some(Ty::Ref),
            Inst::Invoke { ret_ty, .. } => *ret_ty,
            Inst::ArraySet { .. }
            | Inst::FieldSet { .. }
            | Inst::CheckCast { .. }
            | Inst::MonitorOp { .. }
            | Inst::SuspendCheck
            | Inst::Deoptimize { .. }
            | Inst::PackedSwitch { .. }
            | Inst::ParallelMove { .. } => None,
        }
    }

    /// A short operation name for listings and logging.
    pub fn name(&self) -> String {
        match self {
            Inst::Constant(c) => format!("const {c}"),
            Inst::Param { index, .. } => format!("param{index}"),
            Inst::CurrentMethod => "current-method".into(),
            Inst::BinOp { op, ty, .. } => format!("{op}.{ty}"),
            Inst::Div { ty, .. } => format!("div.{ty}"),
            Inst::Rem { ty, .. } => format!("rem.{ty}"),
            Inst::Neg { ty, .. } => format!("neg.{ty}"),
            Inst::Not { ty, .. } => format!("not.{ty}"),
            Inst::BoolNot { .. } => "bool-not".into(),
            Inst::Shift { op, ty, .. } => format!("{op}.{ty}"),
            Inst::Ror { ty, .. } => format!("ror.{ty}"),
            Inst::Compare { ty, .. } => format!("cmp3.{ty}"),
            Inst::Condition { pred, .. } => format!("cond.{pred:?}").to_lowercase(),
            Inst::Conversion { to, .. } => format!("cvt.{to}"),
            Inst::NullCheck { .. } => "null-check".into(),
            Inst::BoundsCheck { .. } => "bounds-check".into(),
            Inst::DivZeroCheck { .. } => "div-zero-check".into(),
            Inst::ArrayLength { .. } => "array-length".into(),
            Inst::ArrayGet { ty, .. } => format!("aget.{ty}"),
            Inst::ArraySet { ty, .. } => format!("aset.{ty}"),
            Inst::FieldGet { ty, .. } => format!("fget.{ty}"),
            Inst::FieldSet { ty, .. } => format!("fset.{ty}"),
            Inst::InstanceOf { .. } => "instance-of".into(),
            Inst::CheckCast { .. } => "check-cast".into(),
            Inst::LoadClass { .. } => "load-class".into(),
            Inst::LoadString { .. } => "load-string".into(),
            Inst::NewInstance { .. } => "new-instance".into(),
            Inst::NewArray { .. } => "new-array".into(),
            Inst::Invoke { kind, .. } => match kind {
                InvokeKind::Static => "invoke-static".into(),
                InvokeKind::Direct => "invoke-direct".into(),
                InvokeKind::Virtual { .. } => "invoke-virtual".into(),
                InvokeKind::Interface { .. } => "invoke-interface".into(),
            },
            Inst::MonitorOp { enter: true, .. } => "monitor-enter".into(),
            Inst::MonitorOp { enter: false, .. } => "monitor-exit".into(),
            Inst::SuspendCheck => "suspend-check".into(),
            Inst::Deoptimize { .. } => "deoptimize".into(),
            Inst::PackedSwitch { .. } => "packed-switch".into(),
            Inst::ParallelMove { .. } => "parallel-move".into(),
        }
    }
}

/// How a basic block ends.
#[derive(Clone, Debug)]
pub enum Terminator {
    Goto {
        target: BlockId,
        /// For loop back-edges: the suspend check to poll before jumping.
        suspend: Option<InstId>,
    },
    If {
        cond: InstId,
        true_target: BlockId,
        false_target: BlockId,
    },
    /// A packed switch; `inst` names the [Inst::PackedSwitch] payload
    /// carrying the key input and temporaries.
    Switch {
        inst: InstId,
        targets: Vec<BlockId>,
        default: BlockId,
    },
    Return {
        value: Option<InstId>,
    },
}

/// A basic block: instruction ids in order plus a terminator.
#[derive(Clone, Debug)]
pub struct Block {
    pub insts: Vec<InstId>,
    pub term: Terminator,
}

/// A whole method, ready for code generation.
#[derive(Clone, Debug)]
pub struct Method {
    pub blocks: TiVec<BlockId, Block>,
    insts: TiVec<InstId, Inst>,
    dex_pcs: TiVec<InstId, u32>,
    /// True if the method makes no calls (including runtime calls); lets the
    /// prologue skip the stack overflow probe for small frames.
    pub is_leaf: bool,
}

impl Method {
    pub fn new() -> Self {
        Method {
            blocks: TiVec::new(),
            insts: TiVec::new(),
            dex_pcs: TiVec::new(),
            is_leaf: true,
        }
    }

    /// Append an instruction, returning the id naming its value.
    pub fn push_inst(&mut self, inst: Inst, dex_pc: u32) -> InstId {
        let id = InstId::from(self.insts.len());
        self.insts.push(inst);
        self.dex_pcs.push(dex_pc);
        id
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        let id = BlockId::from(self.blocks.len());
        self.blocks.push(block);
        id
    }

    pub fn inst(&self, iidx: InstId) -> &Inst {
        &self.insts[iidx]
    }

    pub fn num_insts(&self) -> usize {
        self.insts.len()
    }

    pub fn dex_pc(&self, iidx: InstId) -> u32 {
        self.dex_pcs[iidx]
    }

    pub fn result_ty(&self, iidx: InstId) -> Option<Ty> {
        self.inst(iidx).result_ty()
    }

    /// If `iidx` names a constant, its value.
    pub fn as_const(&self, iidx: InstId) -> Option<ConstVal> {
        match self.inst(iidx) {
            Inst::Constant(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_null_const(&self, iidx: InstId) -> bool {
        matches!(self.as_const(iidx), Some(c) if c.is_null())
    }
}

impl Default for Method {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_types() {
        let mut m = Method::new();
        let c = m.push_inst(Inst::Constant(ConstVal::Int(7)), 0);
        let p = m.push_inst(
            Inst::Param {
                index: 0,
                ty: Ty::Long,
            },
            0,
        );
        let add = m.push_inst(
            Inst::BinOp {
                op: BinOp::Add,
                ty: Ty::Int,
                lhs: c,
                rhs: c,
            },
            1,
        );
        assert_eq!(m.result_ty(c), Some(Ty::Int));
        assert_eq!(m.result_ty(p), Some(Ty::Long));
        assert_eq!(m.result_ty(add), Some(Ty::Int));
        assert_eq!(m.as_const(c), Some(ConstVal::Int(7)));
        assert_eq!(m.dex_pc(add), 1);
    }

    #[test]
    fn unmaterialized_condition_defines_no_value() {
        let mut m = Method::new();
        let c = m.push_inst(Inst::Constant(ConstVal::Int(0)), 0);
        let cond = m.push_inst(
            Inst::Condition {
                pred: Predicate::Lt,
                ty: Ty::Int,
                lhs: c,
                rhs: c,
                bias: FpBias::GtBias,
                materialized: false,
            },
            0,
        );
        assert_eq!(m.result_ty(cond), None);
    }
}
