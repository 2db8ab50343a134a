//! The ARM code generator.
//!
//! Conventions used in this module:
//!   * Functions with a `cg_` prefix generate code for one IR construct.
//!   * Functions with a `locs_` prefix declare operand constraints for one
//!     IR construct and emit nothing.
//!   * Helper function arguments are ordered `(<destination>, <source_1>,
//!     ... <source_n>)`.
//!
//! Notes:
//!
//!   * The target is a Thumb-2 class 32-bit ARM: 64-bit values live in
//!     even/odd core register pairs, hardware divide and atomic
//!     `ldrd`/`strd` are optional [IsaFeatures], predicated instructions
//!     are available, and indirect branches need the interworking parity
//!     bit.
//!   * Register-amount shifts use the low byte of the amount register, so
//!     Java shift semantics need an explicit mask to the type's width.
//!   * The flags register is live between a compare and its consumers;
//!     materialization sequences move constants *before* the compare
//!     because a narrow `mov` encoding may set flags.

mod asm;
mod magic;
mod moves;
mod slow_paths;
#[cfg(test)]
mod sim;
#[cfg(test)]
mod testalloc;

pub use asm::{ArmInst, Assembler, CodeBuffer, Cond, Label};
use asm::{BarrierKind, CvtKind, JumpTableId, MemOff, MemWidth, Operand2, VOp};
use moves::ParallelMoveResolver;
use slow_paths::{SlowPath, SlowPathKind};

use crate::{
    entrypoints::{self, Entrypoint},
    ir::{
        BinOp, BlockId, FpBias, Inst, InstId, InvokeKind, Method, Predicate, ShiftOp, Terminator,
        Ty, TypeCheckKind,
    },
    location::{
        CoreReg, Location, LocationSummary, OutputOverlap, RegisterSet, Requirement, SReg,
        CORE_CALLEE_SAVES, FPU_CALLEE_SAVES, LR, PC, R0, R1, R2, R3, SP, TR,
    },
    log::{self, Verbosity},
    smap::{PcInfo, StackMapStream},
    CompilationError,
};
use smallvec::SmallVec;
use typed_index_collections::TiVec;

/// Per-instruction location summaries, created by [LocationBuilder::run] and
/// completed by the external register allocator.
pub type LocationTable = TiVec<InstId, Option<LocationSummary>>;

/// Which optional instruction-set features the target core has.
#[derive(Clone, Copy, Debug)]
pub struct IsaFeatures {
    /// Hardware `sdiv`.
    pub has_div: bool,
    /// Single-copy-atomic `ldrd`/`strd` for aligned doublewords.
    pub has_atomic_ldrd_strd: bool,
}

/// Per-compilation options.
#[derive(Clone, Copy, Debug)]
pub struct CodegenOptions {
    /// Fold null checks into the first dependent memory access (a fault is
    /// turned into the exception by the runtime); otherwise compare and
    /// branch to a throwing slow path.
    pub implicit_null_checks: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            implicit_null_checks: true,
        }
    }
}

/// What the external register allocator reports back about a method.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllocationResult {
    /// Core registers the allocator ever assigned.
    pub allocated_core: u16,
    /// FPU (S) registers the allocator ever assigned.
    pub allocated_fpu: u32,
    /// 32-bit spill slots the allocator needs.
    pub num_spill_slots: u32,
}

/// The frame layout of a compiled method.
#[derive(Clone, Copy, Debug)]
pub struct FrameInfo {
    /// Total frame size in bytes, a multiple of [STACK_ALIGNMENT].
    pub frame_size: u32,
    /// Core callee-saves the prologue pushes. Always contains `lr`.
    pub core_spill_mask: u16,
    /// FPU callee-saves the prologue pushes, widened to one contiguous run
    /// (`vpush`/`vpop` take a range).
    pub fpu_spill_mask: u32,
    /// SP-relative offset of the first slot slow paths may spill to.
    pub first_slow_path_slot: i32,
}

impl FrameInfo {
    /// Bytes the prologue's push/vpush consume.
    fn entry_spill_size(&self) -> u32 {
        4 * (self.core_spill_mask.count_ones() + self.fpu_spill_mask.count_ones())
    }
}

/// The backend's output for one method.
pub struct CompiledMethod {
    pub code: CodeBuffer,
    pub frame: FrameInfo,
    pub pc_infos: Vec<PcInfo>,
    /// Byte offset of each basic block's first instruction.
    pub block_offsets: TiVec<BlockId, usize>,
}

/// Stack alignment the ABI requires at public interfaces.
pub const STACK_ALIGNMENT: u32 = 8;
/// Bytes of guard area probed by the implicit stack-overflow check.
const STACK_OVERFLOW_RESERVED: i32 = 8192;
/// Frames at least this big always probe, leaf or not.
const FRAME_CHECK_THRESHOLD: u32 = 2048;
/// Reserved area for slow-path register saves (4 core + 16 FPU words).
const SLOW_PATH_SPILL_BYTES: u32 = 80;
/// At most this many packed-switch entries use cascading compare/branch;
/// larger switches build a jump table.
const SWITCH_TABLE_THRESHOLD: u32 = 7;
/// Indirect branch targets need bit 0 set to stay in the current ISA mode.
const INTERWORKING_PARITY: i32 = 1;
/// Method code larger than this overflows branch/table encodings.
const MAX_METHOD_CODE_BYTES: usize = 1 << 24;

/// Core argument registers of the bytecode calling convention. `r0` carries
/// the callee method pointer.
const DEX_ARG_REGS: [CoreReg; 3] = [R1, R2, R3];
/// FPU argument registers of the bytecode calling convention.
const DEX_FP_ARG_COUNT: u8 = 16;
/// Argument registers of the runtime-entrypoint calling convention.
pub(crate) const RUNTIME_ARG_REGS: [CoreReg; 4] = [R0, R1, R2, R3];

/// Map an abstract predicate to a machine condition (signed flavor).
fn arm_cond(pred: Predicate) -> Cond {
    match pred {
        Predicate::Eq => Cond::Eq,
        Predicate::Ne => Cond::Ne,
        Predicate::Lt => Cond::Lt,
        Predicate::Le => Cond::Le,
        Predicate::Gt => Cond::Gt,
        Predicate::Ge => Cond::Ge,
        Predicate::Below => Cond::Lo,
        Predicate::BelowEq => Cond::Ls,
        Predicate::Above => Cond::Hi,
        Predicate::AboveEq => Cond::Hs,
    }
}

/// Map a predicate to the unsigned machine condition: used on the low words
/// of wide compares, where the half-compare is unsigned even when the full
/// comparison is signed.
fn arm_unsigned_cond(pred: Predicate) -> Cond {
    match pred {
        Predicate::Eq => Cond::Eq,
        Predicate::Ne => Cond::Ne,
        Predicate::Lt | Predicate::Below => Cond::Lo,
        Predicate::Le | Predicate::BelowEq => Cond::Ls,
        Predicate::Gt | Predicate::Above => Cond::Hi,
        Predicate::Ge | Predicate::AboveEq => Cond::Hs,
    }
}

/// Map a predicate to the machine condition to use after a `vcmp`/`vmrs`
/// pair. The unordered (NaN) outcome must never satisfy LT/LE/GT/GE, so the
/// bias selects between the conditions that include or exclude unordered.
fn arm_fp_cond(pred: Predicate, bias: FpBias) -> Cond {
    let gt_bias = bias == FpBias::GtBias;
    match pred {
        Predicate::Eq => Cond::Eq,
        Predicate::Ne => Cond::Ne, // unordered compares not-equal
        Predicate::Lt => {
            if gt_bias {
                Cond::Lo
            } else {
                Cond::Lt // lt is true on unordered
            }
        }
        Predicate::Le => {
            if gt_bias {
                Cond::Ls
            } else {
                Cond::Le
            }
        }
        Predicate::Gt => {
            if gt_bias {
                Cond::Hi // hi is true on unordered
            } else {
                Cond::Gt
            }
        }
        Predicate::Ge => {
            if gt_bias {
                Cond::Hs
            } else {
                Cond::Ge
            }
        }
        _ => panic!("unsigned predicate {pred:?} on a floating point compare"),
    }
}

/// The access width of one value type.
fn mem_width(ty: Ty) -> MemWidth {
    match ty {
        Ty::Bool => MemWidth::Byte,
        Ty::Byte => MemWidth::SignedByte,
        Ty::Char => MemWidth::Half,
        Ty::Short => MemWidth::SignedHalf,
        Ty::Int | Ty::Ref => MemWidth::Word,
        Ty::Long | Ty::Double | Ty::Float => panic!("no scalar access width for {ty}"),
    }
}

/// Memory ordering points the emitted code needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MemBarrier {
    /// Order earlier accesses before a store (release flavor).
    AnyStore,
    /// Order a load before later accesses (acquire flavor).
    LoadAny,
    /// Full fence.
    AnyAny,
}

/// The bytecode calling convention: arguments are placed by type across the
/// core then FPU registers, spilling to caller stack slots after that.
/// Wide values take aligned pairs.
struct DexCallingConvention {
    gpr_index: u8,
    fpr_index: u8,
    stack_index: u32,
}

impl DexCallingConvention {
    fn new() -> Self {
        DexCallingConvention {
            gpr_index: 0,
            fpr_index: 0,
            stack_index: 0,
        }
    }

    /// Caller-frame offset of stack-passed argument slot `i`. These offsets
    /// are relative to the frame top; the consumer rebases against the
    /// final frame size.
    fn stack_offset(i: u32) -> i32 {
        (i * 4) as i32
    }

    fn next(&mut self, ty: Ty) -> Location {
        match ty {
            Ty::Bool | Ty::Byte | Ty::Char | Ty::Short | Ty::Int | Ty::Ref => {
                let loc = if (self.gpr_index as usize) < DEX_ARG_REGS.len() {
                    Location::Register(DEX_ARG_REGS[self.gpr_index as usize])
                } else {
                    Location::StackSlot(Self::stack_offset(self.stack_index))
                };
                self.gpr_index += 1;
                self.stack_index += 1;
                loc
            }
            Ty::Long => {
                // The only aligned pair among the argument registers is
                // (r2, r3); odd-numbered r1 can never be a pair low half.
                let loc = if self.gpr_index <= 1 {
                    Location::pair(R2, R3)
                } else {
                    self.stack_index = (self.stack_index + 1) & !1;
                    Location::DoubleStackSlot(Self::stack_offset(self.stack_index))
                };
                self.gpr_index = 3;
                self.stack_index += 2;
                loc
            }
            Ty::Float => {
                let loc = if self.fpr_index < DEX_FP_ARG_COUNT {
                    Location::FpuRegister(SReg(self.fpr_index))
                } else {
                    Location::StackSlot(Self::stack_offset(self.stack_index))
                };
                self.fpr_index += 1;
                self.stack_index += 1;
                loc
            }
            Ty::Double => {
                self.fpr_index = (self.fpr_index + 1) & !1;
                let loc = if self.fpr_index + 1 < DEX_FP_ARG_COUNT {
                    let l = Location::fpu_pair(SReg(self.fpr_index), SReg(self.fpr_index + 1));
                    self.fpr_index += 2;
                    l
                } else {
                    self.stack_index = (self.stack_index + 1) & !1;
                    Location::DoubleStackSlot(Self::stack_offset(self.stack_index))
                };
                self.stack_index += 2;
                loc
            }
        }
    }
}

/// Where a value of type `ty` comes back from a bytecode call.
fn return_location(ty: Ty) -> Location {
    match ty {
        Ty::Bool | Ty::Byte | Ty::Char | Ty::Short | Ty::Int | Ty::Ref => Location::Register(R0),
        Ty::Long => Location::pair(R0, R1),
        Ty::Float => Location::FpuRegister(SReg(0)),
        Ty::Double => Location::fpu_pair(SReg(0), SReg(1)),
    }
}

/// The declarative pass: one [LocationSummary] per instruction, constraints
/// only, no code. An unhandled type/operation combination here is an
/// internal compiler error, never a recoverable condition.
pub struct LocationBuilder;

impl LocationBuilder {
    pub fn run(m: &Method, isa: &IsaFeatures, opts: &CodegenOptions) -> LocationTable {
        let mut conv = DexCallingConvention::new();
        let mut table = LocationTable::new();
        for iidx in (0..m.num_insts()).map(InstId::from) {
            table.push(Self::locs_for(m, isa, opts, &mut conv, iidx));
        }
        table
    }

    /// `RegisterOrConstant`: leave a constant input unmaterialized.
    fn reg_or_const(m: &Method, input: InstId) -> Requirement {
        match m.as_const(input) {
            Some(c) => Requirement::Fixed(Location::Constant(c)),
            None => Requirement::RegisterOrConstant,
        }
    }

    /// FP compare right-hand sides can encode exactly one immediate: 0.0.
    fn fp_zero_or_reg(m: &Method, input: InstId) -> Requirement {
        match m.as_const(input) {
            Some(c) if c.is_arithmetic_zero() => Requirement::Fixed(Location::Constant(c)),
            _ => Requirement::FpuRegister,
        }
    }

    fn locs_for(
        m: &Method,
        isa: &IsaFeatures,
        opts: &CodegenOptions,
        conv: &mut DexCallingConvention,
        iidx: InstId,
    ) -> Option<LocationSummary> {
        use crate::location::CallKind::*;
        use OutputOverlap::*;
        use Requirement::*;

        let mut locs;
        match m.inst(iidx) {
            Inst::Constant(c) => {
                locs = LocationSummary::new(NoCall);
                locs.set_out(Fixed(Location::Constant(*c)), NoOverlap);
            }
            Inst::Param { ty, .. } => {
                locs = LocationSummary::new(NoCall);
                locs.set_out(Fixed(conv.next(*ty)), NoOverlap);
            }
            Inst::CurrentMethod => {
                locs = LocationSummary::new(NoCall);
                locs.set_out(Fixed(Location::Register(crate::location::METHOD_REG)), NoOverlap);
            }
            Inst::BinOp { op, ty, rhs, .. } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Int => {
                        locs.set_in(0, Register);
                        // Multiplies have no immediate form.
                        if *op == BinOp::Mul {
                            locs.set_in(1, Register);
                        } else {
                            locs.set_in(1, Self::reg_or_const(m, *rhs));
                        }
                        locs.set_out(Register, NoOverlap);
                    }
                    Ty::Long => {
                        locs.set_in(0, Register);
                        locs.set_in(1, Register);
                        locs.set_out(Register, NoOverlap);
                    }
                    Ty::Float | Ty::Double => {
                        assert!(matches!(op, BinOp::Add | BinOp::Sub | BinOp::Mul));
                        locs.set_in(0, FpuRegister);
                        locs.set_in(1, FpuRegister);
                        locs.set_out(FpuRegister, NoOverlap);
                    }
                    _ => panic!("unexpected binop type {ty}"),
                }
            }
            Inst::Div { ty, rhs, .. } => match ty {
                Ty::Int => {
                    if let Some(c) = m.as_const(*rhs) {
                        locs = LocationSummary::new(NoCall);
                        locs.set_in(0, Register);
                        locs.set_in(1, Fixed(Location::Constant(c)));
                        locs.set_out(Register, NoOverlap);
                        let v = c.as_word();
                        if !(v == 0 || v == 1 || v == -1) {
                            locs.add_temp(Register);
                            if !v.unsigned_abs().is_power_of_two() {
                                locs.add_temp(Register);
                            }
                        }
                    } else if isa.has_div {
                        locs = LocationSummary::new(NoCall);
                        locs.set_in(0, Register);
                        locs.set_in(1, Register);
                        locs.set_out(Register, NoOverlap);
                    } else {
                        // The divmod helper returns the pair (quotient,
                        // remainder) in (r0, r1); only the former is used.
                        locs = LocationSummary::new(CallOnMainOnly);
                        locs.set_in(0, Fixed(Location::Register(RUNTIME_ARG_REGS[0])));
                        locs.set_in(1, Fixed(Location::Register(RUNTIME_ARG_REGS[1])));
                        locs.set_out(Fixed(Location::Register(R0)), NoOverlap);
                    }
                }
                Ty::Long => {
                    locs = LocationSummary::new(CallOnMainOnly);
                    locs.set_in(0, Fixed(Location::pair(R0, R1)));
                    locs.set_in(1, Fixed(Location::pair(R2, R3)));
                    locs.set_out(Fixed(Location::pair(R0, R1)), NoOverlap);
                }
                Ty::Float | Ty::Double => {
                    locs = LocationSummary::new(NoCall);
                    locs.set_in(0, FpuRegister);
                    locs.set_in(1, FpuRegister);
                    locs.set_out(FpuRegister, NoOverlap);
                }
                _ => panic!("unexpected div type {ty}"),
            },
            Inst::Rem { ty, rhs, .. } => match ty {
                Ty::Int => {
                    if let Some(c) = m.as_const(*rhs) {
                        locs = LocationSummary::new(NoCall);
                        locs.set_in(0, Register);
                        locs.set_in(1, Fixed(Location::Constant(c)));
                        locs.set_out(Register, NoOverlap);
                        let v = c.as_word();
                        if !(v == 0 || v == 1 || v == -1) {
                            locs.add_temp(Register);
                            if !v.unsigned_abs().is_power_of_two() {
                                locs.add_temp(Register);
                            }
                        }
                    } else if isa.has_div {
                        locs = LocationSummary::new(NoCall);
                        locs.set_in(0, Register);
                        locs.set_in(1, Register);
                        locs.set_out(Register, NoOverlap);
                        locs.add_temp(Register);
                    } else {
                        locs = LocationSummary::new(CallOnMainOnly);
                        locs.set_in(0, Fixed(Location::Register(RUNTIME_ARG_REGS[0])));
                        locs.set_in(1, Fixed(Location::Register(RUNTIME_ARG_REGS[1])));
                        locs.set_out(Fixed(Location::Register(R1)), NoOverlap);
                    }
                }
                Ty::Long => {
                    locs = LocationSummary::new(CallOnMainOnly);
                    locs.set_in(0, Fixed(Location::pair(R0, R1)));
                    locs.set_in(1, Fixed(Location::pair(R2, R3)));
                    // The helper leaves the remainder in (r2, r3).
                    locs.set_out(Fixed(Location::pair(R2, R3)), NoOverlap);
                }
                Ty::Float => {
                    locs = LocationSummary::new(CallOnMainOnly);
                    locs.set_in(0, Fixed(Location::FpuRegister(SReg(0))));
                    locs.set_in(1, Fixed(Location::FpuRegister(SReg(1))));
                    locs.set_out(Fixed(Location::FpuRegister(SReg(0))), NoOverlap);
                }
                Ty::Double => {
                    locs = LocationSummary::new(CallOnMainOnly);
                    locs.set_in(0, Fixed(Location::fpu_pair(SReg(0), SReg(1))));
                    locs.set_in(1, Fixed(Location::fpu_pair(SReg(2), SReg(3))));
                    locs.set_out(Fixed(Location::fpu_pair(SReg(0), SReg(1))), NoOverlap);
                }
                _ => panic!("unexpected rem type {ty}"),
            },
            Inst::Neg { ty, .. } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Int => {
                        locs.set_in(0, Register);
                        locs.set_out(Register, NoOverlap);
                    }
                    Ty::Long => {
                        locs.set_in(0, Register);
                        // The high half is used as scratch before the input's
                        // high half is read.
                        locs.set_out(Register, Overlap);
                    }
                    Ty::Float | Ty::Double => {
                        locs.set_in(0, FpuRegister);
                        locs.set_out(FpuRegister, NoOverlap);
                    }
                    _ => panic!("unexpected neg type {ty}"),
                }
            }
            Inst::Not { ty, .. } => {
                assert!(matches!(ty, Ty::Int | Ty::Long), "unexpected not type {ty}");
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_out(Register, NoOverlap);
            }
            Inst::BoolNot { .. } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_out(Register, NoOverlap);
            }
            Inst::Shift { ty, amount, .. } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Int => {
                        locs.set_in(0, Register);
                        if let Some(c) = m.as_const(*amount) {
                            locs.set_in(1, Fixed(Location::Constant(c)));
                            locs.set_out(Register, NoOverlap);
                        } else {
                            locs.set_in(1, Register);
                            // The output holds the masked shift amount.
                            locs.set_out(Register, Overlap);
                        }
                    }
                    Ty::Long => {
                        locs.set_in(0, Register);
                        if let Some(c) = m.as_const(*amount) {
                            locs.set_in(1, Fixed(Location::Constant(c)));
                            locs.set_out(Register, Overlap);
                        } else {
                            locs.set_in(1, Register);
                            locs.add_temp(Register);
                            locs.set_out(Register, Overlap);
                        }
                    }
                    _ => panic!("unexpected shift type {ty}"),
                }
            }
            Inst::Ror { ty, amount, .. } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Int => {
                        locs.set_in(0, Register);
                        locs.set_in(1, Self::reg_or_const(m, *amount));
                        locs.set_out(Register, NoOverlap);
                    }
                    Ty::Long => {
                        locs.set_in(0, Register);
                        if let Some(c) = m.as_const(*amount) {
                            locs.set_in(1, Fixed(Location::Constant(c)));
                        } else {
                            locs.set_in(1, Register);
                            locs.add_temp(Register);
                            locs.add_temp(Register);
                        }
                        locs.set_out(Register, Overlap);
                    }
                    _ => panic!("unexpected rotate type {ty}"),
                }
            }
            Inst::Compare { ty, rhs, .. } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Int | Ty::Long => {
                        locs.set_in(0, Register);
                        locs.set_in(1, Register);
                        // Written before the low-word compare.
                        locs.set_out(Register, Overlap);
                    }
                    Ty::Float | Ty::Double => {
                        locs.set_in(0, FpuRegister);
                        locs.set_in(1, Self::fp_zero_or_reg(m, *rhs));
                        locs.set_out(Register, Overlap);
                    }
                    _ => panic!("unexpected compare type {ty}"),
                }
            }
            Inst::Condition {
                ty,
                rhs,
                materialized,
                ..
            } => {
                locs = LocationSummary::new(NoCall);
                match ty {
                    Ty::Float | Ty::Double => {
                        locs.set_in(0, FpuRegister);
                        locs.set_in(1, Self::fp_zero_or_reg(m, *rhs));
                    }
                    Ty::Long => {
                        locs.set_in(0, Register);
                        locs.set_in(1, Register);
                    }
                    _ => {
                        locs.set_in(0, Register);
                        locs.set_in(1, Self::reg_or_const(m, *rhs));
                    }
                }
                if *materialized {
                    locs.set_out(Register, Overlap);
                }
            }
            Inst::Conversion { to, value } => {
                let from = m.result_ty(*value).expect("conversion of a void value");
                locs = Self::locs_conversion(from, *to);
            }
            Inst::NullCheck { .. } => {
                locs = LocationSummary::new(if opts.implicit_null_checks {
                    NoCall
                } else {
                    CallOnSlowPath
                });
                locs.set_in(0, Register);
                locs.set_out(SameAsFirstInput, NoOverlap);
            }
            Inst::BoundsCheck { .. } => {
                locs = LocationSummary::new(CallOnSlowPath);
                locs.set_in(0, Register);
                locs.set_in(1, Register);
                locs.set_out(SameAsFirstInput, NoOverlap);
            }
            Inst::DivZeroCheck { ty, value } => {
                assert!(matches!(ty, Ty::Int | Ty::Long));
                locs = LocationSummary::new(CallOnSlowPath);
                locs.set_in(0, Self::reg_or_const(m, *value));
                locs.set_out(SameAsFirstInput, NoOverlap);
            }
            Inst::ArrayLength { .. } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_out(Register, NoOverlap);
            }
            Inst::ArrayGet { index, ty, .. } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_in(1, Self::reg_or_const(m, *index));
                if ty.is_fp() {
                    locs.set_out(FpuRegister, NoOverlap);
                } else {
                    locs.set_out(Register, NoOverlap);
                }
            }
            Inst::ArraySet {
                index,
                value,
                ty,
                needs_type_check,
                ..
            } => {
                locs = LocationSummary::new(if *needs_type_check {
                    CallOnSlowPath
                } else {
                    NoCall
                });
                locs.set_in(0, Register);
                locs.set_in(1, Self::reg_or_const(m, *index));
                if ty.is_fp() {
                    locs.set_in(2, FpuRegister);
                } else {
                    locs.set_in(2, Register);
                }
                if *ty == Ty::Ref && !m.is_null_const(*value) {
                    // Temporaries for the type check and the write barrier.
                    locs.add_temp(Register);
                    locs.add_temp(Register);
                }
            }
            Inst::FieldGet { ty, volatile, .. } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                let atomic_wide = *volatile && ty.is_wide() && !isa.has_atomic_ldrd_strd;
                if ty.is_fp() {
                    locs.set_out(FpuRegister, NoOverlap);
                    if atomic_wide {
                        // The exclusive load produces a core pair.
                        locs.add_temp(Register);
                        locs.add_temp(Register);
                    }
                } else {
                    locs.set_out(Register, NoOverlap);
                }
            }
            Inst::FieldSet {
                ty,
                value,
                volatile,
                ..
            } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                if ty.is_fp() {
                    locs.set_in(1, FpuRegister);
                } else {
                    locs.set_in(1, Register);
                }
                let atomic_wide = *volatile && ty.is_wide() && !isa.has_atomic_ldrd_strd;
                if atomic_wide {
                    // Exclusive-store status/discard pair.
                    locs.add_temp(Register);
                    locs.add_temp(Register);
                    if *ty == Ty::Double {
                        // Core copies of the value for the exclusive store.
                        locs.add_temp(Register);
                        locs.add_temp(Register);
                    }
                }
                if *ty == Ty::Ref && !m.is_null_const(*value) {
                    locs.add_temp(Register);
                    locs.add_temp(Register);
                }
            }
            Inst::InstanceOf { kind, .. } => {
                let call_kind = match kind {
                    TypeCheckKind::ArrayCheck
                    | TypeCheckKind::Unresolved
                    | TypeCheckKind::Interface => CallOnSlowPath,
                    _ => NoCall,
                };
                locs = LocationSummary::new(call_kind);
                locs.set_in(0, Register);
                locs.set_in(1, Register);
                // The output doubles as the class-walk scratch register.
                locs.set_out(Register, Overlap);
            }
            Inst::CheckCast { .. } => {
                locs = LocationSummary::new(CallOnSlowPath);
                locs.set_in(0, Register);
                locs.set_in(1, Register);
                locs.add_temp(Register);
            }
            Inst::LoadClass { .. } => {
                locs = LocationSummary::new(CallOnSlowPath);
                locs.set_in(0, Register);
                locs.set_out(Register, Overlap);
            }
            Inst::LoadString { .. } => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_out(Fixed(Location::Register(R0)), NoOverlap);
            }
            Inst::NewInstance { .. } => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::Register(RUNTIME_ARG_REGS[1])));
                locs.set_out(Fixed(Location::Register(R0)), NoOverlap);
            }
            Inst::NewArray { .. } => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::Register(RUNTIME_ARG_REGS[1])));
                locs.set_in(1, Fixed(Location::Register(RUNTIME_ARG_REGS[2])));
                locs.set_out(Fixed(Location::Register(R0)), NoOverlap);
            }
            Inst::Invoke {
                kind,
                args,
                ret_ty,
                ..
            } => {
                locs = LocationSummary::new(CallOnMainOnly);
                let mut arg_conv = DexCallingConvention::new();
                for (i, arg) in args.iter().enumerate() {
                    let ty = m.result_ty(*arg).expect("void invoke argument");
                    locs.set_in(i, Fixed(arg_conv.next(ty)));
                }
                if matches!(kind, InvokeKind::Static | InvokeKind::Direct) {
                    // The caller's method pointer, to reach the method cache.
                    locs.set_in(args.len(), Register);
                }
                // The callee's method pointer is materialized in r0.
                locs.add_temp(Fixed(Location::Register(crate::location::METHOD_REG)));
                if let Some(ret) = ret_ty {
                    locs.set_out(Fixed(return_location(*ret)), NoOverlap);
                }
            }
            Inst::MonitorOp { .. } => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::Register(RUNTIME_ARG_REGS[0])));
            }
            Inst::SuspendCheck => {
                locs = LocationSummary::new(CallOnSlowPath);
            }
            Inst::Deoptimize { .. } => {
                locs = LocationSummary::new(CallOnSlowPath);
                locs.set_in(0, Register);
            }
            Inst::PackedSwitch {
                start, num_entries, ..
            } => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                if *num_entries > SWITCH_TABLE_THRESHOLD {
                    // The table base, and the de-biased key when needed.
                    locs.add_temp(Register);
                    if *start != 0 {
                        locs.add_temp(Register);
                    }
                }
            }
            Inst::ParallelMove { .. } => return None,
        }
        Some(locs)
    }

    fn locs_conversion(from: Ty, to: Ty) -> LocationSummary {
        use crate::location::CallKind::*;
        use OutputOverlap::*;
        use Requirement::*;
        let mut locs;
        match (from, to) {
            // Narrowing and widening between core types.
            (Ty::Int | Ty::Char | Ty::Short | Ty::Bool | Ty::Byte, Ty::Byte | Ty::Short | Ty::Char)
            | (Ty::Long, Ty::Int)
            | (Ty::Int, Ty::Long) => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_out(Register, NoOverlap);
            }
            (Ty::Int, Ty::Float | Ty::Double) => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, Register);
                locs.set_out(FpuRegister, NoOverlap);
            }
            (Ty::Float | Ty::Double, Ty::Int) => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, FpuRegister);
                locs.set_out(Register, NoOverlap);
                locs.add_temp(FpuRegister);
            }
            (Ty::Float, Ty::Double) | (Ty::Double, Ty::Float) => {
                locs = LocationSummary::new(NoCall);
                locs.set_in(0, FpuRegister);
                locs.set_out(FpuRegister, NoOverlap);
            }
            // The wide conversions without hardware forms go through the
            // runtime, in the runtime convention's registers.
            (Ty::Long, Ty::Float) => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::pair(R0, R1)));
                locs.set_out(Fixed(Location::FpuRegister(SReg(0))), NoOverlap);
            }
            (Ty::Long, Ty::Double) => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::pair(R0, R1)));
                locs.set_out(Fixed(Location::fpu_pair(SReg(0), SReg(1))), NoOverlap);
            }
            (Ty::Float, Ty::Long) => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::FpuRegister(SReg(0))));
                locs.set_out(Fixed(Location::pair(R0, R1)), NoOverlap);
            }
            (Ty::Double, Ty::Long) => {
                locs = LocationSummary::new(CallOnMainOnly);
                locs.set_in(0, Fixed(Location::fpu_pair(SReg(0), SReg(1))));
                locs.set_out(Fixed(Location::pair(R0, R1)), NoOverlap);
            }
            _ => panic!("unexpected type conversion {from} -> {to}"),
        }
        locs
    }
}

/// The emission pass: consumes assigned locations and emits instructions
/// per IR node kind, creating slow paths and jump tables as it goes.
pub struct CodeGenerator<'a> {
    pub(crate) m: &'a Method,
    locs: &'a LocationTable,
    isa: &'a IsaFeatures,
    opts: &'a CodegenOptions,
    pub(crate) asm: Assembler,
    pub(crate) frame: FrameInfo,
    block_labels: TiVec<BlockId, Label>,
    slow_paths: Vec<SlowPath>,
    jump_tables: Vec<(JumpTableId, Vec<BlockId>)>,
    smap: StackMapStream,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        m: &'a Method,
        locs: &'a LocationTable,
        alloc: &AllocationResult,
        isa: &'a IsaFeatures,
        opts: &'a CodegenOptions,
    ) -> Self {
        let mut asm = Assembler::new();
        let block_labels = m.blocks.iter().map(|_| asm.new_label()).collect();
        CodeGenerator {
            m,
            locs,
            isa,
            opts,
            asm,
            frame: Self::compute_frame(alloc),
            block_labels,
            slow_paths: Vec::new(),
            jump_tables: Vec::new(),
            smap: StackMapStream::new(),
        }
    }

    /// Compute spill masks and the frame size from the allocator's report.
    fn compute_frame(alloc: &AllocationResult) -> FrameInfo {
        // The return-address register is always saved, even for methods
        // needing no other callee-saves, so every frame stays walkable.
        let core_spill_mask = (alloc.allocated_core & CORE_CALLEE_SAVES) | (1 << LR.0);
        let mut fpu_spill_mask = alloc.allocated_fpu & FPU_CALLEE_SAVES;
        // vpush/vpop take one contiguous range: widen the mask to cover the
        // gap between the lowest and highest live callee-save.
        if fpu_spill_mask != 0 {
            let lo = fpu_spill_mask.trailing_zeros();
            let hi = 31 - fpu_spill_mask.leading_zeros();
            for i in lo + 1..hi {
                fpu_spill_mask |= 1 << i;
            }
        }
        let entry_spill = 4 * (core_spill_mask.count_ones() + fpu_spill_mask.count_ones());
        let raw = 4 // current-method slot
            + SLOW_PATH_SPILL_BYTES
            + 4 * alloc.num_spill_slots
            + entry_spill;
        let frame_size = raw.next_multiple_of(STACK_ALIGNMENT);
        FrameInfo {
            frame_size,
            core_spill_mask,
            fpu_spill_mask,
            first_slow_path_slot: 4,
        }
    }

    pub(crate) fn locs_of(&self, iidx: InstId) -> &LocationSummary {
        self.locs[iidx]
            .as_ref()
            .unwrap_or_else(|| panic!("{iidx} has no location summary"))
    }

    pub(crate) fn dex_pc(&self, iidx: InstId) -> u32 {
        self.m.dex_pc(iidx)
    }

    pub(crate) fn block_label(&self, bidx: BlockId) -> Label {
        self.block_labels[bidx]
    }

    /// The location a value lives in when it is branched on or dispatched
    /// over: its defining instruction's output.
    fn value_loc(&self, iidx: InstId) -> Location {
        self.locs_of(iidx).out()
    }

    fn record_pc_info(&mut self, dex_pc: u32, live: RegisterSet) {
        self.smap
            .record(u32::try_from(self.asm.offset()).unwrap(), dex_pc, live, None);
    }

    /// Call a runtime entrypoint through the thread-relative table,
    /// recording PC info when the entrypoint can throw or safepoint. No
    /// scratch register may be live across this.
    pub(crate) fn invoke_runtime(
        &mut self,
        ep: Entrypoint,
        dex_pc: u32,
        locs: &LocationSummary,
    ) {
        self.asm.assert_scratch_free();
        self.asm.ldr(LR, TR, ep.offset());
        self.asm.blx(LR);
        if ep.requires_stack_map() {
            self.record_pc_info(dex_pc, locs.live_registers());
        }
    }

    /// A 32-bit move between any two single-word locations.
    pub(crate) fn move32(&mut self, dst: Location, src: Location) {
        if dst == src {
            return;
        }
        ParallelMoveResolver::new(&mut self.asm).resolve(&[crate::ir::MoveOp {
            src,
            dst,
            ty: Ty::Int,
        }]);
    }

    fn add_slow_path(&mut self, kind: SlowPathKind, iidx: InstId) -> (Label, Label) {
        let entry = self.asm.new_label();
        let exit = self.asm.new_label();
        self.slow_paths.push(SlowPath {
            kind,
            iidx,
            entry,
            exit,
        });
        (entry, exit)
    }

    // Frame management.

    fn generate_frame_entry(&mut self) {
        self.asm.comment("prologue".to_string());
        let skip_overflow_check =
            self.m.is_leaf && self.frame.frame_size < FRAME_CHECK_THRESHOLD;
        if !skip_overflow_check {
            // Touch the guard area below the frame; a fault here is turned
            // into a stack-overflow error by the runtime, so the probe needs
            // PC info.
            self.asm.with_scratch_reg(|asm, t| {
                asm.sub(t, SP, STACK_OVERFLOW_RESERVED);
                asm.ldr(t, t, 0);
            });
            self.record_pc_info(0, RegisterSet::empty());
        }
        self.asm.push(self.frame.core_spill_mask);
        if self.frame.fpu_spill_mask != 0 {
            let first = self.frame.fpu_spill_mask.trailing_zeros() as u8;
            let count = self.frame.fpu_spill_mask.count_ones() as u8;
            // The mask was widened to a contiguous run at computation time.
            debug_assert_eq!(
                self.frame.fpu_spill_mask >> first,
                (1u64 << count) as u32 - 1
            );
            self.asm.vpush(SReg(first), count);
        }
        let adjust = self.frame.frame_size - self.frame.entry_spill_size();
        if adjust != 0 {
            self.asm.sub(SP, SP, adjust as i32);
        }
        self.asm.str_(crate::location::METHOD_REG, SP, 0);
    }

    fn generate_frame_exit(&mut self) {
        self.asm.comment("epilogue".to_string());
        let adjust = self.frame.frame_size - self.frame.entry_spill_size();
        if adjust != 0 {
            self.asm.add(SP, SP, adjust as i32);
        }
        if self.frame.fpu_spill_mask != 0 {
            let first = self.frame.fpu_spill_mask.trailing_zeros() as u8;
            let count = self.frame.fpu_spill_mask.count_ones() as u8;
            self.asm.vpop(SReg(first), count);
        }
        // Return by popping the saved return address straight into pc.
        assert_ne!(self.frame.core_spill_mask & (1 << LR.0), 0);
        let pop_mask = (self.frame.core_spill_mask & !(1 << LR.0)) | (1 << PC.0);
        self.asm.pop(pop_mask);
    }

    // Main loop.

    pub fn compile(mut self) -> Result<CompiledMethod, CompilationError> {
        let m = self.m;
        self.generate_frame_entry();
        for bidx in (0..m.blocks.len()).map(BlockId::from) {
            self.asm.bind(self.block_labels[bidx]);
            for &iidx in &m.blocks[bidx].insts {
                self.cg_inst(iidx);
            }
            self.emit_terminator(bidx);
        }
        // Out-of-line fragments go after the main body. Emitting one never
        // creates another.
        let sps = std::mem::take(&mut self.slow_paths);
        for sp in &sps {
            slow_paths::emit(&mut self, sp);
        }
        self.slow_paths = sps;
        // All block labels are bound now: fill in the jump tables.
        for (id, targets) in std::mem::take(&mut self.jump_tables) {
            let start = self.asm.resolve(self.asm.jump_table_start(id));
            let values: Vec<i32> = targets
                .iter()
                .map(|b| {
                    let target = self.asm.resolve(self.block_labels[*b]);
                    i32::try_from(target).unwrap() - i32::try_from(start).unwrap()
                        + INTERWORKING_PARITY
                })
                .collect();
            self.asm.patch_jump_table(id, &values);
        }
        if self.asm.offset() > MAX_METHOD_CODE_BYTES {
            return Err(CompilationError::CodeTooBig(format!(
                "{} bytes",
                self.asm.offset()
            )));
        }
        let code = self.asm.finalize();
        let block_offsets = self
            .block_labels
            .iter()
            .map(|l| code.label_offset(*l))
            .collect();
        log::log(
            Verbosity::MethodSummary,
            &format!(
                "compiled method: {} bytes, frame {} bytes, {} pc entries",
                code.size_in_bytes(),
                self.frame.frame_size,
                self.smap.entries().len()
            ),
        );
        log::log(Verbosity::Listing, &code.listing());
        Ok(CompiledMethod {
            code,
            frame: self.frame,
            pc_infos: self.smap.into_entries(),
            block_offsets,
        })
    }

    fn cg_inst(&mut self, iidx: InstId) {
        self.asm
            .comment(format!("{iidx}: {}", self.m.inst(iidx).name()));
        match self.m.inst(iidx).clone() {
            // Values with fixed or constant homes produce no code.
            Inst::Constant(_) | Inst::Param { .. } | Inst::CurrentMethod => (),
            Inst::BinOp { op, ty, .. } => self.cg_binop(iidx, op, ty),
            Inst::Div { ty, .. } => self.cg_div(iidx, ty),
            Inst::Rem { ty, .. } => self.cg_rem(iidx, ty),
            Inst::Neg { ty, .. } => self.cg_neg(iidx, ty),
            Inst::Not { ty, .. } => self.cg_not(iidx, ty),
            Inst::BoolNot { .. } => self.cg_bool_not(iidx),
            Inst::Shift { op, ty, .. } => self.cg_shift(iidx, op, ty),
            Inst::Ror { ty, .. } => self.cg_ror(iidx, ty),
            Inst::Compare { ty, bias, .. } => self.cg_compare(iidx, ty, bias),
            Inst::Condition {
                pred,
                ty,
                bias,
                materialized,
                ..
            } => {
                if materialized {
                    self.cg_condition(iidx, pred, ty, bias);
                }
                // Otherwise the consuming branch folds the compare.
            }
            Inst::Conversion { to, value } => self.cg_conversion(iidx, to, value),
            Inst::NullCheck { .. } => self.cg_null_check(iidx),
            Inst::BoundsCheck { .. } => self.cg_bounds_check(iidx),
            Inst::DivZeroCheck { ty, .. } => self.cg_div_zero_check(iidx, ty),
            Inst::ArrayLength { .. } => self.cg_array_length(iidx),
            Inst::ArrayGet { ty, .. } => self.cg_array_get(iidx, ty),
            Inst::ArraySet {
                value,
                ty,
                needs_type_check,
                static_type_is_object_array,
                value_can_be_null,
                ..
            } => self.cg_array_set(
                iidx,
                ty,
                value,
                needs_type_check,
                static_type_is_object_array,
                value_can_be_null,
            ),
            Inst::FieldGet {
                offset, ty, volatile, ..
            } => self.cg_field_get(iidx, offset, ty, volatile),
            Inst::FieldSet {
                offset,
                value,
                ty,
                volatile,
                value_can_be_null,
                ..
            } => self.cg_field_set(iidx, offset, ty, value, volatile, value_can_be_null),
            Inst::InstanceOf {
                kind,
                must_do_null_check,
                ..
            } => self.cg_instance_of(iidx, kind, must_do_null_check),
            Inst::CheckCast {
                kind,
                must_do_null_check,
                can_throw_into_catch,
                ..
            } => self.cg_check_cast(iidx, kind, must_do_null_check, can_throw_into_catch),
            Inst::LoadClass {
                type_idx, must_init, ..
            } => self.cg_load_class(iidx, type_idx, must_init),
            Inst::LoadString { string_idx } => self.cg_load_string(iidx, string_idx),
            Inst::NewInstance { type_idx, .. } => self.cg_new_instance(iidx, type_idx),
            Inst::NewArray { type_idx, .. } => self.cg_new_array(iidx, type_idx),
            Inst::Invoke {
                kind, method_idx, args, ..
            } => self.cg_invoke(iidx, kind, method_idx, args.len()),
            Inst::MonitorOp { enter, .. } => self.cg_monitor_op(iidx, enter),
            Inst::SuspendCheck => self.generate_suspend_check(iidx, None),
            Inst::Deoptimize { .. } => self.cg_deoptimize(iidx),
            Inst::ParallelMove { moves } => {
                ParallelMoveResolver::new(&mut self.asm).resolve(&moves)
            }
            Inst::PackedSwitch { .. } => {
                unreachable!("packed switch payloads are emitted by their terminator")
            }
        }
    }

    // Operand access helpers.

    fn in_op2(locs: &LocationSummary, at: usize) -> Operand2 {
        match locs.in_at(at) {
            Location::Register(r) => Operand2::Reg(r),
            Location::Constant(c) => Operand2::Imm(c.as_word()),
            l => panic!("no operand2 form for {l}"),
        }
    }

    // Arithmetic.

    fn cg_binop(&mut self, iidx: InstId, op: BinOp, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match (op, ty) {
            (BinOp::Add, Ty::Int) => {
                let op2 = Self::in_op2(&locs, 1);
                self.asm.add(locs.out().reg(), locs.in_at(0).reg(), op2);
            }
            (BinOp::Sub, Ty::Int) => {
                let op2 = Self::in_op2(&locs, 1);
                self.asm.sub(locs.out().reg(), locs.in_at(0).reg(), op2);
            }
            (BinOp::Mul, Ty::Int) => {
                self.asm
                    .mul(locs.out().reg(), locs.in_at(0).reg(), locs.in_at(1).reg());
            }
            (BinOp::And | BinOp::Orr | BinOp::Eor, Ty::Int) => {
                let op2 = Self::in_op2(&locs, 1);
                let (out, a) = (locs.out().reg(), locs.in_at(0).reg());
                match op {
                    BinOp::And => self.asm.and_(out, a, op2),
                    BinOp::Orr => self.asm.orr(out, a, op2),
                    BinOp::Eor => self.asm.eor(out, a, op2),
                    _ => unreachable!(),
                }
            }
            (BinOp::Add, Ty::Long) => {
                let (out, a, b) = (locs.out(), locs.in_at(0), locs.in_at(1));
                // Low add sets the carry the high add consumes.
                self.asm.adds(out.low_reg(), a.low_reg(), b.low_reg());
                self.asm.adc(out.high_reg(), a.high_reg(), b.high_reg());
            }
            (BinOp::Sub, Ty::Long) => {
                let (out, a, b) = (locs.out(), locs.in_at(0), locs.in_at(1));
                self.asm.subs(out.low_reg(), a.low_reg(), b.low_reg());
                self.asm.sbc(out.high_reg(), a.high_reg(), b.high_reg());
            }
            (BinOp::Mul, Ty::Long) => self.cg_mul_long(&locs),
            (BinOp::And | BinOp::Orr | BinOp::Eor, Ty::Long) => {
                let (out, a, b) = (locs.out(), locs.in_at(0), locs.in_at(1));
                let pairs = [
                    (out.low_reg(), a.low_reg(), b.low_reg()),
                    (out.high_reg(), a.high_reg(), b.high_reg()),
                ];
                for (o, x, y) in pairs {
                    match op {
                        BinOp::And => self.asm.and_(o, x, Operand2::Reg(y)),
                        BinOp::Orr => self.asm.orr(o, x, Operand2::Reg(y)),
                        BinOp::Eor => self.asm.eor(o, x, Operand2::Reg(y)),
                        _ => unreachable!(),
                    }
                }
            }
            (BinOp::Add | BinOp::Sub | BinOp::Mul, Ty::Float | Ty::Double) => {
                let vop = match op {
                    BinOp::Add => VOp::Vadd,
                    BinOp::Sub => VOp::Vsub,
                    BinOp::Mul => VOp::Vmul,
                    _ => unreachable!(),
                };
                let f64 = ty == Ty::Double;
                let (d, n, m2) = if f64 {
                    (
                        locs.out().low_sreg().dreg(),
                        locs.in_at(0).low_sreg().dreg(),
                        locs.in_at(1).low_sreg().dreg(),
                    )
                } else {
                    (
                        locs.out().sreg().0,
                        locs.in_at(0).sreg().0,
                        locs.in_at(1).sreg().0,
                    )
                };
                self.asm.valu(vop, f64, d, n, m2);
            }
            (op, ty) => panic!("unexpected binop {op}.{ty}"),
        }
    }

    /// Schoolbook three-multiply 64x64 decomposition:
    ///   out.hi:out.lo = (a.lo*b.hi + a.hi*b.lo) * 2^32 + a.lo*b.lo
    fn cg_mul_long(&mut self, locs: &LocationSummary) {
        let (out, a, b) = (locs.out(), locs.in_at(0), locs.in_at(1));
        let (out_lo, out_hi) = (out.low_reg(), out.high_reg());
        let (a_lo, a_hi) = (a.low_reg(), a.high_reg());
        let (b_lo, b_hi) = (b.low_reg(), b.high_reg());
        // The multiply-accumulate's destination must not alias either
        // multiplicand's low half: the in-flight partial product would be
        // corrupted.
        assert_ne!(out_hi, a_lo);
        assert_ne!(out_hi, b_lo);
        self.asm.with_scratch_reg(|asm, t| {
            asm.mul(t, a_lo, b_hi);
            asm.mla(out_hi, a_hi, b_lo, t);
            asm.umull(out_lo, t, a_lo, b_lo);
            asm.add(out_hi, out_hi, Operand2::Reg(t));
        });
    }

    fn cg_div(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => {
                if locs.in_at(1).is_constant() {
                    self.generate_div_rem_constant(&locs, true);
                } else if self.isa.has_div {
                    self.asm
                        .sdiv(locs.out().reg(), locs.in_at(0).reg(), locs.in_at(1).reg());
                } else {
                    debug_assert_eq!(locs.in_at(0).reg(), RUNTIME_ARG_REGS[0]);
                    debug_assert_eq!(locs.in_at(1).reg(), RUNTIME_ARG_REGS[1]);
                    debug_assert_eq!(locs.out().reg(), R0);
                    self.invoke_runtime(Entrypoint::Idivmod, self.dex_pc(iidx), &locs);
                }
            }
            Ty::Long => {
                self.invoke_runtime(Entrypoint::Ldiv, self.dex_pc(iidx), &locs);
            }
            Ty::Float | Ty::Double => {
                let f64 = ty == Ty::Double;
                let (d, n, m2) = if f64 {
                    (
                        locs.out().low_sreg().dreg(),
                        locs.in_at(0).low_sreg().dreg(),
                        locs.in_at(1).low_sreg().dreg(),
                    )
                } else {
                    (
                        locs.out().sreg().0,
                        locs.in_at(0).sreg().0,
                        locs.in_at(1).sreg().0,
                    )
                };
                self.asm.valu(VOp::Vdiv, f64, d, n, m2);
            }
            _ => panic!("unexpected div type {ty}"),
        }
    }

    fn cg_rem(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => {
                if locs.in_at(1).is_constant() {
                    self.generate_div_rem_constant(&locs, false);
                } else if self.isa.has_div {
                    let (out, a, b) = (locs.out().reg(), locs.in_at(0).reg(), locs.in_at(1).reg());
                    let t = locs.temp(0).reg();
                    self.asm.sdiv(t, a, b);
                    self.asm.mls(out, t, b, a);
                } else {
                    debug_assert_eq!(locs.out().reg(), R1);
                    self.invoke_runtime(Entrypoint::Idivmod, self.dex_pc(iidx), &locs);
                }
            }
            Ty::Long => {
                self.invoke_runtime(Entrypoint::Lmod, self.dex_pc(iidx), &locs);
            }
            Ty::Float => {
                self.invoke_runtime(Entrypoint::Fmodf, self.dex_pc(iidx), &locs);
            }
            Ty::Double => {
                self.invoke_runtime(Entrypoint::Fmod, self.dex_pc(iidx), &locs);
            }
            _ => panic!("unexpected rem type {ty}"),
        }
    }

    /// Division/remainder by a constant divisor: identity/negate for ±1, a
    /// compensated shift for powers of two, the magic reciprocal multiply
    /// otherwise.
    fn generate_div_rem_constant(&mut self, locs: &LocationSummary, is_div: bool) {
        let imm = locs.in_at(1).constant().as_word();
        match imm {
            // A zero divisor always traps on the preceding DivZeroCheck;
            // emit nothing.
            0 => (),
            1 | -1 => self.div_rem_one_or_minus_one(locs, is_div, imm),
            _ if imm.unsigned_abs().is_power_of_two() => {
                self.div_rem_power_of_two(locs, is_div, imm)
            }
            _ => self.div_rem_any_constant(locs, is_div, imm),
        }
    }

    fn div_rem_one_or_minus_one(&mut self, locs: &LocationSummary, is_div: bool, imm: i32) {
        let out = locs.out().reg();
        let dividend = locs.in_at(0).reg();
        if !is_div {
            self.asm.mov_imm(out, 0);
        } else if imm == 1 {
            self.asm.mov(out, dividend);
        } else {
            self.asm.rsb(out, dividend, 0);
        }
    }

    /// Bias negative dividends by |d|-1 before the arithmetic shift so
    /// truncation goes toward zero, not toward negative infinity.
    fn div_rem_power_of_two(&mut self, locs: &LocationSummary, is_div: bool, imm: i32) {
        let out = locs.out().reg();
        let dividend = locs.in_at(0).reg();
        let temp = locs.temp(0).reg();
        let abs_imm = imm.unsigned_abs();
        let ctz = abs_imm.trailing_zeros();
        if ctz == 1 {
            self.asm.lsr(temp, dividend, 31);
        } else {
            self.asm.asr(temp, dividend, 31);
            self.asm.lsr(temp, temp, 32 - ctz);
        }
        self.asm.add(out, temp, Operand2::Reg(dividend));
        if is_div {
            self.asm.asr(out, out, ctz);
            if imm < 0 {
                self.asm.rsb(out, out, 0);
            }
        } else {
            self.asm.ubfx(out, out, 0, ctz);
            self.asm.sub(out, out, Operand2::Reg(temp));
        }
    }

    fn div_rem_any_constant(&mut self, locs: &LocationSummary, is_div: bool, imm: i32) {
        let out = locs.out().reg();
        let dividend = locs.in_at(0).reg();
        let temp1 = locs.temp(0).reg();
        let temp2 = locs.temp(1).reg();
        let (magic, shift) = magic::magic(imm);

        self.asm.mov_imm(temp1, magic);
        self.asm.smull(temp2, temp1, dividend, temp1);

        // The 33-bit magic constant lost its top bit to the register width;
        // compensate with the dividend when the signs disagree.
        if imm > 0 && magic < 0 {
            self.asm.add(temp1, temp1, Operand2::Reg(dividend));
        } else if imm < 0 && magic > 0 {
            self.asm.sub(temp1, temp1, Operand2::Reg(dividend));
        }

        if shift != 0 {
            self.asm.asr(temp1, temp1, shift);
        }

        if is_div {
            self.asm
                .sub(out, temp1, Operand2::RegShift(temp1, asm::Shift::Asr, 31));
        } else {
            self.asm
                .sub(temp1, temp1, Operand2::RegShift(temp1, asm::Shift::Asr, 31));
            self.asm.mov_imm(temp2, imm);
            self.asm.mls(out, temp1, temp2, dividend);
        }
    }

    fn cg_neg(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => {
                self.asm.rsb(locs.out().reg(), locs.in_at(0).reg(), 0);
            }
            Ty::Long => {
                let (out, input) = (locs.out(), locs.in_at(0));
                // out.lo = 0 - in.lo, setting the borrow.
                self.asm.rsbs(out.low_reg(), input.low_reg(), 0);
                // There is no reverse-subtract-with-carry in Thumb-2:
                // out.hi = -borrow, then subtract in.hi.
                self.asm
                    .sbc(out.high_reg(), out.high_reg(), Operand2::Reg(out.high_reg()));
                self.asm
                    .sub(out.high_reg(), out.high_reg(), Operand2::Reg(input.high_reg()));
            }
            Ty::Float => {
                self.asm
                    .vneg(false, locs.out().sreg().0, locs.in_at(0).sreg().0);
            }
            Ty::Double => {
                self.asm.vneg(
                    true,
                    locs.out().low_sreg().dreg(),
                    locs.in_at(0).low_sreg().dreg(),
                );
            }
            _ => panic!("unexpected neg type {ty}"),
        }
    }

    fn cg_not(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => {
                self.asm
                    .mvn(locs.out().reg(), Operand2::Reg(locs.in_at(0).reg()));
            }
            Ty::Long => {
                let (out, input) = (locs.out(), locs.in_at(0));
                self.asm.mvn(out.low_reg(), Operand2::Reg(input.low_reg()));
                self.asm.mvn(out.high_reg(), Operand2::Reg(input.high_reg()));
            }
            _ => panic!("unexpected not type {ty}"),
        }
    }

    fn cg_bool_not(&mut self, iidx: InstId) {
        let locs = self.locs_of(iidx).clone();
        self.asm.eor(locs.out().reg(), locs.in_at(0).reg(), 1);
    }

    // Shifts and rotations.

    fn cg_shift(&mut self, iidx: InstId, op: ShiftOp, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => self.cg_shift_int(&locs, op),
            Ty::Long => self.cg_shift_long(&locs, op),
            _ => panic!("unexpected shift type {ty}"),
        }
    }

    fn cg_shift_int(&mut self, locs: &LocationSummary, op: ShiftOp) {
        let out = locs.out().reg();
        let first = locs.in_at(0).reg();
        match locs.in_at(1) {
            Location::Register(amount) => {
                // The hardware uses the amount's low byte unmasked; Java
                // semantics want mod 32.
                self.asm.and_(out, amount, 0x1f);
                match op {
                    ShiftOp::Shl => self.asm.lsl_reg(out, first, out),
                    ShiftOp::Shr => self.asm.asr_reg(out, first, out),
                    ShiftOp::UShr => self.asm.lsr_reg(out, first, out),
                }
            }
            Location::Constant(c) => {
                let shift = (c.as_word() as u32) & 0x1f;
                if shift == 0 {
                    self.asm.mov(out, first);
                } else {
                    match op {
                        ShiftOp::Shl => self.asm.lsl(out, first, shift),
                        ShiftOp::Shr => self.asm.asr(out, first, shift),
                        ShiftOp::UShr => self.asm.lsr(out, first, shift),
                    }
                }
            }
            l => panic!("unexpected shift amount location {l}"),
        }
    }

    fn cg_shift_long(&mut self, locs: &LocationSummary, op: ShiftOp) {
        let out = locs.out();
        let first = locs.in_at(0);
        let (o_l, o_h) = (out.low_reg(), out.high_reg());
        let (low, high) = (first.low_reg(), first.high_reg());

        match locs.in_at(1) {
            Location::Register(amount) => {
                let temp = locs.temp(0).reg();
                match op {
                    ShiftOp::Shl => {
                        self.asm.and_(o_l, amount, 0x3f);
                        // Shift the high part, pulling in what the low part
                        // shifts out.
                        self.asm.lsl_reg(o_h, high, o_l);
                        self.asm.rsb(temp, o_l, 32);
                        self.asm.lsr_reg(temp, low, temp);
                        self.asm.orr(o_h, o_h, Operand2::Reg(temp));
                        // Amounts of 32 or more take the high half straight
                        // from the low input; predicated to stay branch-free.
                        self.asm.subs(temp, o_l, 32);
                        self.asm
                            .shift_reg_cond(Cond::Pl, asm::Shift::Lsl, o_h, low, temp);
                        self.asm.lsl_reg(o_l, low, o_l);
                    }
                    ShiftOp::Shr => {
                        self.asm.and_(o_h, amount, 0x3f);
                        self.asm.lsr_reg(o_l, low, o_h);
                        self.asm.rsb(temp, o_h, 32);
                        self.asm.lsl_reg(temp, high, temp);
                        self.asm.orr(o_l, o_l, Operand2::Reg(temp));
                        self.asm.subs(temp, o_h, 32);
                        self.asm
                            .shift_reg_cond(Cond::Pl, asm::Shift::Asr, o_l, high, temp);
                        self.asm.asr_reg(o_h, high, o_h);
                    }
                    ShiftOp::UShr => {
                        self.asm.and_(o_h, amount, 0x3f);
                        self.asm.lsr_reg(o_l, low, o_h);
                        self.asm.rsb(temp, o_h, 32);
                        self.asm.lsl_reg(temp, high, temp);
                        self.asm.orr(o_l, o_l, Operand2::Reg(temp));
                        self.asm.subs(temp, o_h, 32);
                        self.asm
                            .shift_reg_cond(Cond::Pl, asm::Shift::Lsr, o_l, high, temp);
                        self.asm.lsr_reg(o_h, high, o_h);
                    }
                }
            }
            Location::Constant(c) => {
                // The allocator never creates partial pair overlap.
                assert_ne!(o_l, high);
                assert_ne!(o_h, low);
                let shift = (c.as_word() as u32) & 0x3f;
                if shift > 32 {
                    match op {
                        ShiftOp::Shl => {
                            self.asm.lsl(o_h, low, shift - 32);
                            self.asm.mov_imm(o_l, 0);
                        }
                        ShiftOp::Shr => {
                            self.asm.asr(o_l, high, shift - 32);
                            self.asm.asr(o_h, high, 31);
                        }
                        ShiftOp::UShr => {
                            self.asm.lsr(o_l, high, shift - 32);
                            self.asm.mov_imm(o_h, 0);
                        }
                    }
                } else if shift == 32 {
                    match op {
                        ShiftOp::Shl => {
                            self.asm.mov(o_h, low);
                            self.asm.mov_imm(o_l, 0);
                        }
                        ShiftOp::Shr => {
                            self.asm.mov(o_l, high);
                            self.asm.asr(o_h, high, 31);
                        }
                        ShiftOp::UShr => {
                            self.asm.mov(o_l, high);
                            self.asm.mov_imm(o_h, 0);
                        }
                    }
                } else if shift == 1 {
                    // One-bit shifts ride the carry chain.
                    match op {
                        ShiftOp::Shl => {
                            self.asm.lsls(o_l, low, 1);
                            self.asm.adc(o_h, high, Operand2::Reg(high));
                        }
                        ShiftOp::Shr => {
                            self.asm.asrs(o_h, high, 1);
                            self.asm.rrx(o_l, low);
                        }
                        ShiftOp::UShr => {
                            self.asm.lsrs(o_h, high, 1);
                            self.asm.rrx(o_l, low);
                        }
                    }
                } else if shift == 0 {
                    self.asm.mov(o_l, low);
                    self.asm.mov(o_h, high);
                } else {
                    debug_assert!((2..32).contains(&shift));
                    match op {
                        ShiftOp::Shl => {
                            self.asm.lsl(o_h, high, shift);
                            self.asm.orr(
                                o_h,
                                o_h,
                                Operand2::RegShift(low, asm::Shift::Lsr, 32 - shift),
                            );
                            self.asm.lsl(o_l, low, shift);
                        }
                        ShiftOp::Shr => {
                            self.asm.lsr(o_l, low, shift);
                            self.asm.orr(
                                o_l,
                                o_l,
                                Operand2::RegShift(high, asm::Shift::Lsl, 32 - shift),
                            );
                            self.asm.asr(o_h, high, shift);
                        }
                        ShiftOp::UShr => {
                            self.asm.lsr(o_l, low, shift);
                            self.asm.orr(
                                o_l,
                                o_l,
                                Operand2::RegShift(high, asm::Shift::Lsl, 32 - shift),
                            );
                            self.asm.lsr(o_h, high, shift);
                        }
                    }
                }
            }
            l => panic!("unexpected shift amount location {l}"),
        }
    }

    fn cg_ror(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        match ty {
            Ty::Int => {
                let out = locs.out().reg();
                let input = locs.in_at(0).reg();
                match locs.in_at(1) {
                    Location::Register(amount) => self.asm.ror_reg(out, input, amount),
                    Location::Constant(c) => {
                        let rot = (c.as_word() as u32) & 0x1f;
                        if rot != 0 {
                            self.asm.ror(out, input, rot);
                        } else if out != input {
                            self.asm.mov(out, input);
                        }
                    }
                    l => panic!("unexpected rotate amount location {l}"),
                }
            }
            Ty::Long => self.cg_ror_long(&locs),
            _ => panic!("unexpected rotate type {ty}"),
        }
    }

    /// Long rotations collapse to paired 32-bit rotations: rotations of a
    /// word or more pre-swap the halves, leaving a sub-word rotation.
    fn cg_ror_long(&mut self, locs: &LocationSummary) {
        let out = locs.out();
        let input = locs.in_at(0);
        let (out_lo, out_hi) = (out.low_reg(), out.high_reg());
        let (mut in_lo, mut in_hi) = (input.low_reg(), input.high_reg());
        match locs.in_at(1) {
            Location::Constant(c) => {
                let mut rot = (c.as_word() as u32) & 0x3f;
                if rot >= 32 {
                    rot -= 32;
                    std::mem::swap(&mut in_lo, &mut in_hi);
                }
                if rot != 0 {
                    self.asm.lsr(out_hi, in_hi, rot);
                    self.asm.orr(
                        out_hi,
                        out_hi,
                        Operand2::RegShift(in_lo, asm::Shift::Lsl, 32 - rot),
                    );
                    self.asm.lsr(out_lo, in_lo, rot);
                    self.asm.orr(
                        out_lo,
                        out_lo,
                        Operand2::RegShift(in_hi, asm::Shift::Lsl, 32 - rot),
                    );
                } else {
                    self.asm.mov(out_lo, in_lo);
                    self.asm.mov(out_hi, in_hi);
                }
            }
            Location::Register(amount) => {
                let shift_right = locs.temp(0).reg();
                let shift_left = locs.temp(1).reg();
                let end = self.asm.new_label();
                let rot_lt_word = self.asm.new_label();

                self.asm.and_(shift_right, amount, 0x1f);
                // Bit 5 of the amount lands in the carry: it decides whether
                // the halves swap.
                self.asm.lsrs(shift_left, amount, 6);
                self.asm.rsb(shift_left, shift_right, 32);
                self.asm.b_cond(Cond::Lo, rot_lt_word);

                // Rotation in [32, 64): halves swap.
                self.asm.lsl_reg(out_hi, in_hi, shift_left);
                self.asm.lsr_reg(out_lo, in_lo, shift_right);
                self.asm.add(out_hi, out_hi, Operand2::Reg(out_lo));
                self.asm.lsl_reg(out_lo, in_lo, shift_left);
                self.asm.lsr_reg(shift_left, in_hi, shift_right);
                self.asm.add(out_lo, out_lo, Operand2::Reg(shift_left));
                self.asm.b(end);

                // Rotation below a word.
                self.asm.bind(rot_lt_word);
                self.asm.lsr_reg(out_hi, in_hi, shift_right);
                self.asm.lsl_reg(out_lo, in_lo, shift_left);
                self.asm.add(out_hi, out_hi, Operand2::Reg(out_lo));
                self.asm.lsr_reg(out_lo, in_lo, shift_right);
                self.asm.lsl_reg(shift_right, in_hi, shift_left);
                self.asm.add(out_lo, out_lo, Operand2::Reg(shift_right));

                self.asm.bind(end);
            }
            l => panic!("unexpected rotate amount location {l}"),
        }
    }

    // Comparisons.

    fn generate_vcmp(&mut self, ty: Ty, lhs: Location, rhs: Location) {
        let f64 = ty == Ty::Double;
        match rhs {
            Location::Constant(c) => {
                // 0.0 is the only immediate a vcmp can encode; +0.0 and -0.0
                // compare equal so one literal serves both.
                debug_assert!(c.is_arithmetic_zero());
                if f64 {
                    self.asm.vcmp_zero(true, lhs.low_sreg().dreg());
                } else {
                    self.asm.vcmp_zero(false, lhs.sreg().0);
                }
            }
            _ => {
                if f64 {
                    self.asm
                        .vcmp(true, lhs.low_sreg().dreg(), rhs.low_sreg().dreg());
                } else {
                    self.asm.vcmp(false, lhs.sreg().0, rhs.sreg().0);
                }
            }
        }
    }

    /// Branch on a wide comparison: compare the high words signed, and only
    /// when they are equal compare the low words unsigned.
    fn generate_long_compares_and_jumps(
        &mut self,
        pred: Predicate,
        locs: &LocationSummary,
        true_label: Label,
        false_label: Label,
    ) {
        let left = locs.in_at(0);
        let right = locs.in_at(1);
        let (left_lo, left_hi) = (left.low_reg(), left.high_reg());

        let mut true_high_cond = pred;
        let mut false_high_cond = pred.opposite();
        // Equality on the high words cannot decide LT/GT-class predicates;
        // tighten the conditions that fall through to the low-word compare.
        match pred {
            Predicate::Eq | Predicate::Ne => (),
            Predicate::Lt => false_high_cond = Predicate::Gt,
            Predicate::Le => true_high_cond = Predicate::Lt,
            Predicate::Gt => false_high_cond = Predicate::Lt,
            Predicate::Ge => true_high_cond = Predicate::Gt,
            Predicate::Below => false_high_cond = Predicate::Above,
            Predicate::BelowEq => true_high_cond = Predicate::Below,
            Predicate::Above => false_high_cond = Predicate::Below,
            Predicate::AboveEq => true_high_cond = Predicate::Above,
        }

        if let Location::Constant(c) = right {
            let value = c.as_dword();
            let (val_lo, val_hi) = (value as i32, (value >> 32) as i32);
            self.asm.cmp(left_hi, val_hi);
            match pred {
                Predicate::Ne => self.asm.b_cond(arm_cond(true_high_cond), true_label),
                Predicate::Eq => self.asm.b_cond(arm_cond(false_high_cond), false_label),
                _ => {
                    self.asm.b_cond(arm_cond(true_high_cond), true_label);
                    self.asm.b_cond(arm_cond(false_high_cond), false_label);
                }
            }
            // High words equal; decide on the low words.
            self.asm.cmp(left_lo, val_lo);
        } else {
            let (right_lo, right_hi) = (right.low_reg(), right.high_reg());
            self.asm.cmp(left_hi, Operand2::Reg(right_hi));
            match pred {
                Predicate::Ne => self.asm.b_cond(arm_cond(true_high_cond), true_label),
                Predicate::Eq => self.asm.b_cond(arm_cond(false_high_cond), false_label),
                _ => {
                    self.asm.b_cond(arm_cond(true_high_cond), true_label);
                    self.asm.b_cond(arm_cond(false_high_cond), false_label);
                }
            }
            self.asm.cmp(left_lo, Operand2::Reg(right_lo));
        }
        self.asm.b_cond(arm_unsigned_cond(pred), true_label);
        self.asm.b(false_label);
    }

    fn cg_compare(&mut self, iidx: InstId, ty: Ty, bias: FpBias) {
        let locs = self.locs_of(iidx).clone();
        let out = locs.out().reg();
        let less = self.asm.new_label();
        let greater = self.asm.new_label();
        let done = self.asm.new_label();
        let less_cond;
        match ty {
            Ty::Int => {
                // The move goes before the compare: a narrow mov encoding
                // may set flags.
                self.asm.mov_imm(out, 0);
                self.asm
                    .cmp(locs.in_at(0).reg(), Operand2::Reg(locs.in_at(1).reg()));
                less_cond = Cond::Lt;
            }
            Ty::Long => {
                let (l, r) = (locs.in_at(0), locs.in_at(1));
                self.asm.cmp(l.high_reg(), Operand2::Reg(r.high_reg()));
                self.asm.b_cond(Cond::Lt, less);
                self.asm.b_cond(Cond::Gt, greater);
                self.asm.mov_imm(out, 0);
                self.asm.cmp(l.low_reg(), Operand2::Reg(r.low_reg()));
                less_cond = Cond::Lo;
            }
            Ty::Float | Ty::Double => {
                self.asm.mov_imm(out, 0);
                self.generate_vcmp(ty, locs.in_at(0), locs.in_at(1));
                self.asm.vmrs();
                less_cond = arm_fp_cond(Predicate::Lt, bias);
            }
            _ => panic!("unexpected compare type {ty}"),
        }
        self.asm.b_cond(Cond::Eq, done);
        self.asm.b_cond(less_cond, less);

        self.asm.bind(greater);
        self.asm.mov_imm(out, 1);
        self.asm.b(done);

        self.asm.bind(less);
        self.asm.mov_imm(out, -1);

        self.asm.bind(done);
    }

    fn cg_condition(&mut self, iidx: InstId, pred: Predicate, ty: Ty, bias: FpBias) {
        let locs = self.locs_of(iidx).clone();
        let out = locs.out().reg();
        match ty {
            Ty::Long => {
                let true_label = self.asm.new_label();
                let false_label = self.asm.new_label();
                let done = self.asm.new_label();
                self.generate_long_compares_and_jumps(pred, &locs, true_label, false_label);
                self.asm.bind(false_label);
                self.asm.mov_imm(out, 0);
                self.asm.b(done);
                self.asm.bind(true_label);
                self.asm.mov_imm(out, 1);
                self.asm.bind(done);
            }
            Ty::Float | Ty::Double => {
                let true_label = self.asm.new_label();
                let done = self.asm.new_label();
                self.generate_vcmp(ty, locs.in_at(0), locs.in_at(1));
                self.asm.vmrs();
                self.asm.b_cond(arm_fp_cond(pred, bias), true_label);
                self.asm.mov_imm(out, 0);
                self.asm.b(done);
                self.asm.bind(true_label);
                self.asm.mov_imm(out, 1);
                self.asm.bind(done);
            }
            _ => {
                // Materialize with a predicated move pair; no branches.
                self.asm.mov_imm(out, 0);
                let op2 = Self::in_op2(&locs, 1);
                self.asm.cmp(locs.in_at(0).reg(), op2);
                self.asm.mov_imm_cond(arm_cond(pred), out, 1);
            }
        }
    }

    // Conversions.

    fn cg_conversion(&mut self, iidx: InstId, to: Ty, value: InstId) {
        let from = self.m.result_ty(value).unwrap();
        let locs = self.locs_of(iidx).clone();
        match (from, to) {
            (Ty::Int | Ty::Char | Ty::Short | Ty::Bool | Ty::Byte, Ty::Byte) => {
                self.asm.sbfx(locs.out().reg(), locs.in_at(0).reg(), 0, 8);
            }
            (Ty::Int | Ty::Char | Ty::Short | Ty::Bool | Ty::Byte, Ty::Short) => {
                self.asm.sbfx(locs.out().reg(), locs.in_at(0).reg(), 0, 16);
            }
            (Ty::Int | Ty::Char | Ty::Short | Ty::Bool | Ty::Byte, Ty::Char) => {
                self.asm.ubfx(locs.out().reg(), locs.in_at(0).reg(), 0, 16);
            }
            (Ty::Int, Ty::Long) => {
                let out = locs.out();
                let input = locs.in_at(0).reg();
                self.asm.mov(out.low_reg(), input);
                self.asm.asr(out.high_reg(), input, 31);
            }
            (Ty::Long, Ty::Int) => {
                self.asm.mov(locs.out().reg(), locs.in_at(0).low_reg());
            }
            (Ty::Int, Ty::Float) => {
                let out = locs.out().sreg();
                self.asm.vmov_sr(out, locs.in_at(0).reg());
                self.asm.vcvt(CvtKind::F32FromS32, out.0, out.0);
            }
            (Ty::Int, Ty::Double) => {
                let out = locs.out();
                let low_s = out.low_sreg();
                self.asm.vmov_sr(low_s, locs.in_at(0).reg());
                self.asm.vcvt(CvtKind::F64FromS32, low_s.dreg(), low_s.0);
            }
            (Ty::Float, Ty::Int) => {
                let temp = locs.temp(0).sreg();
                self.asm
                    .vcvt(CvtKind::S32FromF32, temp.0, locs.in_at(0).sreg().0);
                self.asm.vmov_rs(locs.out().reg(), temp);
            }
            (Ty::Double, Ty::Int) => {
                let temp = locs.temp(0).sreg();
                self.asm.vcvt(
                    CvtKind::S32FromF64,
                    temp.0,
                    locs.in_at(0).low_sreg().dreg(),
                );
                self.asm.vmov_rs(locs.out().reg(), temp);
            }
            (Ty::Float, Ty::Double) => {
                self.asm.vcvt(
                    CvtKind::F64FromF32,
                    locs.out().low_sreg().dreg(),
                    locs.in_at(0).sreg().0,
                );
            }
            (Ty::Double, Ty::Float) => {
                self.asm.vcvt(
                    CvtKind::F32FromF64,
                    locs.out().sreg().0,
                    locs.in_at(0).low_sreg().dreg(),
                );
            }
            (Ty::Long, Ty::Float) => {
                self.invoke_runtime(Entrypoint::L2f, self.dex_pc(iidx), &locs)
            }
            (Ty::Long, Ty::Double) => {
                self.invoke_runtime(Entrypoint::L2d, self.dex_pc(iidx), &locs)
            }
            (Ty::Float, Ty::Long) => {
                self.invoke_runtime(Entrypoint::F2l, self.dex_pc(iidx), &locs)
            }
            (Ty::Double, Ty::Long) => {
                self.invoke_runtime(Entrypoint::D2l, self.dex_pc(iidx), &locs)
            }
            _ => panic!("unexpected type conversion {from} -> {to}"),
        }
    }

    // Checks.

    fn cg_null_check(&mut self, iidx: InstId) {
        let locs = self.locs_of(iidx).clone();
        let obj = locs.in_at(0).reg();
        if self.opts.implicit_null_checks {
            // The faulting load itself is the check; the runtime turns the
            // fault into the exception via the PC info recorded here.
            self.asm.with_scratch_reg(|asm, t| {
                asm.ldr(t, obj, 0);
            });
            self.record_pc_info(self.dex_pc(iidx), locs.live_registers());
        } else {
            let (entry, _) = self.add_slow_path(SlowPathKind::NullCheck, iidx);
            self.asm.cbz(obj, entry);
        }
    }

    fn cg_bounds_check(&mut self, iidx: InstId) {
        let locs = self.locs_of(iidx).clone();
        let (entry, _) = self.add_slow_path(SlowPathKind::BoundsCheck, iidx);
        let index = locs.in_at(0).reg();
        let length = locs.in_at(1).reg();
        // Unsigned compare folds the negative-index case in.
        self.asm.cmp(index, Operand2::Reg(length));
        self.asm.b_cond(Cond::Hs, entry);
    }

    fn cg_div_zero_check(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        let (entry, _) = self.add_slow_path(SlowPathKind::DivZeroCheck, iidx);
        match locs.in_at(0) {
            Location::Register(r) => {
                debug_assert_eq!(ty, Ty::Int);
                self.asm.cbz(r, entry);
            }
            Location::RegisterPair { low, high } => {
                self.asm.with_scratch_reg(|asm, t| {
                    asm.orr(t, low, Operand2::Reg(high));
                    asm.cbz(t, entry);
                });
            }
            Location::Constant(c) => {
                let zero = match ty {
                    Ty::Int => c.as_word() == 0,
                    Ty::Long => c.as_dword() == 0,
                    _ => panic!("unexpected div-zero-check type {ty}"),
                };
                if zero {
                    self.asm.b(entry);
                }
            }
            l => panic!("unexpected div-zero-check location {l}"),
        }
    }

    // Field and array access.

    fn generate_memory_barrier(&mut self, kind: MemBarrier) {
        let flavor = match kind {
            MemBarrier::AnyStore | MemBarrier::LoadAny | MemBarrier::AnyAny => BarrierKind::Ish,
        };
        self.asm.dmb(flavor);
    }

    /// 64-bit single-copy-atomic load on a core without atomic `ldrd`: one
    /// exclusive load pair.
    fn generate_wide_atomic_load(
        &mut self,
        addr: CoreReg,
        offset: u32,
        out_lo: CoreReg,
        out_hi: CoreReg,
    ) {
        if offset != 0 {
            self.asm.with_scratch_reg(|asm, t| {
                asm.add(t, addr, offset as i32);
                asm.ldrexd(out_lo, out_hi, t);
            });
        } else {
            self.asm.ldrexd(out_lo, out_hi, addr);
        }
    }

    /// 64-bit single-copy-atomic store: an exclusive load/store retry loop.
    /// The exclusive load must be reissued before every store attempt.
    fn generate_wide_atomic_store(
        &mut self,
        addr: CoreReg,
        offset: u32,
        value_lo: CoreReg,
        value_hi: CoreReg,
        temp1: CoreReg,
        temp2: CoreReg,
    ) {
        let fail = self.asm.new_label();
        if offset != 0 {
            self.asm.with_scratch_reg(|asm, t| {
                asm.add(t, addr, offset as i32);
                asm.bind(fail);
                asm.ldrexd(temp1, temp2, t);
                asm.strexd(temp1, value_lo, value_hi, t);
                asm.cbnz(temp1, fail);
            });
        } else {
            self.asm.bind(fail);
            self.asm.ldrexd(temp1, temp2, addr);
            self.asm.strexd(temp1, value_lo, value_hi, addr);
            self.asm.cbnz(temp1, fail);
        }
    }

    /// Track cross-region reference stores for the collector: dirty the
    /// card covering `object`. Null stores are skipped by an early out.
    fn mark_gc_card(
        &mut self,
        temp: CoreReg,
        card: CoreReg,
        object: CoreReg,
        value: CoreReg,
        can_be_null: bool,
    ) {
        let is_null = self.asm.new_label();
        if can_be_null {
            self.asm.cbz(value, is_null);
        }
        self.asm
            .ldr(card, TR, entrypoints::THREAD_CARD_TABLE_OFFSET);
        self.asm.lsr(temp, object, entrypoints::CARD_SHIFT);
        self.asm
            .store(MemWidth::Byte, card, card, MemOff::Reg(temp));
        if can_be_null {
            self.asm.bind(is_null);
        }
    }

    fn cg_field_get(&mut self, iidx: InstId, offset: u32, ty: Ty, volatile: bool) {
        let locs = self.locs_of(iidx).clone();
        let base = locs.in_at(0).reg();
        let atomic_wide = volatile && ty.is_wide() && !self.isa.has_atomic_ldrd_strd;
        match ty {
            Ty::Long if atomic_wide => {
                let out = locs.out();
                self.generate_wide_atomic_load(base, offset, out.low_reg(), out.high_reg());
            }
            Ty::Double if atomic_wide => {
                let t1 = locs.temp(0).reg();
                let t2 = locs.temp(1).reg();
                self.generate_wide_atomic_load(base, offset, t1, t2);
                self.asm.vmov_drr(locs.out().low_sreg().dreg(), t1, t2);
            }
            Ty::Long => {
                let out = locs.out();
                self.asm
                    .ldrd(out.low_reg(), out.high_reg(), base, offset as i32);
            }
            Ty::Float => self.asm.vldr_s(locs.out().sreg(), base, offset as i32),
            Ty::Double => self
                .asm
                .vldr_d(locs.out().low_sreg().dreg(), base, offset as i32),
            _ => self.asm.load(
                mem_width(ty),
                locs.out().reg(),
                base,
                MemOff::Imm(offset as i32),
            ),
        }
        if volatile {
            self.generate_memory_barrier(MemBarrier::LoadAny);
        }
    }

    fn cg_field_set(
        &mut self,
        iidx: InstId,
        offset: u32,
        ty: Ty,
        value: InstId,
        volatile: bool,
        value_can_be_null: bool,
    ) {
        let locs = self.locs_of(iidx).clone();
        let base = locs.in_at(0).reg();
        let atomic_wide = volatile && ty.is_wide() && !self.isa.has_atomic_ldrd_strd;
        if volatile {
            self.generate_memory_barrier(MemBarrier::AnyStore);
        }
        match ty {
            Ty::Long if atomic_wide => {
                let v = locs.in_at(1);
                self.generate_wide_atomic_store(
                    base,
                    offset,
                    v.low_reg(),
                    v.high_reg(),
                    locs.temp(0).reg(),
                    locs.temp(1).reg(),
                );
            }
            Ty::Double if atomic_wide => {
                let (vl, vh) = (locs.temp(2).reg(), locs.temp(3).reg());
                self.asm.vmov_rrd(vl, vh, locs.in_at(1).low_sreg().dreg());
                self.generate_wide_atomic_store(
                    base,
                    offset,
                    vl,
                    vh,
                    locs.temp(0).reg(),
                    locs.temp(1).reg(),
                );
            }
            Ty::Long => {
                let v = locs.in_at(1);
                self.asm
                    .strd(v.low_reg(), v.high_reg(), base, offset as i32);
            }
            Ty::Float => self.asm.vstr_s(locs.in_at(1).sreg(), base, offset as i32),
            Ty::Double => {
                self.asm
                    .vstr_d(locs.in_at(1).low_sreg().dreg(), base, offset as i32)
            }
            _ => self.asm.store(
                mem_width(ty),
                locs.in_at(1).reg(),
                base,
                MemOff::Imm(offset as i32),
            ),
        }
        if ty == Ty::Ref && !self.m.is_null_const(value) {
            let temp = locs.temp(0).reg();
            let card = locs.temp(1).reg();
            self.mark_gc_card(temp, card, base, locs.in_at(1).reg(), value_can_be_null);
        }
        if volatile {
            self.generate_memory_barrier(MemBarrier::AnyAny);
        }
    }

    fn cg_array_length(&mut self, iidx: InstId) {
        let locs = self.locs_of(iidx).clone();
        self.asm.ldr(
            locs.out().reg(),
            locs.in_at(0).reg(),
            entrypoints::ARRAY_LENGTH_OFFSET as i32,
        );
    }

    fn cg_array_get(&mut self, iidx: InstId, ty: Ty) {
        let locs = self.locs_of(iidx).clone();
        let array = locs.in_at(0).reg();
        let index = locs.in_at(1);
        let data_offset = entrypoints::array_data_offset(ty);
        let shift = ty.size_shift();
        match index {
            Location::Constant(c) => {
                let off = (data_offset + ((c.as_word() as u32) << shift)) as i32;
                match ty {
                    Ty::Long => {
                        let out = locs.out();
                        self.asm.ldrd(out.low_reg(), out.high_reg(), array, off);
                    }
                    Ty::Float => self.asm.vldr_s(locs.out().sreg(), array, off),
                    Ty::Double => self.asm.vldr_d(locs.out().low_sreg().dreg(), array, off),
                    _ => self
                        .asm
                        .load(mem_width(ty), locs.out().reg(), array, MemOff::Imm(off)),
                }
            }
            Location::Register(index) => match ty {
                Ty::Long => {
                    let out = locs.out();
                    self.asm.with_scratch_reg(|asm, t| {
                        asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                        asm.ldrd(out.low_reg(), out.high_reg(), t, data_offset as i32);
                    });
                }
                Ty::Float => {
                    let out = locs.out().sreg();
                    self.asm.with_scratch_reg(|asm, t| {
                        asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                        asm.vldr_s(out, t, data_offset as i32);
                    });
                }
                Ty::Double => {
                    let out = locs.out().low_sreg().dreg();
                    self.asm.with_scratch_reg(|asm, t| {
                        asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                        asm.vldr_d(out, t, data_offset as i32);
                    });
                }
                _ => {
                    let out = locs.out().reg();
                    self.asm.with_scratch_reg(|asm, t| {
                        asm.add(t, array, data_offset as i32);
                        let off = if shift == 0 {
                            MemOff::Reg(index)
                        } else {
                            MemOff::RegLsl(index, shift)
                        };
                        asm.load(mem_width(ty), out, t, off);
                    });
                }
            },
            l => panic!("unexpected array index location {l}"),
        }
    }

    /// Store one word-sized element at `array[index]`.
    fn store_array_word(&mut self, ty: Ty, value: CoreReg, array: CoreReg, index: Location) {
        let data_offset = entrypoints::array_data_offset(ty);
        let shift = ty.size_shift();
        match index {
            Location::Constant(c) => {
                let off = (data_offset + ((c.as_word() as u32) << shift)) as i32;
                self.asm.store(mem_width(ty), value, array, MemOff::Imm(off));
            }
            Location::Register(index) => {
                self.asm.with_scratch_reg(|asm, t| {
                    asm.add(t, array, data_offset as i32);
                    let off = if shift == 0 {
                        MemOff::Reg(index)
                    } else {
                        MemOff::RegLsl(index, shift)
                    };
                    asm.store(mem_width(ty), value, t, off);
                });
            }
            l => panic!("unexpected array index location {l}"),
        }
    }

    fn cg_array_set(
        &mut self,
        iidx: InstId,
        ty: Ty,
        value: InstId,
        needs_type_check: bool,
        static_type_is_object_array: bool,
        value_can_be_null: bool,
    ) {
        let locs = self.locs_of(iidx).clone();
        let array = locs.in_at(0).reg();
        let index = locs.in_at(1);
        let data_offset = entrypoints::array_data_offset(ty);
        let shift = ty.size_shift();
        match ty {
            Ty::Ref => {
                let value_reg = locs.in_at(2).reg();
                if self.m.is_null_const(value) {
                    // Just storing null: no type check, no write barrier.
                    self.store_array_word(ty, value_reg, array, index);
                    return;
                }
                let temp1 = locs.temp(0).reg();
                let temp2 = locs.temp(1).reg();
                let done = self.asm.new_label();
                let mut slow_exit = None;

                if needs_type_check {
                    let (entry, exit) = self.add_slow_path(SlowPathKind::ArraySet, iidx);
                    slow_exit = Some(exit);
                    if value_can_be_null {
                        let non_null = self.asm.new_label();
                        self.asm.cbnz(value_reg, non_null);
                        self.store_array_word(ty, value_reg, array, index);
                        self.asm.b(done);
                        self.asm.bind(non_null);
                    }
                    // Compare the array's element class against the value's
                    // class.
                    self.asm
                        .ldr(temp1, array, entrypoints::OBJECT_CLASS_OFFSET as i32);
                    self.asm
                        .ldr(temp1, temp1, entrypoints::CLASS_COMPONENT_TYPE_OFFSET as i32);
                    self.asm
                        .ldr(temp2, value_reg, entrypoints::OBJECT_CLASS_OFFSET as i32);
                    self.asm.cmp(temp1, Operand2::Reg(temp2));
                    if static_type_is_object_array {
                        // A mismatch may still be fine: walk the value's
                        // superclass chain to null before giving up.
                        let do_put = self.asm.new_label();
                        self.asm.b_cond(Cond::Eq, do_put);
                        self.asm
                            .ldr(temp1, temp1, entrypoints::CLASS_SUPER_OFFSET as i32);
                        self.asm.cbnz(temp1, entry);
                        self.asm.bind(do_put);
                    } else {
                        self.asm.b_cond(Cond::Ne, entry);
                    }
                }

                self.store_array_word(ty, value_reg, array, index);
                self.mark_gc_card(temp1, temp2, array, value_reg, value_can_be_null);
                self.asm.bind(done);
                if let Some(exit) = slow_exit {
                    self.asm.bind(exit);
                }
            }
            Ty::Long => {
                let v = locs.in_at(2);
                match index {
                    Location::Constant(c) => {
                        let off = (data_offset + ((c.as_word() as u32) << shift)) as i32;
                        self.asm.strd(v.low_reg(), v.high_reg(), array, off);
                    }
                    Location::Register(index) => {
                        self.asm.with_scratch_reg(|asm, t| {
                            asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                            asm.strd(v.low_reg(), v.high_reg(), t, data_offset as i32);
                        });
                    }
                    l => panic!("unexpected array index location {l}"),
                }
            }
            Ty::Float => {
                let v = locs.in_at(2).sreg();
                match index {
                    Location::Constant(c) => {
                        let off = (data_offset + ((c.as_word() as u32) << shift)) as i32;
                        self.asm.vstr_s(v, array, off);
                    }
                    Location::Register(index) => {
                        self.asm.with_scratch_reg(|asm, t| {
                            asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                            asm.vstr_s(v, t, data_offset as i32);
                        });
                    }
                    l => panic!("unexpected array index location {l}"),
                }
            }
            Ty::Double => {
                let v = locs.in_at(2).low_sreg().dreg();
                match index {
                    Location::Constant(c) => {
                        let off = (data_offset + ((c.as_word() as u32) << shift)) as i32;
                        self.asm.vstr_d(v, array, off);
                    }
                    Location::Register(index) => {
                        self.asm.with_scratch_reg(|asm, t| {
                            asm.add(t, array, Operand2::RegShift(index, asm::Shift::Lsl, shift));
                            asm.vstr_d(v, t, data_offset as i32);
                        });
                    }
                    l => panic!("unexpected array index location {l}"),
                }
            }
            _ => {
                let value_reg = locs.in_at(2).reg();
                self.store_array_word(ty, value_reg, array, index);
            }
        }
    }

    // Type checks.

    fn cg_instance_of(&mut self, iidx: InstId, kind: TypeCheckKind, must_do_null_check: bool) {
        let locs = self.locs_of(iidx).clone();
        let obj = locs.in_at(0).reg();
        let cls = locs.in_at(1).reg();
        let out = locs.out().reg();
        let class_off = entrypoints::OBJECT_CLASS_OFFSET as i32;
        let super_off = entrypoints::CLASS_SUPER_OFFSET as i32;
        let component_off = entrypoints::CLASS_COMPONENT_TYPE_OFFSET as i32;
        let primitive_off = entrypoints::CLASS_PRIMITIVE_TYPE_OFFSET as i32;

        let zero = self.asm.new_label();
        let done = self.asm.new_label();
        let mut slow_exit = None;

        // null is an instance of nothing.
        if must_do_null_check {
            self.asm.cbz(obj, zero);
        }

        match kind {
            TypeCheckKind::Exact => {
                self.asm.ldr(out, obj, class_off);
                self.asm.cmp(out, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Ne, zero);
                self.asm.mov_imm(out, 1);
                self.asm.b(done);
            }
            TypeCheckKind::AbstractClass => {
                // The class is abstract: the object can never be exactly it,
                // so start walking at the superclass.
                self.asm.ldr(out, obj, class_off);
                let loop_label = self.asm.new_label();
                self.asm.bind(loop_label);
                self.asm.ldr(out, out, super_off);
                // A null superclass doubles as the false result.
                self.asm.cbz(out, done);
                self.asm.cmp(out, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Ne, loop_label);
                self.asm.mov_imm(out, 1);
                self.asm.b(done);
            }
            TypeCheckKind::ClassHierarchy => {
                self.asm.ldr(out, obj, class_off);
                let loop_label = self.asm.new_label();
                let success = self.asm.new_label();
                self.asm.bind(loop_label);
                self.asm.cmp(out, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Eq, success);
                self.asm.ldr(out, out, super_off);
                self.asm.cbnz(out, loop_label);
                self.asm.b(done);
                self.asm.bind(success);
                self.asm.mov_imm(out, 1);
                self.asm.b(done);
            }
            TypeCheckKind::ArrayObject => {
                self.asm.ldr(out, obj, class_off);
                let exact = self.asm.new_label();
                self.asm.cmp(out, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Eq, exact);
                // Otherwise the object must be a non-primitive array.
                self.asm.ldr(out, out, component_off);
                self.asm.cbz(out, done);
                self.asm
                    .load(MemWidth::Half, out, out, MemOff::Imm(primitive_off));
                self.asm.cbnz(out, zero);
                self.asm.bind(exact);
                self.asm.mov_imm(out, 1);
                self.asm.b(done);
            }
            TypeCheckKind::ArrayCheck => {
                self.asm.ldr(out, obj, class_off);
                self.asm.cmp(out, Operand2::Reg(cls));
                let (entry, exit) =
                    self.add_slow_path(SlowPathKind::TypeCheck { is_fatal: false }, iidx);
                slow_exit = Some(exit);
                self.asm.b_cond(Cond::Ne, entry);
                self.asm.mov_imm(out, 1);
                self.asm.b(done);
            }
            TypeCheckKind::Unresolved | TypeCheckKind::Interface => {
                // Always the runtime's problem.
                let (entry, exit) =
                    self.add_slow_path(SlowPathKind::TypeCheck { is_fatal: false }, iidx);
                slow_exit = Some(exit);
                self.asm.b(entry);
            }
        }

        self.asm.bind(zero);
        self.asm.mov_imm(out, 0);
        self.asm.bind(done);
        if let Some(exit) = slow_exit {
            self.asm.bind(exit);
        }
    }

    fn cg_check_cast(
        &mut self,
        iidx: InstId,
        kind: TypeCheckKind,
        must_do_null_check: bool,
        can_throw_into_catch: bool,
    ) {
        let locs = self.locs_of(iidx).clone();
        let obj = locs.in_at(0).reg();
        let cls = locs.in_at(1).reg();
        let temp = locs.temp(0).reg();
        let class_off = entrypoints::OBJECT_CLASS_OFFSET as i32;
        let super_off = entrypoints::CLASS_SUPER_OFFSET as i32;
        let component_off = entrypoints::CLASS_COMPONENT_TYPE_OFFSET as i32;
        let primitive_off = entrypoints::CLASS_PRIMITIVE_TYPE_OFFSET as i32;

        // When no handler can ever resume, the slow path need not preserve
        // anything.
        let is_fatal = matches!(
            kind,
            TypeCheckKind::Exact
                | TypeCheckKind::AbstractClass
                | TypeCheckKind::ClassHierarchy
                | TypeCheckKind::ArrayObject
        ) && !can_throw_into_catch;
        let (entry, exit) = self.add_slow_path(SlowPathKind::TypeCheck { is_fatal }, iidx);

        let done = self.asm.new_label();
        // Casting null always succeeds.
        if must_do_null_check {
            self.asm.cbz(obj, done);
        }
        self.asm.ldr(temp, obj, class_off);

        match kind {
            TypeCheckKind::Exact | TypeCheckKind::ArrayCheck => {
                self.asm.cmp(temp, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Ne, entry);
            }
            TypeCheckKind::AbstractClass => {
                let loop_label = self.asm.new_label();
                self.asm.bind(loop_label);
                self.asm.ldr(temp, temp, super_off);
                // Walked off the top: the cast fails.
                self.asm.cbz(temp, entry);
                self.asm.cmp(temp, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Ne, loop_label);
            }
            TypeCheckKind::ClassHierarchy => {
                let loop_label = self.asm.new_label();
                self.asm.bind(loop_label);
                self.asm.cmp(temp, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Eq, done);
                self.asm.ldr(temp, temp, super_off);
                self.asm.cbz(temp, entry);
                self.asm.b(loop_label);
            }
            TypeCheckKind::ArrayObject => {
                self.asm.cmp(temp, Operand2::Reg(cls));
                self.asm.b_cond(Cond::Eq, done);
                self.asm.ldr(temp, temp, component_off);
                self.asm.cbz(temp, entry);
                self.asm
                    .load(MemWidth::Half, temp, temp, MemOff::Imm(primitive_off));
                self.asm.cbnz(temp, entry);
            }
            TypeCheckKind::Unresolved | TypeCheckKind::Interface => {
                self.asm.b(entry);
            }
        }
        self.asm.bind(done);
        self.asm.bind(exit);
    }

    // Loads from the runtime's metadata, allocation, locking.

    fn cg_load_class(&mut self, iidx: InstId, type_idx: u32, must_init: bool) {
        let locs = self.locs_of(iidx).clone();
        let method = locs.in_at(0).reg();
        let out = locs.out().reg();
        self.asm.ldr(
            out,
            method,
            entrypoints::METHOD_DEX_CACHE_TYPES_OFFSET as i32,
        );
        self.asm.ldr(out, out, (type_idx * 4) as i32);
        let (entry, exit) = self.add_slow_path(
            SlowPathKind::LoadClass {
                type_idx,
                do_init: must_init,
            },
            iidx,
        );
        self.asm.cbz(out, entry);
        self.asm.bind(exit);
    }

    fn cg_load_string(&mut self, iidx: InstId, string_idx: u32) {
        let locs = self.locs_of(iidx).clone();
        self.asm.mov_imm(RUNTIME_ARG_REGS[0], string_idx as i32);
        self.invoke_runtime(Entrypoint::ResolveString, self.dex_pc(iidx), &locs);
    }

    fn cg_new_instance(&mut self, iidx: InstId, type_idx: u32) {
        let locs = self.locs_of(iidx).clone();
        self.asm.mov_imm(RUNTIME_ARG_REGS[0], type_idx as i32);
        self.invoke_runtime(Entrypoint::AllocObject, self.dex_pc(iidx), &locs);
    }

    fn cg_new_array(&mut self, iidx: InstId, type_idx: u32) {
        let locs = self.locs_of(iidx).clone();
        self.asm.mov_imm(RUNTIME_ARG_REGS[0], type_idx as i32);
        self.invoke_runtime(Entrypoint::AllocArray, self.dex_pc(iidx), &locs);
    }

    fn cg_monitor_op(&mut self, iidx: InstId, enter: bool) {
        let locs = self.locs_of(iidx).clone();
        let ep = if enter {
            Entrypoint::LockObject
        } else {
            Entrypoint::UnlockObject
        };
        self.invoke_runtime(ep, self.dex_pc(iidx), &locs);
    }

    // Invokes.

    fn cg_invoke(&mut self, iidx: InstId, kind: InvokeKind, method_idx: u32, num_args: usize) {
        let locs = self.locs_of(iidx).clone();
        let temp = locs.temp(0).reg();
        debug_assert_eq!(temp, crate::location::METHOD_REG);
        let entry_off = entrypoints::METHOD_ENTRYPOINT_OFFSET as i32;
        let class_off = entrypoints::OBJECT_CLASS_OFFSET as i32;
        match kind {
            InvokeKind::Static | InvokeKind::Direct => {
                // Resolve the callee through the caller's method cache.
                let caller = locs.in_at(num_args).reg();
                self.asm.ldr(
                    temp,
                    caller,
                    entrypoints::METHOD_DEX_CACHE_METHODS_OFFSET as i32,
                );
                self.asm.ldr(temp, temp, (method_idx * 4) as i32);
                self.asm.ldr(LR, temp, entry_off);
                self.asm.blx(LR);
            }
            InvokeKind::Virtual { vtable_index } => {
                let receiver = locs.in_at(0).reg();
                self.asm.ldr(temp, receiver, class_off);
                self.asm.ldr(
                    temp,
                    temp,
                    (entrypoints::CLASS_VTABLE_OFFSET + vtable_index * 4) as i32,
                );
                self.asm.ldr(LR, temp, entry_off);
                self.asm.blx(LR);
            }
            InvokeKind::Interface { imt_index } => {
                let receiver = locs.in_at(0).reg();
                self.asm.ldr(temp, receiver, class_off);
                self.asm
                    .ldr(temp, temp, entrypoints::CLASS_IMT_PTR_OFFSET as i32);
                self.asm.ldr(temp, temp, (imt_index * 4) as i32);
                self.asm.ldr(LR, temp, entry_off);
                // The hidden argument keys the conflict resolution stub; set
                // it right before the call so nothing can clobber it.
                self.asm.with_scratch_reg(|asm, hidden| {
                    asm.mov_imm(hidden, method_idx as i32);
                    asm.blx(LR);
                });
            }
        }
        // Every call site is a safepoint and may throw.
        self.record_pc_info(self.dex_pc(iidx), locs.live_registers());
    }

    // Safepoints and deoptimization.

    /// Poll the thread's suspend-request flags. With a `successor` (a loop
    /// back-edge), fall through to the slow path and have it branch to the
    /// loop header; standalone polls resume just past the check.
    fn generate_suspend_check(&mut self, iidx: InstId, successor: Option<BlockId>) {
        let return_label = self.asm.new_label();
        let (entry, _) = self.add_slow_path(
            SlowPathKind::SuspendCheck {
                successor,
                return_label,
            },
            iidx,
        );
        let succ_label = successor.map(|b| self.block_label(b));
        self.asm.with_scratch_reg(|asm, t| {
            asm.load(
                MemWidth::Half,
                t,
                TR,
                MemOff::Imm(entrypoints::THREAD_FLAGS_OFFSET),
            );
            match succ_label {
                None => asm.cbnz(t, entry),
                Some(l) => {
                    asm.cbz(t, l);
                    asm.b(entry);
                }
            }
        });
        if successor.is_none() {
            self.asm.bind(return_label);
        }
    }

    fn cg_deoptimize(&mut self, iidx: InstId) {
        let locs = self.locs_of(iidx).clone();
        let (entry, _) = self.add_slow_path(SlowPathKind::Deoptimize, iidx);
        self.asm.cbnz(locs.in_at(0).reg(), entry);
    }

    // Control flow.

    fn goes_to_next_block(&self, from: BlockId, to: BlockId) -> bool {
        usize::from(to) == usize::from(from) + 1
    }

    fn emit_terminator(&mut self, bidx: BlockId) {
        match self.m.blocks[bidx].term.clone() {
            Terminator::Goto { target, suspend } => {
                if let Some(sc) = suspend {
                    self.generate_suspend_check(sc, Some(target));
                    return;
                }
                if !self.goes_to_next_block(bidx, target) {
                    let l = self.block_label(target);
                    self.asm.b(l);
                }
            }
            Terminator::If {
                cond,
                true_target,
                false_target,
            } => {
                let true_label = (!self.goes_to_next_block(bidx, true_target))
                    .then(|| self.block_label(true_target));
                let false_label = (!self.goes_to_next_block(bidx, false_target))
                    .then(|| self.block_label(false_target));
                self.generate_test_and_branch(cond, true_label, false_label);
            }
            Terminator::Switch {
                inst,
                targets,
                default,
            } => self.cg_packed_switch(bidx, inst, &targets, default),
            Terminator::Return { .. } => self.generate_frame_exit(),
        }
    }

    /// Branch on `cond`: a constant, an already-materialized boolean, or a
    /// comparison folded into the branch. `None` targets fall through.
    fn generate_test_and_branch(
        &mut self,
        cond: InstId,
        true_label: Option<Label>,
        false_label: Option<Label>,
    ) {
        if true_label.is_none() && false_label.is_none() {
            return;
        }
        if let Some(c) = self.m.as_const(cond) {
            // Statically decided.
            let target = if c.as_word() != 0 {
                true_label
            } else {
                false_label
            };
            if let Some(l) = target {
                self.asm.b(l);
            }
            return;
        }
        if let Inst::Condition {
            pred,
            ty,
            bias,
            materialized: false,
            ..
        } = self.m.inst(cond)
        {
            let (pred, ty, bias) = (*pred, *ty, *bias);
            let locs = self.locs_of(cond).clone();
            match ty {
                Ty::Long | Ty::Float | Ty::Double => {
                    self.generate_compare_test_and_branch(
                        pred, ty, bias, &locs, true_label, false_label,
                    );
                }
                _ => {
                    let op2 = Self::in_op2(&locs, 1);
                    self.asm.cmp(locs.in_at(0).reg(), op2);
                    match (true_label, false_label) {
                        (None, Some(f)) => self.asm.b_cond(arm_cond(pred.opposite()), f),
                        (Some(t), None) => self.asm.b_cond(arm_cond(pred), t),
                        (Some(t), Some(f)) => {
                            self.asm.b_cond(arm_cond(pred), t);
                            self.asm.b(f);
                        }
                        (None, None) => unreachable!(),
                    }
                }
            }
            return;
        }
        // A materialized boolean value: compare against zero.
        let reg = self.value_loc(cond).reg();
        match (true_label, false_label) {
            (None, Some(f)) => self.asm.cbz(reg, f),
            (Some(t), None) => self.asm.cbnz(reg, t),
            (Some(t), Some(f)) => {
                self.asm.cbnz(reg, t);
                self.asm.b(f);
            }
            (None, None) => unreachable!(),
        }
    }

    /// Long and FP comparisons cannot be predicated into a single branch;
    /// generate the explicit compare ladder.
    fn generate_compare_test_and_branch(
        &mut self,
        pred: Predicate,
        ty: Ty,
        bias: FpBias,
        locs: &LocationSummary,
        true_label: Option<Label>,
        false_label: Option<Label>,
    ) {
        let fallthrough = self.asm.new_label();
        let t = true_label.unwrap_or(fallthrough);
        let f = false_label.unwrap_or(fallthrough);
        match ty {
            Ty::Long => self.generate_long_compares_and_jumps(pred, locs, t, f),
            Ty::Float | Ty::Double => {
                self.generate_vcmp(ty, locs.in_at(0), locs.in_at(1));
                self.asm.vmrs();
                self.asm.b_cond(arm_fp_cond(pred, bias), t);
                if false_label.is_some() {
                    self.asm.b(f);
                }
            }
            _ => panic!("unexpected compare-branch type {ty}"),
        }
        if true_label.is_none() || false_label.is_none() {
            self.asm.bind(fallthrough);
        }
    }

    /// A packed switch: cascading compares below [SWITCH_TABLE_THRESHOLD]
    /// entries, a PC-relative jump table above it.
    fn cg_packed_switch(
        &mut self,
        bidx: BlockId,
        inst: InstId,
        targets: &[BlockId],
        default: BlockId,
    ) {
        let locs = self.locs_of(inst).clone();
        let (start, num_entries) = match self.m.inst(inst) {
            Inst::PackedSwitch {
                start, num_entries, ..
            } => (*start, *num_entries),
            _ => panic!("switch terminator pointing at a non-switch payload"),
        };
        assert_eq!(targets.len(), num_entries as usize);
        let value_reg = locs.in_at(0).reg();
        let target_labels: SmallVec<[Label; 8]> =
            targets.iter().map(|b| self.block_label(*b)).collect();
        let default_label = self.block_label(default);

        if num_entries <= SWITCH_TABLE_THRESHOLD {
            // De-bias into a temp once, then walk the cases two at a time,
            // re-biasing the temp as we go.
            self.asm.with_scratch_reg(|asm, temp| {
                asm.adds(temp, value_reg, -start);
                asm.b_cond(Cond::Eq, target_labels[0]);
                let mut last_index: u32 = 0;
                while num_entries - last_index > 2 {
                    asm.adds(temp, temp, -2);
                    asm.b_cond(Cond::Lo, target_labels[(last_index + 1) as usize]);
                    asm.b_cond(Cond::Eq, target_labels[(last_index + 2) as usize]);
                    last_index += 2;
                }
                if num_entries - last_index == 2 {
                    asm.cmp(temp, 1);
                    asm.b_cond(Cond::Eq, target_labels[(last_index + 1) as usize]);
                }
            });
            if !self.goes_to_next_block(bidx, default) {
                self.asm.b(default_label);
            }
        } else {
            let table_base = locs.temp(0).reg();
            let jt = self.asm.reserve_jump_table(num_entries as usize);
            self.jump_tables.push((jt, targets.to_vec()));

            let key_reg = if start != 0 {
                let key = locs.temp(1).reg();
                self.asm.sub(key, value_reg, start);
                key
            } else {
                value_reg
            };

            // Keys outside the table go to the default target.
            self.asm.cmp(key_reg, (num_entries - 1) as i32);
            self.asm.b_cond(Cond::Hi, default_label);

            let start_label = self.asm.jump_table_start(jt);
            self.asm.adr(table_base, start_label);
            self.asm.with_scratch_reg(|asm, jump_offset| {
                asm.load(
                    MemWidth::Word,
                    jump_offset,
                    table_base,
                    MemOff::RegLsl(key_reg, 2),
                );
                asm.add(table_base, table_base, Operand2::Reg(jump_offset));
                asm.bx(table_base);
            });
            self.asm.place_jump_table(jt);
        }
    }
}

/// Compile one method end to end: the caller supplies the IR, the completed
/// location table, and the allocator's report.
pub fn compile_method(
    m: &Method,
    locs: &LocationTable,
    alloc: &AllocationResult,
    isa: &IsaFeatures,
    opts: &CodegenOptions,
) -> Result<CompiledMethod, CompilationError> {
    CodeGenerator::new(m, locs, alloc, isa, opts).compile()
}
