//! Out-of-line slow paths.
//!
//! A slow path is the cold half of an instruction: the main path branches to
//! its entry label on the rare condition and (unless the path is fatal)
//! resumes at its exit label. One [SlowPath] is created per occurrence site,
//! never shared, and owned by the per-method list in the code generator;
//! they are all emitted after the main body.
//!
//! Every path follows the same shape: bind the entry label; save the live
//! caller-save registers (skipped when fatal, since nothing can resume);
//! marshal arguments into the runtime calling convention — through the
//! parallel move resolver whenever two moves could clobber each other —
//! invoke the runtime entrypoint, recording PC info; move the result out;
//! restore; branch back.

use super::{asm::Label, moves::ParallelMoveResolver, CodeGenerator, RUNTIME_ARG_REGS};
use crate::{
    entrypoints::Entrypoint,
    ir::{BlockId, Inst, InstId, MoveOp, Ty},
    location::{Location, LocationSummary, SReg, R0, SP},
};

/// The variant-specific half of a slow path.
#[derive(Debug)]
pub(crate) enum SlowPathKind {
    /// Null dereference: throw. Fatal.
    NullCheck,
    /// Array index out of range: throw, marshalling (index, length). Fatal.
    BoundsCheck,
    /// Division by zero: throw. Fatal.
    DivZeroCheck,
    /// Failed instance-of / check-cast: call the runtime test. Fatal for a
    /// check-cast that no handler can resume.
    TypeCheck { is_fatal: bool },
    /// Resolve (and optionally initialize) a class, leaving it in the
    /// instruction's output register.
    LoadClass { type_idx: u32, do_init: bool },
    /// Transfer execution back to the interpreter. Never returns to the
    /// compiled frame; the runtime reconstructs state from the PC-info
    /// entry, so nothing is saved here.
    Deoptimize,
    /// Cooperative safepoint. `successor` is the loop header to branch to
    /// after the poll; with no successor, fall back to `return_label` just
    /// past the poll site.
    SuspendCheck {
        successor: Option<BlockId>,
        return_label: Label,
    },
    /// Type-checked object array store via the runtime helper.
    ArraySet,
}

/// One out-of-line fragment, bound to its originating instruction.
#[derive(Debug)]
pub(crate) struct SlowPath {
    pub(crate) kind: SlowPathKind,
    pub(crate) iidx: InstId,
    pub(crate) entry: Label,
    pub(crate) exit: Label,
}

impl SlowPath {
    /// A fatal path never resumes: no live-register save/restore, no exit
    /// branch.
    fn is_fatal(&self) -> bool {
        match &self.kind {
            SlowPathKind::NullCheck
            | SlowPathKind::BoundsCheck
            | SlowPathKind::DivZeroCheck
            | SlowPathKind::Deoptimize => true,
            SlowPathKind::TypeCheck { is_fatal } => *is_fatal,
            SlowPathKind::LoadClass { .. }
            | SlowPathKind::SuspendCheck { .. }
            | SlowPathKind::ArraySet => false,
        }
    }
}

/// Save the live caller-save registers into the frame's slow-path area,
/// lowest register at the lowest slot.
fn save_live_registers(cg: &mut CodeGenerator<'_>, locs: &LocationSummary) {
    let spills = locs.slow_path_spills();
    let mut off = cg.frame.first_slow_path_slot;
    for i in 0..16u8 {
        if spills.core & (1 << i) != 0 {
            cg.asm.str_(crate::location::CoreReg(i), SP, off);
            off += 4;
        }
    }
    for i in 0..32u8 {
        if spills.fpu & (1 << i) != 0 {
            cg.asm.vstr_s(SReg(i), SP, off);
            off += 4;
        }
    }
}

/// Exact mirror of [save_live_registers]: same set, same slots.
fn restore_live_registers(cg: &mut CodeGenerator<'_>, locs: &LocationSummary) {
    let spills = locs.slow_path_spills();
    let mut off = cg.frame.first_slow_path_slot;
    for i in 0..16u8 {
        if spills.core & (1 << i) != 0 {
            cg.asm.ldr(crate::location::CoreReg(i), SP, off);
            off += 4;
        }
    }
    for i in 0..32u8 {
        if spills.fpu & (1 << i) != 0 {
            cg.asm.vldr_s(SReg(i), SP, off);
            off += 4;
        }
    }
}

/// Marshal `srcs` into the first runtime argument registers as one parallel
/// move (the sources may themselves sit in argument registers).
fn marshal_args(cg: &mut CodeGenerator<'_>, srcs: &[(Location, Ty)]) {
    let moves: Vec<MoveOp> = srcs
        .iter()
        .enumerate()
        .map(|(i, (src, ty))| MoveOp {
            src: *src,
            dst: Location::Register(RUNTIME_ARG_REGS[i]),
            ty: *ty,
        })
        .collect();
    ParallelMoveResolver::new(&mut cg.asm).resolve(&moves);
}

/// Emit one slow path. Single dispatch point over the variant type.
pub(crate) fn emit(cg: &mut CodeGenerator<'_>, sp: &SlowPath) {
    let locs = cg.locs_of(sp.iidx).clone();
    let dex_pc = cg.dex_pc(sp.iidx);
    let fatal = sp.is_fatal();

    cg.asm.comment(format!("slow path: {:?} for {}", sp.kind, sp.iidx));
    cg.asm.bind(sp.entry);
    if !fatal {
        save_live_registers(cg, &locs);
    }

    match &sp.kind {
        SlowPathKind::NullCheck => {
            cg.invoke_runtime(Entrypoint::ThrowNullPointer, dex_pc, &locs);
        }
        SlowPathKind::BoundsCheck => {
            // Index and length could sit in each other's target registers.
            marshal_args(
                cg,
                &[(locs.in_at(0), Ty::Int), (locs.in_at(1), Ty::Int)],
            );
            cg.invoke_runtime(Entrypoint::ThrowArrayBounds, dex_pc, &locs);
        }
        SlowPathKind::DivZeroCheck => {
            cg.invoke_runtime(Entrypoint::ThrowDivZero, dex_pc, &locs);
        }
        SlowPathKind::TypeCheck { .. } => {
            marshal_args(
                cg,
                &[(locs.in_at(0), Ty::Ref), (locs.in_at(1), Ty::Ref)],
            );
            if matches!(cg.m.inst(sp.iidx), Inst::InstanceOf { .. }) {
                cg.invoke_runtime(Entrypoint::InstanceofNonTrivial, dex_pc, &locs);
                cg.move32(locs.out(), Location::Register(R0));
            } else {
                cg.invoke_runtime(Entrypoint::CheckInstanceOf, dex_pc, &locs);
            }
        }
        SlowPathKind::LoadClass { type_idx, do_init } => {
            cg.asm.mov_imm(RUNTIME_ARG_REGS[0], *type_idx as i32);
            let ep = if *do_init {
                Entrypoint::InitializeStaticStorage
            } else {
                Entrypoint::InitializeType
            };
            cg.invoke_runtime(ep, dex_pc, &locs);
            // The resolved class comes back in r0; put it where the main
            // path expects it. The allocator never assigns the output a
            // register this path is about to restore.
            cg.move32(locs.out(), Location::Register(R0));
        }
        SlowPathKind::Deoptimize => {
            cg.invoke_runtime(Entrypoint::Deoptimize, dex_pc, &locs);
        }
        SlowPathKind::SuspendCheck { .. } => {
            cg.invoke_runtime(Entrypoint::TestSuspend, dex_pc, &locs);
        }
        SlowPathKind::ArraySet => {
            marshal_args(
                cg,
                &[
                    (locs.in_at(0), Ty::Ref),
                    (locs.in_at(1), Ty::Int),
                    (locs.in_at(2), Ty::Ref),
                ],
            );
            cg.invoke_runtime(Entrypoint::AputObject, dex_pc, &locs);
        }
    }

    if !fatal {
        restore_live_registers(cg, &locs);
    }

    match &sp.kind {
        SlowPathKind::SuspendCheck {
            successor,
            return_label,
        } => match successor {
            Some(b) => {
                let l = cg.block_label(*b);
                cg.asm.b(l);
            }
            None => cg.asm.b(*return_label),
        },
        _ if !fatal => cg.asm.b(sp.exit),
        _ => (),
    }
}
