//! Parallel move resolution.
//!
//! Given an unordered batch of (source, destination) moves with
//! *simultaneous* semantics — every destination must receive the value its
//! source held before any move of the batch ran — produce an ordered
//! sequence of primitive moves and swaps. Moves whose destination blocks no
//! other pending move are emitted immediately; a chain that closes back on
//! itself is broken with a swap; constant-source moves cannot block anything
//! and are emitted last.
//!
//! Transfers between core and FPU storage reinterpret bits (`vmov`); they
//! never convert arithmetically.

use super::asm::Assembler;
use crate::{
    ir::{ConstVal, MoveOp},
    location::{CoreReg, Location, SP},
};
use smallvec::SmallVec;

#[derive(Clone)]
struct PendingMove {
    src: Location,
    dst: Location,
    pending: bool,
    eliminated: bool,
}

/// Do two locations name (partially) the same storage?
fn overlaps(a: Location, b: Location) -> bool {
    use Location::*;
    // Constants occupy no storage.
    if a.is_constant() || b.is_constant() {
        return false;
    }
    let core_mask = |l: Location| -> u16 {
        match l {
            Register(r) => 1 << r.0,
            RegisterPair { low, high } => (1 << low.0) | (1 << high.0),
            _ => 0,
        }
    };
    let fpu_mask = |l: Location| -> u32 {
        match l {
            FpuRegister(s) => 1 << s.0,
            FpuRegisterPair { low, high } => (1 << low.0) | (1 << high.0),
            _ => 0,
        }
    };
    let stack_range = |l: Location| -> Option<(i32, i32)> {
        match l {
            StackSlot(off) => Some((off, off + 4)),
            DoubleStackSlot(off) => Some((off, off + 8)),
            _ => None,
        }
    };
    if core_mask(a) & core_mask(b) != 0 {
        return true;
    }
    if fpu_mask(a) & fpu_mask(b) != 0 {
        return true;
    }
    if let (Some((a0, a1)), Some((b0, b1))) = (stack_range(a), stack_range(b)) {
        return a0 < b1 && b0 < a1;
    }
    false
}

/// Resolves one parallel move batch against an [Assembler].
pub struct ParallelMoveResolver<'a> {
    asm: &'a mut Assembler,
    moves: SmallVec<[PendingMove; 8]>,
}

impl<'a> ParallelMoveResolver<'a> {
    pub fn new(asm: &'a mut Assembler) -> Self {
        ParallelMoveResolver {
            asm,
            moves: SmallVec::new(),
        }
    }

    /// Emit code performing `moves` with simultaneous semantics.
    pub fn resolve(mut self, moves: &[MoveOp]) {
        for m in moves {
            assert!(!m.dst.is_constant(), "constant as move destination");
            // Self-moves are elided.
            if m.src == m.dst {
                continue;
            }
            self.moves.push(PendingMove {
                src: m.src,
                dst: m.dst,
                pending: false,
                eliminated: false,
            });
        }
        // Constant sources block nothing; resolving them last keeps them out
        // of every chain.
        for i in 0..self.moves.len() {
            if !self.moves[i].eliminated && !self.moves[i].src.is_constant() {
                self.perform_move(i);
            }
        }
        for i in 0..self.moves.len() {
            if !self.moves[i].eliminated {
                self.emit_move(i);
                self.moves[i].eliminated = true;
            }
        }
    }

    /// Does the unfinished move at `i` block a write to `loc`?
    fn blocks(&self, i: usize, loc: Location) -> bool {
        let m = &self.moves[i];
        !m.eliminated && overlaps(m.src, loc)
    }

    fn perform_move(&mut self, index: usize) {
        assert!(!self.moves[index].pending);
        self.moves[index].pending = true;
        let destination = self.moves[index].dst;

        // First recursively perform every move our destination would
        // clobber. A pending one is skipped: it is an ancestor of this very
        // chain, i.e. a cycle.
        for i in 0..self.moves.len() {
            if i != index && self.blocks(i, destination) && !self.moves[i].pending {
                self.perform_move(i);
            }
        }
        self.moves[index].pending = false;

        // If something still blocks the destination it must be a pending
        // ancestor: break the cycle with a swap.
        for i in 0..self.moves.len() {
            if i != index && self.blocks(i, destination) {
                assert!(self.moves[i].pending, "blocked by a non-pending move");
                self.emit_swap(index);
                let src = self.moves[index].src;
                let dst = self.moves[index].dst;
                self.moves[index].eliminated = true;
                // The swap exchanged the contents of src and dst: redirect
                // every unfinished move reading one of them.
                for j in 0..self.moves.len() {
                    if self.moves[j].eliminated {
                        continue;
                    }
                    if self.moves[j].src == src {
                        self.moves[j].src = dst;
                    } else if self.moves[j].src == dst {
                        self.moves[j].src = src;
                    } else {
                        assert!(
                            !overlaps(self.moves[j].src, src) && !overlaps(self.moves[j].src, dst),
                            "partial overlap with a swapped location"
                        );
                    }
                }
                return;
            }
        }

        self.emit_move(index);
        self.moves[index].eliminated = true;
    }

    /// Emit one primitive move.
    fn emit_move(&mut self, index: usize) {
        use Location::*;
        let src = self.moves[index].src;
        let dst = self.moves[index].dst;
        let asm = &mut *self.asm;
        match (src, dst) {
            (Register(s), Register(d)) => asm.mov(d, s),
            (Register(s), FpuRegister(d)) => asm.vmov_sr(d, s),
            (Register(s), StackSlot(off)) => asm.str_(s, SP, off),
            (StackSlot(off), Register(d)) => asm.ldr(d, SP, off),
            (StackSlot(off), FpuRegister(d)) => asm.vldr_s(d, SP, off),
            (StackSlot(soff), StackSlot(doff)) => asm.with_scratch_reg(|asm, t| {
                asm.ldr(t, SP, soff);
                asm.str_(t, SP, doff);
            }),
            (FpuRegister(s), Register(d)) => asm.vmov_rs(d, s),
            (FpuRegister(s), FpuRegister(d)) => asm.vmov_ss(d, s),
            (FpuRegister(s), StackSlot(off)) => asm.vstr_s(s, SP, off),
            (DoubleStackSlot(soff), DoubleStackSlot(doff)) => asm.with_scratch_dreg(|asm, t| {
                asm.vldr_d(t, SP, soff);
                asm.vstr_d(t, SP, doff);
            }),
            (DoubleStackSlot(off), RegisterPair { low, high }) => {
                asm.ldrd(low, high, SP, off)
            }
            (DoubleStackSlot(off), FpuRegisterPair { low, .. }) => {
                asm.vldr_d(low.dreg(), SP, off)
            }
            (RegisterPair { low, high }, RegisterPair { low: dl, high: dh }) => {
                asm.mov(dl, low);
                asm.mov(dh, high);
            }
            (RegisterPair { low, high }, FpuRegisterPair { low: dl, .. }) => {
                asm.vmov_drr(dl.dreg(), low, high)
            }
            (RegisterPair { low, high }, DoubleStackSlot(off)) => {
                asm.strd(low, high, SP, off)
            }
            (FpuRegisterPair { low, .. }, RegisterPair { low: dl, high: dh }) => {
                asm.vmov_rrd(dl, dh, low.dreg())
            }
            (FpuRegisterPair { low, .. }, FpuRegisterPair { low: dl, .. }) => {
                asm.vmov_dd(dl.dreg(), low.dreg())
            }
            (FpuRegisterPair { low, .. }, DoubleStackSlot(off)) => {
                asm.vstr_d(low.dreg(), SP, off)
            }
            (Constant(c), dst) => Self::emit_constant(asm, c, dst),
            (s, d) => panic!("unsupported move {s} -> {d}"),
        }
    }

    fn emit_constant(asm: &mut Assembler, c: ConstVal, dst: Location) {
        use Location::*;
        match c {
            ConstVal::Int(_) | ConstVal::Null | ConstVal::Float(_) if dst.is_register() => {
                asm.mov_imm(dst.reg(), c.as_word());
            }
            ConstVal::Int(_) | ConstVal::Null => match dst {
                StackSlot(off) => asm.with_scratch_reg(|asm, t| {
                    asm.mov_imm(t, c.as_word());
                    asm.str_(t, SP, off);
                }),
                d => panic!("unsupported constant move {c} -> {d}"),
            },
            ConstVal::Long(v) => match dst {
                RegisterPair { low, high } => {
                    asm.mov_imm(low, v as i32);
                    asm.mov_imm(high, (v >> 32) as i32);
                }
                DoubleStackSlot(off) => asm.with_scratch_reg(|asm, t| {
                    asm.mov_imm(t, v as i32);
                    asm.str_(t, SP, off);
                    asm.mov_imm(t, (v >> 32) as i32);
                    asm.str_(t, SP, off + 4);
                }),
                d => panic!("unsupported constant move {c} -> {d}"),
            },
            ConstVal::Float(bits) => match dst {
                FpuRegister(s) => asm.vmov_s_imm(s, bits),
                StackSlot(off) => asm.with_scratch_reg(|asm, t| {
                    asm.mov_imm(t, bits as i32);
                    asm.str_(t, SP, off);
                }),
                d => panic!("unsupported constant move {c} -> {d}"),
            },
            ConstVal::Double(bits) => match dst {
                FpuRegisterPair { low, .. } => asm.vmov_d_imm(low.dreg(), bits),
                DoubleStackSlot(off) => asm.with_scratch_reg(|asm, t| {
                    asm.mov_imm(t, bits as i32);
                    asm.str_(t, SP, off);
                    asm.mov_imm(t, (bits >> 32) as i32);
                    asm.str_(t, SP, off + 4);
                }),
                d => panic!("unsupported constant move {c} -> {d}"),
            },
        }
    }

    /// Exchange a core register with a stack slot.
    fn exchange_reg_mem(asm: &mut Assembler, reg: CoreReg, mem: i32) {
        asm.with_scratch_reg(|asm, t| {
            asm.mov(t, reg);
            asm.ldr(reg, SP, mem);
            asm.str_(t, SP, mem);
        });
    }

    /// Exchange two stack slots, through one core and one FPU scratch.
    fn exchange_mem_mem(asm: &mut Assembler, mem1: i32, mem2: i32) {
        asm.with_scratch_reg(|asm, t| {
            asm.with_scratch_sreg(|asm, ts| {
                asm.ldr(t, SP, mem1);
                asm.vldr_s(ts, SP, mem2);
                asm.str_(t, SP, mem2);
                asm.vstr_s(ts, SP, mem1);
            });
        });
    }

    /// Emit a swap of the move's source and destination.
    fn emit_swap(&mut self, index: usize) {
        use Location::*;
        let src = self.moves[index].src;
        let dst = self.moves[index].dst;
        let asm = &mut *self.asm;
        match (src, dst) {
            (Register(a), Register(b)) => asm.with_scratch_reg(|asm, t| {
                asm.mov(t, b);
                asm.mov(b, a);
                asm.mov(a, t);
            }),
            (Register(r), StackSlot(m)) | (StackSlot(m), Register(r)) => {
                Self::exchange_reg_mem(asm, r, m)
            }
            (StackSlot(m1), StackSlot(m2)) => Self::exchange_mem_mem(asm, m1, m2),
            (FpuRegister(a), FpuRegister(b)) => asm.with_scratch_sreg(|asm, t| {
                asm.vmov_ss(t, b);
                asm.vmov_ss(b, a);
                asm.vmov_ss(a, t);
            }),
            (FpuRegister(s), StackSlot(m)) | (StackSlot(m), FpuRegister(s)) => {
                asm.with_scratch_sreg(|asm, t| {
                    asm.vmov_ss(t, s);
                    asm.vldr_s(s, SP, m);
                    asm.vstr_s(t, SP, m);
                })
            }
            (
                RegisterPair { low: al, high: ah },
                RegisterPair { low: bl, high: bh },
            ) => asm.with_scratch_dreg(|asm, t| {
                asm.vmov_drr(t, al, ah);
                asm.mov(al, bl);
                asm.mov(ah, bh);
                asm.vmov_rrd(bl, bh, t);
            }),
            (RegisterPair { low, high }, DoubleStackSlot(m))
            | (DoubleStackSlot(m), RegisterPair { low, high }) => {
                asm.with_scratch_dreg(|asm, t| {
                    asm.vmov_drr(t, low, high);
                    asm.ldrd(low, high, SP, m);
                    asm.vstr_d(t, SP, m);
                })
            }
            (FpuRegisterPair { low: a, .. }, FpuRegisterPair { low: b, .. }) => {
                asm.with_scratch_dreg(|asm, t| {
                    asm.vmov_dd(t, a.dreg());
                    asm.vmov_dd(a.dreg(), b.dreg());
                    asm.vmov_dd(b.dreg(), t);
                })
            }
            (FpuRegisterPair { low, .. }, DoubleStackSlot(m))
            | (DoubleStackSlot(m), FpuRegisterPair { low, .. }) => {
                asm.with_scratch_dreg(|asm, t| {
                    asm.vmov_dd(t, low.dreg());
                    asm.vldr_d(low.dreg(), SP, m);
                    asm.vstr_d(t, SP, m);
                })
            }
            (DoubleStackSlot(m1), DoubleStackSlot(m2)) => asm.with_scratch_dregs2(|asm, t1, t2| {
                asm.vldr_d(t1, SP, m1);
                asm.vldr_d(t2, SP, m2);
                asm.vstr_d(t1, SP, m2);
                asm.vstr_d(t2, SP, m1);
            }),
            (s, d) => panic!("unsupported swap {s} <-> {d}"),
        }
    }
}
