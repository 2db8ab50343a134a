//! A minimal stand-in for the external register allocator, used by tests.
//!
//! Real compilations get their [LocationTable] completed by the register
//! allocator that runs between the two backend passes. Tests need the same
//! contract filled mechanically: every non-fixed constraint gets a concrete
//! location, inputs resolve to their producer's output location, and values
//! live forever (no reuse), which keeps the mapping trivially correct for
//! the small graphs tests build.

use super::{AllocationResult, LocationTable};
use crate::{
    ir::{Inst, InstId, Method, Ty},
    location::{CoreReg, Location, Requirement, SReg},
};
use smallvec::SmallVec;

/// Allocatable core registers: the callee-saves the backend reports in its
/// spill mask (`lr` excluded, naturally).
const POOL_CORE: [u8; 7] = [4, 5, 6, 7, 8, 10, 11];

struct Pools {
    core_free: u16,
    fpu_free: u32,
    used_core: u16,
    used_fpu: u32,
}

impl Pools {
    fn new() -> Self {
        let mut core_free = 0u16;
        for r in POOL_CORE {
            core_free |= 1 << r;
        }
        Pools {
            core_free,
            // s16-s31.
            fpu_free: 0xffff_0000,
            used_core: 0,
            used_fpu: 0,
        }
    }

    fn take_core(&mut self) -> CoreReg {
        let n = self.core_free.trailing_zeros();
        assert!(n < 16, "test allocator ran out of core registers");
        self.core_free &= !(1 << n);
        self.used_core |= 1 << n;
        CoreReg(n as u8)
    }

    fn take_core_pair(&mut self) -> Location {
        for n in (0..16).step_by(2) {
            let pair = 0b11 << n;
            if self.core_free & pair == pair {
                self.core_free &= !pair;
                self.used_core |= pair;
                return Location::pair(CoreReg(n), CoreReg(n + 1));
            }
        }
        panic!("test allocator ran out of core register pairs");
    }

    fn take_fpu(&mut self) -> SReg {
        let n = self.fpu_free.trailing_zeros();
        assert!(n < 32, "test allocator ran out of fpu registers");
        self.fpu_free &= !(1 << n);
        self.used_fpu |= 1 << n;
        SReg(n as u8)
    }

    fn take_fpu_pair(&mut self) -> Location {
        for n in (0..32u32).step_by(2) {
            let pair = 0b11 << n;
            if self.fpu_free & pair == pair {
                self.fpu_free &= !pair;
                self.used_fpu |= pair;
                return Location::fpu_pair(SReg(n as u8), SReg(n as u8 + 1));
            }
        }
        panic!("test allocator ran out of fpu register pairs");
    }

    fn fresh(&mut self, req: Requirement, ty: Option<Ty>) -> Location {
        match req {
            Requirement::FpuRegister => match ty {
                Some(t) if t.is_wide() => self.take_fpu_pair(),
                _ => Location::FpuRegister(self.take_fpu()),
            },
            _ => match ty {
                Some(t) if t.is_wide() && !t.is_fp() => self.take_core_pair(),
                Some(t) if t.is_wide() => self.take_fpu_pair(),
                Some(t) if t.is_fp() => Location::FpuRegister(self.take_fpu()),
                _ => Location::Register(self.take_core()),
            },
        }
    }
}

/// The inputs of an instruction, in the order the location builder declares
/// them.
fn inputs_of(inst: &Inst) -> SmallVec<[InstId; 4]> {
    let mut v = SmallVec::new();
    match inst {
        Inst::Constant(_)
        | Inst::Param { .. }
        | Inst::CurrentMethod
        | Inst::LoadString { .. }
        | Inst::SuspendCheck
        | Inst::ParallelMove { .. } => (),
        Inst::BinOp { lhs, rhs, .. }
        | Inst::Div { lhs, rhs, .. }
        | Inst::Rem { lhs, rhs, .. }
        | Inst::Compare { lhs, rhs, .. }
        | Inst::Condition { lhs, rhs, .. } => {
            v.push(*lhs);
            v.push(*rhs);
        }
        Inst::Neg { value, .. }
        | Inst::Not { value, .. }
        | Inst::BoolNot { value }
        | Inst::Conversion { value, .. }
        | Inst::DivZeroCheck { value, .. }
        | Inst::Deoptimize { cond: value }
        | Inst::PackedSwitch { value, .. } => v.push(*value),
        Inst::Shift { value, amount, .. } | Inst::Ror { value, amount, .. } => {
            v.push(*value);
            v.push(*amount);
        }
        Inst::NullCheck { obj } | Inst::MonitorOp { obj, .. } => v.push(*obj),
        Inst::BoundsCheck { index, length } => {
            v.push(*index);
            v.push(*length);
        }
        Inst::ArrayLength { array } => v.push(*array),
        Inst::ArrayGet { array, index, .. } => {
            v.push(*array);
            v.push(*index);
        }
        Inst::ArraySet {
            array, index, value, ..
        } => {
            v.push(*array);
            v.push(*index);
            v.push(*value);
        }
        Inst::FieldGet { base, .. } => v.push(*base),
        Inst::FieldSet { base, value, .. } => {
            v.push(*base);
            v.push(*value);
        }
        Inst::InstanceOf { obj, class, .. } | Inst::CheckCast { obj, class, .. } => {
            v.push(*obj);
            v.push(*class);
        }
        Inst::LoadClass { method, .. } | Inst::NewInstance { method, .. } => v.push(*method),
        Inst::NewArray { length, method, .. } => {
            v.push(*length);
            v.push(*method);
        }
        Inst::Invoke {
            kind, args, method, ..
        } => {
            v.extend(args.iter().copied());
            if matches!(
                kind,
                crate::ir::InvokeKind::Static | crate::ir::InvokeKind::Direct
            ) {
                v.push(*method);
            }
        }
    }
    v
}

/// Complete `locs` in place and report what was used.
pub(crate) fn allocate(m: &Method, locs: &mut LocationTable) -> AllocationResult {
    let mut pools = Pools::new();
    for iidx in (0..m.num_insts()).map(InstId::from) {
        let inst = m.inst(iidx).clone();
        let inputs = inputs_of(&inst);
        if locs[iidx].is_none() {
            continue;
        }
        let num_inputs = locs[iidx].as_ref().unwrap().num_inputs();
        // Inputs resolve to their producer's output location.
        let producer_locs: Vec<Location> = inputs
            .iter()
            .take(num_inputs)
            .map(|src| locs_out(locs, *src))
            .collect();
        let summary = locs[iidx].as_mut().unwrap();
        for (i, ploc) in producer_locs.iter().enumerate() {
            match summary.in_requirement(i) {
                Requirement::Fixed(_) => (),
                Requirement::Register
                | Requirement::FpuRegister
                | Requirement::RegisterOrConstant
                | Requirement::Any => {
                    if ploc.is_constant() {
                        // A constant reaching a register constraint would be
                        // materialized by the real allocator; hand out a
                        // register (tests arrange for its value separately).
                        let ty = m.result_ty(inputs[i]);
                        let fresh = pools.fresh(summary.in_requirement(i), ty);
                        summary.fill_in(i, fresh);
                    } else {
                        summary.fill_in(i, *ploc);
                    }
                }
                Requirement::SameAsFirstInput => panic!("input constrained to itself"),
            }
        }
        for t in 0..summary.num_temps() {
            match summary.temp_requirement(t) {
                Requirement::Fixed(_) => (),
                Requirement::FpuRegister => {
                    let loc = Location::FpuRegister(pools.take_fpu());
                    summary.fill_temp(t, loc);
                }
                _ => {
                    let loc = Location::Register(pools.take_core());
                    summary.fill_temp(t, loc);
                }
            }
        }
        if let Some((req, _)) = summary.out_requirement() {
            match req {
                Requirement::Fixed(_) => (),
                Requirement::SameAsFirstInput => {
                    let loc = summary.in_at(0);
                    summary.fill_out(loc);
                }
                _ => {
                    let ty = m.result_ty(iidx);
                    let loc = pools.fresh(req, ty);
                    summary.fill_out(loc);
                }
            }
        }
    }
    AllocationResult {
        allocated_core: pools.used_core,
        allocated_fpu: pools.used_fpu,
        num_spill_slots: 0,
    }
}

fn locs_out(locs: &LocationTable, iidx: InstId) -> Location {
    locs[iidx]
        .as_ref()
        .unwrap_or_else(|| panic!("input {iidx} has no summary"))
        .out()
}
