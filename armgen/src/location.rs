//! Storage locations for values, and per-instruction location summaries.
//!
//! A [Location] says where one value lives at one program point: a core
//! register, an even/odd core register pair, a single-precision FPU register,
//! an FPU register pair (one double-precision register), a stack slot, or a
//! constant. Where a contiguous pair is required, the pair layout invariant
//! (`low` even, `high == low + 1`) is validated at construction rather than
//! re-checked at every use site.
//!
//! A [LocationSummary] carries the full input/output/temporary assignment for
//! one IR instruction. It is created by the location builder, which only
//! states *constraints* ([Requirement]s); an external register allocator then
//! fills in concrete [Location]s and the live-register set, after which the
//! summary is treated as immutable by the code generator.

use crate::ir::ConstVal;
use smallvec::SmallVec;
use static_assertions::const_assert;
use std::fmt;

/// A core (general purpose) register, `r0`..`r15`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreReg(pub u8);

/// A single-precision FPU register, `s0`..`s31`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SReg(pub u8);

pub const R0: CoreReg = CoreReg(0);
pub const R1: CoreReg = CoreReg(1);
pub const R2: CoreReg = CoreReg(2);
pub const R3: CoreReg = CoreReg(3);
pub const R4: CoreReg = CoreReg(4);
pub const R5: CoreReg = CoreReg(5);
pub const R6: CoreReg = CoreReg(6);
pub const R7: CoreReg = CoreReg(7);
pub const R8: CoreReg = CoreReg(8);
pub const R10: CoreReg = CoreReg(10);
pub const R11: CoreReg = CoreReg(11);
/// The intra-procedure scratch register. Never allocatable; owned by the
/// assembler's scratch pool.
pub const IP: CoreReg = CoreReg(12);
pub const SP: CoreReg = CoreReg(13);
/// The return-address register. Always part of the core spill mask so that
/// every frame remains walkable.
pub const LR: CoreReg = CoreReg(14);
pub const PC: CoreReg = CoreReg(15);
/// The thread register, holding the pointer to the running thread's control
/// block (entrypoint table, suspend flags, card table base).
pub const TR: CoreReg = CoreReg(9);
/// On entry, the register holding the pointer to the current method.
pub const METHOD_REG: CoreReg = R0;

pub const NUM_CORE_REGS: usize = 16;
pub const NUM_S_REGS: usize = 32;

impl fmt::Display for CoreReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            9 => write!(f, "tr"),
            12 => write!(f, "ip"),
            13 => write!(f, "sp"),
            14 => write!(f, "lr"),
            15 => write!(f, "pc"),
            n => write!(f, "r{n}"),
        }
    }
}

impl fmt::Display for SReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl SReg {
    /// The double-precision register this S register overlaps, i.e. `d(n/2)`.
    /// Only meaningful for the low half of an FPU pair.
    pub fn dreg(&self) -> u8 {
        self.0 / 2
    }
}

/// Where is a value stored?
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Location {
    /// A single core register.
    Register(CoreReg),
    /// An even/odd core register pair holding a 64-bit value: `low` holds
    /// bits 0..32, `high` bits 32..64.
    RegisterPair { low: CoreReg, high: CoreReg },
    /// A single-precision FPU register.
    FpuRegister(SReg),
    /// An even/odd S register pair, i.e. one D register.
    FpuRegisterPair { low: SReg, high: SReg },
    /// A 32-bit spill slot, as a byte offset from the stack pointer.
    StackSlot(i32),
    /// A 64-bit spill slot, as a byte offset from the stack pointer.
    DoubleStackSlot(i32),
    /// A constant that was never materialized.
    Constant(ConstVal),
}

impl Location {
    /// Create a core register pair, validating the pair layout invariant.
    pub fn pair(low: CoreReg, high: CoreReg) -> Self {
        assert!(
            low.0 % 2 == 0 && high.0 == low.0 + 1,
            "invalid core pair layout: {low}, {high}"
        );
        Location::RegisterPair { low, high }
    }

    /// Create an FPU register pair, validating the pair layout invariant.
    pub fn fpu_pair(low: SReg, high: SReg) -> Self {
        assert!(
            low.0 % 2 == 0 && high.0 == low.0 + 1,
            "invalid fpu pair layout: {low}, {high}"
        );
        Location::FpuRegisterPair { low, high }
    }

    pub fn is_register(&self) -> bool {
        matches!(self, Location::Register(_))
    }

    pub fn is_register_pair(&self) -> bool {
        matches!(self, Location::RegisterPair { .. })
    }

    pub fn is_fpu_register(&self) -> bool {
        matches!(self, Location::FpuRegister(_))
    }

    pub fn is_fpu_register_pair(&self) -> bool {
        matches!(self, Location::FpuRegisterPair { .. })
    }

    pub fn is_stack_slot(&self) -> bool {
        matches!(self, Location::StackSlot(_))
    }

    pub fn is_double_stack_slot(&self) -> bool {
        matches!(self, Location::DoubleStackSlot(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Location::Constant(_))
    }

    /// The core register of a `Register` location. Anything else is an
    /// internal compiler error.
    pub fn reg(&self) -> CoreReg {
        match self {
            Location::Register(r) => *r,
            _ => panic!("expected core register, got {self}"),
        }
    }

    pub fn low_reg(&self) -> CoreReg {
        match self {
            Location::RegisterPair { low, .. } => *low,
            _ => panic!("expected core register pair, got {self}"),
        }
    }

    pub fn high_reg(&self) -> CoreReg {
        match self {
            Location::RegisterPair { high, .. } => *high,
            _ => panic!("expected core register pair, got {self}"),
        }
    }

    pub fn sreg(&self) -> SReg {
        match self {
            Location::FpuRegister(s) => *s,
            _ => panic!("expected fpu register, got {self}"),
        }
    }

    pub fn low_sreg(&self) -> SReg {
        match self {
            Location::FpuRegisterPair { low, .. } => *low,
            _ => panic!("expected fpu register pair, got {self}"),
        }
    }

    pub fn high_sreg(&self) -> SReg {
        match self {
            Location::FpuRegisterPair { high, .. } => *high,
            _ => panic!("expected fpu register pair, got {self}"),
        }
    }

    /// The stack offset of a stack slot location (single or double).
    pub fn stack_offset(&self) -> i32 {
        match self {
            Location::StackSlot(off) | Location::DoubleStackSlot(off) => *off,
            _ => panic!("expected stack slot, got {self}"),
        }
    }

    /// The stack offset of the high word of a double stack slot.
    pub fn high_stack_offset(&self) -> i32 {
        match self {
            Location::DoubleStackSlot(off) => *off + 4,
            _ => panic!("expected double stack slot, got {self}"),
        }
    }

    pub fn constant(&self) -> ConstVal {
        match self {
            Location::Constant(c) => *c,
            _ => panic!("expected constant, got {self}"),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(r) => write!(f, "{r}"),
            Location::RegisterPair { low, high } => write!(f, "{low}:{high}"),
            Location::FpuRegister(s) => write!(f, "{s}"),
            Location::FpuRegisterPair { low, .. } => write!(f, "d{}", low.dreg()),
            Location::StackSlot(off) => write!(f, "[sp, #{off}]"),
            Location::DoubleStackSlot(off) => write!(f, "[sp, #{off}]:2"),
            Location::Constant(c) => write!(f, "#{c}"),
        }
    }
}

/// A set of core and FPU registers, as bit masks over register numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegisterSet {
    pub core: u16,
    pub fpu: u32,
}

// The masks must be able to carry every register number.
const_assert!(NUM_CORE_REGS <= 16);
const_assert!(NUM_S_REGS <= 32);

impl RegisterSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add(&mut self, loc: Location) {
        match loc {
            Location::Register(r) => self.core |= 1 << r.0,
            Location::RegisterPair { low, high } => {
                self.core |= (1 << low.0) | (1 << high.0);
            }
            Location::FpuRegister(s) => self.fpu |= 1 << s.0,
            Location::FpuRegisterPair { low, high } => {
                self.fpu |= (1 << low.0) | (1 << high.0);
            }
            _ => panic!("cannot add non-register location {loc} to register set"),
        }
    }

    pub fn contains_core(&self, r: CoreReg) -> bool {
        self.core & (1 << r.0) != 0
    }

    pub fn contains_fpu(&self, s: SReg) -> bool {
        self.fpu & (1 << s.0) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.core == 0 && self.fpu == 0
    }
}

/// What kind of calls can an instruction make during execution?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Never calls out of the generated code.
    NoCall,
    /// Conditionally calls the runtime, through a slow path.
    CallOnSlowPath,
    /// Always calls into the runtime on the main path.
    CallOnMainOnly,
}

/// An operand constraint, stated by the location builder before register
/// allocation has run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Requirement {
    /// Any core register (a pair for wide values).
    Register,
    /// Any FPU register (a pair for wide values).
    FpuRegister,
    /// A core register, or the constant left unmaterialized if the input is
    /// a constant the target instruction can encode.
    RegisterOrConstant,
    /// Anywhere: register or stack slot.
    Any,
    /// The same location as the first input (pass-through outputs of the
    /// check instructions).
    SameAsFirstInput,
    /// Exactly this location (calling-convention-fixed registers, constants).
    Fixed(Location),
}

/// May the output share storage with an input?
///
/// `Overlap` is required whenever an operation's intermediate state would
/// corrupt a still-needed input (long multiply, borrow-chain subtraction, an
/// instance-of using its output as scratch).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputOverlap {
    NoOverlap,
    Overlap,
}

/// One constrained, later concretely-assigned, operand slot.
#[derive(Clone, Debug)]
struct Slot {
    requirement: Requirement,
    location: Option<Location>,
}

impl Slot {
    fn new(requirement: Requirement) -> Self {
        // Fixed requirements are concrete from the start; the allocator must
        // leave them untouched.
        let location = match requirement {
            Requirement::Fixed(loc) => Some(loc),
            _ => None,
        };
        Slot {
            requirement,
            location,
        }
    }
}

/// The full input/output/temporary location assignment for one instruction,
/// plus its call kind and (post-allocation) live-register set.
#[derive(Clone, Debug)]
pub struct LocationSummary {
    call_kind: CallKind,
    inputs: SmallVec<[Slot; 3]>,
    temps: SmallVec<[Slot; 2]>,
    output: Option<(Slot, OutputOverlap)>,
    /// Registers live across this instruction, excluding its own output.
    /// Filled in by the external register allocator; what a slow path saves.
    live_registers: RegisterSet,
}

impl LocationSummary {
    pub fn new(call_kind: CallKind) -> Self {
        LocationSummary {
            call_kind,
            inputs: SmallVec::new(),
            temps: SmallVec::new(),
            output: None,
            live_registers: RegisterSet::empty(),
        }
    }

    pub fn call_kind(&self) -> CallKind {
        self.call_kind
    }

    /// State the constraint for input `at`. Inputs must be declared in order.
    pub fn set_in(&mut self, at: usize, req: Requirement) {
        assert_eq!(self.inputs.len(), at, "inputs must be declared in order");
        self.inputs.push(Slot::new(req));
    }

    pub fn set_out(&mut self, req: Requirement, overlap: OutputOverlap) {
        assert!(self.output.is_none(), "output declared twice");
        self.output = Some((Slot::new(req), overlap));
    }

    pub fn add_temp(&mut self, req: Requirement) {
        self.temps.push(Slot::new(req));
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_temps(&self) -> usize {
        self.temps.len()
    }

    pub fn in_requirement(&self, at: usize) -> Requirement {
        self.inputs[at].requirement
    }

    pub fn out_requirement(&self) -> Option<(Requirement, OutputOverlap)> {
        self.output
            .as_ref()
            .map(|(slot, overlap)| (slot.requirement, *overlap))
    }

    pub fn temp_requirement(&self, at: usize) -> Requirement {
        self.temps[at].requirement
    }

    /// Fill in a concrete location for input `at`. Called by the external
    /// register allocator only.
    pub fn fill_in(&mut self, at: usize, loc: Location) {
        self.inputs[at].location = Some(loc);
    }

    pub fn fill_out(&mut self, loc: Location) {
        self.output
            .as_mut()
            .expect("no output declared")
            .0
            .location = Some(loc);
    }

    pub fn fill_temp(&mut self, at: usize, loc: Location) {
        self.temps[at].location = Some(loc);
    }

    pub fn set_live_registers(&mut self, live: RegisterSet) {
        self.live_registers = live;
    }

    /// The concrete location of input `at`. A missing assignment is an
    /// internal compiler error.
    pub fn in_at(&self, at: usize) -> Location {
        self.inputs[at]
            .location
            .unwrap_or_else(|| panic!("input {at} has no assigned location"))
    }

    pub fn out(&self) -> Location {
        self.output
            .as_ref()
            .expect("no output declared")
            .0
            .location
            .expect("output has no assigned location")
    }

    pub fn temp(&self, at: usize) -> Location {
        self.temps[at]
            .location
            .unwrap_or_else(|| panic!("temp {at} has no assigned location"))
    }

    pub fn live_registers(&self) -> RegisterSet {
        self.live_registers
    }

    /// The live registers a slow path must preserve: the caller-save subset
    /// of the live set, minus the instruction's own output.
    pub fn slow_path_spills(&self) -> RegisterSet {
        let mut spills = RegisterSet {
            core: self.live_registers.core & CALLER_SAVE_CORE,
            fpu: self.live_registers.fpu & CALLER_SAVE_FPU,
        };
        if let Some((slot, _)) = &self.output {
            if let Some(loc) = slot.location {
                match loc {
                    Location::Register(r) => spills.core &= !(1 << r.0),
                    Location::RegisterPair { low, high } => {
                        spills.core &= !((1 << low.0) | (1 << high.0))
                    }
                    Location::FpuRegister(s) => spills.fpu &= !(1 << s.0),
                    Location::FpuRegisterPair { low, high } => {
                        spills.fpu &= !((1 << low.0) | (1 << high.0))
                    }
                    _ => (),
                }
            }
        }
        spills
    }
}

/// Caller-save core registers under both calling conventions: `r0`-`r3`.
pub const CALLER_SAVE_CORE: u16 = 0b1111;
/// Caller-save FPU registers: `s0`-`s15`.
pub const CALLER_SAVE_FPU: u32 = 0xffff;

/// Callee-save core registers: `r5`-`r8`, `r10`, `r11`, `lr`.
pub const CORE_CALLEE_SAVES: u16 =
    (1 << 5) | (1 << 6) | (1 << 7) | (1 << 8) | (1 << 10) | (1 << 11) | (1 << 14);
/// Callee-save FPU registers: `s16`-`s31`.
pub const FPU_CALLEE_SAVES: u32 = 0xffff_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_layout_is_validated() {
        let l = Location::pair(R4, CoreReg(5));
        assert_eq!(l.low_reg(), R4);
        assert_eq!(l.high_reg(), CoreReg(5));
        assert!(std::panic::catch_unwind(|| Location::pair(CoreReg(5), CoreReg(6))).is_err());
        assert!(std::panic::catch_unwind(|| Location::pair(R4, R6)).is_err());
        assert!(std::panic::catch_unwind(|| Location::fpu_pair(SReg(1), SReg(2))).is_err());
    }

    #[test]
    fn register_set_masks() {
        let mut s = RegisterSet::empty();
        s.add(Location::Register(R0));
        s.add(Location::pair(R2, R3));
        s.add(Location::FpuRegister(SReg(1)));
        assert!(s.contains_core(R0));
        assert!(s.contains_core(R2) && s.contains_core(R3));
        assert!(!s.contains_core(R1));
        assert!(s.contains_fpu(SReg(1)));
    }

    #[test]
    fn slow_path_spills_exclude_output() {
        let mut summary = LocationSummary::new(CallKind::CallOnSlowPath);
        summary.set_out(Requirement::Register, OutputOverlap::Overlap);
        summary.fill_out(Location::Register(R0));
        let mut live = RegisterSet::empty();
        live.add(Location::Register(R0));
        live.add(Location::Register(R1));
        live.add(Location::Register(R5)); // callee-save: not a slow-path spill
        summary.set_live_registers(live);
        let spills = summary.slow_path_spills();
        assert!(!spills.contains_core(R0));
        assert!(spills.contains_core(R1));
        assert!(!spills.contains_core(R5));
    }

    #[test]
    fn lr_is_always_a_callee_save() {
        assert_ne!(CORE_CALLEE_SAVES & (1 << LR.0), 0);
    }
}
