//! PC-info (stack map) recording.
//!
//! Every call site in generated code that may throw, deoptimize, or act as a
//! GC/debugger safepoint records an entry mapping the native return address
//! back to a source program counter, the live-register mask at that point,
//! and (when the site can throw into a handler in the same method) the catch
//! target block. The entries are part of the backend's output; exception
//! delivery and GC root scanning consume them externally.

use crate::{ir::BlockId, location::RegisterSet};

/// One PC-info entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PcInfo {
    /// Byte offset of the instruction after the recording site (the native
    /// return address, relative to the method's code start).
    pub native_offset: u32,
    /// The source (dex) program counter of the originating instruction.
    pub dex_pc: u32,
    /// Registers holding live values at this point.
    pub live_registers: RegisterSet,
    /// The handler block, if the site can throw into a catch in this method.
    pub catch_target: Option<BlockId>,
}

/// Collects [PcInfo] entries for one method, in emission order.
#[derive(Debug, Default)]
pub struct StackMapStream {
    entries: Vec<PcInfo>,
}

impl StackMapStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        native_offset: u32,
        dex_pc: u32,
        live_registers: RegisterSet,
        catch_target: Option<BlockId>,
    ) {
        // Emission is strictly sequential, so offsets arrive in order. Two
        // entries may share an offset only if one of them is dead code.
        debug_assert!(
            self.entries
                .last()
                .map_or(true, |e| e.native_offset <= native_offset),
            "PC info recorded out of order"
        );
        self.entries.push(PcInfo {
            native_offset,
            dex_pc,
            live_registers,
            catch_target,
        });
    }

    pub fn entries(&self) -> &[PcInfo] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<PcInfo> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_order() {
        let mut s = StackMapStream::new();
        s.record(4, 1, RegisterSet::empty(), None);
        s.record(12, 3, RegisterSet::empty(), Some(BlockId::from(2usize)));
        assert_eq!(s.entries().len(), 2);
        assert_eq!(s.entries()[1].native_offset, 12);
        assert_eq!(s.entries()[1].catch_target, Some(BlockId::from(2usize)));
    }
}
