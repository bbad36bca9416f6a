//! Breakpoint table
//!
//! The engine owns the breakpoints; this is a typed view over its
//! add/remove/lookup commands using fixed 4-byte watch ranges.

use or_core::{AccessKind, Result, SessionError};
use or_engine::{Breakpoint, BreakpointFlags, Engine, BREAKPOINT_WIDTH};

/// Breakpoint commands against a live engine
pub struct BreakpointTable<'a> {
    engine: &'a dyn Engine,
}

impl<'a> BreakpointTable<'a> {
    pub fn new(engine: &'a dyn Engine) -> Self {
        Self { engine }
    }

    /// Watch `[address, address + 3]` for `kind` accesses
    pub fn set(&self, kind: AccessKind, address: u32) -> Result<u32> {
        let index = self.engine.add_breakpoint(Breakpoint::watch(kind, address))?;
        tracing::debug!("Set {} breakpoint #{} at 0x{:08x}", kind, index, address);
        Ok(index)
    }

    /// Remove the `kind` breakpoint covering `address`
    pub fn remove(&self, kind: AccessKind, address: u32) -> Result<()> {
        let index = self
            .lookup(kind, address)
            .ok_or(SessionError::BreakpointNotFound { kind, address })?;
        self.engine.remove_breakpoint(index)?;
        tracing::debug!("Removed {} breakpoint #{} at 0x{:08x}", kind, index, address);
        Ok(())
    }

    /// Index of the `kind` breakpoint covering `address`
    pub fn lookup(&self, kind: AccessKind, address: u32) -> Option<u32> {
        self.engine
            .lookup_breakpoint(address, BREAKPOINT_WIDTH, BreakpointFlags::for_access(kind))
    }

    /// Access kind and address of the most recent hit
    pub fn triggered_by(&self) -> (AccessKind, u32) {
        let (flags, address) = self.engine.breakpoint_triggered_by();
        (flags.access_kind(), address)
    }
}
