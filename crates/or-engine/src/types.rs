//! Engine-facing value types and constants

use bitflags::bitflags;
use or_core::error::EngineResult;
use or_core::{AccessKind, EngineError};
use std::fmt;
use std::ops::Range;

/// API version announced to the engine at startup
pub const API_VERSION: i32 = 0x020102;

/// Width in bytes of every watchpoint the controller installs
pub const BREAKPOINT_WIDTH: u32 = 4;

/// Breakpoint index reported when a single step completes
pub const STEP_SENTINEL: i32 = -1;

/// Size of the engine's save-RAM image: EEPROM, four controller packs,
/// FlashRAM and SRAM.
pub const SAVE_RAM_SIZE: usize = 0x800 + 4 * 0x8000 + 0x20000 + 0x8000;

/// Debugger run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum RunState {
    /// Halted until resumed or stepped
    #[default]
    Paused = 0,
    /// Executing one instruction per step command
    Stepping = 1,
    /// Free running
    Running = 2,
}

impl RunState {
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Paused),
            1 => Some(Self::Stepping),
            2 => Some(Self::Running),
            _ => None,
        }
    }
}

bitflags! {
    /// Breakpoint flag set as understood by the engine
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BreakpointFlags: u32 {
        const ENABLED = 0x01;
        const READ = 0x02;
        const WRITE = 0x04;
        const EXEC = 0x08;
        /// Log to the engine console on hit
        const LOG = 0x10;
    }
}

impl BreakpointFlags {
    /// Flag matching an access kind
    pub fn for_access(kind: AccessKind) -> Self {
        match kind {
            AccessKind::Read => Self::READ,
            AccessKind::Write => Self::WRITE,
            AccessKind::Execute => Self::EXEC,
        }
    }

    /// Access kind of a triggered-by report. Read wins over write; anything
    /// else is treated as execute.
    pub fn access_kind(self) -> AccessKind {
        if self.contains(Self::READ) {
            AccessKind::Read
        } else if self.contains(Self::WRITE) {
            AccessKind::Write
        } else {
            AccessKind::Execute
        }
    }
}

/// Address-range watchpoint, `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub start: u32,
    pub end: u32,
    pub flags: BreakpointFlags,
}

impl Breakpoint {
    /// Enabled watchpoint covering `[address, address + 3]`
    pub fn watch(kind: AccessKind, address: u32) -> Self {
        Self {
            start: address,
            end: address.wrapping_add(BREAKPOINT_WIDTH - 1),
            flags: BreakpointFlags::ENABLED | BreakpointFlags::for_access(kind),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(BreakpointFlags::ENABLED)
    }

    pub fn contains(&self, address: u32) -> bool {
        address >= self.start && address <= self.end
    }

    /// Whether `[address, address + size)` overlaps this range
    pub fn overlaps(&self, address: u32, size: u32) -> bool {
        let last = address.wrapping_add(size.max(1) - 1);
        address <= self.end && last >= self.start
    }
}

/// Memory region the engine exposes through its debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryRegion {
    Rdram = 1,
    PiReg,
    SiReg,
    ViReg,
    RiReg,
    AiReg,
}

impl MemoryRegion {
    pub const ALL: [MemoryRegion; 6] = [
        Self::Rdram,
        Self::PiReg,
        Self::SiReg,
        Self::ViReg,
        Self::RiReg,
        Self::AiReg,
    ];

    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rdram => "RDRAM",
            Self::PiReg => "PI_REG",
            Self::SiReg => "SI_REG",
            Self::ViReg => "VI_REG",
            Self::RiReg => "RI_REG",
            Self::AiReg => "AI_REG",
        }
    }

    /// Byte range of a `len`-byte access at `offset` in a region of `size`
    /// bytes
    pub fn checked_range(
        self,
        size: usize,
        offset: usize,
        len: usize,
    ) -> EngineResult<Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(offset..end),
            _ => Err(EngineError::RegionBounds {
                region: self.name(),
                offset,
                len,
                size,
            }),
        }
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Core parameter carried by a state-change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreParam {
    EmuState = 1,
    VideoMode,
    SavestateSlot,
    SpeedFactor,
    SpeedLimiter,
    VideoSize,
    AudioVolume,
    AudioMute,
    InputGameshark,
    StateLoadComplete,
    StateSaveComplete,
}

impl CoreParam {
    pub fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::EmuState,
            2 => Self::VideoMode,
            3 => Self::SavestateSlot,
            4 => Self::SpeedFactor,
            5 => Self::SpeedLimiter,
            6 => Self::VideoSize,
            7 => Self::AudioVolume,
            8 => Self::AudioMute,
            9 => Self::InputGameshark,
            10 => Self::StateLoadComplete,
            11 => Self::StateSaveComplete,
            _ => return None,
        })
    }
}

/// Emulator state reported with [`CoreParam::EmuState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    Stopped = 1,
    Running = 2,
    Paused = 3,
}

impl EmuState {
    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Stopped),
            2 => Some(Self::Running),
            3 => Some(Self::Paused),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_range_checks() {
        assert_eq!(MemoryRegion::Rdram.checked_range(0x10, 4, 4).unwrap(), 4..8);
        assert_eq!(MemoryRegion::Rdram.checked_range(0x10, 0x10, 0).unwrap(), 0x10..0x10);
        assert!(matches!(
            MemoryRegion::ViReg.checked_range(0x10, 0xE, 4),
            Err(EngineError::RegionBounds { region: "VI_REG", size: 0x10, .. })
        ));
        assert!(MemoryRegion::AiReg.checked_range(0x10, usize::MAX, 2).is_err());
        assert_eq!(MemoryRegion::ALL.map(MemoryRegion::raw), [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_watch_range_is_four_bytes() {
        let bp = Breakpoint::watch(AccessKind::Write, 0x8000_0100);
        assert_eq!(bp.start, 0x8000_0100);
        assert_eq!(bp.end, 0x8000_0103);
        assert!(bp.is_enabled());
        assert!(bp.flags.contains(BreakpointFlags::WRITE));
        assert!(!bp.flags.contains(BreakpointFlags::READ));
        assert!(bp.contains(0x8000_0103));
        assert!(!bp.contains(0x8000_0104));
    }

    #[test]
    fn test_overlap() {
        let bp = Breakpoint::watch(AccessKind::Read, 0x100);
        assert!(bp.overlaps(0x100, 4));
        assert!(bp.overlaps(0xFE, 4));
        assert!(!bp.overlaps(0xF0, 4));
        assert!(!bp.overlaps(0x104, 4));
    }

    #[test]
    fn test_triggered_flags_precedence() {
        let both = BreakpointFlags::READ | BreakpointFlags::WRITE;
        assert_eq!(both.access_kind(), AccessKind::Read);
        assert_eq!(BreakpointFlags::WRITE.access_kind(), AccessKind::Write);
        assert_eq!(BreakpointFlags::EXEC.access_kind(), AccessKind::Execute);
        assert_eq!(BreakpointFlags::empty().access_kind(), AccessKind::Execute);
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(RunState::Running.raw(), 2);
        assert_eq!(RunState::from_raw(1), Some(RunState::Stepping));
        assert_eq!(RunState::from_raw(7), None);
        assert_eq!(CoreParam::from_raw(11), Some(CoreParam::StateSaveComplete));
        assert_eq!(CoreParam::from_raw(0), None);
        assert_eq!(EmuState::from_raw(2), Some(EmuState::Running));
    }

    #[test]
    fn test_save_ram_size() {
        assert_eq!(SAVE_RAM_SIZE, 0x800 + 0x20000 + 0x20000 + 0x8000);
    }
}
