//! AXI VDMA register map
//!
//! Offsets are byte offsets. Channel-relative offsets are added to the channel base
//! ([`MM2S_BASE`] or [`S2MM_BASE`]), bank-relative offsets to the channel's address bank.

use std::fmt;

use bitflags::bitflags;

/// Register window size of one VDMA instance
pub const REGISTER_SPAN: usize = 0x1000;

// channel bases
pub const MM2S_BASE: usize = 0x00;
pub const S2MM_BASE: usize = 0x30;

// channel-relative registers
pub const CR: usize = 0x00;
pub const SR: usize = 0x04;
pub const CDESC: usize = 0x08;
pub const TDESC: usize = 0x10;
pub const HI_FRMBUF: usize = 0x14;
pub const FRMSTORE: usize = 0x18;
pub const BUFTHRES: usize = 0x1C;

// instance-level registers
pub const PARKPTR: usize = 0x28;
pub const VERSION: usize = 0x2C;
pub const S2MM_IRQ_MASK: usize = 0x3C;
pub const VFLIP: usize = 0xEC;

// direct-register address banks
pub const MM2S_ADDR_BASE: usize = 0x50;
pub const S2MM_ADDR_BASE: usize = 0xA0;

// bank-relative registers
pub const VSIZE: usize = 0x00;
pub const HSIZE: usize = 0x04;
pub const STRD_FRMDLY: usize = 0x08;
pub const START_ADDR: usize = 0x0C;
pub const START_ADDR_MSB: usize = 0x10;
pub const START_ADDR_LEN: usize = 0x04;

pub const PARKPTR_READREF_MASK: u32 = 0x0000_001F;
pub const PARKPTR_WRTREF_MASK: u32 = 0x0000_1F00;
pub const PARKPTR_WRTREF_SHIFT: u32 = 8;
pub const PARKPTR_READSTR_MASK: u32 = 0x001F_0000;
pub const PARKPTR_READSTR_SHIFT: u32 = 16;
pub const PARKPTR_WRTSTR_MASK: u32 = 0x1F00_0000;
pub const PARKPTR_WRTSTR_SHIFT: u32 = 24;

pub const VERSION_MAJOR_MASK: u32 = 0xF000_0000;
pub const VERSION_MAJOR_SHIFT: u32 = 28;

pub const FRMSTORE_MASK: u32 = 0x3F;
pub const HI_FRMBUF_ENABLE: u32 = 0x1;
pub const HI_FRMBUF_DISABLE: u32 = 0x0;
pub const VFLIP_EN: u32 = 0x1;
pub const S2MM_IRQ_MASK_ALL: u32 = 0xF;

// sizing limits
pub const VSIZE_MAX: u32 = 0x1FFF;
pub const HSIZE_MAX: u32 = 0xFFFF;
pub const STRIDE_MAX: u32 = 0xFFFF;
pub const STRIDE_MASK: u32 = 0x0000_FFFF;
pub const FRMDLY_MAX: u32 = 0xF;
pub const FRMDLY_MASK: u32 = 0x1F00_0000;
pub const FRMDLY_SHIFT: u32 = 24;

/// Frame stores addressable through the direct-register banks
pub fn max_frame_stores(addr_width: u8) -> usize {
    if addr_width > 32 {
        32
    } else {
        16
    }
}

/// Highest frame index accepted by the park pointer
pub fn max_frame_index(addr_width: u8) -> u32 {
    max_frame_stores(addr_width) as u32 - 1
}

bitflags! {
    /// Channel control register
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control: u32 {
        const RUN_STOP          = 0x00000001;
        const TAIL_EN           = 0x00000002;
        const RESET             = 0x00000004;
        const SYNC_EN           = 0x00000008;
        const FRMCNT_EN         = 0x00000010;
        const FSYNC_SRC         = 0x00000060;
        const GENLCK_SRC        = 0x00000080;
        const RD_PTR            = 0x00000F00;
        const IRQ_FRMCNT        = 0x00001000;
        const IRQ_DELAYCNT      = 0x00002000;
        const IRQ_ERROR         = 0x00004000;
        const GENLCK_RPT        = 0x00008000;
        const FRMCNT            = 0x00FF0000;
        const DELAYCNT          = 0xFF000000;
    }
}

pub const CR_RD_PTR_SHIFT: u32 = 8;
pub const CR_FRMCNT_SHIFT: u32 = 16;
pub const CR_DELAYCNT_SHIFT: u32 = 24;
pub const FSYNC_SRC_OTHER: u32 = 0x20;
pub const FSYNC_SRC_S2MM_TUSER: u32 = 0x40;

bitflags! {
    /// Channel status register
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        const HALTED            = 0x00000001;
        const IDLE              = 0x00000002;
        const ERR_INTERNAL      = 0x00000010;
        const ERR_SLAVE         = 0x00000020;
        const ERR_DECODE        = 0x00000040;
        const ERR_FSIZE_LESS    = 0x00000080;
        const ERR_LSIZE_LESS    = 0x00000100;
        const ERR_SG_SLV        = 0x00000200;
        const ERR_SG_DEC        = 0x00000400;
        const ERR_FSIZE_MORE    = 0x00000800;
        const IRQ_FRMCNT        = 0x00001000;
        const IRQ_DELAYCNT      = 0x00002000;
        const IRQ_ERROR         = 0x00004000;
        const ERR_LSIZE_MORE    = 0x00008000;
        const FRMCNT            = 0x00FF0000;
        const DELAYCNT          = 0xFF000000;
    }
}

impl Status {
    /// All channel error bits
    pub const ERR_ALL: Status = Status::from_bits_retain(0x0000_8FF0);
}

impl From<u32> for Status {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

bitflags! {
    /// Interrupt bits, shared by the control (enable) and status (pending) registers
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Interrupts: u32 {
        const FRAME_COUNT       = 0x00001000;
        const DELAY_COUNT       = 0x00002000;
        const ERROR             = 0x00004000;
    }
}

impl Interrupts {
    /// Interrupts signalling a finished transfer
    pub const COMPLETION: Interrupts = Interrupts::FRAME_COUNT.union(Interrupts::DELAY_COUNT);
}

impl From<u32> for Interrupts {
    fn from(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl fmt::Display for Interrupts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

bitflags! {
    /// Optional registers synthesized into a channel
    #[allow(clippy::unreadable_literal)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DebugFeatures: u32 {
        const THRESHOLD_REG     = 0x01;
        const FRAME_STORE_REG   = 0x02;
        const DELAY_COUNTER     = 0x04;
        const FRAME_COUNTER     = 0x08;
    }
}
