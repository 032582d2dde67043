//! One direction of a VDMA core
//!
//! A [`Channel`] moves frames either from memory to the video stream ([`Direction::Read`],
//! MM2S) or from the stream to memory ([`Direction::Write`], S2MM). In scatter-gather mode
//! the hardware walks a [`Ring`] of descriptors; in direct-register mode the frame addresses
//! live in a fixed register bank.
//!
//! A channel is only usable while it is valid, i.e. after its ring has been built.

use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;

use crate::config::{Config, GenLock};
use crate::descriptor::{DESCRIPTOR_ALIGNMENT, DESCRIPTOR_SIZE};
use crate::error::{invalid, Error, Result};
use crate::hw::{self, Control, DebugFeatures, Interrupts, Status};
use crate::memory::DmaMemory;
use crate::registers::Registers;
use crate::ring::Ring;

mod addressing;
mod setup;

pub use setup::Setup;

/// Transfer direction of a channel
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Memory to stream (MM2S)
    Read    = 1,
    /// Stream to memory (S2MM)
    Write   = 2,
}

impl Direction {
    /// The opposite direction
    pub fn other(self) -> Direction {
        match self {
            Direction::Read => Direction::Write,
            Direction::Write => Direction::Read,
        }
    }

    fn channel_base(self) -> usize {
        match self {
            Direction::Read => hw::MM2S_BASE,
            Direction::Write => hw::S2MM_BASE,
        }
    }

    fn addr_base(self) -> usize {
        match self {
            Direction::Read => hw::MM2S_ADDR_BASE,
            Direction::Write => hw::S2MM_ADDR_BASE,
        }
    }
}

impl TryFrom<u32> for Direction {
    type Error = ();

    fn try_from(repr: u32) -> std::result::Result<Self, Self::Error> {
        match repr {
            1 => Ok(Direction::Read),
            2 => Ok(Direction::Write),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Direction::Read => write!(f, "read (MM2S)"),
            Direction::Write => write!(f, "write (S2MM)"),
        }
    }
}

/// Frame and delay counter thresholds raising the completion interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounter {
    /// Frames per frame count interrupt, must not be zero
    pub frame_count: u8,
    /// Delay timer ticks before the delay interrupt
    pub delay_count: u8,
}

impl FrameCounter {
    pub fn new(frame_count: u8, delay_count: u8) -> Self {
        FrameCounter {
            frame_count,
            delay_count,
        }
    }
}

/// One directional data mover
pub struct Channel<R> {
    regs: Arc<R>,
    direction: Direction,
    valid: bool,
    instance_base: usize,
    base: usize,
    addr_base: usize,
    has_sg: bool,
    has_dre: bool,
    addr_width: u8,
    word_length: u32,
    stream_width: u32,
    max_frame_stores: usize,
    line_buffer_depth: u32,
    line_buffer_threshold: u32,
    genlock: GenLock,
    debug: DebugFeatures,
    has_vflip: bool,
    vsize: u32,
    hsize: u32,
    stride: u32,
    ring: Ring,
    memory: Option<Box<dyn DmaMemory + Send>>,
}

impl<R: Registers> Channel<R> {
    /// Returns a channel that is not implemented by the hardware
    pub(crate) fn absent(regs: Arc<R>, direction: Direction) -> Self {
        Channel {
            regs,
            direction,
            valid: false,
            instance_base: 0,
            base: direction.channel_base(),
            addr_base: direction.addr_base(),
            has_sg: false,
            has_dre: false,
            addr_width: 32,
            word_length: 4,
            stream_width: 4,
            max_frame_stores: 0,
            line_buffer_depth: 0,
            line_buffer_threshold: 0,
            genlock: GenLock::None,
            debug: DebugFeatures::empty(),
            has_vflip: false,
            vsize: 0,
            hsize: 0,
            stride: 0,
            ring: Ring::default(),
            memory: None,
        }
    }

    /// Takes the channel's capabilities from the hardware description
    ///
    /// The channel stays invalid until [`Channel::init_ring`] succeeds.
    pub(crate) fn from_config(
        regs: Arc<R>,
        direction: Direction,
        config: &Config,
        has_sg: bool,
    ) -> Self {
        let desc = config.channel(direction);
        let mut chan = Channel::absent(regs, direction);

        chan.has_sg = has_sg;
        chan.has_dre = desc.dre;
        chan.addr_width = config.addr_width;
        chan.word_length = (desc.data_width >> 3).max(1);
        chan.stream_width = (desc.stream_width >> 3).max(1);
        chan.max_frame_stores = usize::from(config.max_frame_stores);
        chan.line_buffer_depth = desc.line_buffer_depth;
        chan.genlock = desc.genlock;
        chan.debug = desc.debug_features(config.enable_all_debug);
        chan.has_vflip = config.vertical_flip && direction == Direction::Write;
        chan
    }

    fn read(&self, offset: usize) -> u32 {
        self.regs.read(self.base + offset)
    }

    fn write(&self, offset: usize, value: u32) {
        self.regs.write(self.base + offset, value)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Whether the ring has been built and the channel may be used
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn has_sg(&self) -> bool {
        self.has_sg
    }

    pub fn has_dre(&self) -> bool {
        self.has_dre
    }

    /// Memory-mapped word length in bytes
    pub fn word_length(&self) -> u32 {
        self.word_length
    }

    /// Stream width in bytes
    pub fn stream_width(&self) -> u32 {
        self.stream_width
    }

    pub fn addr_width(&self) -> u8 {
        self.addr_width
    }

    /// Number of frame stores, equal to the ring length
    pub fn frame_count(&self) -> usize {
        self.ring.len()
    }

    pub fn genlock(&self) -> GenLock {
        self.genlock
    }

    pub fn debug_features(&self) -> DebugFeatures {
        self.debug
    }

    pub fn line_buffer_depth(&self) -> u32 {
        self.line_buffer_depth
    }

    pub fn line_buffer_threshold(&self) -> u32 {
        self.line_buffer_threshold
    }

    /// Lines per frame of the current configuration
    pub fn vsize(&self) -> u32 {
        self.vsize
    }

    /// Bytes per line of the current configuration
    pub fn hsize(&self) -> u32 {
        self.hsize
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Raw control register
    pub fn control(&self) -> Control {
        Control::from_bits_retain(self.read(hw::CR))
    }

    /// Read-modify-write of the control register
    pub(crate) fn update_control(&self, clear: Control, set: Control) {
        self.regs.modify(self.base + hw::CR, clear.bits(), set.bits());
    }

    /// Raw status register
    pub fn status(&self) -> Status {
        Status::from(self.read(hw::SR))
    }

    /// (Re)builds the descriptor ring with `frame_count` descriptors
    ///
    /// The channel is invalid while the ring is being built. Attached descriptor memory
    /// must hold the new ring, otherwise ring and memory are left untouched.
    pub fn init_ring(&mut self, frame_count: usize) -> Result<()> {
        if frame_count == 0 {
            return Err(invalid("a ring needs at least one descriptor"));
        }
        self.check_ring_fits(frame_count)?;

        self.valid = false;

        let base = match &self.memory {
            Some(mem) => mem.phys_addr(),
            None => self.ring.head(),
        };

        self.ring = Ring::new(frame_count, base);
        self.flush_ring();

        log::debug!(
            "{} ring of {} descriptors at {:#x}",
            self.direction,
            frame_count,
            base
        );
        self.valid = true;
        Ok(())
    }

    fn check_ring_fits(&self, frame_count: usize) -> Result<()> {
        match &self.memory {
            Some(mem) if mem.len() < frame_count * DESCRIPTOR_SIZE => Err(invalid(format!(
                "{} descriptor memory of {} bytes cannot hold {} descriptors",
                self.direction,
                mem.len(),
                frame_count
            ))),
            _ => Ok(()),
        }
    }

    /// Moves the descriptor ring into DMA-visible memory
    ///
    /// The memory must be aligned to the descriptor alignment and hold the whole ring.
    /// Descriptor contents are zeroed, so the channel has to be configured again.
    pub fn set_descriptor_memory(&mut self, memory: Box<dyn DmaMemory + Send>) -> Result<()> {
        if !self.valid {
            return Err(Error::DeviceNotFound(self.direction));
        }
        if self.has_sg && self.is_busy() {
            return Err(Error::Busy);
        }

        let phys = memory.phys_addr();
        if phys % DESCRIPTOR_ALIGNMENT != 0 {
            return Err(invalid(format!(
                "descriptor memory at {:#x} is not {}-byte aligned",
                phys, DESCRIPTOR_ALIGNMENT
            )));
        }
        if phys + self.ring.size() as u64 > u64::from(u32::MAX) + 1 {
            return Err(invalid(format!(
                "descriptor memory at {:#x} is not reachable through 32-bit descriptor pointers",
                phys
            )));
        }
        if memory.len() < self.ring.size() {
            return Err(invalid(format!(
                "descriptor memory of {} bytes cannot hold {} descriptors",
                memory.len(),
                self.ring.len()
            )));
        }

        self.ring.relocate(phys);
        self.memory = Some(memory);
        self.flush_ring();
        Ok(())
    }

    fn flush_ring(&mut self) {
        if let Some(mem) = self.memory.as_mut() {
            self.ring.flush(mem.as_mut());
        }
    }

    /// Requests a soft reset; poll [`Channel::reset_pending`] for completion
    pub fn reset(&self) {
        self.write(hw::CR, Control::RESET.bits());
    }

    /// Whether a requested reset is still in progress
    pub fn reset_pending(&self) -> bool {
        self.control().contains(Control::RESET)
    }

    /// Whether the channel is started and not halted
    pub fn is_running(&self) -> bool {
        !self.status().contains(Status::HALTED) && self.control().contains(Control::RUN_STOP)
    }

    /// Whether the channel is neither idle nor halted
    pub fn is_busy(&self) -> bool {
        !self.status().intersects(Status::IDLE | Status::HALTED)
    }

    /// Starts the channel
    ///
    /// In scatter-gather mode the tail descriptor is written to fetch the whole ring; in
    /// direct-register mode writing the vertical size starts the configured transfer.
    pub fn start(&mut self) -> Result<()> {
        if !self.valid {
            return Err(Error::NotInitialized);
        }
        if self.has_sg && self.is_busy() {
            return Err(Error::Busy);
        }

        if !self.is_running() {
            if self.has_sg {
                self.write(hw::CDESC, self.ring.head() as u32);
            }
            let cr = self.read(hw::CR);
            self.write(hw::CR, cr | Control::RUN_STOP.bits());
        }

        if !self.is_running() {
            log::error!("{} channel failed to start", self.direction);
            return Err(Error::HardwareFault(format!(
                "{} channel did not leave the halted state",
                self.direction
            )));
        }

        if self.has_sg {
            self.write(hw::TDESC, self.ring.tail() as u32);
        } else {
            self.regs.write(self.addr_base + hw::VSIZE, self.vsize);
        }
        Ok(())
    }

    /// Stops the channel; the frame in flight may be cut short
    pub fn stop(&self) {
        if !self.is_running() {
            return;
        }
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr & !Control::RUN_STOP.bits());
    }

    /// Configures the channel, programs the frame addresses and starts it
    pub fn start_transfer(&mut self, setup: &Setup) -> Result<()> {
        self.configure(setup)?;
        self.set_buffer_addresses(&setup.frame_addresses)?;
        self.start()
    }

    /// Leaves circular mode and keeps transferring the parked frame
    pub fn start_parking(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::HardwareFault(format!(
                "{} channel is not running",
                self.direction
            )));
        }
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr & !Control::TAIL_EN.bits());
        Ok(())
    }

    /// Returns to circular mode
    pub fn stop_parking(&self) {
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr | Control::TAIL_EN.bits());
    }

    /// Enables the frame count, so the channel stops after the programmed number of frames
    pub fn start_frame_count(&self) {
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr | Control::FRMCNT_EN.bits());
    }

    /// Writes this channel's field of the shared park pointer register
    pub(crate) fn set_park_frame(&self, frame: u32) -> Result<()> {
        self.check_park_frame(frame)?;
        let (mask, shift) = match self.direction {
            Direction::Read => (hw::PARKPTR_READREF_MASK, 0),
            Direction::Write => (hw::PARKPTR_WRTREF_MASK, hw::PARKPTR_WRTREF_SHIFT),
        };
        self.regs
            .modify(self.instance_base + hw::PARKPTR, mask, (frame << shift) & mask);
        Ok(())
    }

    /// Frame store the hardware is currently working on
    pub fn current_frame_store(&self) -> u32 {
        let ptr = self.regs.read(self.instance_base + hw::PARKPTR);
        match self.direction {
            Direction::Read => (ptr & hw::PARKPTR_READSTR_MASK) >> hw::PARKPTR_READSTR_SHIFT,
            Direction::Write => (ptr & hw::PARKPTR_WRTSTR_MASK) >> hw::PARKPTR_WRTSTR_SHIFT,
        }
    }

    /// Sets the interrupt frame and delay counters
    pub fn set_frame_counter(&self, counter: FrameCounter) -> Result<()> {
        if counter.frame_count == 0 {
            return Err(invalid("frame count must not be zero"));
        }
        if !self.valid {
            return Err(Error::NotInitialized);
        }
        if !self.debug.contains(DebugFeatures::FRAME_COUNTER) {
            return Err(Error::FeatureDisabled("frame counter"));
        }
        if !self.debug.contains(DebugFeatures::DELAY_COUNTER) {
            return Err(Error::FeatureDisabled("delay counter"));
        }

        let cr = self.read(hw::CR) & !(Control::FRMCNT | Control::DELAYCNT).bits();
        let counters = (u32::from(counter.frame_count) << hw::CR_FRMCNT_SHIFT)
            | (u32::from(counter.delay_count) << hw::CR_DELAYCNT_SHIFT);
        self.write(hw::CR, cr | counters);
        Ok(())
    }

    /// Reads back the interrupt frame and delay counters
    pub fn frame_counter(&self) -> Result<FrameCounter> {
        if !self.valid {
            return Err(Error::NotInitialized);
        }
        if !self.debug.contains(DebugFeatures::FRAME_COUNTER) {
            return Err(Error::FeatureDisabled("frame counter"));
        }
        if !self.debug.contains(DebugFeatures::DELAY_COUNTER) {
            return Err(Error::FeatureDisabled("delay counter"));
        }

        let cr = self.read(hw::CR);
        Ok(FrameCounter {
            frame_count: ((cr & Control::FRMCNT.bits()) >> hw::CR_FRMCNT_SHIFT) as u8,
            delay_count: ((cr & Control::DELAYCNT.bits()) >> hw::CR_DELAYCNT_SHIFT) as u8,
        })
    }

    /// Enables the interrupts in `mask`, leaving the others untouched
    pub fn enable_interrupts(&self, mask: Interrupts) {
        if mask.is_empty() {
            log::warn!("{}: no interrupts to enable", self.direction);
            return;
        }
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr | mask.bits());
    }

    /// Disables the interrupts in `mask`, leaving the others untouched
    pub fn disable_interrupts(&self, mask: Interrupts) {
        if mask.is_empty() {
            log::warn!("{}: no interrupts to disable", self.direction);
            return;
        }
        let cr = self.read(hw::CR);
        self.write(hw::CR, cr & !mask.bits());
    }

    /// Acknowledges the pending interrupts in `mask`
    pub fn clear_interrupts(&self, mask: Interrupts) {
        if mask.is_empty() {
            log::warn!("{}: no interrupts to clear", self.direction);
            return;
        }
        self.write(hw::SR, mask.bits());
    }

    pub fn pending_interrupts(&self) -> Interrupts {
        Interrupts::from(self.read(hw::SR))
    }

    pub fn enabled_interrupts(&self) -> Interrupts {
        Interrupts::from(self.read(hw::CR))
    }

    /// Error bits currently latched in the status register
    pub fn errors(&self) -> Status {
        self.status() & Status::ERR_ALL
    }

    /// Clears the latched errors in `mask`
    pub fn clear_errors(&self, mask: Status) {
        self.write(hw::SR, (mask & Status::ERR_ALL).bits());
    }

    /// Sets the number of frame stores and rebuilds the ring to match
    pub fn set_frame_store(&mut self, count: usize) -> Result<()> {
        if count == 0 || count > self.max_frame_stores {
            return Err(invalid(format!(
                "frame store count {} outside of 1..={}",
                count, self.max_frame_stores
            )));
        }
        if !self.valid {
            return Err(Error::DeviceNotFound(self.direction));
        }
        if !self.debug.contains(DebugFeatures::FRAME_STORE_REG) {
            return Err(Error::FeatureDisabled("frame store register"));
        }
        if self.is_running() {
            return Err(Error::Busy);
        }
        self.check_ring_fits(count)?;

        self.write(hw::FRMSTORE, count as u32 & hw::FRMSTORE_MASK);
        self.init_ring(count)
    }

    /// Number of frame stores reported by the hardware
    pub fn frame_store(&self) -> Result<usize> {
        if !self.valid {
            return Err(Error::DeviceNotFound(self.direction));
        }
        if !self.debug.contains(DebugFeatures::FRAME_STORE_REG) {
            return Err(Error::FeatureDisabled("frame store register"));
        }
        Ok((self.read(hw::FRMSTORE) & hw::FRMSTORE_MASK) as usize)
    }

    /// Reads the line buffer threshold the hardware starts with
    pub(crate) fn load_line_buffer_threshold(&mut self) {
        if self.line_buffer_depth > 0 {
            self.line_buffer_threshold = self.read(hw::BUFTHRES);
            log::debug!(
                "{} line buffer threshold {}",
                self.direction,
                self.line_buffer_threshold
            );
        }
    }

    /// Sets the line buffer fill level at which the stream side is served
    ///
    /// The threshold must be below the line buffer depth and a multiple of the stream width.
    pub fn set_line_buffer_threshold(&mut self, threshold: u32) -> Result<()> {
        if !self.valid {
            return Err(Error::DeviceNotFound(self.direction));
        }
        if !self.debug.contains(DebugFeatures::THRESHOLD_REG) {
            return Err(Error::FeatureDisabled("line buffer threshold register"));
        }
        if self.line_buffer_threshold == 0 {
            return Err(Error::Unsupported("channel has no line buffer"));
        }
        if threshold >= self.line_buffer_depth || threshold % self.stream_width != 0 {
            return Err(invalid(format!(
                "threshold {} must be below {} and a multiple of {}",
                threshold, self.line_buffer_depth, self.stream_width
            )));
        }

        self.write(hw::BUFTHRES, threshold);
        self.line_buffer_threshold = threshold;
        Ok(())
    }

    /// Rejects park indexes beyond the frame stores the address width allows
    pub(crate) fn check_park_frame(&self, frame: u32) -> Result<()> {
        let max = hw::max_frame_index(self.addr_width);
        if frame > max {
            return Err(invalid(format!("park frame {} exceeds {}", frame, max)));
        }
        Ok(())
    }

    /// Logs the channel's registers
    pub fn dump_registers(&self) {
        log::debug!(
            "{}: cr {:#010x} sr {:#010x} cdesc {:#010x} tdesc {:#010x}",
            self.direction,
            self.read(hw::CR),
            self.read(hw::SR),
            self.read(hw::CDESC),
            self.read(hw::TDESC)
        );
    }
}
