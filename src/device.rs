use std::convert::TryFrom;
use std::sync::Arc;

use crate::channel::{Channel, Direction, FrameCounter, Setup};
use crate::config::{Config, FsyncUsage, GenLock};
use crate::error::{invalid, Error, Result};
use crate::hw::{self, Control, Interrupts, Status};
use crate::interrupt::{Callbacks, Handler};
use crate::memory::DmaMemory;
use crate::registers::{poll, Registers};
use crate::uio::Uio;

/// Polls allowed for a channel reset during configuration
pub const INIT_POLL_BUDGET: usize = 100_000;

/// Source of a channel's frame sync
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncSource {
    /// The channel's own frame sync input
    Channel         = 0,
    /// The other channel's frame sync input
    OtherChannel    = 1,
    /// The start-of-frame TUSER bit of the S2MM stream
    S2mmTuser       = 2,
}

impl TryFrom<u32> for FsyncSource {
    type Error = ();

    fn try_from(repr: u32) -> std::result::Result<Self, Self::Error> {
        match repr {
            0 => Ok(FsyncSource::Channel),
            1 => Ok(FsyncSource::OtherChannel),
            2 => Ok(FsyncSource::S2mmTuser),
            _ => Err(()),
        }
    }
}

/// Source of a channel's gen-lock signal
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenLockSource {
    External    = 0,
    Internal    = 1,
}

impl TryFrom<u32> for GenLockSource {
    type Error = ();

    fn try_from(repr: u32) -> std::result::Result<Self, Self::Error> {
        match repr {
            0 => Ok(GenLockSource::External),
            1 => Ok(GenLockSource::Internal),
            _ => Err(()),
        }
    }
}

/// An AXI VDMA core: a read and a write channel sharing one register window
///
/// The core is unusable until [`Vdma::configure`] has built and reset its channels.
///
/// # Example
///
/// ```no_run
/// use vdma::{Config, Direction, Setup, Vdma};
///
/// let config = Config::default();
/// let mut vdma = Vdma::open(&config).expect("failed to open VDMA");
///
/// let mut setup = Setup::new(1080, 1920 * 3, 1920 * 3);
/// setup.frame_addresses = vec![0x1000_0000, 0x1080_0000, 0x1100_0000];
/// vdma.start_read_frame(&setup).expect("failed to start");
/// ```
pub struct Vdma<R> {
    regs: Arc<R>,
    read: Channel<R>,
    write: Channel<R>,
    read_callbacks: Callbacks,
    write_callbacks: Callbacks,
    device_id: u16,
    ready: bool,
    has_sg: bool,
    internal_genlock: bool,
    use_fsync: FsyncUsage,
    s2mm_sof: bool,
}

impl Vdma<Uio> {
    /// Opens the UIO device named in `config` and configures the core
    pub fn open(config: &Config) -> Result<Self> {
        let name = config
            .uio_name
            .as_deref()
            .ok_or(Error::Unsupported("no UIO device name configured"))?;
        let regs = Uio::open_by_name(name)?;

        let mut vdma = Vdma::new(regs);
        vdma.configure(config)?;
        Ok(vdma)
    }
}

impl<R: Registers> Vdma<R> {
    /// Wraps a register window; both channels start out absent
    pub fn new(regs: R) -> Self {
        let regs = Arc::new(regs);
        Vdma {
            read: Channel::absent(regs.clone(), Direction::Read),
            write: Channel::absent(regs.clone(), Direction::Write),
            regs,
            read_callbacks: Callbacks::default(),
            write_callbacks: Callbacks::default(),
            device_id: 0,
            ready: false,
            has_sg: false,
            internal_genlock: false,
            use_fsync: FsyncUsage::None,
            s2mm_sof: false,
        }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Sets up both channels from the hardware description
    ///
    /// Every present channel gets a ring of `max_frame_stores` descriptors and is reset. The
    /// core is ready once all resets completed.
    pub fn configure(&mut self, config: &Config) -> Result<()> {
        self.ready = false;
        self.device_id = config.device_id;

        // cores before v3 always fetch descriptors
        let major = self.version() >> hw::VERSION_MAJOR_SHIFT;
        self.has_sg = config.has_sg || major < 3;
        self.internal_genlock = config.internal_genlock;
        self.use_fsync = config.use_fsync;
        self.s2mm_sof = config.s2mm_sof;

        for &direction in &[Direction::Read, Direction::Write] {
            let chan = if config.channel(direction).present {
                self.bring_up(direction, config)?
            } else {
                Channel::absent(self.regs.clone(), direction)
            };
            match direction {
                Direction::Read => self.read = chan,
                Direction::Write => self.write = chan,
            }
        }

        log::info!(
            "VDMA {} ready, v{}, {} mode",
            self.device_id,
            major,
            if self.has_sg {
                "scatter-gather"
            } else {
                "direct register"
            }
        );
        self.ready = true;
        Ok(())
    }

    fn bring_up(&self, direction: Direction, config: &Config) -> Result<Channel<R>> {
        let mut chan = Channel::from_config(self.regs.clone(), direction, config, self.has_sg);
        chan.load_line_buffer_threshold();
        chan.init_ring(usize::from(config.max_frame_stores))?;

        chan.reset();
        if !poll(INIT_POLL_BUDGET, || !chan.reset_pending()) {
            log::error!("{} channel reset timed out", direction);
            return Err(Error::HardwareFault(format!(
                "{} channel did not come out of reset",
                direction
            )));
        }
        Ok(chan)
    }

    /// Whether configuration completed
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn has_sg(&self) -> bool {
        self.has_sg
    }

    /// Raw version register
    pub fn version(&self) -> u32 {
        self.regs.read(hw::VERSION)
    }

    /// Returns the channel for `direction`; check [`Channel::is_valid`] before use
    pub fn channel(&self, direction: Direction) -> &Channel<R> {
        match direction {
            Direction::Read => &self.read,
            Direction::Write => &self.write,
        }
    }

    pub fn channel_mut(&mut self, direction: Direction) -> &mut Channel<R> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    fn present(&self, direction: Direction) -> Result<&Channel<R>> {
        let chan = self.channel(direction);
        if chan.is_valid() {
            Ok(chan)
        } else {
            Err(Error::DeviceNotFound(direction))
        }
    }

    fn present_mut(&mut self, direction: Direction) -> Result<&mut Channel<R>> {
        let chan = self.channel_mut(direction);
        if chan.is_valid() {
            Ok(chan)
        } else {
            Err(Error::DeviceNotFound(direction))
        }
    }

    /// Requests a reset of one channel
    pub fn reset(&self, direction: Direction) -> Result<()> {
        self.present(direction)?.reset();
        Ok(())
    }

    /// Whether a requested reset is still in progress; absent channels never are
    pub fn reset_pending(&self, direction: Direction) -> bool {
        let chan = self.channel(direction);
        chan.is_valid() && chan.reset_pending()
    }

    /// Whether a channel is transferring; absent channels never are
    pub fn is_busy(&self, direction: Direction) -> bool {
        let chan = self.channel(direction);
        chan.is_valid() && chan.is_busy()
    }

    /// Raw status register of one channel
    pub fn status(&self, direction: Direction) -> Result<Status> {
        Ok(self.present(direction)?.status())
    }

    /// Frame store the hardware is working on
    pub fn current_frame_store(&self, direction: Direction) -> Result<u32> {
        Ok(self.present(direction)?.current_frame_store())
    }

    pub fn dma_config(&mut self, direction: Direction, setup: &Setup) -> Result<()> {
        self.present_mut(direction)?.configure(setup)
    }

    pub fn dma_set_buffer_addresses(
        &mut self,
        direction: Direction,
        addresses: &[u64],
    ) -> Result<()> {
        self.present_mut(direction)?.set_buffer_addresses(addresses)
    }

    pub fn dma_start(&mut self, direction: Direction) -> Result<()> {
        self.present_mut(direction)?.start()
    }

    pub fn dma_stop(&self, direction: Direction) -> Result<()> {
        self.present(direction)?.stop();
        Ok(())
    }

    /// Configures, addresses and starts the read channel
    pub fn start_read_frame(&mut self, setup: &Setup) -> Result<()> {
        self.present_mut(Direction::Read)?.start_transfer(setup)
    }

    /// Configures, addresses and starts the write channel
    pub fn start_write_frame(&mut self, setup: &Setup) -> Result<()> {
        self.present_mut(Direction::Write)?.start_transfer(setup)
    }

    /// Parks a running channel on `frame`
    pub fn start_parking(&self, frame: u32, direction: Direction) -> Result<()> {
        let chan = self.channel(direction);
        chan.set_park_frame(frame)?;
        if chan.is_valid() {
            chan.start_parking()?;
        }
        Ok(())
    }

    /// Returns a channel to circular mode
    pub fn stop_parking(&self, direction: Direction) -> Result<()> {
        self.present(direction)?.stop_parking();
        Ok(())
    }

    /// Enables the frame count on one channel
    pub fn start_frame_count(&self, direction: Direction) -> Result<()> {
        self.present(direction)?.start_frame_count();
        Ok(())
    }

    /// Moves a channel's descriptor ring into DMA-visible memory
    pub fn set_descriptor_memory(
        &mut self,
        direction: Direction,
        memory: Box<dyn DmaMemory + Send>,
    ) -> Result<()> {
        self.channel_mut(direction).set_descriptor_memory(memory)
    }

    /// Changes the number of frame stores of one channel
    pub fn set_frame_store(&mut self, count: usize, direction: Direction) -> Result<()> {
        self.channel_mut(direction).set_frame_store(count)
    }

    /// Number of frame stores reported by the hardware
    pub fn frame_store(&self, direction: Direction) -> Result<usize> {
        self.channel(direction).frame_store()
    }

    pub fn set_line_buffer_threshold(&mut self, threshold: u32, direction: Direction) -> Result<()> {
        self.channel_mut(direction)
            .set_line_buffer_threshold(threshold)
    }

    /// Programs the interrupt counters of both channels
    ///
    /// Absent channels are skipped.
    pub fn set_frame_counter(&self, read: FrameCounter, write: FrameCounter) -> Result<()> {
        if read.frame_count == 0 || write.frame_count == 0 {
            return Err(invalid("frame count must not be zero"));
        }
        if !self.read.is_valid() && !self.write.is_valid() {
            return Err(Error::NotInitialized);
        }
        if self.read.is_valid() {
            self.read.set_frame_counter(read)?;
        }
        if self.write.is_valid() {
            self.write.set_frame_counter(write)?;
        }
        Ok(())
    }

    /// Reads back the interrupt counters of both channels, `None` for absent ones
    pub fn frame_counter(&self) -> Result<(Option<FrameCounter>, Option<FrameCounter>)> {
        let read = if self.read.is_valid() {
            Some(self.read.frame_counter()?)
        } else {
            None
        };
        let write = if self.write.is_valid() {
            Some(self.write.frame_counter()?)
        } else {
            None
        };
        Ok((read, write))
    }

    /// Error bits latched by one channel
    pub fn channel_errors(&self, direction: Direction) -> Result<Status> {
        Ok(self.present(direction)?.errors())
    }

    pub fn clear_channel_errors(&self, direction: Direction, mask: Status) -> Result<()> {
        self.present(direction)?.clear_errors(mask);
        Ok(())
    }

    /// Masks S2MM error interrupts; bits follow the S2MM IRQ mask register
    pub fn mask_write_error_interrupts(&self, mask: u32) -> Result<()> {
        self.present(Direction::Write)?;
        self.regs
            .write(hw::S2MM_IRQ_MASK, mask & hw::S2MM_IRQ_MASK_ALL);
        Ok(())
    }

    pub fn enable_interrupts(&self, mask: Interrupts, direction: Direction) -> Result<()> {
        self.present(direction)?.enable_interrupts(mask);
        Ok(())
    }

    pub fn disable_interrupts(&self, mask: Interrupts, direction: Direction) -> Result<()> {
        self.present(direction)?.disable_interrupts(mask);
        Ok(())
    }

    pub fn clear_interrupts(&self, mask: Interrupts, direction: Direction) -> Result<()> {
        self.present(direction)?.clear_interrupts(mask);
        Ok(())
    }

    pub fn pending_interrupts(&self, direction: Direction) -> Result<Interrupts> {
        Ok(self.present(direction)?.pending_interrupts())
    }

    pub fn enabled_interrupts(&self, direction: Direction) -> Result<Interrupts> {
        Ok(self.present(direction)?.enabled_interrupts())
    }

    /// Logs the registers of one channel
    pub fn register_dump(&self, direction: Direction) {
        let chan = self.channel(direction);
        if chan.is_valid() {
            chan.dump_registers();
        } else {
            log::debug!("{} channel not present", direction);
        }
    }

    /// Replaces the completion or error callback of one direction
    pub fn set_callback(&mut self, direction: Direction, handler: Handler) {
        match direction {
            Direction::Read => self.read_callbacks.set(handler),
            Direction::Write => self.write_callbacks.set(handler),
        }
    }

    /// Services a read channel interrupt
    pub fn read_interrupt_handler(&mut self) {
        let Vdma {
            read,
            read_callbacks,
            ..
        } = self;
        service(read, read_callbacks);
    }

    /// Services a write channel interrupt
    pub fn write_interrupt_handler(&mut self) {
        let Vdma {
            write,
            write_callbacks,
            ..
        } = self;
        service(write, write_callbacks);
    }

    /// Selects the frame sync source of one channel
    pub fn fsync_source_select(&self, source: FsyncSource, direction: Direction) -> Result<()> {
        if !self.use_fsync.covers(direction) {
            log::error!("{} channel has no frame sync input", direction);
            return Err(Error::Unsupported("frame sync is not used by this channel"));
        }

        let chan = self.present(direction)?;
        match source {
            FsyncSource::Channel => chan.update_control(Control::FSYNC_SRC, Control::empty()),
            FsyncSource::OtherChannel => chan.update_control(
                Control::FSYNC_SRC,
                Control::from_bits_retain(hw::FSYNC_SRC_OTHER),
            ),
            FsyncSource::S2mmTuser => {
                if !self.s2mm_sof {
                    return Err(Error::Unsupported(
                        "S2MM start-of-frame sync is not present",
                    ));
                }
                chan.update_control(
                    Control::FSYNC_SRC,
                    Control::from_bits_retain(hw::FSYNC_SRC_S2MM_TUSER),
                )
            }
        }
        log::debug!("{} frame sync source {:?}", chan.direction(), source);
        Ok(())
    }

    /// Selects the gen-lock source of one channel
    ///
    /// Needs both channels, internal gen-lock, and a master/slave pairing of the same kind.
    pub fn genlock_source_select(&self, source: GenLockSource, direction: Direction) -> Result<()> {
        if !self.read.is_valid() || !self.write.is_valid() || !self.internal_genlock {
            log::error!("gen-lock source select needs both channels and internal gen-lock");
            return Err(Error::Unsupported("internal gen-lock is not present"));
        }

        let own = self.channel(direction).genlock();
        let other = self.channel(direction.other()).genlock();
        let paired = matches!(
            (own, other),
            (GenLock::Master, GenLock::Slave)
                | (GenLock::Slave, GenLock::Master)
                | (GenLock::DynamicMaster, GenLock::DynamicSlave)
                | (GenLock::DynamicSlave, GenLock::DynamicMaster)
        );
        if !paired {
            return Err(invalid(format!(
                "{} channel is gen-lock {} but the other channel is {}",
                direction, own, other
            )));
        }

        let chan = self.channel(direction);
        match source {
            GenLockSource::Internal => chan.update_control(Control::empty(), Control::GENLCK_SRC),
            GenLockSource::External => chan.update_control(Control::GENLCK_SRC, Control::empty()),
        }
        Ok(())
    }
}

fn service<R: Registers>(chan: &Channel<R>, callbacks: &mut Callbacks) {
    if !chan.is_valid() {
        log::warn!("{}: interrupt on absent channel", chan.direction());
        return;
    }

    let pending = chan.pending_interrupts() & chan.enabled_interrupts();
    if !pending.is_empty() {
        chan.clear_interrupts(pending);
    }
    callbacks.dispatch(chan.direction(), pending);
}
