use std::convert::TryFrom;

use super::{Channel, Direction};
use crate::config::GenLock;
use crate::descriptor::{check_frame_delay, check_size, pack_stride_frame_delay};
use crate::error::{invalid, Error, Result};
use crate::hw::{self, Control};
use crate::registers::Registers;

/// Transfer parameters of a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Setup {
    /// Lines per frame
    pub vsize: u32,
    /// Bytes per line
    pub hsize: u32,
    /// Bytes between the starts of two lines
    pub stride: u32,
    /// Frames to lag behind the gen-lock master
    pub frame_delay: u32,
    /// Cycle through all frame stores; otherwise park on `park_frame`
    pub circular: bool,
    pub park_frame: u32,
    /// Gen-lock or frame sync enable
    pub sync: bool,
    /// Gen-lock source channel number
    pub read_pointer: u32,
    /// Stop after the frame counter expires
    pub frame_counter: bool,
    /// Repeat the previous frame on gen-lock errors; masters only
    pub genlock_repeat: bool,
    /// Write frames bottom-up; write channels with flip support only
    pub vertical_flip: bool,
    /// Physical address of every frame buffer
    pub frame_addresses: Vec<u64>,
}

impl Setup {
    /// Circular transfer of frames with the given geometry
    pub fn new(vsize: u32, hsize: u32, stride: u32) -> Self {
        Setup {
            vsize,
            hsize,
            stride,
            circular: true,
            ..Setup::default()
        }
    }
}

/// Rounds `value` up to the next multiple of `width`
pub(crate) fn align_up(value: u32, width: u32) -> u32 {
    if width == 0 {
        return value;
    }
    let width = u64::from(width);
    let aligned = (u64::from(value) + width - 1) / width * width;
    u32::try_from(aligned).unwrap_or(u32::MAX)
}

impl<R: Registers> Channel<R> {
    /// Programs the transfer geometry and mode
    ///
    /// Without a realignment engine the horizontal size and stride are rounded up to the
    /// channel's alignment. Nothing is written to the hardware if validation fails.
    pub fn configure(&mut self, setup: &Setup) -> Result<()> {
        if !self.valid {
            return Err(Error::NotInitialized);
        }
        if self.has_sg && self.is_busy() {
            return Err(Error::Busy);
        }

        let (hsize, stride) = if self.has_dre {
            (setup.hsize, setup.stride)
        } else {
            let line_width = match self.direction {
                Direction::Read => self.stream_width,
                Direction::Write => self.word_length,
            };
            (
                align_up(setup.hsize, line_width),
                align_up(setup.stride, self.word_length),
            )
        };
        if hsize != setup.hsize || stride != setup.stride {
            log::debug!(
                "{}: hsize {} -> {}, stride {} -> {}",
                self.direction,
                setup.hsize,
                hsize,
                setup.stride,
                stride
            );
        }

        check_size("vertical size", setup.vsize, hw::VSIZE_MAX)?;
        check_size("horizontal size", hsize, hw::HSIZE_MAX)?;
        check_size("stride", stride, hw::STRIDE_MAX)?;
        check_frame_delay(setup.frame_delay)?;

        let mut cr = self.control()
            & !(Control::TAIL_EN
                | Control::SYNC_EN
                | Control::FRMCNT_EN
                | Control::RD_PTR
                | Control::GENLCK_RPT);

        if setup.circular {
            cr |= Control::TAIL_EN;
        } else {
            if self.has_sg && !self.is_running() {
                return Err(invalid(
                    "parking in scatter-gather mode needs a running channel",
                ));
            }
            self.check_park_frame(setup.park_frame)?;
        }

        if setup.sync && self.genlock != GenLock::Master {
            cr |= Control::SYNC_EN;
        }
        if setup.genlock_repeat && self.genlock.is_master() {
            cr |= Control::GENLCK_RPT;
        }
        if setup.frame_counter {
            cr |= Control::FRMCNT_EN;
        }
        cr |= Control::from_bits_retain(setup.read_pointer << hw::CR_RD_PTR_SHIFT)
            & Control::RD_PTR;

        if !setup.circular {
            self.set_park_frame(setup.park_frame)?;
        }
        self.write(hw::CR, cr.bits());

        if self.has_vflip {
            let set = if setup.vertical_flip { hw::VFLIP_EN } else { 0 };
            self.regs
                .modify(self.instance_base + hw::VFLIP, hw::VFLIP_EN, set);
        }

        if self.has_sg {
            for bd in self.ring.iter_mut() {
                bd.set_vsize(setup.vsize)?;
                bd.set_hsize(hsize)?;
                bd.set_stride(stride)?;
                bd.set_frame_delay(setup.frame_delay)?;
            }
            self.flush_ring();
        } else {
            self.regs.write(self.addr_base + hw::HSIZE, hsize);
            self.regs.write(
                self.addr_base + hw::STRD_FRMDLY,
                pack_stride_frame_delay(stride, setup.frame_delay),
            );
        }

        self.vsize = setup.vsize;
        self.hsize = hsize;
        self.stride = stride;
        log::debug!(
            "{} configured: {}x{} lines, stride {}, {}",
            self.direction,
            hsize,
            setup.vsize,
            stride,
            if setup.circular { "circular" } else { "parked" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ChannelConfig, Config};
    use crate::memory::HostMemory;
    use crate::sim::Sim;

    fn config(dre: bool) -> Config {
        let desc = ChannelConfig {
            dre,
            data_width: 32,
            stream_width: 24,
            ..ChannelConfig::default()
        };
        Config {
            max_frame_stores: 3,
            vertical_flip: true,
            mm2s: desc.clone(),
            s2mm: desc,
            ..Config::default()
        }
    }

    fn channel(direction: Direction, has_sg: bool, dre: bool) -> (Arc<Sim>, Channel<Sim>) {
        let sim = Arc::new(Sim::new());
        let mut chan = Channel::from_config(sim.clone(), direction, &config(dre), has_sg);
        chan.init_ring(3).unwrap();
        (sim, chan)
    }

    #[test]
    fn alignment_rounds_up_to_the_next_multiple() {
        assert_eq!(align_up(10, 4), 12);
        assert_eq!(align_up(12, 4), 12);
        assert_eq!(align_up(1, 3), 3);
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn write_channel_rounds_hsize_to_word_length() {
        let (_sim, mut chan) = channel(Direction::Write, false, false);
        chan.configure(&Setup::new(100, 10, 10)).unwrap();
        assert_eq!(chan.hsize(), 12);
        assert_eq!(chan.stride(), 12);
    }

    #[test]
    fn read_channel_rounds_hsize_to_stream_width() {
        let (_sim, mut chan) = channel(Direction::Read, false, false);
        chan.configure(&Setup::new(100, 10, 10)).unwrap();
        assert_eq!(chan.hsize(), 12);

        chan.configure(&Setup::new(100, 13, 16)).unwrap();
        assert_eq!(chan.hsize(), 15);
        assert_eq!(chan.stride(), 16);
    }

    #[test]
    fn rounded_hsize_is_the_smallest_aligned_value() {
        let (_sim, mut chan) = channel(Direction::Write, false, false);
        for h in 1..=64 {
            chan.configure(&Setup::new(10, h, 64)).unwrap();
            let stored = chan.hsize();
            assert_eq!(stored % 4, 0);
            assert!(stored >= h);
            assert!(stored - h < 4);
        }
    }

    #[test]
    fn realignment_engine_keeps_sizes() {
        let (_sim, mut chan) = channel(Direction::Write, false, true);
        chan.configure(&Setup::new(100, 10, 10)).unwrap();
        assert_eq!(chan.hsize(), 10);
        assert_eq!(chan.stride(), 10);
    }

    #[test]
    fn direct_mode_writes_geometry_registers() {
        let (sim, mut chan) = channel(Direction::Write, false, false);
        let mut setup = Setup::new(720, 3840, 3840);
        setup.frame_delay = 2;
        chan.configure(&setup).unwrap();

        assert_eq!(sim.get(hw::S2MM_ADDR_BASE + hw::HSIZE), 3840);
        assert_eq!(sim.get(hw::S2MM_ADDR_BASE + hw::STRD_FRMDLY), 0x0200_0F00);
        assert!(chan.control().contains(Control::TAIL_EN));
    }

    #[test]
    fn direct_mode_rejects_out_of_range_sizes() {
        let (sim, mut chan) = channel(Direction::Write, false, false);
        let cr = sim.get(hw::S2MM_BASE + hw::CR);

        for setup in &[
            Setup::new(hw::VSIZE_MAX + 1, 64, 64),
            Setup::new(0, 64, 64),
            Setup::new(10, hw::HSIZE_MAX + 1, 64),
            Setup::new(10, 64, hw::STRIDE_MAX + 1),
        ] {
            assert!(matches!(
                chan.configure(setup),
                Err(Error::InvalidParameter(_))
            ));
        }
        assert_eq!(sim.get(hw::S2MM_BASE + hw::CR), cr);
        assert_eq!(chan.hsize(), 0);
    }

    #[test]
    fn sg_mode_fills_every_descriptor() {
        let (_sim, mut chan) = channel(Direction::Read, true, false);
        chan.set_descriptor_memory(Box::new(HostMemory::new(0x2000, 0x60)))
            .unwrap();

        let mut setup = Setup::new(480, 1920, 2048);
        setup.frame_delay = 1;
        chan.configure(&setup).unwrap();

        for bd in chan.ring() {
            assert_eq!(bd.vsize(), 480);
            assert_eq!(bd.hsize(), 1920);
            assert_eq!(bd.stride(), 2048);
            assert_eq!(bd.frame_delay(), 1);
        }
    }

    #[test]
    fn parking_beyond_the_last_frame_leaves_control_unchanged() {
        let (sim, mut chan) = channel(Direction::Read, false, false);
        chan.configure(&Setup::new(480, 1920, 1920)).unwrap();
        let cr = sim.get(hw::CR);
        let park = sim.get(hw::PARKPTR);

        let mut setup = Setup::new(480, 1920, 1920);
        setup.circular = false;
        setup.park_frame = hw::max_frame_index(32) + 1;
        assert!(matches!(
            chan.configure(&setup),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(sim.get(hw::CR), cr);
        assert_eq!(sim.get(hw::PARKPTR), park);
    }

    #[test]
    fn parking_in_sg_mode_needs_a_running_channel() {
        let (_sim, mut chan) = channel(Direction::Write, true, false);
        let mut setup = Setup::new(480, 1920, 1920);
        setup.circular = false;
        setup.park_frame = 1;
        assert!(matches!(
            chan.configure(&setup),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn parking_writes_only_this_directions_field() {
        let (sim, mut chan) = channel(Direction::Write, false, false);
        sim.set(hw::PARKPTR, 0x0000_0004);

        let mut setup = Setup::new(480, 1920, 1920);
        setup.circular = false;
        setup.park_frame = 2;
        chan.configure(&setup).unwrap();

        assert_eq!(sim.get(hw::PARKPTR), 0x0000_0204);
        assert!(!chan.control().contains(Control::TAIL_EN));
    }

    #[test]
    fn sync_and_repeat_follow_the_genlock_role() {
        let (_sim, mut chan) = channel(Direction::Read, false, false);
        let mut setup = Setup::new(480, 1920, 1920);
        setup.sync = true;
        setup.genlock_repeat = true;
        setup.frame_counter = true;
        setup.read_pointer = 1;

        chan.configure(&setup).unwrap();
        let cr = chan.control();
        assert!(!cr.contains(Control::SYNC_EN));
        assert!(cr.contains(Control::GENLCK_RPT));
        assert!(cr.contains(Control::FRMCNT_EN));
        assert_eq!((cr & Control::RD_PTR).bits(), 0x100);

        chan.genlock = GenLock::Slave;
        chan.configure(&setup).unwrap();
        let cr = chan.control();
        assert!(cr.contains(Control::SYNC_EN));
        assert!(!cr.contains(Control::GENLCK_RPT));
    }

    #[test]
    fn vertical_flip_preserves_other_bits() {
        let (sim, mut chan) = channel(Direction::Write, false, false);
        sim.set(hw::VFLIP, 0x8000_0000);

        let mut setup = Setup::new(480, 1920, 1920);
        setup.vertical_flip = true;
        chan.configure(&setup).unwrap();
        assert_eq!(sim.get(hw::VFLIP), 0x8000_0001);

        setup.vertical_flip = false;
        chan.configure(&setup).unwrap();
        assert_eq!(sim.get(hw::VFLIP), 0x8000_0000);
    }

    #[test]
    fn configure_needs_a_ring() {
        let sim = Arc::new(Sim::new());
        let mut chan = Channel::absent(sim, Direction::Read);
        assert!(matches!(
            chan.configure(&Setup::new(1, 4, 4)),
            Err(Error::NotInitialized)
        ));
    }

    #[test]
    fn busy_sg_channel_cannot_be_configured() {
        let (sim, mut chan) = channel(Direction::Read, true, false);
        sim.set(hw::SR, 0);
        assert!(matches!(
            chan.configure(&Setup::new(1, 4, 4)),
            Err(Error::Busy)
        ));
    }

    #[test]
    fn wide_channels_park_past_frame_fifteen() {
        let config = Config {
            addr_width: 64,
            ..config(false)
        };
        let sim = Arc::new(Sim::new());
        let mut chan = Channel::from_config(sim.clone(), Direction::Read, &config, false);
        chan.init_ring(3).unwrap();

        let mut setup = Setup::new(480, 1920, 1920);
        setup.circular = false;
        setup.park_frame = 20;
        chan.configure(&setup).unwrap();
        assert_eq!(sim.get(hw::PARKPTR) & hw::PARKPTR_READREF_MASK, 20);

        setup.park_frame = hw::max_frame_index(64) + 1;
        assert!(matches!(
            chan.configure(&setup),
            Err(Error::InvalidParameter(_))
        ));
    }
}
