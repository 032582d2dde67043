use super::Channel;
use crate::error::{invalid, Error, Result};
use crate::hw;
use crate::registers::Registers;

impl<R: Registers> Channel<R> {
    /// Programs the physical address of every frame buffer
    ///
    /// In scatter-gather mode the addresses go into the descriptors. In direct-register mode
    /// they go into the start address registers; frames past half of the addressable frame
    /// stores are written through the high bank, which is deselected again once the last
    /// address is written.
    pub fn set_buffer_addresses(&mut self, addresses: &[u64]) -> Result<()> {
        if !self.valid {
            return Err(Error::NotInitialized);
        }

        let limit = if self.has_sg {
            self.ring.len()
        } else {
            hw::max_frame_stores(self.addr_width)
        };
        if addresses.len() > limit {
            return Err(invalid(format!(
                "{} frame addresses for {} frame stores",
                addresses.len(),
                limit
            )));
        }

        for (i, &addr) in addresses.iter().enumerate() {
            if !self.has_dre && addr % u64::from(self.word_length) != 0 {
                return Err(invalid(format!(
                    "frame {} at {:#x} is not {}-byte aligned",
                    i, addr, self.word_length
                )));
            }
            if self.addr_width <= 32 && addr > u64::from(u32::MAX) {
                return Err(invalid(format!(
                    "frame {} at {:#x} exceeds the 32-bit address space",
                    i, addr
                )));
            }
        }

        if self.has_sg {
            for (bd, &addr) in self.ring.iter_mut().zip(addresses) {
                bd.set_start_addr(addr);
            }
            self.flush_ring();
            return Ok(());
        }

        let bound = hw::max_frame_stores(self.addr_width) / 2;
        let wide = self.addr_width > 32;
        let mut high_bank = false;
        let mut slot = 0;

        for (i, &addr) in addresses.iter().enumerate() {
            if i > bound && !high_bank {
                self.write(hw::HI_FRMBUF, hw::HI_FRMBUF_ENABLE);
                high_bank = true;
                slot = 0;
            }

            if wide {
                let offset = self.addr_base + slot * 2 * hw::START_ADDR_LEN;
                self.regs.write(offset + hw::START_ADDR, addr as u32);
                self.regs
                    .write(offset + hw::START_ADDR_MSB, (addr >> 32) as u32);
            } else {
                let offset = self.addr_base + hw::START_ADDR + slot * hw::START_ADDR_LEN;
                self.regs.write(offset, addr as u32);
            }
            slot += 1;
        }

        if addresses.len() > bound {
            self.write(hw::HI_FRMBUF, hw::HI_FRMBUF_DISABLE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::channel::Direction;
    use crate::memory::HostMemory;
    use crate::sim::Sim;

    fn channel(direction: Direction, has_sg: bool, addr_width: u8) -> (Arc<Sim>, Channel<Sim>) {
        let config = Config {
            addr_width,
            max_frame_stores: 16,
            ..Config::default()
        };
        let sim = Arc::new(Sim::new());
        let mut chan = Channel::from_config(sim.clone(), direction, &config, has_sg);
        chan.init_ring(16).unwrap();
        (sim, chan)
    }

    fn frames(count: usize) -> Vec<u64> {
        (0..count as u64).map(|i| 0x1000_0000 + i * 0x10_0000).collect()
    }

    #[test]
    fn high_bank_toggles_once_around_frame_nine() {
        let (sim, mut chan) = channel(Direction::Read, false, 32);
        chan.set_buffer_addresses(&frames(10)).unwrap();

        let hi = hw::MM2S_BASE + hw::HI_FRMBUF;
        let start = hw::MM2S_ADDR_BASE + hw::START_ADDR;
        let writes = sim.writes();

        let toggles: Vec<_> = writes
            .iter()
            .enumerate()
            .filter(|(_, w)| w.0 == hi)
            .collect();
        assert_eq!(toggles.len(), 2);
        assert_eq!(toggles[0].1 .1, hw::HI_FRMBUF_ENABLE);
        assert_eq!(toggles[1].1 .1, hw::HI_FRMBUF_DISABLE);

        // nine frames in the low bank, then the enable, then frame nine
        let addr_writes: Vec<_> = writes[..toggles[0].0]
            .iter()
            .filter(|w| w.0 >= start && w.0 < start + 16 * 4)
            .collect();
        assert_eq!(addr_writes.len(), 9);
        assert_eq!(writes[toggles[0].0 + 1], (start, 0x1090_0000));
        assert_eq!(toggles[1].0, toggles[0].0 + 2);
    }

    #[test]
    fn short_address_sets_stay_in_the_low_bank() {
        let (sim, mut chan) = channel(Direction::Write, false, 32);
        chan.set_buffer_addresses(&frames(3)).unwrap();

        let start = hw::S2MM_ADDR_BASE + hw::START_ADDR;
        assert_eq!(sim.get(start), 0x1000_0000);
        assert_eq!(sim.get(start + 4), 0x1010_0000);
        assert_eq!(sim.get(start + 8), 0x1020_0000);
        assert!(sim
            .writes()
            .iter()
            .all(|w| w.0 != hw::S2MM_BASE + hw::HI_FRMBUF));
    }

    #[test]
    fn wide_addresses_use_both_words() {
        let (sim, mut chan) = channel(Direction::Read, false, 64);
        chan.set_buffer_addresses(&[0x1_2000_0000, 0x2_4000_0000])
            .unwrap();

        let base = hw::MM2S_ADDR_BASE;
        assert_eq!(sim.get(base + hw::START_ADDR), 0x2000_0000);
        assert_eq!(sim.get(base + hw::START_ADDR_MSB), 0x1);
        assert_eq!(sim.get(base + hw::START_ADDR + 8), 0x4000_0000);
        assert_eq!(sim.get(base + hw::START_ADDR_MSB + 8), 0x2);
    }

    #[test]
    fn unaligned_address_without_dre_is_rejected() {
        let (sim, mut chan) = channel(Direction::Read, false, 32);
        assert!(matches!(
            chan.set_buffer_addresses(&[0x1000_0000, 0x1000_0003]),
            Err(Error::InvalidParameter(_))
        ));
        assert!(sim.writes().is_empty());
    }

    #[test]
    fn sg_addresses_land_in_descriptors() {
        let (_sim, mut chan) = channel(Direction::Write, true, 32);
        chan.set_descriptor_memory(Box::new(HostMemory::new(0x8000, 0x200)))
            .unwrap();
        chan.set_buffer_addresses(&frames(16)).unwrap();

        for (i, bd) in chan.ring().iter().enumerate() {
            assert_eq!(bd.start_addr(), 0x1000_0000 + i as u64 * 0x10_0000);
        }
        assert!(matches!(
            chan.set_buffer_addresses(&frames(17)),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn wide_addresses_cross_into_the_high_bank() {
        let (sim, mut chan) = channel(Direction::Read, false, 64);
        let addresses: Vec<u64> = (0..18u64)
            .map(|i| 0x1_0000_0000 + i * 0x10_0000)
            .collect();
        chan.set_buffer_addresses(&addresses).unwrap();

        let hi = hw::MM2S_BASE + hw::HI_FRMBUF;
        let start = hw::MM2S_ADDR_BASE + hw::START_ADDR;
        let msb = hw::MM2S_ADDR_BASE + hw::START_ADDR_MSB;
        let writes = sim.writes();

        let toggles: Vec<_> = writes
            .iter()
            .enumerate()
            .filter(|(_, w)| w.0 == hi)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(toggles.len(), 2);
        let enable = toggles[0];

        // seventeen two-word slots before the bank switch
        let low: Vec<_> = writes[..enable]
            .iter()
            .filter(|w| w.0 >= start && w.0 < start + 17 * 8)
            .collect();
        assert_eq!(low.len(), 34);
        assert!(writes[..enable].contains(&(start + 16 * 8, 0x0100_0000)));

        assert_eq!(writes[enable], (hi, hw::HI_FRMBUF_ENABLE));
        assert_eq!(writes[enable + 1], (start, 0x0110_0000));
        assert_eq!(writes[enable + 2], (msb, 0x1));
        assert_eq!(writes[enable + 3], (hi, hw::HI_FRMBUF_DISABLE));
        assert_eq!(sim.get(msb), 0x1);
    }
}
