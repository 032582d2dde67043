//! Scatter-gather buffer descriptors

use crate::error::{invalid, Result};
use crate::hw;

/// Size of one descriptor in memory, in bytes
pub const DESCRIPTOR_SIZE: usize = 0x20;
/// Descriptor words in memory
pub const DESCRIPTOR_WORDS: usize = DESCRIPTOR_SIZE / 4;
/// Required alignment of every descriptor
pub const DESCRIPTOR_ALIGNMENT: u64 = 0x20;

// word indices of the in-memory layout
const NDESC: usize = 0;
const NDESC_MSB: usize = 1;
const START_ADDR: usize = 2;
const START_ADDR_MSB: usize = 3;
const VSIZE: usize = 4;
const HSIZE: usize = 5;
const STRIDE_FRMDLY: usize = 6;

/// One frame transfer in a descriptor ring
///
/// Sizes are validated when set; [`Descriptor::encode`] packs the fields into the layout the
/// hardware fetches, with stride and frame delay sharing one word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Descriptor {
    next: u64,
    start_addr: u64,
    vsize: u32,
    hsize: u32,
    stride: u32,
    frame_delay: u32,
}

impl Descriptor {
    /// Physical address of the following descriptor
    pub fn next(&self) -> u64 {
        self.next
    }

    pub fn set_next(&mut self, addr: u64) {
        self.next = addr;
    }

    /// Physical address of the frame buffer
    pub fn start_addr(&self) -> u64 {
        self.start_addr
    }

    pub fn set_start_addr(&mut self, addr: u64) {
        self.start_addr = addr;
    }

    /// Number of lines
    pub fn vsize(&self) -> u32 {
        self.vsize
    }

    pub fn set_vsize(&mut self, vsize: u32) -> Result<()> {
        check_size("vertical size", vsize, hw::VSIZE_MAX)?;
        self.vsize = vsize;
        Ok(())
    }

    /// Bytes per line
    pub fn hsize(&self) -> u32 {
        self.hsize
    }

    pub fn set_hsize(&mut self, hsize: u32) -> Result<()> {
        check_size("horizontal size", hsize, hw::HSIZE_MAX)?;
        self.hsize = hsize;
        Ok(())
    }

    /// Bytes from the start of one line to the start of the next
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn set_stride(&mut self, stride: u32) -> Result<()> {
        check_size("stride", stride, hw::STRIDE_MAX)?;
        self.stride = stride;
        Ok(())
    }

    /// Frames to lag behind the gen-lock master
    pub fn frame_delay(&self) -> u32 {
        self.frame_delay
    }

    pub fn set_frame_delay(&mut self, delay: u32) -> Result<()> {
        check_frame_delay(delay)?;
        self.frame_delay = delay;
        Ok(())
    }

    /// Packs the descriptor into its memory layout
    pub fn encode(&self) -> [u32; DESCRIPTOR_WORDS] {
        let mut words = [0; DESCRIPTOR_WORDS];
        words[NDESC] = self.next as u32;
        words[NDESC_MSB] = (self.next >> 32) as u32;
        words[START_ADDR] = self.start_addr as u32;
        words[START_ADDR_MSB] = (self.start_addr >> 32) as u32;
        words[VSIZE] = self.vsize;
        words[HSIZE] = self.hsize;
        words[STRIDE_FRMDLY] = pack_stride_frame_delay(self.stride, self.frame_delay);
        words
    }

    /// Unpacks a descriptor from its memory layout
    pub fn decode(words: &[u32; DESCRIPTOR_WORDS]) -> Self {
        let (stride, frame_delay) = unpack_stride_frame_delay(words[STRIDE_FRMDLY]);
        Descriptor {
            next: u64::from(words[NDESC]) | u64::from(words[NDESC_MSB]) << 32,
            start_addr: u64::from(words[START_ADDR]) | u64::from(words[START_ADDR_MSB]) << 32,
            vsize: words[VSIZE] & hw::VSIZE_MAX,
            hsize: words[HSIZE] & hw::HSIZE_MAX,
            stride,
            frame_delay,
        }
    }
}

/// Packs stride and frame delay into the word they share in descriptors and registers
pub(crate) fn pack_stride_frame_delay(stride: u32, frame_delay: u32) -> u32 {
    (stride & hw::STRIDE_MASK) | ((frame_delay << hw::FRMDLY_SHIFT) & hw::FRMDLY_MASK)
}

pub(crate) fn unpack_stride_frame_delay(word: u32) -> (u32, u32) {
    (
        word & hw::STRIDE_MASK,
        (word & hw::FRMDLY_MASK) >> hw::FRMDLY_SHIFT,
    )
}

pub(crate) fn check_size(what: &str, value: u32, max: u32) -> Result<()> {
    if value == 0 || value > max {
        return Err(invalid(format!(
            "{} {} outside of 1..={}",
            what, value, max
        )));
    }
    Ok(())
}

pub(crate) fn check_frame_delay(delay: u32) -> Result<()> {
    if delay > hw::FRMDLY_MAX {
        return Err(invalid(format!(
            "frame delay {} exceeds {}",
            delay,
            hw::FRMDLY_MAX
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn stride_and_frame_delay_share_a_word() {
        let mut bd = Descriptor::default();
        bd.set_frame_delay(5).unwrap();
        bd.set_stride(0x1680).unwrap();
        assert_eq!(bd.encode()[STRIDE_FRMDLY], 0x0500_1680);

        bd.set_stride(0x0F00).unwrap();
        assert_eq!(bd.frame_delay(), 5);
        assert_eq!(bd.encode()[STRIDE_FRMDLY], 0x0500_0F00);

        bd.set_frame_delay(0).unwrap();
        assert_eq!(bd.encode()[STRIDE_FRMDLY], 0x0000_0F00);
    }

    #[test]
    fn out_of_range_values_leave_descriptor_unmodified() {
        let mut bd = Descriptor::default();
        bd.set_vsize(720).unwrap();
        bd.set_hsize(3840).unwrap();
        let before = bd;

        assert!(matches!(bd.set_vsize(0), Err(Error::InvalidParameter(_))));
        assert!(matches!(
            bd.set_vsize(hw::VSIZE_MAX + 1),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            bd.set_hsize(hw::HSIZE_MAX + 1),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(bd.set_stride(0), Err(Error::InvalidParameter(_))));
        assert!(matches!(
            bd.set_frame_delay(hw::FRMDLY_MAX + 1),
            Err(Error::InvalidParameter(_))
        ));
        assert_eq!(bd, before);
    }

    #[test]
    fn wide_addresses_are_split_across_two_words() {
        let mut bd = Descriptor::default();
        bd.set_next(0x0000_0001_2345_6780);
        bd.set_start_addr(0x0000_0002_0000_1000);
        bd.set_vsize(1080).unwrap();
        bd.set_hsize(5760).unwrap();
        bd.set_stride(5760).unwrap();

        let words = bd.encode();
        assert_eq!(words[NDESC], 0x2345_6780);
        assert_eq!(words[NDESC_MSB], 0x1);
        assert_eq!(words[START_ADDR], 0x0000_1000);
        assert_eq!(words[START_ADDR_MSB], 0x2);
        assert_eq!(Descriptor::decode(&words), bd);
    }
}
