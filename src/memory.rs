use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::sync::atomic::{fence, Ordering};
use std::{io, slice};

use crate::sys;

/// Memory the DMA engine can reach: descriptor rings and frame buffers
pub trait DmaMemory {
    /// Physical (bus) address of the first byte, as seen by the DMA engine
    fn phys_addr(&self) -> u64;

    fn as_bytes(&self) -> &[u8];

    fn as_bytes_mut(&mut self) -> &mut [u8];

    /// Size in bytes
    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores native-endian `words` starting at byte `offset`
    fn write_words(&mut self, offset: usize, words: &[u32]) {
        let dst = &mut self.as_bytes_mut()[offset..offset + words.len() * 4];
        for (chunk, word) in dst.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        fence(Ordering::SeqCst);
    }

    /// Loads `words.len()` native-endian words starting at byte `offset`
    fn read_words(&self, offset: usize, words: &mut [u32]) {
        fence(Ordering::SeqCst);
        let src = &self.as_bytes()[offset..offset + words.len() * 4];
        for (chunk, word) in src.chunks_exact(4).zip(words.iter_mut()) {
            *word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }
}

/// Memory-mapped physical memory region
///
/// Used for frame buffers and descriptor rings living in reserved DRAM, mapped either
/// through `/dev/mem` or a udmabuf device node.
///
/// The destructor automatically unmaps the memory and closes the device.
pub struct DmaRegion {
    fd: c_int,
    map: *mut u8,
    map_len: usize,
    data: *mut u8,
    len: usize,
    phys: u64,
}

// The mapping is owned exclusively by the region.
unsafe impl Send for DmaRegion {}

impl DmaRegion {
    /// Maps `len` bytes of physical memory starting at `phys` through `/dev/mem`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vdma::DmaRegion;
    /// let frames = DmaRegion::map_physical(0x1000_0000, 1920 * 1080 * 3 * 3);
    /// ```
    pub fn map_physical(phys: u64, len: usize) -> io::Result<Self> {
        Self::map("/dev/mem", phys, len, phys)
    }

    /// Maps `len` bytes of `path` at byte `offset`; `phys` is the bus address of that offset
    ///
    /// # Arguments
    ///
    /// * `path` - Device node, e.g. `/dev/mem` or `/dev/udmabuf0`
    /// * `phys` - Bus address of the first mapped byte
    /// * `len` - Length in bytes
    /// * `offset` - Offset into the device node, need not be page aligned
    pub fn map<P: AsRef<Path>>(path: P, phys: u64, len: usize, offset: u64) -> io::Result<Self> {
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty region",
            ));
        }

        let page = sys::page_size() as u64;
        let aligned = offset & !(page - 1);
        let lead = (offset - aligned) as usize;
        let map_len = lead + len;

        let fd = sys::open(path, libc::O_RDWR | libc::O_SYNC)?;
        let map = match sys::mmap(fd, map_len, aligned as libc::off_t) {
            Ok(map) => map as *mut u8,
            Err(e) => {
                let _ = sys::close(fd);
                return Err(e);
            }
        };

        log::debug!("mapped {:#x} bytes of physical memory at {:#x}", len, phys);
        Ok(DmaRegion {
            fd,
            map,
            map_len,
            data: unsafe { map.add(lead) },
            len,
            phys,
        })
    }
}

impl DmaMemory for DmaRegion {
    fn phys_addr(&self) -> u64 {
        self.phys
    }

    fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data, self.len) }
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data, self.len) }
    }
}

impl Drop for DmaRegion {
    fn drop(&mut self) {
        unsafe {
            // ignore errors
            let _ = sys::munmap(self.map as *mut c_void, self.map_len);
        }
        let _ = sys::close(self.fd);
    }
}

/// Heap memory standing in for DMA memory
///
/// Suitable where the DMA engine shares the host's address space, and for inspecting
/// descriptors and frames without hardware.
pub struct HostMemory {
    phys: u64,
    bytes: Vec<u8>,
}

impl HostMemory {
    /// Allocates `len` zeroed bytes that the DMA engine sees at `phys`
    pub fn new(phys: u64, len: usize) -> Self {
        HostMemory {
            phys,
            bytes: vec![0; len],
        }
    }

    /// Returns the contents as native-endian words
    pub fn words(&self) -> Vec<u32> {
        let mut words = vec![0; self.bytes.len() / 4];
        self.read_words(0, &mut words);
        words
    }
}

impl DmaMemory for HostMemory {
    fn phys_addr(&self) -> u64 {
        self.phys
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_memory_round_trips_words() {
        let mut mem = HostMemory::new(0x1000, 64);
        mem.write_words(8, &[1, 2, 3]);

        let mut out = [0; 3];
        mem.read_words(8, &mut out);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(mem.words()[..5], [0, 0, 1, 2, 3]);
        assert_eq!(mem.len(), 64);
        assert_eq!(mem.phys_addr(), 0x1000);
    }

    #[test]
    fn mapping_an_empty_region_fails() {
        assert!(DmaRegion::map("/dev/null", 0, 0, 0).is_err());
    }
}
