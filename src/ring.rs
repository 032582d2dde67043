use std::slice;

use crate::descriptor::{Descriptor, DESCRIPTOR_SIZE};
use crate::memory::DmaMemory;

/// Circular chain of buffer descriptors, one per frame store
///
/// The descriptors occupy one contiguous block starting at `base`; the last descriptor
/// always points back at the first.
#[derive(Debug, Clone, Default)]
pub struct Ring {
    base: u64,
    descriptors: Vec<Descriptor>,
}

impl Ring {
    /// Builds a zeroed ring of `count` chained descriptors at physical address `base`
    pub fn new(count: usize, base: u64) -> Self {
        let mut ring = Ring {
            base,
            descriptors: vec![Descriptor::default(); count],
        };
        ring.chain();
        ring
    }

    fn chain(&mut self) {
        let count = self.descriptors.len();
        let base = self.base;
        for (i, bd) in self.descriptors.iter_mut().enumerate() {
            let next = (i + 1) % count;
            bd.set_next(base + (next * DESCRIPTOR_SIZE) as u64);
        }
    }

    /// Moves the ring to `base`, zeroing every descriptor
    pub fn relocate(&mut self, base: u64) {
        self.base = base;
        for bd in self.descriptors.iter_mut() {
            *bd = Descriptor::default();
        }
        self.chain();
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Bytes occupied by the whole ring
    pub fn size(&self) -> usize {
        self.descriptors.len() * DESCRIPTOR_SIZE
    }

    /// Physical address of the first descriptor
    pub fn head(&self) -> u64 {
        self.base
    }

    /// Physical address of the last descriptor
    pub fn tail(&self) -> u64 {
        self.phys_addr(self.len().saturating_sub(1))
    }

    /// Physical address of descriptor `index`
    pub fn phys_addr(&self, index: usize) -> u64 {
        self.base + (index * DESCRIPTOR_SIZE) as u64
    }

    /// Index of the descriptor at physical address `addr`
    pub fn index_of(&self, addr: u64) -> Option<usize> {
        if addr < self.base || (addr - self.base) % DESCRIPTOR_SIZE as u64 != 0 {
            return None;
        }
        let index = ((addr - self.base) / DESCRIPTOR_SIZE as u64) as usize;
        if index < self.len() {
            Some(index)
        } else {
            None
        }
    }

    pub fn get(&self, index: usize) -> Option<&Descriptor> {
        self.descriptors.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Descriptor> {
        self.descriptors.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Descriptor> {
        self.descriptors.iter_mut()
    }

    /// Writes every descriptor into `mem`, which must start at the ring's base
    pub fn flush(&self, mem: &mut dyn DmaMemory) {
        for (i, bd) in self.descriptors.iter().enumerate() {
            mem.write_words(i * DESCRIPTOR_SIZE, &bd.encode());
        }
    }
}

impl<'a> IntoIterator for &'a Ring {
    type Item = &'a Descriptor;
    type IntoIter = slice::Iter<'a, Descriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
