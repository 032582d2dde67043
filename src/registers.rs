use std::sync::Arc;

/// Raw access to the 32-bit registers of one device
///
/// Offsets are byte offsets into the device's register window. Accesses are assumed to be
/// infallible once the window has been mapped.
pub trait Registers {
    /// Reads the register at `offset`
    fn read(&self, offset: usize) -> u32;

    /// Writes `value` to the register at `offset`
    fn write(&self, offset: usize, value: u32);

    /// Read-modify-write: clears the bits in `clear`, then sets the bits in `set`
    fn modify(&self, offset: usize, clear: u32, set: u32) {
        let value = self.read(offset);
        self.write(offset, (value & !clear) | set);
    }
}

impl<R: Registers + ?Sized> Registers for Arc<R> {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

impl<R: Registers + ?Sized> Registers for &R {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Spins until `done` returns true or `budget` attempts are used up
///
/// Returns whether the condition was met.
///
/// # Example
///
/// ```
/// use vdma::registers::poll;
///
/// let mut count = 0;
/// assert!(poll(10, || { count += 1; count == 3 }));
/// assert!(!poll(10, || false));
/// ```
pub fn poll<F: FnMut() -> bool>(budget: usize, mut done: F) -> bool {
    for _ in 0..budget {
        if done() {
            return true;
        }
        std::hint::spin_loop();
    }
    false
}
