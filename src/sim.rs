//! Simulated VDMA register file for unit tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::hw::{self, Control, Status};
use crate::registers::Registers;

/// Register file that behaves enough like the hardware for the driver logic
///
/// Resets complete immediately and leave the channel halted, the run/stop bit clears or
/// sets the halted bit, and interrupt and error bits in the status registers are cleared by
/// writing ones. Every write is logged.
pub struct Sim {
    regs: RefCell<HashMap<usize, u32>>,
    writes: RefCell<Vec<(usize, u32)>>,
    stuck_reset: Cell<bool>,
    stuck_halted: Cell<bool>,
}

const CHANNELS: [usize; 2] = [hw::MM2S_BASE, hw::S2MM_BASE];
const W1C: u32 = 0x0000_7000 | 0x0000_8FF0;

impl Sim {
    pub fn new() -> Self {
        let mut regs = HashMap::new();
        for base in CHANNELS.iter() {
            regs.insert(base + hw::SR, Status::HALTED.bits());
        }
        regs.insert(hw::VERSION, 0x6200_0000);
        Sim {
            regs: RefCell::new(regs),
            writes: RefCell::new(Vec::new()),
            stuck_reset: Cell::new(false),
            stuck_halted: Cell::new(false),
        }
    }

    /// Current register value, bypassing the write log
    pub fn get(&self, offset: usize) -> u32 {
        self.regs.borrow().get(&offset).copied().unwrap_or(0)
    }

    /// Overwrites a register, bypassing the write log and side effects
    pub fn set(&self, offset: usize, value: u32) {
        self.regs.borrow_mut().insert(offset, value);
    }

    /// Latches status bits as the hardware would
    pub fn raise(&self, offset: usize, bits: u32) {
        let value = self.get(offset);
        self.set(offset, value | bits);
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.writes.borrow().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.borrow_mut().clear();
    }

    /// Makes resets never complete
    pub fn stick_reset(&self, stuck: bool) {
        self.stuck_reset.set(stuck);
    }

    /// Makes channels ignore the run/stop bit
    pub fn stick_halted(&self, stuck: bool) {
        self.stuck_halted.set(stuck);
    }
}

impl Registers for Sim {
    fn read(&self, offset: usize) -> u32 {
        self.get(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        self.writes.borrow_mut().push((offset, value));

        let channel = CHANNELS.iter().find(|&&base| offset == base + hw::CR || offset == base + hw::SR);
        let base = match channel {
            Some(&base) => base,
            None => {
                self.set(offset, value);
                return;
            }
        };

        if offset == base + hw::SR {
            let sr = self.get(offset);
            self.set(offset, sr & !(value & W1C));
            return;
        }

        let sr = self.get(base + hw::SR);
        if value & Control::RESET.bits() != 0 {
            if self.stuck_reset.get() {
                self.set(offset, value);
            } else {
                self.set(offset, value & !Control::RESET.bits());
                self.set(base + hw::SR, Status::HALTED.bits());
            }
            return;
        }

        self.set(offset, value);
        if value & Control::RUN_STOP.bits() != 0 && !self.stuck_halted.get() {
            self.set(base + hw::SR, sr & !Status::HALTED.bits());
        } else {
            self.set(base + hw::SR, sr | Status::HALTED.bits());
        }
    }
}
