//! This crate provides safe bindings to the Xilinx AXI Video DMA (VDMA) engine.
//!
//! The core is driven from user space: its register window is mapped through the Linux
//! UIO framework, frame buffers and descriptor rings live in physical memory mapped
//! through `/dev/mem` or a udmabuf node.
//!
//! A core has two channels. The read channel (MM2S) streams frames from memory to a
//! video sink, the write channel (S2MM) captures a video stream into memory. Each
//! channel cycles through a set of frame stores, either by fetching a ring of buffer
//! descriptors (scatter-gather) or from addresses programmed into its register bank
//! (direct-register mode).
//!
//! # Example
//!
//! ```no_run
//! use vdma::{Config, Direction, Setup, Vdma};
//!
//! let config = Config::default();
//! let mut vdma = Vdma::open(&config).expect("failed to open VDMA");
//!
//! let mut setup = Setup::new(720, 1280 * 3, 1280 * 3);
//! setup.frame_addresses = vec![0x1000_0000, 0x1040_0000, 0x1080_0000];
//! vdma.start_read_frame(&setup).expect("failed to start read channel");
//! println!("read channel on frame store {}", vdma.current_frame_store(Direction::Read).unwrap());
//! ```

mod error;
pub use error::{Error, Result};

pub mod hw;
pub use hw::{Control, DebugFeatures, Interrupts, Status};

pub mod registers;
pub use registers::Registers;

mod sys;

pub mod uio;
pub use uio::Uio;

mod memory;
pub use memory::{DmaMemory, DmaRegion, HostMemory};

mod descriptor;
pub use descriptor::{Descriptor, DESCRIPTOR_ALIGNMENT, DESCRIPTOR_SIZE};

mod ring;
pub use ring::Ring;

mod config;
pub use config::{ChannelConfig, Config, ConfigTable, FsyncUsage, GenLock};

mod channel;
pub use channel::{Channel, Direction, FrameCounter, Setup};

mod interrupt;
pub use interrupt::{Callback, Handler};

mod device;
pub use device::{FsyncSource, GenLockSource, Vdma, INIT_POLL_BUDGET};

pub mod video;
pub use video::{Pipeline, Resolution, VideoOutput};

#[cfg(test)]
mod sim;
