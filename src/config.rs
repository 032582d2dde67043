//! Static hardware description of VDMA instances
//!
//! A [`Config`] describes what was synthesized into one VDMA core. It is read-only input to
//! [`crate::Vdma::configure`]. Descriptions can be kept in a TOML file holding one
//! `[[device]]` table per instance:
//!
//! ```toml
//! [[device]]
//! device-id = 0
//! base-address = 0x43000000
//! uio-name = "axi_vdma"
//! max-frame-stores = 3
//!
//! [device.mm2s]
//! present = true
//! data-width = 64
//! stream-width = 32
//! genlock = "master"
//! ```

use std::convert::TryFrom;
use std::path::Path;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};

use crate::channel::Direction;
use crate::error::Result;
use crate::hw::DebugFeatures;

/// Gen-lock role of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenLock {
    #[default]
    Master,
    Slave,
    DynamicMaster,
    DynamicSlave,
    None,
}

impl GenLock {
    /// Static or dynamic master
    pub fn is_master(self) -> bool {
        matches!(self, GenLock::Master | GenLock::DynamicMaster)
    }
}

impl TryFrom<u32> for GenLock {
    type Error = ();

    fn try_from(repr: u32) -> std::result::Result<Self, Self::Error> {
        match repr {
            0 => Ok(GenLock::Master),
            1 => Ok(GenLock::Slave),
            2 => Ok(GenLock::DynamicMaster),
            3 => Ok(GenLock::DynamicSlave),
            _ => Err(()),
        }
    }
}

impl fmt::Display for GenLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            GenLock::Master => write!(f, "master"),
            GenLock::Slave => write!(f, "slave"),
            GenLock::DynamicMaster => write!(f, "dynamic master"),
            GenLock::DynamicSlave => write!(f, "dynamic slave"),
            GenLock::None => write!(f, "none"),
        }
    }
}

/// Which channels have frame sync inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsyncUsage {
    None,
    #[default]
    Both,
    ReadOnly,
    WriteOnly,
}

impl FsyncUsage {
    /// Whether the channel in `direction` has a frame sync input
    pub fn covers(self, direction: Direction) -> bool {
        match self {
            FsyncUsage::None => false,
            FsyncUsage::Both => true,
            FsyncUsage::ReadOnly => direction == Direction::Read,
            FsyncUsage::WriteOnly => direction == Direction::Write,
        }
    }
}

impl TryFrom<u32> for FsyncUsage {
    type Error = ();

    fn try_from(repr: u32) -> std::result::Result<Self, Self::Error> {
        match repr {
            0 => Ok(FsyncUsage::None),
            1 => Ok(FsyncUsage::Both),
            2 => Ok(FsyncUsage::ReadOnly),
            3 => Ok(FsyncUsage::WriteOnly),
            _ => Err(()),
        }
    }
}

/// Per-direction hardware description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ChannelConfig {
    /// Channel synthesized at all
    pub present: bool,
    /// Data realignment engine present
    pub dre: bool,
    /// Memory-mapped data width in bits
    pub data_width: u32,
    /// Stream data width in bits
    pub stream_width: u32,
    /// Line buffer depth in bytes, 0 if there is none
    pub line_buffer_depth: u32,
    pub genlock: GenLock,
    pub threshold_reg: bool,
    pub frame_store_reg: bool,
    pub delay_counter: bool,
    pub frame_counter: bool,
}

impl ChannelConfig {
    /// Optional registers present for this channel
    pub fn debug_features(&self, enable_all: bool) -> DebugFeatures {
        if enable_all {
            return DebugFeatures::all();
        }

        let mut features = DebugFeatures::empty();
        features.set(DebugFeatures::THRESHOLD_REG, self.threshold_reg);
        features.set(DebugFeatures::FRAME_STORE_REG, self.frame_store_reg);
        features.set(DebugFeatures::DELAY_COUNTER, self.delay_counter);
        features.set(DebugFeatures::FRAME_COUNTER, self.frame_counter);
        features
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            present: true,
            dre: false,
            data_width: 64,
            stream_width: 32,
            line_buffer_depth: 512,
            genlock: GenLock::Master,
            threshold_reg: false,
            frame_store_reg: false,
            delay_counter: false,
            frame_counter: false,
        }
    }
}

/// Hardware description of one VDMA instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub device_id: u16,
    /// Physical base address of the register window
    pub base_address: u64,
    /// Name of the UIO device exposing the registers
    pub uio_name: Option<String>,
    /// Frame stores synthesized per channel
    pub max_frame_stores: u8,
    /// Scatter-gather engine present
    pub has_sg: bool,
    pub use_fsync: FsyncUsage,
    pub flush_on_fsync: bool,
    pub internal_genlock: bool,
    /// S2MM frame sync taken from the stream's TUSER bit
    pub s2mm_sof: bool,
    /// Address width in bits
    pub addr_width: u8,
    pub vertical_flip: bool,
    /// All optional debug registers present
    pub enable_all_debug: bool,
    pub mm2s: ChannelConfig,
    pub s2mm: ChannelConfig,
}

impl Config {
    /// Returns the description of the channel in `direction`
    pub fn channel(&self, direction: Direction) -> &ChannelConfig {
        match direction {
            Direction::Read => &self.mm2s,
            Direction::Write => &self.s2mm,
        }
    }

    /// Parses a single device description
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_id: 0,
            base_address: 0x4300_0000,
            uio_name: Some("axi_vdma".to_string()),
            max_frame_stores: 3,
            has_sg: false,
            use_fsync: FsyncUsage::Both,
            flush_on_fsync: false,
            internal_genlock: true,
            s2mm_sof: false,
            addr_width: 32,
            vertical_flip: false,
            enable_all_debug: false,
            mm2s: ChannelConfig::default(),
            s2mm: ChannelConfig {
                genlock: GenLock::Slave,
                ..ChannelConfig::default()
            },
        }
    }
}

/// Descriptions of every VDMA instance in a design
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTable {
    #[serde(rename = "device", default)]
    devices: Vec<Config>,
}

impl ConfigTable {
    pub fn new(devices: Vec<Config>) -> Self {
        ConfigTable { devices }
    }

    /// Parses a table of `[[device]]` entries
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let table: ConfigTable = toml::from_str(s)?;
        log::debug!("parsed {} VDMA device description(s)", table.devices.len());
        Ok(table)
    }

    /// Loads a table from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let table = Self::from_toml_str(&content)?;
        log::info!(
            "loaded {} VDMA device description(s) from {}",
            table.devices.len(),
            path.as_ref().display()
        );
        Ok(table)
    }

    /// Returns the description of device `device_id`
    pub fn lookup(&self, device_id: u16) -> Option<&Config> {
        let config = self.devices.iter().find(|c| c.device_id == device_id);
        if config.is_none() {
            log::warn!("no VDMA device with id {}", device_id);
        }
        config
    }

    pub fn devices(&self) -> &[Config] {
        &self.devices
    }
}
