//! Video output sequencing around a VDMA core
//!
//! A video output (timing generator plus pixel clock synthesizer) has to be reset and
//! reprogrammed together with the read channel feeding it. [`Pipeline`] performs that
//! sequence and gives access to the frame buffers both channels cycle through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channel::{Direction, Setup};
use crate::device::Vdma;
use crate::error::{invalid, Error, Result};
use crate::memory::DmaMemory;
use crate::registers::{poll, Registers};

/// Bytes per pixel of the frame buffers (8-bit BGR)
pub const BYTES_PER_PIXEL: usize = 3;

/// Polls allowed for a channel reset while starting a pipeline
pub const RESET_POLL_BUDGET: usize = 1000;

/// Sync pulse polarity
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Negative    = 0,
    Positive    = 1,
}

/// Supported display modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "1920x1080p60")]
    R1920x1080p60,
    #[serde(rename = "1280x720p60")]
    R1280x720p60,
    #[serde(rename = "640x480p60")]
    R640x480p60,
}

impl Resolution {
    /// Timing parameters of this mode
    pub fn timing(self) -> &'static Timing {
        match self {
            Resolution::R1920x1080p60 => &TIMINGS[0],
            Resolution::R1280x720p60 => &TIMINGS[1],
            Resolution::R640x480p60 => &TIMINGS[2],
        }
    }

    pub fn width(self) -> u32 {
        self.timing().h_active
    }

    pub fn height(self) -> u32 {
        self.timing().v_active
    }

    /// Bytes per line
    pub fn line_bytes(self) -> usize {
        self.width() as usize * BYTES_PER_PIXEL
    }

    /// Bytes per frame
    pub fn frame_bytes(self) -> usize {
        self.line_bytes() * self.height() as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@60", self.width(), self.height())
    }
}

/// Display timing of one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub resolution: Resolution,
    pub h_active: u32,
    pub h_front_porch: u32,
    pub h_sync: u32,
    pub h_back_porch: u32,
    pub h_polarity: Polarity,
    pub v_active: u32,
    pub v_front_porch: u32,
    pub v_sync: u32,
    pub v_back_porch: u32,
    pub v_polarity: Polarity,
    pub pixel_clock_hz: u32,
}

impl Timing {
    /// Pixel clocks per line, blanking included
    pub fn h_total(&self) -> u32 {
        self.h_active + self.h_front_porch + self.h_sync + self.h_back_porch
    }

    /// Lines per frame, blanking included
    pub fn v_total(&self) -> u32 {
        self.v_active + self.v_front_porch + self.v_sync + self.v_back_porch
    }
}

#[rustfmt::skip]
pub static TIMINGS: [Timing; 3] = [
    Timing {
        resolution: Resolution::R1920x1080p60,
        h_active: 1920, h_front_porch: 88, h_sync: 44, h_back_porch: 148, h_polarity: Polarity::Positive,
        v_active: 1080, v_front_porch: 4, v_sync: 5, v_back_porch: 36, v_polarity: Polarity::Positive,
        pixel_clock_hz: 148_500_000,
    },
    Timing {
        resolution: Resolution::R1280x720p60,
        h_active: 1280, h_front_porch: 110, h_sync: 40, h_back_porch: 220, h_polarity: Polarity::Positive,
        v_active: 720, v_front_porch: 5, v_sync: 5, v_back_porch: 20, v_polarity: Polarity::Positive,
        pixel_clock_hz: 74_250_000,
    },
    Timing {
        resolution: Resolution::R640x480p60,
        h_active: 640, h_front_porch: 16, h_sync: 96, h_back_porch: 48, h_polarity: Polarity::Negative,
        v_active: 480, v_front_porch: 10, v_sync: 2, v_back_porch: 33, v_polarity: Polarity::Negative,
        pixel_clock_hz: 25_000_000,
    },
];

/// Timing generator and pixel clock feeding a display from the read channel
///
/// Implementations that wait for a clock to lock must bound the wait (see
/// [`crate::registers::poll`]) and report [`Error::HardwareFault`] on timeout.
pub trait VideoOutput {
    /// Stops and resets the timing generator
    fn reset(&mut self) -> Result<()>;

    /// Programs pixel clock and timing generator for `resolution`
    fn configure(&mut self, resolution: Resolution) -> Result<()>;

    /// Starts generating sync signals
    fn enable(&mut self) -> Result<()>;
}

/// A VDMA core, its video output and the frame buffers of both directions
pub struct Pipeline<R, V> {
    vdma: Vdma<R>,
    video: V,
    resolution: Resolution,
    read_frames: Option<Box<dyn DmaMemory + Send>>,
    write_frames: Option<Box<dyn DmaMemory + Send>>,
}

impl<R: Registers, V: VideoOutput> Pipeline<R, V> {
    /// Combines a configured VDMA core with its video output
    pub fn new(vdma: Vdma<R>, video: V, resolution: Resolution) -> Self {
        Pipeline {
            vdma,
            video,
            resolution,
            read_frames: None,
            write_frames: None,
        }
    }

    /// Attaches the memory holding the frames of one direction
    ///
    /// The memory must hold one frame per frame store of the channel.
    pub fn set_frame_memory(
        &mut self,
        direction: Direction,
        memory: Box<dyn DmaMemory + Send>,
    ) -> Result<()> {
        let needed = self.frames(direction) * self.resolution.frame_bytes();
        if memory.len() < needed {
            return Err(invalid(format!(
                "{} frame memory holds {} bytes, {} needed",
                direction,
                memory.len(),
                needed
            )));
        }

        match direction {
            Direction::Read => self.read_frames = Some(memory),
            Direction::Write => self.write_frames = Some(memory),
        }
        Ok(())
    }

    pub fn vdma(&self) -> &Vdma<R> {
        &self.vdma
    }

    pub fn vdma_mut(&mut self) -> &mut Vdma<R> {
        &mut self.vdma
    }

    pub fn video(&self) -> &V {
        &self.video
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn frames(&self, direction: Direction) -> usize {
        self.vdma.channel(direction).frame_count()
    }

    fn memory(&self, direction: Direction) -> Result<&(dyn DmaMemory + Send)> {
        let memory = match direction {
            Direction::Read => self.read_frames.as_deref(),
            Direction::Write => self.write_frames.as_deref(),
        };
        memory.ok_or(Error::Unsupported("no frame memory attached"))
    }

    fn memory_mut(
        &mut self,
        direction: Direction,
    ) -> Result<&mut (dyn DmaMemory + Send + 'static)> {
        let memory = match direction {
            Direction::Read => self.read_frames.as_deref_mut(),
            Direction::Write => self.write_frames.as_deref_mut(),
        };
        memory.ok_or(Error::Unsupported("no frame memory attached"))
    }

    /// Circular transfer over every frame buffer of one direction
    fn setup(&self, direction: Direction) -> Result<Setup> {
        let line = self.resolution.line_bytes() as u32;
        let mut setup = Setup::new(self.resolution.height(), line, line);

        let memory = self.memory(direction)?;
        let needed = self.frames(direction) * self.resolution.frame_bytes();
        if memory.len() < needed {
            return Err(invalid(format!(
                "{} frame memory holds {} bytes, {} needed",
                direction,
                memory.len(),
                needed
            )));
        }

        let base = memory.phys_addr();
        let frame_bytes = self.resolution.frame_bytes() as u64;
        setup.frame_addresses = (0..self.frames(direction) as u64)
            .map(|i| base + i * frame_bytes)
            .collect();
        Ok(setup)
    }

    fn reset_channel(&self, direction: Direction) -> Result<()> {
        self.vdma.reset(direction)?;
        if !poll(RESET_POLL_BUDGET, || !self.vdma.reset_pending(direction)) {
            log::error!("{} channel reset timed out", direction);
            return Err(Error::HardwareFault(format!(
                "{} channel did not come out of reset",
                direction
            )));
        }
        Ok(())
    }

    /// Starts scanning out the read frame buffers on the video output
    pub fn start_read(&mut self) -> Result<()> {
        let setup = self.setup(Direction::Read)?;

        log::info!("[read] stage 1: reset");
        self.video.reset()?;
        self.reset_channel(Direction::Read)?;

        log::info!("[read] stage 2: configure {}", self.resolution);
        self.video.configure(self.resolution)?;
        self.vdma.dma_config(Direction::Read, &setup)?;
        self.vdma
            .dma_set_buffer_addresses(Direction::Read, &setup.frame_addresses)?;

        log::info!("[read] stage 3: enable");
        self.video.enable()?;
        self.vdma.dma_start(Direction::Read)
    }

    /// Starts capturing the stream into the write frame buffers
    pub fn start_write(&mut self) -> Result<()> {
        let setup = self.setup(Direction::Write)?;

        log::info!("[write] stage 1: reset");
        self.reset_channel(Direction::Write)?;

        log::info!("[write] stage 2: configure {}", self.resolution);
        self.vdma.dma_config(Direction::Write, &setup)?;
        self.vdma
            .dma_set_buffer_addresses(Direction::Write, &setup.frame_addresses)?;

        log::info!("[write] stage 3: enable");
        self.vdma.dma_start(Direction::Write)
    }

    /// Stops both channels
    pub fn stop(&self) {
        for &direction in &[Direction::Read, Direction::Write] {
            let chan = self.vdma.channel(direction);
            if chan.is_valid() {
                chan.stop();
            }
        }
    }

    /// Byte range of frame `index`, which must be a frame store backed by `memory_len` bytes
    fn frame_range(
        &self,
        direction: Direction,
        index: usize,
        memory_len: usize,
    ) -> Result<std::ops::Range<usize>> {
        if index >= self.frames(direction) {
            return Err(invalid(format!(
                "frame {} outside of {} frame stores",
                index,
                self.frames(direction)
            )));
        }
        let size = self.resolution.frame_bytes();
        let range = index * size..(index + 1) * size;
        if range.end > memory_len {
            return Err(invalid(format!(
                "{} frame {} lies beyond the {} bytes of frame memory",
                direction, index, memory_len
            )));
        }
        Ok(range)
    }

    /// Copies one frame into read frame buffer `index`
    pub fn set_frame(&mut self, index: usize, frame: &[u8]) -> Result<()> {
        let len = self.memory(Direction::Read)?.len();
        let range = self.frame_range(Direction::Read, index, len)?;
        if frame.len() != range.len() {
            return Err(invalid(format!(
                "frame of {} bytes, {} expected",
                frame.len(),
                range.len()
            )));
        }
        self.memory_mut(Direction::Read)?.as_bytes_mut()[range].copy_from_slice(frame);
        Ok(())
    }

    /// Returns write frame buffer `index`
    pub fn frame(&self, index: usize) -> Result<&[u8]> {
        let memory = self.memory(Direction::Write)?;
        let range = self.frame_range(Direction::Write, index, memory.len())?;
        Ok(&memory.as_bytes()[range])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::Config;
    use crate::hw;
    use crate::memory::HostMemory;
    use crate::sim::Sim;

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_configure: bool,
    }

    impl VideoOutput for Recorder {
        fn reset(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("reset".into());
            Ok(())
        }

        fn configure(&mut self, resolution: Resolution) -> Result<()> {
            if self.fail_configure {
                return Err(Error::HardwareFault("clock did not lock".into()));
            }
            self.calls
                .lock()
                .unwrap()
                .push(format!("configure {}", resolution));
            Ok(())
        }

        fn enable(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("enable".into());
            Ok(())
        }
    }

    const READ_BASE: u64 = 0x1000_0000;
    const WRITE_BASE: u64 = 0x1800_0000;

    fn pipeline(video: Recorder) -> Pipeline<Sim, Recorder> {
        let mut vdma = Vdma::new(Sim::new());
        vdma.configure(&Config::default()).unwrap();

        let res = Resolution::R640x480p60;
        let bytes = res.frame_bytes() * 3;
        let mut pipeline = Pipeline::new(vdma, video, res);
        pipeline
            .set_frame_memory(Direction::Read, Box::new(HostMemory::new(READ_BASE, bytes)))
            .unwrap();
        pipeline
            .set_frame_memory(Direction::Write, Box::new(HostMemory::new(WRITE_BASE, bytes)))
            .unwrap();
        pipeline
    }

    #[test]
    fn timing_table_matches_modes() {
        for timing in TIMINGS.iter() {
            assert_eq!(timing.resolution.timing(), timing);
        }
        let t = Resolution::R1920x1080p60.timing();
        assert_eq!((t.h_total(), t.v_total()), (2200, 1125));
        assert_eq!(t.pixel_clock_hz, 2200 * 1125 * 60);
        assert_eq!(Resolution::R640x480p60.to_string(), "640x480@60");
        assert_eq!(Resolution::R1280x720p60.frame_bytes(), 1280 * 720 * 3);
    }

    #[test]
    fn read_start_sequences_video_and_dma() {
        let video = Recorder::default();
        let calls = video.calls.clone();
        let mut pipeline = pipeline(video);
        pipeline.vdma().registers().clear_writes();

        pipeline.start_read().unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec!["reset", "configure 640x480@60", "enable"]
        );
        let sim = pipeline.vdma().registers();
        let frame = Resolution::R640x480p60.frame_bytes() as u32;
        let start = hw::MM2S_ADDR_BASE + hw::START_ADDR;
        assert_eq!(sim.get(start), READ_BASE as u32);
        assert_eq!(sim.get(start + 8), READ_BASE as u32 + 2 * frame);
        assert_eq!(sim.get(hw::MM2S_ADDR_BASE + hw::HSIZE), 640 * 3);
        assert_eq!(sim.get(hw::MM2S_ADDR_BASE + hw::VSIZE), 480);
        assert!(pipeline.vdma().channel(Direction::Read).is_running());
    }

    #[test]
    fn write_start_leaves_video_alone() {
        let video = Recorder::default();
        let calls = video.calls.clone();
        let mut pipeline = pipeline(video);

        pipeline.start_write().unwrap();
        assert!(calls.lock().unwrap().is_empty());
        assert!(pipeline.vdma().channel(Direction::Write).is_running());
        assert_eq!(
            pipeline.vdma().registers().get(hw::S2MM_ADDR_BASE + hw::START_ADDR + 4),
            WRITE_BASE as u32 + Resolution::R640x480p60.frame_bytes() as u32
        );

        pipeline.stop();
        assert!(!pipeline.vdma().channel(Direction::Write).is_running());
    }

    #[test]
    fn video_failure_stops_the_sequence() {
        let video = Recorder {
            fail_configure: true,
            ..Recorder::default()
        };
        let mut pipeline = pipeline(video);
        assert!(matches!(
            pipeline.start_read(),
            Err(Error::HardwareFault(_))
        ));
        assert!(!pipeline.vdma().channel(Direction::Read).is_running());
    }

    #[test]
    fn stuck_reset_fails_the_start() {
        let mut pipeline = pipeline(Recorder::default());
        pipeline.vdma().registers().stick_reset(true);
        assert!(matches!(
            pipeline.start_write(),
            Err(Error::HardwareFault(_))
        ));
    }

    #[test]
    fn frames_are_copied_whole() {
        let mut pipeline = pipeline(Recorder::default());
        let size = Resolution::R640x480p60.frame_bytes();

        let frame = vec![0x5A; size];
        pipeline.set_frame(1, &frame).unwrap();
        assert!(matches!(
            pipeline.set_frame(3, &frame),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            pipeline.set_frame(0, &frame[1..]),
            Err(Error::InvalidParameter(_))
        ));

        assert_eq!(pipeline.frame(2).unwrap().len(), size);
        assert!(pipeline.frame(2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn frame_memory_must_fit_every_frame() {
        let mut pipeline = pipeline(Recorder::default());
        assert!(matches!(
            pipeline.set_frame_memory(Direction::Read, Box::new(HostMemory::new(0, 16))),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn growing_the_frame_store_count_needs_more_memory() {
        let config = Config {
            max_frame_stores: 4,
            enable_all_debug: true,
            ..Config::default()
        };
        let mut vdma = Vdma::new(Sim::new());
        vdma.configure(&config).unwrap();
        vdma.set_frame_store(2, Direction::Write).unwrap();

        let res = Resolution::R640x480p60;
        let mut pipeline = Pipeline::new(vdma, Recorder::default(), res);
        pipeline
            .set_frame_memory(
                Direction::Write,
                Box::new(HostMemory::new(WRITE_BASE, res.frame_bytes() * 2)),
            )
            .unwrap();
        assert_eq!(pipeline.frame(1).unwrap().len(), res.frame_bytes());

        pipeline
            .vdma_mut()
            .set_frame_store(4, Direction::Write)
            .unwrap();
        assert!(matches!(
            pipeline.frame(3),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            pipeline.start_write(),
            Err(Error::InvalidParameter(_))
        ));
        assert!(!pipeline.vdma().channel(Direction::Write).is_running());
    }
}
