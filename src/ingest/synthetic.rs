//! Synthetic frame source (`stub://`).
//!
//! Produces a flat gray scene with optional high-texture rectangles standing
//! in for parked vehicles. Frames are deterministic, so tests can reason about
//! texture scores and playback time exactly.
//!
//! URL form: `stub://name?width=640&height=480&fps=30&frames=300`.
//! `frames=0` makes the source endless.

use anyhow::{anyhow, Context, Result};

use super::{FrameRead, FrameSource};
use crate::frame::Frame;
use crate::zone::BoundingBox;

pub(crate) const STUB_SCHEME: &str = "stub://";

const BACKGROUND_LEVEL: u8 = 120;
const CHECKER_DARK: u8 = 30;
const CHECKER_LIGHT: u8 = 220;
const CHECKER_CELL: u32 = 4;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Number of frames before end-of-stream; `None` never ends.
    pub frames: Option<u64>,
    /// Rectangles painted with a checkerboard texture.
    pub textured: Vec<BoundingBox>,
    /// Frame index whose read fails every time it is reached.
    pub fail_at: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "stub://synthetic".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            frames: Some(300),
            textured: Vec::new(),
            fail_at: None,
        }
    }
}

impl SyntheticConfig {
    /// Parse `stub://name?key=value&...`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(STUB_SCHEME)
            .ok_or_else(|| anyhow!("'{}' is not a stub:// url", url))?;
        let mut cfg = Self {
            name: url.to_string(),
            ..Self::default()
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(cfg);
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub parameter '{}' has no value", pair))?;
            let parse = |value: &str| -> Result<u64> {
                value
                    .parse::<u64>()
                    .with_context(|| format!("stub parameter '{}' must be an integer", key))
            };
            match key {
                "width" => cfg.width = parse(value)? as u32,
                "height" => cfg.height = parse(value)? as u32,
                "fps" => cfg.fps = parse(value)? as u32,
                "frames" => {
                    let frames = parse(value)?;
                    cfg.frames = (frames > 0).then_some(frames);
                }
                "fail_at" => cfg.fail_at = Some(parse(value)?),
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if cfg.width == 0 || cfg.height == 0 || cfg.fps == 0 {
            return Err(anyhow!("stub width, height and fps must be > 0"));
        }
        Ok(cfg)
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    next_index: u64,
    last_index: Option<u64>,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            next_index: 0,
            last_index: None,
            closed: false,
        }
    }

    fn render(&self) -> Vec<u8> {
        let width = self.config.width;
        let height = self.config.height;
        let mut pixels = vec![BACKGROUND_LEVEL; (width * height * 3) as usize];
        for rect in &self.config.textured {
            let x0 = rect.x.max(0) as u32;
            let y0 = rect.y.max(0) as u32;
            let x1 = (rect.x.max(0) as u32 + rect.width).min(width);
            let y1 = (rect.y.max(0) as u32 + rect.height).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    let level = if (x / CHECKER_CELL + y / CHECKER_CELL) % 2 == 0 {
                        CHECKER_DARK
                    } else {
                        CHECKER_LIGHT
                    };
                    let offset = ((y * width + x) * 3) as usize;
                    pixels[offset..offset + 3].fill(level);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.name.clone()
    }

    fn seek(&mut self, frame_offset: u64) -> Result<()> {
        if self.closed {
            return Err(anyhow!("{} is closed", self.config.name));
        }
        self.next_index = frame_offset;
        self.last_index = None;
        Ok(())
    }

    fn read_next(&mut self) -> FrameRead {
        if self.closed {
            return FrameRead::EndOfStream;
        }
        if self
            .config
            .frames
            .is_some_and(|frames| self.next_index >= frames)
        {
            return FrameRead::EndOfStream;
        }
        let index = self.next_index;
        self.next_index += 1;
        if self.config.fail_at == Some(index) {
            return FrameRead::Failed(format!(
                "{}: injected read failure at frame {}",
                self.config.name, index
            ));
        }
        self.last_index = Some(index);
        match Frame::from_rgb(self.render(), self.config.width, self.config.height, index) {
            Ok(frame) => FrameRead::Frame(frame),
            Err(e) => FrameRead::Failed(e.to_string()),
        }
    }

    fn position_secs(&self) -> f64 {
        self.last_index
            .map(|index| index as f64 / self.config.fps as f64)
            .unwrap_or(0.0)
    }

    fn close(&mut self) {
        self.closed = true;
        log::debug!("{}: closed", self.config.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_frame(source: &mut SyntheticSource) -> Frame {
        match source.read_next() {
            FrameRead::Frame(frame) => frame,
            FrameRead::EndOfStream => panic!("unexpected end of stream"),
            FrameRead::Failed(msg) => panic!("unexpected failure: {msg}"),
        }
    }

    #[test]
    fn parses_stub_url_parameters() -> Result<()> {
        let cfg = SyntheticConfig::from_url("stub://lot?width=64&height=48&fps=10&frames=0")?;
        assert_eq!(cfg.width, 64);
        assert_eq!(cfg.height, 48);
        assert_eq!(cfg.fps, 10);
        assert_eq!(cfg.frames, None);

        let cfg = SyntheticConfig::from_url("stub://plain")?;
        assert_eq!(cfg.width, 640);
        assert_eq!(cfg.frames, Some(300));

        assert!(SyntheticConfig::from_url("stub://lot?color=red").is_err());
        assert!(SyntheticConfig::from_url("stub://lot?fps=0").is_err());
        Ok(())
    }

    #[test]
    fn playback_time_follows_frame_index_and_seek() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 8,
            height: 8,
            fps: 10,
            frames: Some(20),
            ..SyntheticConfig::default()
        });
        assert_eq!(source.position_secs(), 0.0);
        read_frame(&mut source);
        read_frame(&mut source);
        assert!((source.position_secs() - 0.1).abs() < 1e-9);

        source.seek(15)?;
        let frame = read_frame(&mut source);
        assert_eq!(frame.index, 15);
        assert!((source.position_secs() - 1.5).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn textured_rectangles_are_painted() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 16,
            height: 16,
            textured: vec![BoundingBox {
                x: 4,
                y: 4,
                width: 8,
                height: 8,
            }],
            ..SyntheticConfig::default()
        });
        let frame = read_frame(&mut source);
        assert_eq!(frame.image().get_pixel(0, 0).0, [BACKGROUND_LEVEL; 3]);
        assert_eq!(frame.image().get_pixel(4, 4).0, [CHECKER_DARK; 3]);
        assert_eq!(frame.image().get_pixel(8, 4).0, [CHECKER_LIGHT; 3]);
    }

    #[test]
    fn injected_failure_repeats_on_every_pass() -> Result<()> {
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 4,
            height: 4,
            frames: Some(5),
            fail_at: Some(1),
            ..SyntheticConfig::default()
        });
        read_frame(&mut source);
        assert!(matches!(source.read_next(), FrameRead::Failed(_)));
        source.seek(0)?;
        read_frame(&mut source);
        assert!(matches!(source.read_next(), FrameRead::Failed(_)));
        Ok(())
    }

    #[test]
    fn closed_source_reports_end_of_stream() {
        let mut source = SyntheticSource::new(SyntheticConfig::default());
        source.close();
        assert!(matches!(source.read_next(), FrameRead::EndOfStream));
        assert!(source.seek(0).is_err());
    }
}
