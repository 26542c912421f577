//! Local video file source using FFmpeg.
//!
//! Frames are decoded in-memory and scaled to RGB24. Seeking jumps to the
//! nearest earlier keyframe and then discards decoded frames until the
//! requested frame offset is reached.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{FrameRead, FrameSource};
use crate::frame::Frame;

/// FFmpeg's internal time base (microseconds).
const AV_TIME_BASE: f64 = 1_000_000.0;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base: f64,
    fps: f64,
    frame_count: u64,
    position_secs: f64,
    skip_until_secs: Option<f64>,
    eof_sent: bool,
    closed: bool,
}

impl FfmpegFileSource {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("video '{}' has no video track", path))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let fps = f64::from(input_stream.avg_frame_rate());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "FileSource: opened {} ({}x{} @ {:.2} fps)",
            path,
            decoder.width(),
            decoder.height(),
            fps
        );

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            frame_count: 0,
            position_secs: 0.0,
            skip_until_secs: None,
            eof_sent: false,
            closed: false,
        })
    }

    fn decode_next(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let secs = decoded
                    .timestamp()
                    .map(|ts| ts as f64 * self.time_base)
                    .unwrap_or(self.frame_count as f64 / self.fps);
                if let Some(target) = self.skip_until_secs {
                    if secs + 0.5 / self.fps < target {
                        continue;
                    }
                    self.skip_until_secs = None;
                }
                let mut rgb_frame = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                let index = (secs * self.fps).round().max(0.0) as u64;
                self.position_secs = secs;
                self.frame_count += 1;
                return Ok(Some(Frame::from_rgb(pixels, width, height, index)?));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                self.decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?;
                fed = true;
                break;
            }
            if !fed {
                self.decoder.send_eof().context("flush ffmpeg decoder")?;
                self.eof_sent = true;
            }
        }
    }
}

impl FrameSource for FfmpegFileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn seek(&mut self, frame_offset: u64) -> Result<()> {
        if self.closed {
            return Err(anyhow!("{} is closed", self.path));
        }
        let target_secs = frame_offset as f64 / self.fps;
        let ts = (target_secs * AV_TIME_BASE) as i64;
        self.input
            .seek(ts, ..ts)
            .with_context(|| format!("seek {} to frame {}", self.path, frame_offset))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.skip_until_secs = Some(target_secs);
        self.position_secs = target_secs;
        Ok(())
    }

    fn read_next(&mut self) -> FrameRead {
        if self.closed {
            return FrameRead::EndOfStream;
        }
        match self.decode_next() {
            Ok(Some(frame)) => FrameRead::Frame(frame),
            Ok(None) => FrameRead::EndOfStream,
            Err(e) => FrameRead::Failed(format!("{}: {:#}", self.path, e)),
        }
    }

    fn position_secs(&self) -> f64 {
        self.position_secs
    }

    fn close(&mut self) {
        self.closed = true;
        log::debug!(
            "FileSource: closed {} after {} frames",
            self.path,
            self.frame_count
        );
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
