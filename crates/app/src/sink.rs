use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use beat_visualiser_core::{BeatVizError, FrameSink, ImageData, Result, StreamInfo};
use hound::{SampleFormat, WavSpec, WavWriter};
use image::RgbaImage;

/// Writes exported frames as numbered PNG files and the audio tap as a
/// 32-bit float WAV next to them.
pub struct PngSequenceSink {
    out_dir: PathBuf,
    info: Option<StreamInfo>,
    wav: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl PngSequenceSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            info: None,
            wav: None,
            frames_written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.out_dir.join(format!("frame_{index:05}.png"))
    }

    pub fn audio_path(&self) -> PathBuf {
        self.out_dir.join("audio.wav")
    }
}

impl FrameSink for PngSequenceSink {
    fn begin(&mut self, info: &StreamInfo) -> Result<()> {
        std::fs::create_dir_all(&self.out_dir)?;
        let spec = WavSpec {
            channels: u16::try_from(info.channels).map_err(|_| {
                BeatVizError::msg(format!("{} channels cannot be written to WAV", info.channels))
            })?,
            sample_rate: info.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        self.wav = Some(WavWriter::create(self.audio_path(), spec).map_err(wav_error)?);
        self.info = Some(*info);
        self.frames_written = 0;
        tracing::debug!(
            dir = %self.out_dir.display(),
            width = info.width,
            height = info.height,
            "export started"
        );
        Ok(())
    }

    fn push_frame(&mut self, pixels: &[u8], timestamp: f64) -> Result<()> {
        let info = self.info.ok_or_else(|| BeatVizError::msg("frame pushed before begin"))?;
        let image = RgbaImage::from_raw(info.width, info.height, pixels.to_vec()).ok_or_else(|| {
            BeatVizError::msg(format!(
                "frame at {timestamp:.3}s has {} bytes, expected {}x{} RGBA",
                pixels.len(),
                info.width,
                info.height
            ))
        })?;
        let path = self.frame_path(self.frames_written);
        image.save(&path).map_err(|err| {
            BeatVizError::msg(format!("failed to write {}: {err}", path.display()))
        })?;
        self.frames_written += 1;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> Result<()> {
        let wav = self
            .wav
            .as_mut()
            .ok_or_else(|| BeatVizError::msg("audio pushed before begin"))?;
        for sample in samples {
            wav.write_sample(*sample).map_err(wav_error)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(wav) = self.wav.take() {
            wav.finalize().map_err(wav_error)?;
        }
        tracing::debug!(frames = self.frames_written, "export files closed");
        Ok(())
    }
}

fn wav_error(err: hound::Error) -> BeatVizError {
    BeatVizError::msg(format!("wav output: {err}"))
}

impl std::fmt::Debug for PngSequenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PngSequenceSink")
            .field("out_dir", &self.out_dir)
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

/// Loads an image file into the RGBA layout the background layer draws.
pub fn load_image(path: &Path) -> Result<ImageData> {
    let image = image::open(path)
        .map_err(|err| BeatVizError::msg(format!("failed to open {}: {err}", path.display())))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    ImageData::new(width, height, image.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_frames_and_audio() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::new(dir.path().join("out"));
        sink.begin(&StreamInfo {
            width: 2,
            height: 2,
            frame_rate: 30,
            sample_rate: 8_000,
            channels: 1,
        })
        .unwrap();
        sink.push_frame(&[255; 16], 0.0).unwrap();
        sink.push_audio(&[0.0, 0.5, -0.5]).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 1);
        let frame = image::open(sink.frame_path(0)).unwrap().to_rgba8();
        assert_eq!(frame.dimensions(), (2, 2));

        let reader = hound::WavReader::open(sink.audio_path()).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.spec().sample_format, SampleFormat::Float);
    }

    #[test]
    fn short_frames_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::new(dir.path());
        sink.begin(&StreamInfo {
            width: 4,
            height: 4,
            frame_rate: 30,
            sample_rate: 8_000,
            channels: 2,
        })
        .unwrap();
        assert!(sink.push_frame(&[0; 8], 0.0).is_err());
    }

    #[test]
    fn images_load_as_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.png");
        RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255])).save(&path).unwrap();
        let data = load_image(&path).unwrap();
        assert_eq!((data.width(), data.height()), (3, 2));
    }
}
