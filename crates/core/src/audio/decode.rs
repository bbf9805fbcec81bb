use std::io::Cursor;

use symphonia::core::{
    audio::SampleBuffer as InterleavedBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{BeatVizError, Result};

pub const SUPPORTED_MIME_TYPES: [&str; 4] =
    ["audio/mpeg", "audio/wav", "audio/wave", "audio/x-wav"];
pub const SUPPORTED_EXTENSIONS: [&str; 2] = [".mp3", ".wav"];

/// Raw file contents plus the type the file intake asserted for them.
#[derive(Clone)]
pub struct AudioSource {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
}

impl AudioSource {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
            file_name: file_name.into(),
        }
    }

    /// Builds a source for a file on disk, inferring the MIME type from the
    /// extension.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        let mime = match extension.as_deref() {
            Some("mp3") => "audio/mpeg",
            Some("wav") => "audio/wav",
            _ => "application/octet-stream",
        };
        Ok(Self::new(bytes, mime, file_name))
    }

    /// MIME allow-list first, extension as a fallback.
    pub fn is_supported(&self) -> bool {
        let mime = self.mime.trim().to_ascii_lowercase();
        if SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
            return true;
        }
        let name = self.file_name.to_ascii_lowercase();
        SUPPORTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(BeatVizError::UnsupportedFormat {
                mime: self.mime.clone(),
                file_name: self.file_name.clone(),
            })
        }
    }

    fn hint(&self) -> Hint {
        let mut hint = Hint::new();
        if !self.mime.is_empty() {
            hint.mime_type(&self.mime);
        }
        if let Some((_, extension)) = self.file_name.rsplit_once('.') {
            hint.with_extension(extension);
        }
        hint
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("bytes", &self.bytes.len())
            .field("mime", &self.mime)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Fully decoded track with interleaved `f32` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    sample_rate: u32,
    channels: usize,
    samples: Vec<f32>,
}

impl SampleBuffer {
    pub fn new(sample_rate: u32, channels: usize, samples: Vec<f32>) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(BeatVizError::Decode(format!(
                "invalid stream layout: {sample_rate} Hz, {channels} channel(s)"
            )));
        }
        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Mono mixdown of the frame at `index`, or silence outside the track.
    pub fn mono_frame(&self, index: isize) -> f32 {
        if index < 0 || index as usize >= self.frames() {
            return 0.0;
        }
        let start = index as usize * self.channels;
        let frame = &self.samples[start..start + self.channels];
        frame.iter().sum::<f32>() / self.channels as f32
    }

    /// Fills `out` with the mono frames that end at `end_frame` (exclusive),
    /// zero-padding before the start of the track.
    pub fn mono_window(&self, end_frame: usize, out: &mut [f32]) {
        let len = out.len() as isize;
        let end = end_frame as isize;
        for (i, sample) in out.iter_mut().enumerate() {
            *sample = self.mono_frame(end - len + i as isize);
        }
    }

    /// Interleaved samples between two positions in seconds.
    pub fn slice_seconds(&self, from: f64, to: f64) -> &[f32] {
        let frame_at =
            |t: f64| ((t.max(0.0) * self.sample_rate as f64) as usize).min(self.frames());
        let start = frame_at(from);
        let end = frame_at(to).max(start);
        &self.samples[start * self.channels..end * self.channels]
    }
}

/// Decodes an MP3 or WAV byte buffer into memory.
pub fn decode(source: &AudioSource) -> Result<SampleBuffer> {
    let stream = MediaSourceStream::new(
        Box::new(Cursor::new(source.bytes.clone())),
        Default::default(),
    );
    let probed = symphonia::default::get_probe().format(
        &source.hint(),
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BeatVizError::Decode("no decodable audio track".into()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|channels| channels.count())
        .unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count();
                let mut buffer = InterleavedBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped += 1;
                tracing::debug!(reason, "skipping corrupt packet");
            }
            Err(err) => return Err(err.into()),
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, file = %source.file_name, "decoded with corrupt packets");
    }
    if samples.is_empty() {
        return Err(BeatVizError::Decode("stream contains no audio frames".into()));
    }

    SampleBuffer::new(sample_rate, channels, samples)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV bytes built with `hound`.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, frames: &[f32]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for sample in frames {
                for _ in 0..channels {
                    writer
                        .write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn accepts_allow_listed_types() {
        assert!(AudioSource::new(vec![], "audio/mpeg", "song").is_supported());
        assert!(AudioSource::new(vec![], "AUDIO/X-WAV", "song").is_supported());
        assert!(AudioSource::new(vec![], "", "Track.MP3").is_supported());
        assert!(AudioSource::new(vec![], "application/octet-stream", "a.wav").is_supported());
    }

    #[test]
    fn rejects_other_types() {
        let source = AudioSource::new(vec![], "audio/ogg", "song.ogg");
        let err = source.validate().unwrap_err();
        assert!(matches!(err, BeatVizError::UnsupportedFormat { .. }));
        assert!(err.is_load_failure());
    }

    #[test]
    fn decodes_pcm_wav() {
        let frames: Vec<f32> = (0..800).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let source = AudioSource::new(wav_bytes(8_000, 2, &frames), "audio/wav", "tone.wav");

        let buffer = decode(&source).unwrap();
        assert_eq!(buffer.sample_rate(), 8_000);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 800);
        assert!((buffer.duration() - 0.1).abs() < 1e-9);
        assert!((buffer.mono_frame(0) - 0.5).abs() < 1e-3);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let source = AudioSource::new(vec![0x42; 512], "audio/mpeg", "broken.mp3");
        let err = decode(&source).unwrap_err();
        assert!(matches!(err, BeatVizError::Decode(_)));
    }

    #[test]
    fn mono_window_pads_before_start() {
        let buffer = SampleBuffer::new(4, 1, vec![1.0, 2.0, 3.0]).unwrap();
        let mut window = [9.0; 4];
        buffer.mono_window(2, &mut window);
        assert_eq!(window, [0.0, 0.0, 1.0, 2.0]);
    }
}
