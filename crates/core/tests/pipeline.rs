use std::{cell::RefCell, f32::consts::TAU, io::Cursor, rc::Rc};

use beat_visualiser_core::{
    AppConfig, AudioSource, ExportOptions, FrameSink, Layer, ManualClock, PlaybackEvent,
    PlaybackState, Recorder, Result, StreamInfo, Visualiser,
};

const RATE: u32 = 44_100;

/// Mono 16-bit WAV of 60 Hz kicks (80 ms every half second).
fn kick_wav(seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(seconds * RATE as f32) as usize {
            let t = i as f32 / RATE as f32;
            let sample = if t % 0.5 < 0.08 { 0.9 * (TAU * 60.0 * t).sin() } else { 0.0 };
            writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn small_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.renderer.width = 64;
    config.renderer.height = 48;
    config
}

#[test]
fn decoded_track_plays_to_the_end_with_beats() {
    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&small_config(), clock.clone()).unwrap();
    visualiser
        .load(AudioSource::new(kick_wav(2.0), "audio/wav", "kicks.wav"))
        .unwrap();
    assert_eq!(visualiser.engine().state(), PlaybackState::Ready);

    let events = Rc::new(RefCell::new(Vec::new()));
    let seen = events.clone();
    let _sub = visualiser
        .engine_mut()
        .subscribe(move |event| seen.borrow_mut().push(event.clone()));
    let beats = Rc::new(RefCell::new(0));
    let counted = beats.clone();
    let _beat_sub = visualiser.on_beat(move |_| *counted.borrow_mut() += 1);

    visualiser.play();
    let mut rendered = 0;
    for _ in 0..150 {
        if visualiser.frame().render.is_some() {
            rendered += 1;
        }
        clock.advance_ms(1000.0 / 60.0);
    }

    assert!(*beats.borrow() >= 2, "only {} beats", beats.borrow());
    assert!(rendered >= 100);
    assert_eq!(visualiser.engine().state(), PlaybackState::Ready);
    assert_eq!(visualiser.engine().current_time(), 0.0);

    let events = events.borrow();
    assert_eq!(events.first(), Some(&PlaybackEvent::StateChanged(PlaybackState::Playing)));
    let ended = events
        .iter()
        .position(|event| *event == PlaybackEvent::StateChanged(PlaybackState::Ready))
        .unwrap();
    assert_eq!(events.get(ended + 1), Some(&PlaybackEvent::TimeUpdate(0.0)));
}

#[test]
fn unsupported_files_leave_the_engine_idle() {
    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&small_config(), clock).unwrap();
    let err = visualiser
        .load(AudioSource::new(b"not audio".to_vec(), "text/plain", "notes.txt"))
        .unwrap_err();
    assert!(err.is_load_failure());
    assert_eq!(visualiser.engine().state(), PlaybackState::Idle);

    visualiser.play();
    let outcome = visualiser.frame();
    assert!(!outcome.beat.is_beat);
    assert_eq!(outcome.position, 0.0);
}

#[test]
fn host_text_layer_sees_live_features() {
    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&small_config(), clock.clone()).unwrap();
    visualiser
        .load(AudioSource::new(kick_wav(1.0), "audio/x-wav", "kicks.wav"))
        .unwrap();

    let inputs = visualiser.frame_inputs();
    let peak = Rc::new(RefCell::new(0.0f32));
    let observed = peak.clone();
    let _sub = visualiser.renderer_mut().on_render_in(Layer::Text, move |_, _| {
        let bass = inputs.borrow().bands.bass;
        let mut peak = observed.borrow_mut();
        *peak = peak.max(bass);
    });

    visualiser.play();
    for _ in 0..10 {
        visualiser.frame();
        clock.advance_ms(16.0);
    }
    assert!(*peak.borrow() > 0.5);
}

#[derive(Default)]
struct CountingSink {
    frames: usize,
    samples: usize,
    info: Option<StreamInfo>,
    finished: bool,
}

impl FrameSink for CountingSink {
    fn begin(&mut self, info: &StreamInfo) -> Result<()> {
        self.info = Some(*info);
        Ok(())
    }

    fn push_frame(&mut self, pixels: &[u8], _timestamp: f64) -> Result<()> {
        let info = self.info.unwrap();
        assert_eq!(pixels.len(), (info.width * info.height * 4) as usize);
        self.frames += 1;
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32]) -> Result<()> {
        self.samples += samples.len();
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[test]
fn recorder_exports_every_frame_and_all_audio() {
    let clock = ManualClock::new();
    let mut visualiser = Visualiser::new(&small_config(), clock.clone()).unwrap();
    visualiser
        .load(AudioSource::new(kick_wav(1.0), "audio/wav", "kicks.wav"))
        .unwrap();

    let mut recorder = Recorder::new(ExportOptions {
        frame_rate: 5,
        ..Default::default()
    });
    let mut sink = CountingSink::default();
    let summary = recorder.record(&mut visualiser, &clock, &mut sink).unwrap();

    // 0.0, 0.2, 0.4, 0.6, 0.8; 1.0 is past the end-of-track window.
    assert_eq!(summary.frames, 5);
    assert_eq!(sink.frames, 5);
    assert_eq!(sink.samples, RATE as usize);
    assert!(sink.finished);
    assert_eq!(visualiser.renderer().width(), 1280);
    assert_eq!(visualiser.engine().state(), PlaybackState::Ready);
}
