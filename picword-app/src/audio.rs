//! Audio output through cpal, fed from WAV files decoded in memory.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, Stream, StreamConfig};
use picword_experiment::{AudioError, AudioPlayer};
use std::io::{Cursor, ErrorKind};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

/// Decoded audio as interleaved samples in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct Wav {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Wav {
    /// Decodes a whole WAV file held in memory.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, SymphoniaError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());
        let mut hint = Hint::new();
        hint.with_extension("wav");
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(SymphoniaError::Unsupported("no audio track"))?
            .clone();
        let mut decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut channels = track.codec_params.channels.map_or(0, |c| c.count());
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err),
            };
            if packet.track_id() != track.id {
                continue;
            }
            let decoded = decoder.decode(&packet)?;
            let spec = *decoded.spec();
            channels = spec.channels.count();
            sample_rate = spec.rate;
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        if channels == 0 || sample_rate == 0 {
            return Err(SymphoniaError::Unsupported("zero channels or sample rate"));
        }
        Ok(Self {
            channels: u16::try_from(channels)
                .map_err(|_| SymphoniaError::Unsupported("too many channels"))?,
            sample_rate,
            samples,
        })
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }

    /// Converts to the device layout. Channels are averaged down to mono or
    /// repeated up; the rate is converted by linear interpolation.
    pub fn to_output(&self, channels: u16, rate: u32) -> Vec<f32> {
        let in_ch = usize::from(self.channels.max(1));
        let out_ch = usize::from(channels.max(1));
        let frames = self.frames();
        if frames == 0 || rate == 0 {
            return Vec::new();
        }

        let out_frames = (frames as u64 * u64::from(rate) / u64::from(self.sample_rate)) as usize;
        let step = f64::from(self.sample_rate) / f64::from(rate);
        let value = |frame: usize, channel: usize| -> f32 {
            let base = frame * in_ch;
            if out_ch == 1 {
                self.samples[base..base + in_ch].iter().sum::<f32>() / in_ch as f32
            } else {
                self.samples[base + channel % in_ch]
            }
        };

        let mut out = Vec::with_capacity(out_frames * out_ch);
        for frame in 0..out_frames {
            let pos = frame as f64 * step;
            let i = (pos.floor() as usize).min(frames - 1);
            let j = (i + 1).min(frames - 1);
            let frac = (pos - i as f64) as f32;
            for channel in 0..out_ch {
                let a = value(i, channel);
                out.push(a + (value(j, channel) - a) * frac);
            }
        }
        out
    }
}

#[derive(Default)]
struct Playback {
    samples: Arc<[f32]>,
    cursor: usize,
    playing: bool,
}

fn lock(playback: &Mutex<Playback>) -> MutexGuard<'_, Playback> {
    playback.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Plays one loaded sound at a time on the default output device.
pub struct CpalPlayer {
    _stream: Stream,
    playback: Arc<Mutex<Playback>>,
    channels: u16,
    rate: u32,
}

impl CpalPlayer {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::Output("no output device".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| AudioError::Output(err.to_string()))?;
        let config = supported.config();
        let playback = Arc::new(Mutex::new(Playback::default()));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, &playback)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, &playback)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, &playback)?,
            other => {
                return Err(AudioError::Output(format!(
                    "unsupported sample format {other}"
                )));
            }
        };
        stream
            .play()
            .map_err(|err| AudioError::Output(err.to_string()))?;

        info!(
            device = device.name().unwrap_or_default(),
            channels = config.channels,
            rate = config.sample_rate.0,
            "audio output ready"
        );
        Ok(Self {
            _stream: stream,
            playback,
            channels: config.channels,
            rate: config.sample_rate.0,
        })
    }
}

fn build_stream<S>(
    device: &cpal::Device,
    config: &StreamConfig,
    playback: &Arc<Mutex<Playback>>,
) -> Result<Stream, AudioError>
where
    S: SizedSample + FromSample<f32>,
{
    let playback = Arc::clone(playback);
    device
        .build_output_stream(
            config,
            move |data: &mut [S], _| write_output(data, &playback),
            |err| warn!(%err, "audio stream error"),
            None,
        )
        .map_err(|err| AudioError::Output(err.to_string()))
}

fn write_output<S: Sample + FromSample<f32>>(data: &mut [S], playback: &Mutex<Playback>) {
    // Never block the device thread; a contended lock costs one silent buffer.
    let Ok(mut playback) = playback.try_lock() else {
        data.fill(S::EQUILIBRIUM);
        return;
    };
    for out in data.iter_mut() {
        let next = if playback.playing {
            playback.samples.get(playback.cursor).copied()
        } else {
            None
        };
        let value = match next {
            Some(value) => {
                playback.cursor += 1;
                value
            }
            None => {
                playback.playing = false;
                0.0
            }
        };
        *out = S::from_sample(value);
    }
}

impl AudioPlayer for CpalPlayer {
    async fn load_wav(&mut self, path: &Path) -> Result<(), AudioError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| AudioError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let wav = Wav::decode(bytes).map_err(|err| AudioError::Decode {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        let samples = wav.to_output(self.channels, self.rate);
        debug!(
            path = %path.display(),
            frames = wav.frames(),
            rate = wav.sample_rate,
            "audio loaded"
        );

        let mut playback = lock(&self.playback);
        playback.samples = samples.into();
        playback.cursor = 0;
        playback.playing = false;
        Ok(())
    }

    fn play(&mut self) {
        let mut playback = lock(&self.playback);
        playback.cursor = 0;
        playback.playing = !playback.samples.is_empty();
    }

    fn stop(&mut self) {
        lock(&self.playback).playing = false;
    }

    fn playing(&self) -> bool {
        lock(&self.playback).playing
    }
}
