use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use dotmatrix_core::apu::SAMPLE_RATE_HZ;
use dotmatrix_core::audio_queue::AudioConsumer;

/// Start audio playback using `cpal`, draining mono samples the APU queued.
///
/// Returns the active [`cpal::Stream`] if successful; dropping it stops
/// playback.
pub fn start_stream(consumer: AudioConsumer) -> Option<cpal::Stream> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;

    // Prefer a config at the APU's fixed output rate so no resampling is
    // needed; otherwise fall back to whatever the device offers.
    let config = device
        .supported_output_configs()
        .ok()
        .and_then(|mut configs| {
            configs.find(|c| {
                c.min_sample_rate().0 <= SAMPLE_RATE_HZ && SAMPLE_RATE_HZ <= c.max_sample_rate().0
            })
        })
        .map(|c| c.with_sample_rate(cpal::SampleRate(SAMPLE_RATE_HZ)))
        .or_else(|| device.default_output_config().ok());
    let supported = match config {
        Some(c) => c,
        None => {
            log::warn!("no supported audio output config");
            return None;
        }
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;
    let err_fn = |err| log::error!("cpal stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device
            .build_output_stream(
                &config,
                move |data: &mut [i16], _| {
                    for frame in data.chunks_mut(channels) {
                        // Silence-fill on underrun.
                        let sample = consumer.pop_sample().unwrap_or(0);
                        frame.fill(sample);
                    }
                },
                err_fn,
                None,
            )
            .ok()?,
        cpal::SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _| {
                    for frame in data.chunks_mut(channels) {
                        let sample = consumer.pop_sample().unwrap_or(0) as f32 / 32768.0;
                        frame.fill(sample);
                    }
                },
                err_fn,
                None,
            )
            .ok()?,
        other => {
            log::warn!("unsupported audio sample format {other:?}");
            return None;
        }
    };

    if let Err(e) = stream.play() {
        log::error!("couldn't start audio stream: {e}");
        return None;
    }
    Some(stream)
}
