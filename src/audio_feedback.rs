use std::io::Write;
use std::sync::Arc;

/// Audible notification for a live PII hit.
pub trait AlertSink: Send + Sync {
    fn play(&self);
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn play(&self) {
        let mut err = std::io::stderr();
        if let Err(e) = err.write_all(b"\x07").and_then(|()| err.flush()) {
            log::warn!("Bell failed: {e}");
        }
    }
}

pub struct Silent;

impl AlertSink for Silent {
    fn play(&self) {}
}

/// Pick the sink for the current build and config.
pub fn default_sink(enabled: bool) -> Arc<dyn AlertSink> {
    if !enabled {
        return Arc::new(Silent);
    }
    audible_sink()
}

#[cfg(feature = "sound")]
fn audible_sink() -> Arc<dyn AlertSink> {
    Arc::new(tone::AlertTone)
}

#[cfg(not(feature = "sound"))]
fn audible_sink() -> Arc<dyn AlertSink> {
    Arc::new(TerminalBell)
}

#[cfg(feature = "sound")]
mod tone {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FREQUENCY_HZ: f32 = 1000.0;
    const DURATION_SECS: f32 = 0.5;

    /// 1 kHz alert tone on the default output device.
    pub struct AlertTone;

    impl super::AlertSink for AlertTone {
        /// Spawns a thread and returns immediately.
        fn play(&self) {
            std::thread::spawn(|| {
                if let Err(e) = play_blocking() {
                    log::warn!("Alert tone failed: {e}");
                }
            });
        }
    }

    fn play_blocking() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("No output device found")?;
        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate() as f32;
        let channels = config.channels() as usize;

        let total = (sample_rate * DURATION_SECS) as usize;
        let samples: Arc<Vec<f32>> = Arc::new(
            (0..total)
                .map(|i| {
                    let t = i as f32 / sample_rate;
                    // short attack and release to avoid clicks
                    let edge = (i.min(total - i) as f32 / (sample_rate * 0.01)).min(1.0);
                    (2.0 * PI * FREQUENCY_HZ * t).sin() * edge * 0.3
                })
                .collect(),
        );

        let stream_idx = Arc::new(AtomicUsize::new(0));
        let stream_samples = samples;

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut i = stream_idx.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let value = stream_samples.get(i).copied().unwrap_or(0.0);
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                    i += 1;
                }
                stream_idx.store(i, Ordering::Relaxed);
            },
            |err| log::error!("Audio output error: {err}"),
            None,
        )?;

        stream.play()?;
        std::thread::sleep(std::time::Duration::from_secs_f32(DURATION_SECS + 0.05));
        drop(stream);
        Ok(())
    }
}
