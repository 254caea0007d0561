//! Placeholder clips for trying out a session without real recordings.

use anyhow::{Context, Result};
use loopgraph_core::{LoopConfig, SessionConfig};
use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BASE_FREQUENCY: f32 = 110.0;

fn resolve(clip_dir: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        clip_dir.join(file)
    }
}

fn write_tone(
    path: &Path,
    length: Duration,
    frequency: f32,
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let frames = (length.as_secs_f64() * sample_rate as f64).round() as u64;
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = ((TAU * frequency * t).sin() * 0.25 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// Write a sine tone for every clip the session references.
///
/// Loops get `length`, alternating with twice that so states end up with
/// different trigger resolutions; one-shots get a quarter of it.
pub fn write_demo_assets(
    config: &SessionConfig,
    length: Duration,
    tail: Duration,
) -> Result<Vec<PathBuf>> {
    let audio = &config.audio;
    let mut written = Vec::new();
    let mut clip = |lp: &LoopConfig, index: usize, head_length: Duration| -> Result<()> {
        let frequency = BASE_FREQUENCY * (1.0 + index as f32 * 0.5);
        let head = resolve(&audio.clip_dir, &lp.head);
        write_tone(&head, head_length, frequency, audio.sample_rate, audio.channels)?;
        written.push(head);
        if let Some(tail_file) = &lp.tail {
            let path = resolve(&audio.clip_dir, tail_file);
            write_tone(&path, tail, frequency, audio.sample_rate, audio.channels)?;
            written.push(path);
        }
        Ok(())
    };

    for (index, lp) in config.loops.iter().enumerate() {
        let head_length = if index % 2 == 0 { length } else { length * 2 };
        clip(lp, index, head_length)?;
    }
    for (index, lp) in config.one_shots.iter().enumerate() {
        clip(lp, config.loops.len() + index, length / 4)?;
    }
    Ok(written)
}
