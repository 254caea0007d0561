//! Real-time render driver for the simulated backend.
//!
//! The driver stands in for the audio callback: while playback is on it
//! completes one buffer per buffer period, and it consumes the command
//! batches the scheduler sends, keeping track of which voices sound.

use crossbeam_channel::{select, Receiver};
use loopgraph_core::backend::sim::BufferClock;
use loopgraph_core::{CommandBatch, CommandKind, VoiceId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Voices currently sounding, by voice id.
#[derive(Debug, Default)]
pub struct Voices {
    sounding: BTreeMap<VoiceId, String>,
    one_shots: u64,
    batches: u64,
}

impl Voices {
    pub fn apply(&mut self, batch: &CommandBatch) {
        self.batches += 1;
        for command in batch {
            match command.kind {
                CommandKind::StartLoop => {
                    log::info!(
                        "[RENDER] {} start '{}' at marker {} (gain {:.2})",
                        command.voice,
                        command.clip,
                        command.marker,
                        command.volume
                    );
                    self.sounding.insert(command.voice, command.clip.clone());
                }
                CommandKind::StopLoop => {
                    if self.sounding.remove(&command.voice).is_none() {
                        log::warn!("[RENDER] {} stopped but was silent", command.voice);
                    } else {
                        log::info!("[RENDER] {} stop '{}'", command.voice, command.clip);
                    }
                }
                CommandKind::OneShot => {
                    self.one_shots += 1;
                    log::info!(
                        "[RENDER] {} one-shot '{}' at marker {}",
                        command.voice,
                        command.clip,
                        command.marker
                    );
                }
            }
        }
    }

    pub fn sounding(&self) -> impl Iterator<Item = &str> {
        self.sounding.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sounding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounding.is_empty()
    }

    pub fn one_shots(&self) -> u64 {
        self.one_shots
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }
}

/// Start the driver thread. It returns the final voice table once
/// `shutdown` is set or the scheduler side hangs up.
pub fn spawn(
    clock: BufferClock,
    batches: Receiver<CommandBatch>,
    buffer_period: Duration,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<Voices>> {
    std::thread::Builder::new()
        .name("loopgraph-render".to_string())
        .spawn(move || run(clock, batches, buffer_period, shutdown))
}

fn run(
    clock: BufferClock,
    batches: Receiver<CommandBatch>,
    buffer_period: Duration,
    shutdown: Arc<AtomicBool>,
) -> Voices {
    let ticker = crossbeam_channel::tick(buffer_period);
    let mut voices = Voices::default();
    log::debug!("[RENDER] Driver running, one buffer every {:?}", buffer_period);

    loop {
        select! {
            recv(ticker) -> _ => {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if clock.is_playing() {
                    clock.complete(1);
                }
            }
            recv(batches) -> batch => match batch {
                Ok(batch) => voices.apply(&batch),
                Err(_) => break,
            },
        }
    }

    // Anything still queued was sent before shutdown.
    for batch in batches.try_iter() {
        voices.apply(&batch);
    }
    log::debug!("[RENDER] Driver stopped after {} buffers", clock.completed());
    voices
}
