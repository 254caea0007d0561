//! Sessions loaded from TOML with real WAV clips on disk.

use loopgraph_core::backend::sim::SimulatedBackend;
use loopgraph_core::{
    AudioBackend, CommandKind, EventOutcome, InputEvent, Key, Session, SessionConfig, StateId,
    VoiceId,
};
use std::fs;
use std::path::Path;

const SESSION: &str = r#"
[audio]
sample_rate = 8000
channels = 1
buffer_size = 200
clip_dir = "clips"

[graph]
initial = "intro"

[[loops]]
name = "keys"
head = "keys.wav"
tail = "keys_tail.wav"
fade_ms = 10

[[loops]]
name = "beat"
head = "beat.wav"

[[loops]]
name = "beat_alt"
head = "beat_alt.wav"

[[sequences]]
name = "keys"
loops = ["keys"]
selection = "cyclic"

[[sequences]]
name = "beat"
loops = ["beat", "beat_alt"]
selection = "random"
seed = 11

[[states]]
name = "intro"
sequences = ["keys"]

[[states]]
name = "full"
sequences = ["keys", "beat"]

[[one_shots]]
name = "hit"
head = "hit.wav"

[[bindings]]
key = "h"
action = "one_shot"
loop = "hit"

[[bindings]]
key = "q"
action = "quit"
"#;

fn write_wav(path: &Path, frames: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..frames {
        writer.write_sample(((i % 64) as i16 - 32) * 256).unwrap();
    }
    writer.finalize().unwrap();
}

fn session_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let clips = dir.path().join("clips");
    fs::create_dir_all(&clips).unwrap();
    write_wav(&clips.join("keys.wav"), 16_000);
    write_wav(&clips.join("keys_tail.wav"), 4_000);
    write_wav(&clips.join("beat.wav"), 8_000);
    write_wav(&clips.join("beat_alt.wav"), 8_000);
    write_wav(&clips.join("hit.wav"), 1_000);
    fs::write(dir.path().join("session.toml"), SESSION).unwrap();
    dir
}

#[test]
fn test_session_from_disk() {
    let dir = session_dir();
    let config = SessionConfig::load(dir.path().join("session.toml")).unwrap();
    let session = Session::build(config, SimulatedBackend::new()).unwrap();
    let manager = session.manager();

    let keys = manager.registry().get("keys").unwrap();
    assert_eq!(keys.head_samples(), 16_000);
    assert_eq!(keys.tail_samples(), 4_000);
    assert_eq!(keys.voice(), VoiceId(0));
    assert_eq!(manager.registry().get("hit").unwrap().voice(), VoiceId(3));
    assert_eq!(manager.backend().max_sample_count(), 16_000);

    let graph = manager.state_graph();
    assert_eq!(graph.active_state().unwrap().name(), "intro");
    assert_eq!(graph.state(StateId(1)).unwrap().trigger_resolution(), 16_000);
}

#[test]
fn test_session_drives_transition_and_input() {
    let dir = session_dir();
    let config = SessionConfig::load(dir.path().join("session.toml")).unwrap();
    let (backend, batches) = SimulatedBackend::with_channel();
    let clock = backend.clock();
    let mut session = Session::build(config, backend).unwrap();
    let manager = session.manager_mut();

    let initial = batches.try_recv().unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].clip, "keys");

    // Select "full" with the default number key binding.
    manager.handle_event(&InputEvent::down(Key::Char('2')));
    assert_eq!(manager.handle_event(&InputEvent::up(Key::Char('2'))), EventOutcome::Handled);

    // intro resolves at 16000 samples; pre-trigger is 600.
    while manager.sample_position() < 15_400 {
        clock.complete(1);
        manager.update();
    }
    let change = batches.try_recv().unwrap();
    assert_eq!(change.len(), 1);
    assert_eq!(change[0].kind, CommandKind::StartLoop);
    assert!(change[0].clip.starts_with("beat"));
    assert_eq!(change[0].marker, 16_000);
    assert_eq!(manager.state_graph().active_state().unwrap().name(), "full");

    // Releasing a key that was never pressed does nothing.
    assert_eq!(manager.handle_event(&InputEvent::up(Key::Char('h'))), EventOutcome::Ignored);
    assert!(batches.try_recv().is_err());

    manager.handle_event(&InputEvent::down(Key::Char('h')));
    manager.handle_event(&InputEvent::up(Key::Char('h')));
    let one_shot = batches.try_recv().unwrap();
    assert_eq!(one_shot[0].kind, CommandKind::OneShot);
    assert_eq!(one_shot[0].marker, 4_000);

    manager.handle_event(&InputEvent::down(Key::Char('q')));
    assert_eq!(manager.handle_event(&InputEvent::up(Key::Char('q'))), EventOutcome::Quit);
    assert!(manager.backend().sent().is_empty());
}

#[test]
fn test_missing_clip_file_fails_build() {
    let dir = session_dir();
    fs::remove_file(dir.path().join("clips").join("beat_alt.wav")).unwrap();
    let config = SessionConfig::load(dir.path().join("session.toml")).unwrap();
    assert!(Session::build(config, SimulatedBackend::new()).is_err());
}
