//! End-to-end scheduling against the simulated backend.

use loopgraph_core::backend::sim::SimulatedBackend;
use loopgraph_core::{
    AudioBackend, AudioSpec, CommandKind, Cyclic, LoopDefinition, LoopManager, LoopRegistry,
    LoopSequence, LoopState, StateGraph, StateId, TickOutcome,
};
use std::sync::Arc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// S1 = {a (1000), b (600)}, S2 = {b (600), c (1200)}, buffers of 100 samples.
fn scenario() -> LoopManager<SimulatedBackend> {
    let mut backend = SimulatedBackend::new();
    backend
        .init(&AudioSpec {
            sample_rate: 48_000,
            channels: 1,
            buffer_size: 100,
        })
        .unwrap();
    backend.preset_clip("a", 1000, 0);
    backend.preset_clip("b", 600, 0);
    backend.preset_clip("c", 1200, 0);

    let mut registry = LoopRegistry::new("clips");
    let mut register = |name: &str| {
        registry
            .register(&mut backend, LoopDefinition::new(name, format!("{name}.wav")))
            .unwrap()
    };
    let (a, b, c) = (register("a"), register("b"), register("c"));

    let seq = |name: &str, lp: &Arc<loopgraph_core::Loop>| {
        LoopSequence::new(name, vec![Arc::clone(lp)], Arc::new(Cyclic)).unwrap()
    };
    let s1 = LoopState::new("S1", vec![seq("x", &a), seq("y", &b)]).unwrap();
    let s2 = LoopState::new("S2", vec![seq("y", &b), seq("z", &c)]).unwrap();
    assert_eq!(s1.trigger_resolution(), 1000);
    assert_eq!(s2.trigger_resolution(), 1200);

    let graph = StateGraph::fully_connected(vec![s1, s2], StateId(0)).unwrap();
    LoopManager::new(backend, graph, registry).unwrap()
}

#[test]
fn test_single_commit_when_crossing_seven_hundred() {
    init_logging();
    let mut manager = scenario();
    assert_eq!(manager.pre_trigger(), 300);
    manager.backend_mut().take_sent();
    manager.state_graph_mut().point_stimulus_at(StateId(1));

    let mut commits = Vec::new();
    for _ in 0..11 {
        manager.backend().complete_buffers(1);
        if let TickOutcome::Transitioned { from, to } = manager.update() {
            commits.push((manager.sample_position(), from, to));
        }
    }
    assert_eq!(commits, vec![(700, StateId(0), StateId(1))]);

    let sent = manager.backend_mut().take_sent();
    let transition = sent
        .iter()
        .find(|batch| batch.iter().any(|c| c.clip == "a"))
        .unwrap();
    let summary: Vec<_> = transition.iter().map(|c| (c.kind, c.clip.as_str())).collect();
    assert_eq!(
        summary,
        vec![(CommandKind::StopLoop, "a"), (CommandKind::StartLoop, "c")]
    );
    assert!(transition.iter().all(|c| c.marker == 1200));
}

#[test]
fn test_preview_does_not_commit() {
    let mut manager = scenario();
    manager.state_graph_mut().point_stimulus_at(StateId(1));
    for _ in 0..10 {
        assert_eq!(manager.state_graph().next_state(), StateId(1));
    }
    assert_eq!(manager.state_graph().active_id(), Some(StateId(0)));
    assert_eq!(manager.previewed(), StateId(0));
    manager.update();
    assert_eq!(manager.previewed(), StateId(1));
    assert_eq!(manager.state_graph().active_id(), Some(StateId(0)));
}

#[test]
fn test_exactly_one_active_state_over_many_cycles() {
    let mut manager = scenario();
    for tick in 0..200u64 {
        if tick % 17 == 0 {
            let target = StateId(((tick / 17) % 2) as usize);
            manager.state_graph_mut().point_stimulus_at(target);
        }
        manager.backend().complete_buffers(1 + tick % 3);
        manager.update();

        let graph = manager.state_graph();
        let active = graph.states().filter(|(_, s)| s.is_active()).count();
        assert_eq!(active, 1);
        assert!(manager.sample_position() < manager.backend().max_sample_count());
    }
    assert!(manager.total_loops() > 0);
}

#[test]
fn test_shared_loop_is_never_restarted() {
    let mut manager = scenario();
    manager.backend_mut().take_sent();
    for round in 0..6 {
        manager
            .state_graph_mut()
            .point_stimulus_at(StateId((round + 1) % 2));
        for _ in 0..12 {
            manager.backend().complete_buffers(1);
            manager.update();
        }
    }
    let sent = manager.backend().sent();
    assert!(!sent.is_empty());
    assert!(sent.iter().flatten().all(|c| c.clip != "b"));
}
