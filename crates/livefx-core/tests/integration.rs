//! Integration tests for the livefx engine.
//!
//! Each test drives an [`Engine`] with an offline renderer: compile, pull a
//! few blocks, then inspect the graph, the units and the spectra.

use livefx_core::{
    CompileOutcome, Endpoint, Engine, EngineConfig, EngineError, ParameterDescriptor,
};
use livefx_host::{BufferSource, Oscillator, Renderer};

const SAMPLE_RATE: f32 = 48000.0;
const GAIN_CODE: &str = "output[i]=input[i]*parameters.gain";

fn gain_param() -> Vec<ParameterDescriptor> {
    vec![ParameterDescriptor::new("gain", 1.0, 0.0, 2.0)]
}

fn engine_with_tone() -> (Engine, Renderer) {
    let (engine, renderer) = Engine::new(EngineConfig::default()).unwrap();
    engine
        .set_source(Some(Box::new(Oscillator::new(1000.0, 0.5, SAMPLE_RATE, 2))))
        .unwrap();
    (engine, renderer)
}

fn render(renderer: &mut Renderer, blocks: usize) {
    for _ in 0..blocks {
        renderer.render_quantum();
    }
}

fn first_sample(renderer: &mut Renderer) -> Option<f32> {
    let out = renderer.render_quantum();
    (out.channel_count() > 0).then(|| out.channel(0)[0])
}

// ============================================================================
// 1. Scenario: gain, then bypass
// ============================================================================

#[tokio::test]
async fn gain_then_bypass_scenario() {
    let (engine, mut renderer) = engine_with_tone();

    let outcome = engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    assert_eq!(outcome, CompileOutcome::Applied { module: Some("1".into()) });
    let state = engine.graph_state();
    assert!(state.contains(Endpoint::Source, Endpoint::DryTap));
    assert!(state.contains(Endpoint::DryTap, Endpoint::Unit));
    assert!(state.contains(Endpoint::Unit, Endpoint::WetTap));
    assert!(state.contains(Endpoint::WetTap, Endpoint::Destination));
    assert_eq!(state.edges.len(), 4);

    render(&mut renderer, 8);
    {
        let snapshot = engine.snapshot();
        assert!(snapshot.wet().iter().any(|&b| b > 0));
        assert!(snapshot.dry().iter().any(|&b| b > 0));
    }

    let outcome = engine.compile("", &[]).await.unwrap();
    assert_eq!(outcome, CompileOutcome::Applied { module: None });
    let state = engine.graph_state();
    assert!(state.contains(Endpoint::Source, Endpoint::DryTap));
    assert!(state.contains(Endpoint::DryTap, Endpoint::Destination));
    assert!(!state.edges.iter().any(|&(a, b)| a == Endpoint::Unit || b == Endpoint::Unit));

    render(&mut renderer, 2);
    let snapshot = engine.snapshot();
    assert!(snapshot.wet().iter().all(|&b| b == 0));
    assert!(snapshot.dry().iter().any(|&b| b > 0));
}

#[tokio::test]
async fn empty_compile_silences_wet_regardless_of_prior_state() {
    let (engine, mut renderer) = engine_with_tone();
    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    render(&mut renderer, 8);
    engine.compile("", &gain_param()).await.unwrap();
    assert!(engine.snapshot().wet().iter().all(|&b| b == 0));
    assert_eq!(engine.registry().len(), 1);
}

#[tokio::test]
async fn whitespace_code_loads_a_silent_unit() {
    let (engine, mut renderer) = engine_with_tone();
    let outcome = engine.compile("   \n\t", &gain_param()).await.unwrap();
    assert_eq!(outcome, CompileOutcome::Applied { module: Some("1".into()) });
    assert_eq!(engine.registry().len(), 1);
    assert!(engine.graph_state().contains(Endpoint::DryTap, Endpoint::Unit));

    render(&mut renderer, 8);
    let snapshot = engine.snapshot();
    assert!(snapshot.wet().iter().all(|&b| b == 0));
    assert!(snapshot.dry().iter().any(|&b| b > 0));
}

// ============================================================================
// 2. Swap handshake
// ============================================================================

#[tokio::test]
async fn swap_disconnects_previous_unit_exactly_once() {
    let (engine, mut renderer) = engine_with_tone();
    engine.compile("output[i] = input[i]", &[]).await.unwrap();
    let old = engine.active_unit().unwrap();
    render(&mut renderer, 2);

    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    let new = engine.active_unit().unwrap();
    assert_eq!(new.module(), "2");
    assert_eq!(engine.draining_count(), 1);

    render(&mut renderer, 1);
    assert_eq!(old.status().messages_received(), 1);
    assert!(old.status().has_stopped());
    assert!(!old.is_released());

    render(&mut renderer, 1);
    assert!(old.is_released());
    assert_eq!(engine.draining_count(), 0);
    assert_eq!(new.status().messages_received(), 0);
    assert!(!new.is_released());

    let state = engine.graph_state();
    assert_eq!(state.edges.iter().filter(|(_, to)| *to == Endpoint::Unit).count(), 1);
}

#[tokio::test]
async fn repeated_swaps_keep_the_render_graph_compact() {
    let (engine, mut renderer) = engine_with_tone();
    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    render(&mut renderer, 2);
    let steady = renderer.node_count();

    for _ in 0..40 {
        engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
        render(&mut renderer, 2);
    }
    assert_eq!(engine.registry().len(), 41);
    assert_eq!(engine.draining_count(), 0);
    assert_eq!(renderer.node_count(), steady);
}

#[tokio::test]
async fn set_parameter_takes_effect_next_block() {
    let (engine, mut renderer) = Engine::new(EngineConfig::default()).unwrap();
    engine
        .set_source(Some(Box::new(
            BufferSource::new(vec![vec![0.25; 1024]]).with_looping(true),
        )))
        .unwrap();
    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    assert_eq!(first_sample(&mut renderer), Some(0.25));
    assert!(engine.set_parameter("gain", 2.0));
    assert_eq!(first_sample(&mut renderer), Some(0.5));
    assert!(!engine.set_parameter("nope", 2.0));
}

#[tokio::test]
async fn unknown_parameter_reads_zero() {
    let (engine, mut renderer) = Engine::new(EngineConfig::default()).unwrap();
    engine
        .set_source(Some(Box::new(
            BufferSource::new(vec![vec![0.25; 1024]]).with_looping(true),
        )))
        .unwrap();
    engine
        .compile("output[i] = input[i] + parameters.missing", &[])
        .await
        .unwrap();
    assert_eq!(first_sample(&mut renderer), Some(0.25));
}

// ============================================================================
// 3. Load errors
// ============================================================================

#[tokio::test]
async fn invalid_code_leaves_active_unit_untouched() {
    let (engine, mut renderer) = engine_with_tone();
    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    let unit = engine.active_unit().unwrap();
    let before = engine.graph_state();

    let err = engine.compile("output[i] = = input[i]", &[]).await.unwrap_err();
    assert!(err.is_load_error(), "{err}");
    assert_eq!(engine.active_module().as_deref(), Some("1"));
    assert_eq!(engine.graph_state(), before);

    render(&mut renderer, 3);
    assert_eq!(unit.status().messages_received(), 0);
    assert!(!unit.is_released());
}

#[tokio::test]
async fn undefined_binding_is_a_load_error() {
    let (engine, _renderer) = engine_with_tone();
    let err = engine.compile("output[i] = undefined_thing", &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::Load(_)));
    assert_eq!(engine.active_module(), None);
    assert!(engine.graph_state().is_bypassed());
}

#[tokio::test]
async fn invalid_parameter_range_is_a_load_error() {
    let (engine, _renderer) = engine_with_tone();
    let err = engine
        .compile(GAIN_CODE, &[ParameterDescriptor::new("gain", 1.0, 2.0, 0.0)])
        .await
        .unwrap_err();
    assert!(err.is_load_error());
}

// ============================================================================
// 4. Module names and concurrency
// ============================================================================

#[tokio::test]
async fn back_to_back_compiles_get_distinct_names() {
    let (engine, _renderer) = engine_with_tone();
    let (a, b) = tokio::join!(
        engine.compile("output[i] = input[i]", &[]),
        engine.compile("output[i] = -input[i]", &[]),
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let mut names: Vec<String> = engine.registry().registrations().into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, ["1", "2"]);
    assert!(outcomes.iter().any(|o| matches!(o, CompileOutcome::Applied { .. })));
    assert!(engine.active_module().is_some());
}

#[tokio::test]
async fn superseded_compile_never_replaces_newer_unit() {
    let (engine, mut renderer) = engine_with_tone();
    // The second call starts later; whichever load finishes first, it wins.
    let params = gain_param();
    let (first, second) = tokio::join!(
        engine.compile("output[i] = input[i]", &[]),
        engine.compile(GAIN_CODE, &params),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(matches!(second, CompileOutcome::Applied { .. }));
    let active = engine.active_unit().unwrap();
    let CompileOutcome::Applied { module: Some(winner) } = second else {
        panic!("second compile should apply a unit");
    };
    assert_eq!(active.module(), winner);
    if first == CompileOutcome::Superseded {
        render(&mut renderer, 2);
        assert_eq!(engine.draining_count(), 0);
    }
    assert!(active.params().get("gain").is_some());
}

#[tokio::test]
async fn failed_compile_still_consumes_a_name() {
    let (engine, _renderer) = engine_with_tone();
    engine.compile("output[i] = (", &[]).await.unwrap_err();
    let outcome = engine.compile("output[i] = input[i]", &[]).await.unwrap();
    assert_eq!(outcome, CompileOutcome::Applied { module: Some("2".into()) });
}

// ============================================================================
// 5. Source binding and snapshots
// ============================================================================

#[tokio::test]
async fn rebinding_source_preserves_unit() {
    let (engine, mut renderer) = engine_with_tone();
    engine.compile(GAIN_CODE, &gain_param()).await.unwrap();
    let nodes_before = engine.context().live_node_count();
    engine
        .set_source(Some(Box::new(Oscillator::new(220.0, 0.5, SAMPLE_RATE, 1))))
        .unwrap();
    render(&mut renderer, 1);
    assert_eq!(engine.context().live_node_count(), nodes_before);
    assert_eq!(engine.active_module().as_deref(), Some("1"));
    assert!(engine.graph_state().contains(Endpoint::DryTap, Endpoint::Unit));
}

#[test]
fn none_source_keeps_binding() {
    let (engine, _renderer) = engine_with_tone();
    let before = engine.graph_state();
    engine.set_source(None).unwrap();
    assert_eq!(engine.graph_state(), before);
    assert!(before.contains(Endpoint::Source, Endpoint::DryTap));
}

#[test]
fn snapshot_lengths_are_stable() {
    let (engine, mut renderer) = engine_with_tone();
    render(&mut renderer, 4);
    let first = engine.snapshot().dry().len();
    let second = engine.snapshot().dry().len();
    assert_eq!(first, second);
    assert_eq!(first, EngineConfig::default().fft_size / 2);
    assert_eq!(engine.snapshot().wet().len(), first);
}
