// Fatal conditions: runaway path tracing, collaborator errors and bad settings

mod common;

use cloudbox_mc::{Model, MonteCarloError, Scene, Settings};
use common::*;

#[test]
fn test_stuck_stepper_diverges() {
    let optics = Homogeneous { extinction: 1.0, absorption: 0.5, stokes_dim: 1 };
    let phase = LinearPhase::isotropic(0.5, 1);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let mut run_settings = settings(10, 1, 1);
    run_settings.max_path_steps = 50;

    let model = Model::new(Scene::new(&StuckStepper, &optics, &phase, &boundary), run_settings);
    match model.run(&top_sensor(1.0)) {
        Err(MonteCarloError::Divergence { steps, limit }) => {
            assert_eq!(limit, 50);
            assert!(steps > limit);
        }
        other => panic!("expected divergence, got {:?}", other.map(|r| r.stokes)),
    }
}

#[test]
fn test_default_step_limit_is_reported() {
    let optics = Homogeneous { extinction: 1.0, absorption: 1.0, stokes_dim: 1 };
    let phase = LinearPhase::isotropic(0.0, 1);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let model = Model::new(Scene::new(&StuckStepper, &optics, &phase, &boundary), settings(1, 1, 1));
    let err = model.run(&top_sensor(1.0)).unwrap_err();
    assert!(err.to_string().contains("limit 5000"), "{}", err);
}

#[test]
fn test_optical_property_error_propagates() {
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    let phase = LinearPhase::isotropic(0.5, 1);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let model = Model::new(Scene::new(&stepper, &FailingOptics, &phase, &boundary), settings(10, 1, 1));
    let err = model.run(&top_sensor(1.0)).unwrap_err();
    assert!(matches!(err, MonteCarloError::Collaborator(_)));
    assert!(err.to_string().starts_with("no optical data"));
}

#[test]
fn test_phase_matrix_error_propagates() {
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    // Albedo 1: the first photon scatters and asks for a phase matrix
    let optics = Homogeneous { extinction: 2.0, absorption: 0.0, stokes_dim: 1 };
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let model = Model::new(Scene::new(&stepper, &optics, &FailingPhase, &boundary), settings(10, 1, 1));
    let err = model.run(&top_sensor(1.0)).unwrap_err();
    assert_eq!(err.to_string(), "phase matrix table not loaded");
}

#[test]
fn test_boundary_with_wrong_stokes_dimension_is_inconsistent() {
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    let optics = Homogeneous { extinction: 1.0, absorption: 1.0, stokes_dim: 2 };
    let phase = LinearPhase::isotropic(0.0, 2);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let model = Model::new(Scene::new(&stepper, &optics, &phase, &boundary), settings(10, 2, 1));
    assert!(matches!(
        model.run(&top_sensor(1.0)),
        Err(MonteCarloError::Inconsistency(_))
    ));
}

#[test]
fn test_invalid_settings_rejected_before_tracing() {
    let optics = Homogeneous { extinction: 1.0, absorption: 1.0, stokes_dim: 1 };
    let phase = LinearPhase::isotropic(0.0, 1);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let bad = Settings {
        photons: 0,
        ..settings(1, 1, 1)
    };
    // The stuck stepper would diverge if tracing started
    let model = Model::new(Scene::new(&StuckStepper, &optics, &phase, &boundary), bad);
    assert!(matches!(
        model.run(&top_sensor(1.0)),
        Err(MonteCarloError::InvalidSettings(_))
    ));
}

#[test]
fn test_unwritable_photon_log_fails_before_tracing() {
    let dir = tempfile::tempdir().unwrap();
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    let optics = Homogeneous { extinction: 2.0, absorption: 0.0, stokes_dim: 1 };
    let phase = CountingPhase::new(LinearPhase::isotropic(2.0, 1), None);
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let scene = Scene::new(&stepper, &optics, &phase, &boundary);

    let mut log_settings = settings(40, 1, 1);
    log_settings.photon_log = Some(dir.path().join("missing").join("photons.txt"));
    let err = Model::new(scene, log_settings).run(&top_sensor(1.0)).unwrap_err();
    assert!(matches!(err, MonteCarloError::Io(_)), "{}", err);

    let mut path_settings = settings(40, 1, 1);
    path_settings.record_paths = Some(dir.path().join("missing").join("paths.jsonl"));
    let err = Model::new(scene, path_settings).run(&top_sensor(1.0)).unwrap_err();
    assert!(matches!(err, MonteCarloError::Io(_)), "{}", err);

    assert_eq!(phase.calls(), 0);
}

#[test]
fn test_failing_first_batch_stops_the_run() {
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    // Albedo 1: every photon asks for a phase matrix
    let optics = Homogeneous { extinction: 2.0, absorption: 0.0, stokes_dim: 1 };
    let phase = CountingPhase::new(LinearPhase::isotropic(2.0, 1), Some(0));
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };
    let model = Model::new(Scene::new(&stepper, &optics, &phase, &boundary), settings(80, 1, 3));

    let err = model.run(&top_sensor(1.0)).unwrap_err();
    assert!(matches!(err, MonteCarloError::Collaborator(_)));
    assert_eq!(phase.calls(), 1);
}

#[test]
fn test_failing_batch_stops_later_windows() {
    let stepper = CubeStepper { side: 1.0, step_length: 0.5 };
    let optics = Homogeneous { extinction: 2.0, absorption: 0.0, stokes_dim: 1 };
    let boundary = UniformBoundary { radiance: 1.0, stokes_dim: 1 };

    // Phase matrix calls made by the ten photons of the first batch
    let counter = CountingPhase::new(LinearPhase::isotropic(2.0, 1), None);
    let mut first_batch = settings(10, 1, 3);
    first_batch.batches = 1;
    Model::new(Scene::new(&stepper, &optics, &counter, &boundary), first_batch)
        .run(&top_sensor(1.0))
        .unwrap();
    let first_batch_calls = counter.calls();
    assert!(first_batch_calls >= 10);

    // On one thread every window holds a single batch: the second batch fails
    // on its first call and no later batch starts.
    let phase = CountingPhase::new(LinearPhase::isotropic(2.0, 1), Some(first_batch_calls));
    let model = Model::new(Scene::new(&stepper, &optics, &phase, &boundary), settings(80, 1, 3));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
    let err = pool.install(|| model.run(&top_sensor(1.0))).unwrap_err();
    assert!(matches!(err, MonteCarloError::Collaborator(_)));
    assert_eq!(phase.calls(), first_batch_calls + 1);
}
