//! End-to-end rig runs against the simulated headset runtime and the null
//! graphics backend.

use std::sync::{Arc, Mutex};
use stereoscope::preview::NullPreviewSink;
use stereoscope::render::NullGpuBackend;
use stereoscope::rig::{RigConfig, StereoRig};
use stereoscope::session::{Eye, SimulatedRuntime, TextureBounds};

fn rig_with(
    config: RigConfig,
    runtime: SimulatedRuntime,
    log: Arc<Mutex<Vec<(u32, u32)>>>,
) -> StereoRig<NullPreviewSink> {
    StereoRig::with_parts(
        config,
        Box::new(runtime),
        Box::new(NullGpuBackend::new()),
        NullPreviewSink::new().with_log(log),
    )
}

#[test]
fn rig_delivers_composite_frames_to_the_sink() {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let mut rig = rig_with(
        RigConfig::default(),
        SimulatedRuntime::new((8, 4)),
        frames.clone(),
    );

    let summary = rig.run().expect("run succeeds");
    assert_eq!(summary.frames_rendered, 3);
    assert!(summary.headset_active);

    // The sink learned the composite size exactly once, before any frame.
    assert_eq!(rig.sink().announced_size(), Some((16, 4)));
    assert_eq!(rig.sink().size_changes(), 1);

    let frames = frames.lock().expect("frame log");
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|&size| size == (16, 4)));
}

#[test]
fn each_frame_submits_both_eye_halves() {
    let runtime = SimulatedRuntime::new((8, 4));
    let submissions = runtime.submission_log();
    let mut rig = rig_with(
        RigConfig {
            max_frames: 2,
            ..RigConfig::default()
        },
        runtime,
        Arc::new(Mutex::new(Vec::new())),
    );
    rig.run().expect("run succeeds");

    let submissions = submissions.lock().expect("submission log");
    assert_eq!(submissions.len(), 4);
    for pair in submissions.chunks_exact(2) {
        assert_eq!(pair[0].0, Eye::Left);
        assert_eq!(pair[0].2, TextureBounds::left_half());
        assert_eq!(pair[1].0, Eye::Right);
        assert_eq!(pair[1].2, TextureBounds::right_half());
        assert_eq!(pair[0].1, pair[1].1);
    }
}

#[test]
fn headset_less_run_emits_blank_preview_frames() {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let mut rig = rig_with(
        RigConfig::default(),
        SimulatedRuntime::new((8, 4)).with_failing_start(),
        frames.clone(),
    );

    let summary = rig.run().expect("degraded run still succeeds");
    assert_eq!(summary.frames_rendered, 3);
    assert!(!summary.headset_active);

    // Frames come out at the preview size, not a composite size.
    assert_eq!(rig.sink().announced_size(), Some((1024, 768)));
    let frames = frames.lock().expect("frame log");
    assert!(frames.iter().all(|&size| size == (1024, 768)));
}

#[test]
fn animation_counter_wraps_over_a_long_run() {
    let mut rig = rig_with(
        RigConfig {
            max_frames: 150,
            ..RigConfig::default()
        },
        SimulatedRuntime::new((4, 2)),
        Arc::new(Mutex::new(Vec::new())),
    );
    rig.run().expect("run succeeds");

    // 150 advances through a 0..=100 counter land at 49.
    assert_eq!(rig.renderer().frame_count(), 150 % 101);
}

#[test]
fn compositor_failure_degrades_to_preview_only() {
    let runtime = SimulatedRuntime::new((8, 4)).with_failing_compositor();
    let submissions = runtime.submission_log();
    let frames = Arc::new(Mutex::new(Vec::new()));
    let mut rig = rig_with(RigConfig::default(), runtime, frames.clone());

    let summary = rig.run().expect("run succeeds");
    assert_eq!(summary.frames_rendered, 3);
    assert!(summary.headset_active);
    assert!(!rig.session().compositor_active());

    // Rendering continued, nothing reached the compositor.
    assert_eq!(frames.lock().expect("frame log").len(), 3);
    assert!(submissions.lock().expect("submission log").is_empty());
}
