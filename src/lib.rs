//! Stereoscope: a stereo headset rendering rig.
//!
//! Renders a spinning demo object once per eye into multisampled targets,
//! resolves both eyes into a side-by-side composite, hands the composite to
//! the headset compositor, and mirrors it to a 2D preview. Without headset
//! hardware or a GPU the same pipeline runs against simulated backends.
//!
//! Feature flags:
//! - `render-wgpu`: offscreen wgpu graphics backend.
//! - `vr-openvr`: OpenVR headset runtime.

pub mod math;
pub mod preview;
pub mod render;
pub mod rig;
pub mod scene;
pub mod session;

use preview::NullPreviewSink;
use rig::{RigConfig, RunSummary, StereoRig};

/// Runs a default rig to completion and reports what it did.
pub fn run(config: RigConfig) -> render::RenderResult<RunSummary> {
    let mut rig = StereoRig::bootstrap(config, NullPreviewSink::new());
    let summary = rig.run()?;
    log::info!(
        "[stereoscope] rendered {} frames (headset {})",
        summary.frames_rendered,
        if summary.headset_active {
            "active"
        } else {
            "absent"
        }
    );
    Ok(summary)
}
