//! Wires a headset session, a stereo renderer, and a preview sink into one
//! runnable unit, with compile-time feature selection of the hardware
//! backends and graceful fallbacks when neither is available.

use crate::preview::PreviewSink;
use crate::render::{GpuBackend, NullGpuBackend, RenderResult, StereoFrameRenderer};
use crate::scene::SceneConfig;
use crate::session::{HeadsetRuntime, HeadsetSession};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PREVIEW_SIZE: (u32, u32) = (1024, 768);
pub const DEFAULT_MAX_FRAMES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub scene: SceneConfig,
    pub preview_size: (u32, u32),
    /// Frames rendered by [`StereoRig::run`] before it returns.
    pub max_frames: u32,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            scene: SceneConfig::default(),
            preview_size: DEFAULT_PREVIEW_SIZE,
            max_frames: DEFAULT_MAX_FRAMES,
        }
    }
}

/// What a finished [`StereoRig::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_rendered: u32,
    pub headset_active: bool,
}

fn build_runtime() -> Box<dyn HeadsetRuntime> {
    #[cfg(feature = "vr-openvr")]
    {
        Box::new(crate::session::openvr::OpenVrRuntime::new())
    }
    #[cfg(not(feature = "vr-openvr"))]
    {
        Box::new(crate::session::SimulatedRuntime::default())
    }
}

fn build_backend() -> Box<dyn GpuBackend> {
    #[cfg(feature = "render-wgpu")]
    {
        match crate::render::wgpu_backend::WgpuBackend::initialize() {
            Ok(backend) => return Box::new(backend),
            Err(err) => {
                log::warn!("[rig] wgpu unavailable ({err}), falling back to null backend");
            }
        }
    }
    Box::new(NullGpuBackend::new())
}

/// Session, renderer, and preview sink assembled per [`RigConfig`].
pub struct StereoRig<S: PreviewSink> {
    config: RigConfig,
    session: HeadsetSession,
    renderer: StereoFrameRenderer,
    sink: S,
}

impl<S: PreviewSink> StereoRig<S> {
    /// Builds the rig with the backends selected by the enabled features.
    pub fn bootstrap(config: RigConfig, sink: S) -> Self {
        let session = HeadsetSession::new(build_runtime());
        let renderer = StereoFrameRenderer::new(build_backend(), config.preview_size);
        Self {
            config,
            session,
            renderer,
            sink,
        }
    }

    /// Same assembly with the moving parts supplied by the caller.
    pub fn with_parts(
        config: RigConfig,
        runtime: Box<dyn HeadsetRuntime>,
        backend: Box<dyn GpuBackend>,
        sink: S,
    ) -> Self {
        let session = HeadsetSession::new(runtime);
        let renderer = StereoFrameRenderer::new(backend, config.preview_size);
        Self {
            config,
            session,
            renderer,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn session(&self) -> &HeadsetSession {
        &self.session
    }

    pub fn renderer(&self) -> &StereoFrameRenderer {
        &self.renderer
    }

    /// Initializes the session, sets up the renderer, and renders
    /// `max_frames` frames into the sink. A headset that fails to initialize
    /// degrades to preview-only blank frames; a renderer setup failure is
    /// fatal.
    pub fn run(&mut self) -> RenderResult<RunSummary> {
        let eye_size = match self.session.initialize() {
            Ok(report) => {
                log::info!(
                    "[rig] headset ready: eye {}x{}, compositor {}",
                    report.eye_size.0,
                    report.eye_size.1,
                    if report.compositor_active {
                        "active"
                    } else {
                        "inactive"
                    }
                );
                report.eye_size
            }
            Err(err) => {
                log::warn!("[rig] headset unavailable ({err}), preview-only run");
                // Halving the preview width keeps the blank composite at the
                // preview aspect ratio.
                (self.config.preview_size.0 / 2, self.config.preview_size.1)
            }
        };

        self.renderer.setup(self.config.scene.clone(), eye_size)?;

        let frame_size = if self.session.is_ready() {
            (eye_size.0 * 2, eye_size.1)
        } else {
            self.config.preview_size
        };
        self.sink.frame_size_changed(frame_size);

        let mut frames_rendered = 0;
        for _ in 0..self.config.max_frames {
            match self.renderer.render_frame(&mut self.session) {
                Ok(image) => {
                    self.sink.frame_ready(&image);
                    frames_rendered += 1;
                }
                Err(err) => {
                    log::error!("[rig] frame failed: {err}");
                }
            }
        }

        Ok(RunSummary {
            frames_rendered,
            headset_active: self.session.is_ready(),
        })
    }

    /// Tears down the renderer and session. Also runs on drop.
    pub fn shutdown(&mut self) {
        self.renderer.teardown();
        self.session.shutdown();
    }
}

impl<S: PreviewSink> Drop for StereoRig<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::NullPreviewSink;

    #[test]
    fn bootstrap_defaults_run_headless() {
        let mut rig = StereoRig::bootstrap(RigConfig::default(), NullPreviewSink::new());
        let summary = rig.run().expect("headless run");
        assert_eq!(summary.frames_rendered, DEFAULT_MAX_FRAMES);
        assert_eq!(rig.sink().frames(), DEFAULT_MAX_FRAMES);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = RigConfig {
            max_frames: 7,
            ..RigConfig::default()
        };
        let json = serde_json::to_string(&config).expect("serialize");
        let back: RigConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.max_frames, 7);
        assert_eq!(back.preview_size, DEFAULT_PREVIEW_SIZE);
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let back: RigConfig = serde_json::from_str(r#"{"max_frames": 1}"#).expect("deserialize");
        assert_eq!(back.max_frames, 1);
        assert_eq!(back.preview_size, DEFAULT_PREVIEW_SIZE);
    }
}
