//! Stereo frame rendering: per-eye draw, multisample resolve into a
//! side-by-side composite, compositor hand-off, and the 2D preview snapshot.

#[cfg(feature = "render-wgpu")]
pub mod wgpu_backend;

use crate::scene::{LightingParams, SceneConfig, SceneGeometry};
use crate::session::{CompositeHandle, Eye, HeadsetSession};
use glam::{Mat4, Vec4};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("failed to create graphics context: {0}")]
    Context(String),
    #[error("shader link failed: {log}")]
    ShaderLink { log: String },
    #[error("graphics backend failure: {0}")]
    Backend(&'static str),
    #[error("renderer is not set up")]
    NotReady,
}

pub type RenderResult<T> = Result<T, GraphicsError>;

/// RGBA8 snapshot of a finished frame, handed to the preview sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl CompositeImage {
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// RGBA at (x, y), or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels.get(offset..offset + 4).map(|rgba| {
            let mut out = [0; 4];
            out.copy_from_slice(rgba);
            out
        })
    }
}

/// Bounded demo-animation counter: increments once per rendered frame and
/// resets to zero as soon as it exceeds the limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCounter(u32);

impl FrameCounter {
    pub const LIMIT: u32 = 100;

    pub fn advance(&mut self) {
        self.0 += 1;
        if self.0 > Self::LIMIT {
            self.0 = 0;
        }
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

/// Per-eye shading inputs computed by the renderer each frame.
#[derive(Debug, Clone, Copy)]
pub struct EyeUniforms {
    pub mvp: Mat4,
    pub model: Mat4,
    pub eye_position: Vec4,
    pub lighting: Option<LightingParams>,
    pub clear_color: [f32; 4],
}

/// Graphics resource owner and raw draw surface. Implementations hold every
/// GPU object behind scoped ownership so a failed or partial setup releases
/// whatever was created.
pub trait GpuBackend: Send {
    fn label(&self) -> &'static str;

    /// Creates the context, shader program, static geometry buffers,
    /// textures, the two multisampled per-eye targets at `eye_size`, and the
    /// non-multisampled resolve target at double width.
    fn setup(
        &mut self,
        scene: &SceneConfig,
        geometry: &SceneGeometry,
        eye_size: (u32, u32),
    ) -> RenderResult<()>;

    /// Clears and draws one eye into its multisampled target.
    fn draw_eye(&mut self, eye: Eye, uniforms: &EyeUniforms) -> RenderResult<()>;

    /// Downsamples one eye's target into its half of the resolve target
    /// (left at x = 0, right at x = eye width).
    fn resolve_eye(&mut self, eye: Eye) -> RenderResult<()>;

    /// Handle the compositor can submit, if the resolve target exists.
    fn composite_handle(&self) -> Option<CompositeHandle>;

    /// Copies the resolve target back into CPU memory.
    fn snapshot(&mut self) -> RenderResult<CompositeImage>;

    /// Releases all resources in reverse-acquisition order. Idempotent.
    fn teardown(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RendererState {
    Uninitialized,
    Ready,
    Released,
}

/// Owns the graphics backend and runs the per-frame stereo algorithm.
pub struct StereoFrameRenderer {
    backend: Box<dyn GpuBackend>,
    scene: SceneConfig,
    preview_size: (u32, u32),
    eye_size: (u32, u32),
    counter: FrameCounter,
    state: RendererState,
}

impl StereoFrameRenderer {
    pub fn new(backend: Box<dyn GpuBackend>, preview_size: (u32, u32)) -> Self {
        Self {
            backend,
            scene: SceneConfig::default(),
            preview_size,
            eye_size: (0, 0),
            counter: FrameCounter::default(),
            state: RendererState::Uninitialized,
        }
    }

    /// Builds the scene geometry and delegates resource creation to the
    /// backend. On failure the backend is torn down before the error is
    /// returned, so a partial setup never leaks the subset that succeeded.
    pub fn setup(&mut self, scene: SceneConfig, eye_size: (u32, u32)) -> RenderResult<()> {
        if self.state == RendererState::Released {
            return Err(GraphicsError::NotReady);
        }
        let geometry = SceneGeometry::build(scene.geometry);
        if let Err(err) = self.backend.setup(&scene, &geometry, eye_size) {
            self.backend.teardown();
            self.state = RendererState::Released;
            return Err(err);
        }
        log::info!(
            "[render] {} ready: {} vertices, eye {}x{}, composite {}x{}",
            self.backend.label(),
            geometry.vertex_count(),
            eye_size.0,
            eye_size.1,
            eye_size.0 * 2,
            eye_size.1
        );
        self.scene = scene;
        self.eye_size = eye_size;
        self.state = RendererState::Ready;
        Ok(())
    }

    pub fn preview_size(&self) -> (u32, u32) {
        self.preview_size
    }

    pub fn frame_count(&self) -> u32 {
        self.counter.value()
    }

    /// Renders one stereo frame. With a ready headset session this polls
    /// poses, draws and resolves both eyes, submits the composite, and
    /// snapshots the resolve target. Without one it skips straight to a
    /// blank preview-sized frame so the preview pipeline keeps running.
    pub fn render_frame(&mut self, session: &mut HeadsetSession) -> RenderResult<CompositeImage> {
        if self.state != RendererState::Ready {
            return Err(GraphicsError::NotReady);
        }

        let image = if session.is_ready() {
            self.render_stereo(session)?
        } else {
            CompositeImage::blank(self.preview_size.0, self.preview_size.1)
        };

        self.counter.advance();
        Ok(image)
    }

    fn render_stereo(&mut self, session: &mut HeadsetSession) -> RenderResult<CompositeImage> {
        let head = match session.poll_poses() {
            Ok(head) => head,
            Err(err) => {
                // Runtime disconnected mid-session: degrade like the
                // headset-less path instead of failing the frame.
                log::warn!("[render] pose wait failed, emitting blank frame: {err}");
                return Ok(CompositeImage::blank(
                    self.preview_size.0,
                    self.preview_size.1,
                ));
            }
        };

        // The demo object is head-locked: anchor it to the tracked head
        // transform, then push it out to the configured depth and spin it.
        let model = head.inverse() * self.scene.model_transform(self.counter.value());

        for eye in Eye::BOTH {
            let projection = session
                .eye_projection(eye)
                .map_err(|_| GraphicsError::Backend("session lost mid-frame"))?;
            let eye_pose = session
                .eye_pose(eye)
                .map_err(|_| GraphicsError::Backend("session lost mid-frame"))?;
            let view = eye_pose * head;
            let uniforms = EyeUniforms {
                mvp: projection * view * model,
                model,
                // World-space eye position for specular shading.
                eye_position: view.inverse().w_axis,
                lighting: self.scene.lighting,
                clear_color: self.scene.clear_color,
            };
            self.backend.draw_eye(eye, &uniforms)?;
            self.backend.resolve_eye(eye)?;
        }

        if let Some(handle) = self.backend.composite_handle() {
            if let Err(err) = session.submit_composite(handle) {
                log::warn!("[render] compositor submit failed: {err}");
            }
        }

        self.backend.snapshot()
    }

    /// Releases all graphics resources. Idempotent; safe after a failed
    /// setup.
    pub fn teardown(&mut self) {
        if self.state != RendererState::Released {
            self.backend.teardown();
            self.state = RendererState::Released;
        }
    }
}

impl Drop for StereoFrameRenderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Resource lifecycle of a [`NullGpuBackend`], observable after the backend
/// has been boxed and moved into a renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullBackendStatus {
    pub teardown_calls: u32,
    /// True while the backend holds its composite buffer.
    pub holds_composite: bool,
}

pub type NullBackendStatusHandle = std::sync::Arc<std::sync::Mutex<NullBackendStatus>>;

/// Headless backend that models the composite layout in CPU memory: each eye
/// fills its half of the resolve buffer with a distinct value, so layout and
/// lifecycle behavior stay testable without a GPU.
pub struct NullGpuBackend {
    fail_setup: bool,
    eye_size: (u32, u32),
    composite: Option<Vec<u8>>,
    pending_fill: [Option<u8>; 2],
    status: NullBackendStatusHandle,
}

impl NullGpuBackend {
    /// Brightness each eye's half is filled with after a resolve.
    pub const EYE_FILL: [u8; 2] = [0x40, 0xc0];

    pub fn new() -> Self {
        Self {
            fail_setup: false,
            eye_size: (0, 0),
            composite: None,
            pending_fill: [None; 2],
            status: NullBackendStatusHandle::default(),
        }
    }

    /// Declines `setup` after allocating, exercising the
    /// partial-initialization cleanup path.
    pub fn with_setup_failure(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    pub fn status_handle(&self) -> NullBackendStatusHandle {
        std::sync::Arc::clone(&self.status)
    }

    fn record_status(&self) {
        if let Ok(mut status) = self.status.lock() {
            status.holds_composite = self.composite.is_some();
        }
    }
}

impl Default for NullGpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuBackend for NullGpuBackend {
    fn label(&self) -> &'static str {
        "Null GPU Backend"
    }

    fn setup(
        &mut self,
        _scene: &SceneConfig,
        geometry: &SceneGeometry,
        eye_size: (u32, u32),
    ) -> RenderResult<()> {
        self.eye_size = eye_size;
        self.composite = Some(vec![0; eye_size.0 as usize * 2 * eye_size.1 as usize * 4]);
        self.record_status();
        if self.fail_setup {
            return Err(GraphicsError::ShaderLink {
                log: "null backend configured to decline".into(),
            });
        }
        log::debug!(
            "[render] null backend holding {} vertices",
            geometry.vertex_count()
        );
        Ok(())
    }

    fn draw_eye(&mut self, eye: Eye, _uniforms: &EyeUniforms) -> RenderResult<()> {
        if self.composite.is_none() {
            return Err(GraphicsError::NotReady);
        }
        self.pending_fill[eye.index()] = Some(Self::EYE_FILL[eye.index()]);
        Ok(())
    }

    fn resolve_eye(&mut self, eye: Eye) -> RenderResult<()> {
        let (eye_width, height) = (self.eye_size.0 as usize, self.eye_size.1 as usize);
        let composite = self.composite.as_mut().ok_or(GraphicsError::NotReady)?;
        let fill = self.pending_fill[eye.index()]
            .take()
            .ok_or(GraphicsError::Backend("resolve before draw"))?;

        let x_offset = eye.index() * eye_width;
        let row_stride = eye_width * 2 * 4;
        for y in 0..height {
            let start = y * row_stride + x_offset * 4;
            for pixel in composite[start..start + eye_width * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&[fill, fill, fill, 0xff]);
            }
        }
        Ok(())
    }

    fn composite_handle(&self) -> Option<CompositeHandle> {
        self.composite.as_ref().map(|_| CompositeHandle {
            id: 1,
            size: [self.eye_size.0 * 2, self.eye_size.1],
        })
    }

    fn snapshot(&mut self) -> RenderResult<CompositeImage> {
        let composite = self.composite.as_ref().ok_or(GraphicsError::NotReady)?;
        Ok(CompositeImage {
            width: self.eye_size.0 * 2,
            height: self.eye_size.1,
            pixels: composite.clone(),
        })
    }

    fn teardown(&mut self) {
        self.composite = None;
        self.pending_fill = [None; 2];
        if let Ok(mut status) = self.status.lock() {
            status.teardown_calls += 1;
            status.holds_composite = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SimulatedRuntime;
    use proptest::prelude::*;

    fn ready_renderer(eye_size: (u32, u32)) -> StereoFrameRenderer {
        let mut renderer = StereoFrameRenderer::new(Box::new(NullGpuBackend::new()), (1024, 768));
        renderer
            .setup(SceneConfig::default(), eye_size)
            .expect("null setup succeeds");
        renderer
    }

    fn ready_session() -> HeadsetSession {
        let mut session = HeadsetSession::new(Box::new(SimulatedRuntime::default()));
        session.initialize().expect("simulated init succeeds");
        session
    }

    #[test]
    fn frame_counter_wraps_past_limit() {
        let mut counter = FrameCounter::default();
        for _ in 0..=FrameCounter::LIMIT {
            counter.advance();
        }
        assert_eq!(counter.value(), 0);
    }

    proptest! {
        #[test]
        fn frame_counter_advances_modulo_101(n in 0u32..1000) {
            let mut counter = FrameCounter::default();
            for _ in 0..n {
                counter.advance();
            }
            prop_assert_eq!(counter.value(), n % 101);
        }
    }

    #[test]
    fn composite_layout_is_side_by_side() {
        let (w, h) = (8, 4);
        let mut renderer = ready_renderer((w, h));
        let mut session = ready_session();

        let image = renderer.render_frame(&mut session).expect("frame");
        assert_eq!((image.width, image.height), (w * 2, h));
        for y in 0..h {
            for x in 0..w {
                let left = image.pixel(x, y).expect("left half in bounds");
                let right = image.pixel(x + w, y).expect("right half in bounds");
                assert_eq!(left[0], NullGpuBackend::EYE_FILL[0]);
                assert_eq!(right[0], NullGpuBackend::EYE_FILL[1]);
            }
        }
    }

    #[test]
    fn pixel_lookup_outside_the_image_is_none() {
        let image = CompositeImage::blank(4, 2);
        assert_eq!(image.pixel(0, 0), Some([0; 4]));
        assert_eq!(image.pixel(3, 1), Some([0; 4]));
        assert_eq!(image.pixel(4, 0), None);
        assert_eq!(image.pixel(0, 2), None);
    }

    #[test]
    fn uninitialized_session_still_yields_preview_frame() {
        let mut renderer = ready_renderer((8, 4));
        // Session that never managed to initialize.
        let runtime = SimulatedRuntime::default().with_failing_start();
        let mut session = HeadsetSession::new(Box::new(runtime));
        assert!(session.initialize().is_err());

        let image = renderer.render_frame(&mut session).expect("blank frame");
        assert_eq!((image.width, image.height), renderer.preview_size());
        assert!(image.pixels.iter().all(|&b| b == 0));
        // The demo animation still advances.
        assert_eq!(renderer.frame_count(), 1);
    }

    #[test]
    fn render_submits_composite_to_compositor() {
        let runtime = SimulatedRuntime::default();
        let log = runtime.submission_log();
        let mut session = HeadsetSession::new(Box::new(runtime));
        session.initialize().expect("init");
        let mut renderer = ready_renderer((8, 4));

        renderer.render_frame(&mut session).expect("frame");
        renderer.render_frame(&mut session).expect("frame");

        let submissions = log.lock().expect("log lock");
        // Two eyes per frame.
        assert_eq!(submissions.len(), 4);
        assert_eq!(submissions[0].1.size, [16, 4]);
    }

    #[test]
    fn failed_setup_releases_partial_resources() {
        let backend = NullGpuBackend::new().with_setup_failure();
        let status = backend.status_handle();
        let mut renderer = StereoFrameRenderer::new(Box::new(backend), (1024, 768));
        let err = renderer
            .setup(SceneConfig::default(), (8, 4))
            .expect_err("setup declines");
        assert!(matches!(err, GraphicsError::ShaderLink { .. }));

        // The backend was torn down and dropped the buffer it had already
        // allocated before declining.
        let status = *status.lock().expect("status lock");
        assert_eq!(status.teardown_calls, 1);
        assert!(!status.holds_composite);

        // The renderer moved to Released and refuses further frames.
        let mut session = ready_session();
        assert!(matches!(
            renderer.render_frame(&mut session),
            Err(GraphicsError::NotReady)
        ));
    }

    #[test]
    fn teardown_is_idempotent() {
        let backend = NullGpuBackend::new();
        let status = backend.status_handle();
        let mut renderer = StereoFrameRenderer::new(Box::new(backend), (1024, 768));
        renderer
            .setup(SceneConfig::default(), (8, 4))
            .expect("null setup succeeds");

        renderer.teardown();
        renderer.teardown();
        // The second call never reached the backend.
        assert_eq!(status.lock().expect("status lock").teardown_calls, 1);

        let mut session = ready_session();
        assert!(matches!(
            renderer.render_frame(&mut session),
            Err(GraphicsError::NotReady)
        ));
    }
}
