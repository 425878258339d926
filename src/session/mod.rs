//! Headset session: runtime ownership, calibrated per-eye matrices, and
//! per-frame pose tracking.
//!
//! The SDK surface lives behind [`HeadsetRuntime`] so the session logic runs
//! identically against the real OpenVR backend (`vr-openvr` feature) and the
//! always-available [`SimulatedRuntime`].

#[cfg(feature = "vr-openvr")]
pub mod openvr;

use crate::math::{mat4_from_steam34, mat4_from_steam44, steam34_identity, steam34_translation};
use glam::Mat4;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub const NEAR_CLIP: f32 = 0.1;
pub const FAR_CLIP: f32 = 10_000.0;

/// Tracked-device slots mirrored from the runtime each frame.
pub const MAX_TRACKED_DEVICES: usize = 16;
/// The head-mounted display always occupies slot zero.
pub const HMD_DEVICE_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub const fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Immutable per-eye pair cached at session start: the projection for the
/// fixed clip planes and the inverted eye-to-head offset.
#[derive(Debug, Clone, Copy)]
pub struct EyeView {
    pub projection: Mat4,
    /// Inverse of the runtime's eye-to-head transform, ready to be combined
    /// with the head pose into a view matrix.
    pub pose: Mat4,
}

impl Default for EyeView {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            pose: Mat4::IDENTITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum HeadsetError {
    /// The runtime refused to start. Fatal to VR features, not to preview
    /// rendering.
    #[error("headset runtime failed to start: {0}")]
    Init(String),
    /// The compositor subsystem is unavailable; the session degrades to
    /// preview-only output.
    #[error("compositor unavailable: {0}")]
    Compositor(String),
    /// An operation that requires a successfully initialized session was
    /// called outside the `Ready` state.
    #[error("headset session is not ready")]
    NotReady,
}

/// One tracked-device slot as reported by the runtime for the current tick.
#[derive(Debug, Clone, Copy)]
pub struct DeviceSample {
    pub valid: bool,
    pub transform: [[f32; 4]; 3],
}

impl DeviceSample {
    pub const fn invalid() -> Self {
        Self {
            valid: false,
            transform: [[0.0; 4]; 3],
        }
    }

    pub const fn tracked(transform: [[f32; 4]; 3]) -> Self {
        Self {
            valid: true,
            transform,
        }
    }
}

/// Normalized sub-rectangle of a submitted texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureBounds {
    pub u_min: f32,
    pub v_min: f32,
    pub u_max: f32,
    pub v_max: f32,
}

impl TextureBounds {
    /// Left half of a side-by-side composite.
    pub const fn left_half() -> Self {
        Self {
            u_min: 0.0,
            v_min: 0.0,
            u_max: 0.5,
            v_max: 1.0,
        }
    }

    /// Right half of a side-by-side composite.
    pub const fn right_half() -> Self {
        Self {
            u_min: 0.5,
            v_min: 0.0,
            u_max: 1.0,
            v_max: 1.0,
        }
    }
}

/// Handle to the resolve target the renderer exposes for compositor
/// submission. The id is backend-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeHandle {
    pub id: u64,
    pub size: [u32; 2],
}

#[derive(Debug, Clone, Copy)]
pub enum DeviceProperty {
    TrackingSystemName,
    SerialNumber,
}

/// Raw surface of the headset SDK. Matrices stay in the runtime's row-major
/// layout; the session applies the bridge in [`crate::math`].
pub trait HeadsetRuntime: Send {
    fn label(&self) -> &'static str;

    /// Opens the runtime in scene-application mode.
    fn start(&mut self) -> Result<(), HeadsetError>;

    fn projection_raw(&self, eye: Eye, near: f32, far: f32) -> [[f32; 4]; 4];

    fn eye_to_head_raw(&self, eye: Eye) -> [[f32; 4]; 3];

    fn recommended_eye_size(&self) -> (u32, u32);

    /// Device property strings, used for diagnostic logging only.
    fn device_string(&self, device: usize, prop: DeviceProperty) -> Option<String>;

    fn start_compositor(&mut self) -> Result<(), HeadsetError>;

    /// Blocks until the runtime releases the next frame. This is the only
    /// blocking point in the loop and paces rendering to the display refresh.
    fn wait_poses(&mut self, out: &mut [DeviceSample; MAX_TRACKED_DEVICES]);

    fn submit(
        &mut self,
        eye: Eye,
        composite: CompositeHandle,
        bounds: TextureBounds,
    ) -> Result<(), HeadsetError>;

    /// Releases the runtime handle. Must be idempotent and safe before
    /// `start`.
    fn shutdown(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Ready,
    Released,
}

/// Outcome of a successful [`HeadsetSession::initialize`].
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub eye_size: (u32, u32),
    /// False when the compositor failed to start; the cached matrices remain
    /// valid and the session serves preview-only frames.
    pub compositor_active: bool,
}

/// Owns the headset runtime and exposes calibrated per-eye matrices plus the
/// current head pose.
pub struct HeadsetSession {
    runtime: Box<dyn HeadsetRuntime>,
    state: SessionState,
    eyes: [EyeView; 2],
    eye_size: (u32, u32),
    compositor_active: bool,
    samples: [DeviceSample; MAX_TRACKED_DEVICES],
    device_poses: [Mat4; MAX_TRACKED_DEVICES],
}

impl HeadsetSession {
    pub fn new(runtime: Box<dyn HeadsetRuntime>) -> Self {
        Self {
            runtime,
            state: SessionState::Uninitialized,
            eyes: [EyeView::default(); 2],
            eye_size: (0, 0),
            compositor_active: false,
            samples: [DeviceSample::invalid(); MAX_TRACKED_DEVICES],
            device_poses: [Mat4::IDENTITY; MAX_TRACKED_DEVICES],
        }
    }

    /// Opens the runtime and caches the per-eye matrices and recommended eye
    /// resolution. A failed start releases the runtime immediately; only
    /// destruction is valid afterwards. Compositor failure does not fail
    /// initialization, it is reported through [`SessionReport`].
    pub fn initialize(&mut self) -> Result<SessionReport, HeadsetError> {
        if self.state != SessionState::Uninitialized {
            return Err(HeadsetError::NotReady);
        }

        if let Err(err) = self.runtime.start() {
            self.state = SessionState::Released;
            self.runtime.shutdown();
            return Err(err);
        }

        for eye in Eye::BOTH {
            let projection = self.runtime.projection_raw(eye, NEAR_CLIP, FAR_CLIP);
            let eye_to_head = self.runtime.eye_to_head_raw(eye);
            self.eyes[eye.index()] = EyeView {
                projection: mat4_from_steam44(&projection),
                pose: mat4_from_steam34(&eye_to_head).inverse(),
            };
        }
        self.eye_size = self.runtime.recommended_eye_size();

        let device = self
            .runtime
            .device_string(HMD_DEVICE_INDEX, DeviceProperty::TrackingSystemName)
            .unwrap_or_default();
        let serial = self
            .runtime
            .device_string(HMD_DEVICE_INDEX, DeviceProperty::SerialNumber)
            .unwrap_or_default();
        log::info!(
            "[session] {} connected: device '{}' serial '{}' eye {}x{}",
            self.runtime.label(),
            device,
            serial,
            self.eye_size.0,
            self.eye_size.1
        );

        self.compositor_active = match self.runtime.start_compositor() {
            Ok(()) => true,
            Err(err) => {
                log::warn!("[session] compositor start failed, preview-only: {err}");
                false
            }
        };

        self.state = SessionState::Ready;
        Ok(SessionReport {
            eye_size: self.eye_size,
            compositor_active: self.compositor_active,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn compositor_active(&self) -> bool {
        self.compositor_active
    }

    /// Blocks on the runtime's pose wait and refreshes the cached device
    /// transforms. Devices reported invalid this tick keep their previously
    /// cached transform. Returns the head pose: the inverse of the cached HMD
    /// transform, since scene geometry is expressed relative to the head.
    pub fn poll_poses(&mut self) -> Result<Mat4, HeadsetError> {
        if self.state != SessionState::Ready {
            return Err(HeadsetError::NotReady);
        }

        self.runtime.wait_poses(&mut self.samples);
        for (slot, sample) in self.samples.iter().enumerate() {
            if sample.valid {
                self.device_poses[slot] = mat4_from_steam34(&sample.transform);
            }
        }

        Ok(self.head_pose())
    }

    /// Inverse of the last cached HMD transform; identity before the first
    /// valid tick.
    pub fn head_pose(&self) -> Mat4 {
        self.device_poses[HMD_DEVICE_INDEX].inverse()
    }

    /// Last cached transform for a tracked-device slot.
    pub fn device_pose(&self, slot: usize) -> Mat4 {
        self.device_poses[slot]
    }

    pub fn eye_projection(&self, eye: Eye) -> Result<Mat4, HeadsetError> {
        if self.state != SessionState::Ready {
            return Err(HeadsetError::NotReady);
        }
        Ok(self.eyes[eye.index()].projection)
    }

    /// The cached, pre-inverted eye-to-head offset.
    pub fn eye_pose(&self, eye: Eye) -> Result<Mat4, HeadsetError> {
        if self.state != SessionState::Ready {
            return Err(HeadsetError::NotReady);
        }
        Ok(self.eyes[eye.index()].pose)
    }

    pub fn recommended_eye_size(&self) -> Result<(u32, u32), HeadsetError> {
        if self.state != SessionState::Ready {
            return Err(HeadsetError::NotReady);
        }
        Ok(self.eye_size)
    }

    /// Submits both half-regions of the side-by-side composite to the
    /// compositor. A no-op when the compositor never started.
    pub fn submit_composite(&mut self, composite: CompositeHandle) -> Result<(), HeadsetError> {
        if self.state != SessionState::Ready {
            return Err(HeadsetError::NotReady);
        }
        if !self.compositor_active {
            return Ok(());
        }
        self.runtime
            .submit(Eye::Left, composite, TextureBounds::left_half())?;
        self.runtime
            .submit(Eye::Right, composite, TextureBounds::right_half())?;
        Ok(())
    }

    /// Releases the runtime handle exactly once. Safe to call repeatedly and
    /// on a never-initialized session.
    pub fn shutdown(&mut self) {
        if self.state != SessionState::Released {
            self.runtime.shutdown();
            self.state = SessionState::Released;
        }
    }
}

impl Drop for HeadsetSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Record of every compositor submission a [`SimulatedRuntime`] accepted.
pub type SubmissionLog = Arc<Mutex<Vec<(Eye, CompositeHandle, TextureBounds)>>>;

/// Always-available runtime standing in for real headset hardware: fixed
/// symmetric projections, a configurable inter-pupillary offset, and a
/// scriptable pose feed. Doubles as the headset-less fallback and the test
/// double for session behavior.
pub struct SimulatedRuntime {
    eye_size: (u32, u32),
    ipd: f32,
    fail_start: bool,
    fail_compositor: bool,
    started: bool,
    script: VecDeque<[DeviceSample; MAX_TRACKED_DEVICES]>,
    submissions: SubmissionLog,
}

impl SimulatedRuntime {
    pub fn new(eye_size: (u32, u32)) -> Self {
        Self {
            eye_size,
            ipd: 0.063,
            fail_start: false,
            fail_compositor: false,
            started: false,
            script: VecDeque::new(),
            submissions: Arc::default(),
        }
    }

    pub fn with_failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn with_failing_compositor(mut self) -> Self {
        self.fail_compositor = true;
        self
    }

    /// Queues the device samples reported by one future pose-wait tick. With
    /// an empty script every tick reports a valid identity HMD pose.
    pub fn queue_tick(&mut self, samples: [DeviceSample; MAX_TRACKED_DEVICES]) {
        self.script.push_back(samples);
    }

    /// A tick where only the HMD slot is tracked, at the given transform.
    pub fn tick_with_hmd(transform: [[f32; 4]; 3]) -> [DeviceSample; MAX_TRACKED_DEVICES] {
        let mut samples = [DeviceSample::invalid(); MAX_TRACKED_DEVICES];
        samples[HMD_DEVICE_INDEX] = DeviceSample::tracked(transform);
        samples
    }

    /// A tick where every device lost tracking.
    pub fn tick_all_invalid() -> [DeviceSample; MAX_TRACKED_DEVICES] {
        [DeviceSample::invalid(); MAX_TRACKED_DEVICES]
    }

    pub fn submission_log(&self) -> SubmissionLog {
        Arc::clone(&self.submissions)
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new((1440, 1600))
    }
}

impl HeadsetRuntime for SimulatedRuntime {
    fn label(&self) -> &'static str {
        "Simulated Headset"
    }

    fn start(&mut self) -> Result<(), HeadsetError> {
        if self.fail_start {
            return Err(HeadsetError::Init(
                "simulated runtime configured to decline".into(),
            ));
        }
        self.started = true;
        Ok(())
    }

    fn projection_raw(&self, _eye: Eye, near: f32, far: f32) -> [[f32; 4]; 4] {
        // Symmetric 90 degree frustum in the runtime's row-major layout.
        let depth = far / (near - far);
        [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, depth, near * depth],
            [0.0, 0.0, -1.0, 0.0],
        ]
    }

    fn eye_to_head_raw(&self, eye: Eye) -> [[f32; 4]; 3] {
        let x = match eye {
            Eye::Left => -self.ipd / 2.0,
            Eye::Right => self.ipd / 2.0,
        };
        steam34_translation(x, 0.0, 0.0)
    }

    fn recommended_eye_size(&self) -> (u32, u32) {
        self.eye_size
    }

    fn device_string(&self, device: usize, prop: DeviceProperty) -> Option<String> {
        if device != HMD_DEVICE_INDEX {
            return None;
        }
        Some(match prop {
            DeviceProperty::TrackingSystemName => "simulated".to_owned(),
            DeviceProperty::SerialNumber => "SIM-0000".to_owned(),
        })
    }

    fn start_compositor(&mut self) -> Result<(), HeadsetError> {
        if self.fail_compositor {
            return Err(HeadsetError::Compositor(
                "simulated compositor configured to decline".into(),
            ));
        }
        Ok(())
    }

    fn wait_poses(&mut self, out: &mut [DeviceSample; MAX_TRACKED_DEVICES]) {
        *out = self
            .script
            .pop_front()
            .unwrap_or_else(|| Self::tick_with_hmd(steam34_identity()));
    }

    fn submit(
        &mut self,
        eye: Eye,
        composite: CompositeHandle,
        bounds: TextureBounds,
    ) -> Result<(), HeadsetError> {
        if !self.started {
            return Err(HeadsetError::NotReady);
        }
        if let Ok(mut log) = self.submissions.lock() {
            log.push((eye, composite, bounds));
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn ready_session() -> HeadsetSession {
        let mut session = HeadsetSession::new(Box::new(SimulatedRuntime::default()));
        session.initialize().expect("simulated init succeeds");
        session
    }

    #[test]
    fn accessors_fail_loudly_before_initialize() {
        let session = HeadsetSession::new(Box::new(SimulatedRuntime::default()));
        assert!(matches!(
            session.eye_projection(Eye::Left),
            Err(HeadsetError::NotReady)
        ));
        assert!(matches!(
            session.eye_pose(Eye::Right),
            Err(HeadsetError::NotReady)
        ));
        assert!(matches!(
            session.recommended_eye_size(),
            Err(HeadsetError::NotReady)
        ));
    }

    #[test]
    fn initialize_caches_inverted_eye_offsets() {
        let session = ready_session();
        let left = session.eye_pose(Eye::Left).expect("ready");
        let right = session.eye_pose(Eye::Right).expect("ready");
        // Eye-to-head moves the left eye to -ipd/2, so the cached inverse
        // translates the other way.
        assert!(left.w_axis.x > 0.0);
        assert!(right.w_axis.x < 0.0);
        assert!((left.w_axis.x + right.w_axis.x).abs() < 1e-6);
    }

    #[test]
    fn failed_start_releases_the_session() {
        let runtime = SimulatedRuntime::default().with_failing_start();
        let mut session = HeadsetSession::new(Box::new(runtime));
        let err = session.initialize().expect_err("start declines");
        assert!(matches!(err, HeadsetError::Init(_)));
        assert!(!session.is_ready());
        // Only destruction is valid; a second initialize must not resurrect it.
        assert!(session.initialize().is_err());
    }

    #[test]
    fn compositor_failure_degrades_without_failing_init() {
        let runtime = SimulatedRuntime::default().with_failing_compositor();
        let mut session = HeadsetSession::new(Box::new(runtime));
        let report = session.initialize().expect("matrices still acquired");
        assert!(!report.compositor_active);
        assert!(session.is_ready());
        // Submission silently degrades to a no-op.
        let handle = CompositeHandle {
            id: 7,
            size: [2880, 1600],
        };
        session.submit_composite(handle).expect("degraded no-op");
    }

    #[test]
    fn invalid_tick_retains_last_valid_pose() {
        let mut runtime = SimulatedRuntime::default();
        runtime.queue_tick(SimulatedRuntime::tick_with_hmd(steam34_translation(
            0.0, 1.7, 0.0,
        )));
        runtime.queue_tick(SimulatedRuntime::tick_all_invalid());
        let mut session = HeadsetSession::new(Box::new(runtime));
        session.initialize().expect("init");

        session.poll_poses().expect("tick 1");
        let tracked = session.device_pose(HMD_DEVICE_INDEX);
        assert_eq!(tracked.w_axis, Vec4::new(0.0, 1.7, 0.0, 1.0));

        session.poll_poses().expect("tick 2");
        assert_eq!(session.device_pose(HMD_DEVICE_INDEX), tracked);
        // Head pose stays the inverse of the stale transform.
        assert_eq!(session.head_pose(), tracked.inverse());
    }

    #[test]
    fn never_valid_device_reports_identity() {
        let mut runtime = SimulatedRuntime::default();
        runtime.queue_tick(SimulatedRuntime::tick_all_invalid());
        let mut session = HeadsetSession::new(Box::new(runtime));
        session.initialize().expect("init");
        let head = session.poll_poses().expect("tick");
        assert_eq!(head, Mat4::IDENTITY);
        assert_eq!(session.device_pose(5), Mat4::IDENTITY);
    }

    #[test]
    fn submit_composite_sends_both_halves() {
        let runtime = SimulatedRuntime::default();
        let log = runtime.submission_log();
        let mut session = HeadsetSession::new(Box::new(runtime));
        session.initialize().expect("init");

        let handle = CompositeHandle {
            id: 3,
            size: [2880, 1600],
        };
        session.submit_composite(handle).expect("submit");

        let submissions = log.lock().expect("log lock");
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].0, Eye::Left);
        assert_eq!(submissions[0].2, TextureBounds::left_half());
        assert_eq!(submissions[1].0, Eye::Right);
        assert_eq!(submissions[1].2, TextureBounds::right_half());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut session = ready_session();
        session.shutdown();
        session.shutdown();
        assert!(!session.is_ready());

        // Safe on a session that never initialized.
        let mut untouched = HeadsetSession::new(Box::new(SimulatedRuntime::default()));
        untouched.shutdown();
        untouched.shutdown();
    }
}
