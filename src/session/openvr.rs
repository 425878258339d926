//! OpenVR-backed headset runtime, enabled with the `vr-openvr` feature.

use super::{
    CompositeHandle, DeviceProperty, DeviceSample, Eye, HeadsetError, HeadsetRuntime,
    MAX_TRACKED_DEVICES, TextureBounds,
};
use openvr::compositor::texture::{ColorSpace, Handle, Texture};

fn map_eye(eye: Eye) -> openvr::Eye {
    match eye {
        Eye::Left => openvr::Eye::Left,
        Eye::Right => openvr::Eye::Right,
    }
}

/// Owns the OpenVR context plus the system and compositor interfaces derived
/// from it. Construction is cheap; the SDK is opened by `start`.
pub struct OpenVrRuntime {
    context: Option<openvr::Context>,
    system: Option<openvr::System>,
    compositor: Option<openvr::Compositor>,
}

impl OpenVrRuntime {
    pub fn new() -> Self {
        Self {
            context: None,
            system: None,
            compositor: None,
        }
    }
}

impl Default for OpenVrRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadsetRuntime for OpenVrRuntime {
    fn label(&self) -> &'static str {
        "OpenVR"
    }

    fn start(&mut self) -> Result<(), HeadsetError> {
        // Safety: the context is the single owner of the SDK handle and is
        // shut down exactly once in `shutdown`.
        let context = unsafe { openvr::init(openvr::ApplicationType::Scene) }
            .map_err(|err| HeadsetError::Init(err.to_string()))?;
        let system = unsafe { context.system() }
            .map_err(|err| HeadsetError::Init(err.to_string()))?;

        self.system = Some(system);
        self.context = Some(context);
        Ok(())
    }

    fn projection_raw(&self, eye: Eye, near: f32, far: f32) -> [[f32; 4]; 4] {
        match &self.system {
            Some(system) => system.projection_matrix(map_eye(eye), near, far),
            None => [[0.0; 4]; 4],
        }
    }

    fn eye_to_head_raw(&self, eye: Eye) -> [[f32; 4]; 3] {
        match &self.system {
            Some(system) => system.eye_to_head_transform(map_eye(eye)),
            None => [[0.0; 4]; 3],
        }
    }

    fn recommended_eye_size(&self) -> (u32, u32) {
        match &self.system {
            Some(system) => system.recommended_render_target_size(),
            None => (0, 0),
        }
    }

    fn device_string(&self, device: usize, prop: DeviceProperty) -> Option<String> {
        let system = self.system.as_ref()?;
        let prop = match prop {
            DeviceProperty::TrackingSystemName => openvr::property::TrackingSystemName_String,
            DeviceProperty::SerialNumber => openvr::property::SerialNumber_String,
        };
        system
            .string_tracked_device_property(device as openvr::TrackedDeviceIndex, prop)
            .ok()
            .map(|value| value.to_string_lossy().into_owned())
    }

    fn start_compositor(&mut self) -> Result<(), HeadsetError> {
        let context = self
            .context
            .as_ref()
            .ok_or(HeadsetError::NotReady)?;
        let compositor = unsafe { context.compositor() }
            .map_err(|err| HeadsetError::Compositor(err.to_string()))?;
        self.compositor = Some(compositor);
        Ok(())
    }

    fn wait_poses(&mut self, out: &mut [DeviceSample; MAX_TRACKED_DEVICES]) {
        let Some(compositor) = &self.compositor else {
            *out = [DeviceSample::invalid(); MAX_TRACKED_DEVICES];
            return;
        };
        match compositor.wait_get_poses() {
            Ok(poses) => {
                for (slot, pose) in poses.render.iter().take(MAX_TRACKED_DEVICES).enumerate() {
                    out[slot] = DeviceSample {
                        valid: pose.pose_is_valid(),
                        transform: *pose.device_to_absolute_tracking(),
                    };
                }
            }
            Err(err) => {
                log::warn!("[session] wait_get_poses failed: {err:?}");
                *out = [DeviceSample::invalid(); MAX_TRACKED_DEVICES];
            }
        }
    }

    fn submit(
        &mut self,
        eye: Eye,
        composite: CompositeHandle,
        bounds: TextureBounds,
    ) -> Result<(), HeadsetError> {
        let compositor = self.compositor.as_ref().ok_or(HeadsetError::NotReady)?;
        let texture = Texture {
            handle: Handle::OpenGLTexture(composite.id as usize),
            color_space: ColorSpace::Gamma,
        };
        let bounds = openvr::compositor::texture::Bounds {
            min: (bounds.u_min, bounds.v_min),
            max: (bounds.u_max, bounds.v_max),
        };
        // Safety: the texture handle stays alive for the duration of the
        // frame; the compositor copies out of it before returning.
        unsafe {
            compositor
                .submit(map_eye(eye), &texture, Some(&bounds), None)
                .map_err(|err| HeadsetError::Compositor(format!("{err:?}")))
        }
    }

    fn shutdown(&mut self) {
        self.compositor = None;
        self.system = None;
        if let Some(context) = self.context.take() {
            // Safety: every interface handle derived from the context has
            // been dropped above.
            unsafe { context.shutdown() };
        }
    }
}
