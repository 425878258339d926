//! Renders a few stereo frames and prints what the rig did.
//!
//! Usage: headset_preview [config.json]
//!
//! With no argument the default scene (spinning tetrahedron, three frames)
//! is used. Enable `--features render-wgpu,vr-openvr` to drive real
//! hardware; without them the run is fully simulated.

use std::fs;
use std::process::ExitCode;
use stereoscope::rig::RigConfig;

fn main() -> ExitCode {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = match fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    eprintln!("failed to read {path}: {err}");
                    return ExitCode::FAILURE;
                }
            };
            match serde_json::from_str(&raw) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("failed to parse {path}: {err}");
                    return ExitCode::FAILURE;
                }
            }
        }
        None => RigConfig::default(),
    };

    match stereoscope::run(config) {
        Ok(summary) => {
            println!(
                "rendered {} frames, headset {}",
                summary.frames_rendered,
                if summary.headset_active {
                    "active"
                } else {
                    "absent"
                }
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("rig failed: {err}");
            ExitCode::FAILURE
        }
    }
}
