//! 2D preview of the stereo composite: a sink abstraction over whatever
//! surface displays the frames, plus the aspect-fit math for placing the
//! wide composite inside an arbitrary viewport.

use crate::render::CompositeImage;
use std::sync::{Arc, Mutex};

/// Receives finished composite frames from the rig.
pub trait PreviewSink: Send {
    /// Announced once per size change, before the first frame at that size.
    fn frame_size_changed(&mut self, size: (u32, u32));

    fn frame_ready(&mut self, image: &CompositeImage);
}

/// How the composite is placed inside the preview viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMode {
    /// Fill the viewport, ignoring the image aspect ratio.
    Stretch,
    /// Largest centered rectangle that preserves the aspect ratio.
    Contain,
}

/// Placement of the scaled image inside the viewport, in viewport pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ContentRect {
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Computes where an `image_size` frame lands inside a `viewport` of the
/// given size. A degenerate image or viewport yields an empty rect.
pub fn fit_rect(image_size: (u32, u32), viewport: (u32, u32), mode: FitMode) -> ContentRect {
    let (iw, ih) = image_size;
    let (vw, vh) = viewport;
    if iw == 0 || ih == 0 || vw == 0 || vh == 0 {
        return ContentRect::default();
    }
    match mode {
        FitMode::Stretch => ContentRect {
            x: 0,
            y: 0,
            width: vw,
            height: vh,
        },
        FitMode::Contain => {
            let scale = (vw as f32 / iw as f32).min(vh as f32 / ih as f32);
            let width = ((iw as f32 * scale).round() as u32).clamp(1, vw);
            let height = ((ih as f32 * scale).round() as u32).clamp(1, vh);
            ContentRect {
                x: (vw - width) / 2,
                y: (vh - height) / 2,
                width,
                height,
            }
        }
    }
}

type FrameLog = Arc<Mutex<Vec<(u32, u32)>>>;

/// Discards frames but records what arrived, for headless runs and tests.
pub struct NullPreviewSink {
    announced_size: Option<(u32, u32)>,
    size_changes: u32,
    frames: u32,
    log: Option<FrameLog>,
}

impl NullPreviewSink {
    pub fn new() -> Self {
        Self {
            announced_size: None,
            size_changes: 0,
            frames: 0,
            log: None,
        }
    }

    /// Shares a log of the (width, height) of every delivered frame.
    pub fn with_log(mut self, log: FrameLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn announced_size(&self) -> Option<(u32, u32)> {
        self.announced_size
    }

    pub fn size_changes(&self) -> u32 {
        self.size_changes
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

impl Default for NullPreviewSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSink for NullPreviewSink {
    fn frame_size_changed(&mut self, size: (u32, u32)) {
        self.announced_size = Some(size);
        self.size_changes += 1;
        log::debug!("[preview] frame size {}x{}", size.0, size.1);
    }

    fn frame_ready(&mut self, image: &CompositeImage) {
        self.frames += 1;
        if let Some(log) = &self.log {
            if let Ok(mut frames) = log.lock() {
                frames.push((image.width, image.height));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_fills_the_viewport() {
        let rect = fit_rect((2880, 1600), (640, 480), FitMode::Stretch);
        assert_eq!(
            rect,
            ContentRect {
                x: 0,
                y: 0,
                width: 640,
                height: 480
            }
        );
    }

    #[test]
    fn contain_letterboxes_a_wide_composite() {
        // 2:1 composite in a 4:3 viewport: width-limited, centered
        // vertically.
        let rect = fit_rect((2048, 1024), (640, 480), FitMode::Contain);
        assert_eq!(rect.width, 640);
        assert_eq!(rect.height, 320);
        assert_eq!(rect.x, 0);
        assert_eq!(rect.y, 80);
    }

    #[test]
    fn contain_pillarboxes_a_tall_image() {
        let rect = fit_rect((100, 400), (640, 480), FitMode::Contain);
        assert_eq!(rect.height, 480);
        assert_eq!(rect.width, 120);
        assert_eq!(rect.x, 260);
        assert_eq!(rect.y, 0);
    }

    #[test]
    fn degenerate_sizes_yield_an_empty_rect() {
        assert_eq!(
            fit_rect((0, 0), (640, 480), FitMode::Contain),
            ContentRect::default()
        );
        assert_eq!(
            fit_rect((100, 100), (0, 480), FitMode::Stretch),
            ContentRect::default()
        );
    }

    #[test]
    fn content_rect_hit_testing() {
        let rect = ContentRect {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        assert!(rect.contains(10, 20));
        assert!(rect.contains(39, 59));
        assert!(!rect.contains(40, 20));
        assert!(!rect.contains(9, 30));
    }

    #[test]
    fn null_sink_counts_sizes_and_frames() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut sink = NullPreviewSink::new().with_log(log.clone());
        sink.frame_size_changed((2048, 1024));
        sink.frame_ready(&CompositeImage::blank(2048, 1024));
        sink.frame_ready(&CompositeImage::blank(2048, 1024));

        assert_eq!(sink.announced_size(), Some((2048, 1024)));
        assert_eq!(sink.size_changes(), 1);
        assert_eq!(sink.frames(), 2);
        assert_eq!(log.lock().expect("log lock").len(), 2);
    }
}
