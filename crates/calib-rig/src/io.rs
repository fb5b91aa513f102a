//! Frame acquisition and display seams.

use calib_rig_core::{CameraIntrinsics, GrayImage, GrayImageView};
use calib_rig_pattern::PatternAnnotations;
use std::collections::VecDeque;
use std::time::Duration;

/// Bounded wait used between frames when the operator does not step
/// through images manually.
pub const FRAME_POLL: Duration = Duration::from_millis(50);

/// Source of frames: an image list, a capture device, a test fixture.
pub trait FrameSource {
    /// Next frame, or `None` once the source is exhausted or closed.
    fn next_frame(&mut self) -> Option<GrayImage>;
}

/// In-memory frame list.
#[derive(Clone, Debug, Default)]
pub struct FrameList {
    frames: VecDeque<GrayImage>,
}

impl FrameList {
    pub fn new(frames: impl IntoIterator<Item = GrayImage>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for FrameList {
    fn next_frame(&mut self) -> Option<GrayImage> {
        self.frames.pop_front()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until the operator presses a key.
    Indefinite,
    Bounded(Duration),
}

impl WaitPolicy {
    pub fn for_step_mode(wait: bool) -> Self {
        if wait {
            WaitPolicy::Indefinite
        } else {
            WaitPolicy::Bounded(FRAME_POLL)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperatorKey {
    Quit,
    ToggleUndistort,
    ToggleLabels,
    Other(char),
}

impl OperatorKey {
    /// Map a raw key: `q`, `Q` or ESC quit, `u` toggles undistortion, `c`
    /// toggles marker labels.
    pub fn from_char(c: char) -> Self {
        match c {
            'q' | 'Q' | '\u{1b}' => OperatorKey::Quit,
            'u' => OperatorKey::ToggleUndistort,
            'c' => OperatorKey::ToggleLabels,
            other => OperatorKey::Other(other),
        }
    }
}

/// What markers are labelled with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnnotationLabel {
    #[default]
    Id,
    /// Object (lattice) coordinates of the marker's anchor corner.
    Coordinates,
}

impl AnnotationLabel {
    pub fn toggled(self) -> Self {
        match self {
            AnnotationLabel::Id => AnnotationLabel::Coordinates,
            AnnotationLabel::Coordinates => AnnotationLabel::Id,
        }
    }
}

/// Everything a sink needs to render one frame.
#[derive(Clone, Copy, Debug)]
pub struct Overlay<'a> {
    pub annotations: &'a PatternAnnotations,
    pub label: AnnotationLabel,
    /// When set, the frame should be shown undistorted with these
    /// intrinsics.
    pub undistort: Option<&'a CameraIntrinsics>,
}

/// Operator-facing preview window.
pub trait DisplaySink {
    fn show(&mut self, frame: &GrayImageView<'_>, overlay: Overlay<'_>);

    /// Wait for a key according to `wait`; `None` when nothing was pressed.
    fn poll_key(&mut self, wait: WaitPolicy) -> Option<OperatorKey>;
}

/// Sink that draws nothing and never reports a key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl DisplaySink for Headless {
    fn show(&mut self, _frame: &GrayImageView<'_>, _overlay: Overlay<'_>) {}

    fn poll_key(&mut self, _wait: WaitPolicy) -> Option<OperatorKey> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_mapping() {
        assert_eq!(OperatorKey::from_char('q'), OperatorKey::Quit);
        assert_eq!(OperatorKey::from_char('\u{1b}'), OperatorKey::Quit);
        assert_eq!(OperatorKey::from_char('u'), OperatorKey::ToggleUndistort);
        assert_eq!(OperatorKey::from_char('c'), OperatorKey::ToggleLabels);
        assert_eq!(OperatorKey::from_char('x'), OperatorKey::Other('x'));
    }

    #[test]
    fn frame_list_drains_in_order() {
        let mut frames = FrameList::new([GrayImage::blank(2, 1), GrayImage::blank(3, 1)]);
        assert_eq!(frames.remaining(), 2);
        assert_eq!(frames.next_frame().map(|f| f.width), Some(2));
        assert_eq!(frames.next_frame().map(|f| f.width), Some(3));
        assert!(frames.next_frame().is_none());
    }

    #[test]
    fn step_mode_waits_indefinitely() {
        assert_eq!(WaitPolicy::for_step_mode(true), WaitPolicy::Indefinite);
        assert_eq!(WaitPolicy::for_step_mode(false), WaitPolicy::Bounded(FRAME_POLL));
    }
}
