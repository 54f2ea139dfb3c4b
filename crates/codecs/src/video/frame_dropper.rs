// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Frame-rate reduction by dropping decoded frames.

/// Decides, frame by frame, whether a source at `input_fps` should render at `output_fps`.
///
/// Accumulates seconds-per-frame: each input frame adds `1 / input_fps`, and a frame renders
/// whenever the accumulated time exceeds `1 / output_fps`. The first frame always renders.
#[derive(Debug, Clone)]
pub struct FrameDropper {
    input_spf: f64,
    output_spf: f64,
    current_spf: f64,
    frame_count: u64,
}

impl FrameDropper {
    pub fn new(input_fps: u32, output_fps: u32) -> Self {
        Self {
            input_spf: 1.0 / f64::from(input_fps.max(1)),
            output_spf: 1.0 / f64::from(output_fps.max(1)),
            current_spf: 0.0,
            frame_count: 0,
        }
    }

    /// A dropper for the given rates, or `None` when no frames need dropping.
    ///
    /// Rates are whole frames per second. A missing or sub-1 target rate means "same as
    /// source".
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn for_rates(source_fps: Option<f64>, target_fps: Option<f64>) -> Option<Self> {
        let source = source_fps? as u32;
        let target = target_fps.map_or(source, |fps| fps as u32);
        let target = if target < 1 { source } else { target };
        (source > target).then(|| Self::new(source, target))
    }

    pub fn should_render(&mut self) -> bool {
        self.current_spf += self.input_spf;
        let first = self.frame_count == 0;
        self.frame_count += 1;

        if first {
            return true;
        }
        if self.current_spf > self.output_spf {
            self.current_spf -= self.output_spf;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(dropper: &mut FrameDropper, frames: usize) -> usize {
        (0..frames).filter(|_| dropper.should_render()).count()
    }

    #[test]
    fn halves_sixty_to_thirty() {
        let mut dropper = FrameDropper::new(60, 30);
        let count = rendered(&mut dropper, 600);
        assert!((299..=301).contains(&count), "rendered {count}");
    }

    #[test]
    fn first_frame_always_renders() {
        let mut dropper = FrameDropper::new(1000, 1);
        assert!(dropper.should_render());
        assert!(!dropper.should_render());
    }

    #[test]
    fn only_created_when_downsampling() {
        assert!(FrameDropper::for_rates(Some(60.0), Some(30.0)).is_some());
        assert!(FrameDropper::for_rates(Some(30.0), Some(60.0)).is_none());
        assert!(FrameDropper::for_rates(Some(30.0), None).is_none());
        assert!(FrameDropper::for_rates(Some(30.0), Some(0.0)).is_none());
        assert!(FrameDropper::for_rates(None, Some(30.0)).is_none());
    }
}
