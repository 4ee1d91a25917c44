// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Frame pacing between the CPU and the GPU.
//!
//! A [`FrameFence`] hands out monotonically increasing [`FrameStamp`]s. The
//! owner of the device signals a stamp once the GPU has finished the work
//! recorded under it; per-frame resources tagged with a completed stamp can
//! be reused.

use crate::renderer::error::RenderError;

/// The default number of frames that can be processed by the GPU at once.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Identifies the frame a piece of GPU work was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FrameStamp(pub u64);

/// Tracks which frames have been completed by the GPU.
#[derive(Debug, Clone)]
pub struct FrameFence {
    current: FrameStamp,
    last_completed: FrameStamp,
    max_frames_in_flight: u64,
}

impl Default for FrameFence {
    fn default() -> Self {
        Self::new(MAX_FRAMES_IN_FLIGHT)
    }
}

impl FrameFence {
    /// Creates a fence allowing `max_frames_in_flight` unsignalled frames.
    /// Stamp `0` is considered complete.
    pub fn new(max_frames_in_flight: usize) -> Self {
        Self {
            current: FrameStamp(0),
            last_completed: FrameStamp(0),
            max_frames_in_flight: max_frames_in_flight.max(1) as u64,
        }
    }

    /// The stamp of the frame being recorded.
    pub fn current(&self) -> FrameStamp {
        self.current
    }

    /// The most recent stamp the GPU has finished.
    pub fn last_completed(&self) -> FrameStamp {
        self.last_completed
    }

    /// Number of frames begun but not yet signalled.
    pub fn frames_in_flight(&self) -> u64 {
        self.current.0 - self.last_completed.0
    }

    /// Starts a new frame and returns its stamp.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TooManyFramesInFlight`] if the maximum number
    /// of unsignalled frames is already reached.
    pub fn begin_frame(&mut self) -> Result<FrameStamp, RenderError> {
        let in_flight = self.frames_in_flight();
        if in_flight >= self.max_frames_in_flight {
            return Err(RenderError::TooManyFramesInFlight {
                in_flight,
                max: self.max_frames_in_flight,
            });
        }
        self.current = FrameStamp(self.current.0 + 1);
        Ok(self.current)
    }

    /// Marks every frame up to and including `stamp` as finished.
    /// Stamps from the future are clamped to the current frame.
    pub fn signal(&mut self, stamp: FrameStamp) {
        let stamp = stamp.min(self.current);
        if stamp > self.last_completed {
            self.last_completed = stamp;
        }
    }

    /// Returns `true` if the GPU has finished the frame `stamp`.
    pub fn is_complete(&self, stamp: FrameStamp) -> bool {
        stamp <= self.last_completed
    }
}
