// SPDX-License-Identifier: CEPL-1.0
//! Frames-in-flight bookkeeping and the acquire -> submit -> present cycle.
//!
//! The controller owns no GPU objects. A backend exposes the individual steps
//! through [`FrameBackend`] and the controller sequences them, so the ordering
//! rules live in one place regardless of the API underneath.
use std::time::Duration;

use bitflags::bitflags;
use tracing::{debug, info, warn};

use crate::extent::{wait_for_drawable_extent, ExtentSource};
use crate::{RenderResult, RenderSize};

/// Rebuilds triggered by a stale surface in a row before the frame is dropped.
const MAX_STALE_RETRIES: u32 = 3;

bitflags! {
    /// Why the surface has to be rebuilt. Several can pile up within a frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RebuildReason: u8 {
        const RESIZED       = 1 << 0;
        const STALE_ACQUIRE = 1 << 1;
        const SUBOPTIMAL    = 1 << 2;
        const STALE_PRESENT = 1 << 3;
        const OPTIONS       = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    /// Still presentable, but should be rebuilt after this frame.
    Suboptimal,
    /// Out of date; nothing can be presented until rebuilt.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Acquired {
    pub image_index: u32,
    pub status: SurfaceStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Submitted,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { slot: usize, image_index: u32 },
    /// The surface kept going stale; nothing was submitted.
    Skipped,
}

/// The per-frame steps a GPU backend performs on behalf of [`FrameController`].
pub trait FrameBackend {
    /// Blocks until the fence of `slot` is signaled.
    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> RenderResult<()>;

    /// Acquires the next presentable image, signaling the image-ready
    /// semaphore of `slot`.
    fn acquire(&mut self, slot: usize) -> RenderResult<Acquired>;

    /// Writes per-frame state owned by `slot` and records its command buffer
    /// against `image_index`.
    fn prepare(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    /// Resets the fence of `slot` and submits its command buffer.
    fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<SurfaceStatus>;

    /// Full-device idle barrier.
    fn wait_idle(&mut self) -> RenderResult<()>;

    /// Recreates the surface and everything derived from it. Only called
    /// after [`FrameBackend::wait_idle`]. `source` is polled again if the
    /// surface itself still reports a zero extent.
    fn rebuild(&mut self, size: RenderSize, source: &dyn ExtentSource) -> RenderResult<()>;
}

pub struct FrameController {
    slots: Vec<SlotState>,
    frame_counter: u64,
    pending: RebuildReason,
    fence_timeout: Duration,
}

impl FrameController {
    pub fn new(frames_in_flight: usize, fence_timeout: Duration) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            slots: vec![SlotState::Idle; frames_in_flight],
            frame_counter: 0,
            pending: RebuildReason::empty(),
            fence_timeout,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn current_slot(&self) -> usize {
        (self.frame_counter % self.slots.len() as u64) as usize
    }

    pub fn slot_state(&self, slot: usize) -> SlotState {
        self.slots[slot]
    }

    /// Slots whose submission has not been observed complete.
    pub fn in_flight(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| **s == SlotState::Submitted)
            .count()
    }

    pub fn pending_rebuild(&self) -> RebuildReason {
        self.pending
    }

    /// Flags a rebuild to happen after the next present.
    pub fn request_rebuild(&mut self, reason: RebuildReason) {
        self.pending |= reason;
    }

    pub fn draw_frame<B>(
        &mut self,
        backend: &mut B,
        source: &dyn ExtentSource,
    ) -> RenderResult<FrameOutcome>
    where
        B: FrameBackend + ?Sized,
    {
        for _ in 0..=MAX_STALE_RETRIES {
            let slot = self.current_slot();

            // 1) slot must be retired before anything it owns is touched
            backend.wait_slot(slot, self.fence_timeout)?;
            if self.slots[slot] == SlotState::Submitted {
                self.slots[slot] = SlotState::Complete;
            }

            // 2) acquire; a stale surface restarts the frame on the same slot
            let acquired = backend.acquire(slot)?;
            match acquired.status {
                SurfaceStatus::Stale => {
                    self.rebuild(backend, source, RebuildReason::STALE_ACQUIRE)?;
                    continue;
                }
                SurfaceStatus::Suboptimal => self.pending |= RebuildReason::SUBOPTIMAL,
                SurfaceStatus::Optimal => {}
            }

            // 3) + 4) per-frame writes, record, submit
            self.slots[slot] = SlotState::Idle;
            backend.prepare(slot, acquired.image_index)?;
            backend.submit(slot, acquired.image_index)?;
            self.slots[slot] = SlotState::Submitted;

            // 5) present, then honour anything that piled up
            if backend.present(slot, acquired.image_index)? != SurfaceStatus::Optimal {
                self.pending |= RebuildReason::STALE_PRESENT;
            }
            if !self.pending.is_empty() {
                let reason = std::mem::take(&mut self.pending);
                self.rebuild(backend, source, reason)?;
            }

            // 6)
            self.frame_counter += 1;
            return Ok(FrameOutcome::Presented {
                slot,
                image_index: acquired.image_index,
            });
        }

        warn!(
            "surface still stale after {} rebuilds, skipping frame",
            MAX_STALE_RETRIES + 1
        );
        Ok(FrameOutcome::Skipped)
    }

    /// Idle barrier, then a rebuild at the first drawable window size. Any
    /// other pending reasons are satisfied by the same rebuild.
    pub fn rebuild<B>(
        &mut self,
        backend: &mut B,
        source: &dyn ExtentSource,
        reason: RebuildReason,
    ) -> RenderResult<()>
    where
        B: FrameBackend + ?Sized,
    {
        self.quiesce(backend)?;
        let size = wait_for_drawable_extent(source);
        let reason = reason | std::mem::take(&mut self.pending);
        info!(
            ?reason,
            "rebuilding surface at {}x{}", size.width, size.height
        );
        backend.rebuild(size, source)?;
        Ok(())
    }

    /// Waits out all GPU work. Must run before the backend is torn down.
    pub fn shutdown<B>(&mut self, backend: &mut B) -> RenderResult<()>
    where
        B: FrameBackend + ?Sized,
    {
        self.quiesce(backend)?;
        self.slots.fill(SlotState::Idle);
        debug!(frames = self.frame_counter, "frame loop shut down");
        Ok(())
    }

    fn quiesce<B>(&mut self, backend: &mut B) -> RenderResult<()>
    where
        B: FrameBackend + ?Sized,
    {
        backend.wait_idle()?;
        for s in &mut self.slots {
            if *s == SlotState::Submitted {
                *s = SlotState::Complete;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RenderError;
    use std::collections::VecDeque;

    struct FixedExtent(RenderSize);

    impl ExtentSource for FixedExtent {
        fn framebuffer_size(&self) -> RenderSize {
            self.0
        }
        fn wait_events(&self) {}
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Prepare(usize, u32),
        Submit(usize, u32),
        Present(usize, u32),
        Idle,
        Rebuild(RenderSize),
    }

    /// Pretends to be a GPU: submissions stay outstanding until their slot is
    /// waited on or the device goes idle.
    struct MockBackend {
        image_count: u32,
        next_image: u32,
        outstanding: Vec<bool>,
        max_outstanding: usize,
        blocked_waits: usize,
        acquire_script: VecDeque<SurfaceStatus>,
        present_script: VecDeque<SurfaceStatus>,
        fail_wait: bool,
        calls: Vec<Call>,
    }

    impl MockBackend {
        fn new(frames: usize) -> Self {
            Self {
                image_count: 3,
                next_image: 0,
                outstanding: vec![false; frames],
                max_outstanding: 0,
                blocked_waits: 0,
                acquire_script: VecDeque::new(),
                present_script: VecDeque::new(),
                fail_wait: false,
                calls: Vec::new(),
            }
        }

        fn rebuilds(&self) -> Vec<RenderSize> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    Call::Rebuild(s) => Some(*s),
                    _ => None,
                })
                .collect()
        }
    }

    impl FrameBackend for MockBackend {
        fn wait_slot(&mut self, slot: usize, timeout: Duration) -> RenderResult<()> {
            self.calls.push(Call::Wait(slot));
            if self.fail_wait {
                return Err(RenderError::FenceTimeout { slot, timeout });
            }
            if self.outstanding[slot] {
                self.blocked_waits += 1;
                self.outstanding[slot] = false;
            }
            Ok(())
        }

        fn acquire(&mut self, slot: usize) -> RenderResult<Acquired> {
            self.calls.push(Call::Acquire(slot));
            let status = self
                .acquire_script
                .pop_front()
                .unwrap_or(SurfaceStatus::Optimal);
            let image_index = self.next_image;
            if status != SurfaceStatus::Stale {
                self.next_image = (self.next_image + 1) % self.image_count;
            }
            Ok(Acquired {
                image_index,
                status,
            })
        }

        fn prepare(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            assert!(!self.outstanding[slot], "slot {slot} written while in flight");
            self.calls.push(Call::Prepare(slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
            assert!(!self.outstanding[slot], "slot {slot} resubmitted while in flight");
            self.calls.push(Call::Submit(slot, image_index));
            self.outstanding[slot] = true;
            let n = self.outstanding.iter().filter(|o| **o).count();
            self.max_outstanding = self.max_outstanding.max(n);
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<SurfaceStatus> {
            self.calls.push(Call::Present(slot, image_index));
            Ok(self
                .present_script
                .pop_front()
                .unwrap_or(SurfaceStatus::Optimal))
        }

        fn wait_idle(&mut self) -> RenderResult<()> {
            self.calls.push(Call::Idle);
            self.outstanding.fill(false);
            Ok(())
        }

        fn rebuild(&mut self, size: RenderSize, _: &dyn ExtentSource) -> RenderResult<()> {
            assert!(
                self.outstanding.iter().all(|o| !o),
                "rebuild with GPU work outstanding"
            );
            self.calls.push(Call::Rebuild(size));
            self.next_image = 0;
            Ok(())
        }
    }

    fn window() -> FixedExtent {
        FixedExtent(RenderSize::new(1280, 720))
    }

    fn controller(frames: usize) -> FrameController {
        FrameController::new(frames, Duration::from_secs(1))
    }

    #[test]
    fn slots_rotate_with_frame_counter() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        let win = window();

        let mut used = Vec::new();
        for _ in 0..4 {
            match ctl.draw_frame(&mut gpu, &win).unwrap() {
                FrameOutcome::Presented { slot, .. } => used.push(slot),
                FrameOutcome::Skipped => panic!("unexpected skip"),
            }
        }
        assert_eq!(used, vec![0, 1, 0, 1]);
        assert_eq!(ctl.frame_counter(), 4);
    }

    #[test]
    fn third_frame_waits_for_first_slot() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        let win = window();

        ctl.draw_frame(&mut gpu, &win).unwrap();
        ctl.draw_frame(&mut gpu, &win).unwrap();
        assert_eq!(ctl.in_flight(), 2);
        assert_eq!(gpu.blocked_waits, 0);

        ctl.draw_frame(&mut gpu, &win).unwrap();
        assert_eq!(gpu.blocked_waits, 1, "F+1-th frame must recycle slot 0");
        assert_eq!(gpu.max_outstanding, 2);
        assert_eq!(ctl.in_flight(), 2);
    }

    #[test]
    fn in_flight_never_exceeds_slot_count() {
        for frames in 1..=3 {
            let mut ctl = controller(frames);
            let mut gpu = MockBackend::new(frames);
            let win = window();
            for _ in 0..10 {
                ctl.draw_frame(&mut gpu, &win).unwrap();
                assert!(ctl.in_flight() <= frames);
            }
            assert_eq!(gpu.max_outstanding, frames);
        }
    }

    #[test]
    fn wait_precedes_prepare_and_submit() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        ctl.draw_frame(&mut gpu, &window()).unwrap();
        assert_eq!(
            gpu.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Prepare(0, 0),
                Call::Submit(0, 0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn stale_acquire_rebuilds_and_retries_same_slot() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        gpu.acquire_script.push_back(SurfaceStatus::Stale);

        let out = ctl.draw_frame(&mut gpu, &window()).unwrap();
        assert_eq!(
            out,
            FrameOutcome::Presented {
                slot: 0,
                image_index: 0
            }
        );
        assert_eq!(gpu.rebuilds(), vec![RenderSize::new(1280, 720)]);
        let acquires = gpu
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Acquire(0)))
            .count();
        assert_eq!(acquires, 2);
        assert_eq!(ctl.frame_counter(), 1);
        assert!(ctl.pending_rebuild().is_empty());
    }

    #[test]
    fn persistent_stale_skips_without_advancing() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        for _ in 0..=MAX_STALE_RETRIES {
            gpu.acquire_script.push_back(SurfaceStatus::Stale);
        }

        let out = ctl.draw_frame(&mut gpu, &window()).unwrap();
        assert_eq!(out, FrameOutcome::Skipped);
        assert_eq!(ctl.frame_counter(), 0);
        assert_eq!(gpu.rebuilds().len(), (MAX_STALE_RETRIES + 1) as usize);
        assert!(!gpu.calls.iter().any(|c| matches!(c, Call::Submit(..))));
    }

    #[test]
    fn stale_present_rebuilds_after_presenting() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        gpu.present_script.push_back(SurfaceStatus::Stale);

        ctl.draw_frame(&mut gpu, &window()).unwrap();
        let tail = &gpu.calls[gpu.calls.len() - 3..];
        assert_eq!(
            tail,
            &[
                Call::Present(0, 0),
                Call::Idle,
                Call::Rebuild(RenderSize::new(1280, 720))
            ]
        );
        assert_eq!(ctl.frame_counter(), 1);
        assert_eq!(ctl.in_flight(), 0);
    }

    #[test]
    fn suboptimal_acquire_still_presents_then_rebuilds() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        gpu.acquire_script.push_back(SurfaceStatus::Suboptimal);

        let out = ctl.draw_frame(&mut gpu, &window()).unwrap();
        assert!(matches!(out, FrameOutcome::Presented { .. }));
        assert!(gpu.calls.contains(&Call::Present(0, 0)));
        assert_eq!(gpu.rebuilds().len(), 1);
    }

    #[test]
    fn resize_flag_is_consumed_once() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        let win = window();

        ctl.request_rebuild(RebuildReason::RESIZED);
        ctl.draw_frame(&mut gpu, &win).unwrap();
        ctl.draw_frame(&mut gpu, &win).unwrap();
        assert_eq!(gpu.rebuilds().len(), 1);
        assert!(ctl.pending_rebuild().is_empty());
    }

    #[test]
    fn stale_acquire_also_satisfies_pending_resize() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        ctl.request_rebuild(RebuildReason::RESIZED | RebuildReason::OPTIONS);
        gpu.acquire_script.push_back(SurfaceStatus::Stale);

        ctl.draw_frame(&mut gpu, &window()).unwrap();
        assert_eq!(gpu.rebuilds().len(), 1);
        let idles = gpu.calls.iter().filter(|c| **c == Call::Idle).count();
        assert_eq!(idles, 1);
        assert!(ctl.pending_rebuild().is_empty());
        assert_eq!(gpu.calls.last(), Some(&Call::Present(0, 0)));
    }

    #[test]
    fn fence_timeout_is_fatal_and_counter_holds() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        gpu.fail_wait = true;

        let err = ctl.draw_frame(&mut gpu, &window()).unwrap_err();
        assert!(matches!(err, RenderError::FenceTimeout { slot: 0, .. }));
        assert_eq!(ctl.frame_counter(), 0);
    }

    #[test]
    fn shutdown_drains_all_slots() {
        let mut ctl = controller(2);
        let mut gpu = MockBackend::new(2);
        let win = window();
        ctl.draw_frame(&mut gpu, &win).unwrap();
        ctl.draw_frame(&mut gpu, &win).unwrap();

        ctl.shutdown(&mut gpu).unwrap();
        assert_eq!(gpu.calls.last(), Some(&Call::Idle));
        assert_eq!(ctl.in_flight(), 0);
        assert!((0..2).all(|s| ctl.slot_state(s) == SlotState::Idle));
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        assert_eq!(controller(0).frames_in_flight(), 1);
    }
}
