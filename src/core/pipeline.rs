//! Telemetry-to-raster update pass and its re-entrancy guard.

use crate::core::footprint::{Footprint, FootprintComputer, FootprintParams, SensorState};
use crate::core::intersect::{EllipsoidIntersector, TerrainIntersector};
use crate::core::warp::{FrameBuffers, HomographyWarper, WarpParams};
use crate::io::telemetry::MetadataFrame;
use crate::types::Raster;
use std::sync::{Mutex, MutexGuard};

/// Result of one update pass
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// New raster is at the front
    Warped { generation: u64 },
    /// A corner ray missed; nothing was drawn
    NoFootprint,
    /// The warp failed; the previous raster stays at the front
    Stale { reason: String },
}

/// Footprint -> homography -> double-buffered warp
pub struct DrapePipeline<I = EllipsoidIntersector> {
    computer: FootprintComputer<I>,
    warper: HomographyWarper,
    buffers: FrameBuffers<Raster>,
    footprint: Option<Footprint>,
}

impl DrapePipeline<EllipsoidIntersector> {
    pub fn ellipsoid(footprint: FootprintParams, warp: WarpParams, width: usize, height: usize) -> Self {
        Self::new(FootprintComputer::ellipsoid(footprint), warp, width, height)
    }
}

impl<I: TerrainIntersector> DrapePipeline<I> {
    pub fn new(computer: FootprintComputer<I>, warp: WarpParams, width: usize, height: usize) -> Self {
        Self {
            computer,
            warper: HomographyWarper::new(warp, width, height),
            buffers: FrameBuffers::rasters(width, height),
            footprint: None,
        }
    }

    pub fn update(&mut self, frame: &MetadataFrame, source: &Raster) -> UpdateOutcome {
        self.update_state(&SensorState::from_frame(frame), source)
    }

    pub fn update_state(&mut self, state: &SensorState, source: &Raster) -> UpdateOutcome {
        let footprint = match self.computer.compute(state) {
            Some(fp) => fp,
            None => {
                log::debug!("No footprint for this frame, skipping warp");
                return UpdateOutcome::NoFootprint;
            }
        };

        let (width, height) = self.warper.size();
        let quad = footprint.raster_quad(width, height);
        let warper = &self.warper;
        match self.buffers.write_with(|back| warper.warp_into(source, &quad, back)) {
            Ok(()) => {
                self.footprint = Some(footprint);
                UpdateOutcome::Warped {
                    generation: self.buffers.generation(),
                }
            }
            Err(e) => {
                log::warn!("Warp failed, keeping previous raster: {}", e);
                UpdateOutcome::Stale {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Raster of the last successful warp
    pub fn front(&self) -> Option<&Raster> {
        self.buffers.front()
    }

    /// Footprint matching [`front`](Self::front)
    pub fn footprint(&self) -> Option<&Footprint> {
        self.footprint.as_ref()
    }

    pub fn computer(&self) -> &FootprintComputer<I> {
        &self.computer
    }

    pub fn warper(&self) -> &HomographyWarper {
        &self.warper
    }
}

/// What [`UpdateGate::submit`] did with an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// Ran the item plus `runs - 1` items deferred meanwhile
    Completed { runs: usize },
    /// Another run is in progress; the item replaced any pending one
    Deferred,
}

struct GateState<T> {
    running: bool,
    pending: Option<T>,
}

/// Re-entrancy guard for update passes.
///
/// Submitting while a run is in progress parks the item instead of
/// running it; only the latest parked item is kept, and the active caller
/// runs it once its current pass completes.
pub struct UpdateGate<T> {
    state: Mutex<GateState<T>>,
}

impl<T> Default for UpdateGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> UpdateGate<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                running: false,
                pending: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn submit<F: FnMut(T)>(&self, item: T, mut run: F) -> GateStatus {
        {
            let mut state = self.lock();
            if state.running {
                if state.pending.replace(item).is_some() {
                    log::debug!("Coalesced pending update");
                }
                return GateStatus::Deferred;
            }
            state.running = true;
        }

        let mut guard = RunningGuard {
            gate: self,
            done: false,
        };
        let mut runs = 0;
        let mut next = Some(item);
        while let Some(item) = next {
            run(item);
            runs += 1;

            let mut state = self.lock();
            next = state.pending.take();
            if next.is_none() {
                state.running = false;
                guard.done = true;
            }
        }
        GateStatus::Completed { runs }
    }
}

/// Clears `running` if `run` unwinds, so later submissions still execute
struct RunningGuard<'a, T> {
    gate: &'a UpdateGate<T>,
    done: bool,
}

impl<T> Drop for RunningGuard<'_, T> {
    fn drop(&mut self) {
        if !self.done {
            let mut state = self.gate.lock();
            state.running = false;
            if state.pending.take().is_some() {
                log::warn!("Discarding pending update after a failed run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::telemetry::TelemetryField;
    use ndarray::Array2;
    use std::sync::mpsc;

    fn frame(elevation: f64) -> MetadataFrame {
        MetadataFrame::new(0.0)
            .with(TelemetryField::SensorLatitude, 45.0)
            .with(TelemetryField::SensorLongitude, 10.0)
            .with(TelemetryField::SensorTrueAltitude, 3000.0)
            .with(TelemetryField::SensorRelativeElevationAngle, elevation)
            .with(TelemetryField::SensorHorizontalFieldOfView, 20.0)
            .with(TelemetryField::SensorVerticalFieldOfView, 10.0)
    }

    #[test]
    fn test_first_front_is_empty_until_warp() {
        let mut pipeline = DrapePipeline::ellipsoid(
            FootprintParams::default(),
            WarpParams::default(),
            64,
            64,
        );
        let source = Array2::from_elem((32, 48), [9, 9, 9, 255]);
        assert!(pipeline.front().is_none());

        assert_eq!(pipeline.update(&frame(10.0), &source), UpdateOutcome::NoFootprint);
        assert!(pipeline.front().is_none());

        assert_eq!(
            pipeline.update(&frame(-60.0), &source),
            UpdateOutcome::Warped { generation: 1 }
        );
        let front = pipeline.front().unwrap();
        assert_eq!(front.dim(), (64, 64));
        assert!(front.iter().any(|p| *p == [9, 9, 9, 255]));
        assert!(pipeline.footprint().is_some());
    }

    #[test]
    fn test_failed_warp_keeps_stale_front() {
        let mut pipeline = DrapePipeline::ellipsoid(
            FootprintParams::default(),
            WarpParams::default(),
            32,
            32,
        );
        let source = Array2::from_elem((16, 16), [50, 60, 70, 255]);
        pipeline.update(&frame(-60.0), &source);
        let before = pipeline.front().unwrap().clone();

        let empty: Raster = Array2::from_elem((0, 0), [0, 0, 0, 0]);
        match pipeline.update(&frame(-50.0), &empty) {
            UpdateOutcome::Stale { .. } => {}
            other => panic!("expected Stale, got {:?}", other),
        }
        assert_eq!(pipeline.front().unwrap(), &before);
    }

    #[test]
    fn test_reentrant_submit_is_deferred_and_coalesced() {
        let gate = UpdateGate::new();
        let mut seen = Vec::new();

        let status = gate.submit(1, |x| {
            seen.push(x);
            if x == 1 {
                assert_eq!(gate.submit(2, |_| panic!("must not run inline")), GateStatus::Deferred);
                assert_eq!(gate.submit(3, |_| panic!("must not run inline")), GateStatus::Deferred);
            }
        });

        assert_eq!(status, GateStatus::Completed { runs: 2 });
        assert_eq!(seen, vec![1, 3]);
        assert!(!gate.is_running());
    }

    #[test]
    fn test_gate_recovers_after_panicking_run() {
        let gate = UpdateGate::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            gate.submit(1, |_| {
                assert_eq!(gate.submit(9, |_| {}), GateStatus::Deferred);
                panic!("update failed");
            })
        }));
        assert!(result.is_err());
        assert!(!gate.is_running());

        // the update deferred during the failed run is discarded
        let mut seen = Vec::new();
        let status = gate.submit(2, |item| seen.push(item));
        assert_eq!(status, GateStatus::Completed { runs: 1 });
        assert_eq!(seen, vec![2]);
    }

    #[test]
    fn test_submit_from_other_thread_while_running() {
        let gate = UpdateGate::new();
        let gate = &gate;
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|s| {
            let runner = s.spawn(move || {
                let mut seen = Vec::new();
                let status = gate.submit("first", |item| {
                    seen.push(item);
                    if item == "first" {
                        started_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                    }
                });
                (status, seen)
            });

            started_rx.recv().unwrap();
            assert_eq!(gate.submit("second", |_| {}), GateStatus::Deferred);
            release_tx.send(()).unwrap();

            let (status, seen) = runner.join().unwrap();
            assert_eq!(status, GateStatus::Completed { runs: 2 });
            assert_eq!(seen, vec!["first", "second"]);
        });
    }
}
