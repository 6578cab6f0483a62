//! Background capture and timer threads
//!
//! `MonitorHandle::spawn` wires a frame source and a perception provider to a
//! running session:
//!
//! * the capture thread pulls a frame every `capture_interval`, hands it to
//!   the perception worker and waits at most `perception_timeout` for the
//!   result. Late or failed results count as dropped frames.
//! * the perception worker owns the provider and analyzes one frame at a
//!   time. A frame captured while it is still busy is dropped.
//! * the timer thread calls `timer_expired` at the session deadline.
//!
//! Both loops end when the session leaves Monitoring or the handle is
//! stopped. A capture loop that sees the session leave Monitoring wakes the
//! timer so it does not sleep until the deadline. Stopping never touches quiz
//! scoring.

use super::SessionController;
use crate::error::ProctorError;
use crate::perception::{extract_signal, Frame, FrameAnalysis, FrameSource, PerceptionProvider};
use crate::types::Phase;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type AnalysisResult = (u64, Result<FrameAnalysis, ProctorError>);

/// Running capture and timer threads for one session
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    wake: Vec<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Start capturing for a session that is already Monitoring
    pub fn spawn(
        controller: Arc<SessionController>,
        source: Box<dyn FrameSource>,
        provider: Box<dyn PerceptionProvider>,
    ) -> Result<Self, ProctorError> {
        let phase = controller.phase();
        if phase != Phase::Monitoring {
            return Err(ProctorError::InvalidPhase {
                operation: "monitor",
                phase,
            });
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (capture_wake_tx, capture_wake_rx) = mpsc::channel();
        let (timer_wake_tx, timer_wake_rx) = mpsc::channel();

        let (frame_tx, frame_rx) = mpsc::sync_channel::<Frame>(1);
        let (result_tx, result_rx) = mpsc::channel::<AnalysisResult>();

        // Exits once the capture thread hangs up; a provider stuck inside
        // `analyze` is left behind rather than joined.
        thread::spawn(move || perception_worker(provider, frame_rx, result_tx));

        let capture = {
            let controller = Arc::clone(&controller);
            let stop = Arc::clone(&stop);
            let timer_wake = timer_wake_tx.clone();
            thread::spawn(move || {
                capture_loop(
                    controller,
                    source,
                    frame_tx,
                    result_rx,
                    capture_wake_rx,
                    timer_wake,
                    stop,
                )
            })
        };

        let timer = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || timer_loop(controller, timer_wake_rx, stop))
        };

        Ok(Self {
            stop,
            wake: vec![capture_wake_tx, timer_wake_tx],
            handles: vec![capture, timer],
        })
    }

    /// Ask both loops to exit without waiting for them
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        for wake in &self.wake {
            let _ = wake.send(());
        }
    }

    /// Whether any loop is still running
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }

    /// Stop and wait for both loops to exit
    pub fn join(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop();
        while let Some(handle) = self.handles.pop() {
            if handle.join().is_err() {
                warn!("monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn perception_worker(
    mut provider: Box<dyn PerceptionProvider>,
    frames: Receiver<Frame>,
    results: Sender<AnalysisResult>,
) {
    while let Ok(frame) = frames.recv() {
        let result = provider.analyze(&frame);
        if results.send((frame.sequence, result)).is_err() {
            break;
        }
    }
    debug!("perception worker exiting");
}

fn capture_loop(
    controller: Arc<SessionController>,
    mut source: Box<dyn FrameSource>,
    frames: mpsc::SyncSender<Frame>,
    results: Receiver<AnalysisResult>,
    wake: Receiver<()>,
    timer_wake: Sender<()>,
    stop: Arc<AtomicBool>,
) {
    let config = controller.config().clone();
    let interval = config.session.capture_interval();
    let timeout = config.session.perception_timeout();

    info!(
        interval_ms = interval.as_millis() as u64,
        timeout_ms = timeout.as_millis() as u64,
        "capture loop started"
    );

    while !stop.load(Ordering::SeqCst) && controller.phase() == Phase::Monitoring {
        if let Some(frame) = source.next_frame() {
            let sequence = frame.sequence;
            let captured_at = frame.captured_at;

            match frames.try_send(frame) {
                Ok(()) => match await_analysis(&results, sequence, timeout) {
                    Some(Ok(analysis)) => {
                        let signal = extract_signal(&analysis, captured_at, &config.thresholds);
                        if let Err(e) = controller.ingest_signal(&signal) {
                            warn!(error = %e, sequence, "failed to ingest signal");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, sequence, "perception failed");
                        controller.record_dropped_frame_at(captured_at);
                    }
                    None => {
                        debug!(sequence, "perception timed out");
                        controller.record_dropped_frame_at(captured_at);
                    }
                },
                Err(TrySendError::Full(_)) => {
                    debug!(sequence, "perception worker busy");
                    controller.record_dropped_frame_at(captured_at);
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("perception worker exited");
                    break;
                }
            }
        } else {
            debug!("no frame this tick");
        }

        match wake.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if controller.phase() != Phase::Monitoring {
        let _ = timer_wake.send(());
    }
    info!("capture loop stopped");
}

/// Wait for the result of `sequence`, discarding late results of earlier frames
fn await_analysis(
    results: &Receiver<AnalysisResult>,
    sequence: u64,
    timeout: Duration,
) -> Option<Result<FrameAnalysis, ProctorError>> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match results.recv_timeout(remaining) {
            Ok((seq, result)) if seq == sequence => return Some(result),
            Ok((seq, _)) => debug!(seq, "discarding late perception result"),
            Err(_) => return None,
        }
    }
}

fn timer_loop(controller: Arc<SessionController>, wake: Receiver<()>, stop: Arc<AtomicBool>) {
    let Some(deadline) = controller.deadline() else {
        return;
    };
    let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);

    match wake.recv_timeout(remaining) {
        Err(RecvTimeoutError::Timeout) if !stop.load(Ordering::SeqCst) => {
            match controller.timer_expired_at(deadline) {
                Ok(true) => info!("session deadline reached"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "timer expiry failed"),
            }
        }
        _ => debug!("timer cancelled"),
    }
}
