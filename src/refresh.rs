use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender, TrySendError};

use crate::pane::PaneId;

/// Refresh signal for one pane. `generation` identifies the scheduler run
/// that produced it so ticks queued before a stop can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub pane: PaneId,
    pub generation: u64,
}

struct Running {
    stop_tx: Sender<()>,
    active: Arc<AtomicBool>,
}

/// Per-pane periodic timer. Ticks go to the shared sink owned by the UI
/// loop; the scheduler itself never touches session state.
pub struct RefreshScheduler {
    pane: PaneId,
    interval: Duration,
    sink: Sender<Tick>,
    generation: u64,
    running: Option<Running>,
}

impl RefreshScheduler {
    pub fn new(pane: PaneId, interval: Duration, sink: Sender<Tick>) -> Self {
        Self {
            pane,
            interval,
            sink,
            generation: 0,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts ticking. Calling it on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        self.generation = self.generation.wrapping_add(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let active = Arc::new(AtomicBool::new(true));

        let pane = self.pane;
        let generation = self.generation;
        let interval = self.interval.max(Duration::from_millis(1));
        let sink = self.sink.clone();
        let flag = Arc::clone(&active);
        thread::spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticker) -> _ => {
                        if !flag.load(Ordering::Acquire) {
                            break;
                        }
                        if sink.send(Tick { pane, generation }).is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::trace!(pane, generation, "refresh scheduler exited");
        });

        tracing::debug!(pane, generation, interval = ?self.interval, "refresh scheduler started");
        self.running = Some(Running { stop_tx, active });
    }

    /// Stops ticking without waiting for the timer thread. Safe to call any
    /// number of times.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.active.store(false, Ordering::Release);
        // A full channel already holds a stop; a disconnected one has exited.
        if let Err(TrySendError::Full(())) = running.stop_tx.try_send(()) {
            tracing::trace!(pane = self.pane, "stop signal already pending");
        }
        tracing::debug!(pane = self.pane, generation = self.generation, "refresh scheduler stopped");
    }

    /// Whether `tick` came from the run that is currently active.
    pub fn is_current(&self, tick: &Tick) -> bool {
        self.running.is_some() && tick.pane == self.pane && tick.generation == self.generation
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
