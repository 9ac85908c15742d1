use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::services::install_job::{InstallPhase, JobReport};

/// Everything the worker tells the UI context. The UI drains these on its own tick.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InstallEvent {
    Queued {
        item_id: String,
        position: usize,
    },
    Removed {
        item_id: String,
    },
    PhaseChanged {
        item_id: String,
        phase: InstallPhase,
    },
    Progress {
        item_id: String,
        fraction: f64,
    },
    Finished {
        report: JobReport,
    },
    /// Post-install request, to be serviced on the UI context.
    ShortcutRequested {
        exe_path: PathBuf,
        display_name: String,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<InstallEvent>;

#[derive(Clone, Copy, Debug)]
struct ProgressSlot {
    fraction: f64,
    phase: InstallPhase,
}

#[derive(Clone)]
pub struct ProgressSink {
    slots: Arc<Mutex<HashMap<String, ProgressSlot>>>,
    events: mpsc::UnboundedSender<InstallEvent>,
}

impl ProgressSink {
    pub fn new() -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sink = Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
        };
        (sink, receiver)
    }

    pub fn set(&self, item_id: &str, fraction: f64) {
        let fraction = clamp_fraction(fraction);
        {
            let mut slots = self.lock();
            slots
                .entry(item_id.to_string())
                .and_modify(|slot| slot.fraction = fraction)
                .or_insert(ProgressSlot {
                    fraction,
                    phase: InstallPhase::Queued,
                });
        }
        self.emit(InstallEvent::Progress {
            item_id: item_id.to_string(),
            fraction,
        });
    }

    /// `None` means nothing reported for this id since the process started.
    pub fn get(&self, item_id: &str) -> Option<f64> {
        self.lock().get(item_id).map(|slot| slot.fraction)
    }

    pub fn set_phase(&self, item_id: &str, phase: InstallPhase) {
        {
            let mut slots = self.lock();
            slots
                .entry(item_id.to_string())
                .and_modify(|slot| slot.phase = phase)
                .or_insert(ProgressSlot {
                    fraction: 0.0,
                    phase,
                });
        }
        self.emit(InstallEvent::PhaseChanged {
            item_id: item_id.to_string(),
            phase,
        });
    }

    pub fn phase_of(&self, item_id: &str) -> Option<InstallPhase> {
        self.lock().get(item_id).map(|slot| slot.phase)
    }

    /// Silently resets an id's slot before a fresh job starts on it.
    pub fn reset(&self, item_id: &str) {
        self.lock().insert(
            item_id.to_string(),
            ProgressSlot {
                fraction: 0.0,
                phase: InstallPhase::Queued,
            },
        );
    }

    pub fn emit(&self, event: InstallEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("install event dropped: receiver closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ProgressSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn clamp_fraction(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_latest_value() {
        let (sink, mut events) = ProgressSink::new();
        assert_eq!(sink.get("42"), None);

        sink.set("42", 0.25);
        sink.set("42", 0.5);
        assert_eq!(sink.get("42"), Some(0.5));
        assert_eq!(sink.get("7"), None);

        let mut reported = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let InstallEvent::Progress { fraction, .. } = event {
                reported.push(fraction);
            }
        }
        assert_eq!(reported, vec![0.25, 0.5]);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let (sink, _events) = ProgressSink::new();
        sink.set("1", 1.7);
        assert_eq!(sink.get("1"), Some(1.0));
        sink.set("1", -3.0);
        assert_eq!(sink.get("1"), Some(0.0));
        sink.set("1", f64::NAN);
        assert_eq!(sink.get("1"), Some(0.0));
    }

    #[test]
    fn phase_and_progress_share_a_slot() {
        let (sink, _events) = ProgressSink::new();
        sink.set_phase("9", InstallPhase::Downloading);
        sink.set("9", 0.4);
        assert_eq!(sink.phase_of("9"), Some(InstallPhase::Downloading));
        sink.reset("9");
        assert_eq!(sink.phase_of("9"), Some(InstallPhase::Queued));
        assert_eq!(sink.get("9"), Some(0.0));
    }

    #[test]
    fn writes_from_another_thread_are_visible() {
        let (sink, _events) = ProgressSink::new();
        let writer = sink.clone();
        let handle = std::thread::spawn(move || {
            for step in 0..=10 {
                writer.set("worker", step as f64 / 10.0);
            }
        });
        handle.join().expect("writer thread");
        assert_eq!(sink.get("worker"), Some(1.0));
    }

    #[test]
    fn closed_receiver_does_not_panic() {
        let (sink, events) = ProgressSink::new();
        drop(events);
        sink.set("1", 0.3);
        sink.emit(InstallEvent::Removed {
            item_id: "1".to_string(),
        });
        assert_eq!(sink.get("1"), Some(0.3));
    }
}
