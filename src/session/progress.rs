//! Progress event reporter
//!
//! The engine reports progress as `(token, message, completed, total)`
//! tuples from whatever thread does the work. The reporter decides whether
//! each report becomes a `progressStart`, `progressUpdate` or `progressEnd`
//! event and drops reports that would not change what the client shows.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::dap::{
    EventMessage, FrameWriter, ProgressEndEventBody, ProgressStartEventBody,
    ProgressUpdateEventBody,
};

/// Title used when the first report of a token has no message
const DEFAULT_TITLE: &str = "Progress";

/// `completed` value that ends a progress whose total is unknown
pub const INDETERMINATE_DONE: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Start(ProgressStartEventBody),
    Update(ProgressUpdateEventBody),
    End(ProgressEndEventBody),
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "progressStart",
            Self::Update(_) => "progressUpdate",
            Self::End(_) => "progressEnd",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        let body = match self {
            Self::Start(body) => serde_json::to_value(body)?,
            Self::Update(body) => serde_json::to_value(body)?,
            Self::End(body) => serde_json::to_value(body)?,
        };
        serde_json::to_value(EventMessage::new(self.name(), Some(body)))
    }
}

#[derive(Debug)]
struct Tracked {
    progress_id: String,
    message: Option<String>,
    percentage: Option<u32>,
}

/// Coalescing state machine behind [`ProgressReporter`]
#[derive(Debug, Default)]
pub struct ProgressTracker {
    next_id: u64,
    active: HashMap<u64, Tracked>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one report into the state and return the events to emit
    ///
    /// `total == None` means the amount of work is unknown. A token seen
    /// for the first time mints a fresh progress ID. `completed >= total`,
    /// or `completed == INDETERMINATE_DONE` when there is no total, ends
    /// the progress and forgets the token.
    pub fn push(
        &mut self,
        token: u64,
        message: Option<&str>,
        completed: u64,
        total: Option<u64>,
    ) -> Vec<ProgressEvent> {
        let done = match total {
            Some(total) => completed >= total,
            None => completed == INDETERMINATE_DONE,
        };
        let percentage = percentage(completed, total);

        let Some(tracked) = self.active.get_mut(&token) else {
            if done {
                // Started and finished in one report: nothing worth showing
                return Vec::new();
            }

            self.next_id += 1;
            let progress_id = self.next_id.to_string();
            self.active.insert(
                token,
                Tracked {
                    progress_id: progress_id.clone(),
                    message: None,
                    percentage,
                },
            );
            return vec![ProgressEvent::Start(ProgressStartEventBody {
                progress_id,
                title: message.unwrap_or(DEFAULT_TITLE).to_string(),
                cancellable: false,
                message: None,
                percentage,
            })];
        };

        if done {
            let message = message.map(str::to_string).or(tracked.message.take());
            let progress_id = tracked.progress_id.clone();
            self.active.remove(&token);
            return vec![ProgressEvent::End(ProgressEndEventBody {
                progress_id,
                message,
            })];
        }

        let message_changed = message.is_some_and(|m| tracked.message.as_deref() != Some(m));
        if !message_changed && percentage == tracked.percentage {
            return Vec::new();
        }

        if let Some(message) = message {
            tracked.message = Some(message.to_string());
        }
        tracked.percentage = percentage;

        vec![ProgressEvent::Update(ProgressUpdateEventBody {
            progress_id: tracked.progress_id.clone(),
            message: tracked.message.clone(),
            percentage,
        })]
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

fn percentage(completed: u64, total: Option<u64>) -> Option<u32> {
    match total {
        Some(total) if total > 0 => {
            let pct = (u128::from(completed) * 100 / u128::from(total)).min(100);
            Some(pct as u32)
        }
        _ => None,
    }
}

/// Thread-safe front end that writes progress events to the client
///
/// `report` never blocks on I/O: events are queued and a background task
/// writes them in order.
#[derive(Clone)]
pub struct ProgressReporter {
    tracker: Arc<Mutex<ProgressTracker>>,
    events: mpsc::UnboundedSender<Value>,
}

impl ProgressReporter {
    /// Create the reporter and its writer task; needs a Tokio runtime
    pub fn spawn(writer: FrameWriter) -> Self {
        let (events, mut rx) = mpsc::unbounded_channel::<Value>();

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = writer.send_json(&event).await {
                    tracing::warn!("Failed to send progress event: {}", e);
                    break;
                }
            }
        });

        Self {
            tracker: Arc::new(Mutex::new(ProgressTracker::new())),
            events,
        }
    }

    /// Report progress for `token`; callable from any thread
    pub fn report(&self, token: u64, message: Option<&str>, completed: u64, total: Option<u64>) {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);

        // Queue while still holding the lock so events keep state order
        for event in tracker.push(token, message, completed, total) {
            match event.to_json() {
                Ok(json) => {
                    if self.events.send(json).is_err() {
                        tracing::debug!(token, "Progress writer is gone, dropping event");
                    }
                }
                Err(e) => tracing::warn!("Failed to serialize progress event: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dap::{Frame, FrameReader};
    use tokio::io::BufReader;

    #[test]
    fn test_start_update_end() {
        let mut tracker = ProgressTracker::new();

        let events = tracker.push(7, Some("Loading symbols"), 0, Some(10));
        let [ProgressEvent::Start(start)] = events.as_slice() else {
            panic!("expected start, got {events:?}");
        };
        assert_eq!(start.title, "Loading symbols");
        assert_eq!(start.percentage, Some(0));

        let events = tracker.push(7, Some("libc.so"), 5, Some(10));
        let [ProgressEvent::Update(update)] = events.as_slice() else {
            panic!("expected update, got {events:?}");
        };
        assert_eq!(update.progress_id, start.progress_id);
        assert_eq!(update.message.as_deref(), Some("libc.so"));
        assert_eq!(update.percentage, Some(50));

        let events = tracker.push(7, None, 10, Some(10));
        let [ProgressEvent::End(end)] = events.as_slice() else {
            panic!("expected end, got {events:?}");
        };
        assert_eq!(end.progress_id, start.progress_id);
        // Omitted message carries over from the last update
        assert_eq!(end.message.as_deref(), Some("libc.so"));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_unchanged_reports_are_coalesced() {
        let mut tracker = ProgressTracker::new();
        tracker.push(1, Some("Indexing"), 1, Some(1000));

        // 1/1000 and 2/1000 both round down to 0%
        assert!(tracker.push(1, None, 2, Some(1000)).is_empty());
        assert_eq!(tracker.push(1, None, 20, Some(1000)).len(), 1);
        assert!(tracker.push(1, None, 21, Some(1000)).is_empty());
    }

    #[test]
    fn test_message_carry_over_on_update() {
        let mut tracker = ProgressTracker::new();
        tracker.push(1, Some("Downloading"), 0, Some(4));
        tracker.push(1, Some("part 1"), 1, Some(4));

        let events = tracker.push(1, None, 2, Some(4));
        let [ProgressEvent::Update(update)] = events.as_slice() else {
            panic!("expected update, got {events:?}");
        };
        assert_eq!(update.message.as_deref(), Some("part 1"));
    }

    #[test]
    fn test_progress_ids_are_unique() {
        let mut tracker = ProgressTracker::new();
        let mut ids = Vec::new();
        for token in [3, 3, 9] {
            for event in tracker.push(token, Some("work"), 0, None) {
                if let ProgressEvent::Start(start) = event {
                    ids.push(start.progress_id);
                }
            }
        }
        tracker.push(3, None, 1, Some(1));
        for event in tracker.push(3, Some("again"), 0, Some(2)) {
            if let ProgressEvent::Start(start) = event {
                ids.push(start.progress_id);
            }
        }

        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_indeterminate_progress_has_no_percentage() {
        let mut tracker = ProgressTracker::new();
        let events = tracker.push(1, None, 5, None);
        let [ProgressEvent::Start(start)] = events.as_slice() else {
            panic!("expected start, got {events:?}");
        };
        assert_eq!(start.title, DEFAULT_TITLE);
        assert_eq!(start.percentage, None);
    }

    #[test]
    fn test_indeterminate_progress_ends() {
        let mut tracker = ProgressTracker::new();
        let events = tracker.push(1, Some("Indexing"), 0, None);
        let [ProgressEvent::Start(start)] = events.as_slice() else {
            panic!("expected start, got {events:?}");
        };

        assert_eq!(tracker.push(1, Some("libfoo"), 1, None).len(), 1);
        let events = tracker.push(1, None, INDETERMINATE_DONE, None);
        let [ProgressEvent::End(end)] = events.as_slice() else {
            panic!("expected end, got {events:?}");
        };
        assert_eq!(end.progress_id, start.progress_id);
        assert_eq!(end.message.as_deref(), Some("libfoo"));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_late_total_ends_indeterminate_progress() {
        let mut tracker = ProgressTracker::new();
        tracker.push(4, Some("Scanning"), 0, None);

        let events = tracker.push(4, Some("done"), 10, Some(10));
        assert!(matches!(events.as_slice(), [ProgressEvent::End(_)]));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_instant_completion_is_dropped() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.push(1, Some("quick"), 3, Some(3)).is_empty());
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_reporter_writes_events_from_other_threads() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let reporter = ProgressReporter::spawn(FrameWriter::new(server));

        let background = reporter.clone();
        std::thread::spawn(move || {
            background.report(1, Some("Attaching"), 0, Some(2));
            background.report(1, None, 1, Some(2));
            background.report(1, None, 2, Some(2));
        })
        .join()
        .unwrap();

        let mut reader = FrameReader::new(BufReader::new(client));
        let mut names = Vec::new();
        for _ in 0..3 {
            let Frame::Payload(payload) = reader.read_frame().await.unwrap() else {
                panic!("expected a frame");
            };
            let event: Value = serde_json::from_slice(&payload).unwrap();
            names.push(event["event"].as_str().unwrap().to_string());
        }
        assert_eq!(names, vec!["progressStart", "progressUpdate", "progressEnd"]);
    }
}
