use std::collections::VecDeque;

use chrono::{DateTime, Utc};

/// Maximum number of events retained in the ring buffer.
const EVENT_LOG_CAPACITY: usize = 200;

/// A typed event from a tracking session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Attached {
        element: u64,
        strategy: Option<String>,
    },
    Detached {
        reason: DetachReason,
    },
    DetectFailed {
        attempt: u32,
    },
    /// The attempt budget ran out without finding a video.
    DetectExhausted {
        attempts: u32,
    },
    Saved {
        content_key: String,
        current_time: f64,
    },
    ResumeOffered {
        content_key: String,
        resume_at: f64,
    },
    ContentChanged {
        signature: String,
    },
    Navigated {
        url: String,
    },
    ParentInfoReceived {
        title: String,
    },
    Error {
        source: String,
        message: String,
    },
}

/// Why the tracker let go of its element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachReason {
    Navigation,
    /// The element left the document.
    Removed,
    /// The host shut the tracker down.
    Stopped,
}

/// A timestamped event entry.
pub type EventEntry = (DateTime<Utc>, SessionEvent);

/// Bounded ring buffer of session events.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(EVENT_LOG_CAPACITY),
        }
    }

    /// Push a new event, evicting the oldest if at capacity.
    pub fn push(&mut self, at: DateTime<Utc>, event: SessionEvent) {
        if self.entries.len() >= EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((at, event));
    }

    /// Return a snapshot of all entries (newest last).
    pub fn snapshot(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over events only, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &SessionEvent> {
        self.entries.iter().map(|(_, e)| e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut log = EventLog::new();
        for attempt in 0..(EVENT_LOG_CAPACITY as u32 + 5) {
            log.push(Utc::now(), SessionEvent::DetectFailed { attempt });
        }
        assert_eq!(log.len(), EVENT_LOG_CAPACITY);
        assert_eq!(
            log.events().next(),
            Some(&SessionEvent::DetectFailed { attempt: 5 })
        );
    }
}
