//! # Event Processor
//!
//! Decodes raw agent-contract logs into typed job events.

use std::collections::HashMap;

use crate::blockchain::types::{EventKind, LogEntry};
use crate::types::{Address, SyncError, SyncResult};

/// Decoded job event ready to be merged into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    Created { job: Address, consumer: Address },
    Funded { job: Address },
    Completed { job: Address },
}

impl JobEvent {
    pub fn job(&self) -> Address {
        match self {
            JobEvent::Created { job, .. } | JobEvent::Funded { job } | JobEvent::Completed { job } => *job,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            JobEvent::Created { .. } => EventKind::Created,
            JobEvent::Funded { .. } => EventKind::Funded,
            JobEvent::Completed { .. } => EventKind::Completed,
        }
    }
}

/// Event processor that decodes raw logs
pub struct EventProcessor {
    /// Topic to event kind mapping
    topics: HashMap<[u8; 32], EventKind>,
}

impl EventProcessor {
    pub fn new() -> Self {
        let topics = EventKind::ALL.iter().map(|kind| (kind.topic(), *kind)).collect();
        Self { topics }
    }

    /// Identify a log by its first topic
    pub fn kind_of(&self, log: &LogEntry) -> Option<EventKind> {
        log.topics.first().and_then(|topic| self.topics.get(topic)).copied()
    }

    /// Decode a log fetched with `kind`'s topic filter.
    ///
    /// A log whose first topic names a different tracked event is rejected.
    pub fn process_log(&self, kind: EventKind, log: &LogEntry) -> SyncResult<JobEvent> {
        if let Some(actual) = self.kind_of(log) {
            if actual != kind {
                return Err(SyncError::Decode(format!(
                    "expected {} log, got {}",
                    kind.name(),
                    actual.name()
                )));
            }
        }

        let needed = kind.data_words() * 32;
        if log.data.len() < needed {
            return Err(SyncError::Decode(format!(
                "{} log data is {} bytes, need {}",
                kind.name(),
                log.data.len(),
                needed
            )));
        }

        let job = Address::from_slice(&log.data[0..32]);

        Ok(match kind {
            EventKind::Created => JobEvent::Created {
                job,
                consumer: Address::from_slice(&log.data[32..64]),
            },
            EventKind::Funded => JobEvent::Funded { job },
            EventKind::Completed => JobEvent::Completed { job },
        })
    }
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with(kind: EventKind, words: &[Address]) -> LogEntry {
        LogEntry {
            topics: vec![kind.topic()],
            data: words.iter().flat_map(|a| a.to_word()).collect(),
            block_number: 52,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_created() {
        let processor = EventProcessor::new();
        let log = log_with(EventKind::Created, &[Address([0xAA; 20]), Address([0xBB; 20])]);

        let event = processor.process_log(EventKind::Created, &log).unwrap();
        assert_eq!(
            event,
            JobEvent::Created {
                job: Address([0xAA; 20]),
                consumer: Address([0xBB; 20])
            }
        );
        assert_eq!(event.kind(), EventKind::Created);
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        let processor = EventProcessor::new();
        let log = log_with(EventKind::Created, &[Address([0xAA; 20])]);
        assert!(matches!(
            processor.process_log(EventKind::Created, &log),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_mismatched_topic() {
        let processor = EventProcessor::new();
        let log = log_with(EventKind::Completed, &[Address([0xAA; 20])]);
        assert!(processor.process_log(EventKind::Funded, &log).is_err());
        assert_eq!(processor.kind_of(&log), Some(EventKind::Completed));
    }
}
