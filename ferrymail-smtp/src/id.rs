//! Process-wide session identifiers.

use core::fmt::{self, Display, Formatter};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

static COUNTER: Mutex<u32> = Mutex::new(0);

/// Identifier assigned to every accepted connection: the wall-clock
/// second of acceptance paired with a process-wide strictly increasing
/// counter. Unique within a process until the counter wraps past 2^32.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SessionId {
    timestamp: i64,
    counter: u32,
}

impl SessionId {
    /// Mints the next id. Safe to call concurrently from session tasks.
    #[must_use]
    pub fn generate() -> Self {
        let mut counter = COUNTER.lock().unwrap_or_else(PoisonError::into_inner);
        *counter = counter.wrapping_add(1);

        Self {
            timestamp: Utc::now().timestamp(),
            counter: *counter,
        }
    }

    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}{:x}", self.timestamp, self.counter)
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashSet, thread};

    use super::SessionId;

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| (0..100).map(|_| SessionId::generate()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id.counter()), "duplicate counter {}", id.counter());
            }
        }
        assert_eq!(seen.len(), 800);
    }

    #[test]
    fn renders_lowercase_hex() {
        let id = SessionId::generate();
        let rendered = id.to_string();
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rendered, rendered.to_lowercase());
    }
}
