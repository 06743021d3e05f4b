//! Shared traffic counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative byte totals shared by every relayed connection.
///
/// Uplink is client to target, downlink is target to client. Only atomic
/// adds touch the totals.
#[derive(Debug, Default)]
pub struct TrafficCounters {
    up: AtomicU64,
    down: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSnapshot {
    pub up: u64,
    pub down: u64,
}

impl TrafficCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_up(&self, n: u64) {
        if n > 0 {
            self.up.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn add_down(&self, n: u64) {
        if n > 0 {
            self.down.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn up(&self) -> u64 {
        self.up.load(Ordering::Relaxed)
    }

    pub fn down(&self) -> u64 {
        self.down.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TrafficSnapshot {
        TrafficSnapshot {
            up: self.up(),
            down: self.down(),
        }
    }
}

impl TrafficSnapshot {
    /// Growth since `earlier`; saturates instead of wrapping.
    pub fn delta_since(&self, earlier: &TrafficSnapshot) -> TrafficSnapshot {
        TrafficSnapshot {
            up: self.up.saturating_sub(earlier.up),
            down: self.down.saturating_sub(earlier.down),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_concurrent_adds() {
        let counters = Arc::new(TrafficCounters::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let counters = counters.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.add_up(3);
                        counters.add_down(0);
                        counters.add_down(1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(counters.snapshot(), TrafficSnapshot { up: 24000, down: 8000 });
    }

    #[test]
    fn test_delta() {
        let a = TrafficSnapshot { up: 10, down: 5 };
        let b = TrafficSnapshot { up: 25, down: 5 };
        assert_eq!(b.delta_since(&a), TrafficSnapshot { up: 15, down: 0 });
        assert_eq!(a.delta_since(&b), TrafficSnapshot { up: 0, down: 0 });
    }
}
