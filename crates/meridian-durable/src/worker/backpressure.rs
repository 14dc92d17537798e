//! Hard-capacity backpressure for bounded queues: the outbound agent
//! transport queue and the worker pool's claim queue both reject new work
//! past a fixed capacity rather than growing unbounded, surfacing a
//! `queue_full` error to the caller instead of silently buffering.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct BackpressureConfig {
    pub capacity: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Tracks in-flight occupancy against a hard capacity. `try_acquire`
/// returns a [`BackpressureTicket`] that releases its slot on drop, so
/// occupancy never leaks past an early return or panic unwind.
pub struct Backpressure {
    capacity: usize,
    occupied: AtomicUsize,
}

impl Backpressure {
    pub fn new(config: BackpressureConfig) -> Self {
        Self {
            capacity: config.capacity,
            occupied: AtomicUsize::new(0),
        }
    }

    pub fn try_acquire(&self) -> Option<BackpressureTicket<'_>> {
        loop {
            let current = self.occupied.load(Ordering::Acquire);
            if current >= self.capacity {
                return None;
            }
            if self
                .occupied
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(BackpressureTicket { owner: self });
            }
        }
    }

    pub fn occupied(&self) -> usize {
        self.occupied.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.occupied() >= self.capacity
    }
}

pub struct BackpressureTicket<'a> {
    owner: &'a Backpressure,
}

impl Drop for BackpressureTicket<'_> {
    fn drop(&mut self) {
        self.owner.occupied.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_once_capacity_reached() {
        let bp = Backpressure::new(BackpressureConfig { capacity: 1 });
        let ticket = bp.try_acquire();
        assert!(ticket.is_some());
        assert!(bp.try_acquire().is_none());
        drop(ticket);
        assert!(bp.try_acquire().is_some());
    }

    #[test]
    fn occupancy_reflects_outstanding_tickets() {
        let bp = Backpressure::new(BackpressureConfig { capacity: 4 });
        let _a = bp.try_acquire().unwrap();
        let _b = bp.try_acquire().unwrap();
        assert_eq!(bp.occupied(), 2);
    }
}
