//! Edge-triggered load-more signal for scrollable surfaces.
//!
//! The rendering layer reports viewport positions; [`LoadMoreTrigger`]
//! turns them into at-most-one signal per crossing into the near-end zone.
//! The controller's loading guard would survive a storm of duplicate
//! signals, but the trigger keeps the storm from happening at all.

/// Proximity-to-end signal source.
///
/// Given a threshold N, [`observe`](Self::observe) returns `true` exactly
/// once each time the viewport crosses within N items of the currently
/// known end of content. It re-arms when the viewport leaves the zone or
/// when the known total changes (a merge appended items, or a reset
/// emptied the list) — not while the same crossing remains unresolved.
#[derive(Debug, Clone)]
pub struct LoadMoreTrigger {
    threshold: usize,
    known_total: usize,
    armed: bool,
}

impl LoadMoreTrigger {
    /// `threshold` is the count of remaining unseen items at which loading
    /// more becomes warranted.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            known_total: 0,
            armed: true,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Feed the current viewport position through the trigger.
    ///
    /// `last_visible` is the index of the last item currently on screen;
    /// `total` is the number of items known to exist. Returns `true` when a
    /// load-more request should be issued now.
    pub fn observe(&mut self, last_visible: usize, total: usize) -> bool {
        if total != self.known_total {
            // Content changed under us: a new crossing is possible again.
            self.known_total = total;
            self.armed = true;
        }

        if total == 0 {
            // Nothing on screen yet; first-page loading is activation's job.
            return false;
        }

        let remaining = total.saturating_sub(last_visible.saturating_add(1));
        if remaining > self.threshold {
            self.armed = true;
            return false;
        }

        if self.armed {
            self.armed = false;
            true
        } else {
            false
        }
    }

    /// Forget the known total and re-arm, e.g. after the feed was cleared.
    pub fn reset(&mut self) {
        self.known_total = 0;
        self.armed = true;
    }
}
