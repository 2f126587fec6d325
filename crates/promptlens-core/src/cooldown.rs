//! Scan cooldown gate
//!
//! Bounds re-scans to at most one per cooldown period. A request arriving
//! during the cooldown is parked in a single pending slot and fires once the
//! period has elapsed; further requests while a slot is pending coalesce into
//! it. Nothing is dropped and nothing fires twice.

/// Milliseconds on the session clock
pub type Millis = u64;

/// Result of asking the gate for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownResult {
    /// Scan now
    Fire,
    /// Scan later, at the given time; the caller should arm a timer
    Deferred { at: Millis },
    /// A deferred scan is already armed and will cover this request
    Coalesced { at: Millis },
}

#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Millis,
    last_fired: Option<Millis>,
    pending: Option<Millis>,
}

impl Cooldown {
    pub fn new(period: Millis) -> Self {
        Self {
            period,
            last_fired: None,
            pending: None,
        }
    }

    pub fn period(&self) -> Millis {
        self.period
    }

    /// Ask for a scan at `now`
    pub fn request(&mut self, now: Millis) -> CooldownResult {
        if let Some(at) = self.pending {
            return CooldownResult::Coalesced { at };
        }

        match self.last_fired {
            Some(last) if now.saturating_sub(last) < self.period => {
                let at = last + self.period;
                self.pending = Some(at);
                CooldownResult::Deferred { at }
            }
            _ => {
                self.last_fired = Some(now);
                CooldownResult::Fire
            }
        }
    }

    /// Consume the pending slot when its timer fires. Returns false if there
    /// was nothing pending (the timer was stale).
    pub fn fire_pending(&mut self, now: Millis) -> bool {
        if self.pending.take().is_some() {
            self.last_fired = Some(now);
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> Option<Millis> {
        self.pending
    }

    /// Forget all history (monitoring stopped)
    pub fn reset(&mut self) {
        self.last_fired = None;
        self.pending = None;
    }
}
