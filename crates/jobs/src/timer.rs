use std::time::{Duration, Instant};

/// Trailing-edge debounce: fires once `delay` has passed since the last poke.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self { Self { delay, deadline: None } }

    pub fn poke(&mut self, now: Instant) { self.deadline = Some(now + self.delay); }

    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if now >= d => { self.deadline = None; true }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fires_after_quiet_period() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(50));
        d.poke(t0);
        d.poke(t0 + Duration::from_millis(30));
        assert!(!d.fire_if_due(t0 + Duration::from_millis(60)));
        assert!(d.fire_if_due(t0 + Duration::from_millis(80)));
        assert!(!d.fire_if_due(t0 + Duration::from_millis(200)));
    }
}
