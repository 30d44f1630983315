use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Which timers fired on a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Due {
    pub measure: bool,
    pub send: bool,
}

/// Two independent deadlines, measurement and send. Both fire on the first
/// poll. Intervals are read on every poll so changes apply immediately.
#[derive(Debug, Default)]
pub struct Schedule {
    last_measurement: Option<Instant>,
    last_send: Option<Instant>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll(
        &mut self,
        now: Instant,
        measurement_interval: Duration,
        send_interval: Duration,
    ) -> Due {
        let measure = elapsed(self.last_measurement, now, measurement_interval);
        if measure {
            self.last_measurement = Some(now);
        }

        let send = elapsed(self.last_send, now, send_interval);
        if send {
            self.last_send = Some(now);
        }

        Due { measure, send }
    }
}

fn elapsed(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}
