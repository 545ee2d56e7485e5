use tokio::time::*;

use super::*;

pub type WallTime = Duration;

pub struct Monitor {
    dur: Duration,
    start: Option<Instant>,
}

impl Monitor {
    pub fn new(dur: Duration) -> Self {
        Self { dur, start: None }
    }
    pub fn start(&mut self) {
        self.start.get_or_insert_with(Instant::now);
    }
}

impl super::Monitor for Monitor {
    type Resource = WallTime;

    async fn wait_exhaust(&mut self) -> MonitorKind {
        let start = *self.start.get_or_insert_with(Instant::now);
        sleep_until(start + self.dur).await;
        MonitorKind::Walltime
    }
    fn poll_exhaust(&mut self) -> Option<MonitorKind> {
        let start = self.start?;
        if Instant::now() < start + self.dur {
            return None;
        }
        Some(MonitorKind::Walltime)
    }
    async fn stat(self) -> Self::Resource {
        match self.start {
            Some(start) => Instant::now().duration_since(start),
            None => Duration::ZERO,
        }
    }
}
