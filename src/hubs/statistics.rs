/// Collector for hub invocation usage, injectable so callers can meter their
/// traffic. The default implementation does nothing.
pub trait UsageStatistics: Send + Sync {
    fn invocation_started(&self, _target: &str) {}

    fn invocation_completed(&self, _target: &str) {}
}

pub struct NoopStatistics;

impl UsageStatistics for NoopStatistics {}
