use crate::registry::RegistryError;

/// What the runtime should do after one heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    Healthy,
    /// Failed, but below the threshold; keep going.
    Degraded { failures: u32 },
    /// Threshold reached: treat the registry as unreachable.
    Unreachable { failures: u32 },
    /// 401: stop immediately, regardless of the failure count.
    Revoked,
}

impl HeartbeatVerdict {
    pub const fn requires_shutdown(self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Revoked)
    }
}

/// Consecutive-failure tracker for the heartbeat loop.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    threshold: u32,
    consecutive_failures: u32,
}

impl HeartbeatMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn observe(&mut self, outcome: &Result<(), RegistryError>) -> HeartbeatVerdict {
        match outcome {
            Ok(()) => {
                self.consecutive_failures = 0;
                HeartbeatVerdict::Healthy
            }
            Err(err) if err.is_unauthorized() => HeartbeatVerdict::Revoked,
            Err(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    HeartbeatVerdict::Unreachable {
                        failures: self.consecutive_failures,
                    }
                } else {
                    HeartbeatVerdict::Degraded {
                        failures: self.consecutive_failures,
                    }
                }
            }
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}
