use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerSpec {
    pub name: String,
    pub host: String,
    pub user: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostMetrics {
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub load_1m: Option<f64>,
    pub disk_io: Option<DiskIo>,
    pub network_io: Option<NetworkIo>,
}

impl HostMetrics {
    pub fn is_empty(&self) -> bool {
        self.cpu_percent.is_none()
            && self.memory.is_none()
            && self.load_1m.is_none()
            && self.disk_io.is_none()
            && self.network_io.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub used_mb: u64,
    pub total_mb: u64,
    pub percent: f64,
}

impl MemoryUsage {
    /// Builds a usage record from `free -m` figures. Returns `None` when
    /// total is zero so percent can never be Inf or NaN.
    pub fn from_mb(used_mb: u64, total_mb: u64) -> Option<Self> {
        if total_mb == 0 {
            return None;
        }
        let percent = (used_mb as f64 / total_mb as f64 * 1000.0).round() / 10.0;
        Some(Self {
            used_mb,
            total_mb,
            percent,
        })
    }
}

// Cumulative byte counters since boot, as the remote kernel reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkIo {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Ok,
    Error(String),
}

impl HostStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::Error(msg) => Some(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub server: ServerSpec,
    pub metrics: HostMetrics,
    pub status: HostStatus,
    pub collected_at_unix: i64,
}

impl HostSnapshot {
    pub fn failed(server: ServerSpec, message: String, collected_at_unix: i64) -> Self {
        Self {
            server,
            metrics: HostMetrics::default(),
            status: HostStatus::Error(message),
            collected_at_unix,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetSnapshot {
    pub hosts: BTreeMap<String, HostSnapshot>,
    pub generated_at_unix: i64,
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_percent_rounds_to_one_decimal() {
        let mem = MemoryUsage::from_mb(1800, 2048).expect("total is non-zero");
        assert_eq!(mem.used_mb, 1800);
        assert_eq!(mem.total_mb, 2048);
        assert!((mem.percent - 87.9).abs() < f64::EPSILON);
    }

    #[test]
    fn memory_with_zero_total_is_absent() {
        assert_eq!(MemoryUsage::from_mb(100, 0), None);
    }

    #[test]
    fn failed_snapshot_has_empty_metrics() {
        let server = ServerSpec {
            name: "web1".to_string(),
            host: "10.0.0.5".to_string(),
            user: "ubuntu".to_string(),
        };
        let snap = HostSnapshot::failed(server, "connection refused".to_string(), 42);
        assert!(!snap.status.is_ok());
        assert!(snap.metrics.is_empty());
        assert_eq!(snap.status.error_message(), Some("connection refused"));
    }
}
