//! Per-host collection pass: one session, a fixed ordered probe set, one
//! snapshot. Session establishment failure marks the host down; individual
//! probe failures only leave gaps in the metric set.

use crate::parsers;
use crate::session::{Session, SessionFactory};
use crate::state::{now_unix, HostMetrics, HostSnapshot, HostStatus, ServerSpec};
use std::time::Duration;
use tracing::debug;

// The probe commands are the collector's contract with the parsers: change
// the remote tool assumptions there, not the control flow here.
const CPU_PROBE: &str = "top -bn1 | grep -i 'cpu(s)' | head -1";
const MEMORY_PROBE: &str = "free -m";
const LOAD_PROBE: &str = "uptime";
const DISK_PROBE: &str = "cat /proc/diskstats";
const NETWORK_PROBE: &str = "cat /proc/net/dev";

#[derive(Debug, Clone, Copy)]
pub struct CollectorSettings {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

pub async fn collect_host<F: SessionFactory>(
    factory: &F,
    server: &ServerSpec,
    settings: CollectorSettings,
) -> HostSnapshot {
    let collected_at_unix = now_unix();

    let mut session = match factory.open(server, settings.connect_timeout).await {
        Ok(session) => session,
        Err(err) => {
            debug!(host = %server.name, error = %err, "session establishment failed");
            return HostSnapshot::failed(server.clone(), err.to_string(), collected_at_unix);
        }
    };

    let timeout = settings.command_timeout;
    let metrics = HostMetrics {
        cpu_percent: run_probe(&mut session, server, "cpu", CPU_PROBE, timeout)
            .await
            .and_then(|out| parsers::cpu_percent(&out)),
        memory: run_probe(&mut session, server, "memory", MEMORY_PROBE, timeout)
            .await
            .and_then(|out| parsers::memory_usage(&out)),
        load_1m: run_probe(&mut session, server, "load", LOAD_PROBE, timeout)
            .await
            .and_then(|out| parsers::load_1m(&out)),
        disk_io: run_probe(&mut session, server, "disk", DISK_PROBE, timeout)
            .await
            .and_then(|out| parsers::disk_io(&out)),
        network_io: run_probe(&mut session, server, "network", NETWORK_PROBE, timeout)
            .await
            .and_then(|out| parsers::network_io(&out)),
    };

    session.close().await;

    HostSnapshot {
        server: server.clone(),
        metrics,
        status: HostStatus::Ok,
        collected_at_unix,
    }
}

async fn run_probe<S: Session>(
    session: &mut S,
    server: &ServerSpec,
    probe: &str,
    command: &str,
    timeout: Duration,
) -> Option<String> {
    match session.execute(command, timeout).await {
        Ok(output) => Some(output),
        Err(err) => {
            debug!(host = %server.name, probe, error = %err, "probe failed");
            None
        }
    }
}
