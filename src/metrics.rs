use crate::state::FleetSnapshot;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub fleet_host_up: GaugeVec,
    pub fleet_host_cpu_usage_percent: GaugeVec,
    pub fleet_host_memory_used_mb: GaugeVec,
    pub fleet_host_memory_total_mb: GaugeVec,
    pub fleet_host_memory_usage_percent: GaugeVec,
    pub fleet_host_load1: GaugeVec,
    pub fleet_host_disk_read_bytes_total: GaugeVec,
    pub fleet_host_disk_written_bytes_total: GaugeVec,
    pub fleet_host_net_rx_bytes_total: GaugeVec,
    pub fleet_host_net_tx_bytes_total: GaugeVec,
    pub fleet_hosts_configured: Gauge,
    pub fleet_hosts_up: Gauge,
    pub fleet_hosts_down: Gauge,
    pub fleet_cycle_duration_seconds: Gauge,
    pub fleet_last_cycle_timestamp_seconds: Gauge,
    pub fleet_scrape_count_total: Counter,
    pub fleet_collect_errors_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let fleet_host_up = GaugeVec::new(
            opts!("fleet_host_up", "Host collection status 0/1 by host"),
            &["host"],
        )?;
        let fleet_host_cpu_usage_percent = GaugeVec::new(
            opts!(
                "fleet_host_cpu_usage_percent",
                "CPU usage in percent (0..100) by host"
            ),
            &["host"],
        )?;
        let fleet_host_memory_used_mb = GaugeVec::new(
            opts!("fleet_host_memory_used_mb", "Used memory in MB by host"),
            &["host"],
        )?;
        let fleet_host_memory_total_mb = GaugeVec::new(
            opts!("fleet_host_memory_total_mb", "Total memory in MB by host"),
            &["host"],
        )?;
        let fleet_host_memory_usage_percent = GaugeVec::new(
            opts!(
                "fleet_host_memory_usage_percent",
                "Memory usage in percent by host"
            ),
            &["host"],
        )?;
        let fleet_host_load1 = GaugeVec::new(
            opts!("fleet_host_load1", "1-minute load average by host"),
            &["host"],
        )?;
        let fleet_host_disk_read_bytes_total = GaugeVec::new(
            opts!(
                "fleet_host_disk_read_bytes_total",
                "Cumulative bytes read from disk since boot by host"
            ),
            &["host"],
        )?;
        let fleet_host_disk_written_bytes_total = GaugeVec::new(
            opts!(
                "fleet_host_disk_written_bytes_total",
                "Cumulative bytes written to disk since boot by host"
            ),
            &["host"],
        )?;
        let fleet_host_net_rx_bytes_total = GaugeVec::new(
            opts!(
                "fleet_host_net_rx_bytes_total",
                "Cumulative received bytes across non-loopback interfaces by host"
            ),
            &["host"],
        )?;
        let fleet_host_net_tx_bytes_total = GaugeVec::new(
            opts!(
                "fleet_host_net_tx_bytes_total",
                "Cumulative transmitted bytes across non-loopback interfaces by host"
            ),
            &["host"],
        )?;
        let fleet_hosts_configured = Gauge::with_opts(opts!(
            "fleet_hosts_configured",
            "Number of configured hosts"
        ))?;
        let fleet_hosts_up =
            Gauge::with_opts(opts!("fleet_hosts_up", "Hosts collected successfully"))?;
        let fleet_hosts_down =
            Gauge::with_opts(opts!("fleet_hosts_down", "Hosts in error state"))?;
        let fleet_cycle_duration_seconds = Gauge::with_opts(opts!(
            "fleet_cycle_duration_seconds",
            "Duration of the last collection cycle in seconds"
        ))?;
        let fleet_last_cycle_timestamp_seconds = Gauge::with_opts(opts!(
            "fleet_last_cycle_timestamp_seconds",
            "Unix timestamp of the last published snapshot"
        ))?;
        let fleet_scrape_count_total = Counter::with_opts(opts!(
            "fleet_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let fleet_collect_errors_total = CounterVec::new(
            opts!(
                "fleet_collect_errors_total",
                "Failed collection passes by host"
            ),
            &["host"],
        )?;

        register(&registry, &fleet_host_up)?;
        register(&registry, &fleet_host_cpu_usage_percent)?;
        register(&registry, &fleet_host_memory_used_mb)?;
        register(&registry, &fleet_host_memory_total_mb)?;
        register(&registry, &fleet_host_memory_usage_percent)?;
        register(&registry, &fleet_host_load1)?;
        register(&registry, &fleet_host_disk_read_bytes_total)?;
        register(&registry, &fleet_host_disk_written_bytes_total)?;
        register(&registry, &fleet_host_net_rx_bytes_total)?;
        register(&registry, &fleet_host_net_tx_bytes_total)?;
        register(&registry, &fleet_hosts_configured)?;
        register(&registry, &fleet_hosts_up)?;
        register(&registry, &fleet_hosts_down)?;
        register(&registry, &fleet_cycle_duration_seconds)?;
        register(&registry, &fleet_last_cycle_timestamp_seconds)?;
        register(&registry, &fleet_scrape_count_total)?;
        register(&registry, &fleet_collect_errors_total)?;

        Ok(Arc::new(Self {
            registry,
            fleet_host_up,
            fleet_host_cpu_usage_percent,
            fleet_host_memory_used_mb,
            fleet_host_memory_total_mb,
            fleet_host_memory_usage_percent,
            fleet_host_load1,
            fleet_host_disk_read_bytes_total,
            fleet_host_disk_written_bytes_total,
            fleet_host_net_rx_bytes_total,
            fleet_host_net_tx_bytes_total,
            fleet_hosts_configured,
            fleet_hosts_up,
            fleet_hosts_down,
            fleet_cycle_duration_seconds,
            fleet_last_cycle_timestamp_seconds,
            fleet_scrape_count_total,
            fleet_collect_errors_total,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &FleetSnapshot) {
        self.fleet_host_up.reset();
        self.fleet_host_cpu_usage_percent.reset();
        self.fleet_host_memory_used_mb.reset();
        self.fleet_host_memory_total_mb.reset();
        self.fleet_host_memory_usage_percent.reset();
        self.fleet_host_load1.reset();
        self.fleet_host_disk_read_bytes_total.reset();
        self.fleet_host_disk_written_bytes_total.reset();
        self.fleet_host_net_rx_bytes_total.reset();
        self.fleet_host_net_tx_bytes_total.reset();

        let mut up = 0_u64;
        for (name, host) in &snapshot.hosts {
            let labels = &[name.as_str()];
            if host.status.is_ok() {
                up += 1;
                self.fleet_host_up.with_label_values(labels).set(1.0);
            } else {
                self.fleet_host_up.with_label_values(labels).set(0.0);
            }

            if let Some(cpu) = host.metrics.cpu_percent {
                self.fleet_host_cpu_usage_percent
                    .with_label_values(labels)
                    .set(cpu);
            }
            if let Some(mem) = &host.metrics.memory {
                self.fleet_host_memory_used_mb
                    .with_label_values(labels)
                    .set(mem.used_mb as f64);
                self.fleet_host_memory_total_mb
                    .with_label_values(labels)
                    .set(mem.total_mb as f64);
                self.fleet_host_memory_usage_percent
                    .with_label_values(labels)
                    .set(mem.percent);
            }
            if let Some(load) = host.metrics.load_1m {
                self.fleet_host_load1.with_label_values(labels).set(load);
            }
            if let Some(disk) = &host.metrics.disk_io {
                self.fleet_host_disk_read_bytes_total
                    .with_label_values(labels)
                    .set(disk.read_bytes as f64);
                self.fleet_host_disk_written_bytes_total
                    .with_label_values(labels)
                    .set(disk.write_bytes as f64);
            }
            if let Some(net) = &host.metrics.network_io {
                self.fleet_host_net_rx_bytes_total
                    .with_label_values(labels)
                    .set(net.rx_bytes as f64);
                self.fleet_host_net_tx_bytes_total
                    .with_label_values(labels)
                    .set(net.tx_bytes as f64);
            }
        }

        let configured = snapshot.hosts.len() as f64;
        self.fleet_hosts_configured.set(configured);
        self.fleet_hosts_up.set(up as f64);
        self.fleet_hosts_down.set(configured - up as f64);
        self.fleet_last_cycle_timestamp_seconds
            .set(snapshot.generated_at_unix as f64);
    }

    pub fn observe_cycle(&self, duration: Duration) {
        self.fleet_cycle_duration_seconds.set(duration.as_secs_f64());
    }

    pub fn inc_collect_error(&self, host: &str) {
        self.fleet_collect_errors_total
            .with_label_values(&[host])
            .inc();
    }

    pub fn inc_scrape_count(&self) {
        self.fleet_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn register<C>(registry: &Registry, collector: &C) -> Result<(), prometheus::Error>
where
    C: Collector + Clone + 'static,
{
    registry.register(Box::new(collector.clone()))
}
