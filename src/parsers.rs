//! Parsers for remote probe output.
//!
//! Each parser is a pure function from raw command text to an optional
//! metric value. Malformed or missing output yields `None`, never an error:
//! a reachable host that prints something unexpected loses one field, not
//! its whole snapshot.

use crate::state::{DiskIo, MemoryUsage, NetworkIo};

/// Parses the `Cpu(s):` summary line of `top -bn1` and returns the busy
/// percentage as `100 - idle`, rounded to one decimal.
///
/// Handles both the `85.6%id` and the newer `85.6 id` column layouts.
pub fn cpu_percent(raw: &str) -> Option<f64> {
    let line = raw
        .lines()
        .find(|l| l.to_ascii_lowercase().contains("cpu(s)"))?;
    let (_, rest) = line.split_once(':')?;

    let idle = rest.split(',').find_map(|field| {
        let value = field.trim().strip_suffix("id")?.trim_end();
        let value = value.strip_suffix('%').unwrap_or(value).trim_end();
        value.parse::<f64>().ok()
    })?;

    if !(0.0..=100.0).contains(&idle) {
        return None;
    }
    Some(((100.0 - idle) * 10.0).round() / 10.0)
}

/// Parses the `Mem:` row of `free -m` (total and used, in MB).
pub fn memory_usage(raw: &str) -> Option<MemoryUsage> {
    let line = raw
        .lines()
        .find(|l| l.trim_start().to_ascii_lowercase().starts_with("mem"))?;
    let (_, rest) = line.split_once(':')?;

    let mut fields = rest.split_whitespace();
    let total_mb = fields.next()?.parse::<u64>().ok()?;
    let used_mb = fields.next()?.parse::<u64>().ok()?;
    MemoryUsage::from_mb(used_mb, total_mb)
}

/// Parses the 1-minute load average from `uptime` output, falling back to
/// the bare `/proc/loadavg` layout when no `load average:` marker is found.
pub fn load_1m(raw: &str) -> Option<f64> {
    let line = raw.lines().find(|l| !l.trim().is_empty())?;

    // "load averages:" is the BSD spelling; find() matches both.
    if let Some(idx) = line.to_ascii_lowercase().find("load average") {
        let (_, values) = line[idx..].split_once(':')?;
        return values.split_whitespace().next().and_then(parse_load_figure);
    }

    // "0.52 0.34 0.28 3/1234 56789"
    line.split_whitespace().next().and_then(parse_load_figure)
}

// Some locales print "0,52" and uptime separates figures with commas.
fn parse_load_figure(field: &str) -> Option<f64> {
    field
        .trim()
        .trim_end_matches(',')
        .replace(',', ".")
        .parse()
        .ok()
}

/// Parses `/proc/diskstats` for the first whole-disk device and returns its
/// cumulative read/write counters (sectors x 512) in bytes.
pub fn disk_io(raw: &str) -> Option<DiskIo> {
    for line in raw.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 || !is_whole_disk(fields[2]) {
            continue;
        }
        match (fields[5].parse::<u64>(), fields[9].parse::<u64>()) {
            (Ok(sectors_read), Ok(sectors_written)) => {
                return Some(DiskIo {
                    read_bytes: sectors_read.saturating_mul(512),
                    write_bytes: sectors_written.saturating_mul(512),
                })
            }
            _ => continue,
        }
    }
    None
}

fn is_whole_disk(device: &str) -> bool {
    if let Some(rest) = device.strip_prefix("nvme") {
        // nvme0n1 is a disk, nvme0n1p1 is a partition
        return rest.contains('n') && !rest.contains('p');
    }
    (device.starts_with("sd") || device.starts_with("vd"))
        && !device.ends_with(|c: char| c.is_ascii_digit())
}

/// Parses `/proc/net/dev` and sums cumulative rx/tx byte counters across
/// all non-loopback interfaces.
pub fn network_io(raw: &str) -> Option<NetworkIo> {
    let mut rx_bytes: u64 = 0;
    let mut tx_bytes: u64 = 0;
    let mut seen_iface = false;

    for line in raw.lines() {
        let Some((iface, stats)) = line.trim().split_once(':') else {
            continue;
        };
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = stats.split_whitespace().collect();
        if fields.len() < 9 {
            continue;
        }
        rx_bytes = rx_bytes.saturating_add(fields[0].parse().unwrap_or(0));
        tx_bytes = tx_bytes.saturating_add(fields[8].parse().unwrap_or(0));
        seen_iface = true;
    }

    seen_iface.then_some(NetworkIo { rx_bytes, tx_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOP_OLD: &str = "top - 12:00:01 up 10 days,  1:02,  1 user,  load average: 0.52, 0.58, 0.59\n\
Tasks: 120 total,   1 running, 119 sleeping,   0 stopped,   0 zombie\n\
Cpu(s): 12.3%us,  2.1%sy,  0.0%ni, 85.6%id,  0.0%wa,  0.0%hi,  0.0%si,  0.0%st\n";

    const TOP_NEW: &str =
        "%Cpu(s): 12.3 us,  2.1 sy,  0.0 ni, 85.6 id,  0.0 wa,  0.0 hi,  0.0 si,  0.0 st\n";

    #[test]
    fn cpu_percent_is_hundred_minus_idle() {
        let pct = cpu_percent(TOP_OLD).expect("idle column present");
        assert!((pct - 14.4).abs() < 1e-9);
    }

    #[test]
    fn cpu_percent_handles_spaced_columns() {
        let pct = cpu_percent(TOP_NEW).expect("idle column present");
        assert!((pct - 14.4).abs() < 1e-9);
    }

    #[test]
    fn cpu_percent_rejects_missing_idle() {
        assert_eq!(cpu_percent("Cpu(s): 12.3%us, 2.1%sy"), None);
        assert_eq!(cpu_percent("no cpu line here"), None);
        assert_eq!(cpu_percent(""), None);
    }

    #[test]
    fn cpu_percent_rejects_out_of_range_idle() {
        assert_eq!(cpu_percent("Cpu(s): 1.0%us, 120.0%id"), None);
    }

    #[test]
    fn memory_parses_free_dash_m_row() {
        let raw = "              total        used        free      shared  buff/cache   available\n\
Mem:            2048        1800         248          10         120         180\n\
Swap:           1024           0        1024\n";
        let mem = memory_usage(raw).expect("mem row present");
        assert_eq!(mem.total_mb, 2048);
        assert_eq!(mem.used_mb, 1800);
        assert!((mem.percent - 87.9).abs() < f64::EPSILON);
    }

    #[test]
    fn memory_parses_bare_row() {
        let mem = memory_usage("Mem: 2048 1800 248").expect("mem row present");
        assert_eq!(mem.used_mb, 1800);
        assert_eq!(mem.total_mb, 2048);
        assert!((mem.percent - 87.9).abs() < f64::EPSILON);
    }

    #[test]
    fn memory_with_zero_total_is_none() {
        assert_eq!(memory_usage("Mem: 0 0 0"), None);
    }

    #[test]
    fn memory_with_garbage_is_none() {
        assert_eq!(memory_usage("Mem: lots some few"), None);
        assert_eq!(memory_usage(""), None);
    }

    #[test]
    fn load_from_uptime_line() {
        let raw = " 12:00:01 up 10 days,  1:02,  1 user,  load average: 0.52, 0.58, 0.59";
        let load = load_1m(raw).expect("load figure present");
        assert!((load - 0.52).abs() < 1e-9);
    }

    #[test]
    fn load_tolerates_decimal_comma_locale() {
        let raw = " 12:00:01 up 10 days,  load average: 0,52, 0,58, 0,59";
        let load = load_1m(raw).expect("load figure present");
        assert!((load - 0.52).abs() < 1e-9);
    }

    #[test]
    fn load_from_proc_loadavg() {
        let load = load_1m("0.52 0.34 0.28 3/1234 56789").expect("load figure present");
        assert!((load - 0.52).abs() < 1e-9);
    }

    #[test]
    fn load_from_bsd_uptime() {
        let raw = "12:00  up 10 days, 1:02, 1 user, load averages: 1.20 1.10 1.00";
        let load = load_1m(raw).expect("load figure present");
        assert!((load - 1.2).abs() < 1e-9);
    }

    #[test]
    fn load_with_garbage_is_none() {
        assert_eq!(load_1m("completely unrelated text"), None);
        assert_eq!(load_1m(""), None);
    }

    const DISKSTATS: &str = "\
   7       0 loop0 55 0 2250 40 0 0 0 0 0 40 40 0 0 0 0 0 0
 259       0 nvme0n1 123456 789 2000000 4000 65432 100 1000000 9000 0 13000 13000 0 0 0 0 0 0
 259       1 nvme0n1p1 1000 0 8000 10 500 0 4000 20 0 30 30 0 0 0 0 0 0
";

    #[test]
    fn disk_io_picks_whole_disk_and_converts_sectors() {
        let io = disk_io(DISKSTATS).expect("whole disk present");
        assert_eq!(io.read_bytes, 2_000_000 * 512);
        assert_eq!(io.write_bytes, 1_000_000 * 512);
    }

    #[test]
    fn disk_io_skips_partitions_and_loop_devices() {
        let raw = "   7       0 loop0 55 0 2250 40 0 0 0 0 0 40 40 0 0 0 0 0 0\n\
   8       1 sda1 1000 0 8000 10 500 0 4000 20 0 30 30 0 0 0 0 0 0\n";
        assert_eq!(disk_io(raw), None);
    }

    #[test]
    fn disk_io_accepts_sd_devices() {
        let raw = "   8       0 sda 1000 0 8000 10 500 0 4000 20 0 30 30 0 0 0 0 0 0\n";
        let io = disk_io(raw).expect("sda is a whole disk");
        assert_eq!(io.read_bytes, 8000 * 512);
        assert_eq!(io.write_bytes, 4000 * 512);
    }

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  200000     500    0    0    0     0          0         0  200000    500    0    0    0     0       0          0
  eth0: 1000000    1000    0    0    0     0          0         0  500000    800    0    0    0     0       0          0
  eth1:  250000     400    0    0    0     0          0         0  125000    200    0    0    0     0       0          0
";

    #[test]
    fn network_io_sums_non_loopback_interfaces() {
        let io = network_io(NET_DEV).expect("interfaces present");
        assert_eq!(io.rx_bytes, 1_250_000);
        assert_eq!(io.tx_bytes, 625_000);
    }

    #[test]
    fn network_io_without_interfaces_is_none() {
        let lo_only = "    lo:  200000 500 0 0 0 0 0 0  200000 500 0 0 0 0 0 0\n";
        assert_eq!(network_io(lo_only), None);
        assert_eq!(network_io("garbage"), None);
    }

    #[test]
    fn parsers_are_idempotent() {
        assert_eq!(cpu_percent(TOP_OLD), cpu_percent(TOP_OLD));
        assert_eq!(disk_io(DISKSTATS), disk_io(DISKSTATS));
        assert_eq!(network_io(NET_DEV), network_io(NET_DEV));
    }
}
