//! Host metric provider backed by `sysinfo`.

use crate::error::{Result, SystemError};
use crate::metrics::traits::{
    FsStats, HostDescription, MemoryStats, MetricsProvider, NetStats, ProcStats, TemperatureStats,
};
use async_trait::async_trait;
use std::time::Instant;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, Networks, ProcessRefreshKind,
    ProcessesToUpdate, RefreshKind, System,
};
use tokio::sync::Mutex;

/// Sensor labels that identify the CPU package temperature.
const CPU_SENSOR_LABELS: [&str; 5] = ["cpu", "package", "tctl", "tdie", "soc"];

/// Name prefixes of bridges, container links and other virtual interfaces.
const VIRTUAL_IFACE_PREFIXES: [&str; 7] =
    ["docker", "br-", "veth", "virbr", "vmnet", "ifb", "tun"];

#[cfg(target_os = "linux")]
const ROUTE_TABLE: &str = "/proc/net/route";

struct NetworkState {
    networks: Networks,
    last_refresh: Instant,
}

/// Reads host metrics through persistent `sysinfo` handles.
///
/// Handles are kept between calls so CPU usage and network throughput have a
/// baseline to diff against. Each handle sits behind its own lock, so a slow
/// disk scan never holds up a CPU read.
pub struct SysinfoProvider {
    system: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<NetworkState>,
    components: Mutex<Components>,
}

impl SysinfoProvider {
    /// Create a provider and take the initial baseline refresh.
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything())
            .with_processes(ProcessRefreshKind::nothing().with_cpu().with_memory());

        let system = System::new_with_specifics(refresh_kind);

        Self {
            system: Mutex::new(system),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(NetworkState {
                networks: Networks::new_with_refreshed_list(),
                last_refresh: Instant::now(),
            }),
            components: Mutex::new(Components::new_with_refreshed_list()),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn is_cpu_sensor(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    CPU_SENSOR_LABELS.iter().any(|needle| label.contains(needle))
}

/// What is known about an interface when choosing the host's primary one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct InterfaceFacts {
    default_route: bool,
    loopback: bool,
    has_address: bool,
}

/// Lower ranks come first: the default-route interface, then physical
/// interfaces with an address, then virtual ones, then unaddressed ones,
/// and loopback last.
fn interface_rank(name: &str, facts: InterfaceFacts) -> u8 {
    if facts.default_route {
        0
    } else if facts.loopback {
        4
    } else if !facts.has_address {
        3
    } else if VIRTUAL_IFACE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
    {
        2
    } else {
        1
    }
}

/// Order interfaces so the host's primary one is first; names break ties.
fn order_interfaces(mut entries: Vec<(NetStats, InterfaceFacts)>) -> Vec<NetStats> {
    entries.sort_by(|(a, a_facts), (b, b_facts)| {
        interface_rank(&a.iface, *a_facts)
            .cmp(&interface_rank(&b.iface, *b_facts))
            .then_with(|| a.iface.cmp(&b.iface))
    });
    entries.into_iter().map(|(stats, _)| stats).collect()
}

fn is_loopback_name(name: &str) -> bool {
    name.strip_prefix("lo")
        .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
}

/// Interface carrying the default route in a `/proc/net/route` table.
fn default_route_interface(route_table: &str) -> Option<String> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [iface, destination, _, _, _, _, _, mask, ..]
                if *destination == "00000000" && *mask == "00000000" =>
            {
                Some(iface.to_string())
            }
            _ => None,
        }
    })
}

#[cfg(target_os = "linux")]
fn read_default_route() -> Option<String> {
    std::fs::read_to_string(ROUTE_TABLE)
        .ok()
        .and_then(|table| default_route_interface(&table))
}

#[cfg(not(target_os = "linux"))]
fn read_default_route() -> Option<String> {
    None
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    async fn cpu_load(&self) -> Result<f64> {
        let mut sys = self.system.lock().await;
        sys.refresh_cpu_usage();

        if sys.cpus().is_empty() {
            return Err(SystemError::provider_error("No CPU information available"));
        }

        Ok(sys.global_cpu_usage() as f64)
    }

    async fn memory(&self) -> Result<MemoryStats> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(SystemError::provider_error("Total memory reported as zero"));
        }

        Ok(MemoryStats {
            total,
            active: total.saturating_sub(sys.available_memory()),
        })
    }

    async fn temperature(&self) -> Result<TemperatureStats> {
        let mut components = self.components.lock().await;
        components.refresh(true);

        let main = components
            .iter()
            .filter(|c| is_cpu_sensor(c.label()))
            .find_map(|c| c.temperature())
            .filter(|t| t.is_finite())
            .map(f64::from);

        Ok(TemperatureStats { main })
    }

    async fn file_systems(&self) -> Result<Vec<FsStats>> {
        let mut disks = self.disks.lock().await;
        disks.refresh(true);

        Ok(disks
            .list()
            .iter()
            .map(|disk| {
                let size = disk.total_space();
                FsStats {
                    mount: disk.mount_point().to_string_lossy().into_owned(),
                    size,
                    used: size.saturating_sub(disk.available_space()),
                }
            })
            .collect())
    }

    async fn network_stats(&self) -> Result<Vec<NetStats>> {
        let mut state = self.networks.lock().await;
        state.networks.refresh(true);

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refresh).as_secs_f64();
        state.last_refresh = now;

        // received()/transmitted() are deltas since the previous refresh
        let per_sec = |bytes: u64| {
            if elapsed > 0.0 {
                bytes as f64 / elapsed
            } else {
                0.0
            }
        };

        let default_route = read_default_route();
        let entries = state
            .networks
            .list()
            .iter()
            .map(|(name, data)| {
                let addresses = data.ip_networks();
                let facts = InterfaceFacts {
                    default_route: default_route.as_deref() == Some(name.as_str()),
                    loopback: is_loopback_name(name)
                        || (!addresses.is_empty()
                            && addresses.iter().all(|net| net.addr.is_loopback())),
                    has_address: !addresses.is_empty(),
                };
                let stats = NetStats {
                    iface: name.clone(),
                    rx_sec: per_sec(data.received()),
                    tx_sec: per_sec(data.transmitted()),
                };
                (stats, facts)
            })
            .collect();

        Ok(order_interfaces(entries))
    }

    async fn processes(&self) -> Result<Vec<ProcStats>> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cpu().with_memory(),
        );

        let cores = sys.cpus().len().max(1) as f64;
        let total_memory = sys.total_memory();

        Ok(sys
            .processes()
            .values()
            .map(|p| ProcStats {
                pid: p.pid().as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                cpu: p.cpu_usage() as f64 / cores,
                mem: if total_memory > 0 {
                    p.memory() as f64 / total_memory as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect())
    }

    async fn host_description(&self) -> Result<HostDescription> {
        let mut sys = self.system.lock().await;
        sys.refresh_memory();

        let cpu_model = sys
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_string())
            .filter(|brand| !brand.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(HostDescription {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_model,
            cpu_cores: sys.cpus().len(),
            total_memory: sys.total_memory(),
        })
    }

    fn uptime(&self) -> u64 {
        System::uptime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_sensor_labels() {
        assert!(is_cpu_sensor("coretemp Package id 0"));
        assert!(is_cpu_sensor("k10temp Tctl"));
        assert!(is_cpu_sensor("cpu_thermal temp1"));
        assert!(!is_cpu_sensor("nvme Composite"));
        assert!(!is_cpu_sensor("acpitz temp1"));
    }

    #[tokio::test]
    async fn test_host_description() {
        let provider = SysinfoProvider::new();
        let host = provider.host_description().await.unwrap();

        assert!(!host.hostname.is_empty());
        assert_eq!(host.platform, std::env::consts::OS);
        assert_eq!(host.arch, std::env::consts::ARCH);
        assert!(host.cpu_cores > 0);
        assert!(host.total_memory > 0);
    }

    fn iface(name: &str) -> NetStats {
        NetStats {
            iface: name.to_string(),
            rx_sec: 0.0,
            tx_sec: 0.0,
        }
    }

    fn addressed() -> InterfaceFacts {
        InterfaceFacts {
            has_address: true,
            ..Default::default()
        }
    }

    fn names(stats: &[NetStats]) -> Vec<&str> {
        stats.iter().map(|s| s.iface.as_str()).collect()
    }

    #[test]
    fn test_loopback_ordered_last() {
        let loopback = InterfaceFacts {
            loopback: true,
            has_address: true,
            ..Default::default()
        };
        let ordered = order_interfaces(vec![
            (iface("lo"), loopback),
            (iface("wlan0"), addressed()),
        ]);
        assert_eq!(names(&ordered), ["wlan0", "lo"]);
    }

    #[test]
    fn test_physical_interface_before_bridge() {
        let ordered = order_interfaces(vec![
            (iface("docker0"), addressed()),
            (iface("eth0"), addressed()),
        ]);
        assert_eq!(names(&ordered), ["eth0", "docker0"]);
    }

    #[test]
    fn test_default_route_wins() {
        let routed = InterfaceFacts {
            default_route: true,
            has_address: true,
            ..Default::default()
        };
        let ordered = order_interfaces(vec![
            (iface("eth0"), addressed()),
            (iface("wlp2s0"), routed),
            (iface("enp3s0"), InterfaceFacts::default()),
        ]);
        assert_eq!(names(&ordered), ["wlp2s0", "eth0", "enp3s0"]);
    }

    #[test]
    fn test_names_break_ties() {
        let ordered = order_interfaces(vec![
            (iface("eth1"), addressed()),
            (iface("eth0"), addressed()),
        ]);
        assert_eq!(names(&ordered), ["eth0", "eth1"]);
    }

    #[test]
    fn test_loopback_names() {
        assert!(is_loopback_name("lo"));
        assert!(is_loopback_name("lo0"));
        assert!(!is_loopback_name("lowpan0"));
        assert!(!is_loopback_name("eth0"));
    }

    #[test]
    fn test_default_route_from_route_table() {
        let table = "\
Iface\tDestination\tGateway \tFlags\tRefCnt\tUse\tMetric\tMask\t\tMTU\tWindow\tIRTT
docker0\t000011AC\t00000000\t0001\t0\t0\t0\t0000FFFF\t0\t0\t0
wlan0\t00000000\t0101A8C0\t0003\t0\t0\t600\t00000000\t0\t0\t0
wlan0\t0001A8C0\t00000000\t0001\t0\t0\t600\t00FFFFFF\t0\t0\t0
";
        assert_eq!(default_route_interface(table).as_deref(), Some("wlan0"));
        assert_eq!(default_route_interface("Iface\tDestination\n"), None);
    }

    #[tokio::test]
    async fn test_loopback_never_first_when_others_exist() {
        let provider = SysinfoProvider::new();
        let stats = provider.network_stats().await.unwrap();

        if stats.len() > 1 {
            assert!(!is_loopback_name(&stats[0].iface));
        }
    }

    #[tokio::test]
    async fn test_processes_include_self() {
        let provider = SysinfoProvider::new();
        let procs = provider.processes().await.unwrap();

        let me = std::process::id();
        assert!(procs.iter().any(|p| p.pid == me));
        assert!(procs.iter().all(|p| p.cpu >= 0.0 && p.mem >= 0.0));
    }
}
