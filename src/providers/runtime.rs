//! Runtime metrics backed by `sysinfo`.
//!
//! `sysinfo` covers CPU, memory, disks, interfaces, processes and
//! temperatures and disk IO. The remaining fields come from platform sources:
//! - Linux: /proc/net/*, /sys/class/hwmon, cpufreq sysfs
//! - elsewhere: netstat, who, `query user`

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDateTime;
use sysinfo::{
    Components, Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind,
    Users, MINIMUM_CPU_UPDATE_INTERVAL,
};
use tracing::debug;

use super::*;
use crate::cmd;
use crate::error::{ProbeError, QueryError, QueryResult};
use crate::report::TIMESTAMP_FORMAT;

/// Stateless handle: every query builds the `sysinfo` view it needs.
#[derive(Debug)]
pub struct SysinfoRuntime;

impl SysinfoRuntime {
    pub fn probe() -> Result<Self, ProbeError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProbeError::Unsupported(std::env::consts::OS));
        }
        Ok(Self)
    }
}

impl RuntimeMetrics for SysinfoRuntime {
    fn boot_time(&self) -> QueryResult<u64> {
        match System::boot_time() {
            0 => Err(QueryError::Missing("boot time")),
            secs => Ok(secs),
        }
    }

    fn uptime(&self) -> QueryResult<u64> {
        Ok(System::uptime())
    }

    fn cpu_counts(&self) -> QueryResult<CpuCounts> {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        if sys.cpus().is_empty() {
            return Err(QueryError::Missing("CPU list"));
        }
        Ok(CpuCounts {
            physical: System::physical_core_count(),
            logical: sys.cpus().len(),
        })
    }

    fn cpu_frequency(&self) -> QueryResult<CpuFrequency> {
        let mut sys = System::new();
        sys.refresh_cpu_frequency();
        let current_mhz = sys
            .cpus()
            .first()
            .map(|c| c.frequency())
            .ok_or(QueryError::Missing("CPU frequency"))?;
        Ok(CpuFrequency {
            current_mhz,
            max_mhz: max_frequency_mhz(),
        })
    }

    fn cpu_usage(&self, window: Duration) -> QueryResult<CpuUsage> {
        let window = window.max(MINIMUM_CPU_UPDATE_INTERVAL);
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        std::thread::sleep(window);
        sys.refresh_cpu_usage();

        if sys.cpus().is_empty() {
            return Err(QueryError::Missing("CPU usage"));
        }
        Ok(CpuUsage {
            total_percent: sys.global_cpu_usage(),
            per_core: sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            window,
        })
    }

    fn virtual_memory(&self) -> QueryResult<VirtualMemory> {
        let mut sys = System::new();
        sys.refresh_memory();
        if sys.total_memory() == 0 {
            return Err(QueryError::Missing("memory totals"));
        }
        Ok(VirtualMemory::new(
            sys.total_memory(),
            sys.available_memory(),
            sys.used_memory(),
        ))
    }

    fn swap_memory(&self) -> QueryResult<SwapMemory> {
        let mut sys = System::new();
        sys.refresh_memory();
        Ok(SwapMemory::new(sys.total_swap(), sys.used_swap()))
    }

    fn partitions(&self) -> QueryResult<Vec<Partition>> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .list()
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                Partition {
                    device: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().display().to_string(),
                    fs_type: disk.file_system().to_string_lossy().into_owned(),
                    usage: if total == 0 {
                        Err(QueryError::Missing("disk usage"))
                    } else {
                        Ok(DiskUsage::new(total, disk.available_space()))
                    },
                }
            })
            .collect())
    }

    fn disk_io(&self) -> QueryResult<DiskIo> {
        let disks = Disks::new_with_refreshed_list();
        if disks.list().is_empty() {
            return Err(QueryError::Missing("disk list"));
        }
        Ok(sum_disk_io(disks.list().iter().map(|disk| {
            let usage = disk.usage();
            (
                disk.name().to_string_lossy().into_owned(),
                usage.total_read_bytes,
                usage.total_written_bytes,
            )
        })))
    }

    fn interfaces(&self) -> QueryResult<Vec<Interface>> {
        let networks = Networks::new_with_refreshed_list();
        Ok(networks
            .list()
            .iter()
            .map(|(name, data)| {
                let mut addresses: Vec<Address> = data
                    .ip_networks()
                    .iter()
                    .map(|net| Address {
                        family: match net.addr {
                            IpAddr::V4(_) => AddressFamily::Ipv4,
                            IpAddr::V6(_) => AddressFamily::Ipv6,
                        },
                        address: net.addr.to_string(),
                        netmask: Some(netmask(net.addr, net.prefix)),
                    })
                    .collect();
                let mac = data.mac_address();
                if !mac.is_unspecified() {
                    addresses.push(Address {
                        family: AddressFamily::Link,
                        address: mac.to_string(),
                        netmask: None,
                    });
                }
                Interface {
                    name: name.clone(),
                    addresses,
                }
            })
            .collect())
    }

    fn net_io(&self) -> QueryResult<NetIo> {
        let networks = Networks::new_with_refreshed_list();
        let (sent, recv) = networks
            .list()
            .values()
            .fold((0u64, 0u64), |(s, r), data| {
                (s + data.total_transmitted(), r + data.total_received())
            });
        Ok(NetIo {
            bytes_sent: sent,
            bytes_recv: recv,
        })
    }

    #[cfg(target_os = "linux")]
    fn connection_count(&self) -> QueryResult<usize> {
        let mut total = 0;
        let mut read_any = false;
        for table in ["/proc/net/tcp", "/proc/net/tcp6", "/proc/net/udp", "/proc/net/udp6"] {
            match cmd::read_file(table) {
                Ok(content) => {
                    read_any = true;
                    total += count_proc_net_entries(&content);
                }
                Err(e) => debug!(table, error = %e, "skipping socket table"),
            }
        }
        if read_any {
            Ok(total)
        } else {
            Err(QueryError::Missing("socket tables"))
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn connection_count(&self) -> QueryResult<usize> {
        let output = cmd::run("netstat", &["-an"])?;
        Ok(count_netstat_entries(&output))
    }

    #[cfg(unix)]
    fn sessions(&self) -> QueryResult<Vec<Session>> {
        let output = cmd::run("who", &[])?;
        Ok(parse_who(&output))
    }

    #[cfg(windows)]
    fn sessions(&self) -> QueryResult<Vec<Session>> {
        let output = cmd::run("query", &["user"])?;
        Ok(parse_query_user(&output))
    }

    #[cfg(not(any(unix, windows)))]
    fn sessions(&self) -> QueryResult<Vec<Session>> {
        Err(QueryError::Unsupported)
    }

    fn processes(&self, window: Duration) -> QueryResult<Vec<QueryResult<ProcessSample>>> {
        // Linux lists every thread as a task of its own; one multi-threaded
        // program would otherwise fill the rankings with copies of its RSS.
        let refresh = ProcessRefreshKind::nothing()
            .without_tasks()
            .with_cpu()
            .with_memory()
            .with_user(UpdateKind::OnlyIfNotSet);

        let mut sys = System::new();
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh);
        let pids: Vec<_> = sys
            .processes()
            .iter()
            .filter(|(_, p)| p.thread_kind().is_none())
            .map(|(pid, _)| *pid)
            .collect();
        if pids.is_empty() {
            return Err(QueryError::Missing("process list"));
        }

        std::thread::sleep(window.max(MINIMUM_CPU_UPDATE_INTERVAL));
        sys.refresh_processes_specifics(ProcessesToUpdate::All, true, refresh);

        let users = Users::new_with_refreshed_list();
        Ok(pids
            .into_iter()
            .map(|pid| -> QueryResult<ProcessSample> {
                let process = sys
                    .process(pid)
                    .ok_or(QueryError::Vanished(pid.as_u32()))?;
                Ok(ProcessSample {
                    pid: pid.as_u32(),
                    name: process.name().to_string_lossy().into_owned(),
                    username: process
                        .user_id()
                        .and_then(|uid| users.get_user_by_id(uid))
                        .map(|u| u.name().to_string()),
                    cpu_percent: process.cpu_usage(),
                    memory_resident_bytes: process.memory(),
                })
            })
            .collect())
    }

    fn temperatures(&self) -> QueryResult<Vec<TemperatureReading>> {
        let components = Components::new_with_refreshed_list();
        Ok(components
            .list()
            .iter()
            .map(|c| TemperatureReading {
                label: c.label().to_string(),
                current: c.temperature(),
                high: c.max(),
                critical: c.critical(),
            })
            .collect())
    }

    #[cfg(target_os = "linux")]
    fn fans(&self) -> QueryResult<Vec<FanReading>> {
        read_hwmon_fans(Path::new("/sys/class/hwmon"))
    }

    #[cfg(not(target_os = "linux"))]
    fn fans(&self) -> QueryResult<Vec<FanReading>> {
        Err(QueryError::Unsupported)
    }
}

// ═══════════════════════════════════════════════════════════════
// Helper functions
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "linux")]
fn max_frequency_mhz() -> Option<u64> {
    cmd::read_attr("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq")
        .and_then(|khz| khz.parse::<u64>().ok())
        .map(|khz| khz / 1000)
}

#[cfg(not(target_os = "linux"))]
fn max_frequency_mhz() -> Option<u64> {
    None
}

fn netmask(addr: IpAddr, prefix: u8) -> String {
    match addr {
        IpAddr::V4(_) => {
            let bits = u32::MAX.checked_shl(32 - u32::from(prefix.min(32))).unwrap_or(0);
            Ipv4Addr::from(bits).to_string()
        }
        IpAddr::V6(_) => {
            let bits = u128::MAX.checked_shl(128 - u32::from(prefix.min(128))).unwrap_or(0);
            Ipv6Addr::from(bits).to_string()
        }
    }
}

/// Sum IO counters per device. A device mounted more than once (bind
/// mounts, btrfs subvolumes) is counted once.
fn sum_disk_io(disks: impl Iterator<Item = (String, u64, u64)>) -> DiskIo {
    let mut seen = HashSet::new();
    let mut io = DiskIo {
        read_bytes: 0,
        write_bytes: 0,
    };
    for (device, read, written) in disks {
        if seen.insert(device) {
            io.read_bytes += read;
            io.write_bytes += written;
        }
    }
    io
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn count_proc_net_entries(content: &str) -> usize {
    content
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .count()
}

#[cfg_attr(target_os = "linux", allow(dead_code))]
fn count_netstat_entries(output: &str) -> usize {
    output
        .lines()
        .filter(|l| {
            let proto = l.trim_start().to_lowercase();
            proto.starts_with("tcp") || proto.starts_with("udp")
        })
        .count()
}

/// Parse `who` output. GNU prints ISO dates (`2024-05-01 10:22`), BSD
/// prints `May  1 10:22`; only the former is normalised.
#[cfg_attr(not(unix), allow(dead_code))]
fn parse_who(output: &str) -> Vec<Session> {
    let mut sessions = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (body, host) = match line.rfind('(') {
            Some(open) if line.ends_with(')') => (
                line[..open].trim_end(),
                Some(line[open + 1..line.len() - 1].to_string()).filter(|h| !h.is_empty()),
            ),
            _ => (line, None),
        };

        let mut parts = body.split_whitespace();
        let Some(name) = parts.next() else {
            continue;
        };
        let terminal = parts.next().map(|t| t.to_string());
        let raw_time = parts.collect::<Vec<_>>().join(" ");

        let started = if raw_time.is_empty() {
            None
        } else {
            Some(
                NaiveDateTime::parse_from_str(&raw_time, "%Y-%m-%d %H:%M")
                    .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                    .unwrap_or(raw_time),
            )
        };

        sessions.push(Session {
            name: name.to_string(),
            terminal,
            host,
            started,
        });
    }
    sessions
}

/// Parse `query user` output. Columns are fixed-width under the header;
/// the session name is blank for disconnected sessions and the current
/// session is marked with `>`.
#[cfg_attr(not(windows), allow(dead_code))]
fn parse_query_user(output: &str) -> Vec<Session> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let (Some(session_col), Some(logon_col)) = (header.find("SESSIONNAME"), header.find("LOGON TIME"))
    else {
        return Vec::new();
    };

    let mut sessions = Vec::new();
    for line in lines {
        let Some(name) = line
            .get(..session_col)
            .map(|n| n.trim().trim_start_matches('>').trim())
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let terminal = line
            .get(session_col..logon_col)
            .and_then(|cols| cols.split_whitespace().next())
            .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
            .map(|t| t.to_string());
        let started = line.get(logon_col..).map(str::trim).filter(|t| !t.is_empty()).map(|raw| {
            NaiveDateTime::parse_from_str(raw, "%m/%d/%Y %I:%M %p")
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_else(|_| raw.to_string())
        });

        sessions.push(Session {
            name: name.to_string(),
            terminal,
            host: None,
            started,
        });
    }
    sessions
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn read_hwmon_fans(root: &Path) -> QueryResult<Vec<FanReading>> {
    let entries = std::fs::read_dir(root)
        .map_err(|e| QueryError::io(root.display().to_string(), e))?;

    let mut chips: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    chips.sort();

    let mut fans = Vec::new();
    for chip_dir in chips {
        let chip = cmd::read_attr(chip_dir.join("name")).unwrap_or_else(|| {
            chip_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        let Ok(files) = std::fs::read_dir(&chip_dir) else {
            continue;
        };
        let mut inputs: Vec<String> = files
            .flatten()
            .map(|f| f.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("fan") && n.ends_with("_input"))
            .collect();
        inputs.sort();

        for input in inputs {
            let Some(rpm) = cmd::read_attr(chip_dir.join(&input)).and_then(|v| v.parse().ok())
            else {
                continue;
            };
            let stem = input.trim_end_matches("_input");
            let label = cmd::read_attr(chip_dir.join(format!("{}_label", stem)))
                .unwrap_or_else(|| stem.to_string());
            fans.push(FanReading {
                chip: chip.clone(),
                label,
                rpm,
            });
        }
    }
    Ok(fans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmask_from_prefix() {
        let v4: IpAddr = "192.168.1.10".parse().unwrap();
        let v6: IpAddr = "fe80::1".parse().unwrap();
        assert_eq!(netmask(v4, 24), "255.255.255.0");
        assert_eq!(netmask(v4, 0), "0.0.0.0");
        assert_eq!(netmask(v4, 32), "255.255.255.255");
        assert_eq!(netmask(v6, 64), "ffff:ffff:ffff:ffff::");
    }

    #[test]
    fn disk_io_counts_each_device_once() {
        let io = sum_disk_io(
            vec![
                ("/dev/sda1".to_string(), 1000, 10),
                ("/dev/nvme0n1p2".to_string(), 500, 5),
                ("/dev/sda1".to_string(), 1000, 10),
            ]
            .into_iter(),
        );
        assert_eq!(io.read_bytes, 1500);
        assert_eq!(io.write_bytes, 15);
    }

    #[test]
    fn query_user_parses_fixed_columns() {
        let output = "\
 USERNAME              SESSIONNAME        ID  STATE   IDLE TIME  LOGON TIME
>alice                 console             1  Active      none   3/1/2024 9:15 AM
 bob                                       2  Disc        1:02   3/1/2024 8:05 PM
";
        let sessions = parse_query_user(output);
        assert_eq!(
            sessions,
            vec![
                Session {
                    name: "alice".into(),
                    terminal: Some("console".into()),
                    host: None,
                    started: Some("2024-03-01 09:15:00".into()),
                },
                Session {
                    name: "bob".into(),
                    terminal: None,
                    host: None,
                    started: Some("2024-03-01 20:05:00".into()),
                },
            ]
        );
    }

    #[test]
    fn query_user_without_header_is_empty() {
        assert!(parse_query_user("No User exists for *\n").is_empty());
        assert!(parse_query_user("").is_empty());
    }

    /// `Tgid:` from `/proc/<pid>/status`.
    #[cfg(target_os = "linux")]
    fn thread_group(pid: u32) -> Option<u32> {
        let status = std::fs::read_to_string(format!("/proc/{}/status", pid)).ok()?;
        status
            .lines()
            .find_map(|l| l.strip_prefix("Tgid:"))
            .and_then(|v| v.trim().parse().ok())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn sampled_processes_are_thread_group_leaders() {
        // keep a few extra threads alive in this process while sampling
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let rx = std::sync::Arc::new(std::sync::Mutex::new(rx));
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let rx = rx.clone();
                std::thread::spawn(move || {
                    let _ = rx.lock().map(|r| r.recv());
                })
            })
            .collect();

        let samples = SysinfoRuntime.processes(Duration::ZERO).unwrap();
        drop(tx);
        for w in workers {
            w.join().unwrap();
        }

        let ours = std::process::id();
        let pids: Vec<u32> = samples.iter().flatten().map(|s| s.pid).collect();
        assert!(pids.contains(&ours));
        let threads: Vec<(u32, u32)> = pids
            .iter()
            .filter_map(|&pid| thread_group(pid).map(|tgid| (pid, tgid)))
            .filter(|(pid, tgid)| pid != tgid)
            .collect();
        assert!(threads.is_empty(), "threads sampled as processes: {:?}", threads);
    }

    #[test]
    fn cpu_usage_reports_the_effective_window() {
        let usage = SysinfoRuntime.cpu_usage(Duration::ZERO).unwrap();
        assert_eq!(usage.window, MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[test]
    fn proc_net_skips_header() {
        let content = "  sl  local_address rem_address   st\n   0: 0100007F:0277 00000000:0000 0A\n   1: 00000000:0016 00000000:0000 0A\n";
        assert_eq!(count_proc_net_entries(content), 2);
        assert_eq!(count_proc_net_entries("  sl  local_address\n"), 0);
    }

    #[test]
    fn netstat_counts_socket_rows() {
        let output = "\
Active Internet connections (including servers)
Proto Recv-Q Send-Q  Local Address          Foreign Address        (state)
tcp4       0      0  127.0.0.1.631          *.*                    LISTEN
udp6       0      0  *.5353                 *.*
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING
Active LOCAL (UNIX) domain sockets";
        assert_eq!(count_netstat_entries(output), 3);
    }

    #[test]
    fn who_parses_gnu_format_with_host() {
        let output = "alice    pts/0        2024-05-01 10:22 (10.0.0.5)\nbob      tty1         2024-05-02 08:05\n";
        let sessions = parse_who(output);
        assert_eq!(sessions.len(), 2);
        assert_eq!(
            sessions[0],
            Session {
                name: "alice".into(),
                terminal: Some("pts/0".into()),
                host: Some("10.0.0.5".into()),
                started: Some("2024-05-01 10:22:00".into()),
            }
        );
        assert_eq!(sessions[1].host, None);
        assert_eq!(sessions[1].started.as_deref(), Some("2024-05-02 08:05:00"));
    }

    #[test]
    fn who_keeps_unrecognised_time_verbatim() {
        let sessions = parse_who("carol    console  May  1 10:22 \n");
        assert_eq!(sessions[0].terminal.as_deref(), Some("console"));
        assert_eq!(sessions[0].started.as_deref(), Some("May 1 10:22"));
    }

    #[test]
    fn hwmon_fans_are_read_with_labels() {
        let root = tempfile::tempdir().unwrap();
        let chip = root.path().join("hwmon2");
        std::fs::create_dir(&chip).unwrap();
        std::fs::write(chip.join("name"), "nct6775\n").unwrap();
        std::fs::write(chip.join("fan1_input"), "1180\n").unwrap();
        std::fs::write(chip.join("fan1_label"), "CPU Fan\n").unwrap();
        std::fs::write(chip.join("fan2_input"), "640\n").unwrap();
        std::fs::write(chip.join("temp1_input"), "42000\n").unwrap();

        let fans = read_hwmon_fans(root.path()).unwrap();
        assert_eq!(
            fans,
            vec![
                FanReading {
                    chip: "nct6775".into(),
                    label: "CPU Fan".into(),
                    rpm: 1180
                },
                FanReading {
                    chip: "nct6775".into(),
                    label: "fan2".into(),
                    rpm: 640
                },
            ]
        );
    }

    #[test]
    fn hwmon_missing_root_is_an_io_error() {
        let err = read_hwmon_fans(Path::new("/nonexistent/hwmon")).unwrap_err();
        assert!(matches!(err, QueryError::Io { .. }));
    }
}
