//! Data providers behind each optional capability.
//!
//! Every provider is a narrow, synchronous query interface. Each query
//! returns its own [`QueryResult`] so that a section can degrade a single
//! field without losing its siblings.

pub mod cpuid;
pub mod gpu;
pub mod management;
pub mod runtime;

use std::fmt;
use std::time::Duration;

use crate::error::QueryResult;

// ── Runtime metrics ────────────────────────────────────────

/// Boot time, CPU, memory, disks, network, sessions, processes and sensors.
pub trait RuntimeMetrics {
    /// Boot time as seconds since the Unix epoch.
    fn boot_time(&self) -> QueryResult<u64>;
    fn uptime(&self) -> QueryResult<u64>;
    fn cpu_counts(&self) -> QueryResult<CpuCounts>;
    fn cpu_frequency(&self) -> QueryResult<CpuFrequency>;
    /// Blocks for at least `window` to measure utilization.
    fn cpu_usage(&self, window: Duration) -> QueryResult<CpuUsage>;
    fn virtual_memory(&self) -> QueryResult<VirtualMemory>;
    fn swap_memory(&self) -> QueryResult<SwapMemory>;
    fn partitions(&self) -> QueryResult<Vec<Partition>>;
    fn disk_io(&self) -> QueryResult<DiskIo>;
    fn interfaces(&self) -> QueryResult<Vec<Interface>>;
    fn net_io(&self) -> QueryResult<NetIo>;
    fn connection_count(&self) -> QueryResult<usize>;
    fn sessions(&self) -> QueryResult<Vec<Session>>;
    /// Samples every process (not its threads) over `window`. Processes
    /// that fail to sample come back as individual errors.
    fn processes(&self, window: Duration) -> QueryResult<Vec<QueryResult<ProcessSample>>>;
    fn temperatures(&self) -> QueryResult<Vec<TemperatureReading>>;
    fn fans(&self) -> QueryResult<Vec<FanReading>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuCounts {
    pub physical: Option<usize>,
    pub logical: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuFrequency {
    pub current_mhz: u64,
    pub max_mhz: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    pub total_percent: f32,
    pub per_core: Vec<f32>,
    /// The window actually measured, which may exceed the requested one.
    pub window: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualMemory {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
}

impl VirtualMemory {
    pub fn new(total: u64, available: u64, used: u64) -> Self {
        Self {
            total,
            available,
            used,
            percent: percent_of(total.saturating_sub(available), total),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapMemory {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
}

impl SwapMemory {
    pub fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used,
            percent: percent_of(used, total),
        }
    }
}

#[derive(Debug)]
pub struct Partition {
    pub device: String,
    pub mount_point: String,
    pub fs_type: String,
    pub usage: QueryResult<DiskUsage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

impl DiskUsage {
    pub fn new(total: u64, free: u64) -> Self {
        let used = total.saturating_sub(free);
        Self {
            total,
            used,
            free,
            percent: percent_of(used, used + free),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interface {
    pub name: String,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub family: AddressFamily,
    pub address: String,
    pub netmask: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Ipv4,
    Ipv6,
    Link,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
            AddressFamily::Link => write!(f, "MAC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetIo {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub name: String,
    pub terminal: Option<String>,
    pub host: Option<String>,
    /// `YYYY-MM-DD HH:MM:SS` when the source format is recognised,
    /// otherwise the raw text.
    pub started: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub username: Option<String>,
    pub cpu_percent: f32,
    pub memory_resident_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureReading {
    pub label: String,
    pub current: Option<f32>,
    pub high: Option<f32>,
    pub critical: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanReading {
    pub chip: String,
    pub label: String,
    pub rpm: u64,
}

// ── CPU identification ─────────────────────────────────────

pub trait CpuId {
    fn identify(&self) -> QueryResult<CpuIdentity>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuIdentity {
    pub brand: Option<String>,
    pub arch: Option<String>,
    pub bits: Option<u32>,
    /// Friendly advertised clock, e.g. `2.6000 GHz`.
    pub hz_advertised: Option<String>,
}

// ── GPU metrics ────────────────────────────────────────────

pub trait GpuMetrics {
    fn gpus(&self) -> QueryResult<Vec<GpuReading>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuReading {
    pub index: u32,
    pub uuid: Option<String>,
    pub name: String,
    /// Utilization as a fraction in `0.0..=1.0`.
    pub load: Option<f32>,
    pub memory_total_mb: Option<f64>,
    pub memory_used_mb: Option<f64>,
    pub temperature_c: Option<f32>,
}

// ── Management instrumentation ─────────────────────────────

/// Services, installed software and firmware inventory.
pub trait Management {
    fn services(&self) -> QueryResult<Vec<ServiceRecord>>;
    /// Lazily enumerated; callers may stop early.
    fn installed_products(&self) -> QueryResult<Box<dyn Iterator<Item = ProductRecord> + '_>>;
    fn bios(&self) -> QueryResult<Vec<BiosRecord>>;
    fn baseboards(&self) -> QueryResult<Vec<BoardRecord>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    pub name: String,
    pub state: Option<String>,
    pub start_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub name: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiosRecord {
    pub manufacturer: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardRecord {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let pct = part as f64 / whole as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}
