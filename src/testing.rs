//! In-memory providers for exercising sections without a real host.

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::capabilities::Capabilities;
use crate::error::{ProbeError, QueryError, QueryResult};
use crate::platform::{Ambient, PlatformInfo};
use crate::providers::*;
use crate::report::ReportOptions;

/// Shortest CPU window the fake runtime will measure.
pub const FAKE_MIN_CPU_WINDOW: Duration = Duration::from_millis(200);

/// Runtime metrics with fixed readings. Queries named in `failing` return
/// an error instead.
#[derive(Default)]
pub struct FakeRuntime {
    pub failing: HashSet<&'static str>,
    /// `Err(pid)` stands for a process that vanished mid-sample.
    pub processes: Vec<Result<ProcessSample, u32>>,
    pub temperatures: Vec<TemperatureReading>,
    pub fans: Vec<FanReading>,
}

impl FakeRuntime {
    pub fn failing(queries: &[&'static str]) -> Self {
        Self {
            failing: queries.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn check(&self, query: &'static str) -> QueryResult<()> {
        if self.failing.contains(query) {
            Err(QueryError::Missing(query))
        } else {
            Ok(())
        }
    }
}

pub fn sample(pid: u32, name: &str, cpu_percent: f32, memory_resident_bytes: u64) -> ProcessSample {
    ProcessSample {
        pid,
        name: name.to_string(),
        username: Some("tester".into()),
        cpu_percent,
        memory_resident_bytes,
    }
}

impl RuntimeMetrics for FakeRuntime {
    fn boot_time(&self) -> QueryResult<u64> {
        self.check("boot_time")?;
        Ok(1_700_000_000)
    }

    fn uptime(&self) -> QueryResult<u64> {
        self.check("uptime")?;
        Ok(3600)
    }

    fn cpu_counts(&self) -> QueryResult<CpuCounts> {
        self.check("cpu_counts")?;
        Ok(CpuCounts {
            physical: Some(4),
            logical: 8,
        })
    }

    fn cpu_frequency(&self) -> QueryResult<CpuFrequency> {
        self.check("cpu_frequency")?;
        Ok(CpuFrequency {
            current_mhz: 2400,
            max_mhz: Some(3600),
        })
    }

    fn cpu_usage(&self, window: Duration) -> QueryResult<CpuUsage> {
        self.check("cpu_usage")?;
        Ok(CpuUsage {
            total_percent: 12.5,
            per_core: vec![10.0, 15.0],
            window: window.max(FAKE_MIN_CPU_WINDOW),
        })
    }

    fn virtual_memory(&self) -> QueryResult<VirtualMemory> {
        self.check("virtual_memory")?;
        Ok(VirtualMemory::new(16_000, 8_000, 7_000))
    }

    fn swap_memory(&self) -> QueryResult<SwapMemory> {
        self.check("swap_memory")?;
        Ok(SwapMemory::new(4_000, 1_000))
    }

    fn partitions(&self) -> QueryResult<Vec<Partition>> {
        self.check("partitions")?;
        Ok(vec![
            Partition {
                device: "/dev/sda1".into(),
                mount_point: "/".into(),
                fs_type: "ext4".into(),
                usage: Ok(DiskUsage::new(1000, 400)),
            },
            Partition {
                device: "/dev/sr0".into(),
                mount_point: "/media/cdrom".into(),
                fs_type: "iso9660".into(),
                usage: Err(QueryError::Missing("usage")),
            },
        ])
    }

    fn disk_io(&self) -> QueryResult<DiskIo> {
        self.check("disk_io")?;
        Ok(DiskIo {
            read_bytes: 512,
            write_bytes: 1024,
        })
    }

    fn interfaces(&self) -> QueryResult<Vec<Interface>> {
        self.check("interfaces")?;
        Ok(vec![Interface {
            name: "eth0".into(),
            addresses: vec![Address {
                family: AddressFamily::Ipv4,
                address: "192.168.1.10".into(),
                netmask: Some("255.255.255.0".into()),
            }],
        }])
    }

    fn net_io(&self) -> QueryResult<NetIo> {
        self.check("net_io")?;
        Ok(NetIo {
            bytes_sent: 100,
            bytes_recv: 200,
        })
    }

    fn connection_count(&self) -> QueryResult<usize> {
        self.check("connection_count")?;
        Ok(7)
    }

    fn sessions(&self) -> QueryResult<Vec<Session>> {
        self.check("sessions")?;
        Ok(vec![Session {
            name: "alice".into(),
            terminal: Some("pts/0".into()),
            host: None,
            started: Some("2024-03-01 09:15:00".into()),
        }])
    }

    fn processes(&self, _window: Duration) -> QueryResult<Vec<QueryResult<ProcessSample>>> {
        self.check("processes")?;
        Ok(self
            .processes
            .iter()
            .map(|p| p.clone().map_err(QueryError::Vanished))
            .collect())
    }

    fn temperatures(&self) -> QueryResult<Vec<TemperatureReading>> {
        self.check("temperatures")?;
        Ok(self.temperatures.clone())
    }

    fn fans(&self) -> QueryResult<Vec<FanReading>> {
        self.check("fans")?;
        Ok(self.fans.clone())
    }
}

#[derive(Default)]
pub struct FakeCpuId {
    pub fail: bool,
}

impl CpuId for FakeCpuId {
    fn identify(&self) -> QueryResult<CpuIdentity> {
        if self.fail {
            return Err(QueryError::Missing("brand"));
        }
        Ok(CpuIdentity {
            brand: Some("Test CPU @ 2.60GHz".into()),
            arch: Some("x86_64".into()),
            bits: Some(64),
            hz_advertised: Some("2.6000 GHz".into()),
        })
    }
}

#[derive(Default)]
pub struct FakeGpu {
    pub gpus: Vec<GpuReading>,
    pub fail: bool,
}

impl GpuMetrics for FakeGpu {
    fn gpus(&self) -> QueryResult<Vec<GpuReading>> {
        if self.fail {
            return Err(QueryError::parse("nvidia-smi output"));
        }
        Ok(self.gpus.clone())
    }
}

/// Management data with `product_count` synthetic products. `pulled`
/// counts how many the consumer actually drew from the iterator.
#[derive(Default)]
pub struct FakeManagement {
    pub product_count: usize,
    pub pulled: Cell<usize>,
    pub fail_services: bool,
}

impl FakeManagement {
    pub fn with_products(product_count: usize) -> Self {
        Self {
            product_count,
            ..Self::default()
        }
    }
}

impl Management for FakeManagement {
    fn services(&self) -> QueryResult<Vec<ServiceRecord>> {
        if self.fail_services {
            return Err(QueryError::Unsupported);
        }
        Ok(vec![ServiceRecord {
            name: "sshd".into(),
            state: Some("running".into()),
            start_mode: Some("enabled".into()),
        }])
    }

    fn installed_products(&self) -> QueryResult<Box<dyn Iterator<Item = ProductRecord> + '_>> {
        Ok(Box::new((0..self.product_count).map(move |i| {
            self.pulled.set(self.pulled.get() + 1);
            ProductRecord {
                name: format!("product-{}", i),
                version: Some("1.0".into()),
            }
        })))
    }

    fn bios(&self) -> QueryResult<Vec<BiosRecord>> {
        Ok(vec![BiosRecord {
            manufacturer: Some("American Megatrends".into()),
            version: Some("F12".into()),
        }])
    }

    fn baseboards(&self) -> QueryResult<Vec<BoardRecord>> {
        Ok(vec![BoardRecord {
            manufacturer: Some("Gigabyte".into()),
            product: None,
        }])
    }
}

#[derive(Default)]
pub struct FixedAmbient {
    pub info: PlatformInfo,
    pub vars: HashMap<String, String>,
}

impl FixedAmbient {
    pub fn linux() -> Self {
        Self {
            info: PlatformInfo {
                system: "Linux".into(),
                release: Some("6.1.0".into()),
                machine: Some("x86_64".into()),
                hostname: Some("testbox".into()),
                ..PlatformInfo::default()
            },
            vars: HashMap::new(),
        }
    }

    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }
}

impl Ambient for FixedAmbient {
    fn platform(&self) -> &PlatformInfo {
        &self.info
    }

    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

fn absent<T: ?Sized>() -> Result<Box<T>, ProbeError> {
    Err(ProbeError::Unsupported("test"))
}

/// Every capability present, backed by the given fakes.
pub fn capabilities(runtime: FakeRuntime, management: FakeManagement) -> Capabilities {
    Capabilities::resolve(
        Ok(Box::new(runtime)),
        Ok(Box::new(FakeGpu::default())),
        Ok(Box::new(FakeCpuId::default())),
        Ok(Box::new(management)),
    )
}

/// Every capability missing.
pub fn no_capabilities() -> Capabilities {
    Capabilities::resolve(absent(), absent(), absent(), absent())
}

pub fn options() -> ReportOptions {
    ReportOptions {
        cpu_sample: Duration::ZERO,
        process_sample: Duration::ZERO,
    }
}
