//! CPU identification from the platform's own description of the processor.
//!
//! - Linux: /proc/cpuinfo
//! - macOS: sysctl machdep.cpu.*
//! - Windows: the CentralProcessor registry key via `reg query`

use std::collections::HashMap;

use super::{CpuId, CpuIdentity};
use crate::cmd;
use crate::error::{ProbeError, QueryError, QueryResult};

#[derive(Debug, Clone, Copy)]
enum Source {
    ProcCpuinfo,
    Sysctl,
    Registry,
}

#[derive(Debug)]
pub struct PlatformCpuId {
    source: Source,
}

impl PlatformCpuId {
    /// Pick the platform source and make sure it yields a brand string.
    pub fn probe() -> Result<Self, ProbeError> {
        let source = match std::env::consts::OS {
            "linux" | "android" => Source::ProcCpuinfo,
            "macos" => Source::Sysctl,
            "windows" => Source::Registry,
            other => return Err(ProbeError::Unsupported(other)),
        };

        let provider = Self { source };
        let identity = provider
            .identify()
            .map_err(|e| ProbeError::Init(e.to_string()))?;
        if identity.brand.is_none() {
            return Err(ProbeError::Init("no CPU brand string".into()));
        }
        Ok(provider)
    }
}

impl CpuId for PlatformCpuId {
    fn identify(&self) -> QueryResult<CpuIdentity> {
        match self.source {
            Source::ProcCpuinfo => {
                let cpuinfo = cmd::read_file("/proc/cpuinfo")?;
                let arch = cmd::run_opt("uname", &["-m"]);
                Ok(identity_from_cpuinfo(&cpuinfo, arch))
            }
            Source::Sysctl => {
                let brand = cmd::run_opt("sysctl", &["-n", "machdep.cpu.brand_string"]);
                let arch = cmd::run_opt("uname", &["-m"]);
                // Intel Macs only; Apple Silicon does not expose it.
                let hz = cmd::run_opt("sysctl", &["-n", "hw.cpufrequency"])
                    .and_then(|s| s.parse::<f64>().ok());
                Ok(build_identity(brand, arch, hz))
            }
            Source::Registry => {
                let output = cmd::run(
                    "reg",
                    &["query", r"HKLM\HARDWARE\DESCRIPTION\System\CentralProcessor\0"],
                )?;
                let values = parse_reg_values(&output);
                if values.is_empty() {
                    return Err(QueryError::parse("CentralProcessor registry key"));
                }
                let brand = values.get("ProcessorNameString").cloned();
                let arch = std::env::var("PROCESSOR_ARCHITECTURE").ok();
                let hz = values
                    .get("~MHz")
                    .and_then(|v| parse_reg_dword(v))
                    .map(|mhz| mhz as f64 * 1e6);
                Ok(build_identity(brand, arch, hz))
            }
        }
    }
}

fn identity_from_cpuinfo(cpuinfo: &str, arch: Option<String>) -> CpuIdentity {
    // x86 reports "model name"; ARM boards use "Model" or "Hardware".
    let brand = ["model name", "Model", "Hardware"]
        .iter()
        .find_map(|field| extract_proc_field(cpuinfo, field));
    build_identity(brand, arch, None)
}

/// The brand string's `@ 2.60GHz` suffix wins over a measured clock.
fn build_identity(brand: Option<String>, arch: Option<String>, hz: Option<f64>) -> CpuIdentity {
    let brand = brand.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());
    let arch = arch.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    let hz_advertised = brand
        .as_deref()
        .and_then(advertised_hz_from_brand)
        .or(hz)
        .filter(|hz| *hz > 0.0)
        .map(friendly_hz);

    CpuIdentity {
        bits: arch.as_deref().and_then(bits_for_arch),
        brand,
        arch,
        hz_advertised,
    }
}

fn extract_proc_field(cpuinfo: &str, field: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|l| l.split(':').next().map(str::trim) == Some(field))
        .and_then(|l| l.split_once(':'))
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn advertised_hz_from_brand(brand: &str) -> Option<f64> {
    let (_, clock) = brand.rsplit_once('@')?;
    let clock = clock.trim();
    let (number, scale) = if let Some(n) = clock.strip_suffix("GHz") {
        (n, 1e9)
    } else if let Some(n) = clock.strip_suffix("MHz") {
        (n, 1e6)
    } else {
        return None;
    };
    number.trim().parse::<f64>().ok().map(|n| n * scale)
}

fn friendly_hz(hz: f64) -> String {
    format!("{:.4} GHz", hz / 1e9)
}

fn bits_for_arch(arch: &str) -> Option<u32> {
    match arch.to_lowercase().as_str() {
        "x86_64" | "amd64" | "aarch64" | "arm64" | "ppc64" | "ppc64le" | "s390x" | "riscv64"
        | "mips64" | "loongarch64" => Some(64),
        "i386" | "i486" | "i586" | "i686" | "x86" | "arm" | "armv6l" | "armv7l" | "mips" => {
            Some(32)
        }
        _ => None,
    }
}

/// Parse `reg query` output: `    Name    REG_TYPE    Data`.
fn parse_reg_values(output: &str) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for line in output.lines() {
        let parts: Vec<&str> = line.trim().splitn(3, "    ").map(str::trim).collect();
        if let [name, kind, data] = parts.as_slice() {
            if kind.starts_with("REG_") {
                values.insert(name.to_string(), data.to_string());
            }
        }
    }
    values
}

fn parse_reg_dword(data: &str) -> Option<u64> {
    let hex = data.trim().strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}
