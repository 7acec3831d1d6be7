//! Services, installed software and firmware inventory.
//!
//! Platform backends:
//! - Windows: CIM classes (Win32_Service, Win32_Product, Win32_BIOS,
//!   Win32_BaseBoard) through PowerShell `Get-CimInstance`
//! - Linux: systemctl, dpkg/rpm/pacman, /sys/class/dmi/id
//! - macOS: launchctl, system_profiler

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{BiosRecord, BoardRecord, Management, ProductRecord, ServiceRecord};
use crate::cmd;
use crate::error::{ProbeError, QueryError, QueryResult};

const DMI_DIR: &str = "/sys/class/dmi/id";

#[derive(Debug)]
enum Backend {
    Cim { powershell: PathBuf },
    Linux { systemctl: Option<PathBuf> },
    MacOs { profiler: PathBuf },
}

#[derive(Debug)]
pub struct PlatformManagement {
    backend: Backend,
}

impl PlatformManagement {
    pub fn probe() -> Result<Self, ProbeError> {
        let backend = match std::env::consts::OS {
            "windows" => {
                let powershell = cmd::find("powershell")
                    .or_else(|| cmd::find("pwsh"))
                    .ok_or_else(|| ProbeError::ToolMissing("powershell".into()))?;
                Backend::Cim { powershell }
            }
            "linux" => {
                let systemctl = cmd::find("systemctl");
                if systemctl.is_none() && !Path::new(DMI_DIR).is_dir() {
                    return Err(ProbeError::ToolMissing("systemctl".into()));
                }
                Backend::Linux { systemctl }
            }
            "macos" => {
                let profiler = cmd::find("system_profiler")
                    .ok_or_else(|| ProbeError::ToolMissing("system_profiler".into()))?;
                Backend::MacOs { profiler }
            }
            other => return Err(ProbeError::Unsupported(other)),
        };
        Ok(Self { backend })
    }
}

impl Management for PlatformManagement {
    fn services(&self) -> QueryResult<Vec<ServiceRecord>> {
        match &self.backend {
            Backend::Cim { powershell } => {
                let rows: Vec<CimService> =
                    cim_query(powershell, "Win32_Service", &["Name", "State", "StartMode"])?;
                Ok(rows
                    .into_iter()
                    .filter_map(|s| {
                        Some(ServiceRecord {
                            name: s.name?,
                            state: s.state,
                            start_mode: s.start_mode,
                        })
                    })
                    .collect())
            }
            Backend::Linux { systemctl } => {
                let systemctl = systemctl.as_ref().ok_or(QueryError::Unsupported)?;
                let units = cmd::run(
                    systemctl,
                    &["list-units", "--type=service", "--all", "--no-legend", "--plain", "--no-pager"],
                )?;
                let unit_files = cmd::run(
                    systemctl,
                    &["list-unit-files", "--type=service", "--no-legend", "--no-pager"],
                )?;
                Ok(merge_systemd_services(&units, &unit_files))
            }
            Backend::MacOs { .. } => {
                let output = cmd::run("launchctl", &["list"])?;
                Ok(parse_launchctl_list(&output))
            }
        }
    }

    /// Windows and Linux stream the tool's stdout, so a consumer that stops
    /// early also stops the enumeration.
    fn installed_products(&self) -> QueryResult<Box<dyn Iterator<Item = ProductRecord> + '_>> {
        match &self.backend {
            Backend::Cim { powershell } => {
                let lines = cmd::stream_lines(
                    powershell,
                    &["-NoProfile", "-NonInteractive", "-Command", CIM_PRODUCT_LINES],
                )?;
                Ok(Box::new(package_stream(lines, '\t')))
            }
            Backend::Linux { .. } => linux_packages(),
            Backend::MacOs { profiler } => {
                let json = cmd::run(profiler, &["SPApplicationsDataType", "-json"])?;
                Ok(Box::new(parse_profiler_applications(&json)?.into_iter()))
            }
        }
    }

    fn bios(&self) -> QueryResult<Vec<BiosRecord>> {
        match &self.backend {
            Backend::Cim { powershell } => {
                let rows: Vec<CimBios> =
                    cim_query(powershell, "Win32_BIOS", &["Manufacturer", "SMBIOSBIOSVersion"])?;
                Ok(rows
                    .into_iter()
                    .map(|b| BiosRecord {
                        manufacturer: b.manufacturer,
                        version: b.smbios_bios_version,
                    })
                    .collect())
            }
            Backend::Linux { .. } => {
                let dmi = Path::new(DMI_DIR);
                let record = BiosRecord {
                    manufacturer: cmd::read_attr(dmi.join("bios_vendor")),
                    version: cmd::read_attr(dmi.join("bios_version")),
                };
                if record.manufacturer.is_none() && record.version.is_none() {
                    return Err(QueryError::Missing("BIOS information"));
                }
                Ok(vec![record])
            }
            Backend::MacOs { profiler } => {
                let hw = profiler_hardware(profiler)?;
                Ok(vec![BiosRecord {
                    manufacturer: Some("Apple Inc.".into()),
                    version: json_str(&hw, "boot_rom_version"),
                }])
            }
        }
    }

    fn baseboards(&self) -> QueryResult<Vec<BoardRecord>> {
        match &self.backend {
            Backend::Cim { powershell } => {
                let rows: Vec<CimBoard> =
                    cim_query(powershell, "Win32_BaseBoard", &["Manufacturer", "Product"])?;
                Ok(rows
                    .into_iter()
                    .map(|b| BoardRecord {
                        manufacturer: b.manufacturer,
                        product: b.product,
                    })
                    .collect())
            }
            Backend::Linux { .. } => {
                let dmi = Path::new(DMI_DIR);
                let record = BoardRecord {
                    manufacturer: cmd::read_attr(dmi.join("board_vendor")),
                    product: cmd::read_attr(dmi.join("board_name")),
                };
                if record.manufacturer.is_none() && record.product.is_none() {
                    return Err(QueryError::Missing("baseboard information"));
                }
                Ok(vec![record])
            }
            Backend::MacOs { profiler } => {
                let hw = profiler_hardware(profiler)?;
                Ok(vec![BoardRecord {
                    manufacturer: Some("Apple Inc.".into()),
                    product: json_str(&hw, "machine_model"),
                }])
            }
        }
    }
}

// ── Windows (CIM) ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimService {
    name: Option<String>,
    state: Option<String>,
    start_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimBios {
    manufacturer: Option<String>,
    #[serde(rename = "SMBIOSBIOSVersion")]
    smbios_bios_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CimBoard {
    manufacturer: Option<String>,
    product: Option<String>,
}

/// One `Name<TAB>Version` line per Win32_Product instance, written as each
/// instance arrives.
const CIM_PRODUCT_LINES: &str = "Get-CimInstance -ClassName Win32_Product | \
    ForEach-Object { \"$($_.Name)\" + [char]9 + \"$($_.Version)\" }";

/// `ConvertTo-Json` emits a bare object for a single instance.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

fn cim_query<T: DeserializeOwned>(
    powershell: &Path,
    class: &str,
    properties: &[&str],
) -> QueryResult<Vec<T>> {
    let script = format!(
        "Get-CimInstance -ClassName {} | Select-Object {} | ConvertTo-Json -Compress",
        class,
        properties.join(",")
    );
    let output = cmd::run(powershell, &["-NoProfile", "-NonInteractive", "-Command", &script])?;
    parse_cim_json(&output).map_err(|_| QueryError::parse(format!("{} instances", class)))
}

fn parse_cim_json<T: DeserializeOwned>(output: &str) -> Result<Vec<T>, serde_json::Error> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    Ok(match serde_json::from_str::<OneOrMany<T>>(trimmed)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
    })
}

// ── Linux ──────────────────────────────────────────────────

/// Runtime state comes from `list-units`, start mode from `list-unit-files`.
/// Installed units that are not loaded are reported as `dead`.
fn merge_systemd_services(units: &str, unit_files: &str) -> Vec<ServiceRecord> {
    let mut start_modes: Vec<(String, String)> = Vec::new();
    for line in unit_files.lines() {
        let mut parts = line.split_whitespace();
        if let (Some(unit), Some(state)) = (parts.next(), parts.next()) {
            if unit.ends_with(".service") && !unit.contains("@.") {
                start_modes.push((unit.to_string(), state.to_string()));
            }
        }
    }
    let mode_of: HashMap<&str, &str> = start_modes
        .iter()
        .map(|(u, s)| (u.as_str(), s.as_str()))
        .collect();

    let mut services = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for line in units.lines() {
        let parts: Vec<&str> = line
            .split_whitespace()
            .skip_while(|p| *p == "●" || *p == "*")
            .collect();
        if parts.len() < 4 || !parts[0].ends_with(".service") {
            continue;
        }
        let name = parts[0];
        seen.insert(name.to_string());
        services.push(ServiceRecord {
            name: name.to_string(),
            state: Some(parts[3].to_string()),
            start_mode: mode_of.get(name).map(|m| m.to_string()),
        });
    }

    for (unit, mode) in &start_modes {
        if !seen.contains(unit) {
            services.push(ServiceRecord {
                name: unit.clone(),
                state: Some("dead".into()),
                start_mode: Some(mode.clone()),
            });
        }
    }
    services
}

fn linux_packages() -> QueryResult<Box<dyn Iterator<Item = ProductRecord>>> {
    if let Some(dpkg) = cmd::find("dpkg-query") {
        let lines = cmd::stream_lines(&dpkg, &["-W", "-f", "${Package}\t${Version}\n"])?;
        return Ok(Box::new(package_stream(lines, '\t')));
    }
    if let Some(rpm) = cmd::find("rpm") {
        let lines = cmd::stream_lines(&rpm, &["-qa", "--qf", "%{NAME}\t%{VERSION}-%{RELEASE}\n"])?;
        return Ok(Box::new(package_stream(lines, '\t')));
    }
    if let Some(pacman) = cmd::find("pacman") {
        let lines = cmd::stream_lines(&pacman, &["-Q"])?;
        return Ok(Box::new(package_stream(lines, ' ')));
    }
    Err(QueryError::Unsupported)
}

fn package_stream(lines: cmd::LineStream, separator: char) -> impl Iterator<Item = ProductRecord> {
    lines.filter_map(move |line| parse_package_line(&line, separator))
}

/// `name<sep>version`; a line without the separator is a bare name.
fn parse_package_line(line: &str, separator: char) -> Option<ProductRecord> {
    let (name, version) = match line.split_once(separator) {
        Some((name, version)) => (name.trim(), Some(version.trim())),
        None => (line.trim(), None),
    };
    if name.is_empty() {
        return None;
    }
    Some(ProductRecord {
        name: name.to_string(),
        version: version.filter(|v| !v.is_empty()).map(str::to_string),
    })
}

// ── macOS ──────────────────────────────────────────────────

fn parse_launchctl_list(output: &str) -> Vec<ServiceRecord> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                return None;
            }
            let state = if parts[0] == "-" { "stopped" } else { "running" };
            Some(ServiceRecord {
                name: parts[2].to_string(),
                state: Some(state.to_string()),
                start_mode: None,
            })
        })
        .collect()
}

fn parse_profiler_applications(json: &str) -> QueryResult<Vec<ProductRecord>> {
    let parsed: serde_json::Value =
        serde_json::from_str(json).map_err(|_| QueryError::parse("system_profiler output"))?;
    let apps = parsed
        .get("SPApplicationsDataType")
        .and_then(|v| v.as_array())
        .ok_or(QueryError::Missing("application list"))?;
    Ok(apps
        .iter()
        .filter_map(|app| {
            Some(ProductRecord {
                name: json_str(app, "_name")?,
                version: json_str(app, "version"),
            })
        })
        .collect())
}

fn profiler_hardware(profiler: &Path) -> QueryResult<serde_json::Value> {
    let json = cmd::run(profiler, &["SPHardwareDataType", "-json"])?;
    let parsed: serde_json::Value =
        serde_json::from_str(&json).map_err(|_| QueryError::parse("system_profiler output"))?;
    parsed
        .get("SPHardwareDataType")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .cloned()
        .ok_or(QueryError::Missing("hardware overview"))
}

fn json_str(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}
