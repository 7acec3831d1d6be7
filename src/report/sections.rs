//! Section bodies.
//!
//! Every query result is rendered or degraded right where it is issued.
//! Failures are logged at debug and shown as `unavailable`.

use std::fmt::Display;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::debug;

use super::ranking::{top_by_cpu, top_by_memory};
use super::sink::ReportSink;
use super::{notice, Context, TIMESTAMP_FORMAT};
use crate::capabilities::Capability;
use crate::error::{QueryError, QueryResult};
use crate::providers::{ProcessSample, ProductRecord};

const UNAVAILABLE: &str = "unavailable";
const TOP_PROCESSES: usize = 10;
const MAX_INSTALLED_PRODUCTS: usize = 50;
const PRODUCTS_TRUNCATED: &str = "...more installed products omitted";
const NO_SENSOR_DATA: &str = "No sensors data from provider";

fn failed(query: &str, error: &QueryError) {
    debug!(query, error = %error, "query failed");
}

/// `<label>: <value>` or `<label>: unavailable`.
fn field<T: Display>(sink: &mut dyn ReportSink, label: &str, value: QueryResult<T>) {
    match value {
        Ok(v) => sink.line(&format!("{}: {}", label, v)),
        Err(e) => {
            failed(label, &e);
            sink.line(&format!("{}: {}", label, UNAVAILABLE));
        }
    }
}

fn shown<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| UNAVAILABLE.to_string(), |v| v.to_string())
}

fn blank<T: Display>(value: Option<T>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

fn local_time(epoch_secs: u64) -> Option<String> {
    let secs = i64::try_from(epoch_secs).ok()?;
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string())
}

fn window(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

pub fn overview(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let platform = ctx.ambient.platform();
    sink.line(&format!("Platform: {}", platform));
    sink.line(&format!("Distribution: {}", shown(platform.distribution.as_deref())));
    sink.line(&format!("Machine: {}", shown(platform.machine.as_deref())));
    sink.line(&format!("Processor (platform): {}", shown(platform.processor.as_deref())));
    sink.line(&format!("Host name: {}", shown(platform.hostname.as_deref())));
    if platform.is_wsl {
        sink.line("Windows Subsystem for Linux: yes");
    }
    sink.line(&format!(
        "Inspector: {} {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ));

    let Some(rt) = ctx.caps.runtime() else {
        sink.line(&notice(Capability::RuntimeMetrics, "runtime"));
        return;
    };
    let boot = rt
        .boot_time()
        .and_then(|secs| local_time(secs).ok_or(QueryError::parse("boot time")));
    field(sink, "System boot time", boot);
    field(sink, "Uptime (seconds)", rt.uptime());
}

pub fn cpu(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    match ctx.caps.cpu_id() {
        Some(id) => match id.identify() {
            Ok(info) => {
                sink.line(&format!("Brand: {}", shown(info.brand)));
                sink.line(&format!("Arch: {}", shown(info.arch)));
                sink.line(&format!("Bits: {}", shown(info.bits)));
                sink.line(&format!("Hz advertised: {}", shown(info.hz_advertised)));
            }
            Err(e) => {
                failed("cpu identity", &e);
                sink.line(&format!("CPU identification: {}", UNAVAILABLE));
            }
        },
        None => sink.line(&notice(Capability::CpuId, "CPU identification")),
    }

    let Some(rt) = ctx.caps.runtime() else {
        sink.line(&notice(Capability::RuntimeMetrics, "CPU"));
        return;
    };

    match rt.cpu_counts() {
        Ok(counts) => {
            sink.line(&format!("Physical cores: {}", shown(counts.physical)));
            sink.line(&format!("Logical cores: {}", counts.logical));
        }
        Err(e) => {
            failed("cpu counts", &e);
            sink.line(&format!("Physical cores: {}", UNAVAILABLE));
            sink.line(&format!("Logical cores: {}", UNAVAILABLE));
        }
    }

    match rt.cpu_frequency() {
        Ok(freq) => {
            sink.line(&format!("Max frequency (MHz): {}", shown(freq.max_mhz)));
            sink.line(&format!("Current frequency (MHz): {}", freq.current_mhz));
        }
        Err(e) => {
            failed("cpu frequency", &e);
            sink.line(&format!("Max frequency (MHz): {}", UNAVAILABLE));
            sink.line(&format!("Current frequency (MHz): {}", UNAVAILABLE));
        }
    }

    match rt.cpu_usage(ctx.options.cpu_sample) {
        Ok(usage) => {
            sink.line(&format!(
                "CPU percent ({} sample): {}",
                window(usage.window),
                usage.total_percent
            ));
            let per_core: Vec<String> = usage.per_core.iter().map(|p| p.to_string()).collect();
            sink.line(&format!("Per-core percent: [{}]", per_core.join(", ")));
        }
        Err(e) => {
            failed("cpu usage", &e);
            sink.line(&format!("CPU percent: {}", UNAVAILABLE));
        }
    }
}

pub fn memory(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };

    match rt.virtual_memory() {
        Ok(vm) => {
            sink.line(&format!("Total RAM (bytes): {}", vm.total));
            sink.line(&format!("Available RAM (bytes): {}", vm.available));
            sink.line(&format!("Used RAM (bytes): {}", vm.used));
            sink.line(&format!("RAM percent: {}", vm.percent));
        }
        Err(e) => {
            failed("virtual memory", &e);
            sink.line(&format!("Virtual memory: {}", UNAVAILABLE));
        }
    }

    match rt.swap_memory() {
        Ok(swap) => {
            sink.line(&format!("Swap total (bytes): {}", swap.total));
            sink.line(&format!("Swap used (bytes): {}", swap.used));
            sink.line(&format!("Swap percent: {}", swap.percent));
        }
        Err(e) => {
            failed("swap memory", &e);
            sink.line(&format!("Swap memory: {}", UNAVAILABLE));
        }
    }
}

pub fn disks(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };

    match rt.partitions() {
        Ok(parts) if parts.is_empty() => sink.line("No partitions reported"),
        Ok(parts) => {
            for part in parts {
                match &part.usage {
                    Ok(usage) => {
                        sink.line(&format!(
                            "Mountpoint: {} -> {} ({})",
                            part.device, part.mount_point, part.fs_type
                        ));
                        sink.line(&format!(
                            "  Total: {} Used: {} Free: {} Percent: {}",
                            usage.total, usage.used, usage.free, usage.percent
                        ));
                    }
                    Err(e) => {
                        failed("partition usage", e);
                        sink.line(&format!("  {} ({}) - access error", part.device, part.fs_type));
                    }
                }
            }
        }
        Err(e) => {
            failed("partitions", &e);
            sink.line(&format!("Partitions: {}", UNAVAILABLE));
        }
    }

    match rt.disk_io() {
        Ok(io) => sink.line(&format!(
            "Disk IO: read bytes {} write bytes {}",
            io.read_bytes, io.write_bytes
        )),
        Err(e) => {
            failed("disk io", &e);
            sink.line(&format!("Disk IO: {}", UNAVAILABLE));
        }
    }
}

pub fn gpu(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(gpu) = ctx.caps.gpu() else { return };

    match gpu.gpus() {
        Ok(gpus) if gpus.is_empty() => sink.line("No GPUs reported"),
        Ok(gpus) => {
            for (i, g) in gpus.iter().enumerate() {
                sink.line(&format!("GPU {}:", i));
                sink.line(&format!("  name: {}", g.name));
                sink.line(&format!("  id: {}", g.index));
                sink.line(&format!("  uuid: {}", shown(g.uuid.as_deref())));
                sink.line(&format!("  load: {}", shown(g.load)));
                sink.line(&format!("  memory total (MB): {}", shown(g.memory_total_mb)));
                sink.line(&format!("  memory used (MB): {}", shown(g.memory_used_mb)));
                sink.line(&format!("  temperature (C): {}", shown(g.temperature_c)));
            }
        }
        Err(e) => {
            failed("gpus", &e);
            sink.line(&format!("GPU metrics: {}", UNAVAILABLE));
        }
    }
}

pub fn network(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };

    match rt.interfaces() {
        Ok(interfaces) => {
            for iface in interfaces {
                sink.line(&format!("Interface: {}", iface.name));
                for addr in &iface.addresses {
                    sink.line(
                        format!("  {} {} {}", addr.family, addr.address, blank(addr.netmask.as_deref()))
                            .trim_end(),
                    );
                }
            }
        }
        Err(e) => {
            failed("interfaces", &e);
            sink.line(&format!("Interfaces: {}", UNAVAILABLE));
        }
    }

    match rt.net_io() {
        Ok(io) => sink.line(&format!(
            "Bytes sent: {} Bytes received: {}",
            io.bytes_sent, io.bytes_recv
        )),
        Err(e) => {
            failed("net io", &e);
            sink.line(&format!("Network IO: {}", UNAVAILABLE));
        }
    }

    field(sink, "Open connections count", rt.connection_count());
}

pub fn sessions(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };

    match rt.sessions() {
        Ok(sessions) if sessions.is_empty() => sink.line("No active sessions"),
        Ok(sessions) => {
            for s in sessions {
                sink.line(&format!(
                    "User: {} Terminal: {} Host: {} Started: {}",
                    s.name,
                    blank(s.terminal),
                    blank(s.host),
                    blank(s.started)
                ));
            }
        }
        Err(e) => {
            failed("sessions", &e);
            sink.line(&format!("Sessions: {}", UNAVAILABLE));
        }
    }
}

pub fn processes(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };

    let results = match rt.processes(ctx.options.process_sample) {
        Ok(results) => results,
        Err(e) => {
            failed("processes", &e);
            sink.line(&format!("Process list: {}", UNAVAILABLE));
            return;
        }
    };

    let samples: Vec<ProcessSample> = results
        .into_iter()
        .filter_map(|r| match r {
            Ok(sample) => Some(sample),
            Err(e) => {
                debug!(error = %e, "process skipped");
                None
            }
        })
        .collect();

    sink.line("Top memory consumers:");
    for p in top_by_memory(&samples, TOP_PROCESSES) {
        sink.line(&format!(
            "  PID {} {} user={} rss={}",
            p.pid,
            p.name,
            blank(p.username.as_deref()),
            p.memory_resident_bytes
        ));
    }

    sink.line("Top CPU consumers:");
    for p in top_by_cpu(&samples, TOP_PROCESSES) {
        sink.line(&format!(
            "  PID {} {} user={} cpu%={}",
            p.pid,
            p.name,
            blank(p.username.as_deref()),
            p.cpu_percent
        ));
    }
}

pub fn services(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(mgmt) = ctx.caps.management() else { return };

    match mgmt.services() {
        Ok(services) => {
            for s in services {
                sink.line(&format!(
                    "Service: {} State: {} StartMode: {}",
                    s.name,
                    shown(s.state),
                    shown(s.start_mode)
                ));
            }
        }
        Err(e) => {
            failed("services", &e);
            sink.line(&format!("Services: {}", UNAVAILABLE));
        }
    }

    match mgmt.installed_products() {
        Ok(products) => list_products(sink, products),
        Err(e) => {
            failed("installed products", &e);
            sink.line(&format!("Installed software: {}", UNAVAILABLE));
        }
    }
}

/// Print at most [`MAX_INSTALLED_PRODUCTS`] entries. The notice appears only
/// when one more product exists, and enumeration stops right after it.
fn list_products(sink: &mut dyn ReportSink, products: impl Iterator<Item = ProductRecord>) {
    let mut listed = 0;
    for product in products {
        if listed == MAX_INSTALLED_PRODUCTS {
            sink.line(PRODUCTS_TRUNCATED);
            break;
        }
        sink.line(&format!(
            "Installed: {} Version: {}",
            product.name,
            blank(product.version)
        ));
        listed += 1;
    }
}

pub fn firmware(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(mgmt) = ctx.caps.management() else { return };

    match mgmt.bios() {
        Ok(entries) => {
            for b in entries {
                sink.line(&format!(
                    "BIOS manufacturer: {} Version: {}",
                    shown(b.manufacturer),
                    shown(b.version)
                ));
            }
        }
        Err(e) => {
            failed("bios", &e);
            sink.line(&format!("BIOS: {}", UNAVAILABLE));
        }
    }

    match mgmt.baseboards() {
        Ok(boards) => {
            for b in boards {
                sink.line(&format!(
                    "Board manufacturer: {} Product: {}",
                    shown(b.manufacturer),
                    shown(b.product)
                ));
            }
        }
        Err(e) => {
            failed("baseboards", &e);
            sink.line(&format!("Motherboard: {}", UNAVAILABLE));
        }
    }
}

pub fn sensors(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let Some(rt) = ctx.caps.runtime() else { return };
    let mut printed = false;

    match rt.temperatures() {
        Ok(temps) => {
            for t in temps {
                printed = true;
                sink.line(&format!(
                    "Sensor: {} current={} high={} critical={}",
                    t.label,
                    shown(t.current),
                    shown(t.high),
                    shown(t.critical)
                ));
            }
        }
        Err(e) => {
            failed("temperatures", &e);
            printed = true;
            sink.line(&format!("Temperatures: {}", UNAVAILABLE));
        }
    }

    match rt.fans() {
        Ok(fans) => {
            for f in fans {
                printed = true;
                sink.line(&format!("Fan: {} {} {} RPM", f.chip, f.label, f.rpm));
            }
        }
        // platforms without fan readings simply have none to show
        Err(QueryError::Unsupported) => {}
        Err(e) => {
            failed("fans", &e);
            printed = true;
            sink.line(&format!("Fans: {}", UNAVAILABLE));
        }
    }

    if !printed {
        sink.line(NO_SENSOR_DATA);
    }
}

pub fn environment(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    let env = ctx.ambient;
    let computer = env.var("COMPUTERNAME").or_else(|| env.var("HOSTNAME"));
    let user = env.var("USERNAME").or_else(|| env.var("USER"));
    let path_entries = env
        .var("PATH")
        .map_or(0, |p| std::env::split_paths(&p).filter(|e| !e.as_os_str().is_empty()).count());

    sink.line(&format!("Computer name: {}", shown(computer)));
    sink.line(&format!("User: {}", shown(user)));
    sink.line(&format!("System drive: {}", shown(env.var("SystemDrive"))));
    sink.line(&format!("Path entries count: {}", path_entries));
}

pub fn summary(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    for (capability, available) in ctx.caps.set().iter() {
        let state = if available { "available" } else { "missing" };
        sink.line(&format!("{} {}", capability, state));
    }
}
