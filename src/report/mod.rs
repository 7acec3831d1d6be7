//! Report pipeline: a fixed, ordered list of sections rendered into a sink.
//!
//! Sections never fail. A section whose capability is missing prints a
//! single notice line instead of its body; a query that fails inside a
//! section degrades only the field it feeds.

mod ranking;
mod sections;
pub mod sink;

use std::time::Duration;

use chrono::Local;
use tracing::{debug, info};

use crate::capabilities::{Capabilities, Capability};
use crate::platform::Ambient;
use sink::ReportSink;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const END_MARKER: &str = "End of report";

/// Sampling windows for the blocking measurements.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub cpu_sample: Duration,
    pub process_sample: Duration,
}

/// Everything a section may read. Sections never reach the host directly.
pub struct Context<'a> {
    pub caps: &'a Capabilities,
    pub ambient: &'a dyn Ambient,
    pub options: &'a ReportOptions,
}

/// A capability a section cannot run without, and the topic named in the
/// notice printed when it is missing.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub capability: Capability,
    pub topic: &'static str,
}

pub struct Section {
    pub title: &'static str,
    pub gate: Option<Gate>,
    render: fn(&Context<'_>, &mut dyn ReportSink),
}

const fn gated(capability: Capability, topic: &'static str) -> Option<Gate> {
    Some(Gate { capability, topic })
}

pub const SECTIONS: [Section; 13] = [
    Section {
        title: "SYSTEM OVERVIEW",
        gate: None,
        render: sections::overview,
    },
    Section {
        title: "CPU",
        gate: None,
        render: sections::cpu,
    },
    Section {
        title: "MEMORY",
        gate: gated(Capability::RuntimeMetrics, "memory"),
        render: sections::memory,
    },
    Section {
        title: "DISKS",
        gate: gated(Capability::RuntimeMetrics, "disk"),
        render: sections::disks,
    },
    Section {
        title: "GPU",
        gate: gated(Capability::GpuMetrics, "GPU"),
        render: sections::gpu,
    },
    Section {
        title: "NETWORK",
        gate: gated(Capability::RuntimeMetrics, "network"),
        render: sections::network,
    },
    Section {
        title: "USERS & SESSIONS",
        gate: gated(Capability::RuntimeMetrics, "user/session"),
        render: sections::sessions,
    },
    Section {
        title: "TOP PROCESSES (by memory and CPU)",
        gate: gated(Capability::RuntimeMetrics, "process"),
        render: sections::processes,
    },
    Section {
        title: "SERVICES & INSTALLED SOFTWARE",
        gate: gated(Capability::ManagementInstrumentation, "services/installed software"),
        render: sections::services,
    },
    Section {
        title: "BIOS & MOTHERBOARD",
        gate: gated(Capability::ManagementInstrumentation, "BIOS/motherboard"),
        render: sections::firmware,
    },
    Section {
        title: "SENSORS (temperatures, fans)",
        gate: gated(Capability::RuntimeMetrics, "sensor"),
        render: sections::sensors,
    },
    Section {
        title: "ENVIRONMENT & CONFIG",
        gate: None,
        render: sections::environment,
    },
    Section {
        title: "SUMMARY OF OPTIONAL CAPABILITIES",
        gate: None,
        render: sections::summary,
    },
];

/// The line printed in place of data that needs a missing capability.
pub fn notice(capability: Capability, topic: &str) -> String {
    format!("{} not available: limited {} info", capability, topic)
}

/// Render the whole report. Always reaches the end marker.
pub fn generate(ctx: &Context<'_>, sink: &mut dyn ReportSink) {
    info!("generating report");
    sink.banner();
    sink.rule();
    sink.line(&format!("Timestamp: {}", Local::now().format(TIMESTAMP_FORMAT)));
    sink.rule();

    for section in &SECTIONS {
        sink.heading(section.title);
        match section.gate {
            Some(gate) if !ctx.caps.is_available(gate.capability) => {
                debug!(section = section.title, capability = %gate.capability, "section skipped");
                sink.line(&notice(gate.capability, gate.topic));
            }
            _ => (section.render)(ctx, sink),
        }
        sink.rule();
    }

    sink.line(END_MARKER);
}
