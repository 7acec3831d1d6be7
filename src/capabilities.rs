//! One-shot capability negotiation.
//!
//! Each optional provider is probed exactly once at startup. The outcome is
//! frozen into a [`Capabilities`] value that every report section reads; a
//! failed probe is recorded and the provider is never touched again.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::ProbeError;
use crate::providers::cpuid::PlatformCpuId;
use crate::providers::gpu::NvidiaSmi;
use crate::providers::management::PlatformManagement;
use crate::providers::runtime::SysinfoRuntime;
use crate::providers::{CpuId, GpuMetrics, Management, RuntimeMetrics};

/// Optional data sources, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    RuntimeMetrics,
    GpuMetrics,
    CpuId,
    ManagementInstrumentation,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::RuntimeMetrics,
        Capability::GpuMetrics,
        Capability::CpuId,
        Capability::ManagementInstrumentation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Capability::RuntimeMetrics => "runtime-metrics",
            Capability::GpuMetrics => "gpu-metrics",
            Capability::CpuId => "cpu-id",
            Capability::ManagementInstrumentation => "management-instrumentation",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Availability per capability. Only [`Capabilities::resolve`] writes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitySet {
    entries: BTreeMap<Capability, bool>,
}

impl CapabilitySet {
    pub fn is_available(&self, capability: Capability) -> bool {
        self.entries.get(&capability).copied().unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, bool)> + '_ {
        self.entries.iter().map(|(c, a)| (*c, *a))
    }
}

pub type Probed<T> = Result<Box<T>, ProbeError>;

/// The frozen capability table plus the handles that were acquired.
pub struct Capabilities {
    set: CapabilitySet,
    runtime: Option<Box<dyn RuntimeMetrics>>,
    gpu: Option<Box<dyn GpuMetrics>>,
    cpu_id: Option<Box<dyn CpuId>>,
    management: Option<Box<dyn Management>>,
}

impl Capabilities {
    /// Probe every host provider.
    pub fn probe() -> Self {
        Self::resolve(
            SysinfoRuntime::probe().map(|p| Box::new(p) as Box<dyn RuntimeMetrics>),
            NvidiaSmi::probe().map(|p| Box::new(p) as Box<dyn GpuMetrics>),
            PlatformCpuId::probe().map(|p| Box::new(p) as Box<dyn CpuId>),
            PlatformManagement::probe().map(|p| Box::new(p) as Box<dyn Management>),
        )
    }

    /// Record the outcome of each probe and keep the successful handles.
    pub fn resolve(
        runtime: Probed<dyn RuntimeMetrics>,
        gpu: Probed<dyn GpuMetrics>,
        cpu_id: Probed<dyn CpuId>,
        management: Probed<dyn Management>,
    ) -> Self {
        let mut set = CapabilitySet::default();
        let runtime = settle(&mut set, Capability::RuntimeMetrics, runtime);
        let gpu = settle(&mut set, Capability::GpuMetrics, gpu);
        let cpu_id = settle(&mut set, Capability::CpuId, cpu_id);
        let management = settle(&mut set, Capability::ManagementInstrumentation, management);
        debug_assert!(Capability::ALL.iter().all(|c| set.entries.contains_key(c)));

        Self {
            set,
            runtime,
            gpu,
            cpu_id,
            management,
        }
    }

    pub fn set(&self) -> &CapabilitySet {
        &self.set
    }

    pub fn is_available(&self, capability: Capability) -> bool {
        self.set.is_available(capability)
    }

    pub fn runtime(&self) -> Option<&dyn RuntimeMetrics> {
        self.runtime.as_deref()
    }

    pub fn gpu(&self) -> Option<&dyn GpuMetrics> {
        self.gpu.as_deref()
    }

    pub fn cpu_id(&self) -> Option<&dyn CpuId> {
        self.cpu_id.as_deref()
    }

    pub fn management(&self) -> Option<&dyn Management> {
        self.management.as_deref()
    }
}

fn settle<T: ?Sized>(
    set: &mut CapabilitySet,
    capability: Capability,
    probed: Probed<T>,
) -> Option<Box<T>> {
    match probed {
        Ok(handle) => {
            debug!(%capability, "capability available");
            set.entries.insert(capability, true);
            Some(handle)
        }
        Err(e) => {
            info!(%capability, error = %e, "capability unavailable");
            set.entries.insert(capability, false);
            None
        }
    }
}
