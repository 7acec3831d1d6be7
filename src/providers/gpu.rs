//! GPU metrics via `nvidia-smi`.

use std::path::PathBuf;

use tracing::debug;

use super::{GpuMetrics, GpuReading};
use crate::cmd;
use crate::error::{ProbeError, QueryError, QueryResult};

/// `name` comes last: it is the only free-text column and may contain commas.
const QUERY_FIELDS: &str =
    "--query-gpu=index,uuid,utilization.gpu,memory.total,memory.used,temperature.gpu,name";

#[derive(Debug)]
pub struct NvidiaSmi {
    path: PathBuf,
}

impl NvidiaSmi {
    pub fn probe() -> Result<Self, ProbeError> {
        let path = cmd::find("nvidia-smi").ok_or_else(|| ProbeError::ToolMissing("nvidia-smi".into()))?;
        let listing =
            cmd::run(&path, &["--list-gpus"]).map_err(|e| ProbeError::Init(e.to_string()))?;
        if listing.lines().all(|l| l.trim().is_empty()) {
            return Err(ProbeError::NoDevice);
        }
        Ok(Self { path })
    }
}

impl GpuMetrics for NvidiaSmi {
    fn gpus(&self) -> QueryResult<Vec<GpuReading>> {
        let output = cmd::run(&self.path, &[QUERY_FIELDS, "--format=csv,noheader,nounits"])?;
        let gpus = parse_gpu_csv(&output);
        if gpus.is_empty() && !output.trim().is_empty() {
            return Err(QueryError::parse("nvidia-smi output"));
        }
        Ok(gpus)
    }
}

fn parse_gpu_csv(output: &str) -> Vec<GpuReading> {
    let mut gpus = Vec::new();
    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.splitn(7, ',').map(str::trim).collect();
        if parts.len() < 7 {
            debug!(line, "skipping short nvidia-smi row");
            continue;
        }
        let Ok(index) = parts[0].parse::<u32>() else {
            debug!(line, "skipping nvidia-smi row without index");
            continue;
        };
        gpus.push(GpuReading {
            index,
            uuid: text(parts[1]),
            load: number::<f32>(parts[2]).map(|pct| pct / 100.0),
            memory_total_mb: number(parts[3]),
            memory_used_mb: number(parts[4]),
            temperature_c: number(parts[5]),
            name: parts[6].to_string(),
        });
    }
    gpus
}

/// nvidia-smi prints `[N/A]` or `[Not Supported]` for missing values.
fn text(value: &str) -> Option<String> {
    if value.is_empty() || value.starts_with('[') {
        None
    } else {
        Some(value.to_string())
    }
}

fn number<T: std::str::FromStr>(value: &str) -> Option<T> {
    text(value).and_then(|v| v.parse().ok())
}
