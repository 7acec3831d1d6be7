//! Top-N process rankings.

use std::cmp::Ordering;

use crate::providers::ProcessSample;

/// Largest resident set first. Ties keep their input order.
pub fn top_by_memory(samples: &[ProcessSample], limit: usize) -> Vec<&ProcessSample> {
    top_by(samples, limit, |a, b| {
        b.memory_resident_bytes.cmp(&a.memory_resident_bytes)
    })
}

/// Highest CPU percentage first. Ties keep their input order.
pub fn top_by_cpu(samples: &[ProcessSample], limit: usize) -> Vec<&ProcessSample> {
    top_by(samples, limit, |a, b| b.cpu_percent.total_cmp(&a.cpu_percent))
}

fn top_by<F>(samples: &[ProcessSample], limit: usize, compare: F) -> Vec<&ProcessSample>
where
    F: Fn(&ProcessSample, &ProcessSample) -> Ordering,
{
    let mut ranked: Vec<&ProcessSample> = samples.iter().collect();
    ranked.sort_by(|a, b| compare(a, b));
    ranked.truncate(limit);
    ranked
}
