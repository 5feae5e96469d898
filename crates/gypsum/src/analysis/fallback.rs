//! Deterministic stand-in metrics for readings the analysis process did not provide.
//!
//! Every value is a pure function of the artifact's size and path, so the same
//! upload always receives the same estimates. The mineral composition split is
//! a fixed simplifying model of the impurity fraction, not measured data:
//! calcite 30 %, quartz 20 % and other minerals 50 %.

use std::path::Path;
use std::time::Duration;

use super::parser::ParsedResults;
use crate::jobs::model::AnalysisMetrics;

const LARGE_ARTIFACT: u64 = 100_000;
const SMALL_ARTIFACT: u64 = 50_000;

const CALCITE_SHARE: f64 = 0.3;
const QUARTZ_SHARE: f64 = 0.2;
const OTHER_SHARE: f64 = 0.5;

/// Attributes of a persisted artifact that estimates are derived from.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactAttributes<'a> {
    pub size: u64,
    pub path: &'a Path,
}

/// Rolling string hash (`h * 31 + c`, written as shift-and-subtract) over
/// the characters of `input`, wrapped to 32 bits.
pub fn string_hash(input: &str) -> i32 {
    input.chars().fold(0i32, |hash, c| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32)
    })
}

/// Purity in `[30, 95]`, pushed up for large artifacts and down for small ones.
pub fn estimate_purity(size: u64, path: &Path) -> f64 {
    let hash = string_hash(&format!("{}-{}", size, path.display()));
    let mut purity = 60.0 + f64::from(hash.rem_euclid(35));

    if size > LARGE_ARTIFACT {
        purity += 5.0;
    } else if size < SMALL_ARTIFACT {
        purity -= 10.0;
    }

    purity.clamp(30.0, 95.0)
}

/// Particle count in `[5, 100]`, scaled from the artifact size.
pub fn estimate_particle_count(size: u64) -> u32 {
    let mut count = (size / 2000).min(i64::MAX as u64) as i64;

    if size > LARGE_ARTIFACT {
        count += 15;
    } else if size < SMALL_ARTIFACT {
        count -= 10;
    }

    count.clamp(5, 100) as u32
}

/// Threshold in `[80, 200]`, varying with the size modulo 60.
pub fn estimate_threshold(size: u64) -> f64 {
    let mut threshold = 120.0 + (size % 60) as f64 * 0.5;

    if size > LARGE_ARTIFACT {
        threshold += 15.0;
    } else if size < SMALL_ARTIFACT {
        threshold -= 20.0;
    }

    threshold.clamp(80.0, 200.0)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

/// Combines parsed readings with estimates for every missing or
/// non-positive value.
pub fn fill_gaps(
    parsed: &ParsedResults,
    artifact: ArtifactAttributes<'_>,
    elapsed: Duration,
) -> AnalysisMetrics {
    let purity = positive(parsed.purity_percentage)
        .unwrap_or_else(|| estimate_purity(artifact.size, artifact.path));
    let gypsum = positive(parsed.gypsum_content).unwrap_or(purity);
    let impurity = positive(parsed.impurity_content).unwrap_or(100.0 - purity);

    let particle_count = parsed
        .particle_count
        .filter(|count| *count > 0)
        .map(|count| count.min(i64::from(u32::MAX)) as u32)
        .unwrap_or_else(|| estimate_particle_count(artifact.size));

    let threshold =
        positive(parsed.threshold_value).unwrap_or_else(|| estimate_threshold(artifact.size));

    AnalysisMetrics {
        purity_percentage: purity,
        confidence: parsed.confidence(),
        gypsum_content_percentage: gypsum,
        impurity_content_percentage: impurity,
        calcite_content_percentage: impurity * CALCITE_SHARE,
        quartz_content_percentage: impurity * QUARTZ_SHARE,
        other_minerals_percentage: impurity * OTHER_SHARE,
        threshold_value: threshold,
        particle_count,
        analysis_time_ms: elapsed.as_millis().min(u128::from(u64::MAX)) as u64,
    }
}
