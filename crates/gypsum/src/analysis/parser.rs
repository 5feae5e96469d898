//! Parsing of the sentinel-delimited result block printed by the analysis macro.

pub const RESULTS_START: &str = "ANALYSIS_RESULTS_START";
pub const RESULTS_END: &str = "ANALYSIS_RESULTS_END";

const BASE_CONFIDENCE_TENTHS: u32 = 5;

/// Values recovered from the process output. `None` means the key was missing
/// or its value did not parse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResults {
    pub purity_percentage: Option<f64>,
    pub gypsum_content: Option<f64>,
    pub impurity_content: Option<f64>,
    pub particle_count: Option<i64>,
    pub total_area: Option<f64>,
    pub image_area: Option<f64>,
    pub threshold_value: Option<f64>,
}

impl ParsedResults {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Scores how much the parsed readings can be trusted, in `[0, 1]`.
    ///
    /// Only parsed values count, so output that needed fallback values
    /// stays at the base score.
    pub fn confidence(&self) -> f64 {
        // Scored in tenths so the sums stay exact.
        let mut tenths: u32 = BASE_CONFIDENCE_TENTHS;
        let particles = self.particle_count.unwrap_or(0);

        if particles > 10 {
            tenths += 2;
        }
        if particles > 50 {
            tenths += 2;
        }

        if let (Some(total), Some(image)) = (self.total_area, self.image_area) {
            if total > 0.0 && image > 0.0 {
                let coverage = total / image;
                if coverage > 0.1 && coverage < 0.9 {
                    tenths += 1;
                }
            }
        }

        (f64::from(tenths) / 10.0).clamp(0.0, 1.0)
    }
}

/// Extracts the first result block from `output`.
///
/// Without a start sentinel the result is empty. A block that is never closed
/// runs to the end of the output.
pub fn parse_output(output: &str) -> ParsedResults {
    let mut results = ParsedResults::default();
    let mut in_block = false;

    for line in output.lines() {
        let line = line.trim();

        if !in_block {
            in_block = line == RESULTS_START;
            continue;
        }
        if line == RESULTS_END {
            break;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "purity_percentage" => results.purity_percentage = parse_float(value),
            "gypsum_content" => results.gypsum_content = parse_float(value),
            "impurity_content" => results.impurity_content = parse_float(value),
            "particle_count" => results.particle_count = value.parse().ok(),
            "total_area" => results.total_area = parse_float(value),
            "image_area" => results.image_area = parse_float(value),
            "threshold_value" => results.threshold_value = parse_float(value),
            _ => {}
        }
    }

    results
}

fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
