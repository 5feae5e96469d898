pub mod artifact;
pub mod fallback;
pub mod parser;
pub mod process;
pub mod runner;
pub mod script;

pub use artifact::Artifact;
pub use fallback::{fill_gaps, ArtifactAttributes};
pub use parser::{parse_output, ParsedResults, RESULTS_END, RESULTS_START};
pub use process::{Invocation, ProcessOutput};
pub use runner::{AnalysisRunner, RunnerSettings};
pub use script::{render_macro, ScriptFile};
