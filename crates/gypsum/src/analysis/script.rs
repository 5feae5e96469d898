//! ImageJ macro handed to the analysis executable.

use std::path::{Path, PathBuf};

use crate::error::AnalysisError;

/// Renders the particle-analysis macro for `image_path`.
///
/// The macro prints its readings between the result sentinels understood by
/// [`super::parser::parse_output`].
pub fn render_macro(image_path: &Path) -> String {
    // ImageJ macro strings take forward slashes on every platform.
    let image = image_path
        .to_string_lossy()
        .replace('\\', "/")
        .replace('"', "\\\"");

    format!(
        r#"// Gypsum particle analysis
open("{image}");

if (bitDepth == 16) {{
    run("8-bit");
}}

run("Enhance Contrast", "saturated=0.35");
run("Gaussian Blur...", "sigma=1");

// Gypsum shows up as the light phase.
setAutoThreshold("Otsu");
run("Convert to Mask");
run("Analyze Particles...", "size=10-Infinity circularity=0.00-1.00 show=Outlines display clear include");

n = nResults;
imageArea = getWidth() * getHeight();
getThreshold(lower, upper);

print("{start}");
if (n > 0) {{
    totalArea = 0;
    for (i = 0; i < n; i++) {{
        totalArea = totalArea + getResult("Area", i);
    }}
    gypsum = (totalArea / imageArea) * 100;
    purity = minOf(maxOf(gypsum, 0), 100);
    print("purity_percentage:" + purity);
    print("gypsum_content:" + gypsum);
    print("impurity_content:" + (100 - gypsum));
    print("particle_count:" + n);
    print("total_area:" + totalArea);
    print("image_area:" + imageArea);
    print("threshold_value:" + lower);
}} else {{
    print("purity_percentage:0");
    print("gypsum_content:0");
    print("impurity_content:100");
    print("particle_count:0");
    print("total_area:0");
    print("image_area:" + imageArea);
    print("threshold_value:0");
}}
print("{end}");

close();
"#,
        image = image,
        start = super::parser::RESULTS_START,
        end = super::parser::RESULTS_END,
    )
}

/// A macro file on disk, deleted when dropped.
pub struct ScriptFile {
    path: PathBuf,
}

impl ScriptFile {
    /// Writes the macro for `image_path` to `path`.
    pub async fn write(path: PathBuf, image_path: &Path) -> Result<Self, AnalysisError> {
        match tokio::fs::write(&path, render_macro(image_path)).await {
            Ok(()) => Ok(Self { path }),
            Err(source) => {
                // A partial write may have left a file behind.
                let _ = std::fs::remove_file(&path);
                Err(AnalysisError::ScriptWrite { path, source })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "Failed to remove analysis macro {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::parser::{RESULTS_END, RESULTS_START};

    #[test]
    fn test_render_macro_references_image() {
        let script = render_macro(Path::new("/tmp/scratch/abc.png"));
        assert!(script.contains(r#"open("/tmp/scratch/abc.png");"#));
        assert!(script.contains(RESULTS_START));
        assert!(script.contains(RESULTS_END));
        assert!(script.contains("particle_count:"));
    }

    #[test]
    fn test_render_macro_normalizes_separators() {
        let script = render_macro(Path::new(r"C:\scratch\abc.png"));
        assert!(script.contains(r#"open("C:/scratch/abc.png");"#));
    }

    #[tokio::test]
    async fn test_script_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_macro.ijm");

        let script = ScriptFile::write(path.clone(), Path::new("/tmp/a.png"))
            .await
            .unwrap();
        assert_eq!(script.path(), path.as_path());
        assert!(path.exists());

        drop(script);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_script_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("job_macro.ijm");

        let result = ScriptFile::write(path, Path::new("/tmp/a.png")).await;
        assert!(matches!(result, Err(AnalysisError::ScriptWrite { .. })));
    }
}
