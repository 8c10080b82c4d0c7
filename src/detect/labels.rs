use anyhow::{Context, Result};
use std::path::Path;

const UNKNOWN: &str = "unknown";

/// Class id to label lookup, one label per line
#[derive(Clone, Debug, Default)]
pub struct ClassLabels {
    names: Vec<String>,
}

impl ClassLabels {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read labels from {}", path.display()))?;
        let labels = Self::parse(&text);
        tracing::info!("Loaded {} class labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    pub fn parse(text: &str) -> Self {
        let names = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn describe(&self, class_id: u32) -> &str {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or(UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_lines() {
        let labels = ClassLabels::parse("BACKGROUND\n\n  ball  \r\n");
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.describe(0), "BACKGROUND");
        assert_eq!(labels.describe(1), "ball");
    }

    #[test]
    fn out_of_range_is_unknown() {
        let labels = ClassLabels::parse("ball");
        assert_eq!(labels.describe(7), "unknown");
        assert_eq!(ClassLabels::default().describe(0), "unknown");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "person\nball\n").unwrap();

        let labels = ClassLabels::load(&path).unwrap();
        assert_eq!(labels.describe(1), "ball");
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClassLabels::load(dir.path().join("missing.txt")).is_err());
    }
}
