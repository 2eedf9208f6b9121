//! JSON parameter snapshot written once per run

use neurodaq_core::{DaqResult, ParameterSet};
use neurodaq_telemetry::ParameterSnapshot;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Snapshot collaborator serializing the parameter sets of every module
/// as one JSON object per module
pub struct JsonParameterSnapshot {
    sections: Vec<(String, ParameterSet)>,
}

impl JsonParameterSnapshot {
    /// `sections` pairs each module name with its current parameters
    pub fn new(sections: Vec<(String, ParameterSet)>) -> Self {
        JsonParameterSnapshot { sections }
    }
}

impl ParameterSnapshot for JsonParameterSnapshot {
    fn write_snapshot(&self, path: &Path) -> DaqResult<()> {
        let mut root = serde_json::Map::new();
        for (module, params) in &self.sections {
            let mut section = serde_json::Map::new();
            for (name, value) in params.iter() {
                let json = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
                section.insert(name.to_string(), json);
            }
            root.insert(module.clone(), serde_json::Value::Object(section));
        }

        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &serde_json::Value::Object(root))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_round_trip() {
        let mut params = ParameterSet::new();
        params.set("rate", 100.0);
        params.set("channels", 2usize);
        let snapshot = JsonParameterSnapshot::new(vec![("SyntheticSource".to_string(), params)]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.prm");
        snapshot.write_snapshot(&path).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["SyntheticSource"]["rate"], 100.0);
        assert_eq!(parsed["SyntheticSource"]["channels"], 2);
    }
}
