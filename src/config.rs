use crate::{Location, Persist, ResultGraph};

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SUPERSTEPS: u64 = 1000;

/// Job settings. Unset result graph and persist modes fall back to what the
/// vertex program prefers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputerConfig {
    pub input_location: Option<Location>,
    pub output_location: Option<Location>,
    pub workers: usize,
    /// Hard bound on supersteps, whatever the program's predicate says.
    pub max_supersteps: u64,
    pub result_graph: Option<ResultGraph>,
    pub persist: Option<Persist>,
    pub overwrite_output: bool,
}

impl ComputerConfig {
    pub fn new(input: impl Into<Location>, output: impl Into<Location>) -> Self {
        ComputerConfig {
            input_location: Some(input.into()),
            output_location: Some(output.into()),
            ..ComputerConfig::default()
        }
    }
}

impl Default for ComputerConfig {
    fn default() -> Self {
        ComputerConfig {
            input_location: None,
            output_location: None,
            workers: num_cpus::get(),
            max_supersteps: DEFAULT_MAX_SUPERSTEPS,
            result_graph: None,
            persist: None,
            overwrite_output: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ComputerConfig = serde_json::from_str(
            r#"{"input_location": "data/modern", "output_location": "out/job", "persist": "edges"}"#,
        )
        .unwrap();

        assert_eq!(config.input_location, Some(Location::new("data/modern")));
        assert_eq!(config.persist, Some(Persist::Edges));
        assert_eq!(config.result_graph, None);
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.max_supersteps, DEFAULT_MAX_SUPERSTEPS);
        assert!(!config.overwrite_output);
    }
}
