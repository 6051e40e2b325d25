use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Structure representing the application configuration: input pathing plus
/// the decode-policy switches of the unpacker.
/// Configs are serializable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to an ONSEN network-dump file.
    pub dump_path: PathBuf,
    /// Stop after this many events; `None` processes the whole dump.
    pub max_events: Option<u64>,
    /// Do not log missing DATCON ROI branches (the condition is still flagged).
    pub ignore_datcon: bool,
    /// Do not log a wrong frame count in DHHC_START (still flagged).
    pub ignore_dhhc_frame_count: bool,
    /// Do not log DHPs missing from the DHH_START active mask (still flagged).
    pub ignore_dhp_mask: bool,
    /// Do not flag differing DHP port numbers between DHH and DHP headers.
    pub ignore_dhp_port_differ: bool,
    /// Tolerate the known empty/wrong-size DHP packets from the merger.
    pub ignore_empty_dhp: bool,
    /// Only unpack and check; do not store hits or ROIs.
    pub validate_only: bool,
}

impl Default for Config {
    /// Generate a new Config object with the unpacker's standard policy.
    fn default() -> Self {
        Self {
            dump_path: PathBuf::from("None"),
            max_events: None,
            ignore_datcon: true,
            ignore_dhhc_frame_count: true,
            ignore_dhp_mask: true,
            ignore_dhp_port_differ: true,
            ignore_empty_dhp: true,
            validate_only: false,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let config = Config {
            dump_path: PathBuf::from("/data/onsen_run42.dat"),
            max_events: Some(1000),
            ignore_dhp_port_differ: false,
            ..Config::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.dump_path, config.dump_path);
        assert_eq!(back.max_events, Some(1000));
        assert!(!back.ignore_dhp_port_differ);
        assert!(back.ignore_datcon);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Config::read_config_file(Path::new("/no/such/config.yml")).is_err());
    }
}
