//! Run configuration for [`FieldCombiner`](crate::combine::FieldCombiner).

use crate::combine_error::CombineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Knobs of one combination run.
///
/// Parallel switches only take effect with the `rayon` feature; results are
/// identical either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombineConfig {
    /// File name of the output container inside the output directory.
    pub output_name: String,
    /// Extension of rank files; other files in the source directory are skipped.
    pub rank_extension: String,
    /// Restrict the run to these fields (all fields when `None`).
    pub fields: Option<Vec<String>>,
    /// Assemble different fields concurrently.
    pub parallel_fields: bool,
    /// Read the rank buffers of one field concurrently.
    pub parallel_reads: bool,
    /// Copy tile interiors plane-parallel.
    pub parallel_copy: bool,
}

impl Default for CombineConfig {
    fn default() -> Self {
        Self {
            output_name: "combined.json".to_string(),
            rank_extension: crate::io::json::DEFAULT_RANK_EXTENSION.to_string(),
            fields: None,
            parallel_fields: false,
            parallel_reads: true,
            parallel_copy: true,
        }
    }
}

impl CombineConfig {
    /// Fully serial, for reproducing a run step by step.
    pub fn serial() -> Self {
        Self {
            parallel_fields: false,
            parallel_reads: false,
            parallel_copy: false,
            ..Self::default()
        }
    }

    /// Defaults for netCDF rank files and output.
    pub fn netcdf() -> Self {
        Self {
            output_name: "combined.nc".to_string(),
            rank_extension: "nc".to_string(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CombineError> {
        Self::overlay_json_file(Self::default(), path)
    }

    /// Load from a JSON file; missing keys keep their values from `base`.
    pub fn overlay_json_file(base: Self, path: impl AsRef<Path>) -> Result<Self, CombineError> {
        let path = path.as_ref();
        let bad =
            |e: &dyn std::fmt::Display| CombineError::Config(format!("{}: {e}", path.display()));
        let text = fs::read_to_string(path).map_err(|e| bad(&e))?;
        let overrides: Map<String, Value> = serde_json::from_str(&text).map_err(|e| bad(&e))?;
        let Value::Object(mut merged) = serde_json::to_value(base).map_err(|e| bad(&e))? else {
            return Err(bad(&"configuration is not a JSON object"));
        };
        merged.extend(overrides);
        let cfg: Self = serde_json::from_value(Value::Object(merged)).map_err(|e| bad(&e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), CombineError> {
        if self.output_name.is_empty() {
            return Err(CombineError::Config("output_name must not be empty".into()));
        }
        if self.output_name.contains(['/', '\\']) {
            return Err(CombineError::Config(format!(
                "output_name `{}` must be a plain file name",
                self.output_name
            )));
        }
        if self.rank_extension.is_empty() {
            return Err(CombineError::Config("rank_extension must not be empty".into()));
        }
        if let Some(fields) = &self.fields {
            if fields.is_empty() {
                return Err(CombineError::Config("field filter is empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "fields": ["T"], "parallel_fields": true }"#).unwrap();
        let cfg = CombineConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.fields, Some(vec!["T".to_string()]));
        assert!(cfg.parallel_fields);
        assert_eq!(cfg.output_name, "combined.json");
    }

    #[test]
    fn overlay_keeps_the_base_for_missing_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "parallel_reads": false }"#).unwrap();
        let cfg = CombineConfig::overlay_json_file(CombineConfig::netcdf(), &path).unwrap();
        assert_eq!(cfg.output_name, "combined.nc");
        assert_eq!(cfg.rank_extension, "nc");
        assert!(!cfg.parallel_reads);
    }

    #[test]
    fn overlay_rejects_unknown_value_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{ "parallel_reads": "yes" }"#).unwrap();
        assert!(matches!(
            CombineConfig::overlay_json_file(CombineConfig::default(), &path),
            Err(CombineError::Config(_))
        ));
    }

    #[test]
    fn output_name_must_be_a_file_name() {
        let cfg = CombineConfig {
            output_name: "../x.json".into(),
            ..CombineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(CombineError::Config(_))));
    }
}
