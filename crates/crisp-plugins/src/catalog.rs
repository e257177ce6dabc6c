//! Model asset catalog
//!
//! Model files follow the `{model}-{task}-{variant}.onnx` convention, e.g.
//! `realesrgan-upscale_x4-fp16.onnx`. The model segment has no dashes, the
//! variant is a numeric precision, and everything between is the task.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub const MODEL_FILE_EXTENSION: &str = "onnx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    Int8,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Int8 => "int8",
        }
    }
}

impl FromStr for Precision {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fp32" => Ok(Precision::Fp32),
            "fp16" => Ok(Precision::Fp16),
            "int8" => Ok(Precision::Int8),
            other => Err(anyhow!("unknown model variant '{}'", other)),
        }
    }
}

/// Parsed model identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId {
    pub model: String,
    pub task: String,
    pub variant: Precision,
}

impl ModelId {
    pub fn parse(raw: &str) -> Result<Self> {
        let id = raw
            .strip_suffix(&format!(".{}", MODEL_FILE_EXTENSION))
            .unwrap_or(raw);

        let (model, rest) = id
            .split_once('-')
            .ok_or_else(|| anyhow!("model id '{}' has no task segment", raw))?;
        let (task, variant) = rest
            .rsplit_once('-')
            .ok_or_else(|| anyhow!("model id '{}' has no variant segment", raw))?;

        if model.is_empty() || task.is_empty() {
            return Err(anyhow!("model id '{}' has an empty segment", raw));
        }
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        };
        if !valid(model) || !valid(task) {
            return Err(anyhow!("model id '{}' contains invalid characters", raw));
        }

        Ok(Self {
            model: model.to_string(),
            task: task.to_string(),
            variant: variant.parse()?,
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}.{}", self, MODEL_FILE_EXTENSION)
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.model, self.task, self.variant.as_str())
    }
}

impl FromStr for ModelId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Findings of a catalog check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogReport {
    /// Referenced ids that do not follow the naming convention
    pub malformed: Vec<String>,
    /// Referenced ids with no matching asset
    pub missing: Vec<String>,
    /// Assets no referenced id uses
    pub unused: Vec<String>,
    /// Ids referenced more than once
    pub duplicates: Vec<String>,
}

impl CatalogReport {
    /// Unused assets are reported but do not fail the check
    pub fn is_ok(&self) -> bool {
        self.malformed.is_empty() && self.missing.is_empty() && self.duplicates.is_empty()
    }
}

/// Check `referenced` model ids against the asset file names in `available`
pub fn verify<'a, R, A>(referenced: R, available: A) -> CatalogReport
where
    R: IntoIterator<Item = &'a str>,
    A: IntoIterator<Item = &'a str>,
{
    let available: BTreeSet<&str> = available
        .into_iter()
        .filter(|name| name.ends_with(&format!(".{}", MODEL_FILE_EXTENSION)))
        .collect();

    let mut report = CatalogReport::default();
    let mut seen = HashSet::new();
    let mut used = HashSet::new();

    for raw in referenced {
        if !seen.insert(raw) {
            report.duplicates.push(raw.to_string());
            continue;
        }
        match ModelId::parse(raw) {
            Ok(id) => {
                let file = id.file_name();
                if available.contains(file.as_str()) {
                    used.insert(file);
                } else {
                    report.missing.push(id.to_string());
                }
            }
            Err(e) => {
                tracing::warn!(id = raw, error = %e, "Malformed model id");
                report.malformed.push(raw.to_string());
            }
        }
    }

    report.unused = available
        .into_iter()
        .filter(|name| !used.contains(*name))
        .map(str::to_string)
        .collect();
    report
}
