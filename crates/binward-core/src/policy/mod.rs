//! Policy configuration.
//!
//! A policy is plain data: minimum tool versions keyed by language, an
//! allow-list of library exceptions, the set of enforced mitigation
//! classes, and the optional critical-warnings section. Loaded from JSON
//! or built from the compiled-in defaults. Malformed configuration is a
//! `PolicyConfiguration` error, kept distinct from policy violations so
//! operators can tell a broken policy from a failing binary.

pub mod eval;
pub mod mitigations;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::binary::TargetVariant;
use crate::debuginfo::Language;
use crate::error::{AuditError, Result};
use crate::util::version::ToolVersion;

/// Mitigation classes a policy may enforce beyond bare minimum versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MitigationClass {
    SpeculativeExecution,
}

/// Stable rule identifiers carried on every verdict.
pub mod rule_id {
    /// Compilation unit built by a toolchain below the policy minimum.
    pub const MIN_TOOL_VERSION: &str = "BW2006";
    /// Speculative-execution mitigation unavailable or switched off.
    pub const SPECULATIVE_EXECUTION: &str = "BW2024";
    /// Required compiler warning disabled or warning level too low.
    pub const CRITICAL_WARNINGS: &str = "BW2007";
    /// Target the policy does not apply to (managed, missing symbols).
    pub const APPLICABILITY: &str = "BW1001";
    /// The audit itself failed before a judgement could be made.
    pub const TOOL_ERROR: &str = "BW0001";
}

/// Key for the platform-special C/C++ minimum on embedded/console images.
pub const EMBEDDED_KEY: &str = "embedded-c-and-cxx";
/// Fallback key consulted when a language has no entry of its own.
pub const DEFAULT_KEY: &str = "default";

const RECOGNIZED_KEYS: &[&str] = &[
    "c",
    "cxx",
    "assembler",
    "resource-compiler",
    "csharp",
    "link-only",
    "unknown",
    DEFAULT_KEY,
    EMBEDDED_KEY,
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Policy {
    /// Minimum tool version per language key, plus the `default` and
    /// `embedded-c-and-cxx` special keys.
    pub minimum_tool_versions: BTreeMap<String, ToolVersion>,
    /// `"<library-file-name>,<language>"` (lower-case) to the version that
    /// exempts modules drawn from that library.
    pub allow_list: BTreeMap<String, ToolVersion>,
    pub enforced_mitigations: BTreeSet<MitigationClass>,
    /// Warning numbers that must not be effectively disabled. An empty
    /// list turns the critical-warnings check off entirely.
    pub required_compiler_warnings: Vec<u32>,
    pub minimum_warning_level: u8,
}

impl Default for Policy {
    fn default() -> Self {
        let mut minimum_tool_versions = BTreeMap::new();
        minimum_tool_versions.insert("c".to_string(), ToolVersion::new(17, 0, 65501, 17013));
        minimum_tool_versions.insert("cxx".to_string(), ToolVersion::new(17, 0, 65501, 17013));
        minimum_tool_versions.insert(EMBEDDED_KEY.to_string(), ToolVersion::new(16, 0, 11886, 0));
        Self {
            minimum_tool_versions,
            allow_list: BTreeMap::new(),
            enforced_mitigations: BTreeSet::new(),
            required_compiler_warnings: Vec::new(),
            minimum_warning_level: 3,
        }
    }
}

impl Policy {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| AuditError::io(path, err))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let policy: Policy = serde_json::from_str(text)
            .map_err(|err| AuditError::PolicyConfiguration(err.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<()> {
        for key in self.minimum_tool_versions.keys() {
            if !RECOGNIZED_KEYS.contains(&key.as_str()) {
                return Err(AuditError::PolicyConfiguration(format!(
                    "unrecognized language key in minimum_tool_versions: {key:?}"
                )));
            }
        }
        for key in self.allow_list.keys() {
            if key.split(',').count() != 2 {
                return Err(AuditError::PolicyConfiguration(format!(
                    "allow-list key {key:?} must be \"<library-file-name>,<language>\""
                )));
            }
            if *key != key.to_lowercase() {
                return Err(AuditError::PolicyConfiguration(format!(
                    "allow-list key {key:?} must be lower-case"
                )));
            }
        }
        if self.minimum_warning_level > 4 {
            return Err(AuditError::PolicyConfiguration(format!(
                "minimum_warning_level {} is out of range (0-4)",
                self.minimum_warning_level
            )));
        }
        Ok(())
    }

    /// The required minimum for a module: the platform-special C/C++
    /// minimum on embedded variants, else the per-language entry, else
    /// `default`. An unconfigured `unknown` language takes the maximal
    /// version, which no real toolchain reaches.
    pub fn minimum_for(&self, language: Language, variant: TargetVariant) -> ToolVersion {
        if variant == TargetVariant::Embedded
            && matches!(language, Language::C | Language::Cxx)
        {
            if let Some(version) = self.minimum_tool_versions.get(EMBEDDED_KEY) {
                return *version;
            }
        }
        if let Some(version) = self.minimum_tool_versions.get(language.policy_key()) {
            return *version;
        }
        if language == Language::Unknown {
            return ToolVersion::MAX;
        }
        self.minimum_tool_versions
            .get(DEFAULT_KEY)
            .copied()
            .unwrap_or(ToolVersion::ZERO)
    }

    /// Allow-list lookup for `"<basename>,<language>"`; the probe is
    /// lower-cased, the stored keys already are.
    pub fn allowed_minimum(&self, library_basename: &str, language: Language) -> Option<ToolVersion> {
        let key = format!(
            "{},{}",
            library_basename.to_lowercase(),
            language.policy_key()
        );
        self.allow_list.get(&key).copied()
    }
}
