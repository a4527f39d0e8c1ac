//! Per-target report model.
//!
//! This is the stable JSON contract the presentation layer consumes. A
//! verdict carries a rule identifier, a message-template key and an ordered
//! argument list; final prose belongs to `report::render`, not here. The
//! model must stay deterministic for identical input artifacts.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::binary::{Binary, BinaryFormat, MachineKind, TargetVariant};
use crate::debuginfo::{DebugInfo, Language, PdbState};
use crate::error::AuditError;
use crate::policy::eval::FlaggedModule;
use crate::policy::rule_id;
use crate::util::version::ToolVersion;
use crate::SCHEMA_VERSION;

/// Message-template keys carried on verdicts.
pub mod template {
    pub const PASS_MEETS_MINIMUM: &str = "pass.meets-minimum";
    pub const FAIL_BELOW_POLICY: &str = "fail.toolchain-below-policy";
    pub const NA_MANAGED_CODE: &str = "na.managed-code";
    pub const NA_DEBUG_INFO_MISSING: &str = "na.debug-info-missing";
    pub const NA_DEBUG_INFO_STRIPPED: &str = "na.debug-info-stripped";
    pub const ERROR_UNSUPPORTED_FORMAT: &str = "error.unsupported-format";
    pub const ERROR_DEBUG_INFO_CORRUPT: &str = "error.debug-info-corrupt";
    pub const ERROR_POLICY_CONFIGURATION: &str = "error.policy-configuration";
    pub const ERROR_IO: &str = "error.io";
}

/// Top-level report for one audited target.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub tool: ToolInfo,
    /// Display name of the audited target.
    pub target: String,
    /// Facts about the resolved image; absent when resolution itself
    /// failed and the verdict is an error.
    pub image: Option<ImageInfo>,
    pub verdict: Verdict,
}

impl Report {
    pub fn new(target: impl Into<String>, image: Option<ImageInfo>, verdict: Verdict) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool: ToolInfo::current(),
            target: target.into(),
            image,
            verdict,
        }
    }
}

/// Tool metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl ToolInfo {
    pub fn current() -> Self {
        Self {
            name: crate::TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Resolved-image facts bound to a report.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub size_bytes: u64,
    pub hash: ImageHash,
    pub format: BinaryFormat,
    pub machine: MachineKind,
    pub bits: u8,
    pub variant: TargetVariant,
    pub debug_info: DebugInfoInfo,
}

impl ImageInfo {
    pub fn new(binary: &Binary, debug_info: &DebugInfo) -> Self {
        Self {
            size_bytes: binary.file_len(),
            hash: ImageHash {
                algorithm: "sha256".to_string(),
                value: binary.sha256().to_string(),
            },
            format: binary.format(),
            machine: binary.machine().clone(),
            bits: binary.bits(),
            variant: binary.variant(),
            debug_info: DebugInfoInfo::describe(debug_info),
        }
    }
}

/// Cryptographic image fingerprint.
#[derive(Debug, Clone, Serialize)]
pub struct ImageHash {
    pub algorithm: String,
    pub value: String,
}

/// How debug info resolved for the image.
#[derive(Debug, Clone, Serialize)]
pub struct DebugInfoInfo {
    pub kind: String,
    /// PDB targets only: loaded, missing or stripped.
    pub state: Option<String>,
    pub resolved_path: Option<String>,
    /// Captured load failure or absence reason, when one exists.
    pub detail: Option<String>,
    /// Paths probed during resolution, in probe order.
    pub probe_trace: Vec<String>,
}

impl DebugInfoInfo {
    pub fn describe(debug_info: &DebugInfo) -> Self {
        let state = match debug_info {
            DebugInfo::Pdb(pdb) => Some(
                match pdb.state() {
                    PdbState::Loaded => "loaded",
                    PdbState::Missing => "missing",
                    PdbState::Stripped => "stripped",
                }
                .to_string(),
            ),
            _ => None,
        };
        let resolved_path = match debug_info {
            DebugInfo::Pdb(pdb) => pdb
                .resolved_path()
                .map(|path| path.display().to_string()),
            _ => None,
        };
        Self {
            kind: debug_info.kind().to_string(),
            state,
            resolved_path,
            detail: debug_info.load_error().map(str::to_string),
            probe_trace: debug_info.probe_trace().to_vec(),
        }
    }
}

/// Terminal judgement for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictLevel {
    Pass,
    NotApplicable,
    Fail,
    Error,
}

impl VerdictLevel {
    pub fn exit_code(&self) -> i32 {
        match self {
            VerdictLevel::Pass | VerdictLevel::NotApplicable => 0,
            VerdictLevel::Fail => 1,
            VerdictLevel::Error => 2,
        }
    }
}

impl std::fmt::Display for VerdictLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VerdictLevel::Pass => "PASS",
            VerdictLevel::NotApplicable => "NOT_APPLICABLE",
            VerdictLevel::Fail => "FAIL",
            VerdictLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// One target's verdict: structured facts only, prose comes later.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub level: VerdictLevel,
    pub rule_id: String,
    /// Message-template key (see [`template`]).
    pub template: String,
    /// Ordered template arguments; the target display name is always
    /// first.
    pub args: Vec<String>,
    /// Flagged-module groups, Fail verdicts only.
    pub violations: Vec<ViolationGroup>,
    pub exit_code: i32,
}

impl Verdict {
    fn new(
        level: VerdictLevel,
        rule: &str,
        template: &str,
        args: Vec<String>,
        violations: Vec<ViolationGroup>,
    ) -> Self {
        Self {
            level,
            rule_id: rule.to_string(),
            template: template.to_string(),
            args,
            violations,
            exit_code: level.exit_code(),
        }
    }

    /// Pass, carrying the governing minimum-version text. The governing
    /// minimum is the one selected for the last evaluated module.
    pub fn pass(target: &str, governing_minimum: Option<&ToolVersion>) -> Self {
        let minimum = governing_minimum
            .map(ToolVersion::to_string)
            .unwrap_or_else(|| "none".to_string());
        Self::new(
            VerdictLevel::Pass,
            rule_id::MIN_TOOL_VERSION,
            template::PASS_MEETS_MINIMUM,
            vec![target.to_string(), minimum],
            Vec::new(),
        )
    }

    /// Fail, carrying the per-language required versions and the flagged
    /// modules coalesced by compiler identity.
    pub fn fail(target: &str, flagged: &[FlaggedModule]) -> Self {
        let violations = coalesce_violations(flagged);
        let args = vec![
            target.to_string(),
            required_versions_text(flagged),
            coalesced_modules_text(&violations),
        ];
        Self::new(
            VerdictLevel::Fail,
            fail_rule_id(flagged),
            template::FAIL_BELOW_POLICY,
            args,
            violations,
        )
    }

    pub fn not_applicable(target: &str, template: &str, detail: &str) -> Self {
        Self::new(
            VerdictLevel::NotApplicable,
            rule_id::APPLICABILITY,
            template,
            vec![target.to_string(), detail.to_string()],
            Vec::new(),
        )
    }

    /// A contained tool error; the batch continues past it.
    pub fn from_error(target: &str, error: &AuditError) -> Self {
        let template = match error {
            AuditError::UnsupportedFormat(_) => template::ERROR_UNSUPPORTED_FORMAT,
            AuditError::DebugInfoCorrupt(_) => template::ERROR_DEBUG_INFO_CORRUPT,
            AuditError::PolicyConfiguration(_) => template::ERROR_POLICY_CONFIGURATION,
            AuditError::DebugInfoUnavailable(_)
            | AuditError::SplitDebugFileMissing(_)
            | AuditError::Io { .. } => template::ERROR_IO,
        };
        Self::new(
            VerdictLevel::Error,
            rule_id::TOOL_ERROR,
            template,
            vec![target.to_string(), error.to_string()],
            Vec::new(),
        )
    }
}

/// Flagged modules with an identical toolchain/version/library tuple,
/// folded into one reportable row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationGroup {
    pub language: Language,
    pub compiler_name: String,
    pub front_version: ToolVersion,
    pub back_version: ToolVersion,
    pub library: Option<String>,
    /// The most demanding required minimum across the group.
    pub required: ToolVersion,
    /// Sorted, deduplicated rule identifiers violated by the group.
    pub rule_ids: Vec<String>,
    /// Sorted module names.
    pub modules: Vec<String>,
}

/// Coalesce flagged modules by (language, front, back, library). The sole
/// grouping routine for the reporting path; order is deterministic.
pub fn coalesce_violations(flagged: &[FlaggedModule]) -> Vec<ViolationGroup> {
    let mut groups: BTreeMap<(String, ToolVersion, ToolVersion, Option<String>), ViolationGroup> =
        BTreeMap::new();
    for flag in flagged {
        let module = &flag.module;
        let key = (
            module.language.policy_key().to_string(),
            module.front_version,
            module.back_version,
            module.library.clone(),
        );
        let group = groups.entry(key).or_insert_with(|| ViolationGroup {
            language: module.language,
            compiler_name: module.compiler_name.clone(),
            front_version: module.front_version,
            back_version: module.back_version,
            library: module.library.clone(),
            required: flag.required,
            rule_ids: Vec::new(),
            modules: Vec::new(),
        });
        group.required = group.required.max(flag.required);
        let rule = flag.kind.rule_id().to_string();
        if !group.rule_ids.contains(&rule) {
            group.rule_ids.push(rule);
        }
        group.modules.push(module.name.clone());
    }
    let mut groups: Vec<ViolationGroup> = groups.into_values().collect();
    for group in &mut groups {
        group.rule_ids.sort_unstable();
        group.modules.sort_unstable();
    }
    groups
}

/// "language requires version or later" per offending language, sorted by
/// language key and joined with "; ".
fn required_versions_text(flagged: &[FlaggedModule]) -> String {
    let mut per_language: BTreeMap<&'static str, (Language, ToolVersion)> = BTreeMap::new();
    for flag in flagged {
        let entry = per_language
            .entry(flag.module.language.policy_key())
            .or_insert((flag.module.language, flag.required));
        entry.1 = entry.1.max(flag.required);
    }
    per_language
        .values()
        .map(|(language, required)| format!("{language} requires {required} or later"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn coalesced_modules_text(groups: &[ViolationGroup]) -> String {
    groups
        .iter()
        .map(|group| {
            let compiler = if group.compiler_name.is_empty() {
                "unknown compiler"
            } else {
                group.compiler_name.as_str()
            };
            let mut piece = format!(
                "{} {} ({})",
                compiler, group.back_version, group.language
            );
            if let Some(library) = &group.library {
                piece.push_str(&format!(" from {library}"));
            }
            piece.push_str(&format!(": {} module(s)", group.modules.len()));
            piece
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// A Fail verdict carries one headline rule: version findings outrank
/// mitigation findings outrank warning findings.
fn fail_rule_id(flagged: &[FlaggedModule]) -> &'static str {
    use crate::policy::eval::ViolationKind;
    let mut headline = rule_id::CRITICAL_WARNINGS;
    for flag in flagged {
        match flag.kind {
            ViolationKind::ToolchainTooOld => return rule_id::MIN_TOOL_VERSION,
            ViolationKind::MitigationUnavailable | ViolationKind::MitigationDisabled => {
                headline = rule_id::SPECULATIVE_EXECUTION;
            }
            ViolationKind::CriticalWarnings { .. } => {}
        }
    }
    headline
}
