//! Static audit of native binaries against a toolchain policy.
//!
//! Pipeline per target: resolve the container format, resolve debug info
//! (a PDB for PE images, in-image DWARF for ELF and Mach-O), walk one
//! toolchain fact sheet per compilation unit, judge each against the
//! policy and fold the outcome into a single verdict. Targets are
//! independent; callers may fan a batch out across a worker pool and the
//! core keeps every scan self-contained.

pub mod binary;
pub mod cmdline;
pub mod debuginfo;
pub mod error;
pub mod policy;
pub mod report;
pub mod util;

use std::path::{Path, PathBuf};

use tracing::info;

use binary::Binary;
use debuginfo::{DebugInfo, PdbState};
use policy::{eval, Policy};
use report::model::{template, DebugInfoInfo, ImageInfo, Report, Verdict};

pub const TOOL_NAME: &str = "binward";

/// JSON schema version of reports.
/// This must be bumped only when the report contract changes semantically.
pub const SCHEMA_VERSION: &str = "0.1.0";

/// Per-process audit options beyond the policy itself.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    /// Extra roots probed while resolving a PDB, tried in order after the
    /// paths recorded in the image.
    pub symbol_search_paths: Vec<PathBuf>,
}

/// Audit one target. Total: every failure folds into the returned
/// report's verdict, so a batch never aborts on one bad target.
pub fn audit_target(path: &Path, policy: &Policy, options: &AuditOptions) -> Report {
    let target = path.display().to_string();
    match audit_inner(path, policy, options) {
        Ok(report) => report,
        Err(error) => Report::new(&target, None, Verdict::from_error(&target, &error)),
    }
}

fn audit_inner(path: &Path, policy: &Policy, options: &AuditOptions) -> error::Result<Report> {
    let binary = Binary::load(path)?;
    let target = path.display().to_string();

    let mut debug_info = DebugInfo::resolve(&binary, &options.symbol_search_paths)?;
    let mut image = ImageInfo::new(&binary, &debug_info);

    if binary.is_managed() {
        let verdict = Verdict::not_applicable(
            &target,
            template::NA_MANAGED_CODE,
            "CLR metadata directory present",
        );
        return Ok(Report::new(&target, Some(image), verdict));
    }

    match &debug_info {
        DebugInfo::Absent(absent) => {
            let detail = absent.reason().to_string();
            let verdict = Verdict::not_applicable(&target, template::NA_DEBUG_INFO_MISSING, &detail);
            return Ok(Report::new(&target, Some(image), verdict));
        }
        DebugInfo::Pdb(pdb) => match pdb.state() {
            PdbState::Missing => {
                let detail = pdb
                    .load_error()
                    .unwrap_or("no matching program database located")
                    .to_string();
                let verdict =
                    Verdict::not_applicable(&target, template::NA_DEBUG_INFO_MISSING, &detail);
                return Ok(Report::new(&target, Some(image), verdict));
            }
            PdbState::Stripped => {
                let detail = pdb
                    .load_error()
                    .unwrap_or("private symbol streams removed")
                    .to_string();
                let verdict =
                    Verdict::not_applicable(&target, template::NA_DEBUG_INFO_STRIPPED, &detail);
                return Ok(Report::new(&target, Some(image), verdict));
            }
            PdbState::Loaded => {}
        },
        DebugInfo::Dwarf(_) => {}
    }

    let evaluation = eval::evaluate(policy, binary.machine(), binary.variant(), &mut debug_info)?;
    // Split-DWARF companion probes land in the trace during the module
    // walk, so the snapshot taken at resolution time is refreshed here.
    image.debug_info = DebugInfoInfo::describe(&debug_info);
    let verdict = if evaluation.passed() {
        Verdict::pass(&target, evaluation.governing_minimum.as_ref())
    } else {
        Verdict::fail(&target, &evaluation.flagged)
    };
    info!(
        target = %target,
        verdict = %verdict.level,
        modules_seen = evaluation.modules_seen,
        modules_checked = evaluation.modules_checked,
        "audit complete"
    );
    Ok(Report::new(&target, Some(image), verdict))
}
