//! Shared fixture builders for integration tests.
//!
//! Real toolchain output is impractical to check in, so fixtures are built
//! byte by byte: DWARF sections by hand inside ELF carriers, minimal PE
//! images, and minimal MSF program databases. The builders emit exactly
//! the records the audit pipeline consumes.

pub mod dwarf;
pub mod pdb;
pub mod pe;

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use binward_core::binary::Binary;
use binward_core::debuginfo::{DebugInfo, ObjectModule};
use binward_core::policy::Policy;
use binward_core::report::Report;
use binward_core::AuditOptions;

/// Debug-directory GUID shared by the PE and PDB builders, stored the way
/// both formats store it on disk (first three fields little-endian).
pub const FIXTURE_GUID: [u8; 16] = [
    0x44, 0x33, 0x22, 0x11, 0x66, 0x55, 0x88, 0x77, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    0x01,
];

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}

pub fn audit(path: &Path, policy: &Policy) -> Report {
    binward_core::audit_target(path, policy, &AuditOptions::default())
}

/// A policy every recognized module passes, including Unknown ones.
pub fn permissive_policy() -> Policy {
    Policy::from_json(
        r#"{ "minimum_tool_versions": { "default": "0.0.0.0", "unknown": "0.0.0.0" } }"#,
    )
    .expect("permissive policy")
}

/// Load a target and collect every object-module fact sheet in file order.
pub fn collect_modules(path: &Path) -> Vec<ObjectModule> {
    let binary = Binary::load(path).expect("load binary");
    let mut debug_info = DebugInfo::resolve(&binary, &[]).expect("resolve debug info");
    let mut modules = Vec::new();
    debug_info
        .visit_modules(|module| {
            modules.push(module);
            ControlFlow::Continue(())
        })
        .expect("visit modules");
    modules
}
