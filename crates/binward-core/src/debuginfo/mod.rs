//! Debug-metadata ingestion.
//!
//! Responsibilities:
//! - resolve the debug-info source for a resolved binary: a PDB for PE
//!   targets, in-image DWARF for ELF and Mach-O
//! - yield one toolchain fact sheet per compilation unit, in file order,
//!   degrading a unit to `Unknown` on decode failure instead of aborting
//!
//! Non-responsibilities:
//! - policy judgement (see `policy`)
//! - command-line interpretation (see `cmdline`)

pub mod dwarf;
pub mod pdb;

use std::fmt;
use std::ops::ControlFlow;
use std::path::PathBuf;

use serde::Serialize;

use crate::binary::{Binary, BinaryFormat};
use crate::error::Result;
use crate::util::version::ToolVersion;

pub use dwarf::DwarfDebugInfo;
pub use pdb::{PdbDebugInfo, PdbState};

/// Source language of one compilation unit, folded down to what policy
/// distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Language {
    C,
    Cxx,
    Assembler,
    ResourceCompiler,
    #[serde(rename = "csharp")]
    CSharp,
    LinkOnly,
    Unknown,
}

impl Language {
    /// Stable lower-case key used in policy maps and allow-list entries.
    pub fn policy_key(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "cxx",
            Language::Assembler => "assembler",
            Language::ResourceCompiler => "resource-compiler",
            Language::CSharp => "csharp",
            Language::LinkOnly => "link-only",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::C => "C",
            Language::Cxx => "C++",
            Language::Assembler => "assembler",
            Language::ResourceCompiler => "resource compiler",
            Language::CSharp => "C#",
            Language::LinkOnly => "link",
            Language::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One compilation unit's toolchain fact sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectModule {
    /// Module name as recorded (object path or source file).
    pub name: String,
    pub language: Language,
    /// Dialect the debug info pins down, e.g. "C99" or "C++14".
    pub language_detail: Option<String>,
    /// Compiler self-description ("Microsoft (R) Optimizing Compiler",
    /// "GNU C17 9.4.0"). Empty when the unit carries none.
    pub compiler_name: String,
    pub front_version: ToolVersion,
    pub back_version: ToolVersion,
    /// Originating static library, when the unit was drawn from one.
    pub library: Option<String>,
    /// The raw compiler invocation recorded for the unit.
    pub raw_command_line: Option<String>,
    /// DWARF-sourced units only, 2 through 5.
    pub dwarf_version: Option<u16>,
}

impl ObjectModule {
    /// The degrade target for a unit that failed to decode.
    pub fn unknown(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: Language::Unknown,
            language_detail: None,
            compiler_name: String::new(),
            front_version: ToolVersion::ZERO,
            back_version: ToolVersion::ZERO,
            library: None,
            raw_command_line: None,
            dwarf_version: None,
        }
    }
}

/// Why no module stream is available for a target.
#[derive(Debug, Clone)]
pub struct AbsentDebugInfo {
    reason: String,
}

impl AbsentDebugInfo {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The debug-info source resolved for one target. At most one per binary.
#[derive(Debug)]
pub enum DebugInfo {
    Pdb(PdbDebugInfo),
    Dwarf(DwarfDebugInfo),
    Absent(AbsentDebugInfo),
}

impl DebugInfo {
    /// Resolve debug info for `binary`: the PDB path for PE, in-image DWARF
    /// for everything else. Resolution failures are captured in the returned
    /// value, not raised; only an unreadable image itself errors.
    pub fn resolve(binary: &Binary, symbol_search_paths: &[PathBuf]) -> Result<DebugInfo> {
        match binary.format() {
            BinaryFormat::Pe => Ok(DebugInfo::Pdb(PdbDebugInfo::resolve(
                binary,
                symbol_search_paths,
            ))),
            BinaryFormat::Elf | BinaryFormat::MachO => {
                if binary.has_dwarf() {
                    Ok(DebugInfo::Dwarf(DwarfDebugInfo::load(binary)?))
                } else {
                    Ok(DebugInfo::Absent(AbsentDebugInfo::new(
                        "no DWARF debug sections present",
                    )))
                }
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DebugInfo::Pdb(_) => "pdb",
            DebugInfo::Dwarf(_) => "dwarf",
            DebugInfo::Absent(_) => "absent",
        }
    }

    /// The captured load failure, when one occurred. Never panics.
    pub fn load_error(&self) -> Option<&str> {
        match self {
            DebugInfo::Pdb(pdb) => pdb.load_error(),
            DebugInfo::Dwarf(dwarf) => dwarf.load_error(),
            DebugInfo::Absent(absent) => Some(absent.reason()),
        }
    }

    /// Every path probed while resolving, in probe order.
    pub fn probe_trace(&self) -> &[String] {
        match self {
            DebugInfo::Pdb(pdb) => pdb.probe_trace(),
            DebugInfo::Dwarf(dwarf) => dwarf.probe_trace(),
            DebugInfo::Absent(_) => &[],
        }
    }

    /// Walk the object modules in file order. The callback may stop early
    /// with `ControlFlow::Break`; per-unit streams are released as the walk
    /// advances and on early stop. Walking again re-opens the source.
    pub fn visit_modules<F>(&mut self, visit: F) -> Result<()>
    where
        F: FnMut(ObjectModule) -> ControlFlow<()>,
    {
        match self {
            DebugInfo::Pdb(pdb) => pdb.visit_modules(visit),
            DebugInfo::Dwarf(dwarf) => dwarf.visit_modules(visit),
            DebugInfo::Absent(_) => Ok(()),
        }
    }
}
