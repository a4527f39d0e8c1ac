//! PDB resolution and object-module loading for PE targets.
//!
//! Resolution probes, in order: the path recorded at link time, the
//! directory of the scanned binary, then each configured symbol search
//! location in both flat and symbol-server layout. Every probe lands in the
//! trace. The outcome is one of three terminal states, all queryable
//! without erroring:
//!
//! - `Loaded`: identity matched, module streams present
//! - `Missing`: nothing matched; the captured error says why
//! - `Stripped`: identity matched but the private symbol streams are
//!   gone; the captured error explains the reduced fidelity

use std::fs::File;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use pdb::FallibleIterator;
use tracing::{debug, info, warn};

use crate::binary::{Binary, CodeViewRecord};
use crate::error::{AuditError, Result};
use crate::util::version::ToolVersion;

use super::{Language, ObjectModule};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdbState {
    Loaded,
    Missing,
    Stripped,
}

/// Resolution outcome for one PE target.
#[derive(Debug)]
pub struct PdbDebugInfo {
    state: PdbState,
    resolved_path: Option<PathBuf>,
    load_error: Option<String>,
    probe_trace: Vec<String>,
    age: Option<u32>,
    signature: Option<u32>,
}

enum Probe {
    Match {
        age: u32,
        signature: u32,
        stripped: bool,
    },
    Mismatch(String),
    Unreadable(String),
    AbsentFile,
}

impl PdbDebugInfo {
    /// Resolve the PDB for `binary`. Failures are captured, never raised.
    pub fn resolve(binary: &Binary, symbol_search_paths: &[PathBuf]) -> Self {
        let Some(codeview) = binary.codeview() else {
            return Self::missing("image carries no CodeView debug-directory entry", Vec::new());
        };

        let mut trace = Vec::new();
        for candidate in candidate_paths(codeview, binary.path(), symbol_search_paths) {
            trace.push(candidate.display().to_string());
            match probe_candidate(&candidate, codeview) {
                Probe::Match {
                    age,
                    signature,
                    stripped,
                } => {
                    let (state, load_error) = if stripped {
                        (
                            PdbState::Stripped,
                            Some("private symbol streams are stripped".to_string()),
                        )
                    } else {
                        (PdbState::Loaded, None)
                    };
                    debug!(
                        pdb = %candidate.display(),
                        ?state,
                        "program database resolved"
                    );
                    return Self {
                        state,
                        resolved_path: Some(candidate),
                        load_error,
                        probe_trace: trace,
                        age: Some(age),
                        signature: Some(signature),
                    };
                }
                Probe::Mismatch(why) => trace.push(format!("  rejected: {why}")),
                Probe::Unreadable(why) => trace.push(format!("  unreadable: {why}")),
                Probe::AbsentFile => {}
            }
        }

        info!(target = %binary.path().display(), "no matching program database located");
        Self::missing("no matching program database located", trace)
    }

    fn missing(error: impl Into<String>, probe_trace: Vec<String>) -> Self {
        Self {
            state: PdbState::Missing,
            resolved_path: None,
            load_error: Some(error.into()),
            probe_trace,
            age: None,
            signature: None,
        }
    }

    pub fn state(&self) -> PdbState {
        self.state
    }

    pub fn resolved_path(&self) -> Option<&Path> {
        self.resolved_path.as_deref()
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Every candidate path probed, in probe order, with rejection notes.
    pub fn probe_trace(&self) -> &[String] {
        &self.probe_trace
    }

    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn signature(&self) -> Option<u32> {
        self.signature
    }

    /// Walk the DBI module list in file order. Each module's stream is
    /// opened while it is being read and released before the next is
    /// yielded; stopping early releases everything. A module whose stream
    /// fails to decode is yielded as `Unknown`. Missing and stripped
    /// targets yield nothing.
    pub fn visit_modules<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(ObjectModule) -> ControlFlow<()>,
    {
        if self.state != PdbState::Loaded {
            return Ok(());
        }
        let Some(path) = self.resolved_path.clone() else {
            return Ok(());
        };

        let file = File::open(&path).map_err(|err| AuditError::io(&path, err))?;
        let mut pdb = pdb::PDB::open(file).map_err(corrupt)?;
        let dbi = pdb.debug_information().map_err(corrupt)?;
        let mut modules = dbi.modules().map_err(corrupt)?;

        loop {
            let module = match modules.next() {
                Ok(Some(module)) => module,
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "module list unreadable, stopping walk");
                    self.load_error = Some(format!("module list unreadable: {err}"));
                    break;
                }
            };
            let object_module = read_module(&mut pdb, &module);
            if visit(object_module).is_break() {
                break;
            }
        }
        Ok(())
    }
}

fn corrupt(err: pdb::Error) -> AuditError {
    AuditError::DebugInfoCorrupt(err.to_string())
}

/// Candidate PDB locations in probe order.
fn candidate_paths(
    codeview: &CodeViewRecord,
    binary_path: &Path,
    symbol_search_paths: &[PathBuf],
) -> Vec<PathBuf> {
    let mut candidates = vec![codeview.path.clone()];
    let file_name = pdb_file_name(&codeview.path);

    if let (Some(name), Some(dir)) = (file_name.as_deref(), binary_path.parent()) {
        candidates.push(dir.join(name));
    }
    if let Some(name) = file_name.as_deref() {
        let server_key = symbol_server_key(codeview);
        for root in symbol_search_paths {
            candidates.push(root.join(name));
            candidates.push(root.join(name).join(&server_key).join(name));
        }
    }
    candidates.dedup();
    candidates
}

/// File name of the recorded PDB path. Link-time paths use Windows
/// separators regardless of the host, so both separators split.
fn pdb_file_name(recorded: &Path) -> Option<String> {
    let text = recorded.to_string_lossy();
    text.rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Symbol-server directory key: upper-case canonical GUID hex followed by
/// the age in bare lower-case hex.
fn symbol_server_key(codeview: &CodeViewRecord) -> String {
    format!(
        "{}{:x}",
        hex::encode_upper(codeview.canonical_guid()),
        codeview.age
    )
}

fn probe_candidate(path: &Path, codeview: &CodeViewRecord) -> Probe {
    if !path.is_file() {
        return Probe::AbsentFile;
    }
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => return Probe::Unreadable(err.to_string()),
    };
    let mut pdb = match pdb::PDB::open(file) {
        Ok(pdb) => pdb,
        Err(err) => return Probe::Unreadable(err.to_string()),
    };
    let pdb_info = match pdb.pdb_information() {
        Ok(info) => info,
        Err(err) => return Probe::Unreadable(err.to_string()),
    };

    if *pdb_info.guid.as_bytes() != codeview.canonical_guid() {
        return Probe::Mismatch(format!("guid mismatch ({})", pdb_info.guid));
    }

    let dbi = match pdb.debug_information() {
        Ok(dbi) => dbi,
        Err(err) => return Probe::Unreadable(err.to_string()),
    };
    // The debug directory's age may track either the info stream or the
    // DBI header, depending on the linker.
    let age_matches =
        pdb_info.age == codeview.age || dbi.age().is_some_and(|age| age == codeview.age);
    if !age_matches {
        return Probe::Mismatch(format!(
            "age mismatch (pdb {}, image {})",
            pdb_info.age, codeview.age
        ));
    }

    Probe::Match {
        age: pdb_info.age,
        signature: pdb_info.signature,
        stripped: is_stripped(&mut pdb, &dbi),
    }
}

/// A PDB is stripped when it lists modules but none of them kept a symbol
/// stream.
fn is_stripped<'s, S: pdb::Source<'s> + 's>(
    pdb: &mut pdb::PDB<'s, S>,
    dbi: &pdb::DebugInformation<'s>,
) -> bool {
    let Ok(mut modules) = dbi.modules() else {
        return false;
    };
    let mut saw_module = false;
    while let Ok(Some(module)) = modules.next() {
        saw_module = true;
        if matches!(pdb.module_info(&module), Ok(Some(_))) {
            return false;
        }
    }
    saw_module
}

fn read_module<'s, S: pdb::Source<'s> + 's>(
    pdb: &mut pdb::PDB<'s, S>,
    module: &pdb::Module<'_>,
) -> ObjectModule {
    let mut out = ObjectModule::unknown(module.module_name().into_owned());
    let library = module.object_file_name().into_owned();
    out.library = (!library.is_empty()).then_some(library);

    let info = match pdb.module_info(module) {
        Ok(Some(info)) => info,
        Ok(None) => {
            debug!(module = %out.name, "module has no symbol stream");
            return out;
        }
        Err(err) => {
            debug!(module = %out.name, %err, "module stream unreadable, degrading to unknown");
            return out;
        }
    };
    let mut symbols = match info.symbols() {
        Ok(symbols) => symbols,
        Err(err) => {
            debug!(module = %out.name, %err, "symbol stream unreadable, degrading to unknown");
            return out;
        }
    };

    loop {
        let symbol = match symbols.next() {
            Ok(Some(symbol)) => symbol,
            Ok(None) => break,
            Err(err) => {
                debug!(module = %out.name, %err, "symbol records truncated, keeping partial facts");
                break;
            }
        };
        match symbol.parse() {
            Ok(pdb::SymbolData::CompileFlags(flags)) => {
                out.language = map_language(flags.language);
                out.front_version = compiler_version(flags.frontend_version);
                out.back_version = compiler_version(flags.backend_version);
                out.compiler_name = flags.version_string.to_string().into_owned();
            }
            Ok(pdb::SymbolData::EnvBlock(env)) => {
                out.raw_command_line = env_value(&env, "cmd");
            }
            // Other record kinds and single undecodable records are not
            // this loader's business.
            _ => {}
        }
    }
    out
}

fn map_language(language: pdb::SourceLanguage) -> Language {
    use pdb::SourceLanguage as S;
    match language {
        S::C => Language::C,
        S::Cpp => Language::Cxx,
        S::Masm => Language::Assembler,
        S::Cvtres => Language::ResourceCompiler,
        S::CSharp => Language::CSharp,
        S::Link => Language::LinkOnly,
        _ => Language::Unknown,
    }
}

fn compiler_version(version: pdb::CompilerVersion) -> ToolVersion {
    ToolVersion::new(
        version.major.into(),
        version.minor.into(),
        version.build.into(),
        version.qfe.unwrap_or(0).into(),
    )
}

/// Environment blocks hold alternating key/value strings; `cmd` carries the
/// raw compiler invocation.
fn env_value(env: &pdb::EnvBlockSymbol<'_>, key: &str) -> Option<String> {
    for pair in env.rgsz.chunks_exact(2) {
        if pair[0].to_string().eq_ignore_ascii_case(key) {
            return Some(pair[1].to_string().into_owned());
        }
    }
    None
}
