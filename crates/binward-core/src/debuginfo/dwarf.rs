//! DWARF reader for ELF and Mach-O targets.
//!
//! Decodes compile-unit headers and root attributes across DWARF 2 through
//! 5, answering three narrow queries per unit: DWARF version, source
//! language, and the recorded producer invocation. Split-DWARF skeletons
//! (DWARF 5 skeleton units, DWARF 4 GNU fission attributes) are chased to
//! their `.dwo` companion; a companion that cannot be found or parsed
//! degrades the unit to `Unknown` rather than failing the scan; the
//! skeleton's own header version stays reportable either way.

use std::borrow::Cow;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{constants, AttributeValue, EndianArcSlice, Reader as _, RunTimeEndian, UnitType};
use object::{Object, ObjectSection};
use tracing::{debug, warn};

use crate::binary::Binary;
use crate::error::{AuditError, Result};
use crate::util::version::ToolVersion;

use super::{Language, ObjectModule};

type Reader = EndianArcSlice<RunTimeEndian>;

/// DWARF debug info for one target. Section bytes are copied out of the
/// image at load, so the value stands alone once constructed.
#[derive(Debug)]
pub struct DwarfDebugInfo {
    dwarf: gimli::Dwarf<Reader>,
    binary_dir: PathBuf,
    probe_trace: Vec<String>,
    load_error: Option<String>,
}

impl DwarfDebugInfo {
    pub fn load(binary: &Binary) -> Result<Self> {
        let endian = if binary.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };
        let file = binary.object()?;
        let dwarf =
            gimli::Dwarf::load(|id| Ok::<_, gimli::Error>(section_reader(&file, Some(id.name()), endian)))
                .map_err(|err| AuditError::DebugInfoCorrupt(err.to_string()))?;
        let binary_dir = binary
            .path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Self {
            dwarf,
            binary_dir,
            probe_trace: Vec::new(),
            load_error: None,
        })
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Companion paths attempted so far, in probe order.
    pub fn probe_trace(&self) -> &[String] {
        &self.probe_trace
    }

    /// Walk compile units in `.debug_info` order. A unit that fails to
    /// decode is yielded as `Unknown` with its header version intact; a
    /// broken unit chain stops the walk without raising.
    pub fn visit_modules<F>(&mut self, mut visit: F) -> Result<()>
    where
        F: FnMut(ObjectModule) -> ControlFlow<()>,
    {
        let mut headers = self.dwarf.units();
        loop {
            let header = match headers.next() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "compile-unit chain unreadable, stopping walk");
                    self.load_error = Some(format!("compile-unit chain unreadable: {err}"));
                    break;
                }
            };
            let module = self.read_unit(header);
            if visit(module).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn read_unit(&mut self, header: gimli::UnitHeader<Reader>) -> ObjectModule {
        let version = header.version();
        match self.try_read_unit(header) {
            Ok(module) => module,
            Err(err) => {
                debug!(%err, "compile unit undecodable, degrading to unknown");
                let mut module = ObjectModule::unknown("<unreadable unit>");
                module.dwarf_version = Some(version);
                module
            }
        }
    }

    fn try_read_unit(
        &mut self,
        header: gimli::UnitHeader<Reader>,
    ) -> core::result::Result<ObjectModule, gimli::Error> {
        let version = header.version();
        let header_type = header.type_();
        let unit = self.dwarf.unit(header)?;
        let header_dwo_id = unit.dwo_id.map(|id| id.0);
        let facts = read_unit_facts(&self.dwarf, &unit)?;

        let mut module =
            ObjectModule::unknown(facts.name.clone().unwrap_or_else(|| "<unnamed unit>".into()));
        module.dwarf_version = Some(version);

        let is_skeleton = matches!(header_type, UnitType::Skeleton(_))
            || facts.is_skeleton_tag
            || facts.dwo_name.is_some();

        if is_skeleton {
            let want_id = header_dwo_id.or(facts.dwo_id);
            let companion = facts.dwo_name.as_deref().and_then(|dwo_name| {
                self.resolve_companion(dwo_name, facts.comp_dir.as_deref(), want_id)
            });
            // On a miss the unit stays Unknown with an empty command line;
            // the skeleton's own version is already recorded.
            if let Some(full) = companion {
                apply_facts(&mut module, &full);
            }
        } else {
            apply_facts(&mut module, &facts);
        }

        Ok(module)
    }

    /// Probe for a skeleton's `.dwo` companion: the recorded path, the
    /// compilation directory, then next to the scanned binary. Every probe
    /// lands in the trace. Misses log at informational severity or below.
    fn resolve_companion(
        &mut self,
        dwo_name: &str,
        comp_dir: Option<&str>,
        want_id: Option<u64>,
    ) -> Option<UnitFacts> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        let recorded = PathBuf::from(dwo_name);
        candidates.push(recorded.clone());
        if recorded.is_relative() {
            if let Some(dir) = comp_dir {
                candidates.push(Path::new(dir).join(&recorded));
            }
        }
        if let Some(file_name) = recorded.file_name() {
            candidates.push(self.binary_dir.join(file_name));
        }
        candidates.dedup();

        for candidate in candidates {
            self.probe_trace
                .push(format!("dwo probe: {}", candidate.display()));
            if !candidate.is_file() {
                continue;
            }
            match load_companion_unit(&candidate, want_id) {
                Ok(facts) => return Some(facts),
                Err(err) => {
                    debug!(path = %candidate.display(), error = %err, "companion unusable");
                    self.probe_trace
                        .push(format!("dwo unusable: {} ({err})", candidate.display()));
                }
            }
        }
        debug!(dwo_name, "split debug file missing, unit degrades to unknown");
        None
    }
}

/// Root-DIE attributes of one unit, owned.
#[derive(Debug, Default, Clone)]
struct UnitFacts {
    name: Option<String>,
    comp_dir: Option<String>,
    producer: Option<String>,
    language: Option<(Language, Option<&'static str>)>,
    dwo_name: Option<String>,
    dwo_id: Option<u64>,
    is_skeleton_tag: bool,
}

fn read_unit_facts(
    dwarf: &gimli::Dwarf<Reader>,
    unit: &gimli::Unit<Reader>,
) -> core::result::Result<UnitFacts, gimli::Error> {
    let mut facts = UnitFacts::default();
    let mut entries = unit.entries();
    let Some((_, root)) = entries.next_dfs()? else {
        return Ok(facts);
    };
    facts.is_skeleton_tag = root.tag() == constants::DW_TAG_skeleton_unit;

    let mut attrs = root.attrs();
    while let Some(attr) = attrs.next()? {
        match attr.name() {
            constants::DW_AT_name => {
                facts.name = attr_to_string(dwarf, unit, attr.value());
            }
            constants::DW_AT_comp_dir => {
                facts.comp_dir = attr_to_string(dwarf, unit, attr.value());
            }
            constants::DW_AT_producer => {
                facts.producer = attr_to_string(dwarf, unit, attr.value());
            }
            constants::DW_AT_language => {
                if let Some(code) = language_code(attr.value()) {
                    facts.language = Some(map_language(code));
                }
            }
            constants::DW_AT_dwo_name | constants::DW_AT_GNU_dwo_name => {
                facts.dwo_name = attr_to_string(dwarf, unit, attr.value());
            }
            constants::DW_AT_GNU_dwo_id => {
                facts.dwo_id = attr.udata_value();
            }
            _ => {}
        }
    }
    Ok(facts)
}

fn apply_facts(module: &mut ObjectModule, facts: &UnitFacts) {
    if let Some(name) = &facts.name {
        module.name = name.clone();
    }
    if let Some((language, detail)) = facts.language {
        module.language = language;
        module.language_detail = detail.map(str::to_string);
    }
    if let Some(producer) = &facts.producer {
        module.raw_command_line = Some(producer.clone());
        module.compiler_name = compiler_name_of(producer);
        let version = producer_version(producer).unwrap_or(ToolVersion::ZERO);
        // DWARF producers do not distinguish front from back end.
        module.front_version = version;
        module.back_version = version;
    }
}

/// Load the full unit out of a `.dwo` companion, preferring a unit whose
/// dwo-id matches the skeleton's when one is known.
fn load_companion_unit(
    path: &Path,
    want_id: Option<u64>,
) -> core::result::Result<UnitFacts, String> {
    let bytes = std::fs::read(path).map_err(|err| err.to_string())?;
    let file = object::File::parse(&*bytes).map_err(|err| err.to_string())?;
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let mut dwarf =
        gimli::Dwarf::load(|id| Ok::<_, gimli::Error>(section_reader(&file, id.dwo_name(), endian)))
            .map_err(|err| err.to_string())?;
    dwarf.file_type = gimli::DwarfFileType::Dwo;

    let mut fallback: Option<UnitFacts> = None;
    let mut headers = dwarf.units();
    while let Some(header) = headers.next().map_err(|err| err.to_string())? {
        let header_id = match header.type_() {
            UnitType::SplitCompilation(id) => Some(id.0),
            _ => None,
        };
        let unit = dwarf.unit(header).map_err(|err| err.to_string())?;
        let unit_id = header_id.or(unit.dwo_id.map(|id| id.0));
        let facts = read_unit_facts(&dwarf, &unit).map_err(|err| err.to_string())?;
        let unit_id = unit_id.or(facts.dwo_id);

        match (want_id, unit_id) {
            (Some(want), Some(found)) if want == found => return Ok(facts),
            _ => {
                if fallback.is_none() {
                    fallback = Some(facts);
                }
            }
        }
    }
    fallback.ok_or_else(|| "companion holds no compile unit".to_string())
}

fn section_reader(file: &object::File<'_>, name: Option<&str>, endian: RunTimeEndian) -> Reader {
    let data = name
        .and_then(|name| file.section_by_name(name))
        .and_then(|section| section.uncompressed_data().ok())
        .unwrap_or(Cow::Borrowed(&[]));
    EndianArcSlice::new(Arc::from(&*data), endian)
}

fn attr_to_string(
    dwarf: &gimli::Dwarf<Reader>,
    unit: &gimli::Unit<Reader>,
    value: AttributeValue<Reader>,
) -> Option<String> {
    let reader = dwarf.attr_string(unit, value).ok()?;
    Some(reader.to_string_lossy().ok()?.into_owned())
}

fn language_code(value: AttributeValue<Reader>) -> Option<constants::DwLang> {
    match value {
        AttributeValue::Language(code) => Some(code),
        AttributeValue::Udata(code) => Some(constants::DwLang(code as u16)),
        _ => None,
    }
}

fn map_language(code: constants::DwLang) -> (Language, Option<&'static str>) {
    use gimli::constants::*;
    match code {
        DW_LANG_C => (Language::C, None),
        DW_LANG_C89 => (Language::C, Some("C89")),
        DW_LANG_C99 => (Language::C, Some("C99")),
        DW_LANG_C11 => (Language::C, Some("C11")),
        DW_LANG_C17 => (Language::C, Some("C17")),
        DW_LANG_C_plus_plus => (Language::Cxx, None),
        DW_LANG_C_plus_plus_03 => (Language::Cxx, Some("C++03")),
        DW_LANG_C_plus_plus_11 => (Language::Cxx, Some("C++11")),
        DW_LANG_C_plus_plus_14 => (Language::Cxx, Some("C++14")),
        DW_LANG_C_plus_plus_17 => (Language::Cxx, Some("C++17")),
        DW_LANG_C_plus_plus_20 => (Language::Cxx, Some("C++20")),
        DW_LANG_Mips_Assembler => (Language::Assembler, None),
        _ => (Language::Unknown, None),
    }
}

/// First dotted numeric token in a producer string; distribution suffixes
/// after a dash ("14.0.0-1ubuntu1") are trimmed.
fn producer_version(producer: &str) -> Option<ToolVersion> {
    producer.split_whitespace().find_map(|token| {
        let token = token.split('-').next().unwrap_or(token);
        if token.contains('.') && token.starts_with(|c: char| c.is_ascii_digit()) {
            token.parse::<ToolVersion>().ok()
        } else {
            None
        }
    })
}

/// Producer text up to the first flag token.
fn compiler_name_of(producer: &str) -> String {
    producer
        .split_whitespace()
        .take_while(|token| !token.starts_with('-'))
        .collect::<Vec<_>>()
        .join(" ")
}
