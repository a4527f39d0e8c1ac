//! Binary container resolution.
//!
//! Responsibilities:
//! - sniff the container format from header magic, in a fixed order
//!   (PE, then ELF, then Mach-O), reading no more than the magic requires
//! - expose one uniform capability handle over the resolved image: machine
//!   kind, bit-width, sections, exports, debug-info references
//!
//! Non-responsibilities:
//! - decoding debug info (see `debuginfo`)
//! - judging anything against policy (see `policy`)

pub(crate) mod pe;
pub mod read;

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use object::{Object, ObjectSection, SectionKind};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{AuditError, Result};
use read::MappedFile;

/// Container format of a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryFormat {
    Pe,
    Elf,
    MachO,
}

impl fmt::Display for BinaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinaryFormat::Pe => "PE",
            BinaryFormat::Elf => "ELF",
            BinaryFormat::MachO => "Mach-O",
        };
        f.write_str(name)
    }
}

/// Machine kind, folded down to what mitigation policy distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MachineKind {
    X86,
    X64,
    Arm,
    Arm64,
    Other(String),
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineKind::X86 => f.write_str("x86"),
            MachineKind::X64 => f.write_str("x64"),
            MachineKind::Arm => f.write_str("arm"),
            MachineKind::Arm64 => f.write_str("arm64"),
            MachineKind::Other(name) => f.write_str(name),
        }
    }
}

/// Standard user-mode image, or a console/firmware image that takes the
/// platform-special policy minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TargetVariant {
    #[default]
    Standard,
    Embedded,
}

/// The debug-directory identity a PE image records for its PDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeViewRecord {
    /// PDB path as written at link time.
    pub path: PathBuf,
    /// GUID bytes exactly as stored in the image (first three fields
    /// little-endian).
    pub guid: [u8; 16],
    pub age: u32,
}

impl CodeViewRecord {
    /// The stored GUID with its first three fields byte-swapped into
    /// canonical order, comparable against a PDB's own identity.
    pub fn canonical_guid(&self) -> [u8; 16] {
        let mut guid = self.guid;
        guid[0..4].reverse();
        guid[4..6].reverse();
        guid[6..8].reverse();
        guid
    }
}

/// The DWARF-bearing section buffers a resolved image exposes. Absent
/// sections yield empty buffers.
#[derive(Debug)]
pub struct DwarfSections<'a> {
    pub info: Cow<'a, [u8]>,
    pub abbrev: Cow<'a, [u8]>,
    pub strings: Cow<'a, [u8]>,
    pub line: Cow<'a, [u8]>,
    pub frame: Cow<'a, [u8]>,
    pub eh_frame: Cow<'a, [u8]>,
}

#[derive(Debug)]
struct ImageFacts {
    machine: MachineKind,
    bits: u8,
    little_endian: bool,
    variant: TargetVariant,
    managed: bool,
    codeview: Option<CodeViewRecord>,
    exports: Vec<String>,
    relative_base: u64,
    code_offset: Option<u64>,
    text_address: Option<u64>,
    data_address: Option<u64>,
}

/// Uniform handle over one resolved target.
///
/// Owns the file mapping for exactly one scan; dropping the handle unmaps
/// the target on every exit path. Basic image facts are harvested eagerly
/// at load; section data is re-read on demand from the mapping.
#[derive(Debug)]
pub struct Binary {
    path: PathBuf,
    data: MappedFile,
    format: BinaryFormat,
    facts: ImageFacts,
}

impl Binary {
    /// Resolve and load a target. Unrecognized magic (or magic that does
    /// not parse as the format it claims) is `UnsupportedFormat`, never a
    /// panic.
    pub fn load(path: &Path) -> Result<Self> {
        let data = MappedFile::open(path)?;
        let Some(format) = sniff(data.bytes()) else {
            return Err(AuditError::UnsupportedFormat(path.to_path_buf()));
        };

        // The parsed view borrows the mapping, so harvest everything owned
        // before moving the mapping into the handle.
        let facts = {
            let file = object::File::parse(data.bytes()).map_err(|err| {
                warn!(path = %path.display(), %err, "magic matched but image failed to parse");
                AuditError::UnsupportedFormat(path.to_path_buf())
            })?;
            harvest(&file, format, data.bytes())
        };

        debug!(
            path = %path.display(),
            %format,
            machine = %facts.machine,
            bits = facts.bits,
            "target resolved"
        );

        Ok(Self {
            path: path.to_path_buf(),
            data,
            format,
            facts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> BinaryFormat {
        self.format
    }

    pub fn machine(&self) -> &MachineKind {
        &self.facts.machine
    }

    pub fn bits(&self) -> u8 {
        self.facts.bits
    }

    pub fn is_little_endian(&self) -> bool {
        self.facts.little_endian
    }

    pub fn variant(&self) -> TargetVariant {
        self.facts.variant
    }

    /// True for PE images carrying a populated COM-descriptor directory.
    pub fn is_managed(&self) -> bool {
        self.facts.managed
    }

    pub fn codeview(&self) -> Option<&CodeViewRecord> {
        self.facts.codeview.as_ref()
    }

    /// Exported/public symbol names, sorted and deduplicated.
    pub fn exports(&self) -> &[String] {
        &self.facts.exports
    }

    /// File offset of the first executable section.
    pub fn code_offset(&self) -> Option<u64> {
        self.facts.code_offset
    }

    pub fn text_address(&self) -> Option<u64> {
        self.facts.text_address
    }

    pub fn data_address(&self) -> Option<u64> {
        self.facts.data_address
    }

    pub fn file_len(&self) -> u64 {
        self.data.len() as u64
    }

    /// Lower-case hex SHA-256 of the target bytes.
    pub fn sha256(&self) -> &str {
        self.data.sha256()
    }

    /// Convert a runtime virtual address into a module-relative offset.
    /// Debug records mix file offsets and virtual addresses for
    /// position-independent images; callers subtract the load base exactly
    /// once through this.
    pub fn normalize_address(&self, virtual_address: u64) -> Option<u64> {
        virtual_address.checked_sub(self.facts.relative_base)
    }

    /// The DWARF-bearing section buffers, with the Mach-O `__debug_*`
    /// naming resolved transparently.
    pub fn dwarf_sections(&self) -> Result<DwarfSections<'_>> {
        let file = self.object()?;
        Ok(DwarfSections {
            info: section_bytes(&file, ".debug_info"),
            abbrev: section_bytes(&file, ".debug_abbrev"),
            strings: section_bytes(&file, ".debug_str"),
            line: section_bytes(&file, ".debug_line"),
            frame: section_bytes(&file, ".debug_frame"),
            eh_frame: section_bytes(&file, ".eh_frame"),
        })
    }

    /// Whether any DWARF compile-unit data is present in the image.
    pub fn has_dwarf(&self) -> bool {
        self.dwarf_sections()
            .map(|sections| !sections.info.is_empty())
            .unwrap_or(false)
    }

    /// Re-parse the mapped image. Parsing already succeeded once at load,
    /// so a failure here means the mapping went bad underneath us.
    pub(crate) fn object(&self) -> Result<object::File<'_>> {
        object::File::parse(self.data.bytes()).map_err(|err| {
            AuditError::DebugInfoCorrupt(format!("{}: {err}", self.path.display()))
        })
    }
}

fn harvest(file: &object::File<'_>, format: BinaryFormat, data: &[u8]) -> ImageFacts {
    let machine = machine_kind(file.architecture());
    let bits = if file.is_64() { 64 } else { 32 };

    let mut code_offset = None;
    let mut text_address = None;
    let mut data_address = None;
    for section in file.sections() {
        if code_offset.is_none() && section.kind() == SectionKind::Text {
            code_offset = section.file_range().map(|(offset, _len)| offset);
        }
        match section.name() {
            Ok(".text") | Ok("__text") => {
                text_address = text_address.or(Some(section.address()));
            }
            Ok(".data") | Ok("__data") => {
                data_address = data_address.or(Some(section.address()));
            }
            _ => {}
        }
    }

    let exports = match file.exports() {
        Ok(exports) => {
            let mut names: Vec<String> = exports
                .iter()
                .map(|export| String::from_utf8_lossy(export.name()).into_owned())
                .collect();
            names.sort_unstable();
            names.dedup();
            names
        }
        Err(err) => {
            debug!(%err, "export table unreadable");
            Vec::new()
        }
    };

    let codeview = match file.pdb_info() {
        Ok(Some(info)) => Some(CodeViewRecord {
            path: PathBuf::from(String::from_utf8_lossy(info.path()).into_owned()),
            guid: info.guid(),
            age: info.age(),
        }),
        Ok(None) => None,
        Err(err) => {
            debug!(%err, "debug directory unreadable");
            None
        }
    };

    let pe_probe = if format == BinaryFormat::Pe {
        pe::probe(data, file.is_64())
    } else {
        pe::PeProbe::default()
    };

    ImageFacts {
        machine,
        bits,
        little_endian: file.is_little_endian(),
        variant: pe_probe.variant,
        managed: pe_probe.managed,
        codeview,
        exports,
        relative_base: file.relative_address_base(),
        code_offset,
        text_address,
        data_address,
    }
}

fn machine_kind(arch: object::Architecture) -> MachineKind {
    use object::Architecture;
    match arch {
        Architecture::I386 => MachineKind::X86,
        Architecture::X86_64 | Architecture::X86_64_X32 => MachineKind::X64,
        Architecture::Arm => MachineKind::Arm,
        Architecture::Aarch64 | Architecture::Aarch64_Ilp32 => MachineKind::Arm64,
        other => MachineKind::Other(format!("{other:?}")),
    }
}

fn section_bytes<'data>(file: &object::File<'data>, name: &str) -> Cow<'data, [u8]> {
    file.section_by_name(name)
        .and_then(|section| section.uncompressed_data().ok())
        .unwrap_or(Cow::Borrowed(&[]))
}

/// Check format magic in fixed order: PE, then ELF, then Mach-O. Reads only
/// the bytes each magic needs.
fn sniff(data: &[u8]) -> Option<BinaryFormat> {
    // PE: DOS stub magic plus the PE signature at e_lfanew.
    if data.len() >= 0x40 && data[0..2] == *b"MZ" {
        let e_lfanew = u32::from_le_bytes([data[0x3c], data[0x3d], data[0x3e], data[0x3f]]) as usize;
        if let Some(end) = e_lfanew.checked_add(4) {
            if data.len() >= end && data[e_lfanew..end] == *b"PE\0\0" {
                return Some(BinaryFormat::Pe);
            }
        }
    }

    if data.len() >= 4 && data[0..4] == [0x7f, b'E', b'L', b'F'] {
        return Some(BinaryFormat::Elf);
    }

    if data.len() >= 4 {
        // Thin Mach-O magic in either byte order, 32- or 64-bit.
        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if matches!(magic, 0xfeed_face | 0xfeed_facf | 0xcefa_edfe | 0xcffa_edfe) {
            return Some(BinaryFormat::MachO);
        }
    }

    None
}
