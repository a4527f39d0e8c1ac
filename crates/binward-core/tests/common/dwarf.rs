//! Hand-encoded DWARF compile units wrapped in ELF carriers.
//!
//! Units use inline-string forms throughout so no string or offset tables
//! are needed; one abbreviation table per fixture at offset zero.

use object::{Architecture, BinaryFormat, Endianness, SectionKind};

pub const DW_LANG_C99: u16 = 0x0c;
pub const DW_LANG_C11: u16 = 0x1d;
pub const DW_LANG_CPP: u16 = 0x04;
pub const DW_LANG_CPP14: u16 = 0x21;

const DW_TAG_COMPILE_UNIT: u64 = 0x11;
const DW_TAG_SKELETON_UNIT: u64 = 0x4a;
const DW_AT_NAME: u64 = 0x03;
const DW_AT_LANGUAGE: u64 = 0x13;
const DW_AT_COMP_DIR: u64 = 0x1b;
const DW_AT_PRODUCER: u64 = 0x25;
const DW_AT_DWO_NAME: u64 = 0x76;
const DW_AT_GNU_DWO_NAME: u64 = 0x2130;
const DW_AT_GNU_DWO_ID: u64 = 0x2131;
const DW_FORM_DATA2: u64 = 0x05;
const DW_FORM_DATA8: u64 = 0x07;
const DW_FORM_STRING: u64 = 0x08;

const DW_UT_COMPILE: u8 = 0x01;
const DW_UT_SKELETON: u8 = 0x04;
const DW_UT_SPLIT_COMPILE: u8 = 0x05;

/// One compile unit's root attributes.
pub struct UnitSpec<'a> {
    pub version: u16,
    pub name: &'a str,
    pub comp_dir: &'a str,
    pub producer: &'a str,
    pub language: u16,
}

fn uleb(value: u64, out: &mut Vec<u8>) {
    let mut value = value;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn cstr(text: &str, out: &mut Vec<u8>) {
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

/// One abbreviation: tag, no children, the given attribute/form pairs.
fn abbrev_table(tag: u64, attrs: &[(u64, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    uleb(1, &mut out);
    uleb(tag, &mut out);
    out.push(0);
    for (attribute, form) in attrs {
        uleb(*attribute, &mut out);
        uleb(*form, &mut out);
    }
    out.push(0);
    out.push(0);
    out.push(0);
    out
}

/// Wrap a DIE body in a unit header. DWARF 5 headers carry a unit type
/// and, for skeleton/split units, the dwo id.
fn unit_bytes(version: u16, unit_type: u8, dwo_id: Option<u64>, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&version.to_le_bytes());
    if version >= 5 {
        payload.push(unit_type);
        payload.push(8);
        payload.extend_from_slice(&0u32.to_le_bytes());
        if let Some(id) = dwo_id {
            payload.extend_from_slice(&id.to_le_bytes());
        }
    } else {
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.push(8);
    }
    payload.extend_from_slice(body);

    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out
}

fn compile_abbrev() -> Vec<u8> {
    abbrev_table(
        DW_TAG_COMPILE_UNIT,
        &[
            (DW_AT_PRODUCER, DW_FORM_STRING),
            (DW_AT_LANGUAGE, DW_FORM_DATA2),
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_COMP_DIR, DW_FORM_STRING),
        ],
    )
}

fn compile_info(spec: &UnitSpec) -> Vec<u8> {
    let mut body = Vec::new();
    uleb(1, &mut body);
    cstr(spec.producer, &mut body);
    body.extend_from_slice(&spec.language.to_le_bytes());
    cstr(spec.name, &mut body);
    cstr(spec.comp_dir, &mut body);
    unit_bytes(spec.version, DW_UT_COMPILE, None, &body)
}

/// ELF object carrying the given debug sections plus a small text section.
pub fn elf_with_sections(sections: &[(&str, &[u8])]) -> Vec<u8> {
    let mut image = object::write::Object::new(
        BinaryFormat::Elf,
        Architecture::X86_64,
        Endianness::Little,
    );
    let text = image.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    image.append_section_data(text, &[0xc3], 16);
    for (name, bytes) in sections {
        let id = image.add_section(Vec::new(), name.as_bytes().to_vec(), SectionKind::Debug);
        image.append_section_data(id, bytes, 1);
    }
    image.write().expect("write elf carrier")
}

/// ELF with the given units, in order, sharing one abbreviation table.
pub fn elf_with_units(specs: &[UnitSpec]) -> Vec<u8> {
    let abbrev = compile_abbrev();
    let mut info = Vec::new();
    for spec in specs {
        info.extend_from_slice(&compile_info(spec));
    }
    elf_with_sections(&[(".debug_info", &info), (".debug_abbrev", &abbrev)])
}

pub fn elf_with_unit(spec: &UnitSpec) -> Vec<u8> {
    elf_with_units(std::slice::from_ref(spec))
}

/// DWARF 5 skeleton unit referencing a `.dwo` companion by name.
pub fn elf_with_skeleton_v5(name: &str, comp_dir: &str, dwo_name: &str, dwo_id: u64) -> Vec<u8> {
    let abbrev = abbrev_table(
        DW_TAG_SKELETON_UNIT,
        &[
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_COMP_DIR, DW_FORM_STRING),
            (DW_AT_DWO_NAME, DW_FORM_STRING),
        ],
    );
    let mut body = Vec::new();
    uleb(1, &mut body);
    cstr(name, &mut body);
    cstr(comp_dir, &mut body);
    cstr(dwo_name, &mut body);
    let info = unit_bytes(5, DW_UT_SKELETON, Some(dwo_id), &body);
    elf_with_sections(&[(".debug_info", &info), (".debug_abbrev", &abbrev)])
}

/// DWARF 4 GNU-fission skeleton: a compile unit carrying the
/// `DW_AT_GNU_dwo_name`/`DW_AT_GNU_dwo_id` pair.
pub fn elf_with_skeleton_v4(name: &str, comp_dir: &str, dwo_name: &str, dwo_id: u64) -> Vec<u8> {
    let abbrev = abbrev_table(
        DW_TAG_COMPILE_UNIT,
        &[
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_COMP_DIR, DW_FORM_STRING),
            (DW_AT_GNU_DWO_NAME, DW_FORM_STRING),
            (DW_AT_GNU_DWO_ID, DW_FORM_DATA8),
        ],
    );
    let mut body = Vec::new();
    uleb(1, &mut body);
    cstr(name, &mut body);
    cstr(comp_dir, &mut body);
    cstr(dwo_name, &mut body);
    body.extend_from_slice(&dwo_id.to_le_bytes());
    let info = unit_bytes(4, DW_UT_COMPILE, None, &body);
    elf_with_sections(&[(".debug_info", &info), (".debug_abbrev", &abbrev)])
}

/// DWARF 5 companion file: a split compile unit in `.dwo`-suffixed
/// sections.
pub fn dwo_companion_v5(spec: &UnitSpec, dwo_id: u64) -> Vec<u8> {
    let abbrev = abbrev_table(
        DW_TAG_COMPILE_UNIT,
        &[
            (DW_AT_PRODUCER, DW_FORM_STRING),
            (DW_AT_LANGUAGE, DW_FORM_DATA2),
            (DW_AT_NAME, DW_FORM_STRING),
        ],
    );
    let mut body = Vec::new();
    uleb(1, &mut body);
    cstr(spec.producer, &mut body);
    body.extend_from_slice(&spec.language.to_le_bytes());
    cstr(spec.name, &mut body);
    let info = unit_bytes(5, DW_UT_SPLIT_COMPILE, Some(dwo_id), &body);
    elf_with_sections(&[(".debug_info.dwo", &info), (".debug_abbrev.dwo", &abbrev)])
}

/// DWARF 4 GNU companion: a plain v4 unit whose root repeats the dwo id.
pub fn dwo_companion_v4(spec: &UnitSpec, dwo_id: u64) -> Vec<u8> {
    let abbrev = abbrev_table(
        DW_TAG_COMPILE_UNIT,
        &[
            (DW_AT_PRODUCER, DW_FORM_STRING),
            (DW_AT_LANGUAGE, DW_FORM_DATA2),
            (DW_AT_NAME, DW_FORM_STRING),
            (DW_AT_GNU_DWO_ID, DW_FORM_DATA8),
        ],
    );
    let mut body = Vec::new();
    uleb(1, &mut body);
    cstr(spec.producer, &mut body);
    body.extend_from_slice(&spec.language.to_le_bytes());
    cstr(spec.name, &mut body);
    body.extend_from_slice(&dwo_id.to_le_bytes());
    let info = unit_bytes(4, DW_UT_COMPILE, None, &body);
    elf_with_sections(&[(".debug_info.dwo", &info), (".debug_abbrev.dwo", &abbrev)])
}
