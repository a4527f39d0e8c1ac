//! Minimal PE32+ images with a CodeView debug directory.
//!
//! One `.rdata` section holds the debug directory and the RSDS record.
//! Layout is fixed: headers in the first 0x200 bytes, section raw data at
//! 0x200 mapped to RVA 0x1000.

pub const SUBSYSTEM_WINDOWS_CUI: u16 = 3;
pub const SUBSYSTEM_XBOX: u16 = 14;

const SECTION_RVA: u32 = 0x1000;
const SECTION_RAW: u32 = 0x200;
const DEBUG_DIR_SIZE: u32 = 28;

pub struct PeSpec<'a> {
    pub guid: [u8; 16],
    pub age: u32,
    pub pdb_path: &'a str,
    pub subsystem: u16,
    pub managed: bool,
}

impl Default for PeSpec<'_> {
    fn default() -> Self {
        Self {
            guid: super::FIXTURE_GUID,
            age: 1,
            pdb_path: r"d:\build\out\app.pdb",
            subsystem: SUBSYSTEM_WINDOWS_CUI,
            managed: false,
        }
    }
}

fn p16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn p32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn p64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn pad_to(out: &mut Vec<u8>, offset: usize) {
    assert!(out.len() <= offset, "layout overrun at {:#x}", out.len());
    out.resize(offset, 0);
}

pub fn pe_image(spec: &PeSpec) -> Vec<u8> {
    let mut out = Vec::new();

    // DOS header: magic plus e_lfanew at 0x3c.
    out.extend_from_slice(b"MZ");
    pad_to(&mut out, 0x3c);
    p32(&mut out, 0x40);

    // PE signature and COFF header.
    out.extend_from_slice(b"PE\0\0");
    p16(&mut out, 0x8664);
    p16(&mut out, 1); // section count
    p32(&mut out, 0); // timestamp
    p32(&mut out, 0); // symbol table
    p32(&mut out, 0); // symbol count
    p16(&mut out, 240); // optional header size
    p16(&mut out, 0x0022); // EXECUTABLE_IMAGE | LARGE_ADDRESS_AWARE

    // Optional header, PE32+.
    p16(&mut out, 0x20b);
    out.push(14); // linker major
    out.push(0); // linker minor
    p32(&mut out, 0); // size of code
    p32(&mut out, SECTION_RAW); // size of initialized data
    p32(&mut out, 0); // size of uninitialized data
    p32(&mut out, 0); // entry point
    p32(&mut out, SECTION_RVA); // base of code
    p64(&mut out, 0x1_4000_0000); // image base
    p32(&mut out, 0x1000); // section alignment
    p32(&mut out, 0x200); // file alignment
    p16(&mut out, 6); // os major
    p16(&mut out, 0);
    p16(&mut out, 0); // image version
    p16(&mut out, 0);
    p16(&mut out, 6); // subsystem version
    p16(&mut out, 0);
    p32(&mut out, 0); // win32 version
    p32(&mut out, 0x2000); // size of image
    p32(&mut out, 0x200); // size of headers
    p32(&mut out, 0); // checksum
    p16(&mut out, spec.subsystem);
    p16(&mut out, 0); // dll characteristics
    p64(&mut out, 0x10_0000); // stack reserve
    p64(&mut out, 0x1000); // stack commit
    p64(&mut out, 0x10_0000); // heap reserve
    p64(&mut out, 0x1000); // heap commit
    p32(&mut out, 0); // loader flags
    p32(&mut out, 16); // directory count
    for index in 0..16u32 {
        match index {
            6 => {
                p32(&mut out, SECTION_RVA);
                p32(&mut out, DEBUG_DIR_SIZE);
            }
            14 if spec.managed => {
                p32(&mut out, SECTION_RVA + 0x100);
                p32(&mut out, 0x48);
            }
            _ => {
                p32(&mut out, 0);
                p32(&mut out, 0);
            }
        }
    }

    // Section table: one .rdata section.
    out.extend_from_slice(b".rdata\0\0");
    p32(&mut out, SECTION_RAW); // virtual size
    p32(&mut out, SECTION_RVA);
    p32(&mut out, SECTION_RAW); // raw size
    p32(&mut out, SECTION_RAW); // raw offset
    p32(&mut out, 0);
    p32(&mut out, 0);
    p16(&mut out, 0);
    p16(&mut out, 0);
    p32(&mut out, 0x4000_0040); // INITIALIZED_DATA | READ

    // Section raw data: debug directory entry, then the RSDS record.
    pad_to(&mut out, SECTION_RAW as usize);
    p32(&mut out, 0); // characteristics
    p32(&mut out, 0); // timestamp
    p16(&mut out, 0); // major
    p16(&mut out, 0); // minor
    p32(&mut out, 2); // IMAGE_DEBUG_TYPE_CODEVIEW
    let rsds_len = 4 + 16 + 4 + spec.pdb_path.len() as u32 + 1;
    p32(&mut out, rsds_len);
    p32(&mut out, SECTION_RVA + DEBUG_DIR_SIZE); // address of raw data
    p32(&mut out, SECTION_RAW + DEBUG_DIR_SIZE); // pointer to raw data

    out.extend_from_slice(b"RSDS");
    out.extend_from_slice(&spec.guid);
    p32(&mut out, spec.age);
    out.extend_from_slice(spec.pdb_path.as_bytes());
    out.push(0);

    pad_to(&mut out, (SECTION_RAW + SECTION_RAW) as usize);
    out
}
