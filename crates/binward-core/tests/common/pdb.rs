//! Minimal MSF 7.00 program databases.
//!
//! Streams follow the fixed MSF convention: 0 old directory, 1 PDB info,
//! 2 TPI, 3 DBI, 4 IPI, then one symbol stream per kept module. Every
//! fixture stream fits in a single 4 KiB page, so the directory page list
//! is one page holding one entry.

pub const LANG_C: u8 = 0x00;
pub const LANG_CPP: u8 = 0x01;
pub const LANG_MASM: u8 = 0x03;
pub const LANG_LINK: u8 = 0x07;

const BLOCK: usize = 4096;
const S_COMPILE3: u16 = 0x113c;
const S_ENVBLOCK: u16 = 0x113d;

#[derive(Clone)]
pub struct CompileSpec<'a> {
    pub language: u8,
    pub front: [u16; 4],
    pub back: [u16; 4],
    pub version_string: &'a str,
}

impl Default for CompileSpec<'_> {
    fn default() -> Self {
        Self {
            language: LANG_CPP,
            front: [19, 16, 27026, 1],
            back: [19, 16, 27026, 1],
            version_string: "Microsoft (R) Optimizing Compiler",
        }
    }
}

#[derive(Clone, Default)]
pub struct ModuleSpec<'a> {
    pub name: &'a str,
    /// Originating archive; empty means the module came straight from an
    /// object file and reports no library.
    pub object_file: &'a str,
    pub compile: Option<CompileSpec<'a>>,
    pub command_line: Option<&'a str>,
    /// Emit the module with no symbol stream at all.
    pub stripped: bool,
}

impl<'a> ModuleSpec<'a> {
    pub fn new(name: &'a str, compile: CompileSpec<'a>) -> Self {
        Self {
            name,
            compile: Some(compile),
            ..Self::default()
        }
    }
}

pub struct PdbSpec<'a> {
    /// Raw guid bytes as a PE debug directory stores them.
    pub guid: [u8; 16],
    pub age: u32,
    pub signature: u32,
    pub modules: Vec<ModuleSpec<'a>>,
}

impl Default for PdbSpec<'_> {
    fn default() -> Self {
        Self {
            guid: super::FIXTURE_GUID,
            age: 1,
            signature: 0x5da8_2190,
            modules: Vec::new(),
        }
    }
}

fn p16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn p32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// One CodeView symbol record. The length prefix counts the kind word but
/// not itself, and the payload is padded so records stay 4-byte aligned.
fn sym_record(kind: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = payload.to_vec();
    while body.len() % 4 != 0 {
        body.push(0);
    }
    let mut out = Vec::new();
    p16(&mut out, (2 + body.len()) as u16);
    p16(&mut out, kind);
    out.extend_from_slice(&body);
    out
}

fn compile3_payload(spec: &CompileSpec) -> Vec<u8> {
    let mut out = vec![spec.language, 0, 0, 0];
    p16(&mut out, 0x00d0); // x64
    for part in spec.front {
        p16(&mut out, part);
    }
    for part in spec.back {
        p16(&mut out, part);
    }
    out.extend_from_slice(spec.version_string.as_bytes());
    out.push(0);
    out
}

fn envblock_payload(command_line: &str) -> Vec<u8> {
    let mut out = vec![0u8]; // flags
    for entry in ["cwd", r"d:\build", "cmd", command_line] {
        out.extend_from_slice(entry.as_bytes());
        out.push(0);
    }
    out.push(0);
    out
}

fn module_sym_stream(module: &ModuleSpec) -> Vec<u8> {
    let mut out = Vec::new();
    p32(&mut out, 4); // CV_SIGNATURE_C13
    if let Some(compile) = &module.compile {
        out.extend_from_slice(&sym_record(S_COMPILE3, &compile3_payload(compile)));
    }
    if let Some(command_line) = module.command_line {
        out.extend_from_slice(&sym_record(S_ENVBLOCK, &envblock_payload(command_line)));
    }
    out
}

/// One DBI module-list record: fixed 64-byte info, two name strings, pad
/// to a 4-byte boundary.
fn module_record(module: &ModuleSpec, index: u16, stream: u16, symbols_size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    p32(&mut out, 0); // opened
    p16(&mut out, 1); // contribution: section
    p16(&mut out, 0);
    p32(&mut out, u32::from(index) * 0x10); // offset
    p32(&mut out, 0x10); // size
    p32(&mut out, 0x6000_0020); // CODE | EXECUTE | READ
    p16(&mut out, index);
    p16(&mut out, 0);
    p32(&mut out, 0); // data crc
    p32(&mut out, 0); // reloc crc
    p16(&mut out, 0); // flags
    p16(&mut out, stream);
    p32(&mut out, symbols_size);
    p32(&mut out, 0); // line data
    p32(&mut out, 0); // c13 line data
    p16(&mut out, 0); // source file count
    p16(&mut out, 0);
    p32(&mut out, 0); // file name offsets
    p32(&mut out, 0); // source file name index
    p32(&mut out, 0); // pdb file name index
    out.extend_from_slice(module.name.as_bytes());
    out.push(0);
    out.extend_from_slice(module.object_file.as_bytes());
    out.push(0);
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

fn pdb_info_stream(spec: &PdbSpec) -> Vec<u8> {
    let mut out = Vec::new();
    p32(&mut out, 20000404); // VC70
    p32(&mut out, spec.signature);
    p32(&mut out, spec.age);
    out.extend_from_slice(&spec.guid);
    // Empty named-stream map: no name bytes, then a hash table with zero
    // entries, zero capacity, and empty present/deleted bit vectors.
    for _ in 0..5 {
        p32(&mut out, 0);
    }
    out
}

fn dbi_stream(spec: &PdbSpec, module_streams: &[(u16, u32)]) -> Vec<u8> {
    let mut records = Vec::new();
    for (index, module) in spec.modules.iter().enumerate() {
        let (stream, symbols_size) = module_streams[index];
        records.extend_from_slice(&module_record(module, index as u16, stream, symbols_size));
    }

    let mut out = Vec::new();
    p32(&mut out, 0xffff_ffff); // version signature
    p32(&mut out, 19990903); // V70
    p32(&mut out, spec.age);
    p16(&mut out, 0xffff); // global symbol stream
    p16(&mut out, 0); // toolchain version
    p16(&mut out, 0xffff); // public symbol stream
    p16(&mut out, 0); // pdb dll version
    p16(&mut out, 0xffff); // symbol records stream
    p16(&mut out, 0); // pdb dll rbld
    p32(&mut out, records.len() as u32); // module list size
    p32(&mut out, 0); // section contributions
    p32(&mut out, 0); // section map
    p32(&mut out, 0); // file info
    p32(&mut out, 0); // type server map
    p32(&mut out, 0); // mfc type server
    p32(&mut out, 0); // optional debug header
    p32(&mut out, 0); // ec substream
    p16(&mut out, 0); // flags
    p16(&mut out, 0x8664); // machine
    p32(&mut out, 0); // reserved
    out.extend_from_slice(&records);
    out
}

pub fn pdb_file(spec: &PdbSpec) -> Vec<u8> {
    let mut streams: Vec<Vec<u8>> = vec![
        Vec::new(),           // 0: old directory
        pdb_info_stream(spec), // 1
        Vec::new(),           // 2: TPI
        Vec::new(),           // 3: DBI, filled once stream indices are known
        Vec::new(),           // 4: IPI
    ];
    let mut module_streams = Vec::new();
    for module in &spec.modules {
        if module.stripped {
            module_streams.push((0xffff_u16, 0_u32));
        } else {
            let bytes = module_sym_stream(module);
            module_streams.push((streams.len() as u16, bytes.len() as u32));
            streams.push(bytes);
        }
    }
    streams[3] = dbi_stream(spec, &module_streams);

    // Page layout: 0 superblock, 1 and 2 free page maps, 3 directory page
    // list, 4 directory, then stream pages in stream order.
    let mut directory = Vec::new();
    p32(&mut directory, streams.len() as u32);
    for stream in &streams {
        p32(&mut directory, stream.len() as u32);
    }
    let mut next_page = 5u32;
    let mut placements = Vec::new();
    for stream in &streams {
        assert!(stream.len() <= BLOCK, "fixture stream spans pages");
        if !stream.is_empty() {
            p32(&mut directory, next_page);
            placements.push((next_page as usize, stream));
            next_page += 1;
        }
    }
    assert!(directory.len() <= BLOCK, "fixture directory spans pages");

    let num_pages = next_page as usize;
    let mut file = vec![0u8; num_pages * BLOCK];

    let mut header = Vec::new();
    header.extend_from_slice(b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0");
    p32(&mut header, BLOCK as u32);
    p32(&mut header, 1); // active free page map
    p32(&mut header, num_pages as u32);
    p32(&mut header, directory.len() as u32);
    p32(&mut header, 0);
    p32(&mut header, 3); // directory page list lives on page 3
    file[..header.len()].copy_from_slice(&header);

    file[3 * BLOCK..3 * BLOCK + 4].copy_from_slice(&4u32.to_le_bytes());
    file[4 * BLOCK..4 * BLOCK + directory.len()].copy_from_slice(&directory);
    for (page, bytes) in placements {
        file[page * BLOCK..page * BLOCK + bytes.len()].copy_from_slice(bytes);
    }
    file
}
