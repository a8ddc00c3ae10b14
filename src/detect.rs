//! File type detection, in the same words `file(1)` would use
//!
//! Only the ELF header is looked at, that's all the architecture table needs.

use object::{
    elf::{self, FileHeader32, FileHeader64},
    read::elf::FileHeader,
    Endianness, FileKind,
};
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};

// e_flags architecture level for MIPS
const EF_MIPS_ARCH: u32 = 0xf000_0000;
const EF_MIPS_ARCH_NAMES: [(u32, &str); 9] = [
    (0x0000_0000, "MIPS-I"),
    (0x1000_0000, "MIPS-II"),
    (0x2000_0000, "MIPS-III"),
    (0x3000_0000, "MIPS-IV"),
    (0x4000_0000, "MIPS-V"),
    (0x5000_0000, "MIPS32"),
    (0x6000_0000, "MIPS64"),
    (0x7000_0000, "MIPS32 rel2"),
    (0x8000_0000, "MIPS64 rel2"),
];

/// Both 64 bit headers fit in here
const HEADER_LEN: u64 = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileType {
    pub mime: String,
    /// Long human readable description, e.g. `ELF 32-bit LSB executable, ARM, ...`
    pub full: String,
}

pub trait TypeDetector: Sync {
    /// `None` if the type can't be told
    fn file_type(&self, path: &Path) -> Option<FileType>;
}

/// Recognizes ELF files, anything else is unknown
pub struct ElfDetector;

impl TypeDetector for ElfDetector {
    fn file_type(&self, path: &Path) -> Option<FileType> {
        let header = read_header(path).ok()?;
        describe(&header)
    }
}

fn read_header(path: &Path) -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
    Ok(header)
}

pub fn describe(data: &[u8]) -> Option<FileType> {
    match FileKind::parse(data).ok()? {
        FileKind::Elf32 => describe_elf::<FileHeader32<Endianness>>(data, 32),
        FileKind::Elf64 => describe_elf::<FileHeader64<Endianness>>(data, 64),
        _ => None,
    }
}

fn describe_elf<Elf: FileHeader<Endian = Endianness>>(data: &[u8], bits: u8) -> Option<FileType> {
    let header = Elf::parse(data).ok()?;
    let endian = header.endian().ok()?;

    let order = if header.is_little_endian() { "LSB" } else { "MSB" };
    let (kind, mime) = match header.e_type(endian) {
        elf::ET_EXEC => ("executable", "application/x-executable"),
        elf::ET_DYN => ("shared object", "application/x-sharedlib"),
        elf::ET_REL => ("relocatable", "application/x-object"),
        elf::ET_CORE => ("core file", "application/x-coredump"),
        _ => ("unknown type", "application/octet-stream"),
    };
    let machine = machine_name(header.e_machine(endian), header.e_flags(endian));

    Some(FileType {
        mime: mime.to_string(),
        full: format!("ELF {bits}-bit {order} {kind}, {machine}, version 1 (SYSV)"),
    })
}

fn machine_name(machine: u16, flags: u32) -> String {
    match machine {
        elf::EM_AARCH64 => "ARM aarch64".to_string(),
        elf::EM_ARM => "ARM".to_string(),
        elf::EM_MIPS | elf::EM_MIPS_RS3_LE => {
            let level = EF_MIPS_ARCH_NAMES
                .iter()
                .find(|(value, _)| flags & EF_MIPS_ARCH == *value)
                .map(|(_, name)| *name)
                .unwrap_or("unknown MIPS level");
            format!("MIPS, {level}")
        }
        elf::EM_386 => "Intel 80386".to_string(),
        elf::EM_X86_64 => "x86-64".to_string(),
        elf::EM_PPC => "PowerPC or cisco 4500".to_string(),
        elf::EM_PPC64 => "64-bit PowerPC or cisco 7500".to_string(),
        elf::EM_SH => "Renesas SH".to_string(),
        elf::EM_SPARC => "SPARC".to_string(),
        elf::EM_68K => "Motorola m68k, 68020".to_string(),
        elf::EM_RISCV => "UCB RISC-V".to_string(),
        other => format!("unknown arch 0x{other:x}"),
    }
}
