//! PE-specific probes that the generic `object` surface does not expose:
//! the optional-header subsystem (console/firmware targets take a different
//! policy minimum) and the COM-descriptor data directory (managed images are
//! outside native-toolchain policy).

use object::pe;
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile};
use object::LittleEndian as LE;

use super::TargetVariant;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PeProbe {
    pub variant: TargetVariant,
    pub managed: bool,
}

pub(crate) fn probe(data: &[u8], is_64: bool) -> PeProbe {
    if is_64 {
        probe_typed::<pe::ImageNtHeaders64>(data)
    } else {
        probe_typed::<pe::ImageNtHeaders32>(data)
    }
}

fn probe_typed<Pe: ImageNtHeaders>(data: &[u8]) -> PeProbe {
    let Ok(file) = PeFile::<Pe>::parse(data) else {
        return PeProbe::default();
    };

    let variant = match file.nt_headers().optional_header().subsystem() {
        pe::IMAGE_SUBSYSTEM_WINDOWS_CE_GUI
        | pe::IMAGE_SUBSYSTEM_EFI_APPLICATION
        | pe::IMAGE_SUBSYSTEM_EFI_BOOT_SERVICE_DRIVER
        | pe::IMAGE_SUBSYSTEM_EFI_RUNTIME_DRIVER
        | pe::IMAGE_SUBSYSTEM_EFI_ROM
        | pe::IMAGE_SUBSYSTEM_XBOX => TargetVariant::Embedded,
        _ => TargetVariant::Standard,
    };

    let managed = file
        .data_directories()
        .get(pe::IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR)
        .is_some_and(|dir| dir.virtual_address.get(LE) != 0 && dir.size.get(LE) != 0);

    PeProbe { variant, managed }
}
