//! Speculative-execution mitigation availability for the MSVC toolchain.
//!
//! Support for `/Qspectre` and `/d2guardspecload` landed at different
//! servicing builds of each compiler line. The table below records, per
//! line, the first build carrying each spelling; everything is plain data
//! so the lookup stays testable.

use crate::binary::MachineKind;
use crate::util::version::ToolVersion;

/// One compiler line's mitigation servicing window. `floor`/`ceiling`
/// bracket the line; the two version fields are the first builds carrying
/// each flag spelling.
#[derive(Debug, Clone, Copy)]
struct MitigationBand {
    floor: ToolVersion,
    ceiling: Option<ToolVersion>,
    d2guardspecload: ToolVersion,
    qspectre: ToolVersion,
}

const fn v(major: u32, minor: u32, build: u32, revision: u32) -> ToolVersion {
    ToolVersion::new(major, minor, build, revision)
}

const MITIGATION_BANDS: &[MitigationBand] = &[
    // VS2015 Update 3 servicing line.
    MitigationBand {
        floor: v(19, 0, 0, 0),
        ceiling: Some(v(19, 10, 0, 0)),
        d2guardspecload: v(19, 0, 24232, 0),
        qspectre: v(19, 0, 24235, 0),
    },
    // 15.5 servicing line.
    MitigationBand {
        floor: v(19, 12, 0, 0),
        ceiling: Some(v(19, 13, 0, 0)),
        d2guardspecload: v(19, 12, 25830, 0),
        qspectre: v(19, 12, 25835, 0),
    },
    // 15.6 servicing line.
    MitigationBand {
        floor: v(19, 13, 0, 0),
        ceiling: Some(v(19, 14, 0, 0)),
        d2guardspecload: v(19, 13, 26029, 0),
        qspectre: v(19, 13, 26115, 0),
    },
    // 15.7 onward carries both spellings.
    MitigationBand {
        floor: v(19, 14, 0, 0),
        ceiling: None,
        d2guardspecload: v(19, 14, 26329, 0),
        qspectre: v(19, 14, 26329, 0),
    },
];

/// Outcome of a mitigation-availability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpectreAvailability {
    /// The mitigation exists for at least one flag spelling at this
    /// version.
    Available,
    /// Neither spelling exists at this version. `closest_supporting` is
    /// the nearest version that does support it, as an actionable upgrade
    /// target.
    Unavailable {
        closest_supporting: Option<ToolVersion>,
    },
    /// The mitigation never applies to this machine kind, for any version
    /// of the toolchain line.
    NotApplicableMachine,
}

/// Whether the speculative-execution mitigation is available to the given
/// toolchain version on the given machine.
pub fn spectre_availability(version: &ToolVersion, machine: &MachineKind) -> SpectreAvailability {
    if !machine_applicable(machine) {
        return SpectreAvailability::NotApplicableMachine;
    }

    if let Some(band) = band_for(version) {
        if *version >= band.d2guardspecload || *version >= band.qspectre {
            return SpectreAvailability::Available;
        }
        return SpectreAvailability::Unavailable {
            closest_supporting: Some(band.d2guardspecload.min(band.qspectre)),
        };
    }

    // Between or before the servicing lines: point at the first build of
    // the next line that supports the mitigation.
    let closest_supporting = MITIGATION_BANDS
        .iter()
        .map(|band| band.d2guardspecload.min(band.qspectre))
        .find(|supporting| supporting > version);
    SpectreAvailability::Unavailable { closest_supporting }
}

fn band_for(version: &ToolVersion) -> Option<&'static MitigationBand> {
    MITIGATION_BANDS.iter().find(|band| {
        *version >= band.floor && band.ceiling.map_or(true, |ceiling| *version < ceiling)
    })
}

fn machine_applicable(machine: &MachineKind) -> bool {
    matches!(
        machine,
        MachineKind::X86 | MachineKind::X64 | MachineKind::Arm | MachineKind::Arm64
    )
}
