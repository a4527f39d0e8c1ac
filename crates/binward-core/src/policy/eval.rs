//! Policy evaluation over one target's object-module stream.
//!
//! Per module, in order: classify, select the required minimum, check the
//! allow-list, compare versions, then the enforced-mitigation checks and
//! the critical-warnings check. The first violated check flags the module;
//! evaluation always walks the full module stream so a Fail verdict lists
//! every offender.

use std::ops::ControlFlow;

use serde::Serialize;
use tracing::debug;

use crate::binary::{MachineKind, TargetVariant};
use crate::cmdline::{CommandLine, Precedence, SwitchState};
use crate::debuginfo::{DebugInfo, Language, ObjectModule};
use crate::error::Result;
use crate::util::version::ToolVersion;

use super::mitigations::{self, SpectreAvailability};
use super::{rule_id, MitigationClass, Policy};

/// Flag spellings that turn the speculative-execution mitigation on.
const SPECTRE_SWITCHES: &[&str] = &["Qspectre", "d2guardspecload"];

/// Why one module was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum ViolationKind {
    ToolchainTooOld,
    MitigationUnavailable,
    MitigationDisabled,
    CriticalWarnings {
        disabled: Vec<u32>,
        warning_level: u8,
        required_level: u8,
    },
}

impl ViolationKind {
    pub fn rule_id(&self) -> &'static str {
        match self {
            ViolationKind::ToolchainTooOld => rule_id::MIN_TOOL_VERSION,
            ViolationKind::MitigationUnavailable | ViolationKind::MitigationDisabled => {
                rule_id::SPECULATIVE_EXECUTION
            }
            ViolationKind::CriticalWarnings { .. } => rule_id::CRITICAL_WARNINGS,
        }
    }
}

/// One flagged module with the minimum its report should name. For
/// mitigation findings the minimum is raised to the closest build that
/// supports the mitigation, so the message is an upgrade target rather
/// than a bare "too old".
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedModule {
    pub module: ObjectModule,
    pub required: ToolVersion,
    pub kind: ViolationKind,
}

/// Aggregated outcome over one target's module stream.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub flagged: Vec<FlaggedModule>,
    /// The required minimum selected for the last evaluated module. This
    /// is what a Pass verdict reports.
    pub governing_minimum: Option<ToolVersion>,
    pub modules_seen: usize,
    pub modules_checked: usize,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.flagged.is_empty()
    }
}

enum ModuleDecision {
    /// Pure linking metadata; no comparison applies.
    Skipped,
    /// Passed or allow-list exempt; carries the selected minimum.
    Cleared { required: ToolVersion },
    /// Violated a check. `base_required` is the un-raised step-2 minimum.
    Flagged {
        base_required: ToolVersion,
        flag: FlaggedModule,
    },
}

/// Walk every module and judge it against `policy`.
pub fn evaluate(
    policy: &Policy,
    machine: &MachineKind,
    variant: TargetVariant,
    debug_info: &mut DebugInfo,
) -> Result<Evaluation> {
    let mut evaluation = Evaluation::default();
    debug_info.visit_modules(|module| {
        evaluation.modules_seen += 1;
        match check_module(policy, machine, variant, module) {
            ModuleDecision::Skipped => {}
            ModuleDecision::Cleared { required } => {
                evaluation.modules_checked += 1;
                evaluation.governing_minimum = Some(required);
            }
            ModuleDecision::Flagged {
                base_required,
                flag,
            } => {
                evaluation.modules_checked += 1;
                evaluation.governing_minimum = Some(base_required);
                debug!(
                    module = %flag.module.name,
                    rule = flag.kind.rule_id(),
                    "module flagged"
                );
                evaluation.flagged.push(flag);
            }
        }
        ControlFlow::Continue(())
    })?;
    Ok(evaluation)
}

fn check_module(
    policy: &Policy,
    machine: &MachineKind,
    variant: TargetVariant,
    module: ObjectModule,
) -> ModuleDecision {
    if module.language == Language::LinkOnly {
        return ModuleDecision::Skipped;
    }

    let required = policy.minimum_for(module.language, variant);

    if let Some(library) = module.library.as_deref() {
        if let Some(allowed) = policy.allowed_minimum(library_basename(library), module.language) {
            if module.back_version >= allowed {
                return ModuleDecision::Cleared { required };
            }
        }
    }

    let comparison = comparison_version(&module);

    if comparison < required {
        return ModuleDecision::Flagged {
            base_required: required,
            flag: FlaggedModule {
                module,
                required,
                kind: ViolationKind::ToolchainTooOld,
            },
        };
    }

    // Mitigation availability is keyed to the MSVC servicing lines, so it
    // only applies to PDB-sourced modules.
    if policy
        .enforced_mitigations
        .contains(&MitigationClass::SpeculativeExecution)
        && module.dwarf_version.is_none()
    {
        match mitigations::spectre_availability(&comparison, machine) {
            SpectreAvailability::NotApplicableMachine => {}
            SpectreAvailability::Unavailable { closest_supporting } => {
                let reported = closest_supporting.unwrap_or(required);
                return ModuleDecision::Flagged {
                    base_required: required,
                    flag: FlaggedModule {
                        module,
                        required: reported,
                        kind: ViolationKind::MitigationUnavailable,
                    },
                };
            }
            SpectreAvailability::Available => {
                if let Some(raw) = module.raw_command_line.as_deref() {
                    let command_line = CommandLine::new(raw);
                    let state = command_line.switch_state(
                        SPECTRE_SWITCHES,
                        &[],
                        SwitchState::Disabled,
                        Precedence::LastWins,
                    );
                    if state == SwitchState::Disabled {
                        return ModuleDecision::Flagged {
                            base_required: required,
                            flag: FlaggedModule {
                                module,
                                required,
                                kind: ViolationKind::MitigationDisabled,
                            },
                        };
                    }
                }
            }
        }
    }

    if !policy.required_compiler_warnings.is_empty() {
        if let Some(raw) = module.raw_command_line.as_deref() {
            let command_line = CommandLine::new(raw);
            let disabled: Vec<u32> = policy
                .required_compiler_warnings
                .iter()
                .copied()
                .filter(|number| command_line.disabled_warnings().contains(number))
                .collect();
            let warning_level = command_line.warning_level();
            if !disabled.is_empty() || warning_level < policy.minimum_warning_level {
                return ModuleDecision::Flagged {
                    base_required: required,
                    flag: FlaggedModule {
                        module,
                        required,
                        kind: ViolationKind::CriticalWarnings {
                            disabled,
                            warning_level,
                            required_level: policy.minimum_warning_level,
                        },
                    },
                };
            }
        }
    }

    ModuleDecision::Cleared { required }
}

/// C and C++ compare the lesser of front and back end, catching mismatched
/// toolchain components; everything else compares the back end alone.
fn comparison_version(module: &ObjectModule) -> ToolVersion {
    match module.language {
        Language::C | Language::Cxx => module.front_version.min(module.back_version),
        _ => module.back_version,
    }
}

fn library_basename(library: &str) -> &str {
    library.rsplit(['/', '\\']).next().unwrap_or(library)
}
