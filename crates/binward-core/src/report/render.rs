//! Plain-text rendering of reports.
//!
//! The verdict carries a template key and ordered arguments; this
//! collaborator turns them into prose. The JSON surface never goes through
//! here, so message wording can change without breaking consumers.

use crate::report::model::{template, Report, Verdict};

pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {} [{}]\n",
        report.target, report.verdict.level, report.verdict.rule_id
    ));
    if let Some(image) = &report.image {
        out.push_str(&format!(
            "  image: {} {}, {}-bit, sha256 {}\n",
            image.format, image.machine, image.bits, image.hash.value
        ));
        let mut debug_line = format!("  debug info: {}", image.debug_info.kind);
        if let Some(state) = &image.debug_info.state {
            debug_line.push_str(&format!(" ({state})"));
        }
        if let Some(path) = &image.debug_info.resolved_path {
            debug_line.push_str(&format!(" at {path}"));
        }
        out.push_str(&debug_line);
        out.push('\n');
    }
    out.push_str(&format!("  {}\n", render_message(&report.verdict)));
    for group in &report.verdict.violations {
        let compiler = if group.compiler_name.is_empty() {
            "unknown compiler"
        } else {
            group.compiler_name.as_str()
        };
        let mut line = format!(
            "  - {} ({}) front {} back {}, requires {}",
            compiler, group.language, group.front_version, group.back_version, group.required
        );
        if let Some(library) = &group.library {
            line.push_str(&format!(", from {library}"));
        }
        line.push_str(&format!(
            " [{}]: {}",
            group.rule_ids.join(", "),
            group.modules.join(", ")
        ));
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Expand a verdict's template key against its ordered arguments.
pub fn render_message(verdict: &Verdict) -> String {
    let arg = |index: usize| verdict.args.get(index).map(String::as_str).unwrap_or("");
    match verdict.template.as_str() {
        template::PASS_MEETS_MINIMUM => format!(
            "{} was compiled with tool versions meeting the policy minimum ({})",
            arg(0),
            arg(1)
        ),
        template::FAIL_BELOW_POLICY => format!(
            "{} does not meet toolchain policy: {}. Offending modules: {}",
            arg(0),
            arg(1),
            arg(2)
        ),
        template::NA_MANAGED_CODE => format!(
            "{} is managed code; native toolchain policy does not apply",
            arg(0)
        ),
        template::NA_DEBUG_INFO_MISSING => {
            format!("{}: no usable debug information ({})", arg(0), arg(1))
        }
        template::NA_DEBUG_INFO_STRIPPED => format!(
            "{}: program database is stripped of private symbols ({})",
            arg(0),
            arg(1)
        ),
        template::ERROR_UNSUPPORTED_FORMAT => {
            format!("{}: not a recognized binary format", arg(0))
        }
        template::ERROR_DEBUG_INFO_CORRUPT => {
            format!("{}: debug information is corrupt ({})", arg(0), arg(1))
        }
        template::ERROR_POLICY_CONFIGURATION => {
            format!("policy configuration error auditing {}: {}", arg(0), arg(1))
        }
        template::ERROR_IO => format!("{}: {}", arg(0), arg(1)),
        _ => verdict.args.join(" "),
    }
}
