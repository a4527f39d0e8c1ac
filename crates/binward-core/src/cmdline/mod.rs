//! Compiler command-line fact extraction.
//!
//! PDB object modules (and DWARF producer records) carry the raw invocation
//! string the compiler was launched with. This module turns that string into
//! queryable facts:
//!
//! - argv tokenization with native quoting rules
//! - global warning level and warnings-as-errors state
//! - the set of warning numbers effectively disabled
//! - generic switch-state and option-value queries for rule code
//!
//! No policy decisions are made here; the policy engine interprets the facts.

use std::collections::HashMap;

/// How a multi-match scan resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    /// Stop at the first token that decisively resolves the query.
    FirstWins,
    /// Scan every token; the final decisive match governs.
    LastWins,
}

/// Resolved state of a two-polarity compiler switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Enabled,
    Disabled,
}

/// Last-seen explicit state recorded for one warning number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WarningState {
    /// `/wd{n}`
    Disabled,
    /// `/we{n}`
    AsError,
    /// `/wo{n}` (report once)
    Once,
    /// `/w{l}{n}`, fires only when the global level reaches `l`.
    Level(u8),
}

/// Immutable facts derived once from a raw compiler invocation string.
///
/// Warning-state resolution scans the *entire* token stream before collapsing
/// anything: a `/w4{n}` early in the line must see a `/W1` that appears later,
/// because the global level is last-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
    warning_level: u8,
    warnings_as_errors: bool,
    disabled_warnings: Vec<u32>,
}

impl CommandLine {
    pub fn new(raw: &str) -> Self {
        let tokens = tokenize(raw);
        let (warning_level, warnings_as_errors, disabled_warnings) = resolve_warnings(&tokens);
        Self {
            tokens,
            warning_level,
            warnings_as_errors,
            disabled_warnings,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Global warning level, 0–4. `/Wall` counts as 4, `/w` as 0.
    pub fn warning_level(&self) -> u8 {
        self.warning_level
    }

    /// Whether `/WX` is in effect after the whole line is scanned.
    pub fn warnings_as_errors(&self) -> bool {
        self.warnings_as_errors
    }

    /// Warning numbers explicitly or effectively disabled, sorted ascending.
    ///
    /// `/wd{n}` disables outright; `/we{n}` and `/wo{n}` keep the warning
    /// enabled; `/w{l}{n}` disables it whenever the global level stays below
    /// `l`.
    pub fn disabled_warnings(&self) -> &[u32] {
        &self.disabled_warnings
    }

    /// Resolve a two-polarity switch such as `Qspectre` / `Qspectre-`.
    ///
    /// A token matches a name when, after stripping the `/` or `-` option
    /// prefix, it starts with the name's stem: an exact stem match enables,
    /// a stem with a trailing `-` disables, any other partial match is
    /// ignored. `overrides` are tracked in the same scan with the same stem
    /// rules; an *enabled* override forces the result to `Disabled` (a
    /// disabled override has no effect). With no explicit switch decision and
    /// no enabled override, `default` applies.
    pub fn switch_state(
        &self,
        switches: &[&str],
        overrides: &[&str],
        default: SwitchState,
        precedence: Precedence,
    ) -> SwitchState {
        let mut switch_decision: Option<SwitchState> = None;
        let mut override_decision: Option<SwitchState> = None;

        for token in &self.tokens {
            let Some(body) = strip_option_prefix(token) else {
                continue;
            };

            let here_switch = decide(body, switches);
            let here_override = decide(body, overrides);

            if let Some(state) = here_switch {
                switch_decision = Some(state);
            }
            if let Some(state) = here_override {
                override_decision = Some(state);
            }

            if precedence == Precedence::FirstWins
                && (here_switch.is_some() || here_override.is_some())
            {
                break;
            }
        }

        if override_decision == Some(SwitchState::Enabled) {
            return SwitchState::Disabled;
        }
        switch_decision.unwrap_or(default)
    }

    /// Purely textual option lookup: the remainder of a stem-matching token
    /// is the value. `-O2` queried with name `O` yields `"2"`.
    pub fn option_value(&self, names: &[&str], precedence: Precedence) -> Option<String> {
        let mut found = None;
        for token in &self.tokens {
            let Some(body) = strip_option_prefix(token) else {
                continue;
            };
            for name in names {
                if let Some(rest) = body.strip_prefix(name) {
                    found = Some(rest.to_string());
                    if precedence == Precedence::FirstWins {
                        return found;
                    }
                    break;
                }
            }
        }
        found
    }

    /// True when any token equals `flag` exactly (prefix included).
    pub fn contains_token(&self, flag: &str) -> bool {
        self.tokens.iter().any(|t| t == flag)
    }
}

fn strip_option_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix('/')
        .or_else(|| token.strip_prefix('-'))
        .filter(|body| !body.is_empty())
}

/// Stem-match `body` against `names`: exact ⇒ enabled, trailing `-` ⇒
/// disabled, other partials ignored.
fn decide(body: &str, names: &[&str]) -> Option<SwitchState> {
    for name in names {
        if let Some(rest) = body.strip_prefix(name) {
            if rest.is_empty() {
                return Some(SwitchState::Enabled);
            }
            if rest == "-" {
                return Some(SwitchState::Disabled);
            }
        }
    }
    None
}

/// Split a raw invocation string the way a native argv splitter would.
///
/// Quote runs open and close quoted spans; inside a quoted span `""` emits a
/// literal quote; a run of backslashes immediately before a quote collapses
/// to half as many backslashes, with an odd count escaping the quote itself.
fn tokenize(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let mut run = 0;
                while i + run < chars.len() && chars[i + run] == '\\' {
                    run += 1;
                }
                if i + run < chars.len() && chars[i + run] == '"' {
                    for _ in 0..run / 2 {
                        current.push('\\');
                    }
                    if run % 2 == 1 {
                        current.push('"');
                    } else {
                        in_quotes = !in_quotes;
                    }
                    i += run + 1;
                } else {
                    for _ in 0..run {
                        current.push('\\');
                    }
                    i += run;
                }
                started = true;
            }
            '"' => {
                if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                    current.push('"');
                    i += 2;
                } else {
                    in_quotes = !in_quotes;
                    i += 1;
                }
                started = true;
            }
            ' ' | '\t' if !in_quotes => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
                i += 1;
            }
            _ => {
                current.push(c);
                started = true;
                i += 1;
            }
        }
    }

    if started {
        args.push(current);
    }
    args
}

fn resolve_warnings(tokens: &[String]) -> (u8, bool, Vec<u32>) {
    let mut level: u8 = 1;
    let mut as_errors = false;
    let mut states: HashMap<u32, WarningState> = HashMap::new();

    for token in tokens {
        let Some(body) = strip_option_prefix(token) else {
            continue;
        };

        match body {
            "w" => level = 0,
            "Wall" => level = 4,
            "WX" => as_errors = true,
            "WX-" => as_errors = false,
            _ => {
                if let Some(digit) = body.strip_prefix('W').and_then(|r| r.parse::<u8>().ok()) {
                    if digit <= 4 {
                        level = digit;
                    }
                } else if let Some((number, state)) = parse_per_warning(body) {
                    // Later tokens overwrite earlier ones for the same number.
                    states.insert(number, state);
                }
            }
        }
    }

    // Collapse only after the entire line has been scanned: `Level` states
    // depend on the final global level.
    let mut disabled: Vec<u32> = states
        .into_iter()
        .filter_map(|(number, state)| {
            let is_disabled = match state {
                WarningState::Disabled => true,
                WarningState::AsError | WarningState::Once => false,
                WarningState::Level(l) => level < l,
            };
            is_disabled.then_some(number)
        })
        .collect();
    disabled.sort_unstable();

    (level, as_errors, disabled)
}

/// Parse `wd{n}`, `we{n}`, `wo{n}`, `w{1..4}{n}` bodies.
fn parse_per_warning(body: &str) -> Option<(u32, WarningState)> {
    let rest = body.strip_prefix('w')?;
    let mut chars = rest.chars();
    let selector = chars.next()?;
    let number: u32 = chars.as_str().parse().ok()?;

    let state = match selector {
        'd' => WarningState::Disabled,
        'e' => WarningState::AsError,
        'o' => WarningState::Once,
        '1'..='4' => WarningState::Level(selector as u8 - b'0'),
        _ => return None,
    };
    Some((number, state))
}
