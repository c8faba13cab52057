//! Declarative marker table used by the session probe.
//!
//! Each [`Marker`] pairs an id with a match rule and a class. Stuck
//! markers that recognise a confirmation dialog with a safe default also
//! carry the answer to type. Table order matters: when several stuck
//! markers with answers match, the policy uses the first one.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};

use crate::config::MarkerConfig;
use crate::models::signal::MarkerClass;
use crate::{AppError, Result};

/// How a marker recognises its text.
#[derive(Debug, Clone)]
pub enum MatchRule {
    /// Plain substring test.
    Substring {
        /// Text to look for.
        needle: String,
        /// Exact-case comparison when `true`.
        case_sensitive: bool,
    },
    /// Regular expression search.
    Pattern(Regex),
}

impl MatchRule {
    /// Case-sensitive substring rule.
    #[must_use]
    pub fn exact(needle: &str) -> Self {
        Self::Substring {
            needle: needle.to_owned(),
            case_sensitive: true,
        }
    }

    /// Case-insensitive substring rule.
    #[must_use]
    pub fn caseless(needle: &str) -> Self {
        Self::Substring {
            needle: needle.to_lowercase(),
            case_sensitive: false,
        }
    }

    /// Regex rule.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the expression does not compile.
    pub fn pattern(expr: &str) -> Result<Self> {
        RegexBuilder::new(expr)
            .size_limit(1 << 20)
            .build()
            .map(Self::Pattern)
            .map_err(|err| AppError::Config(format!("invalid marker pattern {expr:?}: {err}")))
    }

    /// Test the rule against captured text. `lowered` is `text` already
    /// lower-cased, shared across caseless rules.
    #[must_use]
    pub fn is_match(&self, text: &str, lowered: &str) -> bool {
        match self {
            Self::Substring {
                needle,
                case_sensitive: true,
            } => text.contains(needle.as_str()),
            Self::Substring {
                needle,
                case_sensitive: false,
            } => lowered.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

/// One row of the marker table.
#[derive(Debug, Clone)]
pub struct Marker {
    /// Stable identifier reported in signals and logs.
    pub id: String,
    /// Whether a hit means stuck or dead.
    pub class: MarkerClass,
    /// Match rule.
    pub rule: MatchRule,
    /// Safe default answer for a stuck prompt; empty means "just submit".
    pub answer: Option<String>,
}

impl Marker {
    fn stuck(id: &str, rule: MatchRule, answer: Option<&str>) -> Self {
        Self {
            id: id.to_owned(),
            class: MarkerClass::Stuck,
            rule,
            answer: answer.map(str::to_owned),
        }
    }

    fn dead(id: &str, rule: MatchRule) -> Self {
        Self {
            id: id.to_owned(),
            class: MarkerClass::Dead,
            rule,
            answer: None,
        }
    }

    fn from_config(cfg: &MarkerConfig) -> Result<Self> {
        let rule = if cfg.regex {
            MatchRule::pattern(&cfg.pattern)?
        } else if cfg.case_sensitive {
            MatchRule::exact(&cfg.pattern)
        } else {
            MatchRule::caseless(&cfg.pattern)
        };
        if cfg.class == MarkerClass::Dead && cfg.answer.is_some() {
            return Err(AppError::Config(format!(
                "marker {} is dead-class and cannot carry an answer",
                cfg.id
            )));
        }
        Ok(Self {
            id: cfg.id.clone(),
            class: cfg.class,
            rule,
            answer: cfg.answer.clone(),
        })
    }
}

/// Ordered, extensible set of markers.
#[derive(Debug, Clone)]
pub struct MarkerTable {
    markers: Vec<Marker>,
}

impl MarkerTable {
    /// Table from explicit markers, in the given order.
    #[must_use]
    pub fn new(markers: Vec<Marker>) -> Self {
        Self { markers }
    }

    /// Built-in table for agent CLIs running in a shell.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` only if a built-in regex fails to compile.
    pub fn builtin() -> Result<Self> {
        Ok(Self::new(vec![
            Marker::stuck(
                "confirm_dialog",
                MatchRule::exact("Do you want to proceed?"),
                Some("2"),
            ),
            Marker::stuck(
                "numbered_yes_option",
                MatchRule::pattern(r"❯\s*1\. Yes")?,
                Some("1"),
            ),
            Marker::stuck(
                "dont_ask_again_option",
                MatchRule::exact("2. Yes, and don't ask again"),
                None,
            ),
            Marker::stuck("yes_no_prompt", MatchRule::exact("[Y/n]"), Some("y")),
            Marker::stuck(
                "continue_prompt",
                MatchRule::pattern(r"(?m)Continue\?\s*$")?,
                Some("y"),
            ),
            Marker::stuck("press_any_key", MatchRule::caseless("press any key"), Some("")),
            Marker::stuck(
                "waiting_for_input",
                MatchRule::caseless("waiting for input"),
                None,
            ),
            Marker::stuck("exit_hint", MatchRule::exact("Type 'exit' to quit"), None),
            Marker::dead(
                "auth_failure",
                MatchRule::pattern(
                    r"(?i)authentication (failed|required|error)|invalid api key|please (run )?/?login",
                )?,
            ),
            Marker::dead(
                "error_failed",
                MatchRule::pattern(r"(?i)\berror\b[^\n]*\bfailed\b")?,
            ),
            Marker::dead(
                "fatal_error",
                MatchRule::pattern(r"(?im)^\s*(fatal|panic(ked)?)\b")?,
            ),
            Marker::dead(
                "command_not_found",
                MatchRule::pattern(r"(?m)command not found\s*$")?,
            ),
            Marker::dead(
                "process_exited",
                MatchRule::pattern(r"(?m)^\[(P|p)rocess (exited|completed)")?,
            ),
        ]))
    }

    /// Built-in table with configured markers applied: an entry whose id
    /// exists replaces it in place, new ids are appended.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a configured marker is invalid.
    pub fn with_overrides(overrides: &[MarkerConfig]) -> Result<Self> {
        let mut table = Self::builtin()?;
        for cfg in overrides {
            table.upsert(Marker::from_config(cfg)?);
        }
        Ok(table)
    }

    /// Replace the marker with the same id, or append.
    pub fn upsert(&mut self, marker: Marker) {
        if let Some(slot) = self.markers.iter_mut().find(|m| m.id == marker.id) {
            *slot = marker;
        } else {
            self.markers.push(marker);
        }
    }

    /// Look a marker up by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    /// Markers in table order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Number of markers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the table has no markers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// First stuck marker in table order that is among `matched` and
    /// carries a known answer.
    #[must_use]
    pub fn first_answer(&self, matched: &BTreeSet<String>) -> Option<(&str, &str)> {
        self.markers
            .iter()
            .filter(|m| m.class == MarkerClass::Stuck && matched.contains(&m.id))
            .find_map(|m| m.answer.as_deref().map(|answer| (m.id.as_str(), answer)))
    }
}
