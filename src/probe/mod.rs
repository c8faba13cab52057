//! Session probe: captured pane text in, [`SessionSignal`] out.
//!
//! The probe is a pure function of its input. It never fails; empty or
//! garbled input simply yields a signal with no markers.

pub mod markers;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::models::signal::{MarkerClass, SessionSignal};

use self::markers::MarkerTable;

/// Matches the tail of a capture against a [`MarkerTable`].
#[derive(Debug, Clone)]
pub struct SessionProbe {
    table: MarkerTable,
    max_lines: usize,
}

impl SessionProbe {
    /// Probe over `table`, considering the last `max_lines` lines.
    #[must_use]
    pub fn new(table: MarkerTable, max_lines: usize) -> Self {
        Self {
            table,
            max_lines: max_lines.max(1),
        }
    }

    /// Marker table in use.
    #[must_use]
    pub fn table(&self) -> &MarkerTable {
        &self.table
    }

    /// Produce a signal from raw captured text.
    #[must_use]
    pub fn probe(&self, raw: &str, captured_at: DateTime<Utc>) -> SessionSignal {
        let text = tail_lines(raw, self.max_lines);
        let lowered = text.to_lowercase();

        let mut stuck_markers = BTreeSet::new();
        let mut dead_markers = BTreeSet::new();

        if !text.trim().is_empty() {
            for marker in self.table.iter() {
                if marker.rule.is_match(&text, &lowered) {
                    match marker.class {
                        MarkerClass::Stuck => stuck_markers.insert(marker.id.clone()),
                        MarkerClass::Dead => dead_markers.insert(marker.id.clone()),
                    };
                }
            }
        }

        SessionSignal {
            text,
            stuck_markers,
            dead_markers,
            captured_at,
        }
    }
}

/// Last `max_lines` lines of `raw`, ignoring the blank padding a terminal
/// leaves below the cursor.
fn tail_lines(raw: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = raw.lines().map(|line| line.trim_end_matches('\r')).collect();
    let end = lines
        .iter()
        .rposition(|line| !line.trim().is_empty())
        .map_or(0, |idx| idx + 1);
    let start = end.saturating_sub(max_lines);
    lines[start..end].join("\n")
}
