use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::dates::{months_between, parse_date};

/// Shortest hole between two positions that counts as a gap.
pub const MIN_GAP_MONTHS: i32 = 3;
/// Overlaps up to this many days are treated as a normal hand-over.
pub const MAX_TOLERATED_OVERLAP_DAYS: i64 = 14;

/// A position as written in the CV, dates still free text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub start: String,
    pub end: String,
    pub label: String,
}

impl TimelineEntry {
    pub fn new(start: impl Into<String>, end: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            label: label.into(),
        }
    }
}

/// A position with whichever endpoints could be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEvent {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start.format("%Y-%m"), self.end.format("%Y-%m"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gap {
    pub period: Period,
    pub duration_months: u32,
    /// Position before the gap, then the one after it.
    pub between_labels: (String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overlap {
    pub period: Period,
    pub duration_days: i64,
    pub labels: (String, String),
    pub same_employer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TimelineFlags {
    pub gaps: Vec<Gap>,
    pub overlaps: Vec<Overlap>,
}

impl TimelineFlags {
    pub fn is_empty(&self) -> bool {
        self.gaps.is_empty() && self.overlaps.is_empty()
    }

    /// Plain-text summary embedded in re-ranking requests.
    pub fn format_for_prompt(&self) -> String {
        if self.is_empty() {
            return "No flags detected (no significant gaps or overlaps).".to_string();
        }

        let mut lines = Vec::new();
        if !self.gaps.is_empty() {
            lines.push(format!("GAPS DETECTED ({}):", self.gaps.len()));
            for gap in &self.gaps {
                lines.push(format!(
                    "  - {} ({} months) between {} and {}",
                    gap.period, gap.duration_months, gap.between_labels.0, gap.between_labels.1
                ));
            }
        }
        if !self.overlaps.is_empty() {
            lines.push(format!("OVERLAPS DETECTED ({}):", self.overlaps.len()));
            for overlap in &self.overlaps {
                let same = if overlap.same_employer { " (same employer)" } else { "" };
                lines.push(format!(
                    "  - {} ({} days): {} and {}{same}",
                    overlap.period, overlap.duration_days, overlap.labels.0, overlap.labels.1
                ));
            }
        }
        lines.join("\n")
    }
}

struct Dated<'a> {
    start: NaiveDate,
    end: NaiveDate,
    label: &'a str,
}

/// Detects gaps and overlaps in an employment timeline.
///
/// Entries with an endpoint that does not parse are left out of the analysis
/// without being reported. Output does not depend on input order.
#[derive(Debug, Clone, Copy)]
pub struct ExperienceAnalyzer {
    today: NaiveDate,
}

impl ExperienceAnalyzer {
    /// `today` is what "present"-like end dates resolve to.
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn today_utc() -> Self {
        Self::new(Utc::now().date_naive())
    }

    pub fn event(&self, entry: &TimelineEntry) -> TimelineEvent {
        TimelineEvent {
            start: parse_date(&entry.start, self.today),
            end: parse_date(&entry.end, self.today),
            label: entry.label.clone(),
        }
    }

    pub fn analyze(&self, entries: &[TimelineEntry]) -> TimelineFlags {
        let events: Vec<TimelineEvent> = entries.iter().map(|e| self.event(e)).collect();
        let mut dated: Vec<Dated<'_>> = events
            .iter()
            .filter_map(|event| match (event.start, event.end) {
                (Some(start), Some(end)) => Some(Dated {
                    start,
                    end,
                    label: &event.label,
                }),
                _ => None,
            })
            .collect();

        dated.sort_by(|a, b| {
            b.end
                .cmp(&a.end)
                .then_with(|| b.start.cmp(&a.start))
                .then_with(|| a.label.cmp(b.label))
        });

        TimelineFlags {
            gaps: detect_gaps(&dated),
            overlaps: detect_overlaps(&dated),
        }
    }
}

// `dated` is sorted by end date, most recent first.
fn detect_gaps(dated: &[Dated<'_>]) -> Vec<Gap> {
    dated
        .windows(2)
        .filter_map(|pair| {
            let (later, earlier) = (&pair[0], &pair[1]);
            let months = months_between(earlier.end, later.start);
            (months >= MIN_GAP_MONTHS).then(|| Gap {
                period: Period {
                    start: earlier.end,
                    end: later.start,
                },
                duration_months: months.unsigned_abs(),
                between_labels: (earlier.label.to_string(), later.label.to_string()),
            })
        })
        .collect()
}

fn detect_overlaps(dated: &[Dated<'_>]) -> Vec<Overlap> {
    let mut overlaps = Vec::new();
    for (i, a) in dated.iter().enumerate() {
        for b in &dated[i + 1..] {
            if !(b.start < a.end && a.start < b.end) {
                continue;
            }
            let start = a.start.max(b.start);
            let end = a.end.min(b.end);
            let days = (end - start).num_days();
            if days > MAX_TOLERATED_OVERLAP_DAYS {
                overlaps.push(Overlap {
                    period: Period { start, end },
                    duration_days: days,
                    labels: (a.label.to_string(), b.label.to_string()),
                    same_employer: a.label.to_lowercase() == b.label.to_lowercase(),
                });
            }
        }
    }
    overlaps
}
