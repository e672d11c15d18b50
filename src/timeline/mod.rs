//! Employment timeline analysis: gaps and overlaps between positions.

pub mod analyzer;
pub mod dates;

pub use analyzer::{
    ExperienceAnalyzer, Gap, Overlap, Period, TimelineEntry, TimelineEvent, TimelineFlags,
};
pub use dates::{months_between, parse_date};
