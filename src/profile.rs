//! Typed candidate and job records, validated once when loaded.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MatchError;
use crate::timeline::TimelineEntry;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub last_name: String,
    pub first_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub linkedin: String,
    pub other_links: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub location: String,
    /// Free text, e.g. `03/2019`, `2019-03`, `2019` or `present`.
    pub start: String,
    pub end: String,
    pub missions: Vec<String>,
}

/// A parsed CV. Every field except `id` may be absent from the source JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateProfile {
    /// Source file name; unique within a matching run.
    pub id: String,
    pub identity: Identity,
    pub title: String,
    pub summary: String,
    pub technical_skills: Vec<String>,
    pub soft_skills: Vec<String>,
    pub languages: Vec<String>,
    pub experiences: Vec<Experience>,
    pub education: Vec<Value>,
    pub certifications: Vec<Value>,
    pub projects: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobPosting {
    pub title: String,
    pub description: String,
    pub must_have: Vec<String>,
    pub nice_have: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

const UNKNOWN_LABEL: &str = "Unknown";

impl CandidateProfile {
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.id.trim().is_empty() {
            return Err(MatchError::InvalidInput(
                "candidate profile without an id".into(),
            ));
        }
        if let Some(embedding) = &self.embedding {
            if embedding.iter().any(|x| !x.is_finite()) {
                return Err(MatchError::InvalidInput(format!(
                    "candidate {} has a non-finite embedding value",
                    self.id
                )));
            }
        }
        Ok(())
    }

    /// Every textual section on one line, whitespace collapsed.
    pub fn flatten_text(&self) -> String {
        let mut parts = vec![self.title.as_str(), self.summary.as_str()];
        parts.extend(self.technical_skills.iter().map(String::as_str));
        parts.extend(self.soft_skills.iter().map(String::as_str));
        parts.extend(self.languages.iter().map(String::as_str));
        for exp in &self.experiences {
            parts.push(&exp.title);
            parts.push(&exp.company);
            parts.extend(exp.missions.iter().map(String::as_str));
        }
        let extras: Vec<String> = self
            .education
            .iter()
            .chain(&self.certifications)
            .chain(&self.projects)
            .map(value_text)
            .collect();
        parts.extend(extras.iter().map(String::as_str));

        parts
            .iter()
            .flat_map(|p| p.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Employment history for gap/overlap analysis, labelled by employer.
    pub fn timeline_entries(&self) -> Vec<TimelineEntry> {
        self.experiences
            .iter()
            .map(|exp| {
                let label = [exp.company.trim(), exp.title.trim()]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .unwrap_or(UNKNOWN_LABEL);
                TimelineEntry::new(exp.start.clone(), exp.end.clone(), label)
            })
            .collect()
    }

    /// Compact multi-line description for model requests.
    pub fn summary_for_prompt(&self) -> String {
        let mut lines = vec![format!("Candidate: {}", self.id)];
        if !self.title.is_empty() {
            lines.push(format!("Title: {}", self.title));
        }
        if !self.summary.is_empty() {
            lines.push(format!("Summary: {}", self.summary));
        }
        if !self.technical_skills.is_empty() {
            lines.push(format!("Skills: {}", self.technical_skills.join(", ")));
        }
        if !self.languages.is_empty() {
            lines.push(format!("Languages: {}", self.languages.join(", ")));
        }
        if !self.experiences.is_empty() {
            lines.push("Experience:".to_string());
            for exp in &self.experiences {
                lines.push(format!(
                    "  - {} at {} ({} to {})",
                    or_unknown(&exp.title),
                    or_unknown(&exp.company),
                    or_unknown(&exp.start),
                    or_unknown(&exp.end)
                ));
            }
        }
        lines.join("\n")
    }
}

impl JobPosting {
    pub fn must_haves(&self) -> Vec<&str> {
        non_blank(&self.must_have)
    }

    pub fn nice_haves(&self) -> Vec<&str> {
        non_blank(&self.nice_have)
    }

    pub fn summary_for_prompt(&self) -> String {
        let mut text = format!("Job: {}", or_unknown(&self.title));
        if !self.description.is_empty() {
            text.push('\n');
            text.push_str(&self.description);
        }
        text
    }
}

fn non_blank(items: &[String]) -> Vec<&str> {
    items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect()
}

fn or_unknown(s: &str) -> &str {
    if s.trim().is_empty() { "?" } else { s }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Object(map) => map.values().map(value_text).collect::<Vec<_>>().join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Rejects empty and duplicate ids.
pub fn validate_candidates(candidates: &[CandidateProfile]) -> Result<(), MatchError> {
    let mut seen = HashSet::with_capacity(candidates.len());
    for candidate in candidates {
        candidate.validate()?;
        if !seen.insert(candidate.id.as_str()) {
            return Err(MatchError::DuplicateItem(candidate.id.clone()));
        }
    }
    Ok(())
}

/// Reads a JSON array of profiles.
pub fn load_candidates(path: &Path) -> Result<Vec<CandidateProfile>, MatchError> {
    let contents = std::fs::read_to_string(path)?;
    let candidates: Vec<CandidateProfile> = serde_json::from_str(&contents)?;
    validate_candidates(&candidates)?;
    Ok(candidates)
}

pub fn load_job(path: &Path) -> Result<JobPosting, MatchError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn profile(id: &str) -> CandidateProfile {
        CandidateProfile {
            id: id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let p: CandidateProfile = serde_json::from_value(json!({
            "id": "jane.pdf",
            "experiences": [{"company": "Acme", "start": "2020-01"}]
        }))
        .unwrap();
        assert_eq!(p.id, "jane.pdf");
        assert!(p.technical_skills.is_empty());
        assert_eq!(p.experiences[0].end, "");
        assert!(p.embedding.is_none());
    }

    #[test]
    fn timeline_labels_fall_back_to_title() {
        let mut p = profile("a.pdf");
        p.experiences = vec![
            Experience { company: "Acme".into(), start: "2019".into(), end: "2020".into(), ..Default::default() },
            Experience { title: "Consultant".into(), ..Default::default() },
            Experience::default(),
        ];
        let labels: Vec<_> = p.timeline_entries().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["Acme", "Consultant", "Unknown"]);
    }

    #[test]
    fn flatten_text_collapses_whitespace() {
        let mut p = profile("a.pdf");
        p.title = "  Rust   developer ".into();
        p.technical_skills = vec!["tokio".into(), "serde".into()];
        p.certifications = vec![json!({"name": "AWS  SAA", "year": 2021})];
        let text = p.flatten_text();
        assert!(text.starts_with("Rust developer tokio serde"));
        assert!(text.contains("AWS SAA"));
        assert!(text.contains("2021"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn duplicate_and_blank_ids_are_rejected() {
        let err = validate_candidates(&[profile("a.pdf"), profile("a.pdf")]).unwrap_err();
        assert!(matches!(err, MatchError::DuplicateItem(_)));
        let err = validate_candidates(&[profile("  ")]).unwrap_err();
        assert!(matches!(err, MatchError::InvalidInput(_)));
    }

    #[test]
    fn blank_criteria_are_dropped() {
        let job = JobPosting {
            must_have: vec!["Rust".into(), "  ".into(), " SQL ".into()],
            ..Default::default()
        };
        assert_eq!(job.must_haves(), vec!["Rust", "SQL"]);
        assert!(job.nice_haves().is_empty());
    }

    #[test]
    fn load_candidates_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id": "a.pdf", "title": "Dev"}}, {{"id": "b.pdf"}}]"#).unwrap();
        let candidates = load_candidates(file.path()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Dev");
    }
}
