use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::stage::Stage;
use crate::engine::{
    BatchMeta, BatchReport, BatchSettings, ItemProcessor, ParallelExecutor, ProcessingOutcome,
    Progress, ProgressSink, WorkItem,
};
use crate::error::{ItemError, MatchError};
use crate::llm::{MessageSender, MessagesRequest, ask_json};
use crate::profile::CandidateProfile;

/// Documents per batch in [`parse_in_chunks`].
pub const CHUNK_SIZE: usize = 500;

const SYSTEM_PROMPT: &str = "You turn raw CV text into structured data. \
Reply with one JSON object and nothing else, with the keys: identity {first_name, last_name, email, \
phone, address, linkedin}, title, summary, technical_skills, soft_skills, languages, experiences [{title, \
company, location, start, end, missions}], education, certifications, projects. \
Write dates as MM/YYYY, YYYY-MM or YYYY, and \"present\" for an ongoing position.";

const MAX_TOKENS: u32 = 4096;

/// Plain text extracted from one CV file.
#[derive(Debug, Clone, PartialEq)]
pub struct CvDocument {
    pub filename: String,
    pub text: String,
}

impl CvDocument {
    pub fn new(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
        }
    }
}

/// Reads every `.txt` file of `dir`, sorted by file name.
pub fn load_documents(dir: &Path) -> Result<Vec<CvDocument>, MatchError> {
    let mut documents = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
        if !path.is_file() || !is_text {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let filename = filename.to_string();
        let text = std::fs::read_to_string(&path)?;
        documents.push(CvDocument { filename, text });
    }
    documents.sort_by(|a, b| a.filename.cmp(&b.filename));
    debug!(dir = %dir.display(), documents = documents.len(), "loaded CV documents");
    Ok(documents)
}

/// Asks the model for a structured profile; the profile id is the file name.
pub struct LlmCvParser<S> {
    sender: Arc<S>,
    model: String,
}

impl<S: MessageSender> LlmCvParser<S> {
    pub fn new(sender: Arc<S>, model: impl Into<String>) -> Self {
        Self {
            sender,
            model: model.into(),
        }
    }
}

impl<S: MessageSender> ItemProcessor<CvDocument> for LlmCvParser<S> {
    type Output = CandidateProfile;

    async fn process(
        &self,
        document: &CvDocument,
        _timeout: Duration,
    ) -> Result<CandidateProfile, ItemError> {
        if document.text.trim().is_empty() {
            return Err(ItemError::malformed(format!("{} has no text", document.filename)));
        }
        let request = MessagesRequest::single_turn(
            &self.model,
            MAX_TOKENS,
            SYSTEM_PROMPT,
            format!("CV file: {}\n\n{}", document.filename, document.text),
        );
        let mut profile: CandidateProfile = ask_json(self.sender.as_ref(), &request).await?;
        profile.id = document.filename.clone();
        profile.embedding = None;
        Ok(profile)
    }
}

/// Parsing outcomes in input order, with one `BatchMeta` per chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ParseReport {
    pub outcomes: Vec<ProcessingOutcome<CandidateProfile>>,
    pub chunks: Vec<BatchMeta>,
}

impl ParseReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessingOutcome<CandidateProfile>> {
        self.outcomes.iter().filter(|o| !o.succeeded)
    }

    /// Figures for the whole run, summed over chunks. `None` when nothing ran.
    pub fn combined_meta(&self) -> Option<BatchMeta> {
        let first = self.chunks.first()?;
        Some(BatchMeta {
            batch_id: first.batch_id,
            total: self.chunks.iter().map(|m| m.total).sum(),
            success_count: self.chunks.iter().map(|m| m.success_count).sum(),
            failed_count: self.chunks.iter().map(|m| m.failed_count).sum(),
            peak_inflight: self.chunks.iter().map(|m| m.peak_inflight).max().unwrap_or(0),
            elapsed: self.chunks.iter().map(|m| m.elapsed).sum(),
        })
    }

    pub fn into_profiles(self) -> Vec<CandidateProfile> {
        self.outcomes.into_iter().filter_map(|o| o.result).collect()
    }
}

fn document_items(documents: Vec<CvDocument>) -> Vec<WorkItem<CvDocument>> {
    documents
        .into_iter()
        .map(|d| WorkItem::new(d.filename.clone(), d))
        .collect()
}

/// Parses every document in a single batch.
pub async fn parse_documents<P, S>(
    parser: Arc<P>,
    settings: &BatchSettings,
    documents: Vec<CvDocument>,
    progress: &S,
) -> Result<BatchReport<CandidateProfile>, MatchError>
where
    P: ItemProcessor<CvDocument, Output = CandidateProfile> + 'static,
    S: ProgressSink + ?Sized,
{
    ParallelExecutor::new(settings.clone())
        .with_label(Stage::Parsing.label())
        .run(document_items(documents), parser, progress)
        .await
}

/// Reports chunk-local progress as progress over the whole run.
struct OffsetSink<'a, S: ?Sized> {
    inner: &'a S,
    offset: usize,
    total: usize,
}

impl<S: ProgressSink + ?Sized> ProgressSink for OffsetSink<'_, S> {
    fn on_progress(&self, progress: Progress) {
        self.inner.on_progress(Progress {
            completed: self.offset + progress.completed,
            total: self.total,
        });
    }
}

/// Parses documents in successive batches of at most `chunk_size`.
///
/// Each chunk gets a fresh limiter and tracker. Outcome indices are global.
pub async fn parse_in_chunks<P, S>(
    parser: Arc<P>,
    settings: &BatchSettings,
    documents: Vec<CvDocument>,
    chunk_size: usize,
    progress: &S,
) -> Result<ParseReport, MatchError>
where
    P: ItemProcessor<CvDocument, Output = CandidateProfile> + 'static,
    S: ProgressSink + ?Sized,
{
    settings.validate()?;
    let chunk_size = chunk_size.max(1);
    let total = documents.len();

    let mut outcomes = Vec::with_capacity(total);
    let mut chunks = Vec::new();
    let mut remaining = documents.into_iter().peekable();
    let mut offset = 0;
    while remaining.peek().is_some() {
        let chunk: Vec<CvDocument> = remaining.by_ref().take(chunk_size).collect();
        let len = chunk.len();
        info!(offset, len, total, "parsing chunk");

        let sink = OffsetSink {
            inner: progress,
            offset,
            total,
        };
        let report = parse_documents(Arc::clone(&parser), settings, chunk, &sink).await?;
        chunks.push(report.meta.clone());
        outcomes.extend(report.into_input_order().into_iter().map(|mut o| {
            o.index += offset;
            o
        }));
        offset += len;
    }

    Ok(ParseReport { outcomes, chunks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NoProgress, from_fn};
    use std::sync::Mutex;

    fn settings() -> BatchSettings {
        BatchSettings {
            concurrency: 4,
            qps: 1000.0,
            timeout_seconds: 5,
            retries: 0,
            backoff_seconds: 0.01,
            ..BatchSettings::default()
        }
    }

    fn docs(n: usize) -> Vec<CvDocument> {
        (0..n)
            .map(|i| CvDocument::new(format!("cv{i:02}.txt"), format!("text {i}")))
            .collect()
    }

    #[test]
    fn loads_only_text_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "Bob").unwrap();
        std::fs::write(dir.path().join("a.TXT"), "Alice").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "binary").unwrap();

        let documents = load_documents(dir.path()).unwrap();
        let names: Vec<_> = documents.iter().map(|d| d.filename.as_str()).collect();
        assert_eq!(names, vec!["a.TXT", "b.txt"]);
        assert_eq!(documents[1].text, "Bob");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = load_documents(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, MatchError::Io(_)));
    }

    #[tokio::test]
    async fn chunks_report_global_indices_and_progress() {
        let parser = Arc::new(from_fn(|doc: CvDocument, _timeout| async move {
            if doc.filename == "cv03.txt" {
                Err(ItemError::malformed("not a CV"))
            } else {
                Ok(CandidateProfile {
                    id: doc.filename,
                    ..CandidateProfile::default()
                })
            }
        }));
        let seen = Mutex::new(Vec::new());
        let sink = |p: Progress| seen.lock().unwrap().push(p);

        let report = parse_in_chunks(parser, &settings(), docs(7), 3, &sink).await.unwrap();

        assert_eq!(report.chunks.len(), 3);
        assert_eq!(report.outcomes.len(), 7);
        let indices: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, (0..7).collect::<Vec<_>>());
        assert_eq!(report.success_count(), 6);
        assert_eq!(report.failures().next().unwrap().item_id, "cv03.txt");

        let seen = seen.into_inner().unwrap();
        let completed: Vec<_> = seen.iter().map(|p| p.completed).collect();
        assert_eq!(completed, (1..=7).collect::<Vec<_>>());
        assert!(seen.iter().all(|p| p.total == 7));

        let meta = report.combined_meta().unwrap();
        assert_eq!(meta.total, 7);
        assert_eq!(meta.failed_count, 1);
        assert!(meta.peak_inflight <= 4);

        let profiles = report.into_profiles();
        assert_eq!(profiles.len(), 6);
    }

    #[tokio::test]
    async fn no_documents_runs_no_chunk() {
        let parser = Arc::new(from_fn(|doc: CvDocument, _timeout| async move {
            Ok::<_, ItemError>(CandidateProfile {
                id: doc.filename,
                ..CandidateProfile::default()
            })
        }));
        let report = parse_in_chunks(parser, &settings(), Vec::new(), CHUNK_SIZE, &NoProgress)
            .await
            .unwrap();
        assert!(report.outcomes.is_empty());
        assert!(report.chunks.is_empty());
        assert!(report.combined_meta().is_none());
    }
}
