//! Capture processing: the per-job state machine.
//!
//! received → cancel-check → duplicate-check → merge | create →
//! cancel-check → metadata extraction → persist → background
//! enrichment (embed, relate, profile refresh).
//!
//! Metadata extraction failures are absorbed — partial knowledge beats
//! job loss. Heavy enrichment is fire-and-forget so queue throughput is
//! not gated on the slower steps.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use engram_core::{
    canonicalize, CaptureMetadata, CreateMemoryRequest, Embedder, ExtractedMetadata, Generator,
    Job, MemoryRepository, MemoryUpsert, NewCapture, Result, VectorIndex,
};

/// How many nearest neighbors the relation builder links.
const RELATED_LIMIT: usize = 5;

/// How many recent memories feed a profile refresh.
const PROFILE_SAMPLE: usize = 20;

/// Terminal outcome of one capture job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Memory created or merged; enrichment continues in the background.
    Completed { memory_id: Uuid, merged: bool },
    /// Cancellation flag observed at a checkpoint; nothing persisted
    /// past the point of interruption. Not a failure.
    Cancelled,
}

/// Processes claimed capture jobs into memories.
pub struct CaptureProcessor {
    memories: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    vector_index: Arc<dyn VectorIndex>,
}

impl CaptureProcessor {
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        vector_index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            memories,
            embedder,
            generator,
            vector_index,
        }
    }

    /// Run the state machine for one claimed job.
    #[instrument(skip(self, job, cancel), fields(subsystem = "ingest", component = "capture", job_id = %job.id, user_id = %job.user_id))]
    pub async fn process(
        &self,
        job: &Job,
        cancel: &crate::cancel::CancellationToken,
    ) -> Result<CaptureOutcome> {
        // Checkpoint 1: before any expensive work.
        if cancel.is_cancelled().await? {
            debug!("Cancellation observed before duplicate check");
            return Ok(CaptureOutcome::Cancelled);
        }

        let upsert = self.find_or_create(job).await?;
        let memory_id = upsert.memory_id();
        let merged = upsert.is_merged();

        // Checkpoint 2: before extraction and the final persist.
        if cancel.is_cancelled().await? {
            debug!(memory_id = %memory_id, "Cancellation observed before metadata persist");
            return Ok(CaptureOutcome::Cancelled);
        }

        let (metadata, summary) = self.extract_metadata(&job.raw_text).await;
        self.memories
            .update_metadata(memory_id, &metadata, summary.as_deref())
            .await?;

        self.spawn_enrichment(memory_id, job.user_id, job.raw_text.clone());

        info!(memory_id = %memory_id, merged, "Capture processed");
        Ok(CaptureOutcome::Completed { memory_id, merged })
    }

    /// Duplicate-aware memory creation.
    ///
    /// An explicit target id or an existing memory with the same
    /// canonical hash takes the merge path; otherwise a fresh row is
    /// created (a concurrent-create race also resolves to a merge inside
    /// the repository).
    async fn find_or_create(&self, job: &Job) -> Result<MemoryUpsert> {
        let capture = NewCapture {
            user_id: job.user_id,
            raw_text: job.raw_text.clone(),
            metadata: job.metadata.clone(),
        };

        if let Some(existing_id) = job.metadata.existing_memory_id {
            self.memories.merge_capture(existing_id, &capture).await?;
            return Ok(MemoryUpsert::Merged(existing_id));
        }

        if let Some(existing) = self
            .memories
            .find_by_hash(job.user_id, &job.canonical_hash)
            .await?
        {
            self.memories.merge_capture(existing.id, &capture).await?;
            return Ok(MemoryUpsert::Merged(existing.id));
        }

        let canonical = canonicalize(&job.raw_text);
        self.memories
            .insert(CreateMemoryRequest {
                user_id: job.user_id,
                content: job.raw_text.clone(),
                canonical_hash: canonical.canonical_hash,
                url: job.metadata.url.clone(),
                title: job.metadata.title.clone(),
                memory_type: memory_type_for(&job.metadata),
                source: job
                    .metadata
                    .source
                    .clone()
                    .unwrap_or_else(|| "api".to_string()),
            })
            .await
    }

    /// Extract structured signals, absorbing every failure into empty
    /// metadata.
    async fn extract_metadata(&self, content: &str) -> (ExtractedMetadata, Option<String>) {
        let Some(generator) = &self.generator else {
            return (ExtractedMetadata::default(), None);
        };

        let excerpt: String = content.chars().take(4000).collect();
        let prompt = format!(
            "Extract metadata from this captured content.\n\
             Content:\n{excerpt}\n\n\
             Respond with JSON only: {{\"topics\": [strings], \"categories\": [strings], \
             \"sentiment\": \"positive\"|\"neutral\"|\"negative\", \
             \"importance\": 0-1, \"usefulness\": 0-1, \
             \"summary\": one sentence}}"
        );

        let raw = match generator.generate_json(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Metadata extraction failed, proceeding with empty metadata");
                return (ExtractedMetadata::default(), None);
            }
        };

        match parse_extraction(&raw) {
            Some(parsed) => parsed,
            None => {
                warn!(
                    response_len = raw.len(),
                    "Unparseable extraction output, proceeding with empty metadata"
                );
                (ExtractedMetadata::default(), None)
            }
        }
    }

    /// Fire-and-forget enrichment: embed + index, relation building,
    /// profile refresh. Errors are logged, never surfaced to the job.
    fn spawn_enrichment(&self, memory_id: Uuid, user_id: Uuid, content: String) {
        let memories = self.memories.clone();
        let embedder = self.embedder.clone();
        let vector_index = self.vector_index.clone();
        let generator = self.generator.clone();

        tokio::spawn(async move {
            if let Err(e) =
                enrich(memories, embedder, vector_index, generator, memory_id, user_id, content)
                    .await
            {
                warn!(memory_id = %memory_id, error = %e, "Background enrichment failed");
            }
        });
    }
}

/// Classify the capture's origin from its metadata.
fn memory_type_for(metadata: &CaptureMetadata) -> String {
    if metadata.url.is_some() {
        "page".to_string()
    } else {
        "note".to_string()
    }
}

/// Best-effort parse of the extraction JSON.
fn parse_extraction(raw: &str) -> Option<(ExtractedMetadata, Option<String>)> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    let value: serde_json::Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let obj = value.as_object()?;

    let strings = |key: &str| -> Vec<String> {
        obj.get(key)
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|s| s.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    };
    let unit = |key: &str| -> Option<f32> {
        obj.get(key)
            .and_then(|v| v.as_f64())
            .map(|v| v.clamp(0.0, 1.0) as f32)
    };

    let summary = obj
        .get("summary")
        .and_then(|v| v.as_str())
        .map(String::from)
        .filter(|s| !s.trim().is_empty());

    let known = ["topics", "categories", "sentiment", "importance", "usefulness", "summary"];
    let extra: serde_json::Map<String, serde_json::Value> = obj
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Some((
        ExtractedMetadata {
            topics: strings("topics"),
            categories: strings("categories"),
            sentiment: obj
                .get("sentiment")
                .and_then(|v| v.as_str())
                .map(String::from),
            importance: unit("importance"),
            usefulness: unit("usefulness"),
            extra,
        },
        summary,
    ))
}

/// The enrichment pass: embed + index, relate, refresh profile.
async fn enrich(
    memories: Arc<dyn MemoryRepository>,
    embedder: Arc<dyn Embedder>,
    vector_index: Arc<dyn VectorIndex>,
    generator: Option<Arc<dyn Generator>>,
    memory_id: Uuid,
    user_id: Uuid,
    content: String,
) -> Result<()> {
    let vector = embedder.embed(&content).await?;
    vector_index.upsert(memory_id, user_id, &vector).await?;

    // Relation building: nearest neighbors in the user's own corpus.
    let allow_ids = memories.list_ids_for_user(user_id).await?;
    let hits = vector_index
        .search(&vector, &allow_ids, RELATED_LIMIT + 1)
        .await?;
    let related: Vec<Uuid> = hits
        .into_iter()
        .map(|h| h.memory_id)
        .filter(|id| *id != memory_id)
        .take(RELATED_LIMIT)
        .collect();
    if !related.is_empty() {
        memories.set_related(memory_id, &related).await?;
    }

    // Profile refresh: cheap rollup of recent topics, skipped without a
    // generator.
    if let Some(generator) = generator {
        let recent_ids: Vec<Uuid> = memories
            .list_ids_for_user(user_id)
            .await?
            .into_iter()
            .rev()
            .take(PROFILE_SAMPLE)
            .collect();
        let recent = memories.fetch_many(&recent_ids).await?;
        let topics: Vec<String> = recent
            .iter()
            .flat_map(|m| m.metadata.topics.iter().cloned())
            .chain(recent.iter().filter_map(|m| m.title.clone()))
            .take(40)
            .collect();

        if !topics.is_empty() {
            let prompt = format!(
                "Summarize this user's interests in 2-3 sentences based on \
                 what they recently saved: {}",
                topics.join(", ")
            );
            match generator.generate(&prompt).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    memories.store_profile(user_id, summary.trim()).await?;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Profile refresh failed"),
            }
        }
    }

    Ok(())
}
