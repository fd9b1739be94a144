//! End-to-end search pipeline.
//!
//! classify → analyze → plan → embed → vector retrieve → hybrid score →
//! threshold filter → policy re-rank → evidence build → synthesize →
//! record query event → cache. Search is read-mostly and stateless per
//! request; every dependency is injected.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use engram_core::{
    cache_get_json, cache_set_json, defaults, Citation, Embedder, Error, Generator, KeyValueCache,
    Memory, MemoryRepository, QueryClassification, QueryEventStore, Result, RetrievalPolicy,
    SearchResultItem, SearchStrategy, VectorIndex,
};
use engram_inference::deterministic_embedding;

use crate::analyzer::analyze_query;
use crate::classifier::QueryClassifier;
use crate::planner::{plan_search, PlannerConfig};
use crate::policy::policy_rank;
use crate::scorer::{filter_and_rank, score_candidates, CandidateDoc};
use crate::synthesis::{build_evidence, synthesize};
use crate::vector_client::narrow_broad_results;

/// Default result count when the caller doesn't specify one.
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// A search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub user_id: Uuid,
    pub query: String,
    pub limit: Option<usize>,
    /// Retrieval policy name; defaults to the classifier's suggestion.
    pub policy: Option<String>,
    /// Return ranked results only, skipping answer synthesis.
    pub context_only: bool,
}

impl SearchRequest {
    pub fn new(user_id: Uuid, query: impl Into<String>) -> Self {
        Self {
            user_id,
            query: query.into(),
            limit: None,
            policy: None,
            context_only: false,
        }
    }
}

/// A complete search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
    pub answer: Option<String>,
    pub citations: Vec<Citation>,
    pub policy: String,
    pub strategy: SearchStrategy,
}

/// Cache key for a search response: hash of user, normalized query, and
/// result limit.
pub fn search_cache_key(user_id: Uuid, query: &str, limit: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(query.trim().to_lowercase().as_bytes());
    hasher.update(limit.to_le_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("engram:search:{}", &hash[..16])
}

/// The injected-dependency bundle driving a search.
pub struct SearchPipeline {
    memories: Arc<dyn MemoryRepository>,
    query_events: Arc<dyn QueryEventStore>,
    vector_index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    generator: Option<Arc<dyn Generator>>,
    cache: Arc<dyn KeyValueCache>,
    classifier: QueryClassifier,
    planner_config: PlannerConfig,
    cache_ttl: Duration,
}

impl SearchPipeline {
    pub fn new(
        memories: Arc<dyn MemoryRepository>,
        query_events: Arc<dyn QueryEventStore>,
        vector_index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        cache: Arc<dyn KeyValueCache>,
    ) -> Self {
        let classifier = QueryClassifier::new(cache.clone(), generator.clone());
        Self {
            memories,
            query_events,
            vector_index,
            embedder,
            generator,
            cache,
            classifier,
            planner_config: PlannerConfig::default(),
            cache_ttl: Duration::from_secs(defaults::SEARCH_CACHE_TTL_SECS),
        }
    }

    /// Override planner tunables.
    pub fn with_planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }

    /// Override the response cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Embed the query, degrading to the deterministic fallback on
    /// failure — search never blocks on the embedding backend.
    async fn query_embedding(&self, query: &str) -> Vec<f32> {
        match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "Query embedding failed, using deterministic fallback");
                deterministic_embedding(query, self.embedder.dimension())
            }
        }
    }

    /// Resolve the policy: explicit request beats classifier suggestion.
    fn resolve_policy(
        request: &SearchRequest,
        classification: &QueryClassification,
    ) -> RetrievalPolicy {
        let name = request
            .policy
            .as_deref()
            .unwrap_or(&classification.suggested_policy);
        RetrievalPolicy::by_name(name)
    }

    async fn result_item(&self, memory: &Memory, score: f32) -> SearchResultItem {
        let related_memories = self
            .memories
            .related_ids(memory.id)
            .await
            .unwrap_or_default();
        SearchResultItem {
            memory_id: memory.id,
            title: memory.title.clone(),
            summary: memory.summary.clone(),
            url: memory.url.clone(),
            timestamp: memory.created_at,
            related_memories,
            score,
            memory_type: memory.memory_type.clone(),
            importance_score: memory.importance_score,
            source: memory.source.clone(),
        }
    }

    /// Execute a search request.
    #[instrument(skip(self, request), fields(subsystem = "search", component = "pipeline", op = "search", user_id = %request.user_id))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let limit = request.limit.unwrap_or(DEFAULT_RESULT_LIMIT).max(1);

        let cache_key = search_cache_key(request.user_id, &request.query, limit);
        if let Some(cached) =
            cache_get_json::<SearchResponse>(self.cache.as_ref(), &cache_key).await
        {
            debug!("Search cache hit");
            return Ok(cached);
        }

        let classification = self.classifier.classify(&request.query).await;
        let policy = Self::resolve_policy(request, &classification);

        let corpus_size = self.memories.corpus_size(request.user_id).await? as usize;
        let analysis = analyze_query(&request.query);
        let plan = plan_search(&analysis, corpus_size, limit, &self.planner_config);

        let allow_ids = self.memories.list_ids_for_user(request.user_id).await?;

        let mut response = SearchResponse {
            query: request.query.clone(),
            results: Vec::new(),
            answer: None,
            citations: Vec::new(),
            policy: policy.name.clone(),
            strategy: plan.strategy,
        };

        if allow_ids.is_empty() {
            // Empty corpus: nothing to retrieve, but the query event is
            // still recorded for relevance feedback.
            self.query_events
                .record(request.user_id, &request.query, &[])
                .await?;
            cache_set_json(self.cache.as_ref(), &cache_key, &response, self.cache_ttl).await;
            return Ok(response);
        }

        let embedding = self.query_embedding(&request.query).await;

        let mut hits = self
            .vector_index
            .search(&embedding, &allow_ids, plan.retrieval_limit)
            .await?;
        if plan.strategy == SearchStrategy::Broad {
            hits = narrow_broad_results(hits, limit);
        }

        let hit_ids: Vec<Uuid> = hits.iter().map(|h| h.memory_id).collect();
        let memories = self.memories.fetch_many(&hit_ids).await?;

        let docs: Vec<CandidateDoc> = memories
            .iter()
            .map(|m| {
                let semantic = hits
                    .iter()
                    .find(|h| h.memory_id == m.id)
                    .map(|h| h.score)
                    .unwrap_or(0.0);
                CandidateDoc::from_memory(m, semantic)
            })
            .collect();

        let scored = score_candidates(&analysis.content_tokens, &docs);
        let survivors = filter_and_rank(scored, &plan.thresholds, plan.estimated_age, limit);

        debug!(
            strategy = ?plan.strategy,
            retrieval_limit = plan.retrieval_limit,
            candidates = docs.len(),
            survivors = survivors.len(),
            "Hybrid scoring complete"
        );

        let ranked = policy_rank(survivors, &policy, Utc::now());

        let mut selected: Vec<(Memory, f32)> = Vec::with_capacity(ranked.len());
        for entry in ranked.iter().take(limit) {
            if let Some(memory) = memories
                .iter()
                .find(|m| m.id == entry.candidate.memory_id)
            {
                selected.push((memory.clone(), entry.policy_score));
            }
        }

        for (memory, score) in &selected {
            response.results.push(self.result_item(memory, *score).await);
        }

        let returned: Vec<Uuid> = response.results.iter().map(|r| r.memory_id).collect();
        self.query_events
            .record(request.user_id, &request.query, &returned)
            .await?;

        if !response.results.is_empty() && !request.context_only {
            let generator = self.generator.as_ref().ok_or_else(|| {
                Error::CapabilityUnavailable(
                    "answer synthesis requires a generation backend".to_string(),
                )
            })?;

            let profile = self
                .memories
                .fetch_profile(request.user_id)
                .await
                .unwrap_or(None);

            let evidence_memories: Vec<Memory> =
                selected.iter().map(|(m, _)| m.clone()).collect();
            let evidence = build_evidence(&evidence_memories);
            let (answer, citations) = synthesize(
                generator.as_ref(),
                &request.query,
                &evidence,
                profile.as_deref(),
            )
            .await;
            response.answer = Some(answer);
            response.citations = citations;
        }

        cache_set_json(self.cache.as_ref(), &cache_key, &response, self.cache_ttl).await;

        info!(
            result_count = response.results.len(),
            strategy = ?plan.strategy,
            policy = %response.policy,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use engram_core::{
        CreateMemoryRequest, ExtractedMetadata, InMemoryCache, MemoryUpsert, NewCapture,
        VectorHit,
    };
    use engram_inference::MockInference;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ── In-memory fakes ────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeMemories {
        memories: Mutex<HashMap<Uuid, Memory>>,
        profiles: Mutex<HashMap<Uuid, String>>,
    }

    impl FakeMemories {
        fn add(&self, memory: Memory) {
            self.memories.lock().unwrap().insert(memory.id, memory);
        }
    }

    #[async_trait]
    impl MemoryRepository for FakeMemories {
        async fn insert(&self, req: CreateMemoryRequest) -> Result<MemoryUpsert> {
            let memory = test_memory(req.user_id, &req.content, req.title.as_deref());
            let id = memory.id;
            self.add(memory);
            Ok(MemoryUpsert::Created(id))
        }

        async fn fetch(&self, id: Uuid) -> Result<Memory> {
            self.memories
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .ok_or(Error::MemoryNotFound(id))
        }

        async fn fetch_many(&self, ids: &[Uuid]) -> Result<Vec<Memory>> {
            let memories = self.memories.lock().unwrap();
            Ok(ids.iter().filter_map(|id| memories.get(id).cloned()).collect())
        }

        async fn find_by_hash(&self, _user_id: Uuid, hash: &str) -> Result<Option<Memory>> {
            Ok(self
                .memories
                .lock()
                .unwrap()
                .values()
                .find(|m| m.canonical_hash == hash)
                .cloned())
        }

        async fn merge_capture(&self, _memory_id: Uuid, _capture: &NewCapture) -> Result<()> {
            Ok(())
        }

        async fn update_metadata(
            &self,
            _id: Uuid,
            _metadata: &ExtractedMetadata,
            _summary: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }

        async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
            Ok(self
                .memories
                .lock()
                .unwrap()
                .values()
                .filter(|m| m.user_id == user_id)
                .map(|m| m.id)
                .collect())
        }

        async fn corpus_size(&self, user_id: Uuid) -> Result<i64> {
            Ok(self.list_ids_for_user(user_id).await?.len() as i64)
        }

        async fn related_ids(&self, _memory_id: Uuid) -> Result<Vec<Uuid>> {
            Ok(Vec::new())
        }

        async fn set_related(&self, _memory_id: Uuid, _related: &[Uuid]) -> Result<()> {
            Ok(())
        }

        async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<String>> {
            Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
        }

        async fn store_profile(&self, user_id: Uuid, summary: &str) -> Result<()> {
            self.profiles
                .lock()
                .unwrap()
                .insert(user_id, summary.to_string());
            Ok(())
        }
    }

    /// Cosine-similarity index over deterministic embeddings.
    #[derive(Default)]
    struct FakeVectorIndex {
        vectors: Mutex<HashMap<Uuid, Vec<f32>>>,
    }

    impl FakeVectorIndex {
        fn cosine(a: &[f32], b: &[f32]) -> f32 {
            a.iter().zip(b).map(|(x, y)| x * y).sum()
        }
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn upsert(&self, memory_id: Uuid, _user_id: Uuid, vector: &[f32]) -> Result<()> {
            self.vectors
                .lock()
                .unwrap()
                .insert(memory_id, vector.to_vec());
            Ok(())
        }

        async fn search(
            &self,
            vector: &[f32],
            allow_ids: &[Uuid],
            limit: usize,
        ) -> Result<Vec<VectorHit>> {
            let vectors = self.vectors.lock().unwrap();
            let mut hits: Vec<VectorHit> = allow_ids
                .iter()
                .filter_map(|id| {
                    vectors.get(id).map(|v| VectorHit {
                        memory_id: *id,
                        score: Self::cosine(vector, v),
                    })
                })
                .collect();
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
            hits.truncate(limit);
            Ok(hits)
        }

        async fn remove(&self, memory_id: Uuid) -> Result<()> {
            self.vectors.lock().unwrap().remove(&memory_id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeEvents {
        records: Mutex<Vec<(Uuid, String, Vec<Uuid>)>>,
    }

    #[async_trait]
    impl QueryEventStore for FakeEvents {
        async fn record(&self, user_id: Uuid, query: &str, returned: &[Uuid]) -> Result<()> {
            self.records
                .lock()
                .unwrap()
                .push((user_id, query.to_string(), returned.to_vec()));
            Ok(())
        }
    }

    fn test_memory(user_id: Uuid, content: &str, title: Option<&str>) -> Memory {
        Memory {
            id: Uuid::new_v4(),
            user_id,
            content: content.to_string(),
            canonical_hash: format!("hash-{}", Uuid::new_v4()),
            url: None,
            title: title.map(String::from),
            summary: Some(content.chars().take(80).collect()),
            memory_type: "page".to_string(),
            source: "browser".to_string(),
            metadata: ExtractedMetadata::default(),
            importance_score: 0.5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct Harness {
        memories: Arc<FakeMemories>,
        events: Arc<FakeEvents>,
        index: Arc<FakeVectorIndex>,
        mock: MockInference,
        pipeline: SearchPipeline,
        user_id: Uuid,
    }

    fn harness(generator: Option<MockInference>) -> Harness {
        let memories = Arc::new(FakeMemories::default());
        let events = Arc::new(FakeEvents::default());
        let index = Arc::new(FakeVectorIndex::default());
        let mock = generator.clone().unwrap_or_default();
        let pipeline = SearchPipeline::new(
            memories.clone(),
            events.clone(),
            index.clone(),
            Arc::new(mock.clone()),
            generator.map(|g| Arc::new(g) as Arc<dyn Generator>),
            Arc::new(InMemoryCache::new()),
        );
        Harness {
            memories,
            events,
            index,
            mock,
            pipeline,
            user_id: Uuid::new_v4(),
        }
    }

    async fn seed(h: &Harness, content: &str, title: &str) -> Uuid {
        let memory = test_memory(h.user_id, content, Some(title));
        let id = memory.id;
        let vector = deterministic_embedding(content, 384);
        h.index.upsert(id, h.user_id, &vector).await.unwrap();
        h.memories.add(memory);
        id
    }

    #[tokio::test]
    async fn test_search_returns_ranked_results_with_answer() {
        let generator = MockInference::new()
            .with_fixed_response("Your notes cover the rust borrow checker [1].");
        let h = harness(Some(generator));

        let relevant = seed(
            &h,
            "rust borrow checker rules for mutable references",
            "Borrow checker notes",
        )
        .await;
        seed(&h, "sourdough starter hydration schedule", "Baking").await;

        let response = h
            .pipeline
            .search(&SearchRequest::new(
                h.user_id,
                "rust borrow checker mutable references",
            ))
            .await
            .unwrap();

        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].memory_id, relevant);
        let answer = response.answer.as_deref().unwrap();
        assert!(answer.contains("[1]"));
        assert_eq!(response.citations.len(), 1);
        assert_eq!(response.citations[0].memory_id, relevant);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_embedding_and_generation() {
        let generator = MockInference::new().with_fixed_response("Answer [1].");
        let h = harness(Some(generator));
        seed(&h, "rust async channels and backpressure", "Tokio notes").await;

        let request = SearchRequest::new(h.user_id, "rust async channels");
        let first = h.pipeline.search(&request).await.unwrap();
        let embeds = h.mock.embed_call_count();
        let generates = h.mock.generate_call_count();
        assert!(embeds >= 1);

        let second = h.pipeline.search(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(h.mock.embed_call_count(), embeds);
        assert_eq!(h.mock.generate_call_count(), generates);
    }

    #[tokio::test]
    async fn test_zero_survivors_yields_empty_results_but_records_event() {
        let generator = MockInference::new();
        let h = harness(Some(generator));
        seed(&h, "sourdough starter hydration schedule", "Baking").await;

        let response = h
            .pipeline
            .search(&SearchRequest::new(
                h.user_id,
                "kubernetes ingress controller timeout",
            ))
            .await
            .unwrap();

        assert!(response.results.is_empty());
        assert!(response.answer.is_none());
        let events = h.events.records.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].2.is_empty());
    }

    #[tokio::test]
    async fn test_empty_corpus_short_circuits() {
        let h = harness(Some(MockInference::new()));
        let response = h
            .pipeline
            .search(&SearchRequest::new(h.user_id, "anything at all"))
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert!(response.answer.is_none());
        assert_eq!(h.events.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_context_only_skips_synthesis() {
        let generator = MockInference::new();
        let h = harness(Some(generator));
        seed(&h, "rust async channels and backpressure", "Tokio notes").await;

        // "find …" hits the search rule family, so classification never
        // consults the generator either — zero generate calls total.
        let mut request = SearchRequest::new(h.user_id, "find rust async channels");
        request.context_only = true;
        let response = h.pipeline.search(&request).await.unwrap();

        assert!(!response.results.is_empty());
        assert!(response.answer.is_none());
        assert_eq!(h.mock.generate_call_count(), 0);
    }

    #[tokio::test]
    async fn test_no_generator_with_results_is_capability_unavailable() {
        let h = harness(None);
        seed(&h, "rust async channels and backpressure", "Tokio notes").await;

        let err = h
            .pipeline
            .search(&SearchRequest::new(h.user_id, "rust async channels"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CapabilityUnavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_fallback() {
        let failing_embedder = MockInference::new().with_failing_embedding(true);
        let generator = MockInference::new().with_fixed_response("Found it [1].");

        let memories = Arc::new(FakeMemories::default());
        let events = Arc::new(FakeEvents::default());
        let index = Arc::new(FakeVectorIndex::default());
        let pipeline = SearchPipeline::new(
            memories.clone(),
            events.clone(),
            index.clone(),
            Arc::new(failing_embedder),
            Some(Arc::new(generator)),
            Arc::new(InMemoryCache::new()),
        );

        let user_id = Uuid::new_v4();
        let memory = test_memory(user_id, "rust borrow checker rules", Some("Notes"));
        // Index under the same deterministic fallback the pipeline will
        // use, so the degraded query still matches.
        index
            .upsert(
                memory.id,
                user_id,
                &deterministic_embedding("rust borrow checker rules", 384),
            )
            .await
            .unwrap();
        memories.add(memory);

        let response = pipeline
            .search(&SearchRequest::new(user_id, "rust borrow checker rules"))
            .await
            .unwrap();
        assert!(!response.results.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_policy_overrides_suggestion() {
        let generator = MockInference::new().with_fixed_response("A [1].");
        let h = harness(Some(generator));
        seed(&h, "rust async channels and backpressure", "Tokio notes").await;

        let mut request = SearchRequest::new(h.user_id, "rust async channels");
        request.policy = Some("planning".to_string());
        let response = h.pipeline.search(&request).await.unwrap();
        assert_eq!(response.policy, "planning");
    }

    #[tokio::test]
    async fn test_results_never_exceed_requested_limit() {
        let generator = MockInference::new().with_fixed_response("A [1].");
        let h = harness(Some(generator));
        for i in 0..8 {
            seed(
                &h,
                &format!("rust async channels pattern number {i}"),
                &format!("Note {i}"),
            )
            .await;
        }

        let mut request = SearchRequest::new(h.user_id, "rust async channels pattern");
        request.limit = Some(3);
        let response = h.pipeline.search(&request).await.unwrap();
        assert!(response.results.len() <= 3);
    }
}
