use crate::cache::Cache;
use crate::documents::DocumentChunk;
use crate::error::EngineError;
use crate::llm::Generator;
use std::sync::Arc;
use tracing::{error, info};

const GROUNDING_SYSTEM_PROMPT: &str = "You are a retrieval-augmented assistant. \
Use ONLY the passages provided in the CONTEXTS section to answer the user's QUESTION. \
You may expand, explain, and infer, but every factual claim must be supported by the \
contexts. If the answer requires information that is not present in the contexts, do \
not invent it; answer exactly \"This is beyond my knowledge\". Use markdown format.";

#[derive(Debug)]
pub struct Answer {
    pub answer: String,
    pub context: Vec<DocumentChunk>,
}

/// Two-phase question answering: retrieve grounding passages through the
/// cache-augmented vector path, then generate an answer from them.
pub struct KnowledgeBase {
    cache: Cache,
    generator: Arc<dyn Generator>,
    top_k: usize,
}

impl KnowledgeBase {
    pub fn new(cache: Cache, generator: Arc<dyn Generator>, top_k: usize) -> Self {
        Self {
            cache,
            generator,
            top_k,
        }
    }

    /// `scope` partitions the query cache, e.g. per guild, so identical
    /// questions against different knowledge bases stay separate.
    pub async fn answer(&self, question: &str, scope: Option<&str>) -> Result<Answer, EngineError> {
        // Retrieve. A repeated question within the TTL costs no embedding
        // and no store search.
        let context = self
            .cache
            .similarity_search(question, self.top_k, scope)
            .await?;
        info!("retrieved {} grounding chunks", context.len());

        // Generate.
        let contexts = context
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");
        let prompt = format!("QUESTION:\n{}\nCONTEXTS:\n{}", question, contexts);

        match self.generator.generate(GROUNDING_SYSTEM_PROMPT, &prompt).await {
            Ok(answer) => Ok(Answer { answer, context }),
            Err(e) => {
                // Provider internals stay in the log; callers get a generic
                // failure.
                error!("answer generation failed: {}", e);
                Err(EngineError::Upstream("answer generation failed".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, MemoryCache, SetOptions};
    use crate::documents::DocumentStore;
    use crate::llm::Embedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0])
        }
    }

    struct FixedStore {
        searches: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FixedStore {
        async fn upsert_chunks(&self, _chunks: Vec<DocumentChunk>) -> Result<(), EngineError> {
            Ok(())
        }
        async fn delete_by_parent(&self, _parent_id: &str) -> Result<usize, EngineError> {
            Ok(0)
        }
        async fn search(
            &self,
            _embedding: &[f32],
            k: usize,
        ) -> Result<Vec<DocumentChunk>, EngineError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            let chunk = |id: &str, content: &str| DocumentChunk {
                id: id.into(),
                parent_id: "m1".into(),
                channel_id: "c1".into(),
                content: content.into(),
                embedding: Vec::new(),
                is_attachment: false,
                attachment_id: None,
                attachment_name: None,
            };
            Ok(vec![
                chunk("m1_chunk_0", "the sky is blue"),
                chunk("m1_chunk_1", "the grass is green"),
            ]
            .into_iter()
            .take(k)
            .collect())
        }
        async fn chunks_for_parent(
            &self,
            _parent_id: &str,
        ) -> Result<Vec<DocumentChunk>, EngineError> {
            Ok(Vec::new())
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&self, _system: &str, prompt: &str) -> Result<String, EngineError> {
            Ok(format!("echo: {}", prompt))
        }
    }

    struct BrokenGenerator;

    #[async_trait]
    impl Generator for BrokenGenerator {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, EngineError> {
            Err(EngineError::Upstream(
                "HTTP 500 from provider, request id abc123".into(),
            ))
        }
    }

    fn knowledge_base(
        generator: Arc<dyn Generator>,
    ) -> (KnowledgeBase, Arc<CountingEmbedder>, Arc<FixedStore>) {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(FixedStore {
            searches: AtomicUsize::new(0),
        });
        let cache = Cache::new(
            Arc::new(MemoryCache::new(16)),
            embedder.clone(),
            store.clone(),
            300,
        );
        (KnowledgeBase::new(cache, generator, 4), embedder, store)
    }

    #[tokio::test]
    async fn test_answer_includes_retrieved_context() {
        let (kb, _, _) = knowledge_base(Arc::new(EchoGenerator));

        let result = kb.answer("What color is the sky?", None).await.unwrap();
        assert_eq!(result.context.len(), 2);
        assert!(result.answer.contains("What color is the sky?"));
        assert!(result.answer.contains("the sky is blue"));
        assert!(result.answer.contains("the grass is green"));
    }

    #[tokio::test]
    async fn test_repeated_question_hits_cache() {
        let (kb, embedder, store) = knowledge_base(Arc::new(EchoGenerator));

        let first = kb.answer("What is X?", None).await.unwrap();
        let second = kb.answer("What is X?", None).await.unwrap();

        assert_eq!(first.context, second.context);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_is_generic() {
        let (kb, _, _) = knowledge_base(Arc::new(BrokenGenerator));

        let err = kb.answer("What is X?", None).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("answer generation failed"));
        // Provider internals must not leak upward.
        assert!(!message.contains("abc123"));
        assert!(!message.contains("500"));
    }

    #[tokio::test]
    async fn test_scoped_questions_do_not_share_cache() {
        let (kb, embedder, store) = knowledge_base(Arc::new(EchoGenerator));

        kb.answer("What is X?", Some("guild-1")).await.unwrap();
        kb.answer("What is X?", Some("guild-2")).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.searches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cached_entry_expires() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(FixedStore {
            searches: AtomicUsize::new(0),
        });
        let backend = Arc::new(MemoryCache::new(16));

        // Pre-expire the cached entry by writing it with a short TTL.
        let cache = Cache::new(backend.clone(), embedder.clone(), store.clone(), 300);
        let key = Cache::query_key("What is X?", None);
        backend
            .set(&key, "[]", SetOptions { px: Some(20), ..SetOptions::default() })
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let kb = KnowledgeBase::new(cache, Arc::new(EchoGenerator), 4);
        kb.answer("What is X?", None).await.unwrap();
        assert_eq!(store.searches.load(Ordering::SeqCst), 1);
    }
}
