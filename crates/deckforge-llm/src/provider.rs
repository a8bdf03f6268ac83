//! Provider: retry, caching, and schema decoding around one backend.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use deckforge_cache::{fingerprint, CacheStore};
use deckforge_utils::error::ProviderError;
use deckforge_utils::types::{CombinedArtifact, GenerationRequest, Message, ProviderResult};

use crate::retry::RetryPolicy;
use crate::types::ChatBackend;

/// One configured generation capability over a specific backend.
///
/// Owns its retry policy and sampling defaults; shares the cache store with
/// every other provider in the process. All failure paths surface as values
/// (`ProviderResult` / `None`), so a single call's exhaustion can never
/// abort sibling work.
#[derive(Debug)]
pub struct Provider {
    id: String,
    backend: Arc<dyn ChatBackend>,
    retry: RetryPolicy,
    cache: Option<Arc<CacheStore>>,
    bypass_lookup: bool,
    parse_attempts: u32,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    top_p: Option<f64>,
}

impl Provider {
    pub fn new(
        id: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        model: impl Into<String>,
        retry: RetryPolicy,
        parse_attempts: u32,
    ) -> Self {
        Self {
            id: id.into(),
            backend,
            retry,
            cache: None,
            bypass_lookup: false,
            parse_attempts: parse_attempts.max(1),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            top_p: None,
        }
    }

    /// Attach the shared cache. A disabled cache is expressed by never
    /// calling this, which suppresses reads and writes regardless of the
    /// bypass flag.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheStore>, bypass_lookup: bool) -> Self {
        self.cache = Some(cache);
        self.bypass_lookup = bypass_lookup;
        self
    }

    #[must_use]
    pub fn with_sampling(
        mut self,
        temperature: Option<f64>,
        max_tokens: Option<u32>,
        top_p: Option<f64>,
    ) -> Self {
        if let Some(temperature) = temperature {
            self.temperature = temperature;
        }
        self.max_tokens = max_tokens;
        self.top_p = top_p;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.id
    }

    /// Generate raw text for a topic. Never returns an error: exhausted
    /// retries degrade to a failed, empty result the orchestrator counts.
    pub async fn generate(&self, topic: &str, schema: &str, template: &str) -> ProviderResult {
        let prompt = render_template(template, topic, schema, None);
        let request = self.build_request(&prompt, schema);

        match self.call_transport(&request, &prompt, false).await {
            Ok(text) => ProviderResult::success(text),
            Err(e) => {
                warn!(provider = %self.id, topic, error = %e, "Generate call failed");
                ProviderResult::failure(e.kind())
            }
        }
    }

    /// Fold labeled generator outputs into a schema-conformant artifact.
    ///
    /// Up to `parse_attempts` rounds: each issues a fresh transport call
    /// (retried per policy) and then attempts the schema decode. Attempts
    /// after the first skip the cache lookup, otherwise a cached
    /// unparseable response would be returned verbatim forever. Returns
    /// `None` only after all attempts are spent.
    pub async fn combine(
        &self,
        topic: &str,
        combined_inputs: &str,
        schema: &str,
        template: &str,
    ) -> Option<CombinedArtifact> {
        let prompt = render_template(template, topic, schema, Some(combined_inputs));
        let request = self.build_request(&prompt, schema);

        for attempt in 0..self.parse_attempts {
            match self.call_transport(&request, &prompt, attempt > 0).await {
                Ok(text) => {
                    let cleaned = strip_code_fences(&text);
                    match serde_json::from_str::<CombinedArtifact>(cleaned) {
                        Ok(artifact) => {
                            debug!(provider = %self.id, topic, attempt = attempt + 1, "Combine succeeded");
                            return Some(artifact);
                        }
                        Err(e) => {
                            warn!(
                                provider = %self.id,
                                topic,
                                attempt = attempt + 1,
                                of = self.parse_attempts,
                                error = %e,
                                "Combine output failed schema decode"
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        provider = %self.id,
                        topic,
                        attempt = attempt + 1,
                        of = self.parse_attempts,
                        error = %e,
                        "Combine transport call failed"
                    );
                }
            }
        }
        None
    }

    fn build_request(&self, prompt: &str, schema: &str) -> GenerationRequest {
        let mut request = GenerationRequest::new(
            &self.id,
            &self.model,
            vec![Message::user(prompt)],
            self.temperature,
        );
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(top_p) = self.top_p {
            request = request.with_top_p(top_p);
        }
        // Schemas usually are JSON; pass non-JSON schema text through the
        // prompt only.
        if let Ok(value) = serde_json::from_str::<Value>(schema) {
            request = request.with_json_schema(value);
        }
        request
    }

    /// One retried transport call with cache policy applied around it.
    /// Failed calls are never written to the cache.
    async fn call_transport(
        &self,
        request: &GenerationRequest,
        prompt_preview: &str,
        skip_lookup: bool,
    ) -> Result<String, ProviderError> {
        let fp = match &self.cache {
            Some(_) => match fingerprint(request) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    warn!(provider = %self.id, error = %e, "Fingerprinting failed; call is uncached");
                    None
                }
            },
            None => None,
        };

        if let (Some(cache), Some(fp)) = (&self.cache, &fp) {
            if !self.bypass_lookup && !skip_lookup {
                if let Some(hit) = cache.get(fp) {
                    debug!(provider = %self.id, "Serving response from cache");
                    return Ok(hit);
                }
            }
        }

        let backend = Arc::clone(&self.backend);
        let request_owned = request.clone();
        let text = self
            .retry
            .run(&self.id, move || {
                let backend = Arc::clone(&backend);
                let request = request_owned.clone();
                async move { backend.invoke(&request).await }
            })
            .await?;

        if let (Some(cache), Some(fp)) = (&self.cache, &fp) {
            cache.put(fp, &self.id, &self.model, prompt_preview, &text);
        }
        Ok(text)
    }
}

/// Substitute `{question}`, `{schema}`, and optionally `{inputs}`.
#[must_use]
pub fn render_template(
    template: &str,
    question: &str,
    schema: &str,
    inputs: Option<&str>,
) -> String {
    let mut text = template
        .replace("{question}", question)
        .replace("{schema}", schema);
    if let Some(inputs) = inputs {
        text = text.replace("{inputs}", inputs);
    }
    text
}

/// Models love wrapping JSON in markdown fences; strip one outer fence.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// One scripted transport outcome.
    #[derive(Debug)]
    enum Scripted {
        Text(&'static str),
        RateLimited,
        Auth,
    }

    /// Scripted transport: serves outcomes in order, repeating the last
    /// forever, and counts invocations.
    #[derive(Debug)]
    struct MockBackend {
        script: Vec<Scripted>,
        calls: AtomicU32,
    }

    impl MockBackend {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            assert!(!script.is_empty());
            Arc::new(Self {
                script,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn invoke(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match &self.script[n.min(self.script.len() - 1)] {
                Scripted::Text(text) => Ok((*text).to_string()),
                Scripted::RateLimited => Err(ProviderError::RateLimited {
                    provider: "mock".into(),
                    retry_after_secs: None,
                }),
                Scripted::Auth => Err(ProviderError::Auth {
                    provider: "mock".into(),
                    reason: "denied".into(),
                }),
            }
        }
    }

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1), Duration::from_millis(2))
    }

    fn provider(backend: Arc<MockBackend>) -> Provider {
        Provider::new("mock", backend, "mock-model", fast_retry(3), 3)
    }

    const SCHEMA: &str = r#"{"type": "object"}"#;
    const TEMPLATE: &str = "Q: {question}\nS: {schema}";
    const COMBINE_TEMPLATE: &str = "Q: {question}\nS: {schema}\nI: {inputs}";

    #[tokio::test]
    async fn cache_short_circuits_identical_requests() {
        let backend = MockBackend::new(vec![Scripted::Text("answer")]);
        let cache = Arc::new(CacheStore::in_memory());
        let p = provider(Arc::clone(&backend)).with_cache(Arc::clone(&cache), false);

        let first = p.generate("topic", SCHEMA, TEMPLATE).await;
        let second = p.generate("topic", SCHEMA, TEMPLATE).await;

        assert_eq!(first.raw_text, "answer");
        assert_eq!(second.raw_text, "answer");
        assert_eq!(backend.calls(), 1);
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[tokio::test]
    async fn bypass_lookup_still_writes() {
        let backend = MockBackend::new(vec![Scripted::Text("answer")]);
        let cache = Arc::new(CacheStore::in_memory());
        let p = provider(Arc::clone(&backend)).with_cache(Arc::clone(&cache), true);

        p.generate("topic", SCHEMA, TEMPLATE).await;
        p.generate("topic", SCHEMA, TEMPLATE).await;

        // Lookup skipped both times, so two transport calls, but the write
        // happened and a later normal lookup can observe it.
        assert_eq!(backend.calls(), 2);
        assert_eq!(cache.stats().total_entries, 1);

        let normal = provider(Arc::clone(&backend)).with_cache(Arc::clone(&cache), false);
        normal.generate("topic", SCHEMA, TEMPLATE).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_neither_reads_nor_writes() {
        let backend = MockBackend::new(vec![Scripted::Text("answer")]);
        let p = provider(Arc::clone(&backend));

        p.generate("topic", SCHEMA, TEMPLATE).await;
        p.generate("topic", SCHEMA, TEMPLATE).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn failed_calls_are_never_cached() {
        let backend = MockBackend::new(vec![Scripted::Auth]);
        let cache = Arc::new(CacheStore::in_memory());
        let p = provider(Arc::clone(&backend)).with_cache(Arc::clone(&cache), false);

        let result = p.generate("topic", SCHEMA, TEMPLATE).await;
        assert!(!result.success);
        assert_eq!(result.error_kind.as_deref(), Some("auth"));
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[tokio::test]
    async fn generate_exhaustion_degrades_to_empty_failure() {
        let backend = MockBackend::new(vec![Scripted::RateLimited]);
        let p = Provider::new("mock", Arc::clone(&backend) as Arc<dyn ChatBackend>, "m", fast_retry(2), 3);

        let result = p.generate("topic", SCHEMA, TEMPLATE).await;
        assert!(result.is_empty());
        assert_eq!(result.error_kind.as_deref(), Some("rate_limited"));
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn combine_retries_parse_failures_with_fresh_transport_calls() {
        let backend = MockBackend::new(vec![
            Scripted::Text("not json"),
            Scripted::Text("not json"),
            Scripted::Text(r#"{"cards": []}"#),
        ]);
        let cache = Arc::new(CacheStore::in_memory());
        let p = provider(Arc::clone(&backend)).with_cache(cache, false);

        let artifact = p
            .combine("topic", "=== a ===\ntext", SCHEMA, COMBINE_TEMPLATE)
            .await
            .expect("third attempt parses");
        assert!(artifact.cards.is_empty());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn combine_exhaustion_returns_none() {
        let backend = MockBackend::new(vec![Scripted::Text("still not json")]);
        let p = provider(Arc::clone(&backend));

        let artifact = p
            .combine("topic", "inputs", SCHEMA, COMBINE_TEMPLATE)
            .await;
        assert!(artifact.is_none());
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn combine_strips_markdown_fences() {
        let backend = MockBackend::new(vec![Scripted::Text(
            "```json\n{\"title\":\"T\",\"cards\":[]}\n```",
        )]);
        let p = provider(backend);

        let artifact = p
            .combine("topic", "inputs", SCHEMA, COMBINE_TEMPLATE)
            .await
            .unwrap();
        assert_eq!(artifact.title, "T");
    }

    #[test]
    fn render_template_substitutes_placeholders() {
        let text = render_template("Q={question} S={schema} I={inputs}", "q", "s", Some("i"));
        assert_eq!(text, "Q=q S=s I=i");
    }

    #[test]
    fn strip_code_fences_variants() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {} \n"), "{}");
    }
}
