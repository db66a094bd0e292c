use crate::ai::client::GenerativeModel;
use crate::ai::service::PromptService;
use crate::core::classifier::{ClassifiedError, ErrorKind};
use crate::core::history::{HistoryItem, HistoryStore};
use crate::core::model::{BenchmarkReport, Language, PerformanceMetrics, PromptAnalysis};
use crate::core::placeholders::VariableMap;
use crate::error::OrionError;
use crate::storage::KeyValueStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[allow(async_fn_in_trait)]
pub trait CredentialProvider {
    fn has_key(&self) -> bool;
    /// Lets the user pick a key. Success is assumed once this resolves.
    async fn open_key_picker(&self) -> Result<(), OrionError>;
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, OrionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(flag))
            .map_err(|_| OrionError::Busy)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Session<M: GenerativeModel, S: KeyValueStore, C: CredentialProvider> {
    service: PromptService<M>,
    credentials: C,
    history: Mutex<HistoryStore<S>>,
    variables: Mutex<VariableMap>,
    language: Mutex<Language>,
    authenticated: AtomicBool,
    busy: AtomicBool,
}

impl<M: GenerativeModel, S: KeyValueStore, C: CredentialProvider> Session<M, S, C> {
    pub fn new(service: PromptService<M>, store: S, credentials: C, language: Language) -> Self {
        let history = HistoryStore::load(store);
        log::info!("Loaded {} history entries", history.len());
        Self {
            service,
            credentials,
            history: Mutex::new(history),
            variables: Mutex::new(VariableMap::new()),
            language: Mutex::new(language),
            authenticated: AtomicBool::new(false),
            busy: AtomicBool::new(false),
        }
    }

    pub fn language(&self) -> Language {
        *locked(&self.language)
    }

    pub fn set_language(&self, language: Language) {
        *locked(&self.language) = language;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn deauthorize(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    pub async fn ensure_authorized(&self) -> Result<(), OrionError> {
        if self.is_authenticated() {
            return Ok(());
        }
        if !self.credentials.has_key() {
            log::info!("No API key available, opening key picker");
            self.credentials.open_key_picker().await?;
        }
        self.authenticated.store(true, Ordering::Release);
        Ok(())
    }

    fn handle_failure(&self, err: ClassifiedError) -> OrionError {
        if err.requires_reauth() {
            log::warn!("{} received, dropping authenticated state", err.title());
            self.deauthorize();
        }
        OrionError::Classified(err)
    }

    /// Re-detects variables in `text`, keeping values of names that survive.
    pub fn update_text(&self, text: &str) -> Vec<String> {
        locked(&self.variables).sync(text).to_vec()
    }

    pub fn set_variable(&self, name: &str, value: &str) -> bool {
        locked(&self.variables).set(name, value)
    }

    pub fn variables(&self) -> VariableMap {
        locked(&self.variables).clone()
    }

    /// Fills `text` from the current values. Does not re-key the map.
    pub fn resolved_text(&self, text: &str) -> String {
        locked(&self.variables).apply(text)
    }

    /// Optimizes the template text (markers intact) and records the run.
    pub async fn optimize(&self, text: &str) -> Result<PromptAnalysis, OrionError> {
        if text.trim().is_empty() {
            return Err(OrionError::EmptyPrompt);
        }
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.ensure_authorized().await?;

        log::info!("Optimizing prompt ({} chars)", text.chars().count());
        let analysis = self
            .service
            .optimize_prompt(text, self.language())
            .await
            .map_err(|e| self.handle_failure(e))?;
        log::info!("   -> score {}", analysis.score);

        // History is best-effort; the analysis is returned either way.
        if let Err(e) = locked(&self.history).record(analysis.clone()) {
            log::warn!("Could not persist history entry: {e}");
        }
        Ok(analysis)
    }

    pub async fn simulate(&self, text: &str) -> Result<PerformanceMetrics, OrionError> {
        if text.trim().is_empty() {
            return Err(OrionError::EmptyPrompt);
        }
        self.ensure_authorized().await?;

        let resolved = self.resolved_text(text);
        self.service
            .evaluate(&resolved, self.language())
            .await
            .map_err(|e| self.handle_failure(e))
    }

    pub async fn benchmark(&self, original: &str, optimized: &str) -> Result<BenchmarkReport, OrionError> {
        if original.trim().is_empty() || optimized.trim().is_empty() {
            return Err(OrionError::EmptyPrompt);
        }
        self.ensure_authorized().await?;

        let original = self.resolved_text(original);
        let optimized = self.resolved_text(optimized);
        log::info!("Benchmarking original vs optimized");
        self.service
            .benchmark(&original, &optimized, self.language())
            .await
            .map_err(|e| self.handle_failure(e))
    }

    pub fn history(&self) -> Vec<HistoryItem> {
        locked(&self.history).items().to_vec()
    }

    pub fn restore(&self, id: &str) -> Option<PromptAnalysis> {
        locked(&self.history).get(id).map(|item| item.full_analysis.clone())
    }

    pub fn remove_history(&self, id: &str) -> Result<bool, OrionError> {
        locked(&self.history).remove(id)
    }

    pub fn clear_history(&self) -> Result<(), OrionError> {
        locked(&self.history).clear()
    }
}

pub fn display_error(err: &OrionError) -> ClassifiedError {
    match err {
        OrionError::EmptyPrompt => ClassifiedError::new(ErrorKind::SystemError, "Enter a prompt first."),
        other => crate::core::classifier::classify_error(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::GenerationConfig;
    use crate::ai::service::tests::{settings, ScriptedModel};
    use crate::storage::MemoryStore;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct StubCredentials {
        has_key: bool,
        picker_opened: AtomicUsize,
    }

    impl StubCredentials {
        fn with_key(has_key: bool) -> Self {
            Self { has_key, picker_opened: AtomicUsize::new(0) }
        }
    }

    impl CredentialProvider for StubCredentials {
        fn has_key(&self) -> bool {
            self.has_key
        }

        async fn open_key_picker(&self) -> Result<(), OrionError> {
            self.picker_opened.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    const GOOD: &str = r#"{"critique":"ok","optimizedPrompt":"Better [TOPIC]","techniquesUsed":["role"],"score":64}"#;

    fn session(
        replies: Vec<(&'static str, Result<String, u16>)>,
        has_key: bool,
    ) -> Session<ScriptedModel, MemoryStore, StubCredentials> {
        let service = PromptService::new(ScriptedModel::new(replies), settings());
        Session::new(service, MemoryStore::new(), StubCredentials::with_key(has_key), Language::En)
    }

    #[tokio::test]
    async fn optimize_records_history() {
        let session = session(vec![("ORIGINAL PROMPT", Ok(GOOD.into()))], true);

        let analysis = session.optimize("Explain [TOPIC]").await.unwrap();
        assert_eq!(analysis.optimized_prompt, "Better [TOPIC]");
        assert!(session.is_authenticated());

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 64);
        assert_eq!(session.restore(&history[0].id), Some(analysis));
    }

    #[tokio::test]
    async fn missing_key_opens_picker_then_proceeds() {
        let session = session(vec![("ORIGINAL PROMPT", Ok(GOOD.into()))], false);
        session.optimize("x").await.unwrap();
        assert_eq!(session.credentials.picker_opened.load(Ordering::SeqCst), 1);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn auth_failure_clears_authenticated_flag() {
        let session = session(vec![("ORIGINAL PROMPT", Err(401))], true);

        let err = session.optimize("x").await.unwrap_err();
        let shown = display_error(&err);
        assert_eq!(shown.kind, ErrorKind::AuthFailure);
        assert!(!session.is_authenticated());
        assert!(session.history().is_empty());
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn quota_failure_keeps_authenticated_flag() {
        let session = session(vec![("ORIGINAL PROMPT", Err(429))], true);
        let err = session.optimize("x").await.unwrap_err();
        assert_eq!(display_error(&err).kind, ErrorKind::QuotaExceeded);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn empty_prompt_is_rejected_without_a_call() {
        let session = session(vec![], true);
        assert!(matches!(session.optimize("   ").await, Err(OrionError::EmptyPrompt)));
        assert!(session.service_calls().is_empty());
    }

    #[tokio::test]
    async fn simulate_sends_substituted_text() {
        let session = session(
            vec![
                ("RESPONSE:", Ok(r#"{"qualityScore":70}"#.into())),
                ("Summarize", Ok("Cats are great.".into())),
            ],
            true,
        );
        session.update_text("Summarize [TOPIC] for [AUDIENCE]");
        session.set_variable("topic", "cats");

        let metrics = session.simulate("Summarize [TOPIC] for [AUDIENCE]").await.unwrap();
        assert_eq!(metrics.quality_score, 70);
        assert_eq!(session.service_calls()[0].1, "Summarize cats for [MISSING_AUDIENCE]");
    }

    #[tokio::test]
    async fn unknown_model_clears_authenticated_flag() {
        let session = session(vec![("ORIGINAL PROMPT", Err(404))], true);

        let err = session.optimize("x").await.unwrap_err();
        assert_eq!(display_error(&err).kind, ErrorKind::EntityNotFound);
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn benchmark_does_not_rekey_variables() {
        let session = session(
            vec![
                ("RESPONSE:", Ok(r#"{"qualityScore":60}"#.into())),
                ("Summarize", Ok("A summary.".into())),
                ("Explain", Ok("An explanation.".into())),
            ],
            true,
        );
        let text = "Summarize [TOPIC] for [AUDIENCE]";
        session.update_text(text);
        session.set_variable("TOPIC", "cats");
        session.set_variable("AUDIENCE", "kids");

        session.benchmark(text, "Explain [TOPIC] simply").await.unwrap();

        let vars = session.variables();
        assert_eq!(vars.names(), ["TOPIC", "AUDIENCE"]);
        assert_eq!(vars.get("AUDIENCE"), Some("kids"));
        assert_eq!(session.resolved_text(text), "Summarize cats for kids");
    }

    struct FullDisk;

    impl KeyValueStore for FullDisk {
        fn get(&self, _key: &str) -> Result<Option<String>, OrionError> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), OrionError> {
            Err(std::io::Error::other("disk full").into())
        }

        fn remove(&mut self, _key: &str) -> Result<(), OrionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn optimize_succeeds_when_history_cannot_be_saved() {
        let service = PromptService::new(ScriptedModel::new(vec![("ORIGINAL PROMPT", Ok(GOOD.into()))]), settings());
        let session = Session::new(service, FullDisk, StubCredentials::with_key(true), Language::En);

        let analysis = session.optimize("Explain [TOPIC]").await.unwrap();
        assert_eq!(analysis.score, 64);
        assert_eq!(session.history().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn update_text_keeps_values_for_surviving_names() {
        let session = session(vec![], true);
        session.update_text("[A] [B]");
        session.set_variable("A", "1");
        assert_eq!(session.update_text("[A] <C>"), vec!["A", "C"]);
        assert_eq!(session.variables().get("A"), Some("1"));
    }

    impl Session<ScriptedModel, MemoryStore, StubCredentials> {
        fn service_calls(&self) -> Vec<(String, String)> {
            self.service.model().calls.lock().unwrap().clone()
        }
    }

    struct GatedModel {
        release: Notify,
    }

    impl GenerativeModel for GatedModel {
        async fn generate(&self, _model: &str, _content: &str, _config: &GenerationConfig) -> Result<String, OrionError> {
            self.release.notified().await;
            Ok(GOOD.to_string())
        }
    }

    #[tokio::test]
    async fn second_optimize_is_rejected_while_first_is_in_flight() {
        let service = PromptService::new(GatedModel { release: Notify::new() }, settings());
        let session = Session::new(service, MemoryStore::new(), StubCredentials::with_key(true), Language::En);

        let first = session.optimize("first");
        let second = async {
            tokio::task::yield_now().await;
            let rejected = session.optimize("second").await;
            session.service.model().release.notify_one();
            rejected
        };

        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert!(matches!(second, Err(OrionError::Busy)));
        assert!(!session.is_busy());
        assert_eq!(session.history().len(), 1);
    }
}
