use crate::cache::TtlCache;
use crate::error::FetchError;
use crate::normalize::Normalizer;
use crate::table::ResultTable;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Some publishing endpoints refuse requests without a browser user agent.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Raw response from a [`CsvSource`].
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Where CSV bytes come from. Non-2xx answers must be reported as
/// [`FetchError::Status`].
pub trait CsvSource: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = Result<Payload, FetchError>> + Send;
}

/// A decoded table and when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub table: ResultTable,
    pub fetched_at: DateTime<Local>,
}

/// Either a snapshot or the reason there is none (the empty result).
pub type FetchOutcome = Result<Arc<Snapshot>, FetchError>;

type CacheKey = (String, Duration);

/// Normalize, download, decode and cache a spreadsheet.
pub struct SheetFetcher<S> {
    source: S,
    normalizer: Normalizer,
    cache: Mutex<TtlCache<CacheKey, FetchOutcome>>,
    // Bumped under the cache lock by every invalidation.
    generation: AtomicU64,
}

impl<S: CsvSource> SheetFetcher<S> {
    pub fn new(source: S) -> Self {
        SheetFetcher {
            source,
            normalizer: Normalizer::default(),
            cache: Mutex::new(TtlCache::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch `reference`, reusing a cached outcome younger than `ttl`.
    ///
    /// Failures are cached like successes; a retry before expiry needs
    /// [`invalidate_all`](Self::invalidate_all). A fetch that was already in
    /// flight when the cache was invalidated returns its result but does not
    /// store it.
    pub async fn fetch(&self, reference: &str, ttl: Duration) -> FetchOutcome {
        if reference.trim().is_empty() {
            return Err(FetchError::Config("SPREADSHEET_URL is not set".to_string()));
        }

        let key = (reference.to_string(), ttl);
        let cached = self.cache().get(&key);
        if let Some(outcome) = cached {
            debug!("spreadsheet cache hit for {}", reference);
            return outcome;
        }

        let generation = self.generation.load(Ordering::Acquire);
        let outcome = self.fetch_uncached(reference).await;
        if let Err(e) = &outcome {
            warn!("spreadsheet fetch failed: {}", e);
        }
        {
            let mut cache = self.cache();
            if self.generation.load(Ordering::Acquire) == generation {
                cache.insert(key, outcome.clone(), ttl);
            } else {
                debug!("cache cleared while fetching {}; result not stored", reference);
            }
        }
        outcome
    }

    /// Forget every cached outcome.
    pub fn invalidate_all(&self) {
        let mut cache = self.cache();
        self.generation.fetch_add(1, Ordering::AcqRel);
        info!("clearing {} cached spreadsheet result(s)", cache.len());
        cache.invalidate_all();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache().len()
    }

    async fn fetch_uncached(&self, reference: &str) -> FetchOutcome {
        let url = self.normalizer.normalize(reference);
        info!("fetching spreadsheet from {}", url);

        let payload = self.source.get(&url).await?;
        if let Some(content_type) = payload.content_type.as_deref() {
            if content_type.to_ascii_lowercase().starts_with("text/html") {
                return Err(FetchError::Disguised(format!(
                    "the server answered with {}",
                    content_type
                )));
            }
        }

        let table = ResultTable::from_csv(&payload.body)?;
        if table.skipped_rows > 0 {
            warn!("skipped {} malformed row(s) while decoding the spreadsheet", table.skipped_rows);
        }
        info!(
            "loaded {} row(s) x {} column(s)",
            table.row_count(),
            table.columns.len()
        );

        Ok(Arc::new(Snapshot {
            table,
            fetched_at: Local::now(),
        }))
    }

    fn cache(&self) -> MutexGuard<'_, TtlCache<CacheKey, FetchOutcome>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// reqwest-backed source used by the web server.
#[cfg(feature = "web")]
pub struct HttpSource {
    client: reqwest::Client,
}

#[cfg(feature = "web")]
impl HttpSource {
    /// Without `timeout` a hung upstream blocks the request indefinitely.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(BROWSER_USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(HttpSource { client })
    }
}

#[cfg(feature = "web")]
impl CsvSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Payload, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Payload {
            content_type,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizationRule;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct CannedSource {
        calls: AtomicUsize,
        urls: Mutex<Vec<String>>,
        response: Result<Payload, FetchError>,
    }

    impl CannedSource {
        fn csv(body: &str) -> Self {
            Self::with(Ok(Payload {
                content_type: Some("text/csv; charset=utf-8".to_string()),
                body: body.as_bytes().to_vec(),
            }))
        }

        fn with(response: Result<Payload, FetchError>) -> Self {
            CannedSource {
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
                response,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CsvSource for CannedSource {
        async fn get(&self, url: &str) -> Result<Payload, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            self.response.clone()
        }
    }

    /// Holds the first request until `release` is notified; later requests
    /// answer immediately with a different body.
    struct GatedSource {
        calls: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    impl CsvSource for GatedSource {
        async fn get(&self, _url: &str) -> Result<Payload, FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if call == 0 {
                self.started.notify_one();
                self.release.notified().await;
                "version\nold\n"
            } else {
                "version\nnew\n"
            };
            Ok(Payload {
                content_type: Some("text/csv".to_string()),
                body: body.as_bytes().to_vec(),
            })
        }
    }

    const EDIT_URL: &str = "https://docs.google.com/spreadsheets/d/ABC123/edit#gid=0";
    const TTL: Duration = Duration::from_secs(600);

    #[tokio::test]
    async fn fetch_normalizes_before_dereferencing() {
        let fetcher = SheetFetcher::new(CannedSource::csv("a,b\n1,2\n"));
        fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        let urls = fetcher.source().urls.lock().unwrap().clone();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].contains("/d/ABC123/export?format=csv"));
    }

    #[tokio::test]
    async fn second_fetch_in_window_is_served_from_cache() {
        let fetcher = SheetFetcher::new(CannedSource::csv(" 巻 ,ページ\n2,10\n1,5\n"));
        let first = fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        let second = fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        assert_eq!(fetcher.source().calls(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.table.columns, ["巻", "ページ"]);
    }

    #[tokio::test]
    async fn invalidation_forces_a_new_dereference() {
        let fetcher = SheetFetcher::new(CannedSource::csv("a\n1\n"));
        fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        fetcher.invalidate_all();
        assert_eq!(fetcher.cached_entries(), 0);
        fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn fetch_in_flight_during_invalidation_is_not_cached() {
        let fetcher = Arc::new(SheetFetcher::new(GatedSource {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
            release: Notify::new(),
        }));

        let in_flight = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch(EDIT_URL, TTL).await }
        });
        fetcher.source().started.notified().await;
        fetcher.invalidate_all();
        fetcher.source().release.notify_one();

        let old = in_flight.await.unwrap().unwrap();
        assert_eq!(old.table.rows[0][0].to_string(), "old");
        assert_eq!(fetcher.cached_entries(), 0);

        let fresh = fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        assert_eq!(fetcher.source().calls.load(Ordering::SeqCst), 2);
        assert_eq!(fresh.table.rows[0][0].to_string(), "new");
    }

    #[tokio::test]
    async fn custom_normalizer_is_used() {
        fn is_local(reference: &str) -> bool {
            reference.starts_with("local:")
        }
        fn to_loopback(reference: &str) -> String {
            format!("http://127.0.0.1/{}", &reference["local:".len()..])
        }
        let normalizer = Normalizer::empty().with_rule(NormalizationRule {
            name: "local",
            applies: is_local,
            transform: to_loopback,
        });
        let fetcher = SheetFetcher::new(CannedSource::csv("a\n1\n")).with_normalizer(normalizer);
        fetcher.fetch("local:books.csv", TTL).await.unwrap();
        fetcher.fetch(EDIT_URL, TTL).await.unwrap();
        let urls = fetcher.source().urls.lock().unwrap().clone();
        assert_eq!(urls, ["http://127.0.0.1/books.csv", EDIT_URL]);
    }

    #[tokio::test]
    async fn ttl_is_part_of_the_key() {
        let fetcher = SheetFetcher::new(CannedSource::csv("a\n1\n"));
        fetcher.fetch(EDIT_URL, Duration::from_secs(10)).await.unwrap();
        fetcher.fetch(EDIT_URL, Duration::from_secs(300)).await.unwrap();
        assert_eq!(fetcher.source().calls(), 2);
        assert_eq!(fetcher.cached_entries(), 2);
    }

    #[tokio::test]
    async fn failures_are_cached_until_invalidated() {
        let fetcher = SheetFetcher::new(CannedSource::with(Err(FetchError::Status(404))));
        assert_eq!(fetcher.fetch(EDIT_URL, TTL).await, Err(FetchError::Status(404)));
        assert_eq!(fetcher.fetch(EDIT_URL, TTL).await, Err(FetchError::Status(404)));
        assert_eq!(fetcher.source().calls(), 1);
        fetcher.invalidate_all();
        let _ = fetcher.fetch(EDIT_URL, TTL).await;
        assert_eq!(fetcher.source().calls(), 2);
    }

    #[tokio::test]
    async fn html_content_type_is_a_disguised_failure() {
        let fetcher = SheetFetcher::new(CannedSource::with(Ok(Payload {
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: b"name\nnot really csv\n".to_vec(),
        })));
        assert!(matches!(
            fetcher.fetch(EDIT_URL, TTL).await,
            Err(FetchError::Disguised(_))
        ));
    }

    #[tokio::test]
    async fn copyright_column_is_an_empty_result() {
        let fetcher = SheetFetcher::new(CannedSource::csv("Copyright 2024 Google\nTerms\n"));
        assert!(matches!(
            fetcher.fetch(EDIT_URL, TTL).await,
            Err(FetchError::Disguised(_))
        ));
    }

    #[tokio::test]
    async fn blank_reference_is_a_configuration_error() {
        let fetcher = SheetFetcher::new(CannedSource::csv("a\n1\n"));
        assert!(matches!(
            fetcher.fetch("   ", TTL).await,
            Err(FetchError::Config(_))
        ));
        assert_eq!(fetcher.source().calls(), 0);
    }
}
