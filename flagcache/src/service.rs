//! Composition-root handle for the flag service.
//!
//! Exactly one owner constructs a `FlagService` at startup and shares clones
//! with the query layer; there is no global registry.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cache::FlagCache;
use crate::classify;
use crate::config::Config;
use crate::fetcher::{FetchError, SourceFetcher};
use crate::lists::StaticLists;
use crate::metrics_defs::CLASSIFY_REQUESTS;
use crate::persistence::SnapshotStore;
use crate::refresher::{Command, Refresher};
use crate::transport::Transport;
use crate::types::{ApplicationId, CacheStats, ClassificationResult, Flag, ServiceError};

struct ServiceInner {
    cache: Arc<FlagCache>,
    lists: StaticLists,
    tx: mpsc::Sender<Command>,
    #[allow(dead_code)]
    worker: JoinHandle<()>,
}

#[derive(Clone)]
pub struct FlagService {
    inner: Arc<ServiceInner>,
}

impl FlagService {
    /// Builds the service: seeds the cache from the persisted snapshot,
    /// completes the first fetch-and-apply, then spawns the refresh loop.
    /// Returns once the initial load has finished, successfully or degraded
    /// to whatever data was available.
    pub async fn start(config: &Config, store: Arc<dyn SnapshotStore>, lists: StaticLists) -> Self {
        let transport = Transport::new(Duration::from_secs(config.refresh.request_timeout_secs));
        let fetcher = SourceFetcher::new(
            transport,
            config.sources.settings_url.clone(),
            config.sources.tracker_url.clone(),
        );

        let cache = Arc::new(FlagCache::new());
        let refresher = Refresher::new(
            fetcher,
            cache.clone(),
            store,
            Duration::from_secs(config.refresh.interval_secs),
            Duration::from_secs(config.refresh.retry_backoff_secs),
        );

        refresher.initial_load().await;

        let (tx, rx) = mpsc::channel::<Command>(16);
        let worker = tokio::spawn(async move {
            refresher.run(rx).await;
        });

        FlagService {
            inner: Arc::new(ServiceInner {
                cache,
                lists,
                tx,
                worker,
            }),
        }
    }

    /// Lists the cached flags for one application. A recognized application
    /// with no cached data yields an empty list, never an error.
    pub fn list_flags(&self, app_id: &str) -> Result<Vec<Flag>, ServiceError> {
        let app = ApplicationId::from_str(app_id)?;
        Ok(self.inner.cache.flags_for(app))
    }

    pub fn classify(
        &self,
        flags: &[String],
        applications: &[String],
    ) -> Result<ClassificationResult, ServiceError> {
        metrics::counter!(CLASSIFY_REQUESTS.name).increment(1);
        classify::classify(&self.inner.cache, &self.inner.lists, flags, applications)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.cache.is_ready()
    }

    /// Triggers an immediate refresh cycle and waits for the attempt to
    /// finish.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let (ack, done) = oneshot::channel();
        if self.inner.tx.send(Command::Refresh(ack)).await.is_err() {
            return Err(FetchError::WorkerStopped);
        }
        done.await.unwrap_or(Err(FetchError::WorkerStopped))
    }

    /// Stops the refresh loop. Queries keep answering from the last applied
    /// snapshot.
    pub async fn shutdown(&self) {
        let _ = self.inner.tx.send(Command::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FilesystemSnapshotStore, NoopSnapshotStore};
    use crate::types::RawFlags;
    use indexmap::IndexMap;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(settings_url: &str, tracker_url: &str) -> Config {
        Config {
            listener: Default::default(),
            sources: crate::config::Sources {
                settings_url: Url::parse(settings_url).unwrap(),
                tracker_url: Url::parse(tracker_url).unwrap(),
            },
            refresh: Default::default(),
            data: Default::default(),
        }
    }

    fn config_for(server: &MockServer) -> Config {
        test_config(&server.uri(), &format!("{}/tracker", server.uri()))
    }

    async fn mount_settings(
        server: &MockServer,
        app: ApplicationId,
        body: serde_json::Value,
        times: Option<u64>,
    ) {
        let mock = Mock::given(method("GET")).and(path(format!("/{app}"))).respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "applicationSettings": body })),
        );
        let mock = match times {
            Some(n) => mock.up_to_n_times(n),
            None => mock,
        };
        mock.mount(server).await;
    }

    #[tokio::test]
    async fn test_start_fetches_and_serves() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tracker"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("[C++] DFFlagFromMaster\n"),
            )
            .mount(&server)
            .await;
        mount_settings(
            &server,
            ApplicationId::PcDesktopClient,
            serde_json::json!({"DFFlagDesktopOnly": "True"}),
            None,
        )
        .await;

        let service = FlagService::start(
            &config_for(&server),
            Arc::new(NoopSnapshotStore),
            StaticLists::default(),
        )
        .await;

        assert!(service.is_ready());

        let flags = service.list_flags("PCDesktopClient").unwrap();
        let names: Vec<&str> = flags.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"DFFlagDesktopOnly"));
        assert!(names.contains(&"DFFlagFromMaster"));

        // The synthetic entry holds only the master defaults
        let all = service.list_flags("ALL").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "DFFlagFromMaster");
        assert!(!all[0].enabled);

        let stats = service.stats();
        assert!(stats.last_fetch.is_some());
        assert_eq!(stats.cache_size, 3);

        assert_eq!(
            service.list_flags("NotARealApp").unwrap_err(),
            ServiceError::InvalidApplication("NotARealApp".to_string())
        );
    }

    #[tokio::test]
    async fn test_refresh_cycles_are_idempotent_in_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tracker"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;
        mount_settings(
            &server,
            ApplicationId::AndroidApp,
            serde_json::json!({"DFFlagStable": "true", "DFFlagOff": "false"}),
            None,
        )
        .await;

        let service = FlagService::start(
            &config_for(&server),
            Arc::new(NoopSnapshotStore),
            StaticLists::default(),
        )
        .await;

        let first: Vec<(String, bool)> = service
            .list_flags("AndroidApp")
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.enabled))
            .collect();

        service.refresh().await.unwrap();

        let second: Vec<(String, bool)> = service
            .list_flags("AndroidApp")
            .unwrap()
            .into_iter()
            .map(|f| (f.name, f.enabled))
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_stale_data_readable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tracker"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        // Xbox answers only the first cycle, then disappears
        mount_settings(
            &server,
            ApplicationId::XboxClient,
            serde_json::json!({"DFFlagConsole": "true"}),
            Some(1),
        )
        .await;
        // Desktop answers the first cycle with one value, later cycles with
        // another
        mount_settings(
            &server,
            ApplicationId::PcDesktopClient,
            serde_json::json!({"DFFlagDesktop": "true"}),
            Some(1),
        )
        .await;
        mount_settings(
            &server,
            ApplicationId::PcDesktopClient,
            serde_json::json!({"DFFlagDesktop": "false"}),
            None,
        )
        .await;

        let service = FlagService::start(
            &config_for(&server),
            Arc::new(NoopSnapshotStore),
            StaticLists::default(),
        )
        .await;

        assert!(service.list_flags("XboxClient").unwrap()[0].enabled);
        assert!(service.list_flags("PCDesktopClient").unwrap()[0].enabled);

        service.refresh().await.unwrap();

        // Desktop updated, Xbox kept its data from the previous cycle
        assert!(!service.list_flags("PCDesktopClient").unwrap()[0].enabled);
        let xbox = service.list_flags("XboxClient").unwrap();
        assert_eq!(xbox.len(), 1);
        assert_eq!(xbox[0].name, "DFFlagConsole");
        assert!(xbox[0].enabled);
    }

    #[tokio::test]
    async fn test_cold_start_seeds_from_persisted_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemSnapshotStore::new(dir.path().join("snapshot.json"));

        let mut settings = IndexMap::new();
        settings.insert("DFFlagSeeded".to_string(), "True".to_string());
        let raw = RawFlags::from([(ApplicationId::MacDesktopClient, settings)]);
        {
            use crate::persistence::SnapshotStore as _;
            store.store(&raw).unwrap();
        }

        // Both upstreams point at a closed port, so the initial fetch fails
        let config = test_config("http://127.0.0.1:9", "http://127.0.0.1:9/tracker");
        let service = FlagService::start(&config, Arc::new(store), StaticLists::default()).await;

        assert!(service.is_ready());
        let flags = service.list_flags("MacDesktopClient").unwrap();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].name, "DFFlagSeeded");
        assert!(flags[0].enabled);

        // No live fetch ever succeeded
        assert_eq!(service.stats().last_fetch, None);
    }

    #[tokio::test]
    async fn test_cold_start_with_nothing_available() {
        let config = test_config("http://127.0.0.1:9", "http://127.0.0.1:9/tracker");
        let service =
            FlagService::start(&config, Arc::new(NoopSnapshotStore), StaticLists::default()).await;

        // Degraded but answering: empty lists and all-invalid classification
        assert!(service.list_flags("AndroidApp").unwrap().is_empty());
        let result = service
            .classify(&["DFFlagX".to_string()], &["AndroidApp".to_string()])
            .unwrap();
        assert!(result.valid.is_empty());
        assert_eq!(result.invalid.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_shutdown_reports_worker_stopped() {
        let config = test_config("http://127.0.0.1:9", "http://127.0.0.1:9/tracker");
        let service =
            FlagService::start(&config, Arc::new(NoopSnapshotStore), StaticLists::default()).await;

        service.shutdown().await;
        assert!(matches!(
            service.refresh().await.unwrap_err(),
            FetchError::WorkerStopped
        ));
    }

    #[tokio::test]
    async fn test_persists_after_successful_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tracker"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[C++] DFFlagSaved\n"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let service = FlagService::start(
            &config_for(&server),
            Arc::new(FilesystemSnapshotStore::new(&path)),
            StaticLists::default(),
        )
        .await;
        assert!(service.is_ready());

        use crate::persistence::SnapshotStore as _;
        let persisted = FilesystemSnapshotStore::new(&path).load().unwrap();
        assert_eq!(persisted[&ApplicationId::All]["DFFlagSaved"], "false");
    }
}
