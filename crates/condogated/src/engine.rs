use crate::config::Config;
use chrono::{NaiveDate, Utc};
use condogate_core::{
    AccessDecision, AccessEvent, Category, CoreError, DecisionEngine, EmbeddingExtractor,
    EngineConfig,
};
use condogate_embed::{RemoteConfig, RemoteExtractor};
use condogate_store::{LogStats, SqliteGallery, SqliteStore, StoreError};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid argument: {0}")]
    Invalid(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    /// True when the caller sent something unusable.
    pub fn is_input_error(&self) -> bool {
        match self {
            EngineError::Core(e) => e.is_input_error(),
            EngineError::Store(StoreError::NoIdentityTable(_)) => true,
            EngineError::Invalid(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorStatus {
    /// No service URL configured.
    Disabled,
    Ready,
    /// Health check failed at startup; requests are still attempted.
    Unreachable,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub version: &'static str,
    pub db_path: String,
    pub extractor: ExtractorStatus,
    pub face_dimension: usize,
    pub face_threshold: f32,
    pub face_gallery: usize,
    pub attendance_dimension: usize,
    pub attendance_threshold: f32,
    pub attendance_gallery: usize,
}

/// Shared by every engine worker.
pub struct Engines {
    store: Arc<SqliteStore>,
    faces: DecisionEngine,
    attendance: DecisionEngine,
    face_gallery: SqliteGallery,
    attendance_gallery: SqliteGallery,
    extractor: ExtractorStatus,
    db_path: String,
}

impl Engines {
    /// Open the database and connect the embedding service.
    pub fn open(config: &Config) -> Result<Self, EngineError> {
        let store = Arc::new(SqliteStore::open(&config.db_path)?);

        let extractor: Option<Box<dyn EmbeddingExtractor>> = match &config.ml_base_url {
            Some(base_url) => {
                let remote = RemoteExtractor::new(RemoteConfig {
                    base_url: base_url.clone(),
                    api_key: config.ml_api_key.clone(),
                    timeout: config.extract_timeout(),
                    dimension: config.embedding_dim,
                })
                .map_err(CoreError::from)?;
                Some(Box::new(remote))
            }
            None => {
                tracing::warn!("CONDOGATE_ML_BASE_URL not set; image decisions disabled");
                None
            }
        };

        Self::build(store, config, extractor, config.db_path.display().to_string())
    }

    pub fn build(
        store: Arc<SqliteStore>,
        config: &Config,
        extractor: Option<Box<dyn EmbeddingExtractor>>,
        db_path: String,
    ) -> Result<Self, EngineError> {
        let face_gallery = SqliteGallery::new(store.clone(), config.embedding_dim);
        let attendance_gallery = SqliteGallery::new(store.clone(), config.attendance_dim);

        let mut faces = DecisionEngine::new(
            Arc::new(face_gallery.clone()),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig {
                dimension: config.embedding_dim,
                threshold: config.similarity_threshold,
                scan_page_size: config.scan_page_size,
            },
        )?;
        let attendance = DecisionEngine::new(
            Arc::new(attendance_gallery.clone()),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig {
                dimension: config.attendance_dim,
                threshold: config.attendance_threshold,
                scan_page_size: config.scan_page_size,
            },
        )?;

        let extractor = match extractor {
            None => ExtractorStatus::Disabled,
            Some(extractor) => {
                faces = faces.with_extractor(extractor)?;
                match faces.init() {
                    Ok(()) => ExtractorStatus::Ready,
                    Err(e) => {
                        tracing::warn!(error = %e, "embedding service unreachable at startup");
                        ExtractorStatus::Unreachable
                    }
                }
            }
        };

        tracing::info!(
            face_dimension = config.embedding_dim,
            face_gallery = face_gallery.count()?,
            attendance_dimension = config.attendance_dim,
            attendance_gallery = attendance_gallery.count()?,
            ?extractor,
            "engines ready"
        );

        Ok(Self {
            store,
            faces,
            attendance,
            face_gallery,
            attendance_gallery,
            extractor,
            db_path,
        })
    }

    fn require_identity(&self, category: Category, reference_id: i64) -> Result<(), EngineError> {
        if category == Category::Unknown {
            return Err(EngineError::Invalid("unrecognized category".into()));
        }
        match self.store.identity_name(category, reference_id)? {
            Some(_) => Ok(()),
            None => Err(EngineError::Invalid(format!(
                "no {category} with id {reference_id}"
            ))),
        }
    }

    fn decide(&self, image: &[u8], hint: Option<Category>) -> Result<AccessDecision, EngineError> {
        Ok(self.faces.decide_image(image, hint)?)
    }

    fn decide_embedding(&self, values: &[f64], hint: Option<Category>) -> Result<AccessDecision, EngineError> {
        let values: Vec<f32> = values.iter().map(|v| *v as f32).collect();
        Ok(self.attendance.decide_embedding(&values, hint)?)
    }

    fn manual_override(&self, officer_id: Option<i64>) -> Result<AccessDecision, EngineError> {
        if let Some(officer_id) = officer_id {
            self.require_identity(Category::SecurityOfficer, officer_id)?;
        }
        Ok(self.faces.manual_override(officer_id)?)
    }

    fn enroll(&self, category: Category, reference_id: i64, image: &[u8]) -> Result<i64, EngineError> {
        self.require_identity(category, reference_id)?;
        Ok(self.faces.enroll_image(category, reference_id, image)?)
    }

    fn enroll_embedding(&self, category: Category, reference_id: i64, values: &[f64]) -> Result<i64, EngineError> {
        self.require_identity(category, reference_id)?;
        let values: Vec<f32> = values.iter().map(|v| *v as f32).collect();
        if values.len() != self.attendance.dimension() {
            return Err(CoreError::InvalidEmbeddingFormat {
                expected: self.attendance.dimension(),
                got: values.len(),
            }
            .into());
        }
        Ok(self.attendance.enroll_embedding(category, reference_id, &values)?)
    }

    fn add_identity(&self, category: Category, full_name: &str) -> Result<i64, EngineError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(EngineError::Invalid("full name must not be empty".into()));
        }
        Ok(self.store.add_identity(category, full_name)?)
    }

    fn set_work_window(&self, temp_id: i64, start: &str, end: &str) -> Result<bool, EngineError> {
        let start = parse_date_arg(start)?;
        let end = parse_date_arg(end)?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(EngineError::Invalid(format!("window starts after it ends ({s} > {e})")));
            }
        }
        Ok(self.store.set_work_window(temp_id, start, end)?)
    }

    fn status(&self) -> Result<Status, EngineError> {
        Ok(Status {
            version: env!("CARGO_PKG_VERSION"),
            db_path: self.db_path.clone(),
            extractor: self.extractor,
            face_dimension: self.faces.dimension(),
            face_threshold: self.faces.threshold(),
            face_gallery: self.face_gallery.count()?,
            attendance_dimension: self.attendance.dimension(),
            attendance_threshold: self.attendance.threshold(),
            attendance_gallery: self.attendance_gallery.count()?,
        })
    }

    fn shutdown(&self) {
        self.faces.shutdown();
        self.attendance.shutdown();
    }
}

/// `YYYY-MM-DD`, or empty for an open bound.
fn parse_date_arg(raw: &str) -> Result<Option<NaiveDate>, EngineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| EngineError::Invalid(format!("date '{raw}': {e}")))
}

type Job = Box<dyn FnOnce(&Engines) + Send>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

/// Clone-safe handle to the engine workers.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn call<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&Engines) -> Result<T, EngineError> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |engines| {
            let _ = reply_tx.send(f(engines));
        });
        self.tx
            .send(EngineRequest::Run(job))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    pub async fn decide(&self, image: Vec<u8>, hint: Option<Category>) -> Result<AccessDecision, EngineError> {
        self.call(move |e| e.decide(&image, hint)).await
    }

    pub async fn decide_embedding(
        &self,
        values: Vec<f64>,
        hint: Option<Category>,
    ) -> Result<AccessDecision, EngineError> {
        self.call(move |e| e.decide_embedding(&values, hint)).await
    }

    pub async fn manual_override(&self, officer_id: Option<i64>) -> Result<AccessDecision, EngineError> {
        self.call(move |e| e.manual_override(officer_id)).await
    }

    pub async fn enroll(&self, category: Category, reference_id: i64, image: Vec<u8>) -> Result<i64, EngineError> {
        self.call(move |e| e.enroll(category, reference_id, &image)).await
    }

    pub async fn enroll_embedding(
        &self,
        category: Category,
        reference_id: i64,
        values: Vec<f64>,
    ) -> Result<i64, EngineError> {
        self.call(move |e| e.enroll_embedding(category, reference_id, &values))
            .await
    }

    pub async fn add_identity(&self, category: Category, full_name: String) -> Result<i64, EngineError> {
        self.call(move |e| e.add_identity(category, &full_name)).await
    }

    pub async fn set_work_window(&self, temp_id: i64, start: String, end: String) -> Result<bool, EngineError> {
        self.call(move |e| e.set_work_window(temp_id, &start, &end)).await
    }

    pub async fn delete_identity(&self, category: Category, reference_id: i64) -> Result<usize, EngineError> {
        self.call(move |e| Ok(e.store.delete_identity(category, reference_id)?))
            .await
    }

    pub async fn recent_logs(&self, limit: usize) -> Result<Vec<AccessEvent>, EngineError> {
        self.call(move |e| Ok(e.store.recent_logs(limit)?)).await
    }

    pub async fn today_logs(&self, limit: usize) -> Result<Vec<AccessEvent>, EngineError> {
        self.call(move |e| Ok(e.store.today_logs(Utc::now(), limit)?))
            .await
    }

    pub async fn stats(&self, days: u32) -> Result<LogStats, EngineError> {
        self.call(move |e| Ok(e.store.log_stats(days, Utc::now())?))
            .await
    }

    pub async fn status(&self) -> Result<Status, EngineError> {
        self.call(|e| e.status()).await
    }

    /// Stop the extractor. Image decisions still in flight degrade to NO_FACE.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(EngineRequest::Shutdown(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

/// Spawn the engine workers for `config`.
///
/// The database and the embedding service are opened on a worker thread;
/// startup errors are reported back before any request is accepted.
pub async fn spawn_engine(config: Config) -> Result<EngineHandle, EngineError> {
    let workers = config.workers;
    spawn_with(workers, move || Engines::open(&config)).await
}

/// Build the engines with `open` and start `workers` threads serving requests.
///
/// Workers share one request queue, so a slow extraction only holds up the
/// worker running it.
pub async fn spawn_with<F>(workers: usize, open: F) -> Result<EngineHandle, EngineError>
where
    F: FnOnce() -> Result<Engines, EngineError> + Send + 'static,
{
    let workers = workers.max(1);
    let (ready_tx, ready_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("condogate-engine-init".into())
        .spawn(move || {
            let _ = ready_tx.send(open().map(Arc::new));
        })?;
    let engines = ready_rx.await.map_err(|_| EngineError::ChannelClosed)??;

    let (tx, rx) = mpsc::channel::<EngineRequest>(16 * workers);
    let rx = Arc::new(Mutex::new(rx));
    for index in 0..workers {
        let engines = engines.clone();
        let rx = rx.clone();
        std::thread::Builder::new()
            .name(format!("condogate-engine-{index}"))
            .spawn(move || run_worker(index, &engines, &rx))?;
    }
    tracing::info!(workers, "engine workers started");

    Ok(EngineHandle { tx })
}

fn run_worker(index: usize, engines: &Engines, rx: &Mutex<mpsc::Receiver<EngineRequest>>) {
    loop {
        let request = match rx.lock() {
            Ok(mut rx) => rx.blocking_recv(),
            Err(_) => None,
        };
        match request {
            Some(EngineRequest::Run(job)) => job(engines),
            Some(EngineRequest::Shutdown(reply)) => {
                engines.shutdown();
                let _ = reply.send(());
                break;
            }
            None => break,
        }
    }
    tracing::debug!(worker = index, "engine worker exiting");
}
