//! Background quality assessment
//!
//! Runs model loading and inference on a dedicated thread so the
//! acquisition loop never waits on the model.
//!
//! # Architecture
//! ```text
//! Acquisition loop         Worker thread
//!     |                        | [load model]
//!     | on_buffer_grew() ----> |
//!     | on_buffer_grew() ----> | drain queue, keep newest request
//!     |                        | [extract -> classify]
//!     | <---- publish -------- | only if request id is newer
//!     | latest()               |
//! ```
//!
//! Ordering policy is last-started-wins: a verdict replaces the published
//! one only when its request id is greater. A window that shrinks below the
//! threshold publishes the unknown verdict under its own request id, so
//! assessments of the older buffer cannot overwrite it. Verdicts finishing
//! after `shutdown` are discarded.

use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::classifier::{ModelStatus, QualityClassifier};
use super::error::ModelError;
use super::features::FeatureExtractor;
use super::model::{DenseModel, QualityModel};
use super::verdict::{QualityVerdict, VerdictSnapshot};
use crate::config::QualityConfig;

/// Produces the session's model; called on the worker thread.
pub type ModelLoader = Box<dyn Fn() -> Result<Box<dyn QualityModel>, ModelError> + Send>;

enum WorkerMessage {
    Assess { window: Vec<f32>, request_id: u64 },
    ReloadModel,
}

#[derive(Debug, Clone, Copy, Default)]
struct Progress {
    /// Request id of the published verdict (0 = none)
    published_id: u64,
    verdict: QualityVerdict,
    /// Highest request id the worker has finished with, assessed or dropped
    completed_id: u64,
}

struct Shared {
    progress: Mutex<Progress>,
    progressed: Condvar,
    status: RwLock<ModelStatus>,
    ended: AtomicBool,
    assessments: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            progress: Mutex::new(Progress::default()),
            progressed: Condvar::new(),
            status: RwLock::new(ModelStatus::Loading),
            ended: AtomicBool::new(false),
            assessments: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn publish(&self, request_id: u64, verdict: Option<QualityVerdict>) {
        let mut progress = self.progress.lock();
        if self.ended.load(Ordering::Acquire) {
            log::debug!("Discarding verdict for request {} after session end", request_id);
        } else if let Some(verdict) = verdict {
            if request_id > progress.published_id {
                progress.published_id = request_id;
                progress.verdict = verdict;
            }
        }
        progress.completed_id = progress.completed_id.max(request_id);
        self.progressed.notify_all();
    }
}

/// Read-only view of the latest verdict for the presentation layer.
#[derive(Clone)]
pub struct VerdictHandle {
    shared: Arc<Shared>,
}

impl VerdictHandle {
    pub fn verdict(&self) -> QualityVerdict {
        self.shared.progress.lock().verdict
    }

    pub fn snapshot(&self) -> VerdictSnapshot {
        self.verdict().snapshot()
    }

    /// Request id the current verdict was derived from (0 = none yet)
    pub fn request_id(&self) -> u64 {
        self.shared.progress.lock().published_id
    }
}

/// Quality monitor whose model lives on a background thread.
pub struct BackgroundMonitor {
    tx: Option<Sender<WorkerMessage>>,
    handle: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    min_window: usize,
    next_request_id: u64,
    /// A window at or above the threshold was submitted since the last reset
    active: bool,
}

impl BackgroundMonitor {
    /// Spawn a worker that loads the `DenseModel` at `config.model_path`.
    pub fn spawn_from_path(config: QualityConfig) -> std::io::Result<Self> {
        let path = config.model_path.clone();
        Self::spawn(config, move || {
            DenseModel::from_path(&path).map(|m| Box::new(m) as Box<dyn QualityModel>)
        })
    }

    /// Spawn a worker with a custom model loader.
    pub fn spawn<F>(config: QualityConfig, loader: F) -> std::io::Result<Self>
    where
        F: Fn() -> Result<Box<dyn QualityModel>, ModelError> + Send + 'static,
    {
        let (tx, rx) = channel::<WorkerMessage>();
        let shared = Arc::new(Shared::new());
        let worker_shared = Arc::clone(&shared);
        let min_window = config.min_window;
        let loader: ModelLoader = Box::new(loader);

        let handle = thread::Builder::new()
            .name("quality-worker".to_string())
            .spawn(move || {
                Self::worker_loop(config, loader, rx, worker_shared);
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            shared,
            min_window,
            next_request_id: 1,
            active: false,
        })
    }

    fn load_model(loader: &ModelLoader, classifier: &mut QualityClassifier, shared: &Shared) {
        match loader() {
            Ok(model) => {
                classifier.install(model);
                log::info!("PPG quality model loaded");
            }
            Err(e) => {
                log::error!("Failed to load quality model: {}", e);
                classifier.unload();
                *shared.status.write() = ModelStatus::Failed(e.to_string());
                return;
            }
        }
        *shared.status.write() = classifier.status().clone();
    }

    fn worker_loop(
        config: QualityConfig,
        loader: ModelLoader,
        rx: Receiver<WorkerMessage>,
        shared: Arc<Shared>,
    ) {
        log::info!("Quality worker started");

        let mut extractor = FeatureExtractor::with_config(&config);
        let mut classifier = QualityClassifier::loading();
        Self::load_model(&loader, &mut classifier, &shared);

        while let Ok(first) = rx.recv() {
            let mut pending: Option<(Vec<f32>, u64)> = None;
            let mut reload = false;
            let mut disconnected = false;

            let mut next = Some(first);
            while let Some(message) = next.take() {
                match message {
                    WorkerMessage::Assess { window, request_id } => {
                        if let Some((_, superseded)) = pending.replace((window, request_id)) {
                            shared.dropped.fetch_add(1, Ordering::Relaxed);
                            log::debug!("Dropping superseded quality request {}", superseded);
                        }
                    }
                    WorkerMessage::ReloadModel => reload = true,
                }
                match rx.try_recv() {
                    Ok(message) => next = Some(message),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => disconnected = true,
                }
            }

            if reload {
                Self::load_model(&loader, &mut classifier, &shared);
            }

            if let Some((window, request_id)) = pending {
                if shared.ended.load(Ordering::Acquire) {
                    shared.publish(request_id, None);
                    break;
                }
                let verdict = Self::assess(&mut extractor, &classifier, &window, &shared);
                shared.publish(request_id, verdict);
            }

            if disconnected {
                break;
            }
        }

        classifier.unload();
        log::info!("Quality worker stopped");
    }

    fn assess(
        extractor: &mut FeatureExtractor,
        classifier: &QualityClassifier,
        window: &[f32],
        shared: &Shared,
    ) -> Option<QualityVerdict> {
        if !classifier.is_ready() {
            return None;
        }
        let features = extractor.extract(window);
        match classifier.assess(&features) {
            Ok(verdict) => {
                shared.assessments.fetch_add(1, Ordering::Relaxed);
                Some(verdict)
            }
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("Quality assessment failed at {} samples: {}", window.len(), e);
                None
            }
        }
    }

    /// Submit the current full window. Returns the request id when the
    /// window is long enough to be assessed.
    ///
    /// A window below the threshold after an assessed one clears the
    /// published verdict back to unknown.
    pub fn on_buffer_grew(&mut self, window: &[f32]) -> Option<u64> {
        if window.len() < self.min_window {
            if self.active {
                log::debug!("Window shrank to {} samples, clearing verdict", window.len());
                self.reset();
            }
            return None;
        }
        let tx = self.tx.as_ref()?;
        let request_id = self.next_request_id;
        let message = WorkerMessage::Assess {
            window: window.to_vec(),
            request_id,
        };
        if tx.send(message).is_err() {
            log::warn!("Quality worker is gone; request {} not submitted", request_id);
            return None;
        }
        self.next_request_id += 1;
        self.active = true;
        Some(request_id)
    }

    /// Drop the current verdict back to unknown for a new buffer.
    pub fn reset(&mut self) {
        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.active = false;
        self.shared.publish(request_id, Some(QualityVerdict::unknown()));
    }

    /// Ask the worker to retry loading the model.
    pub fn reload_model(&self) {
        if let Some(tx) = self.tx.as_ref() {
            *self.shared.status.write() = ModelStatus::Loading;
            if tx.send(WorkerMessage::ReloadModel).is_err() {
                log::error!("Quality worker is gone; model reload not submitted");
                *self.shared.status.write() =
                    ModelStatus::Failed("quality worker stopped".to_string());
            }
        }
    }

    /// Block until the worker has finished with `request_id` (assessed or
    /// superseded) or `timeout` elapses. Returns whether it finished.
    pub fn wait_for(&self, request_id: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut progress = self.shared.progress.lock();
        while progress.completed_id < request_id {
            if self
                .shared
                .progressed
                .wait_until(&mut progress, deadline)
                .timed_out()
            {
                return progress.completed_id >= request_id;
            }
        }
        true
    }

    pub fn latest(&self) -> QualityVerdict {
        self.shared.progress.lock().verdict
    }

    pub fn handle(&self) -> VerdictHandle {
        VerdictHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn model_status(&self) -> ModelStatus {
        self.shared.status.read().clone()
    }

    pub fn assessments(&self) -> u64 {
        self.shared.assessments.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.shared.failures.load(Ordering::Relaxed)
    }

    /// Requests superseded by a newer one before the worker reached them
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    fn teardown(&mut self) {
        self.shared.ended.store(true, Ordering::Release);
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Quality worker panicked");
            }
        }
    }

    /// End the session: later verdicts are discarded and the worker joined.
    pub fn shutdown(mut self) -> QualityVerdict {
        self.teardown();
        self.latest()
    }
}

impl Drop for BackgroundMonitor {
    fn drop(&mut self) {
        self.teardown();
    }
}
