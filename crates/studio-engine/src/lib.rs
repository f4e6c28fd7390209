pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod prompts;
pub mod service;

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Map, Value};
use studio_contracts::archive::{
    ArchiveBackend, ArchiveExporter, ExportError, ExportReport, ZipDirectoryBackend,
};
use studio_contracts::codec;
use studio_contracts::events::EventWriter;
use studio_contracts::history::HistoryStore;
use studio_contracts::models::{AppMode, AspectRatio, ImageKind, NewImage, StoredImage};
use studio_contracts::storage::{JsonFileStore, KeyValueStore};
use thiserror::Error;

pub use config::StudioConfig;
pub use dryrun::DryrunImageService;
pub use gemini::GeminiImageService;
pub use service::{ImageService, InputError, InputImage, RemixOutput, ServiceError};

pub const SERVICE_NAMES: &[&str] = &["auto", "gemini", "dryrun"];

/// Builds the image service named on the command line.
///
/// `auto` uses Gemini when an API key is configured and the dry-run
/// renderer otherwise.
pub fn service_for(name: &str, config: &StudioConfig) -> anyhow::Result<Box<dyn ImageService>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "gemini" => Ok(Box::new(GeminiImageService::new(config)?)),
        "dryrun" => Ok(Box::new(DryrunImageService)),
        "auto" | "" => {
            if config.api_key.is_some() {
                Ok(Box::new(GeminiImageService::new(config)?))
            } else {
                tracing::warn!("no API key configured; using the dry-run image service");
                Ok(Box::new(DryrunImageService))
            }
        }
        other => anyhow::bail!(
            "unknown image service '{other}' (expected one of: {})",
            SERVICE_NAMES.join(", ")
        ),
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Prompt cannot be empty.")]
    EmptyPrompt,
    #[error("No history entry with id '{0}'.")]
    UnknownEntry(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Form data carried over when a history entry is reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReuse {
    Generate {
        prompt: String,
        aspect_ratio: AspectRatio,
    },
    Remix {
        image: InputImage,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemixResult {
    pub entry: StoredImage,
    pub text: String,
}

/// Session controller: mode switching, service calls, and the history.
pub struct StudioEngine<S: KeyValueStore> {
    service: Box<dyn ImageService>,
    history: HistoryStore<S>,
    exporter: ArchiveExporter<Box<dyn ArchiveBackend>>,
    events: EventWriter,
    mode: AppMode,
    pending: Option<PendingReuse>,
}

impl StudioEngine<JsonFileStore> {
    /// Opens the on-disk session under `config.data_dir`.
    pub fn open(config: &StudioConfig, service: Box<dyn ImageService>) -> anyhow::Result<Self> {
        Self::open_with_events(config, service, config.events_path())
    }

    pub fn open_with_events(
        config: &StudioConfig,
        service: Box<dyn ImageService>,
        events_path: impl Into<std::path::PathBuf>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("failed creating {}", config.data_dir.display()))?;
        let session_id = format!("session-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let backend: Box<dyn ArchiveBackend> =
            Box::new(ZipDirectoryBackend::new(config.exports_dir()));
        Ok(Self::new(
            service,
            JsonFileStore::new(config.state_path()),
            ArchiveExporter::new(backend),
            EventWriter::new(events_path, session_id),
        ))
    }
}

impl<S: KeyValueStore> StudioEngine<S> {
    pub fn new(
        service: Box<dyn ImageService>,
        storage: S,
        exporter: ArchiveExporter<Box<dyn ArchiveBackend>>,
        events: EventWriter,
    ) -> Self {
        let history = HistoryStore::load(storage);
        events.record(
            "session_started",
            map_object(json!({
                "service": service.name(),
                "history_len": history.len(),
                "export_available": exporter.is_available(),
            })),
        );
        Self {
            service,
            history,
            exporter,
            events,
            mode: AppMode::default(),
            pending: None,
        }
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    pub fn event_writer(&self) -> EventWriter {
        self.events.clone()
    }

    pub fn set_exporter(&mut self, exporter: ArchiveExporter<Box<dyn ArchiveBackend>>) {
        self.exporter = exporter;
    }

    pub fn select_mode(&mut self, mode: AppMode) {
        if self.mode != mode {
            self.events.record(
                "mode_changed",
                map_object(json!({ "from": self.mode.as_str(), "to": mode.as_str() })),
            );
        }
        self.mode = mode;
    }

    pub fn pending(&self) -> Option<&PendingReuse> {
        self.pending.as_ref()
    }

    /// Hands the pending reuse request to the form that asked for it.
    pub fn take_pending(&mut self) -> Option<PendingReuse> {
        self.pending.take()
    }

    pub fn submit_generate(
        &mut self,
        prompt: &str,
        aspect_ratio: AspectRatio,
    ) -> Result<StoredImage, FlowError> {
        let user_prompt = prompt.trim();
        if user_prompt.is_empty() {
            return Err(FlowError::EmptyPrompt);
        }
        self.events.record(
            "generation_started",
            map_object(json!({
                "kind": ImageKind::Generate.as_str(),
                "prompt": user_prompt,
                "aspect_ratio": aspect_ratio.as_str(),
            })),
        );
        let image_data_url = self
            .service
            .generate(&prompts::generate_prompt(user_prompt), aspect_ratio)
            .map_err(|err| self.record_failure(ImageKind::Generate, err))?;
        let entry = self
            .history
            .add(NewImage::generated(image_data_url, user_prompt, aspect_ratio));
        self.record_created(&entry);
        Ok(entry)
    }

    pub fn submit_remix(
        &mut self,
        prompt: &str,
        image: &InputImage,
    ) -> Result<RemixResult, FlowError> {
        let user_prompt = prompt.trim();
        if user_prompt.is_empty() {
            return Err(FlowError::EmptyPrompt);
        }
        self.events.record(
            "generation_started",
            map_object(json!({
                "kind": ImageKind::Remix.as_str(),
                "prompt": user_prompt,
                "input_image": image.name(),
                "input_bytes": image.bytes().len(),
            })),
        );
        let output = self
            .service
            .remix(&prompts::remix_prompt(user_prompt), image)
            .map_err(|err| self.record_failure(ImageKind::Remix, err))?;
        let entry = self
            .history
            .add(NewImage::remixed(output.image_data_url, user_prompt));
        self.record_created(&entry);
        Ok(RemixResult {
            entry,
            text: output.text,
        })
    }

    /// Switches to the form matching the entry's kind and queues its data.
    pub fn reuse(&mut self, id: &str) -> Result<PendingReuse, FlowError> {
        let entry = self
            .history
            .get(id)
            .cloned()
            .ok_or_else(|| FlowError::UnknownEntry(id.to_string()))?;
        let (mode, pending) = match entry.kind {
            ImageKind::Generate => (
                AppMode::Generate,
                PendingReuse::Generate {
                    prompt: entry.prompt.clone(),
                    aspect_ratio: entry.aspect_ratio.unwrap_or_default(),
                },
            ),
            ImageKind::Remix => {
                let blob = codec::decode(&entry.image_data_url).map_err(InputError::from)?;
                let name = format!(
                    "remix-source-{}.{}",
                    entry.id,
                    codec::extension_for_mime(&blob.mime_type)
                );
                let image = InputImage::new(name, blob.mime_type, blob.bytes)?;
                (AppMode::Remix, PendingReuse::Remix { image })
            }
        };
        self.select_mode(mode);
        self.pending = Some(pending.clone());
        self.events.record(
            "history_reused",
            map_object(json!({ "id": entry.id, "kind": entry.kind.as_str() })),
        );
        Ok(pending)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let removed = self.history.remove(id);
        self.events.record(
            "history_removed",
            map_object(json!({ "id": id, "removed": removed })),
        );
        removed
    }

    pub fn clear_history(&mut self) {
        let cleared = self.history.len();
        self.history.clear();
        self.events
            .record("history_cleared", map_object(json!({ "cleared": cleared })));
    }

    /// Exports the selected entries in history order.
    pub fn export(&self, ids: &[String]) -> Result<ExportReport, FlowError> {
        self.export_entries(self.history.select(ids))
    }

    pub fn export_all(&self) -> Result<ExportReport, FlowError> {
        self.export_entries(self.history.entries().to_vec())
    }

    fn export_entries(&self, entries: Vec<StoredImage>) -> Result<ExportReport, FlowError> {
        match self.exporter.export(&entries) {
            Ok(report) => {
                self.events.record(
                    "archive_exported",
                    map_object(json!({
                        "path": report.path.to_string_lossy().to_string(),
                        "images": report.file_names.len(),
                    })),
                );
                Ok(report)
            }
            Err(err) => {
                self.events.record(
                    "archive_failed",
                    map_object(json!({ "error": err.to_string(), "images": entries.len() })),
                );
                Err(err.into())
            }
        }
    }

    fn record_created(&self, entry: &StoredImage) {
        let mut payload = map_object(json!({
            "id": entry.id,
            "kind": entry.kind.as_str(),
            "prompt": entry.prompt,
            "history_len": self.history.len(),
        }));
        if let Some(aspect_ratio) = entry.aspect_ratio {
            payload.insert(
                "aspect_ratio".to_string(),
                Value::String(aspect_ratio.to_string()),
            );
        }
        if let Some(warning) = self.history.persistence_warning() {
            payload.insert(
                "persistence_warning".to_string(),
                Value::String(warning.to_string()),
            );
        }
        self.events.record("image_created", payload);
    }

    fn record_failure(&self, kind: ImageKind, err: ServiceError) -> FlowError {
        let category = match &err {
            ServiceError::Service(_) => "service_error",
            ServiceError::EmptyResult(_) => "empty_result",
            ServiceError::BlockedRequest { .. } => "blocked_request",
        };
        tracing::warn!(kind = kind.as_str(), category, error = %err, "image request failed");
        self.events.record(
            "generation_failed",
            map_object(json!({
                "kind": kind.as_str(),
                "category": category,
                "error": err.to_string(),
            })),
        );
        FlowError::Service(err)
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
