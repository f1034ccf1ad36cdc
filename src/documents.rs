//! Documents attached to a project or a legal request.
//!
//! An upload publishes its progress on a `watch` channel. In measured mode
//! the percentage follows the bytes streamed to the server; in simulated
//! mode a timer ramps it up and the value is flagged as indicative. Either
//! way it stops at [`PROGRESS_CEILING`] until the server has answered.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::DocumentApi;
use crate::api::types::{first_of, optional_id_string, required};
use crate::chat::{ChatSession, ThreadOwner};
use crate::config::{PROGRESS_CEILING, ProgressMode, UploadConfig};
use crate::error::{ApiError, UploadError};

/// Entity a document collection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentOwner {
    Project(String),
    LegalRequest(String),
}

impl DocumentOwner {
    /// Standalone conversations have no document collection.
    pub fn for_thread(owner: &ThreadOwner) -> Option<Self> {
        match owner {
            ThreadOwner::Project(id) => Some(Self::Project(id.clone())),
            ThreadOwner::LegalRequest(id) => Some(Self::LegalRequest(id.clone())),
            ThreadOwner::Standalone => None,
        }
    }

    pub fn collection_path(&self) -> &'static str {
        match self {
            Self::Project(_) => "/documents",
            Self::LegalRequest(_) => "/legal-request-documents",
        }
    }

    pub fn owner_field(&self) -> &'static str {
        match self {
            Self::Project(_) => "projectId",
            Self::LegalRequest(_) => "legalRequestId",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Project(id) | Self::LegalRequest(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDocument")]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Both collections return the same document under several key spellings,
/// sometimes all at once.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default, deserialize_with = "optional_id_string")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "optional_id_string")]
    object_id: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    file_size: Option<u64>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    uploaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawDocument> for Document {
    type Error = String;

    fn try_from(raw: RawDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(first_of([raw.id, raw.object_id]), "id")?,
            file_name: required(
                first_of([raw.file_name, raw.original_name, raw.name]),
                "fileName",
            )?,
            file_type: first_of([raw.file_type, raw.mime_type]).unwrap_or_default(),
            file_size: first_of([raw.file_size, raw.size]).unwrap_or_default(),
            uploaded_at: first_of([raw.uploaded_at, raw.created_at]),
        })
    }
}

/// Called with `(bytes_sent, total_bytes)` as the body is streamed.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One file ready to go to the backend.
pub struct UploadPayload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Bytes,
    pub on_progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPayload")
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub percent: u8,
    /// The value comes from a timer rather than from bytes sent.
    pub indicative: bool,
}

/// Percentage of a streamed body, held below the ceiling.
pub fn measured_percent(sent: u64, total: u64) -> u8 {
    let ceiling = u64::from(PROGRESS_CEILING);
    if total == 0 {
        return PROGRESS_CEILING;
    }
    (sent.saturating_mul(ceiling) / total).min(ceiling) as u8
}

/// Map a failed upload to the error shown to the user. Backend messages
/// mentioning a PDF get the corrupt-file explanation.
pub fn classify_upload_error(err: ApiError) -> UploadError {
    let message = err.user_message();
    if message.to_uppercase().contains("PDF") {
        UploadError::CorruptPdf(message)
    } else {
        UploadError::Api(err)
    }
}

/// Keep only a plain file name, so a download can never escape `dest_dir`.
pub fn sanitize_file_name(name: &str, document_id: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        format!("document-{document_id}")
    } else {
        cleaned
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Documents of one owner, plus the upload in progress.
pub struct DocumentPanel {
    api: Arc<dyn DocumentApi>,
    owner: DocumentOwner,
    config: UploadConfig,
    documents: Mutex<Vec<Document>>,
    progress: Arc<watch::Sender<UploadProgress>>,
}

impl std::fmt::Debug for DocumentPanel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPanel")
            .field("owner", &self.owner)
            .field("progress", &*self.progress.borrow())
            .finish_non_exhaustive()
    }
}

impl DocumentPanel {
    pub fn new(api: Arc<dyn DocumentApi>, owner: DocumentOwner, config: UploadConfig) -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self {
            api,
            owner,
            config,
            documents: Mutex::new(Vec::new()),
            progress: Arc::new(progress),
        }
    }

    fn list(&self) -> MutexGuard<'_, Vec<Document>> {
        self.documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn owner(&self) -> &DocumentOwner {
        &self.owner
    }

    pub fn documents(&self) -> Vec<Document> {
        self.list().clone()
    }

    pub fn progress(&self) -> UploadProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    pub async fn refresh(&self) -> Result<Vec<Document>, UploadError> {
        let documents = self.api.list_documents(&self.owner).await?;
        tracing::debug!(
            "Loaded {} documents for {} {}",
            documents.len(),
            self.owner.owner_field(),
            self.owner.id()
        );
        *self.list() = documents.clone();
        Ok(documents)
    }

    /// Upload `file`, then announce it in `chat` if one is open.
    pub async fn upload(
        &self,
        file: Option<&Path>,
        chat: Option<&ChatSession>,
    ) -> Result<Document, UploadError> {
        let path = file.ok_or(UploadError::NoFileSelected)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Read {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let mime = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        self.progress.send_replace(UploadProgress {
            percent: 0,
            indicative: self.config.progress == ProgressMode::Simulated,
        });

        let (on_progress, ramp) = match self.config.progress {
            ProgressMode::Measured => {
                let progress = Arc::clone(&self.progress);
                let callback: ProgressCallback = Arc::new(move |sent, total| {
                    progress.send_replace(UploadProgress {
                        percent: measured_percent(sent, total),
                        indicative: false,
                    });
                });
                (Some(callback), None)
            }
            ProgressMode::Simulated => (None, Some(self.start_ramp())),
        };

        tracing::info!(
            "Uploading {} ({} bytes) to {} {}",
            file_name,
            bytes.len(),
            self.owner.owner_field(),
            self.owner.id()
        );
        let result = self
            .api
            .upload_document(
                &self.owner,
                UploadPayload {
                    file_name,
                    mime,
                    bytes: Bytes::from(bytes),
                    on_progress,
                },
            )
            .await;
        drop(ramp);

        match result {
            Ok(document) => {
                self.progress.send_replace(UploadProgress {
                    percent: 100,
                    indicative: false,
                });
                self.list().insert(0, document.clone());
                if let Some(chat) = chat {
                    chat.push_system_message(format!(
                        "Document « {} » téléversé avec succès.",
                        document.file_name
                    ));
                }
                Ok(document)
            }
            Err(e) => {
                tracing::warn!("Upload to {} failed: {}", self.owner.collection_path(), e);
                self.progress.send_replace(UploadProgress::default());
                Err(classify_upload_error(e))
            }
        }
    }

    fn start_ramp(&self) -> AbortOnDrop {
        let progress = Arc::clone(&self.progress);
        let tick = self.config.tick;
        let step = self.config.step_percent;
        AbortOnDrop(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            let mut percent = 0u8;
            while percent < PROGRESS_CEILING {
                interval.tick().await;
                percent = percent.saturating_add(step).min(PROGRESS_CEILING);
                progress.send_replace(UploadProgress {
                    percent,
                    indicative: true,
                });
            }
        }))
    }

    /// Save a document into `dest_dir` under its own file name.
    pub async fn download(&self, document_id: &str, dest_dir: &Path) -> Result<PathBuf, UploadError> {
        let known_name = self
            .list()
            .iter()
            .find(|d| d.id == document_id)
            .map(|d| d.file_name.clone());
        let bytes = self.api.download_document(&self.owner, document_id).await?;

        let name = sanitize_file_name(known_name.as_deref().unwrap_or_default(), document_id);
        let target = dest_dir.join(name);
        tokio::fs::write(&target, &bytes)
            .await
            .map_err(|e| UploadError::Write {
                path: target.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!("Saved document {} to {:?}", document_id, target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::api::ChatApi;
    use crate::api::types::{AskResponse, MessageRecord, ThreadRecord};
    use crate::chat::ConversationThread;
    use crate::workflow::WorkflowRole;

    #[derive(Default)]
    struct FakeDocuments {
        stored: Vec<Document>,
        reject_with: Option<ApiError>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
        uploaded: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl DocumentApi for FakeDocuments {
        async fn list_documents(&self, _owner: &DocumentOwner) -> Result<Vec<Document>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored.clone())
        }

        async fn upload_document(
            &self,
            _owner: &DocumentOwner,
            payload: UploadPayload,
        ) -> Result<Document, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let total = payload.bytes.len() as u64;
            if let Some(callback) = &payload.on_progress {
                callback(total / 2, total);
                callback(total, total);
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(err) = &self.reject_with {
                return Err(err.clone());
            }
            self.uploaded.lock().expect("lock").push((
                payload.file_name.clone(),
                payload.mime.clone(),
                payload.bytes.len(),
            ));
            Ok(Document {
                id: "d9".to_string(),
                file_name: payload.file_name,
                file_type: payload.mime,
                file_size: total,
                uploaded_at: None,
            })
        }

        async fn download_document(
            &self,
            _owner: &DocumentOwner,
            _document_id: &str,
        ) -> Result<Bytes, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"%PDF-1.7"))
        }
    }

    struct IdleChat;

    #[async_trait]
    impl ChatApi for IdleChat {
        async fn list_threads(&self, _owner: &ThreadOwner) -> Result<Vec<ThreadRecord>, ApiError> {
            Ok(Vec::new())
        }

        async fn create_thread(
            &self,
            _owner: &ThreadOwner,
            _title: &str,
        ) -> Result<ThreadRecord, ApiError> {
            Err(ApiError::InvalidRequest("unused".to_string()))
        }

        async fn list_messages(&self, _thread_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
            Ok(Vec::new())
        }

        async fn ask(&self, _thread_id: &str, _question: &str) -> Result<AskResponse, ApiError> {
            Err(ApiError::InvalidRequest("unused".to_string()))
        }

        async fn edit_message(
            &self,
            _thread_id: &str,
            _message_id: &str,
            _content: &str,
        ) -> Result<MessageRecord, ApiError> {
            Err(ApiError::InvalidRequest("unused".to_string()))
        }

        async fn delete_message(&self, _thread_id: &str, _message_id: &str) -> Result<(), ApiError> {
            Err(ApiError::InvalidRequest("unused".to_string()))
        }
    }

    fn chat() -> ChatSession {
        ChatSession::new(
            Arc::new(IdleChat),
            ConversationThread {
                id: "t1".to_string(),
                owner: ThreadOwner::Project("42".to_string()),
                title: "Dossier #42".to_string(),
                last_suggested_questions: Vec::new(),
            },
            Vec::new(),
            WorkflowRole::Client,
            5,
        )
    }

    fn existing(id: &str, name: &str) -> Document {
        Document {
            id: id.to_string(),
            file_name: name.to_string(),
            file_type: "application/pdf".to_string(),
            file_size: 10,
            uploaded_at: None,
        }
    }

    fn panel(api: FakeDocuments, config: UploadConfig) -> (DocumentPanel, Arc<FakeDocuments>) {
        let api = Arc::new(api);
        let panel = DocumentPanel::new(
            api.clone(),
            DocumentOwner::Project("42".to_string()),
            config,
        );
        (panel, api)
    }

    #[tokio::test]
    async fn upload_without_file_touches_nothing() {
        let (panel, api) = panel(FakeDocuments::default(), UploadConfig::default());
        let err = assert_err!(panel.upload(None, None).await);
        assert!(matches!(err, UploadError::NoFileSelected));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        assert_eq!(panel.progress(), UploadProgress::default());
    }

    #[tokio::test]
    async fn successful_upload_prepends_and_announces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bail.pdf");
        std::fs::write(&path, vec![7u8; 1000]).expect("write");

        let (panel, api) = panel(
            FakeDocuments {
                stored: vec![existing("d1", "ancien.pdf")],
                ..FakeDocuments::default()
            },
            UploadConfig::default(),
        );
        assert_ok!(panel.refresh().await);
        let chat = chat();

        let document = assert_ok!(panel.upload(Some(&path), Some(&chat)).await);
        assert_eq!(document.file_name, "bail.pdf");
        assert_eq!(
            *api.uploaded.lock().expect("lock"),
            vec![("bail.pdf".to_string(), "application/pdf".to_string(), 1000)]
        );

        let ids: Vec<String> = panel.documents().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["d9".to_string(), "d1".to_string()]);
        assert_eq!(
            panel.progress(),
            UploadProgress {
                percent: 100,
                indicative: false
            }
        );

        let notice = chat.messages().pop().expect("system message");
        assert!(notice.is_system);
        assert!(notice.content.contains("bail.pdf"));
    }

    #[tokio::test]
    async fn pdf_failures_get_friendly_message() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"not really a pdf").expect("write");

        let (panel, _api) = panel(
            FakeDocuments {
                reject_with: Some(ApiError::Status {
                    status: 422,
                    message: "Invalid PDF structure".to_string(),
                }),
                ..FakeDocuments::default()
            },
            UploadConfig::default(),
        );
        let chat = chat();

        let err = assert_err!(panel.upload(Some(&path), Some(&chat)).await);
        assert!(matches!(err, UploadError::CorruptPdf(_)));
        assert!(err.user_message().contains("corrompu"));
        assert!(panel.documents().is_empty());
        assert!(chat.messages().is_empty());
        assert_eq!(panel.progress().percent, 0);
    }

    #[test]
    fn other_failures_keep_backend_message() {
        let err = classify_upload_error(ApiError::Status {
            status: 413,
            message: "Fichier trop volumineux".to_string(),
        });
        assert_eq!(err.user_message(), "Fichier trop volumineux");
    }

    #[tokio::test]
    async fn simulated_ramp_is_indicative_and_capped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("contrat.docx");
        std::fs::write(&path, b"contenu").expect("write");

        let gate = Arc::new(Notify::new());
        let (panel, _api) = panel(
            FakeDocuments {
                gate: Some(gate.clone()),
                ..FakeDocuments::default()
            },
            UploadConfig {
                progress: ProgressMode::Simulated,
                tick: Duration::from_millis(5),
                step_percent: 40,
            },
        );
        let panel = Arc::new(panel);
        let mut progress = panel.subscribe_progress();

        let uploader = Arc::clone(&panel);
        let upload = tokio::spawn(async move { uploader.upload(Some(&path), None).await });

        let ramped = *tokio::time::timeout(
            Duration::from_secs(5),
            progress.wait_for(|p| p.percent == PROGRESS_CEILING),
        )
        .await
        .expect("ramp reaches the ceiling")
        .expect("sender alive");
        assert!(ramped.indicative);

        gate.notify_one();
        assert_ok!(upload.await.expect("join"));
        assert_eq!(
            panel.progress(),
            UploadProgress {
                percent: 100,
                indicative: false
            }
        );
    }

    #[test]
    fn measured_percent_holds_below_ceiling() {
        assert_eq!(measured_percent(0, 1000), 0);
        assert_eq!(measured_percent(500, 1000), 47);
        assert_eq!(measured_percent(1000, 1000), PROGRESS_CEILING);
        assert_eq!(measured_percent(5000, 1000), PROGRESS_CEILING);
        assert_eq!(measured_percent(0, 0), PROGRESS_CEILING);
    }

    #[tokio::test]
    async fn download_writes_sanitized_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (panel, _api) = panel(
            FakeDocuments {
                stored: vec![existing("d1", "../../etc/conclusions.pdf")],
                ..FakeDocuments::default()
            },
            UploadConfig::default(),
        );
        assert_ok!(panel.refresh().await);

        let saved = assert_ok!(panel.download("d1", dir.path()).await);
        assert_eq!(saved, dir.path().join("conclusions.pdf"));
        assert_eq!(std::fs::read(&saved).expect("read"), b"%PDF-1.7");

        let unknown = assert_ok!(panel.download("d2", dir.path()).await);
        assert_eq!(unknown, dir.path().join("document-d2"));
    }

    #[test]
    fn document_accepts_backend_aliases() {
        let doc: Document = serde_json::from_str(
            r#"{"_id": 5, "originalName": "pv.pdf", "mimeType": "application/pdf",
                "size": 2048, "createdAt": "2026-02-01T08:00:00Z"}"#,
        )
        .expect("document");
        assert_eq!(doc.id, "5");
        assert_eq!(doc.file_name, "pv.pdf");
        assert_eq!(doc.file_size, 2048);
        assert!(doc.uploaded_at.is_some());
    }

    #[test]
    fn document_with_duplicate_spellings_prefers_canonical_keys() {
        let doc: Document = serde_json::from_str(
            r#"{"_id": "abc", "id": "abc", "fileName": "bail-2026.pdf",
                "originalName": "Bail signé.pdf", "fileType": "application/pdf",
                "mimeType": "application/octet-stream", "fileSize": 10, "size": 12,
                "uploadedAt": "2026-02-01T08:00:00Z", "createdAt": "2026-01-01T08:00:00Z"}"#,
        )
        .expect("document with every spelling");
        assert_eq!(doc.id, "abc");
        assert_eq!(doc.file_name, "bail-2026.pdf");
        assert_eq!(doc.file_type, "application/pdf");
        assert_eq!(doc.file_size, 10);
        assert_eq!(
            doc.uploaded_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2026-02-01T08:00:00+00:00")
        );

        assert!(serde_json::from_str::<Document>(r#"{"id": "x"}"#).is_err());
    }
}
