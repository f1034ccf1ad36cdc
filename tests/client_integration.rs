//! End-to-end tests against a fake platform backend.
//!
//! Each test starts a real Axum server on a random port that mimics the
//! REST API (auth, chats, AI replies, documents) and drives the public
//! client API through it:
//! - login, profile restore, forced logout on 401
//! - conversation find-or-create and the message exchange loop
//! - multipart document upload and download
//! - role-based access to the chat workflow

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use url::Url;

use lexdesk::app::App;
use lexdesk::chat::ConversationTarget;
use lexdesk::config::{ApiConfig, ChatConfig, Config, SessionConfig, UploadConfig};
use lexdesk::documents::DocumentOwner;
use lexdesk::error::{ApiError, ChatError, UploadError};
use lexdesk::guard::{GuardState, Route};
use lexdesk::notify::{NotificationLevel, RecordingNotifier};
use lexdesk::session::{MemoryTokenStore, Role, TokenStore};

const PASSWORD: &str = "correct-horse";

type ApiResult<T = Json<Value>> = Result<T, (StatusCode, Json<Value>)>;

#[derive(Default)]
struct Backend {
    revoked: AtomicBool,
    me_calls: AtomicUsize,
    threads_created: AtomicUsize,
    next_id: AtomicUsize,
    issued: Mutex<HashMap<String, Value>>,
    threads: Mutex<Vec<Value>>,
    messages: Mutex<Vec<(String, Value)>>,
    documents: Mutex<Vec<(Value, Vec<u8>)>>,
}

impl Backend {
    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn id_of(value: &Value) -> String {
    match value.get("id").or_else(|| value.get("_id")) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn fail(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "message": message })))
}

fn jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = json!({ "exp": exp, "jti": uuid::Uuid::new_v4().to_string() });
    let payload = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

fn current_user(state: &Backend, headers: &HeaderMap) -> ApiResult<Value> {
    if state.revoked.load(Ordering::SeqCst) {
        return Err(fail(StatusCode::UNAUTHORIZED, "jwt expired"));
    }
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "missing token"))?;
    state
        .issued
        .lock()
        .expect("lock")
        .get(token)
        .cloned()
        .ok_or_else(|| fail(StatusCode::UNAUTHORIZED, "unknown token"))
}

async fn login(State(state): State<Arc<Backend>>, Json(body): Json<Value>) -> ApiResult {
    if body["password"] != PASSWORD {
        return Err(fail(StatusCode::BAD_REQUEST, "Identifiants invalides"));
    }
    let email = body["email"].as_str().unwrap_or_default();
    let role = match email.split('@').next() {
        Some("manager") => "manager",
        Some("maitre") => "lawyer",
        _ => "client",
    };
    let user = json!({
        "id": 42,
        "email": email,
        "firstName": "Camille",
        "lastName": "Durand",
        "role": role,
    });
    let token = jwt(chrono::Utc::now().timestamp() + 3600);
    state
        .issued
        .lock()
        .expect("lock")
        .insert(token.clone(), user.clone());
    Ok(Json(json!({ "token": token, "user": user })))
}

async fn me(State(state): State<Arc<Backend>>, headers: HeaderMap) -> ApiResult {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    Ok(Json(current_user(&state, &headers)?))
}

async fn list_chats(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    current_user(&state, &headers)?;
    let project = query.get("projectId").cloned().unwrap_or_default();
    let threads: Vec<Value> = state
        .threads
        .lock()
        .expect("lock")
        .iter()
        .filter(|t| t["projectId"] == project.as_str())
        .cloned()
        .collect();
    Ok(Json(Value::Array(threads)))
}

async fn create_chat(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    current_user(&state, &headers)?;
    state.threads_created.fetch_add(1, Ordering::SeqCst);
    let thread = json!({
        "id": state.next_id(),
        "title": body["title"],
        "projectId": body["projectId"],
        "lastSuggestedQuestions": null,
    });
    state.threads.lock().expect("lock").push(thread.clone());
    Ok(Json(thread))
}

async fn list_messages(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> ApiResult {
    current_user(&state, &headers)?;
    let messages: Vec<Value> = state
        .messages
        .lock()
        .expect("lock")
        .iter()
        .filter(|(chat, _)| *chat == chat_id)
        .map(|(_, m)| m.clone())
        .collect();
    Ok(Json(json!({ "data": messages })))
}

async fn ask(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    current_user(&state, &headers)?;
    let chat_id = body["chatId"].as_str().unwrap_or_default().to_string();
    let question = body["question"].as_str().unwrap_or_default();
    let now = chrono::Utc::now().to_rfc3339();
    let user_message = json!({
        "id": state.next_id(),
        "sender": "user",
        "content": question,
        "createdAt": now,
    });
    let ai_message = json!({
        "_id": state.next_id().to_string(),
        "sender": "ai",
        "content": format!("**Réponse** à : {question}"),
        "timestamp": now,
    });
    let mut messages = state.messages.lock().expect("lock");
    messages.push((chat_id.clone(), user_message.clone()));
    messages.push((chat_id, ai_message.clone()));
    Ok(Json(json!({
        "userMessage": user_message,
        "aiMessage": ai_message,
        "suggestedQuestions": ["Quels sont les délais ?", "Et ensuite ?"],
    })))
}

async fn edit_message(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ApiResult {
    current_user(&state, &headers)?;
    let content = body["content"].as_str().unwrap_or_default();
    if content.contains("refus") {
        return Err(fail(StatusCode::INTERNAL_SERVER_ERROR, "Erreur interne"));
    }
    let mut messages = state.messages.lock().expect("lock");
    let (_, message) = messages
        .iter_mut()
        .find(|(chat, m)| *chat == chat_id && id_of(m) == message_id)
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "Message introuvable"))?;
    message["content"] = json!(content);
    message["updatedAt"] = json!(chrono::Utc::now().to_rfc3339());
    Ok(Json(message.clone()))
}

async fn delete_message(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    current_user(&state, &headers)?;
    state
        .messages
        .lock()
        .expect("lock")
        .retain(|(chat, m)| !(*chat == chat_id && id_of(m) == message_id));
    Ok(StatusCode::NO_CONTENT)
}

async fn list_documents(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult {
    current_user(&state, &headers)?;
    let project = query.get("projectId").cloned().unwrap_or_default();
    let documents: Vec<Value> = state
        .documents
        .lock()
        .expect("lock")
        .iter()
        .filter(|(d, _)| d["projectId"] == project.as_str())
        .map(|(d, _)| d.clone())
        .collect();
    Ok(Json(Value::Array(documents)))
}

async fn upload_document(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult {
    current_user(&state, &headers)?;
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        fail(StatusCode::BAD_REQUEST, &e.to_string())
    };

    let mut file = None;
    let mut project = None;
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(bad_request)?;
                file = Some((file_name, mime, bytes.to_vec()));
            }
            "projectId" => project = Some(field.text().await.map_err(bad_request)?),
            _ => {}
        }
    }

    let (Some((file_name, mime, bytes)), Some(project)) = (file, project) else {
        return Err(fail(StatusCode::BAD_REQUEST, "Fichier ou dossier manquant"));
    };
    if file_name.contains("corrompu") {
        return Err(fail(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Unable to parse PDF: invalid xref table",
        ));
    }
    let document = json!({
        "id": state.next_id(),
        "fileName": file_name,
        "fileType": mime,
        "fileSize": bytes.len(),
        "uploadedAt": chrono::Utc::now().to_rfc3339(),
        "projectId": project,
    });
    state
        .documents
        .lock()
        .expect("lock")
        .push((document.clone(), bytes));
    Ok(Json(document))
}

async fn download_document(
    State(state): State<Arc<Backend>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<u8>> {
    current_user(&state, &headers)?;
    state
        .documents
        .lock()
        .expect("lock")
        .iter()
        .find(|(d, _)| id_of(d) == id)
        .map(|(_, bytes)| bytes.clone())
        .ok_or_else(|| fail(StatusCode::NOT_FOUND, "Document introuvable"))
}

/// Start the fake backend on a random port.
async fn start_backend() -> (SocketAddr, Arc<Backend>) {
    let state = Arc::new(Backend::default());
    let router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/{chat_id}/messages", get(list_messages))
        .route(
            "/api/chats/{chat_id}/messages/{message_id}",
            put(edit_message).delete(delete_message),
        )
        .route("/api/ai/ask", post(ask))
        .route("/api/documents", get(list_documents).post(upload_document))
        .route("/api/documents/{id}/download", get(download_document))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    (addr, state)
}

fn config_for(addr: SocketAddr) -> Config {
    let base_url = Url::parse(&format!("http://{addr}/api")).expect("base url");
    let mut api = ApiConfig::new(base_url);
    api.timeout = Duration::from_secs(5);
    Config {
        api,
        session: SessionConfig {
            token_path: std::path::PathBuf::from("unused"),
        },
        chat: ChatConfig::default(),
        upload: UploadConfig::default(),
    }
}

struct Harness {
    addr: SocketAddr,
    app: App,
    backend: Arc<Backend>,
    tokens: Arc<MemoryTokenStore>,
    notifier: Arc<RecordingNotifier>,
}

async fn harness_with(tokens: MemoryTokenStore) -> Harness {
    let (addr, backend) = start_backend().await;
    let tokens = Arc::new(tokens);
    let notifier = Arc::new(RecordingNotifier::new());
    let app = App::new(config_for(addr), tokens.clone(), notifier.clone()).expect("app");
    Harness {
        addr,
        app,
        backend,
        tokens,
        notifier,
    }
}

async fn signed_in(email: &str) -> Harness {
    let h = harness_with(MemoryTokenStore::new()).await;
    h.app.session().restore().await;
    h.app
        .session()
        .login(email, PASSWORD)
        .await
        .expect("login");
    h
}

#[tokio::test]
async fn login_restores_and_rejects_bad_credentials() {
    let h = harness_with(MemoryTokenStore::new()).await;
    assert!(h.app.session().restore().await.is_none());

    let err = h
        .app
        .session()
        .login("camille@example.fr", "wrong")
        .await
        .expect_err("bad password");
    assert_eq!(err.user_message(), "Identifiants invalides");
    assert!(!h.app.session().is_authenticated());
    // A failed login is not a session expiry.
    assert!(
        h.notifier
            .take()
            .iter()
            .all(|n| n.level == NotificationLevel::Error)
    );

    let session = h
        .app
        .session()
        .login("camille@example.fr", PASSWORD)
        .await
        .expect("login");
    assert_eq!(session.role, Role::Client);
    assert!(h.app.session().is_client());
    let stored = h.tokens.load().expect("load").expect("token persisted");

    // A second client instance holding the same token restores the session.
    let second = App::new(
        config_for(h.addr),
        Arc::new(MemoryTokenStore::with_token(stored.expose_secret())),
        Arc::new(RecordingNotifier::new()),
    )
    .expect("second app");
    let restored = second.session().restore().await.expect("restored");
    assert_eq!(restored.email, "camille@example.fr");
    assert_eq!(h.backend.me_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_stored_token_never_reaches_the_backend() {
    let expired = jwt(chrono::Utc::now().timestamp() - 10);
    let h = harness_with(MemoryTokenStore::with_token(expired)).await;

    assert!(h.app.session().restore().await.is_none());
    assert!(!h.app.session().is_authenticated());
    assert_eq!(h.backend.me_calls.load(Ordering::SeqCst), 0);
    assert!(h.tokens.load().expect("load").is_none());
}

#[tokio::test]
async fn chat_round_trip_with_find_or_create() {
    let h = signed_in("camille@example.fr").await;
    let target = ConversationTarget::project("42", Some("Acme c/ Durand".to_string()));

    let chat = h.app.open_chat(&target).await.expect("open chat");
    assert_eq!(chat.thread().title, "Dossier Acme c/ Durand");
    assert!(chat.messages().is_empty());
    assert!(!chat.suggestions().is_empty());

    assert_eq!(chat.send("   ").await.expect("blank"), None);
    let reply = chat
        .send("Quels sont mes droits ?")
        .await
        .expect("send")
        .expect("reply");
    assert!(reply.content.contains("Quels sont mes droits ?"));
    assert_eq!(
        chat.suggestions(),
        vec![
            "Quels sont les délais ?".to_string(),
            "Et ensuite ?".to_string()
        ]
    );

    let messages = chat.messages();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|m| !m.is_local()));
    let question_id = messages[0].id.clone();

    let before = chat.messages();
    let err = chat
        .edit(&question_id, "Version refusée")
        .await
        .expect_err("backend refuses");
    assert!(matches!(err, ChatError::Api(ApiError::Status { status: 500, .. })));
    assert_eq!(chat.messages(), before);

    let saved = chat
        .edit(&question_id, "Quels sont mes droits exacts ?")
        .await
        .expect("edit");
    assert!(saved.updated_at.is_some());

    chat.delete(&messages[1].id).await.expect("delete");
    chat.reload().await.expect("reload");
    assert_eq!(chat.messages().len(), 1);
    assert_eq!(chat.messages()[0].content, "Quels sont mes droits exacts ?");
    chat.close();

    let again = h.app.open_chat(&target).await.expect("reopen");
    assert_eq!(again.thread().id, chat.thread().id);
    assert_eq!(h.backend.threads_created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn document_upload_download_and_pdf_errors() {
    let h = signed_in("camille@example.fr").await;
    let chat = h
        .app
        .open_chat(&ConversationTarget::project("7", None))
        .await
        .expect("open chat");
    assert_eq!(chat.thread().title, "Dossier #7");

    let panel = h.app.documents(DocumentOwner::Project("7".to_string()));
    assert!(panel.refresh().await.expect("list").is_empty());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("assignation.pdf");
    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &content).expect("write");

    let document = panel
        .upload(Some(&path), Some(&chat))
        .await
        .expect("upload");
    assert_eq!(document.file_name, "assignation.pdf");
    assert_eq!(document.file_type, "application/pdf");
    assert_eq!(document.file_size, content.len() as u64);
    assert_eq!(panel.progress().percent, 100);
    assert_eq!(panel.documents()[0].id, document.id);
    assert!(chat.messages().last().expect("notice").is_system);

    let out = tempfile::tempdir().expect("tempdir");
    let saved = panel
        .download(&document.id, out.path())
        .await
        .expect("download");
    assert_eq!(saved, out.path().join("assignation.pdf"));
    assert_eq!(std::fs::read(&saved).expect("read"), content);

    let broken = dir.path().join("corrompu.pdf");
    std::fs::write(&broken, b"%PDF-garbage").expect("write");
    let err = panel
        .upload(Some(&broken), Some(&chat))
        .await
        .expect_err("rejected");
    assert!(matches!(err, UploadError::CorruptPdf(_)));
    assert_eq!(panel.documents().len(), 1);

    assert!(matches!(
        panel.upload(None, Some(&chat)).await,
        Err(UploadError::NoFileSelected)
    ));
}

#[tokio::test]
async fn revoked_token_forces_logout_from_any_call() {
    let h = signed_in("camille@example.fr").await;
    let chat = h
        .app
        .open_chat(&ConversationTarget::project("3", None))
        .await
        .expect("open chat");
    h.notifier.take();

    h.backend.revoked.store(true, Ordering::SeqCst);
    let err = chat.reload().await.expect_err("revoked");
    assert!(matches!(err, ChatError::Api(ApiError::Unauthorized)));

    assert!(!h.app.session().is_authenticated());
    assert!(h.tokens.load().expect("load").is_none());
    let seen = h.notifier.take();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].level, NotificationLevel::Warning);
}

#[tokio::test]
async fn admin_and_anonymous_users_cannot_open_chat() {
    let anonymous = harness_with(MemoryTokenStore::new()).await;
    anonymous.app.session().restore().await;
    let err = anonymous
        .app
        .open_chat(&ConversationTarget::standalone())
        .await
        .expect_err("anonymous");
    assert!(matches!(
        err,
        ChatError::Denied(GuardState::Unauthenticated {
            redirect: Route::Login
        })
    ));

    let manager = signed_in("manager@example.fr").await;
    assert!(manager.app.session().is_admin());
    let err = manager
        .app
        .open_chat(&ConversationTarget::project("1", None))
        .await
        .expect_err("manager");
    assert!(matches!(
        err,
        ChatError::Denied(GuardState::Unauthorized {
            redirect: Route::AdminDashboard
        })
    ));

    let lawyer = signed_in("maitre@example.fr").await;
    assert!(lawyer.app.session().is_lawyer());
    let err = lawyer
        .app
        .open_chat(&ConversationTarget::standalone())
        .await
        .expect_err("lawyers need a matter");
    assert!(matches!(
        err,
        ChatError::Denied(GuardState::Unauthorized {
            redirect: Route::LawyerDashboard
        })
    ));
    assert_eq!(manager.backend.threads_created.load(Ordering::SeqCst), 0);

    // Debug output never includes the bearer token.
    assert!(!format!("{:?}", lawyer.app.session()).contains("eyJ"));
}
