//! Backend seams.
//!
//! Session, chat and document logic only see these traits. [`ApiClient`]
//! implements them against the REST API; tests substitute in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::multipart::{Form, Part};

use crate::api::types::{
    AskRequest, AskResponse, AuthResponse, ChangePasswordRequest, CreateThreadRequest,
    EditMessageRequest, ForgotPasswordRequest, ListEnvelope, LoginRequest, MessageRecord,
    ProfileUpdate, RegisterRequest, ResetPasswordRequest, ThreadRecord, UserProfile,
};
use crate::api::{ApiClient, Auth};
use crate::chat::ThreadOwner;
use crate::documents::{Document, DocumentOwner, UploadPayload};
use crate::error::ApiError;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;
    async fn current_user(&self) -> Result<UserProfile, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError>;
    async fn change_password(&self, current: &str, new: &str) -> Result<(), ApiError>;
    async fn forgot_password(&self, email: &str) -> Result<(), ApiError>;
    async fn reset_password(&self, token: &str, new: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Threads attached to `owner`, in backend order.
    async fn list_threads(&self, owner: &ThreadOwner) -> Result<Vec<ThreadRecord>, ApiError>;
    async fn create_thread(
        &self,
        owner: &ThreadOwner,
        title: &str,
    ) -> Result<ThreadRecord, ApiError>;
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, ApiError>;
    async fn ask(&self, thread_id: &str, question: &str) -> Result<AskResponse, ApiError>;
    async fn edit_message(
        &self,
        thread_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<MessageRecord, ApiError>;
    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn list_documents(&self, owner: &DocumentOwner) -> Result<Vec<Document>, ApiError>;
    async fn upload_document(
        &self,
        owner: &DocumentOwner,
        payload: UploadPayload,
    ) -> Result<Document, ApiError>;
    async fn download_document(
        &self,
        owner: &DocumentOwner,
        document_id: &str,
    ) -> Result<Bytes, ApiError>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        self.send_json(
            Method::POST,
            "/auth/login",
            &LoginRequest { email, password },
            Auth::Anonymous,
        )
        .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.send_json(Method::POST, "/auth/register", request, Auth::Anonymous)
            .await
    }

    async fn current_user(&self) -> Result<UserProfile, ApiError> {
        self.get_json("/auth/me", &[]).await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.send_json(Method::PUT, "/users/profile", update, Auth::Bearer)
            .await
    }

    async fn change_password(&self, current: &str, new: &str) -> Result<(), ApiError> {
        self.send_unit(
            Method::PUT,
            "/auth/change-password",
            Some(&ChangePasswordRequest {
                current_password: current,
                new_password: new,
            }),
            Auth::Bearer,
        )
        .await
    }

    async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        self.send_unit(
            Method::POST,
            "/auth/forgot-password",
            Some(&ForgotPasswordRequest { email }),
            Auth::Anonymous,
        )
        .await
    }

    async fn reset_password(&self, token: &str, new: &str) -> Result<(), ApiError> {
        self.send_unit(
            Method::POST,
            "/auth/reset-password",
            Some(&ResetPasswordRequest {
                token,
                password: new,
            }),
            Auth::Anonymous,
        )
        .await
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn list_threads(&self, owner: &ThreadOwner) -> Result<Vec<ThreadRecord>, ApiError> {
        let threads: ListEnvelope<ThreadRecord> = match owner {
            ThreadOwner::Project(id) => {
                self.get_json("/chats", &[("projectId", id.as_str())])
                    .await?
            }
            ThreadOwner::LegalRequest(id) => {
                self.get_json("/chats", &[("legalRequestId", id.as_str())]).await?
            }
            ThreadOwner::Standalone => self.get_json("/conversations", &[]).await?,
        };
        Ok(threads.into_vec())
    }

    async fn create_thread(
        &self,
        owner: &ThreadOwner,
        title: &str,
    ) -> Result<ThreadRecord, ApiError> {
        let (path, project_id, legal_request_id) = match owner {
            ThreadOwner::Project(id) => ("/chats", Some(id.as_str()), None),
            ThreadOwner::LegalRequest(id) => ("/chats", None, Some(id.as_str())),
            ThreadOwner::Standalone => ("/conversations", None, None),
        };
        self.send_json(
            Method::POST,
            path,
            &CreateThreadRequest {
                title,
                project_id,
                legal_request_id,
            },
            Auth::Bearer,
        )
        .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let messages: ListEnvelope<MessageRecord> = self
            .get_json(&format!("/chats/{thread_id}/messages"), &[])
            .await?;
        Ok(messages.into_vec())
    }

    async fn ask(&self, thread_id: &str, question: &str) -> Result<AskResponse, ApiError> {
        self.send_json(
            Method::POST,
            "/ai/ask",
            &AskRequest {
                chat_id: thread_id,
                question,
            },
            Auth::Bearer,
        )
        .await
    }

    async fn edit_message(
        &self,
        thread_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<MessageRecord, ApiError> {
        self.send_json(
            Method::PUT,
            &format!("/chats/{thread_id}/messages/{message_id}"),
            &EditMessageRequest { content },
            Auth::Bearer,
        )
        .await
    }

    async fn delete_message(&self, thread_id: &str, message_id: &str) -> Result<(), ApiError> {
        self.send_unit::<()>(
            Method::DELETE,
            &format!("/chats/{thread_id}/messages/{message_id}"),
            None,
            Auth::Bearer,
        )
        .await
    }
}

#[async_trait]
impl DocumentApi for ApiClient {
    async fn list_documents(&self, owner: &DocumentOwner) -> Result<Vec<Document>, ApiError> {
        let documents: ListEnvelope<Document> = self
            .get_json(owner.collection_path(), &[(owner.owner_field(), owner.id())])
            .await?;
        Ok(documents.into_vec())
    }

    async fn upload_document(
        &self,
        owner: &DocumentOwner,
        payload: UploadPayload,
    ) -> Result<Document, ApiError> {
        let UploadPayload {
            file_name,
            mime,
            bytes,
            on_progress,
        } = payload;

        let total = bytes.len() as u64;
        let chunks: Vec<Bytes> = (0..bytes.len())
            .step_by(UPLOAD_CHUNK_SIZE)
            .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len())))
            .collect();

        // Progress is reported as hyper pulls each chunk off the body stream.
        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(callback) = &on_progress {
                callback(sent, total);
            }
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
            .file_name(file_name)
            .mime_str(&mime)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid MIME type '{mime}': {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text(owner.owner_field(), owner.id().to_string());

        self.send_multipart(owner.collection_path(), form).await
    }

    async fn download_document(
        &self,
        owner: &DocumentOwner,
        document_id: &str,
    ) -> Result<Bytes, ApiError> {
        self.get_bytes(&format!(
            "{}/{document_id}/download",
            owner.collection_path()
        ))
        .await
    }
}
