//! Request and response DTOs for the platform REST API.
//!
//! The backend speaks camelCase JSON and is inconsistent about id types, so
//! every id goes through [`optional_id_string`]. Records that can carry the same
//! value under two keys (`id` and `_id`, `timestamp` and `createdAt`) are
//! read into a raw shape first and merged, canonical key first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chat::Sender;
use crate::session::Role;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// Accept `42` or `"42"` for an id field.
pub(crate) fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

/// First present value among several spellings of one field.
pub(crate) fn first_of<T, const N: usize>(candidates: [Option<T>; N]) -> Option<T> {
    candidates.into_iter().flatten().next()
}

pub(crate) fn required<T>(value: Option<T>, field: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("missing field `{field}`"))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// --- Auth ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawUserProfile")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUserProfile {
    #[serde(default, deserialize_with = "optional_id_string")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "optional_id_string")]
    object_id: Option<String>,
    email: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    role: Role,
}

impl TryFrom<RawUserProfile> for UserProfile {
    type Error = String;

    fn try_from(raw: RawUserProfile) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(first_of([raw.id, raw.object_id]), "id")?,
            email: raw.email,
            first_name: raw.first_name,
            last_name: raw.last_name,
            phone: raw.phone,
            role: raw.role,
        })
    }
}

impl UserProfile {
    /// "First Last", falling back to whichever part exists, then the email.
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangePasswordRequest<'a> {
    pub current_password: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ForgotPasswordRequest<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResetPasswordRequest<'a> {
    pub token: &'a str,
    pub password: &'a str,
}

// --- Chat ---

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawThreadRecord")]
pub struct ThreadRecord {
    pub id: String,
    pub title: String,
    pub project_id: Option<String>,
    pub legal_request_id: Option<String>,
    pub last_suggested_questions: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawThreadRecord {
    #[serde(default, deserialize_with = "optional_id_string")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "optional_id_string")]
    object_id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "optional_id_string")]
    project_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string")]
    legal_request_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    last_suggested_questions: Vec<String>,
}

impl TryFrom<RawThreadRecord> for ThreadRecord {
    type Error = String;

    fn try_from(raw: RawThreadRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(first_of([raw.id, raw.object_id]), "id")?,
            title: raw.title,
            project_id: raw.project_id,
            legal_request_id: raw.legal_request_id,
            last_suggested_questions: raw.last_suggested_questions,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateThreadRequest<'a> {
    pub title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_request_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawMessageRecord")]
pub struct MessageRecord {
    pub id: String,
    pub sender: Sender,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessageRecord {
    #[serde(default, deserialize_with = "optional_id_string")]
    id: Option<String>,
    #[serde(default, rename = "_id", deserialize_with = "optional_id_string")]
    object_id: Option<String>,
    sender: Sender,
    content: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawMessageRecord> for MessageRecord {
    type Error = String;

    fn try_from(raw: RawMessageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(first_of([raw.id, raw.object_id]), "id")?,
            sender: raw.sender,
            content: raw.content,
            timestamp: first_of([raw.timestamp, raw.created_at]).unwrap_or_else(Utc::now),
            updated_at: raw.updated_at,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AskRequest<'a> {
    pub chat_id: &'a str,
    pub question: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    pub user_message: MessageRecord,
    pub ai_message: MessageRecord,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub suggested_questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditMessageRequest<'a> {
    pub content: &'a str,
}

/// Envelope some list endpoints use instead of a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ListEnvelope<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}
