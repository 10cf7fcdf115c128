//! Message endpoints under `/chats/message`

use crate::{
    error::{AppError, AppResult},
    middleware::guards::User,
    models::{MediaMetadata, MessageKind},
    services::{blob_store::media_key, message_service::MessageDraft},
    state::AppState,
};
use actix_multipart::{Field, Multipart};
use actix_web::{delete, patch, post, web, HttpResponse};
use futures::StreamExt;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageKind,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

fn default_message_type() -> MessageKind {
    MessageKind::Text
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageRequest {
    #[serde(default)]
    pub delete_for_all: bool,
}

/// POST /chats/message
#[post("/message")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    if body.message_type != MessageKind::Text {
        return Err(AppError::Validation(
            "media messages must be sent to /chats/message/media".into(),
        ));
    }

    let draft = MessageDraft {
        reply_to: body.reply_to,
        client_message_id: body.client_message_id.filter(|id| !id.trim().is_empty()),
        ..MessageDraft::text(body.content)
    };
    let message = state
        .delivery
        .send_message(body.chat_id, user.id, draft)
        .await?;
    Ok(HttpResponse::Created().json(message))
}

struct Upload {
    file_name: String,
    content_type: mime::Mime,
    bytes: Vec<u8>,
}

async fn read_text_field(field: &mut Field) -> AppResult<String> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::Validation(format!("multipart: {e}")))?;
        buf.extend_from_slice(&chunk);
        if buf.len() > 1024 {
            return Err(AppError::Validation("form field too long".into()));
        }
    }
    String::from_utf8(buf).map_err(|_| AppError::Validation("form field is not UTF-8".into()))
}

async fn read_file_field(field: &mut Field, limit: usize) -> AppResult<Upload> {
    let file_name = field
        .content_disposition()
        .get_filename()
        .filter(|name| !name.is_empty())
        .unwrap_or("upload")
        .to_string();
    let content_type = field
        .content_type()
        .cloned()
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);

    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::Validation(format!("multipart: {e}")))?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(Upload {
        file_name,
        content_type,
        bytes,
    })
}

/// POST /chats/message/media
///
/// Multipart form with `chatId`, optional `replyTo`, optional
/// `clientMessageId` and exactly one `file`.
#[post("/message/media")]
pub async fn send_media_message(
    state: web::Data<AppState>,
    user: User,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let mut chat_id: Option<Uuid> = None;
    let mut reply_to: Option<Uuid> = None;
    let mut client_message_id: Option<String> = None;
    let mut upload: Option<Upload> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::Validation(format!("multipart: {e}")))?;
        let name = field.content_disposition().get_name().unwrap_or("").to_string();

        match name.as_str() {
            "chatId" => {
                let raw = read_text_field(&mut field).await?;
                chat_id = Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| AppError::Validation("chatId must be a UUID".into()))?,
                );
            }
            "replyTo" => {
                let raw = read_text_field(&mut field).await?;
                if !raw.trim().is_empty() {
                    reply_to = Some(
                        raw.trim()
                            .parse()
                            .map_err(|_| AppError::Validation("replyTo must be a UUID".into()))?,
                    );
                }
            }
            "clientMessageId" => {
                let raw = read_text_field(&mut field).await?;
                client_message_id = Some(raw.trim().to_string()).filter(|id| !id.is_empty());
            }
            "file" => {
                if upload.is_some() {
                    return Err(AppError::Validation("exactly one file is allowed".into()));
                }
                upload = Some(read_file_field(&mut field, state.config.max_upload_bytes).await?);
            }
            _ => {
                // Drain unknown fields so the stream can advance
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::Validation(format!("multipart: {e}")))?;
                }
            }
        }
    }

    let chat_id = chat_id.ok_or_else(|| AppError::Validation("chatId is required".into()))?;
    let upload = upload.ok_or_else(|| AppError::Validation("file is required".into()))?;
    if upload.bytes.is_empty() {
        return Err(AppError::Validation("file is empty".into()));
    }

    // Membership and the reply target are checked before anything is
    // written to the blob store
    state.conversations.get(chat_id, user.id).await?;
    if let Some(reply_to) = reply_to {
        state.messages.ensure_reply_target(chat_id, reply_to).await?;
    }

    let kind = MessageKind::from_mime(&upload.content_type);
    let size_bytes = upload.bytes.len() as u64;
    let key = media_key(chat_id, &upload.file_name);
    let url = state
        .blobs
        .put(&key, upload.bytes, upload.content_type.essence_str())
        .await?;

    let media = MediaMetadata {
        file_name: upload.file_name,
        size_bytes,
        mime_type: upload.content_type.essence_str().to_string(),
        duration_secs: None,
        thumbnail_url: None,
    };
    let draft = MessageDraft {
        reply_to,
        client_message_id,
        ..MessageDraft::media(kind, url, media)
    };

    let message = state.delivery.send_message(chat_id, user.id, draft).await?;
    Ok(HttpResponse::Created().json(message))
}

/// PATCH /chats/message/{id}
#[patch("/message/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .delivery
        .edit_message(path.into_inner(), user.id, &body.content)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

/// DELETE /chats/message/{id}
///
/// Body is optional; without `deleteForAll` the message is hidden for the
/// caller only.
#[delete("/message/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    body: Option<web::Json<DeleteMessageRequest>>,
) -> Result<HttpResponse, AppError> {
    let for_everyone = body.map(|b| b.delete_for_all).unwrap_or(false);
    let outcome = state
        .delivery
        .delete_message(path.into_inner(), user.id, for_everyone)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "deleted": true,
        "forEveryone": outcome.for_everyone,
    })))
}
