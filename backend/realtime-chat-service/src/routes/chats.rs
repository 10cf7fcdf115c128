//! Conversation endpoints under `/chats`

use crate::{
    error::AppError,
    middleware::guards::User,
    models::{ConversationSummary, MessageView},
    state::AppState,
};
use actix_web::{get, patch, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrivateChatRequest {
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub group_name: String,
    pub participant_ids: Vec<Uuid>,
    #[serde(default)]
    pub group_icon: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<MessageView>,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub messages: Vec<MessageView>,
}

/// GET /chats
#[get("")]
pub async fn list_chats(state: web::Data<AppState>, user: User) -> Result<HttpResponse, AppError> {
    let chats = state.conversations.list_for_user(user.id).await?;
    Ok(HttpResponse::Ok().json(chats))
}

/// POST /chats/private
///
/// 201 when the conversation is new, 200 when it already existed.
#[post("/private")]
pub async fn create_private_chat(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreatePrivateChatRequest>,
) -> Result<HttpResponse, AppError> {
    let (conversation, created) = state
        .delivery
        .create_direct(user.id, body.participant_id)
        .await?;
    let summary = state.conversations.get_for_user(conversation.id, user.id).await?;

    Ok(if created {
        HttpResponse::Created().json(summary)
    } else {
        HttpResponse::Ok().json(summary)
    })
}

/// POST /chats/group
#[post("/group")]
pub async fn create_group_chat(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let created = state
        .delivery
        .create_group(user.id, &body.group_name, &body.participant_ids, body.group_icon)
        .await?;

    let summary =
        ConversationSummary::for_user(&created.conversation, user.id, Some(created.announcement));
    Ok(HttpResponse::Created().json(summary))
}

/// GET /chats/{id}
#[get("/{id}")]
pub async fn get_chat(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let summary = state
        .conversations
        .get_for_user(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// PATCH /chats/{id}/mute
#[patch("/{id}/mute")]
pub async fn toggle_mute(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let muted = state
        .conversations
        .toggle_mute(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "muted": muted })))
}

/// POST /chats/{id}/leave
#[post("/{id}/leave")]
pub async fn leave_chat(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.delivery.leave_group(path.into_inner(), user.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "left": true })))
}

/// GET /chats/{id}/messages?page=&limit=
///
/// Reading history marks the caller's unread messages as read.
#[get("/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .delivery
        .history(path.into_inner(), user.id, query.page, query.limit)
        .await?;

    Ok(HttpResponse::Ok().json(HistoryResponse {
        messages: page.messages,
        page: page.page,
        limit: page.limit,
        has_more: page.has_more,
    }))
}

/// GET /chats/{id}/search?query=
#[get("/{id}/search")]
pub async fn search_messages(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .search(path.into_inner(), user.id, &query.query)
        .await?;
    Ok(HttpResponse::Ok().json(SearchResponse { messages }))
}

/// PATCH /chats/{id}/read
#[patch("/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let updated = state
        .delivery
        .mark_conversation_read(path.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "updated": updated.len() })))
}
