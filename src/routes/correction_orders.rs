use axum::extract::{multipart::Field, Json, Multipart, Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::{AuthenticatedUser, BotChannel, CorrectorUser};
use crate::error::{AppError, AppResult};
use crate::models::CorrectionOrder;
use crate::orders::lifecycle;
use crate::orders::store::{Page, SortOrder, StatusFilter};
use crate::orders::{OrderUpdate, ReviewState, Submission, SubmitOutcome, Upload};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default)]
    pub status: StatusFilter,
    #[serde(default)]
    pub sort: SortOrder,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: i64,
    pub telegram_user_id: i64,
    pub telegram_chat_id: i64,
    pub telegram_username: Option<String>,
    pub telegram_full_name: Option<String>,
    pub description: Option<String>,
    pub photo_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub is_corrected: bool,
    pub is_reported: bool,
    pub report_text: Option<String>,
    pub is_rejected: bool,
    pub is_user_confirmed: bool,
    pub is_updated: bool,
    pub bot_message_id: Option<i64>,
    pub bot_message_ids: Vec<i64>,
    pub user_message_id: Option<i64>,
    pub reply_text: Option<String>,
    pub reply_photo_urls: Vec<String>,
    pub review_state: &'static str,
}

impl From<CorrectionOrder> for OrderResponse {
    fn from(order: CorrectionOrder) -> Self {
        // Rows are validated on every write; the fallback only shows up for hand-edited data.
        let review_state = ReviewState::from_flags(order.flags())
            .map(ReviewState::label)
            .unwrap_or("inconsistent");
        Self {
            id: order.id,
            telegram_user_id: order.telegram_user_id,
            telegram_chat_id: order.telegram_chat_id,
            telegram_username: order.telegram_username,
            telegram_full_name: order.telegram_full_name,
            description: order.description,
            photo_urls: order.photo_urls,
            created_at: order.created_at,
            is_corrected: order.is_corrected,
            is_reported: order.is_reported,
            report_text: order.report_text,
            is_rejected: order.is_rejected,
            is_user_confirmed: order.is_user_confirmed,
            is_updated: order.is_updated,
            bot_message_id: order.bot_message_id,
            bot_message_ids: order.bot_message_ids,
            user_message_id: order.user_message_id,
            reply_text: order.reply_text,
            reply_photo_urls: order.reply_photo_urls,
            review_state,
        }
    }
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub items: Vec<OrderResponse>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Serialize)]
pub struct DetailResponse {
    pub detail: String,
}

pub async fn submit_order(
    State(state): State<AppState>,
    _bot: BotChannel,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<OrderResponse>)> {
    let mut telegram_user_id = None;
    let mut telegram_chat_id = None;
    let mut telegram_username = None;
    let mut telegram_full_name = None;
    let mut description = None;
    let mut replace_order_id = None;
    let mut user_message_id = None;
    let mut photos = Vec::new();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("photos") => {
                if let Some(upload) = read_upload(field).await? {
                    photos.push(upload);
                }
            }
            Some("telegram_user_id") => telegram_user_id = read_integer(field).await?,
            Some("telegram_chat_id") => telegram_chat_id = read_integer(field).await?,
            Some("telegram_username") => telegram_username = read_text(field).await?,
            Some("telegram_full_name") => telegram_full_name = read_text(field).await?,
            Some("description") => description = read_text(field).await?,
            Some("replace_order_id") => replace_order_id = read_integer(field).await?,
            Some("user_message_id") => user_message_id = read_integer(field).await?,
            _ => {}
        }
    }

    let telegram_user_id = telegram_user_id
        .ok_or_else(|| AppError::bad_request("telegram_user_id is required"))?;
    let telegram_chat_id = telegram_chat_id
        .ok_or_else(|| AppError::bad_request("telegram_chat_id is required"))?;

    let submission = Submission {
        telegram_user_id,
        telegram_chat_id,
        telegram_username,
        telegram_full_name,
        description,
        user_message_id,
        photos,
    };

    match lifecycle::submit_or_replace(&state, submission, replace_order_id).await? {
        SubmitOutcome::Created(order) => Ok((StatusCode::CREATED, Json(order.into()))),
        SubmitOutcome::Replaced(order) => Ok((StatusCode::OK, Json(order.into()))),
    }
}

pub async fn list_orders(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<OrderListResponse>> {
    let page = Page::new(query.skip, query.limit);
    let (orders, total) = lifecycle::list(&state, query.status, query.sort, page)?;

    Ok(Json(OrderListResponse {
        items: orders.into_iter().map(OrderResponse::from).collect(),
        total,
        skip: page.skip,
        limit: page.limit,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderResponse>> {
    let order = lifecycle::get(&state, order_id)?;
    Ok(Json(order.into()))
}

pub async fn update_order(
    State(state): State<AppState>,
    CorrectorUser(user): CorrectorUser,
    Path(order_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<Json<OrderResponse>> {
    let mut update = OrderUpdate::default();

    while let Some(field) = next_field(&mut multipart).await? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("reply_photos") => {
                if let Some(upload) = read_upload(field).await? {
                    update.reply_photos.push(upload);
                }
            }
            Some("is_corrected") => update.is_corrected = read_flag(field).await?,
            Some("is_reported") => update.is_reported = read_flag(field).await?,
            Some("is_rejected") => update.is_rejected = read_flag(field).await?,
            Some("is_user_confirmed") => update.is_user_confirmed = read_flag(field).await?,
            Some("is_updated") => update.is_updated = read_flag(field).await?,
            Some("report_text") => update.report_text = read_text(field).await?,
            Some("reply_text") => update.reply_text = read_text(field).await?,
            Some("bot_message_id") => update.bot_message_id = read_integer(field).await?,
            _ => {}
        }
    }

    info!(order_id, reviewer = %user.username, "applying corrector update");
    let order = lifecycle::apply_update(&state, order_id, update).await?;
    Ok(Json(order.into()))
}

pub async fn delete_order(
    State(state): State<AppState>,
    CorrectorUser(user): CorrectorUser,
    Path(order_id): Path<i64>,
) -> AppResult<Json<DetailResponse>> {
    lifecycle::delete(&state, order_id).await?;
    info!(order_id, reviewer = %user.username, "order removed by corrector");
    Ok(Json(DetailResponse {
        detail: format!("correction order {order_id} deleted"),
    }))
}

pub async fn confirm_order(
    State(state): State<AppState>,
    _bot: BotChannel,
    Path(order_id): Path<i64>,
) -> AppResult<Json<OrderResponse>> {
    let order = lifecycle::confirm_by_user(&state, order_id)?;
    Ok(Json(order.into()))
}

async fn next_field(multipart: &mut Multipart) -> AppResult<Option<Field<'_>>> {
    multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })
}

async fn read_upload(field: Field<'_>) -> AppResult<Option<Upload>> {
    let file_name = field.file_name().map(|n| n.to_string());
    let data = field.bytes().await.map_err(|err| {
        error!(error = %err, "failed to read photo bytes");
        AppError::bad_request(format!("failed to read photo bytes: {err}"))
    })?;
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(Upload {
        file_name,
        bytes: data.to_vec(),
    }))
}

async fn read_text(field: Field<'_>) -> AppResult<Option<String>> {
    let name = field.name().unwrap_or("field").to_string();
    let value = field.text().await.map_err(|err| {
        error!(error = %err, field = %name, "invalid multipart text field");
        AppError::bad_request(format!("invalid {name}: {err}"))
    })?;
    Ok((!value.is_empty()).then_some(value))
}

async fn read_integer(field: Field<'_>) -> AppResult<Option<i64>> {
    let name = field.name().unwrap_or("field").to_string();
    match read_text(field).await? {
        Some(value) => parse_integer(&name, &value).map(Some),
        None => Ok(None),
    }
}

async fn read_flag(field: Field<'_>) -> AppResult<Option<bool>> {
    let name = field.name().unwrap_or("field").to_string();
    match read_text(field).await? {
        Some(value) => parse_flag(&name, &value).map(Some),
        None => Ok(None),
    }
}

fn parse_integer(name: &str, value: &str) -> AppResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| AppError::bad_request(format!("{name} must be an integer")))
}

fn parse_flag(name: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(AppError::bad_request(format!("{name} must be a boolean"))),
    }
}
