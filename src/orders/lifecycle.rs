//! Lifecycle controller: the only code path that changes an order's review status.
//!
//! Every operation commits its row change before talking to the messaging platform,
//! so a lost notification never rolls back a review decision.

use diesel::prelude::*;
use tracing::{error, info, warn};

use super::messages;
use super::review::{review, transitions, ReviewState, StatusChange, Transition};
use super::store::{self, Page, SortOrder, StatusFilter};
use crate::error::{AppError, AppResult};
use crate::models::{CorrectionOrder, NewCorrectionOrder};
use crate::notifications::Delivery;
use crate::state::AppState;
use crate::storage::{extension_from_filename, FileStorage, REPLY_PREFIX, SUBMISSION_PREFIX};

/// An uploaded photo as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub telegram_user_id: i64,
    pub telegram_chat_id: i64,
    pub telegram_username: Option<String>,
    pub telegram_full_name: Option<String>,
    pub description: Option<String>,
    pub user_message_id: Option<i64>,
    pub photos: Vec<Upload>,
}

/// Partial update from a corrector; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub is_corrected: Option<bool>,
    pub is_reported: Option<bool>,
    pub report_text: Option<String>,
    pub is_rejected: Option<bool>,
    pub is_user_confirmed: Option<bool>,
    pub is_updated: Option<bool>,
    pub bot_message_id: Option<i64>,
    pub reply_text: Option<String>,
    pub reply_photos: Vec<Upload>,
}

impl OrderUpdate {
    fn status_change(&self) -> StatusChange {
        StatusChange {
            corrected: self.is_corrected,
            reported: self.is_reported,
            rejected: self.is_rejected,
            user_confirmed: self.is_user_confirmed,
        }
    }
}

#[derive(Debug)]
pub enum SubmitOutcome {
    Created(CorrectionOrder),
    Replaced(CorrectionOrder),
}

pub async fn apply_update(
    state: &AppState,
    order_id: i64,
    update: OrderUpdate,
) -> AppResult<CorrectionOrder> {
    let mut order = {
        let mut conn = state.db()?;
        store::find(&mut conn, order_id)?.ok_or_else(AppError::not_found)?
    };

    let previous = order.flags();
    let next = review(previous, update.status_change())?;
    let detected = transitions(previous, next);

    let OrderUpdate {
        report_text,
        is_updated,
        bot_message_id,
        reply_text,
        reply_photos,
        ..
    } = update;

    let new_reply_photos =
        store_uploads(state.storage.as_ref(), REPLY_PREFIX, reply_photos).await?;

    order.set_flags(next);
    if let Some(text) = report_text {
        order.report_text = Some(text);
    }
    if let Some(updated) = is_updated {
        order.is_updated = updated;
    }
    if let Some(message_id) = bot_message_id {
        order.bot_message_id = Some(message_id);
    }
    if let Some(text) = reply_text {
        order.reply_text = Some(text);
    }
    if !new_reply_photos.is_empty() {
        order.reply_photo_urls = new_reply_photos.clone();
    }

    let mut stale_prompt = Vec::new();
    let mut stale_reply_files = Vec::new();
    if detected.contains(&Transition::Uncorrected) {
        stale_prompt = order.prompt_message_ids();
        stale_reply_files = order.clear_reply();
    }

    let mut order = match persist(state, &order) {
        Ok(saved) => saved,
        Err(err) => {
            remove_files(state.storage.as_ref(), &new_reply_photos).await;
            return Err(err);
        }
    };

    info!(order_id, transitions = ?detected, "correction order updated");

    for transition in &detected {
        match transition {
            Transition::Corrected => {
                let delivery = state
                    .notifier
                    .send_with_photos(messages::corrected(&order), &order.reply_photo_urls)
                    .await;
                if let Delivery::Delivered {
                    message_id,
                    companion_ids,
                } = delivery
                {
                    order.bot_message_id = Some(message_id);
                    order.bot_message_ids = companion_ids;
                    match persist(state, &order) {
                        Ok(saved) => order = saved,
                        Err(err) => error!(
                            order_id,
                            message_id,
                            error = %err.message(),
                            "failed to record correction prompt message"
                        ),
                    }
                }
            }
            Transition::Uncorrected => {
                for message_id in &stale_prompt {
                    state
                        .notifier
                        .delete_message(order.telegram_chat_id, *message_id)
                        .await;
                }
                remove_files(state.storage.as_ref(), &stale_reply_files).await;
            }
            Transition::Rejected => {
                state.notifier.send(messages::rejected(&order)).await;
            }
            Transition::InfoRequested => {
                state.notifier.send(messages::info_requested(&order)).await;
            }
        }
    }

    Ok(order)
}

/// Records the requester's confirmation. Reachable only through the bot channel.
pub fn confirm_by_user(state: &AppState, order_id: i64) -> AppResult<CorrectionOrder> {
    let mut conn = state.db()?;
    let order = conn.transaction::<_, AppError, _>(|conn| {
        let mut order = store::find(conn, order_id)?.ok_or_else(AppError::not_found)?;
        if !order.is_corrected {
            return Err(AppError::bad_request(
                "the order cannot be confirmed before it has been reviewed",
            ));
        }
        order.is_user_confirmed = true;
        Ok(store::save(conn, &order)?)
    })?;

    info!(order_id, "correction confirmed by requester");
    Ok(order)
}

/// Creates a new order, or replaces the content of `replace_order_id` when it belongs
/// to the same submitter. A replaced order goes back to review.
pub async fn submit_or_replace(
    state: &AppState,
    submission: Submission,
    replace_order_id: Option<i64>,
) -> AppResult<SubmitOutcome> {
    let Submission {
        telegram_user_id,
        telegram_chat_id,
        telegram_username,
        telegram_full_name,
        description,
        user_message_id,
        photos,
    } = submission;

    let replaceable = match replace_order_id {
        Some(target_id) => {
            let mut conn = state.db()?;
            let found = store::find(&mut conn, target_id)?;
            let owned = found.filter(|order| order.telegram_user_id == telegram_user_id);
            if owned.is_none() {
                warn!(
                    target_id,
                    telegram_user_id,
                    "replace target missing or owned by another submitter; creating a new order"
                );
            }
            owned
        }
        None => None,
    };

    let photo_urls = store_uploads(state.storage.as_ref(), SUBMISSION_PREFIX, photos).await?;

    let Some(mut order) = replaceable else {
        let new_order = NewCorrectionOrder {
            telegram_user_id,
            telegram_chat_id,
            telegram_username,
            telegram_full_name,
            description,
            photo_urls: photo_urls.clone(),
            user_message_id,
        };
        let created = {
            let inserted = state
                .db()
                .and_then(|mut conn| store::insert(&mut conn, &new_order).map_err(AppError::from));
            match inserted {
                Ok(order) => order,
                Err(err) => {
                    remove_files(state.storage.as_ref(), &photo_urls).await;
                    return Err(err);
                }
            }
        };
        info!(
            order_id = created.id,
            telegram_user_id,
            photos = created.photo_urls.len(),
            "correction order created"
        );
        return Ok(SubmitOutcome::Created(created));
    };

    let stale_photos = std::mem::replace(&mut order.photo_urls, photo_urls.clone());
    order.description = description;
    if let Some(message_id) = user_message_id {
        order.user_message_id = Some(message_id);
    }
    order.is_updated = true;

    let (stale_prompt, stale_reply_files) = if order.is_corrected {
        (order.prompt_message_ids(), order.clear_reply())
    } else {
        (Vec::new(), Vec::new())
    };
    order.set_flags(ReviewState::Pending.flags());

    let order = match persist(state, &order) {
        Ok(saved) => saved,
        Err(err) => {
            remove_files(state.storage.as_ref(), &photo_urls).await;
            return Err(err);
        }
    };

    remove_files(state.storage.as_ref(), &stale_photos).await;
    for message_id in stale_prompt {
        state
            .notifier
            .delete_message(order.telegram_chat_id, message_id)
            .await;
    }
    remove_files(state.storage.as_ref(), &stale_reply_files).await;

    info!(
        order_id = order.id,
        telegram_user_id,
        photos = order.photo_urls.len(),
        "correction order resubmitted"
    );
    Ok(SubmitOutcome::Replaced(order))
}

/// Deletes the order row, then its stored photos.
pub async fn delete(state: &AppState, order_id: i64) -> AppResult<()> {
    let order = {
        let mut conn = state.db()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let order = store::find(conn, order_id)?.ok_or_else(AppError::not_found)?;
            store::delete(conn, order.id)?;
            Ok(order)
        })?
    };

    remove_files(state.storage.as_ref(), &order.photo_urls).await;
    remove_files(state.storage.as_ref(), &order.reply_photo_urls).await;

    info!(order_id, "correction order deleted");
    Ok(())
}

pub fn get(state: &AppState, order_id: i64) -> AppResult<CorrectionOrder> {
    let mut conn = state.db()?;
    store::find(&mut conn, order_id)?.ok_or_else(AppError::not_found)
}

pub fn list(
    state: &AppState,
    filter: StatusFilter,
    sort: SortOrder,
    page: Page,
) -> AppResult<(Vec<CorrectionOrder>, i64)> {
    let mut conn = state.db()?;
    Ok(store::list(&mut conn, filter, sort, page)?)
}

fn persist(state: &AppState, order: &CorrectionOrder) -> AppResult<CorrectionOrder> {
    let mut conn = state.db()?;
    let saved = conn.transaction(|conn| store::save(conn, order))?;
    Ok(saved)
}

/// Writes uploads to storage; on failure the files already written are removed again.
async fn store_uploads(
    storage: &dyn FileStorage,
    prefix: &str,
    uploads: Vec<Upload>,
) -> AppResult<Vec<String>> {
    let mut references = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let extension = extension_from_filename(upload.file_name.as_deref());
        match storage.store(prefix, &extension, upload.bytes).await {
            Ok(reference) => references.push(reference),
            Err(err) => {
                error!(error = %err, "failed to store uploaded photo");
                remove_files(storage, &references).await;
                return Err(AppError::internal(format!("failed to store photo: {err}")));
            }
        }
    }
    Ok(references)
}

/// Best-effort removal; a file that cannot be removed is logged and skipped.
pub async fn remove_files(storage: &dyn FileStorage, references: &[String]) {
    for reference in references {
        if let Err(err) = storage.remove(reference).await {
            warn!(%reference, error = %err, "failed to remove stored photo");
        }
    }
}
