use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::orders::review::StatusFlags;
use crate::schema::*;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CORRECTOR: &str = "corrector";
pub const ROLE_USER: &str = "user";

pub const ROLES: &[&str] = &[ROLE_ADMIN, ROLE_CORRECTOR, ROLE_USER];

/// Roles allowed to change the review status of a correction order.
pub fn is_corrector_role(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_CORRECTOR
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable)]
#[diesel(table_name = correction_orders)]
pub struct CorrectionOrder {
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
}

impl CorrectionOrder {
    pub fn flags(&self) -> StatusFlags {
        StatusFlags {
            corrected: self.is_corrected,
            reported: self.is_reported,
            rejected: self.is_rejected,
            user_confirmed: self.is_user_confirmed,
        }
    }

    pub fn set_flags(&mut self, flags: StatusFlags) {
        self.is_corrected = flags.corrected;
        self.is_reported = flags.reported;
        self.is_rejected = flags.rejected;
        self.is_user_confirmed = flags.user_confirmed;
    }

    /// Every message id the bot sent for the outstanding correction prompt.
    pub fn prompt_message_ids(&self) -> Vec<i64> {
        self.bot_message_id
            .into_iter()
            .chain(self.bot_message_ids.iter().copied())
            .collect()
    }

    /// Drops the correction prompt and the corrector's reply, returning the reply files to remove.
    pub fn clear_reply(&mut self) -> Vec<String> {
        self.bot_message_id = None;
        self.bot_message_ids.clear();
        self.reply_text = None;
        std::mem::take(&mut self.reply_photo_urls)
    }

    pub fn changeset(&self) -> CorrectionOrderChangeset<'_> {
        CorrectionOrderChangeset {
            description: self.description.as_deref(),
            photo_urls: &self.photo_urls,
            is_corrected: self.is_corrected,
            is_reported: self.is_reported,
            report_text: self.report_text.as_deref(),
            is_rejected: self.is_rejected,
            is_user_confirmed: self.is_user_confirmed,
            is_updated: self.is_updated,
            bot_message_id: self.bot_message_id,
            bot_message_ids: &self.bot_message_ids,
            user_message_id: self.user_message_id,
            reply_text: self.reply_text.as_deref(),
            reply_photo_urls: &self.reply_photo_urls,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = correction_orders)]
pub struct NewCorrectionOrder {
    pub telegram_user_id: i64,
    pub telegram_chat_id: i64,
    pub telegram_username: Option<String>,
    pub telegram_full_name: Option<String>,
    pub description: Option<String>,
    pub photo_urls: Vec<String>,
    pub user_message_id: Option<i64>,
}

/// Mutable columns of an order; origin fields and `created_at` are never written after insert.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = correction_orders, treat_none_as_null = true)]
pub struct CorrectionOrderChangeset<'a> {
    pub description: Option<&'a str>,
    pub photo_urls: &'a [String],
    pub is_corrected: bool,
    pub is_reported: bool,
    pub report_text: Option<&'a str>,
    pub is_rejected: bool,
    pub is_user_confirmed: bool,
    pub is_updated: bool,
    pub bot_message_id: Option<i64>,
    pub bot_message_ids: &'a [i64],
    pub user_message_id: Option<i64>,
    pub reply_text: Option<&'a str>,
    pub reply_photo_urls: &'a [String],
}
