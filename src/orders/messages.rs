use crate::models::CorrectionOrder;
use crate::notifications::{escape_html, InlineKeyboard, OutboundMessage};

pub const CONFIRM_CALLBACK_PREFIX: &str = "user_confirm_";
pub const EDIT_CALLBACK_PREFIX: &str = "user_edit_";

const MISSING_REPORT_REASON: &str = "not specified";

/// Prompt sent when a corrector marks the order as corrected.
pub fn corrected(order: &CorrectionOrder) -> OutboundMessage {
    let description = order
        .description
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| "<i>not provided</i>".to_string());

    let mut text = format!(
        "<b>Order #{} has been corrected!</b>\nDescription: {description}\n",
        order.id
    );
    if let Some(reply) = order
        .reply_text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        text.push_str(&format!("<b>Reply:</b>\n{}\n", escape_html(reply)));
    }
    text.push_str("\nPlease confirm that the correction is in place.");

    OutboundMessage::new(order.telegram_chat_id, text)
        .with_keyboard(InlineKeyboard::single(
            "Confirm",
            format!("{CONFIRM_CALLBACK_PREFIX}{}", order.id),
        ))
        .reply_to(order.user_message_id)
        .with_media_caption(format!("Photos for corrected order #{}", order.id))
}

pub fn rejected(order: &CorrectionOrder) -> OutboundMessage {
    OutboundMessage::new(
        order.telegram_chat_id,
        format!("<b>Order #{} has been rejected.</b>", order.id),
    )
    .reply_to(order.user_message_id)
}

pub fn info_requested(order: &CorrectionOrder) -> OutboundMessage {
    let reason = order
        .report_text
        .as_deref()
        .filter(|text| !text.trim().is_empty())
        .map(escape_html)
        .unwrap_or_else(|| MISSING_REPORT_REASON.to_string());

    let text = format!(
        "<b>Order #{} needs more information!</b>\n<i>Reason:</i> {reason}\n\
         Use the button below to send an updated request.",
        order.id
    );

    OutboundMessage::new(order.telegram_chat_id, text)
        .with_keyboard(InlineKeyboard::single(
            "Edit request",
            format!("{EDIT_CALLBACK_PREFIX}{}", order.id),
        ))
        .reply_to(order.user_message_id)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn order() -> CorrectionOrder {
        CorrectionOrder {
            id: 7,
            telegram_user_id: 42,
            telegram_chat_id: 100,
            telegram_username: Some("alice".to_string()),
            telegram_full_name: None,
            description: Some("broken <chair>".to_string()),
            photo_urls: vec![],
            created_at: Utc::now(),
            is_corrected: false,
            is_reported: false,
            report_text: None,
            is_rejected: false,
            is_user_confirmed: false,
            is_updated: false,
            bot_message_id: None,
            bot_message_ids: vec![],
            user_message_id: Some(555),
            reply_text: None,
            reply_photo_urls: vec![],
        }
    }

    #[test]
    fn corrected_prompt_carries_confirm_button_and_reply_link() {
        let mut order = order();
        order.reply_text = Some("glued & clamped".to_string());
        let message = corrected(&order);

        assert_eq!(message.chat_id, 100);
        assert_eq!(message.reply_to, Some(555));
        assert!(message.text.contains("broken &lt;chair&gt;"));
        assert!(message.text.contains("glued &amp; clamped"));
        assert_eq!(
            message.media_caption.as_deref(),
            Some("Photos for corrected order #7")
        );
        let keyboard = message.keyboard.expect("confirm keyboard");
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "user_confirm_7");
    }

    #[test]
    fn corrected_prompt_without_reply_omits_reply_section() {
        let message = corrected(&order());
        assert!(!message.text.contains("Reply:"));
    }

    #[test]
    fn info_request_uses_placeholder_reason() {
        let message = info_requested(&order());
        assert!(message.text.contains("not specified"));
        let keyboard = message.keyboard.expect("edit keyboard");
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "user_edit_7");
    }

    #[test]
    fn rejection_is_plain_text() {
        let message = rejected(&order());
        assert!(message.keyboard.is_none());
        assert_eq!(message.reply_to, Some(555));
    }
}
