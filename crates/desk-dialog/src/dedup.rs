//! Dedup key derivation for sign-in confirmation activities.
//!
//! A user signed into several clients produces one confirmation per
//! client, all carrying the same `value.id`. Exactly one of them may act;
//! the key below is what the first writer claims.

use desk_core::Activity;

use crate::DialogError;

/// The confirmation's event id, shared by every duplicate delivery.
pub(crate) fn confirmation_event_id(activity: &Activity) -> Option<String> {
    activity
        .signin_state_query()
        .and_then(|query| query.id)
        .filter(|id| !id.trim().is_empty())
}

/// Derives the `(channelId, conversationId, eventId)` claim key. Only
/// the two sign-in confirmation invokes are valid inputs; anything else
/// is a programming-contract violation, not a dedup conflict.
pub fn dedup_key(activity: &Activity) -> Result<String, DialogError> {
    if !activity.is_signin_confirmation() {
        return Err(DialogError::DedupKeyUnavailable {
            activity: format!(
                "{:?}::{}",
                activity.activity_type,
                activity.name.as_deref().unwrap_or("<unnamed>")
            ),
        });
    }
    let event_id = confirmation_event_id(activity).ok_or(DialogError::DedupKeyMissingId)?;
    Ok(format!(
        "{}/{}/{}",
        activity.channel_id, activity.conversation.id, event_id
    ))
}
