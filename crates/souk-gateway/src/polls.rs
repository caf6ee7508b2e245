use anyhow::{Context, Result};
use uuid::Uuid;

use souk_types::events::GatewayEvent;
use souk_types::models::Principal;

use crate::GatewayState;

/// Applies a vote against persisted state (never a client snapshot) and
/// broadcasts the refreshed poll to the channel room.
pub async fn cast_vote(
    state: &GatewayState,
    option_id: Uuid,
    message_id: Uuid,
    voter: Principal,
    checked: bool,
    allow_multiple: bool,
) -> Result<()> {
    state
        .db
        .cast_poll_vote(message_id, option_id, voter, checked, allow_multiple)?;
    broadcast_poll(state, message_id).await
}

/// Removes the voter from every option, then broadcasts.
pub async fn clear_votes(state: &GatewayState, message_id: Uuid, voter: Principal) -> Result<()> {
    state.db.clear_poll_votes(message_id, voter)?;
    broadcast_poll(state, message_id).await
}

async fn broadcast_poll(state: &GatewayState, message_id: Uuid) -> Result<()> {
    let pool = state
        .db
        .poll_view(message_id)?
        .context("vote on a message without a poll")?;
    let row = state
        .db
        .message_row(message_id)?
        .context("poll message vanished")?;
    let conversation = state
        .db
        .conversation(row.conversation_id)?
        .context("poll conversation vanished")?;

    state
        .dispatcher
        .broadcast_room(
            &conversation.channel_key,
            GatewayEvent::PoolResponse { message_id, pool },
        )
        .await;
    Ok(())
}
