use anyhow::Result;
use uuid::Uuid;

use souk_types::events::GatewayEvent;
use souk_types::models::Principal;

use crate::GatewayState;

/// Direct-chat reaction: one overwritable scalar on the message, last writer
/// wins, no per-sender attribution. The echo goes to both ends of the pair.
pub async fn private_reaction(
    state: &GatewayState,
    reaction: &str,
    message_id: Uuid,
    receiver_id: Uuid,
    sender_id: Uuid,
) -> Result<()> {
    state.db.set_direct_reaction(message_id, reaction)?;

    let event = GatewayEvent::ReactionAdded {
        reaction: reaction.to_string(),
        message_id,
    };
    state
        .dispatcher
        .send_to_principal(sender_id, event.clone())
        .await;
    state.dispatcher.send_to_principal(receiver_id, event).await;
    Ok(())
}

/// Group reaction: upsert keyed by sender (update in place or append), then
/// broadcast the full updated list to the channel room. There is no un-react
/// path on this surface.
pub async fn group_reaction(
    state: &GatewayState,
    reaction: &str,
    message_id: Uuid,
    sender: Principal,
    channel_name: &str,
) -> Result<()> {
    state.db.upsert_group_reaction(message_id, sender, reaction)?;

    let reactions = state.db.reactions_for(message_id)?;
    state
        .dispatcher
        .broadcast_room(
            channel_name,
            GatewayEvent::AddedGroupReaction {
                reactions,
                message_id,
            },
        )
        .await;
    Ok(())
}
