use anyhow::{Context, Result};
use uuid::Uuid;

use souk_db::models::ConversationRow;
use souk_types::events::GatewayEvent;
use souk_types::models::{ChannelKind, Principal};

use crate::GatewayState;

/// Admin role whose holders are seeded into every new channel conversation.
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

/// Product names reach the channel key with spaces stripped; the key must be
/// a stable slug, not display text.
pub fn sanitize_product_name(name: &str) -> String {
    name.replace(' ', "")
}

/// Deterministic channel identifier: `{com|stake}_{name}_{product_id}`.
pub fn channel_key(kind: ChannelKind, product_name: &str, product_id: &str) -> String {
    format!(
        "{}_{}_{}",
        kind.prefix(),
        sanitize_product_name(product_name),
        product_id
    )
}

/// Find-or-create for the direct pair; the unique channel key in the store
/// makes this safe under concurrent first messages from both sides.
pub fn resolve_direct(state: &GatewayState, author: Uuid, receiver: Uuid) -> Result<ConversationRow> {
    state.db.find_or_create_direct(author, receiver)
}

/// Find-or-create for a community/stake channel.
///
/// The initiating socket joins the channel room up front (it is about to send
/// into it). On first creation the participant set is seeded with the product
/// owner, the initiator, and every SUPER_ADMIN admin, and each member's live
/// socket is told to join the new room. On an existing conversation the
/// initiator is appended idempotently.
pub async fn resolve_channel(
    state: &GatewayState,
    socket_id: Uuid,
    kind: ChannelKind,
    product_name: &str,
    product_id: &str,
    product_owner_id: Uuid,
    author: Principal,
) -> Result<ConversationRow> {
    let key = channel_key(kind, product_name, product_id);
    let conversation_kind = kind.conversation_kind();

    state.dispatcher.join_room(&key, socket_id).await;

    if let Some(existing) = state.db.conversation_by_channel_key(&key, conversation_kind)? {
        state.db.append_participant(existing.id, author)?;
        return Ok(existing);
    }

    let admins: Vec<Principal> = state
        .db
        .admins_with_role(SUPER_ADMIN_ROLE)
        .context("resolving SUPER_ADMIN admins")?
        .into_iter()
        .map(Principal::Admin)
        .collect();

    let owner = Principal::User(product_owner_id);
    let mut participants: Vec<Principal> = vec![owner];
    if !participants.contains(&author) {
        participants.push(author);
    }
    for admin in &admins {
        if !participants.contains(admin) {
            participants.push(*admin);
        }
    }

    let (row, created) = state.db.find_or_create_channel(
        &key,
        conversation_kind,
        product_name,
        author,
        &participants,
    )?;

    if created {
        // Pull the other seeded members' live sockets into the new room.
        for member in participants.iter().filter(|p| **p != author) {
            state
                .dispatcher
                .send_to_principal(
                    member.id(),
                    GatewayEvent::JoinChannelRoom {
                        room_id: key.clone(),
                    },
                )
                .await;
        }
    } else {
        // Lost the creation race; make sure the author is a participant.
        state.db.append_participant(row.id, author)?;
    }

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_key_strips_spaces_and_is_deterministic() {
        assert_eq!(
            channel_key(ChannelKind::Community, "Vintage Rug", "42"),
            "com_VintageRug_42"
        );
        assert_eq!(
            channel_key(ChannelKind::Stake, "Vintage Rug", "42"),
            "stake_VintageRug_42"
        );
    }
}
