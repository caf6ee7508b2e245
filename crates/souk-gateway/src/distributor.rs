use std::collections::HashSet;

use anyhow::{Context, Result};
use uuid::Uuid;

use souk_types::events::{ChannelMessagePayload, GatewayEvent};
use souk_types::models::{ConversationKind, Principal};

use crate::GatewayState;
use crate::fanout::{self, NotificationSpec, Templates};
use crate::resolver;

/// Direct-message path: resolve the pair conversation, persist, re-read with
/// display fields, emit to every participant's live socket, then fan out a
/// notification unless the receiver is actively in-chat with the author.
///
/// Persistence is awaited before any emit so a failed write never races a
/// broadcast out the door.
pub async fn direct_message(
    state: &GatewayState,
    author_id: Uuid,
    receiver_id: Uuid,
    content: &str,
    in_chat: bool,
) -> Result<()> {
    let author = Principal::User(author_id);
    let receiver = Principal::User(receiver_id);

    let conversation = resolver::resolve_direct(state, author_id, receiver_id)?;
    let message_id = state
        .db
        .insert_direct_message(conversation.id, author, receiver, content)?;
    let message = state
        .db
        .message_view(message_id)?
        .context("direct message missing after insert")?;

    let participants = state.db.participants(conversation.id)?;
    let event = GatewayEvent::DirectChatHistory {
        message: message.clone(),
        participants: participants.clone(),
        conversation_id: conversation.id,
    };
    for participant in &participants {
        state
            .dispatcher
            .send_to_principal(participant.id(), event.clone())
            .await;
    }

    if !in_chat {
        let author_profile = &message.author;
        let spec = NotificationSpec {
            action_type: ConversationKind::Direct.as_str().to_string(),
            title: fanout::title_for(ConversationKind::Direct).to_string(),
            templates: Templates::same_for_all(format!(
                "You have received a message in Private Chat from {}. Content: {}",
                author_profile.full_name, content
            )),
        };
        fanout::notify(state, &[receiver], &spec, &[]).await?;
    }

    Ok(())
}

/// Community/stake message path. `viewers` is the group-presence snapshot for
/// the channel — members currently looking at the thread, who are not
/// notified.
pub async fn channel_message(
    state: &GatewayState,
    socket_id: Uuid,
    payload: &ChannelMessagePayload,
    viewers: &HashSet<Uuid>,
) -> Result<()> {
    let conversation = match payload.conversation_id {
        Some(id) => state
            .db
            .conversation(id)?
            .context("unknown conversation id on send-com-msg")?,
        None => {
            resolver::resolve_channel(
                state,
                socket_id,
                payload.kind,
                &payload.product_name,
                &payload.product_id,
                payload.product_owner_id,
                payload.author,
            )
            .await?
        }
    };

    // Receiver set: current participants minus the author, fixed at send time.
    let participants = state.db.participants(conversation.id)?;
    let receivers: Vec<Principal> = participants
        .iter()
        .copied()
        .filter(|p| p.id() != payload.author.id())
        .collect();

    let poll = payload
        .pool
        .as_ref()
        .filter(|p| !p.question.is_empty() && !p.options.is_empty());
    let content = payload.content.as_deref().filter(|c| !c.is_empty());

    let message_id = state.db.insert_channel_message(
        conversation.id,
        payload.author,
        payload.kind.conversation_kind().message_kind(),
        content,
        &receivers,
        poll,
    )?;
    let message = state
        .db
        .message_view(message_id)?
        .context("channel message missing after insert")?;

    // Fan out to receivers who are not currently viewing the thread.
    let absent: Vec<Principal> = receivers
        .iter()
        .copied()
        .filter(|p| !viewers.contains(&p.id()))
        .collect();
    if !absent.is_empty() {
        let kind = payload.kind.conversation_kind();
        let text = if poll.is_some() {
            format!("A poll was created in the {} chat", payload.product_name)
        } else {
            format!(
                "New message in the {} chat: {}",
                payload.product_name,
                content.unwrap_or_default()
            )
        };
        let spec = NotificationSpec {
            action_type: kind.as_str().to_string(),
            title: fanout::title_for(kind).to_string(),
            templates: Templates::same_for_all(text),
        };
        fanout::notify(state, &absent, &spec, &[]).await?;
    }

    state
        .dispatcher
        .broadcast_room(
            &conversation.channel_key,
            GatewayEvent::ComMessageHistory {
                channel_name: conversation.channel_key.clone(),
                message,
                participants,
                conversation_id: conversation.id,
            },
        )
        .await;

    Ok(())
}

/// Direct-chat seen receipt: guarded single-message read mark, then echo the
/// refreshed message to the author's live socket.
pub async fn direct_seen(
    state: &GatewayState,
    conversation_id: Uuid,
    message_id: Uuid,
    reader: Principal,
) -> Result<()> {
    state
        .db
        .mark_message_read(message_id, conversation_id, reader)?;

    let message = state
        .db
        .message_view(message_id)?
        .context("unknown message on seen receipt")?;
    let author_id = message.author.id;
    state
        .dispatcher
        .send_to_principal(author_id, GatewayEvent::SeenMessageResponse { message })
        .await;
    Ok(())
}

/// Group-chat seen receipt: same guard, broadcast to the channel room.
pub async fn channel_seen(
    state: &GatewayState,
    conversation_id: Uuid,
    message_id: Uuid,
    reader: Principal,
) -> Result<()> {
    state
        .db
        .mark_message_read(message_id, conversation_id, reader)?;

    let conversation = state
        .db
        .conversation(conversation_id)?
        .context("unknown conversation on seen receipt")?;
    let message = state
        .db
        .message_view(message_id)?
        .context("unknown message on seen receipt")?;
    state
        .dispatcher
        .broadcast_room(
            &conversation.channel_key,
            GatewayEvent::SeenMessageResponse { message },
        )
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use souk_db::Database;
    use souk_types::models::{Audience, ChannelKind, MessageKind, PollSpec};

    use crate::dispatcher::Dispatcher;

    fn test_state() -> GatewayState {
        GatewayState::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
    }

    fn seed_users(state: &GatewayState) -> (Uuid, Uuid) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        state
            .db
            .create_user(a, "alia", "Alia", Audience::Buyer)
            .unwrap();
        state
            .db
            .create_user(b, "badr", "Badr", Audience::Seller)
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn direct_message_persists_and_notifies_absent_receiver() {
        let state = test_state();
        let (a, b) = seed_users(&state);

        direct_message(&state, a, b, "salaam", false).await.unwrap();

        let conversation = state.db.find_or_create_direct(a, b).unwrap();
        let (ids, total) = state
            .db
            .messages_page(conversation.id, MessageKind::DirectMessage, 1, 10)
            .unwrap();
        assert_eq!(total, 1);
        let view = state.db.message_view(ids[0]).unwrap().unwrap();
        assert_eq!(view.content.as_deref(), Some("salaam"));
        assert_eq!(view.receiver.unwrap().id, b);

        assert_eq!(state.db.notification_count(b).unwrap(), 1);
        assert_eq!(state.db.notification_count(a).unwrap(), 0);
    }

    #[tokio::test]
    async fn active_chat_pairing_suppresses_the_notification() {
        let state = test_state();
        let (a, b) = seed_users(&state);

        // b is viewing the thread with a.
        state.dispatcher.start_chat(b, a).await;
        let in_chat = state.dispatcher.chat_partner(b).await == Some(a);
        direct_message(&state, a, b, "ping", in_chat).await.unwrap();

        assert_eq!(state.db.notification_count(b).unwrap(), 0);
    }

    #[tokio::test]
    async fn channel_message_snapshots_receivers_and_skips_viewers() {
        let state = test_state();
        let (owner, buyer) = seed_users(&state);
        let admin = Uuid::new_v4();
        state.db.create_admin(admin, "root", "Root").unwrap();
        state.db.grant_role(admin, "SUPER_ADMIN").unwrap();

        let payload = ChannelMessagePayload {
            product_name: "Vintage Rug".into(),
            product_id: "42".into(),
            product_owner_id: owner,
            author: Principal::User(buyer),
            content: Some("is this still available?".into()),
            pool: None,
            kind: ChannelKind::Community,
            conversation_id: None,
        };

        // The owner is currently viewing the group chat.
        let viewers = HashSet::from([owner]);
        channel_message(&state, Uuid::new_v4(), &payload, &viewers)
            .await
            .unwrap();

        let conversation = state
            .db
            .conversation_by_channel_key("com_VintageRug_42", ConversationKind::Community)
            .unwrap()
            .unwrap();
        let participants = state.db.participants(conversation.id).unwrap();
        assert_eq!(participants.len(), 3);

        let (ids, _) = state
            .db
            .messages_page(conversation.id, MessageKind::ComChatMessage, 1, 10)
            .unwrap();
        let view = state.db.message_view(ids[0]).unwrap().unwrap();
        // Receivers: everyone but the author.
        assert_eq!(view.receivers.len(), 2);

        // The viewing owner was not notified; the absent admin was.
        assert_eq!(state.db.notification_count(owner).unwrap(), 0);
        assert_eq!(state.db.notification_count(admin).unwrap(), 1);
    }

    #[tokio::test]
    async fn poll_message_carries_the_poll_structure() {
        let state = test_state();
        let (owner, _buyer) = seed_users(&state);

        let payload = ChannelMessagePayload {
            product_name: "Vintage Rug".into(),
            product_id: "42".into(),
            product_owner_id: owner,
            author: Principal::User(owner),
            content: None,
            pool: Some(PollSpec {
                question: "Best pickup day?".into(),
                options: vec!["Friday".into(), "Saturday".into()],
                allow_multiple: false,
            }),
            kind: ChannelKind::Stake,
            conversation_id: None,
        };
        channel_message(&state, Uuid::new_v4(), &payload, &HashSet::new())
            .await
            .unwrap();

        let conversation = state
            .db
            .conversation_by_channel_key("stake_VintageRug_42", ConversationKind::Stake)
            .unwrap()
            .unwrap();
        let (ids, _) = state
            .db
            .messages_page(conversation.id, MessageKind::StakeChatMessage, 1, 10)
            .unwrap();
        let view = state.db.message_view(ids[0]).unwrap().unwrap();
        let poll = view.pool.unwrap();
        assert_eq!(poll.options.len(), 2);
        assert!(!poll.allow_multiple);
    }

    #[tokio::test]
    async fn seen_receipt_is_idempotent_over_the_socket_path() {
        let state = test_state();
        let (a, b) = seed_users(&state);
        direct_message(&state, a, b, "one", true).await.unwrap();

        let conversation = state.db.find_or_create_direct(a, b).unwrap();
        let (ids, _) = state
            .db
            .messages_page(conversation.id, MessageKind::DirectMessage, 1, 10)
            .unwrap();
        let reader = Principal::User(b);

        direct_seen(&state, conversation.id, ids[0], reader)
            .await
            .unwrap();
        direct_seen(&state, conversation.id, ids[0], reader)
            .await
            .unwrap();

        let read_by = state.db.read_by_of(ids[0]).unwrap();
        assert_eq!(read_by, vec![reader]);
    }
}
