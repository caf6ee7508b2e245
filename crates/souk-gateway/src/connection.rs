use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use souk_types::events::{GatewayCommand, GatewayEvent};
use souk_types::models::{Audience, Principal};

use crate::GatewayState;
use crate::dispatcher::SocketMessage;
use crate::{distributor, polls, reactions};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The bearer token and
/// declared role were verified at the HTTP upgrade layer, so no state was
/// mutated for rejected handshakes — registration starts here.
pub async fn handle_connection(
    socket: WebSocket,
    state: GatewayState,
    principal: Principal,
    audience: Audience,
) {
    let socket_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    info!(
        "principal {} ({}) connected to gateway as socket {}",
        principal.id(),
        audience.as_str(),
        socket_id
    );

    let mut socket_rx = state.dispatcher.attach(socket_id).await;
    state
        .dispatcher
        .register_presence(socket_id, principal, audience)
        .await;

    // Room rehydration: rejoin every channel room whose conversation lists
    // this principal as a participant.
    match state.db.channel_rooms_for(principal.id()) {
        Ok(rooms) => {
            for room in rooms {
                state.dispatcher.join_room(&room, socket_id).await;
            }
        }
        Err(e) => warn!("room rehydration failed for {}: {}", principal.id(), e),
    }

    state.dispatcher.broadcast_presence().await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events and room broadcasts to this client, with
    // heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                msg = socket_rx.recv() => {
                    match msg {
                        Some(SocketMessage::Event(event)) => {
                            let text = serde_json::to_string(&event).unwrap();
                            if sender.send(Message::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        Some(SocketMessage::Kick(event)) => {
                            let text = serde_json::to_string(&event).unwrap();
                            let _ = sender.send(Message::Text(text.into())).await;
                            let _ = sender.send(Message::Close(None)).await;
                            break;
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client. Each handler is a fault boundary: a
    // failing persistence call logs, answers the origin socket with a scoped
    // chat-error, and never tears down the loop.
    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        let context = command_name(&cmd);
                        if let Err(e) = handle_command(&recv_state, socket_id, cmd).await {
                            warn!("{} ({}) handler '{}' failed: {:#}", principal.id(), socket_id, context, e);
                            recv_state
                                .dispatcher
                                .send_to_socket(
                                    socket_id,
                                    GatewayEvent::ChatError {
                                        context: context.to_string(),
                                        message: e.to_string(),
                                    },
                                )
                                .await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            principal.id(),
                            socket_id,
                            e,
                            &text[..text.len().min(200)]
                        );
                        recv_state
                            .dispatcher
                            .send_to_socket(
                                socket_id,
                                GatewayEvent::ChatError {
                                    context: "parse".to_string(),
                                    message: e.to_string(),
                                },
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.dispatcher.disconnect(socket_id).await;
    info!(
        "principal {} socket {} disconnected from gateway",
        principal.id(),
        socket_id
    );
}

fn command_name(cmd: &GatewayCommand) -> &'static str {
    match cmd {
        GatewayCommand::StartChat { .. } => "start-chat",
        GatewayCommand::EndChat { .. } => "end-chat",
        GatewayCommand::DirectMessage { .. } => "direct-message",
        GatewayCommand::GroupReaction { .. } => "group-reaction",
        GatewayCommand::PrivateReaction { .. } => "private-reaction",
        GatewayCommand::GetSeenMessage { .. } => "get-seen-message",
        GatewayCommand::SendComMsg(_) => "send-com-msg",
        GatewayCommand::JoinGroupChat { .. } => "join-group-chat",
        GatewayCommand::LeaveGroupChat { .. } => "leave-group-chat",
        GatewayCommand::SendComSeenMsg { .. } => "send-com-seen-msg",
        GatewayCommand::CastPoolVote { .. } => "cast-pool-vote",
        GatewayCommand::ClearPoolVotes { .. } => "clear-pool-votes",
        GatewayCommand::JoinRoom { .. } => "join-room",
    }
}

async fn handle_command(
    state: &GatewayState,
    socket_id: Uuid,
    cmd: GatewayCommand,
) -> anyhow::Result<()> {
    match cmd {
        GatewayCommand::StartChat { author, receiver } => {
            state.dispatcher.start_chat(author, receiver).await;
        }

        GatewayCommand::EndChat { author, receiver } => {
            state.dispatcher.end_chat(author, receiver).await;
        }

        GatewayCommand::DirectMessage {
            author,
            receiver,
            content,
        } => {
            // Suppress the notification when the receiver's recorded chat
            // partner is the author — both are assumed to be viewing the
            // thread. Heuristic, driven by explicit start/end-chat signals.
            let in_chat = state.dispatcher.chat_partner(receiver).await == Some(author);
            distributor::direct_message(state, author, receiver, &content, in_chat).await?;
        }

        GatewayCommand::GroupReaction {
            reaction,
            message_id,
            sender,
            channel_name,
        } => {
            reactions::group_reaction(state, &reaction, message_id, sender, &channel_name).await?;
        }

        GatewayCommand::PrivateReaction {
            reaction,
            message_id,
            receiver_id,
            sender_id,
        } => {
            reactions::private_reaction(state, &reaction, message_id, receiver_id, sender_id)
                .await?;
        }

        GatewayCommand::GetSeenMessage {
            conversation_id,
            message_id,
            reader,
        } => {
            distributor::direct_seen(state, conversation_id, message_id, reader).await?;
        }

        GatewayCommand::SendComMsg(payload) => {
            // Group-presence snapshot for the channel, taken before the send:
            // members currently viewing the thread are not notified.
            let key = crate::resolver::channel_key(
                payload.kind,
                &payload.product_name,
                &payload.product_id,
            );
            let viewers = state.dispatcher.group_members(&key).await;
            distributor::channel_message(state, socket_id, &payload, &viewers).await?;
        }

        GatewayCommand::JoinGroupChat { user_id, group_id } => {
            state.dispatcher.join_group(&group_id, user_id).await;
        }

        GatewayCommand::LeaveGroupChat { user_id, group_id } => {
            state.dispatcher.leave_group(&group_id, user_id).await;
        }

        GatewayCommand::SendComSeenMsg {
            conversation_id,
            message_id,
            reader,
        } => {
            distributor::channel_seen(state, conversation_id, message_id, reader).await?;
        }

        GatewayCommand::CastPoolVote {
            option_id,
            msg_id,
            voter,
            checked,
            allow_multiple,
        } => {
            polls::cast_vote(state, option_id, msg_id, voter, checked, allow_multiple).await?;
        }

        GatewayCommand::ClearPoolVotes { msg_id, voter } => {
            polls::clear_votes(state, msg_id, voter).await?;
        }

        GatewayCommand::JoinRoom { room_id } => {
            state.dispatcher.join_room(&room_id, socket_id).await;
        }
    }

    Ok(())
}
