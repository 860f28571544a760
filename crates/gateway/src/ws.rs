//! WebSocket connection handling — the Connection Manager's wire side.
//!
//! One connection = one session. Inbound `send-message` events run the
//! admission → augmentation → orchestration pipeline; outbound events are
//! funneled through the session's ordered channel by a single writer task.

use std::net::SocketAddr;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use midwire_core::event::DomainEvent;
use midwire_core::memory::SemanticMemory;
use midwire_core::message::Message;
use midwire_core::store::ChatStore;
use midwire_core::turn::Turn;

use crate::SharedState;
use crate::protocol::{
    ClientEvent, DeleteChatPayload, ErrorPayload, MessageResponsePayload, RateLimitInfoPayload,
    SendMessagePayload, ServerEvent, TypingPayload, WindowValues,
};
use crate::rate_limit::{Decision, RateSnapshot};
use crate::relay::relay_turn;
use crate::session::SessionHandle;

/// How many stored messages are loaded when the client sends no history.
const HISTORY_FALLBACK_LIMIT: usize = 50;

/// `GET /ws` — upgrade to the bidirectional event protocol.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let identity = connection_identity(&headers, addr, state.trusted_proxy);
    ws.on_upgrade(move |socket| handle_connection(socket, state, identity))
}

/// Extract the connection identity for rate limiting.
///
/// Forwarded-for headers are spoofable; they are honored only when the
/// trusted-proxy flag says a proxy we control set them.
pub fn connection_identity(headers: &HeaderMap, addr: SocketAddr, trusted_proxy: bool) -> String {
    if trusted_proxy
        && let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return first.to_string();
    }
    addr.ip().to_string()
}

async fn handle_connection(socket: WebSocket, state: SharedState, conn_identity: String) {
    let (session, mut outbound_rx) = state.sessions.register(conn_identity).await;
    info!(session_id = %session.id, "WebSocket connection established");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Single writer task: the session's ordered channel is the only path
    // to the socket, so per-session delivery order is the channel order.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = serde_json::to_string(&event).unwrap_or_default();
            if ws_tx.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => dispatch_event(&state, &session, &text).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue, // ignore binary, ping, pong
            Err(_) => break,
        }
    }

    state.sessions.unregister(&session.id).await;
    writer.abort();
    info!(session_id = %session.id, "WebSocket connection closed");
}

async fn dispatch_event(state: &SharedState, session: &SessionHandle, text: &str) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            session
                .send(error_event(
                    format!("Invalid message: {e}"),
                    Some("bad-request"),
                    None,
                ))
                .await;
            return;
        }
    };

    match event {
        ClientEvent::SendMessage(payload) => handle_send_message(state, session, payload).await,
        ClientEvent::DeleteChat(payload) => handle_delete_chat(state, session, payload).await,
    }
}

pub(crate) async fn handle_send_message(
    state: &SharedState,
    session: &SessionHandle,
    payload: SendMessagePayload,
) {
    // 1. Shutdown gate — draining processes reject before anything else.
    if !state.shutdown.is_accepting() {
        session
            .send(error_event(
                "The server is shutting down; no new messages are accepted.",
                Some("draining"),
                None,
            ))
            .await;
        return;
    }

    // 2. One in-flight turn per session, checked before any state
    //    mutation (the rate limiter counts admitted work only).
    if session.begin_turn().is_err() {
        session
            .send(error_event(
                "A response is already being generated for this session.",
                Some("turn-in-flight"),
                None,
            ))
            .await;
        return;
    }

    let identity = if payload.user_id.is_empty() {
        session.identity.clone()
    } else {
        payload.user_id.clone()
    };

    // 3. Admission control.
    let decision = state.limiter.admit(&identity);
    session
        .send(rate_limit_event(&decision.snapshot()))
        .await;

    if let Decision::Rejected {
        retry_after_secs,
        window,
        ..
    } = decision
    {
        state.event_bus.publish(DomainEvent::AdmissionRejected {
            identity: identity.clone(),
            window: window.to_string(),
            retry_after_secs,
            timestamp: Utc::now(),
        });
        session
            .send(error_event(
                format!(
                    "Rate limit exceeded for the {window} window. Try again in {retry_after_secs}s."
                ),
                Some("rate-limited"),
                Some(retry_after_secs),
            ))
            .await;
        session.end_turn();
        return;
    }

    // 4. Count the turn into the drain set.
    let Some(turn_guard) = state.shutdown.begin_turn() else {
        session
            .send(error_event(
                "The server is shutting down; no new messages are accepted.",
                Some("draining"),
                None,
            ))
            .await;
        session.end_turn();
        return;
    };

    // 5. Snapshot the turn. Clients that keep their own history send it;
    //    otherwise we fall back to the stored chat.
    let prior_messages = if payload.chat_history.is_empty() {
        state
            .store
            .history(&identity, &payload.chat_id, HISTORY_FALLBACK_LIMIT)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "History load failed, starting from empty context");
                vec![]
            })
    } else {
        payload.chat_history
    };

    let turn = Turn::new(
        session.id.clone(),
        &payload.chat_id,
        &identity,
        &payload.message,
        prior_messages,
    )
    .with_attachments(payload.attachments);

    let user_message =
        Message::user(&turn.user_text).with_attachments(turn.attachments.clone());
    if let Err(e) = state.store.append(&identity, &turn.chat_id, &user_message).await {
        warn!(error = %e, "Failed to persist user message");
    }

    state.event_bus.publish(DomainEvent::TurnStarted {
        session_id: session.id.to_string(),
        chat_id: turn.chat_id.clone(),
        timestamp: Utc::now(),
    });

    // 6. Run the pipeline off the read loop so the connection stays
    //    responsive (disconnects must be seen to set the cancel flag).
    let state = state.clone();
    let session = session.clone();
    tokio::spawn(async move {
        run_turn(state, session, turn, turn_guard).await;
    });
}

async fn run_turn(
    state: SharedState,
    session: SessionHandle,
    turn: Turn,
    _turn_guard: crate::shutdown::TurnGuard,
) {
    let chat_id = turn.chat_id.clone();

    session
        .send(ServerEvent::Typing(TypingPayload {
            chat_id: chat_id.clone(),
            is_typing: true,
        }))
        .await;

    // Context Augmenter → Tool Orchestrator → Streaming Relay.
    let context = state.augmenter.augment(&turn).await;
    let cancelled = session.cancellation_flag();
    let events = state.orchestrator.run(context, cancelled.clone());

    let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
    let relay = tokio::spawn(relay_turn(
        session.id.clone(),
        events,
        cancelled,
        chunk_tx,
    ));

    let mut assembled = String::new();
    while let Some(chunk) = chunk_rx.recv().await {
        if chunk.is_final {
            session
                .send(ServerEvent::MessageResponse(MessageResponsePayload {
                    chat_id: chat_id.clone(),
                    message: String::new(),
                    is_complete: true,
                    full_response: Some(assembled.clone()),
                    attachments: vec![],
                }))
                .await;
        } else {
            assembled.push_str(&chunk.text);
            session
                .send(ServerEvent::MessageResponse(MessageResponsePayload {
                    chat_id: chat_id.clone(),
                    message: chunk.text,
                    is_complete: false,
                    full_response: None,
                    attachments: vec![],
                }))
                .await;
        }
    }

    let outcome = relay.await.unwrap_or_default();

    if let Some(error) = outcome.error {
        // ModelError is one of the two failure kinds that surface to the
        // client. The turn is aborted; the session stays usable.
        session
            .send(error_event(error, Some("model-error"), None))
            .await;
    } else if let Some(full_response) = outcome.full_response {
        if let Err(e) = state
            .store
            .append(&turn.identity, &chat_id, &Message::assistant(&full_response))
            .await
        {
            warn!(error = %e, "Failed to persist assistant message");
        }

        // Meaningful exchanges feed future cross-session recall.
        if state.auto_save && turn.user_text.len() >= 10 && full_response.len() >= 10 {
            let summary = format!(
                "User said: {}\nAssistant replied: {}",
                turn.user_text, full_response
            );
            match state.memory.store(&turn.identity, &chat_id, &summary).await {
                Ok(()) => {
                    state.event_bus.publish(DomainEvent::MemoryAccessed {
                        operation: "store".into(),
                        count: 1,
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => warn!(error = %e, "Failed to auto-save turn to memory"),
            }
        }
    }

    session
        .send(ServerEvent::Typing(TypingPayload {
            chat_id,
            is_typing: false,
        }))
        .await;
    session.end_turn();
}

async fn handle_delete_chat(
    state: &SharedState,
    session: &SessionHandle,
    payload: DeleteChatPayload,
) {
    let identity = if payload.user_id.is_empty() {
        session.identity.clone()
    } else {
        payload.user_id.clone()
    };

    match state.memory.delete_chat(&identity, &payload.chat_id).await {
        Ok(removed) => {
            debug!(chat_id = %payload.chat_id, removed, "Semantic memory entries deleted");
            state.event_bus.publish(DomainEvent::MemoryAccessed {
                operation: "delete".into(),
                count: removed,
                timestamp: Utc::now(),
            });
        }
        // Absorbed: deletion failures degrade silently, like other
        // infrastructure faults.
        Err(e) => warn!(error = %e, chat_id = %payload.chat_id, "Memory deletion failed"),
    }

    if let Err(e) = state.store.delete_chat(&identity, &payload.chat_id).await {
        warn!(error = %e, chat_id = %payload.chat_id, "Chat store deletion failed");
    }
}

fn rate_limit_event(snapshot: &RateSnapshot) -> ServerEvent {
    ServerEvent::RateLimitInfo(RateLimitInfoPayload {
        remaining: WindowValues {
            minute: snapshot.minute.remaining as u64,
            hour: snapshot.hour.remaining as u64,
        },
        limit: WindowValues {
            minute: snapshot.minute.limit as u64,
            hour: snapshot.hour.limit as u64,
        },
        reset_at: WindowValues {
            minute: snapshot.minute.reset_at_ms,
            hour: snapshot.hour.reset_at_ms,
        },
    })
}

fn error_event(
    message: impl Into<String>,
    code: Option<&str>,
    retry_after_secs: Option<u64>,
) -> ServerEvent {
    ServerEvent::Error(ErrorPayload {
        message: message.into(),
        code: code.map(String::from),
        retry_after_secs,
    })
}
