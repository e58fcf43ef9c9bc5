//! Per-connection handler: assign a session handle, register its push
//! channel, then relay events and pushes until disconnect.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crosspath_common::{now_ms, SessionId};
use crosspath_core::{RendezvousManager, ServerPush};

use crate::protocol::ClientEvent;

/// Capacity of one session's push channel.
const PUSH_BUFFER: usize = 256;

/// Handle a single WebSocket connection.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    manager: Arc<RendezvousManager>,
) {
    let (mut sink, mut stream) = ws.split();

    let session = SessionId::new();
    let (tx, mut rx) = mpsc::channel::<ServerPush>(PUSH_BUFFER);
    manager.registry().register(session.clone(), tx).await;

    tracing::info!(peer = %addr, session = %session, "client connected");

    loop {
        tokio::select! {
            // Pushes for this session → client's WebSocket.
            Some(push) = rx.recv() => {
                let json = serde_json::to_string(&push).unwrap();
                if sink.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }

            // Frames from the client → one event task each.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientEvent>(&text) {
                            Ok(event) => {
                                let manager = Arc::clone(&manager);
                                let session = session.clone();
                                tokio::spawn(async move {
                                    dispatch_event(manager, event, session).await;
                                });
                            }
                            Err(e) => {
                                tracing::warn!(peer = %addr, error = %e, "unparseable event");
                                manager
                                    .registry()
                                    .push(
                                        &session,
                                        ServerPush::Error {
                                            text: format!("error:{e}"),
                                        },
                                    )
                                    .await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    tracing::info!(peer = %addr, session = %session, "client disconnected");
    manager.registry().unregister(&session).await;
}

/// Route one inbound event into the orchestrator.
async fn dispatch_event(manager: Arc<RendezvousManager>, event: ClientEvent, session: SessionId) {
    let now = now_ms();
    match event {
        ClientEvent::Watch { name, page } => {
            manager.watch(&name, &page, &session, now).await;
        }
        ClientEvent::Confirm { name, answer } => {
            manager.confirm(&name, answer, &session, now).await;
        }
        ClientEvent::Finalize { name, answer } => {
            manager.finalize(&name, answer, &session, now).await;
        }
        ClientEvent::Register {
            name,
            gender,
            profile,
        } => {
            manager.register_user(&name, &gender, &profile, &session).await;
        }
        ClientEvent::GetUser { name } => {
            manager.get_user(&name, &session).await;
        }
    }
}
