//! WebSocket endpoint that streams event frames to observers.
//!
//! Inbound frames are ignored; the socket exists only to push the JSON
//! events produced by the broadcaster. No authentication, permissive origin.

use crate::gateway::events::EventBroadcaster;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::AggregatedMessage;
use futures_util::StreamExt;
use std::sync::Arc;

use crate::AppState;

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, stream)?;

    let broadcaster = state.events.clone();
    actix_web::rt::spawn(handle_ws_connection(session, msg_stream, broadcaster));

    Ok(response)
}

async fn handle_ws_connection(
    mut session: actix_ws::Session,
    msg_stream: actix_ws::MessageStream,
    broadcaster: Arc<EventBroadcaster>,
) {
    let (client_id, mut event_rx) = broadcaster.subscribe();
    log::info!(
        "event subscriber {} connected (total: {})",
        client_id,
        broadcaster.client_count()
    );

    let mut msg_stream = msg_stream
        .aggregate_continuations()
        .max_continuation_size(64 * 1024);

    loop {
        tokio::select! {
            frame = event_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if session.text(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = msg_stream.next() => {
                match msg {
                    Some(Ok(AggregatedMessage::Ping(data))) => {
                        if session.pong(&data).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(AggregatedMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        log::debug!("websocket error for {}: {:?}", client_id, err);
                        break;
                    }
                    // Inbound text/binary frames carry no protocol.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    broadcaster.unsubscribe(&client_id);
    let _ = session.close(None).await;
    log::info!("event subscriber {} disconnected", client_id);
}
