use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tracing::{error, warn};

use crate::{events::ClientEvent, hub::Hub};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(State(hub): State<Arc<Hub>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |stream| session(stream, hub))
}

pub(crate) async fn session(stream: WebSocket, hub: Arc<Hub>) {
    let (sender, receiver) = stream.split();
    run_session(sender, receiver, hub).await;
}

/// Pumps outbound events into `sender` and applies inbound frames until the
/// peer closes or the outbound side fails.
pub(crate) async fn run_session<W, R, E>(mut sender: W, mut receiver: R, hub: Arc<Hub>)
where
    W: Sink<Message> + Send + Unpin + 'static,
    R: Stream<Item = Result<Message, E>> + Send + Unpin,
    E: Send,
{
    let (connection, mut rx) = hub.connect().await;

    let mut outbound = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    error!("failed to encode {}: {err}", event.name());
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                let data = match frame {
                    Message::Text(_) | Message::Binary(_) => frame.into_data(),
                    Message::Close(_) => break,
                    _ => continue,
                };
                match serde_json::from_slice::<ClientEvent>(&data) {
                    Ok(event) => hub.handle(connection, event).await,
                    Err(err) => warn!(%connection, "ignoring malformed frame: {err}"),
                }
            }
            _ = &mut outbound => break,
        }
    }

    outbound.abort();
    hub.disconnect(connection).await;
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures_util::{sink, stream};
    use serde_json::Value;
    use tokio::{
        sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender},
        task::JoinHandle,
    };

    use super::*;
    use crate::{presence::ConnectionHint, store::MemoryStore};

    /// Runs a session over in-process channels: frames sent on the returned
    /// sender reach the session, and its outbound frames come out the receiver.
    fn open(hub: Arc<Hub>) -> (UnboundedSender<Message>, UnboundedReceiver<Message>, JoinHandle<()>) {
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Message>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();

        let frames = Box::pin(stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok::<_, Infallible>(frame), rx))
        }));
        let sender = Box::pin(sink::unfold(out_tx, |tx, frame: Message| async move {
            tx.send(frame)?;
            Ok::<_, SendError<Message>>(tx)
        }));

        (in_tx, out_rx, tokio::spawn(run_session(sender, frames, hub)))
    }

    async fn next_json(out: &mut UnboundedReceiver<Message>) -> Value {
        match out.recv().await {
            Some(Message::Text(text)) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    fn text(body: &str) -> Message {
        Message::Text(body.to_owned().into())
    }

    #[tokio::test]
    async fn session_applies_frames_until_peer_closes() {
        let hub = Hub::init(Arc::new(MemoryStore::new())).await.unwrap();
        hub.login("alice", ConnectionHint::default()).await.unwrap();
        let (in_tx, mut out_rx, session) = open(hub.clone());

        let connected = next_json(&mut out_rx).await;
        assert_eq!(connected["event"], "connected");
        let connection_id = connected["data"]["connectionId"].clone();
        assert!(connection_id.is_string());

        in_tx.send(text("this is not json")).unwrap();
        in_tx.send(text(r#"{"event":"join","data":"alice"}"#)).unwrap();

        let update = next_json(&mut out_rx).await;
        assert_eq!(update["event"], "updateUsers");
        assert_eq!(update["data"]["alice"]["online"], true);
        assert_eq!(update["data"]["alice"]["socketId"], connection_id);
        assert!(hub.presence.live_connection("alice").await.is_some());

        drop(in_tx);
        session.await.unwrap();

        let record = hub.presence.get("alice").await.unwrap();
        assert!(!record.online);
        assert_eq!(record.connection, None);
    }

    #[tokio::test]
    async fn close_frame_ends_session() {
        let hub = Hub::init(Arc::new(MemoryStore::new())).await.unwrap();
        hub.login("bob", ConnectionHint::default()).await.unwrap();
        let (in_tx, mut out_rx, session) = open(hub.clone());
        next_json(&mut out_rx).await;

        in_tx.send(text(r#"{"event":"join","data":"bob"}"#)).unwrap();
        in_tx.send(Message::Close(None)).unwrap();
        session.await.unwrap();

        assert!(!hub.presence.get("bob").await.unwrap().online);
        assert!(in_tx.is_closed());
    }
}
