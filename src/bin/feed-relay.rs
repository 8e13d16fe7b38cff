use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// `{"event": ..., "data": ...}`, the framing every client speaks.
#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Body of a `publish` frame: fan `payload` out as `event` to `room`.
#[derive(Debug, Deserialize)]
struct Publish {
    room: String,
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Clone)]
struct Outbound {
    room: Arc<str>,
    text: Arc<str>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let addr = env::var("STANDINGS_RELAY_BIND").unwrap_or_else(|_| "0.0.0.0:4000".to_string());
    let listener = TcpListener::bind(&addr).await?;
    let (tx, _rx) = broadcast::channel::<Outbound>(512);

    eprintln!("feed relay listening on {addr}");

    loop {
        let (stream, peer) = listener.accept().await?;
        let tx = tx.clone();
        let rx = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, tx, rx).await {
                eprintln!("client {peer} disconnected: {e}");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    tx: broadcast::Sender<Outbound>,
    mut rx: broadcast::Receiver<Outbound>,
) -> anyhow::Result<()> {
    let ws = accept_async(stream).await?;
    let (mut write, mut read) = ws.split();
    let mut rooms: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            inbound = read.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => handle_frame(&text, &mut rooms, &tx),
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            outbound = rx.recv() => {
                match outbound {
                    Ok(msg) if rooms.contains(msg.room.as_ref()) => {
                        write.send(Message::Text(msg.text.to_string().into())).await?;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        eprintln!("client lagged, skipped {n} messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    Ok(())
}

fn handle_frame(text: &str, rooms: &mut HashSet<String>, tx: &broadcast::Sender<Outbound>) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            eprintln!("ignoring unparseable frame: {e}");
            return;
        }
    };

    if frame.event == "publish" {
        match serde_json::from_value::<Publish>(frame.data) {
            Ok(publish) => {
                let out = Frame { event: publish.event, data: publish.payload };
                match serde_json::to_string(&out) {
                    Ok(text) => {
                        let _ = tx.send(Outbound { room: publish.room.into(), text: text.into() });
                    }
                    Err(e) => eprintln!("cannot encode publish: {e}"),
                }
            }
            Err(e) => eprintln!("bad publish frame: {e}"),
        }
        return;
    }

    let Some(id) = room_id(&frame.data) else {
        return;
    };
    if let Some(kind) = frame.event.strip_prefix("join:") {
        rooms.insert(format!("{kind}:{id}"));
    } else if let Some(kind) = frame.event.strip_prefix("leave:") {
        rooms.remove(&format!("{kind}:{id}"));
    }
}

fn room_id(data: &Value) -> Option<String> {
    match data {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
