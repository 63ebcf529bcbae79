//! API (subscriber) connection handling: the local control-plane side of
//! the dissemination engine (types 500-503).

use std::sync::Weak;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::codec::{self, Message};
use crate::network::dissemination::Dissemination;
use crate::network::subscribers::{ApiHandle, ApiId};

/// Spawns an API connection task. Returns nothing: the task deregisters
/// itself from the subscriber registry on close.
pub fn spawn(id: ApiId, stream: TcpStream, dissemination: Weak<Dissemination>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let api_handle = ApiHandle::new(id, out_tx);
    tokio::spawn(run(id, stream, dissemination, api_handle, out_rx));
}

async fn run(
    id: ApiId,
    mut stream: TcpStream,
    dissemination: Weak<Dissemination>,
    api_handle: ApiHandle,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let (mut read_half, mut write_half) = stream.split();

    loop {
        tokio::select! {
            frame = codec::read_frame(&mut read_half) => {
                let Some(d) = dissemination.upgrade() else { break };
                match frame {
                    Ok(bytes) => match Message::parse(&bytes) {
                        Ok(msg) if msg.is_api_message() => {
                            handle_message(id, msg, &d, &api_handle).await;
                        }
                        Ok(_) => {
                            warn!(api_id = id, "disallowed message type received on api connection");
                            break;
                        }
                        Err(_) => {
                            warn!(api_id = id, hex = %hex::encode(&bytes), "malformed frame");
                            break;
                        }
                    },
                    Err(_) => break,
                }
            }
            out = outbound_rx.recv() => {
                match out {
                    Some(msg) => {
                        if write_half.write_all(&msg.encode()).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if let Some(d) = dissemination.upgrade() {
        debug!(api_id = id, "api connection closed, deregistering subscriptions");
        d.remove_subscriber(id).await;
    }
}

async fn handle_message(id: ApiId, msg: Message, dissemination: &Dissemination, api_handle: &ApiHandle) {
    match msg {
        Message::GossipAnnounce { ttl, data_type, payload } => {
            dissemination.local_originate(ttl, data_type, payload).await;
        }
        Message::GossipNotify { data_type } => {
            dissemination.add_notify(data_type, api_handle.clone()).await;
        }
        Message::GossipValidation { msg_id, valid } => {
            dissemination.handle_subscriber_validation(id, msg_id, valid).await;
        }
        _ => unreachable!("is_api_message() guarantees one of the above"),
    }
}
