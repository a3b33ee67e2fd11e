use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use taskhub_db::Database;
use taskhub_types::events::{Channel, GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

type Subscriptions = Arc<RwLock<HashSet<String>>>;

/// Serve a WebSocket whose bearer token was already verified at upgrade.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, db, user_id, &username).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    user_id: Uuid,
    username: &str,
) {
    let mut broadcast_rx = dispatcher.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));
    let send_subscriptions = subscriptions.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let notification = match result {
                        Ok(n) => n,
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Gateway receiver lagged by {} notifications", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    if !send_subscriptions.read().await.contains(&notification.channel) {
                        continue;
                    }
                    if send_event(&mut sender, &GatewayEvent::Event(notification)).await.is_err() {
                        break;
                    }
                }
                reply = reply_rx.recv() => {
                    let Some(event) = reply else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_PONGS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let username_recv = username.to_string();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&db, user_id, cmd, &subscriptions, &reply_tx).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
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

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Could not encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn handle_command(
    db: &Arc<Database>,
    user_id: Uuid,
    cmd: GatewayCommand,
    subscriptions: &Subscriptions,
    reply_tx: &mpsc::UnboundedSender<GatewayEvent>,
) {
    match cmd {
        GatewayCommand::Subscribe { channels } => {
            debug!("{} subscribing to {} channels", user_id, channels.len());
            for name in channels {
                match authorize_channel(db, user_id, &name).await {
                    Some(channel) => {
                        subscriptions.write().await.insert(channel.to_string());
                    }
                    None => {
                        let _ = reply_tx.send(GatewayEvent::SubscribeDenied { channel: name });
                    }
                }
            }
        }

        GatewayCommand::Unsubscribe { channels } => {
            let mut subs = subscriptions.write().await;
            for name in &channels {
                subs.remove(name);
            }
        }
    }
}

/// Resolve a channel name the user may listen on: threads they can access,
/// and their own personal channel. Anything else is refused.
pub async fn authorize_channel(db: &Arc<Database>, user_id: Uuid, name: &str) -> Option<Channel> {
    let channel: Channel = match name.parse() {
        Ok(channel) => channel,
        Err(e) => {
            debug!("{} asked for malformed channel: {}", user_id, e);
            return None;
        }
    };

    match channel {
        Channel::User(owner) => (owner == user_id).then_some(channel),
        Channel::Thread(thread_id) => {
            let db = db.clone();
            let allowed = tokio::task::spawn_blocking(move || db.can_access_thread(user_id, thread_id)).await;
            match allowed {
                Ok(Ok(true)) => Some(channel),
                Ok(Ok(false)) => None,
                Ok(Err(e)) => {
                    warn!("Access check for {} on {} failed: {}", user_id, thread_id, e);
                    None
                }
                Err(e) => {
                    warn!("Access check task failed: {}", e);
                    None
                }
            }
        }
    }
}
