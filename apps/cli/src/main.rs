use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use client_core::{
    ChatStore, HttpChatApi, PresenceTracker, RealtimeSocket, RoomSession, SharedToken,
    DEFAULT_HISTORY_LIMIT,
};
use shared::domain::{ChatMessage, GroupId, UserId};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    server_url: String,
    #[arg(long)]
    token: String,
    #[arg(long)]
    group_id: i64,
    #[arg(long)]
    user_id: i64,
    /// Optional message to send after joining.
    #[arg(long)]
    send: Option<String>,
}

fn print_message(message: &ChatMessage) {
    println!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M:%S"),
        message.sender.username,
        message.content
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let tokens = SharedToken::new(args.token);
    let socket = RealtimeSocket::new(args.server_url.clone(), tokens.clone());
    let store = Arc::new(ChatStore::new());
    let presence = Arc::new(PresenceTracker::new(Arc::clone(&socket)));
    let api = Arc::new(HttpChatApi::new(args.server_url, tokens));

    let session = RoomSession::open(
        Arc::clone(&socket),
        Arc::clone(&store),
        presence,
        api,
        GroupId(args.group_id),
        UserId(args.user_id),
    )
    .await?;

    session.load_initial_history(DEFAULT_HISTORY_LIMIT).await?;
    for message in session.messages() {
        print_message(&message);
    }

    if let Some(content) = args.send {
        if session.send_message(content, None).await {
            println!("message sent");
        } else {
            eprintln!("message dropped: not connected");
        }
    }

    println!("watching group {} (ctrl-c to quit)", args.group_id);
    let mut printed = session.messages().len();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let messages = session.messages();
                for message in &messages[printed.min(messages.len())..] {
                    print_message(message);
                }
                printed = messages.len();
                for typist in session.typing_users() {
                    println!("{} is typing...", typist.username);
                }
            }
        }
    }

    session.close().await;
    socket.disconnect().await;
    Ok(())
}
