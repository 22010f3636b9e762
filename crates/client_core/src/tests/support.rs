//! Scripted seam implementations shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{ChatMessage, GroupId, MessageId, MessageKind, UserId, UserSummary},
    protocol::ServerFrame,
};
use tokio::{sync::mpsc, time::Instant};
use url::Url;

use crate::{
    config::SocketConfig,
    rest::{ChatApi, HistoryPage, SharedToken},
    socket::RealtimeSocket,
    transport::{Transport, TransportEvent, TransportLink},
};

#[derive(Clone, Copy)]
pub(crate) enum OpenOutcome {
    Succeed,
    Fail,
}

/// The far end of one successfully opened mock link.
pub(crate) struct LinkHandle {
    pub outbound: mpsc::UnboundedReceiver<String>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl LinkHandle {
    pub(crate) fn push_frame(&self, frame: &ServerFrame) {
        self.push_raw(&serde_json::to_string(frame).expect("serialize frame"));
    }

    pub(crate) fn push_raw(&self, text: &str) {
        self.events
            .send(TransportEvent::Frame(text.to_string()))
            .expect("read task gone");
    }

    pub(crate) fn push_close(&self, clean: bool) {
        let _ = self.events.send(TransportEvent::Closed { clean });
    }

    /// Everything the client wrote so far, decoded as JSON values.
    pub(crate) fn drain_outbound(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.outbound.try_recv() {
            frames.push(serde_json::from_str(&text).expect("outbound frame is json"));
        }
        frames
    }

    pub(crate) fn drain_outbound_of_type(&mut self, kind: &str) -> Vec<serde_json::Value> {
        self.drain_outbound()
            .into_iter()
            .filter(|frame| frame["type"] == kind)
            .collect()
    }
}

/// Transport whose `open()` calls are scripted per invocation; unscripted
/// opens succeed. Records the url and instant of every open.
#[derive(Default)]
pub(crate) struct MockTransport {
    plan: Mutex<VecDeque<OpenOutcome>>,
    opens: Mutex<Vec<(Url, Instant)>>,
    links: Mutex<Vec<Option<LinkHandle>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn plan_outcomes(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        self.plan.lock().expect("plan lock").extend(outcomes);
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.lock().expect("opens lock").len()
    }

    pub(crate) fn open_urls(&self) -> Vec<Url> {
        self.opens
            .lock()
            .expect("opens lock")
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub(crate) fn open_times(&self) -> Vec<Instant> {
        self.opens
            .lock()
            .expect("opens lock")
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    /// Take ownership of the nth successful link's far end.
    pub(crate) fn take_link(&self, index: usize) -> LinkHandle {
        self.links.lock().expect("links lock")[index]
            .take()
            .expect("link already taken or never opened")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<TransportLink> {
        self.opens
            .lock()
            .expect("opens lock")
            .push((url.clone(), Instant::now()));
        let outcome = self
            .plan
            .lock()
            .expect("plan lock")
            .pop_front()
            .unwrap_or(OpenOutcome::Succeed);
        match outcome {
            OpenOutcome::Fail => Err(anyhow!("connection refused")),
            OpenOutcome::Succeed => {
                let (sender, outbound) = mpsc::unbounded_channel();
                let (events_tx, events) = mpsc::unbounded_channel();
                self.links
                    .lock()
                    .expect("links lock")
                    .push(Some(LinkHandle {
                        outbound,
                        events: events_tx,
                    }));
                Ok(TransportLink { sender, events })
            }
        }
    }
}

/// History pages are served front-to-back from the scripted queue; an empty
/// queue yields empty pages. REST sends fabricate confirmed messages.
#[derive(Default)]
pub(crate) struct MockChatApi {
    pages: Mutex<VecDeque<HistoryPage>>,
    pub sent: Mutex<Vec<(GroupId, String)>>,
    next_id: AtomicI64,
}

impl MockChatApi {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        })
    }

    pub(crate) fn queue_page(&self, page: HistoryPage) {
        self.pages.lock().expect("pages lock").push_back(page);
    }
}

#[async_trait]
impl ChatApi for MockChatApi {
    async fn fetch_history(
        &self,
        _group_id: GroupId,
        limit: u32,
        offset: u32,
    ) -> Result<HistoryPage> {
        Ok(self
            .pages
            .lock()
            .expect("pages lock")
            .pop_front()
            .unwrap_or(HistoryPage {
                messages: Vec::new(),
                limit,
                offset,
            }))
    }

    async fn send_message(&self, group_id: GroupId, content: &str) -> Result<ChatMessage> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((group_id, content.to_string()));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(sample_message(id, group_id.0, id))
    }
}

/// A message whose `created_at` is `offset_secs` past a fixed base, so tests
/// control ordering precisely.
pub(crate) fn sample_message(id: i64, group_id: i64, offset_secs: i64) -> ChatMessage {
    let base: DateTime<Utc> = "2025-06-01T12:00:00Z".parse().expect("timestamp");
    ChatMessage {
        id: MessageId(id),
        group_id: GroupId(group_id),
        sender_id: UserId(7),
        content: format!("message {id}"),
        kind: MessageKind::Text,
        metadata: String::new(),
        sender: UserSummary {
            id: UserId(7),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar: String::new(),
        },
        created_at: base + chrono::Duration::seconds(offset_secs),
    }
}

pub(crate) fn message_ids(messages: &[ChatMessage]) -> Vec<i64> {
    messages.iter().map(|m| m.id.0).collect()
}

/// A connected socket over a fresh mock transport, with its link's far end.
pub(crate) async fn connected_socket() -> (Arc<RealtimeSocket>, Arc<MockTransport>, LinkHandle) {
    let transport = MockTransport::new();
    let socket = RealtimeSocket::new_with_transport(
        SocketConfig::default(),
        "http://chat.test",
        SharedToken::new("token-1"),
        transport.clone(),
    );
    socket.connect().await.expect("connect");
    let link = transport.take_link(0);
    (socket, transport, link)
}

/// Let spawned tasks drain their ready work without advancing the clock.
pub(crate) async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Poll until `cond` holds, letting the paused clock auto-advance through
/// pending timers. Panics after ten paused-clock minutes.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(600), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
