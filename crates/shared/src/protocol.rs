use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{BillId, ChatMessage, GroupId, MessageId, MessageKind, PaymentStatus, UserId,
        UserSummary},
    error::ApiError,
};

/// The closed set of frame type tags exchanged over the connection. Used as
/// the dispatch key when routing decoded frames to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    ChatMessage,
    Typing,
    JoinGroup,
    LeaveGroup,
    PaymentUpdate,
    BillSettled,
    Error,
    Connected,
    Disconnected,
    Ping,
}

/// Frames this client sends. Serializes to `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientFrame {
    ChatMessage {
        group_id: GroupId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<String>,
    },
    Typing {
        group_id: GroupId,
        is_typing: bool,
    },
    JoinGroup {
        group_id: GroupId,
    },
    LeaveGroup {
        group_id: GroupId,
    },
    Ping {},
}

impl ClientFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            ClientFrame::ChatMessage { .. } => FrameKind::ChatMessage,
            ClientFrame::Typing { .. } => FrameKind::Typing,
            ClientFrame::JoinGroup { .. } => FrameKind::JoinGroup,
            ClientFrame::LeaveGroup { .. } => FrameKind::LeaveGroup,
            ClientFrame::Ping {} => FrameKind::Ping,
        }
    }
}

/// A pushed chat message, sender fields denormalized inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePush {
    pub id: MessageId,
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub sender_username: String,
    pub sender_display_name: String,
    pub sender_avatar: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

impl MessagePush {
    /// Rebuild the stored message shape from the denormalized push fields.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            group_id: self.group_id,
            sender_id: self.sender_id,
            content: self.content,
            kind: self.kind,
            metadata: self.metadata,
            sender: UserSummary {
                id: self.sender_id,
                username: self.sender_username,
                display_name: self.sender_display_name,
                avatar: self.sender_avatar,
            },
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPush {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub username: String,
    pub display_name: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentUpdatePush {
    pub bill_id: BillId,
    pub user_id: UserId,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillSettledPush {
    pub bill_id: BillId,
    pub group_id: GroupId,
    pub title: String,
    pub settled_at: DateTime<Utc>,
}

/// Payload of the server's `connected`/`disconnected` session notices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPush {
    pub user_id: UserId,
    pub connected_at: DateTime<Utc>,
}

/// Frames the server pushes. Same envelope as [`ClientFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerFrame {
    ChatMessage(MessagePush),
    Typing(TypingPush),
    PaymentUpdate(PaymentUpdatePush),
    BillSettled(BillSettledPush),
    Error(ApiError),
    Connected(SessionPush),
    Disconnected(SessionPush),
}

impl ServerFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            ServerFrame::ChatMessage(_) => FrameKind::ChatMessage,
            ServerFrame::Typing(_) => FrameKind::Typing,
            ServerFrame::PaymentUpdate(_) => FrameKind::PaymentUpdate,
            ServerFrame::BillSettled(_) => FrameKind::BillSettled,
            ServerFrame::Error(_) => FrameKind::Error,
            ServerFrame::Connected(_) => FrameKind::Connected,
            ServerFrame::Disconnected(_) => FrameKind::Disconnected,
        }
    }
}
