use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ItemStatus {
    InProgress,
    Completed,
    Failed,
    Declined,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReviewState {
    Started,
    Completed,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ItemKind {
    Message {
        role: MessageRole,
        text: String,
        images: Vec<String>,
    },
    Reasoning {
        summary: String,
    },
    CommandExecution {
        command: String,
        status: Option<ItemStatus>,
        output: String,
        exit_code: Option<i32>,
        duration_ms: Option<i64>,
    },
    FileChange {
        paths: Vec<String>,
        status: Option<ItemStatus>,
    },
    ToolCall {
        server: String,
        tool: String,
        status: Option<ItemStatus>,
    },
    SubAgent {
        tool: String,
        receiver_thread_ids: Vec<String>,
        status: Option<ItemStatus>,
    },
    WebSearch {
        query: String,
    },
    Plan {
        text: String,
    },
    Review {
        state: ReviewState,
        text: String,
    },
    Compaction,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConversationItem {
    pub id: String,
    pub kind: ItemKind,
}

impl ConversationItem {
    pub fn user_message(id: impl Into<String>, text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Message {
                role: MessageRole::User,
                text: text.into(),
                images,
            },
        }
    }

    pub fn assistant_message(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Message {
                role: MessageRole::Assistant,
                text: text.into(),
                images: Vec::new(),
            },
        }
    }

    /// A command that has neither a terminal status nor a duration yet.
    pub fn is_running_command(&self) -> bool {
        match &self.kind {
            ItemKind::CommandExecution {
                status,
                duration_ms,
                ..
            } => {
                duration_ms.is_none()
                    && matches!(status, None | Some(ItemStatus::InProgress))
            }
            _ => false,
        }
    }
}

static LOCAL_ITEM_SEQ: AtomicU64 = AtomicU64::new(1);

/// Ids for items created on this side of the wire (optimistic messages, notices).
pub fn local_item_id(prefix: &str) -> String {
    let seq = LOCAL_ITEM_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("local-{prefix}-{}-{seq}", crate::now_unix_ms())
}

/// Whether the thread is in review mode, judged by the last review marker among its items.
pub fn is_reviewing_from_items(items: &[ConversationItem]) -> bool {
    items
        .iter()
        .rev()
        .find_map(|item| match &item.kind {
            ItemKind::Review { state, .. } => Some(*state == ReviewState::Started),
            _ => None,
        })
        .unwrap_or(false)
}

pub fn has_running_command(items: &[ConversationItem]) -> bool {
    items.iter().any(ConversationItem::is_running_command)
}
