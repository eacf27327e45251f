use crate::{ThreadItem, ThreadSummary, TurnStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanStepStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: String,
    pub status: PlanStepStatus,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserInputOption {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputQuestion {
    pub id: String,
    #[serde(default)]
    pub header: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<UserInputOption>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalRequest {
    pub workspace_id: String,
    pub request_id: Value,
    pub method: String,
    pub thread_id: Option<String>,
    pub params: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserInputRequest {
    pub workspace_id: String,
    pub request_id: Value,
    pub thread_id: String,
    pub turn_id: Option<String>,
    pub item_id: Option<String>,
    pub questions: Vec<UserInputQuestion>,
}

/// Push events consumed by the engine.
///
/// This is a closed set: notifications that do not map to a variant are dropped by
/// [`decode_notification`].
#[derive(Clone, Debug)]
pub enum ServerEvent {
    Connected {
        workspace_id: String,
    },
    Disconnected {
        workspace_id: String,
    },
    Heartbeat {
        workspace_id: String,
    },
    AccountUpdated {
        workspace_id: String,
    },
    ThreadStarted {
        workspace_id: String,
        thread: ThreadSummary,
    },
    ThreadNameUpdated {
        workspace_id: String,
        thread_id: String,
        name: Option<String>,
    },
    TurnStarted {
        workspace_id: String,
        thread_id: String,
        turn_id: String,
    },
    TurnCompleted {
        workspace_id: String,
        thread_id: String,
        turn_id: String,
        status: Option<TurnStatus>,
    },
    TurnError {
        workspace_id: String,
        thread_id: String,
        turn_id: Option<String>,
        message: String,
        will_retry: bool,
    },
    TurnPlanUpdated {
        workspace_id: String,
        thread_id: String,
        turn_id: String,
        explanation: Option<String>,
        plan: Vec<PlanStep>,
    },
    TurnDiffUpdated {
        workspace_id: String,
        thread_id: String,
        turn_id: String,
        diff: String,
    },
    ItemStarted {
        workspace_id: String,
        thread_id: String,
        item: ThreadItem,
    },
    ItemCompleted {
        workspace_id: String,
        thread_id: String,
        item: ThreadItem,
    },
    AgentMessageDelta {
        workspace_id: String,
        thread_id: String,
        item_id: String,
        delta: String,
    },
    ApprovalRequested(ApprovalRequest),
    UserInputRequested(UserInputRequest),
}

impl ServerEvent {
    pub fn workspace_id(&self) -> &str {
        match self {
            Self::Connected { workspace_id }
            | Self::Disconnected { workspace_id }
            | Self::Heartbeat { workspace_id }
            | Self::AccountUpdated { workspace_id }
            | Self::ThreadStarted { workspace_id, .. }
            | Self::ThreadNameUpdated { workspace_id, .. }
            | Self::TurnStarted { workspace_id, .. }
            | Self::TurnCompleted { workspace_id, .. }
            | Self::TurnError { workspace_id, .. }
            | Self::TurnPlanUpdated { workspace_id, .. }
            | Self::TurnDiffUpdated { workspace_id, .. }
            | Self::ItemStarted { workspace_id, .. }
            | Self::ItemCompleted { workspace_id, .. }
            | Self::AgentMessageDelta { workspace_id, .. } => workspace_id,
            Self::ApprovalRequested(request) => &request.workspace_id,
            Self::UserInputRequested(request) => &request.workspace_id,
        }
    }
}

fn str_field(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn turn_field(params: &Value) -> (Option<String>, Option<TurnStatus>) {
    let turn = params.get("turn");
    let id = turn
        .and_then(|turn| str_field(turn, "id"))
        .or_else(|| str_field(params, "turnId"));
    let status = turn
        .and_then(|turn| turn.get("status"))
        .and_then(|status| serde_json::from_value(status.clone()).ok());
    (id, status)
}

/// Maps a server notification (or server-initiated request when `request_id` is set)
/// onto a [`ServerEvent`].
pub fn decode_notification(
    workspace_id: &str,
    method: &str,
    params: &Value,
    request_id: Option<&Value>,
) -> Option<ServerEvent> {
    let workspace_id = workspace_id.to_owned();
    let thread_id = str_field(params, "threadId");

    match method {
        "codex/connected" => Some(ServerEvent::Connected { workspace_id }),
        "codex/disconnected" => Some(ServerEvent::Disconnected { workspace_id }),
        "codex/heartbeat" => Some(ServerEvent::Heartbeat { workspace_id }),
        "account/updated" => Some(ServerEvent::AccountUpdated { workspace_id }),
        "thread/started" => {
            let thread = serde_json::from_value(params.get("thread")?.clone()).ok()?;
            Some(ServerEvent::ThreadStarted {
                workspace_id,
                thread,
            })
        }
        "thread/name/updated" => Some(ServerEvent::ThreadNameUpdated {
            workspace_id,
            thread_id: thread_id?,
            name: str_field(params, "threadName").or_else(|| str_field(params, "name")),
        }),
        "turn/started" => {
            let (turn_id, _) = turn_field(params);
            Some(ServerEvent::TurnStarted {
                workspace_id,
                thread_id: thread_id?,
                turn_id: turn_id?,
            })
        }
        "turn/completed" => {
            let (turn_id, status) = turn_field(params);
            Some(ServerEvent::TurnCompleted {
                workspace_id,
                thread_id: thread_id?,
                turn_id: turn_id.unwrap_or_default(),
                status,
            })
        }
        "error" => {
            let error = params.get("error");
            let message = error
                .and_then(|error| str_field(error, "message"))
                .or_else(|| str_field(params, "message"))
                .unwrap_or_else(|| "Unknown error".to_owned());
            Some(ServerEvent::TurnError {
                workspace_id,
                thread_id: thread_id?,
                turn_id: str_field(params, "turnId"),
                message,
                will_retry: params
                    .get("willRetry")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
        }
        "turn/plan/updated" => Some(ServerEvent::TurnPlanUpdated {
            workspace_id,
            thread_id: thread_id?,
            turn_id: str_field(params, "turnId").unwrap_or_default(),
            explanation: str_field(params, "explanation"),
            plan: params
                .get("plan")
                .and_then(|plan| serde_json::from_value(plan.clone()).ok())
                .unwrap_or_default(),
        }),
        "turn/diff/updated" => Some(ServerEvent::TurnDiffUpdated {
            workspace_id,
            thread_id: thread_id?,
            turn_id: str_field(params, "turnId").unwrap_or_default(),
            diff: params
                .get("diff")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }),
        "item/started" | "item/completed" => {
            let item: ThreadItem = serde_json::from_value(params.get("item")?.clone()).ok()?;
            let thread_id = thread_id?;
            if method == "item/started" {
                Some(ServerEvent::ItemStarted {
                    workspace_id,
                    thread_id,
                    item,
                })
            } else {
                Some(ServerEvent::ItemCompleted {
                    workspace_id,
                    thread_id,
                    item,
                })
            }
        }
        "item/agentMessage/delta" => Some(ServerEvent::AgentMessageDelta {
            workspace_id,
            thread_id: thread_id?,
            item_id: str_field(params, "itemId")?,
            delta: params
                .get("delta")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        }),
        "item/tool/requestUserInput" => Some(ServerEvent::UserInputRequested(UserInputRequest {
            workspace_id,
            request_id: request_id?.clone(),
            thread_id: thread_id?,
            turn_id: str_field(params, "turnId"),
            item_id: str_field(params, "itemId"),
            questions: params
                .get("questions")
                .and_then(|questions| serde_json::from_value(questions.clone()).ok())
                .unwrap_or_default(),
        })),
        method if method.ends_with("requestApproval") => {
            Some(ServerEvent::ApprovalRequested(ApprovalRequest {
                workspace_id,
                request_id: request_id?.clone(),
                method: method.to_owned(),
                thread_id,
                params: params.clone(),
            }))
        }
        _ => None,
    }
}
