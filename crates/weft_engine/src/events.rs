use crate::messaging::ThreadMessaging;
use crate::store::Store;
use crate::threads::{ThreadActions, parent_thread_from_source};
use crate::watchdog::StaleTurnWatchdog;
use std::sync::Arc;
use weft_api::{ServerEvent, ThreadItem, TurnStatus, UserInput, normalize_timestamp_ms};
use weft_domain::{
    Action, ConversationItem, ItemKind, ItemStatus, MessageRole, PendingApproval,
    PendingUserInput, PlanStep, PlanStepStatus, ReviewState, ThreadId, TurnPhase, TurnPlan,
    UserInputPrompt, WorkspaceId,
};

fn item_status(status: Option<weft_api::ItemStatus>) -> Option<ItemStatus> {
    status.map(|status| match status {
        weft_api::ItemStatus::InProgress => ItemStatus::InProgress,
        weft_api::ItemStatus::Completed => ItemStatus::Completed,
        weft_api::ItemStatus::Failed => ItemStatus::Failed,
        weft_api::ItemStatus::Declined => ItemStatus::Declined,
    })
}

/// Converts a wire item. Unknown kinds and items without an id are skipped.
pub fn conversation_item_from_api(item: &ThreadItem) -> Option<ConversationItem> {
    let id = item.id().filter(|id| !id.is_empty())?.to_owned();
    let kind = match item {
        ThreadItem::UserMessage { content, .. } => {
            let mut text = Vec::new();
            let mut images = Vec::new();
            for input in content {
                match input {
                    UserInput::Text { text: part } => text.push(part.as_str()),
                    UserInput::Image { url } => images.push(url.clone()),
                    UserInput::LocalImage { path } => images.push(path.clone()),
                    UserInput::Unknown => {}
                }
            }
            ItemKind::Message {
                role: MessageRole::User,
                text: text.join("\n"),
                images,
            }
        }
        ThreadItem::AgentMessage { text, .. } => ItemKind::Message {
            role: MessageRole::Assistant,
            text: text.clone(),
            images: Vec::new(),
        },
        ThreadItem::Reasoning { summary, .. } => ItemKind::Reasoning {
            summary: summary.join("\n"),
        },
        ThreadItem::CommandExecution {
            command,
            status,
            aggregated_output,
            exit_code,
            duration_ms,
            ..
        } => ItemKind::CommandExecution {
            command: command.clone(),
            status: item_status(*status),
            output: aggregated_output.clone().unwrap_or_default(),
            exit_code: *exit_code,
            duration_ms: *duration_ms,
        },
        ThreadItem::FileChange {
            changes, status, ..
        } => ItemKind::FileChange {
            paths: changes.iter().map(|change| change.path.clone()).collect(),
            status: item_status(*status),
        },
        ThreadItem::McpToolCall {
            server,
            tool,
            status,
            ..
        } => ItemKind::ToolCall {
            server: server.clone(),
            tool: tool.clone(),
            status: item_status(*status),
        },
        ThreadItem::CollabAgentToolCall {
            tool,
            receiver_thread_ids,
            status,
            ..
        } => ItemKind::SubAgent {
            tool: tool.clone(),
            receiver_thread_ids: receiver_thread_ids.clone(),
            status: item_status(*status),
        },
        ThreadItem::WebSearch { query, .. } => ItemKind::WebSearch {
            query: query.clone(),
        },
        ThreadItem::Plan { text, .. } => ItemKind::Plan { text: text.clone() },
        ThreadItem::EnteredReviewMode { review, .. } => ItemKind::Review {
            state: ReviewState::Started,
            text: review.clone(),
        },
        ThreadItem::ExitedReviewMode { review, .. } => ItemKind::Review {
            state: ReviewState::Completed,
            text: review.clone(),
        },
        ThreadItem::ContextCompaction { .. } => ItemKind::Compaction,
        ThreadItem::Unknown => return None,
    };
    Some(ConversationItem { id, kind })
}

fn plan_step(step: weft_api::PlanStep) -> PlanStep {
    PlanStep {
        step: step.step,
        status: match step.status {
            weft_api::PlanStepStatus::Pending => PlanStepStatus::Pending,
            weft_api::PlanStepStatus::InProgress => PlanStepStatus::InProgress,
            weft_api::PlanStepStatus::Completed => PlanStepStatus::Completed,
        },
    }
}

/// Applies push events to the store.
pub struct ThreadEventRouter {
    store: Arc<Store>,
    actions: Arc<ThreadActions>,
    messaging: Arc<ThreadMessaging>,
    watchdog: Arc<StaleTurnWatchdog>,
}

impl ThreadEventRouter {
    pub fn new(
        store: Arc<Store>,
        actions: Arc<ThreadActions>,
        messaging: Arc<ThreadMessaging>,
        watchdog: Arc<StaleTurnWatchdog>,
    ) -> Self {
        Self {
            store,
            actions,
            messaging,
            watchdog,
        }
    }

    pub async fn handle(&self, event: ServerEvent) {
        let workspace_id = WorkspaceId::new(event.workspace_id());
        if !matches!(event, ServerEvent::Disconnected { .. }) {
            self.watchdog.record_alive(&workspace_id);
        }

        match event {
            ServerEvent::Connected { .. } => {
                tracing::debug!(workspace_id = %workspace_id, "agent server connected");
            }
            ServerEvent::Disconnected { .. } => {
                tracing::info!(workspace_id = %workspace_id, "agent server disconnected");
                self.watchdog.handle_disconnected(&workspace_id);
            }
            ServerEvent::Heartbeat { .. } | ServerEvent::AccountUpdated { .. } => {}
            ServerEvent::ThreadStarted { thread, .. } => {
                let thread_id = ThreadId::new(thread.id);
                let timestamp = thread
                    .created_at
                    .map(normalize_timestamp_ms)
                    .unwrap_or_else(|| self.store.now());
                self.store.dispatch(Action::EnsureThread {
                    workspace_id: workspace_id.clone(),
                    thread_id: thread_id.clone(),
                    timestamp,
                });
                if let Some(parent) = thread.source.as_ref().and_then(parent_thread_from_source) {
                    self.store.dispatch(Action::SetThreadParent {
                        thread_id: thread_id.clone(),
                        parent_id: ThreadId::new(parent),
                    });
                }
                if let Some(name) = thread.name {
                    self.store.dispatch(Action::SetThreadName {
                        workspace_id,
                        thread_id,
                        name,
                    });
                }
            }
            ServerEvent::ThreadNameUpdated {
                thread_id, name, ..
            } => {
                if let Some(name) = name {
                    self.store.dispatch(Action::SetThreadName {
                        workspace_id,
                        thread_id: ThreadId::new(thread_id),
                        name,
                    });
                }
            }
            ServerEvent::TurnStarted {
                thread_id, turn_id, ..
            } => {
                let thread_id = ThreadId::new(thread_id);
                if !self.messaging.has_pending_interrupt(&thread_id) {
                    if !self.store.is_processing(&thread_id) {
                        self.store.mark_processing(&thread_id, true);
                    }
                    self.store.dispatch(Action::SetTurnPlan {
                        thread_id: thread_id.clone(),
                        plan: None,
                    });
                    self.store.dispatch(Action::SetTurnDiff {
                        thread_id: thread_id.clone(),
                        diff: None,
                    });
                }
                self.messaging
                    .adopt_turn(&workspace_id, &thread_id, &turn_id)
                    .await;
            }
            ServerEvent::TurnCompleted {
                thread_id, status, ..
            } => {
                let thread_id = ThreadId::new(thread_id);
                let phase = match status {
                    Some(TurnStatus::Interrupted) => TurnPhase::Interrupted,
                    Some(TurnStatus::Failed) => TurnPhase::Failed,
                    _ => TurnPhase::Completed,
                };
                self.store.mark_processing(&thread_id, false);
                self.store.set_turn_phase(&thread_id, phase);
                self.store.dispatch(Action::MarkUnread {
                    thread_id: thread_id.clone(),
                    has_unread: true,
                });
                let now = self.store.now();
                self.actions
                    .record_thread_activity(&workspace_id, &thread_id, now)
                    .await;
            }
            ServerEvent::TurnError {
                thread_id,
                message,
                will_retry,
                ..
            } => {
                let thread_id = ThreadId::new(thread_id);
                if will_retry {
                    self.store.dispatch(Action::SetLastError {
                        thread_id,
                        message,
                        timestamp: self.store.now(),
                    });
                } else {
                    self.store.reset_turn(&thread_id);
                    self.store.set_turn_phase(&thread_id, TurnPhase::Failed);
                    self.store
                        .push_thread_error(&workspace_id, &thread_id, &message);
                }
            }
            ServerEvent::TurnPlanUpdated {
                thread_id,
                turn_id,
                explanation,
                plan,
                ..
            } => {
                self.store.dispatch(Action::SetTurnPlan {
                    thread_id: ThreadId::new(thread_id),
                    plan: Some(TurnPlan {
                        turn_id,
                        explanation,
                        steps: plan.into_iter().map(plan_step).collect(),
                    }),
                });
            }
            ServerEvent::TurnDiffUpdated {
                thread_id, diff, ..
            } => {
                self.store.dispatch(Action::SetTurnDiff {
                    thread_id: ThreadId::new(thread_id),
                    diff: Some(diff).filter(|diff| !diff.is_empty()),
                });
            }
            ServerEvent::ItemStarted {
                thread_id, item, ..
            }
            | ServerEvent::ItemCompleted {
                thread_id, item, ..
            } => {
                self.apply_item(&workspace_id, &ThreadId::new(thread_id), &item);
            }
            ServerEvent::AgentMessageDelta {
                thread_id,
                item_id,
                delta,
                ..
            } => {
                self.store.dispatch(Action::AppendAgentDelta {
                    thread_id: ThreadId::new(thread_id),
                    item_id,
                    delta,
                    timestamp: self.store.now(),
                });
            }
            ServerEvent::ApprovalRequested(request) => {
                self.store.dispatch(Action::AddApproval(PendingApproval {
                    workspace_id,
                    request_id: request.request_id,
                    method: request.method,
                    thread_id: request.thread_id.map(ThreadId::new),
                    params: request.params,
                }));
            }
            ServerEvent::UserInputRequested(request) => {
                let prompts = request
                    .questions
                    .into_iter()
                    .map(|question| UserInputPrompt {
                        id: question.id,
                        header: question.header,
                        question: question.question,
                        options: question
                            .options
                            .into_iter()
                            .map(|option| option.label)
                            .collect(),
                    })
                    .collect();
                self.store
                    .dispatch(Action::AddUserInputRequest(PendingUserInput {
                        workspace_id,
                        request_id: request.request_id,
                        thread_id: ThreadId::new(request.thread_id),
                        turn_id: request.turn_id,
                        item_id: request.item_id,
                        prompts,
                    }));
            }
        }
    }

    fn apply_item(&self, workspace_id: &WorkspaceId, thread_id: &ThreadId, item: &ThreadItem) {
        match item {
            ThreadItem::EnteredReviewMode { .. } => self.store.mark_reviewing(thread_id, true),
            ThreadItem::ExitedReviewMode { .. } => self.store.mark_reviewing(thread_id, false),
            ThreadItem::CollabAgentToolCall {
                sender_thread_id,
                receiver_thread_ids,
                ..
            } => {
                let parent = sender_thread_id
                    .as_deref()
                    .filter(|sender| !sender.is_empty())
                    .map(ThreadId::new)
                    .unwrap_or_else(|| thread_id.clone());
                for receiver in receiver_thread_ids.iter().filter(|id| !id.is_empty()) {
                    let receiver = ThreadId::new(receiver.clone());
                    self.store.dispatch(Action::EnsureThread {
                        workspace_id: workspace_id.clone(),
                        thread_id: receiver.clone(),
                        timestamp: self.store.now(),
                    });
                    self.store.dispatch(Action::SetThreadParent {
                        thread_id: receiver,
                        parent_id: parent.clone(),
                    });
                }
            }
            _ => {}
        }

        let Some(converted) = conversation_item_from_api(item) else {
            return;
        };
        if let ItemKind::Message {
            role: MessageRole::User,
            text,
            ..
        } = &converted.kind
        {
            self.drop_optimistic_echo(thread_id, text);
        }
        self.store.dispatch(Action::UpsertItem {
            thread_id: thread_id.clone(),
            item: converted,
            timestamp: self.store.now(),
        });
    }

    /// Removes the local copy of a steered message once the server reports it.
    fn drop_optimistic_echo(&self, thread_id: &ThreadId, text: &str) {
        let local_id = self.store.read(|state| {
            state
                .items(thread_id)
                .iter()
                .find(|item| {
                    item.id.starts_with("local-")
                        && matches!(
                            &item.kind,
                            ItemKind::Message {
                                role: MessageRole::User,
                                text: local_text,
                                ..
                            } if local_text.trim() == text.trim()
                        )
                })
                .map(|item| item.id.clone())
        });
        if let Some(item_id) = local_id {
            self.store.dispatch(Action::RemoveItem {
                thread_id: thread_id.clone(),
                item_id,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: serde_json::Value) -> ThreadItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_messages_join_text_and_collect_images() {
        let converted = conversation_item_from_api(&item(json!({
            "type": "userMessage",
            "id": "u1",
            "content": [
                {"type": "text", "text": "look at this"},
                {"type": "localImage", "path": "/tmp/a.png"},
                {"type": "text", "text": "and this"}
            ]
        })))
        .unwrap();
        assert_eq!(
            converted,
            ConversationItem {
                id: "u1".to_owned(),
                kind: ItemKind::Message {
                    role: MessageRole::User,
                    text: "look at this\nand this".to_owned(),
                    images: vec!["/tmp/a.png".to_owned()],
                },
            }
        );
    }

    #[test]
    fn running_commands_keep_their_open_status() {
        let converted = conversation_item_from_api(&item(json!({
            "type": "commandExecution",
            "id": "c1",
            "command": "cargo test",
            "status": "inProgress"
        })))
        .unwrap();
        assert!(converted.is_running_command());
    }

    #[test]
    fn review_markers_and_unknown_items() {
        let entered = conversation_item_from_api(&item(json!({
            "type": "enteredReviewMode",
            "id": "r1",
            "review": "current changes"
        })))
        .unwrap();
        assert!(matches!(
            entered.kind,
            ItemKind::Review {
                state: ReviewState::Started,
                ..
            }
        ));
        assert_eq!(
            conversation_item_from_api(&item(json!({"type": "somethingNew", "id": "x"}))),
            None
        );
    }
}
