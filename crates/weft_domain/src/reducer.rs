use crate::{
    Action, ConversationItem, DEFAULT_THREAD_NAME, Effect, ItemKind, MessageRole, ThreadId,
    ThreadStatus, ThreadSummary, ThreadsState, TurnPhase, WorkspaceId,
};

fn normalize_name(name: Option<String>) -> Option<String> {
    name.map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

impl ThreadsState {
    pub fn apply(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::SetActiveWorkspace { workspace_id } => {
                self.active_workspace_id = workspace_id;
                if let Some(thread_id) = self
                    .focused_thread()
                    .map(|(_, thread_id)| thread_id.clone())
                {
                    self.status_mut(&thread_id).has_unread = false;
                }
                Vec::new()
            }
            Action::SetActiveThread {
                workspace_id,
                thread_id,
            } => {
                match thread_id {
                    Some(thread_id) => {
                        self.status_mut(&thread_id).has_unread = false;
                        self.active_thread_by_workspace
                            .insert(workspace_id, thread_id);
                    }
                    None => {
                        self.active_thread_by_workspace.remove(&workspace_id);
                    }
                }
                Vec::new()
            }

            Action::EnsureThread {
                workspace_id,
                thread_id,
                timestamp,
            } => {
                let name = self
                    .custom_name(&workspace_id, &thread_id)
                    .unwrap_or(DEFAULT_THREAD_NAME)
                    .to_owned();
                let threads = self.threads_by_workspace.entry(workspace_id).or_default();
                if !threads.iter().any(|thread| thread.id == thread_id) {
                    threads.insert(
                        0,
                        ThreadSummary {
                            id: thread_id.clone(),
                            name,
                            created_at: timestamp,
                            updated_at: timestamp,
                        },
                    );
                }
                self.status_by_thread.entry(thread_id).or_default();
                Vec::new()
            }
            Action::RemoveThread {
                workspace_id,
                thread_id,
            } => {
                if let Some(threads) = self.threads_by_workspace.get_mut(&workspace_id) {
                    threads.retain(|thread| thread.id != thread_id);
                }
                if self.active_thread_by_workspace.get(&workspace_id) == Some(&thread_id) {
                    self.active_thread_by_workspace.remove(&workspace_id);
                }
                self.items_by_thread.remove(&thread_id);
                self.status_by_thread.remove(&thread_id);
                self.active_turn_by_thread.remove(&thread_id);
                self.resume_loading.remove(&thread_id);
                self.loaded_threads.remove(&thread_id);
                self.parent_by_thread.remove(&thread_id);
                self.plan_by_thread.remove(&thread_id);
                self.diff_by_thread.remove(&thread_id);

                let mut effects = Vec::new();
                if let Some(pinned) = self.pinned_by_workspace.get_mut(&workspace_id)
                    && pinned.remove(&thread_id).is_some()
                {
                    effects.push(Effect::SavePinnedThreads {
                        workspace_id,
                        pinned: pinned.clone(),
                    });
                }
                effects
            }
            Action::SetThreads {
                workspace_id,
                mut threads,
                sort,
            } => {
                for thread in &mut threads {
                    if let Some(name) = self.custom_name(&workspace_id, &thread.id) {
                        thread.name = name.to_owned();
                    }
                }
                self.thread_sort_by_workspace
                    .insert(workspace_id.clone(), sort);
                self.threads_by_workspace.insert(workspace_id, threads);
                Vec::new()
            }
            Action::SetThreadListLoading {
                workspace_id,
                loading,
            } => {
                if loading {
                    self.thread_list_loading.insert(workspace_id);
                } else {
                    self.thread_list_loading.remove(&workspace_id);
                }
                Vec::new()
            }
            Action::SetThreadListPaging {
                workspace_id,
                paging,
            } => {
                if paging {
                    self.thread_list_paging.insert(workspace_id);
                } else {
                    self.thread_list_paging.remove(&workspace_id);
                }
                Vec::new()
            }
            Action::SetThreadListCursor {
                workspace_id,
                cursor,
            } => {
                match cursor {
                    Some(cursor) => {
                        self.thread_list_cursor.insert(workspace_id, cursor);
                    }
                    None => {
                        self.thread_list_cursor.remove(&workspace_id);
                    }
                }
                Vec::new()
            }
            Action::SetThreadName {
                workspace_id,
                thread_id,
                name,
            } => {
                if self.custom_name(&workspace_id, &thread_id).is_some() {
                    return Vec::new();
                }
                if let Some(name) = normalize_name(Some(name))
                    && let Some(thread) = self.thread_mut(&workspace_id, &thread_id)
                {
                    thread.name = name;
                }
                Vec::new()
            }
            Action::RenameThread {
                workspace_id,
                thread_id,
                name,
            } => {
                let name = normalize_name(name);
                let key = (workspace_id.clone(), thread_id.clone());
                match &name {
                    Some(name) => {
                        self.custom_names.insert(key, name.clone());
                        if let Some(thread) = self.thread_mut(&workspace_id, &thread_id) {
                            thread.name = name.clone();
                        }
                    }
                    None => {
                        self.custom_names.remove(&key);
                    }
                }
                vec![Effect::SaveCustomThreadName {
                    workspace_id,
                    thread_id,
                    name,
                }]
            }
            Action::SetThreadTimestamp {
                workspace_id,
                thread_id,
                timestamp,
            } => {
                if let Some(thread) = self.thread_mut(&workspace_id, &thread_id)
                    && timestamp > thread.updated_at
                {
                    thread.updated_at = timestamp;
                }
                Vec::new()
            }
            Action::SetThreadParent {
                thread_id,
                parent_id,
            } => {
                if thread_id != parent_id {
                    self.parent_by_thread.insert(thread_id, parent_id);
                }
                Vec::new()
            }
            Action::ToggleThreadPin {
                workspace_id,
                thread_id,
                now,
            } => {
                let pinned = self
                    .pinned_by_workspace
                    .entry(workspace_id.clone())
                    .or_default();
                if pinned.remove(&thread_id).is_none() {
                    pinned.insert(thread_id, now);
                }
                vec![Effect::SavePinnedThreads {
                    workspace_id,
                    pinned: pinned.clone(),
                }]
            }
            Action::CustomNamesLoaded { names } => {
                for entry in names {
                    if let Some(thread) = self.thread_mut(&entry.workspace_id, &entry.thread_id) {
                        thread.name = entry.name.clone();
                    }
                    self.custom_names
                        .insert((entry.workspace_id, entry.thread_id), entry.name);
                }
                Vec::new()
            }
            Action::PinnedThreadsLoaded {
                workspace_id,
                pinned,
            } => {
                self.pinned_by_workspace.insert(workspace_id, pinned);
                Vec::new()
            }

            Action::SetThreadResumeLoading { thread_id, loading } => {
                if loading {
                    self.resume_loading.insert(thread_id);
                } else {
                    self.resume_loading.remove(&thread_id);
                }
                Vec::new()
            }
            Action::MarkThreadLoaded { thread_id, loaded } => {
                if loaded {
                    self.loaded_threads.insert(thread_id);
                } else {
                    self.loaded_threads.remove(&thread_id);
                }
                Vec::new()
            }
            Action::SetThreadItems { thread_id, items } => {
                self.items_by_thread.insert(thread_id, items);
                Vec::new()
            }
            Action::UpsertItem {
                thread_id,
                item,
                timestamp,
            } => {
                let items = self.items_by_thread.entry(thread_id.clone()).or_default();
                match items.iter_mut().find(|existing| existing.id == item.id) {
                    Some(existing) => *existing = item,
                    None => items.push(item),
                }
                self.status_mut(&thread_id).last_activity_at = Some(timestamp);
                Vec::new()
            }
            Action::RemoveItem { thread_id, item_id } => {
                if let Some(items) = self.items_by_thread.get_mut(&thread_id) {
                    items.retain(|item| item.id != item_id);
                }
                Vec::new()
            }
            Action::AppendAgentDelta {
                thread_id,
                item_id,
                delta,
                timestamp,
            } => {
                let items = self.items_by_thread.entry(thread_id.clone()).or_default();
                let existing = items.iter_mut().find(|item| item.id == item_id);
                match existing.map(|item| &mut item.kind) {
                    Some(ItemKind::Message {
                        role: MessageRole::Assistant,
                        text,
                        ..
                    }) => text.push_str(&delta),
                    Some(_) => {}
                    None => items.push(ConversationItem::assistant_message(item_id, delta)),
                }
                self.status_mut(&thread_id).last_activity_at = Some(timestamp);
                Vec::new()
            }

            Action::MarkProcessing {
                thread_id,
                is_processing,
                timestamp,
            } => {
                if is_processing {
                    let status = self.status_mut(&thread_id);
                    if !status.is_processing {
                        status.processing_started_at = Some(timestamp);
                    }
                    status.is_processing = true;
                    status.last_activity_at = Some(timestamp);
                } else {
                    self.stop_processing(&thread_id, timestamp);
                }
                Vec::new()
            }
            Action::MarkReviewing {
                thread_id,
                is_reviewing,
            } => {
                self.status_mut(&thread_id).is_reviewing = is_reviewing;
                Vec::new()
            }
            Action::SetActiveTurnId { thread_id, turn_id } => {
                match turn_id {
                    Some(turn_id) => {
                        self.active_turn_by_thread.insert(thread_id, turn_id);
                    }
                    None => {
                        self.active_turn_by_thread.remove(&thread_id);
                    }
                }
                Vec::new()
            }
            Action::SetTurnPhase { thread_id, phase } => {
                self.status_mut(&thread_id).phase = phase;
                Vec::new()
            }
            Action::MarkUnread {
                thread_id,
                has_unread,
            } => {
                let focused = self.is_focused(&thread_id);
                self.status_mut(&thread_id).has_unread = has_unread && !focused;
                Vec::new()
            }
            Action::SetLastError {
                thread_id,
                message,
                timestamp,
            } => {
                let status = self.status_mut(&thread_id);
                status.last_error_at = Some(timestamp);
                status.last_error_message = Some(message);
                Vec::new()
            }
            Action::ResetTurnState {
                thread_id,
                timestamp,
            } => {
                self.stop_processing(&thread_id, timestamp);
                let status = self.status_mut(&thread_id);
                status.is_reviewing = false;
                if matches!(status.phase, TurnPhase::Starting | TurnPhase::InProgress) {
                    status.phase = TurnPhase::Interrupted;
                }
                Vec::new()
            }
            Action::SetTurnPlan { thread_id, plan } => {
                match plan {
                    Some(plan) => {
                        self.plan_by_thread.insert(thread_id, plan);
                    }
                    None => {
                        self.plan_by_thread.remove(&thread_id);
                    }
                }
                Vec::new()
            }
            Action::SetTurnDiff { thread_id, diff } => {
                match diff {
                    Some(diff) => {
                        self.diff_by_thread.insert(thread_id, diff);
                    }
                    None => {
                        self.diff_by_thread.remove(&thread_id);
                    }
                }
                Vec::new()
            }

            Action::AddApproval(approval) => {
                self.approvals.retain(|existing| {
                    existing.workspace_id != approval.workspace_id
                        || existing.request_id != approval.request_id
                });
                self.approvals.push(approval);
                Vec::new()
            }
            Action::RemoveApproval {
                workspace_id,
                request_id,
            } => {
                self.approvals.retain(|existing| {
                    existing.workspace_id != workspace_id || existing.request_id != request_id
                });
                Vec::new()
            }
            Action::AddUserInputRequest(request) => {
                self.user_input_requests.retain(|existing| {
                    existing.workspace_id != request.workspace_id
                        || existing.request_id != request.request_id
                });
                self.user_input_requests.push(request);
                Vec::new()
            }
            Action::RemoveUserInputRequest {
                workspace_id,
                request_id,
            } => {
                self.user_input_requests.retain(|existing| {
                    existing.workspace_id != workspace_id || existing.request_id != request_id
                });
                Vec::new()
            }
        }
    }

    fn status_mut(&mut self, thread_id: &ThreadId) -> &mut ThreadStatus {
        self.status_by_thread.entry(thread_id.clone()).or_default()
    }

    fn thread_mut(
        &mut self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
    ) -> Option<&mut ThreadSummary> {
        self.threads_by_workspace
            .get_mut(workspace_id)?
            .iter_mut()
            .find(|thread| &thread.id == thread_id)
    }

    fn stop_processing(&mut self, thread_id: &ThreadId, timestamp: i64) {
        self.active_turn_by_thread.remove(thread_id);
        let status = self.status_mut(thread_id);
        if let Some(started_at) = status.processing_started_at.take() {
            status.last_duration_ms = Some(timestamp.saturating_sub(started_at).max(0));
        }
        status.is_processing = false;
    }
}
