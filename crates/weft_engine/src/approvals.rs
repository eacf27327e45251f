use crate::rpc::{ThreadRpc, call};
use crate::store::Store;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use weft_domain::{Action, WorkspaceId};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApprovalDecision {
    Accept,
    AcceptForSession,
    Decline,
    Cancel,
}

impl ApprovalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::AcceptForSession => "acceptForSession",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
        }
    }
}

/// Relays approval and user-input answers to the server and clears the pending records.
pub struct ApprovalRelay {
    store: Arc<Store>,
    rpc: Arc<dyn ThreadRpc>,
}

impl ApprovalRelay {
    pub fn new(store: Arc<Store>, rpc: Arc<dyn ThreadRpc>) -> Self {
        Self { store, rpc }
    }

    pub async fn respond_to_approval(
        &self,
        workspace_id: &WorkspaceId,
        request_id: &Value,
        decision: ApprovalDecision,
    ) -> Result<(), String> {
        let result = json!({ "decision": decision.as_str() });
        call(
            "approval/respond",
            workspace_id.as_str(),
            self.rpc
                .respond_to_approval(workspace_id.as_str(), request_id, result),
        )
        .await?;
        self.store.dispatch(Action::RemoveApproval {
            workspace_id: workspace_id.clone(),
            request_id: request_id.clone(),
        });
        Ok(())
    }

    /// `answers` maps question ids to the selected or typed answers.
    pub async fn respond_to_user_input(
        &self,
        workspace_id: &WorkspaceId,
        request_id: &Value,
        answers: BTreeMap<String, Vec<String>>,
    ) -> Result<(), String> {
        let answers: Map<String, Value> = answers
            .into_iter()
            .map(|(question_id, answers)| (question_id, json!({ "answers": answers })))
            .collect();
        let result = json!({ "answers": answers });
        call(
            "userInput/respond",
            workspace_id.as_str(),
            self.rpc
                .respond_to_user_input(workspace_id.as_str(), request_id, result),
        )
        .await?;
        self.store.dispatch(Action::RemoveUserInputRequest {
            workspace_id: workspace_id.clone(),
            request_id: request_id.clone(),
        });
        Ok(())
    }
}
