use async_trait::async_trait;
use serde_json::Value;
use weft_api::{ReviewDelivery, ReviewTarget, ThreadSortKey, rpc_error_message};
use weft_domain::{AccessMode, ThinkingEffort};

/// Parameters for `turn/start`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TurnRequest {
    pub text: String,
    pub images: Vec<String>,
    pub model: Option<String>,
    pub effort: Option<ThinkingEffort>,
    pub collaboration_mode: Option<String>,
    pub access_mode: AccessMode,
    pub codex_args: Option<String>,
}

/// Request/response surface of the agent server.
///
/// Every call resolves to the raw response. A response may still carry an in-band
/// `error`; [`call`] folds those into `Err`.
#[async_trait]
pub trait ThreadRpc: Send + Sync {
    async fn start_thread(&self, workspace_id: &str) -> Result<Value, String>;

    async fn fork_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String>;

    async fn resume_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String>;

    async fn list_threads(
        &self,
        workspace_id: &str,
        cursor: Option<&str>,
        limit: u32,
        sort_key: ThreadSortKey,
    ) -> Result<Value, String>;

    async fn archive_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String>;

    async fn archive_threads(
        &self,
        workspace_id: &str,
        thread_ids: &[String],
    ) -> Result<Value, String>;

    async fn send_user_message(
        &self,
        workspace_id: &str,
        thread_id: &str,
        request: &TurnRequest,
    ) -> Result<Value, String>;

    async fn steer_turn(
        &self,
        workspace_id: &str,
        thread_id: &str,
        turn_id: &str,
        text: &str,
        images: &[String],
    ) -> Result<Value, String>;

    async fn interrupt_turn(
        &self,
        workspace_id: &str,
        thread_id: &str,
        turn_id: &str,
    ) -> Result<Value, String>;

    async fn start_review(
        &self,
        workspace_id: &str,
        thread_id: &str,
        target: &ReviewTarget,
        delivery: ReviewDelivery,
    ) -> Result<Value, String>;

    async fn compact_thread(&self, workspace_id: &str, thread_id: &str) -> Result<Value, String>;

    async fn list_apps(&self, workspace_id: &str, cursor: Option<&str>) -> Result<Value, String>;

    async fn list_mcp_servers(&self, workspace_id: &str) -> Result<Value, String>;

    async fn set_thread_name(
        &self,
        workspace_id: &str,
        thread_id: &str,
        name: &str,
    ) -> Result<Value, String>;

    async fn respond_to_approval(
        &self,
        workspace_id: &str,
        request_id: &Value,
        result: Value,
    ) -> Result<Value, String>;

    async fn respond_to_user_input(
        &self,
        workspace_id: &str,
        request_id: &Value,
        result: Value,
    ) -> Result<Value, String>;
}

/// Whether an error says the server does not know the method or request variant.
///
/// This is the single place that classifies capability mismatches; callers only see the
/// boolean.
pub fn is_unsupported_method_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    [
        "unknown variant",
        "unknown method",
        "method not found",
        "not supported",
        "unsupported",
        "-32601",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

/// Awaits an RPC call, logging it, and folds in-band errors into `Err`.
pub(crate) async fn call<F>(method: &'static str, workspace_id: &str, fut: F) -> Result<Value, String>
where
    F: std::future::Future<Output = Result<Value, String>>,
{
    tracing::debug!(method, workspace_id, "rpc request");
    match fut.await {
        Ok(response) => match rpc_error_message(&response) {
            Some(error) => {
                tracing::debug!(method, workspace_id, error = %error, "rpc error response");
                Err(error)
            }
            None => {
                tracing::debug!(method, workspace_id, "rpc response");
                Ok(response)
            }
        },
        Err(error) => {
            tracing::debug!(method, workspace_id, error = %error, "rpc failed");
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unsupported_method_errors_are_recognized() {
        for message in [
            "unknown variant `turn/steer`, expected one of `turn/start`",
            "Unknown method: thread/archiveMany",
            "Method not found",
            "thread/archiveMany is not supported by this server",
            "error -32601",
        ] {
            assert!(is_unsupported_method_error(message), "{message}");
        }
        assert!(!is_unsupported_method_error("denied"));
        assert!(!is_unsupported_method_error("turn not found"));
    }

    #[tokio::test]
    async fn call_folds_in_band_errors() {
        let ok = call("thread/start", "ws", async { Ok(json!({"result": {"thread": {}}})) }).await;
        assert!(ok.is_ok());

        let in_band = call("thread/start", "ws", async {
            Ok(json!({"error": {"message": "boom"}}))
        })
        .await;
        assert_eq!(in_band, Err("boom".to_owned()));

        let nested = call("turn/steer", "ws", async {
            Ok(json!({"result": {"error": "unknown variant `turn/steer`"}}))
        })
        .await;
        assert_eq!(nested, Err("unknown variant `turn/steer`".to_owned()));
    }
}
