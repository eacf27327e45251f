use std::sync::Arc;
use weft_domain::PreferenceStore;

/// Async access to the preference store. Every call runs on the blocking pool.
#[derive(Clone)]
pub(crate) struct Prefs {
    store: Arc<dyn PreferenceStore>,
}

impl Prefs {
    pub(crate) fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn run<T, F>(&self, task: &'static str, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PreferenceStore) -> Result<T, String> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || f(store.as_ref()))
            .await
            .ok()
            .unwrap_or_else(|| Err(format!("failed to join {task} task")))
    }
}
