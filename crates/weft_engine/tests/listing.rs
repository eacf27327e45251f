mod common;

use common::*;
use serde_json::{Value, json};
use std::collections::HashMap;
use weft_domain::{DetachedReviewLink, ThreadListSort};
use weft_engine::{EngineConfig, ListOptions};

const ROOT: &str = "/repo";

fn listed(id: &str, cwd: &str, created_at: i64, updated_at: i64) -> Value {
    json!({
        "id": id,
        "cwd": cwd,
        "preview": format!("preview {id}"),
        "createdAt": created_at,
        "updatedAt": updated_at,
    })
}

fn page(threads: Vec<Value>, next_cursor: Option<&str>) -> Scripted {
    Ok(json!({ "result": { "data": threads, "nextCursor": next_cursor } }))
}

fn listed_ids(h: &Harness) -> Vec<String> {
    h.engine.store().read(|state| {
        state
            .threads(&ws())
            .iter()
            .map(|thread| thread.id.as_str().to_owned())
            .collect()
    })
}

fn registered(config: EngineConfig, prefs: InMemoryPrefs) -> Harness {
    let h = harness_with(config, prefs);
    h.engine.actions().register_workspace(&ws(), ROOT);
    h
}

fn sorted_by(sort: ThreadListSort) -> ListOptions {
    ListOptions {
        sort,
        ..ListOptions::default()
    }
}

#[tokio::test]
async fn listing_filters_by_root_and_follows_cursors() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    h.rpc.push(
        "thread/list",
        page(
            vec![
                listed("t1", "/repo", 1_000, 3_000),
                listed("elsewhere", "/other", 1_000, 9_000),
                listed("t2", "/repo/", 1_000, 2_000),
            ],
            Some("c1"),
        ),
    );
    h.rpc.push(
        "thread/list",
        page(vec![listed("t3", "/repo", 1_000, 1_500), listed("t1", "/repo", 1_000, 3_000)], None),
    );

    let applied = h
        .engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await;
    assert_eq!(applied, Ok(true));
    assert_eq!(listed_ids(&h), ["t1", "t2", "t3"]);

    let calls = h.rpc.args("thread/list");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0]["cursor"], Value::Null);
    assert_eq!(calls[0]["limit"], json!(100));
    assert_eq!(calls[0]["sortKey"], json!("updated_at"));
    assert_eq!(calls[1]["cursor"], json!("c1"));
    assert!(!h.engine.store().read(|state| state.thread_list_loading.contains(&ws())));
}

#[tokio::test]
async fn cold_workspaces_give_up_after_three_empty_pages() {
    let config = EngineConfig {
        list_max_pages: 20,
        ..EngineConfig::default()
    };
    let h = registered(config, InMemoryPrefs::default());
    h.rpc.set_default(
        "thread/list",
        page(vec![listed("x", "/other", 1, 1)], Some("more")),
    );

    h.engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(h.rpc.count("thread/list"), 3);
    assert!(listed_ids(&h).is_empty());
}

#[tokio::test]
async fn workspaces_with_history_search_deeper() {
    let config = EngineConfig {
        list_max_pages: 20,
        ..EngineConfig::default()
    };
    let prefs = InMemoryPrefs::default();
    prefs
        .activity
        .lock()
        .unwrap()
        .insert(ws(), HashMap::from([(thread("old"), 1_000)]));
    let h = registered(config, prefs);
    h.rpc.set_default(
        "thread/list",
        page(vec![listed("x", "/other", 1, 1)], Some("more")),
    );

    h.engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(h.rpc.count("thread/list"), 8);
}

#[tokio::test]
async fn empty_pages_after_a_match_keep_searching() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    h.rpc.push(
        "thread/list",
        page(vec![listed("t1", "/repo", 1, 1)], Some("more")),
    );
    h.rpc.set_default(
        "thread/list",
        page(vec![listed("x", "/other", 1, 1)], Some("more")),
    );

    h.engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(h.rpc.count("thread/list"), 8);
    assert_eq!(listed_ids(&h), ["t1"]);
}

#[tokio::test]
async fn page_cap_applies_even_when_pages_match() {
    let config = EngineConfig {
        list_max_empty_pages_cold: 20,
        list_max_empty_pages_warm: 20,
        ..EngineConfig::default()
    };
    let h = registered(config, InMemoryPrefs::default());
    for index in 0..12 {
        h.rpc.push(
            "thread/list",
            page(vec![listed(&format!("t{index}"), "/repo", 1, 1)], Some("more")),
        );
    }

    h.engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(h.rpc.count("thread/list"), 8);
    assert_eq!(listed_ids(&h).len(), 8);
}

#[tokio::test]
async fn updated_sort_uses_cached_activity() {
    let prefs = InMemoryPrefs::default();
    prefs.activity.lock().unwrap().insert(
        ws(),
        HashMap::from([(thread("a"), 1_700_000_900_000)]),
    );
    let h = registered(EngineConfig::default(), prefs);
    let threads = vec![
        listed("a", "/repo", 1_700_000_000, 1_700_000_000),
        listed("b", "/repo", 1_700_000_500, 1_700_000_500),
    ];
    h.rpc.push("thread/list", page(threads.clone(), None));
    h.rpc.push("thread/list", page(threads, None));

    let actions = h.engine.actions();
    actions
        .list_threads_for_workspace(&ws(), sorted_by(ThreadListSort::UpdatedAt))
        .await
        .unwrap();
    assert_eq!(listed_ids(&h), ["a", "b"]);
    let b_updated = h
        .engine
        .store()
        .read(|state| state.thread(&ws(), &thread("b")).map(|thread| thread.updated_at));
    assert_eq!(b_updated, Some(1_700_000_500_000));
    let saved = h.prefs.activity.lock().unwrap().get(&ws()).cloned().unwrap_or_default();
    assert_eq!(saved.get(&thread("b")), Some(&1_700_000_500_000));

    actions
        .list_threads_for_workspace(&ws(), sorted_by(ThreadListSort::CreatedAt))
        .await
        .unwrap();
    assert_eq!(listed_ids(&h), ["b", "a"]);
    assert_eq!(h.rpc.args("thread/list")[1]["sortKey"], json!("created_at"));
}

#[tokio::test]
async fn superseded_listing_is_discarded_when_it_resolves_late() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    let created_gate = h.rpc.gate("thread/list");
    h.rpc.push(
        "thread/list",
        page(vec![listed("by-created", "/repo", 1, 1)], None),
    );
    h.rpc.push(
        "thread/list",
        page(vec![listed("by-updated", "/repo", 1, 1)], None),
    );

    let actions = h.engine.actions();
    let workspace = ws();
    let (created, updated) = tokio::join!(
        actions.list_threads_for_workspace(&workspace, sorted_by(ThreadListSort::CreatedAt)),
        async {
            let applied = actions
                .list_threads_for_workspace(&ws(), sorted_by(ThreadListSort::UpdatedAt))
                .await;
            created_gate.send(()).unwrap();
            applied
        },
    );

    assert_eq!(created, Ok(false));
    assert_eq!(updated, Ok(true));
    assert_eq!(listed_ids(&h), ["by-updated"]);
    let sort = h
        .engine
        .store()
        .read(|state| state.thread_sort_by_workspace.get(&ws()).copied());
    assert_eq!(sort, Some(ThreadListSort::UpdatedAt));
}

#[tokio::test]
async fn superseded_listing_is_discarded_when_it_resolves_first() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    let created_gate = h.rpc.gate("thread/list");
    let updated_gate = h.rpc.gate("thread/list");
    h.rpc.push(
        "thread/list",
        page(vec![listed("by-created", "/repo", 1, 1)], None),
    );
    h.rpc.push(
        "thread/list",
        page(vec![listed("by-updated", "/repo", 1, 1)], None),
    );

    let actions = h.engine.actions();
    let release = async {
        tokio::task::yield_now().await;
        created_gate.send(()).unwrap();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(listed_ids(&h).is_empty(), "stale listing must not be applied");
        updated_gate.send(()).unwrap();
    };
    let workspace = ws();
    let (created, updated, ()) = tokio::join!(
        actions.list_threads_for_workspace(&workspace, sorted_by(ThreadListSort::CreatedAt)),
        actions.list_threads_for_workspace(&workspace, sorted_by(ThreadListSort::UpdatedAt)),
        release,
    );

    assert_eq!(created, Ok(false));
    assert_eq!(updated, Ok(true));
    assert_eq!(listed_ids(&h), ["by-updated"]);
}

#[tokio::test]
async fn preserve_state_keeps_the_active_thread_listed() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    h.rpc.push("thread/start", thread_response("fresh", json!([])));
    h.rpc.push(
        "thread/list",
        page(vec![listed("t1", "/repo", 1, 1)], None),
    );

    let actions = h.engine.actions();
    actions.start_thread_for_workspace(&ws(), true).await.unwrap();
    actions
        .list_threads_for_workspace(
            &ws(),
            ListOptions {
                preserve_state: true,
                ..ListOptions::default()
            },
        )
        .await
        .unwrap();

    let mut ids = listed_ids(&h);
    ids.sort();
    assert_eq!(ids, ["fresh", "t1"]);
}

#[tokio::test]
async fn load_older_appends_threads_after_the_cursor() {
    let config = EngineConfig {
        list_target_count: 2,
        ..EngineConfig::default()
    };
    let h = registered(config, InMemoryPrefs::default());
    h.rpc.push(
        "thread/list",
        page(
            vec![listed("t1", "/repo", 1, 30), listed("t2", "/repo", 1, 20)],
            Some("c2"),
        ),
    );
    h.rpc.push(
        "thread/list",
        page(
            vec![listed("t2", "/repo", 1, 20), listed("t3", "/repo", 1, 10)],
            None,
        ),
    );

    let actions = h.engine.actions();
    actions
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(
        h.engine
            .store()
            .read(|state| state.thread_list_cursor(&ws()).map(ToOwned::to_owned)),
        Some("c2".to_owned())
    );

    let applied = actions.load_older_threads_for_workspace(&ws()).await;
    assert_eq!(applied, Ok(true));
    assert_eq!(listed_ids(&h), ["t1", "t2", "t3"]);
    assert_eq!(h.rpc.args("thread/list")[1]["cursor"], json!("c2"));
    let store = h.engine.store();
    assert_eq!(store.read(|state| state.thread_list_cursor(&ws()).map(ToOwned::to_owned)), None);
    assert!(!store.read(|state| state.thread_list_paging.contains(&ws())));

    assert_eq!(actions.load_older_threads_for_workspace(&ws()).await, Ok(false));
    assert_eq!(h.rpc.count("thread/list"), 2);
}

#[tokio::test]
async fn superseded_load_older_clears_the_paging_flag() {
    let config = EngineConfig {
        list_target_count: 1,
        ..EngineConfig::default()
    };
    let h = registered(config, InMemoryPrefs::default());
    h.rpc.push(
        "thread/list",
        page(vec![listed("t1", "/repo", 1, 30)], Some("c2")),
    );
    let actions = h.engine.actions();
    actions
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();

    let older_gate = h.rpc.gate("thread/list");
    h.rpc.push("thread/list", page(vec![listed("t0", "/repo", 1, 5)], None));
    h.rpc.push("thread/list", page(vec![listed("t1", "/repo", 1, 40)], None));
    let refresh = ListOptions {
        preserve_state: true,
        ..ListOptions::default()
    };
    let workspace = ws();
    let (older, fresh) = tokio::join!(
        actions.load_older_threads_for_workspace(&workspace),
        async {
            let applied = actions.list_threads_for_workspace(&ws(), refresh).await;
            older_gate.send(()).unwrap();
            applied
        },
    );

    assert_eq!(older, Ok(false));
    assert_eq!(fresh, Ok(true));
    assert_eq!(listed_ids(&h), ["t1"]);
    assert!(!h.engine.store().read(|state| state.thread_list_paging.contains(&ws())));
}

#[tokio::test]
async fn list_errors_clear_the_loading_flag() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    h.rpc.push("thread/list", Err("server unavailable".to_owned()));

    let applied = h
        .engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await;
    assert_eq!(applied, Err("server unavailable".to_owned()));
    assert!(!h.engine.store().read(|state| state.thread_list_loading.contains(&ws())));
}

#[tokio::test]
async fn sub_agent_threads_link_to_their_parent() {
    let h = registered(EngineConfig::default(), InMemoryPrefs::default());
    let mut child = listed("child", "/repo", 1, 1);
    child["source"] = json!({ "subagent": { "thread_spawn": { "parent_thread_id": "parent" } } });
    h.rpc.push("thread/list", page(vec![listed("parent", "/repo", 1, 2), child], None));

    h.engine
        .actions()
        .list_threads_for_workspace(&ws(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(
        h.engine
            .store()
            .read(|state| state.parent_by_thread.get(&thread("child")).cloned()),
        Some(thread("parent"))
    );
}

#[tokio::test]
async fn opening_a_workspace_restores_detached_reviews() {
    let prefs = InMemoryPrefs::default();
    *prefs.detached_reviews.lock().unwrap() = vec![
        DetachedReviewLink {
            workspace_id: ws(),
            parent_thread_id: thread("parent"),
            child_thread_id: thread("review"),
            created_at_unix_ms: 1,
        },
        DetachedReviewLink {
            workspace_id: ws(),
            parent_thread_id: thread("parent"),
            child_thread_id: thread("deleted"),
            created_at_unix_ms: 1,
        },
    ];
    let h = harness_with(EngineConfig::default(), prefs);
    let mut review = listed("review", "/repo", 1, 1);
    review["source"] = json!({ "subagent": "review" });
    h.rpc.set_default(
        "thread/list",
        page(vec![listed("parent", "/repo", 1, 2), review], None),
    );

    h.engine.open_workspace(&ws(), ROOT).await.unwrap();

    assert_eq!(
        h.engine
            .store()
            .read(|state| state.parent_by_thread.get(&thread("review")).cloned()),
        Some(thread("parent"))
    );
    let links = h.prefs.detached_reviews.lock().unwrap().clone();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].child_thread_id, thread("review"));
}
