use crate::ConversationItem;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MergeMode {
    /// Refreshing a live session: a snapshot with no shared ids never displaces local items.
    #[default]
    LiveRefresh,
    /// Paging in history: both sets are always kept.
    LoadOlder,
}

fn dedup_by_id(items: Vec<ConversationItem>) -> Vec<ConversationItem> {
    let mut out: Vec<ConversationItem> = Vec::with_capacity(items.len());
    for item in items {
        match out.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => out.push(item),
        }
    }
    out
}

/// Merges a remote snapshot into the local item list.
///
/// Remote items win for shared ids and fix the order of shared items. Local-only items
/// are never dropped when ids overlap: each is re-inserted right after the local item
/// that preceded it.
pub fn merge_thread_items(
    remote: Vec<ConversationItem>,
    local: &[ConversationItem],
    mode: MergeMode,
) -> Vec<ConversationItem> {
    let remote = dedup_by_id(remote);
    if local.is_empty() {
        return remote;
    }
    if remote.is_empty() {
        return local.to_vec();
    }

    let remote_ids: HashSet<&str> = remote.iter().map(|item| item.id.as_str()).collect();
    let overlap = local
        .iter()
        .any(|item| remote_ids.contains(item.id.as_str()));

    if !overlap {
        return match mode {
            MergeMode::LiveRefresh => local.to_vec(),
            MergeMode::LoadOlder => {
                let mut out = remote;
                out.extend(local.iter().cloned());
                out
            }
        };
    }

    splice_local_only(remote, local)
}

fn splice_local_only(
    remote: Vec<ConversationItem>,
    local: &[ConversationItem],
) -> Vec<ConversationItem> {
    let mut merged = remote;
    let mut anchor: Option<usize> = None;
    for item in local {
        if let Some(position) = merged.iter().position(|existing| existing.id == item.id) {
            anchor = Some(position);
            continue;
        }
        let insert_at = anchor.map_or(0, |position| position + 1);
        merged.insert(insert_at, item.clone());
        anchor = Some(insert_at);
    }
    merged
}
