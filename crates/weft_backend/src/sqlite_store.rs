use anyhow::{Context as _, anyhow};
use rusqlite::{Connection, OptionalExtension as _, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use weft_domain::{
    CodexArgsOverride, CustomThreadName, DetachedReviewLink, PreferenceStore, ThreadCodexParams,
    ThreadId, WorkspaceId, now_unix_ms, parse_access_mode, parse_thinking_effort,
};

pub const DB_FILE_NAME: &str = "weft.db";

const LATEST_SCHEMA_VERSION: u32 = 3;

const MIGRATIONS: &[(u32, &str)] = &[
    (
        1,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0001_init.sql"
        )),
    ),
    (
        2,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0002_codex_params.sql"
        )),
    ),
    (
        3,
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/migrations/0003_detached_review_links.sql"
        )),
    ),
];

/// Preference storage backed by a single sqlite connection owned by a worker thread.
#[derive(Clone)]
pub struct SqliteStore {
    tx: mpsc::Sender<DbCommand>,
}

type Reply<T> = mpsc::Sender<anyhow::Result<T>>;

enum DbCommand {
    LoadThreadActivity {
        workspace_id: String,
        reply: Reply<HashMap<ThreadId, i64>>,
    },
    SaveThreadActivity {
        workspace_id: String,
        activity: Vec<(String, i64)>,
        reply: Reply<()>,
    },
    LoadPinnedThreads {
        workspace_id: String,
        reply: Reply<HashMap<ThreadId, i64>>,
    },
    SavePinnedThreads {
        workspace_id: String,
        pinned: Vec<(String, i64)>,
        reply: Reply<()>,
    },
    LoadCustomThreadNames {
        reply: Reply<Vec<CustomThreadName>>,
    },
    SaveCustomThreadName {
        workspace_id: String,
        thread_id: String,
        name: Option<String>,
        reply: Reply<()>,
    },
    LoadCodexParams {
        scope_key: String,
        reply: Reply<Option<ThreadCodexParams>>,
    },
    SaveCodexParams {
        scope_key: String,
        params: ThreadCodexParams,
        reply: Reply<()>,
    },
    LoadDetachedReviewLinks {
        reply: Reply<Vec<DetachedReviewLink>>,
    },
    SaveDetachedReviewLink {
        link: DetachedReviewLink,
        reply: Reply<()>,
    },
    RemoveDetachedReviewLink {
        workspace_id: String,
        child_thread_id: String,
        reply: Reply<()>,
    },
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<DbCommand>();

        std::thread::Builder::new()
            .name("weft-sqlite".to_owned())
            .spawn(move || {
                let mut db = SqliteDatabase::open(&db_path);
                while let Ok(cmd) = rx.recv() {
                    match &mut db {
                        Ok(db) => db.handle(cmd),
                        Err(err) => respond_db_open_error(err, cmd),
                    }
                }
            })
            .context("failed to spawn sqlite worker thread")?;

        Ok(Self { tx })
    }

    pub fn open_in_data_dir(data_dir: &Path) -> anyhow::Result<Self> {
        Self::new(data_dir.join(DB_FILE_NAME))
    }

    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> DbCommand) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .context("sqlite worker is not running")?;
        reply_rx.recv().context("sqlite worker terminated")?
    }
}

fn to_pairs(map: &HashMap<ThreadId, i64>) -> Vec<(String, i64)> {
    map.iter()
        .map(|(thread_id, value)| (thread_id.as_str().to_owned(), *value))
        .collect()
}

fn err_text(err: anyhow::Error) -> String {
    format!("{err:#}")
}

impl PreferenceStore for SqliteStore {
    fn load_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String> {
        self.request(|reply| DbCommand::LoadThreadActivity {
            workspace_id: workspace_id.as_str().to_owned(),
            reply,
        })
        .map_err(err_text)
    }

    fn save_thread_activity(
        &self,
        workspace_id: &WorkspaceId,
        activity: &HashMap<ThreadId, i64>,
    ) -> Result<(), String> {
        self.request(|reply| DbCommand::SaveThreadActivity {
            workspace_id: workspace_id.as_str().to_owned(),
            activity: to_pairs(activity),
            reply,
        })
        .map_err(err_text)
    }

    fn load_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
    ) -> Result<HashMap<ThreadId, i64>, String> {
        self.request(|reply| DbCommand::LoadPinnedThreads {
            workspace_id: workspace_id.as_str().to_owned(),
            reply,
        })
        .map_err(err_text)
    }

    fn save_pinned_threads(
        &self,
        workspace_id: &WorkspaceId,
        pinned: &HashMap<ThreadId, i64>,
    ) -> Result<(), String> {
        self.request(|reply| DbCommand::SavePinnedThreads {
            workspace_id: workspace_id.as_str().to_owned(),
            pinned: to_pairs(pinned),
            reply,
        })
        .map_err(err_text)
    }

    fn load_custom_thread_names(&self) -> Result<Vec<CustomThreadName>, String> {
        self.request(|reply| DbCommand::LoadCustomThreadNames { reply })
            .map_err(err_text)
    }

    fn save_custom_thread_name(
        &self,
        workspace_id: &WorkspaceId,
        thread_id: &ThreadId,
        name: Option<&str>,
    ) -> Result<(), String> {
        self.request(|reply| DbCommand::SaveCustomThreadName {
            workspace_id: workspace_id.as_str().to_owned(),
            thread_id: thread_id.as_str().to_owned(),
            name: name.map(ToOwned::to_owned),
            reply,
        })
        .map_err(err_text)
    }

    fn load_codex_params(&self, scope_key: &str) -> Result<Option<ThreadCodexParams>, String> {
        self.request(|reply| DbCommand::LoadCodexParams {
            scope_key: scope_key.to_owned(),
            reply,
        })
        .map_err(err_text)
    }

    fn save_codex_params(
        &self,
        scope_key: &str,
        params: &ThreadCodexParams,
    ) -> Result<(), String> {
        self.request(|reply| DbCommand::SaveCodexParams {
            scope_key: scope_key.to_owned(),
            params: params.clone(),
            reply,
        })
        .map_err(err_text)
    }

    fn load_detached_review_links(&self) -> Result<Vec<DetachedReviewLink>, String> {
        self.request(|reply| DbCommand::LoadDetachedReviewLinks { reply })
            .map_err(err_text)
    }

    fn save_detached_review_link(&self, link: &DetachedReviewLink) -> Result<(), String> {
        self.request(|reply| DbCommand::SaveDetachedReviewLink {
            link: link.clone(),
            reply,
        })
        .map_err(err_text)
    }

    fn remove_detached_review_link(
        &self,
        workspace_id: &WorkspaceId,
        child_thread_id: &ThreadId,
    ) -> Result<(), String> {
        self.request(|reply| DbCommand::RemoveDetachedReviewLink {
            workspace_id: workspace_id.as_str().to_owned(),
            child_thread_id: child_thread_id.as_str().to_owned(),
            reply,
        })
        .map_err(err_text)
    }
}

fn respond_db_open_error(err: &anyhow::Error, cmd: DbCommand) {
    let message = format!("{err:#}");
    match cmd {
        DbCommand::LoadThreadActivity { reply, .. } | DbCommand::LoadPinnedThreads { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::SaveThreadActivity { reply, .. }
        | DbCommand::SavePinnedThreads { reply, .. }
        | DbCommand::SaveCustomThreadName { reply, .. }
        | DbCommand::SaveCodexParams { reply, .. }
        | DbCommand::SaveDetachedReviewLink { reply, .. }
        | DbCommand::RemoveDetachedReviewLink { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::LoadCustomThreadNames { reply } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::LoadCodexParams { reply, .. } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
        DbCommand::LoadDetachedReviewLinks { reply } => {
            let _ = reply.send(Err(anyhow!(message)));
        }
    }
}

struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = Connection::open(db_path)
            .with_context(|| format!("failed to open sqlite db {}", db_path.display()))?;

        configure_connection(&mut conn).context("failed to configure sqlite connection")?;
        apply_migrations(&mut conn).context("failed to apply sqlite migrations")?;

        Ok(Self { conn })
    }

    fn handle(&mut self, cmd: DbCommand) {
        match cmd {
            DbCommand::LoadThreadActivity {
                workspace_id,
                reply,
            } => {
                let _ = reply.send(self.load_thread_map(
                    "SELECT thread_id, last_activity_at FROM thread_activity WHERE workspace_id = ?1",
                    &workspace_id,
                ));
            }
            DbCommand::SaveThreadActivity {
                workspace_id,
                activity,
                reply,
            } => {
                let _ = reply.send(self.replace_thread_map(
                    "thread_activity",
                    "last_activity_at",
                    &workspace_id,
                    &activity,
                ));
            }
            DbCommand::LoadPinnedThreads {
                workspace_id,
                reply,
            } => {
                let _ = reply.send(self.load_thread_map(
                    "SELECT thread_id, pinned_at FROM pinned_threads WHERE workspace_id = ?1",
                    &workspace_id,
                ));
            }
            DbCommand::SavePinnedThreads {
                workspace_id,
                pinned,
                reply,
            } => {
                let _ = reply.send(self.replace_thread_map(
                    "pinned_threads",
                    "pinned_at",
                    &workspace_id,
                    &pinned,
                ));
            }
            DbCommand::LoadCustomThreadNames { reply } => {
                let _ = reply.send(self.load_custom_thread_names());
            }
            DbCommand::SaveCustomThreadName {
                workspace_id,
                thread_id,
                name,
                reply,
            } => {
                let _ = reply.send(self.save_custom_thread_name(
                    &workspace_id,
                    &thread_id,
                    name.as_deref(),
                ));
            }
            DbCommand::LoadCodexParams { scope_key, reply } => {
                let _ = reply.send(self.load_codex_params(&scope_key));
            }
            DbCommand::SaveCodexParams {
                scope_key,
                params,
                reply,
            } => {
                let _ = reply.send(self.save_codex_params(&scope_key, &params));
            }
            DbCommand::LoadDetachedReviewLinks { reply } => {
                let _ = reply.send(self.load_detached_review_links());
            }
            DbCommand::SaveDetachedReviewLink { link, reply } => {
                let _ = reply.send(self.save_detached_review_link(&link));
            }
            DbCommand::RemoveDetachedReviewLink {
                workspace_id,
                child_thread_id,
                reply,
            } => {
                let _ = reply.send(self.remove_detached_review_link(&workspace_id, &child_thread_id));
            }
        }
    }

    fn load_thread_map(
        &mut self,
        sql: &str,
        workspace_id: &str,
    ) -> anyhow::Result<HashMap<ThreadId, i64>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params![workspace_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (thread_id, value) = row?;
            out.insert(ThreadId::new(thread_id), value);
        }
        Ok(out)
    }

    fn replace_thread_map(
        &mut self,
        table: &str,
        value_column: &str,
        workspace_id: &str,
        entries: &[(String, i64)],
    ) -> anyhow::Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {table} WHERE workspace_id = ?1"),
            params![workspace_id],
        )
        .with_context(|| format!("failed to clear {table}"))?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (workspace_id, thread_id, {value_column}) VALUES (?1, ?2, ?3)"
            ))?;
            for (thread_id, value) in entries {
                stmt.execute(params![workspace_id, thread_id, value])?;
            }
        }
        tx.commit()
            .with_context(|| format!("failed to commit {table}"))?;
        Ok(())
    }

    fn load_custom_thread_names(&mut self) -> anyhow::Result<Vec<CustomThreadName>> {
        let mut stmt = self.conn.prepare(
            "SELECT workspace_id, thread_id, name FROM thread_names
             ORDER BY workspace_id ASC, thread_id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CustomThreadName {
                workspace_id: WorkspaceId::new(row.get::<_, String>(0)?),
                thread_id: ThreadId::new(row.get::<_, String>(1)?),
                name: row.get::<_, String>(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn save_custom_thread_name(
        &mut self,
        workspace_id: &str,
        thread_id: &str,
        name: Option<&str>,
    ) -> anyhow::Result<()> {
        match name {
            Some(name) => {
                self.conn.execute(
                    "INSERT INTO thread_names (workspace_id, thread_id, name, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(workspace_id, thread_id)
                     DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
                    params![workspace_id, thread_id, name, now_unix_ms()],
                )?;
            }
            None => {
                self.conn.execute(
                    "DELETE FROM thread_names WHERE workspace_id = ?1 AND thread_id = ?2",
                    params![workspace_id, thread_id],
                )?;
            }
        }
        Ok(())
    }

    fn load_codex_params(&mut self, scope_key: &str) -> anyhow::Result<Option<ThreadCodexParams>> {
        let row = self
            .conn
            .query_row(
                "SELECT model_id, effort, access_mode, collaboration_mode_id,
                        codex_args_kind, codex_args_value, updated_at
                 FROM codex_params WHERE scope_key = ?1",
                params![scope_key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((model_id, effort, access_mode, collaboration_mode_id, kind, value, updated_at)) =
            row
        else {
            return Ok(None);
        };

        let codex_args_override = CodexArgsOverride::from_parts(&kind, value)
            .ok_or_else(|| anyhow!("invalid codex args kind {kind:?} for {scope_key}"))?;
        Ok(Some(ThreadCodexParams {
            model_id,
            effort: effort.as_deref().and_then(parse_thinking_effort),
            access_mode: access_mode.as_deref().and_then(parse_access_mode),
            collaboration_mode_id,
            codex_args_override,
            updated_at_unix_ms: updated_at,
        }))
    }

    fn save_codex_params(
        &mut self,
        scope_key: &str,
        params: &ThreadCodexParams,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO codex_params (
                scope_key, model_id, effort, access_mode, collaboration_mode_id,
                codex_args_kind, codex_args_value, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(scope_key) DO UPDATE SET
                model_id = excluded.model_id,
                effort = excluded.effort,
                access_mode = excluded.access_mode,
                collaboration_mode_id = excluded.collaboration_mode_id,
                codex_args_kind = excluded.codex_args_kind,
                codex_args_value = excluded.codex_args_value,
                updated_at = excluded.updated_at",
            params![
                scope_key,
                params.model_id,
                params.effort.map(|effort| effort.as_str()),
                params.access_mode.map(|mode| mode.as_str()),
                params.collaboration_mode_id,
                params.codex_args_override.kind_str(),
                params.codex_args_override.value(),
                params.updated_at_unix_ms,
            ],
        )?;
        Ok(())
    }

    fn load_detached_review_links(&mut self) -> anyhow::Result<Vec<DetachedReviewLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT workspace_id, parent_thread_id, child_thread_id, created_at
             FROM detached_review_links ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DetachedReviewLink {
                workspace_id: WorkspaceId::new(row.get::<_, String>(0)?),
                parent_thread_id: ThreadId::new(row.get::<_, String>(1)?),
                child_thread_id: ThreadId::new(row.get::<_, String>(2)?),
                created_at_unix_ms: row.get::<_, i64>(3)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn save_detached_review_link(&mut self, link: &DetachedReviewLink) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO detached_review_links
                (workspace_id, child_thread_id, parent_thread_id, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(workspace_id, child_thread_id)
             DO UPDATE SET parent_thread_id = excluded.parent_thread_id",
            params![
                link.workspace_id.as_str(),
                link.child_thread_id.as_str(),
                link.parent_thread_id.as_str(),
                link.created_at_unix_ms,
            ],
        )?;
        Ok(())
    }

    fn remove_detached_review_link(
        &mut self,
        workspace_id: &str,
        child_thread_id: &str,
    ) -> anyhow::Result<()> {
        self.conn.execute(
            "DELETE FROM detached_review_links WHERE workspace_id = ?1 AND child_thread_id = ?2",
            params![workspace_id, child_thread_id],
        )?;
        Ok(())
    }
}

fn configure_connection(conn: &mut Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .context("failed to apply sqlite PRAGMAs")?;
    Ok(())
}

fn apply_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    let current: u32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .context("failed to read user_version")? as u32;

    if current > LATEST_SCHEMA_VERSION {
        return Err(anyhow!(
            "sqlite schema version is newer than this build: db={}, app={}",
            current,
            LATEST_SCHEMA_VERSION
        ));
    }

    if current == LATEST_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to begin migration transaction")?;
    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply migration v{version:04}"))?;
        tx.pragma_update(None, "user_version", *version as i64)
            .context("failed to update user_version")?;
    }
    tx.commit()
        .context("failed to commit migration transaction")?;
    Ok(())
}
