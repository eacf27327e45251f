mod env;
mod sqlite_store;

pub use env::{
    optional_bool_from_env, optional_string_from_env, optional_trimmed_path_from_env,
    optional_u64_from_env,
};
pub use sqlite_store::{DB_FILE_NAME, SqliteStore};
