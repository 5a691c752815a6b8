//! Day shard management
//!
//! Entries are partitioned into one JSONL file per UTC calendar day
//! (`{base_dir}/YYYY-MM-DD.jsonl`). Shards are append-only and
//! independent; readers merge and re-sort them by timestamp.

mod info;
mod manager;
pub mod util;

pub use info::{ShardInfo, ShardStats};
pub use manager::ShardManager;
pub use util::{
    all_shard_paths, day_key, days_in_range, group_by_day, parse_shard_date, shard_path,
    shard_paths_for_range,
};
