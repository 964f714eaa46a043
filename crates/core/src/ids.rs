//! Time-sortable id generation shared by runs and memory items.

use uuid::Uuid;

/// `{millis_since_epoch:013}-{uuid_v4}` — lexicographically sortable by
/// creation time, unlike a bare v4 UUID.
pub fn new_id(now_ms: i64) -> String {
    format!("{now_ms:013}-{}", Uuid::new_v4())
}
