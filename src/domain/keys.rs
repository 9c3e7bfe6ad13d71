use serde::Serialize;

/// Default first key of the whole key space.
pub const DEFAULT_UID_BASE: i64 = 100_000_000;

/// Disjoint slice of the key space owned by one virtual client.
///
/// Client `i` owns `[base + i * len, base + (i + 1) * len)`. Every write
/// offset maps into that range, so a client keeps hitting the same bounded
/// working set for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KeyPartition {
    pub client_index: usize,
    pub start: i64,
    pub len: u64,
}

impl KeyPartition {
    pub fn new(base_key: i64, client_index: usize, per_client_keys: u64) -> Self {
        Self {
            client_index,
            start: partition_start(base_key, client_index, per_client_keys),
            len: per_client_keys,
        }
    }

    /// Key written by the `write_offset`-th upsert of this client.
    pub fn key_at(&self, write_offset: u64) -> i64 {
        if self.len == 0 {
            return self.start;
        }
        self.start + (write_offset % self.len) as i64
    }

    /// Exclusive upper bound of the partition.
    pub fn end(&self) -> i64 {
        self.start + self.len as i64
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.start && key < self.end()
    }
}

/// First key owned by `client_index`.
pub fn partition_start(base_key: i64, client_index: usize, per_client_keys: u64) -> i64 {
    base_key + (client_index as u64 * per_client_keys) as i64
}

/// Exclusive upper bound of `uid_count` keys starting at `base_key`, or
/// `None` when the range does not fit in an `i64`.
///
/// Every partition lies inside this range, so once it fits no key
/// computation can overflow.
pub fn key_space_end(base_key: i64, uid_count: u64) -> Option<i64> {
    i64::try_from(uid_count)
        .ok()
        .and_then(|n| base_key.checked_add(n))
}

/// `base + index * per_client + (offset mod per_client)`.
///
/// `write_offset` is free to wrap: only its residue is used.
pub fn allocate_key(
    client_index: usize,
    base_key: i64,
    per_client_keys: u64,
    write_offset: u64,
) -> i64 {
    KeyPartition::new(base_key, client_index, per_client_keys).key_at(write_offset)
}
