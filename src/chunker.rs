//! Splitting of ordered domain lists into remote-list sized chunks.

/// Maximum number of entries a single Gateway list accepts.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Split `items` in order into groups of at most `max_size`.
///
/// The last group may be smaller. Empty input yields no groups. A `max_size`
/// of zero is treated as one so the function stays total; configuration
/// validation rejects it before it gets here.
pub fn chunk<T>(items: &[T], max_size: usize) -> std::slice::Chunks<'_, T> {
    items.chunks(max_size.max(1))
}

/// Number of chunks [`chunk`] produces for `len` items.
pub fn chunk_count(len: usize, max_size: usize) -> usize {
    len.div_ceil(max_size.max(1))
}
