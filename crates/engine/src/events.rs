//! Structured cache events
//!
//! Every cache decision is emitted as a `tracing` event with
//! `target: "tessera::cache"` and an `event_type` field, so subscribers can
//! filter or render them without parsing messages. Callers of these macros
//! must depend on `tracing`.

/// Emit a cache hit event.
///
/// # Example
/// ```rust,ignore
/// emit_cache_hit!("Crop", "Crop_3fa1...");
/// ```
#[macro_export]
macro_rules! emit_cache_hit {
    ($task:expr, $key:expr) => {
        ::tracing::info!(
            target: "tessera::cache",
            event_type = "cache.hit",
            task = %$task,
            cache_key = %$key,
        )
    };
}

/// Emit a cache miss event.
#[macro_export]
macro_rules! emit_cache_miss {
    ($task:expr, $key:expr) => {
        ::tracing::info!(
            target: "tessera::cache",
            event_type = "cache.miss",
            task = %$task,
            cache_key = %$key,
        )
    };
}

/// Emit an event for a freshly stored result.
#[macro_export]
macro_rules! emit_cache_stored {
    ($task:expr, $key:expr, $sub_results:expr) => {
        ::tracing::info!(
            target: "tessera::cache",
            event_type = "cache.stored",
            task = %$task,
            cache_key = %$key,
            sub_results = $sub_results,
        )
    };
}

/// Emit an event for a stored result found invalid.
#[macro_export]
macro_rules! emit_cache_invalidated {
    ($task:expr, $reason:expr) => {
        ::tracing::info!(
            target: "tessera::cache",
            event_type = "cache.invalidated",
            task = %$task,
            reason = %$reason,
        )
    };
}
