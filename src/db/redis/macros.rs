/// Read-through caching around an async computation.
///
/// Looks `$key` up in `$cache`; on a hit the cached value is returned. On a
/// miss, or when Redis cannot be reached, `$block` is awaited and its value
/// is queued for writing with `$ttl` seconds to live.
///
/// Errors from `$block` propagate with `?`, so the enclosing function must
/// return a `Result` whose error type they convert into. Cache failures
/// never fail the request; they are logged and the value is computed.
///
/// # Arguments
/// * `$cache`: anything with `get_from_cache` and `set_in_background`,
///   normally a [`Cache`](crate::db::Cache).
/// * `$key`: a [`CacheKey`](crate::db::CacheKey); it is borrowed, not moved.
/// * `$ttl`: time to live of the written entry, in seconds.
/// * `$block`: a future producing `Result<T, E>` where `T` is serializable.
///
/// # Example
/// ```rust,ignore
/// let items: Vec<RecommendedItem> = cached!(cache, key, 3600, async {
///     hydrate(&catalog, &ranked).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.get_from_cache(&$key).await {
            // Hit
            Ok(Some(cached)) => {
                tracing::debug!(key = %$key, "Cache hit");
                Ok(cached)
            }
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(key = %$key, error = %e, "Cache read failed, computing");
                }
                // Miss or unreachable cache: compute, then write back off the request path
                let value = $block.await?;
                $cache.set_in_background(&$key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
