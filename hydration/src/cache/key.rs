use uuid::Uuid;

/// `{prefix}{profile_id}:{plugin_id}:{provider}:{key}`, components taken as supplied.
pub fn build_cache_key(
    prefix: &str,
    profile_id: Uuid,
    plugin_id: &str,
    provider: &str,
    key: &str,
) -> String {
    format!("{prefix}{profile_id}:{plugin_id}:{provider}:{key}")
}
