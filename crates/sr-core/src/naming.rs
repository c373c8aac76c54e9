//! Consumer naming.
//!
//! Consumer names only need to be stable for the life of a process and
//! distinct across group members; `<role>-<host>-<pid>` satisfies both
//! while staying legible in XPENDING output.

/// Build the default consumer name for a worker role.
pub fn default_consumer_name(role: &str) -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_owned());
    format!("{}-{}-{}", role, host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_carries_role_and_pid() {
        let name = default_consumer_name("ingestion");
        assert!(name.starts_with("ingestion-"));
        assert!(name.ends_with(&std::process::id().to_string()));
    }
}
