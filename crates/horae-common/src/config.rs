//! Configuration utilities for Horae services

/// Get environment variable with default
pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as parsed type with default
pub fn env_parse_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_defaults() {
        assert_eq!(env_or_default("HORAE_TEST_UNSET_VAR", "fallback"), "fallback");
        assert_eq!(env_parse_or_default("HORAE_TEST_UNSET_VAR", 42u32), 42);
    }
}
