//! Environment-variable overrides shared by `AgentConfig` and `SandboxConfig`
//!
//! Unset or empty variables fall back to the struct defaults. A variable that
//! is set but does not parse is reported and ignored rather than aborting
//! startup.

use std::str::FromStr;

use tracing::warn;

/// Read a string variable, treating empty values as unset
pub fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read and parse a variable
pub fn env_parse<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env_string(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparsable environment override");
            None
        }
    }
}

/// Read a boolean flag ("1", "true", "yes", "on" are true)
pub fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_and_flag() {
        std::env::set_var("JN66_TEST_CONFIG_NUM", " 42 ");
        std::env::set_var("JN66_TEST_CONFIG_BAD", "forty-two");
        std::env::set_var("JN66_TEST_CONFIG_FLAG", "Yes");
        std::env::set_var("JN66_TEST_CONFIG_EMPTY", "  ");

        assert_eq!(env_parse::<u64>("JN66_TEST_CONFIG_NUM"), Some(42));
        assert_eq!(env_parse::<u64>("JN66_TEST_CONFIG_BAD"), None);
        assert_eq!(env_flag("JN66_TEST_CONFIG_FLAG"), Some(true));
        assert_eq!(env_string("JN66_TEST_CONFIG_EMPTY"), None);
        assert_eq!(env_string("JN66_TEST_CONFIG_UNSET"), None);
    }
}
