use std::env;

/// Reads `var` from the environment, falling back to `default` when unset.
pub fn get_env(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}
