use std::env;
use std::ffi::OsStr;

/// Whether the environment variable `key` holds a truthy value (`1`, `t`,
/// `true`, `y`, `yes`, any case).
///
/// Returns `false` if the environment variable is not set, or contains invalid characters.
pub fn env_var_is_true(key: impl AsRef<OsStr>) -> bool {
    env_var_is_true_or(key, false)
}

/// Like [`env_var_is_true`], but returns `default` if the variable is not set
/// or is not valid unicode.
pub fn env_var_is_true_or(key: impl AsRef<OsStr>, default: bool) -> bool {
    env::var(key)
        .map(|value| {
            ["1", "t", "true", "y", "yes"]
                .iter()
                .any(|&s| value.eq_ignore_ascii_case(s))
        })
        .unwrap_or(default)
}
