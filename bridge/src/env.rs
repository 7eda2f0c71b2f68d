use std::collections::HashMap;

/// Environment variables forwarded to a spawned worker. The worker
/// never inherits the parent's full environment; anything beyond this
/// list must be passed explicitly.
#[cfg(unix)]
const DEFAULT_ENV_VARS: &[&str] = &[
    "HOME",
    "LANG",
    "LC_ALL",
    "LOGNAME",
    "PATH",
    "SHELL",
    "TERM",
    "TMPDIR",
    "TZ",
    "USER",
];

#[cfg(windows)]
const DEFAULT_ENV_VARS: &[&str] = &[
    "PATH",
    "PATHEXT",
    "TEMP",
    "TMP",
    "USERDOMAIN",
    "USERNAME",
    "USERPROFILE",
];

/// Whitelisted base environment plus the caller's extras. Extras win on
/// collision.
pub fn create_worker_env(extra_env: Option<HashMap<String, String>>) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars()
        .filter(|(k, _)| DEFAULT_ENV_VARS.contains(&k.as_str()))
        .collect();
    if let Some(extra) = extra_env {
        env.extend(extra);
    }
    env
}
