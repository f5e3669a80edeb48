//! Password resolution when the caller omits one explicitly: the OS
//! keyring first, an interactive stdin prompt (echo disabled) as the
//! fallback for hosts with no keyring backend.

use fstree_error::{Error, Result};

const SERVICE: &str = "fstree";

/// Looks up `username`'s password in the OS keyring; if absent or
/// unavailable, prompts on stdin instead.
pub fn resolve_password(username: &str) -> Result<String> {
    if let Ok(entry) = keyring::Entry::new(SERVICE, username) {
        if let Ok(password) = entry.get_password() {
            return Ok(password);
        }
    }
    rpassword::prompt_password(format!("Enter FamilySearch password for {username}: "))
        .map_err(|err| Error::auth(format!("failed to read password from stdin: {err}")))
}

/// Saves `password` to the OS keyring under `username`, for later
/// `resolve_password` calls to pick up without prompting.
pub fn store_password(username: &str, password: &str) -> Result<()> {
    let entry = keyring::Entry::new(SERVICE, username)
        .map_err(|err| Error::auth(format!("failed to open OS keyring: {err}")))?;
    entry.set_password(password).map_err(|err| Error::auth(format!("failed to store password: {err}")))
}
