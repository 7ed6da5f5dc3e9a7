/// Shortest accepted display name, counted in characters after trimming.
pub const MIN_USERNAME_LEN: usize = 2;
/// Longest accepted display name, counted in characters after trimming.
pub const MAX_USERNAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("display name must be at least {MIN_USERNAME_LEN} characters")]
    TooShort,

    #[error("display name must be at most {MAX_USERNAME_LEN} characters")]
    TooLong,
}

/// Trim `raw` and check it against the login form's length rules.
pub fn validate_username(raw: &str) -> Result<String, UsernameError> {
    let name = raw.trim();
    let len = name.chars().count();
    if len < MIN_USERNAME_LEN {
        return Err(UsernameError::TooShort);
    }
    if len > MAX_USERNAME_LEN {
        return Err(UsernameError::TooLong);
    }
    Ok(name.to_string())
}
