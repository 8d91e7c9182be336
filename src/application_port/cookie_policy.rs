#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("cookie policy sets SameSite=None without Secure")]
    InsecureSameSiteNone,
    #[error("cookie policy disables HttpOnly without the debug override")]
    HttpOnlyDisabled,
}
