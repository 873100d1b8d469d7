/// Errors from cache writes. Never fatal to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Caching is switched off.
    #[error("cache disabled")]
    Disabled,

    /// The cache lock could not be taken within the short wait.
    #[error("cache busy")]
    Busy,
}

pub type CacheResult<T> = Result<T, CacheError>;
