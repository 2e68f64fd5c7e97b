use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("No logged-in user profile found")]
    NoUserFound,

    #[error("Profile unavailable: {0}")]
    ProfileUnavailable(String),

    #[error("Weight fetch for year {year} failed: {reason}")]
    YearFetchFailed { year: i32, reason: String },

    #[error("Store read failed: {0}")]
    StoreReadFailed(String),

    #[error("Store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Remote API error {status}: {body}")]
    RemoteStatus { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_fetch_failed_message_names_year() {
        let err = SyncError::YearFetchFailed {
            year: 2019,
            reason: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Weight fetch for year 2019 failed: connection reset"
        );
    }
}
