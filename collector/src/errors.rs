use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failures_become_json_errors() {
        let parse = serde_json::from_str::<serde_json::Value>("{\"usv\":").unwrap_err();
        let err = Error::from(parse);
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("JSON parsing error"));
    }

    #[test]
    fn test_validation_message() {
        let err = Error::Validation("Temperature 150 out of range".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: Temperature 150 out of range"
        );
    }
}
