use std::fmt::Display;

#[derive(Debug)]
pub struct ReefServiceError {
    pub error: String,
}

impl ReefServiceError {
    pub fn from_string(error: String) -> Self {
        ReefServiceError { error }
    }

    pub fn from_error<E: Display>(prefix: &str) -> impl Fn(E) -> Self + '_ {
        move |e: E| ReefServiceError::from_string(format!("{}: {}", prefix, e))
    }
}

impl Display for ReefServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InAccel injector error: {}", self.error)
    }
}

impl std::error::Error for ReefServiceError {}

impl From<&str> for ReefServiceError {
    fn from(error: &str) -> Self {
        ReefServiceError::from_string(error.to_string())
    }
}

impl From<String> for ReefServiceError {
    fn from(error: String) -> Self {
        ReefServiceError::from_string(error)
    }
}

impl From<serde_json::error::Error> for ReefServiceError {
    fn from(error: serde_json::error::Error) -> Self {
        ReefServiceError::from_string(error.to_string())
    }
}
