use thiserror::Error;

/// Failures surfaced by the store ports.
///
/// Adapters map their own failures into these variants so the realtime and
/// snapshot layers can tell an expired session apart from a broken query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No session, bad credentials or an expired token.
    #[error("{message}")]
    Authentication { message: String },
    /// Channel errors, dropped connections and timeouts.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The store rejected or failed to execute a read or write.
    #[error("query failed: {message}")]
    Query { message: String },
    /// A row or change payload did not match the expected entity shape.
    #[error("malformed payload: {message}")]
    Decode { message: String },
}

impl StoreError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StoreError>() {
            Ok(store_err) => store_err,
            Err(other) => Self::query(format!("{other:#}")),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}
