use formbridge_api::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("'{event}' event carried an unusable payload: {message}")]
    InvalidPayload { event: String, message: String },
}

pub type Result<T> = std::result::Result<T, BridgeError>;
