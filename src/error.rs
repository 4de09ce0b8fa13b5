use thiserror::Error;

/// Result type for Tesira operations
pub type Result<T> = std::result::Result<T, TesiraError>;

/// Errors that can occur when interacting with a Tesira DSP
#[derive(Error, Debug)]
pub enum TesiraError {
    /// The transport could not deliver the command line
    #[error("unable to send command")]
    SendFailed,

    /// The transport returned no data where a response line was required
    #[error("response was blank")]
    BlankResponse,

    /// The Telnet handshake did not complete
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// The device answered with an `-ERR` line
    #[error("device error: {0}")]
    DeviceError(String),

    /// No classifiable response arrived within the read budget
    #[error("no valid response from the device after {attempts} reads")]
    NoValidResponse {
        /// How many lines were read before giving up
        attempts: u32,
    },

    /// A value could not be converted between the percent and dB scales
    #[error("value transform error: {0}")]
    Transform(String),

    /// An operation kept failing until its retry budget ran out
    #[error("operation failed after {attempts} attempts")]
    RetriesExhausted {
        /// How many attempts were made
        attempts: u32,
        /// The error from the final attempt
        #[source]
        source: Box<TesiraError>,
    },

    /// The audio-mode scan found no channel reporting an active state
    #[error("no channel reported an active audio mode")]
    NoActiveChannel,

    /// The dispatcher passed a setting name this driver does not implement
    #[error("unrecognized setting: {0}")]
    UnknownSetting(String),

    /// An underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TesiraError {
    /// Whether the failure happened before any command could be exchanged.
    ///
    /// Health reporting treats only these as "device unreachable"; a device
    /// that answers with an error is still alive.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            TesiraError::SendFailed | TesiraError::NegotiationFailed(_) => true,
            TesiraError::RetriesExhausted { source, .. } => source.is_connection_failure(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failures_are_flagged() {
        assert!(TesiraError::SendFailed.is_connection_failure());
        assert!(TesiraError::NegotiationFailed("no banner".into()).is_connection_failure());
        assert!(!TesiraError::BlankResponse.is_connection_failure());
        assert!(!TesiraError::DeviceError("-ERR".into()).is_connection_failure());
    }

    #[test]
    fn connection_failure_seen_through_retry_wrapper() {
        let wrapped = TesiraError::RetriesExhausted {
            attempts: 2,
            source: Box::new(TesiraError::SendFailed),
        };
        assert!(wrapped.is_connection_failure());

        let wrapped = TesiraError::RetriesExhausted {
            attempts: 2,
            source: Box::new(TesiraError::BlankResponse),
        };
        assert!(!wrapped.is_connection_failure());
    }

    #[test]
    fn retry_wrapper_exposes_source() {
        let wrapped = TesiraError::RetriesExhausted {
            attempts: 2,
            source: Box::new(TesiraError::BlankResponse),
        };
        let source = std::error::Error::source(&wrapped).expect("source");
        assert_eq!(source.to_string(), "response was blank");
    }
}
