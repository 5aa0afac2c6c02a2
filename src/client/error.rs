//! Client error types.

use thiserror::Error;

use crate::store::StoreError;

/// The one terminal failure every client operation can report.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The store could not be reached, signed into, or did not answer in time.
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),

    /// A record that had to exist was not found or could not be decoded.
    #[error("Record does not exist")]
    RecordNotFound,

    /// Any other store error, passed through untouched.
    #[error("Record store error: {0}")]
    Native(#[source] StoreError),

    /// The operation, or one it depended on, was cancelled.
    #[error("Operation was cancelled")]
    Cancelled,
}

impl From<StoreError> for ClientError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) | StoreError::NotAuthenticated => {
                ClientError::StoreUnavailable(e.to_string())
            }
            other => ClientError::Native(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordId;

    #[test]
    fn test_unreachable_maps_to_unavailable() {
        let err = ClientError::from(StoreError::Unavailable("offline".to_string()));
        assert!(matches!(err, ClientError::StoreUnavailable(_)));
        assert!(err.to_string().contains("offline"));

        let err = ClientError::from(StoreError::NotAuthenticated);
        assert!(matches!(err, ClientError::StoreUnavailable(_)));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = ClientError::from(StoreError::ServerRecordChanged {
            record_id: RecordId::with_name("abc"),
        });
        match err {
            ClientError::Native(StoreError::ServerRecordChanged { record_id }) => {
                assert_eq!(record_id.record_name(), "abc");
            }
            other => panic!("Expected Native error, got {:?}", other),
        }
    }
}
