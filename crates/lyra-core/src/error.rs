//! Error types shared by the collaborators.

use thiserror::Error;


/// Failure of a network-backed request (metadata search, cover art, lyrics).
///
/// These are never fatal. The controller maps each kind to a transient
/// notice and the user decides whether to try again.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Error )]
pub enum NetworkError {
    #[error( "Bad request" )]
    BadRequest,

    #[error( "Not found" )]
    NotFound,

    #[error( "Internal server error" )]
    InternalServerError,

    #[error( "Service unavailable" )]
    ServiceUnavailable,

    #[error( "Failed to parse response" )]
    ParseError,

    #[error( "No internet connection" )]
    NoInternet,

    #[error( "Request timed out" )]
    RequestTimeout,

    #[error( "Unknown error" )]
    Unknown,
}


impl NetworkError {
    /// Maps an HTTP status code to an error kind.
    ///
    /// @param status - HTTP status of a non-successful response
    ///
    /// @returns The matching error kind, `Unknown` for anything unmapped
    pub fn from_status( status: u16 ) -> Self {
        match status {
            400 => NetworkError::BadRequest,
            404 => NetworkError::NotFound,
            408 => NetworkError::RequestTimeout,
            503 => NetworkError::ServiceUnavailable,
            500..=599 => NetworkError::InternalServerError,
            _ => NetworkError::Unknown,
        }
    }


    /// Whether the failure is worth logging with the request context.
    pub fn is_diagnostic( &self ) -> bool {
        matches!( self, NetworkError::BadRequest | NetworkError::ParseError | NetworkError::Unknown )
    }
}


/// Errors reading the track catalog.
#[derive( Debug, Error )]
pub enum CatalogError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Invalid catalog manifest: {0}" )]
    Manifest( #[from] serde_json::Error ),
}


/// Errors from the file-backed stores (session, playlists, lyrics).
#[derive( Debug, Error )]
pub enum StoreError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "Serialization error: {0}" )]
    Json( #[from] serde_json::Error ),

    #[error( "Invalid playlist name: {0:?}" )]
    InvalidName( String ),

    #[error( "No data directory available" )]
    NoDataDir,
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_from_status() {
        assert_eq!( NetworkError::from_status( 400 ), NetworkError::BadRequest );
        assert_eq!( NetworkError::from_status( 404 ), NetworkError::NotFound );
        assert_eq!( NetworkError::from_status( 408 ), NetworkError::RequestTimeout );
        assert_eq!( NetworkError::from_status( 502 ), NetworkError::InternalServerError );
        assert_eq!( NetworkError::from_status( 503 ), NetworkError::ServiceUnavailable );
        assert_eq!( NetworkError::from_status( 418 ), NetworkError::Unknown );
    }
}
