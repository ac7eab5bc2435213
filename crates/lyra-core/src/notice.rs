//! Transient user-facing notices.
//!
//! Workflows never surface errors through the playback state. Anything the
//! user should hear about is published here and displayed once by whoever
//! is listening.

use tokio::sync::broadcast;

use crate::error::NetworkError;


const NOTICE_CAPACITY: usize = 32;


/// A one-shot message for the user.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Notice {
    // Metadata search
    QueryCorrupted,
    MetadataServerError,
    MetadataUnavailable,

    // Cover art
    CoverArtIdCorrupted,
    CoverArtNotFound,
    CoverArtUnavailable,
    CoverArtTimeout,

    // Lyrics
    LyricsMissingTags,
    LyricsNotFound,

    // Shared network failures
    ParseFailed,
    NoInternet,
    UnknownError,

    // Library
    TrackAlreadyOnPlaylist,
    TrackNotFound,
}


impl Notice {
    /// Maps a failed metadata search.
    pub fn for_search( error: NetworkError ) -> Self {
        match error {
            NetworkError::BadRequest => Notice::QueryCorrupted,
            NetworkError::InternalServerError => Notice::MetadataServerError,
            NetworkError::ServiceUnavailable => Notice::MetadataUnavailable,
            NetworkError::ParseError => Notice::ParseFailed,
            NetworkError::NoInternet => Notice::NoInternet,
            _ => Notice::UnknownError,
        }
    }


    /// Maps a failed cover-art download.
    pub fn for_cover_art( error: NetworkError ) -> Self {
        match error {
            NetworkError::BadRequest => Notice::CoverArtIdCorrupted,
            NetworkError::NotFound => Notice::CoverArtNotFound,
            NetworkError::ServiceUnavailable => Notice::CoverArtUnavailable,
            NetworkError::NoInternet => Notice::NoInternet,
            NetworkError::RequestTimeout => Notice::CoverArtTimeout,
            _ => Notice::UnknownError,
        }
    }


    /// Maps a failed lyrics lookup.
    pub fn for_lyrics( error: NetworkError ) -> Self {
        match error {
            NetworkError::BadRequest => Notice::LyricsMissingTags,
            NetworkError::NotFound => Notice::LyricsNotFound,
            NetworkError::ParseError => Notice::ParseFailed,
            NetworkError::NoInternet => Notice::NoInternet,
            _ => Notice::UnknownError,
        }
    }


    /// Text shown to the user.
    pub fn message( &self ) -> &'static str {
        match self {
            Notice::QueryCorrupted => "Search query was corrupted",
            Notice::MetadataServerError => "Metadata server error, try again later",
            Notice::MetadataUnavailable => "Metadata service is unavailable",
            Notice::CoverArtIdCorrupted => "Failed to load cover art: album id is corrupted",
            Notice::CoverArtNotFound => "Cover art not found",
            Notice::CoverArtUnavailable => "Cover art archive is unavailable",
            Notice::CoverArtTimeout => "Failed to load cover art: request timed out",
            Notice::LyricsMissingTags => "Can't look for lyrics: title or artist is missing",
            Notice::LyricsNotFound => "Lyrics not found",
            Notice::ParseFailed => "Failed to parse response",
            Notice::NoInternet => "No internet connection",
            Notice::UnknownError => "Unknown error occurred",
            Notice::TrackAlreadyOnPlaylist => "Track is already on the playlist",
            Notice::TrackNotFound => "Track is not found in the library",
        }
    }
}


/// Fan-out channel for [`Notice`]s. Cheap to clone.
#[derive( Debug, Clone )]
pub struct NoticeHub {
    tx: broadcast::Sender<Notice>,
}


impl NoticeHub {
    pub fn new() -> Self {
        let ( tx, _ ) = broadcast::channel( NOTICE_CAPACITY );
        Self { tx }
    }


    /// Publishes `notice`. Dropped when nobody is listening.
    pub fn send( &self, notice: Notice ) {
        tracing::info!( "Notice: {}", notice.message() );
        let _ = self.tx.send( notice );
    }


    pub fn subscribe( &self ) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}


impl Default for NoticeHub {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_search_mapping() {
        assert_eq!( Notice::for_search( NetworkError::BadRequest ), Notice::QueryCorrupted );
        assert_eq!( Notice::for_search( NetworkError::NotFound ), Notice::UnknownError );
        assert_eq!( Notice::for_search( NetworkError::RequestTimeout ), Notice::UnknownError );
    }


    #[test]
    fn test_cover_art_mapping() {
        assert_eq!( Notice::for_cover_art( NetworkError::RequestTimeout ), Notice::CoverArtTimeout );
        assert_eq!( Notice::for_cover_art( NetworkError::ParseError ), Notice::UnknownError );
    }


    #[test]
    fn test_lyrics_bad_request_means_missing_tags() {
        assert_eq!( Notice::for_lyrics( NetworkError::BadRequest ), Notice::LyricsMissingTags );
        assert_eq!( Notice::for_lyrics( NetworkError::InternalServerError ), Notice::UnknownError );
    }


    #[tokio::test]
    async fn test_hub_delivers_to_subscribers() {
        let hub = NoticeHub::new();
        let mut rx = hub.subscribe();
        hub.send( Notice::TrackNotFound );
        assert_eq!( rx.recv().await.unwrap(), Notice::TrackNotFound );
    }
}
