//! Network providers for running without network clients.
//!
//! Every request fails with [`NetworkError::NoInternet`], which the core
//! turns into the usual notice.

use async_trait::async_trait;

use lyra_core::lyrics::LyricsProvider;
use lyra_core::metadata::MetadataProvider;
use lyra_core::{ Lyrics, NetworkError, SearchResult, Track };


pub struct OfflineMetadata;


#[async_trait]
impl MetadataProvider for OfflineMetadata {
    async fn search( &self, query: &str, _duration_hint_ms: Option<u64> ) -> Result<Vec<SearchResult>, NetworkError> {
        tracing::debug!( "Offline: metadata search for {:?} skipped", query );
        Err( NetworkError::NoInternet )
    }


    async fn fetch_cover_art( &self, _result: &SearchResult ) -> Result<Vec<u8>, NetworkError> {
        Err( NetworkError::NoInternet )
    }
}


pub struct OfflineLyrics;


#[async_trait]
impl LyricsProvider for OfflineLyrics {
    async fn fetch( &self, track: &Track ) -> Result<Lyrics, NetworkError> {
        tracing::debug!( "Offline: lyrics lookup for {} skipped", track.uri );
        Err( NetworkError::NoInternet )
    }
}
