//! Track catalog source.

use std::path::{ Path, PathBuf };

use async_trait::async_trait;

use crate::error::CatalogError;
use crate::track::Track;


/// Supplies the full list of known tracks on demand.
#[async_trait]
pub trait TrackCatalog: Send + Sync {
    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError>;
}


/// Catalog read from a JSON manifest: an array of tracks.
///
/// The file is re-read on every call, so an external scanner can rewrite it
/// at any time and the next sync tick picks the change up.
#[derive( Debug, Clone )]
pub struct ManifestCatalog {
    path: PathBuf,
}


impl ManifestCatalog {
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self { path: path.into() }
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }
}


#[async_trait]
impl TrackCatalog for ManifestCatalog {
    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        let contents = tokio::fs::read_to_string( &self.path ).await?;
        let tracks: Vec<Track> = serde_json::from_str( &contents )?;
        tracing::trace!( "Read {} tracks from {:?}", tracks.len(), self.path );
        Ok( tracks )
    }
}


#[cfg( test )]
mod tests {
    use tempfile::TempDir;

    use super::*;


    #[tokio::test]
    async fn test_reads_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "catalog.json" );
        std::fs::write( &path, r#"[
            { "uri": "content://1", "path": "/music/a.mp3", "title": "A", "duration_ms": 1000 },
            { "uri": "content://2", "path": "/music/b.flac" }
        ]"# ).unwrap();

        let tracks = ManifestCatalog::new( &path ).list_tracks().await.unwrap();
        assert_eq!( tracks.len(), 2 );
        assert_eq!( tracks[ 0 ].title.as_deref(), Some( "A" ) );
        assert_eq!( tracks[ 1 ].format().as_deref(), Some( "flac" ) );
    }


    #[tokio::test]
    async fn test_missing_manifest_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = ManifestCatalog::new( dir.path().join( "nope.json" ) ).list_tracks().await;
        assert!( matches!( result, Err( CatalogError::Io( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_malformed_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "catalog.json" );
        std::fs::write( &path, "{ not json" ).unwrap();

        let result = ManifestCatalog::new( &path ).list_tracks().await;
        assert!( matches!( result, Err( CatalogError::Manifest( _ ) ) ) );
    }
}
