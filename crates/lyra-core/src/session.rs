//! Session persistence
//!
//! Remembers the last playback queue and playback mode across restarts.

use std::path::{ Path, PathBuf };
use std::sync::{ Arc, OnceLock };

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use tokio::sync::{ mpsc, Mutex };

use crate::error::StoreError;
use crate::state::PlaybackMode;
use crate::track::Playlist;


/// Persisted session state.
#[derive( Debug, Clone, PartialEq, Default, Serialize, Deserialize )]
#[serde( default )]
pub struct SessionSnapshot {
    pub playlist: Option<Playlist>,
    pub playback_mode: PlaybackMode,
}


/// Storage for the [`SessionSnapshot`].
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the saved session. A missing session is the default snapshot.
    async fn load( &self ) -> Result<SessionSnapshot, StoreError>;

    async fn save_playlist( &self, playlist: Option<Playlist> ) -> Result<(), StoreError>;

    async fn save_playback_mode( &self, mode: PlaybackMode ) -> Result<(), StoreError>;
}


/// Session kept in a single JSON file.
pub struct JsonSessionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    lock: Mutex<()>,
}


impl JsonSessionStore {
    pub fn new( path: impl Into<PathBuf> ) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new( () ),
        }
    }


    /// Store at the default location, `<data dir>/lyra/session.json`.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::data_local_dir().ok_or( StoreError::NoDataDir )?;
        Ok( Self::new( dir.join( "lyra" ).join( "session.json" ) ) )
    }


    pub fn path( &self ) -> &Path {
        &self.path
    }


    async fn read( &self ) -> Result<SessionSnapshot, StoreError> {
        match tokio::fs::read_to_string( &self.path ).await {
            Ok( contents ) => Ok( serde_json::from_str( &contents )? ),
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => Ok( SessionSnapshot::default() ),
            Err( e ) => Err( e.into() ),
        }
    }


    async fn write( &self, snapshot: &SessionSnapshot ) -> Result<(), StoreError> {
        if let Some( parent ) = self.path.parent() {
            tokio::fs::create_dir_all( parent ).await?;
        }
        let json = serde_json::to_string_pretty( snapshot )?;
        tokio::fs::write( &self.path, json ).await?;
        Ok(())
    }


    async fn modify( &self, f: impl FnOnce( &mut SessionSnapshot ) + Send ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut snapshot = self.read().await.unwrap_or_else( |e| {
            tracing::warn!( "Discarding unreadable session file: {}", e );
            SessionSnapshot::default()
        });
        f( &mut snapshot );
        self.write( &snapshot ).await
    }
}


#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn load( &self ) -> Result<SessionSnapshot, StoreError> {
        let _guard = self.lock.lock().await;
        self.read().await
    }


    async fn save_playlist( &self, playlist: Option<Playlist> ) -> Result<(), StoreError> {
        self.modify( move |s| s.playlist = playlist ).await
    }


    async fn save_playback_mode( &self, mode: PlaybackMode ) -> Result<(), StoreError> {
        self.modify( move |s| s.playback_mode = mode ).await
    }
}


/// A pending change to the saved session.
#[derive( Debug, Clone, PartialEq )]
pub enum SessionWrite {
    Playlist( Option<Playlist> ),
    Mode( PlaybackMode ),
}


/// Applies session writes one at a time, in the order they were sent.
///
/// The background task is started by the first write, so the writer can
/// be built outside a runtime but must be written to from inside one.
pub struct SessionWriter {
    store: Arc<dyn SessionStore>,
    tx: OnceLock<mpsc::UnboundedSender<SessionWrite>>,
}


impl SessionWriter {
    pub fn new( store: Arc<dyn SessionStore> ) -> Self {
        Self { store, tx: OnceLock::new() }
    }


    /// Queues `write`. Never blocks.
    pub fn send( &self, write: SessionWrite ) {
        let tx = self.tx.get_or_init( || {
            let ( tx, rx ) = mpsc::unbounded_channel();
            tokio::spawn( Self::run( self.store.clone(), rx ) );
            tx
        });

        if tx.send( write ).is_err() {
            tracing::warn!( "Session writer stopped, change not saved" );
        }
    }


    async fn run( store: Arc<dyn SessionStore>, mut rx: mpsc::UnboundedReceiver<SessionWrite> ) {
        while let Some( write ) = rx.recv().await {
            let result = match write {
                SessionWrite::Playlist( playlist ) => store.save_playlist( playlist ).await,
                SessionWrite::Mode( mode ) => store.save_playback_mode( mode ).await,
            };
            if let Err( e ) = result {
                tracing::warn!( "Failed to save session: {}", e );
            }
        }
        tracing::debug!( "Session writer finished" );
    }
}


#[cfg( test )]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::testing::track;


    #[tokio::test]
    async fn test_missing_file_is_default_session() {
        let dir = TempDir::new().unwrap();
        let store = JsonSessionStore::new( dir.path().join( "session.json" ) );
        assert_eq!( store.load().await.unwrap(), SessionSnapshot::default() );
    }


    #[tokio::test]
    async fn test_saves_merge_into_one_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = JsonSessionStore::new( dir.path().join( "nested" ).join( "session.json" ) );
        let playlist = Playlist::named( "mix", vec![ track( "a" ), track( "b" ) ] );

        store.save_playlist( Some( playlist.clone() ) ).await.unwrap();
        store.save_playback_mode( PlaybackMode::Shuffle ).await.unwrap();

        let reopened = JsonSessionStore::new( store.path() );
        let snapshot = reopened.load().await.unwrap();
        assert_eq!( snapshot.playlist, Some( playlist ) );
        assert_eq!( snapshot.playback_mode, PlaybackMode::Shuffle );
    }


    #[tokio::test]
    async fn test_writer_applies_writes_in_order() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new( JsonSessionStore::new( dir.path().join( "session.json" ) ) );
        let writer = SessionWriter::new( store.clone() );

        for name in [ "a", "b", "c", "d" ] {
            writer.send( SessionWrite::Playlist( Some( Playlist::named( name, vec![ track( name ) ] ) ) ) );
        }
        writer.send( SessionWrite::Mode( PlaybackMode::RepeatOne ) );
        writer.send( SessionWrite::Playlist( None ) );
        drop( writer );

        // The writer drains its queue after the last sender is gone
        let mut snapshot = store.load().await.unwrap();
        for _ in 0..200 {
            if snapshot.playback_mode == PlaybackMode::RepeatOne && snapshot.playlist.is_none() {
                break;
            }
            tokio::time::sleep( std::time::Duration::from_millis( 10 ) ).await;
            snapshot = store.load().await.unwrap();
        }
        assert_eq!( snapshot.playback_mode, PlaybackMode::RepeatOne );
        assert_eq!( snapshot.playlist, None );
    }
}
