//! Lyrics retrieval
//!
//! Lyrics are looked up cache-first: the [`LyricsStore`] is asked before
//! the network [`LyricsProvider`], and every successful network answer is
//! written through to the store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{ NetworkError, StoreError };
use crate::notice::{ Notice, NoticeHub };
use crate::state::{ PlaybackState, StateCell };
use crate::track::{ Lyrics, Track };


/// Local lyrics storage keyed by track URI.
#[async_trait]
pub trait LyricsStore: Send + Sync {
    async fn get( &self, uri: &str ) -> Result<Option<Lyrics>, StoreError>;

    async fn put( &self, lyrics: &Lyrics ) -> Result<(), StoreError>;
}


/// Remote lyrics lookup.
#[async_trait]
pub trait LyricsProvider: Send + Sync {
    async fn fetch( &self, track: &Track ) -> Result<Lyrics, NetworkError>;
}


/// Lyrics store held in memory and optionally mirrored to a JSON file.
#[derive( Debug, Default )]
pub struct LyricsCache {
    entries: RwLock<HashMap<String, Lyrics>>,
    path: Option<PathBuf>,
}


impl LyricsCache {
    /// Creates an empty cache that lives in memory only.
    pub fn new() -> Self {
        Self::default()
    }


    /// Opens a cache backed by the file at `path`.
    ///
    /// A missing file starts an empty cache; it is created on first write.
    pub async fn open( path: impl Into<PathBuf> ) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string( &path ).await {
            Ok( contents ) => {
                let list: Vec<Lyrics> = serde_json::from_str( &contents )?;
                list.into_iter().map( |l| ( l.uri.clone(), l ) ).collect()
            }
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err( e ) => return Err( e.into() ),
        };

        tracing::debug!( "Loaded {} cached lyrics from {:?}", entries.len(), path );

        Ok( Self {
            entries: RwLock::new( entries ),
            path: Some( path ),
        })
    }


    pub async fn len( &self ) -> usize {
        self.entries.read().await.len()
    }
}


#[async_trait]
impl LyricsStore for LyricsCache {
    async fn get( &self, uri: &str ) -> Result<Option<Lyrics>, StoreError> {
        Ok( self.entries.read().await.get( uri ).cloned() )
    }


    async fn put( &self, lyrics: &Lyrics ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert( lyrics.uri.clone(), lyrics.clone() );

        let Some( path ) = &self.path else { return Ok(()) };

        let mut list: Vec<&Lyrics> = entries.values().collect();
        list.sort_by( |a, b| a.uri.cmp( &b.uri ) );
        let json = serde_json::to_string( &list )?;

        if let Some( parent ) = path.parent() {
            tokio::fs::create_dir_all( parent ).await?;
        }
        tokio::fs::write( path, json ).await?;
        Ok(())
    }
}


/// Loads lyrics for the current track into the playback state.
#[derive( Clone )]
pub struct LyricsWorkflow {
    state: Arc<StateCell<PlaybackState>>,
    store: Arc<dyn LyricsStore>,
    provider: Arc<dyn LyricsProvider>,
    notices: NoticeHub,
}


impl LyricsWorkflow {
    pub fn new(
        state: Arc<StateCell<PlaybackState>>,
        store: Arc<dyn LyricsStore>,
        provider: Arc<dyn LyricsProvider>,
        notices: NoticeHub,
    ) -> Self {
        Self { state, store, provider, notices }
    }


    /// Starts a lookup in the background.
    pub fn load( &self ) {
        let workflow = self.clone();
        tokio::spawn( async move { workflow.run().await } );
    }


    /// Looks up lyrics for the current track and publishes the outcome.
    ///
    /// Does nothing when there is no current track or its lyrics are
    /// already loaded.
    pub async fn run( &self ) {
        let Some( track ) = self.state.read( |s| s.current_track.clone() ) else { return };

        let loaded = self.state.read( |s| {
            s.lyrics.as_ref().is_some_and( |l| l.uri == track.uri )
        });
        if loaded {
            return;
        }

        self.state.update( |s| {
            s.lyrics = None;
            s.is_loading_lyrics = true;
        });

        match self.store.get( &track.uri ).await {
            Ok( Some( lyrics ) ) => {
                tracing::debug!( "Lyrics cache hit for {}", track.uri );
                self.publish( Some( lyrics ) );
                return;
            }
            Ok( None ) => {}
            Err( e ) => tracing::warn!( "Failed to read lyrics cache: {}", e ),
        }

        if track.title.is_none() || track.artist.is_none() {
            self.publish( None );
            self.notices.send( Notice::LyricsMissingTags );
            return;
        }

        match self.provider.fetch( &track ).await {
            Ok( mut lyrics ) => {
                // Cached and published under the track's own key
                lyrics.uri = track.uri.clone();
                if let Err( e ) = self.store.put( &lyrics ).await {
                    tracing::warn!( "Failed to cache lyrics: {}", e );
                }
                self.publish( Some( lyrics ) );
            }
            Err( e ) => {
                if matches!( e, NetworkError::BadRequest | NetworkError::ParseError ) {
                    tracing::warn!(
                        "Lyrics lookup failed for {:?} by {:?} ({}): {}",
                        track.title, track.artist, track.uri, e
                    );
                }
                self.publish( None );
                self.notices.send( Notice::for_lyrics( e ) );
            }
        }
    }


    fn publish( &self, lyrics: Option<Lyrics> ) {
        self.state.update( |s| {
            s.lyrics = lyrics;
            s.is_loading_lyrics = false;
        });
    }
}


#[cfg( test )]
mod tests {
    use std::sync::atomic::Ordering;

    use tempfile::TempDir;

    use super::*;
    use crate::testing::{ track, FakeLyricsProvider };
    use crate::track::LyricsBody;


    fn workflow_for(
        current: Track,
        store: Arc<LyricsCache>,
        provider: Arc<FakeLyricsProvider>,
    ) -> ( LyricsWorkflow, Arc<StateCell<PlaybackState>>, NoticeHub ) {
        let state = Arc::new( StateCell::new( PlaybackState {
            current_track: Some( current ),
            ..Default::default()
        }));
        let notices = NoticeHub::new();
        let workflow = LyricsWorkflow::new( state.clone(), store, provider, notices.clone() );
        ( workflow, state, notices )
    }


    fn plain( uri: &str, text: &str ) -> Lyrics {
        Lyrics { uri: uri.into(), body: LyricsBody::Plain( text.into() ) }
    }


    #[tokio::test]
    async fn test_cache_hit_skips_provider() {
        let song = track( "song" );
        let store = Arc::new( LyricsCache::new() );
        store.put( &plain( &song.uri, "cached" ) ).await.unwrap();
        let provider = Arc::new( FakeLyricsProvider::new() );

        let ( workflow, state, _ ) = workflow_for( song.clone(), store, provider.clone() );
        workflow.run().await;

        assert_eq!( provider.calls.load( Ordering::SeqCst ), 0 );
        let snapshot = state.get();
        assert_eq!( snapshot.lyrics, Some( plain( &song.uri, "cached" ) ) );
        assert!( !snapshot.is_loading_lyrics );
    }


    #[tokio::test]
    async fn test_miss_fetches_and_writes_through() {
        let song = track( "song" );
        let store = Arc::new( LyricsCache::new() );
        let provider = Arc::new( FakeLyricsProvider::new() );

        let ( workflow, state, _ ) = workflow_for( song.clone(), store.clone(), provider.clone() );
        workflow.run().await;

        assert_eq!( provider.calls.load( Ordering::SeqCst ), 1 );
        assert!( state.get().lyrics.is_some() );
        assert!( store.get( &song.uri ).await.unwrap().is_some() );

        // Loaded lyrics for the same track are not looked up again
        workflow.run().await;
        assert_eq!( provider.calls.load( Ordering::SeqCst ), 1 );
    }


    #[tokio::test]
    async fn test_fetched_lyrics_are_keyed_by_track() {
        let song = track( "song" );
        let store = Arc::new( LyricsCache::new() );
        let provider = Arc::new( FakeLyricsProvider::answering_as( "provider:42" ) );

        let ( workflow, state, _ ) = workflow_for( song.clone(), store.clone(), provider.clone() );
        workflow.run().await;

        assert_eq!( state.get().lyrics.map( |l| l.uri ), Some( song.uri.clone() ) );
        assert!( store.get( &song.uri ).await.unwrap().is_some() );
        assert!( store.get( "provider:42" ).await.unwrap().is_none() );

        // A fresh lookup is served from the cache
        let ( again, _, _ ) = workflow_for( song, store, provider.clone() );
        again.run().await;
        assert_eq!( provider.calls.load( Ordering::SeqCst ), 1 );
    }


    #[tokio::test]
    async fn test_missing_tags_never_reach_the_network() {
        let mut song = track( "song" );
        song.artist = None;
        let provider = Arc::new( FakeLyricsProvider::new() );

        let ( workflow, state, notices ) = workflow_for( song, Arc::new( LyricsCache::new() ), provider.clone() );
        let mut rx = notices.subscribe();
        workflow.run().await;

        assert_eq!( provider.calls.load( Ordering::SeqCst ), 0 );
        assert_eq!( rx.try_recv().unwrap(), Notice::LyricsMissingTags );
        assert!( !state.get().is_loading_lyrics );
    }


    #[tokio::test]
    async fn test_provider_failure_publishes_nothing() {
        let provider = Arc::new( FakeLyricsProvider::failing( NetworkError::NotFound ) );
        let ( workflow, state, notices ) = workflow_for( track( "song" ), Arc::new( LyricsCache::new() ), provider );
        let mut rx = notices.subscribe();
        workflow.run().await;

        let snapshot = state.get();
        assert_eq!( snapshot.lyrics, None );
        assert!( !snapshot.is_loading_lyrics );
        assert_eq!( rx.try_recv().unwrap(), Notice::LyricsNotFound );
    }


    #[tokio::test]
    async fn test_file_cache_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join( "lyrics.json" );

        let cache = LyricsCache::open( &path ).await.unwrap();
        cache.put( &plain( "content://a", "la la" ) ).await.unwrap();

        let reopened = LyricsCache::open( &path ).await.unwrap();
        assert_eq!( reopened.len().await, 1 );
        assert_eq!( reopened.get( "content://a" ).await.unwrap(), Some( plain( "content://a", "la la" ) ) );
    }
}
