//! Test doubles for the collaborator traits.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::TrackCatalog;
use crate::error::{ CatalogError, NetworkError, StoreError };
use crate::lyrics::LyricsProvider;
use crate::metadata::MetadataProvider;
use crate::session::{ SessionSnapshot, SessionStore };
use crate::state::PlaybackMode;
use crate::track::{ Lyrics, LyricsBody, Playlist, SearchResult, Track };


/// A three-minute track named `name`.
pub fn track( name: &str ) -> Track {
    Track {
        uri: format!( "content://{}", name ),
        path: PathBuf::from( format!( "/music/{}.mp3", name ) ),
        duration_ms: 180_000,
        size: 4_000_000,
        title: Some( name.to_string() ),
        artist: Some( "Artist".to_string() ),
        ..Default::default()
    }
}


pub fn tracks( names: &[&str] ) -> Vec<Track> {
    names.iter().map( |n| track( n ) ).collect()
}


/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually( mut condition: impl FnMut() -> bool ) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep( Duration::from_millis( 10 ) ).await;
    }
    panic!( "condition was never met" );
}


/// Catalog whose contents the test controls.
#[derive( Default )]
pub struct FakeCatalog {
    tracks: Mutex<Vec<Track>>,
    failing: Mutex<bool>,
    pub calls: AtomicUsize,
}


impl FakeCatalog {
    pub fn with( tracks: Vec<Track> ) -> Self {
        let catalog = Self::default();
        catalog.set( tracks );
        catalog
    }


    pub fn set( &self, tracks: Vec<Track> ) {
        *self.tracks.lock().unwrap() = tracks;
    }


    pub fn fail( &self, failing: bool ) {
        *self.failing.lock().unwrap() = failing;
    }
}


#[async_trait]
impl TrackCatalog for FakeCatalog {
    async fn list_tracks( &self ) -> Result<Vec<Track>, CatalogError> {
        self.calls.fetch_add( 1, Ordering::SeqCst );
        if *self.failing.lock().unwrap() {
            return Err( io::Error::new( io::ErrorKind::Other, "scanner offline" ).into() );
        }
        Ok( self.tracks.lock().unwrap().clone() )
    }
}


/// In-memory session store that counts writes.
#[derive( Default )]
pub struct FakeSessionStore {
    snapshot: Mutex<SessionSnapshot>,
    pub saves: AtomicUsize,
}


impl FakeSessionStore {
    pub fn with( snapshot: SessionSnapshot ) -> Self {
        Self {
            snapshot: Mutex::new( snapshot ),
            saves: AtomicUsize::new( 0 ),
        }
    }


    pub fn snapshot( &self ) -> SessionSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}


#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn load( &self ) -> Result<SessionSnapshot, StoreError> {
        Ok( self.snapshot() )
    }


    async fn save_playlist( &self, playlist: Option<Playlist> ) -> Result<(), StoreError> {
        self.saves.fetch_add( 1, Ordering::SeqCst );
        self.snapshot.lock().unwrap().playlist = playlist;
        Ok(())
    }


    async fn save_playback_mode( &self, mode: PlaybackMode ) -> Result<(), StoreError> {
        self.saves.fetch_add( 1, Ordering::SeqCst );
        self.snapshot.lock().unwrap().playback_mode = mode;
        Ok(())
    }
}


/// Lyrics provider that answers with plain text or a fixed error.
#[derive( Default )]
pub struct FakeLyricsProvider {
    error: Option<NetworkError>,
    // Key to answer under instead of the track's uri
    answer_uri: Option<String>,
    pub calls: AtomicUsize,
}


impl FakeLyricsProvider {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn failing( error: NetworkError ) -> Self {
        Self { error: Some( error ), ..Self::default() }
    }


    pub fn answering_as( uri: &str ) -> Self {
        Self { answer_uri: Some( uri.to_string() ), ..Self::default() }
    }
}


#[async_trait]
impl LyricsProvider for FakeLyricsProvider {
    async fn fetch( &self, track: &Track ) -> Result<Lyrics, NetworkError> {
        self.calls.fetch_add( 1, Ordering::SeqCst );
        match self.error {
            Some( e ) => Err( e ),
            None => Ok( Lyrics {
                uri: self.answer_uri.clone().unwrap_or_else( || track.uri.clone() ),
                body: LyricsBody::Plain( format!( "words of {}", track.display_title() ) ),
            }),
        }
    }
}


/// Metadata provider with one canned result and scriptable failures.
#[derive( Default )]
pub struct FakeMetadataProvider {
    search_error: Mutex<Option<NetworkError>>,
    art_error: Mutex<Option<NetworkError>>,
    pub last_hint: Mutex<Option<Option<u64>>>,
    pub search_calls: AtomicUsize,
    pub art_calls: AtomicUsize,
}


impl FakeMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }


    pub fn fail_search( &self, error: NetworkError ) {
        *self.search_error.lock().unwrap() = Some( error );
    }


    pub fn fail_art( &self, error: NetworkError ) {
        *self.art_error.lock().unwrap() = Some( error );
    }
}


#[async_trait]
impl MetadataProvider for FakeMetadataProvider {
    async fn search( &self, query: &str, duration_hint_ms: Option<u64> ) -> Result<Vec<SearchResult>, NetworkError> {
        self.search_calls.fetch_add( 1, Ordering::SeqCst );
        *self.last_hint.lock().unwrap() = Some( duration_hint_ms );

        if let Some( e ) = *self.search_error.lock().unwrap() {
            return Err( e );
        }
        Ok( vec![ SearchResult {
            id: "rec-1".into(),
            title: Some( query.to_string() ),
            ..Default::default()
        }])
    }


    async fn fetch_cover_art( &self, _result: &SearchResult ) -> Result<Vec<u8>, NetworkError> {
        self.art_calls.fetch_add( 1, Ordering::SeqCst );
        match *self.art_error.lock().unwrap() {
            Some( e ) => Err( e ),
            None => Ok( vec![ 0xFF, 0xD8, 0xFF ] ),
        }
    }
}
