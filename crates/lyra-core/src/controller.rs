//! Application controller
//!
//! Wires the library, the player and the side workflows together. UI
//! events enter through [`Controller::dispatch`]; three background tasks
//! keep the core in step with the outside world:
//!
//! - the library sync loop, polling the catalog every five seconds
//! - the engine event listener, feeding engine notifications to the player
//! - the URI consumer, opening files handed over by the host

use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use tokio::sync::{ broadcast, mpsc };
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::catalog::TrackCatalog;
use crate::engine::{ EngineEvent, PlaybackEngine };
use crate::library::Library;
use crate::lyrics::{ LyricsProvider, LyricsStore };
use crate::metadata::{ MetadataProvider, MetadataWorkflow, PendingEdit };
use crate::notice::{ Notice, NoticeHub };
use crate::player::Player;
use crate::playlist::{ PlaylistManager, PlaylistStore };
use crate::session::SessionStore;
use crate::settings::{ SettingsBackend, SettingsHandle };
use crate::sort::{ PlaylistSort, SortOrder, TrackSort };
use crate::track::{ Metadata, Playlist, SearchResult, Track };


/// Catalog polling cadence.
pub const SYNC_INTERVAL: Duration = Duration::from_millis( 5_000 );


/// External collaborators the controller is built from.
pub struct Collaborators {
    pub engine: Arc<dyn PlaybackEngine>,
    pub catalog: Arc<dyn TrackCatalog>,
    pub session: Arc<dyn SessionStore>,
    pub playlists: Arc<dyn PlaylistStore>,
    pub lyrics_store: Arc<dyn LyricsStore>,
    pub lyrics_provider: Arc<dyn LyricsProvider>,
    pub metadata_provider: Arc<dyn MetadataProvider>,
    pub settings: Arc<dyn SettingsBackend>,
}


/// Everything the UI can ask for.
#[derive( Debug, Clone, PartialEq )]
pub enum UiEvent {
    // Playback
    Open { track: Track, playlist: Playlist },
    Pause,
    Resume,
    SeekNext,
    SeekPrevious,
    SeekTo( u64 ),
    CyclePlaybackMode,
    ClearPlayback,
    SetPlayerExpanded( bool ),
    SetLyricsExpanded( bool ),

    // Queue
    RemoveFromQueue( usize ),
    ReorderQueue { from: usize, to: usize },
    PlayNext( Track ),
    Enqueue( Track ),
    SortQueue { sort: TrackSort, order: SortOrder },

    // Library
    SetTrackSort { sort: Option<TrackSort>, order: Option<SortOrder> },
    SetPlaylistSort { sort: Option<PlaylistSort>, order: Option<SortOrder> },
    SelectPlaylist( Option<Playlist> ),

    // Track info
    ViewTrackInfo( Track ),
    CloseTrackInfo,
    AcceptMetadataRisks,
    ToggleMatchDuration,
    SearchMetadata( String ),
    PickSearchResult( SearchResult ),
    SetPickedCoverArt( Vec<u8> ),
    RestoreCoverArt,
    ConfirmMetadataEdit( Metadata ),
    OverwriteMetadata( Metadata ),

    // User playlists
    CreatePlaylist( String ),
    RenamePlaylist { playlist: Playlist, name: String },
    DeletePlaylist( Playlist ),
    AddToPlaylist { playlist: Playlist, track: Track },
    RemoveFromPlaylist { playlist: Playlist, track: Track },
    ReorderPlaylist { playlist: Playlist, tracks: Vec<Track> },
}


/// Owner of the core components and their background tasks.
pub struct Controller {
    catalog: Arc<dyn TrackCatalog>,
    settings: Arc<SettingsHandle>,
    notices: NoticeHub,
    library: Arc<Library>,
    player: Arc<Player>,
    metadata: MetadataWorkflow,
    playlists: Arc<PlaylistManager>,

    uri_tx: mpsc::Sender<String>,
    uri_rx: Mutex<Option<mpsc::Receiver<String>>>,
    edits: Mutex<Option<mpsc::Receiver<PendingEdit>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}


impl Controller {
    pub fn new( collaborators: Collaborators ) -> Self {
        let Collaborators {
            engine,
            catalog,
            session,
            playlists,
            lyrics_store,
            lyrics_provider,
            metadata_provider,
            settings,
        } = collaborators;

        let settings = Arc::new( SettingsHandle::new( settings ) );
        let notices = NoticeHub::new();
        let library = Arc::new( Library::new( settings.clone() ) );
        let player = Arc::new( Player::new( engine, session, lyrics_store, lyrics_provider, notices.clone() ) );
        let ( metadata, edits ) = MetadataWorkflow::new( metadata_provider, settings.clone(), notices.clone() );
        let playlists = Arc::new( PlaylistManager::new( playlists, library.clone(), settings.clone(), notices.clone() ) );
        let ( uri_tx, uri_rx ) = mpsc::channel( 1 );

        Self {
            catalog,
            settings,
            notices,
            library,
            player,
            metadata,
            playlists,
            uri_tx,
            uri_rx: Mutex::new( Some( uri_rx ) ),
            edits: Mutex::new( Some( edits ) ),
            tasks: Mutex::new( Vec::new() ),
        }
    }


    pub fn player( &self ) -> &Arc<Player> {
        &self.player
    }


    pub fn library( &self ) -> &Arc<Library> {
        &self.library
    }


    pub fn metadata( &self ) -> &MetadataWorkflow {
        &self.metadata
    }


    pub fn playlists( &self ) -> &Arc<PlaylistManager> {
        &self.playlists
    }


    pub fn notices( &self ) -> &NoticeHub {
        &self.notices
    }


    pub fn settings( &self ) -> &Arc<SettingsHandle> {
        &self.settings
    }


    fn tasks( &self ) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Hands out the receiving end of the pending-edit channel.
    ///
    /// Returns `None` after the first call.
    pub fn take_pending_edits( &self ) -> Option<mpsc::Receiver<PendingEdit>> {
        self.edits.lock().unwrap_or_else( PoisonError::into_inner ).take()
    }


    /// Restores the saved session and starts the background tasks.
    pub async fn start( self: &Arc<Self> ) {
        let events = self.player.engine().subscribe();
        self.player.restore().await;

        let mut tasks = Vec::with_capacity( 3 );
        tasks.push( tokio::spawn( self.clone().sync_loop() ) );
        tasks.push( tokio::spawn( self.clone().engine_listener( events ) ) );

        let uri_rx = self.uri_rx.lock().unwrap_or_else( PoisonError::into_inner ).take();
        if let Some( uri_rx ) = uri_rx {
            tasks.push( tokio::spawn( self.clone().uri_consumer( uri_rx ) ) );
        }

        self.tasks().extend( tasks );
        tracing::info!( "Controller started" );
    }


    /// Stops the background tasks.
    pub fn shutdown( &self ) {
        for task in self.tasks().drain( .. ) {
            task.abort();
        }
        tracing::info!( "Controller stopped" );
    }


    async fn sync_loop( self: Arc<Self> ) {
        let mut interval = tokio::time::interval( SYNC_INTERVAL );
        interval.set_missed_tick_behavior( MissedTickBehavior::Delay );

        loop {
            interval.tick().await;
            self.sync_once().await;
        }
    }


    async fn engine_listener( self: Arc<Self>, mut events: broadcast::Receiver<EngineEvent> ) {
        loop {
            match events.recv().await {
                Ok( event ) => self.player.handle_engine_event( event ),
                Err( broadcast::error::RecvError::Lagged( missed ) ) => {
                    tracing::warn!( "Engine listener lagged, {} events dropped", missed );
                }
                Err( broadcast::error::RecvError::Closed ) => break,
            }
        }
    }


    async fn uri_consumer( self: Arc<Self>, mut requests: mpsc::Receiver<String> ) {
        let mut catalog = self.library.view().subscribe();
        let ready = catalog.wait_for( |view| !view.tracks.is_empty() ).await.is_ok();
        if !ready {
            return;
        }

        while let Some( uri ) = requests.recv().await {
            self.open_location( &uri );
        }
    }


    /// Polls the catalog once and reconciles the core with it.
    ///
    /// @returns Whether the catalog changed
    pub async fn sync_once( &self ) -> bool {
        let tracks = match self.catalog.list_tracks().await {
            Ok( tracks ) => tracks,
            Err( e ) => {
                tracing::debug!( "Catalog fetch failed: {}", e );
                return false;
            }
        };

        if !self.library.apply_catalog( &tracks ) {
            return false;
        }

        if self.metadata.resync( &tracks ) {
            tracing::info!( "Track on the info sheet left the catalog, clearing playback" );
            self.player.clear();
        }
        true
    }


    /// Queues a request to open a file or URI.
    ///
    /// Waits while an earlier request is still pending.
    pub async fn open_uri( &self, uri: impl Into<String> ) {
        if self.uri_tx.send( uri.into() ).await.is_err() {
            tracing::warn!( "URI consumer is gone, open request dropped" );
        }
    }


    /// Like [`Controller::open_uri`] but never waits.
    ///
    /// @returns False when a request is already pending or the consumer is gone
    pub fn try_open_uri( &self, uri: impl Into<String> ) -> bool {
        match self.uri_tx.try_send( uri.into() ) {
            Ok(()) => true,
            Err( mpsc::error::TrySendError::Full( uri ) ) => {
                tracing::debug!( "Open request for {} refused, one is already pending", uri );
                false
            }
            Err( mpsc::error::TrySendError::Closed( _ ) ) => {
                tracing::warn!( "URI consumer is gone, open request dropped" );
                false
            }
        }
    }


    fn open_location( &self, uri: &str ) {
        let location = uri.strip_prefix( "file://" ).unwrap_or( uri );
        match self.library.find( location ) {
            Some( track ) => {
                let playlist = Playlist::ad_hoc( self.library.tracks() );
                self.player.open( &track, playlist );
            }
            None => {
                tracing::debug!( "No catalog entry for {}", uri );
                self.notices.send( Notice::TrackNotFound );
            }
        }
    }


    /// Applies a UI event. Network and store work is spawned.
    pub fn dispatch( &self, event: UiEvent ) {
        tracing::debug!( "Dispatch: {:?}", event );

        match event {
            UiEvent::Open { track, playlist } => self.player.open( &track, playlist ),
            UiEvent::Pause => self.player.pause(),
            UiEvent::Resume => self.player.resume(),
            UiEvent::SeekNext => self.player.seek_next(),
            UiEvent::SeekPrevious => self.player.seek_previous(),
            UiEvent::SeekTo( position ) => self.player.seek_to( position ),
            UiEvent::CyclePlaybackMode => self.player.cycle_playback_mode(),
            UiEvent::ClearPlayback => self.player.clear(),
            UiEvent::SetPlayerExpanded( expanded ) => self.player.set_player_expanded( expanded ),
            UiEvent::SetLyricsExpanded( expanded ) => self.player.set_lyrics_expanded( expanded ),

            UiEvent::RemoveFromQueue( index ) => self.player.remove_from_queue( index ),
            UiEvent::ReorderQueue { from, to } => self.player.reorder_queue( from, to ),
            UiEvent::PlayNext( track ) => self.player.play_next( &track ),
            UiEvent::Enqueue( track ) => self.player.enqueue( &track ),
            UiEvent::SortQueue { sort, order } => {
                self.player.sort_queue( sort, order );
                self.library.sort_selected( sort, order );
            }

            UiEvent::SetTrackSort { sort, order } => self.library.set_track_sort( sort, order ),
            UiEvent::SetPlaylistSort { sort, order } => self.library.set_playlist_sort( sort, order ),
            UiEvent::SelectPlaylist( playlist ) => self.library.select_playlist( playlist ),

            UiEvent::ViewTrackInfo( track ) => self.metadata.view_track_info( track ),
            UiEvent::CloseTrackInfo => self.metadata.close_track_info(),
            UiEvent::AcceptMetadataRisks => self.metadata.accept_metadata_risks(),
            UiEvent::ToggleMatchDuration => {
                self.metadata.toggle_match_duration();
            }
            UiEvent::SearchMetadata( query ) => {
                let metadata = self.metadata.clone();
                tokio::spawn( async move { metadata.search( &query ).await } );
            }
            UiEvent::PickSearchResult( result ) => {
                let metadata = self.metadata.clone();
                tokio::spawn( async move { metadata.pick_result( &result ).await } );
            }
            UiEvent::SetPickedCoverArt( bytes ) => self.metadata.set_picked_cover_art( bytes ),
            UiEvent::RestoreCoverArt => self.metadata.restore_cover_art(),
            UiEvent::ConfirmMetadataEdit( edit ) => self.metadata.confirm_metadata_edit( edit ),
            UiEvent::OverwriteMetadata( edit ) => {
                let metadata = self.metadata.clone();
                tokio::spawn( async move { metadata.overwrite_metadata( edit ).await } );
            }

            UiEvent::CreatePlaylist( name ) => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.create( &name ).await } );
            }
            UiEvent::RenamePlaylist { playlist, name } => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.rename( &playlist, &name ).await } );
            }
            UiEvent::DeletePlaylist( playlist ) => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.delete( &playlist ).await } );
            }
            UiEvent::AddToPlaylist { playlist, track } => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.add_track( &playlist, &track ).await } );
            }
            UiEvent::RemoveFromPlaylist { playlist, track } => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.remove_track( &playlist, &track ).await } );
            }
            UiEvent::ReorderPlaylist { playlist, tracks } => {
                let playlists = self.playlists.clone();
                tokio::spawn( async move { playlists.reorder( &playlist, tracks ).await } );
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::lyrics::LyricsCache;
    use crate::playlist::M3uPlaylistStore;
    use crate::queue::MemoryEngine;
    use crate::settings::MemorySettings;
    use crate::state::PlaybackMode;
    use crate::testing::{
        eventually, track, tracks, FakeCatalog, FakeLyricsProvider, FakeMetadataProvider, FakeSessionStore,
    };


    struct Fixture {
        _dir: TempDir,
        engine: Arc<MemoryEngine>,
        catalog: Arc<FakeCatalog>,
        controller: Arc<Controller>,
    }


    fn fixture( names: &[&str] ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new( MemoryEngine::new() );
        let catalog = Arc::new( FakeCatalog::with( tracks( names ) ) );
        let controller = Arc::new( Controller::new( Collaborators {
            engine: engine.clone(),
            catalog: catalog.clone(),
            session: Arc::new( FakeSessionStore::default() ),
            playlists: Arc::new( M3uPlaylistStore::new( dir.path().join( "playlists" ) ) ),
            lyrics_store: Arc::new( LyricsCache::new() ),
            lyrics_provider: Arc::new( FakeLyricsProvider::new() ),
            metadata_provider: Arc::new( FakeMetadataProvider::new() ),
            settings: Arc::new( MemorySettings::default() ),
        }));
        Fixture { _dir: dir, engine, catalog, controller }
    }


    #[tokio::test]
    async fn test_sync_once_applies_only_changes() {
        let f = fixture( &[ "b", "a" ] );

        assert!( f.controller.sync_once().await );
        assert_eq!( f.controller.library().tracks(), tracks( &[ "a", "b" ] ) );
        assert!( !f.controller.sync_once().await );

        f.catalog.fail( true );
        assert!( !f.controller.sync_once().await );
        assert_eq!( f.controller.library().tracks().len(), 2 );
    }


    #[tokio::test]
    async fn test_mode_cycle_scenario() {
        let f = fixture( &[ "a", "b", "c" ] );
        f.controller.sync_once().await;

        let expected = [ PlaybackMode::RepeatOne, PlaybackMode::Shuffle, PlaybackMode::Repeat ];
        for mode in expected {
            f.controller.dispatch( UiEvent::CyclePlaybackMode );
            assert_eq!( f.controller.player().snapshot().playback_mode, mode );
        }
    }


    #[tokio::test]
    async fn test_vanished_info_track_clears_playback() {
        let f = fixture( &[ "a", "b", "c" ] );
        f.controller.start().await;
        f.controller.sync_once().await;

        let catalog = f.controller.library().tracks();
        f.controller.dispatch( UiEvent::Open { track: track( "a" ), playlist: Playlist::ad_hoc( catalog ) } );
        f.controller.dispatch( UiEvent::ViewTrackInfo( track( "a" ) ) );

        f.catalog.set( tracks( &[ "b", "c" ] ) );
        assert!( f.controller.sync_once().await );

        assert_eq!( f.controller.player().snapshot().playlist, None );
        assert!( f.engine.is_empty() );
        assert!( !f.engine.is_playing() );
        assert!( f.controller.metadata().state().get().track.is_none() );
        f.controller.shutdown();
    }


    #[tokio::test]
    async fn test_open_uri_waits_for_catalog() {
        let f = fixture( &[ "a", "b" ] );
        f.controller.open_uri( "file:///music/b.mp3" ).await;
        f.controller.start().await;

        let player = f.controller.player().clone();
        eventually( || player.snapshot().current_track == Some( track( "b" ) ) ).await;

        let state = player.snapshot();
        assert_eq!( state.playlist, Some( Playlist::ad_hoc( tracks( &[ "a", "b" ] ) ) ) );
        eventually( || player.snapshot().is_playing ).await;
        f.controller.shutdown();
    }


    #[tokio::test]
    async fn test_try_open_uri_refuses_while_request_pending() {
        let f = fixture( &[] );
        f.controller.start().await;

        // Nothing is consumed until the catalog has tracks
        assert!( f.controller.try_open_uri( "file:///music/a.mp3" ) );
        assert!( !f.controller.try_open_uri( "file:///music/b.mp3" ) );

        f.catalog.set( tracks( &[ "a", "b" ] ) );
        f.controller.sync_once().await;
        let player = f.controller.player().clone();
        eventually( || player.snapshot().current_track == Some( track( "a" ) ) ).await;

        assert!( f.controller.try_open_uri( "file:///music/b.mp3" ) );
        eventually( || player.snapshot().current_track == Some( track( "b" ) ) ).await;
        f.controller.shutdown();
    }


    #[tokio::test]
    async fn test_open_unknown_uri_notifies() {
        let f = fixture( &[ "a" ] );
        let mut notices = f.controller.notices().subscribe();
        f.controller.start().await;

        f.controller.open_uri( "content://missing" ).await;
        let notice = tokio::time::timeout( Duration::from_secs( 2 ), notices.recv() ).await;
        assert_eq!( notice.unwrap().unwrap(), Notice::TrackNotFound );
        f.controller.shutdown();
    }


    #[tokio::test]
    async fn test_sort_queue_sorts_selection_too() {
        let f = fixture( &[ "a", "b", "c" ] );
        f.controller.sync_once().await;

        let queue = Playlist::ad_hoc( tracks( &[ "c", "a", "b" ] ) );
        f.controller.dispatch( UiEvent::Open { track: track( "c" ), playlist: queue } );
        f.controller.dispatch( UiEvent::SelectPlaylist( Some( Playlist::named( "mine", tracks( &[ "b", "a" ] ) ) ) ) );

        f.controller.dispatch( UiEvent::SortQueue { sort: TrackSort::Title, order: SortOrder::Ascending } );

        assert_eq!( f.engine.tracks(), tracks( &[ "a", "b", "c" ] ) );
        assert_eq!( f.engine.current_track(), Some( track( "c" ) ) );
        let selected = f.controller.library().selected().get().unwrap();
        assert_eq!( selected.tracks, tracks( &[ "a", "b" ] ) );
    }


    #[tokio::test]
    async fn test_overwrite_reaches_tag_writer() {
        let f = fixture( &[ "a" ] );
        let mut edits = f.controller.take_pending_edits().unwrap();
        assert!( f.controller.take_pending_edits().is_none() );

        f.controller.dispatch( UiEvent::ViewTrackInfo( track( "a" ) ) );
        let metadata = Metadata { title: Some( "New".into() ), ..Default::default() };
        f.controller.dispatch( UiEvent::OverwriteMetadata( metadata.clone() ) );

        let edit = tokio::time::timeout( Duration::from_secs( 2 ), edits.recv() ).await.unwrap().unwrap();
        assert_eq!( edit, PendingEdit { track: track( "a" ), metadata } );
    }


    #[tokio::test]
    async fn test_engine_events_reach_player() {
        let f = fixture( &[ "a", "b" ] );
        f.controller.start().await;
        f.controller.sync_once().await;

        let catalog = f.controller.library().tracks();
        f.controller.dispatch( UiEvent::Open { track: track( "a" ), playlist: Playlist::ad_hoc( catalog ) } );
        let player = f.controller.player().clone();
        eventually( || player.snapshot().is_playing ).await;

        f.controller.dispatch( UiEvent::SeekNext );
        eventually( || player.snapshot().current_track == Some( track( "b" ) ) ).await;

        f.controller.dispatch( UiEvent::Pause );
        eventually( || !player.snapshot().is_playing ).await;
        f.controller.shutdown();
    }


    #[tokio::test]
    async fn test_playlist_events_go_through_store() {
        let f = fixture( &[ "a", "b" ] );
        f.controller.sync_once().await;
        let playlists = f.controller.playlists().clone();

        f.controller.dispatch( UiEvent::CreatePlaylist( "mix".into() ) );
        let mut mix = None;
        for _ in 0..100 {
            mix = playlists.get( "mix" ).await;
            if mix.is_some() {
                break;
            }
            tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        }
        let mix = mix.unwrap();

        f.controller.dispatch( UiEvent::AddToPlaylist { playlist: mix, track: track( "b" ) } );
        for _ in 0..100 {
            if playlists.get( "mix" ).await.is_some_and( |p| p.len() == 1 ) {
                return;
            }
            tokio::time::sleep( Duration::from_millis( 10 ) ).await;
        }
        panic!( "track never reached the playlist" );
    }
}
