//! Track info sheet and metadata enrichment.
//!
//! The sheet shows one subject track. From there the user can search a
//! remote metadata service, pick a result (pulling its cover art when the
//! file format allows it), or edit tags by hand. Either path fills the
//! pending-edit buffer; committing hands `(track, metadata)` to the
//! external tag writer over a rendezvous channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::NetworkError;
use crate::notice::{ Notice, NoticeHub };
use crate::settings::SettingsHandle;
use crate::state::StateCell;
use crate::track::{ Metadata, SearchResult, Track };


/// Remote metadata lookup.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Searches for recordings matching `query`.
    ///
    /// @param query - Free-form search text
    /// @param duration_hint_ms - Track length to match against, if any
    async fn search( &self, query: &str, duration_hint_ms: Option<u64> ) -> Result<Vec<SearchResult>, NetworkError>;

    /// Downloads the front cover of the result's release.
    async fn fetch_cover_art( &self, result: &SearchResult ) -> Result<Vec<u8>, NetworkError>;
}


/// A committed tag edit, waiting for the tag writer.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct PendingEdit {
    pub track: Track,
    pub metadata: Metadata,
}


#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
    ResultsReady,
    Failed,
}


#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ArtPhase {
    #[default]
    Idle,
    FetchingArt,
    ArtReady,
    ArtFailed,
}


#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct SearchState {
    pub phase: SearchPhase,
    pub results: Vec<SearchResult>,
}


/// The pending-edit buffer.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct ChangesState {
    pub art_phase: ArtPhase,
    pub metadata: Metadata,
    /// Cover art in the buffer was picked by the user, not downloaded
    pub is_art_from_gallery: bool,
}


#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct ManualEditState {
    pub picked_cover_art: Option<Vec<u8>>,
}


/// Everything the track info sheet displays.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct TrackInfoState {
    pub is_shown: bool,
    pub track: Option<Track>,
    pub is_cover_art_editable: bool,
    pub show_risks_dialog: bool,
    pub search: SearchState,
    pub changes: ChangesState,
    pub manual: ManualEditState,
}


/// Drives the track info sheet.
#[derive( Clone )]
pub struct MetadataWorkflow {
    state: Arc<StateCell<TrackInfoState>>,
    provider: Arc<dyn MetadataProvider>,
    settings: Arc<SettingsHandle>,
    notices: NoticeHub,
    edits: mpsc::Sender<PendingEdit>,
}


impl MetadataWorkflow {
    /// Creates the workflow and the receiving end of the pending-edit channel.
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        settings: Arc<SettingsHandle>,
        notices: NoticeHub,
    ) -> ( Self, mpsc::Receiver<PendingEdit> ) {
        let ( edits, rx ) = mpsc::channel( 1 );
        let state = Arc::new( StateCell::new( TrackInfoState {
            show_risks_dialog: !settings.metadata_risks_accepted(),
            ..Default::default()
        }));

        let workflow = Self { state, provider, settings, notices, edits };
        ( workflow, rx )
    }


    pub fn state( &self ) -> &Arc<StateCell<TrackInfoState>> {
        &self.state
    }


    /// Opens the sheet for `track`.
    pub fn view_track_info( &self, track: Track ) {
        let editable = self.settings.is_art_editable( track.format().as_deref() );
        self.state.update( |s| {
            s.is_shown = true;
            s.track = Some( track );
            s.is_cover_art_editable = editable;
            s.manual.picked_cover_art = None;
        });
    }


    pub fn close_track_info( &self ) {
        self.state.update_if( |s| {
            let changed = s.is_shown;
            s.is_shown = false;
            changed
        });
    }


    pub fn accept_metadata_risks( &self ) {
        self.settings.accept_metadata_risks();
        self.state.update( |s| s.show_risks_dialog = false );
    }


    pub fn toggle_match_duration( &self ) -> bool {
        self.settings.toggle_match_duration()
    }


    /// Searches remote metadata for the sheet's track.
    pub async fn search( &self, query: &str ) {
        let Some( track ) = self.state.read( |s| s.track.clone() ) else {
            tracing::debug!( "Metadata search without a subject track" );
            return;
        };
        let hint = self.settings.match_duration().then_some( track.duration_ms );

        self.state.update( |s| s.search.phase = SearchPhase::Searching );

        match self.provider.search( query, hint ).await {
            Ok( results ) => {
                tracing::debug!( "Metadata search returned {} results", results.len() );
                self.state.update( |s| {
                    s.search.phase = SearchPhase::ResultsReady;
                    s.search.results = results;
                });
            }
            Err( e ) => {
                if e.is_diagnostic() {
                    tracing::warn!( "Metadata search for {:?} failed: {}", query, e );
                }
                self.state.update( |s| s.search.phase = SearchPhase::Failed );
                self.notices.send( Notice::for_search( e ) );
            }
        }
    }


    /// Fills the pending-edit buffer from a search result.
    ///
    /// Cover art is downloaded first when the track's format supports it.
    /// The tags land in the buffer either way; art only if the download
    /// succeeded.
    pub async fn pick_result( &self, result: &SearchResult ) {
        let editable = self.state.read( |s| s.is_cover_art_editable );
        let mut cover_art = None;

        if editable {
            self.state.update( |s| s.changes.art_phase = ArtPhase::FetchingArt );

            match self.provider.fetch_cover_art( result ).await {
                Ok( bytes ) => {
                    cover_art = Some( bytes );
                    self.state.update( |s| s.changes.art_phase = ArtPhase::ArtReady );
                }
                Err( e ) => {
                    self.state.update( |s| s.changes.art_phase = ArtPhase::ArtFailed );
                    self.notices.send( Notice::for_cover_art( e ) );
                }
            }
        }

        let mut metadata = Metadata::from_search_result( result );
        metadata.cover_art = cover_art;

        self.state.update( |s| {
            s.changes.metadata = metadata;
            s.changes.is_art_from_gallery = false;
        });
    }


    pub fn set_picked_cover_art( &self, bytes: Vec<u8> ) {
        self.state.update( |s| s.manual.picked_cover_art = Some( bytes ) );
    }


    pub fn restore_cover_art( &self ) {
        self.state.update( |s| s.manual.picked_cover_art = None );
    }


    /// Puts hand-edited tags into the pending-edit buffer.
    pub fn confirm_metadata_edit( &self, metadata: Metadata ) {
        self.state.update( |s| {
            s.changes.is_art_from_gallery = metadata.cover_art.is_some();
            s.changes.metadata = metadata;
        });
    }


    /// Commits `metadata` for the sheet's track to the tag writer.
    ///
    /// Waits while a previous edit is still unclaimed. Completion of the
    /// write is not observed.
    pub async fn overwrite_metadata( &self, metadata: Metadata ) {
        self.restore_cover_art();

        let Some( track ) = self.state.read( |s| s.track.clone() ) else { return };
        tracing::info!( "Committing metadata edit for {}", track.uri );

        if self.edits.send( PendingEdit { track, metadata } ).await.is_err() {
            tracing::warn!( "Tag writer is gone, metadata edit dropped" );
        }
    }


    /// Re-resolves the sheet's track against a fresh catalog.
    ///
    /// Only applies while the sheet is shown.
    ///
    /// @returns Whether the track disappeared from the catalog
    pub fn resync( &self, tracks: &[Track] ) -> bool {
        let mut vanished = false;
        self.state.update_if( |s| {
            if !s.is_shown {
                return false;
            }
            let Some( current ) = &s.track else { return false };

            let found = tracks.iter().find( |t| t.uri == current.uri ).cloned();
            vanished = found.is_none();
            if found.as_ref() == Some( current ) {
                return false;
            }
            s.track = found;
            true
        });
        vanished
    }
}


#[cfg( test )]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::settings::Settings;
    use crate::testing::{ track, FakeMetadataProvider };


    fn workflow(
        provider: Arc<FakeMetadataProvider>,
    ) -> ( MetadataWorkflow, mpsc::Receiver<PendingEdit>, NoticeHub ) {
        let settings = Arc::new( SettingsHandle::in_memory( Settings::default() ) );
        let notices = NoticeHub::new();
        let ( workflow, rx ) = MetadataWorkflow::new( provider, settings, notices.clone() );
        ( workflow, rx, notices )
    }


    fn result() -> SearchResult {
        SearchResult {
            id: "rec-1".into(),
            title: Some( "Found".into() ),
            artist: Some( "Someone".into() ),
            genres: Some( vec![ "jazz".into(), "fusion".into() ] ),
            album_id: Some( "rel-1".into() ),
            ..Default::default()
        }
    }


    #[tokio::test]
    async fn test_risk_dialog_until_accepted() {
        let ( workflow, _rx, _ ) = workflow( Arc::new( FakeMetadataProvider::new() ) );
        assert!( workflow.state().get().show_risks_dialog );

        workflow.accept_metadata_risks();
        assert!( !workflow.state().get().show_risks_dialog );
        assert!( workflow.settings.metadata_risks_accepted() );
    }


    #[tokio::test]
    async fn test_view_computes_editability() {
        let ( workflow, _rx, _ ) = workflow( Arc::new( FakeMetadataProvider::new() ) );
        workflow.set_picked_cover_art( vec![ 1 ] );

        let mut wav = track( "old" );
        wav.path = "/music/old.wav".into();
        workflow.view_track_info( wav );

        let state = workflow.state().get();
        assert!( state.is_shown );
        assert!( !state.is_cover_art_editable );
        assert!( state.manual.picked_cover_art.is_none() );
    }


    #[tokio::test]
    async fn test_search_passes_duration_hint() {
        let provider = Arc::new( FakeMetadataProvider::new() );
        let ( workflow, _rx, _ ) = workflow( provider.clone() );
        workflow.view_track_info( track( "song" ) );

        workflow.search( "song" ).await;
        assert_eq!( *provider.last_hint.lock().unwrap(), Some( Some( 180_000 ) ) );
        assert_eq!( workflow.state().get().search.phase, SearchPhase::ResultsReady );

        workflow.toggle_match_duration();
        workflow.search( "song" ).await;
        assert_eq!( *provider.last_hint.lock().unwrap(), Some( None ) );
    }


    #[tokio::test]
    async fn test_search_failure_notifies() {
        let provider = Arc::new( FakeMetadataProvider::new() );
        provider.fail_search( NetworkError::ServiceUnavailable );
        let ( workflow, _rx, notices ) = workflow( provider );
        let mut rx = notices.subscribe();
        workflow.view_track_info( track( "song" ) );

        workflow.search( "song" ).await;
        assert_eq!( workflow.state().get().search.phase, SearchPhase::Failed );
        assert_eq!( rx.try_recv().unwrap(), Notice::MetadataUnavailable );
    }


    #[tokio::test]
    async fn test_pick_with_art() {
        let provider = Arc::new( FakeMetadataProvider::new() );
        let ( workflow, _rx, _ ) = workflow( provider.clone() );
        workflow.view_track_info( track( "song" ) );

        workflow.pick_result( &result() ).await;

        let changes = workflow.state().get().changes;
        assert_eq!( changes.art_phase, ArtPhase::ArtReady );
        assert_eq!( changes.metadata.title.as_deref(), Some( "Found" ) );
        assert_eq!( changes.metadata.genre.as_deref(), Some( "jazz / fusion" ) );
        assert!( changes.metadata.cover_art.is_some() );
        assert!( !changes.is_art_from_gallery );
    }


    #[tokio::test]
    async fn test_pick_with_failed_art_still_fills_tags() {
        let provider = Arc::new( FakeMetadataProvider::new() );
        provider.fail_art( NetworkError::RequestTimeout );
        let ( workflow, _rx, notices ) = workflow( provider );
        let mut rx = notices.subscribe();
        workflow.view_track_info( track( "song" ) );

        workflow.pick_result( &result() ).await;

        let changes = workflow.state().get().changes;
        assert_eq!( changes.art_phase, ArtPhase::ArtFailed );
        assert_eq!( changes.metadata.artist.as_deref(), Some( "Someone" ) );
        assert!( changes.metadata.cover_art.is_none() );
        assert_eq!( rx.try_recv().unwrap(), Notice::CoverArtTimeout );
    }


    #[tokio::test]
    async fn test_pick_skips_art_for_unsupported_format() {
        let provider = Arc::new( FakeMetadataProvider::new() );
        let ( workflow, _rx, _ ) = workflow( provider.clone() );
        let mut wav = track( "old" );
        wav.path = "/music/old.wav".into();
        workflow.view_track_info( wav );

        workflow.pick_result( &result() ).await;

        assert_eq!( provider.art_calls.load( Ordering::SeqCst ), 0 );
        assert_eq!( workflow.state().get().changes.art_phase, ArtPhase::Idle );
    }


    #[tokio::test]
    async fn test_overwrite_hands_off_edit() {
        let ( workflow, mut rx, _ ) = workflow( Arc::new( FakeMetadataProvider::new() ) );
        let song = track( "song" );
        workflow.view_track_info( song.clone() );
        workflow.set_picked_cover_art( vec![ 9 ] );

        let metadata = Metadata { title: Some( "New".into() ), ..Default::default() };
        workflow.overwrite_metadata( metadata.clone() ).await;

        assert!( workflow.state().get().manual.picked_cover_art.is_none() );
        assert_eq!( rx.recv().await, Some( PendingEdit { track: song, metadata } ) );
    }


    #[tokio::test]
    async fn test_confirm_marks_gallery_art() {
        let ( workflow, _rx, _ ) = workflow( Arc::new( FakeMetadataProvider::new() ) );
        workflow.confirm_metadata_edit( Metadata { cover_art: Some( vec![ 1, 2 ] ), ..Default::default() } );
        assert!( workflow.state().get().changes.is_art_from_gallery );
    }


    #[tokio::test]
    async fn test_resync_detects_vanished_track() {
        let ( workflow, _rx, _ ) = workflow( Arc::new( FakeMetadataProvider::new() ) );
        let song = track( "song" );
        workflow.view_track_info( song.clone() );

        let mut retagged = song.clone();
        retagged.title = Some( "Renamed".into() );
        assert!( !workflow.resync( &[ retagged.clone() ] ) );
        assert_eq!( workflow.state().get().track, Some( retagged ) );

        assert!( workflow.resync( &[ track( "other" ) ] ) );
        assert_eq!( workflow.state().get().track, None );
    }
}
