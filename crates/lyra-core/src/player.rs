//! Playback state machine
//!
//! The [`Player`] owns the [`PlaybackState`] and drives the playback engine.
//! Every command that changes the queue changes the engine queue and the
//! mirrored playlist inside the same state update, so both always have the
//! same entries in the same order.
//!
//! Engine notifications come back through [`Player::handle_engine_event`]
//! and are applied with the same update primitive as user commands.
//!
//! Session writes are queued from inside the same update, so they reach
//! the store in the order the state changed.
//!
//! Commands spawn background tasks (persistence, lyrics, position sampling)
//! and must be called from within a tokio runtime.

use std::sync::Arc;

use crate::engine::{ EngineEvent, PlaybackEngine };
use crate::lyrics::{ LyricsProvider, LyricsStore, LyricsWorkflow };
use crate::notice::NoticeHub;
use crate::session::{ SessionSnapshot, SessionStore, SessionWrite, SessionWriter };
use crate::sort::{ sorted_by, SortOrder, TrackSort };
use crate::state::{ PlaybackMode, PlaybackState, StateCell };
use crate::ticker::PositionTicker;
use crate::track::{ Playlist, Track };


/// Where a track ended up after `play_next` / `enqueue`.
enum Placement {
    Unchanged,
    NoQueue,
    Placed,
}


/// Applies the engine configuration for `mode`.
fn apply_mode( engine: &dyn PlaybackEngine, mode: PlaybackMode ) {
    engine.set_repeat_mode( mode.repeat_mode() );
    engine.set_shuffle( mode.shuffle() );
}


/// Finds the playlist entry the engine is talking about.
fn resolve( playlist: Option<&Playlist>, track: &Track ) -> Option<Track> {
    let playlist = playlist?;
    playlist.tracks.iter()
        .find( |t| *t == track )
        .or_else( || playlist.tracks.iter().find( |t| t.uri == track.uri ) )
        .cloned()
}


/// Playback orchestration over a [`PlaybackEngine`].
pub struct Player {
    engine: Arc<dyn PlaybackEngine>,
    state: Arc<StateCell<PlaybackState>>,
    ticker: PositionTicker,
    session: Arc<dyn SessionStore>,
    writer: SessionWriter,
    lyrics: LyricsWorkflow,
}


impl Player {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        session: Arc<dyn SessionStore>,
        lyrics_store: Arc<dyn LyricsStore>,
        lyrics_provider: Arc<dyn LyricsProvider>,
        notices: NoticeHub,
    ) -> Self {
        let state = Arc::new( StateCell::default() );
        let lyrics = LyricsWorkflow::new( state.clone(), lyrics_store, lyrics_provider, notices );
        Self {
            engine,
            state,
            ticker: PositionTicker::new(),
            writer: SessionWriter::new( session.clone() ),
            session,
            lyrics,
        }
    }


    /// The shared playback state. Subscribe to follow changes.
    pub fn state( &self ) -> &Arc<StateCell<PlaybackState>> {
        &self.state
    }


    pub fn snapshot( &self ) -> PlaybackState {
        self.state.get()
    }


    pub fn engine( &self ) -> &Arc<dyn PlaybackEngine> {
        &self.engine
    }


    pub fn lyrics( &self ) -> &LyricsWorkflow {
        &self.lyrics
    }


    /// Queues the playlist for saving. Call from inside a state update.
    fn persist_playlist( &self, playlist: Option<Playlist> ) {
        self.writer.send( SessionWrite::Playlist( playlist ) );
    }


    fn start_ticker( &self ) {
        self.ticker.start( self.engine.clone(), self.state.clone() );
    }


    /// Plays `track` from `playlist`.
    ///
    /// The engine queue is only replaced when `playlist` differs from the
    /// loaded one. Reopening the track that is already playing keeps its
    /// position.
    pub fn open( &self, track: &Track, playlist: Playlist ) {
        let Some( index ) = playlist.index_of( track ) else {
            tracing::debug!( "Open ignored: {} is not in the playlist", track.uri );
            return;
        };

        let engine = &self.engine;
        self.state.update( |s| {
            let same_playlist = s.playlist.as_ref() == Some( &playlist );
            if !same_playlist {
                engine.load_queue( &playlist.tracks );
            }
            self.persist_playlist( Some( playlist.clone() ) );

            let already_playing = same_playlist
                && s.current_track.as_ref() == Some( track )
                && engine.current_index() == Some( index )
                && engine.is_playing();
            if already_playing {
                return;
            }

            engine.play_at( index, 0 );
            s.playlist = Some( playlist );
            s.current_track = Some( track.clone() );
            s.position_ms = 0;
        });

        tracing::info!( "Playing: {}", track.display_title() );
    }


    pub fn pause( &self ) {
        if self.engine.current_track().is_none() {
            return;
        }
        self.engine.pause();
    }


    pub fn resume( &self ) {
        if self.engine.current_track().is_none() {
            return;
        }
        self.engine.play();
    }


    pub fn seek_next( &self ) {
        if self.engine.has_next() {
            self.engine.next();
        }
    }


    /// Skips back, or rewinds the current track at the head of the queue.
    pub fn seek_previous( &self ) {
        if self.engine.has_previous() {
            self.engine.previous();
        } else if self.engine.current_track().is_some() {
            self.engine.seek( 0 );
            self.state.update( |s| s.position_ms = 0 );
        }
    }


    pub fn seek_to( &self, position_ms: u64 ) {
        if self.engine.current_track().is_none() {
            return;
        }
        self.engine.seek( position_ms );
        self.state.update( |s| s.position_ms = position_ms );
    }


    /// Advances Repeat → RepeatOne → Shuffle → Repeat.
    pub fn cycle_playback_mode( &self ) {
        let mut mode = PlaybackMode::default();
        let engine = &self.engine;
        self.state.update( |s| {
            mode = s.playback_mode.next();
            apply_mode( engine.as_ref(), mode );
            s.playback_mode = mode;
            self.writer.send( SessionWrite::Mode( mode ) );
        });

        tracing::info!( "Playback mode: {}", mode.name() );
    }


    /// Removes the queue entry at `index`.
    ///
    /// Removing the current entry first advances playback to the next one.
    pub fn remove_from_queue( &self, index: usize ) {
        let engine = &self.engine;
        let removed = self.state.update_if( |s| {
            let Some( playlist ) = s.playlist.as_mut() else { return false };
            if index >= playlist.len() {
                return false;
            }

            if engine.current_index() == Some( index ) && engine.has_next() {
                engine.next();
            }
            engine.remove( index );
            playlist.tracks.remove( index );

            s.current_track = engine.current_track()
                .and_then( |t| resolve( Some( &*playlist ), &t ) );
            self.persist_playlist( Some( playlist.clone() ) );
            if playlist.is_empty() {
                s.is_player_expanded = false;
                s.is_lyrics_expanded = false;
            }
            true
        });

        if !removed {
            tracing::debug!( "Remove ignored: no queue entry at {}", index );
        }
    }


    /// Moves the queue entry at `from` to `to`.
    pub fn reorder_queue( &self, from: usize, to: usize ) {
        let engine = &self.engine;
        let moved = self.state.update_if( |s| {
            let Some( playlist ) = s.playlist.as_mut() else { return false };
            if from >= playlist.len() || to >= playlist.len() || from == to {
                return false;
            }

            engine.move_item( from, to );
            let track = playlist.tracks.remove( from );
            playlist.tracks.insert( to, track );
            self.persist_playlist( Some( playlist.clone() ) );
            true
        });

        if !moved {
            tracing::debug!( "Reorder ignored: {} -> {}", from, to );
        }
    }


    /// Places `track` right after the current entry.
    ///
    /// A track already queued is moved instead of duplicated. Without a
    /// queue, starts an ad-hoc queue holding just `track`.
    pub fn play_next( &self, track: &Track ) {
        self.place( track, |current, len| current.map( |c| c + 1 ).unwrap_or( 0 ).min( len ) );
    }


    /// Places `track` at the end of the queue.
    pub fn enqueue( &self, track: &Track ) {
        self.place( track, |_, len| len );
    }


    /// Shared body of `play_next` and `enqueue`. `target` maps the current
    /// index and queue length to the insertion index for a new entry.
    fn place( &self, track: &Track, target: impl Fn( Option<usize>, usize ) -> usize ) {
        let mut placement = Placement::Unchanged;
        let engine = &self.engine;
        self.state.update_if( |s| {
            if s.current_track.as_ref() == Some( track ) {
                return false;
            }
            let playlist = match s.playlist.as_mut() {
                Some( playlist ) if !playlist.is_empty() => playlist,
                _ => {
                    placement = Placement::NoQueue;
                    return false;
                }
            };

            let current = s.current_track.as_ref().and_then( |c| playlist.index_of( c ) );
            let last = playlist.len() - 1;

            match playlist.index_of( track ) {
                Some( from ) => {
                    let to = target( current, last ).min( last );
                    if from == to {
                        return false;
                    }
                    engine.move_item( from, to );
                    let moved = playlist.tracks.remove( from );
                    playlist.tracks.insert( to, moved );
                }
                None => {
                    let at = target( current, playlist.len() );
                    engine.insert( at, track.clone() );
                    playlist.tracks.insert( at, track.clone() );
                }
            }

            self.persist_playlist( Some( playlist.clone() ) );
            placement = Placement::Placed;
            true
        });

        match placement {
            Placement::Placed => {}
            Placement::NoQueue => self.open( track, Playlist::ad_hoc( vec![ track.clone() ] ) ),
            Placement::Unchanged => tracing::debug!( "Queue placement unchanged for {}", track.uri ),
        }
    }


    /// Sorts the queue without interrupting playback.
    ///
    /// The permutation is applied to the engine one move at a time, so the
    /// engine and the mirrored playlist agree after every step.
    pub fn sort_queue( &self, sort: TrackSort, order: SortOrder ) {
        let engine = &self.engine;
        self.state.update_if( |s| {
            let Some( playlist ) = s.playlist.as_mut() else { return false };
            let sorted = sorted_by( &playlist.tracks, sort, order );
            if sorted == playlist.tracks {
                return false;
            }

            for ( k, wanted ) in sorted.iter().enumerate() {
                let Some( offset ) = playlist.tracks[ k.. ].iter().position( |t| t == wanted ) else { continue };
                let from = k + offset;
                if from != k {
                    engine.move_item( from, k );
                    let moved = playlist.tracks.remove( from );
                    playlist.tracks.insert( k, moved );
                }
            }

            self.persist_playlist( Some( playlist.clone() ) );
            true
        });
    }


    /// Stops playback and forgets the queue. The playback mode is kept.
    pub fn clear( &self ) {
        self.ticker.stop();
        let engine = &self.engine;
        self.state.update( |s| {
            engine.stop();
            engine.clear();
            self.persist_playlist( None );
            *s = PlaybackState {
                playback_mode: s.playback_mode,
                ..Default::default()
            };
        });

        tracing::info!( "Playback cleared" );
    }


    pub fn set_player_expanded( &self, expanded: bool ) {
        self.state.update( |s| {
            s.is_player_expanded = expanded;
            s.is_lyrics_expanded = false;
        });
    }


    /// Opens or closes the lyrics panel. Opening it loads lyrics.
    pub fn set_lyrics_expanded( &self, expanded: bool ) {
        self.state.update( |s| s.is_lyrics_expanded = expanded );
        if expanded {
            self.lyrics.load();
        }
    }


    /// Restores the saved session.
    ///
    /// The saved mode always applies. The saved queue is attached to the
    /// engine's current item when the engine already holds it, or cued
    /// without playing when the engine is idle.
    pub async fn restore( &self ) {
        let snapshot = self.session.load().await.unwrap_or_else( |e| {
            tracing::warn!( "Failed to load session: {}", e );
            SessionSnapshot::default()
        });
        let mode = snapshot.playback_mode;
        let engine = &self.engine;
        let mut attached = false;

        self.state.update( |s| {
            apply_mode( engine.as_ref(), mode );
            s.playback_mode = mode;

            let Some( playlist ) = snapshot.playlist.filter( |p| !p.is_empty() ) else { return };

            if let Some( current ) = engine.current_track() {
                if engine.len() != playlist.len() {
                    tracing::debug!( "Engine holds a different queue, saved playlist not restored" );
                    return;
                }
                s.current_track = resolve( Some( &playlist ), &current );
                s.is_playing = engine.is_playing();
                s.position_ms = engine.position_ms();
                s.playlist = Some( playlist );
                attached = true;
            } else if engine.is_empty() {
                engine.load_queue( &playlist.tracks );
                engine.prepare( 0 );
                s.current_track = playlist.tracks.first().cloned();
                s.is_playing = false;
                s.position_ms = 0;
                s.playlist = Some( playlist );
            }
        });

        tracing::info!( "Session restored, mode {}", mode.name() );
        if attached && self.engine.is_playing() {
            self.start_ticker();
        }
    }


    /// Applies an engine notification to the playback state.
    pub fn handle_engine_event( &self, event: EngineEvent ) {
        match event {
            EngineEvent::PlayingChanged( playing ) => {
                let position = ( !playing ).then( || self.engine.position_ms() );
                self.state.update( |s| {
                    s.is_playing = playing;
                    if let Some( position ) = position {
                        s.position_ms = position;
                    }
                });

                if playing {
                    self.start_ticker();
                } else {
                    self.ticker.stop();
                }
            }

            EngineEvent::TrackChanged( track ) => {
                let mut lyrics_open = false;
                let mut playing = false;
                self.state.update( |s| {
                    let current = track.as_ref().and_then( |t| resolve( s.playlist.as_ref(), t ) );
                    s.current_track = current;
                    s.position_ms = 0;
                    lyrics_open = s.is_lyrics_expanded;
                    playing = s.is_playing;
                });

                self.ticker.stop();
                if playing {
                    self.start_ticker();
                }
                if lyrics_open {
                    self.lyrics.load();
                }
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use std::sync::atomic::Ordering;

    use tokio::sync::broadcast;

    use super::*;
    use crate::engine::RepeatMode;
    use crate::lyrics::LyricsCache;
    use crate::queue::MemoryEngine;
    use crate::testing::{ eventually, track, tracks, FakeLyricsProvider, FakeSessionStore };


    struct Harness {
        engine: Arc<MemoryEngine>,
        session: Arc<FakeSessionStore>,
        provider: Arc<FakeLyricsProvider>,
        player: Player,
        events: broadcast::Receiver<EngineEvent>,
    }


    impl Harness {
        fn new() -> Self {
            Self::with_session( SessionSnapshot::default() )
        }


        fn with_session( snapshot: SessionSnapshot ) -> Self {
            let engine = Arc::new( MemoryEngine::new() );
            let session = Arc::new( FakeSessionStore::with( snapshot ) );
            let provider = Arc::new( FakeLyricsProvider::new() );
            let events = engine.subscribe();
            let player = Player::new(
                engine.clone(),
                session.clone(),
                Arc::new( LyricsCache::new() ),
                provider.clone(),
                NoticeHub::new(),
            );
            Self { engine, session, provider, player, events }
        }


        /// Feeds pending engine events to the player.
        fn pump( &mut self ) {
            while let Ok( event ) = self.events.try_recv() {
                self.player.handle_engine_event( event );
            }
        }


        fn queue( &self ) -> Vec<Track> {
            self.player.snapshot().playlist.map( |p| p.tracks ).unwrap_or_default()
        }


        fn assert_aligned( &self ) {
            assert_eq!( self.engine.tracks(), self.queue() );
        }


        fn open( &mut self, name: &str, names: &[&str] ) -> Playlist {
            let playlist = Playlist::ad_hoc( tracks( names ) );
            self.player.open( &track( name ), playlist.clone() );
            self.pump();
            playlist
        }
    }


    #[tokio::test]
    async fn test_open_loads_queue_and_plays() {
        let mut h = Harness::new();
        let playlist = h.open( "b", &[ "a", "b", "c" ] );

        h.assert_aligned();
        assert_eq!( h.engine.current_index(), Some( 1 ) );
        let state = h.player.snapshot();
        assert!( state.is_playing );
        assert_eq!( state.current_track, Some( track( "b" ) ) );
        assert_eq!( state.position_ms, 0 );

        let session = h.session.clone();
        eventually( || session.snapshot().playlist == Some( playlist.clone() ) ).await;
    }


    #[tokio::test]
    async fn test_reopening_playing_track_keeps_position() {
        let mut h = Harness::new();
        let playlist = h.open( "a", &[ "a", "b" ] );
        h.player.seek_to( 60_000 );

        h.player.open( &track( "a" ), playlist.clone() );
        h.pump();
        assert!( h.engine.position_ms() >= 60_000 );
        assert_eq!( h.player.snapshot().position_ms, 60_000 );

        h.player.open( &track( "b" ), playlist );
        h.pump();
        assert!( h.engine.position_ms() < 60_000 );
        assert_eq!( h.player.snapshot().position_ms, 0 );
        assert_eq!( h.player.snapshot().current_track, Some( track( "b" ) ) );
    }


    #[tokio::test]
    async fn test_open_track_outside_playlist_is_ignored() {
        let h = Harness::new();
        h.player.open( &track( "x" ), Playlist::ad_hoc( tracks( &[ "a" ] ) ) );
        assert!( h.engine.is_empty() );
        assert_eq!( h.player.snapshot().playlist, None );
    }


    #[tokio::test]
    async fn test_cycle_playback_mode() {
        let h = Harness::new();
        assert_eq!( h.player.snapshot().playback_mode, PlaybackMode::Repeat );

        h.player.cycle_playback_mode();
        assert_eq!( h.player.snapshot().playback_mode, PlaybackMode::RepeatOne );
        assert_eq!( h.engine.repeat_mode(), RepeatMode::One );
        assert!( !h.engine.shuffle() );

        h.player.cycle_playback_mode();
        assert_eq!( h.player.snapshot().playback_mode, PlaybackMode::Shuffle );
        assert_eq!( h.engine.repeat_mode(), RepeatMode::All );
        assert!( h.engine.shuffle() );

        h.player.cycle_playback_mode();
        assert_eq!( h.player.snapshot().playback_mode, PlaybackMode::Repeat );
        assert!( !h.engine.shuffle() );

        let session = h.session.clone();
        eventually( || session.saves.load( Ordering::SeqCst ) == 3 ).await;
        assert_eq!( session.snapshot().playback_mode, PlaybackMode::Repeat );
    }


    #[tokio::test]
    async fn test_remove_current_advances_first() {
        let mut h = Harness::new();
        h.player.restore().await;
        h.open( "a", &[ "a", "b", "c" ] );

        h.player.remove_from_queue( 0 );
        h.pump();

        assert_eq!( h.engine.current_track(), Some( track( "b" ) ) );
        assert_eq!( h.queue(), tracks( &[ "b", "c" ] ) );
        assert_eq!( h.engine.len(), 2 );
        assert_eq!( h.player.snapshot().current_track, Some( track( "b" ) ) );
        assert!( h.player.snapshot().is_playing );
    }


    #[tokio::test]
    async fn test_queue_edits_keep_engine_aligned() {
        let mut h = Harness::new();
        h.open( "c", &[ "a", "b", "c", "d", "e", "f" ] );

        let edits: &[( &str, usize, usize )] = &[
            ( "move", 0, 5 ),
            ( "remove", 2, 0 ),
            ( "move", 4, 1 ),
            ( "remove", 0, 0 ),
            ( "move", 1, 1 ),
            ( "remove", 9, 0 ),
            ( "move", 2, 0 ),
            ( "remove", 1, 0 ),
            ( "remove", 0, 0 ),
        ];

        for &( op, a, b ) in edits {
            match op {
                "move" => h.player.reorder_queue( a, b ),
                _ => h.player.remove_from_queue( a ),
            }
            h.pump();
            h.assert_aligned();
            assert_eq!( h.engine.len(), h.player.snapshot().queue_len() );
        }
    }


    #[tokio::test]
    async fn test_play_next_moves_queued_track_after_current() {
        let mut h = Harness::new();
        h.open( "c", &[ "a", "b", "c", "d", "e" ] );

        // a sits at 0, current is 2: moved to min(3, 4)
        h.player.play_next( &track( "a" ) );
        assert_eq!( h.queue(), tracks( &[ "b", "c", "d", "a", "e" ] ) );
        h.assert_aligned();

        h.player.play_next( &track( "e" ) );
        assert_eq!( h.queue(), tracks( &[ "b", "c", "e", "d", "a" ] ) );
        h.assert_aligned();
        assert_eq!( h.engine.current_track(), Some( track( "c" ) ) );
    }


    #[tokio::test]
    async fn test_play_next_inserts_new_track() {
        let mut h = Harness::new();
        h.open( "a", &[ "a", "b" ] );

        h.player.play_next( &track( "x" ) );
        assert_eq!( h.queue(), tracks( &[ "a", "x", "b" ] ) );
        h.assert_aligned();

        h.player.play_next( &track( "a" ) );
        assert_eq!( h.queue(), tracks( &[ "a", "x", "b" ] ) );
    }


    #[tokio::test]
    async fn test_enqueue_on_empty_queue_starts_ad_hoc_playback() {
        let mut h = Harness::new();
        h.player.enqueue( &track( "x" ) );
        h.pump();

        let state = h.player.snapshot();
        assert_eq!( state.playlist, Some( Playlist::ad_hoc( vec![ track( "x" ) ] ) ) );
        assert_eq!( state.current_track, Some( track( "x" ) ) );
        assert_eq!( state.position_ms, 0 );
        assert!( state.is_playing );
        assert_eq!( h.engine.current_index(), Some( 0 ) );
    }


    #[tokio::test]
    async fn test_enqueue_moves_or_appends() {
        let mut h = Harness::new();
        h.open( "b", &[ "a", "b", "c" ] );

        h.player.enqueue( &track( "a" ) );
        assert_eq!( h.queue(), tracks( &[ "b", "c", "a" ] ) );

        h.player.enqueue( &track( "x" ) );
        assert_eq!( h.queue(), tracks( &[ "b", "c", "a", "x" ] ) );
        h.assert_aligned();
    }


    #[tokio::test]
    async fn test_seek_previous_at_head_rewinds() {
        let mut h = Harness::new();
        h.open( "a", &[ "a", "b" ] );
        h.player.seek_to( 30_000 );

        h.player.seek_previous();
        h.pump();

        assert_eq!( h.player.snapshot().position_ms, 0 );
        assert_eq!( h.engine.current_track(), Some( track( "a" ) ) );
        assert!( h.engine.position_ms() < 30_000 );
    }


    #[tokio::test]
    async fn test_transport_without_track_is_noop() {
        let mut h = Harness::new();
        h.player.resume();
        h.player.seek_to( 1_000 );
        h.player.pause();
        h.pump();

        let state = h.player.snapshot();
        assert!( !state.is_playing );
        assert_eq!( state.position_ms, 0 );
    }


    #[tokio::test]
    async fn test_pause_and_resume() {
        let mut h = Harness::new();
        h.open( "a", &[ "a" ] );

        h.player.pause();
        h.pump();
        assert!( !h.player.snapshot().is_playing );

        h.player.resume();
        h.pump();
        assert!( h.player.snapshot().is_playing );
    }


    #[tokio::test]
    async fn test_track_transition_resets_position() {
        let mut h = Harness::new();
        h.open( "a", &[ "a", "b" ] );
        h.player.seek_to( 10_000 );

        h.player.seek_next();
        h.pump();

        let state = h.player.snapshot();
        assert_eq!( state.current_track, Some( track( "b" ) ) );
        assert_eq!( state.position_ms, 0 );
    }


    #[tokio::test]
    async fn test_emptied_queue_collapses_panels() {
        let mut h = Harness::new();
        h.open( "a", &[ "a" ] );
        h.player.set_player_expanded( true );

        h.player.remove_from_queue( 0 );
        h.pump();

        let state = h.player.snapshot();
        assert_eq!( state.queue_len(), 0 );
        assert!( !state.is_player_expanded );
        assert!( !state.is_lyrics_expanded );
        assert_eq!( state.current_track, None );
        assert!( !state.is_playing );
    }


    #[tokio::test]
    async fn test_sort_queue_keeps_current_track_playing() {
        let mut h = Harness::new();
        h.open( "a", &[ "c", "a", "d", "b" ] );

        h.player.sort_queue( TrackSort::Title, SortOrder::Ascending );
        h.pump();

        assert_eq!( h.queue(), tracks( &[ "a", "b", "c", "d" ] ) );
        h.assert_aligned();
        assert_eq!( h.engine.current_track(), Some( track( "a" ) ) );
        assert!( h.engine.is_playing() );
        assert_eq!( h.player.snapshot().current_track, Some( track( "a" ) ) );
    }


    #[tokio::test]
    async fn test_clear_keeps_mode() {
        let mut h = Harness::new();
        h.player.cycle_playback_mode();
        h.open( "a", &[ "a", "b" ] );

        h.player.clear();
        h.pump();

        let state = h.player.snapshot();
        assert_eq!( state.playlist, None );
        assert_eq!( state.playback_mode, PlaybackMode::RepeatOne );
        assert!( h.engine.is_empty() );
    }


    #[tokio::test]
    async fn test_restore_cues_saved_queue() {
        let saved = Playlist::named( "mix", tracks( &[ "a", "b" ] ) );
        let mut h = Harness::with_session( SessionSnapshot {
            playlist: Some( saved.clone() ),
            playback_mode: PlaybackMode::Shuffle,
        });

        h.player.restore().await;
        h.pump();

        let state = h.player.snapshot();
        assert_eq!( state.playback_mode, PlaybackMode::Shuffle );
        assert_eq!( state.playlist, Some( saved ) );
        assert_eq!( state.current_track, Some( track( "a" ) ) );
        assert!( !state.is_playing );
        assert!( h.engine.shuffle() );
        h.assert_aligned();
    }


    #[tokio::test]
    async fn test_restore_attaches_to_engine_queue() {
        let saved = Playlist::named( "mix", tracks( &[ "a", "b" ] ) );
        let mut h = Harness::with_session( SessionSnapshot {
            playlist: Some( saved.clone() ),
            playback_mode: PlaybackMode::Repeat,
        });
        h.engine.load_queue( &saved.tracks );
        h.engine.play_at( 1, 5_000 );
        h.events = h.engine.subscribe();

        h.player.restore().await;

        let state = h.player.snapshot();
        assert_eq!( state.current_track, Some( track( "b" ) ) );
        assert!( state.is_playing );
        assert!( state.position_ms >= 5_000 );
        assert_eq!( h.engine.current_index(), Some( 1 ) );
    }


    #[tokio::test]
    async fn test_lyrics_load_when_panel_opens() {
        let mut h = Harness::new();
        h.open( "a", &[ "a", "b" ] );

        h.player.set_lyrics_expanded( true );
        let state = h.player.state().clone();
        eventually( || state.get().lyrics.as_ref().is_some_and( |l| l.uri == "content://a" ) ).await;

        // A transition while the panel is open loads the new track's lyrics
        h.player.seek_next();
        h.pump();
        eventually( || state.get().lyrics.as_ref().is_some_and( |l| l.uri == "content://b" ) ).await;
        assert_eq!( h.provider.calls.load( Ordering::SeqCst ), 2 );
    }


    #[tokio::test( flavor = "multi_thread", worker_threads = 4 )]
    async fn test_saved_queue_follows_rapid_reorders() {
        use std::time::Duration;

        use tempfile::TempDir;

        use crate::session::JsonSessionStore;

        let dir = TempDir::new().unwrap();
        let session = Arc::new( JsonSessionStore::new( dir.path().join( "session.json" ) ) );
        let player = Player::new(
            Arc::new( MemoryEngine::new() ),
            session.clone(),
            Arc::new( LyricsCache::new() ),
            Arc::new( FakeLyricsProvider::new() ),
            NoticeHub::new(),
        );

        for round in 0..10 {
            let playlist = Playlist::ad_hoc( tracks( &[ "a", "b", "c", "d", "e" ] ) );
            player.open( &track( "a" ), playlist );
            for i in 0..20 {
                player.reorder_queue( ( i + round ) % 5, ( i * 3 + 1 ) % 5 );
            }

            let expected = player.snapshot().playlist;
            let mut saved = None;
            for _ in 0..200 {
                saved = session.load().await.unwrap().playlist;
                if saved == expected {
                    break;
                }
                tokio::time::sleep( Duration::from_millis( 10 ) ).await;
            }
            assert_eq!( saved, expected, "round {}", round );
        }
    }
}
