//! In-memory playback engine.
//!
//! [`MemoryEngine`] implements [`PlaybackEngine`] without producing audio:
//! a queue with repeat and shuffle navigation plus a clock that advances
//! while "playing". It backs the command shell and the tests, and serves
//! as the reference for how an engine is expected to behave.

use std::collections::hash_map::RandomState;
use std::hash::{ BuildHasher, Hasher };
use std::sync::{ Mutex, MutexGuard, PoisonError };

use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::engine::{ EngineEvent, PlaybackEngine, RepeatMode };
use crate::track::Track;


/// Capacity of the engine event channel.
const EVENT_CAPACITY: usize = 64;


/// Queue and transport state guarded by the engine mutex.
#[derive( Debug, Default )]
struct QueueState {
    tracks: Vec<Track>,
    current_index: Option<usize>,
    repeat: RepeatMode,
    shuffle: bool,
    // Shuffle order (indices into tracks)
    shuffle_order: Vec<usize>,
    shuffle_position: usize,
    playing: bool,
    /// Position at `resumed_at`, or the frozen position while paused.
    position_ms: u64,
    resumed_at: Option<Instant>,
}


impl QueueState {
    fn current( &self ) -> Option<&Track> {
        self.current_index.and_then( |i| self.tracks.get( i ) )
    }


    fn position( &self ) -> u64 {
        match self.resumed_at {
            Some( at ) if self.playing => self.position_ms + at.elapsed().as_millis() as u64,
            _ => self.position_ms,
        }
    }


    /// Index an explicit skip forward lands on.
    fn next_index( &self ) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }

        if self.shuffle {
            let next = self.shuffle_position + 1;
            if next < self.shuffle_order.len() {
                self.shuffle_order.get( next ).copied()
            } else if self.repeat == RepeatMode::All {
                self.shuffle_order.first().copied()
            } else {
                None
            }
        } else {
            match self.current_index {
                None => Some( 0 ),
                Some( current ) if current + 1 < self.tracks.len() => Some( current + 1 ),
                Some( _ ) if self.repeat == RepeatMode::All => Some( 0 ),
                Some( _ ) => None,
            }
        }
    }


    /// Index an explicit skip backward lands on. Never wraps.
    fn previous_index( &self ) -> Option<usize> {
        if self.shuffle {
            if self.shuffle_position > 0 {
                self.shuffle_order.get( self.shuffle_position - 1 ).copied()
            } else {
                None
            }
        } else {
            match self.current_index {
                Some( current ) if current > 0 => Some( current - 1 ),
                _ => None,
            }
        }
    }


    /// Makes `index` current at `position_ms`, keeping the play flag.
    fn go_to( &mut self, index: usize, position_ms: u64 ) {
        self.current_index = Some( index );
        self.position_ms = position_ms;
        self.resumed_at = self.playing.then( Instant::now );
        if let Some( pos ) = self.shuffle_order.iter().position( |&i| i == index ) {
            self.shuffle_position = pos;
        }
    }


    fn set_playing( &mut self, playing: bool ) {
        if playing == self.playing {
            return;
        }
        if playing {
            self.resumed_at = Some( Instant::now() );
        } else {
            self.position_ms = self.position();
            self.resumed_at = None;
        }
        self.playing = playing;
    }


    fn regenerate_shuffle_order( &mut self ) {
        self.shuffle_order = ( 0..self.tracks.len() ).collect();

        // Simple Fisher-Yates shuffle
        let hasher = RandomState::new();
        for i in ( 1..self.shuffle_order.len() ).rev() {
            let mut h = hasher.build_hasher();
            h.write_usize( i );
            let j = h.finish() as usize % ( i + 1 );
            self.shuffle_order.swap( i, j );
        }

        // Keep the current item first so a fresh order plays everything else
        self.shuffle_position = 0;
        if let Some( current ) = self.current_index {
            if let Some( pos ) = self.shuffle_order.iter().position( |&i| i == current ) {
                self.shuffle_order.swap( 0, pos );
            }
        }
    }
}


/// Clock-driven playback engine without audio output.
pub struct MemoryEngine {
    queue: Mutex<QueueState>,
    events: broadcast::Sender<EngineEvent>,
}


impl MemoryEngine {
    /// Creates an engine with an empty queue.
    pub fn new() -> Self {
        let ( events, _ ) = broadcast::channel( EVENT_CAPACITY );
        Self {
            queue: Mutex::new( QueueState::default() ),
            events,
        }
    }


    /// Snapshot of the queued tracks.
    pub fn tracks( &self ) -> Vec<Track> {
        self.queue().tracks.clone()
    }


    pub fn repeat_mode( &self ) -> RepeatMode {
        self.queue().repeat
    }


    pub fn shuffle( &self ) -> bool {
        self.queue().shuffle
    }


    fn queue( &self ) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else( PoisonError::into_inner )
    }


    fn emit( &self, event: EngineEvent ) {
        // No subscribers is fine
        let _ = self.events.send( event );
    }


    fn emit_playing( &self, was_playing: bool, queue: &QueueState ) {
        if was_playing != queue.playing {
            self.emit( EngineEvent::PlayingChanged( queue.playing ) );
        }
    }


    /// Handles the current item reaching its end.
    fn finish_track( &self, queue: &mut QueueState ) {
        let Some( current ) = queue.current_index else { return };

        if queue.repeat == RepeatMode::One {
            queue.go_to( current, 0 );
            self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
            return;
        }

        let wrapped = queue.shuffle
            && queue.repeat == RepeatMode::All
            && queue.shuffle_position + 1 >= queue.shuffle_order.len();

        match queue.next_index() {
            Some( next ) => {
                if wrapped {
                    queue.regenerate_shuffle_order();
                }
                queue.go_to( next, 0 );
                self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
            }
            None => {
                tracing::debug!( "Memory engine: reached end of queue" );
                let duration = queue.current().map( |t| t.duration_ms ).unwrap_or( 0 );
                queue.set_playing( false );
                queue.position_ms = duration;
                self.emit( EngineEvent::PlayingChanged( false ) );
            }
        }
    }
}


impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}


impl PlaybackEngine for MemoryEngine {
    fn load_queue( &self, tracks: &[Track] ) {
        let mut queue = self.queue();
        let was_playing = queue.playing;

        queue.set_playing( false );
        queue.tracks = tracks.to_vec();
        queue.current_index = None;
        queue.position_ms = 0;
        queue.regenerate_shuffle_order();

        self.emit_playing( was_playing, &queue );
    }


    fn prepare( &self, index: usize ) {
        let mut queue = self.queue();
        if index >= queue.tracks.len() {
            return;
        }
        let was_playing = queue.playing;
        let changed = queue.current_index != Some( index );

        queue.set_playing( false );
        queue.go_to( index, 0 );

        self.emit_playing( was_playing, &queue );
        if changed {
            self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
        }
    }


    fn play_at( &self, index: usize, position_ms: u64 ) {
        let mut queue = self.queue();
        if index >= queue.tracks.len() {
            return;
        }
        let was_playing = queue.playing;
        let changed = queue.current_index != Some( index );

        queue.set_playing( true );
        queue.go_to( index, position_ms );

        if changed {
            self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
        }
        self.emit_playing( was_playing, &queue );
    }


    fn play( &self ) {
        let mut queue = self.queue();
        if queue.current_index.is_none() {
            return;
        }
        let was_playing = queue.playing;
        queue.set_playing( true );
        self.emit_playing( was_playing, &queue );
    }


    fn pause( &self ) {
        let mut queue = self.queue();
        let was_playing = queue.playing;
        queue.set_playing( false );
        self.emit_playing( was_playing, &queue );
    }


    fn seek( &self, position_ms: u64 ) {
        let mut queue = self.queue();
        let Some( track ) = queue.current() else { return };
        let duration = track.duration_ms;

        queue.position_ms = if duration > 0 { position_ms.min( duration ) } else { position_ms };
        if queue.playing {
            queue.resumed_at = Some( Instant::now() );
        }
    }


    fn has_next( &self ) -> bool {
        self.queue().next_index().is_some()
    }


    fn has_previous( &self ) -> bool {
        self.queue().previous_index().is_some()
    }


    fn next( &self ) {
        let mut queue = self.queue();
        let wrapped = queue.shuffle && queue.shuffle_position + 1 >= queue.shuffle_order.len();
        if let Some( next ) = queue.next_index() {
            if wrapped {
                queue.regenerate_shuffle_order();
            }
            queue.go_to( next, 0 );
            self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
        }
    }


    fn previous( &self ) {
        let mut queue = self.queue();
        if let Some( previous ) = queue.previous_index() {
            queue.go_to( previous, 0 );
            self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
        }
    }


    fn insert( &self, index: usize, track: Track ) {
        let mut queue = self.queue();
        let index = index.min( queue.tracks.len() );
        queue.tracks.insert( index, track );

        if let Some( current ) = queue.current_index {
            if current >= index {
                queue.current_index = Some( current + 1 );
            }
        }

        queue.regenerate_shuffle_order();
    }


    fn remove( &self, index: usize ) {
        let mut queue = self.queue();
        if index >= queue.tracks.len() {
            return;
        }

        queue.tracks.remove( index );

        // Adjust current index if needed
        match queue.current_index {
            Some( current ) if index < current => {
                queue.current_index = Some( current - 1 );
                queue.regenerate_shuffle_order();
            }
            Some( current ) if index == current => {
                queue.regenerate_shuffle_order();
                let replacement = if index < queue.tracks.len() {
                    Some( index )
                } else if queue.repeat == RepeatMode::All && !queue.tracks.is_empty() {
                    Some( 0 )
                } else {
                    None
                };

                match replacement {
                    Some( next ) => queue.go_to( next, 0 ),
                    None => {
                        let was_playing = queue.playing;
                        queue.set_playing( false );
                        queue.current_index = None;
                        queue.position_ms = 0;
                        self.emit_playing( was_playing, &queue );
                    }
                }
                self.emit( EngineEvent::TrackChanged( queue.current().cloned() ) );
            }
            _ => queue.regenerate_shuffle_order(),
        }
    }


    fn move_item( &self, from: usize, to: usize ) {
        let mut queue = self.queue();
        if from >= queue.tracks.len() || to >= queue.tracks.len() || from == to {
            return;
        }

        let track = queue.tracks.remove( from );
        queue.tracks.insert( to, track );

        // Adjust current index if affected
        if let Some( current ) = queue.current_index {
            if current == from {
                queue.current_index = Some( to );
            } else if from < current && current <= to {
                queue.current_index = Some( current - 1 );
            } else if to <= current && current < from {
                queue.current_index = Some( current + 1 );
            }
        }

        queue.regenerate_shuffle_order();
    }


    fn set_repeat_mode( &self, mode: RepeatMode ) {
        self.queue().repeat = mode;
    }


    fn set_shuffle( &self, shuffle: bool ) {
        let mut queue = self.queue();
        if shuffle != queue.shuffle {
            queue.shuffle = shuffle;
            if shuffle {
                queue.regenerate_shuffle_order();
            }
        }
    }


    fn stop( &self ) {
        let mut queue = self.queue();
        let was_playing = queue.playing;
        queue.set_playing( false );
        queue.position_ms = 0;
        self.emit_playing( was_playing, &queue );
    }


    fn clear( &self ) {
        let mut queue = self.queue();
        let was_playing = queue.playing;
        let had_current = queue.current_index.is_some();

        queue.set_playing( false );
        queue.tracks.clear();
        queue.current_index = None;
        queue.position_ms = 0;
        queue.shuffle_order.clear();
        queue.shuffle_position = 0;

        self.emit_playing( was_playing, &queue );
        if had_current {
            self.emit( EngineEvent::TrackChanged( None ) );
        }
    }


    fn current_index( &self ) -> Option<usize> {
        self.queue().current_index
    }


    fn current_track( &self ) -> Option<Track> {
        self.queue().current().cloned()
    }


    fn position_ms( &self ) -> u64 {
        let mut queue = self.queue();
        let position = queue.position();
        let duration = queue.current().map( |t| t.duration_ms ).unwrap_or( 0 );

        if queue.playing && duration > 0 && position >= duration {
            self.finish_track( &mut queue );
            return queue.position();
        }
        position
    }


    fn is_playing( &self ) -> bool {
        self.queue().playing
    }


    fn len( &self ) -> usize {
        self.queue().tracks.len()
    }


    fn subscribe( &self ) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}


#[cfg( test )]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::track;


    fn loaded( names: &[&str] ) -> MemoryEngine {
        let engine = MemoryEngine::new();
        let tracks: Vec<Track> = names.iter().map( |n| track( n ) ).collect();
        engine.load_queue( &tracks );
        engine
    }


    #[test]
    fn test_next_wraps_only_with_repeat_all() {
        let engine = loaded( &[ "a", "b" ] );
        engine.play_at( 1, 0 );
        assert!( !engine.has_next() );

        engine.set_repeat_mode( RepeatMode::All );
        assert!( engine.has_next() );
        engine.next();
        assert_eq!( engine.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_previous_never_wraps() {
        let engine = loaded( &[ "a", "b" ] );
        engine.set_repeat_mode( RepeatMode::All );
        engine.play_at( 0, 0 );
        assert!( !engine.has_previous() );

        engine.play_at( 1, 0 );
        assert!( engine.has_previous() );
        engine.previous();
        assert_eq!( engine.current_index(), Some( 0 ) );
    }


    #[test]
    fn test_move_item_tracks_current() {
        let engine = loaded( &[ "a", "b", "c", "d" ] );
        engine.play_at( 1, 0 );

        engine.move_item( 0, 3 );
        assert_eq!( engine.current_index(), Some( 0 ) );
        assert_eq!( engine.current_track(), Some( track( "b" ) ) );

        engine.move_item( 3, 0 );
        assert_eq!( engine.current_index(), Some( 1 ) );
        assert_eq!( engine.current_track(), Some( track( "b" ) ) );
    }


    #[test]
    fn test_insert_before_current_shifts_it() {
        let engine = loaded( &[ "a", "b" ] );
        engine.play_at( 1, 0 );
        engine.insert( 0, track( "x" ) );

        assert_eq!( engine.current_index(), Some( 2 ) );
        assert_eq!( engine.current_track(), Some( track( "b" ) ) );
        assert_eq!( engine.len(), 3 );
    }


    #[test]
    fn test_remove_current_moves_to_following_item() {
        let engine = loaded( &[ "a", "b", "c" ] );
        let mut events = engine.subscribe();
        engine.play_at( 1, 0 );
        engine.remove( 1 );

        assert_eq!( engine.current_track(), Some( track( "c" ) ) );
        assert!( engine.is_playing() );

        let mut last = None;
        while let Ok( event ) = events.try_recv() {
            last = Some( event );
        }
        assert_eq!( last, Some( EngineEvent::TrackChanged( Some( track( "c" ) ) ) ) );
    }


    #[test]
    fn test_remove_last_current_stops() {
        let engine = loaded( &[ "a" ] );
        engine.play_at( 0, 0 );
        engine.remove( 0 );

        assert!( engine.is_empty() );
        assert!( !engine.is_playing() );
        assert_eq!( engine.current_track(), None );
    }


    #[test]
    fn test_shuffle_visits_every_track_once() {
        let engine = loaded( &[ "a", "b", "c", "d", "e" ] );
        engine.play_at( 2, 0 );
        engine.set_shuffle( true );

        let mut seen = vec![ engine.current_track().unwrap() ];
        while engine.has_next() {
            engine.next();
            seen.push( engine.current_track().unwrap() );
        }

        assert_eq!( seen.len(), 5 );
        for name in [ "a", "b", "c", "d", "e" ] {
            assert!( seen.contains( &track( name ) ) );
        }
    }


    #[tokio::test( start_paused = true )]
    async fn test_position_advances_and_auto_advances() {
        let engine = loaded( &[ "a", "b" ] );
        engine.play_at( 0, 0 );

        tokio::time::advance( Duration::from_millis( 1_500 ) ).await;
        assert_eq!( engine.position_ms(), 1_500 );

        engine.pause();
        tokio::time::advance( Duration::from_millis( 1_000 ) ).await;
        assert_eq!( engine.position_ms(), 1_500 );

        engine.play();
        tokio::time::advance( Duration::from_millis( 200_000 ) ).await;
        engine.position_ms();
        assert_eq!( engine.current_track(), Some( track( "b" ) ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_repeat_one_restarts_track() {
        let engine = loaded( &[ "a", "b" ] );
        engine.set_repeat_mode( RepeatMode::One );
        engine.play_at( 0, 0 );

        tokio::time::advance( Duration::from_millis( 200_000 ) ).await;
        engine.position_ms();
        assert_eq!( engine.current_track(), Some( track( "a" ) ) );
        assert!( engine.is_playing() );
    }
}
