//! Shared state cells and the playback state they hold.
//!
//! Every mutable piece of shared state lives in a [`StateCell`]. A cell is
//! only ever changed by applying a closure to its current value, which is
//! then published to subscribers as a whole. Two writers on the same cell
//! are serialized by the cell itself, and readers always see either the
//! old or the new value.

use serde::{ Deserialize, Serialize };
use tokio::sync::watch;

use crate::engine::RepeatMode;
use crate::track::{ Lyrics, Playlist, Track };


/// A single shared value with atomic read-modify-write updates.
#[derive( Debug )]
pub struct StateCell<T> {
    tx: watch::Sender<T>,
}


impl<T> StateCell<T> {
    /// Creates a cell holding `value`.
    pub fn new( value: T ) -> Self {
        let ( tx, _rx ) = watch::channel( value );
        Self { tx }
    }


    /// Applies `f` to the current value and publishes the result.
    pub fn update( &self, f: impl FnOnce( &mut T ) ) {
        self.tx.send_modify( f );
    }


    /// Applies `f` and only notifies subscribers when it returns true.
    ///
    /// `f` must leave the value untouched when it returns false.
    ///
    /// @returns Whether a new value was published
    pub fn update_if( &self, f: impl FnOnce( &mut T ) -> bool ) -> bool {
        self.tx.send_if_modified( f )
    }


    /// Runs `f` against the current value without cloning it.
    ///
    /// Must not call back into `update` on the same cell.
    pub fn read<R>( &self, f: impl FnOnce( &T ) -> R ) -> R {
        f( &self.tx.borrow() )
    }


    /// Subscribes to published values.
    pub fn subscribe( &self ) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}


impl<T: Clone> StateCell<T> {
    /// Returns a snapshot of the current value.
    pub fn get( &self ) -> T {
        self.tx.borrow().clone()
    }
}


impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new( T::default() )
    }
}


/// User-facing playback mode.
///
/// Cycles Repeat → RepeatOne → Shuffle → Repeat. There is no "off" mode.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize )]
pub enum PlaybackMode {
    #[default]
    Repeat,
    RepeatOne,
    Shuffle,
}


impl PlaybackMode {
    /// Returns the mode that follows this one.
    pub fn next( self ) -> Self {
        match self {
            PlaybackMode::Repeat => PlaybackMode::RepeatOne,
            PlaybackMode::RepeatOne => PlaybackMode::Shuffle,
            PlaybackMode::Shuffle => PlaybackMode::Repeat,
        }
    }


    /// Engine repeat configuration for this mode.
    pub fn repeat_mode( self ) -> RepeatMode {
        match self {
            PlaybackMode::Repeat | PlaybackMode::Shuffle => RepeatMode::All,
            PlaybackMode::RepeatOne => RepeatMode::One,
        }
    }


    /// Engine shuffle configuration for this mode.
    pub fn shuffle( self ) -> bool {
        self == PlaybackMode::Shuffle
    }


    pub fn name( self ) -> &'static str {
        match self {
            PlaybackMode::Repeat => "repeat",
            PlaybackMode::RepeatOne => "repeat one",
            PlaybackMode::Shuffle => "shuffle",
        }
    }
}


/// What is playing, from what queue, at what position.
///
/// `playlist` mirrors the engine queue entry for entry. `current_track`,
/// when set, is a member of `playlist`.
#[derive( Debug, Clone, PartialEq, Default )]
pub struct PlaybackState {
    pub playlist: Option<Playlist>,
    pub current_track: Option<Track>,
    pub position_ms: u64,
    pub is_playing: bool,
    pub playback_mode: PlaybackMode,
    pub is_player_expanded: bool,
    pub is_lyrics_expanded: bool,
    pub lyrics: Option<Lyrics>,
    pub is_loading_lyrics: bool,
}


impl PlaybackState {
    /// Index of the current track inside the mirrored playlist.
    pub fn current_index( &self ) -> Option<usize> {
        let playlist = self.playlist.as_ref()?;
        let track = self.current_track.as_ref()?;
        playlist.index_of( track )
    }


    /// Number of entries in the mirrored queue.
    pub fn queue_len( &self ) -> usize {
        self.playlist.as_ref().map( Playlist::len ).unwrap_or( 0 )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_mode_cycle_has_order_three() {
        for mode in [ PlaybackMode::Repeat, PlaybackMode::RepeatOne, PlaybackMode::Shuffle ] {
            assert_eq!( mode.next().next().next(), mode );
            assert_ne!( mode.next(), mode );
        }
    }


    #[test]
    fn test_mode_engine_configuration() {
        assert_eq!( PlaybackMode::Repeat.repeat_mode(), RepeatMode::All );
        assert!( !PlaybackMode::Repeat.shuffle() );
        assert_eq!( PlaybackMode::RepeatOne.repeat_mode(), RepeatMode::One );
        assert_eq!( PlaybackMode::Shuffle.repeat_mode(), RepeatMode::All );
        assert!( PlaybackMode::Shuffle.shuffle() );
    }


    #[test]
    fn test_update_if_skips_notification() {
        let cell = StateCell::new( 1 );
        let rx = cell.subscribe();

        assert!( !cell.update_if( |_| false ) );
        assert!( !rx.has_changed().unwrap() );

        assert!( cell.update_if( |v| { *v = 2; true } ) );
        assert!( rx.has_changed().unwrap() );
        assert_eq!( cell.get(), 2 );
    }
}
