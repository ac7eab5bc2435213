//! Playback engine capability.
//!
//! The engine owns the actual media queue and transport. The core drives it
//! through [`PlaybackEngine`] and learns about transitions it did not
//! request (end of track, external controls) through [`EngineEvent`]s.
//!
//! Engine commands are synchronous and must not block: the core calls them
//! while holding the playback state cell, so the engine's queue and the
//! mirrored playlist change together.

use tokio::sync::broadcast;

use crate::track::Track;


/// Engine-level repeat configuration.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}


/// Notifications emitted by the engine.
#[derive( Debug, Clone, PartialEq )]
pub enum EngineEvent {
    /// Playback started or stopped.
    PlayingChanged( bool ),

    /// The current queue item changed. `None` when the queue ran out.
    TrackChanged( Option<Track> ),
}


/// Media playback engine consumed by the player.
pub trait PlaybackEngine: Send + Sync {
    /// Replaces the queue. Nothing is current afterwards.
    fn load_queue( &self, tracks: &[Track] );

    /// Makes `index` current without starting playback.
    fn prepare( &self, index: usize );

    /// Makes `index` current at `position_ms` and starts playback.
    fn play_at( &self, index: usize, position_ms: u64 );

    fn play( &self );

    fn pause( &self );

    /// Seeks within the current item.
    fn seek( &self, position_ms: u64 );

    fn has_next( &self ) -> bool;

    fn has_previous( &self ) -> bool;

    fn next( &self );

    fn previous( &self );

    /// Inserts `track` so that it ends up at `index` (`index <= len`).
    fn insert( &self, index: usize, track: Track );

    fn remove( &self, index: usize );

    /// Removes the item at `from` and re-inserts it at `to`.
    fn move_item( &self, from: usize, to: usize );

    fn set_repeat_mode( &self, mode: RepeatMode );

    fn set_shuffle( &self, shuffle: bool );

    /// Stops playback, keeping the queue.
    fn stop( &self );

    /// Empties the queue.
    fn clear( &self );

    fn current_index( &self ) -> Option<usize>;

    fn current_track( &self ) -> Option<Track>;

    /// Playback position within the current item.
    fn position_ms( &self ) -> u64;

    fn is_playing( &self ) -> bool;

    /// Number of queued items.
    fn len( &self ) -> usize;

    fn is_empty( &self ) -> bool {
        self.len() == 0
    }

    /// Subscribes to engine events.
    fn subscribe( &self ) -> broadcast::Receiver<EngineEvent>;
}
