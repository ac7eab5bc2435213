//! Playback position sampling.

use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::{ Arc, Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::PlaybackEngine;
use crate::state::{ PlaybackState, StateCell };


/// Sampling cadence while playing.
pub const TICK_INTERVAL: Duration = Duration::from_millis( 50 );


/// Copies the engine position into the playback state while playing.
///
/// At most one sampling task exists. Starting a new one aborts the old
/// one, and every write is checked against a generation counter so a task
/// that was superseded mid-tick never publishes its stale position.
#[derive( Debug, Default )]
pub struct PositionTicker {
    task: Mutex<Option<JoinHandle<()>>>,
    generation: Arc<AtomicU64>,
}


impl PositionTicker {
    pub fn new() -> Self {
        Self::default()
    }


    fn task( &self ) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Starts sampling, replacing any running instance.
    ///
    /// The task ends by itself once the state reports playback stopped.
    pub fn start( &self, engine: Arc<dyn PlaybackEngine>, state: Arc<StateCell<PlaybackState>> ) {
        let mut task = self.task();
        let generation = self.generation.fetch_add( 1, Ordering::SeqCst ) + 1;
        if let Some( old ) = task.take() {
            old.abort();
        }

        let current = self.generation.clone();
        *task = Some( tokio::spawn( async move {
            let mut interval = tokio::time::interval( TICK_INTERVAL );
            interval.set_missed_tick_behavior( MissedTickBehavior::Skip );

            loop {
                interval.tick().await;

                let position = engine.position_ms();
                let mut live = true;
                state.update_if( |s| {
                    if current.load( Ordering::SeqCst ) != generation || !s.is_playing {
                        live = false;
                        return false;
                    }
                    if s.position_ms == position {
                        return false;
                    }
                    s.position_ms = position;
                    true
                });

                if !live {
                    break;
                }
            }
        }));
    }


    /// Stops sampling.
    pub fn stop( &self ) {
        let mut task = self.task();
        self.generation.fetch_add( 1, Ordering::SeqCst );
        if let Some( old ) = task.take() {
            old.abort();
        }
    }


    /// Whether a sampling task is alive.
    pub fn is_running( &self ) -> bool {
        self.task().as_ref().is_some_and( |t| !t.is_finished() )
    }
}


impl Drop for PositionTicker {
    fn drop( &mut self ) {
        self.stop();
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::queue::MemoryEngine;
    use crate::testing::track;


    fn playing() -> ( Arc<MemoryEngine>, Arc<StateCell<PlaybackState>> ) {
        let engine = Arc::new( MemoryEngine::new() );
        engine.load_queue( &[ track( "a" ) ] );
        engine.play_at( 0, 0 );
        let state = Arc::new( StateCell::new( PlaybackState { is_playing: true, ..Default::default() } ) );
        ( engine, state )
    }


    #[tokio::test( start_paused = true )]
    async fn test_samples_while_playing() {
        let ( engine, state ) = playing();
        let ticker = PositionTicker::new();
        ticker.start( engine.clone(), state.clone() );

        tokio::time::sleep( Duration::from_millis( 1_000 ) ).await;
        let position = state.get().position_ms;
        assert!( position >= 900 && position <= 1_000, "position {}", position );
        assert!( ticker.is_running() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_stop_freezes_position() {
        let ( engine, state ) = playing();
        let ticker = PositionTicker::new();
        ticker.start( engine.clone(), state.clone() );
        tokio::time::sleep( Duration::from_millis( 500 ) ).await;

        ticker.stop();
        let frozen = state.get().position_ms;
        tokio::time::sleep( Duration::from_millis( 500 ) ).await;

        assert_eq!( state.get().position_ms, frozen );
        assert!( !ticker.is_running() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_ends_when_playback_stops() {
        let ( engine, state ) = playing();
        let ticker = PositionTicker::new();
        ticker.start( engine.clone(), state.clone() );
        tokio::time::sleep( Duration::from_millis( 200 ) ).await;

        state.update( |s| s.is_playing = false );
        tokio::time::sleep( Duration::from_millis( 200 ) ).await;
        assert!( !ticker.is_running() );
    }


    #[tokio::test( start_paused = true )]
    async fn test_restart_replaces_previous_task() {
        let ( engine, state ) = playing();
        let ticker = PositionTicker::new();
        ticker.start( engine.clone(), state.clone() );
        let first_generation = ticker.generation.load( Ordering::SeqCst );

        ticker.start( engine.clone(), state.clone() );
        assert_eq!( ticker.generation.load( Ordering::SeqCst ), first_generation + 1 );

        tokio::time::sleep( Duration::from_millis( 300 ) ).await;
        assert!( ticker.is_running() );
        assert!( state.get().position_ms >= 200 );
    }
}
