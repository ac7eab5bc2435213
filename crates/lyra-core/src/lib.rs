//! Lyra Core - playback orchestration and library sync
//!
//! This crate owns the state of a local music player: the sorted catalog
//! and its derived playlists, the playback queue mirrored onto a playback
//! engine, and the metadata and lyrics workflows that run beside them.
//! Audio output, tag writing and network clients are collaborators plugged
//! in through traits.

pub mod catalog;
pub mod command;
pub mod controller;
pub mod engine;
pub mod error;
pub mod library;
pub mod lyrics;
pub mod metadata;
pub mod notice;
pub mod player;
pub mod playlist;
pub mod queue;
pub mod session;
pub mod settings;
pub mod sort;
pub mod state;
pub mod ticker;
pub mod track;

#[cfg( test )]
mod testing;

pub use command::{ Command, CommandError, TrackRef };
pub use controller::{ Collaborators, Controller, UiEvent };
pub use engine::{ EngineEvent, PlaybackEngine, RepeatMode };
pub use error::{ CatalogError, NetworkError, StoreError };
pub use notice::{ Notice, NoticeHub };
pub use player::Player;
pub use state::{ PlaybackMode, PlaybackState, StateCell };
pub use track::{ Lyrics, LyricsBody, Metadata, Playlist, SearchResult, Track };
