//! User preferences.
//!
//! [`Settings`] is a plain serde value. Components never touch it directly:
//! they go through a [`SettingsHandle`], which keeps the current value in
//! memory and writes every change through to a [`SettingsBackend`].

use std::sync::{ Arc, Mutex, PoisonError, RwLock };

use serde::{ Deserialize, Serialize };

use crate::error::StoreError;
use crate::sort::{ PlaylistSort, SortOrder, TrackSort };


/// Persisted user preferences.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    pub track_sort: TrackSort,
    pub track_sort_order: SortOrder,
    pub playlist_sort: PlaylistSort,
    pub playlist_sort_order: SortOrder,

    /// The user acknowledged that rewriting tags can damage files
    pub metadata_risks_accepted: bool,

    /// Pass the track duration to metadata searches
    pub match_duration: bool,

    /// File extensions whose embedded cover art cannot be rewritten
    pub unsupported_art_formats: Vec<String>,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            track_sort: TrackSort::default(),
            track_sort_order: SortOrder::default(),
            playlist_sort: PlaylistSort::default(),
            playlist_sort_order: SortOrder::default(),
            metadata_risks_accepted: false,
            match_duration: true,
            unsupported_art_formats: vec![ "wav".into(), "wma".into(), "amr".into() ],
        }
    }
}


/// Where settings are loaded from and saved to.
pub trait SettingsBackend: Send + Sync {
    /// Loads stored settings, falling back to defaults.
    fn load( &self ) -> Settings;

    fn save( &self, settings: &Settings ) -> Result<(), StoreError>;
}


/// Backend that keeps settings for the lifetime of the process only.
#[derive( Debug, Default )]
pub struct MemorySettings {
    saved: Mutex<Settings>,
}


impl MemorySettings {
    pub fn new( settings: Settings ) -> Self {
        Self { saved: Mutex::new( settings ) }
    }
}


impl SettingsBackend for MemorySettings {
    fn load( &self ) -> Settings {
        self.saved.lock().unwrap_or_else( PoisonError::into_inner ).clone()
    }


    fn save( &self, settings: &Settings ) -> Result<(), StoreError> {
        *self.saved.lock().unwrap_or_else( PoisonError::into_inner ) = settings.clone();
        Ok(())
    }
}


/// Shared access to the current settings.
pub struct SettingsHandle {
    current: RwLock<Settings>,
    backend: Arc<dyn SettingsBackend>,
}


impl SettingsHandle {
    /// Loads the initial value from `backend`.
    pub fn new( backend: Arc<dyn SettingsBackend> ) -> Self {
        let current = RwLock::new( backend.load() );
        Self { current, backend }
    }


    /// Handle over a fresh [`MemorySettings`] backend.
    pub fn in_memory( settings: Settings ) -> Self {
        Self::new( Arc::new( MemorySettings::new( settings ) ) )
    }


    /// Snapshot of the current settings.
    pub fn get( &self ) -> Settings {
        self.current.read().unwrap_or_else( PoisonError::into_inner ).clone()
    }


    /// Applies `f` and saves the result. Save failures are logged.
    pub fn update( &self, f: impl FnOnce( &mut Settings ) ) {
        let snapshot = {
            let mut current = self.current.write().unwrap_or_else( PoisonError::into_inner );
            f( &mut current );
            current.clone()
        };

        if let Err( e ) = self.backend.save( &snapshot ) {
            tracing::warn!( "Failed to save settings: {}", e );
        }
    }


    pub fn track_sort( &self ) -> ( TrackSort, SortOrder ) {
        let settings = self.get();
        ( settings.track_sort, settings.track_sort_order )
    }


    pub fn set_track_sort( &self, sort: TrackSort, order: SortOrder ) {
        self.update( |s| {
            s.track_sort = sort;
            s.track_sort_order = order;
        });
    }


    pub fn playlist_sort( &self ) -> ( PlaylistSort, SortOrder ) {
        let settings = self.get();
        ( settings.playlist_sort, settings.playlist_sort_order )
    }


    pub fn set_playlist_sort( &self, sort: PlaylistSort, order: SortOrder ) {
        self.update( |s| {
            s.playlist_sort = sort;
            s.playlist_sort_order = order;
        });
    }


    pub fn metadata_risks_accepted( &self ) -> bool {
        self.get().metadata_risks_accepted
    }


    pub fn accept_metadata_risks( &self ) {
        self.update( |s| s.metadata_risks_accepted = true );
    }


    pub fn match_duration( &self ) -> bool {
        self.get().match_duration
    }


    /// Flips the duration-matching flag.
    ///
    /// @returns The new value
    pub fn toggle_match_duration( &self ) -> bool {
        let mut value = false;
        self.update( |s| {
            s.match_duration = !s.match_duration;
            value = s.match_duration;
        });
        value
    }


    /// Whether cover art can be written for files with extension `format`.
    pub fn is_art_editable( &self, format: Option<&str> ) -> bool {
        match format {
            Some( format ) => !self.get().unsupported_art_formats.iter()
                .any( |f| f.eq_ignore_ascii_case( format ) ),
            None => false,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_update_writes_through() {
        let backend = Arc::new( MemorySettings::default() );
        let handle = SettingsHandle::new( backend.clone() );

        handle.set_track_sort( TrackSort::Artist, SortOrder::Descending );

        let saved = backend.load();
        assert_eq!( saved.track_sort, TrackSort::Artist );
        assert_eq!( saved.track_sort_order, SortOrder::Descending );
        assert_eq!( handle.track_sort(), ( TrackSort::Artist, SortOrder::Descending ) );
    }


    #[test]
    fn test_toggle_match_duration() {
        let handle = SettingsHandle::in_memory( Settings::default() );
        assert!( handle.match_duration() );
        assert!( !handle.toggle_match_duration() );
        assert!( !handle.match_duration() );
    }


    #[test]
    fn test_art_editability() {
        let handle = SettingsHandle::in_memory( Settings::default() );
        assert!( handle.is_art_editable( Some( "mp3" ) ) );
        assert!( !handle.is_art_editable( Some( "WAV" ) ) );
        assert!( !handle.is_art_editable( None ) );
    }


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str( r#"{ "metadata_risks_accepted": true }"# ).unwrap();
        assert!( settings.metadata_risks_accepted );
        assert!( settings.match_duration );
        assert_eq!( settings.track_sort, TrackSort::Title );
    }
}
