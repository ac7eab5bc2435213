//! Library state
//!
//! Holds the sorted catalog, the playlists derived from it, and the
//! playlist currently open for browsing. The catalog is replaced as a
//! whole on every resync that actually changes its contents.

use std::collections::HashSet;
use std::sync::Arc;

use crate::settings::SettingsHandle;
use crate::sort::{ group_by, sorted_by, sorted_playlists, Grouping, PlaylistSort, SortOrder, TrackSort };
use crate::state::StateCell;
use crate::track::{ Playlist, Track };


/// The sorted catalog and its derived groupings.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct LibraryView {
    pub tracks: Vec<Track>,
    pub albums: Vec<Playlist>,
    pub artists: Vec<Playlist>,
    pub genres: Vec<Playlist>,
    pub folders: Vec<Playlist>,
}


impl LibraryView {
    /// Sorts `tracks` and derives every grouping from the sorted list.
    pub fn build( tracks: &[Track], sort: TrackSort, order: SortOrder ) -> Self {
        let tracks = sorted_by( tracks, sort, order );
        Self {
            albums: group_by( &tracks, Grouping::Album ),
            artists: group_by( &tracks, Grouping::Artist ),
            genres: group_by( &tracks, Grouping::Genre ),
            folders: group_by( &tracks, Grouping::Folder ),
            tracks,
        }
    }


    pub fn groups( &self, grouping: Grouping ) -> &[Playlist] {
        match grouping {
            Grouping::Album => &self.albums,
            Grouping::Artist => &self.artists,
            Grouping::Genre => &self.genres,
            Grouping::Folder => &self.folders,
        }
    }
}


/// Whether `current` and `incoming` hold the same tracks, ignoring order.
fn same_contents( current: &[Track], incoming: &[Track] ) -> bool {
    if current.len() != incoming.len() {
        return false;
    }
    let known: HashSet<&Track> = current.iter().collect();
    incoming.iter().all( |t| known.contains( t ) )
}


/// Catalog, groupings and selection.
pub struct Library {
    view: StateCell<LibraryView>,
    selected: StateCell<Option<Playlist>>,
    settings: Arc<SettingsHandle>,
}


impl Library {
    pub fn new( settings: Arc<SettingsHandle> ) -> Self {
        Self {
            view: StateCell::default(),
            selected: StateCell::default(),
            settings,
        }
    }


    pub fn view( &self ) -> &StateCell<LibraryView> {
        &self.view
    }


    pub fn selected( &self ) -> &StateCell<Option<Playlist>> {
        &self.selected
    }


    /// Snapshot of the sorted catalog.
    pub fn tracks( &self ) -> Vec<Track> {
        self.view.read( |v| v.tracks.clone() )
    }


    /// Replaces the catalog with `tracks` unless it already holds exactly
    /// those tracks. Subscribers are only notified on a real change.
    ///
    /// @returns Whether the catalog changed
    pub fn apply_catalog( &self, tracks: &[Track] ) -> bool {
        let ( sort, order ) = self.settings.track_sort();
        let changed = self.view.update_if( |view| {
            if same_contents( &view.tracks, tracks ) {
                return false;
            }
            *view = LibraryView::build( tracks, sort, order );
            true
        });

        if changed {
            tracing::info!( "Catalog updated: {} tracks", tracks.len() );
        }
        changed
    }


    /// Changes the track sort, persists it and re-sorts the catalog and the
    /// selected playlist. `None` keeps the current value.
    pub fn set_track_sort( &self, sort: Option<TrackSort>, order: Option<SortOrder> ) {
        let ( current_sort, current_order ) = self.settings.track_sort();
        let sort = sort.unwrap_or( current_sort );
        let order = order.unwrap_or( current_order );
        self.settings.set_track_sort( sort, order );

        self.view.update( |view| *view = LibraryView::build( &view.tracks, sort, order ) );
        self.sort_selected( sort, order );
    }


    /// Changes the playlist sort and persists it.
    pub fn set_playlist_sort( &self, sort: Option<PlaylistSort>, order: Option<SortOrder> ) {
        let ( current_sort, current_order ) = self.settings.playlist_sort();
        self.settings.set_playlist_sort( sort.unwrap_or( current_sort ), order.unwrap_or( current_order ) );
    }


    /// Derived playlists for `grouping`, ordered by the playlist sort.
    pub fn groups( &self, grouping: Grouping ) -> Vec<Playlist> {
        let ( sort, order ) = self.settings.playlist_sort();
        self.view.read( |v| sorted_playlists( v.groups( grouping ), sort, order ) )
    }


    /// Finds the track whose URI or file path equals `location`.
    pub fn find( &self, location: &str ) -> Option<Track> {
        self.view.read( |v| {
            v.tracks.iter()
                .find( |t| t.uri == location || t.path.to_str() == Some( location ) )
                .cloned()
        })
    }


    pub fn select_playlist( &self, playlist: Option<Playlist> ) {
        self.selected.update( |s| *s = playlist );
    }


    /// Re-sorts the selected playlist in place.
    pub fn sort_selected( &self, sort: TrackSort, order: SortOrder ) {
        self.selected.update_if( |selected| match selected {
            Some( playlist ) => {
                playlist.tracks = sorted_by( &playlist.tracks, sort, order );
                true
            }
            None => false,
        });
    }


    /// Renames the selected playlist if it is the one called `from`.
    pub fn rename_selected( &self, from: &str, to: &str ) {
        self.selected.update_if( |selected| match selected {
            Some( playlist ) if playlist.name.as_deref() == Some( from ) => {
                playlist.name = Some( to.to_string() );
                true
            }
            _ => false,
        });
    }


    /// Replaces the tracks of the selected playlist if it is called `name`.
    pub fn update_selected_tracks( &self, name: &str, tracks: &[Track] ) {
        self.selected.update_if( |selected| match selected {
            Some( playlist ) if playlist.name.as_deref() == Some( name ) => {
                playlist.tracks = tracks.to_vec();
                true
            }
            _ => false,
        });
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::testing::track;


    fn library() -> Library {
        Library::new( Arc::new( SettingsHandle::in_memory( Settings::default() ) ) )
    }


    #[test]
    fn test_apply_catalog_sorts_and_groups() {
        let library = library();
        let mut b = track( "b" );
        b.album = Some( "One".into() );
        let mut a = track( "a" );
        a.album = Some( "One".into() );

        assert!( library.apply_catalog( &[ b.clone(), a.clone() ] ) );

        let view = library.view().get();
        assert_eq!( view.tracks, [ a.clone(), b.clone() ] );
        assert_eq!( view.albums, [ Playlist::named( "One", vec![ a, b ] ) ] );
    }


    #[test]
    fn test_identical_resync_does_not_notify() {
        let library = library();
        let tracks = vec![ track( "a" ), track( "b" ), track( "c" ) ];
        library.apply_catalog( &tracks );

        let rx = library.view().subscribe();
        let reordered = vec![ track( "c" ), track( "a" ), track( "b" ) ];
        assert!( !library.apply_catalog( &reordered ) );
        assert!( !rx.has_changed().unwrap() );
    }


    #[test]
    fn test_retagged_track_counts_as_change() {
        let library = library();
        library.apply_catalog( &[ track( "a" ) ] );

        let mut retagged = track( "a" );
        retagged.artist = Some( "Someone Else".into() );
        assert!( library.apply_catalog( &[ retagged ] ) );
    }


    #[test]
    fn test_track_sort_resorts_selected_playlist() {
        let library = library();
        library.apply_catalog( &[ track( "a" ), track( "b" ) ] );
        library.select_playlist( Some( Playlist::named( "mine", vec![ track( "a" ), track( "b" ) ] ) ) );

        library.set_track_sort( None, Some( SortOrder::Descending ) );

        assert_eq!( library.tracks(), [ track( "b" ), track( "a" ) ] );
        let selected = library.selected().get().unwrap();
        assert_eq!( selected.tracks, [ track( "b" ), track( "a" ) ] );
        assert_eq!( library.settings.track_sort(), ( TrackSort::Title, SortOrder::Descending ) );
    }


    #[test]
    fn test_find_by_uri_or_path() {
        let library = library();
        library.apply_catalog( &[ track( "a" ) ] );

        assert_eq!( library.find( "content://a" ), Some( track( "a" ) ) );
        assert_eq!( library.find( "/music/a.mp3" ), Some( track( "a" ) ) );
        assert_eq!( library.find( "/music/zzz.mp3" ), None );
    }


    #[test]
    fn test_rename_selected_only_matches_name() {
        let library = library();
        library.select_playlist( Some( Playlist::named( "old", Vec::new() ) ) );

        library.rename_selected( "other", "new" );
        assert_eq!( library.selected().get().unwrap().name.as_deref(), Some( "old" ) );

        library.rename_selected( "old", "new" );
        assert_eq!( library.selected().get().unwrap().name.as_deref(), Some( "new" ) );
    }
}
