//! User playlists
//!
//! Stored playlists only remember file paths. They are resolved against
//! the current catalog whenever they are listed, so entries whose files
//! have disappeared simply drop out.

use std::path::{ Path, PathBuf };
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::library::Library;
use crate::notice::{ Notice, NoticeHub };
use crate::settings::SettingsHandle;
use crate::sort::sorted_playlists;
use crate::track::{ Playlist, Track };


/// A playlist as persisted: a name and the paths of its entries.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct StoredPlaylist {
    pub name: String,
    pub paths: Vec<PathBuf>,
}


/// Persistence for user playlists.
#[async_trait]
pub trait PlaylistStore: Send + Sync {
    async fn list( &self ) -> Result<Vec<StoredPlaylist>, StoreError>;

    async fn insert( &self, name: &str, tracks: &[Track] ) -> Result<(), StoreError>;

    async fn rename( &self, from: &str, to: &str ) -> Result<(), StoreError>;

    async fn delete( &self, name: &str ) -> Result<(), StoreError>;

    async fn update_tracks( &self, name: &str, tracks: &[Track] ) -> Result<(), StoreError>;
}


/// Playlist store keeping one `<name>.m3u` file per playlist.
#[derive( Debug, Clone )]
pub struct M3uPlaylistStore {
    dir: PathBuf,
}


impl M3uPlaylistStore {
    pub fn new( dir: impl Into<PathBuf> ) -> Self {
        Self { dir: dir.into() }
    }


    /// Store at the default location, `<data dir>/lyra/playlists`.
    pub fn open_default() -> Result<Self, StoreError> {
        let dir = dirs::data_local_dir().ok_or( StoreError::NoDataDir )?;
        Ok( Self::new( dir.join( "lyra" ).join( "playlists" ) ) )
    }


    pub fn dir( &self ) -> &Path {
        &self.dir
    }


    fn file_for( &self, name: &str ) -> Result<PathBuf, StoreError> {
        let invalid = name.trim().is_empty()
            || name.starts_with( '.' )
            || name.contains( [ '/', '\\' ] );
        if invalid {
            return Err( StoreError::InvalidName( name.to_string() ) );
        }
        Ok( self.dir.join( format!( "{}.m3u", name ) ) )
    }


    async fn write( &self, name: &str, tracks: &[Track] ) -> Result<(), StoreError> {
        let path = self.file_for( name )?;
        tokio::fs::create_dir_all( &self.dir ).await?;
        tokio::fs::write( &path, to_m3u( tracks ) ).await?;
        Ok(())
    }
}


/// Renders tracks as an extended M3U document.
fn to_m3u( tracks: &[Track] ) -> String {
    let mut out = String::from( "#EXTM3U\n" );
    for track in tracks {
        let label = match &track.artist {
            Some( artist ) => format!( "{} - {}", artist, track.display_title() ),
            None => track.display_title(),
        };
        out.push_str( &format!( "#EXTINF:{},{}\n", track.duration_ms / 1000, label ) );
        out.push_str( &format!( "{}\n", track.path.display() ) );
    }
    out
}


/// Extracts entry paths from an M3U document.
fn parse_m3u( contents: &str ) -> Vec<PathBuf> {
    contents.lines()
        .map( str::trim )
        // Skip empty lines and comments
        .filter( |line| !line.is_empty() && !line.starts_with( '#' ) )
        .map( PathBuf::from )
        .collect()
}


#[async_trait]
impl PlaylistStore for M3uPlaylistStore {
    async fn list( &self ) -> Result<Vec<StoredPlaylist>, StoreError> {
        let mut entries = match tokio::fs::read_dir( &self.dir ).await {
            Ok( entries ) => entries,
            Err( e ) if e.kind() == std::io::ErrorKind::NotFound => return Ok( Vec::new() ),
            Err( e ) => return Err( e.into() ),
        };

        let mut playlists = Vec::new();
        while let Some( entry ) = entries.next_entry().await? {
            let path = entry.path();
            let is_m3u = path.extension()
                .map( |e| e.eq_ignore_ascii_case( "m3u" ) )
                .unwrap_or( false );
            if !is_m3u {
                continue;
            }
            let Some( name ) = path.file_stem().and_then( |s| s.to_str() ) else { continue };

            let contents = tokio::fs::read_to_string( &path ).await?;
            playlists.push( StoredPlaylist {
                name: name.to_string(),
                paths: parse_m3u( &contents ),
            });
        }

        playlists.sort_by( |a, b| a.name.cmp( &b.name ) );
        Ok( playlists )
    }


    async fn insert( &self, name: &str, tracks: &[Track] ) -> Result<(), StoreError> {
        self.write( name, tracks ).await
    }


    async fn rename( &self, from: &str, to: &str ) -> Result<(), StoreError> {
        let from = self.file_for( from )?;
        let to = self.file_for( to )?;
        tokio::fs::rename( from, to ).await?;
        Ok(())
    }


    async fn delete( &self, name: &str ) -> Result<(), StoreError> {
        match tokio::fs::remove_file( self.file_for( name )? ).await {
            Err( e ) if e.kind() != std::io::ErrorKind::NotFound => Err( e.into() ),
            _ => Ok(()),
        }
    }


    async fn update_tracks( &self, name: &str, tracks: &[Track] ) -> Result<(), StoreError> {
        self.write( name, tracks ).await
    }
}


/// User playlist operations.
///
/// Keeps the selected-playlist view in step with the store.
pub struct PlaylistManager {
    store: Arc<dyn PlaylistStore>,
    library: Arc<Library>,
    settings: Arc<SettingsHandle>,
    notices: NoticeHub,
}


impl PlaylistManager {
    pub fn new(
        store: Arc<dyn PlaylistStore>,
        library: Arc<Library>,
        settings: Arc<SettingsHandle>,
        notices: NoticeHub,
    ) -> Self {
        Self { store, library, settings, notices }
    }


    async fn stored( &self ) -> Vec<StoredPlaylist> {
        self.store.list().await.unwrap_or_else( |e| {
            tracing::warn!( "Failed to list playlists: {}", e );
            Vec::new()
        })
    }


    /// Stored playlists resolved against the catalog, in playlist-sort order.
    pub async fn playlists( &self ) -> Vec<Playlist> {
        let catalog = self.library.tracks();
        let resolved: Vec<Playlist> = self.stored().await.into_iter()
            .map( |stored| {
                let tracks = stored.paths.iter()
                    .filter_map( |path| catalog.iter().find( |t| &t.path == path ).cloned() )
                    .collect();
                Playlist::named( stored.name, tracks )
            })
            .collect();

        let ( sort, order ) = self.settings.playlist_sort();
        sorted_playlists( &resolved, sort, order )
    }


    /// Resolves a single playlist by name.
    pub async fn get( &self, name: &str ) -> Option<Playlist> {
        self.playlists().await.into_iter()
            .find( |p| p.name.as_deref() == Some( name ) )
    }


    async fn name_taken( &self, name: &str ) -> bool {
        self.stored().await.iter().any( |p| p.name == name )
    }


    pub async fn create( &self, name: &str ) {
        if self.name_taken( name ).await {
            tracing::debug!( "Playlist {:?} already exists", name );
            return;
        }
        match self.store.insert( name, &[] ).await {
            Ok(()) => tracing::info!( "Created playlist {:?}", name ),
            Err( e ) => tracing::warn!( "Failed to create playlist {:?}: {}", name, e ),
        }
    }


    pub async fn rename( &self, playlist: &Playlist, name: &str ) {
        let Some( from ) = playlist.name.as_deref() else { return };
        if self.name_taken( name ).await {
            tracing::debug!( "Playlist {:?} already exists", name );
            return;
        }
        if let Err( e ) = self.store.rename( from, name ).await {
            tracing::warn!( "Failed to rename playlist {:?}: {}", from, e );
            return;
        }
        self.library.rename_selected( from, name );
    }


    pub async fn delete( &self, playlist: &Playlist ) {
        let Some( name ) = playlist.name.as_deref() else { return };
        if let Err( e ) = self.store.delete( name ).await {
            tracing::warn!( "Failed to delete playlist {:?}: {}", name, e );
        }
        self.library.select_playlist( None );
    }


    pub async fn add_track( &self, playlist: &Playlist, track: &Track ) {
        let Some( name ) = playlist.name.as_deref() else { return };
        if playlist.contains( track ) {
            self.notices.send( Notice::TrackAlreadyOnPlaylist );
            return;
        }

        let mut tracks = playlist.tracks.clone();
        tracks.push( track.clone() );
        self.save_tracks( name, &tracks ).await;
    }


    pub async fn remove_track( &self, playlist: &Playlist, track: &Track ) {
        let Some( name ) = playlist.name.as_deref() else { return };
        let mut tracks = playlist.tracks.clone();
        if let Some( index ) = playlist.index_of( track ) {
            tracks.remove( index );
        }
        self.save_tracks( name, &tracks ).await;
    }


    /// Replaces the order of the playlist's tracks.
    pub async fn reorder( &self, playlist: &Playlist, tracks: Vec<Track> ) {
        let Some( name ) = playlist.name.as_deref() else { return };
        if playlist.tracks == tracks {
            return;
        }
        self.save_tracks( name, &tracks ).await;
    }


    async fn save_tracks( &self, name: &str, tracks: &[Track] ) {
        if let Err( e ) = self.store.update_tracks( name, tracks ).await {
            tracing::warn!( "Failed to save playlist {:?}: {}", name, e );
        }
        self.library.update_selected_tracks( name, tracks );
    }
}


#[cfg( test )]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::settings::Settings;
    use crate::sort::{ PlaylistSort, SortOrder };
    use crate::testing::track;


    struct Fixture {
        _dir: TempDir,
        store: Arc<M3uPlaylistStore>,
        library: Arc<Library>,
        manager: PlaylistManager,
        notices: NoticeHub,
    }


    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new( M3uPlaylistStore::new( dir.path().join( "playlists" ) ) );
        let settings = Arc::new( SettingsHandle::in_memory( Settings::default() ) );
        let library = Arc::new( Library::new( settings.clone() ) );
        library.apply_catalog( &[ track( "a" ), track( "b" ), track( "c" ) ] );
        let notices = NoticeHub::new();
        let manager = PlaylistManager::new( store.clone(), library.clone(), settings, notices.clone() );
        Fixture { _dir: dir, store, library, manager, notices }
    }


    #[test]
    fn test_m3u_round_trip_keeps_paths() {
        let doc = to_m3u( &[ track( "a" ), track( "b" ) ] );
        assert!( doc.starts_with( "#EXTM3U\n#EXTINF:180,Artist - a\n/music/a.mp3\n" ) );
        assert_eq!( parse_m3u( &doc ), [ PathBuf::from( "/music/a.mp3" ), PathBuf::from( "/music/b.mp3" ) ] );
    }


    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let f = fixture();
        let result = f.store.insert( "../escape", &[] ).await;
        assert!( matches!( result, Err( StoreError::InvalidName( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_create_is_noop_for_duplicate_name() {
        let f = fixture();
        f.manager.create( "mix" ).await;
        let mix = f.manager.get( "mix" ).await.unwrap();
        f.manager.add_track( &mix, &track( "a" ) ).await;

        f.manager.create( "mix" ).await;
        assert_eq!( f.manager.get( "mix" ).await.unwrap().tracks, [ track( "a" ) ] );
    }


    #[tokio::test]
    async fn test_add_existing_track_notifies() {
        let f = fixture();
        let mut rx = f.notices.subscribe();
        f.manager.create( "mix" ).await;
        f.manager.add_track( &f.manager.get( "mix" ).await.unwrap(), &track( "a" ) ).await;

        let mix = f.manager.get( "mix" ).await.unwrap();
        f.manager.add_track( &mix, &track( "a" ) ).await;

        assert_eq!( rx.try_recv().unwrap(), Notice::TrackAlreadyOnPlaylist );
        assert_eq!( f.manager.get( "mix" ).await.unwrap().len(), 1 );
    }


    #[tokio::test]
    async fn test_missing_files_drop_out() {
        let f = fixture();
        f.store.insert( "mix", &[ track( "a" ), track( "gone" ), track( "c" ) ] ).await.unwrap();

        let mix = f.manager.get( "mix" ).await.unwrap();
        assert_eq!( mix.tracks, [ track( "a" ), track( "c" ) ] );
    }


    #[tokio::test]
    async fn test_rename_updates_selection_and_refuses_taken_name() {
        let f = fixture();
        f.manager.create( "one" ).await;
        f.manager.create( "two" ).await;
        let one = f.manager.get( "one" ).await.unwrap();
        f.library.select_playlist( Some( one.clone() ) );

        f.manager.rename( &one, "two" ).await;
        assert!( f.manager.get( "one" ).await.is_some() );

        f.manager.rename( &one, "three" ).await;
        assert!( f.manager.get( "one" ).await.is_none() );
        assert!( f.manager.get( "three" ).await.is_some() );
        assert_eq!( f.library.selected().get().unwrap().name.as_deref(), Some( "three" ) );
    }


    #[tokio::test]
    async fn test_remove_and_reorder_update_selection() {
        let f = fixture();
        f.store.insert( "mix", &[ track( "a" ), track( "b" ), track( "c" ) ] ).await.unwrap();
        let mix = f.manager.get( "mix" ).await.unwrap();
        f.library.select_playlist( Some( mix.clone() ) );

        f.manager.remove_track( &mix, &track( "b" ) ).await;
        assert_eq!( f.library.selected().get().unwrap().tracks, [ track( "a" ), track( "c" ) ] );

        let mix = f.manager.get( "mix" ).await.unwrap();
        f.manager.reorder( &mix, vec![ track( "c" ), track( "a" ) ] ).await;
        assert_eq!( f.manager.get( "mix" ).await.unwrap().tracks, [ track( "c" ), track( "a" ) ] );
        assert_eq!( f.library.selected().get().unwrap().tracks, [ track( "c" ), track( "a" ) ] );
    }


    #[tokio::test]
    async fn test_delete_clears_selection() {
        let f = fixture();
        f.manager.create( "mix" ).await;
        let mix = f.manager.get( "mix" ).await.unwrap();
        f.library.select_playlist( Some( mix.clone() ) );

        f.manager.delete( &mix ).await;
        assert!( f.manager.playlists().await.is_empty() );
        assert!( f.library.selected().get().is_none() );
    }


    #[tokio::test]
    async fn test_playlists_follow_playlist_sort() {
        let f = fixture();
        f.store.insert( "big", &[ track( "a" ), track( "b" ) ] ).await.unwrap();
        f.store.insert( "small", &[ track( "c" ) ] ).await.unwrap();
        f.library.set_playlist_sort( Some( PlaylistSort::TrackCount ), Some( SortOrder::Ascending ) );

        let names: Vec<_> = f.manager.playlists().await.into_iter()
            .map( |p| p.name.unwrap() )
            .collect();
        assert_eq!( names, [ "small", "big" ] );
    }
}
