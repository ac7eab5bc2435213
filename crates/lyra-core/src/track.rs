//! Library value types
//!
//! Tracks, playlists, tag bundles and lyrics. All of these are immutable
//! values: the catalog replaces them wholesale on resync, it never edits
//! one in place.

use std::path::{ Path, PathBuf };

use serde::{ Deserialize, Serialize };


/// A track known to the catalog.
///
/// Equality is a full field match, so a retagged file compares unequal to
/// its previous version even though the `uri` is unchanged.
#[derive( Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize )]
#[serde( default )]
pub struct Track {
    /// Stable identity of the track.
    pub uri: String,
    pub path: PathBuf,
    pub duration_ms: u64,
    pub size: u64,
    /// Last modification time, in unix seconds.
    pub date_modified: i64,
    pub cover_art_uri: Option<String>,

    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    pub bitrate: Option<String>,
}


impl Track {
    /// Returns the lowercase file extension, if any.
    pub fn format( &self ) -> Option<String> {
        self.path.extension()
            .and_then( |e| e.to_str() )
            .map( |e| e.to_lowercase() )
    }


    /// Returns the directory containing the file.
    pub fn folder( &self ) -> &Path {
        self.path.parent().unwrap_or_else( || Path::new( "" ) )
    }


    /// Title for display, falling back to the file name.
    pub fn display_title( &self ) -> String {
        match &self.title {
            Some( title ) => title.clone(),
            None => self.path.file_stem()
                .map( |s| s.to_string_lossy().into_owned() )
                .unwrap_or_else( || self.uri.clone() ),
        }
    }
}


/// An ordered list of tracks.
///
/// When a playlist is the active playback source its order is the queue
/// order. A playlist without a name is ad-hoc and never persisted.
#[derive( Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize )]
pub struct Playlist {
    pub name: Option<String>,
    pub tracks: Vec<Track>,
}


impl Playlist {
    /// Creates a named playlist.
    pub fn named( name: impl Into<String>, tracks: Vec<Track> ) -> Self {
        Self { name: Some( name.into() ), tracks }
    }


    /// Creates an unnamed playlist.
    pub fn ad_hoc( tracks: Vec<Track> ) -> Self {
        Self { name: None, tracks }
    }


    /// Index of the first entry equal to `track`.
    pub fn index_of( &self, track: &Track ) -> Option<usize> {
        self.tracks.iter().position( |t| t == track )
    }


    pub fn contains( &self, track: &Track ) -> bool {
        self.tracks.contains( track )
    }


    pub fn len( &self ) -> usize {
        self.tracks.len()
    }


    pub fn is_empty( &self ) -> bool {
        self.tracks.is_empty()
    }
}


/// Proposed replacement tags for a track.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub struct Metadata {
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    pub cover_art: Option<Vec<u8>>,
}


impl Metadata {
    /// Builds a tag bundle from a remote search result, without cover art.
    pub fn from_search_result( result: &SearchResult ) -> Self {
        Self {
            title: result.title.clone(),
            album: result.album.clone(),
            artist: result.artist.clone(),
            album_artist: result.album_artist.clone(),
            genre: result.genres.as_ref().map( |g| g.join( " / " ) ),
            year: result.year.clone(),
            track_number: result.track_number.clone(),
            cover_art: None,
        }
    }
}


/// A metadata candidate returned by a remote search.
#[derive( Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( default )]
pub struct SearchResult {
    /// Remote recording identifier.
    pub id: String,
    pub title: Option<String>,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub genres: Option<Vec<String>>,
    pub year: Option<String>,
    pub track_number: Option<String>,
    /// Remote release identifier, used to look up cover art.
    pub album_id: Option<String>,
}


/// A single time-tagged lyric line.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct SyncedLine {
    pub time_ms: u64,
    pub text: String,
}


/// Lyrics text, either time-tagged or plain.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
#[serde( rename_all = "snake_case" )]
pub enum LyricsBody {
    Synced( Vec<SyncedLine> ),
    Plain( String ),
}


/// Lyrics for one track, keyed by the track's URI.
#[derive( Debug, Clone, PartialEq, Eq, Serialize, Deserialize )]
pub struct Lyrics {
    pub uri: String,
    pub body: LyricsBody,
}


impl Lyrics {
    /// Index of the synced line active at `position_ms`.
    ///
    /// Plain lyrics, and positions before the first line, yield `None`.
    pub fn line_at( &self, position_ms: u64 ) -> Option<usize> {
        match &self.body {
            LyricsBody::Synced( lines ) => lines.iter()
                .rposition( |line| line.time_ms <= position_ms ),
            LyricsBody::Plain( _ ) => None,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_equality_is_full_field_match() {
        let a = Track { uri: "content://1".into(), title: Some( "A".into() ), ..Default::default() };
        let mut retagged = a.clone();
        retagged.title = Some( "B".into() );

        assert_ne!( a, retagged );
        assert_eq!( a, a.clone() );
    }


    #[test]
    fn test_format_is_lowercase_extension() {
        let track = Track { path: PathBuf::from( "/music/Song.FLAC" ), ..Default::default() };
        assert_eq!( track.format().as_deref(), Some( "flac" ) );
    }


    #[test]
    fn test_metadata_joins_genres() {
        let result = SearchResult {
            title: Some( "Song".into() ),
            genres: Some( vec![ "rock".into(), "indie".into() ] ),
            ..Default::default()
        };
        let metadata = Metadata::from_search_result( &result );
        assert_eq!( metadata.genre.as_deref(), Some( "rock / indie" ) );
        assert!( metadata.cover_art.is_none() );
    }


    #[test]
    fn test_synced_line_lookup() {
        let lyrics = Lyrics {
            uri: "content://1".into(),
            body: LyricsBody::Synced( vec![
                SyncedLine { time_ms: 1_000, text: "one".into() },
                SyncedLine { time_ms: 5_000, text: "two".into() },
            ]),
        };
        assert_eq!( lyrics.line_at( 500 ), None );
        assert_eq!( lyrics.line_at( 1_000 ), Some( 0 ) );
        assert_eq!( lyrics.line_at( 9_000 ), Some( 1 ) );
    }
}
