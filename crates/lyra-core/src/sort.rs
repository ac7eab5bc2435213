//! Track sorting and catalog grouping.
//!
//! Everything here is a pure function of its inputs. The library calls
//! these whenever the catalog or the sort settings change.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

use serde::{ Deserialize, Serialize };

use crate::command::CommandError;
use crate::track::{ Playlist, Track };


/// Key used to order track lists.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
pub enum TrackSort {
    #[default]
    Title,
    Album,
    Artist,
    AlbumArtist,
    Genre,
    Year,
    TrackNumber,
    Duration,
    DateModified,
    Size,
}


/// Direction of a sort.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}


/// Key used to order playlist collections.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
pub enum PlaylistSort {
    #[default]
    Name,
    TrackCount,
}


/// Catalog field a derived playlist collection is grouped by.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Hash )]
pub enum Grouping {
    Album,
    Artist,
    Genre,
    Folder,
}


impl FromStr for TrackSort {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "title" => Ok( TrackSort::Title ),
            "album" => Ok( TrackSort::Album ),
            "artist" => Ok( TrackSort::Artist ),
            "albumartist" | "album-artist" => Ok( TrackSort::AlbumArtist ),
            "genre" => Ok( TrackSort::Genre ),
            "year" => Ok( TrackSort::Year ),
            "track" | "number" => Ok( TrackSort::TrackNumber ),
            "duration" | "length" => Ok( TrackSort::Duration ),
            "date" | "modified" => Ok( TrackSort::DateModified ),
            "size" => Ok( TrackSort::Size ),
            _ => Err( CommandError::InvalidArgument( format!( "Unknown sort key: '{}'", s ) ) ),
        }
    }
}


impl FromStr for SortOrder {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok( SortOrder::Ascending ),
            "desc" | "descending" => Ok( SortOrder::Descending ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid sort order: '{}'. Use 'asc' or 'desc'", s )
            )),
        }
    }
}


impl FromStr for PlaylistSort {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok( PlaylistSort::Name ),
            "count" | "tracks" => Ok( PlaylistSort::TrackCount ),
            _ => Err( CommandError::InvalidArgument( format!( "Unknown playlist sort: '{}'", s ) ) ),
        }
    }
}


impl FromStr for Grouping {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "albums" | "album" => Ok( Grouping::Album ),
            "artists" | "artist" => Ok( Grouping::Artist ),
            "genres" | "genre" => Ok( Grouping::Genre ),
            "folders" | "folder" => Ok( Grouping::Folder ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid grouping: '{}'. Use 'albums', 'artists', 'genres', or 'folders'", s )
            )),
        }
    }
}


/// Case-insensitive comparison of optional text, missing values first.
fn compare_text( a: &Option<String>, b: &Option<String> ) -> Ordering {
    match ( a, b ) {
        ( Some( a ), Some( b ) ) => a.to_lowercase().cmp( &b.to_lowercase() ),
        _ => a.is_some().cmp( &b.is_some() ),
    }
}


/// Leading integer of a tag like "2004" or "3/12".
fn leading_number( value: &Option<String> ) -> Option<u64> {
    let value = value.as_deref()?.trim();
    let digits: String = value.chars().take_while( |c| c.is_ascii_digit() ).collect();
    digits.parse().ok()
}


fn compare( a: &Track, b: &Track, sort: TrackSort ) -> Ordering {
    match sort {
        TrackSort::Title => compare_text( &a.title, &b.title ),
        TrackSort::Album => compare_text( &a.album, &b.album ),
        TrackSort::Artist => compare_text( &a.artist, &b.artist ),
        TrackSort::AlbumArtist => compare_text( &a.album_artist, &b.album_artist ),
        TrackSort::Genre => compare_text( &a.genre, &b.genre ),
        TrackSort::Year => leading_number( &a.year ).cmp( &leading_number( &b.year ) ),
        TrackSort::TrackNumber => leading_number( &a.track_number ).cmp( &leading_number( &b.track_number ) ),
        TrackSort::Duration => a.duration_ms.cmp( &b.duration_ms ),
        TrackSort::DateModified => a.date_modified.cmp( &b.date_modified ),
        TrackSort::Size => a.size.cmp( &b.size ),
    }
}


/// Returns `tracks` ordered by `sort` in `order`. The sort is stable.
pub fn sorted_by( tracks: &[Track], sort: TrackSort, order: SortOrder ) -> Vec<Track> {
    let mut sorted = tracks.to_vec();
    sorted.sort_by( |a, b| {
        let ordering = compare( a, b, sort );
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    sorted
}


/// Returns `playlists` ordered by `sort` in `order`.
pub fn sorted_playlists( playlists: &[Playlist], sort: PlaylistSort, order: SortOrder ) -> Vec<Playlist> {
    let mut sorted = playlists.to_vec();
    sorted.sort_by( |a, b| {
        let ordering = match sort {
            PlaylistSort::Name => compare_text( &a.name, &b.name ),
            PlaylistSort::TrackCount => a.len().cmp( &b.len() ),
        };
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
    sorted
}


/// Groups `tracks` into one playlist per distinct key.
///
/// Keys are compared as exact strings. Groups appear in order of first
/// occurrence and keep the order of `tracks` inside each group. Folder
/// groups are named after the folder's last path segment.
pub fn group_by( tracks: &[Track], grouping: Grouping ) -> Vec<Playlist> {
    let mut index: HashMap<Option<String>, usize> = HashMap::new();
    let mut groups: Vec<( Option<String>, Vec<Track> )> = Vec::new();

    for track in tracks {
        let key = match grouping {
            Grouping::Album => track.album.clone(),
            Grouping::Artist => track.artist.clone(),
            Grouping::Genre => track.genre.clone(),
            Grouping::Folder => Some( track.folder().to_string_lossy().into_owned() ),
        };

        match index.get( &key ) {
            Some( &i ) => groups[ i ].1.push( track.clone() ),
            None => {
                index.insert( key.clone(), groups.len() );
                groups.push(( key, vec![ track.clone() ] ));
            }
        }
    }

    groups.into_iter()
        .map( |( key, tracks )| {
            let name = match grouping {
                Grouping::Folder => key.map( |k| {
                    k.rsplit( [ '/', '\\' ] ).next().unwrap_or( &k ).to_string()
                }),
                _ => key,
            };
            Playlist { name, tracks }
        })
        .collect()
}


#[cfg( test )]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::testing::track;


    fn titles( tracks: &[Track] ) -> Vec<String> {
        tracks.iter().map( |t| t.title.clone().unwrap_or_default() ).collect()
    }


    #[test]
    fn test_sort_by_title_is_case_insensitive() {
        let tracks = vec![ track( "beta" ), track( "Alpha" ), track( "gamma" ) ];
        let sorted = sorted_by( &tracks, TrackSort::Title, SortOrder::Ascending );
        assert_eq!( titles( &sorted ), [ "Alpha", "beta", "gamma" ] );

        let sorted = sorted_by( &tracks, TrackSort::Title, SortOrder::Descending );
        assert_eq!( titles( &sorted ), [ "gamma", "beta", "Alpha" ] );
    }


    #[test]
    fn test_missing_values_sort_first() {
        let mut untitled = track( "x" );
        untitled.title = None;
        let tracks = vec![ track( "a" ), untitled.clone() ];

        let sorted = sorted_by( &tracks, TrackSort::Title, SortOrder::Ascending );
        assert_eq!( sorted[ 0 ], untitled );
    }


    #[test]
    fn test_track_number_sorts_numerically() {
        let mut a = track( "a" );
        a.track_number = Some( "10/12".into() );
        let mut b = track( "b" );
        b.track_number = Some( "2".into() );

        let sorted = sorted_by( &[ a, b ], TrackSort::TrackNumber, SortOrder::Ascending );
        assert_eq!( titles( &sorted ), [ "b", "a" ] );
    }


    #[test]
    fn test_group_by_album_uses_exact_keys() {
        let mut a = track( "a" );
        a.album = Some( "Blue".into() );
        let mut b = track( "b" );
        b.album = Some( "blue".into() );
        let mut c = track( "c" );
        c.album = Some( "Blue".into() );

        let groups = group_by( &[ a, b, c ], Grouping::Album );
        assert_eq!( groups.len(), 2 );
        assert_eq!( groups[ 0 ].name.as_deref(), Some( "Blue" ) );
        assert_eq!( titles( &groups[ 0 ].tracks ), [ "a", "c" ] );
    }


    #[test]
    fn test_group_by_folder_names_last_segment() {
        let mut a = track( "a" );
        a.path = PathBuf::from( "/music/rock/a.mp3" );
        let mut b = track( "b" );
        b.path = PathBuf::from( "/music/jazz/b.mp3" );
        let mut c = track( "c" );
        c.path = PathBuf::from( "/other/rock/c.mp3" );

        let groups = group_by( &[ a, b, c ], Grouping::Folder );
        let names: Vec<_> = groups.iter().map( |g| g.name.clone().unwrap() ).collect();
        assert_eq!( names, [ "rock", "jazz", "rock" ] );
    }


    #[test]
    fn test_sorted_playlists_by_count() {
        let small = Playlist::named( "small", vec![ track( "a" ) ] );
        let large = Playlist::named( "large", vec![ track( "b" ), track( "c" ) ] );

        let sorted = sorted_playlists( &[ large.clone(), small.clone() ], PlaylistSort::TrackCount, SortOrder::Ascending );
        assert_eq!( sorted, [ small, large ] );
    }


    #[test]
    fn test_parse_sort_arguments() {
        assert_eq!( "Artist".parse::<TrackSort>().unwrap(), TrackSort::Artist );
        assert_eq!( "desc".parse::<SortOrder>().unwrap(), SortOrder::Descending );
        assert!( "sideways".parse::<SortOrder>().is_err() );
    }
}
