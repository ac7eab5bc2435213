//! Text rendering for the shell.
//!
//! Plain functions from core state to printable strings. Nothing here
//! touches the controller.

use std::fmt::Write;

use lyra_core::metadata::{ ArtPhase, SearchPhase, TrackInfoState };
use lyra_core::{ Lyrics, LyricsBody, Metadata, PlaybackState, Playlist, SearchResult, Track };


/// Formats milliseconds as `M:SS`.
pub fn format_time( ms: u64 ) -> String {
    let secs = ms / 1000;
    format!( "{}:{:02}", secs / 60, secs % 60 )
}


/// One numbered track row. `n` is 0-based and printed 1-based.
pub fn track_line( n: usize, track: &Track ) -> String {
    let artist = track.artist.as_deref().unwrap_or( "Unknown artist" );
    format!( "{:>4}. {} - {} [{}]", n + 1, artist, track.display_title(), format_time( track.duration_ms ) )
}


pub fn track_list( tracks: &[Track] ) -> String {
    if tracks.is_empty() {
        return "  (no tracks)".to_string();
    }
    tracks.iter()
        .enumerate()
        .map( |( i, t )| track_line( i, t ) )
        .collect::<Vec<_>>()
        .join( "\n" )
}


/// Playlist names with their sizes.
pub fn playlist_list( playlists: &[Playlist] ) -> String {
    if playlists.is_empty() {
        return "  (none)".to_string();
    }
    playlists.iter()
        .map( |p| format!( "  {} ({} tracks)", p.name.as_deref().unwrap_or( "Unknown" ), p.len() ) )
        .collect::<Vec<_>>()
        .join( "\n" )
}


/// Status line: play state, track, position and mode.
pub fn now_playing( state: &PlaybackState ) -> String {
    match &state.current_track {
        Some( track ) => format!(
            "{} {} [{} / {}] ({})",
            if state.is_playing { ">" } else { "||" },
            track.display_title(),
            format_time( state.position_ms ),
            format_time( track.duration_ms ),
            state.playback_mode.name(),
        ),
        None => format!( "Nothing playing ({})", state.playback_mode.name() ),
    }
}


/// The queue, with the current entry marked.
pub fn queue( state: &PlaybackState ) -> String {
    let Some( playlist ) = &state.playlist else {
        return "Queue is empty".to_string();
    };

    let current = state.current_index();
    let mut out = format!( "Queue: {}\n", playlist.name.as_deref().unwrap_or( "(ad hoc)" ) );
    for ( i, track ) in playlist.tracks.iter().enumerate() {
        let marker = if Some( i ) == current { "*" } else { " " };
        let _ = writeln!( out, "{}{}", marker, track_line( i, track ) );
    }
    out.push_str( &now_playing( state ) );
    out
}


/// Lyrics, marking the synced line active at `position_ms`.
pub fn lyrics( lyrics: &Lyrics, position_ms: u64 ) -> String {
    match &lyrics.body {
        LyricsBody::Plain( text ) => text.clone(),
        LyricsBody::Synced( lines ) => {
            let active = lyrics.line_at( position_ms );
            lines.iter()
                .enumerate()
                .map( |( i, line )| {
                    let marker = if Some( i ) == active { ">" } else { " " };
                    format!( "{} [{}] {}", marker, format_time( line.time_ms ), line.text )
                })
                .collect::<Vec<_>>()
                .join( "\n" )
        }
    }
}


fn field( out: &mut String, label: &str, value: &Option<String> ) {
    let _ = writeln!( out, "  {:<13}{}", label, value.as_deref().unwrap_or( "-" ) );
}


pub fn metadata( metadata: &Metadata ) -> String {
    let mut out = String::new();
    field( &mut out, "Title", &metadata.title );
    field( &mut out, "Album", &metadata.album );
    field( &mut out, "Artist", &metadata.artist );
    field( &mut out, "Album artist", &metadata.album_artist );
    field( &mut out, "Genre", &metadata.genre );
    field( &mut out, "Year", &metadata.year );
    field( &mut out, "Track", &metadata.track_number );
    if let Some( art ) = &metadata.cover_art {
        let _ = writeln!( out, "  {:<13}{} bytes", "Cover art", art.len() );
    }
    out
}


pub fn search_results( results: &[SearchResult] ) -> String {
    if results.is_empty() {
        return "  (no results)".to_string();
    }
    results.iter()
        .enumerate()
        .map( |( i, r )| format!(
            "{:>4}. {} - {} ({})",
            i + 1,
            r.artist.as_deref().unwrap_or( "?" ),
            r.title.as_deref().unwrap_or( "?" ),
            r.album.as_deref().unwrap_or( "?" ),
        ))
        .collect::<Vec<_>>()
        .join( "\n" )
}


/// The track info sheet.
pub fn track_info( state: &TrackInfoState ) -> String {
    let Some( track ) = &state.track else {
        return "No track selected".to_string();
    };

    let mut out = format!( "{}\n", track.path.display() );
    field( &mut out, "Title", &track.title );
    field( &mut out, "Album", &track.album );
    field( &mut out, "Artist", &track.artist );
    field( &mut out, "Album artist", &track.album_artist );
    field( &mut out, "Genre", &track.genre );
    field( &mut out, "Year", &track.year );
    field( &mut out, "Track", &track.track_number );
    field( &mut out, "Bitrate", &track.bitrate );
    let _ = writeln!( out, "  {:<13}{}", "Duration", format_time( track.duration_ms ) );
    let _ = writeln!( out, "  {:<13}{}", "Cover art", if state.is_cover_art_editable { "editable" } else { "read-only" } );

    match state.search.phase {
        SearchPhase::Idle => {}
        SearchPhase::Searching => out.push_str( "Searching...\n" ),
        SearchPhase::Failed => out.push_str( "Search failed\n" ),
        SearchPhase::ResultsReady => {
            let _ = writeln!( out, "Results:\n{}", search_results( &state.search.results ) );
        }
    }

    if state.changes.art_phase == ArtPhase::FetchingArt {
        out.push_str( "Fetching cover art...\n" );
    }
    if state.changes.metadata != Metadata::default() {
        let _ = write!( out, "Pending changes:\n{}", metadata( &state.changes.metadata ) );
    }
    if state.show_risks_dialog {
        out.push_str( "Editing tags rewrites your files. Type /accept to continue.\n" );
    }
    out
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_time() {
        assert_eq!( format_time( 0 ), "0:00" );
        assert_eq!( format_time( 59_999 ), "0:59" );
        assert_eq!( format_time( 185_000 ), "3:05" );
    }


    #[test]
    fn test_track_line_is_one_based() {
        let track = Track {
            title: Some( "Song".into() ),
            artist: Some( "Band".into() ),
            duration_ms: 61_000,
            ..Default::default()
        };
        assert_eq!( track_line( 0, &track ), "   1. Band - Song [1:01]" );
    }


    #[test]
    fn test_synced_lyrics_mark_active_line() {
        let lyrics = Lyrics {
            uri: "content://1".into(),
            body: LyricsBody::Synced( vec![
                lyra_core::track::SyncedLine { time_ms: 0, text: "one".into() },
                lyra_core::track::SyncedLine { time_ms: 5_000, text: "two".into() },
            ]),
        };
        let text = super::lyrics( &lyrics, 6_000 );
        assert_eq!( text, "  [0:00] one\n> [0:05] two" );
    }
}
