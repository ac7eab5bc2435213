//! Slash command parsing.
//!
//! Commands are typed into the shell without the leading `/`. Tracks are
//! named either by their number in the sorted catalog listing or by URI or
//! file path; queue positions are the numbers shown by `/queue`. Both are
//! 1-based on input and 0-based once parsed.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::sort::{ Grouping, PlaylistSort, SortOrder, TrackSort };


/// Errors that can occur during command parsing or execution.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),

    #[error( "Execution failed: {0}" )]
    ExecutionFailed( String ),
}


/// A track named on the command line.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum TrackRef {
    /// Index into the sorted catalog.
    Number( usize ),

    /// URI or file path.
    Location( String ),
}


impl FromStr for TrackRef {
    type Err = CommandError;

    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err( CommandError::MissingArgument( "track".into() ) );
        }
        match s.parse::<usize>() {
            Ok( n ) => Ok( TrackRef::Number( position( n )? ) ),
            Err( _ ) => Ok( TrackRef::Location( s.to_string() ) ),
        }
    }
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Playback commands
    Play { track: Option<TrackRef> },
    Open { uri: String },
    Pause,
    Next,
    Prev,
    Seek { position: Duration },
    Mode,
    Stop,
    Lyrics,

    // Queue commands
    Queue,
    Remove { index: usize },
    Move { from: usize, to: usize },
    PlayNext { track: TrackRef },
    Enqueue { track: TrackRef },
    SortQueue { sort: TrackSort, order: SortOrder },

    // Library commands
    List { grouping: Option<Grouping> },
    Sort { sort: TrackSort, order: Option<SortOrder> },
    SortPlaylists { sort: PlaylistSort, order: Option<SortOrder> },

    // Playlist commands
    Playlists,
    Show { name: String },
    Create { name: String },
    Rename { from: String, to: String },
    Delete { name: String },
    AddTo { name: String, track: TrackRef },
    RemoveFrom { name: String, track: TrackRef },

    // Track info commands
    Info { track: Option<TrackRef> },
    Search { query: String },
    Pick { index: usize },
    AcceptRisks,
    MatchDuration,
    Apply,
    Close,

    Help,
    Quit,
}


/// Converts a 1-based number typed by the user to an index.
fn position( n: usize ) -> Result<usize, CommandError> {
    n.checked_sub( 1 )
        .ok_or_else( || CommandError::InvalidArgument( "Positions start at 1".into() ) )
}


fn parse_position( s: &str ) -> Result<usize, CommandError> {
    let n: usize = s.parse()
        .map_err( |_| CommandError::InvalidArgument( format!( "Invalid position: {}", s ) ) )?;
    position( n )
}


/// Splits `args` into a first word and the remaining text.
fn split_first( args: &str ) -> ( &str, Option<&str> ) {
    match args.split_once( ' ' ) {
        Some(( first, rest )) => ( first, Some( rest.trim() ).filter( |r| !r.is_empty() ) ),
        None => ( args, None ),
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    ///
    /// @param input - The command string to parse
    ///
    /// @returns The parsed command or an error
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        let required = |what: &str| args.ok_or_else( || CommandError::MissingArgument( what.into() ) );

        match cmd.as_str() {
            // Playback commands
            "play" | "p" => {
                let track = args.map( str::parse ).transpose()?;
                Ok( Command::Play { track } )
            }
            "open" | "o" => Ok( Command::Open { uri: required( "uri" )?.to_string() } ),
            "pause" | "pa" => Ok( Command::Pause ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let position = parse_time( required( "time position" )? )?;
                Ok( Command::Seek { position } )
            }
            "mode" | "m" | "repeat" | "shuffle" => Ok( Command::Mode ),
            "stop" | "st" | "clear" => Ok( Command::Stop ),
            "lyrics" | "ly" => Ok( Command::Lyrics ),

            // Queue commands
            "queue" | "qu" => Ok( Command::Queue ),
            "remove" | "rm" => Ok( Command::Remove { index: parse_position( required( "queue position" )? )? } ),
            "move" | "mv" => {
                let ( from, to ) = split_first( required( "queue positions" )? );
                let to = to.ok_or_else( || CommandError::MissingArgument( "target position".into() ) )?;
                Ok( Command::Move { from: parse_position( from )?, to: parse_position( to )? } )
            }
            "playnext" | "pn" => Ok( Command::PlayNext { track: required( "track" )?.parse()? } ),
            "enqueue" | "eq" => Ok( Command::Enqueue { track: required( "track" )?.parse()? } ),
            "sortqueue" | "sq" => {
                let ( sort, order ) = split_first( required( "sort key" )? );
                let order = order.map( str::parse ).transpose()?.unwrap_or_default();
                Ok( Command::SortQueue { sort: sort.parse()?, order } )
            }

            // Library commands
            "list" | "ls" => {
                let grouping = args.map( str::parse ).transpose()?;
                Ok( Command::List { grouping } )
            }
            "sort" | "so" => {
                let ( sort, order ) = split_first( required( "sort key" )? );
                let order = order.map( str::parse ).transpose()?;
                Ok( Command::Sort { sort: sort.parse()?, order } )
            }
            "sortpl" | "sp" => {
                let ( sort, order ) = split_first( required( "playlist sort key" )? );
                let order = order.map( str::parse ).transpose()?;
                Ok( Command::SortPlaylists { sort: sort.parse()?, order } )
            }

            // Playlist commands
            "playlists" | "pls" => Ok( Command::Playlists ),
            "show" => Ok( Command::Show { name: required( "playlist name" )?.to_string() } ),
            "create" | "new" => Ok( Command::Create { name: required( "playlist name" )?.to_string() } ),
            "rename" => {
                let ( from, to ) = split_first( required( "playlist name" )? );
                let to = to.ok_or_else( || CommandError::MissingArgument( "new name".into() ) )?;
                Ok( Command::Rename { from: from.to_string(), to: to.to_string() } )
            }
            "delete" | "del" => Ok( Command::Delete { name: required( "playlist name" )?.to_string() } ),
            "addto" | "add" => {
                let ( name, track ) = split_first( required( "playlist name" )? );
                let track = track.ok_or_else( || CommandError::MissingArgument( "track".into() ) )?;
                Ok( Command::AddTo { name: name.to_string(), track: track.parse()? } )
            }
            "removefrom" | "drop" => {
                let ( name, track ) = split_first( required( "playlist name" )? );
                let track = track.ok_or_else( || CommandError::MissingArgument( "track".into() ) )?;
                Ok( Command::RemoveFrom { name: name.to_string(), track: track.parse()? } )
            }

            // Track info commands
            "info" | "i" => {
                let track = args.map( str::parse ).transpose()?;
                Ok( Command::Info { track } )
            }
            "search" | "find" | "?" => Ok( Command::Search { query: required( "search term" )?.to_string() } ),
            "pick" => Ok( Command::Pick { index: parse_position( required( "result number" )? )? } ),
            "accept" => Ok( Command::AcceptRisks ),
            "matchdur" | "md" => Ok( Command::MatchDuration ),
            "apply" | "write" => Ok( Command::Apply ),
            "close" => Ok( Command::Close ),

            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }


    /// Returns a brief description of the command for help text.
    pub fn description( &self ) -> &'static str {
        match self {
            Command::Play { .. } => "Play a track, or resume",
            Command::Open { .. } => "Open a file or URI",
            Command::Pause => "Pause playback",
            Command::Next => "Next track",
            Command::Prev => "Previous track",
            Command::Seek { .. } => "Seek to position",
            Command::Mode => "Cycle playback mode",
            Command::Stop => "Stop and clear the queue",
            Command::Lyrics => "Toggle the lyrics panel",
            Command::Queue => "Show the queue",
            Command::Remove { .. } => "Remove from the queue",
            Command::Move { .. } => "Move within the queue",
            Command::PlayNext { .. } => "Play a track next",
            Command::Enqueue { .. } => "Add a track to the end of the queue",
            Command::SortQueue { .. } => "Sort the queue",
            Command::List { .. } => "List tracks or groups",
            Command::Sort { .. } => "Set the library sort",
            Command::SortPlaylists { .. } => "Set the playlist sort",
            Command::Playlists => "List playlists",
            Command::Show { .. } => "Open a playlist",
            Command::Create { .. } => "Create a playlist",
            Command::Rename { .. } => "Rename a playlist",
            Command::Delete { .. } => "Delete a playlist",
            Command::AddTo { .. } => "Add a track to a playlist",
            Command::RemoveFrom { .. } => "Remove a track from a playlist",
            Command::Info { .. } => "Show track info",
            Command::Search { .. } => "Search metadata",
            Command::Pick { .. } => "Use a search result",
            Command::AcceptRisks => "Accept metadata editing risks",
            Command::MatchDuration => "Toggle duration matching",
            Command::Apply => "Write the pending tags",
            Command::Close => "Close track info",
            Command::Help => "Show help",
            Command::Quit => "Quit application",
        }
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
///
/// @param s - Time string in format "MM:SS", "M:SS", or just seconds
///
/// @returns Duration or error
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        if seconds >= 60 {
            return Err( CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) );
        }
        let total = minutes.checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( Duration::from_secs( total ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Playback Commands:
  /play [track]          Play a track from the library, or resume
  /open <uri>            Open a file or URI
  /pause                 Pause playback
  /next, /prev           Skip forward or back
  /seek <time>           Seek to position (e.g., 1:30)
  /mode                  Cycle repeat / repeat one / shuffle
  /stop                  Stop and clear the queue
  /lyrics                Toggle the lyrics panel

Queue Commands:
  /queue                 Show the queue
  /remove <n>            Remove entry n
  /move <from> <to>      Move an entry
  /playnext <track>      Play a track after the current one
  /enqueue <track>       Add a track to the end
  /sortqueue <key> [asc|desc]

Library Commands:
  /list [albums|artists|genres|folders]
  /sort <key> [asc|desc] Keys: title album artist albumartist genre
                         year track duration modified size
  /sortpl <name|count> [asc|desc]

Playlist Commands:
  /playlists             List playlists
  /show <name>           Open a playlist
  /create <name>         Create a playlist
  /rename <name> <new>   Rename a playlist
  /delete <name>         Delete a playlist
  /addto <name> <track>  Add a track
  /drop <name> <track>   Remove a track

Track Info Commands:
  /info [track]          Show track info (default: current)
  /search <query>        Search metadata
  /pick <n>              Use search result n
  /accept                Accept the risks of editing tags
  /matchdur              Toggle duration matching
  /apply                 Write the pending tags
  /close                 Close track info

Other Commands:
  /help                  Show this help
  /quit                  Exit lyra

Tracks are given by their number in /list or by path."#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_play_number() {
        let cmd = Command::parse( "play 3" ).unwrap();
        assert_eq!( cmd, Command::Play { track: Some( TrackRef::Number( 2 ) ) } );
    }


    #[test]
    fn test_parse_play_resume() {
        let cmd = Command::parse( "p" ).unwrap();
        assert_eq!( cmd, Command::Play { track: None } );
    }


    #[test]
    fn test_parse_track_path() {
        let cmd = Command::parse( "enqueue /music/My Song.mp3" ).unwrap();
        assert_eq!( cmd, Command::Enqueue { track: TrackRef::Location( "/music/My Song.mp3".into() ) } );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "seek 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_seek_rejects_bad_seconds() {
        let result = Command::parse( "seek 1:75" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek_rejects_overflowing_minutes() {
        let result = Command::parse( "seek 999999999999999999:00" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_move() {
        let cmd = Command::parse( "mv 1 4" ).unwrap();
        assert_eq!( cmd, Command::Move { from: 0, to: 3 } );
    }


    #[test]
    fn test_parse_zero_position() {
        let result = Command::parse( "remove 0" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_sort_with_order() {
        let cmd = Command::parse( "sort year desc" ).unwrap();
        assert_eq!( cmd, Command::Sort { sort: TrackSort::Year, order: Some( SortOrder::Descending ) } );
    }


    #[test]
    fn test_parse_sortqueue_defaults_ascending() {
        let cmd = Command::parse( "sq artist" ).unwrap();
        assert_eq!( cmd, Command::SortQueue { sort: TrackSort::Artist, order: SortOrder::Ascending } );
    }


    #[test]
    fn test_parse_list_grouping() {
        assert_eq!( Command::parse( "ls genres" ).unwrap(), Command::List { grouping: Some( Grouping::Genre ) } );
        assert!( matches!( Command::parse( "ls moods" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_playlist_sort() {
        let cmd = Command::parse( "sortpl count" ).unwrap();
        assert_eq!( cmd, Command::SortPlaylists { sort: PlaylistSort::TrackCount, order: None } );
    }


    #[test]
    fn test_parse_addto() {
        let cmd = Command::parse( "addto mix 2" ).unwrap();
        assert_eq!( cmd, Command::AddTo { name: "mix".into(), track: TrackRef::Number( 1 ) } );
    }


    #[test]
    fn test_parse_rename_needs_both_names() {
        let result = Command::parse( "rename mix" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        let result = Command::parse( "playnext" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
