//! Lyra CLI - music library player shell

mod cli;
mod offline;
mod settings;
mod view;

use std::sync::Arc;

use anyhow::{ anyhow, Context, Result };
use clap::Parser;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tracing_subscriber::EnvFilter;

use cli::Args;
use offline::{ OfflineLyrics, OfflineMetadata };
use settings::FileSettings;

use lyra_core::{
    catalog::ManifestCatalog,
    command::{ self, TrackRef },
    lyrics::LyricsCache,
    playlist::M3uPlaylistStore,
    queue::MemoryEngine,
    session::JsonSessionStore,
    Collaborators, Command, CommandError, Controller, Playlist, Track, UiEvent,
};


/// Shell state.
struct Shell {
    controller: Arc<Controller>,
    should_quit: bool,
}


impl Shell {
    fn new( controller: Arc<Controller> ) -> Self {
        Self { controller, should_quit: false }
    }


    async fn execute_command( &mut self, input: &str ) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }

        match Command::parse( input.strip_prefix( '/' ).unwrap_or( input ) ) {
            Ok( cmd ) => {
                if let Err( e ) = self.run_command( cmd ).await {
                    println!( "Error: {}", e );
                }
            }
            Err( e ) => println!( "{}", e ),
        }
    }


    /// Resolves a track named on the command line against the catalog.
    fn resolve( &self, track: &TrackRef ) -> Result<Track> {
        let library = self.controller.library();
        let found = match track {
            TrackRef::Number( i ) => library.tracks().get( *i ).cloned(),
            TrackRef::Location( location ) => library.find( location ),
        };
        found.ok_or_else( || CommandError::ExecutionFailed( format!( "No such track: {:?}", track ) ).into() )
    }


    async fn playlist( &self, name: &str ) -> Result<Playlist> {
        self.controller.playlists().get( name ).await
            .ok_or_else( || anyhow!( CommandError::ExecutionFailed( format!( "No playlist named {:?}", name ) ) ) )
    }


    async fn run_command( &mut self, cmd: Command ) -> Result<()> {
        let controller = self.controller.clone();
        let player = controller.player();
        let library = controller.library();
        let metadata = controller.metadata();
        let playlists = controller.playlists();

        match cmd {
            // Playback
            Command::Play { track: None } => controller.dispatch( UiEvent::Resume ),
            Command::Play { track: Some( track ) } => {
                let track = self.resolve( &track )?;
                // Play from the open playlist when it has the track
                let playlist = library.selected().get()
                    .filter( |p| p.contains( &track ) )
                    .unwrap_or_else( || Playlist::ad_hoc( library.tracks() ) );
                controller.dispatch( UiEvent::Open { track, playlist } );
            }
            Command::Open { uri } => {
                if !controller.try_open_uri( uri ) {
                    println!( "An open request is already pending" );
                }
            }
            Command::Pause => controller.dispatch( UiEvent::Pause ),
            Command::Next => controller.dispatch( UiEvent::SeekNext ),
            Command::Prev => controller.dispatch( UiEvent::SeekPrevious ),
            Command::Seek { position } => {
                controller.dispatch( UiEvent::SeekTo( position.as_millis() as u64 ) );
            }
            Command::Mode => {
                controller.dispatch( UiEvent::CyclePlaybackMode );
                println!( "Mode: {}", player.snapshot().playback_mode.name() );
            }
            Command::Stop => controller.dispatch( UiEvent::ClearPlayback ),
            Command::Lyrics => {
                let open = !player.snapshot().is_lyrics_expanded;
                controller.dispatch( UiEvent::SetLyricsExpanded( open ) );
                println!( "Lyrics {}", if open { "on" } else { "off" } );
            }

            // Queue
            Command::Queue => println!( "{}", view::queue( &player.snapshot() ) ),
            Command::Remove { index } => controller.dispatch( UiEvent::RemoveFromQueue( index ) ),
            Command::Move { from, to } => controller.dispatch( UiEvent::ReorderQueue { from, to } ),
            Command::PlayNext { track } => {
                let track = self.resolve( &track )?;
                controller.dispatch( UiEvent::PlayNext( track ) );
            }
            Command::Enqueue { track } => {
                let track = self.resolve( &track )?;
                controller.dispatch( UiEvent::Enqueue( track ) );
            }
            Command::SortQueue { sort, order } => controller.dispatch( UiEvent::SortQueue { sort, order } ),

            // Library
            Command::List { grouping: None } => println!( "{}", view::track_list( &library.tracks() ) ),
            Command::List { grouping: Some( grouping ) } => {
                println!( "{}", view::playlist_list( &library.groups( grouping ) ) );
            }
            Command::Sort { sort, order } => {
                controller.dispatch( UiEvent::SetTrackSort { sort: Some( sort ), order } );
            }
            Command::SortPlaylists { sort, order } => {
                controller.dispatch( UiEvent::SetPlaylistSort { sort: Some( sort ), order } );
            }

            // Playlists. Awaited directly so the next command sees the result.
            Command::Playlists => println!( "{}", view::playlist_list( &playlists.playlists().await ) ),
            Command::Show { name } => {
                let playlist = self.playlist( &name ).await?;
                println!( "{}", view::track_list( &playlist.tracks ) );
                controller.dispatch( UiEvent::SelectPlaylist( Some( playlist ) ) );
            }
            Command::Create { name } => playlists.create( &name ).await,
            Command::Rename { from, to } => {
                let playlist = self.playlist( &from ).await?;
                playlists.rename( &playlist, &to ).await;
            }
            Command::Delete { name } => {
                let playlist = self.playlist( &name ).await?;
                playlists.delete( &playlist ).await;
            }
            Command::AddTo { name, track } => {
                let playlist = self.playlist( &name ).await?;
                let track = self.resolve( &track )?;
                playlists.add_track( &playlist, &track ).await;
            }
            Command::RemoveFrom { name, track } => {
                let playlist = self.playlist( &name ).await?;
                let track = self.resolve( &track )?;
                playlists.remove_track( &playlist, &track ).await;
            }

            // Track info
            Command::Info { track } => {
                let track = match track {
                    Some( track ) => self.resolve( &track )?,
                    None => player.snapshot().current_track
                        .ok_or_else( || CommandError::MissingArgument( "track".into() ) )?,
                };
                controller.dispatch( UiEvent::ViewTrackInfo( track ) );
                println!( "{}", view::track_info( &metadata.state().get() ) );
            }
            Command::Search { query } => {
                metadata.search( &query ).await;
                println!( "{}", view::track_info( &metadata.state().get() ) );
            }
            Command::Pick { index } => {
                let result = metadata.state().read( |s| s.search.results.get( index ).cloned() )
                    .ok_or_else( || CommandError::InvalidArgument( format!( "No result {}", index + 1 ) ) )?;
                metadata.pick_result( &result ).await;
                println!( "{}", view::track_info( &metadata.state().get() ) );
            }
            Command::AcceptRisks => controller.dispatch( UiEvent::AcceptMetadataRisks ),
            Command::MatchDuration => {
                controller.dispatch( UiEvent::ToggleMatchDuration );
                println!( "Match duration: {}", controller.settings().match_duration() );
            }
            Command::Apply => {
                let state = metadata.state().get();
                if state.show_risks_dialog {
                    return Err( CommandError::ExecutionFailed( "Accept the risks first with /accept".into() ).into() );
                }
                if state.track.is_none() {
                    return Err( CommandError::ExecutionFailed( "No track info open".into() ).into() );
                }
                metadata.overwrite_metadata( state.changes.metadata ).await;
            }
            Command::Close => controller.dispatch( UiEvent::CloseTrackInfo ),

            Command::Help => println!( "{}", command::help_text() ),
            Command::Quit => self.should_quit = true,
        }

        Ok(())
    }
}


/// Initializes logging to stderr so stdout stays readable.
fn init_logging( filter: Option<&str> ) {
    let filter = match filter {
        Some( directives ) => EnvFilter::new( directives ),
        None => EnvFilter::try_from_default_env().unwrap_or_else( |_| EnvFilter::new( "lyra=info" ) ),
    };

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( std::io::stderr )
        .init();
}


/// Prints notices, track changes and lyrics as they are published.
fn spawn_printers( controller: &Arc<Controller> ) {
    let mut notices = controller.notices().subscribe();
    tokio::spawn( async move {
        loop {
            match notices.recv().await {
                Ok( notice ) => println!( "! {}", notice.message() ),
                Err( tokio::sync::broadcast::error::RecvError::Lagged( _ ) ) => continue,
                Err( tokio::sync::broadcast::error::RecvError::Closed ) => break,
            }
        }
    });

    let mut state = controller.player().state().subscribe();
    tokio::spawn( async move {
        let mut last_track = None;
        let mut last_lyrics = None;

        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();

            if snapshot.current_track != last_track {
                if snapshot.current_track.is_some() {
                    println!( "{}", view::now_playing( &snapshot ) );
                }
                last_track = snapshot.current_track.clone();
            }

            if snapshot.is_lyrics_expanded && snapshot.lyrics != last_lyrics {
                if let Some( lyrics ) = &snapshot.lyrics {
                    println!( "{}", view::lyrics( lyrics, snapshot.position_ms ) );
                }
                last_lyrics = snapshot.lyrics.clone();
            }
        }
    });
}


/// Stands in for a tag writer: reports each committed edit.
fn spawn_tag_writer( controller: &Arc<Controller> ) {
    let Some( mut edits ) = controller.take_pending_edits() else { return };
    tokio::spawn( async move {
        while let Some( edit ) = edits.recv().await {
            tracing::info!(
                "Tag edit for {}: title={:?} artist={:?} album={:?} art={}",
                edit.track.path.display(),
                edit.metadata.title,
                edit.metadata.artist,
                edit.metadata.album,
                edit.metadata.cover_art.is_some(),
            );
            println!( "Tags queued for {}", edit.track.display_title() );
        }
    });
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging( args.log.as_deref() );

    let ( session, playlists ) = match &args.data_dir {
        Some( dir ) => (
            JsonSessionStore::new( dir.join( "session.json" ) ),
            M3uPlaylistStore::new( dir.join( "playlists" ) ),
        ),
        None => (
            JsonSessionStore::open_default().context( "Failed to locate the data directory" )?,
            M3uPlaylistStore::open_default().context( "Failed to locate the data directory" )?,
        ),
    };

    let catalog_path = args.catalog.clone()
        .unwrap_or_else( || session.path().with_file_name( "catalog.json" ) );
    let lyrics = LyricsCache::open( session.path().with_file_name( "lyrics.json" ) ).await
        .context( "Failed to open the lyrics cache" )?;

    tracing::info!( "Catalog: {}", catalog_path.display() );
    tracing::info!( "Playlists: {}", playlists.dir().display() );

    let controller = Arc::new( Controller::new( Collaborators {
        engine: Arc::new( MemoryEngine::new() ),
        catalog: Arc::new( ManifestCatalog::new( catalog_path ) ),
        session: Arc::new( session ),
        playlists: Arc::new( playlists ),
        lyrics_store: Arc::new( lyrics ),
        lyrics_provider: Arc::new( OfflineLyrics ),
        metadata_provider: Arc::new( OfflineMetadata ),
        settings: Arc::new( FileSettings::open_default() ),
    }));

    spawn_printers( &controller );
    spawn_tag_writer( &controller );
    controller.start().await;

    if !args.files.is_empty() {
        let opener = controller.clone();
        let files = args.files.clone();
        tokio::spawn( async move {
            for file in files {
                opener.open_uri( file ).await;
            }
        });
    }

    println!( "lyra {} - type /help for commands", env!( "CARGO_PKG_VERSION" ) );

    let mut shell = Shell::new( controller.clone() );
    let mut lines = BufReader::new( tokio::io::stdin() ).lines();
    while !shell.should_quit {
        let Some( line ) = lines.next_line().await? else { break };
        shell.execute_command( &line ).await;
    }

    controller.shutdown();
    Ok(())
}
