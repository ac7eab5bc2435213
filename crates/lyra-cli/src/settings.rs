//! Settings persistence
//!
//! Stores the core [`Settings`] as pretty JSON under the user's config
//! directory.

use std::fs;
use std::path::PathBuf;

use lyra_core::settings::{ Settings, SettingsBackend };
use lyra_core::StoreError;


/// Settings backend reading and writing a JSON file.
#[derive( Debug, Clone )]
pub struct FileSettings {
    path: Option<PathBuf>,
}


impl FileSettings {
    /// Settings at `<config dir>/lyra/settings.json`.
    ///
    /// Without a config directory settings still work but are not saved.
    pub fn open_default() -> Self {
        let path = dirs::config_dir().map( |p| p.join( "lyra" ).join( "settings.json" ) );
        if path.is_none() {
            tracing::warn!( "No config directory, settings will not be saved" );
        }
        Self { path }
    }
}


impl SettingsBackend for FileSettings {
    fn load( &self ) -> Settings {
        let Some( path ) = &self.path else { return Settings::default() };
        if !path.exists() {
            return Settings::default();
        }

        match fs::read_to_string( path ) {
            Ok( contents ) => serde_json::from_str( &contents ).unwrap_or_else( |e| {
                tracing::warn!( "Ignoring malformed settings: {}", e );
                Settings::default()
            }),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Settings::default()
            }
        }
    }


    fn save( &self, settings: &Settings ) -> Result<(), StoreError> {
        let Some( path ) = &self.path else { return Ok(()) };

        // Create parent directory if needed
        if let Some( parent ) = path.parent() {
            fs::create_dir_all( parent )?;
        }

        let json = serde_json::to_string_pretty( settings )?;
        fs::write( path, json )?;
        Ok(())
    }
}
