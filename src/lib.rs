//! # Flat-Text Registry Hive Editor
//!
//! An incremental editor for Wine-style, line-oriented registry files
//! (`system.reg`, `user.reg`, `userdef.reg`).
//!
//! ## Features
//!
//! - **Streaming**: Files are scanned line by line through fixed-size buffers
//!   and never loaded whole, so very large hives are fine
//! - **Byte-exact**: Every byte outside an edited span is copied verbatim
//! - **Crash-safe**: Each mutation is written to a scratch file and renamed over
//!   the working copy only after it fully succeeds
//! - **Typed values**: String, Dword and Hex (binary) values plus the nameless
//!   default value of a key
//! - **Batch writes**: Several values of one key are rewritten in a single pass
//!
//! ## File Layout
//!
//! ```text
//! WINE REGISTRY Version 2
//!
//! [Software\\Wine\\Direct3D] 1700000000          <- section header, unix seconds
//! #time=1da17b5c2f6c000                           <- FILETIME ticks in hex
//! "csmt"=dword:00000003                           <- named dword value
//! "renderer"="vulkan"                             <- named string value
//! "Blob"=hex:00,01,ff,...,\                       <- hex value, wrapped
//!   10,20
//! @="default"                                     <- default value
//! ```
//!
//! ## Session Model
//!
//! 1. **Open**: the target is copied into a working copy next to it
//! 2. **Edit**: lookups scan the working copy; mutations splice it through a
//!    scratch file
//! 3. **Close**: the working copy replaces the target if anything changed,
//!    and is deleted otherwise
//!
//! ## Examples
//!
//! ### Reading and writing values
//!
//! ```no_run
//! use reg_editor::RegistryEditor;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut editor = RegistryEditor::open("user.reg")?;
//!
//! editor.set_dword_value(r"Software\Wine\Direct3D", Some("csmt"), 3)?;
//! editor.set_string_value(r"Software\Wine\DirectInput", Some("MouseWarpOverride"), "force")?;
//!
//! let renderer = editor.get_string_value_or(r"Software\Wine\Direct3D", Some("renderer"), "gl")?;
//! println!("renderer = {}", renderer);
//!
//! editor.close();
//! # Ok(())
//! # }
//! ```
//!
//! ### Batch updates and removal
//!
//! ```no_run
//! use reg_editor::{RegistryEditor, ValueData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut editor = RegistryEditor::open("system.reg")?;
//!
//! editor.set_values(
//!     r"Software\Wine\Drivers",
//!     &[
//!         (Some("Audio"), ValueData::from("pulse")),
//!         (Some("Graphics"), ValueData::from("x11")),
//!     ],
//! )?;
//! editor.remove_key(r"Software\Wine\Obsolete", true)?;
//!
//! editor.close();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod editor;
pub mod error;
pub mod location;
pub mod resolver;
pub mod scanner;
pub mod splice;
pub mod utils;
pub mod value;

// Python bindings (only compiled when python feature is enabled)
#[cfg(feature = "python")]
pub mod python;

// Re-export main types for convenience
pub use editor::{EditorOptions, RegistryEditor};
pub use error::{RegistryError, Result};
pub use location::{KeyMatch, Location};
pub use resolver::ParentKeyCache;
pub use splice::Edit;
pub use value::{ValueData, ValueType};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
