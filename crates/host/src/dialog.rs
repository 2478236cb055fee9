//! External collaborator seams for interactive dialogs.
//!
//! The actual pickers belong to the embedding application. Handlers
//! receive them as trait objects so tests can substitute fixed answers.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use splatpipe_protocol::types::{DialogOptions, FileHandle};

/// A boxed future returned by dialog trait methods.
pub type PickFuture<'a> = Pin<Box<dyn Future<Output = Option<PathBuf>> + Send + 'a>>;
pub type DialogFuture<'a> = Pin<Box<dyn Future<Output = Vec<FileHandle>> + Send + 'a>>;

/// Asks the user where a save should land.
///
/// `None` means the user dismissed the picker; the save is cancelled and
/// nothing is written.
pub trait DestinationPicker: Send + Sync {
    fn pick_destination(&self, suggested_name: &str) -> PickFuture<'_>;
}

/// Shows the open-file picker. An empty result means cancellation.
pub trait FileDialog: Send + Sync {
    fn pick_files(&self, options: &DialogOptions) -> DialogFuture<'_>;
}
