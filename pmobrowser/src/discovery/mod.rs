//! Découverte des serveurs de contenu.

use crate::entry::DirectoryHandle;
use crate::errors::BrowserError;

pub mod description;
pub mod ssdp;

pub use description::{
    DescriptionError, DeviceDescription, DeviceDescriptionProvider, HttpXmlDescriptionProvider,
    ParsedDescription, parse_description, resolve_control_url,
};
pub use ssdp::{DiscoverySession, DiscoverySettings, SsdpDiscovery};

/// Un serveur multimédia est apparu sur le réseau.
///
/// `directory` vaut `None` quand le device n'expose pas de ContentDirectory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceAvailable {
    pub directory: Option<DirectoryHandle>,
    pub friendly_name: String,
}

/// Source of `DeviceAvailable` reports.
pub trait DiscoveryListener {
    fn start(&mut self) -> Result<(), BrowserError>;

    fn stop(&mut self);

    /// Forgets what was announced and searches again.
    fn restart(&mut self) -> Result<(), BrowserError> {
        self.stop();
        self.start()
    }
}
