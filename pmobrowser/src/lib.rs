//! # pmobrowser
//!
//! Navigation dans les serveurs multimédia UPnP/DLNA.
//!
//! - [`discovery`] : découverte SSDP des MediaServer et de leur ContentDirectory
//! - [`content_directory`] : requêtes `Browse` et lecture des listings DIDL-Lite
//! - [`navigation`] : moteur de navigation (liste des serveurs, dossiers, remontée)
//! - [`launcher`] : ouverture d'une ressource avec une application locale
//!
//! The engine is generic over its three collaborators so that each one can
//! be replaced, in tests in particular:
//!
//! ```no_run
//! use std::time::Duration;
//! use pmobrowser::{
//!     ContentDirectoryClient, DesktopLauncher, DiscoverySettings, NavigationEngine, SsdpDiscovery,
//! };
//!
//! let discovery = SsdpDiscovery::new(DiscoverySettings::default());
//! let devices = discovery.receiver();
//! let mut engine = NavigationEngine::new(
//!     ContentDirectoryClient::new(Duration::from_secs(30)),
//!     discovery,
//!     DesktopLauncher::default(),
//! );
//! engine.start_discovery()?;
//!
//! for device in devices.try_iter() {
//!     engine.on_discovery_event(device);
//! }
//! if !engine.children().is_empty() {
//!     engine.activate(0)?;
//! }
//! # Ok::<(), pmobrowser::BrowserError>(())
//! ```

pub mod content_directory;
pub mod discovery;
pub mod entry;
pub mod errors;
pub mod kind;
pub mod launcher;
pub mod logging;
pub mod navigation;
pub mod soap_client;

pub use content_directory::{BrowseFlag, ContentDirectoryClient, DirectoryProtocol, EntryObserved};
pub use discovery::{DeviceAvailable, DiscoveryListener, DiscoverySettings, SsdpDiscovery};
pub use entry::{DirectoryEntry, DirectoryHandle, EntryResource, ROOT_ENTRY_ID, VIRTUAL_ROOT_ID};
pub use errors::BrowserError;
pub use kind::EntryKind;
pub use launcher::{ApplicationLauncher, DesktopLauncher, HandlerId};
pub use navigation::{Activation, NavigationEngine, NavigationState, SERVER_LIST_TITLE};
