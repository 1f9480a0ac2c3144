//! Moteur de navigation : entrée courante, enfants visibles et transitions.
//!
//! The engine owns every [`DirectoryEntry`] it shows. Each `enter` drops the
//! previous current entry and children before querying the directory, then
//! classifies the observed objects in arrival order:
//!
//! - an object whose id is the browsed id carries the metadata of the current entry;
//! - an object whose parent is the browsed id (and is not the browsed id) is a child;
//! - anything else is ignored.
//!
//! Query failures are logged and never roll the screen back.

use tracing::{debug, info, warn};

use crate::content_directory::{DirectoryProtocol, EntryObserved};
use crate::discovery::{DeviceAvailable, DiscoveryListener};
use crate::entry::{DirectoryEntry, DirectoryHandle, VIRTUAL_ROOT_ID};
use crate::errors::BrowserError;
use crate::kind::{is_container_class, is_item_class};
use crate::launcher::ApplicationLauncher;

/// Titre affiché quand aucun serveur n'est sélectionné.
pub const SERVER_LIST_TITLE: &str = "Media Servers";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationState {
    /// The current entry is the virtual root: children are servers.
    ServerList,
    /// The current entry belongs to a directory.
    Browsing,
}

/// What `activate` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Entered,
    Launched,
    Ignored,
}

pub struct NavigationEngine<P, D, L>
where
    P: DirectoryProtocol,
    D: DiscoveryListener,
    L: ApplicationLauncher,
{
    protocol: P,
    discovery: D,
    launcher: L,
    current: DirectoryEntry,
    children: Vec<DirectoryEntry>,
    title: String,
    can_go_up: bool,
}

impl<P, D, L> NavigationEngine<P, D, L>
where
    P: DirectoryProtocol,
    D: DiscoveryListener,
    L: ApplicationLauncher,
{
    /// Engine on the server list. Discovery is not started.
    pub fn new(protocol: P, discovery: D, launcher: L) -> Self {
        Self {
            protocol,
            discovery,
            launcher,
            current: DirectoryEntry::virtual_root(),
            children: Vec::new(),
            title: SERVER_LIST_TITLE.to_string(),
            can_go_up: false,
        }
    }

    pub fn start_discovery(&mut self) -> Result<(), BrowserError> {
        self.discovery.start()
    }

    pub fn restart_discovery(&mut self) -> Result<(), BrowserError> {
        self.discovery.restart()
    }

    pub fn stop_discovery(&mut self) {
        self.discovery.stop();
    }

    pub fn state(&self) -> NavigationState {
        if self.current.directory().is_some() {
            NavigationState::Browsing
        } else {
            NavigationState::ServerList
        }
    }

    pub fn current(&self) -> &DirectoryEntry {
        &self.current
    }

    pub fn children(&self) -> &[DirectoryEntry] {
        &self.children
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn can_go_up(&self) -> bool {
        self.can_go_up
    }

    pub fn discovery(&self) -> &D {
        &self.discovery
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Adds a server root to the server list.
    ///
    /// Ignored while browsing, for devices without ContentDirectory, and for
    /// a directory already listed.
    pub fn on_device_available(
        &mut self,
        directory: Option<DirectoryHandle>,
        friendly_name: &str,
    ) {
        if self.state() == NavigationState::Browsing {
            debug!(name = friendly_name, "Device reported while browsing, ignored");
            return;
        }
        let Some(directory) = directory else {
            debug!(name = friendly_name, "Device without ContentDirectory, ignored");
            return;
        };
        if self
            .children
            .iter()
            .any(|entry| entry.directory() == Some(&directory))
        {
            return;
        }

        info!(udn = %directory.udn, name = friendly_name, "Media server listed");
        self.children
            .push(DirectoryEntry::server_root(directory, friendly_name));
    }

    pub fn on_discovery_event(&mut self, event: DeviceAvailable) {
        self.on_device_available(event.directory, &event.friendly_name);
    }

    /// Browses `entry_id` of `directory`: its metadata, then its children.
    pub fn enter(&mut self, directory: DirectoryHandle, entry_id: &str) {
        debug!(udn = %directory.udn, entry_id, "Enter");

        self.children.clear();
        self.current = DirectoryEntry::stub(directory.clone(), entry_id);

        match self.protocol.fetch_metadata(&directory, entry_id) {
            Ok(events) => {
                for event in events {
                    self.on_entry_observed(&directory, entry_id, event);
                }
            }
            Err(err) => warn!(entry_id, "Metadata query failed: {}", err),
        }

        match self.protocol.fetch_children(&directory, entry_id) {
            Ok(events) => {
                for event in events {
                    self.on_entry_observed(&directory, entry_id, event);
                }
            }
            Err(err) => warn!(entry_id, "Children query failed: {}", err),
        }

        debug!(entry_id, children = self.children.len(), "Entered");
    }

    fn on_entry_observed(
        &mut self,
        directory: &DirectoryHandle,
        target_id: &str,
        event: EntryObserved,
    ) {
        if event.id == target_id {
            if let Some(title) = &event.title {
                self.title = title.clone();
            }
            self.current
                .set_metadata(event.parent_id, event.title, event.class);
            self.can_go_up = true;
        } else if event.parent_id == target_id {
            let mut child = DirectoryEntry::stub(directory.clone(), event.id);
            child.set_metadata(event.parent_id, event.title, event.class);
            if is_item_class(child.class()) {
                if let Some(resource) = event.resource {
                    child.set_resource(resource.mime_type, resource.uri);
                }
            }
            self.children.push(child);
        } else {
            debug!(id = %event.id, parent_id = %event.parent_id, "Unrelated object ignored");
        }
    }

    /// Goes to the parent of the current entry.
    ///
    /// From a directory root this returns to the server list and restarts
    /// discovery; an error only reports that restart, the list is reset anyway.
    pub fn go_up(&mut self) -> Result<(), BrowserError> {
        let Some(parent_id) = self.current.parent_id().map(str::to_string) else {
            return Ok(());
        };

        match self.current.directory().cloned() {
            Some(_) if parent_id == VIRTUAL_ROOT_ID => {
                info!("Back to the server list");
                self.current = DirectoryEntry::virtual_root();
                self.children.clear();
                self.title = SERVER_LIST_TITLE.to_string();
                self.can_go_up = false;
                self.discovery.restart()
            }
            Some(directory) => {
                self.enter(directory, &parent_id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Opens the child at `index`: enters a container, launches a leaf.
    pub fn activate(&mut self, index: usize) -> Result<Activation, BrowserError> {
        let child = self
            .children
            .get(index)
            .ok_or(BrowserError::NoSuchEntry(index))?;

        if is_container_class(child.class()) {
            let Some(directory) = child.directory().cloned() else {
                return Ok(Activation::Ignored);
            };
            let entry_id = child.entry_id().to_string();
            self.enter(directory, &entry_id);
            return Ok(Activation::Entered);
        }

        if is_item_class(child.class()) {
            let label = child.title().unwrap_or(child.entry_id()).to_string();
            let resource = child
                .resource()
                .ok_or_else(|| BrowserError::NoHandlerForResource(label.clone()))?;
            let handler = self.launcher.resolve(&resource.mime_type).ok_or_else(|| {
                BrowserError::NoHandlerForResource(format!("{} ({})", label, resource.mime_type))
            })?;

            info!(uri = %resource.uri, handler = handler.label(), "Open \"{}\"", label);
            self.launcher.launch(&handler, &resource.uri)?;
            return Ok(Activation::Launched);
        }

        debug!(class = child.class(), "Entry is neither container nor item");
        Ok(Activation::Ignored)
    }
}
