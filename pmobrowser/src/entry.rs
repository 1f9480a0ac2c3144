//! Nœuds de la hiérarchie de contenu.

/// Identifiant racine d'un ContentDirectory.
pub const ROOT_ENTRY_ID: &str = "0";

/// Parent de la racine d'un ContentDirectory, et identifiant de la racine virtuelle.
pub const VIRTUAL_ROOT_ID: &str = "-1";

/// Adresse d'un service ContentDirectory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DirectoryHandle {
    pub udn: String,
    pub service_type: String,
    pub control_url: String,
}

impl DirectoryHandle {
    pub fn new(
        udn: impl Into<String>,
        service_type: impl Into<String>,
        control_url: impl Into<String>,
    ) -> Self {
        Self {
            udn: udn.into(),
            service_type: service_type.into(),
            control_url: control_url.into(),
        }
    }
}

/// First `<res>` of a leaf: MIME type from the protocolInfo and its URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryResource {
    pub mime_type: String,
    pub uri: String,
}

impl EntryResource {
    pub fn new(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            uri: uri.into(),
        }
    }
}

/// A server root, a container or a leaf.
///
/// `directory` is `None` only for the virtual root listing the servers.
/// `parent_id` stays `None` until metadata has been received for a browsed
/// entry, so `go_up` has nowhere to go before that.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    directory: Option<DirectoryHandle>,
    entry_id: String,
    parent_id: Option<String>,
    title: Option<String>,
    class: String,
    resource: Option<EntryResource>,
}

impl DirectoryEntry {
    /// Entrée synthétique « aucun serveur sélectionné ».
    pub fn virtual_root() -> Self {
        Self {
            directory: None,
            entry_id: VIRTUAL_ROOT_ID.to_string(),
            parent_id: None,
            title: None,
            class: String::new(),
            resource: None,
        }
    }

    /// Entrée dont seules l'adresse et l'identifiant sont connus.
    pub fn stub(directory: DirectoryHandle, entry_id: impl Into<String>) -> Self {
        Self {
            directory: Some(directory),
            entry_id: entry_id.into(),
            parent_id: None,
            title: None,
            class: String::new(),
            resource: None,
        }
    }

    /// Racine d'un serveur découvert, telle qu'affichée dans la liste des serveurs.
    pub fn server_root(directory: DirectoryHandle, friendly_name: impl Into<String>) -> Self {
        let mut entry = Self::stub(directory, ROOT_ENTRY_ID);
        entry.set_metadata(
            VIRTUAL_ROOT_ID,
            Some(friendly_name.into()),
            "object.container",
        );
        entry
    }

    pub fn set_metadata(
        &mut self,
        parent_id: impl Into<String>,
        title: Option<String>,
        class: impl Into<String>,
    ) {
        self.parent_id = Some(parent_id.into());
        self.title = title;
        self.class = class.into();
    }

    pub fn set_resource(&mut self, mime_type: impl Into<String>, uri: impl Into<String>) {
        self.resource = Some(EntryResource::new(mime_type, uri));
    }

    pub fn directory(&self) -> Option<&DirectoryHandle> {
        self.directory.as_ref()
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn resource(&self) -> Option<&EntryResource> {
        self.resource.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> DirectoryHandle {
        DirectoryHandle::new(
            "uuid:server-1",
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "http://192.168.1.10:8200/ctl/ContentDir",
        )
    }

    #[test]
    fn test_virtual_root() {
        let root = DirectoryEntry::virtual_root();
        assert!(root.directory().is_none());
        assert_eq!(root.entry_id(), "-1");
        assert!(root.parent_id().is_none());
        assert!(root.title().is_none());
    }

    #[test]
    fn test_server_root() {
        let entry = DirectoryEntry::server_root(handle(), "Living Room");
        assert_eq!(entry.directory(), Some(&handle()));
        assert_eq!(entry.entry_id(), "0");
        assert_eq!(entry.parent_id(), Some("-1"));
        assert_eq!(entry.title(), Some("Living Room"));
        assert_eq!(entry.class(), "object.container");
        assert!(entry.resource().is_none());
    }

    #[test]
    fn test_set_metadata_replaces_all_fields() {
        let mut entry = DirectoryEntry::stub(handle(), "12");
        entry.set_metadata("3", Some("Albums".to_string()), "object.container.album");
        entry.set_metadata("4", None, "object.container");

        assert_eq!(entry.parent_id(), Some("4"));
        assert!(entry.title().is_none());
        assert_eq!(entry.class(), "object.container");
    }

    #[test]
    fn test_set_resource() {
        let mut entry = DirectoryEntry::stub(handle(), "5");
        entry.set_resource("audio/mpeg", "http://x/5");
        entry.set_resource("audio/flac", "http://x/5.flac");

        assert_eq!(
            entry.resource(),
            Some(&EntryResource::new("audio/flac", "http://x/5.flac"))
        );
    }
}
