use crate::navigation::NavigationState;

const CONTAINER_CLASS: &str = "object.container";
const ITEM_CLASS: &str = "object.item";

/// `object.container` and everything below it.
pub fn is_container_class(class: &str) -> bool {
    class.starts_with(CONTAINER_CLASS)
}

/// `object.item` and everything below it.
pub fn is_item_class(class: &str) -> bool {
    class.starts_with(ITEM_CLASS)
}

/// Catégorie d'affichage d'une entrée.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Server,
    Folder,
    Audio,
    Image,
    Video,
    Unknown,
}

impl EntryKind {
    pub fn from_class(class: &str) -> Self {
        if is_container_class(class) {
            EntryKind::Folder
        } else if class.starts_with("object.item.audioItem") {
            EntryKind::Audio
        } else if class.starts_with("object.item.imageItem") {
            EntryKind::Image
        } else if class.starts_with("object.item.videoItem") {
            EntryKind::Video
        } else {
            EntryKind::Unknown
        }
    }

    /// Kind of a visible child: every row of the server list is a server.
    pub fn in_listing(state: NavigationState, class: &str) -> Self {
        match state {
            NavigationState::ServerList => EntryKind::Server,
            NavigationState::Browsing => EntryKind::from_class(class),
        }
    }

    /// Freedesktop icon name.
    pub fn icon_name(self) -> &'static str {
        match self {
            EntryKind::Server => "folder-remote",
            EntryKind::Folder => "folder",
            EntryKind::Audio => "audio-x-generic",
            EntryKind::Image => "image-x-generic",
            EntryKind::Video => "video-x-generic",
            EntryKind::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_prefixes() {
        assert!(is_container_class("object.container"));
        assert!(is_container_class("object.container.album.musicAlbum"));
        assert!(!is_container_class("object.item"));
        assert!(is_item_class("object.item.audioItem.musicTrack"));
        assert!(!is_item_class("object"));
    }

    #[test]
    fn test_from_class() {
        assert_eq!(
            EntryKind::from_class("object.container.storageFolder"),
            EntryKind::Folder
        );
        assert_eq!(
            EntryKind::from_class("object.item.audioItem.musicTrack"),
            EntryKind::Audio
        );
        assert_eq!(
            EntryKind::from_class("object.item.imageItem.photo"),
            EntryKind::Image
        );
        assert_eq!(
            EntryKind::from_class("object.item.videoItem.movie"),
            EntryKind::Video
        );
        assert_eq!(
            EntryKind::from_class("object.item.textItem"),
            EntryKind::Unknown
        );
        assert_eq!(EntryKind::from_class(""), EntryKind::Unknown);
    }

    #[test]
    fn test_server_list_rows_are_servers() {
        assert_eq!(
            EntryKind::in_listing(NavigationState::ServerList, "object.container"),
            EntryKind::Server
        );
        assert_eq!(EntryKind::Server.icon_name(), "folder-remote");
        assert_eq!(
            EntryKind::in_listing(NavigationState::Browsing, "object.item.videoItem")
                .icon_name(),
            "video-x-generic"
        );
    }
}
