//! # Module SSDP - Simple Service Discovery Protocol
//!
//! Côté control point uniquement : envoi des M-SEARCH et réception des
//! réponses unicast et des NOTIFY alive/byebye.
//!
//! ## Constants SSDP
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age**: 1800 secondes (30 minutes), valeur par défaut si absente

mod client;

use std::net::Ipv4Addr;

pub use client::{SsdpClient, SsdpEvent};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité des annonces (en secondes)
pub const MAX_AGE: u32 = 1800;

/// Type de device recherché par défaut
pub const MEDIA_SERVER_DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaServer:1";

/// Extrait l'UDN (`uuid:...`, en minuscules) d'un USN SSDP.
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &lower[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}
