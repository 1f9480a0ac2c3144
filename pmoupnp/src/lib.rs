//! # pmoupnp - UPnP control-point plumbing
//!
//! Briques protocolaires utilisées côté control point :
//!
//! - [`soap`] : construction des requêtes SOAP, parsing des enveloppes et des faults UPnP
//! - [`ssdp`] : client SSDP (M-SEARCH + écoute des NOTIFY)

pub mod soap;
pub mod ssdp;
