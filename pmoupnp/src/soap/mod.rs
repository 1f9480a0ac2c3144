//! # Module SOAP - Simple Object Access Protocol
//!
//! Ce module implémente le support SOAP côté control point : construction des
//! requêtes d'action, parsing des réponses et des SOAP Faults.
//!
//! ## Architecture
//!
//! - [`SoapEnvelope`] : Enveloppe SOAP complète
//! - [`SoapFault`] : Erreur SOAP, avec le détail UPnP éventuel
//!
//! ## Example
//!
//! ```
//! use pmoupnp::soap::{build_soap_request, parse_soap_envelope};
//!
//! let request = build_soap_request(
//!     "urn:schemas-upnp-org:service:ContentDirectory:1",
//!     "Browse",
//!     &[("ObjectID", "0"), ("BrowseFlag", "BrowseMetadata")],
//! )
//! .unwrap();
//!
//! let envelope = parse_soap_envelope(request.as_bytes()).unwrap();
//! assert!(envelope.body.child_with_suffix("Browse").is_some());
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_response};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader, child_with_suffix};
pub use fault::{SoapFault, UpnpError, build_soap_fault, parse_soap_fault};
pub use parser::{SoapParseError, parse_soap_envelope};

/// Codes d'erreur SOAP UPnP standards
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u32 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u32 = 402;

    /// Action échouée
    pub const ACTION_FAILED: u32 = 501;

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u32 = 602;

    /// ContentDirectory : objet inexistant
    pub const NO_SUCH_OBJECT: u32 = 701;

    /// ContentDirectory : conteneur inexistant
    pub const NO_SUCH_CONTAINER: u32 = 710;

    /// ContentDirectory : le service ne peut pas traiter la requête
    pub const CANNOT_PROCESS_REQUEST: u32 = 720;

    /// Description lisible d'un code connu, pour les logs.
    pub fn describe(code: u32) -> Option<&'static str> {
        match code {
            INVALID_ACTION => Some("Invalid Action"),
            INVALID_ARGS => Some("Invalid Args"),
            ACTION_FAILED => Some("Action Failed"),
            OPTIONAL_ACTION_NOT_IMPLEMENTED => Some("Optional Action Not Implemented"),
            NO_SUCH_OBJECT => Some("No such object"),
            NO_SUCH_CONTAINER => Some("No such container"),
            CANNOT_PROCESS_REQUEST => Some("Cannot process the request"),
            _ => None,
        }
    }
}
