//! Parser d'enveloppes SOAP

use super::{SoapBody, SoapEnvelope, SoapHeader};
use std::io::BufReader;
use xmltree::Element;

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,
}

/// Parse une enveloppe SOAP complète
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    // Vérifier que c'est bien une Envelope
    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let find = |suffix: &str| {
        root.children
            .iter()
            .find_map(|n| n.as_element().filter(|e| e.name.ends_with(suffix)))
    };

    // Header optionnel, Body obligatoire
    let header = find("Header").map(|e| SoapHeader { content: e.clone() });
    let body = find("Body")
        .map(|e| SoapBody { content: e.clone() })
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope { header, body })
}
