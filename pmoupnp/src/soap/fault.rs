//! SOAP Faults pour UPnP

use xmltree::{Element, XMLNode};

use super::{SoapEnvelope, child_with_suffix};

/// Erreur SOAP (Fault)
#[derive(Debug, Clone)]
pub struct SoapFault {
    /// Code d'erreur (ex: "s:Client")
    pub fault_code: String,

    /// Description de l'erreur
    pub fault_string: String,

    /// Détails UPnP optionnels
    pub upnp_error: Option<UpnpError>,
}

/// Erreur UPnP spécifique (`<detail><UPnPError>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpnpError {
    /// Code d'erreur UPnP (ex: 401, 701)
    pub error_code: u32,

    /// Description de l'erreur, vide si le device n'en fournit pas
    pub error_description: String,
}

impl std::fmt::Display for SoapFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.upnp_error {
            Some(err) if err.error_description.is_empty() => {
                write!(f, "UPnP error {}", err.error_code)
            }
            Some(err) => write!(f, "UPnP error {}: {}", err.error_code, err.error_description),
            None => write!(f, "{}: {}", self.fault_code, self.fault_string),
        }
    }
}

fn child_text(parent: &Element, suffix: &str) -> Option<String> {
    child_with_suffix(parent, suffix)
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
}

/// Extrait le SOAP Fault du corps de l'enveloppe, s'il y en a un.
///
/// Un `errorCode` non numérique est ignoré : le fault est alors rapporté
/// sans détail UPnP.
pub fn parse_soap_fault(envelope: &SoapEnvelope) -> Option<SoapFault> {
    let fault = envelope.body.child_with_suffix("Fault")?;

    let upnp_error = child_with_suffix(fault, "detail")
        .and_then(|detail| child_with_suffix(detail, "UPnPError"))
        .and_then(|upnp| {
            let error_code = child_text(upnp, "errorCode")?.parse::<u32>().ok()?;
            let error_description = child_text(upnp, "errorDescription").unwrap_or_default();
            Some(UpnpError {
                error_code,
                error_description,
            })
        });

    Some(SoapFault {
        fault_code: child_text(fault, "faultcode").unwrap_or_default(),
        fault_string: child_text(fault, "faultstring").unwrap_or_default(),
        upnp_error,
    })
}

/// Construit un SOAP Fault XML
///
/// # Arguments
///
/// * `fault_code` - Code du fault (ex: "s:Client")
/// * `fault_string` - Message d'erreur
/// * `upnp_error` - Code et description d'erreur UPnP optionnels
pub fn build_soap_fault(
    fault_code: &str,
    fault_string: &str,
    upnp_error: Option<(u32, &str)>,
) -> Result<String, xmltree::Error> {
    let text_element = |name: &str, text: &str| {
        let mut elem = Element::new(name);
        elem.children.push(XMLNode::Text(text.to_string()));
        elem
    };

    let mut fault = Element::new("s:Fault");
    fault
        .children
        .push(XMLNode::Element(text_element("faultcode", fault_code)));
    fault
        .children
        .push(XMLNode::Element(text_element("faultstring", fault_string)));

    if let Some((code, desc)) = upnp_error {
        let mut upnp = Element::new("UPnPError");
        upnp.attributes.insert(
            "xmlns".to_string(),
            "urn:schemas-upnp-org:control-1-0".to_string(),
        );
        upnp.children.push(XMLNode::Element(text_element(
            "errorCode",
            &code.to_string(),
        )));
        upnp.children
            .push(XMLNode::Element(text_element("errorDescription", desc)));

        let mut detail = Element::new("detail");
        detail.children.push(XMLNode::Element(upnp));
        fault.children.push(XMLNode::Element(detail));
    }

    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(fault));

    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_envelope;

    #[test]
    fn test_build_and_parse_upnp_fault() {
        let xml = build_soap_fault("s:Client", "UPnPError", Some((701, "No such object"))).unwrap();
        assert!(xml.contains("<errorCode>701</errorCode>"));

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let fault = parse_soap_fault(&envelope).unwrap();
        assert_eq!(fault.fault_code, "s:Client");
        assert_eq!(
            fault.upnp_error,
            Some(UpnpError {
                error_code: 701,
                error_description: "No such object".to_string(),
            })
        );
        assert_eq!(fault.to_string(), "UPnP error 701: No such object");
    }

    #[test]
    fn test_plain_fault_without_detail() {
        let xml = build_soap_fault("s:Server", "Internal error", None).unwrap();
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let fault = parse_soap_fault(&envelope).unwrap();

        assert!(fault.upnp_error.is_none());
        assert_eq!(fault.to_string(), "s:Server: Internal error");
    }

    #[test]
    fn test_no_fault_in_regular_response() {
        let xml = crate::soap::build_soap_response(
            "urn:schemas-upnp-org:service:ContentDirectory:1",
            "Browse",
            &[("NumberReturned", "0")],
        )
        .unwrap();
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert!(parse_soap_fault(&envelope).is_none());
    }
}
