//! Construction des requêtes (et réponses) SOAP

use xmltree::{Element, XMLNode};

fn build_soap_envelope_with_body(body_child: Element) -> Result<String, xmltree::Error> {
    // Body
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    // Envelope
    let mut envelope = Element::new("s:Envelope");
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    // L'emitter n'écrit que de l'UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn action_element(name: &str, service_urn: &str, args: &[(&str, &str)]) -> Element {
    let mut elem = Element::new(name);
    elem.attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (arg, value) in args {
        let mut child = Element::new(*arg);
        child.children.push(XMLNode::Text((*value).to_string()));
        elem.children.push(XMLNode::Element(child));
    }

    elem
}

/// Construit le corps d'une requête d'action UPnP
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:ContentDirectory:1")
/// * `action` - Nom de l'action (ex: "Browse")
/// * `args` - Arguments, dans l'ordre exigé par la description du service
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let request_name = format!("u:{}", action);
    build_soap_envelope_with_body(action_element(&request_name, service_urn, args))
}

/// Construit une réponse SOAP UPnP (`<u:{action}Response>`).
///
/// Côté control point elle ne sert qu'à simuler un device.
pub fn build_soap_response(
    service_urn: &str,
    action: &str,
    values: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    let response_name = format!("u:{}Response", action);
    build_soap_envelope_with_body(action_element(&response_name, service_urn, values))
}
