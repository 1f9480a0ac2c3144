use std::time::Duration;

use anyhow::{Context, Result};
use pmoupnp::soap::{SoapEnvelope, build_soap_request, parse_soap_envelope};
use tracing::trace;
use ureq::Agent;

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
pub struct SoapCallResult {
    pub status: ureq::http::StatusCode,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN, e.g. "urn:schemas-upnp-org:service:ContentDirectory:1"
/// - `action`: action name, e.g. "Browse"
/// - `args`: list of (name, value) pairs, e.g. &[("ObjectID", "0")]
/// - `timeout`: global timeout of the round trip, `None` for no limit
pub fn invoke_upnp_action_with_timeout(
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
    timeout: Option<Duration>,
) -> Result<SoapCallResult> {
    let body_xml = build_soap_request(service_type, action, args)
        .context("Failed to build SOAP request body")?;

    // 4xx/5xx must not become errors: SOAP faults travel in HTTP 500 bodies.
    let config = Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build();

    let agent: Agent = config.into();

    let soap_action_header = format!(r#""{}#{}""#, service_type, action);

    let mut response = agent
        .post(control_url)
        .header("Content-Type", r#"text/xml; charset="utf-8""#)
        .header("SOAPAction", &soap_action_header)
        .send(body_xml)
        .with_context(|| format!("HTTP error when sending SOAP request to {}", control_url))?;

    let status = response.status();

    let raw_body = response
        .body_mut()
        .read_to_string()
        .context("Failed to read SOAP response body")?;
    trace!(action, %status, bytes = raw_body.len(), "SOAP response received");

    // A body that is not SOAP is reported through `envelope: None`.
    let envelope = parse_soap_envelope(raw_body.as_bytes()).ok();

    Ok(SoapCallResult {
        status,
        raw_body,
        envelope,
    })
}
