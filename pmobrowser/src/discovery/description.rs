use std::io::{BufRead, BufReader};
use std::time::Duration;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::{Error as XmlError, Reader, events::Event};
use thiserror::Error;
use tracing::debug;
use ureq::Agent;

use crate::entry::DirectoryHandle;

const MEDIA_SERVER_PREFIX: &str = "urn:schemas-upnp-org:device:mediaserver:";
const CONTENT_DIRECTORY_PREFIX: &str = "urn:schemas-upnp-org:service:contentdirectory:";

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("Failed to read HTTP body: {0}")]
    HttpIo(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Unknown entity reference &{0};")]
    UnknownEntity(String),

    #[error("Missing required device element: {0}")]
    MissingField(&'static str),
}

/// Service endpoint as written in the description (controlURL not resolved).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ServiceEndpoint {
    pub service_type: String,
    pub control_url: String,
}

/// One `<device>` of a description, embedded devices included.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeviceDescription {
    pub udn: Option<String>,
    pub device_type: Option<String>,
    pub friendly_name: Option<String>,
    pub content_directory: Option<ServiceEndpoint>,
}

impl DeviceDescription {
    pub fn is_media_server(&self) -> bool {
        self.device_type
            .as_deref()
            .is_some_and(|t| t.to_ascii_lowercase().starts_with(MEDIA_SERVER_PREFIX))
    }

    fn require_fields(self) -> Result<Self, DescriptionError> {
        if self.device_type.is_none() {
            return Err(DescriptionError::MissingField("deviceType"));
        }
        if self.udn.is_none() {
            return Err(DescriptionError::MissingField("UDN"));
        }
        Ok(self)
    }
}

/// Parsed description.xml.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedDescription {
    pub url_base: Option<String>,
    pub devices: Vec<DeviceDescription>,
}

impl ParsedDescription {
    /// The MediaServer device announced as `udn`, or the first MediaServer.
    pub fn media_server(&self, udn: &str) -> Option<&DeviceDescription> {
        let servers = || self.devices.iter().filter(|d| d.is_media_server());
        servers()
            .find(|d| {
                d.udn
                    .as_deref()
                    .is_some_and(|u| u.eq_ignore_ascii_case(udn))
            })
            .or_else(|| servers().next())
    }

    /// ContentDirectory handle of `device`, with its controlURL made absolute.
    pub fn directory_handle(
        &self,
        location: &str,
        device: &DeviceDescription,
    ) -> Option<DirectoryHandle> {
        let service = device.content_directory.as_ref()?;
        let base = self
            .url_base
            .as_deref()
            .filter(|b| !b.is_empty())
            .unwrap_or(location);
        Some(DirectoryHandle::new(
            device.udn.clone().unwrap_or_default(),
            service.service_type.clone(),
            resolve_control_url(base, &service.control_url),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    UrlBase,
    Udn,
    DeviceType,
    FriendlyName,
    ServiceType,
    ControlUrl,
}

/// Parses a UPnP device description document.
pub fn parse_description<R: BufRead>(input: R) -> Result<ParsedDescription, DescriptionError> {
    let mut reader = Reader::from_reader(input);

    let mut buf = Vec::new();
    let mut parsed = ParsedDescription::default();

    // Devices currently open, innermost last.
    let mut stack: Vec<DeviceDescription> = Vec::new();
    let mut service: Option<ServiceEndpoint> = None;
    let mut tag: Option<Tag> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                text.clear();
                tag = None;
                match e.local_name().as_ref() {
                    b"device" => stack.push(DeviceDescription::default()),
                    b"service" if !stack.is_empty() => service = Some(ServiceEndpoint::default()),
                    b"URLBase" if stack.is_empty() => tag = Some(Tag::UrlBase),
                    b"UDN" => tag = Some(Tag::Udn),
                    b"deviceType" => tag = Some(Tag::DeviceType),
                    b"friendlyName" => tag = Some(Tag::FriendlyName),
                    b"serviceType" if service.is_some() => tag = Some(Tag::ServiceType),
                    b"controlURL" if service.is_some() => tag = Some(Tag::ControlUrl),
                    _ => {}
                }
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"device" => {
                        if let Some(device) = stack.pop() {
                            parsed.devices.push(device.require_fields()?);
                        }
                    }
                    b"service" => {
                        if let (Some(done), Some(device)) = (service.take(), stack.last_mut()) {
                            let is_cds = done
                                .service_type
                                .to_ascii_lowercase()
                                .starts_with(CONTENT_DIRECTORY_PREFIX);
                            // first ContentDirectory wins
                            if is_cds
                                && !done.control_url.is_empty()
                                && device.content_directory.is_none()
                            {
                                device.content_directory = Some(done);
                            }
                        }
                    }
                    _ => {
                        if let Some(current) = tag.take() {
                            let value = text.trim().to_string();
                            match current {
                                Tag::UrlBase => parsed.url_base = Some(value),
                                Tag::ServiceType => {
                                    if let Some(s) = service.as_mut() {
                                        s.service_type = value;
                                    }
                                }
                                Tag::ControlUrl => {
                                    if let Some(s) = service.as_mut() {
                                        s.control_url = value;
                                    }
                                }
                                Tag::Udn | Tag::DeviceType | Tag::FriendlyName => {
                                    // fields of a <service> never land on the device
                                    if service.is_none() {
                                        if let Some(device) = stack.last_mut() {
                                            match current {
                                                Tag::Udn => device.udn = Some(value),
                                                Tag::DeviceType => device.device_type = Some(value),
                                                _ => device.friendly_name = Some(value),
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                text.clear();
            }
            Event::Text(e) => {
                if tag.is_some() {
                    text.push_str(&e.decode().map_err(XmlError::Encoding)?);
                }
            }
            Event::CData(e) => {
                if tag.is_some() {
                    text.push_str(&e.decode().map_err(XmlError::Encoding)?);
                }
            }
            Event::GeneralRef(e) => {
                if tag.is_none() {
                    buf.clear();
                    continue;
                }
                if let Some(ch) = e.resolve_char_ref()? {
                    text.push(ch);
                } else {
                    let name = e.decode().map_err(XmlError::Encoding)?;
                    let resolved = resolve_predefined_entity(&name)
                        .ok_or_else(|| DescriptionError::UnknownEntity(name.to_string()))?;
                    text.push_str(resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if parsed.devices.is_empty() {
        return Err(DescriptionError::MissingField("device"));
    }
    Ok(parsed)
}

/// Resolve a possibly relative controlURL against the description URL
/// (or the `URLBase` of the description when it has one).
///
/// - An absolute `control_url` (http:// or https://) is returned as-is.
/// - A `control_url` starting with `/` is appended to scheme://host:port of `base`.
/// - Otherwise it is resolved against the directory of `base`.
pub fn resolve_control_url(base: &str, control_url: &str) -> String {
    if control_url.starts_with("http://") || control_url.starts_with("https://") {
        return control_url.to_string();
    }

    if let Some((scheme, rest)) = base.split_once("://") {
        let (authority, path) = match rest.find('/') {
            Some(pos) => rest.split_at(pos),
            None => (rest, "/"),
        };

        if control_url.starts_with('/') {
            return format!("{}://{}{}", scheme, authority, control_url);
        }

        let dir = match path.rfind('/') {
            Some(pos) => &path[..=pos],
            None => "/",
        };
        return format!("{}://{}{}{}", scheme, authority, dir, control_url);
    }

    // Fallback: just return the raw control_url if we cannot parse
    control_url.to_string()
}

/// Fournit la description d'un device annoncé par SSDP.
pub trait DeviceDescriptionProvider: Send {
    fn describe(&self, udn: &str, location: &str) -> Result<ParsedDescription, DescriptionError>;
}

/// HTTP-based XML description provider (UPnP device description.xml)
pub struct HttpXmlDescriptionProvider {
    timeout: Duration,
}

impl HttpXmlDescriptionProvider {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DeviceDescriptionProvider for HttpXmlDescriptionProvider {
    fn describe(&self, udn: &str, location: &str) -> Result<ParsedDescription, DescriptionError> {
        debug!(udn, location, "Fetching device description");

        let config = Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build();

        let agent: Agent = config.into();

        let response = agent.get(location).call()?;

        let (_parts, body) = response.into_parts();
        parse_description(BufReader::new(body.into_reader()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
    <friendlyName>Salon &amp; Cuisine</friendlyName>
    <manufacturer>Example</manufacturer>
    <UDN>uuid:4d696e69-444c-164e-9d41-b827eb000001</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ConnectionManager:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ConnectionManager</serviceId>
        <controlURL>/ctl/ConnectionMgr</controlURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:ContentDirectory</serviceId>
        <controlURL>/ctl/ContentDir</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_media_server() {
        let parsed = parse_description(DESCRIPTION.as_bytes()).unwrap();
        assert!(parsed.url_base.is_none());
        assert_eq!(parsed.devices.len(), 1);

        let device = parsed
            .media_server("uuid:4d696e69-444c-164e-9d41-b827eb000001")
            .unwrap();
        assert_eq!(device.friendly_name.as_deref(), Some("Salon & Cuisine"));
        assert_eq!(
            device.content_directory,
            Some(ServiceEndpoint {
                service_type: "urn:schemas-upnp-org:service:ContentDirectory:1".to_string(),
                control_url: "/ctl/ContentDir".to_string(),
            })
        );

        let handle = parsed
            .directory_handle("http://192.168.1.10:8200/rootDesc.xml", device)
            .unwrap();
        assert_eq!(handle.udn, "uuid:4d696e69-444c-164e-9d41-b827eb000001");
        assert_eq!(handle.control_url, "http://192.168.1.10:8200/ctl/ContentDir");
    }

    #[test]
    fn test_url_base_and_embedded_device() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0">
  <URLBase>http://10.0.0.5:49152/</URLBase>
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>NAS</friendlyName>
    <UDN>uuid:root</UDN>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:MediaServer:2</deviceType>
        <friendlyName>NAS Media</friendlyName>
        <UDN>uuid:media</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:ContentDirectory:2</serviceType>
            <controlURL>upnp/control/cds</controlURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;
        let parsed = parse_description(xml.as_bytes()).unwrap();
        assert_eq!(parsed.devices.len(), 2);

        let device = parsed.media_server("uuid:root").unwrap();
        assert_eq!(device.udn.as_deref(), Some("uuid:media"));
        assert_eq!(device.friendly_name.as_deref(), Some("NAS Media"));

        let handle = parsed
            .directory_handle("http://10.0.0.5:49152/desc/root.xml", device)
            .unwrap();
        assert_eq!(handle.control_url, "http://10.0.0.5:49152/upnp/control/cds");
    }

    #[test]
    fn test_media_server_without_content_directory() {
        let xml = r#"<root><device>
            <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
            <friendlyName>Broken</friendlyName>
            <UDN>uuid:broken</UDN>
        </device></root>"#;
        let parsed = parse_description(xml.as_bytes()).unwrap();
        let device = parsed.media_server("uuid:broken").unwrap();
        assert!(parsed.directory_handle("http://h/d.xml", device).is_none());
    }

    #[test]
    fn test_missing_fields() {
        assert!(matches!(
            parse_description("<root></root>".as_bytes()),
            Err(DescriptionError::MissingField("device"))
        ));
        assert!(matches!(
            parse_description("<root><device><UDN>uuid:x</UDN></device></root>".as_bytes()),
            Err(DescriptionError::MissingField("deviceType"))
        ));
    }

    #[test]
    fn test_resolve_control_url() {
        let base = "http://192.168.1.10:8200/desc/rootDesc.xml";
        assert_eq!(
            resolve_control_url(base, "http://other:1/ctl"),
            "http://other:1/ctl"
        );
        assert_eq!(
            resolve_control_url(base, "/ctl/ContentDir"),
            "http://192.168.1.10:8200/ctl/ContentDir"
        );
        assert_eq!(
            resolve_control_url(base, "ctl/ContentDir"),
            "http://192.168.1.10:8200/desc/ctl/ContentDir"
        );
        assert_eq!(
            resolve_control_url("http://192.168.1.10:8200", "ctl"),
            "http://192.168.1.10:8200/ctl"
        );
        assert_eq!(resolve_control_url("not a url", "ctl"), "ctl");
    }
}
