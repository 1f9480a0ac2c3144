//! Client ContentDirectory : les deux requêtes Browse utilisées par la navigation.

use std::time::Duration;

use pmodidl::{DidlObject, DidlParser};
use pmoupnp::soap::{SoapEnvelope, child_with_suffix, error_codes, parse_soap_fault};
use tracing::{debug, warn};

use crate::entry::{DirectoryHandle, EntryResource};
use crate::errors::BrowserError;
use crate::soap_client::{SoapCallResult, invoke_upnp_action_with_timeout};

/// One DIDL-Lite object reported by a Browse, in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryObserved {
    pub id: String,
    pub parent_id: String,
    pub title: Option<String>,
    pub class: String,
    /// First `<res>` only.
    pub resource: Option<EntryResource>,
}

impl From<DidlObject> for EntryObserved {
    fn from(object: DidlObject) -> Self {
        let resource = object.first_resource().map(|res| {
            EntryResource::new(res.mime_type().unwrap_or_default(), res.uri.clone())
        });
        Self {
            id: object.id,
            parent_id: object.parent_id,
            title: object.title,
            class: object.class,
            resource,
        }
    }
}

/// The two directory queries the navigation engine needs.
///
/// Both calls block until the listing has been received and parsed.
pub trait DirectoryProtocol {
    /// `Browse` with `BrowseFlag=BrowseMetadata`.
    fn fetch_metadata(
        &self,
        directory: &DirectoryHandle,
        entry_id: &str,
    ) -> Result<Vec<EntryObserved>, BrowserError>;

    /// `Browse` with `BrowseFlag=BrowseDirectChildren`.
    fn fetch_children(
        &self,
        directory: &DirectoryHandle,
        entry_id: &str,
    ) -> Result<Vec<EntryObserved>, BrowserError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseFlag {
    Metadata,
    DirectChildren,
}

impl BrowseFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            BrowseFlag::Metadata => "BrowseMetadata",
            BrowseFlag::DirectChildren => "BrowseDirectChildren",
        }
    }
}

/// UPnP ContentDirectory client over SOAP/HTTP.
#[derive(Debug, Clone)]
pub struct ContentDirectoryClient {
    timeout: Duration,
}

impl ContentDirectoryClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn browse(
        &self,
        directory: &DirectoryHandle,
        object_id: &str,
        flag: BrowseFlag,
    ) -> Result<Vec<EntryObserved>, BrowserError> {
        debug!(
            udn = %directory.udn,
            object_id,
            flag = flag.as_str(),
            "Browse"
        );

        let args = [
            ("ObjectID", object_id),
            ("BrowseFlag", flag.as_str()),
            ("Filter", "*"),
            ("StartingIndex", "0"),
            ("RequestedCount", "0"),
            ("SortCriteria", ""),
        ];

        let call_result = invoke_upnp_action_with_timeout(
            &directory.control_url,
            &directory.service_type,
            "Browse",
            &args,
            Some(self.timeout),
        )
        .map_err(|err| BrowserError::directory_query_failed("Browse", format!("{err:#}")))?;

        let didl_xml = browse_result_payload(call_result)?;
        observed_from_didl(&didl_xml)
    }
}

impl DirectoryProtocol for ContentDirectoryClient {
    fn fetch_metadata(
        &self,
        directory: &DirectoryHandle,
        entry_id: &str,
    ) -> Result<Vec<EntryObserved>, BrowserError> {
        self.browse(directory, entry_id, BrowseFlag::Metadata)
    }

    fn fetch_children(
        &self,
        directory: &DirectoryHandle,
        entry_id: &str,
    ) -> Result<Vec<EntryObserved>, BrowserError> {
        self.browse(directory, entry_id, BrowseFlag::DirectChildren)
    }
}

/// Checks the HTTP status and SOAP faults, then returns the DIDL-Lite text
/// carried by `BrowseResponse/Result`.
pub fn browse_result_payload(call_result: SoapCallResult) -> Result<String, BrowserError> {
    if let Some(env) = &call_result.envelope {
        if let Some(fault) = parse_soap_fault(env) {
            let message = match &fault.upnp_error {
                Some(err) if err.error_description.is_empty() => format!(
                    "UPnP error {}: {}",
                    err.error_code,
                    error_codes::describe(err.error_code).unwrap_or("unknown error")
                ),
                _ => fault.to_string(),
            };
            warn!(status = %call_result.status, "Browse returned a SOAP fault: {}", message);
            return Err(BrowserError::directory_query_failed("Browse", message));
        }
    }

    if !call_result.status.is_success() {
        return Err(BrowserError::directory_query_failed(
            "Browse",
            format!(
                "HTTP status {} and body: {}",
                call_result.status, call_result.raw_body
            ),
        ));
    }

    let envelope = call_result.envelope.ok_or_else(|| {
        BrowserError::directory_query_failed("Browse", "Missing SOAP envelope in response")
    })?;
    extract_result_payload(&envelope, "BrowseResponse")
}

fn extract_result_payload(
    envelope: &SoapEnvelope,
    response_name: &str,
) -> Result<String, BrowserError> {
    let response = envelope
        .body
        .child_with_suffix(response_name)
        .ok_or_else(|| {
            BrowserError::directory_query_failed(
                "Browse",
                format!("Missing {response_name} element in SOAP body"),
            )
        })?;

    let result = child_with_suffix(response, "Result").ok_or_else(|| {
        BrowserError::directory_query_failed("Browse", "Missing Result element in SOAP body")
    })?;

    Ok(result
        .get_text()
        .map(|text| text.into_owned())
        .unwrap_or_default())
}

/// Converts a DIDL-Lite listing into observed entries, keeping document order.
pub fn observed_from_didl(didl_xml: &str) -> Result<Vec<EntryObserved>, BrowserError> {
    if didl_xml.trim().is_empty() {
        return Ok(Vec::new());
    }

    DidlParser::new(didl_xml)
        .map(|object| {
            object
                .map(EntryObserved::from)
                .map_err(|err| BrowserError::directory_query_failed("DIDL-Lite", err))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmoupnp::soap::{build_soap_fault, build_soap_response, parse_soap_envelope};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const CDS: &str = "urn:schemas-upnp-org:service:ContentDirectory:1";

    const LISTING: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">
<container id="1" parentID="0" childCount="2"><dc:title>Music</dc:title><upnp:class>object.container.storageFolder</upnp:class></container>
<item id="5" parentID="0"><dc:title>Song.mp3</dc:title><upnp:class>object.item.audioItem.musicTrack</upnp:class><res protocolInfo="http-get:*:audio/mpeg:DLNA.ORG_PN=MP3">http://x/5</res><res protocolInfo="http-get:*:audio/flac:*">http://x/5.flac</res></item>
</DIDL-Lite>"#;

    fn call(status: u16, body: String) -> SoapCallResult {
        SoapCallResult {
            status: ureq::http::StatusCode::from_u16(status).unwrap(),
            envelope: parse_soap_envelope(body.as_bytes()).ok(),
            raw_body: body,
        }
    }

    fn browse_response(didl: &str) -> String {
        build_soap_response(
            CDS,
            "Browse",
            &[
                ("Result", didl),
                ("NumberReturned", "2"),
                ("TotalMatches", "2"),
                ("UpdateID", "1"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_observed_keeps_document_order_and_first_resource() {
        let observed = observed_from_didl(LISTING).unwrap();
        assert_eq!(observed.len(), 2);

        assert_eq!(observed[0].id, "1");
        assert_eq!(observed[0].class, "object.container.storageFolder");
        assert!(observed[0].resource.is_none());

        assert_eq!(observed[1].id, "5");
        assert_eq!(observed[1].parent_id, "0");
        assert_eq!(observed[1].title.as_deref(), Some("Song.mp3"));
        assert_eq!(
            observed[1].resource,
            Some(EntryResource::new("audio/mpeg", "http://x/5"))
        );
    }

    #[test]
    fn test_malformed_didl_is_a_query_failure() {
        let err = observed_from_didl("<DIDL-Lite><item id=\"1\">").unwrap_err();
        assert!(matches!(err, BrowserError::DirectoryQueryFailed(_)));

        let err = observed_from_didl(
            "<DIDL-Lite><item id=\"1\"><upnp:class>object.item</upnp:class></item></DIDL-Lite>",
        )
        .unwrap_err();
        assert!(matches!(err, BrowserError::DirectoryQueryFailed(_)));
    }

    #[test]
    fn test_payload_is_unescaped_result_text() {
        let payload = browse_result_payload(call(200, browse_response(LISTING))).unwrap();
        assert!(payload.starts_with("<DIDL-Lite"));
        assert!(payload.contains(r#"<item id="5" parentID="0">"#));
        assert_eq!(observed_from_didl(&payload).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_result_is_an_empty_listing() {
        let payload = browse_result_payload(call(200, browse_response(""))).unwrap();
        assert!(observed_from_didl(&payload).unwrap().is_empty());
    }

    #[test]
    fn test_soap_fault_is_reported_with_upnp_code() {
        let fault = build_soap_fault("s:Client", "UPnPError", Some((701, "No such object")))
            .unwrap();
        let err = browse_result_payload(call(500, fault)).unwrap_err();
        match err {
            BrowserError::DirectoryQueryFailed(msg) => {
                assert!(msg.contains("701"), "{msg}");
                assert!(msg.contains("No such object"), "{msg}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_http_error_without_envelope() {
        let err = browse_result_payload(call(404, "not found".to_string())).unwrap_err();
        match err {
            BrowserError::DirectoryQueryFailed(msg) => assert!(msg.contains("404"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_browse_response() {
        let body = build_soap_response(CDS, "GetSystemUpdateID", &[("Id", "3")]).unwrap();
        assert!(matches!(
            browse_result_payload(call(200, body)),
            Err(BrowserError::DirectoryQueryFailed(_))
        ));
    }

    /// Serves one HTTP exchange and returns the request it received.
    fn serve_once(response_body: String) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/ctl/ContentDir", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            if content_length > 0 {
                let mut body = vec![0u8; content_length];
                reader.read_exact(&mut body).unwrap();
                request.push_str(&String::from_utf8_lossy(&body));
            } else {
                // chunked body: read until the envelope is closed
                while !request.contains("Envelope>") {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 {
                        break;
                    }
                    request.push_str(&line);
                }
            }

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: text/xml; charset=\"utf-8\"\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            )
            .unwrap();
            stream.flush().unwrap();
            request
        });

        (url, handle)
    }

    #[test]
    fn test_browse_round_trip() {
        let (url, server) = serve_once(browse_response(LISTING));
        let client = ContentDirectoryClient::new(Duration::from_secs(5));
        let directory = DirectoryHandle::new("uuid:test", CDS, url);

        let observed = client.fetch_children(&directory, "0").unwrap();
        assert_eq!(observed.len(), 2);
        assert_eq!(observed[1].title.as_deref(), Some("Song.mp3"));

        let request = server.join().unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(lower.contains(&format!("soapaction: \"{}#browse\"", CDS.to_ascii_lowercase())));
        assert!(request.contains("<ObjectID>0</ObjectID>"));
        assert!(request.contains("<BrowseFlag>BrowseDirectChildren</BrowseFlag>"));
        assert!(request.contains("<Filter>*</Filter>"));
        assert!(request.contains("<RequestedCount>0</RequestedCount>"));
    }

    #[test]
    fn test_unreachable_server_is_a_query_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/ctl", listener.local_addr().unwrap());
        drop(listener);

        let client = ContentDirectoryClient::new(Duration::from_secs(2));
        let directory = DirectoryHandle::new("uuid:test", CDS, url);
        assert!(matches!(
            client.fetch_metadata(&directory, "0"),
            Err(BrowserError::DirectoryQueryFailed(_))
        ));
    }
}
