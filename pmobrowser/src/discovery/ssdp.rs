use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use pmoconfig::Config;
use pmoupnp::ssdp::{MEDIA_SERVER_DEVICE_TYPE, SsdpClient, SsdpEvent, extract_udn_from_usn};
use tracing::{debug, info, warn};

use super::description::{DeviceDescriptionProvider, HttpXmlDescriptionProvider};
use super::{DeviceAvailable, DiscoveryListener};
use crate::errors::BrowserError;

/// Délai entre deux M-SEARCH de la rafale de démarrage.
const MSEARCH_INTERVAL: Duration = Duration::from_millis(200);

/// Réglages de la découverte SSDP.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub search_targets: Vec<String>,
    pub mx: u32,
    pub description_timeout: Duration,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            search_targets: vec![MEDIA_SERVER_DEVICE_TYPE.to_string()],
            mx: 3,
            description_timeout: Duration::from_secs(5),
        }
    }
}

impl DiscoverySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            search_targets: config.get_search_targets(),
            mx: u32::try_from(config.get_msearch_mx()).unwrap_or(u32::MAX),
            description_timeout: config.get_description_timeout(),
        }
    }
}

fn is_media_server_type(nt: &str) -> bool {
    nt.to_ascii_lowercase()
        .starts_with("urn:schemas-upnp-org:device:mediaserver:")
}

/// Turns SSDP events into `DeviceAvailable` reports, once per UDN.
///
/// A session lives from `start` to `stop`: a restart builds a new one, so
/// servers still on the network are announced again.
pub struct DiscoverySession<P>
where
    P: DeviceDescriptionProvider,
{
    provider: P,
    announced: HashSet<String>,
}

impl<P> DiscoverySession<P>
where
    P: DeviceDescriptionProvider,
{
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            announced: HashSet::new(),
        }
    }

    pub fn handle_ssdp_event(&mut self, event: SsdpEvent) -> Option<DeviceAvailable> {
        let (usn, nt, location) = match event {
            SsdpEvent::Alive {
                usn, nt, location, ..
            } => (usn, nt, location),
            SsdpEvent::SearchResponse {
                usn, st, location, ..
            } => (usn, st, location),
            SsdpEvent::ByeBye { usn, .. } => {
                if let Some(udn) = extract_udn_from_usn(&usn) {
                    if self.announced.remove(&udn) {
                        debug!(udn = %udn, "Media server left the network");
                    }
                }
                return None;
            }
        };

        if !is_media_server_type(&nt) {
            return None;
        }

        let udn = extract_udn_from_usn(&usn)?;
        if self.announced.contains(&udn) {
            return None;
        }

        let description = match self.provider.describe(&udn, &location) {
            Ok(description) => description,
            Err(err) => {
                warn!(
                    udn = %udn,
                    location = %location,
                    "Failed to fetch/parse server description: {}",
                    err
                );
                return None;
            }
        };

        let device = description.media_server(&udn)?;
        let directory = description.directory_handle(&location, device);
        let friendly_name = device.friendly_name.clone().unwrap_or_else(|| udn.clone());

        match &directory {
            Some(handle) => info!(
                udn = %udn,
                name = %friendly_name,
                control_url = %handle.control_url,
                "Media server available"
            ),
            None => info!(
                udn = %udn,
                name = %friendly_name,
                "Media server without ContentDirectory"
            ),
        }

        self.announced.insert(udn);
        Some(DeviceAvailable {
            directory,
            friendly_name,
        })
    }
}

struct RunningSession {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Découverte des MediaServer par SSDP.
///
/// Le thread SSDP ne fait que pousser des [`DeviceAvailable`] dans un canal ;
/// le thread de l'interface le vide et alimente le moteur de navigation.
pub struct SsdpDiscovery {
    settings: DiscoverySettings,
    sender: Sender<DeviceAvailable>,
    receiver: Receiver<DeviceAvailable>,
    session: Option<RunningSession>,
}

impl SsdpDiscovery {
    pub fn new(settings: DiscoverySettings) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            settings,
            sender,
            receiver,
            session: None,
        }
    }

    /// Receiving end of the `DeviceAvailable` reports.
    pub fn receiver(&self) -> Receiver<DeviceAvailable> {
        self.receiver.clone()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }
}

impl DiscoveryListener for SsdpDiscovery {
    fn start(&mut self) -> Result<(), BrowserError> {
        if self.session.is_some() {
            return Ok(());
        }

        let client =
            SsdpClient::new().map_err(|e| BrowserError::DiscoveryUnavailable(e.to_string()))?;

        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = Arc::clone(&running);
        let sender = self.sender.clone();
        let settings = self.settings.clone();

        let thread = thread::Builder::new()
            .name("ssdp-discovery".to_string())
            .spawn(move || {
                let provider = HttpXmlDescriptionProvider::new(settings.description_timeout);
                let mut session = DiscoverySession::new(provider);

                for st in &settings.search_targets {
                    if let Err(e) = client.send_msearch(st, settings.mx) {
                        warn!("Failed to send M-SEARCH for {}: {}", st, e);
                    }
                    thread::sleep(MSEARCH_INTERVAL);
                }

                client.run_event_loop(&running_for_thread, |event| {
                    if let Some(device) = session.handle_ssdp_event(event) {
                        if sender.send(device).is_err() {
                            running_for_thread.store(false, Ordering::Release);
                        }
                    }
                });
            })
            .map_err(|e| BrowserError::DiscoveryUnavailable(e.to_string()))?;

        debug!("SSDP discovery started");
        self.session = Some(RunningSession { running, thread });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.running.store(false, Ordering::Release);
            if session.thread.join().is_err() {
                warn!("SSDP discovery thread panicked");
            }
            debug!("SSDP discovery stopped");
        }
    }
}

impl Drop for SsdpDiscovery {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::description::{DescriptionError, ParsedDescription, parse_description};
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;

    struct StaticProvider {
        xml: &'static str,
        calls: AtomicUsize,
    }

    impl StaticProvider {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DeviceDescriptionProvider for StaticProvider {
        fn describe(
            &self,
            _udn: &str,
            _location: &str,
        ) -> Result<ParsedDescription, DescriptionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            parse_description(self.xml.as_bytes())
        }
    }

    const SERVER: &str = r#"<root><device>
        <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
        <friendlyName>Living Room</friendlyName>
        <UDN>uuid:server-1</UDN>
        <serviceList><service>
            <serviceType>urn:schemas-upnp-org:service:ContentDirectory:1</serviceType>
            <controlURL>/cd/control</controlURL>
        </service></serviceList>
    </device></root>"#;

    fn from() -> SocketAddr {
        "192.168.1.20:1900".parse().unwrap()
    }

    fn alive(nt: &str) -> SsdpEvent {
        SsdpEvent::Alive {
            usn: format!("uuid:server-1::{nt}"),
            nt: nt.to_string(),
            location: "http://192.168.1.20:8200/desc.xml".to_string(),
            server: "Linux UPnP/1.0".to_string(),
            max_age: 1800,
            from: from(),
        }
    }

    fn session(xml: &'static str) -> DiscoverySession<StaticProvider> {
        DiscoverySession::new(StaticProvider {
            xml,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_media_server_is_announced_once() {
        let mut session = session(SERVER);

        let device = session
            .handle_ssdp_event(alive(MEDIA_SERVER_DEVICE_TYPE))
            .unwrap();
        assert_eq!(device.friendly_name, "Living Room");
        let handle = device.directory.unwrap();
        assert_eq!(handle.udn, "uuid:server-1");
        assert_eq!(handle.control_url, "http://192.168.1.20:8200/cd/control");

        assert!(session
            .handle_ssdp_event(alive(MEDIA_SERVER_DEVICE_TYPE))
            .is_none());
        assert_eq!(session.provider.calls(), 1);
    }

    #[test]
    fn test_other_notifications_are_ignored() {
        let mut session = session(SERVER);
        assert!(session.handle_ssdp_event(alive("upnp:rootdevice")).is_none());
        assert!(session
            .handle_ssdp_event(alive("urn:schemas-upnp-org:service:ContentDirectory:1"))
            .is_none());
        assert_eq!(session.provider.calls(), 0);
    }

    #[test]
    fn test_search_response_and_byebye() {
        let mut session = session(SERVER);
        let response = SsdpEvent::SearchResponse {
            usn: "uuid:server-1::urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            st: MEDIA_SERVER_DEVICE_TYPE.to_string(),
            location: "http://192.168.1.20:8200/desc.xml".to_string(),
            server: String::new(),
            max_age: 1800,
            from: from(),
        };
        assert!(session.handle_ssdp_event(response.clone()).is_some());
        assert!(session.handle_ssdp_event(response.clone()).is_none());

        session.handle_ssdp_event(SsdpEvent::ByeBye {
            usn: "uuid:server-1::urn:schemas-upnp-org:device:MediaServer:1".to_string(),
            nt: MEDIA_SERVER_DEVICE_TYPE.to_string(),
            from: from(),
        });
        assert!(session.handle_ssdp_event(response).is_some());
    }

    #[test]
    fn test_server_without_content_directory_has_no_handle() {
        let mut session = session(
            r#"<root><device>
                <deviceType>urn:schemas-upnp-org:device:MediaServer:1</deviceType>
                <friendlyName>Printer</friendlyName>
                <UDN>uuid:server-1</UDN>
            </device></root>"#,
        );
        let device = session
            .handle_ssdp_event(alive(MEDIA_SERVER_DEVICE_TYPE))
            .unwrap();
        assert!(device.directory.is_none());
        assert_eq!(device.friendly_name, "Printer");
    }

    #[test]
    fn test_broken_description_is_retried() {
        let mut session = session("<root>");
        assert!(session
            .handle_ssdp_event(alive(MEDIA_SERVER_DEVICE_TYPE))
            .is_none());
        assert!(session
            .handle_ssdp_event(alive(MEDIA_SERVER_DEVICE_TYPE))
            .is_none());
        assert_eq!(session.provider.calls(), 2);
    }

    #[test]
    fn test_settings_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_msearch_mx(2).unwrap();

        let settings = DiscoverySettings::from_config(&config);
        assert_eq!(settings.mx, 2);
        assert_eq!(settings.search_targets, vec![MEDIA_SERVER_DEVICE_TYPE.to_string()]);
        assert_eq!(settings.description_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_stop_before_start_is_a_no_op() {
        let mut discovery = SsdpDiscovery::new(DiscoverySettings::default());
        assert!(!discovery.is_running());

        discovery.stop();
        assert!(!discovery.is_running());
        assert!(discovery.receiver().try_recv().is_err());
    }
}
