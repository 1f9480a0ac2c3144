//! Ouverture des ressources avec une application locale.

use std::process::{Child, Command, Stdio};
use std::thread;

use pmoconfig::Config;
use tracing::{debug, info, warn};

use crate::errors::BrowserError;

/// Application chosen to open a MIME type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerId {
    /// Configured command line, the URI is appended as last argument.
    Command(String),
    /// Freedesktop application id (`vlc.desktop`).
    DesktopEntry(String),
    /// Platform opener (`open` on macOS).
    SystemOpener,
}

impl HandlerId {
    pub fn label(&self) -> &str {
        match self {
            HandlerId::Command(command) => command,
            HandlerId::DesktopEntry(id) => id,
            HandlerId::SystemOpener => "system opener",
        }
    }
}

pub trait ApplicationLauncher {
    /// Application able to open `mime_type`, if any.
    fn resolve(&self, mime_type: &str) -> Option<HandlerId>;

    /// Starts `handler` on `uri` without waiting for it.
    fn launch(&self, handler: &HandlerId, uri: &str) -> Result<(), BrowserError>;
}

/// `audio/*`, `*/*`, `*` and exact matches, case-insensitive, MIME parameters ignored.
pub fn mime_matches(pattern: &str, mime_type: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if mime.is_empty() {
        return false;
    }
    if pattern == "*" || pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(major) => mime
            .split_once('/')
            .is_some_and(|(mime_major, _)| mime_major == major),
        None => pattern == mime,
    }
}

/// Configured handlers first, then the desktop default application.
#[derive(Debug, Clone, Default)]
pub struct DesktopLauncher {
    handlers: Vec<(String, String)>,
    use_desktop_defaults: bool,
}

impl DesktopLauncher {
    pub fn new(handlers: Vec<(String, String)>, use_desktop_defaults: bool) -> Self {
        Self {
            handlers,
            use_desktop_defaults,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.get_launcher_handlers(),
            config.get_use_desktop_defaults(),
        )
    }

    fn desktop_default(&self, mime_type: &str) -> Option<HandlerId> {
        #[cfg(target_os = "macos")]
        {
            let _ = mime_type;
            Some(HandlerId::SystemOpener)
        }

        #[cfg(not(target_os = "macos"))]
        {
            let output = match Command::new("xdg-mime")
                .args(["query", "default", mime_type])
                .stderr(Stdio::null())
                .output()
            {
                Ok(output) => output,
                Err(err) => {
                    debug!("xdg-mime unavailable: {}", err);
                    return None;
                }
            };

            let desktop_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !output.status.success() || desktop_id.is_empty() {
                return None;
            }
            Some(HandlerId::DesktopEntry(desktop_id))
        }
    }
}

impl ApplicationLauncher for DesktopLauncher {
    fn resolve(&self, mime_type: &str) -> Option<HandlerId> {
        if let Some((pattern, command)) = self
            .handlers
            .iter()
            .find(|(pattern, _)| mime_matches(pattern, mime_type))
        {
            debug!(mime_type, pattern = %pattern, "Configured handler");
            return Some(HandlerId::Command(command.clone()));
        }

        if !self.use_desktop_defaults || mime_type.trim().is_empty() {
            return None;
        }
        self.desktop_default(mime_type)
    }

    fn launch(&self, handler: &HandlerId, uri: &str) -> Result<(), BrowserError> {
        let mut command = match handler {
            HandlerId::Command(line) => {
                let (program, args) = split_command_line(line)
                    .map_err(|reason| BrowserError::launch_failed(uri, reason))?;
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            HandlerId::DesktopEntry(id) => {
                let mut command = Command::new("gtk-launch");
                command.arg(id);
                command
            }
            HandlerId::SystemOpener => Command::new("open"),
        };

        let child = command
            .arg(uri)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| BrowserError::launch_failed(uri, err))?;

        info!(uri, handler = handler.label(), "Open resource");
        reap(child);
        Ok(())
    }
}

/// Program and arguments of a configured command line, shell quoting honoured.
fn split_command_line(line: &str) -> Result<(String, Vec<String>), &'static str> {
    let mut words = shlex::split(line).ok_or("unbalanced quotes in command line")?;
    if words.is_empty() {
        return Err("empty command line");
    }
    let program = words.remove(0);
    Ok((program, words))
}

// Le processus lancé vit sa vie : on l'attend seulement pour ne pas laisser de zombie.
fn reap(mut child: Child) {
    let spawned = thread::Builder::new()
        .name("launcher-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => warn!("Launched application exited with {}", status),
            Ok(_) => {}
            Err(err) => warn!("Cannot wait for launched application: {}", err),
        });
    if let Err(err) = spawned {
        warn!("Cannot watch launched application: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_matches() {
        assert!(mime_matches("audio/*", "audio/mpeg"));
        assert!(mime_matches("Audio/MPEG", "audio/mpeg; charset=binary"));
        assert!(mime_matches("*/*", "image/jpeg"));
        assert!(mime_matches("*", "video/mp4"));
        assert!(!mime_matches("audio/*", "video/mp4"));
        assert!(!mime_matches("audio/flac", "audio/mpeg"));
        assert!(!mime_matches("*", ""));
    }

    #[test]
    fn test_split_command_line() {
        assert_eq!(
            split_command_line("'/opt/My Player/bin/play' --title \"Two words\"").unwrap(),
            (
                "/opt/My Player/bin/play".to_string(),
                vec!["--title".to_string(), "Two words".to_string()]
            )
        );
        assert_eq!(
            split_command_line("mpv   --no-video").unwrap(),
            ("mpv".to_string(), vec!["--no-video".to_string()])
        );
        assert!(split_command_line("   ").is_err());
        assert!(split_command_line("play 'unterminated").is_err());
    }

    #[test]
    fn test_configured_handlers_in_order() {
        let launcher = DesktopLauncher::new(
            vec![
                ("audio/flac".to_string(), "flac-player".to_string()),
                ("audio/*".to_string(), "mpv --no-video".to_string()),
            ],
            false,
        );

        assert_eq!(
            launcher.resolve("audio/flac"),
            Some(HandlerId::Command("flac-player".to_string()))
        );
        assert_eq!(
            launcher.resolve("audio/mpeg"),
            Some(HandlerId::Command("mpv --no-video".to_string()))
        );
        assert_eq!(launcher.resolve("image/png"), None);
        assert_eq!(launcher.resolve(""), None);
    }

    #[test]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_use_desktop_defaults(false).unwrap();
        config.set_launcher_handler("video/*", "vlc").unwrap();

        let launcher = DesktopLauncher::from_config(&config);
        assert_eq!(
            launcher.resolve("video/mp4"),
            Some(HandlerId::Command("vlc".to_string()))
        );
        assert_eq!(launcher.resolve("audio/mpeg"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_command() {
        let launcher = DesktopLauncher::default();
        launcher
            .launch(&HandlerId::Command("true --ignored".to_string()), "http://x/5")
            .unwrap();
    }

    #[test]
    fn test_launch_missing_program() {
        let launcher = DesktopLauncher::default();
        let err = launcher
            .launch(
                &HandlerId::Command("pmobrowser-no-such-player".to_string()),
                "http://x/5",
            )
            .unwrap_err();
        assert!(matches!(err, BrowserError::LaunchFailed(uri, _) if uri == "http://x/5"));

        let err = launcher
            .launch(&HandlerId::Command("   ".to_string()), "http://x/5")
            .unwrap_err();
        assert!(matches!(err, BrowserError::LaunchFailed(_, _)));
    }
}
