//! Turning a host locator into something the receiver can fetch.
//!
//! Remote URLs pass through untouched. Local files are exposed through the
//! host's own web server (the bridge), addressed by the first private LAN IPv4
//! found on this machine.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RANGE};
use tracing::{debug, info, warn};

use crate::host::Prompter;
use crate::network::{first_private_ipv4, InterfaceSource, SystemInterfaces};
use crate::settings::{SettingsStore, WEB_BRIDGE_ENABLED};
use crate::{CastError, LocatorKind, PlaybackLocator, Result};

const HEADING: &str = "Cast";

pub struct UrlResolver<I = SystemInterfaces> {
    interfaces: I,
    client: reqwest::Client,
}

impl UrlResolver<SystemInterfaces> {
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_interfaces(SystemInterfaces, probe_timeout)
    }
}

impl<I: InterfaceSource> UrlResolver<I> {
    pub fn with_interfaces(interfaces: I, probe_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(probe_timeout)
            .build()
            .unwrap_or_default();

        Self { interfaces, client }
    }

    /// Resolve `locator` into a URL the receiver can fetch.
    ///
    /// With `allow_prompting` false nothing is shown to the user and settings
    /// are never modified.
    pub fn resolve(
        &self,
        locator: &PlaybackLocator,
        allow_prompting: bool,
        settings: &mut dyn SettingsStore,
        prompter: &dyn Prompter,
    ) -> Result<String> {
        match locator.kind() {
            LocatorKind::Http => Ok(locator.as_str().to_string()),
            LocatorKind::Rtmp => {
                if allow_prompting {
                    prompter.warn(HEADING, "RTMP streams can't be played on Chromecast");
                }
                Err(CastError::UnsupportedScheme(locator.as_str().to_string()))
            }
            LocatorKind::LocalFile => self.resolve_local(locator, allow_prompting, settings, prompter),
        }
    }

    fn resolve_local(
        &self,
        locator: &PlaybackLocator,
        allow_prompting: bool,
        settings: &mut dyn SettingsStore,
        prompter: &dyn Prompter,
    ) -> Result<String> {
        if !settings.bridge_enabled() {
            if !allow_prompting {
                return Err(CastError::BridgeDisabled);
            }
            let accepted = prompter.confirm(
                HEADING,
                "Local files are served to the Chromecast through the web server. Enable it now?",
            );
            if !accepted {
                return Err(CastError::BridgeDisabled);
            }
            settings.set_bool(WEB_BRIDGE_ENABLED, true)?;
            info!("Web server enabled for casting local files");
        }

        let ip = first_private_ipv4(self.interfaces.addresses()).ok_or(CastError::NoLocalAddress)?;
        let url = bridge_url(&ip.to_string(), settings.bridge_port(), locator.as_str());
        debug!("Resolved {} to {}", locator, url);
        Ok(url)
    }

    /// Content type of a resolved resource.
    ///
    /// Extension lookup first; a network probe only when that is inconclusive.
    pub async fn content_type(&self, locator: &PlaybackLocator, url: &str) -> Result<String> {
        if let Some(mime) = guess_from_extension(locator.as_str()).or_else(|| guess_from_extension(url)) {
            return Ok(mime);
        }
        self.probe_content_type(url).await
    }

    async fn probe_content_type(&self, url: &str) -> Result<String> {
        debug!("Probing content type of {}", url);

        let head = self.client.head(url).send().await;
        let response = match head {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!("HEAD {} returned {}, retrying with GET", url, resp.status());
                self.client
                    .get(url)
                    .header(RANGE, "bytes=0-0")
                    .send()
                    .await
                    .map_err(|e| probe_error(url, e))?
            }
            Err(e) => return Err(probe_error(url, e)),
        };

        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CastError::ContentTypeUnknown(url.to_string()))
    }
}

fn probe_error(url: &str, e: reqwest::Error) -> CastError {
    warn!("Content type probe of {} failed: {}", url, e);
    CastError::ContentTypeUnknown(url.to_string())
}

fn guess_from_extension(path: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    mime_guess::from_path(path).first().map(|m| m.essence_str().to_string())
}

fn bridge_url(ip: &str, port: u16, path: &str) -> String {
    format!("http://{}:{}/{}", ip, port, urlencoding::encode(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Progress;
    use crate::settings::{MemorySettings, WEB_BRIDGE_PORT};
    use std::cell::{Cell, RefCell};
    use std::net::IpAddr;

    #[derive(Default)]
    struct RecordingPrompter {
        warnings: RefCell<Vec<String>>,
        questions: Cell<u32>,
        answer: bool,
    }

    struct NoProgress;

    impl Progress for NoProgress {
        fn update(&mut self, _percent: u8, _message: &str) {}
        fn is_cancelled(&self) -> bool {
            false
        }
        fn close(&mut self) {}
    }

    impl Prompter for RecordingPrompter {
        fn notify(&self, _heading: &str, _message: &str) {}
        fn warn(&self, _heading: &str, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }
        fn confirm(&self, _heading: &str, _question: &str) -> bool {
            self.questions.set(self.questions.get() + 1);
            self.answer
        }
        fn progress(&self, _heading: &str) -> Box<dyn Progress> {
            Box::new(NoProgress)
        }
    }

    /// Panics if the resolver ever looks at interfaces.
    struct UntouchableInterfaces;

    impl InterfaceSource for UntouchableInterfaces {
        fn addresses(&self) -> Vec<IpAddr> {
            panic!("interfaces must not be scanned");
        }
    }

    fn lan(list: &[&str]) -> UrlResolver<Vec<IpAddr>> {
        let ips = list.iter().map(|s| s.parse().unwrap()).collect();
        UrlResolver::with_interfaces(ips, Duration::from_millis(200))
    }

    #[test]
    fn http_locators_pass_through() {
        let resolver = UrlResolver::with_interfaces(UntouchableInterfaces, Duration::from_millis(200));
        let mut settings = MemorySettings::new();
        let prompter = RecordingPrompter::default();

        for url in ["http://example.com/a b.mp4", "HTTPS://cdn.example.com/x?y=1"] {
            let resolved = resolver
                .resolve(&PlaybackLocator::new(url), true, &mut settings, &prompter)
                .unwrap();
            assert_eq!(resolved, url);
        }
        assert_eq!(prompter.questions.get(), 0);
    }

    #[test]
    fn rtmp_is_unsupported_and_silent_without_prompting() {
        let resolver = lan(&["192.168.0.2"]);
        let mut settings = MemorySettings::new();
        let prompter = RecordingPrompter::default();

        let err = resolver
            .resolve(&PlaybackLocator::new("rtmp://live/x"), false, &mut settings, &prompter)
            .unwrap_err();
        assert!(matches!(err, CastError::UnsupportedScheme(_)));
        assert!(prompter.warnings.borrow().is_empty());

        let err = resolver
            .resolve(&PlaybackLocator::new("rtmp://live/x"), true, &mut settings, &prompter)
            .unwrap_err();
        assert!(matches!(err, CastError::UnsupportedScheme(_)));
        assert_eq!(prompter.warnings.borrow().len(), 1);
    }

    #[test]
    fn disabled_bridge_without_prompting_leaves_settings_alone() {
        let resolver = lan(&["192.168.0.2"]);
        let mut settings = MemorySettings::new();
        let prompter = RecordingPrompter {
            answer: true,
            ..Default::default()
        };

        let err = resolver
            .resolve(&PlaybackLocator::new("/movies/a.mkv"), false, &mut settings, &prompter)
            .unwrap_err();
        assert!(matches!(err, CastError::BridgeDisabled));
        assert_eq!(prompter.questions.get(), 0);
        assert_eq!(settings.get(WEB_BRIDGE_ENABLED), None);
    }

    #[test]
    fn refused_prompt_keeps_bridge_disabled() {
        let resolver = lan(&["192.168.0.2"]);
        let mut settings = MemorySettings::new();
        let prompter = RecordingPrompter::default();

        let err = resolver
            .resolve(&PlaybackLocator::new("/movies/a.mkv"), true, &mut settings, &prompter)
            .unwrap_err();
        assert!(matches!(err, CastError::BridgeDisabled));
        assert_eq!(prompter.questions.get(), 1);
        assert!(!settings.bridge_enabled());
    }

    #[test]
    fn accepted_prompt_enables_bridge_and_resolves() {
        let resolver = lan(&["127.0.0.1", "172.20.0.5", "8.8.8.8"]);
        let mut settings = MemorySettings::new().with(WEB_BRIDGE_PORT, "8080");
        let prompter = RecordingPrompter {
            answer: true,
            ..Default::default()
        };

        let url = resolver
            .resolve(&PlaybackLocator::new("/movies/My Film.mkv"), true, &mut settings, &prompter)
            .unwrap();
        assert!(settings.bridge_enabled());
        assert_eq!(url, "http://172.20.0.5:8080/%2Fmovies%2FMy%20Film.mkv");
    }

    #[test]
    fn no_private_address_fails() {
        let resolver = lan(&["127.0.0.1", "8.8.8.8"]);
        let mut settings = MemorySettings::new().with(WEB_BRIDGE_ENABLED, "true");
        let prompter = RecordingPrompter::default();

        let err = resolver
            .resolve(&PlaybackLocator::new("/movies/a.mkv"), false, &mut settings, &prompter)
            .unwrap_err();
        assert!(matches!(err, CastError::NoLocalAddress));
    }

    #[tokio::test]
    async fn content_type_from_extension_needs_no_network() {
        let resolver = lan(&[]);
        let mime = resolver
            .content_type(&PlaybackLocator::new("/movies/a.mp4"), "http://10.0.0.1:1/%2Fmovies%2Fa.mp4")
            .await
            .unwrap();
        assert_eq!(mime, "video/mp4");

        let mime = resolver
            .content_type(
                &PlaybackLocator::new("http://host/clip.webm?token=abc"),
                "http://host/clip.webm?token=abc",
            )
            .await
            .unwrap();
        assert_eq!(mime, "video/webm");
    }

    #[tokio::test]
    async fn failed_lookup_is_content_type_unknown() {
        let resolver = lan(&[]);
        let err = resolver
            .content_type(&PlaybackLocator::new("http://127.0.0.1:9/stream"), "http://127.0.0.1:9/stream")
            .await
            .unwrap_err();
        assert!(matches!(err, CastError::ContentTypeUnknown(_)));
        assert!(!err.is_fatal());
    }
}
