use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::host::Progress;
use crate::{CastError, CastTarget, Result};

pub const CHROMECAST_SERVICE: &str = "_googlecast._tcp.local.";

/// How often the cancel flag is checked while waiting on mDNS.
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(250);

#[async_trait(?Send)]
pub trait TargetDiscovery {
    /// Snapshot of receivers visible on the network, sorted by name.
    async fn discover(&self, progress: &mut dyn Progress) -> Result<Vec<CastTarget>>;
}

/// Chromecast discovery over mDNS.
#[derive(Debug, Clone)]
pub struct MdnsDiscovery {
    timeout: Duration,
}

impl MdnsDiscovery {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Collects resolved services, one entry per friendly name.
#[derive(Debug, Default)]
struct TargetSet {
    targets: BTreeMap<String, CastTarget>,
}

impl TargetSet {
    fn add(&mut self, name: &str, addresses: &[IpAddr], port: u16) {
        // Chromecasts usually announce one IPv4 address, prefer it over v6
        let Some(address) = addresses
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addresses.first())
            .copied()
        else {
            warn!("No address announced for {}", name);
            return;
        };

        let target = CastTarget {
            name: name.to_string(),
            address,
            port,
        };

        match self.targets.get(name) {
            Some(existing) if existing.address.is_ipv4() && !address.is_ipv4() => {}
            _ => {
                debug!("Found receiver {}", target);
                self.targets.insert(name.to_string(), target);
            }
        }
    }

    fn into_sorted(self) -> Vec<CastTarget> {
        self.targets.into_values().collect()
    }
}

#[async_trait(?Send)]
impl TargetDiscovery for MdnsDiscovery {
    async fn discover(&self, progress: &mut dyn Progress) -> Result<Vec<CastTarget>> {
        info!("Discovering Chromecast devices...");

        let mdns = ServiceDaemon::new()
            .map_err(|e| CastError::Network(format!("Failed to create mDNS daemon: {}", e)))?;
        let receiver = mdns
            .browse(CHROMECAST_SERVICE)
            .map_err(|e| CastError::Network(format!("Failed to browse for Chromecast: {}", e)))?;

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut found = TargetSet::default();
        let mut outcome = Ok(());

        loop {
            if progress.is_cancelled() {
                outcome = Err(CastError::Cancelled);
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }

            let elapsed = now.duration_since(started).as_millis() as u64;
            let total = self.timeout.as_millis().max(1) as u64;
            progress.update((elapsed * 100 / total).min(100) as u8, "Searching for devices");

            let wait = (deadline - now).min(CANCEL_CHECK_INTERVAL);
            match time::timeout(wait, receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    let name = info
                        .get_properties()
                        .get("fn")
                        .map(|p| p.val_str().to_string())
                        .unwrap_or_else(|| info.get_fullname().trim_end_matches('.').to_string());
                    let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();
                    found.add(&name, &addresses, info.get_port());
                }
                Ok(Ok(_)) => {}
                Ok(Err(_)) => break,
                Err(_) => {}
            }
        }

        if let Err(e) = mdns.shutdown() {
            debug!("Failed to shut down mDNS daemon: {}", e);
        }

        outcome?;
        let targets = found.into_sorted();
        info!("Discovery finished, {} receiver(s) found", targets.len());
        Ok(targets)
    }
}
