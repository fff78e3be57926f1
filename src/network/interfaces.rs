use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, warn};

/// Source of local interface addresses, in the order the OS reports them.
pub trait InterfaceSource {
    fn addresses(&self) -> Vec<IpAddr>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn addresses(&self) -> Vec<IpAddr> {
        match get_if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces
                .into_iter()
                .inspect(|iface| debug!("Interface {}: {}", iface.name, iface.ip()))
                .map(|iface| iface.ip())
                .collect(),
            Err(e) => {
                warn!("Failed to list network interfaces: {}", e);
                Vec::new()
            }
        }
    }
}

impl InterfaceSource for Vec<IpAddr> {
    fn addresses(&self) -> Vec<IpAddr> {
        self.clone()
    }
}

/// 10.0.0.0/8, 172.16.0.0/12 or 192.168.0.0/16.
fn is_lan_ipv4(ip: &Ipv4Addr) -> bool {
    match ip.octets() {
        [10, ..] => true,
        [172, b, ..] => (16..=31).contains(&b),
        [192, 168, ..] => true,
        _ => false,
    }
}

/// First address in a private IPv4 range, in iteration order.
pub fn first_private_ipv4<I>(addresses: I) -> Option<Ipv4Addr>
where
    I: IntoIterator<Item = IpAddr>,
{
    addresses.into_iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if is_lan_ipv4(&v4) => Some(v4),
        _ => None,
    })
}
