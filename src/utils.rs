use std::process;

use pnet::datalink::{self, NetworkInterface};

#[cfg(target_os = "macos")]
pub const DEFAULT_INTERFACE: &str = "en0";
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_INTERFACE: &str = "eth0";

pub fn find_interface(name: &str) -> Option<NetworkInterface> {
    datalink::interfaces().into_iter().find(|iface| iface.name == name)
}

/// Echo identifier for this process: the low 16 bits of its pid.
pub fn echo_identifier() -> u16 {
    (process::id() & 0xffff) as u16
}
