//! Device naming codec.
//!
//! Pure conversions between the textual naming conventions a NIC driver
//! exposes: PCI bus addresses, MAC addresses, switchdev port names
//! (`p0`, `pf0hpf`, `pf0vf4`, `pf0sf2`), VF/SF representor names and
//! auxiliary-bus device names (`mlx5_core.eth.0`). No I/O happens here;
//! the accessor and resolver layers feed strings in and out.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SriovError;

static PCI_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9a-fA-F]{4}):([0-9a-fA-F]{2}):([0-9a-fA-F]{2})\.([0-7])$")
        .expect("Invalid regex pattern")
});

static PHYSICAL_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^p(\d+)$").expect("Invalid regex pattern"));

static PCI_PF_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pf(\d+)hpf$").expect("Invalid regex pattern"));

static PCI_VF_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pf(\d+)vf(\d+)$").expect("Invalid regex pattern"));

static PCI_SF_PORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pf(\d+)sf(\d+)$").expect("Invalid regex pattern"));

static AUX_DEVICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:alnum:]_-]+\.[[:alnum:]_-]+\.\d+$").expect("Invalid regex pattern"));

/// A PCI address in standard `DDDD:BB:DD.F` domain:bus:device.function form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    /// PCI domain (segment), e.g. `0000`.
    pub domain: u16,
    /// Bus number.
    pub bus: u8,
    /// Device (slot) number.
    pub device: u8,
    /// Function number, 0-7.
    pub function: u8,
}

impl FromStr for PciAddress {
    type Err = SriovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PCI_ADDRESS_RE
            .captures(s)
            .ok_or_else(|| SriovError::lookup(s, "malformed PCI address"))?;
        // The regex guarantees each field parses.
        Ok(PciAddress {
            domain: u16::from_str_radix(&caps[1], 16).unwrap(),
            bus: u8::from_str_radix(&caps[2], 16).unwrap(),
            device: u8::from_str_radix(&caps[3], 16).unwrap(),
            function: u8::from_str_radix(&caps[4], 16).unwrap(),
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// A 48-bit hardware (MAC) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    /// Creates a MAC address from raw octets.
    pub fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    /// Returns the raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = SriovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 || part.len() != 2 {
                return Err(SriovError::lookup(s, "malformed MAC address"));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| SriovError::lookup(s, "malformed MAC address"))?;
            count += 1;
        }
        if count != 6 {
            return Err(SriovError::lookup(s, "malformed MAC address"));
        }
        Ok(MacAddr(octets))
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Switchdev port flavour of a netdevice, derived per query from its
/// port attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortFlavour {
    /// Physical uplink port.
    Physical,
    /// Host PF representor on a DPU.
    PciPf,
    /// VF representor.
    PciVf,
    /// Not a recognized switchdev port name.
    Unknown,
}

/// Parsed switchdev `phys_port_name` value.
///
/// One parser feeds the resolver and any flavour-dependent logic rather
/// than scattered prefix checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortName {
    /// Physical uplink port, `p<port>`.
    Physical {
        /// Physical port number.
        port: u32,
    },
    /// Host PF representor, `pf<pf>hpf`.
    PciPf {
        /// PF number.
        pf: u32,
    },
    /// VF representor, `pf<pf>vf<vf>`.
    PciVf {
        /// PF number.
        pf: u32,
        /// VF index.
        vf: u32,
    },
    /// Sub-function representor, `pf<pf>sf<sf>`.
    PciSf {
        /// PF number.
        pf: u32,
        /// SF index.
        sf: u32,
    },
    /// Anything else.
    Unknown,
}

impl PortName {
    /// Parses a switchdev `phys_port_name` string. Never fails; names that
    /// match no known convention come back as [`PortName::Unknown`].
    pub fn parse(name: &str) -> PortName {
        if let Some(caps) = PHYSICAL_PORT_RE.captures(name) {
            if let Ok(port) = caps[1].parse() {
                return PortName::Physical { port };
            }
        }
        if let Some(caps) = PCI_PF_PORT_RE.captures(name) {
            if let Ok(pf) = caps[1].parse() {
                return PortName::PciPf { pf };
            }
        }
        if let Some(caps) = PCI_VF_PORT_RE.captures(name) {
            if let (Ok(pf), Ok(vf)) = (caps[1].parse(), caps[2].parse()) {
                return PortName::PciVf { pf, vf };
            }
        }
        if let Some(caps) = PCI_SF_PORT_RE.captures(name) {
            if let (Ok(pf), Ok(sf)) = (caps[1].parse(), caps[2].parse()) {
                return PortName::PciSf { pf, sf };
            }
        }
        PortName::Unknown
    }

    /// Maps the parsed port name to its flavour.
    pub fn flavour(&self) -> PortFlavour {
        match self {
            PortName::Physical { .. } => PortFlavour::Physical,
            PortName::PciPf { .. } => PortFlavour::PciPf,
            PortName::PciVf { .. } => PortFlavour::PciVf,
            // SFs have no flavour of their own in the closed enumeration.
            PortName::PciSf { .. } | PortName::Unknown => PortFlavour::Unknown,
        }
    }
}

/// Formats a VF representor name for a legacy switchdev uplink:
/// `<uplink>_<vfIndex>`, e.g. `enp3s0f0_2`.
pub fn vf_representor_name(uplink: &str, vf_index: u32) -> String {
    format!("{uplink}_{vf_index}")
}

/// Formats an SF representor name: `en<bus>f<fn>pf<pf>sf<sfIndex>`,
/// e.g. `en3f0pf0sf2`. Bus and function come from the uplink's PCI
/// address, the PF number from its physical port.
pub fn sf_representor_name(bus: u8, function: u8, pf: u32, sf_index: u32) -> String {
    format!("en{bus}f{function}pf{pf}sf{sf_index}")
}

/// Formats the switchdev port name of a VF representor as seen from a
/// DPU: `pf<pf>vf<vf>`.
pub fn dpu_vf_port_name(pf: u32, vf: u32) -> String {
    format!("pf{pf}vf{vf}")
}

/// Formats the switchdev port name of an SF representor as seen from a
/// DPU: `pf<pf>sf<sf>`.
pub fn dpu_sf_port_name(pf: u32, sf: u32) -> String {
    format!("pf{pf}sf{sf}")
}

/// Returns true if `name` follows the auxiliary-bus device grammar
/// `<driver>.<kind>.<id>`, e.g. `mlx5_core.eth.0`.
pub fn is_aux_device_name(name: &str) -> bool {
    AUX_DEVICE_RE.is_match(name)
}
