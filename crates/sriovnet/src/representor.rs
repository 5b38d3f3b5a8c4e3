//! Switchdev representor resolution.
//!
//! Translates between the naming schemes of switchdev-mode NICs: uplink
//! (physical port) netdevices, VF/SF representors on the host, and the
//! representor namespace a DPU exposes for its host's functions. All
//! operations are stateless reads; nothing here takes a lock.

use tracing::debug;

use crate::accessor::DeviceAccessor;
use crate::error::{SriovError, SriovResult};
use crate::naming::{self, MacAddr, PortFlavour, PortName};

const PORT_NAME_ATTR: &str = "phys_port_name";
const SWITCH_ID_ATTR: &str = "phys_switch_id";
const NUMVFS_ATTR: &str = "device/sriov_numvfs";

/// DPU PF config attribute carrying the host PF's identity, one
/// `Key : Value` pair per line.
const PF_CONFIG_ATTR: &str = "smart_nic/pf/config";

/// Resolver over switchdev port attributes.
#[derive(Debug)]
pub struct RepresentorResolver<A> {
    accessor: A,
}

impl<A: DeviceAccessor> RepresentorResolver<A> {
    /// Creates a resolver over the given accessor.
    pub fn new(accessor: A) -> Self {
        RepresentorResolver { accessor }
    }

    fn port_name(&self, netdev: &str) -> SriovResult<PortName> {
        let raw = self
            .accessor
            .read_netdev_attr(netdev, PORT_NAME_ATTR)
            .map_err(|_| SriovError::lookup(netdev, "not a switchdev port"))?;
        Ok(PortName::parse(&raw))
    }

    /// Determines the switchdev port flavour of a netdevice.
    ///
    /// A device that is not a switchdev port, or whose port name matches
    /// no known convention, is an error; its flavour is
    /// [`PortFlavour::Unknown`] either way, so callers that only branch
    /// on the flavour can treat both cases alike.
    pub fn port_flavour(&self, netdev: &str) -> SriovResult<PortFlavour> {
        let flavour = self.port_name(netdev)?.flavour();
        if flavour == PortFlavour::Unknown {
            return Err(SriovError::lookup(netdev, "unrecognized port name"));
        }
        Ok(flavour)
    }

    /// Reads the MAC address of the host-side peer of a PF representor.
    ///
    /// Only PF representors (`pf<N>hpf`) carry a peer identity; physical
    /// uplinks and VF representors are errors.
    pub fn peer_mac_address(&self, netdev: &str) -> SriovResult<MacAddr> {
        match self.port_name(netdev)? {
            PortName::PciPf { .. } => {}
            _ => {
                return Err(SriovError::lookup(
                    netdev,
                    "peer MAC is only exposed for PF representors",
                ));
            }
        }

        let switch_id = self.accessor.read_netdev_attr(netdev, SWITCH_ID_ATTR)?;
        let uplink = self.uplink_for_switch_id(&switch_id)?;
        let config = self.accessor.read_netdev_attr(&uplink, PF_CONFIG_ATTR)?;

        for line in config.lines() {
            let mut parts = line.splitn(2, ':');
            if parts.next().map(str::trim) == Some("MAC") {
                if let Some(value) = parts.next() {
                    return value.trim().parse();
                }
            }
        }
        Err(SriovError::lookup(netdev, "PF config carries no MAC entry"))
    }

    /// Derives the VF representor name for a legacy switchdev uplink:
    /// `<uplink>_<vfIndex>`.
    ///
    /// Fails when the uplink is not an SR-IOV PF or the index exceeds
    /// its configured VF count.
    pub fn vf_representor(&self, uplink: &str, vf_index: u32) -> SriovResult<String> {
        let num_vfs: u32 = self
            .accessor
            .read_netdev_attr(uplink, NUMVFS_ATTR)
            .map_err(|_| SriovError::lookup(uplink, "not an SR-IOV uplink"))?
            .parse()
            .map_err(|_| SriovError::lookup(uplink, "unparseable sriov_numvfs"))?;
        if vf_index >= num_vfs {
            return Err(SriovError::lookup(
                uplink,
                format!("VF index {vf_index} out of range (numvfs {num_vfs})"),
            ));
        }
        Ok(naming::vf_representor_name(uplink, vf_index))
    }

    /// Derives the SF representor name for an uplink:
    /// `en<bus>f<fn>pf<pf>sf<sfIndex>`, from the uplink's PCI address
    /// and physical port number.
    pub fn sf_representor(&self, uplink: &str, sf_index: u32) -> SriovResult<String> {
        let pci = self.accessor.pci_for_netdev(uplink)?;
        let pf = match self.port_name(uplink)? {
            PortName::Physical { port } => port,
            _ => return Err(SriovError::lookup(uplink, "not a physical uplink port")),
        };
        Ok(naming::sf_representor_name(
            pci.bus,
            pci.function,
            pf,
            sf_index,
        ))
    }

    /// Resolves a PF's or one of its VFs' PCI address to the shared
    /// uplink (physical port) representor netdevice.
    pub fn uplink_representor(&self, pci: &crate::naming::PciAddress) -> SriovResult<String> {
        // A VF address resolves through physfn to the PF it belongs to.
        let pf_pci = self.accessor.physfn_pci(pci)?.unwrap_or(*pci);

        for netdev in self.accessor.netdevs_for_pci(&pf_pci)? {
            if let Ok(PortName::Physical { .. }) = self.port_name(&netdev) {
                debug!(pci = %pci, uplink = %netdev, "Resolved uplink representor");
                return Ok(netdev);
            }
        }
        Err(SriovError::lookup(
            pci.to_string(),
            "no physical-port netdev on PF",
        ))
    }

    /// Resolves a VF representor in a DPU topology, where representors
    /// live in the DPU's own port namespace: finds the netdevice whose
    /// switchdev port name is `pf<pfId>vf<vfIndex>`.
    pub fn vf_representor_dpu(&self, pf_id: &str, vf_index: &str) -> SriovResult<String> {
        let pf = parse_dpu_pf_id(pf_id)?;
        let vf = parse_index(vf_index)?;
        self.find_port(&naming::dpu_vf_port_name(pf, vf))
    }

    /// Resolves an SF representor in a DPU topology; analogous to
    /// [`RepresentorResolver::vf_representor_dpu`] with port name
    /// `pf<pfId>sf<sfIndex>`.
    pub fn sf_representor_dpu(&self, pf_id: &str, sf_index: &str) -> SriovResult<String> {
        let pf = parse_dpu_pf_id(pf_id)?;
        let sf = parse_index(sf_index)?;
        self.find_port(&naming::dpu_sf_port_name(pf, sf))
    }

    fn find_port(&self, expected: &str) -> SriovResult<String> {
        for netdev in self.accessor.list_netdevs()? {
            if let Ok(raw) = self.accessor.read_netdev_attr(&netdev, PORT_NAME_ATTR) {
                if raw == expected {
                    return Ok(netdev);
                }
            }
        }
        Err(SriovError::not_found("representor port", expected.to_string()))
    }

    fn uplink_for_switch_id(&self, switch_id: &str) -> SriovResult<String> {
        for netdev in self.accessor.list_netdevs()? {
            let same_switch = self
                .accessor
                .read_netdev_attr(&netdev, SWITCH_ID_ATTR)
                .map(|id| id == switch_id)
                .unwrap_or(false);
            if !same_switch {
                continue;
            }
            if let Ok(PortName::Physical { .. }) = self.port_name(&netdev) {
                return Ok(netdev);
            }
        }
        Err(SriovError::lookup(
            switch_id.to_string(),
            "no uplink port on switch",
        ))
    }
}

/// DPU-hosted NICs expose at most two host-facing PFs.
fn parse_dpu_pf_id(pf_id: &str) -> SriovResult<u32> {
    match pf_id {
        "0" => Ok(0),
        "1" => Ok(1),
        other => Err(SriovError::lookup(other, "DPU PF id must be 0 or 1")),
    }
}

fn parse_index(index: &str) -> SriovResult<u32> {
    index
        .parse()
        .map_err(|_| SriovError::lookup(index, "index is not a number"))
}
