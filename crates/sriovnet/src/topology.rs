//! PCI topology walker.
//!
//! Resolves VF-to-PF PCI relationships and enumerates the auxiliary-bus
//! offload netdevices (RDMA/eth split devices) bound to a PCI function.
//! Stateless; every query walks the live device tree.

use crate::accessor::DeviceAccessor;
use crate::error::{SriovError, SriovResult};
use crate::naming::{self, PciAddress};

/// Walker over PCI parent/child relationships.
#[derive(Debug)]
pub struct PciTopology<A> {
    accessor: A,
}

impl<A: DeviceAccessor> PciTopology<A> {
    /// Creates a walker over the given accessor.
    pub fn new(accessor: A) -> Self {
        PciTopology { accessor }
    }

    /// Resolves a VF PCI address to its parent PF's PCI address.
    ///
    /// Fails when the address does not name a virtual function.
    pub fn pf_pci_from_vf_pci(&self, vf_pci: &PciAddress) -> SriovResult<PciAddress> {
        self.accessor.physfn_pci(vf_pci)?.ok_or_else(|| {
            SriovError::lookup(vf_pci.to_string(), "not a virtual function")
        })
    }

    /// Enumerates the PCI addresses of a PF's configured VFs, in
    /// ascending VF-index order. Empty when SR-IOV is enabled with no
    /// VFs configured.
    pub fn vf_pci_dev_list(&self, pf_netdev: &str) -> SriovResult<Vec<PciAddress>> {
        let mut vfs = self.accessor.vf_pci_list(pf_netdev)?;
        vfs.sort_by_key(|(index, _)| *index);
        Ok(vfs.into_iter().map(|(_, addr)| addr).collect())
    }

    /// Lists the auxiliary-bus child device names bound to a PCI
    /// function, sorted.
    ///
    /// A valid address with no auxiliary children yields an empty list;
    /// an address absent from the device tree yields `NotFound`. The two
    /// cases stay distinguishable.
    pub fn aux_netdevs_from_pci(&self, pci: &PciAddress) -> SriovResult<Vec<String>> {
        let mut names: Vec<String> = self
            .accessor
            .pci_children(pci)?
            .into_iter()
            .filter(|name| naming::is_aux_device_name(name))
            .collect();
        names.sort();
        Ok(names)
    }
}
