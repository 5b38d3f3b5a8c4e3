//! VF allocation pool.
//!
//! [`VfPool`] owns the SR-IOV lifecycle of a physical function: enabling
//! and disabling virtualization, building a [`PfHandle`] over the
//! configured VFs, configuring their netdevices, and handing VF slots
//! out and back. Allocation is first-fit by ascending index so repeated
//! runs against the same device tree behave identically.
//!
//! Allocation state lives behind a per-handle mutex; two handles for
//! different PFs never contend. State is rebuilt from the live device
//! tree on every [`VfPool::handle`] call and is never persisted.

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::accessor::DeviceAccessor;
use crate::error::{SriovError, SriovResult};
use crate::naming::MacAddr;

const NUMVFS_ATTR: &str = "device/sriov_numvfs";
const TOTALVFS_ATTR: &str = "device/sriov_totalvfs";

/// One virtual function slot of a PF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfObj {
    /// VF number, 0-based, matching the kernel's `virtfn<N>` enumeration.
    pub index: u32,
    /// True while the slot is handed out.
    pub allocated: bool,
    /// Kernel netdevice bound to the VF; `None` until resolved, and
    /// possibly never (a VF passed through to a guest has no host netdev).
    pub netdev_name: Option<String>,
    /// Hardware MAC of the VF netdevice, populated on demand.
    pub mac_address: Option<MacAddr>,
}

impl VfObj {
    fn new(index: u32) -> Self {
        VfObj {
            index,
            allocated: false,
            netdev_name: None,
            mac_address: None,
        }
    }
}

/// In-memory view of one PF's VF set and allocation state.
///
/// The slot vector is fixed for the handle's lifetime; slots are toggled
/// in place, never removed or reordered. The handle is safe to share
/// across threads; allocate and free are mutually exclusive per handle.
#[derive(Debug)]
pub struct PfHandle {
    pf_name: String,
    slots: Mutex<Vec<VfObj>>,
}

impl PfHandle {
    pub(crate) fn new(pf_name: impl Into<String>, num_vfs: u32) -> Self {
        PfHandle {
            pf_name: pf_name.into(),
            slots: Mutex::new((0..num_vfs).map(VfObj::new).collect()),
        }
    }

    /// The PF netdevice name this handle was built for.
    pub fn pf_name(&self) -> &str {
        &self.pf_name
    }

    /// Number of VF slots in the handle.
    pub fn num_vfs(&self) -> usize {
        self.slots.lock().len()
    }

    /// Snapshot of all slots, in index order.
    pub fn slots(&self) -> Vec<VfObj> {
        self.slots.lock().clone()
    }

    /// Allocates the first free slot, by ascending index.
    ///
    /// Returns `None` when the pool is exhausted; exhaustion is an
    /// expected outcome, not an error.
    pub fn allocate(&self) -> Option<VfObj> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if !slot.allocated {
                slot.allocated = true;
                debug!(pf = %self.pf_name, vf = slot.index, "Allocated VF");
                return Some(slot.clone());
            }
        }
        debug!(pf = %self.pf_name, "VF pool exhausted");
        None
    }

    /// Returns a slot to the pool. Idempotent: freeing an already-free
    /// slot (or one this handle does not know) is a no-op.
    ///
    /// Cached netdev name and MAC are dropped since the driver may
    /// reassign them on next use.
    pub fn free(&self, vf: &VfObj) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.index == vf.index) {
            if slot.allocated {
                debug!(pf = %self.pf_name, vf = slot.index, "Freed VF");
            }
            slot.allocated = false;
            slot.netdev_name = None;
            slot.mac_address = None;
        }
    }

    /// Frees the slot with the given VF index.
    ///
    /// Unlike [`PfHandle::free`], an unknown index is an error; the pool
    /// is left unchanged in that case.
    pub fn free_by_index(&self, index: u32) -> SriovResult<()> {
        let mut slots = self.slots.lock();
        let slot = slots
            .iter_mut()
            .find(|s| s.index == index)
            .ok_or_else(|| SriovError::not_found("VF index", index.to_string()))?;
        slot.allocated = false;
        slot.netdev_name = None;
        slot.mac_address = None;
        debug!(pf = %self.pf_name, vf = index, "Freed VF by index");
        Ok(())
    }

    fn with_slots<R>(&self, f: impl FnOnce(&mut Vec<VfObj>) -> R) -> R {
        f(&mut self.slots.lock())
    }
}

/// SR-IOV manager for physical functions.
///
/// Generic over the [`DeviceAccessor`] so the whole pool can be exercised
/// against a synthetic device tree.
#[derive(Debug)]
pub struct VfPool<A> {
    accessor: A,
}

impl<A: DeviceAccessor> VfPool<A> {
    /// Creates a pool manager over the given accessor.
    pub fn new(accessor: A) -> Self {
        VfPool { accessor }
    }

    /// The underlying accessor.
    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    fn num_vfs(&self, pf_name: &str) -> SriovResult<u32> {
        let raw = self.accessor.read_netdev_attr(pf_name, NUMVFS_ATTR)?;
        raw.parse()
            .map_err(|_| SriovError::lookup(pf_name, format!("unparseable sriov_numvfs '{raw}'")))
    }

    fn total_vfs(&self, pf_name: &str) -> SriovResult<u32> {
        let raw = self.accessor.read_netdev_attr(pf_name, TOTALVFS_ATTR)?;
        raw.parse()
            .map_err(|_| SriovError::lookup(pf_name, format!("unparseable sriov_totalvfs '{raw}'")))
    }

    /// Enables SR-IOV on a PF by configuring the maximum supported VF
    /// count. A PF that already has VFs configured is left untouched.
    #[instrument(skip(self))]
    pub fn enable_sriov(&self, pf_name: &str) -> SriovResult<()> {
        if !self.accessor.netdev_exists(pf_name) {
            return Err(SriovError::not_found("netdev", pf_name));
        }
        let total = self.total_vfs(pf_name)?;
        let current = self.num_vfs(pf_name)?;
        if current > 0 {
            debug!(pf = %pf_name, current, "SR-IOV already enabled");
            return Ok(());
        }
        self.accessor
            .write_netdev_attr(pf_name, NUMVFS_ATTR, &total.to_string())?;
        info!(pf = %pf_name, vfs = total, "Enabled SR-IOV");
        Ok(())
    }

    /// Disables SR-IOV on a PF by setting the VF count to zero.
    #[instrument(skip(self))]
    pub fn disable_sriov(&self, pf_name: &str) -> SriovResult<()> {
        if !self.accessor.netdev_exists(pf_name) {
            return Err(SriovError::not_found("netdev", pf_name));
        }
        self.accessor.write_netdev_attr(pf_name, NUMVFS_ATTR, "0")?;
        info!(pf = %pf_name, "Disabled SR-IOV");
        Ok(())
    }

    /// Probes whether SR-IOV is enabled on a PF. Never errors: a missing
    /// netdev or unreadable attribute reports `false`.
    pub fn is_sriov_enabled(&self, pf_name: &str) -> bool {
        self.num_vfs(pf_name).map(|n| n > 0).unwrap_or(false)
    }

    /// Builds a fresh [`PfHandle`] over the PF's currently configured
    /// VFs. All slots start unallocated and unresolved.
    pub fn handle(&self, pf_name: &str) -> SriovResult<PfHandle> {
        if !self.accessor.netdev_exists(pf_name) {
            return Err(SriovError::not_found("netdev", pf_name));
        }
        let num_vfs = self.num_vfs(pf_name)?;
        info!(pf = %pf_name, vfs = num_vfs, "Built PF handle");
        Ok(PfHandle::new(pf_name, num_vfs))
    }

    /// Configures every VF in the handle: resolves and records the bound
    /// netdevice, brings it up, and when `assign_mac` is set, programs
    /// the VF's current hardware MAC as its administrative MAC on the PF.
    ///
    /// Continues past per-VF failures; if any VF failed, the collected
    /// indices come back as [`SriovError::PartialFailure`]. Work that
    /// succeeded is kept either way (no rollback) and the caller decides
    /// whether the partial result is fatal.
    #[instrument(skip(self, handle), fields(pf = %handle.pf_name()))]
    pub fn config_vfs(&self, handle: &PfHandle, assign_mac: bool) -> SriovResult<()> {
        let indices: Vec<u32> = handle.slots().iter().map(|s| s.index).collect();
        let mut failed = Vec::new();

        for index in indices {
            match self.config_one_vf(handle, index, assign_mac) {
                Ok(()) => {}
                Err(e) => {
                    warn!(pf = %handle.pf_name(), vf = index, error = %e, "VF configuration failed");
                    failed.push(index);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(SriovError::PartialFailure { failed })
        }
    }

    fn config_one_vf(&self, handle: &PfHandle, index: u32, assign_mac: bool) -> SriovResult<()> {
        let pf_name = handle.pf_name();
        let names = self.accessor.vf_netdev_names(pf_name, index)?;
        let name = match names.into_iter().next() {
            Some(name) => name,
            None => {
                // No bound netdev (already passed through); nothing to do.
                debug!(pf = %pf_name, vf = index, "VF has no bound netdev");
                return Ok(());
            }
        };

        handle.with_slots(|slots| {
            if let Some(slot) = slots.iter_mut().find(|s| s.index == index) {
                slot.netdev_name = Some(name.clone());
            }
        });

        self.accessor.bring_up(&name)?;

        if assign_mac {
            let mac = self.accessor.hardware_mac(&name)?;
            self.accessor.set_vf_mac(pf_name, index, &mac)?;
            handle.with_slots(|slots| {
                if let Some(slot) = slots.iter_mut().find(|s| s.index == index) {
                    slot.mac_address = Some(mac);
                }
            });
        }
        Ok(())
    }

    /// Allocates the unallocated VF whose MAC address equals `mac`,
    /// resolving missing MACs lazily through the accessor. The scan and
    /// the allocation happen under the same lock, so no concurrent
    /// caller can claim the slot between lookup and marking.
    ///
    /// When two VFs report the same MAC (driver default-MAC collision),
    /// the lowest index wins.
    pub fn allocate_by_mac(&self, handle: &PfHandle, mac: &MacAddr) -> SriovResult<VfObj> {
        let pf_name = handle.pf_name().to_string();
        handle.with_slots(|slots| {
            for slot in slots.iter_mut() {
                if slot.allocated {
                    continue;
                }
                if slot.mac_address.is_none() {
                    let names = self.accessor.vf_netdev_names(&pf_name, slot.index)?;
                    let name = match names.into_iter().next() {
                        Some(name) => name,
                        None => continue,
                    };
                    slot.mac_address = Some(self.accessor.hardware_mac(&name)?);
                    slot.netdev_name = Some(name);
                }
                if slot.mac_address.as_ref() == Some(mac) {
                    slot.allocated = true;
                    debug!(pf = %pf_name, vf = slot.index, mac = %mac, "Allocated VF by MAC");
                    return Ok(slot.clone());
                }
            }
            Err(SriovError::not_found("VF with MAC", mac.to_string()))
        })
    }

    /// Returns the netdevice name bound to a VF, resolving and caching
    /// it on first use. `Ok(None)` means the VF has no bound netdevice.
    pub fn vf_netdev_name(&self, handle: &PfHandle, vf: &VfObj) -> SriovResult<Option<String>> {
        let cached = handle.with_slots(|slots| {
            slots
                .iter()
                .find(|s| s.index == vf.index)
                .and_then(|s| s.netdev_name.clone())
        });
        if cached.is_some() {
            return Ok(cached);
        }

        let names = self.accessor.vf_netdev_names(handle.pf_name(), vf.index)?;
        let name = names.into_iter().next();
        if let Some(ref name) = name {
            handle.with_slots(|slots| {
                if let Some(slot) = slots.iter_mut().find(|s| s.index == vf.index) {
                    slot.netdev_name = Some(name.clone());
                }
            });
        }
        Ok(name)
    }

    /// Reads the current hardware MAC of a VF netdevice.
    pub fn vf_default_mac(&self, vf_netdev: &str) -> SriovResult<MacAddr> {
        self.accessor.hardware_mac(vf_netdev)
    }
}
