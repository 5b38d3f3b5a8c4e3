//! Device accessor: the capability surface over the kernel device tree.
//!
//! The pool, resolver and topology components never touch sysfs or shell
//! out directly; they go through the [`DeviceAccessor`] trait so tests can
//! drive them against a synthetic device tree. [`SysfsAccessor`] is the
//! production implementation, rooted at `/sys` by default and at an
//! arbitrary prefix for tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{SriovError, SriovResult};
use crate::naming::{MacAddr, PciAddress};
use crate::shell::{self, shellquote, IP_CMD};

static VIRTFN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^virtfn(\d+)$").expect("Invalid regex pattern"));

/// Capability surface the core components consume.
///
/// Every method is synchronous and bounded by the platform; implementations
/// must not block indefinitely.
pub trait DeviceAccessor {
    /// Returns true if a netdevice with this name exists.
    fn netdev_exists(&self, netdev: &str) -> bool;

    /// Lists all netdevice names on the host.
    fn list_netdevs(&self) -> SriovResult<Vec<String>>;

    /// Reads a netdevice attribute (a path-like key below the netdevice
    /// node, e.g. `phys_port_name` or `device/sriov_numvfs`), trimmed.
    fn read_netdev_attr(&self, netdev: &str, attr: &str) -> SriovResult<String>;

    /// Writes a netdevice attribute.
    fn write_netdev_attr(&self, netdev: &str, attr: &str, value: &str) -> SriovResult<()>;

    /// Resolves a netdevice to the PCI address of its backing device.
    fn pci_for_netdev(&self, netdev: &str) -> SriovResult<PciAddress>;

    /// Lists the netdevices bound to a PCI function, sorted by name.
    /// Fails with `NotFound` if the PCI address does not exist.
    fn netdevs_for_pci(&self, pci: &PciAddress) -> SriovResult<Vec<String>>;

    /// Resolves a VF PCI address to its parent PF PCI address, or `None`
    /// if the address does not name a virtual function.
    fn physfn_pci(&self, pci: &PciAddress) -> SriovResult<Option<PciAddress>>;

    /// Enumerates the configured VFs of a PF as (vf index, PCI address)
    /// pairs, unordered.
    fn vf_pci_list(&self, pf_netdev: &str) -> SriovResult<Vec<(u32, PciAddress)>>;

    /// Lists the netdevice names bound to one VF of a PF, sorted. Empty
    /// when the VF has no bound netdevice (e.g. passed to a guest).
    fn vf_netdev_names(&self, pf_netdev: &str, vf_index: u32) -> SriovResult<Vec<String>>;

    /// Lists the raw child entries of a PCI device node. Fails with
    /// `NotFound` if the address does not exist on the system.
    fn pci_children(&self, pci: &PciAddress) -> SriovResult<Vec<String>>;

    /// Reads the hardware MAC address of a netdevice.
    fn hardware_mac(&self, netdev: &str) -> SriovResult<MacAddr>;

    /// Brings a netdevice administratively up.
    fn bring_up(&self, netdev: &str) -> SriovResult<()>;

    /// Programs the administrative MAC of a VF on its PF.
    fn set_vf_mac(&self, pf_netdev: &str, vf_index: u32, mac: &MacAddr) -> SriovResult<()>;
}

/// Production accessor backed by the sysfs device tree and `ip link`.
#[derive(Debug, Clone)]
pub struct SysfsAccessor {
    root: PathBuf,
}

impl SysfsAccessor {
    /// Creates an accessor rooted at `/sys`.
    pub fn new() -> Self {
        Self::with_root("/sys")
    }

    /// Creates an accessor rooted at an arbitrary prefix. Tests point
    /// this at a synthetic tree.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        SysfsAccessor { root: root.into() }
    }

    fn netdev_path(&self, netdev: &str) -> PathBuf {
        self.root.join("class/net").join(netdev)
    }

    fn pci_path(&self, pci: &PciAddress) -> PathBuf {
        self.root.join("bus/pci/devices").join(pci.to_string())
    }

    fn read_trimmed(&self, path: &Path) -> SriovResult<String> {
        fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|e| SriovError::accessor(path.display().to_string(), e))
    }

    /// Reads the basename of a symlink target and parses it as a PCI
    /// address (the layout of `device`, `physfn` and `virtfn*` links).
    fn link_target_pci(&self, path: &Path) -> SriovResult<PciAddress> {
        let target = fs::read_link(path)
            .map_err(|e| SriovError::accessor(path.display().to_string(), e))?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        name.parse()
    }

    fn list_dir_names(&self, path: &Path) -> Result<Vec<String>, io::Error> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }
}

impl Default for SysfsAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceAccessor for SysfsAccessor {
    fn netdev_exists(&self, netdev: &str) -> bool {
        self.netdev_path(netdev).exists()
    }

    fn list_netdevs(&self) -> SriovResult<Vec<String>> {
        let path = self.root.join("class/net");
        self.list_dir_names(&path)
            .map_err(|e| SriovError::accessor(path.display().to_string(), e))
    }

    fn read_netdev_attr(&self, netdev: &str, attr: &str) -> SriovResult<String> {
        self.read_trimmed(&self.netdev_path(netdev).join(attr))
    }

    fn write_netdev_attr(&self, netdev: &str, attr: &str, value: &str) -> SriovResult<()> {
        let path = self.netdev_path(netdev).join(attr);
        fs::write(&path, value).map_err(|e| SriovError::accessor(path.display().to_string(), e))
    }

    fn pci_for_netdev(&self, netdev: &str) -> SriovResult<PciAddress> {
        if !self.netdev_exists(netdev) {
            return Err(SriovError::not_found("netdev", netdev));
        }
        self.link_target_pci(&self.netdev_path(netdev).join("device"))
    }

    fn netdevs_for_pci(&self, pci: &PciAddress) -> SriovResult<Vec<String>> {
        let device = self.pci_path(pci);
        if !device.exists() {
            return Err(SriovError::not_found("PCI device", pci.to_string()));
        }
        let net = device.join("net");
        match self.list_dir_names(&net) {
            Ok(names) => Ok(names),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SriovError::accessor(net.display().to_string(), e)),
        }
    }

    fn physfn_pci(&self, pci: &PciAddress) -> SriovResult<Option<PciAddress>> {
        let path = self.pci_path(pci).join("physfn");
        match fs::read_link(&path) {
            Ok(target) => {
                let name = target
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(Some(name.parse()?))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SriovError::accessor(path.display().to_string(), e)),
        }
    }

    fn vf_pci_list(&self, pf_netdev: &str) -> SriovResult<Vec<(u32, PciAddress)>> {
        if !self.netdev_exists(pf_netdev) {
            return Err(SriovError::not_found("netdev", pf_netdev));
        }
        let device = self.netdev_path(pf_netdev).join("device");
        let names = self
            .list_dir_names(&device)
            .map_err(|e| SriovError::accessor(device.display().to_string(), e))?;

        let mut vfs = Vec::new();
        for name in names {
            if let Some(caps) = VIRTFN_RE.captures(&name) {
                let index: u32 = caps[1]
                    .parse()
                    .map_err(|_| SriovError::lookup(&name, "unparseable virtfn index"))?;
                let addr = self.link_target_pci(&device.join(&name))?;
                vfs.push((index, addr));
            }
        }
        Ok(vfs)
    }

    fn vf_netdev_names(&self, pf_netdev: &str, vf_index: u32) -> SriovResult<Vec<String>> {
        let virtfn = self
            .netdev_path(pf_netdev)
            .join("device")
            .join(format!("virtfn{vf_index}"));
        if !virtfn.exists() {
            return Err(SriovError::not_found(
                "VF",
                format!("{pf_netdev} vf {vf_index}"),
            ));
        }
        let net = virtfn.join("net");
        match self.list_dir_names(&net) {
            Ok(names) => Ok(names),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(SriovError::accessor(net.display().to_string(), e)),
        }
    }

    fn pci_children(&self, pci: &PciAddress) -> SriovResult<Vec<String>> {
        let device = self.pci_path(pci);
        if !device.exists() {
            return Err(SriovError::not_found("PCI device", pci.to_string()));
        }
        self.list_dir_names(&device)
            .map_err(|e| SriovError::accessor(device.display().to_string(), e))
    }

    fn hardware_mac(&self, netdev: &str) -> SriovResult<MacAddr> {
        self.read_netdev_attr(netdev, "address")?.parse()
    }

    fn bring_up(&self, netdev: &str) -> SriovResult<()> {
        let cmd = format!("{} link set dev {} up", IP_CMD, shellquote(netdev));
        shell::exec_or_throw(&cmd)?;
        Ok(())
    }

    fn set_vf_mac(&self, pf_netdev: &str, vf_index: u32, mac: &MacAddr) -> SriovResult<()> {
        let cmd = format!(
            "{} link set dev {} vf {} mac {}",
            IP_CMD,
            shellquote(pf_netdev),
            vf_index,
            mac
        );
        shell::exec_or_throw(&cmd)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SysfsAccessor) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("class/net")).unwrap();
        fs::create_dir_all(dir.path().join("bus/pci/devices")).unwrap();
        let accessor = SysfsAccessor::with_root(dir.path());
        (dir, accessor)
    }

    #[test]
    fn test_netdev_attrs() {
        let (dir, accessor) = setup();
        let dev = dir.path().join("class/net/ens2f0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("address"), "0c:42:a1:de:cf:7c\n").unwrap();

        assert!(accessor.netdev_exists("ens2f0"));
        assert!(!accessor.netdev_exists("ens2f1"));
        assert_eq!(
            accessor.read_netdev_attr("ens2f0", "address").unwrap(),
            "0c:42:a1:de:cf:7c"
        );
        assert_eq!(
            accessor.hardware_mac("ens2f0").unwrap().to_string(),
            "0c:42:a1:de:cf:7c"
        );
        assert_eq!(accessor.list_netdevs().unwrap(), vec!["ens2f0"]);
    }

    #[test]
    fn test_pci_for_netdev_follows_device_link() {
        let (dir, accessor) = setup();
        let pci = dir.path().join("bus/pci/devices/0000:03:00.0");
        fs::create_dir_all(&pci).unwrap();
        let dev = dir.path().join("class/net/enp3s0f0");
        fs::create_dir_all(&dev).unwrap();
        symlink("../../../bus/pci/devices/0000:03:00.0", dev.join("device")).unwrap();

        let addr = accessor.pci_for_netdev("enp3s0f0").unwrap();
        assert_eq!(addr.to_string(), "0000:03:00.0");
    }

    #[test]
    fn test_physfn_absent_is_none() {
        let (dir, accessor) = setup();
        fs::create_dir_all(dir.path().join("bus/pci/devices/0000:03:00.0")).unwrap();

        let addr: PciAddress = "0000:03:00.0".parse().unwrap();
        assert_eq!(accessor.physfn_pci(&addr).unwrap(), None);
    }

    #[test]
    fn test_pci_children_missing_device() {
        let (_dir, accessor) = setup();
        let addr: PciAddress = "0000:00:00.0".parse().unwrap();
        assert!(accessor.pci_children(&addr).unwrap_err().is_not_found());
    }
}
