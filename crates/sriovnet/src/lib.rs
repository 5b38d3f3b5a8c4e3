//! SR-IOV network device management.
//!
//! This crate manages SR-IOV capable NICs on a Linux host:
//!
//! - [`pool`]: enable/disable SR-IOV on a physical function and
//!   allocate/free its virtual functions through a concurrency-safe,
//!   first-fit [`PfHandle`] pool
//! - [`representor`]: resolve switchdev port flavours and translate
//!   between uplink, VF/SF representor and DPU naming schemes
//! - [`topology`]: walk VF-to-PF PCI relationships and enumerate
//!   auxiliary offload devices
//! - [`naming`]: the pure codec for PCI addresses, MACs, switchdev port
//!   names and representor name grammars
//! - [`accessor`]: the [`DeviceAccessor`] capability trait and its sysfs
//!   implementation; the device tree is injected, never ambient, so
//!   every component runs against a synthetic tree in tests
//!
//! Allocation state is in-process only and rebuilt from the kernel's
//! device tree on every handle build; nothing is persisted.
//!
//! # Example
//!
//! ```ignore
//! use sriovnet::{SysfsAccessor, VfPool};
//!
//! let pool = VfPool::new(SysfsAccessor::new());
//! pool.enable_sriov("ens2f0")?;
//! let handle = pool.handle("ens2f0")?;
//! pool.config_vfs(&handle, true)?;
//!
//! if let Some(vf) = handle.allocate() {
//!     // hand the VF to a workload ...
//!     handle.free(&vf);
//! }
//! ```

pub mod accessor;
pub mod error;
pub mod naming;
pub mod pool;
pub mod representor;
pub mod shell;
pub mod topology;

// Re-export commonly used items at crate root
pub use accessor::{DeviceAccessor, SysfsAccessor};
pub use error::{SriovError, SriovResult};
pub use naming::{MacAddr, PciAddress, PortFlavour, PortName};
pub use pool::{PfHandle, VfObj, VfPool};
pub use representor::RepresentorResolver;
pub use topology::PciTopology;
