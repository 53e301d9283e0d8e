// Some basic data types so that we can avoid tying ourselves to an integer type.

pub type DeviceIndex = usize;
pub type LinkIndex = u32;

// Opaque location token for a device.  For NVIDIA cards this is the PCI bus id as reported by NVML,
// and it is only ever compared for equality.
pub type Location = String;
