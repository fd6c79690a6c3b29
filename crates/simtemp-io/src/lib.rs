pub mod device;
pub mod metrics;
pub mod sysfs;

pub use device::{DeviceSource, DEFAULT_DEVICE_PATH};
pub use metrics::{init_metrics, record_event, record_sink_drops, serve_metrics};
pub use sysfs::{AttributeError, DeviceStats, SysfsAttributes};
