mod device;
mod license;
mod purchase;

pub use device::*;
pub use license::*;
pub use purchase::*;
