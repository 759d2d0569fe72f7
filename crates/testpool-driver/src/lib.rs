pub mod driver;
pub mod docker;
pub mod error;
pub mod kvm;
pub mod local;
pub mod registry;

pub use docker::DockerDriver;
pub use driver::{Driver, StartState, TimingOp};
pub use error::DriverError;
pub use kvm::KvmDriver;
pub use local::LocalDriver;
pub use registry::DriverRegistry;
