pub mod address;
pub mod process;
pub mod sql;

pub use address::{AddressSource, HttpAddressSource, StaticAddressSource};
pub use process::{
    ProcessInput, ProcessOutput, ProcessOutputTarget, ProcessRunner, ProcessSpec,
    TokioProcessRunner,
};
