pub mod endpoint;
pub mod guest;
pub mod task;

pub use endpoint::{PveCredential, PveEndpoint};
pub use guest::{
    ExistingGuestConfig, GuestConfigUpdate, GuestSpec, IpAssignment, IpConfigUpdate, NetworkUpdate,
};
pub use task::{TaskHandle, TaskState, TaskStatus};
