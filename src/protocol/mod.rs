pub(crate) mod messages;
mod hub;
mod negotiate;
mod version;

pub use hub::{HubInvocation, HubRegistrationData, HubResult};
pub use negotiate::NegotiationResponse;
pub use version::Version;
