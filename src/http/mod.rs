mod pool;
mod rate;
mod target;
mod template;
mod transport;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

pub use pool::{PoolSettings, WorkerPool};
pub use rate::{Dispatch, Pace, RatePacer, TickSchedule};
pub use target::TargetSelector;
pub use template::{RequestTemplate, ResolvedRequest, validate_url};
pub use transport::{
    ClientOptions, DEFAULT_USER_AGENT, HttpTransport, ReqwestTransport, TransportResponse,
};
