//! Upstream proxy raw data polling
//!
//! After startup the proxy keeps adding routers and services as providers
//! report in. This module polls its raw data API until the element count stops
//! changing.

pub use poller::{count_elements, RawdataPoller, RawdataPollerConfig};

mod poller;
