//! `use mugen_core::prelude::*;` pulls in the handful of imports nearly
//! every module in this crate needs.

pub use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
pub use std::pin::Pin;
pub use std::sync::Arc;
pub use std::task::Poll;
pub use std::time::{Duration, Instant};

pub use tracing::{debug, error, trace, warn};
