//! Runtime detection of which bookmarks' internal URLs answer from here.

pub mod check;
pub mod prober;

pub use check::{NetworkCheck, ReachabilityCheck};
pub use prober::{
    NetworkEvent, ProbeResult, ProbeStatus, ReachabilityCache, ReachabilityProber, SiteKey,
};
