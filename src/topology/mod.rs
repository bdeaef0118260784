//! Replication Topology
//!
//! - `TopologyLink`: a site link with cost, interval, options, schedule and
//!   member sites
//! - `Schedule`: weekly availability grid and its binary encoding
//! - `SiteRef`: site lookup and the bridgehead servers of a site

mod link;
mod options;
mod schedule;
mod site;

pub use link::{LinkDescription, TopologyLink, Transport, DEFAULT_COST, DEFAULT_INTERVAL_MINUTES};
pub use options::LinkOptions;
pub use schedule::{QuarterHour, Schedule, SCHEDULE_BLOB_LEN};
pub use site::SiteRef;
