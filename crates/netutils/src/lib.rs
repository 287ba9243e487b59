pub mod arp;
pub mod cidrsniffer;
pub mod hostname;
pub mod portscan;

pub use cidrsniffer::{expand_cidr, CidrError};
