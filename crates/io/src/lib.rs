//! OUI vendor lookup and the append-only scan report writer.

mod oui;
mod report;

pub use oui::{lookup_vendor as lookup_vendor_from_oui, vendor_of};
pub use report::{ReportError, ScanReport};
