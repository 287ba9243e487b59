//! Display-only hostname heuristics.
//!
//! `Device.vendor` is always the OUI lookup result from `io::vendor_of`
//! (`"Unknown Vendor"` when the prefix is not recognised) — this crate never
//! feeds back into it. It exists purely to give the CLI table something
//! better than "Unknown Vendor" to show next to a device whose hostname
//! gives away its make. Only the `cli` crate depends on this; the engine
//! itself never sees it.

/// Given a hostname, attempt to derive a user-friendly vendor hint for
/// display. Heuristic-only: callers must not write this into `Device.vendor`.
pub fn vendor_from_hostname(hostname: &str) -> Option<String> {
    let hn = hostname.to_ascii_lowercase();
    if hn.contains("mynetworksettings.com") || hn.starts_with("cr1000a") || hn.contains("fios") {
        return Some("Verizon Fios (detected)".to_string());
    }
    if hn.contains("google") || hn.contains("nest") {
        return Some("Google".to_string());
    }
    None
}
