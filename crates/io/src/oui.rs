//! Hardened OUI vendor lookup utilities for network_scanner
//!
//! This module provides a small, testable OUI mapping implementation. It can
//! be initialized from a CSV-like string (header optional) and exposes a
//! lookup function tolerant of different MAC formats.

use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

// Embedded comprehensive OUI CSV shipped with this crate for reproducible builds.
static EMBEDDED_OUI_CSV: &str = include_str!("../data/oui.csv");
static OUI_MAP: OnceCell<HashMap<String, String>> = OnceCell::new();

/// Load a map from a CSV-like string. Expected rows: prefix, vendor (prefix as hex, 6 chars / 3 bytes)
pub fn load_from_str(s: &str) -> HashMap<String, String> {
    let mut m = HashMap::new();

    // Use the csv crate to properly handle quoted fields and embedded commas.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(s.as_bytes());

    for result in rdr.records() {
        if let Ok(rec) = result {
            if rec.len() == 0 {
                continue;
            }
            // skip comments/blank first field
            let first = rec.get(0).unwrap_or("").trim();
            if first.is_empty() || first.starts_with('#') {
                continue;
            }

            // Determine which field is the assignment/prefix and which is the vendor/org
            let (maybe_prefix, vendor_field) =
                if first.to_uppercase().starts_with("MA") && rec.len() >= 3 {
                    (
                        rec.get(1).unwrap_or("").trim(),
                        rec.get(2).unwrap_or("").trim(),
                    )
                } else if rec.len() >= 2 {
                    (
                        rec.get(0).unwrap_or("").trim(),
                        rec.get(1).unwrap_or("").trim(),
                    )
                } else {
                    continue;
                };

            let key = maybe_prefix
                .replace('-', "")
                .replace(':', "")
                .to_uppercase();
            if key.len() >= 6 && key.chars().all(|c| c.is_ascii_hexdigit()) {
                m.insert(
                    key.chars().take(6).collect::<String>(),
                    vendor_field.to_string(),
                );
            }
        }
    }

    m
}

/// Initialize the default map (lazy).
fn default_map() -> &'static HashMap<String, String> {
    OUI_MAP.get_or_init(|| {
        // Try env var override first
        if let Ok(path) = std::env::var("NETWORK_SCANNER_OUI_PATH") {
            if let Ok(s) = fs::read_to_string(path) {
                return load_from_str(&s);
            }
        }
        // Fallback to the embedded comprehensive CSV shipped with the crate
        load_from_str(EMBEDDED_OUI_CSV)
    })
}

/// Initialize the OUI map from an explicit file path. Returns Err on IO errors.
#[allow(dead_code)]
pub fn init_from_file<P: AsRef<Path>>(p: P) -> Result<(), Box<dyn Error>> {
    let s = fs::read_to_string(p.as_ref())?;
    let map = load_from_str(&s);
    OUI_MAP
        .set(map)
        .map_err(|_| "OUI map already initialized")?;
    Ok(())
}

/// Lookup vendor given a MAC string. Returns None if not parseable or not found.
pub fn lookup_vendor(mac: &str) -> Option<String> {
    let raw: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if raw.len() < 6 {
        return None;
    }
    let prefix = raw[..6].to_uppercase();
    default_map().get(&prefix).cloned()
}

/// Pluggable vendor lookup used by the ARP/MAC resolver: `"Unknown Vendor"`
/// when the OUI prefix is not recognised, empty string for an empty MAC.
pub fn vendor_of(mac: &str) -> String {
    if mac.is_empty() {
        return String::new();
    }
    lookup_vendor(mac).unwrap_or_else(|| "Unknown Vendor".to_string())
}
