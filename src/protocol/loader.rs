//! Bulk protocol loading from a directory of JSON definition files
//! (SPEC_FULL §2.2 "Protocol bulk loading", §4.3).

// Layer 1: Standard library imports
use std::path::Path;

// Layer 2: Third-party crate imports
use tracing::{error, info, warn};

// Layer 3: Internal module imports
use super::model::Protocol;
use super::registry::ProtocolRegistry;

/// Scan `dir` for `*.json` files in sorted filename order, parse each as
/// a [`Protocol`], and register it into `registry` with
/// `replace_duplicates = true` semantics, so re-running the loader over
/// an edited definition file updates the stored protocol in place.
///
/// A single bad file (unreadable, invalid JSON, or a trigger-set
/// collision against a *different*-named protocol) is logged and
/// skipped; the scan never aborts early. Returns the count of protocols
/// successfully registered.
pub async fn load_directory(dir: &Path, registry: &ProtocolRegistry) -> usize {
    let mut entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>(),
        Err(error) => {
            error!(dir = %dir.display(), %error, "could not read protocol directory");
            return 0;
        }
    };
    entries.sort();

    let mut loaded = 0;
    for path in entries {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) => {
                error!(file = %path.display(), %error, "could not read protocol definition file");
                continue;
            }
        };

        let protocol = match Protocol::from_json(&raw) {
            Ok(protocol) => protocol,
            Err(error) => {
                error!(file = %path.display(), %error, "could not parse protocol definition");
                continue;
            }
        };

        let name = protocol.name.clone();
        match registry.register_replacing(protocol).await {
            Ok(outcome) => {
                info!(file = %path.display(), name = %name, ?outcome, "protocol definition loaded");
                loaded += 1;
            }
            Err(error) => {
                warn!(file = %path.display(), name = %name, %error, "protocol definition rejected");
            }
        }
    }

    loaded
}
