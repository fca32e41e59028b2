// RESTCONF resource paths for the NSO device tree.
//
// The inventory query is scoped to names only; the API refuses to return
// more than a bounded number of list instances per query otherwise.

use url::Url;

use crate::error::Error;

/// Name-only device listing.
pub const INVENTORY_PATH: &str = "/restconf/data/tailf-ncs:devices/device?fields=name";

/// Shallow view of the devices container, used as a connection test.
pub const DEVICES_PATH: &str = "/restconf/data/tailf-ncs:devices?depth=1";

const DEVICE_LIST: [&str; 3] = ["restconf", "data", "tailf-ncs:devices"];

/// URL of the `check-sync` action for one device.
///
/// The device name is a list key and gets percent-encoded as a single path
/// segment, so names containing `/` or spaces stay intact.
pub fn check_sync_url(base: &Url, device: &str) -> Result<Url, Error> {
    let mut url = base.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .clear()
        .extend(DEVICE_LIST)
        .push(&format!("device={device}"))
        .push("check-sync");
    Ok(url)
}

/// Whether a response to [`DEVICES_PATH`] looks like the NSO device tree.
pub fn looks_like_device_tree(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    text.contains("<devices") || text.contains("\"tailf-ncs:devices\"")
}
