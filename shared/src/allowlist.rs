//! Curated device/detector allow-list.
//!
//! Aggregation only counts detectors that appear in this static mapping.
//! Keys are bare device codes (the upstream prefix stripped); values are the
//! detector codes considered valid for that device. The list is built once at
//! process start and passed explicitly into the aggregation engine.

use std::collections::{HashMap, HashSet};

/// Mapping from bare device code to the set of allow-listed detector codes.
///
/// # Example
///
/// ```
/// use shared::allowlist::DeviceAllowList;
///
/// let list = DeviceAllowList::new("tre").allow("216", ["a90", "b60"]);
///
/// assert_eq!(list.bare_code("tre216"), "216");
/// assert!(list.allows("216", "a90"));
/// assert!(!list.allows("216", "x99"));
/// ```
#[derive(Debug, Clone)]
pub struct DeviceAllowList {
    prefix: String,
    detectors: HashMap<String, HashSet<String>>,
}

impl DeviceAllowList {
    /// Creates an empty allow-list for devices carrying the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            detectors: HashMap::new(),
        }
    }

    /// Adds a device with its allow-listed detector codes.
    #[must_use]
    pub fn allow<I, S>(mut self, bare_code: impl Into<String>, detectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.detectors
            .insert(bare_code.into(), detectors.into_iter().map(Into::into).collect());
        self
    }

    /// Strips the upstream prefix from a device identifier.
    ///
    /// Identifiers without the prefix are returned unchanged, matching the
    /// upstream convention of plain string replacement.
    #[must_use]
    pub fn bare_code<'a>(&self, device: &'a str) -> &'a str {
        device.strip_prefix(self.prefix.as_str()).unwrap_or(device)
    }

    /// Returns true if the bare device code is a key of the allow-list.
    #[must_use]
    pub fn contains_device(&self, bare_code: &str) -> bool {
        self.detectors.contains_key(bare_code)
    }

    /// Returns true if the detector is allow-listed for the bare device code.
    #[must_use]
    pub fn allows(&self, bare_code: &str, detector: &str) -> bool {
        self.detectors
            .get(bare_code)
            .is_some_and(|set| set.contains(detector))
    }

    /// Number of allow-listed devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Returns true if no devices are allow-listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// The allow-list of the Tampere reference deployment.
    #[must_use]
    pub fn tampere() -> Self {
        Self::new("tre")
            .allow("216", ["c50", "a90", "b60"])
            .allow("212", ["a20", "b55"])
            .allow("134", ["c50", "b60_1", "b60_2", "a60_1", "a60_2"])
            .allow("133", ["b60_1", "b60_2", "f50", "d50", "c60", "a60"])
            .allow("132", ["b100_1", "b100_2", "c50", "a60_1", "a60_2"])
            .allow("144", ["a60", "d30", "b60_1", "b60_2", "c25"])
            .allow("103", ["a55", "b55", "c60_1", "c60_2", "d30", "e55"])
            .allow("227", ["a55_1", "a55_2", "b50", "c45", "e45", "f55"])
            .allow("112_114", ["a17_1", "a17_2", "b100_1", "b100_2", "e35"])
            .allow("117_575", ["a100_1", "a100_2", "c45", "j93_1", "j93_2"])
            .allow(
                "120_159",
                ["a35_1", "a35_2", "j120_1", "j120_2", "d50", "e50", "m45", "n45"],
            )
            .allow("121", ["a30", "c30", "b80", "e50_1", "e50_2", "f50", "g50"])
            .allow("123", ["a100_1", "a100_2", "b100_1", "b100_2", "d60"])
            .allow(
                "127",
                [
                    "a115_1", "a115_2", "b115", "c75_1", "c75_2", "d65_1", "d65_2", "d65_3",
                    "d65_4", "e100_1", "e100_2", "e100_3", "e100_4", "g80",
                ],
            )
            .allow("150", ["a100_1", "a100_2", "b120_1", "b120_2", "c110", "d60"])
    }
}

impl Default for DeviceAllowList {
    fn default() -> Self {
        Self::tampere()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_code_strips_prefix() {
        let list = DeviceAllowList::new("tre");
        assert_eq!(list.bare_code("tre216"), "216");
        assert_eq!(list.bare_code("tre112_114"), "112_114");
    }

    #[test]
    fn test_bare_code_without_prefix_is_unchanged() {
        let list = DeviceAllowList::new("tre");
        assert_eq!(list.bare_code("216"), "216");
        assert_eq!(list.bare_code("abc999"), "abc999");
    }

    #[test]
    fn test_allows_only_listed_detectors() {
        let list = DeviceAllowList::new("tre").allow("216", ["a90"]);

        assert!(list.allows("216", "a90"));
        assert!(!list.allows("216", "x99"));
        assert!(!list.allows("999", "a90"));
    }

    #[test]
    fn test_contains_device() {
        let list = DeviceAllowList::new("tre").allow("216", ["a90"]);

        assert!(list.contains_device("216"));
        assert!(!list.contains_device("tre216"));
        assert!(!list.contains_device("217"));
    }

    #[test]
    fn test_empty_list() {
        let list = DeviceAllowList::new("tre");
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_tampere_reference_table() {
        let list = DeviceAllowList::tampere();

        assert_eq!(list.len(), 15);
        assert!(list.allows("216", "a90"));
        assert!(list.allows("127", "e100_4"));
        assert!(list.allows("120_159", "n45"));
        assert!(!list.allows("216", "a20"));
        assert_eq!(list.bare_code("tre117_575"), "117_575");
    }
}
