//! SNMP object identifiers for printer devices.
//!
//! Drawn from the standard Printer MIB (RFC 3805) and Host Resources MIB
//! (RFC 2790). Supply-table objects are indexed; use the builder functions
//! to append an index.

/// sysDescr.0 — used as the reachability probe.
pub const SYS_DESCR: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 1, 0];

/// sysName.0 — device-reported system name.
pub const SYS_NAME: &[u32] = &[1, 3, 6, 1, 2, 1, 1, 5, 0];

/// hrDeviceDescr.1 — model string.
pub const DEVICE_MODEL: &[u32] = &[1, 3, 6, 1, 2, 1, 25, 3, 2, 1, 3, 1];

/// hrDeviceStatus.1 — coarse device status code.
pub const DEVICE_STATUS: &[u32] = &[1, 3, 6, 1, 2, 1, 25, 3, 2, 1, 5, 1];

/// prtMarkerLifeCount.1.1 — lifetime page count.
pub const TOTAL_PAGES: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 10, 2, 1, 4, 1, 1];

/// prtMarkerSuppliesDescription.1.{index}
const SUPPLY_DESCRIPTION: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 11, 1, 1, 6, 1];

/// prtMarkerSuppliesMaxCapacity.1.{index}
const SUPPLY_MAX_CAPACITY: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 11, 1, 1, 8, 1];

/// prtMarkerSuppliesLevel.1.{index}
const SUPPLY_CURRENT_LEVEL: &[u32] = &[1, 3, 6, 1, 2, 1, 43, 11, 1, 1, 9, 1];

fn with_index(base: &[u32], index: u32) -> Vec<u32> {
    let mut oid = base.to_vec();
    oid.push(index);
    oid
}

/// Supply description OID for a table index.
pub fn supply_description(index: u32) -> Vec<u32> {
    with_index(SUPPLY_DESCRIPTION, index)
}

/// Supply max-capacity OID for a table index.
pub fn supply_max_capacity(index: u32) -> Vec<u32> {
    with_index(SUPPLY_MAX_CAPACITY, index)
}

/// Supply current-level OID for a table index.
pub fn supply_current_level(index: u32) -> Vec<u32> {
    with_index(SUPPLY_CURRENT_LEVEL, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supply_oid_index_appended() {
        let oid = supply_description(3);
        assert_eq!(oid.last(), Some(&3));
        assert_eq!(&oid[..oid.len() - 1], SUPPLY_DESCRIPTION);
    }
}
