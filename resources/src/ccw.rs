// Copyright 2026 The virtcmd Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! s390 channel subsystem address bookkeeping.

use std::collections::HashSet;

use domain::CcwAddress;
use domain::CCW_MAX_DEVNO;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Occupied CCW addresses of one domain plus the assignment cursor.
///
/// The set stores canonical `cssid.ssid.devno` strings; the cursor only
/// ever advances within the fixed virtio channel subsystem.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CcwAddressSet {
    in_use: HashSet<String>,
    next: u16,
}

impl CcwAddressSet {
    pub fn new() -> CcwAddressSet {
        CcwAddressSet::default()
    }

    pub fn contains(&self, addr: &CcwAddress) -> bool {
        self.in_use.contains(&addr.to_string())
    }

    /// Records a user-specified address; duplicates are fatal.
    pub fn reserve(&mut self, addr: &CcwAddress) -> Result<()> {
        if !self.in_use.insert(addr.to_string()) {
            return Err(Error::CcwAddressInUse(addr.to_string()));
        }
        log::debug!("reserved CCW address {}", addr);
        Ok(())
    }

    /// Assigns the lowest free devno at or past the cursor. Running out of
    /// the 16-bit devno space is fatal.
    pub fn assign_next(&mut self) -> Result<CcwAddress> {
        loop {
            let addr = CcwAddress::virtio(self.next);
            if !self.contains(&addr) {
                self.reserve(&addr)?;
                self.next = self.next.saturating_add(1);
                return Ok(addr);
            }
            if self.next == CCW_MAX_DEVNO {
                return Err(Error::CcwExhausted);
            }
            self.next += 1;
        }
    }

    /// Forgets an address. Releasing the most recently cursor-assigned
    /// devno rewinds the cursor so the devno can be handed out again.
    pub fn release(&mut self, addr: &CcwAddress) {
        self.in_use.remove(&addr.to_string());
        if self.next > 0 && addr.devno == self.next - 1 {
            self.next -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_sequential_devnos() {
        let mut set = CcwAddressSet::new();
        assert_eq!(set.assign_next().unwrap().to_string(), "fe.0.0000");
        assert_eq!(set.assign_next().unwrap().to_string(), "fe.0.0001");
    }

    #[test]
    fn explicit_reservation_is_skipped() {
        let mut set = CcwAddressSet::new();
        set.reserve(&CcwAddress::virtio(0)).unwrap();
        set.reserve(&CcwAddress::virtio(1)).unwrap();
        assert_eq!(set.assign_next().unwrap(), CcwAddress::virtio(2));
    }

    #[test]
    fn duplicate_reservation_fails() {
        let mut set = CcwAddressSet::new();
        let addr = CcwAddress::virtio(7);
        set.reserve(&addr).unwrap();
        assert_eq!(
            set.reserve(&addr),
            Err(Error::CcwAddressInUse("fe.0.0007".to_owned()))
        );
    }

    #[test]
    fn release_rewinds_cursor() {
        let mut set = CcwAddressSet::new();
        let a = set.assign_next().unwrap();
        let b = set.assign_next().unwrap();
        assert_eq!(b.devno, 1);
        set.release(&b);
        assert_eq!(set.assign_next().unwrap().devno, 1);
        // Releasing an older address does not rewind the cursor.
        set.release(&a);
        assert_eq!(set.assign_next().unwrap().devno, 2);
    }

    #[test]
    fn devno_space_exhaustion_is_fatal() {
        let mut set = CcwAddressSet::new();
        set.next = CCW_MAX_DEVNO;
        set.reserve(&CcwAddress::virtio(CCW_MAX_DEVNO)).unwrap();
        assert_eq!(set.assign_next(), Err(Error::CcwExhausted));
    }
}
