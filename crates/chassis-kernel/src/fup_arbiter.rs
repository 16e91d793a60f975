//! [`FupArbiter`] – exclusive firmware-upgrade permission per domain.
//!
//! At most one requester holds the FUP lock of a domain at a time.  A
//! request from someone else is denied while the grant is younger than the
//! deny limit; once the holder has sat on it for at least the limit it is
//! presumed dead and the lock is reclaimed for the new requester.
//!
//! # Example
//!
//! ```
//! use chassis_kernel::fup_arbiter::{FupArbiter, FupGrant, Requester};
//! use chassis_types::Location;
//!
//! let arbiter = FupArbiter::new("chassis", 600);
//! let mm1 = Requester::new("mm1", Location::new(1, 0));
//! let mm2 = Requester::new("mm2", Location::new(2, 0));
//!
//! assert_eq!(arbiter.acquire(&mm1, 0).unwrap(), FupGrant::Fresh);
//! assert!(arbiter.acquire(&mm2, 100).is_err());
//! assert!(matches!(arbiter.acquire(&mm2, 700).unwrap(), FupGrant::Reclaimed { .. }));
//! ```

use std::sync::Mutex;

use chassis_types::{ChassisError, Location, Timestamp};
use tracing::{debug, info, warn};

/// Default time after which a held lock may be reclaimed.
pub const DEFAULT_DENY_LIMIT_SECS: u64 = 600;

/// A party asking for the FUP lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub name: String,
    pub location: Location,
}

impl Requester {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }
}

/// How a successful request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FupGrant {
    /// The lock was free.
    Fresh,
    /// The requester already held it; the grant time is renewed.
    Renewed,
    /// The previous holder exceeded the deny limit.
    Reclaimed { from: String, age_secs: u64 },
}

#[derive(Debug, Default)]
struct FupPermission {
    occupied: bool,
    grant_time: Timestamp,
    holder: Option<Requester>,
}

/// Arbiter for one FUP domain.
#[derive(Debug)]
pub struct FupArbiter {
    domain: String,
    deny_limit_secs: u64,
    permission: Mutex<FupPermission>,
}

impl FupArbiter {
    pub fn new(domain: impl Into<String>, deny_limit_secs: u64) -> Self {
        Self {
            domain: domain.into(),
            deny_limit_secs,
            permission: Mutex::new(FupPermission::default()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn deny_limit_secs(&self) -> u64 {
        self.deny_limit_secs
    }

    /// Request the lock at time `now`.
    ///
    /// Returns [`ChassisError::FupDenied`] while another requester holds a
    /// grant younger than the deny limit.
    pub fn acquire(&self, requester: &Requester, now: Timestamp) -> Result<FupGrant, ChassisError> {
        let mut perm = self.permission.lock().unwrap_or_else(|e| e.into_inner());

        let grant = match perm.holder.as_ref().filter(|_| perm.occupied) {
            None => FupGrant::Fresh,
            Some(holder) if holder == requester => FupGrant::Renewed,
            Some(holder) => {
                let age_secs = now.saturating_sub(perm.grant_time);
                if age_secs < self.deny_limit_secs {
                    debug!(
                        domain = %self.domain,
                        holder = %holder.name,
                        requester = %requester.name,
                        age_secs,
                        "FUP request denied"
                    );
                    return Err(ChassisError::FupDenied {
                        domain: self.domain.clone(),
                        holder: holder.name.clone(),
                        age_secs,
                    });
                }
                warn!(
                    domain = %self.domain,
                    holder = %holder.name,
                    requester = %requester.name,
                    age_secs,
                    "reclaiming FUP lock from stale holder"
                );
                FupGrant::Reclaimed {
                    from: holder.name.clone(),
                    age_secs,
                }
            }
        };

        perm.occupied = true;
        perm.grant_time = now;
        perm.holder = Some(requester.clone());
        info!(domain = %self.domain, holder = %requester.name, ?grant, "FUP lock granted");
        Ok(grant)
    }

    /// Release the lock.  Only the current holder can release; returns
    /// whether anything was released.
    pub fn release(&self, requester: &Requester) -> bool {
        let mut perm = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        if !perm.occupied || perm.holder.as_ref() != Some(requester) {
            return false;
        }
        *perm = FupPermission::default();
        info!(domain = %self.domain, holder = %requester.name, "FUP lock released");
        true
    }

    /// Current holder, if any.
    pub fn holder(&self) -> Option<Requester> {
        let perm = self.permission.lock().unwrap_or_else(|e| e.into_inner());
        perm.holder.clone().filter(|_| perm.occupied)
    }

    pub fn is_occupied(&self) -> bool {
        self.permission.lock().unwrap_or_else(|e| e.into_inner()).occupied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, slot: u8) -> Requester {
        Requester::new(name, Location::new(slot, 0))
    }

    #[test]
    fn free_lock_is_granted() {
        let arb = FupArbiter::new("chassis", DEFAULT_DENY_LIMIT_SECS);
        assert!(!arb.is_occupied());
        assert_eq!(arb.acquire(&req("a", 1), 10).unwrap(), FupGrant::Fresh);
        assert_eq!(arb.holder().unwrap().name, "a");
    }

    #[test]
    fn other_requester_denied_before_limit() {
        let arb = FupArbiter::new("chassis", 600);
        arb.acquire(&req("a", 1), 0).unwrap();
        let err = arb.acquire(&req("b", 2), 599).unwrap_err();
        assert_eq!(
            err,
            ChassisError::FupDenied {
                domain: "chassis".into(),
                holder: "a".into(),
                age_secs: 599
            }
        );
        assert_eq!(arb.holder().unwrap().name, "a");
    }

    #[test]
    fn stale_holder_is_reclaimed_at_limit() {
        let arb = FupArbiter::new("chassis", 600);
        arb.acquire(&req("a", 1), 0).unwrap();
        let grant = arb.acquire(&req("b", 2), 600).unwrap();
        assert_eq!(
            grant,
            FupGrant::Reclaimed {
                from: "a".into(),
                age_secs: 600
            }
        );
        assert_eq!(arb.holder().unwrap().name, "b");
        // "a" no longer holds it and cannot release it.
        assert!(!arb.release(&req("a", 1)));
    }

    #[test]
    fn holder_renewal_resets_age() {
        let arb = FupArbiter::new("chassis", 600);
        arb.acquire(&req("a", 1), 0).unwrap();
        assert_eq!(arb.acquire(&req("a", 1), 500).unwrap(), FupGrant::Renewed);
        assert!(arb.acquire(&req("b", 2), 900).is_err());
    }

    #[test]
    fn release_frees_the_lock() {
        let arb = FupArbiter::new("chassis", 600);
        let a = req("a", 1);
        arb.acquire(&a, 0).unwrap();
        assert!(!arb.release(&req("b", 2)));
        assert!(arb.release(&a));
        assert!(arb.holder().is_none());
        assert_eq!(arb.acquire(&req("b", 2), 1).unwrap(), FupGrant::Fresh);
    }

    #[test]
    fn same_name_different_location_is_another_requester() {
        let arb = FupArbiter::new("chassis", 600);
        arb.acquire(&req("mm", 1), 0).unwrap();
        assert!(arb.acquire(&req("mm", 2), 10).is_err());
    }
}
