//! Three-way comparison of local, detected and remote addresses.
//!
//! When the remote reference cannot be fetched the caller passes `None` and
//! the local address stands in for it. That keeps a remote outage from
//! blocking an update the local/public pair already calls for, but it also
//! hides remote drift for as long as the outage lasts.

use crate::types::ReconciliationDecision;

pub fn reconcile(local: &str, public: &str, remote: Option<&str>) -> ReconciliationDecision {
    let local = local.trim();
    let public = public.trim();
    let degraded = remote.is_none();
    let remote = remote.map(str::trim).unwrap_or(local);

    ReconciliationDecision {
        needs_update: local != public || remote != public,
        local_address: local.to_string(),
        public_address: public.to_string(),
        remote_address: remote.to_string(),
        degraded,
    }
}
