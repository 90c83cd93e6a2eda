use std::sync::Arc;

/// Owner of a disconnect deferral counter.
pub(crate) trait DeferralTarget: Send + Sync + 'static {
    /// Removes a deferral, running a pending disconnect if none remains.
    fn allow_disconnect(self: Arc<Self>);
}

/// Disconnect deferral counter of a device.
#[derive(Debug, Default)]
pub(crate) struct Deferrals {
    count: usize,
    pending: bool,
}

impl Deferrals {
    pub fn defer(&mut self) {
        self.count += 1;
    }

    /// Removes a deferral.
    ///
    /// Returns whether a pending disconnect must run now.
    pub fn allow(&mut self) -> bool {
        self.count = self.count.saturating_sub(1);

        if self.count == 0 && self.pending {
            self.pending = false;
            return true;
        }

        false
    }

    /// Records a disconnect request.
    ///
    /// Returns whether the disconnect may run now. Otherwise, it is marked as
    /// pending and will be reported by [allow](Self::allow).
    pub fn request_disconnect(&mut self) -> bool {
        if self.count > 0 {
            self.pending = true;
            return false;
        }

        true
    }

    #[cfg(test)]
    pub fn count(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Lease preventing a device from disconnecting.
///
/// A [disconnect](crate::Device::disconnect) requested while a lease is held
/// is postponed until every lease is released, either by dropping it or by
/// calling [allow](Self::allow).
#[must_use = "the disconnect is allowed again when the lease is dropped"]
pub struct DisconnectDeferral {
    target: Option<Arc<dyn DeferralTarget>>,
}

impl DisconnectDeferral {
    pub(crate) fn new(target: Arc<dyn DeferralTarget>) -> Self {
        Self {
            target: Some(target),
        }
    }

    /// Releases this lease.
    pub fn allow(self) {}
}

impl Drop for DisconnectDeferral {
    fn drop(&mut self) {
        if let Some(target) = self.target.take() {
            target.allow_disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Deferrals;

    #[test]
    fn disconnect_without_deferral() {
        let mut deferrals = Deferrals::default();
        assert!(deferrals.request_disconnect());
        assert!(!deferrals.is_pending());
    }

    #[test]
    fn pending_disconnect_replayed_once() {
        // every interleaving of 3 deferrals with a disconnect request
        for request_at in 0..=3 {
            let mut deferrals = Deferrals::default();
            let mut replayed = 0;

            for _ in 0..3 {
                deferrals.defer();
            }

            for i in 0..3 {
                if i == request_at {
                    assert!(!deferrals.request_disconnect());
                }
                if deferrals.allow() {
                    replayed += 1;
                    assert_eq!(deferrals.count(), 0);
                }
            }

            if request_at == 3 {
                assert!(deferrals.request_disconnect());
            } else {
                assert_eq!(replayed, 1);
            }
            assert!(!deferrals.is_pending());

            // spurious allowances do not replay it again
            assert!(!deferrals.allow());
        }
    }
}
