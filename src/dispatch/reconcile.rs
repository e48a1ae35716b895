use crate::models::device::Device;

/// The console's device view after a round-trip to the store.
///
/// Whatever was projected locally is discarded in favour of the stored
/// record, which the agent's reported outcome may already have changed.
pub fn reconcile(_local: Option<&Device>, remote: Device) -> Device {
    remote
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::registered_device;

    #[test]
    fn remote_always_wins() {
        let local = registered_device("D1", "U1", true);
        let remote = registered_device("D1", "U1", false);

        let view = reconcile(Some(&local), remote.clone());
        assert_eq!(view, remote);
        assert!(!view.lock.blocked);
    }

    #[test]
    fn no_local_view() {
        let remote = registered_device("D1", "U1", true);
        assert_eq!(reconcile(None, remote.clone()), remote);
    }
}
