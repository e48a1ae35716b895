use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::models::device::{Device, DeviceInfo, DeviceOrigin, LockProjection};
use crate::models::principal::Principal;
use crate::models::profile::Profile;
use crate::store::{DeviceStore, ProfileStore};

const PROFILE_DEVICE_PREFIX: &str = "device-";

/// Id of the device view derived from a principal's profile.
pub fn profile_device_id(user_id: &str) -> String {
    format!("{PROFILE_DEVICE_PREFIX}{user_id}")
}

/// One place a device's lock state may live. The projection for a
/// dispatch is written back to the same source that resolved the device.
#[async_trait]
pub trait DeviceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, principal: &Principal, device_id: &str)
        -> DomainResult<Option<Device>>;

    async fn apply_projection(
        &self,
        principal: &Principal,
        device_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()>;

    async fn touch(&self, principal: &Principal, device_id: &str, at: DateTime<Utc>)
        -> DomainResult<()>;
}

/// Registered devices, looked up by id and scoped to their owner.
pub struct DirectDeviceLookup {
    devices: Arc<dyn DeviceStore>,
}

impl DirectDeviceLookup {
    pub fn new(devices: Arc<dyn DeviceStore>) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl DeviceSource for DirectDeviceLookup {
    fn name(&self) -> &'static str {
        "registered"
    }

    async fn resolve(
        &self,
        principal: &Principal,
        device_id: &str,
    ) -> DomainResult<Option<Device>> {
        match self.devices.get(device_id).await? {
            Some(device) if device.owner_id == principal.id => Ok(Some(device)),
            Some(_) => {
                debug!(device_id, principal = %principal.id, "device owned by another principal");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn apply_projection(
        &self,
        _principal: &Principal,
        device_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        self.devices.apply_projection(device_id, projection).await
    }

    async fn touch(
        &self,
        _principal: &Principal,
        device_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.devices.touch(device_id, at).await
    }
}

/// Single-device accounts whose lock state lives on the profile. Only the
/// id `device-<principal>` resolves here.
pub struct ProfileDerivedDevice {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileDerivedDevice {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    fn owns(principal: &Principal, device_id: &str) -> bool {
        device_id
            .strip_prefix(PROFILE_DEVICE_PREFIX)
            .is_some_and(|uid| uid == principal.id)
    }
}

pub fn device_from_profile(device_id: &str, profile: Profile) -> Device {
    let info = profile.device_info.unwrap_or_default();
    let unknown = || "Unknown".to_string();
    Device {
        id: device_id.to_string(),
        owner_id: profile.user_id,
        info: DeviceInfo {
            name: info.name.unwrap_or_else(|| "My device".to_string()),
            brand: info.brand.unwrap_or_else(unknown),
            model_name: info.model_name.unwrap_or_else(unknown),
            os_name: info.os_name.unwrap_or_else(|| "Android".to_string()),
            os_version: info.os_version.unwrap_or_else(unknown),
        },
        lock: profile.lock,
        last_activity: profile.last_activity.unwrap_or(profile.created_at),
        registered_at: Some(profile.created_at),
        origin: DeviceOrigin::Profile,
    }
}

#[async_trait]
impl DeviceSource for ProfileDerivedDevice {
    fn name(&self) -> &'static str {
        "profile"
    }

    async fn resolve(
        &self,
        principal: &Principal,
        device_id: &str,
    ) -> DomainResult<Option<Device>> {
        if !Self::owns(principal, device_id) {
            return Ok(None);
        }
        let profile = self.profiles.get(&principal.id).await?;
        Ok(profile.map(|p| device_from_profile(device_id, p)))
    }

    async fn apply_projection(
        &self,
        principal: &Principal,
        _device_id: &str,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        self.profiles.apply_projection(&principal.id, projection).await
    }

    async fn touch(
        &self,
        principal: &Principal,
        _device_id: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.profiles.touch(&principal.id, at).await
    }
}

/// A device view together with the source that produced it.
pub struct ResolvedDevice {
    pub device: Device,
    source: Arc<dyn DeviceSource>,
}

impl ResolvedDevice {
    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub async fn apply_projection(
        &self,
        principal: &Principal,
        projection: &LockProjection,
    ) -> DomainResult<()> {
        self.source
            .apply_projection(principal, &self.device.id, projection)
            .await
    }

    pub async fn touch(&self, principal: &Principal, at: DateTime<Utc>) -> DomainResult<()> {
        self.source.touch(principal, &self.device.id, at).await
    }
}

/// Tries each source in order; the first that knows the device wins.
pub struct DeviceResolver {
    sources: Vec<Arc<dyn DeviceSource>>,
}

impl DeviceResolver {
    pub fn new(sources: Vec<Arc<dyn DeviceSource>>) -> Self {
        Self { sources }
    }

    /// Registered devices first, then the profile-derived view.
    pub fn standard(devices: Arc<dyn DeviceStore>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self::new(vec![
            Arc::new(DirectDeviceLookup::new(devices)),
            Arc::new(ProfileDerivedDevice::new(profiles)),
        ])
    }

    pub async fn resolve(
        &self,
        principal: &Principal,
        device_id: &str,
    ) -> DomainResult<ResolvedDevice> {
        for source in &self.sources {
            if let Some(device) = source.resolve(principal, device_id).await? {
                debug!(device_id, source = source.name(), "device resolved");
                return Ok(ResolvedDevice {
                    device,
                    source: Arc::clone(source),
                });
            }
        }
        Err(DomainError::DeviceNotFound(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{profile, registered_device};

    fn resolver(store: &Arc<MemoryStore>) -> DeviceResolver {
        DeviceResolver::standard(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn profile_fallback_preserves_lock_state() {
        let store = Arc::new(MemoryStore::new());
        store.insert_profile(profile("U1", true));

        let resolved = resolver(&store)
            .resolve(&Principal::new("U1"), "device-U1")
            .await
            .unwrap();

        assert_eq!(resolved.source_name(), "profile");
        assert_eq!(resolved.device.origin, DeviceOrigin::Profile);
        assert!(resolved.device.lock.blocked);
        assert!(resolved.device.lock.blocked_at.is_some());
        assert_eq!(resolved.device.info.brand, "Acme");
        assert_eq!(resolved.device.info.name, "My device");
        assert_eq!(resolved.device.info.os_name, "Android");
    }

    #[tokio::test]
    async fn profile_fallback_only_for_own_id() {
        let store = Arc::new(MemoryStore::new());
        store.insert_profile(profile("U1", false));
        store.insert_profile(profile("U2", false));

        let err = resolver(&store)
            .resolve(&Principal::new("U1"), "device-U2")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn projection_goes_back_to_resolving_source() {
        let store = Arc::new(MemoryStore::new());
        store.insert_profile(profile("U1", false));
        let principal = Principal::new("U1");

        let resolved = resolver(&store).resolve(&principal, "device-U1").await.unwrap();
        resolved
            .apply_projection(&principal, &LockProjection::lock(Utc::now()))
            .await
            .unwrap();

        let again = resolver(&store).resolve(&principal, "device-U1").await.unwrap();
        assert!(again.device.lock.blocked);
        assert_eq!(again.device.lock.block_reason.as_deref(), Some("remote_lock"));
    }

    #[tokio::test]
    async fn resolving_twice_yields_the_same_device() {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(registered_device("D1", "U1", true));
        store.insert_profile(profile("U1", false));
        let principal = Principal::new("U1");
        let resolver = resolver(&store);

        for device_id in ["D1", "device-U1"] {
            let first = resolver.resolve(&principal, device_id).await.unwrap();
            let second = resolver.resolve(&principal, device_id).await.unwrap();
            assert_eq!(first.source_name(), second.source_name());
            assert_eq!(first.device, second.device);
        }
    }

    #[tokio::test]
    async fn registered_device_of_other_owner_is_hidden() {
        let store = Arc::new(MemoryStore::new());
        store.insert_device(registered_device("D1", "U2", false));

        let err = resolver(&store)
            .resolve(&Principal::new("U1"), "D1")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DomainError::DeviceNotFound(_)));
    }
}
