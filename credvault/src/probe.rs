//! Authentication capability probing.
//!
//! Decides whether the vault may be used under a caller policy and which
//! biometric sensors the device carries. The actual prompt is driven by
//! the embedding application; this module only answers "can we".

use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::CapabilityResult;

/// Set of biometric authenticator classes a check may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticators(u8);

impl Authenticators {
    /// Class 3 biometrics (strong).
    pub const BIOMETRIC_STRONG: Self = Self(0b01);
    /// Class 2 biometrics (weak).
    pub const BIOMETRIC_WEAK: Self = Self(0b10);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Allowed set for a policy: strong always, weak only on request.
    pub fn for_policy(allow_weak_factor: bool) -> Self {
        if allow_weak_factor {
            Self::BIOMETRIC_STRONG | Self::BIOMETRIC_WEAK
        } else {
            Self::BIOMETRIC_STRONG
        }
    }
}

impl BitOr for Authenticators {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Platform answer to "can the user authenticate with these authenticators".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiometricStatus {
    Success,
    NoHardware,
    HardwareUnavailable,
    NoneEnrolled,
    SecurityUpdateRequired,
    Unsupported,
    Unknown,
}

/// Device capability queries supplied by the platform.
pub trait DeviceCapabilities {
    fn has_fingerprint_hardware(&self) -> bool;
    fn has_face_hardware(&self) -> bool;
    fn has_iris_hardware(&self) -> bool;

    /// A PIN, pattern or password is configured.
    fn is_device_secure(&self) -> bool;

    fn can_authenticate(&self, authenticators: Authenticators) -> BiometricStatus;
}

/// Answers whether authentication is possible under a caller policy.
pub struct AuthCapabilityProbe<D: DeviceCapabilities> {
    device: D,
}

impl<D: DeviceCapabilities> AuthCapabilityProbe<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Check availability.
    ///
    /// `allow_fallback` admits the device credential as an alternative to
    /// biometrics, but once requested it is mandatory: a device without a
    /// secure lock screen reports `Unavailable` even if biometrics would
    /// pass. When available, the result names the sensors present, or
    /// `FallbackOnly` when there are none.
    pub fn is_available(&self, allow_fallback: bool, allow_weak_factor: bool) -> CapabilityResult {
        let authenticators = Authenticators::for_policy(allow_weak_factor);
        let mut status = self.device.can_authenticate(authenticators);

        // The biometric check cannot test for a device credential, so ask separately
        let fallback_available = allow_fallback && self.device.is_device_secure();
        if allow_fallback && !fallback_available {
            debug!("Fallback requested but no device credential configured");
            status = BiometricStatus::HardwareUnavailable;
        }

        let available = status == BiometricStatus::Success || fallback_available;
        debug!(
            "Capability check: status={:?} fallback={} available={}",
            status, fallback_available, available
        );
        if !available {
            return CapabilityResult::Unavailable;
        }
        self.available_feature()
    }

    /// Sensors present on the device, checked fingerprint, face, iris.
    fn available_feature(&self) -> CapabilityResult {
        let checks = [
            (self.device.has_fingerprint_hardware(), CapabilityResult::Fingerprint),
            (self.device.has_face_hardware(), CapabilityResult::Face),
            (self.device.has_iris_hardware(), CapabilityResult::Iris),
        ];

        let mut result = CapabilityResult::FallbackOnly;
        for (present, feature) in checks {
            if !present {
                continue;
            }
            if result != CapabilityResult::FallbackOnly {
                return CapabilityResult::Multiple;
            }
            result = feature;
        }
        result
    }
}
