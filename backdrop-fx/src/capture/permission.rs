/// Camera authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Authorized,
    Denied,
    /// The user has not been asked yet.
    NotDetermined,
}

/// Source of camera-use authorization.
pub trait CameraPermission: Send {
    fn status(&self) -> Authorization;

    /// Prompt for access. Blocks until the user answers.
    fn request_access(&self) -> bool;
}

/// Resolve authorization once, prompting only when undetermined.
pub fn resolve_permission(permission: &dyn CameraPermission) -> bool {
    match permission.status() {
        Authorization::Authorized => true,
        Authorization::Denied => false,
        Authorization::NotDetermined => {
            tracing::info!("Requesting camera access");
            permission.request_access()
        }
    }
}

/// Fixed answer, for tests and for platforms without an authorization API.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission {
    status: Authorization,
    grant_on_request: bool,
}

impl StaticPermission {
    pub fn granted() -> Self {
        Self {
            status: Authorization::Authorized,
            grant_on_request: true,
        }
    }

    pub fn denied() -> Self {
        Self {
            status: Authorization::Denied,
            grant_on_request: false,
        }
    }

    /// Undetermined until asked; the prompt answers `grant`.
    pub fn prompt(grant: bool) -> Self {
        Self {
            status: Authorization::NotDetermined,
            grant_on_request: grant,
        }
    }
}

impl CameraPermission for StaticPermission {
    fn status(&self) -> Authorization {
        self.status
    }

    fn request_access(&self) -> bool {
        self.grant_on_request
    }
}

/// Authorization through the capture backend, plus the device node's
/// access bits on Linux.
#[cfg(feature = "camera")]
#[derive(Debug, Clone, Copy)]
pub struct DevicePermission {
    device_index: u32,
}

#[cfg(feature = "camera")]
impl DevicePermission {
    pub fn new(device_index: u32) -> Self {
        Self { device_index }
    }
}

#[cfg(feature = "camera")]
impl CameraPermission for DevicePermission {
    fn status(&self) -> Authorization {
        #[cfg(target_os = "linux")]
        {
            let node = format!("/dev/video{}", self.device_index);
            if let Err(e) = std::fs::File::open(&node) {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    tracing::warn!("No read access to {}", node);
                    return Authorization::Denied;
                }
            }
        }

        if nokhwa::nokhwa_check() {
            Authorization::Authorized
        } else {
            Authorization::NotDetermined
        }
    }

    fn request_access(&self) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        nokhwa::nokhwa_initialize(move |granted| {
            let _ = tx.try_send(granted);
        });
        rx.recv().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorized_skips_prompt() {
        let permission = StaticPermission {
            status: Authorization::Authorized,
            grant_on_request: false,
        };
        assert!(resolve_permission(&permission));
    }

    #[test]
    fn denied_is_final() {
        assert!(!resolve_permission(&StaticPermission::denied()));
    }

    #[test]
    fn undetermined_uses_prompt_answer() {
        assert!(resolve_permission(&StaticPermission::prompt(true)));
        assert!(!resolve_permission(&StaticPermission::prompt(false)));
    }
}
