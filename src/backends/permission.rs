// SPDX-License-Identifier: GPL-3.0-only

//! Camera permission collaborator

use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};

/// Camera permission as last reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PermissionState {
    /// Not asked yet
    #[default]
    Unknown,
    /// The user allowed camera access
    Granted,
    /// The user refused; only a settings change can undo this
    Denied,
}

/// Asks the platform for camera access
///
/// Called once per session. The request is not retried after a denial.
pub trait PermissionProvider: Send + Sync {
    /// Resolve to `Granted` or `Denied`
    fn request_camera_permission(&self) -> BoxFuture<'static, PermissionState>;
}

/// A provider with a fixed answer
///
/// Used when access is managed outside the process (desktop, CLI) and by tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub PermissionState);

impl StaticPermission {
    pub fn granted() -> Self {
        Self(PermissionState::Granted)
    }

    pub fn denied() -> Self {
        Self(PermissionState::Denied)
    }
}

impl PermissionProvider for StaticPermission {
    fn request_camera_permission(&self) -> BoxFuture<'static, PermissionState> {
        Box::pin(future::ready(self.0))
    }
}
