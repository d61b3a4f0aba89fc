use super::source::Channel;

/// Errors that can occur while configuring or arming the hotkey
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("accessibility permission is required for system-wide key monitoring")]
    PermissionDenied,

    #[error("failed to create {0} event tap")]
    TapCreation(Channel),

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("an enabled hotkey needs at least one modifier")]
    EmptyModifiers,

    #[error("arming task failed: {0}")]
    ArmTask(String),

    #[error("hotkey state lock poisoned")]
    Poisoned,
}
