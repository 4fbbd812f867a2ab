use thiserror::Error;

use crate::device::FenceValue;

/// Failure raised by the GPU layer.
///
/// Every variant is fatal for the frame loop: the engine does not retry GPU
/// calls and does not attempt device-loss recovery.
#[derive(Debug, Error)]
pub enum GpuError {
    /// Device, queue, swapchain, descriptor table or shader creation failed.
    #[error("initialization failed: {0}")]
    Init(String),

    /// A submission, present or resource call failed after start-up.
    #[error("gpu call `{call}` failed: {reason}")]
    Api { call: &'static str, reason: String },

    /// The fence wait primitive errored or returned early.
    #[error("fence wait for value {value} failed: {reason}")]
    FenceWait { value: FenceValue, reason: String },

    /// The caller broke an ordering or ownership rule the engine enforces.
    #[error("precondition violated: {0}")]
    Precondition(String),
}

impl GpuError {
    pub(crate) fn init(msg: impl Into<String>) -> Self {
        GpuError::Init(msg.into())
    }

    pub(crate) fn api(call: &'static str, reason: impl ToString) -> Self {
        GpuError::Api {
            call,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        GpuError::Precondition(msg.into())
    }

    /// Whether the error ends the running state. Always `true`.
    pub fn is_fatal(&self) -> bool {
        true
    }
}

/// Shorthand used across the GPU layer.
pub type GpuResult<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_is_fatal() {
        let errors = [
            GpuError::init("no adapter"),
            GpuError::api("submit", "device lost"),
            GpuError::FenceWait {
                value: FenceValue::new(4),
                reason: "timeout".into(),
            },
            GpuError::precondition("slot 0 still recording"),
        ];
        assert!(errors.iter().all(GpuError::is_fatal));
    }

    #[test]
    fn display_names_the_failing_call() {
        let err = GpuError::api("present", "surface lost");
        assert_eq!(err.to_string(), "gpu call `present` failed: surface lost");
    }
}
