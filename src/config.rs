/// Locals addressable by one function (one-byte slot operand).
pub const MAX_LOCALS: usize = 256;
/// Parameters per function and arguments per call.
pub const MAX_ARITY: usize = 255;
/// Default call depth.
pub const FRAMES_MAX: usize = 128;

/// Runtime limits and switches for a `Vm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub max_frames: usize,
    pub max_stack: usize,
    /// Log every instruction and the stack at `trace` level.
    pub trace_execution: bool,
}

impl VmConfig {
    /// Config with the given call depth and a stack sized for it.
    pub fn with_max_frames(max_frames: usize) -> Self {
        VmConfig { max_frames, max_stack: max_frames * MAX_LOCALS, ..Self::default() }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig { max_frames: FRAMES_MAX, max_stack: FRAMES_MAX * MAX_LOCALS, trace_execution: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits() {
        let config = VmConfig::default();
        assert_eq!(config.max_frames, 128);
        assert_eq!(config.max_stack, 128 * 256);
        assert!(!config.trace_execution);
    }

    #[test]
    fn stack_scales_with_frames() {
        let config = VmConfig::with_max_frames(4);
        assert_eq!(config.max_frames, 4);
        assert_eq!(config.max_stack, 4 * MAX_LOCALS);
    }
}
