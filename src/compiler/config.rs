//! Configuration for the optimization driver.
//!
//! [`CompilerConfig`] controls which passes [`crate::compiler::Program::optimize`] runs and
//! how long it may iterate.

use crate::analysis::sccp::DEFAULT_MAX_ROUNDS;

/// Configuration for the optimization pipeline.
///
/// Parsing a method always runs stack elimination and port cleanup; the flags below only
/// select the simplification passes layered on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Maximum iterations of the per-method and whole-program loops (default: 20).
    pub max_iterations: usize,

    /// Maximum rounds of one graph evaluation before everything is reported unknown
    /// (default: 1000).
    pub max_evaluation_rounds: usize,

    /// Replace calls whose result is a constant or an argument.
    pub enable_inlining: bool,

    /// Fold constant outputs and simplify decided branches.
    pub enable_constant_propagation: bool,

    /// Fuse blocks joined by an unconditional jump.
    pub enable_jump_fusion: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_evaluation_rounds: DEFAULT_MAX_ROUNDS,
            enable_inlining: true,
            enable_constant_propagation: true,
            enable_jump_fusion: true,
        }
    }
}

impl CompilerConfig {
    /// Creates a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that only parses.
    ///
    /// Graphs keep their block structure and every call; useful for inspecting what the
    /// builder produced.
    #[must_use]
    pub fn parse_only() -> Self {
        Self {
            enable_inlining: false,
            enable_constant_propagation: false,
            enable_jump_fusion: false,
            ..Self::default()
        }
    }

    /// Creates a "fast" configuration: few iterations, no inlining.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_iterations: 5,
            max_evaluation_rounds: 100,
            enable_inlining: false,
            ..Self::default()
        }
    }

    /// Creates an "aggressive" configuration with generous limits.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_iterations: 50,
            max_evaluation_rounds: 10_000,
            ..Self::default()
        }
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Sets the round limit of each graph evaluation.
    #[must_use]
    pub fn with_max_evaluation_rounds(mut self, max: usize) -> Self {
        self.max_evaluation_rounds = max;
        self
    }

    /// Enables or disables call inlining.
    #[must_use]
    pub fn with_inlining(mut self, enable: bool) -> Self {
        self.enable_inlining = enable;
        self
    }

    /// Enables or disables constant propagation.
    #[must_use]
    pub fn with_constant_propagation(mut self, enable: bool) -> Self {
        self.enable_constant_propagation = enable;
        self
    }

    /// Enables or disables jump fusion.
    #[must_use]
    pub fn with_jump_fusion(mut self, enable: bool) -> Self {
        self.enable_jump_fusion = enable;
        self
    }
}
