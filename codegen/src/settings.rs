//! Shared settings controlling compilation.
//!
//! Settings are assembled through a builder and frozen into an immutable
//! `Flags` value which is passed by shared reference to every stage of the
//! pipeline. Per-ISA feature sets live with the ISA (`isa::Features`).

use std::fmt;

/// Optimization level for generated code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    /// No optimizations; fastest compilation.
    None,
    /// Basic optimizations: constant folding, GVN, dead-code elimination.
    Speed,
    /// All of the above, tuned to also keep code size down.
    SpeedAndSize,
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Speed => "speed",
            Self::SpeedAndSize => "speed_and_size",
        })
    }
}

/// A builder for `Flags`.
#[derive(Clone, Debug)]
pub struct Builder {
    flags: Flags,
}

impl Builder {
    /// Create a builder with all flags at their default values.
    pub fn new() -> Self {
        Self {
            flags: Flags::default(),
        }
    }

    /// Select the optimization level.
    pub fn set_opt_level(&mut self, level: OptLevel) -> &mut Self {
        self.flags.opt_level = level;
        self
    }

    /// Run the IR verifier before and after transformations.
    pub fn set_verify_ir(&mut self, enable: bool) -> &mut Self {
        self.flags.verify_ir = enable;
        self
    }

    /// Emit stack-probe code in function prologues for large frames.
    pub fn set_enable_probestack(&mut self, enable: bool) -> &mut Self {
        self.flags.enable_probestack = enable;
        self
    }

    /// Record trap metadata for trapping instructions.
    pub fn set_emit_traps(&mut self, enable: bool) -> &mut Self {
        self.flags.emit_traps = enable;
        self
    }

    /// Limit the size in bytes of any single compiled function.
    pub fn set_code_size_limit(&mut self, limit: u32) -> &mut Self {
        self.flags.code_size_limit = limit;
        self
    }

    /// Freeze the settings into an immutable `Flags`.
    pub fn finish(&self) -> Flags {
        self.flags.clone()
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// Frozen compilation settings.
#[derive(Clone, Debug)]
pub struct Flags {
    opt_level: OptLevel,
    verify_ir: bool,
    enable_probestack: bool,
    emit_traps: bool,
    code_size_limit: u32,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::None,
            verify_ir: true,
            enable_probestack: false,
            emit_traps: true,
            code_size_limit: 128 << 20,
        }
    }
}

impl Flags {
    /// Create flags with all default values.
    pub fn new(builder: Builder) -> Self {
        builder.finish()
    }

    /// Optimization level.
    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    /// Whether the IR verifier runs around transformations.
    pub fn verify_ir(&self) -> bool {
        self.verify_ir
    }

    /// Whether stack probes are emitted for large frames.
    pub fn enable_probestack(&self) -> bool {
        self.enable_probestack
    }

    /// Whether trap metadata is recorded.
    pub fn emit_traps(&self) -> bool {
        self.emit_traps
    }

    /// Upper limit on the byte size of one compiled function.
    pub fn code_size_limit(&self) -> u32 {
        self.code_size_limit
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "opt_level = {}", self.opt_level)?;
        writeln!(f, "verify_ir = {}", self.verify_ir)?;
        writeln!(f, "enable_probestack = {}", self.enable_probestack)?;
        writeln!(f, "emit_traps = {}", self.emit_traps)?;
        writeln!(f, "code_size_limit = {}", self.code_size_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_default() {
        let f = Flags::default();
        assert_eq!(
            f.to_string(),
            "opt_level = none\n\
             verify_ir = true\n\
             enable_probestack = false\n\
             emit_traps = true\n\
             code_size_limit = 134217728\n"
        );
    }

    #[test]
    fn builder() {
        let mut b = Builder::new();
        b.set_opt_level(OptLevel::Speed).set_verify_ir(false);
        let f = b.finish();
        assert_eq!(f.opt_level(), OptLevel::Speed);
        assert!(!f.verify_ir());
    }
}
