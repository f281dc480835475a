//! Instruction Set Architectures.
//!
//! The `isa` module provides a `TargetIsa` trait. It doesn't depend on
//! ISA-specific data structures directly; a concrete ISA is obtained by
//! looking up a target triple:
//!
//! ```
//! # use anvil_codegen::isa;
//! # use anvil_codegen::settings;
//! use std::str::FromStr;
//! use target_lexicon::Triple;
//! let shared_flags = settings::Flags::default();
//! match isa::lookup(Triple::from_str("aarch64-unknown-linux-gnu").unwrap()) {
//!     Err(_) => {
//!         // The x86 target ISA is not available.
//!     }
//!     Ok(isa_builder) => {
//!         let isa = isa_builder.finish(shared_flags);
//!     }
//! }
//! ```

use crate::ir::{Function, Opcode, Type};
use crate::legalizer::Action;
use crate::binemit::{MachReloc, MachTrap};
use crate::result::CodegenResult;
use crate::settings::Flags;
use core::fmt;
use target_lexicon::{Architecture, Triple};

mod call_conv;
pub use call_conv::CallConv;

#[cfg(feature = "arm64")]
pub mod aarch64;
#[cfg(feature = "riscv64")]
pub mod riscv64;
#[cfg(feature = "s390x")]
pub mod s390x;
#[cfg(feature = "x86")]
pub mod x64;

/// A CPU feature that lowering rules may test for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
#[repr(u32)]
pub enum Feature {
    // AArch64.
    Neon,
    Lse,
    Sve,
    // x86-64.
    Sse2,
    Sse41,
    Avx2,
    Avx512,
    // RISC-V extensions.
    M,
    F,
    D,
    A,
    C,
    // s390x.
    Mie2,
}

/// An immutable bitset of CPU features.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Features(u64);

impl Features {
    /// No features.
    pub fn none() -> Self {
        Self(0)
    }

    /// Add a feature.
    pub fn with(mut self, feature: Feature) -> Self {
        self.0 |= 1 << (feature as u32);
        self
    }

    /// Does this set contain `feature`? Total: unknown features are
    /// simply absent.
    pub fn has(self, feature: Feature) -> bool {
        self.0 & (1 << (feature as u32)) != 0
    }

    /// The baseline feature set assumed for each architecture.
    pub fn baseline(arch: Architecture) -> Self {
        match arch {
            Architecture::Aarch64(_) => Self::none().with(Feature::Neon),
            Architecture::X86_64 => Self::none().with(Feature::Sse2),
            Architecture::Riscv64(_) => Self::none()
                .with(Feature::M)
                .with(Feature::F)
                .with(Feature::D)
                .with(Feature::A),
            Architecture::S390x => Self::none(),
            _ => Self::none(),
        }
    }

    /// Detect the features of the host CPU, when compiling for the host
    /// architecture; the baseline otherwise.
    pub fn detect_host(arch: Architecture) -> Self {
        let mut features = Self::baseline(arch);
        #[cfg(target_arch = "x86_64")]
        {
            if matches!(arch, Architecture::X86_64) {
                if std::arch::is_x86_feature_detected!("sse4.1") {
                    features = features.with(Feature::Sse41);
                }
                if std::arch::is_x86_feature_detected!("avx2") {
                    features = features.with(Feature::Avx2);
                }
                if std::arch::is_x86_feature_detected!("avx512f") {
                    features = features.with(Feature::Avx512);
                }
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            if matches!(arch, Architecture::Aarch64(_)) {
                if std::arch::is_aarch64_feature_detected!("lse") {
                    features = features.with(Feature::Lse);
                }
                if std::arch::is_aarch64_feature_detected!("sve") {
                    features = features.with(Feature::Sve);
                }
            }
        }
        features
    }
}

/// The result of compiling one function: everything the embedder needs to
/// link and run the code.
pub struct CompiledCode {
    /// The machine code, in target byte order.
    pub code: Vec<u8>,
    /// Relocations to apply.
    pub relocs: Vec<MachReloc>,
    /// Trap records.
    pub traps: Vec<MachTrap>,
    /// Size of the stack frame the function allocates.
    pub frame_size: u32,
}

/// Methods that are specialized to a target ISA.
pub trait TargetIsa: Send + Sync {
    /// Get the name of this ISA.
    fn name(&self) -> &'static str;

    /// Get the target triple that was used to make this trait object.
    fn triple(&self) -> &Triple;

    /// Get the shared flags used to make this trait object.
    fn flags(&self) -> &Flags;

    /// Get the CPU feature set used to make this trait object.
    fn features(&self) -> &Features;

    /// The pointer type for this target.
    fn pointer_ty(&self) -> Type {
        crate::ir::types::I64
    }

    /// Classify an (opcode, controlling type) pair for the legalizer.
    fn legalize_action(&self, opcode: Opcode, ctrl_type: Type) -> Action;

    /// Compile one legalized function to machine code.
    fn compile_function(&self, func: &Function) -> CodegenResult<CompiledCode>;
}

impl fmt::Debug for &dyn TargetIsa {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TargetIsa {{ triple: {:?} }}", self.triple())
    }
}

/// An owned target ISA trait object.
pub type OwnedTargetIsa = Box<dyn TargetIsa>;

/// Builder for a `TargetIsa`, modifiable with CPU feature flags before
/// being frozen.
pub struct IsaBuilder {
    triple: Triple,
    features: Features,
    constructor: fn(Triple, Flags, Features) -> OwnedTargetIsa,
}

impl IsaBuilder {
    /// The triple this builder targets.
    pub fn triple(&self) -> &Triple {
        &self.triple
    }

    /// Enable a CPU feature.
    pub fn enable(&mut self, feature: Feature) -> &mut Self {
        self.features = self.features.with(feature);
        self
    }

    /// Combine the ISA-specific settings with the provided shared
    /// settings to produce a fully configured `TargetIsa`.
    pub fn finish(self, shared_flags: Flags) -> OwnedTargetIsa {
        (self.constructor)(self.triple, shared_flags, self.features)
    }
}

/// Describes reason in which a target was not recognized.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum LookupError {
    /// Support for this target was disabled in the current build.
    SupportDisabled,
    /// Support for this target has not yet been implemented.
    Unsupported,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LookupError::SupportDisabled => write!(f, "Support for this target is disabled"),
            LookupError::Unsupported => {
                write!(f, "Support for this target has not been implemented yet")
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Look for an ISA for the given target triple.
///
/// Returns a builder that can create a corresponding `TargetIsa`.
pub fn lookup(triple: Triple) -> Result<IsaBuilder, LookupError> {
    let features = Features::baseline(triple.architecture);
    match triple.architecture {
        Architecture::Aarch64 { .. } => {
            #[cfg(feature = "arm64")]
            {
                Ok(IsaBuilder {
                    triple,
                    features,
                    constructor: aarch64::isa_constructor,
                })
            }
            #[cfg(not(feature = "arm64"))]
            {
                Err(LookupError::SupportDisabled)
            }
        }
        Architecture::X86_64 => {
            #[cfg(feature = "x86")]
            {
                Ok(IsaBuilder {
                    triple,
                    features,
                    constructor: x64::isa_constructor,
                })
            }
            #[cfg(not(feature = "x86"))]
            {
                Err(LookupError::SupportDisabled)
            }
        }
        Architecture::Riscv64 { .. } => {
            #[cfg(feature = "riscv64")]
            {
                Ok(IsaBuilder {
                    triple,
                    features,
                    constructor: riscv64::isa_constructor,
                })
            }
            #[cfg(not(feature = "riscv64"))]
            {
                Err(LookupError::SupportDisabled)
            }
        }
        Architecture::S390x => {
            #[cfg(feature = "s390x")]
            {
                Ok(IsaBuilder {
                    triple,
                    features,
                    constructor: s390x::isa_constructor,
                })
            }
            #[cfg(not(feature = "s390x"))]
            {
                Err(LookupError::SupportDisabled)
            }
        }
        _ => Err(LookupError::Unsupported),
    }
}

/// Look for an ISA matching the host machine.
pub fn lookup_by_name(name: &str) -> Result<IsaBuilder, LookupError> {
    use std::str::FromStr;
    match Triple::from_str(name) {
        Ok(triple) => lookup(triple),
        Err(_) => Err(LookupError::Unsupported),
    }
}
