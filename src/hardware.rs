//! Hardware interface definitions for generated HLS kernels
//!
//! Numeric formats as seen by the synthesis tool, the pragmas the compiler
//! can attach to loops and operators, and the metadata handed to the
//! build/deployment collaborators.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::RuntimeConfig;

/// Extra integer bits granted to the result of fixed-point arithmetic
pub const GUARD_BITS: u32 = 2;

/// Native scalar formats (numpy dtypes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl ScalarKind {
    /// Look up a numpy dtype name, including the usual Python aliases
    pub fn from_dtype(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" | "bool_" => ScalarKind::Bool,
            "int8" => ScalarKind::Int8,
            "int16" => ScalarKind::Int16,
            "int32" => ScalarKind::Int32,
            "int64" | "int" => ScalarKind::Int64,
            "uint8" => ScalarKind::UInt8,
            "uint16" => ScalarKind::UInt16,
            "uint32" => ScalarKind::UInt32,
            "uint64" => ScalarKind::UInt64,
            "float32" | "single" => ScalarKind::Float32,
            "float64" | "float" | "double" => ScalarKind::Float64,
            _ => return None,
        };
        Some(kind)
    }

    pub fn dtype_name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int8 => "int8",
            ScalarKind::Int16 => "int16",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::UInt8 => "uint8",
            ScalarKind::UInt16 => "uint16",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::UInt64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
        }
    }

    /// Storage width in bits
    pub fn bits(self) -> u32 {
        match self {
            ScalarKind::Bool => 1,
            ScalarKind::Int8 | ScalarKind::UInt8 => 8,
            ScalarKind::Int16 | ScalarKind::UInt16 => 16,
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => 32,
            ScalarKind::Int64 | ScalarKind::UInt64 | ScalarKind::Float64 => 64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float32 | ScalarKind::Float64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            ScalarKind::Int8
                | ScalarKind::Int16
                | ScalarKind::Int32
                | ScalarKind::Int64
                | ScalarKind::Float32
                | ScalarKind::Float64
        )
    }

    /// Smallest integer kind holding `bits` bits
    fn integer(bits: u32, signed: bool) -> Self {
        match (bits, signed) {
            (0..=8, true) => ScalarKind::Int8,
            (9..=16, true) => ScalarKind::Int16,
            (17..=32, true) => ScalarKind::Int32,
            (_, true) => ScalarKind::Int64,
            (0..=8, false) => ScalarKind::UInt8,
            (9..=16, false) => ScalarKind::UInt16,
            (17..=32, false) => ScalarKind::UInt32,
            (_, false) => ScalarKind::UInt64,
        }
    }

    /// Native C spelling
    pub fn c_type(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int8 => "signed char",
            ScalarKind::Int16 => "short",
            ScalarKind::Int32 => "int",
            ScalarKind::Int64 => "long long",
            ScalarKind::UInt8 => "unsigned char",
            ScalarKind::UInt16 => "unsigned short",
            ScalarKind::UInt32 => "unsigned int",
            ScalarKind::UInt64 => "unsigned long long",
            ScalarKind::Float32 => "float",
            ScalarKind::Float64 => "double",
        }
    }

    /// Result of arithmetic between two native scalars: the widest float
    /// wins, otherwise the widest integer, signed if either side is
    fn join(self, other: Self) -> Self {
        match (self.is_float(), other.is_float()) {
            (true, true) => {
                if self.bits() >= other.bits() {
                    self
                } else {
                    other
                }
            }
            (true, false) => self,
            (false, true) => other,
            (false, false) => {
                let bits = self.bits().max(other.bits());
                ScalarKind::integer(bits, self.is_signed() || other.is_signed())
            }
        }
    }
}

/// Numeric format of a value in hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardwareType {
    Scalar { scalar: ScalarKind },
    /// Signed fixed point with `integer_bits` of the `total_bits` before the
    /// binary point
    FixedPoint { total_bits: u32, integer_bits: u32 },
}

impl HardwareType {
    pub const fn scalar(kind: ScalarKind) -> Self {
        HardwareType::Scalar { scalar: kind }
    }

    /// Fixed-point format, `None` unless `0 < total` and `integer <= total`
    pub fn fixed(total_bits: u32, integer_bits: u32) -> Option<Self> {
        if total_bits == 0 || integer_bits > total_bits {
            return None;
        }
        Some(HardwareType::FixedPoint {
            total_bits,
            integer_bits,
        })
    }

    pub fn fractional_bits(&self) -> u32 {
        match self {
            HardwareType::Scalar { .. } => 0,
            HardwareType::FixedPoint {
                total_bits,
                integer_bits,
            } => total_bits - integer_bits,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, HardwareType::Scalar { scalar } if scalar.is_float())
    }

    /// Integer or bool scalar
    pub fn is_integral(&self) -> bool {
        matches!(self, HardwareType::Scalar { scalar } if !scalar.is_float())
    }

    /// Total width in bits
    pub fn bits(&self) -> u32 {
        match self {
            HardwareType::Scalar { scalar } => scalar.bits(),
            HardwareType::FixedPoint { total_bits, .. } => *total_bits,
        }
    }

    /// Type of a binary arithmetic result
    ///
    /// Two fixed-point operands widen to the larger format plus
    /// [`GUARD_BITS`]; a scalar meeting a fixed-point operand first becomes
    /// an all-integer fixed-point value of its own width.
    pub fn join(self, other: Self) -> Self {
        match (self, other) {
            (HardwareType::Scalar { scalar: a }, HardwareType::Scalar { scalar: b }) => {
                HardwareType::scalar(a.join(b))
            }
            (
                HardwareType::FixedPoint {
                    total_bits: a,
                    integer_bits: ia,
                },
                HardwareType::FixedPoint {
                    total_bits: b,
                    integer_bits: ib,
                },
            ) => HardwareType::FixedPoint {
                total_bits: a.max(b) + GUARD_BITS,
                integer_bits: ia.max(ib),
            },
            (HardwareType::Scalar { scalar }, fixed @ HardwareType::FixedPoint { .. }) => {
                Self::promote(scalar).join(fixed)
            }
            (fixed @ HardwareType::FixedPoint { .. }, HardwareType::Scalar { scalar }) => {
                fixed.join(Self::promote(scalar))
            }
        }
    }

    fn promote(scalar: ScalarKind) -> Self {
        HardwareType::FixedPoint {
            total_bits: scalar.bits(),
            integer_bits: scalar.bits(),
        }
    }

    /// C/C++ spelling for HLS
    pub fn c_type(&self) -> String {
        match self {
            HardwareType::Scalar { scalar } => scalar.c_type().to_string(),
            HardwareType::FixedPoint {
                total_bits,
                integer_bits,
            } => format!("ap_fixed<{}, {}>", total_bits, integer_bits),
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardwareType::Scalar { scalar } => write!(f, "{}", scalar.dtype_name()),
            HardwareType::FixedPoint {
                total_bits,
                integer_bits,
            } => write!(f, "fixed<{}, {}>", total_bits, integer_bits),
        }
    }
}

/// Synthesis directive attached to a loop or operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pragma {
    Pipeline { ii: u32 },
    /// Full unroll when `factor` is absent
    Unroll { factor: Option<u32> },
}

impl Pragma {
    pub fn render(&self) -> String {
        match self {
            Pragma::Pipeline { ii } => format!("#pragma HLS pipeline II={}", ii),
            Pragma::Unroll { factor: None } => "#pragma HLS unroll".to_string(),
            Pragma::Unroll { factor: Some(n) } => format!("#pragma HLS unroll factor={}", n),
        }
    }
}

impl fmt::Display for Pragma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pragma::Pipeline { ii } => write!(f, "pipeline II={}", ii),
            Pragma::Unroll { factor: None } => write!(f, "unroll"),
            Pragma::Unroll { factor: Some(n) } => write!(f, "unroll factor={}", n),
        }
    }
}

/// What the compiler reports about a generated kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileMetadata {
    /// Workspace project directory for the kernel
    pub project_path: PathBuf,
    pub top_function_name: String,
    /// One memory bundle per array argument
    pub num_bundles: usize,
    pub returns_void: bool,
}

/// Everything the deployment collaborator needs to build and invoke a
/// kernel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub workspace_base: PathBuf,
    #[serde(flatten)]
    pub metadata: CompileMetadata,
    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

impl DeploymentConfig {
    /// Export to JSON format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for DeploymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Kernel: {}", self.metadata.top_function_name)?;
        writeln!(f, "Project: {}", self.metadata.project_path.display())?;
        writeln!(f, "Bundles: {}", self.metadata.num_bundles)?;
        writeln!(f, "Returns void: {}", self.metadata.returns_void)?;
        writeln!(f, "Board: {} @ {} MHz", self.runtime.board, self.runtime.freq)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(total: u32, integer: u32) -> HardwareType {
        HardwareType::fixed(total, integer).unwrap()
    }

    #[test]
    fn test_fixed_validation() {
        assert_eq!(fixed(32, 16).fractional_bits(), 16);
        assert!(HardwareType::fixed(0, 0).is_none());
        assert!(HardwareType::fixed(8, 9).is_none());
        assert!(HardwareType::fixed(8, 8).is_some());
    }

    #[test]
    fn test_fixed_join_adds_guard_bits() {
        assert_eq!(fixed(32, 16).join(fixed(16, 8)), fixed(34, 16));
        assert_eq!(fixed(16, 12).join(fixed(24, 4)), fixed(26, 12));
    }

    #[test]
    fn test_scalar_promotes_to_fixed() {
        let int8 = HardwareType::scalar(ScalarKind::Int8);
        assert_eq!(int8.join(fixed(16, 4)), fixed(18, 8));
        assert_eq!(fixed(16, 4).join(int8), fixed(18, 8));
    }

    #[test]
    fn test_scalar_join() {
        let t = HardwareType::scalar;
        assert_eq!(t(ScalarKind::Int32).join(t(ScalarKind::Float32)), t(ScalarKind::Float32));
        assert_eq!(t(ScalarKind::Float32).join(t(ScalarKind::Float64)), t(ScalarKind::Float64));
        assert_eq!(t(ScalarKind::UInt8).join(t(ScalarKind::Int16)), t(ScalarKind::Int16));
        assert_eq!(t(ScalarKind::UInt32).join(t(ScalarKind::Int8)), t(ScalarKind::Int32));
        assert_eq!(t(ScalarKind::UInt16).join(t(ScalarKind::UInt64)), t(ScalarKind::UInt64));
    }

    #[test]
    fn test_c_types() {
        assert_eq!(fixed(32, 16).c_type(), "ap_fixed<32, 16>");
        assert_eq!(HardwareType::scalar(ScalarKind::UInt16).c_type(), "unsigned short");
        assert_eq!(ScalarKind::from_dtype("double"), Some(ScalarKind::Float64));
        assert_eq!(ScalarKind::from_dtype("complex64"), None);
    }

    #[test]
    fn test_pragma_rendering() {
        assert_eq!(Pragma::Pipeline { ii: 1 }.render(), "#pragma HLS pipeline II=1");
        assert_eq!(Pragma::Unroll { factor: None }.render(), "#pragma HLS unroll");
    }
}
