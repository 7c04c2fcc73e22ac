//! Recognition of array operators and library intrinsics
//!
//! Both tables are pure functions of a call's (dotted) name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// High-level array operators understood natively by the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    /// `map(f, a, b, ...)` or `a.map(f, b, ...)`
    Map,
    /// `dot(a, b)` or `a.dot(b)`
    Dot,
    /// `reduce(f, a[, init])` or `a.reduce(f[, init])`
    Reduce,
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorKind::Map => write!(f, "map"),
            OperatorKind::Dot => write!(f, "dot"),
            OperatorKind::Reduce => write!(f, "reduce"),
        }
    }
}

pub fn classify_operator(name: &str) -> Option<OperatorKind> {
    match name {
        "map" => Some(OperatorKind::Map),
        "dot" => Some(OperatorKind::Dot),
        "reduce" => Some(OperatorKind::Reduce),
        _ => None,
    }
}

/// Binary elementwise numpy functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementwiseOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
}

/// Scalar math functions with an HLS math library equivalent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathFn {
    Abs,
    Min,
    Max,
    Sqrt,
    Exp,
    Log,
    Sin,
    Cos,
    Tanh,
}

impl MathFn {
    pub fn arity(self) -> usize {
        match self {
            MathFn::Min | MathFn::Max => 2,
            _ => 1,
        }
    }

    /// Transcendental functions produce a float from integer input
    pub fn is_transcendental(self) -> bool {
        !matches!(self, MathFn::Abs | MathFn::Min | MathFn::Max)
    }

    /// `hls_math.h` function name; `None` for min/max, which are rendered
    /// as conditionals
    pub fn hls_name(self) -> Option<&'static str> {
        match self {
            MathFn::Abs => Some("hls::abs"),
            MathFn::Sqrt => Some("hls::sqrt"),
            MathFn::Exp => Some("hls::exp"),
            MathFn::Log => Some("hls::log"),
            MathFn::Sin => Some("hls::sin"),
            MathFn::Cos => Some("hls::cos"),
            MathFn::Tanh => Some("hls::tanh"),
            MathFn::Min | MathFn::Max => None,
        }
    }
}

/// Library calls the compiler knows how to type and render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    Elementwise(ElementwiseOp),
    /// `np.dot` on equally shaped arrays
    Dot,
    /// `np.sum` / builtin `sum`
    Sum,
    Math(MathFn),
}

impl Intrinsic {
    pub fn arity(self) -> usize {
        match self {
            Intrinsic::Elementwise(_) | Intrinsic::Dot => 2,
            Intrinsic::Sum => 1,
            Intrinsic::Math(f) => f.arity(),
        }
    }
}

pub fn classify_intrinsic(name: &str) -> Option<Intrinsic> {
    let (module, function) = match name.rsplit_once('.') {
        Some((module, function)) => (Some(module), function),
        None => (None, name),
    };
    let numpy = matches!(module, Some("np") | Some("numpy"));
    let math = matches!(module, None | Some("math") | Some("np") | Some("numpy"));

    let intrinsic = match function {
        "add" if numpy => Intrinsic::Elementwise(ElementwiseOp::Add),
        "subtract" if numpy => Intrinsic::Elementwise(ElementwiseOp::Subtract),
        "multiply" if numpy => Intrinsic::Elementwise(ElementwiseOp::Multiply),
        "divide" | "true_divide" if numpy => Intrinsic::Elementwise(ElementwiseOp::Divide),
        "maximum" if numpy => Intrinsic::Elementwise(ElementwiseOp::Maximum),
        "minimum" if numpy => Intrinsic::Elementwise(ElementwiseOp::Minimum),
        "dot" if numpy => Intrinsic::Dot,
        "sum" if numpy || module.is_none() => Intrinsic::Sum,
        "abs" | "fabs" | "absolute" if math => Intrinsic::Math(MathFn::Abs),
        "min" if module.is_none() => Intrinsic::Math(MathFn::Min),
        "max" if module.is_none() => Intrinsic::Math(MathFn::Max),
        "sqrt" if math => Intrinsic::Math(MathFn::Sqrt),
        "exp" if math => Intrinsic::Math(MathFn::Exp),
        "log" if math => Intrinsic::Math(MathFn::Log),
        "sin" if math => Intrinsic::Math(MathFn::Sin),
        "cos" if math => Intrinsic::Math(MathFn::Cos),
        "tanh" if math => Intrinsic::Math(MathFn::Tanh),
        _ => return None,
    };
    Some(intrinsic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_operator() {
        assert_eq!(classify_operator("map"), Some(OperatorKind::Map));
        assert_eq!(classify_operator("dot"), Some(OperatorKind::Dot));
        assert_eq!(classify_operator("reduce"), Some(OperatorKind::Reduce));
        assert_eq!(classify_operator("np.dot"), None);
        assert_eq!(classify_operator("filter"), None);
    }

    #[test]
    fn test_classify_intrinsic() {
        assert_eq!(
            classify_intrinsic("np.multiply"),
            Some(Intrinsic::Elementwise(ElementwiseOp::Multiply))
        );
        assert_eq!(classify_intrinsic("numpy.dot"), Some(Intrinsic::Dot));
        assert_eq!(classify_intrinsic("sum"), Some(Intrinsic::Sum));
        assert_eq!(classify_intrinsic("math.sqrt"), Some(Intrinsic::Math(MathFn::Sqrt)));
        assert_eq!(classify_intrinsic("max"), Some(Intrinsic::Math(MathFn::Max)));
        assert_eq!(classify_intrinsic("math.sum"), None);
        assert_eq!(classify_intrinsic("multiply"), None);
        assert_eq!(classify_intrinsic("helper"), None);
    }
}
