//! Argument type extraction
//!
//! The caller describes each runtime array by its element type and shape.
//! Record element types whose field names encode `total<N>bits` and
//! `dec<N>bits` describe fixed-point data; every other element type is a
//! numpy dtype name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::hardware::{HardwareType, ScalarKind};

static TOTAL_BITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"total([0-9]+)bits").expect("valid total-bits pattern"));
static DEC_BITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"dec([0-9]+)bits").expect("valid dec-bits pattern"));

/// Element type of a runtime array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementType {
    /// A named dtype such as `float32`
    Named { dtype: String },
    /// A record dtype, known only by its field names
    Record { fields: Vec<String> },
}

/// Runtime description of one argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgSpec {
    #[serde(flatten)]
    pub element: ElementType,
    /// Empty for 0-d values
    #[serde(default)]
    pub shape: Vec<usize>,
}

impl ArgSpec {
    pub fn named(dtype: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            element: ElementType::Named {
                dtype: dtype.into(),
            },
            shape: shape.to_vec(),
        }
    }

    pub fn record<S: Into<String>>(fields: impl IntoIterator<Item = S>, shape: &[usize]) -> Self {
        Self {
            element: ElementType::Record {
                fields: fields.into_iter().map(Into::into).collect(),
            },
            shape: shape.to_vec(),
        }
    }
}

/// Compact form: `float32[4]`, `int16[2x3]`, `{total32bits,dec16bits}[8]`,
/// `float64`
impl FromStr for ArgSpec {
    type Err = CompileError;

    fn from_str(text: &str) -> CompileResult<Self> {
        let text = text.trim();
        let bad = || CompileError::argument(format!("malformed argument spec `{}`", text));

        let (element, rest) = if let Some(inner) = text.strip_prefix('{') {
            let close = inner.find('}').ok_or_else(bad)?;
            let fields = inner[..close]
                .split(',')
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .collect();
            (ElementType::Record { fields }, &inner[close + 1..])
        } else {
            let end = text.find('[').unwrap_or(text.len());
            let dtype = text[..end].trim();
            if dtype.is_empty() {
                return Err(bad());
            }
            (
                ElementType::Named {
                    dtype: dtype.to_string(),
                },
                &text[end..],
            )
        };

        let rest = rest.trim();
        let shape = if rest.is_empty() {
            Vec::new()
        } else {
            let dims = rest
                .strip_prefix('[')
                .and_then(|r| r.strip_suffix(']'))
                .ok_or_else(bad)?;
            dims.split(|c| c == 'x' || c == ',')
                .map(|d| d.trim().parse::<usize>().map_err(|_| bad()))
                .collect::<CompileResult<Vec<_>>>()?
        };

        Ok(ArgSpec { element, shape })
    }
}

impl fmt::Display for ArgSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element {
            ElementType::Named { dtype } => write!(f, "{}", dtype)?,
            ElementType::Record { fields } => write!(f, "{{{}}}", fields.join(","))?,
        }
        if !self.shape.is_empty() {
            let dims: Vec<String> = self.shape.iter().map(|d| d.to_string()).collect();
            write!(f, "[{}]", dims.join("x"))?;
        }
        Ok(())
    }
}

/// Hardware view of one kernel argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgDescriptor {
    pub name: String,
    pub hardware_type: HardwareType,
    pub shape: Vec<usize>,
}

impl ArgDescriptor {
    pub fn is_array(&self) -> bool {
        !self.shape.is_empty()
    }
}

/// Descriptors keyed by parameter name
pub type ArgumentMap = BTreeMap<String, ArgDescriptor>;

/// Resolve the hardware format of an element type
pub fn element_hardware_type(element: &ElementType) -> CompileResult<HardwareType> {
    match element {
        ElementType::Named { dtype } => ScalarKind::from_dtype(dtype)
            .map(HardwareType::scalar)
            .ok_or_else(|| CompileError::argument(format!("unknown dtype `{}`", dtype))),
        ElementType::Record { fields } => {
            let key = fields.concat();
            let total = capture_bits(&TOTAL_BITS, &key, "total<N>bits")?;
            let dec = capture_bits(&DEC_BITS, &key, "dec<N>bits")?;
            HardwareType::fixed(total, dec).ok_or_else(|| {
                CompileError::argument(format!(
                    "invalid fixed-point format: {} total bits with {} integer bits",
                    total, dec
                ))
            })
        }
    }
}

fn capture_bits(pattern: &Regex, key: &str, expected: &str) -> CompileResult<u32> {
    let captures = pattern.captures(key).ok_or_else(|| {
        CompileError::argument(format!(
            "record fields `{}` do not name a `{}` width",
            key, expected
        ))
    })?;
    captures[1]
        .parse()
        .map_err(|_| CompileError::argument(format!("bit width in `{}` is out of range", key)))
}

/// Pair parameter names with runtime argument descriptions
pub fn extract_arguments(param_names: &[String], args: &[ArgSpec]) -> CompileResult<ArgumentMap> {
    if param_names.len() != args.len() {
        return Err(CompileError::argument(format!(
            "kernel takes {} argument(s) but {} were described",
            param_names.len(),
            args.len()
        )));
    }

    let mut map = ArgumentMap::new();
    for (name, spec) in param_names.iter().zip(args) {
        let descriptor = ArgDescriptor {
            name: name.clone(),
            hardware_type: element_hardware_type(&spec.element)?,
            shape: spec.shape.clone(),
        };
        if map.insert(name.clone(), descriptor).is_some() {
            return Err(CompileError::argument(format!(
                "duplicate parameter `{}`",
                name
            )));
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fixed_point_fields() {
        let spec = ArgSpec::record(["total32bits", "dec16bits"], &[8]);
        let map = extract_arguments(&names(&["x"]), &[spec]).unwrap();
        assert_eq!(
            map["x"].hardware_type,
            HardwareType::fixed(32, 16).unwrap()
        );
        assert_eq!(map["x"].shape, vec![8]);
    }

    #[test]
    fn test_missing_pattern() {
        let spec = ArgSpec::record(["total32bits", "frac"], &[8]);
        let err = extract_arguments(&names(&["x"]), &[spec]).unwrap_err();
        assert!(matches!(err, CompileError::ArgumentTypeError { .. }));
    }

    #[test]
    fn test_invalid_widths() {
        let zero = ArgSpec::record(["total0bits", "dec0bits"], &[2]);
        assert!(extract_arguments(&names(&["x"]), &[zero]).is_err());
        let wide = ArgSpec::record(["total8bits", "dec9bits"], &[2]);
        assert!(extract_arguments(&names(&["x"]), &[wide]).is_err());
    }

    #[test]
    fn test_arity_mismatch() {
        let err = extract_arguments(&names(&["a", "b"]), &[ArgSpec::named("float32", &[4])])
            .unwrap_err();
        assert!(err.to_string().contains("2 argument(s)"));
    }

    #[test]
    fn test_named_dtypes() {
        let map = extract_arguments(
            &names(&["a", "n"]),
            &[ArgSpec::named("float", &[4]), ArgSpec::named("int32", &[])],
        )
        .unwrap();
        assert_eq!(map["a"].hardware_type, HardwareType::scalar(ScalarKind::Float64));
        assert!(map["a"].is_array());
        assert!(!map["n"].is_array());

        let err = extract_arguments(&names(&["z"]), &[ArgSpec::named("complex128", &[])]);
        assert!(err.is_err());
    }

    #[test]
    fn test_compact_form() {
        let spec: ArgSpec = "int16[2x3]".parse().unwrap();
        assert_eq!(spec, ArgSpec::named("int16", &[2, 3]));

        let spec: ArgSpec = "{total32bits,dec16bits}[8]".parse().unwrap();
        assert_eq!(spec, ArgSpec::record(["total32bits", "dec16bits"], &[8]));
        assert_eq!(spec.to_string(), "{total32bits,dec16bits}[8]");

        let spec: ArgSpec = "float64".parse().unwrap();
        assert!(spec.shape.is_empty());

        assert!("float32[four]".parse::<ArgSpec>().is_err());
        assert!("[4]".parse::<ArgSpec>().is_err());
    }

    #[test]
    fn test_json_form() {
        let specs: Vec<ArgSpec> = serde_json::from_str(
            r#"[{"dtype": "float32", "shape": [4]}, {"fields": ["total16bits", "dec4bits"]}]"#,
        )
        .unwrap();
        assert_eq!(specs[0], ArgSpec::named("float32", &[4]));
        assert_eq!(specs[1], ArgSpec::record(["total16bits", "dec4bits"], &[]));
    }
}
