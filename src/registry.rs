//! Named kernel sources
//!
//! A registry owns the source text of every kernel it knows, keyed by
//! function name. Multi-kernel files are split into one source per
//! top-level `def` so each kernel compiles on its own.

use std::collections::BTreeMap;

use tracing::debug;

use crate::args::ArgSpec;
use crate::ast::StmtKind;
use crate::config::CompileOptions;
use crate::error::{CompileError, CompileResult};
use crate::parser::parse_module;
use crate::{compile, CompileOutput};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelRegistry {
    kernels: BTreeMap<String, String>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every top-level function of `source`
    pub fn from_source(source: &str) -> CompileResult<Self> {
        let module = parse_module(source)?;
        let mut registry = Self::new();
        for stmt in &module.body {
            if let StmtKind::FunctionDef(def) = &stmt.kind {
                let mut text = source[def.source_range.clone()].to_string();
                if !text.ends_with('\n') {
                    text.push('\n');
                }
                registry.register(def.name.clone(), text);
            }
        }
        debug!(kernels = registry.len(), "split source into kernels");
        Ok(registry)
    }

    /// Add or replace a kernel; returns the source it replaced
    pub fn register(&mut self, name: impl Into<String>, source: impl Into<String>) -> Option<String> {
        self.kernels.insert(name.into(), source.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.kernels.get(name).map(String::as_str)
    }

    /// Kernel names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.kernels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Compile one registered kernel
    pub fn compile(&self, name: &str, args: &[ArgSpec], options: &CompileOptions) -> CompileResult<CompileOutput> {
        let source = self.get(name).ok_or_else(|| CompileError::UnknownKernel {
            name: name.to_string(),
        })?;
        compile(source, args, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KERNELS: &str = "\
import numpy as np

@pylog
def vadd(a, b, c):
    c = map(lambda x, y: x + y, a, b)

def vdot(a, b):
    return dot(a, b)
";

    #[test]
    fn test_split_source() {
        let registry = KernelRegistry::from_source(KERNELS).unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["vadd", "vdot"]);
        let vadd = registry.get("vadd").unwrap();
        assert!(vadd.starts_with("@pylog\ndef vadd(a, b, c):"));
        assert!(!vadd.contains("vdot"));
    }

    #[test]
    fn test_compile_by_name() {
        let registry = KernelRegistry::from_source(KERNELS).unwrap();
        let args = vec![ArgSpec::named("float32", &[8]), ArgSpec::named("float32", &[8])];
        let options = CompileOptions {
            write_output: false,
            ..CompileOptions::default()
        };
        let output = registry.compile("vdot", &args, &options).unwrap();
        assert_eq!(output.metadata.top_function_name, "vdot");
        assert_eq!(output.metadata.num_bundles, 2);

        let err = registry.compile("vmul", &args, &options).unwrap_err();
        assert!(matches!(err, CompileError::UnknownKernel { .. }));
    }
}
