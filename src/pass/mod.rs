use crate::error::PassError;
use crate::ir::{emit_graph_text, verify, Method};

pub use crate::quant::{InsertObserversPass, InsertQuantDequantPass};

/// A graph-rewriting pass that operates on a `Method` in place.
///
/// Passes must be deterministic: given the same method, the transformed
/// graph must be identical across runs (no global mutable state, no
/// randomness).
pub trait Pass {
    /// Human-readable name, used in error messages and dump selection.
    fn name(&self) -> &'static str;

    /// Run the pass on the method.
    ///
    /// On error the method's graph may be partially rewritten; the pipeline
    /// aborts.
    fn run(&mut self, method: &mut Method) -> Result<(), PassError>;
}

/// Manages and executes an ordered sequence of passes.
///
/// Passes run in the order they were registered. The pipeline aborts at the
/// first error.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    /// If set, logs the graph text after the pass with this name completes.
    dump_after: Option<String>,
    /// If set, runs `ir::verify` after every pass.
    verify: bool,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            dump_after: None,
            verify: false,
        }
    }

    /// Appends a pass to the end of the pipeline.
    pub fn add_pass(&mut self, pass: impl Pass + 'static) {
        self.passes.push(Box::new(pass));
    }

    /// Logs the graph at `info` level after the named pass completes.
    pub fn set_dump_after(&mut self, pass_name: impl Into<String>) {
        self.dump_after = Some(pass_name.into());
    }

    /// Verifies def-use integrity after every pass; a failure is reported
    /// against the pass that just ran.
    pub fn set_verify(&mut self, verify: bool) {
        self.verify = verify;
    }

    /// Runs all passes in registration order on `method`.
    ///
    /// Returns `Err((pass_name, error))` at the first failure.
    pub fn run(&mut self, method: &mut Method) -> Result<(), (String, PassError)> {
        for pass in &mut self.passes {
            log::debug!("running pass {} on {}", pass.name(), method.name);
            pass.run(method).map_err(|e| (pass.name().to_owned(), e))?;
            if self.verify {
                verify(method.graph())
                    .map_err(|e| (pass.name().to_owned(), PassError::Ir(e)))?;
            }
            if let Some(ref target) = self.dump_after {
                if pass.name() == target.as_str() {
                    log::info!(
                        "--- graph of {} after {} ---\n{}",
                        method.name,
                        pass.name(),
                        emit_graph_text(method.graph())
                    );
                }
            }
        }
        Ok(())
    }

    /// Returns the names of all registered passes in pipeline order.
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Graph, IrType, NodeKind};

    struct ReverseRootBlock;

    impl Pass for ReverseRootBlock {
        fn name(&self) -> &'static str {
            "reverse-root-block"
        }

        fn run(&mut self, method: &mut Method) -> Result<(), PassError> {
            // Reverse the root block so the use precedes its definition.
            let g = method.graph_mut();
            let nodes = g.top_level_nodes().to_vec();
            g.blocks[0].nodes = nodes.into_iter().rev().collect();
            Ok(())
        }
    }

    #[test]
    fn verify_failure_names_the_pass() {
        let mut g = Graph::new();
        let x = g.add_input(Some("x"), IrType::tensor());
        let root = g.root();
        let a = g
            .append(root, NodeKind::Relu, &[x], vec![IrType::tensor()])
            .unwrap();
        let y = g.node(a).unwrap().outputs()[0];
        g.append(root, NodeKind::Relu, &[y], vec![IrType::tensor()])
            .unwrap();
        let mut method = Method::new("forward", g);

        let mut pm = PassManager::new();
        pm.add_pass(ReverseRootBlock);
        assert!(pm.run(&mut method.clone()).is_ok());

        pm.set_verify(true);
        let (name, err) = pm.run(&mut method).unwrap_err();
        assert_eq!(name, "reverse-root-block");
        assert!(matches!(err, PassError::Ir(_)));
    }
}
