use serde::Serialize;
use tracing::debug;

use super::{Bound, Network};
use crate::types::{CegarError, Result};

/// Next layer each abstraction stage will process, `None` once the stage
/// has reached its last layer.
///
/// All three cursors start at the output layer and only move towards the
/// input. A layer is forward activated only after it is preprocessed, and
/// fully activated only after the layer feeding it is forward activated.
/// The input layer is never fully activated.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Frontier {
    /// Next layer to preprocess.
    pub preprocess: Option<usize>,
    /// Next layer to forward activate.
    pub forward: Option<usize>,
    /// Next layer to fully activate.
    pub full: Option<usize>,
}

impl Frontier {
    pub(crate) fn start(layers: usize) -> Self {
        let last = layers.checked_sub(1);
        Self {
            preprocess: last,
            forward: last,
            full: last.filter(|&l| l >= 1),
        }
    }

    /// Whether `layer` has been preprocessed.
    pub fn is_preprocessed(&self, layer: usize) -> bool {
        self.preprocess.map_or(true, |next| next < layer)
    }

    /// Whether `layer` has been forward activated.
    pub fn is_forward_activated(&self, layer: usize) -> bool {
        self.forward.map_or(true, |next| next < layer)
    }

    /// Whether `layer` has been fully activated.
    pub fn is_fully_activated(&self, layer: usize) -> bool {
        layer >= 1 && self.full.map_or(true, |next| next < layer)
    }

    /// Whether every stage has run over every layer.
    pub fn is_complete(&self) -> bool {
        self.preprocess.is_none() && self.forward.is_none() && self.full.is_none()
    }

    fn can_forward(&self) -> bool {
        self.forward.is_some_and(|next| self.is_preprocessed(next))
    }

    fn can_fully_activate(&self) -> bool {
        self.full
            .is_some_and(|next| next >= 1 && self.is_forward_activated(next - 1))
    }
}

impl Network {
    /// Preprocesses the layer under the preprocessing cursor. Boundary
    /// layers receive their bounds here: input bounds on the input arnodes
    /// and the property bound on the constrained output arnode.
    ///
    /// Returns the layer processed, `None` when the cursor is exhausted.
    pub fn preprocess_next_layer(&mut self) -> Result<Option<usize>> {
        let Some(index) = self.frontier.preprocess else {
            return Ok(None);
        };
        let created = self.with_layer(index, |layer, ctx| layer.preprocess(ctx))?;
        let last = self.layers.len() - 1;
        if index == 0 || index == last {
            for id in created {
                let arnode = self.store.arnode(id)?;
                let var = arnode.vars().incoming;
                let Some(&member) = arnode.constituents().first() else {
                    continue;
                };
                let neuron = self.store.node(member)?.origin().index;
                if index == 0 {
                    let (lower, upper) = self.input_bounds.get(neuron).copied().ok_or_else(|| {
                        CegarError::InvalidArgument(format!("no bounds for input {neuron}"))
                    })?;
                    self.ids.set_lower_bound(var, lower);
                    self.ids.set_upper_bound(var, upper);
                } else if neuron == self.property.output() {
                    let ids = &mut self.ids;
                    self.property.apply(var, |var, bound| match bound {
                        Bound::Lower(value) => ids.set_lower_bound(var, value),
                        Bound::Upper(value) => ids.set_upper_bound(var, value),
                    });
                }
            }
        }
        self.frontier.preprocess = index.checked_sub(1);
        self.trace_frontier("preprocess", index);
        Ok(Some(index))
    }

    /// Forward activates the layer under the forward cursor.
    pub fn forward_activate_next_layer(&mut self) -> Result<Option<usize>> {
        let Some(index) = self.frontier.forward else {
            return Ok(None);
        };
        if !self.frontier.is_preprocessed(index) {
            return Err(CegarError::FrontierViolation(
                "forward activation needs the layer preprocessed",
            ));
        }
        self.with_layer(index, |layer, ctx| layer.forward_activate_all(ctx))?;
        self.frontier.forward = index.checked_sub(1);
        self.trace_frontier("forward", index);
        Ok(Some(index))
    }

    /// Fully activates the layer under the full-activation cursor.
    pub fn fully_activate_next_layer(&mut self) -> Result<Option<usize>> {
        let Some(index) = self.frontier.full else {
            return Ok(None);
        };
        if !self.frontier.can_fully_activate() {
            return Err(CegarError::FrontierViolation(
                "full activation needs the feeding layer forward activated",
            ));
        }
        let check = self.check_validity;
        self.with_layer(index, |layer, ctx| layer.fully_activate_all(ctx, check))?;
        self.frontier.full = Some(index - 1).filter(|&next| next >= 1);
        self.trace_frontier("full", index);
        Ok(Some(index))
    }

    /// Takes the most advanced step the frontier allows: full activation,
    /// then forward activation, then preprocessing. Returns false once the
    /// abstraction is complete.
    pub fn advance_frontier(&mut self) -> Result<bool> {
        if self.frontier.can_fully_activate() {
            self.fully_activate_next_layer()?;
        } else if self.frontier.can_forward() {
            self.forward_activate_next_layer()?;
        } else if self.frontier.preprocess.is_some() {
            self.preprocess_next_layer()?;
        } else if !self.frontier.is_complete() {
            return Err(CegarError::FrontierViolation("frontier cannot advance"));
        } else {
            return Ok(false);
        }
        Ok(true)
    }

    /// Advances the frontier until every layer is abstracted.
    pub fn abstract_network(&mut self) -> Result<()> {
        while self.advance_frontier()? {}
        debug!(
            arnodes = self.store.arnodes().len(),
            variables = self.ids.max_used().map_or(0, |max| max + 1),
            "network.abstracted"
        );
        Ok(())
    }

    fn trace_frontier(&self, stage: &'static str, layer: usize) {
        debug!(
            stage,
            layer,
            preprocess = ?self.frontier.preprocess,
            forward = ?self.frontier.forward,
            full = ?self.frontier.full,
            "network.frontier.advance"
        );
    }
}
