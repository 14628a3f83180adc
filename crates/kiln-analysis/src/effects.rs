//! Per-operator effect schemas.
//!
//! Every operator kind answers the same capability query: does it have
//! observable side effects, is it deterministic, which inputs does it write
//! and which outputs share storage with an input.

use kiln_ir::Op;

/// Which inputs an operator writes in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Writes {
    /// Reads only.
    #[default]
    None,
    /// Writes the inputs at these positions.
    Inputs(Vec<usize>),
    /// May write any input.
    All,
}

/// Effect summary of an operator kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EffectSchema {
    /// Observable effects beyond producing outputs (I/O, global state).
    pub side_effects: bool,
    /// Repeated execution on equal inputs may yield different outputs.
    pub nondeterministic: bool,
    /// In-place writes to inputs.
    pub writes: Writes,
    /// `(output, input)` pairs whose storage is shared.
    pub aliases: Vec<(usize, usize)>,
    /// Outputs may alias any mutable input.
    pub aliases_any: bool,
}

impl EffectSchema {
    /// A pure, deterministic operator producing fresh outputs.
    pub fn pure() -> Self {
        Self::default()
    }

    /// The most conservative schema, used for operators with unknown semantics.
    pub fn unknown() -> Self {
        Self {
            side_effects: true,
            nondeterministic: true,
            writes: Writes::All,
            aliases: Vec::new(),
            aliases_any: true,
        }
    }

    /// Returns `true` if the input at `index` may be written.
    pub fn writes_input(&self, index: usize) -> bool {
        match &self.writes {
            Writes::None => false,
            Writes::Inputs(indices) => indices.contains(&index),
            Writes::All => true,
        }
    }
}

/// Capability query implemented by each operator kind.
pub trait OpEffects {
    /// Effect summary of this operator.
    fn effects(&self) -> EffectSchema;
}

impl OpEffects for Op {
    fn effects(&self) -> EffectSchema {
        match self {
            Op::Constant
            | Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Neg
            | Op::Relu
            | Op::Sigmoid
            | Op::MatMul
            | Op::Transpose
            | Op::Reshape
            | Op::Concat => EffectSchema::pure(),
            Op::View => EffectSchema {
                aliases: vec![(0, 0)],
                ..EffectSchema::pure()
            },
            Op::AddInPlace | Op::CopyInPlace => EffectSchema {
                writes: Writes::Inputs(vec![0]),
                aliases: vec![(0, 0)],
                ..EffectSchema::pure()
            },
            Op::Print => EffectSchema {
                side_effects: true,
                ..EffectSchema::pure()
            },
            Op::RandNormal => EffectSchema {
                nondeterministic: true,
                ..EffectSchema::pure()
            },
            // Region operators carry no effects of their own; their bodies
            // are analyzed node by node.
            Op::If | Op::Loop | Op::ModuleCall => EffectSchema::pure(),
            Op::Custom { .. } => EffectSchema::unknown(),
        }
    }
}
