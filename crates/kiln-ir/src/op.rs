//! Operator tags.

use std::fmt;

/// The computation a [`Node`](crate::Node) performs.
///
/// The tag alone identifies the kind of computation; operands and static
/// parameters live on the node as inputs and attributes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    /// Materializes the `value` attribute.
    Constant,
    /// Element-wise addition.
    Add,
    /// Element-wise subtraction.
    Sub,
    /// Element-wise multiplication.
    Mul,
    /// Element-wise division.
    Div,
    /// Element-wise negation.
    Neg,
    /// Rectified Linear Unit activation.
    Relu,
    /// Sigmoid activation.
    Sigmoid,
    /// Matrix multiplication.
    MatMul,
    /// Transpose/permute dimensions.
    Transpose,
    /// Reshape into a fresh tensor.
    Reshape,
    /// Concatenation along the `axis` attribute.
    Concat,
    /// A view sharing storage with its first input.
    View,
    /// `input0 += input1`, in place.
    AddInPlace,
    /// `input0 <- input1`, in place.
    CopyInPlace,
    /// Writes its inputs to an output stream.
    Print,
    /// Samples from a normal distribution.
    RandNormal,
    /// Two-armed conditional. Input 0 is the condition; owns two blocks.
    If,
    /// Counted loop. Input 0 is the trip count, the rest are loop-carried.
    Loop,
    /// Entry of a named module region; owns the module body.
    ModuleCall,
    /// Operator with unknown semantics.
    Custom { op_type: String },
}

impl Op {
    /// Returns the operator name used in dumps.
    pub fn name(&self) -> &str {
        match self {
            Self::Constant => "constant",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Neg => "neg",
            Self::Relu => "relu",
            Self::Sigmoid => "sigmoid",
            Self::MatMul => "matmul",
            Self::Transpose => "transpose",
            Self::Reshape => "reshape",
            Self::Concat => "concat",
            Self::View => "view",
            Self::AddInPlace => "add_",
            Self::CopyInPlace => "copy_",
            Self::Print => "print",
            Self::RandNormal => "randn",
            Self::If => "if",
            Self::Loop => "loop",
            Self::ModuleCall => "module_call",
            Self::Custom { op_type } => op_type,
        }
    }

    /// Returns `true` for control-flow operators that own nested blocks.
    pub fn is_control_flow(&self) -> bool {
        matches!(self, Self::If | Self::Loop)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
