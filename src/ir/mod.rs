pub mod block;
pub mod graph;
pub mod method;
pub mod node;
pub mod printer;
pub mod types;
pub mod value;
pub mod verify;

pub use block::{Block, BlockId};
pub use graph::{Graph, InsertPoint};
pub use method::{BoundParam, Method};
pub use node::{ConstValue, Node, NodeId, NodeKind, Scope, ATTR_NAME, ATTR_VALUE};
pub use printer::emit_graph_text;
pub use types::{DType, IrType};
pub use value::{Use, User, Value, ValueDef, ValueId};
pub use verify::verify;
