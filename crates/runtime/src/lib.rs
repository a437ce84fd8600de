pub mod bindery;
pub mod collation;
pub mod consts;
pub mod context;
pub mod error;
pub mod event;
pub mod executable;
pub mod instruct;
pub mod location;
pub mod model;
pub mod param;
pub mod tree;
pub mod xdm;

pub use bindery::Bindery;
pub use collation::{Collation, CollationRegistry};
pub use context::{
    Context, Controller, ControllerBuilder, ConstructionMode, Focus, GroupFocus, HostLanguage,
    MessageEmitter, OutputResolver, SchemaValidator, TemplateRules, TraceListener,
    ValidationFailure, ValidationMode,
};
pub use error::{Error, ErrorCode};
pub use event::{ComplexContentOutputter, Receiver, ReceiverProps, SequenceCollector, SharedSink};
pub use executable::{Executable, ExecutableBuilder, GlobalVariableDef};
pub use instruct::{Expression, TailCall, Template, drive};
pub use location::{LocationId, LocationMap, SourceLocation};
pub use model::{NodeKind, QName, XdmNode};
pub use param::{ParamId, ParameterSet};
pub use tree::{StdTreeModel, TreeModel, TreeNode, TreeNodeBuilder};
pub use xdm::{AtomicValue, Item, Sequence, SequenceIter};
