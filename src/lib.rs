//! Filter subsystem of the chess academy CRM: filter trees, the field registry,
//! the builder state machine, the Prisma-style compiler and the list-view
//! session around them.

pub mod builder;
pub mod compiler;
pub mod config;
pub mod debounce;
pub mod lexer;
pub mod model;
pub mod parser;
pub mod registry;
pub mod request;
pub mod saved;
pub mod session;
pub mod sql;
pub mod token;

pub use builder::{BuilderError, ConditionPath, FilterBuilder, GroupPath, InputShape, InputWidget};
pub use compiler::{CompileError, Compiled, DropReason, DroppedCondition, FilterCompiler, QueryFilter, ValidationError};
pub use model::{ConditionValue, FieldType, FilterCondition, FilterGroup, Logic, Operator, Scalar};
pub use registry::{Entity, FieldRegistry, FilterField};
pub use request::{EntityFilter, FindManyArgs, Pagination, Sort, SortDirection};
pub use saved::{SavedFilter, SavedFilterStore};
