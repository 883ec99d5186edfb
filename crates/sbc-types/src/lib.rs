#![warn(clippy::pedantic)]

pub mod category;
pub mod enums;
pub mod error;
pub mod options;
pub mod plan;
pub mod reflect;
pub mod resolver;
pub mod type_ref;

mod impls;

pub use sbc_wire;

pub use category::ValueCategory;
pub use error::TypeError;
pub use options::CodecOptions;
pub use plan::{LazyPlan, MemberPlan, MemberTable, PlanShape, Slot, TypePlan};
pub use reflect::{BoxedValue, Dynamic, Reflect, TypeHandle, TypeInfo, TypeKind};
pub use resolver::PlanResolver;
pub use type_ref::TypeRef;
