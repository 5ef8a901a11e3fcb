//! The transform pipeline. Transforms run in a fixed order — namespace,
//! common labels, common annotations, name prefix, name suffix, patches —
//! so patch authors can override anything the earlier steps produced.
//! Transforms never remove resources; per-resource failures accumulate.

mod annotation;
mod label;
mod name;
mod namespace;
mod patch;

pub use self::annotation::AnnotationTransformer;
pub use self::label::LabelTransformer;
pub use self::name::NameTransformer;
pub use self::namespace::NamespaceTransformer;
pub use self::patch::PatchTransformer;

use crate::error::Errors;
use crate::resource::Resource;

pub trait Transformer {
    fn transform(&mut self, resources: &mut [Resource], errors: &mut Errors);
}
