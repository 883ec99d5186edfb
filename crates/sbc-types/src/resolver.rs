use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sbc_wire::IndexWidth;
use tracing::{debug, warn};

use crate::error::TypeError;
use crate::impls::builtin_handles;
use crate::options::CodecOptions;
use crate::plan::TypePlan;
use crate::reflect::{Reflect, TypeHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PlanKey {
  type_id: TypeId,
  width: IndexWidth,
  ignore_annotations: bool,
}

/// Concurrent cache of [`TypePlan`]s plus the wire-name registry.
///
/// Plans are memoized by (type, index width, annotation policy).
/// Concurrent first requests for the same key may each build a
/// candidate, but only the first inserted plan is ever returned, so
/// every caller observes one shared `Arc<TypePlan>`.
///
/// ```text
///   resolve(T) ──► plans.get(key) ──hit──► Arc<TypePlan>
///                        │ miss
///                        ▼
///                  build (no lock held, never recursive)
///                        │
///                        ▼
///                  plans.entry(key) ── occupied ──► existing plan
///                        │ vacant
///                        ▼
///                  insert + register name
/// ```
///
/// The name registry maps runtime type names back to handles. It is
/// filled with the built-in scalars at construction, with every type
/// whose plan is resolved, and with every type reachable from a
/// [`register`](Self::register)ed root.
pub struct PlanResolver {
  plans: DashMap<PlanKey, Arc<TypePlan>>,
  names: DashMap<String, TypeHandle>,
}

impl Default for PlanResolver {
  fn default() -> Self {
    Self::new()
  }
}

impl PlanResolver {
  #[must_use]
  pub fn new() -> Self {
    let resolver = Self {
      plans: DashMap::new(),
      names: DashMap::new(),
    };
    for handle in builtin_handles() {
      resolver.insert_name(handle.describe().name.into_owned(), handle);
    }
    resolver
  }

  /// Plan for `T` under `options`.
  ///
  /// # Errors
  ///
  /// A configuration error if `T`'s member layout does not fit the
  /// configured index width.
  pub fn resolve<T: Reflect>(&self, options: &CodecOptions) -> Result<Arc<TypePlan>, TypeError> {
    self.resolve_handle(
      TypeHandle::of::<T>(),
      options.index_width,
      options.ignore_index_annotations,
    )
  }

  /// Plan for the type behind `handle`.
  ///
  /// # Errors
  ///
  /// See [`resolve`](Self::resolve).
  pub fn resolve_handle(
    &self,
    handle: TypeHandle,
    width: IndexWidth,
    ignore_annotations: bool,
  ) -> Result<Arc<TypePlan>, TypeError> {
    let key = PlanKey {
      type_id: handle.type_id(),
      width,
      ignore_annotations,
    };
    if let Some(plan) = self.plans.get(&key) {
      return Ok(Arc::clone(plan.value()));
    }

    let built = Arc::new(TypePlan::build(handle.describe(), width, ignore_annotations)?);

    match self.plans.entry(key) {
      Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
      Entry::Vacant(slot) => {
        debug!(
          type_name = built.name(),
          category = %built.category(),
          ?width,
          "built type plan"
        );
        self.insert_name(built.name().to_owned(), handle);
        Ok(Arc::clone(slot.insert(built).value()))
      }
    }
  }

  /// Plan for a runtime type name, if the name is registered.
  ///
  /// # Errors
  ///
  /// See [`resolve`](Self::resolve).
  pub fn resolve_name(
    &self,
    name: &str,
    width: IndexWidth,
    ignore_annotations: bool,
  ) -> Option<Result<Arc<TypePlan>, TypeError>> {
    self
      .lookup(name)
      .map(|handle| self.resolve_handle(handle, width, ignore_annotations))
  }

  /// Register the wire names of `T` and every type reachable from it.
  ///
  /// Needed before decoding runtime type names of types this process
  /// has not resolved yet, such as concrete implementations behind a
  /// polymorphic base, or members a reader must drain.
  pub fn register<T: Reflect>(&self) {
    self.register_handle(TypeHandle::of::<T>());
  }

  pub fn register_handle(&self, root: TypeHandle) {
    let mut seen = HashSet::new();
    let mut pending = vec![root];
    while let Some(handle) = pending.pop() {
      if !seen.insert(handle.type_id()) {
        continue;
      }
      let info = handle.describe();
      pending.extend(info.nested_handles());
      self.insert_name(info.name.into_owned(), handle);
    }
  }

  #[must_use]
  pub fn lookup(&self, name: &str) -> Option<TypeHandle> {
    self.names.get(name).map(|entry| *entry.value())
  }

  /// Number of cached plans.
  #[must_use]
  pub fn len(&self) -> usize {
    self.plans.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.plans.is_empty()
  }

  fn insert_name(&self, name: String, handle: TypeHandle) {
    match self.names.entry(name) {
      Entry::Occupied(existing) => {
        if *existing.get() != handle {
          warn!(
            type_name = existing.key().as_str(),
            "wire name already registered to another type; keeping the first"
          );
        }
      }
      Entry::Vacant(slot) => {
        slot.insert(handle);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reflect::TypeInfo;

  #[derive(Default)]
  struct Node {
    label: String,
    children: Vec<Node>,
  }

  impl Reflect for Node {
    fn describe() -> TypeInfo {
      TypeInfo::composite::<Self>("test.Node")
        .member("Label", |n| &n.label, |n, v| n.label = v)
        .member("Children", |n| &n.children, |n, v| n.children = v)
        .build()
    }
  }

  #[test]
  fn self_referential_type_resolves() {
    let resolver = PlanResolver::new();
    let plan = resolver.resolve::<Node>(&CodecOptions::default()).unwrap();
    let children = plan.members().unwrap().by_name("Children").unwrap();
    let seq = children.plan.get(&resolver).unwrap();
    let crate::plan::PlanShape::Sequence { element, .. } = seq.shape() else {
      panic!("expected sequence");
    };
    assert!(Arc::ptr_eq(element.get(&resolver).unwrap(), &plan));
  }

  #[test]
  fn plans_are_shared() {
    let resolver = PlanResolver::new();
    let options = CodecOptions::default();
    let first = resolver.resolve::<Node>(&options).unwrap();
    let second = resolver.resolve::<Node>(&options).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(resolver.len(), 1);
  }

  #[test]
  fn width_is_part_of_the_key() {
    let resolver = PlanResolver::new();
    let one = resolver.resolve::<Node>(&CodecOptions::default()).unwrap();
    let two = resolver
      .resolve::<Node>(&CodecOptions::default().with_index_width(IndexWidth::Two))
      .unwrap();
    assert!(!Arc::ptr_eq(&one, &two));
  }

  #[test]
  fn register_walks_nested_types() {
    let resolver = PlanResolver::new();
    assert!(resolver.lookup("test.Node").is_none());
    resolver.register::<Node>();
    assert_eq!(resolver.lookup("test.Node"), Some(TypeHandle::of::<Node>()));
    assert_eq!(
      resolver.lookup("Vec<test.Node>"),
      Some(TypeHandle::of::<Vec<Node>>())
    );
  }

  #[test]
  fn builtin_scalars_preregistered() {
    let resolver = PlanResolver::new();
    assert_eq!(resolver.lookup("i32"), Some(TypeHandle::of::<i32>()));
    assert_eq!(resolver.lookup("string"), Some(TypeHandle::of::<String>()));
    assert!(resolver.is_empty());
  }
}
