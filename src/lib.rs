//! # trellis
//!
//! Behavior-composition registry and declarative markup component engine.
//!
//! Traits defined at dotted paths compose into one another (`behave_like`)
//! with dependency-ordered construction; instances carry private per-trait
//! state. Components project their ordered, event-filtered child
//! collections into a host document tree, flattening composites so the
//! document always mirrors the component tree. Markup packets convert
//! text into live elements, with `{expression}` splicing, template
//! fetching and script blocks running through pluggable collaborators.
//!
//! ## Modules
//!
//! - [`types`] - The shared dynamic `Value` model
//! - [`registry`] - Trait definitions, composition, create/finish
//! - [`children`] - Generic filtered/noticed ordered collection
//! - [`dom`] - Host document tree
//! - [`stage`] - Document + component arena + template cache
//! - [`markup`] - Packet conversion and its collaborator seams

pub mod children;
pub mod component;
pub mod dom;
pub mod error;
pub mod markup;
pub mod registry;
pub mod stage;
pub mod tags;
pub mod types;

mod projector;

// Re-export commonly used items
pub use types::Value;

pub use error::{Error, Result, SyntaxError};

pub use registry::{
    behave_like, create, create_in, define, finish, finish_in, get_definition,
    reset_registry, seal, CreateArgs, DefinitionInfo, EngineCx, Instance, Method,
    PropertySpec, Routine, StateRecord, StoreFactory, TraitId, TraitSpec, TraitState,
};

pub use children::{ChildList, Filter, FilterArgs, HookId, Notice, NoticeArgs};

pub use dom::{Document, Namespace, NodeId};

pub use stage::{ComponentId, Stage};

pub use component::{ChildEntry, ElementSpec};

pub use markup::{
    BasicExpressions, Context, ExpressionLanguage, MapSource, PacketOptions,
    PacketResult, PacketSource, Parsed, ScriptHost,
};
