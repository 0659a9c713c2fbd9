extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod crate_path;
pub(crate) mod entity_derive;

/// Derive macro for a persisted entity: implements `Record` and `Entity`.
///
/// # Struct-level attribute
///
/// | Parameter | Required | Description |
/// |-----------|----------|-------------|
/// | `table`   | **yes**  | Table, collection or index name |
///
/// # Field attributes
///
/// | Attribute | Description |
/// |-----------|-------------|
/// | `#[entity(name = "...")]` | Storage name (defaults to the field name) |
/// | `#[entity(pk)]` | Primary key (at most one) |
/// | `#[entity(auto)]` | Generated by the database; skipped on insert and update |
/// | `#[entity(generated = "uuid")]` | Filled with a UUID v4 on create when empty |
/// | `#[entity(generated = "object_id")]` | Filled with a 24-hex object id on create when empty |
/// | `#[entity(flatten)]` | Inline the columns of a field that derives `Record` |
/// | `#[entity(skip)]` | Not persisted; left at its current value when loading |
///
/// Every mapped field type must implement `FromValue` and `ToValue`.
/// The struct must also implement `Default`, which loaders use to build
/// fresh instances.
///
/// # Example
///
/// ```ignore
/// #[derive(Entity, Default, Debug)]
/// #[entity(table = "person")]
/// pub struct Person {
///     #[entity(pk, auto)]
///     pub id: i64,
///     pub name: String,
///     #[entity(name = "years")]
///     pub age: i32,
/// }
/// ```
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity_derive::expand_entity(input)
}

/// Derive macro for an embeddable record: implements `Record` only.
///
/// Accepts the same field attributes as [`Entity`](derive@Entity). Use it for
/// structs that are flattened into an entity with `#[entity(flatten)]`.
#[proc_macro_derive(Record, attributes(entity))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    entity_derive::expand_record(input)
}
