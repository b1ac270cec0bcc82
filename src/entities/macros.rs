//! Macros for reducing boilerplate when exposing entities

/// Generate a typed facade for an entity
///
/// The facade is a unit struct whose associated functions start an action
/// on the entity, so callers write `Contact::get(&api)` instead of
/// `api.get("Contact")`.
///
/// # Example
/// ```rust,ignore
/// api_entity!(
///     /// Membership records
///     Membership,
///     "Membership"
/// );
///
/// let result = Membership::get(&api)
///     .add_select("status")
///     .execute()
///     .await?;
/// ```
#[macro_export]
macro_rules! api_entity {
    ($(#[$meta:meta])* $name:ident, $entity:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $name {
            /// Entity type name
            pub const ENTITY: &'static str = $entity;

            /// Start a create action
            pub fn create(api: &$crate::api::Api) -> $crate::api::ActionBuilder {
                api.create(Self::ENTITY)
            }

            /// Start a get action
            pub fn get(api: &$crate::api::Api) -> $crate::api::ActionBuilder {
                api.get(Self::ENTITY)
            }

            /// Start an update action
            pub fn update(api: &$crate::api::Api) -> $crate::api::ActionBuilder {
                api.update(Self::ENTITY)
            }
        }
    };
}
