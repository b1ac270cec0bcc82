//! Shared test harness for action API tests
//!
//! Provides an [`Api`] over counted in-memory storage, and fixtures that
//! create custom groups and fields through the API itself.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! mod api_harness;
//! use api_harness::*;
//! ```

#![allow(dead_code)]

use crm::prelude::*;
use tracing_subscriber::EnvFilter;

/// Name of the fixture group extending Contact
pub const GROUP: &str = "MyContactFields";

/// Install a test subscriber honouring `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An API with everything needed to inspect what it did
pub struct Harness {
    pub api: Api,
    pub counter: QueryCounter,
    pub storage: InMemoryStorage,
}

/// Build an admin API over counted in-memory storage
pub async fn harness() -> Harness {
    harness_with(ApiBuilder::new()).await
}

/// Same as [`harness`], starting from a partially configured builder
pub async fn harness_with(builder: ApiBuilder) -> Harness {
    init_tracing();
    let storage = InMemoryStorage::new();
    let counter = QueryCounter::new();
    let api = builder
        .with_storage(CountingStorage::new(storage.clone(), counter.clone()))
        .with_auth(AuthContext::Admin)
        .build()
        .await
        .expect("api should build");
    Harness {
        api,
        counter,
        storage,
    }
}

/// Create a custom group extending an entity, returning its id
pub async fn create_group(api: &Api, name: &str, extends: &str) -> i64 {
    CustomGroup::create(api)
        .add_value("name", name)
        .add_value("extends", extends)
        .execute()
        .await
        .expect("custom group should be created")
        .first()
        .and_then(Record::id)
        .expect("custom group id")
}

/// Create a text field in a group
pub async fn create_text_field(api: &Api, group_id: i64, label: &str) -> i64 {
    CustomField::create(api)
        .add_value("custom_group_id", group_id)
        .add_value("label", label)
        .add_value("html_type", "Text")
        .add_value("data_type", "String")
        .execute()
        .await
        .expect("custom field should be created")
        .first()
        .and_then(Record::id)
        .expect("custom field id")
}

/// Create a select field with `value => label` options
pub async fn create_select_field(
    api: &Api,
    group_id: i64,
    label: &str,
    options: &[(&str, &str)],
) -> i64 {
    CustomField::create(api)
        .add_value("custom_group_id", group_id)
        .add_value("label", label)
        .add_value("html_type", "Select")
        .add_value("data_type", "String")
        .add_value("options", FieldValue::map(options.iter().copied()))
        .execute()
        .await
        .expect("select field should be created")
        .first()
        .and_then(Record::id)
        .expect("custom field id")
}

/// The `MyContactFields` group: FavColor (Select r/g/b) plus three text
/// fields FavAnimal, FavLetter and FavFood
pub async fn create_contact_fields(api: &Api) -> i64 {
    let group_id = create_group(api, GROUP, "Contact").await;
    create_select_field(
        api,
        group_id,
        "FavColor",
        &[("r", "Red"), ("g", "Green"), ("b", "Blue")],
    )
    .await;
    for label in ["FavAnimal", "FavLetter", "FavFood"] {
        create_text_field(api, group_id, label).await;
    }
    group_id
}

/// Create an individual, with optional custom values, returning its id
pub async fn create_individual(api: &Api, first_name: &str, custom: &[(String, &str)]) -> i64 {
    let mut action = Contact::create(api)
        .add_value("contact_type", "Individual")
        .add_value("first_name", first_name);
    for (path, value) in custom {
        action = action.add_value(path.clone(), *value);
    }
    action
        .execute()
        .await
        .expect("contact should be created")
        .first()
        .and_then(Record::id)
        .expect("contact id")
}

/// Dotted path of a field of the fixture group
pub fn path(field: &str) -> String {
    format!("{}.{}", GROUP, field)
}
