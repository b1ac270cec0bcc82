//! Behavioural tests for the action API
//!
//! These tests verify that:
//! - Permissions are enforced unless an action opts out
//! - Unknown entities, groups and fields are reported before any data query
//! - Malformed input never reaches storage
//! - Writes are atomic and publish events only once committed
//! - Prepare stages run in order and can reject actions
//! - Entities declared in configuration behave like built-in ones

mod api_harness;

use api_harness::*;
use crm::prelude::*;
use crm::storage::{Query, QueryOutput};

// =============================================================================
// Permissions
// =============================================================================

mod permission_tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_get_is_denied() {
        let h = harness().await;
        let anonymous = h.api.as_user(AuthContext::Anonymous);

        let err = Contact::get(&anonymous).execute().await.unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_check_permissions_false_bypasses_policy() {
        let h = harness().await;
        create_individual(&h.api, "Ann", &[]).await;
        let anonymous = h.api.as_user(AuthContext::Anonymous);

        let result = Contact::get(&anonymous)
            .set_check_permissions(false)
            .execute()
            .await
            .unwrap();
        assert_eq!(result.count, 1);
    }

    #[tokio::test]
    async fn test_user_needs_the_matching_permission() {
        let h = harness().await;
        let viewer = h
            .api
            .as_user(AuthContext::user(Some(7), [permissions::VIEW_CONTACTS]));

        assert!(Contact::get(&viewer).execute().await.is_ok());
        let err = Contact::create(&viewer)
            .add_value("contact_type", "Individual")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
    }

    #[tokio::test]
    async fn test_configured_default_applies_to_new_actions() {
        let config = ApiConfig::from_yaml_str("check_permissions: false").unwrap();
        let h = harness_with(ApiBuilder::new().with_config(config)).await;
        let anonymous = h.api.as_user(AuthContext::Anonymous);

        assert!(Contact::get(&anonymous).execute().await.is_ok());
        let err = Contact::get(&anonymous)
            .set_check_permissions(true)
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_DENIED");
    }
}

// =============================================================================
// Resolution Failures
// =============================================================================

mod not_found_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_entity_issues_no_query() {
        let h = harness().await;
        h.counter.begin_query_count();

        let err = h.api.get("Spaceship").execute().await.unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_ENTITY_TYPE");
        assert_eq!(h.counter.query_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_group_and_field() {
        let h = harness().await;
        create_contact_fields(&h.api).await;

        let err = Contact::get(&h.api)
            .add_select("NoSuchGroup.FavColor")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CUSTOM_GROUP_NOT_FOUND");
        assert_eq!(err.field_path(), Some("NoSuchGroup.FavColor"));

        let err = Contact::get(&h.api)
            .add_where(path("FavPlanet"), "=", "Mars")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CUSTOM_FIELD_NOT_FOUND");

        let err = Contact::get(&h.api)
            .add_select("shoe_size")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "FIELD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_group_extending_other_entity_is_not_visible() {
        let config = r#"
entities:
  - name: Membership
    extendable: true
    columns:
      - name: status
        data_type: String
"#;
        let h = harness_with(
            ApiBuilder::new().with_config(ApiConfig::from_yaml_str(config).unwrap()),
        )
        .await;

        create_group(&h.api, "MembershipExtras", "Membership").await;
        let err = Contact::get(&h.api)
            .add_select("MembershipExtras.*")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CUSTOM_GROUP_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_inactive_group_is_ignored() {
        let h = harness().await;
        let group_id = create_contact_fields(&h.api).await;

        CustomGroup::update(&h.api)
            .add_value("is_active", false)
            .add_where("id", "=", group_id)
            .execute()
            .await
            .unwrap();

        let err = Contact::get(&h.api)
            .add_select(path("FavColor"))
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CUSTOM_GROUP_NOT_FOUND");
    }
}

// =============================================================================
// Validation
// =============================================================================

mod validation_tests {
    use super::*;

    #[tokio::test]
    async fn test_malformed_input_never_reaches_storage() {
        let h = harness().await;
        h.counter.begin_query_count();

        let err = Contact::get(&h.api)
            .add_select("a..b")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_PATH");

        let err = Contact::get(&h.api)
            .add_where("first_name", "~=", "x")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_OPERATOR");

        let err = Contact::get(&h.api)
            .add_where("id", "IN", 3i64)
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERAND");

        assert_eq!(h.counter.query_count(), 0);
    }

    #[tokio::test]
    async fn test_option_values_are_checked() {
        let h = harness().await;
        create_contact_fields(&h.api).await;

        let err = Contact::create(&h.api)
            .add_value("contact_type", "Individual")
            .add_value(path("FavColor"), "purple")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPTION");
        assert_eq!(h.storage.row_count("civicrm_contact").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attributes_cannot_be_written() {
        let h = harness().await;
        create_contact_fields(&h.api).await;

        let err = Contact::create(&h.api)
            .add_value("contact_type", "Individual")
            .add_value(path("FavColor.label"), "Red")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "READ_ONLY");
    }

    #[tokio::test]
    async fn test_attributes_cannot_be_sorted_on() {
        let h = harness().await;
        create_contact_fields(&h.api).await;

        let err = Contact::get(&h.api)
            .add_order_by(path("FavColor.label"), "DESC")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED");
    }

    #[tokio::test]
    async fn test_required_columns_and_contact_types() {
        let h = harness().await;

        let err = Contact::create(&h.api)
            .add_value("first_name", "Nobody")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_REQUIRED");

        let err = Contact::create(&h.api)
            .add_value("contact_type", "Robot")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_VALUE");
    }

    #[tokio::test]
    async fn test_update_without_where_is_rejected() {
        let h = harness().await;
        let err = Contact::update(&h.api)
            .add_value("first_name", "Everyone")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_CLAUSE");
    }
}

// =============================================================================
// Writes
// =============================================================================

mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_written_values() {
        let h = harness().await;
        create_contact_fields(&h.api).await;

        let created = Contact::create(&h.api)
            .add_value("contact_type", "Individual")
            .add_value("first_name", "Ada")
            .add_value("last_name", "Lovelace")
            .add_value(path("FavLetter"), "a")
            .execute()
            .await
            .unwrap();

        let record = created.first().unwrap();
        assert!(record.id().is_some());
        assert_eq!(record.get("display_name"), Some(&"Ada Lovelace".into()));
        assert_eq!(record.get(&path("FavLetter")), Some(&"a".into()));
        assert_eq!(record.get("is_deleted"), Some(&FieldValue::Boolean(false)));
    }

    #[tokio::test]
    async fn test_update_custom_values_with_one_statement_per_group() {
        let h = harness().await;
        create_contact_fields(&h.api).await;
        let id = create_individual(&h.api, "Bo", &[(path("FavFood"), "Kale")]).await;

        h.counter.begin_query_count();
        let updated = Contact::update(&h.api)
            .add_value(path("FavFood"), "Pie")
            .add_value(path("FavAnimal"), "Owl")
            .add_where("id", "=", id)
            .execute()
            .await
            .unwrap();
        assert_eq!(updated.ids(), vec![id]);
        // 3 metadata, SELECT ids, BEGIN, contact UPDATE (modified_date),
        // one UPSERT for the group, COMMIT
        assert_eq!(h.counter.query_count(), 8);

        let found = Contact::get(&h.api)
            .add_select(path("FavFood"))
            .add_select(path("FavAnimal"))
            .add_where("id", "=", id)
            .execute()
            .await
            .unwrap();
        let record = found.first().unwrap();
        assert_eq!(record.get(&path("FavFood")), Some(&"Pie".into()));
        assert_eq!(record.get(&path("FavAnimal")), Some(&"Owl".into()));
    }

    #[tokio::test]
    async fn test_update_creates_missing_group_rows() {
        let h = harness().await;
        create_contact_fields(&h.api).await;
        let id = create_individual(&h.api, "Cy", &[]).await;

        Contact::update(&h.api)
            .add_value(path("FavColor"), "b")
            .add_where("id", "=", id)
            .execute()
            .await
            .unwrap();

        let found = Contact::get(&h.api)
            .add_select(path("FavColor.label"))
            .add_where("id", "=", id)
            .execute()
            .await
            .unwrap();
        assert_eq!(
            found.first().unwrap().get(&path("FavColor.label")),
            Some(&"Blue".into())
        );
    }

    #[tokio::test]
    async fn test_update_matching_nothing_writes_nothing() {
        let h = harness().await;
        h.counter.begin_query_count();

        let updated = Contact::update(&h.api)
            .add_value("first_name", "Ghost")
            .add_where("id", "=", 999i64)
            .execute()
            .await
            .unwrap();
        assert!(updated.is_empty());
        // no custom groups: just the id lookup
        assert_eq!(h.counter.query_count(), 2);
    }
}

// =============================================================================
// Atomicity
// =============================================================================

mod rollback_tests {
    use super::*;

    /// In-memory storage refusing inserts into tables with a given prefix
    struct FailingStorage {
        inner: InMemoryStorage,
        prefix: &'static str,
    }

    #[async_trait]
    impl Storage for FailingStorage {
        async fn execute(&self, query: Query) -> ApiResult<QueryOutput> {
            if let Query::Insert { table, .. } = &query
                && table.starts_with(self.prefix)
            {
                return Err(StorageError::QueryError {
                    backend: "failing".to_string(),
                    message: format!("refusing insert into {}", table),
                }
                .into());
            }
            self.inner.execute(query).await
        }
    }

    #[tokio::test]
    async fn test_failed_group_insert_leaves_no_contact() {
        init_tracing();
        let storage = InMemoryStorage::new();
        let api = ApiBuilder::new()
            .with_storage(FailingStorage {
                inner: storage.clone(),
                prefix: "civicrm_value_",
            })
            .with_auth(AuthContext::Admin)
            .build()
            .await
            .unwrap();
        create_contact_fields(&api).await;
        let mut events = api.events().subscribe();

        let err = Contact::create(&api)
            .add_value("contact_type", "Individual")
            .add_value(path("FavFood"), "Soup")
            .execute()
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert_eq!(storage.row_count("civicrm_contact").unwrap(), 0);
        assert!(events.try_recv().is_err());

        // storage is usable again after the rollback
        Contact::create(&api)
            .add_value("contact_type", "Individual")
            .execute()
            .await
            .unwrap();
        assert_eq!(storage.row_count("civicrm_contact").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_hook_rolls_back_field_row() {
        let h = harness().await;

        let err = CustomField::create(&h.api)
            .add_value("custom_group_id", 42i64)
            .add_value("label", "Orphan")
            .add_value("html_type", "Text")
            .add_value("data_type", "String")
            .execute()
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "RECORD_NOT_FOUND");
        assert_eq!(h.storage.row_count("civicrm_custom_field").unwrap(), 0);
    }
}

// =============================================================================
// Events
// =============================================================================

mod event_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_update_publish_events() {
        let h = harness().await;
        let mut events = h.api.events().subscribe();

        let id = create_individual(&h.api, "Eve", &[]).await;
        let envelope = events.try_recv().unwrap();
        assert_eq!(envelope.event.action(), "created");
        assert_eq!(envelope.event.entity(), "Contact");
        assert_eq!(envelope.event.ids(), vec![id]);

        Contact::get(&h.api).execute().await.unwrap();
        assert!(events.try_recv().is_err());

        Contact::update(&h.api)
            .add_value("last_name", "Smith")
            .add_where("id", "=", id)
            .execute()
            .await
            .unwrap();
        let envelope = events.try_recv().unwrap();
        assert_eq!(envelope.event.action(), "updated");
        assert_eq!(envelope.event.ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_shared_event_bus() {
        let bus = EventBus::new(16);
        let mut events = bus.subscribe();
        let h = harness_with(ApiBuilder::new().with_event_bus(bus.clone())).await;

        create_group(&h.api, "Shared", "Contact").await;
        let envelope = events.try_recv().unwrap();
        assert_eq!(envelope.event.entity(), "CustomGroup");
    }
}

// =============================================================================
// Prepare Stages
// =============================================================================

mod stage_tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_stages_run_after_builtins_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = seen.clone();
        let second = seen.clone();
        let builder = ApiBuilder::new()
            .with_stage(stage_fn("first", move |action, _| {
                first.lock().unwrap().push(format!("first:{}", action.selects().len()));
                Ok(action)
            }))
            .with_stage(stage_fn("second", move |action, _| {
                second.lock().unwrap().push("second".to_string());
                Ok(action)
            }));
        let h = harness_with(builder).await;
        create_individual(&h.api, "Dee", &[]).await;
        seen.lock().unwrap().clear();

        Contact::get(&h.api)
            .add_select("first_name")
            .execute()
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["first:1", "second"]);
    }

    #[tokio::test]
    async fn test_stage_can_extend_the_action() {
        let builder = ApiBuilder::new().with_stage(stage_fn("hide_deleted", |action, ctx| {
            if action.entity() == "Contact" && action.operation() == Operation::Get {
                action.with_where("is_deleted", "=", false.into(), ctx)
            } else {
                Ok(action)
            }
        }));
        let h = harness_with(builder).await;
        let kept = create_individual(&h.api, "Kept", &[]).await;
        let gone = create_individual(&h.api, "Gone", &[]).await;
        Contact::update(&h.api)
            .add_value("is_deleted", true)
            .add_where("id", "=", gone)
            .execute()
            .await
            .unwrap();

        let found = Contact::get(&h.api).execute().await.unwrap();
        assert_eq!(found.ids(), vec![kept]);
    }

    #[tokio::test]
    async fn test_values_added_by_stages_are_validated() {
        let builder = ApiBuilder::new().with_stage(stage_fn("inject", |action, ctx| {
            if action.entity() == "Contact" && action.operation() == Operation::Create {
                action.with_value(&path("FavColor"), "purple".into(), ctx)
            } else {
                Ok(action)
            }
        }));
        let h = harness_with(builder).await;
        create_contact_fields(&h.api).await;

        let err = Contact::create(&h.api)
            .add_value("contact_type", "Individual")
            .execute()
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "INVALID_OPTION");
        assert_eq!(err.field_path(), Some(path("FavColor").as_str()));
        assert_eq!(h.storage.row_count("civicrm_contact").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejecting_stage_stops_before_data_queries() {
        let builder = ApiBuilder::new().with_stage(stage_fn("read_only", |action, _| {
            if action.operation().is_write() {
                Err(ApiError::rejected("read_only", "writes are disabled"))
            } else {
                Ok(action)
            }
        }));
        let h = harness_with(builder).await;
        h.counter.begin_query_count();

        let err = Contact::create(&h.api)
            .add_value("contact_type", "Individual")
            .execute()
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), "ACTION_REJECTED");
        assert!(err.to_string().contains("writes are disabled"));
        // the custom group lookup only
        assert_eq!(h.counter.query_count(), 1);
        assert_eq!(h.storage.row_count("civicrm_contact").unwrap(), 0);
    }
}

// =============================================================================
// Configured Entities
// =============================================================================

mod config_entity_tests {
    use super::*;

    const CONFIG: &str = r#"
entities:
  - name: Membership
    extendable: true
    permissions:
      get: public
    columns:
      - name: status
        data_type: String
        required: true
      - name: fee
        data_type: Money
        default: 10
"#;

    #[tokio::test]
    async fn test_configured_entity_with_custom_fields() {
        let config = ApiConfig::from_yaml_str(CONFIG).unwrap();
        let h = harness_with(ApiBuilder::new().with_config(config)).await;
        assert!(h.api.registry().contains("Membership"));

        let group_id = create_group(&h.api, "MembershipExtras", "Membership").await;
        create_text_field(&h.api, group_id, "Source").await;

        h.api
            .create("Membership")
            .add_value("status", "New")
            .add_value("MembershipExtras.Source", "Web")
            .execute()
            .await
            .unwrap();

        let public = h.api.as_user(AuthContext::Anonymous);
        let found = public
            .get("Membership")
            .add_select("fee")
            .add_select("MembershipExtras.Source")
            .add_where("MembershipExtras.Source", "LIKE", "w%")
            .execute()
            .await
            .unwrap();
        assert_eq!(found.count, 1);
        let record = found.first().unwrap();
        assert_eq!(record.get("fee"), Some(&FieldValue::Float(10.0)));
        assert_eq!(record.get("MembershipExtras.Source"), Some(&"Web".into()));
    }

    #[tokio::test]
    async fn test_groups_cannot_extend_unknown_entities() {
        let h = harness().await;
        let err = CustomGroup::create(&h.api)
            .add_value("name", "Nowhere")
            .add_value("extends", "Spaceship")
            .execute()
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_VALUE");
    }
}
